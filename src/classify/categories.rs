//! Category catalog
//!
//! Built-in categories carry a natural-language description whose embedding
//! is the category's anchor in vector space. Categories discovered from the
//! user's folders are added at runtime and embedded from their humanized
//! name.

use crate::atlas::humanize;
use crate::memory::SemanticMemory;
use crate::models::UNKNOWN_CATEGORY;
use crate::vector::{Embedder, EmbeddingMatrix};
use std::path::Path;
use std::sync::Arc;

/// Minimum similarity for a semantic candidate match
pub const CANDIDATE_MATCH_THRESHOLD: f32 = 0.75;

/// Built-in categories and their descriptions
pub const BUILTIN_CATEGORIES: &[(&str, &str)] = &[
    ("Documents", "Official documents, business letters, contracts, forms, legal papers, memos, administrative records, pdf, txt, docx."),
    ("Images", "Photos, pictures, screenshots, wallpapers, graphics, designs, camera rolls, jpg, png, image."),
    ("Video", "Movies, screen recordings, films, tv shows, episodes, clips, video footage, mp4, avi, mov."),
    ("Audio", "Music, songs, podcasts, voice notes, audiobooks, sound effects, recording, mp3, wav."),
    ("Archives", "Compressed zip files, rar, tar, 7z, backups, disk images, archive."),
    ("Code", "Programming code, scripts, source files, python, javascript, html, css, java, react, django, api, backend, frontend, def, class, import, function, return, var, const, let, database, sql, git, repo, pipeline."),
    ("Finance", "Invoices, receipts, tax returns, bank statements, bills, credit card reports, ledger, salary slips, accounting, money, price, cost, total, amount, pay, purchase."),
    ("Academic", "Educational materials, course content, machine learning, artificial intelligence, neural networks, deep learning, supervised learning, unsupervised learning, lectures, tutorials, study guides, textbooks, research, algorithms, data science, statistics, training, model, classification, regression."),
    ("College", "University administrative documents, syllabus, semester schedules, exam papers, assignments, practicals, labs, thesis, research projects, student enrollment, course registration, professor, grade, GPA."),
    ("Personal", "Family photos, private letters, medical records, id cards, passport, visa, personal journal, diary, health, insurance."),
    ("Projects", "Project source code, hackathon deliverables, development builds, technical specifications, repository data, readme, design doc, architecture."),
    ("Events", "Event tickets, conference schedules, meetup invites, workshop materials, calendar entries, rsvp, booking."),
];

/// Extension → category table consulted by the file type voter
pub const EXTENSION_TABLE: &[(&str, &[&str])] = &[
    ("Documents", &["pdf", "docx", "txt", "md"]),
    ("Images", &["jpg", "jpeg", "png", "gif", "svg"]),
    ("Video", &["mp4", "mkv", "mov", "avi"]),
    ("Audio", &["mp3", "wav", "flac"]),
    ("Archives", &["zip", "rar", "tar", "gz"]),
    ("Code", &["py", "js", "html", "css", "java", "cpp"]),
];

/// Category for a path's extension, or `Unknown`
pub fn classify_by_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    EXTENSION_TABLE
        .iter()
        .find(|(_, exts)| exts.contains(&ext.as_str()))
        .map(|(category, _)| *category)
        .unwrap_or(UNKNOWN_CATEGORY)
}

/// Embedded category anchors
pub struct CategoryCatalog {
    embedder: Arc<dyn Embedder>,
    names: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    matrix: EmbeddingMatrix,
}

impl CategoryCatalog {
    /// Catalog of the built-in categories. Categories whose description
    /// fails to embed are left out.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        let mut catalog = Self {
            embedder,
            names: Vec::new(),
            embeddings: Vec::new(),
            matrix: EmbeddingMatrix::default(),
        };

        tracing::info!("Computing category embeddings");
        for (name, description) in BUILTIN_CATEGORIES {
            catalog.insert(name, description);
        }
        catalog.rebuild();
        catalog
    }

    fn insert(&mut self, name: &str, description: &str) -> bool {
        match self.embedder.embed(description) {
            Ok(embedding) => {
                self.names.push(name.to_string());
                self.embeddings.push(embedding);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to embed category {}: {}", name, e);
                false
            }
        }
    }

    fn rebuild(&mut self) {
        let (matrix, kept) = EmbeddingMatrix::from_rows(
            self.embedder.dimension(),
            self.embeddings.iter().map(Vec::as_slice),
        );
        if kept.len() == self.names.len() {
            self.matrix = matrix;
            return;
        }

        // Drop rows the matrix rejected so indices stay aligned
        self.names = kept.iter().map(|&i| self.names[i].clone()).collect();
        self.embeddings = kept.iter().map(|&i| self.embeddings[i].clone()).collect();
        self.matrix = matrix;
    }

    /// Category names, built-ins first
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Embed and add categories not yet known. Returns how many were added.
    pub fn add_dynamic_categories<'a, I>(&mut self, names: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut added = 0;
        for name in names {
            if name.trim().is_empty() || self.contains(name) {
                continue;
            }
            tracing::debug!("Embedding dynamic category: {}", name);
            if self.insert(name, &humanize(name)) {
                added += 1;
            }
        }

        if added > 0 {
            self.rebuild();
        }
        added
    }

    /// Keyword classification.
    ///
    /// The joined keywords are embedded once; a memory recall above
    /// `memory_threshold` wins, otherwise the closest category anchor is
    /// returned if it reaches `threshold`. Below threshold the result is
    /// `Unknown` together with the best score seen.
    pub fn classify_by_keywords(
        &self,
        keywords: &[String],
        memory: Option<&SemanticMemory>,
        memory_threshold: f32,
        threshold: f32,
    ) -> (String, f32) {
        if keywords.is_empty() {
            return (UNKNOWN_CATEGORY.to_string(), 0.0);
        }

        let query_text = keywords.join(" ");
        let query = match self.embedder.embed(&query_text) {
            Ok(query) => query,
            Err(e) => {
                tracing::error!("Vector classification failed: {}", e);
                return (UNKNOWN_CATEGORY.to_string(), 0.0);
            }
        };

        if let Some(memory) = memory {
            if let (Some(category), score) = memory.recall(&query, memory_threshold) {
                return (category, score);
            }
        }

        let Some((index, score)) = self.matrix.best_match(&query) else {
            return (UNKNOWN_CATEGORY.to_string(), 0.0);
        };
        let category = &self.names[index];
        tracing::debug!("Best match for '{}': {} (score: {:.2})", query_text, category, score);

        if score < threshold {
            tracing::info!("Classification score {:.2} below threshold for {}", score, category);
            return (UNKNOWN_CATEGORY.to_string(), score);
        }

        (category.clone(), score)
    }

    /// Pick the candidate (usually an existing folder name) best matching a
    /// query.
    ///
    /// A keyword equal to a candidate name (case-insensitive, trimmed of
    /// `.,-_`) wins outright. Otherwise candidates are compared semantically,
    /// using the catalog anchor for known categories and the humanized name
    /// for others, and the best one is returned if it exceeds
    /// [`CANDIDATE_MATCH_THRESHOLD`].
    pub fn find_best_candidate(
        &self,
        query: &str,
        candidates: &[String],
        keywords: &[String],
    ) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }

        for keyword in keywords {
            let clean = keyword
                .to_lowercase()
                .trim_matches(|c| matches!(c, '.' | ',' | '-' | '_'))
                .to_string();
            if let Some(candidate) = candidates.iter().find(|c| c.to_lowercase() == clean) {
                tracing::info!("Direct keyword match '{}' -> '{}'", keyword, candidate);
                return Some(candidate.clone());
            }
        }

        let query_embedding = match self.embedder.embed(query) {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::error!("Semantic match failed: {}", e);
                return None;
            }
        };

        let mut best: Option<(&String, f32)> = None;
        for candidate in candidates {
            let score = match self.names.iter().position(|n| n == candidate) {
                Some(i) => crate::vector::cosine_similarity(&query_embedding, &self.embeddings[i]),
                None => match self.embedder.embed(&humanize(candidate)) {
                    Ok(embedding) => crate::vector::cosine_similarity(&query_embedding, &embedding),
                    Err(_) => continue,
                },
            };
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((candidate, score));
            }
        }

        let (candidate, score) = best?;
        tracing::debug!("Semantic match '{}' -> '{}' (score: {:.2})", query, candidate, score);
        (score > CANDIDATE_MATCH_THRESHOLD).then(|| candidate.clone())
    }
}
