//! Session context
//!
//! Short-term memory of recent placements. A burst of similar files (five
//! physics papers in three minutes) makes the dominant recent category a weak
//! signal for the next file.

use crate::models::is_unknown;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

/// Maximum number of events retained regardless of age
pub const MAX_SESSION_EVENTS: usize = 50;

/// One recorded placement
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub path: String,
    pub category: String,
    pub timestamp: DateTime<Utc>,
}

/// Sliding-window histogram of recently assigned categories
///
/// Internally synchronized so voters can read it from the worker pool while
/// the engine records outcomes.
#[derive(Debug)]
pub struct SessionTracker {
    window: Duration,
    events: Mutex<VecDeque<SessionEvent>>,
}

impl SessionTracker {
    pub fn new(window_minutes: i64) -> Self {
        Self {
            window: Duration::minutes(window_minutes.max(0)),
            events: Mutex::new(VecDeque::with_capacity(MAX_SESSION_EVENTS)),
        }
    }

    /// Record a placement now. Unknown categories are ignored.
    pub fn add_event(&self, path: &str, category: &str) {
        self.add_event_at(path, category, Utc::now());
    }

    /// Record a placement at an explicit time
    pub fn add_event_at(&self, path: &str, category: &str, timestamp: DateTime<Utc>) {
        if is_unknown(category) {
            return;
        }

        let Ok(mut events) = self.events.lock() else {
            return;
        };
        if events.len() == MAX_SESSION_EVENTS {
            events.pop_front();
        }
        events.push_back(SessionEvent {
            path: path.to_string(),
            category: category.to_string(),
            timestamp,
        });
    }

    /// Normalized category distribution over the current window
    pub fn current_context(&self) -> BTreeMap<String, f32> {
        self.context_at(Utc::now())
    }

    /// Normalized category distribution over the window ending at `now`
    pub fn context_at(&self, now: DateTime<Utc>) -> BTreeMap<String, f32> {
        let Ok(events) = self.events.lock() else {
            return BTreeMap::new();
        };

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut total = 0usize;
        for event in events.iter().filter(|e| now - e.timestamp < self.window) {
            *counts.entry(event.category.clone()).or_default() += 1;
            total += 1;
        }

        if total == 0 {
            return BTreeMap::new();
        }

        let distribution: BTreeMap<String, f32> = counts
            .into_iter()
            .map(|(category, count)| (category, count as f32 / total as f32))
            .collect();

        if let Some((dominant, share)) = dominant(&distribution) {
            tracing::debug!(
                recent = total,
                dominant = %dominant,
                share = format!("{:.2}", share),
                "Session context"
            );
        }

        distribution
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Highest-share category; ties resolve to the alphabetically first label
pub fn dominant(distribution: &BTreeMap<String, f32>) -> Option<(&str, f32)> {
    let mut best: Option<(&str, f32)> = None;
    for (category, share) in distribution {
        if best.map_or(true, |(_, best_share)| *share > best_share) {
            best = Some((category.as_str(), *share));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_is_normalized() {
        let tracker = SessionTracker::new(5);
        let now = Utc::now();
        tracker.add_event_at("/a.pdf", "Academic", now);
        tracker.add_event_at("/b.pdf", "Academic", now);
        tracker.add_event_at("/c.pdf", "Academic", now);
        tracker.add_event_at("/d.jpg", "Images", now);

        let ctx = tracker.context_at(now);
        assert_eq!(ctx.get("Academic"), Some(&0.75));
        assert_eq!(ctx.get("Images"), Some(&0.25));
        assert_eq!(dominant(&ctx), Some(("Academic", 0.75)));
    }

    #[test]
    fn test_events_outside_window_are_excluded() {
        let tracker = SessionTracker::new(5);
        let now = Utc::now();
        tracker.add_event_at("/old.pdf", "Finance", now - Duration::minutes(6));
        tracker.add_event_at("/new.mp3", "Audio", now - Duration::minutes(1));

        let ctx = tracker.context_at(now);
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.get("Audio"), Some(&1.0));
    }

    #[test]
    fn test_unknown_is_never_recorded() {
        let tracker = SessionTracker::new(5);
        tracker.add_event("/x", "Unknown");
        tracker.add_event("/y", "Unknown");

        assert!(tracker.is_empty());
        assert!(tracker.current_context().is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let tracker = SessionTracker::new(5);
        for i in 0..(MAX_SESSION_EVENTS + 10) {
            tracker.add_event(&format!("/f{}", i), "Code");
        }
        assert_eq!(tracker.len(), MAX_SESSION_EVENTS);
    }
}
