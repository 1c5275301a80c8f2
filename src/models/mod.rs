//! Data models shared across the pipeline

pub mod classification;
pub mod file;

pub use classification::*;
pub use file::*;

/// Label meaning "no opinion" / "could not classify"
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Label some collaborators use interchangeably with [`UNKNOWN_CATEGORY`]
pub const UNSORTED_CATEGORY: &str = "Unsorted";

/// True for labels that must never be learned or recorded
pub fn is_unknown(category: &str) -> bool {
    category.is_empty() || category == UNKNOWN_CATEGORY || category == UNSORTED_CATEGORY
}
