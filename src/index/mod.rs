pub mod manager;
pub mod reverse;

pub use manager::{ReverseIndexManager, ValidationReport, content_hash};
pub use reverse::{ReverseEntry, ReverseIndex, SourceRecord};
