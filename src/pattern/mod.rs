//! Pattern extractor.

mod extractor;

pub use extractor::{DomainStats, Pattern, PatternConflict, PatternExtractor};
