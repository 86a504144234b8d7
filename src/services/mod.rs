pub mod detection;
pub mod scanner;

pub use detection::{DetectionService, SimilarityOptions};
pub use scanner::{Discovered, ScanOptions, ScannerService};
