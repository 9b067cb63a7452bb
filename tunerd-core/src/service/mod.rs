pub mod change_detector;
pub mod mapping;
pub mod reconciler;

pub use change_detector::detect_changes;
pub use mapping::MappingService;
pub use reconciler::{Reconciler, ScanSummary};
