pub mod detector;
pub mod help;
pub mod waving;

pub use detector::{FallDetector, FallReport, FallState};
pub use help::{HelpState, HelpTransition};
pub use waving::WavingDetector;
