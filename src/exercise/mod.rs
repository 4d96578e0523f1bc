pub mod catalog;
pub mod definition;
pub mod engine;
pub mod form;

pub use catalog::ExerciseCatalog;
pub use definition::{Comparator, Counting, ExerciseDefinition, JointTriple, SideJoints};
pub use engine::{CombinedMetrics, ExerciseEngine, ExerciseMetrics, SideMetrics, Stage};
pub use form::{form_error, FormGrade, FormScorer};
