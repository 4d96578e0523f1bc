pub mod angles;
pub mod keypoint;
pub mod space;

pub use angles::JointAngles;
pub use keypoint::{Frame, Keypoint, Landmark};
pub use space::StreamSpace;
