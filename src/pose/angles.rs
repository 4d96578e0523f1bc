use serde::Serialize;

use crate::geometry::angle_at;

use super::keypoint::{Frame, Landmark};

/// 主要関節角度（度）。表示パネル用
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct JointAngles {
    pub left_elbow: f32,
    pub right_elbow: f32,
    pub left_shoulder: f32,
    pub right_shoulder: f32,
    pub left_hip: f32,
    pub right_hip: f32,
    pub left_knee: f32,
    pub right_knee: f32,
}

impl JointAngles {
    /// 欠損した関節は0度になる
    pub fn from_frame(frame: &Frame) -> Self {
        use Landmark::*;
        let at = |a, b, c| angle_at(frame.point(a), frame.point(b), frame.point(c));
        Self {
            left_elbow: at(LeftShoulder, LeftElbow, LeftWrist),
            right_elbow: at(RightShoulder, RightElbow, RightWrist),
            left_shoulder: at(LeftHip, LeftShoulder, LeftElbow),
            right_shoulder: at(RightHip, RightShoulder, RightElbow),
            left_hip: at(LeftShoulder, LeftHip, LeftKnee),
            right_hip: at(RightShoulder, RightHip, RightKnee),
            left_knee: at(LeftHip, LeftKnee, LeftAnkle),
            right_knee: at(RightHip, RightKnee, RightAnkle),
        }
    }
}
