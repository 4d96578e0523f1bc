use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// 判定に使う13個の解剖学的ランドマーク
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(usize)]
pub enum Landmark {
    Nose = 0,
    LeftShoulder = 1,
    RightShoulder = 2,
    LeftElbow = 3,
    RightElbow = 4,
    LeftWrist = 5,
    RightWrist = 6,
    LeftHip = 7,
    RightHip = 8,
    LeftKnee = 9,
    RightKnee = 10,
    LeftAnkle = 11,
    RightAnkle = 12,
}

impl Landmark {
    pub const COUNT: usize = 13;

    pub const ALL: [Landmark; Landmark::COUNT] = [
        Self::Nose,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    /// 33点ポーズモデル（MediaPipe）でのインデックス
    pub fn model_index(self) -> usize {
        match self {
            Self::Nose => 0,
            Self::LeftShoulder => 11,
            Self::RightShoulder => 12,
            Self::LeftElbow => 13,
            Self::RightElbow => 14,
            Self::LeftWrist => 15,
            Self::RightWrist => 16,
            Self::LeftHip => 23,
            Self::RightHip => 24,
            Self::LeftKnee => 25,
            Self::RightKnee => 26,
            Self::LeftAnkle => 27,
            Self::RightAnkle => 28,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Nose => "NOSE",
            Self::LeftShoulder => "LEFT_SHOULDER",
            Self::RightShoulder => "RIGHT_SHOULDER",
            Self::LeftElbow => "LEFT_ELBOW",
            Self::RightElbow => "RIGHT_ELBOW",
            Self::LeftWrist => "LEFT_WRIST",
            Self::RightWrist => "RIGHT_WRIST",
            Self::LeftHip => "LEFT_HIP",
            Self::RightHip => "RIGHT_HIP",
            Self::LeftKnee => "LEFT_KNEE",
            Self::RightKnee => "RIGHT_KNEE",
            Self::LeftAnkle => "LEFT_ANKLE",
            Self::RightAnkle => "RIGHT_ANKLE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.name() == name)
    }
}

/// 単一キーポイント（ストリーム座標）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// 可視度 (0.0〜1.0)。推定側が出さない場合は1.0
    #[serde(default = "default_visibility")]
    pub visibility: f32,
}

fn default_visibility() -> f32 {
    1.0
}

impl Keypoint {
    pub fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self { x, y, visibility }
    }

    /// 可視度が閾値を超えているか
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility > threshold
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// 1フレーム分のランドマーク。欠損は None
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    keypoints: [Option<Keypoint>; Landmark::COUNT],
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// ビルダー形式で1点追加
    pub fn with(mut self, landmark: Landmark, keypoint: Keypoint) -> Self {
        self.set(landmark, Some(keypoint));
        self
    }

    pub fn set(&mut self, landmark: Landmark, keypoint: Option<Keypoint>) {
        self.keypoints[landmark as usize] = keypoint;
    }

    pub fn get(&self, landmark: Landmark) -> Option<&Keypoint> {
        self.keypoints[landmark as usize].as_ref()
    }

    pub fn point(&self, landmark: Landmark) -> Option<Point> {
        self.get(landmark).map(Keypoint::point)
    }

    /// 存在するランドマーク数
    pub fn len(&self) -> usize {
        self.keypoints.iter().filter(|k| k.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 全ランドマークが存在し、可視度が閾値を超えているか
    /// （キャリブレーション画面の「準備完了」判定）
    pub fn all_visible(&self, threshold: f32) -> bool {
        self.keypoints
            .iter()
            .all(|k| k.map_or(false, |k| k.is_visible(threshold)))
    }
}

impl FromIterator<(Landmark, Keypoint)> for Frame {
    fn from_iter<I: IntoIterator<Item = (Landmark, Keypoint)>>(iter: I) -> Self {
        let mut frame = Frame::new();
        for (landmark, keypoint) in iter {
            frame.set(landmark, Some(keypoint));
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_count() {
        assert_eq!(Landmark::ALL.len(), Landmark::COUNT);
        for (i, l) in Landmark::ALL.iter().enumerate() {
            assert_eq!(*l as usize, i);
        }
    }

    #[test]
    fn test_landmark_names_roundtrip() {
        for l in Landmark::ALL {
            assert_eq!(Landmark::from_name(l.name()), Some(l));
        }
        assert_eq!(Landmark::from_name("LEFT_EAR"), None);
    }

    #[test]
    fn test_landmark_model_index() {
        assert_eq!(Landmark::Nose.model_index(), 0);
        assert_eq!(Landmark::LeftHip.model_index(), 23);
        assert_eq!(Landmark::RightAnkle.model_index(), 28);
    }

    #[test]
    fn test_landmark_serde_name() {
        let json = serde_json::to_string(&Landmark::LeftShoulder).unwrap();
        assert_eq!(json, "\"LEFT_SHOULDER\"");
        let back: Landmark = serde_json::from_str("\"RIGHT_KNEE\"").unwrap();
        assert_eq!(back, Landmark::RightKnee);
    }

    #[test]
    fn test_frame_missing_points() {
        let frame = Frame::new().with(Landmark::Nose, Keypoint::new(10.0, 20.0, 0.9));
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.point(Landmark::Nose), Some(Point::new(10.0, 20.0)));
        assert_eq!(frame.point(Landmark::LeftWrist), None);
    }

    #[test]
    fn test_keypoint_default_visibility() {
        let kp: Keypoint = serde_json::from_str(r#"{"x": 1.0, "y": 2.0}"#).unwrap();
        assert_eq!(kp.visibility, 1.0);
    }

    #[test]
    fn test_all_visible() {
        let full: Frame = Landmark::ALL
            .iter()
            .map(|&l| (l, Keypoint::new(0.0, 0.0, 0.9)))
            .collect();
        assert!(full.all_visible(0.5));

        let mut occluded = full.clone();
        occluded.set(Landmark::LeftAnkle, Some(Keypoint::new(0.0, 0.0, 0.2)));
        assert!(!occluded.all_visible(0.5));

        let mut missing = full;
        missing.set(Landmark::Nose, None);
        assert!(!missing.all_visible(0.5));
    }
}
