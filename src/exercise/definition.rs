use serde::{Deserialize, Serialize};

use crate::geometry::angle_at;
use crate::pose::{Frame, Landmark};

/// しきい値比較演算子
///
/// 未知の文字列は `>` として扱う（設定ミスでフレーム処理を止めない）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Comparator {
    #[default]
    Gt,
    Lt,
    Ge,
    Le,
}

impl Comparator {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            ">" => Self::Gt,
            "<" => Self::Lt,
            ">=" => Self::Ge,
            "<=" => Self::Le,
            other => {
                tracing::warn!(operator = other, "unknown comparator, falling back to '>'");
                Self::Gt
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }

    pub fn compare(self, value: f32, threshold: f32) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Lt => value < threshold,
            Self::Ge => value >= threshold,
            Self::Le => value <= threshold,
        }
    }
}

impl From<String> for Comparator {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Comparator> for String {
    fn from(c: Comparator) -> Self {
        c.as_str().to_string()
    }
}

/// 頂点bでの a-b-c 角度を測る関節の組
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointTriple {
    pub a: Landmark,
    pub b: Landmark,
    pub c: Landmark,
}

impl JointTriple {
    pub const fn new(a: Landmark, b: Landmark, c: Landmark) -> Self {
        Self { a, b, c }
    }

    /// 3点のいずれかが欠損していれば None
    pub fn angle(&self, frame: &Frame) -> Option<f32> {
        let a = frame.point(self.a)?;
        let b = frame.point(self.b)?;
        let c = frame.point(self.c)?;
        Some(angle_at(Some(a), Some(b), Some(c)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideJoints {
    pub left: JointTriple,
    pub right: JointTriple,
}

/// 回数カウントの方式
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Counting {
    /// 左右それぞれ down→up で1回
    #[default]
    PerSide,
    /// 膝角度（joints.left）と股関節角度（joints.right）の両方で判定。
    /// 両方が `up_threshold` 未満で着座、膝が `down_threshold` 以上かつ
    /// 股関節が `hip_extended` 以上で起立
    SitToStand {
        #[serde(default = "default_hip_extended")]
        hip_extended: f32,
    },
}

fn default_hip_extended() -> f32 { 140.0 }

/// 種目定義（設定データ。実行中は変更しない）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 左右を別々に数えるか（false なら多い方を合算カウンタとする）
    #[serde(default = "default_track_both_sides")]
    pub track_both_sides: bool,
    #[serde(default = "default_label_left")]
    pub label_left: String,
    #[serde(default = "default_label_right")]
    pub label_right: String,
    pub up_threshold: f32,
    pub down_threshold: f32,
    pub ideal_up_angle: f32,
    pub ideal_down_angle: f32,
    #[serde(default = "default_down_compare")]
    pub down_compare: Comparator,
    #[serde(default = "default_up_compare")]
    pub up_compare: Comparator,
    pub joints: SideJoints,
    #[serde(default)]
    pub counting: Counting,
    /// 角度EMAのα（未指定なら [rehab] の値）
    #[serde(default)]
    pub angle_alpha: Option<f32>,
}

fn default_track_both_sides() -> bool { true }
fn default_label_left() -> String { "Left".to_string() }
fn default_label_right() -> String { "Right".to_string() }
fn default_down_compare() -> Comparator { Comparator::Gt }
fn default_up_compare() -> Comparator { Comparator::Lt }

impl ExerciseDefinition {
    pub fn is_sit_to_stand(&self) -> bool {
        matches!(self.counting, Counting::SitToStand { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Keypoint;

    #[test]
    fn test_comparator() {
        assert!(Comparator::Gt.compare(161.0, 160.0));
        assert!(!Comparator::Gt.compare(160.0, 160.0));
        assert!(Comparator::Ge.compare(160.0, 160.0));
        assert!(Comparator::Lt.compare(29.0, 30.0));
        assert!(Comparator::Le.compare(30.0, 30.0));
    }

    #[test]
    fn test_unknown_comparator_falls_back_to_gt() {
        assert_eq!(Comparator::parse("=>"), Comparator::Gt);
        assert_eq!(Comparator::parse(" <= "), Comparator::Le);
        let c: Comparator = serde_json::from_str("\"!=\"").unwrap();
        assert_eq!(c, Comparator::Gt);
        assert_eq!(serde_json::to_string(&Comparator::Ge).unwrap(), "\">=\"");
    }

    #[test]
    fn test_joint_triple_missing_point() {
        let triple = JointTriple::new(Landmark::LeftShoulder, Landmark::LeftElbow, Landmark::LeftWrist);
        let frame = Frame::new()
            .with(Landmark::LeftShoulder, Keypoint::new(0.0, 0.0, 1.0))
            .with(Landmark::LeftElbow, Keypoint::new(0.0, 10.0, 1.0));
        assert_eq!(triple.angle(&frame), None);
        let frame = frame.with(Landmark::LeftWrist, Keypoint::new(0.0, 20.0, 1.0));
        assert!((triple.angle(&frame).unwrap() - 180.0).abs() < 1e-3);
    }

    #[test]
    fn test_definition_from_toml_with_defaults() {
        let def: ExerciseDefinition = toml::from_str(
            r#"
            name = "Wall Push"
            up_threshold = 60.0
            down_threshold = 150.0
            ideal_up_angle = 50.0
            ideal_down_angle = 165.0
            up_compare = "<="

            [joints.left]
            a = "LEFT_SHOULDER"
            b = "LEFT_ELBOW"
            c = "LEFT_WRIST"

            [joints.right]
            a = "RIGHT_SHOULDER"
            b = "RIGHT_ELBOW"
            c = "RIGHT_WRIST"
            "#,
        )
        .unwrap();
        assert!(def.track_both_sides);
        assert_eq!(def.down_compare, Comparator::Gt);
        assert_eq!(def.up_compare, Comparator::Le);
        assert_eq!(def.counting, Counting::PerSide);
        assert_eq!(def.angle_alpha, None);
    }

    #[test]
    fn test_sit_to_stand_counting_tag() {
        let c: Counting = toml::from_str(r#"kind = "sit_to_stand""#).unwrap();
        assert_eq!(c, Counting::SitToStand { hip_extended: 140.0 });
    }
}
