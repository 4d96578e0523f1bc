use std::collections::BTreeMap;

use crate::pose::Landmark::{self, *};

use super::definition::{Comparator, Counting, ExerciseDefinition, JointTriple, SideJoints};

/// 種目キー → 定義の表（表示順を保持）
#[derive(Debug, Clone, Default)]
pub struct ExerciseCatalog {
    entries: Vec<(String, ExerciseDefinition)>,
}

struct Builtin {
    key: &'static str,
    name: &'static str,
    description: &'static str,
    labels: (&'static str, &'static str),
    /// (up, down)
    thresholds: (f32, f32),
    /// (ideal up, ideal down)
    ideal: (f32, f32),
    left: [Landmark; 3],
    right: [Landmark; 3],
    counting: Counting,
}

impl Builtin {
    fn definition(&self) -> ExerciseDefinition {
        let triple = |[a, b, c]: [Landmark; 3]| JointTriple::new(a, b, c);
        ExerciseDefinition {
            name: self.name.to_string(),
            description: self.description.to_string(),
            track_both_sides: matches!(self.counting, Counting::PerSide),
            label_left: self.labels.0.to_string(),
            label_right: self.labels.1.to_string(),
            up_threshold: self.thresholds.0,
            down_threshold: self.thresholds.1,
            ideal_up_angle: self.ideal.0,
            ideal_down_angle: self.ideal.1,
            down_compare: Comparator::Gt,
            up_compare: Comparator::Lt,
            joints: SideJoints {
                left: triple(self.left),
                right: triple(self.right),
            },
            counting: self.counting,
            angle_alpha: None,
        }
    }
}

const BUILTINS: [Builtin; 7] = [
    Builtin {
        key: "bicep_curls",
        name: "Bicep Curl",
        description: "Bicep curl counter for both arms",
        labels: ("Left Arm", "Right Arm"),
        thresholds: (30.0, 160.0),
        ideal: (30.0, 160.0),
        left: [LeftShoulder, LeftElbow, LeftWrist],
        right: [RightShoulder, RightElbow, RightWrist],
        counting: Counting::PerSide,
    },
    Builtin {
        key: "knee_extension",
        name: "Knee Extension",
        description: "Quadriceps strength and knee stability",
        labels: ("Left Knee", "Right Knee"),
        thresholds: (100.0, 155.0),
        ideal: (90.0, 165.0),
        left: [LeftHip, LeftKnee, LeftAnkle],
        right: [RightHip, RightKnee, RightAnkle],
        counting: Counting::PerSide,
    },
    Builtin {
        key: "front_raise",
        name: "Front Raise",
        description: "Front deltoid training (shoulder flexion to 90 degrees)",
        labels: ("Left Shoulder", "Right Shoulder"),
        thresholds: (30.0, 80.0),
        ideal: (10.0, 90.0),
        left: [LeftElbow, LeftShoulder, LeftHip],
        right: [RightElbow, RightShoulder, RightHip],
        counting: Counting::PerSide,
    },
    Builtin {
        key: "shoulder_flexion",
        name: "Shoulder Flexion",
        description: "Shoulder rehabilitation up to 150 degrees",
        labels: ("Left Shoulder", "Right Shoulder"),
        thresholds: (30.0, 110.0),
        ideal: (10.0, 140.0),
        left: [LeftElbow, LeftShoulder, LeftHip],
        right: [RightElbow, RightShoulder, RightHip],
        counting: Counting::PerSide,
    },
    Builtin {
        key: "sit_to_stand",
        name: "Sit to Stand",
        description: "Functional lower-body exercise",
        labels: ("Knee Angle", "Hip Angle"),
        thresholds: (100.0, 155.0),
        ideal: (90.0, 165.0),
        // 左半身の膝角度と股関節角度
        left: [LeftHip, LeftKnee, LeftAnkle],
        right: [LeftShoulder, LeftHip, LeftKnee],
        counting: Counting::SitToStand { hip_extended: 140.0 },
    },
    Builtin {
        key: "shoulder_abduction",
        name: "Shoulder Abduction",
        description: "Lateral raise for the side deltoid",
        labels: ("Left Shoulder", "Right Shoulder"),
        thresholds: (30.0, 80.0),
        ideal: (10.0, 90.0),
        left: [LeftWrist, LeftShoulder, LeftHip],
        right: [RightWrist, RightShoulder, RightHip],
        counting: Counting::PerSide,
    },
    Builtin {
        key: "hip_abduction",
        name: "Hip Abduction",
        description: "Hip strength and balance",
        labels: ("Left Hip", "Right Hip"),
        thresholds: (20.0, 45.0),
        ideal: (5.0, 50.0),
        left: [LeftAnkle, LeftHip, LeftShoulder],
        right: [RightAnkle, RightHip, RightShoulder],
        counting: Counting::PerSide,
    },
];

impl ExerciseCatalog {
    /// 組み込み7種目
    pub fn builtin() -> Self {
        Self {
            entries: BUILTINS
                .iter()
                .map(|b| (b.key.to_string(), b.definition()))
                .collect(),
        }
    }

    /// 同じキーは置き換え、新しいキーは末尾に追加
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, ExerciseDefinition>) -> Self {
        for (key, def) in overrides {
            match self.entries.iter_mut().find(|(k, _)| k == key) {
                Some(entry) => entry.1 = def.clone(),
                None => self.entries.push((key.clone(), def.clone())),
            }
            tracing::debug!(exercise = %key, "exercise definition overridden");
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&ExerciseDefinition> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, d)| d)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// 表示名。未知のキーは "Unknown"
    pub fn display_name(&self, key: &str) -> &str {
        self.get(key).map_or("Unknown", |d| d.name.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExerciseDefinition)> {
        self.entries.iter().map(|(k, d)| (k.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
