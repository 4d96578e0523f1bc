//! ベッド領域（ROI）
//!
//! ストリーム座標の回転矩形（4頂点）。ROI内で横になっている場合は
//! 転倒判定を抑制する。編集中のみ2点のドラフト状態を取り得る。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::geometry::{centroid, distance, point_in_polygon, rotate_polygon, Point};
use crate::pose::StreamSpace;

#[derive(Debug, Error, PartialEq)]
pub enum RoiError {
    #[error("no ROI draft to commit")]
    NoDraft,
    #[error("ROI draft has {0} points, 4 required")]
    Incomplete(usize),
    #[error("ROI has zero area")]
    Degenerate,
}

/// 永続化形式 `{"type":"rrect","pts":[{x,y}×4]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PersistedShape {
    #[serde(rename = "rrect")]
    RotatedRect { pts: Vec<Point> },
}

/// 確定済みROI（常に4頂点）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    corners: [Point; 4],
}

impl Roi {
    pub fn new(corners: [Point; 4]) -> Self {
        Self { corners }
    }

    pub fn from_points(points: &[Point]) -> Result<Self, RoiError> {
        let corners: [Point; 4] = points
            .try_into()
            .map_err(|_| RoiError::Incomplete(points.len()))?;
        if polygon_area(&corners) == 0.0 {
            return Err(RoiError::Degenerate);
        }
        Ok(Self { corners })
    }

    pub fn corners(&self) -> &[Point; 4] {
        &self.corners
    }

    pub fn contains(&self, point: Point) -> bool {
        point_in_polygon(point, &self.corners)
    }

    /// 座標は整数に丸める
    pub fn to_persisted(&self) -> PersistedShape {
        PersistedShape::RotatedRect {
            pts: self.corners.iter().map(Point::rounded).collect(),
        }
    }

    /// 頂点数が4でなければ None（「ROI未設定」扱い）
    pub fn from_persisted(shape: &PersistedShape) -> Option<Self> {
        match shape {
            PersistedShape::RotatedRect { pts } => {
                let corners: [Point; 4] = pts.as_slice().try_into().ok()?;
                Some(Self { corners })
            }
        }
    }
}

/// 符号なし面積（靴紐公式）
fn polygon_area(points: &[Point]) -> f32 {
    let n = points.len();
    let twice: f32 = (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum();
    (twice / 2.0).abs()
}

/// ポインタ操作中のモード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditMode {
    Idle,
    Creating,
    Corner(usize),
    Free,
}

/// 対話的なROI編集（表示座標で操作する）
///
/// 空の状態で押下すると2点ドラフトを作り、離すと4頂点に変換する。
/// 4頂点のときは頂点をドラッグして移動、回転修飾付きの移動で重心まわりに回転。
#[derive(Debug, Clone)]
pub struct RoiEditor {
    draft: Vec<Point>,
    mode: EditMode,
    last_pointer: Option<Point>,
    hit_distance: f32,
}

impl RoiEditor {
    pub fn new(hit_distance: f32) -> Self {
        Self {
            draft: Vec::new(),
            mode: EditMode::Idle,
            last_pointer: None,
            hit_distance,
        }
    }

    /// 既存ROIを表示座標に変換して編集を開始
    pub fn edit(
        hit_distance: f32,
        roi: Option<&Roi>,
        space: &StreamSpace,
        display_w: f32,
        display_h: f32,
    ) -> Self {
        let mut editor = Self::new(hit_distance);
        if let Some(roi) = roi {
            editor.draft = roi
                .corners()
                .iter()
                .map(|&p| space.to_display(p, display_w, display_h))
                .collect();
        }
        editor
    }

    pub fn draft(&self) -> &[Point] {
        &self.draft
    }

    pub fn pointer_down(&mut self, p: Point) {
        match self.draft.len() {
            0 => {
                self.draft = vec![p, p];
                self.mode = EditMode::Creating;
            }
            2 => self.mode = EditMode::Creating,
            _ => {
                self.mode = self
                    .hit_corner(p)
                    .map_or(EditMode::Free, EditMode::Corner);
                self.last_pointer = Some(p);
            }
        }
    }

    /// `rotate` は回転修飾キー（Shift）が押されているか
    pub fn pointer_move(&mut self, p: Point, rotate: bool) {
        if self.draft.len() == 2 && self.mode == EditMode::Creating {
            self.draft[1] = p;
            return;
        }
        if self.draft.len() != 4 {
            return;
        }
        match self.mode {
            EditMode::Corner(i) => {
                let prev = self.last_pointer.unwrap_or(p);
                self.draft[i].x += p.x - prev.x;
                self.draft[i].y += p.y - prev.y;
                self.last_pointer = Some(p);
            }
            EditMode::Free if rotate => {
                if let Some(prev) = self.last_pointer {
                    self.rotate_by_pointer(prev, p);
                    self.last_pointer = Some(p);
                }
            }
            _ => {}
        }
    }

    /// 2点ドラフトを軸平行な4頂点に変換する
    pub fn pointer_up(&mut self) {
        if let &[a, b] = self.draft.as_slice() {
            self.draft = vec![
                Point::new(a.x, a.y),
                Point::new(b.x, a.y),
                Point::new(b.x, b.y),
                Point::new(a.x, b.y),
            ];
        }
        self.mode = EditMode::Idle;
        self.last_pointer = None;
    }

    /// 重心から見た prev→curr の掃引角だけ全頂点を回転
    pub fn rotate_by_pointer(&mut self, prev: Point, curr: Point) {
        let Some(c) = centroid(&self.draft) else {
            return;
        };
        let a1 = (prev.y - c.y).atan2(prev.x - c.x);
        let a2 = (curr.y - c.y).atan2(curr.x - c.x);
        self.draft = rotate_polygon(&self.draft, a2 - a1);
    }

    fn hit_corner(&self, p: Point) -> Option<usize> {
        self.draft
            .iter()
            .position(|&c| distance(c, p) <= self.hit_distance)
    }

    /// 表示座標 → ストリーム座標（整数丸め）で確定
    pub fn commit(
        &self,
        space: &StreamSpace,
        display_w: f32,
        display_h: f32,
    ) -> Result<Roi, RoiError> {
        if self.draft.is_empty() {
            return Err(RoiError::NoDraft);
        }
        let stream: Vec<Point> = self
            .draft
            .iter()
            .map(|&p| space.from_display(p, display_w, display_h))
            .collect();
        Roi::from_points(&stream)
    }

    pub fn cancel(&mut self) {
        self.draft.clear();
        self.mode = EditMode::Idle;
        self.last_pointer = None;
    }
}

/// ROIのJSONファイル保存
#[derive(Debug, Clone)]
pub struct RoiStore {
    path: PathBuf,
}

impl RoiStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// 不在・破損・頂点数不正はすべて None
    pub fn load(&self) -> Option<Roi> {
        let raw = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<PersistedShape>(&raw) {
            Ok(shape) => Roi::from_persisted(&shape),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring invalid ROI file");
                None
            }
        }
    }

    pub fn save(&self, roi: &Roi) -> Result<()> {
        let json = serde_json::to_string(&roi.to_persisted())?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write ROI to {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), "ROI saved");
        Ok(())
    }

    /// ファイルが無くても成功
    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "ROI deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("failed to delete ROI {}", self.path.display())),
        }
    }
}
