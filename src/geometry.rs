//! 2D幾何プリミティブ
//!
//! 座標はすべてストリーム空間（ピクセル, y軸は下向き）。
//! 欠損した点は `None` で受け取り、計算できない場合は中立値を返す。

use serde::{Deserialize, Serialize};

/// ゼロ除算回避用の微小値（ROIの水平エッジなど）
pub const POLYGON_EPSILON: f32 = 1e-9;

/// 2D点
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// 整数に丸めた点（永続化用）
    pub fn rounded(&self) -> Self {
        Self::new(self.x.round(), self.y.round())
    }
}

/// 頂点bにおける a-b-c の角度（度, 0〜180）
///
/// いずれかの点が欠損、またはベクトル長が0なら0を返す。
/// acos前に[-1, 1]へクランプして浮動小数点誤差による NaN を防ぐ。
pub fn angle_at(a: Option<Point>, b: Option<Point>, c: Option<Point>) -> f32 {
    let (Some(a), Some(b), Some(c)) = (a, b, c) else {
        return 0.0;
    };
    let ba = (a.x - b.x, a.y - b.y);
    let bc = (c.x - b.x, c.y - b.y);
    let mag_ba = ba.0.hypot(ba.1);
    let mag_bc = bc.0.hypot(bc.1);
    if mag_ba == 0.0 || mag_bc == 0.0 {
        return 0.0;
    }
    let dot = ba.0 * bc.0 + ba.1 * bc.1;
    let cos = (dot / (mag_ba * mag_bc)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// 2点の中点。片方でも欠損していれば None
pub fn midpoint(a: Option<Point>, b: Option<Point>) -> Option<Point> {
    let (a, b) = (a?, b?);
    Some(Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0))
}

pub fn distance(a: Point, b: Point) -> f32 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// 重心。空なら None
pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f32;
    let sx: f32 = points.iter().map(|p| p.x).sum();
    let sy: f32 = points.iter().map(|p| p.y).sum();
    Some(Point::new(sx / n, sy / n))
}

/// レイキャスティング法による点の内外判定
///
/// 水平エッジ（yj == yi）の分母は `POLYGON_EPSILON` で置き換える。
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > point.y) != (pj.y > point.y) {
            let mut denom = pj.y - pi.y;
            if denom == 0.0 {
                denom = POLYGON_EPSILON;
            }
            let x_cross = (pj.x - pi.x) * (point.y - pi.y) / denom + pi.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// 重心まわりに全点を回転（ラジアン）
pub fn rotate_polygon(points: &[Point], angle_rad: f32) -> Vec<Point> {
    let Some(c) = centroid(points) else {
        return Vec::new();
    };
    let (sin, cos) = angle_rad.sin_cos();
    points
        .iter()
        .map(|p| {
            let dx = p.x - c.x;
            let dy = p.y - c.y;
            Point::new(c.x + dx * cos - dy * sin, c.y + dx * sin + dy * cos)
        })
        .collect()
}

/// 体幹の傾き（度, 0〜180）
///
/// 肩中点→腰中点ベクトルと鉛直下向きのなす角。直立で0、横臥で90、
/// 逆さ（腰が肩より上）で180。どちらかが欠損、または長さ0なら0。
pub fn torso_tilt_deg(shoulder_mid: Option<Point>, hip_mid: Option<Point>) -> f32 {
    let (Some(s), Some(h)) = (shoulder_mid, hip_mid) else {
        return 0.0;
    };
    let vx = h.x - s.x;
    let vy = h.y - s.y;
    let mag = vx.hypot(vy);
    if mag == 0.0 {
        return 0.0;
    }
    (vy / mag).clamp(-1.0, 1.0).acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    fn p(x: f32, y: f32) -> Option<Point> {
        Some(Point::new(x, y))
    }

    fn square() -> Vec<Point> {
        vec![
            Point::new(100.0, 100.0),
            Point::new(300.0, 100.0),
            Point::new(300.0, 200.0),
            Point::new(100.0, 200.0),
        ]
    }

    #[test]
    fn test_right_angle() {
        let angle = angle_at(p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0));
        assert!(approx_eq(angle, 90.0, 1e-3));
    }

    #[test]
    fn test_collinear_same_direction_is_zero() {
        let angle = angle_at(p(2.0, 0.0), p(0.0, 0.0), p(5.0, 0.0));
        assert!(approx_eq(angle, 0.0, 1e-3));
    }

    #[test]
    fn test_collinear_opposite_direction_is_180() {
        let angle = angle_at(p(-3.0, 1.0), p(0.0, 1.0), p(4.0, 1.0));
        assert!(approx_eq(angle, 180.0, 1e-3));
    }

    #[test]
    fn test_angle_missing_or_degenerate_is_zero() {
        assert_eq!(angle_at(None, p(0.0, 0.0), p(1.0, 0.0)), 0.0);
        assert_eq!(angle_at(p(0.0, 0.0), p(0.0, 0.0), p(1.0, 0.0)), 0.0);
    }

    #[test]
    fn test_angle_range() {
        let pts = [
            (13.0, -7.0),
            (0.1, 0.2),
            (-250.0, 40.0),
            (3.3, 3.3),
            (640.0, 360.0),
        ];
        for a in pts {
            for b in pts {
                for c in pts {
                    let angle = angle_at(p(a.0, a.1), p(b.0, b.1), p(c.0, c.1));
                    assert!((0.0..=180.0).contains(&angle), "angle {angle} out of range");
                }
            }
        }
    }

    #[test]
    fn test_midpoint() {
        assert_eq!(midpoint(p(0.0, 0.0), p(4.0, 2.0)), p(2.0, 1.0));
        assert_eq!(midpoint(None, p(4.0, 2.0)), None);
    }

    #[test]
    fn test_point_in_polygon() {
        let poly = square();
        assert!(point_in_polygon(Point::new(200.0, 150.0), &poly));
        assert!(!point_in_polygon(Point::new(50.0, 150.0), &poly));
        assert!(!point_in_polygon(Point::new(200.0, 250.0), &poly));
    }

    #[test]
    fn test_point_far_outside_bbox() {
        let poly = square();
        for q in [(-1e4, -1e4), (1e4, 1e4), (-1e4, 1e4), (1e4, -1e4)] {
            assert!(!point_in_polygon(Point::new(q.0, q.1), &poly));
        }
    }

    #[test]
    fn test_point_in_polygon_full_turn_invariant() {
        let poly = square();
        let turned = rotate_polygon(&poly, 2.0 * std::f32::consts::TAU);
        for q in [(200.0, 150.0), (110.0, 190.0), (50.0, 150.0), (310.0, 105.0)] {
            let q = Point::new(q.0, q.1);
            assert_eq!(point_in_polygon(q, &poly), point_in_polygon(q, &turned));
        }
    }

    #[test]
    fn test_point_in_degenerate_polygon() {
        // 全点が同じy: 水平エッジのみ
        let flat = vec![
            Point::new(0.0, 10.0),
            Point::new(10.0, 10.0),
            Point::new(20.0, 10.0),
            Point::new(30.0, 10.0),
        ];
        assert!(!point_in_polygon(Point::new(5.0, 10.0), &flat));
    }

    #[test]
    fn test_rotate_quarter_turn_about_centroid() {
        let poly = square();
        let rotated = rotate_polygon(&poly, std::f32::consts::FRAC_PI_2);
        let c = centroid(&rotated).unwrap();
        assert!(approx_eq(c.x, 200.0, 1e-3));
        assert!(approx_eq(c.y, 150.0, 1e-3));
        // (100,100) → dx=-100, dy=-50 → (-dy, dx) = (50, -100)
        assert!(approx_eq(rotated[0].x, 250.0, 1e-3));
        assert!(approx_eq(rotated[0].y, 50.0, 1e-3));
    }

    #[test]
    fn test_torso_tilt() {
        // 直立
        assert!(approx_eq(torso_tilt_deg(p(100.0, 100.0), p(100.0, 200.0)), 0.0, 1e-3));
        // 横臥
        assert!(approx_eq(torso_tilt_deg(p(100.0, 300.0), p(200.0, 300.0)), 90.0, 1e-3));
        // 45度
        assert!(approx_eq(torso_tilt_deg(p(0.0, 0.0), p(10.0, 10.0)), 45.0, 1e-3));
        assert_eq!(torso_tilt_deg(None, p(0.0, 0.0)), 0.0);
    }

    #[test]
    fn test_inverted_torso_is_not_upright() {
        // 腰が肩の真上
        assert!(approx_eq(torso_tilt_deg(p(100.0, 200.0), p(100.0, 100.0)), 180.0, 1e-3));
        // 頭から下向きに傾いた姿勢
        assert!(approx_eq(torso_tilt_deg(p(0.0, 10.0), p(10.0, 0.0)), 135.0, 1e-3));
    }
}
