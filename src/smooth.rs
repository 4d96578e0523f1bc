/// スカラー値のEMA平滑化フィルタ
///
/// smoothed = α·sample + (1-α)·previous
/// 最初のサンプルはそのまま通す。αはインスタンスごとに持つ
/// （速度用と関節角度用で別の値を使う）。
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f32,
    prev: Option<f32>,
}

impl Ema {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, prev: None }
    }

    pub fn apply(&mut self, sample: f32) -> f32 {
        let value = match self.prev {
            Some(prev) => self.alpha * sample + (1.0 - self.alpha) * prev,
            None => sample,
        };
        self.prev = Some(value);
        value
    }

    /// 現在の平滑値（未入力なら None）
    pub fn value(&self) -> Option<f32> {
        self.prev
    }

    pub fn reset(&mut self) {
        self.prev = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq_f32(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_first_sample_passthrough() {
        let mut ema = Ema::new(0.3);
        assert_eq!(ema.apply(42.0), 42.0);
        assert_eq!(ema.value(), Some(42.0));
    }

    #[test]
    fn test_blend() {
        let mut ema = Ema::new(0.5);
        ema.apply(0.0);
        assert!(approx_eq_f32(ema.apply(10.0), 5.0, 1e-6));
        assert!(approx_eq_f32(ema.apply(10.0), 7.5, 1e-6));
    }

    #[test]
    fn test_alpha_one_is_no_smoothing() {
        let mut ema = Ema::new(1.0);
        ema.apply(3.0);
        assert_eq!(ema.apply(-8.0), -8.0);
    }

    #[test]
    fn test_monotonic_convergence() {
        for alpha in [0.05_f32, 0.35, 0.9, 1.0] {
            let mut ema = Ema::new(alpha);
            ema.apply(0.0);
            let target = 100.0;
            let mut prev_gap = f32::INFINITY;
            for _ in 0..200 {
                let v = ema.apply(target);
                let gap = (target - v).abs();
                assert!(gap <= prev_gap, "alpha {alpha}: gap grew {prev_gap} -> {gap}");
                assert!(v <= target);
                prev_gap = gap;
            }
            assert!(prev_gap < 1.0);
        }
    }

    #[test]
    fn test_reset() {
        let mut ema = Ema::new(0.0);
        ema.apply(1.0);
        ema.reset();
        assert_eq!(ema.value(), None);
        assert_eq!(ema.apply(5.0), 5.0);
    }
}
