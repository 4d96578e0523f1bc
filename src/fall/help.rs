//! HELP状態（手振り継続による救助要請）

use crate::config::HelpConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpTransition {
    None,
    Activated,
    Cleared,
}

/// 手振りが `sustain_s` 続くとHELPに入り、最後のトリガーから `hold_s` 経過し
/// かつ `clear_after_quiet_s` の間手振りが無ければ解除する。
#[derive(Debug, Clone)]
pub struct HelpState {
    config: HelpConfig,
    waving_now: bool,
    waving_since: f64,
    last_waving_t: Option<f64>,
    active: bool,
    active_since: Option<f64>,
    expires_at: f64,
}

impl HelpState {
    pub fn new(config: HelpConfig) -> Self {
        Self {
            config,
            waving_now: false,
            waving_since: 0.0,
            last_waving_t: None,
            active: false,
            active_since: None,
            expires_at: 0.0,
        }
    }

    pub fn update(&mut self, t: f64, waving: bool) -> HelpTransition {
        if waving {
            if !self.waving_now {
                self.waving_since = t;
                self.waving_now = true;
            }
            self.last_waving_t = Some(t);
        } else {
            self.waving_now = false;
        }

        let sustained = self.waving_now && t - self.waving_since >= self.config.sustain_s;
        if sustained {
            self.expires_at = t + self.config.hold_s;
            if !self.active {
                self.active = true;
                self.active_since = Some(t);
                return HelpTransition::Activated;
            }
        } else if self.active {
            let quiet = t - self.last_waving_t.unwrap_or(0.0);
            if t >= self.expires_at && quiet >= self.config.clear_after_quiet_s {
                self.active = false;
                self.active_since = None;
                return HelpTransition::Cleared;
            }
        }
        HelpTransition::None
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_waving(&self) -> bool {
        self.waving_now
    }

    pub fn active_since(&self) -> Option<f64> {
        self.active_since
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(help: &mut HelpState, from: u32, to: u32, waving: bool) -> Vec<HelpTransition> {
        (from..to)
            .map(|i| help.update(i as f64 * 0.1, waving))
            .filter(|&tr| tr != HelpTransition::None)
            .collect()
    }

    #[test]
    fn test_short_waving_does_not_activate() {
        let mut help = HelpState::new(HelpConfig::default());
        assert!(run(&mut help, 0, 10, true).is_empty());
        run(&mut help, 10, 30, false);
        assert!(!help.is_active());
    }

    #[test]
    fn test_activation_hold_and_quiet_clear() {
        let mut help = HelpState::new(HelpConfig::default());
        // 0.0〜3.0秒手振り: 1.5秒でHELP
        assert_eq!(run(&mut help, 0, 31, true), vec![HelpTransition::Activated]);
        assert!(help.is_active());
        assert!(help.active_since().is_some_and(|s| (s - 1.5).abs() < 1e-6));

        // 最後のトリガー(3.0秒)から6秒は保持
        assert!(run(&mut help, 31, 85, false).is_empty());
        assert!(help.is_active());

        assert_eq!(run(&mut help, 85, 95, false), vec![HelpTransition::Cleared]);
        assert!(!help.is_active());
    }

    #[test]
    fn test_brief_gap_keeps_help() {
        let mut help = HelpState::new(HelpConfig::default());
        run(&mut help, 0, 20, true);
        assert!(help.is_active());
        run(&mut help, 20, 23, false);
        run(&mut help, 23, 40, true);
        assert!(help.is_active());
    }

    #[test]
    fn test_reset() {
        let mut help = HelpState::new(HelpConfig::default());
        run(&mut help, 0, 20, true);
        help.reset();
        assert!(!help.is_active());
        assert!(!help.is_waving());
        help.reset();
        assert!(!help.is_active());
    }
}
