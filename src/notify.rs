//! 外部通知（HELP / 転倒アラート）
//!
//! 通知は状態遷移時のみ、チャネルごとに独立したクールダウン付きで出す。
//! 配信は別スレッドで行い、失敗してもフレーム処理の状態には影響しない。

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;

use crate::config::NotifyConfig;
use crate::fall::FallState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Help,
    Fall,
}

impl AlertKind {
    /// HELP/EMERGENCY への遷移に対応するチャネル
    pub fn for_state(state: FallState) -> Option<Self> {
        match state {
            FallState::Help => Some(Self::Help),
            FallState::Emergency => Some(Self::Fall),
            FallState::Safe | FallState::SafeSleeping => None,
        }
    }

    fn slot(self) -> usize {
        match self {
            Self::Help => 0,
            Self::Fall => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub confidence: f32,
    pub raised_at: DateTime<Utc>,
    pub message: String,
}

impl Alert {
    pub fn new(kind: AlertKind, confidence: f32) -> Self {
        let message = match kind {
            AlertKind::Help => "HELP: waving gesture detected".to_string(),
            AlertKind::Fall => format!(
                "EMERGENCY: fall detected (confidence {}%)",
                (confidence * 100.0).round() as i32
            ),
        };
        Self {
            kind,
            confidence,
            raised_at: Utc::now(),
            message,
        }
    }
}

/// 通知の出力先
pub trait AlertSink: Send {
    fn name(&self) -> &str;
    fn send(&mut self, alert: &Alert) -> Result<()>;
}

/// tracing へ出すだけのシンク
#[derive(Debug, Default)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn send(&mut self, alert: &Alert) -> Result<()> {
        tracing::warn!(kind = ?alert.kind, confidence = alert.confidence, "{}", alert.message);
        Ok(())
    }
}

/// アラートを JSON Lines で追記する
#[derive(Debug, Clone)]
pub struct JsonlAlertLog {
    path: PathBuf,
}

impl JsonlAlertLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl AlertSink for JsonlAlertLog {
    fn name(&self) -> &str {
        "alert-log"
    }

    fn send(&mut self, alert: &Alert) -> Result<()> {
        let line = serde_json::to_string(alert)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open alert log {}", self.path.display()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

/// アラートの受け渡し口。呼び出し側をブロックしてはならない
pub trait AlertDispatch: Send {
    fn dispatch(&mut self, alert: Alert);
    /// 直近の配信で失敗があったか
    fn delivery_failed(&self) -> bool;
}

/// 別スレッドで全シンクへ配信する
pub struct ThreadedDispatcher {
    tx: Option<Sender<Alert>>,
    failed: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ThreadedDispatcher {
    pub fn start(mut sinks: Vec<Box<dyn AlertSink>>) -> Self {
        let (tx, rx) = mpsc::channel::<Alert>();
        let failed = Arc::new(AtomicBool::new(false));
        let failed_ref = failed.clone();

        let handle = thread::spawn(move || {
            for alert in rx {
                let mut ok = true;
                for sink in sinks.iter_mut() {
                    if let Err(e) = sink.send(&alert) {
                        ok = false;
                        tracing::warn!(
                            sink = sink.name(),
                            kind = ?alert.kind,
                            error = %format!("{e:#}"),
                            "alert delivery failed"
                        );
                    }
                }
                failed_ref.store(!ok, Ordering::Release);
            }
        });

        Self {
            tx: Some(tx),
            failed,
            handle: Some(handle),
        }
    }

    /// 送信済みのアラートを配信し終えるまで待って停止する
    pub fn shutdown(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("alert dispatcher thread panicked");
            }
        }
    }
}

impl AlertDispatch for ThreadedDispatcher {
    fn dispatch(&mut self, alert: Alert) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(alert).is_err() {
            self.failed.store(true, Ordering::Release);
            tracing::warn!("alert dispatcher is not running");
        }
    }

    fn delivery_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}

impl Drop for ThreadedDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// チャネル別のクールダウンと有効/無効を管理する
pub struct Notifier {
    cooldown_s: f64,
    help_enabled: bool,
    fall_enabled: bool,
    /// チャネルごとの最終送信時刻（送信を依頼した時点）
    last_sent: [Option<f64>; 2],
    dispatcher: Box<dyn AlertDispatch>,
}

impl Notifier {
    pub fn new(config: &NotifyConfig, dispatcher: Box<dyn AlertDispatch>) -> Self {
        Self {
            cooldown_s: config.cooldown_s,
            help_enabled: config.help_enabled,
            fall_enabled: config.fall_enabled,
            last_sent: [None; 2],
            dispatcher,
        }
    }

    /// ログシンクと（設定があれば）JSON Lines ログへ配信する標準構成
    pub fn from_config(config: &NotifyConfig) -> Self {
        let mut sinks: Vec<Box<dyn AlertSink>> = vec![Box::new(LogSink)];
        if let Some(path) = &config.alert_log {
            sinks.push(Box::new(JsonlAlertLog::new(path)));
        }
        Self::new(config, Box::new(ThreadedDispatcher::start(sinks)))
    }

    fn enabled(&self, kind: AlertKind) -> bool {
        match kind {
            AlertKind::Help => self.help_enabled,
            AlertKind::Fall => self.fall_enabled,
        }
    }

    /// クールダウン中でなければ配信を依頼して true
    pub fn maybe_notify(&mut self, t: f64, kind: AlertKind, confidence: f32) -> bool {
        if !self.enabled(kind) {
            return false;
        }
        let slot = kind.slot();
        if let Some(last) = self.last_sent[slot] {
            if t - last < self.cooldown_s {
                tracing::debug!(kind = ?kind, since = t - last, "alert suppressed by cooldown");
                return false;
            }
        }
        self.last_sent[slot] = Some(t);
        tracing::info!(kind = ?kind, confidence, "dispatching alert");
        self.dispatcher.dispatch(Alert::new(kind, confidence));
        true
    }

    /// 状態遷移（新状態）に応じて通知する
    pub fn on_transition(&mut self, t: f64, entered: FallState, confidence: f32) -> Option<AlertKind> {
        let kind = AlertKind::for_state(entered)?;
        self.maybe_notify(t, kind, confidence).then_some(kind)
    }

    pub fn delivery_failed(&self) -> bool {
        self.dispatcher.delivery_failed()
    }

    /// クールダウン履歴を消去
    pub fn reset(&mut self) {
        self.last_sent = [None; 2];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;

    /// 配信されたアラートを記録する
    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Alert>>>);

    impl AlertDispatch for Recorder {
        fn dispatch(&mut self, alert: Alert) {
            self.0.lock().unwrap().push(alert);
        }

        fn delivery_failed(&self) -> bool {
            false
        }
    }

    struct FailingSink;

    impl AlertSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn send(&mut self, _alert: &Alert) -> Result<()> {
            Err(anyhow!("network unreachable"))
        }
    }

    fn notifier(config: &NotifyConfig) -> (Notifier, Recorder) {
        let recorder = Recorder::default();
        (Notifier::new(config, Box::new(recorder.clone())), recorder)
    }

    #[test]
    fn test_cooldown_suppresses_second_emergency() {
        let (mut n, rec) = notifier(&NotifyConfig::default());
        assert_eq!(n.on_transition(10.0, FallState::Emergency, 0.6), Some(AlertKind::Fall));
        assert_eq!(n.on_transition(40.0, FallState::Emergency, 0.85), None);
        assert_eq!(rec.0.lock().unwrap().len(), 1);

        assert_eq!(n.on_transition(70.0, FallState::Emergency, 0.6), Some(AlertKind::Fall));
        assert_eq!(rec.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_channels_cool_down_independently() {
        let (mut n, rec) = notifier(&NotifyConfig::default());
        assert!(n.maybe_notify(0.0, AlertKind::Fall, 0.6));
        assert!(n.maybe_notify(1.0, AlertKind::Help, 0.0));
        assert!(!n.maybe_notify(2.0, AlertKind::Help, 0.0));
        let kinds: Vec<AlertKind> = rec.0.lock().unwrap().iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::Fall, AlertKind::Help]);
    }

    #[test]
    fn test_safe_states_do_not_notify() {
        let (mut n, rec) = notifier(&NotifyConfig::default());
        assert_eq!(n.on_transition(0.0, FallState::Safe, 0.0), None);
        assert_eq!(n.on_transition(0.0, FallState::SafeSleeping, 0.0), None);
        assert!(rec.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_disabled_channel() {
        let config = NotifyConfig {
            fall_enabled: false,
            ..NotifyConfig::default()
        };
        let (mut n, rec) = notifier(&config);
        assert!(!n.maybe_notify(0.0, AlertKind::Fall, 0.9));
        assert!(n.maybe_notify(0.0, AlertKind::Help, 0.0));
        assert_eq!(rec.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_alert_message() {
        assert_eq!(
            Alert::new(AlertKind::Fall, 0.6).message,
            "EMERGENCY: fall detected (confidence 60%)"
        );
        assert_eq!(Alert::new(AlertKind::Help, 0.0).message, "HELP: waving gesture detected");
    }

    #[test]
    fn test_threaded_dispatcher_reports_failure() {
        let mut dispatcher = ThreadedDispatcher::start(vec![Box::new(LogSink), Box::new(FailingSink)]);
        assert!(!dispatcher.delivery_failed());
        dispatcher.dispatch(Alert::new(AlertKind::Help, 0.0));
        dispatcher.shutdown();
        assert!(dispatcher.delivery_failed());
    }

    #[test]
    fn test_jsonl_alert_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        let mut dispatcher = ThreadedDispatcher::start(vec![Box::new(JsonlAlertLog::new(&path))]);
        dispatcher.dispatch(Alert::new(AlertKind::Fall, 0.85));
        dispatcher.dispatch(Alert::new(AlertKind::Help, 0.0));
        dispatcher.shutdown();
        assert!(!dispatcher.delivery_failed());

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "fall");
        assert_eq!(lines[1]["kind"], "help");
    }
}
