use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use carewatch::config::Config;
use carewatch::exercise::ExerciseCatalog;
use carewatch::pose::{Frame, Keypoint, Landmark, StreamSpace};
use carewatch::session::Session;

const CONFIG_PATH: &str = "config.toml";

const USAGE: &str = "Usage: carewatch <frames.jsonl|-> [--config PATH] [--exercise KEY] \
[--workout KEY:REPS,...] [--no-fall] [--no-rehab]";

struct Args {
    input: String,
    config: String,
    exercise: Option<String>,
    workout: Vec<(String, u32)>,
    fall: bool,
    rehab: bool,
    help: bool,
}

fn parse_workout(list: &str) -> Result<Vec<(String, u32)>> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|item| {
            let (key, reps) = item
                .split_once(':')
                .with_context(|| format!("workout entry must be KEY:REPS, got {item:?}"))?;
            let reps = reps
                .trim()
                .parse()
                .with_context(|| format!("invalid rep count in {item:?}"))?;
            Ok((key.trim().to_string(), reps))
        })
        .collect()
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut parsed = Args {
        input: String::new(),
        config: CONFIG_PATH.to_string(),
        exercise: None,
        workout: Vec::new(),
        fall: true,
        rehab: true,
        help: false,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => parsed.config = args.next().context(USAGE)?,
            "--exercise" => parsed.exercise = Some(args.next().context(USAGE)?),
            "--workout" => parsed.workout = parse_workout(&args.next().context(USAGE)?)?,
            "--no-fall" => parsed.fall = false,
            "--no-rehab" => parsed.rehab = false,
            "-h" | "--help" => {
                parsed.help = true;
                return Ok(parsed);
            }
            s if s.starts_with("--") => bail!("unknown option {s}\n{USAGE}"),
            _ if parsed.input.is_empty() => parsed.input = arg,
            _ => bail!(USAGE),
        }
    }
    if parsed.input.is_empty() {
        bail!(USAGE);
    }
    Ok(parsed)
}

/// 入力1行。ピクセル座標の名前付きキーポイントか、正規化33点ランドマークのどちらか
#[derive(Deserialize)]
struct FrameLine {
    t: f64,
    #[serde(default)]
    keypoints: BTreeMap<String, Keypoint>,
    #[serde(default)]
    landmarks: Vec<Keypoint>,
}

impl FrameLine {
    fn into_frame(self, space: &StreamSpace) -> Frame {
        if !self.landmarks.is_empty() {
            return space.frame_from_normalized(&self.landmarks);
        }
        self.keypoints
            .into_iter()
            .filter_map(|(name, kp)| match Landmark::from_name(&name) {
                Some(landmark) => Some((landmark, kp)),
                None => {
                    tracing::debug!(name = %name, "ignoring unknown keypoint");
                    None
                }
            })
            .collect()
    }
}

fn print_help(catalog: &ExerciseCatalog) {
    println!("{USAGE}\n\nExercises:");
    for (key, definition) in catalog.iter() {
        println!("  {key:<20} {}", definition.name);
    }
}

fn open_input(path: &str) -> Result<Box<dyn BufRead>> {
    if path == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).with_context(|| format!("failed to open {path}"))?;
    Ok(Box::new(BufReader::new(file)))
}

fn main() -> Result<()> {
    // stdout はフレームごとのJSON専用。ログは stderr へ
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    tracing::info!(version = env!("GIT_VERSION"), "carewatch replay");

    let args = parse_args()?;
    let config = Config::load_or_default(&args.config);
    if args.help {
        print_help(&ExerciseCatalog::builtin().with_overrides(&config.exercises));
        return Ok(());
    }
    let mut session = Session::new(config);
    session.set_fall_enabled(args.fall);
    session.set_rehab_enabled(args.rehab);

    if let Some(key) = &args.exercise {
        if !session.select_exercise(key)? {
            let available: Vec<&str> = session.catalog().keys().collect();
            tracing::warn!(exercise = %key, ?available, "exercise not in catalog");
        }
    }
    for (key, reps) in &args.workout {
        session.add_to_workout(key, *reps)?;
    }
    let mut workout_pending = !args.workout.is_empty();

    let input = open_input(&args.input)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut frames = 0u64;
    let mut skipped = 0u64;

    for (lineno, line) in input.lines().enumerate() {
        let line = line.context("failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: FrameLine = match serde_json::from_str(&line) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(line = lineno + 1, error = %e, "skipping malformed frame");
                skipped += 1;
                continue;
            }
        };
        let t = parsed.t;
        if workout_pending {
            session.start_workout(t)?;
            workout_pending = false;
        }
        let frame = parsed.into_frame(session.space());
        let report = session.process_frame(t, &frame);
        serde_json::to_writer(&mut out, &report)?;
        out.write_all(b"\n")?;
        frames += 1;
    }
    out.flush()?;

    tracing::info!(
        frames,
        skipped,
        fall_state = ?session.fall_state(),
        workout_phase = ?session.workout().phase(),
        "replay finished"
    );
    session.stop();
    Ok(())
}
