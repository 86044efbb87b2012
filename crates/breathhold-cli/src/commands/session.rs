use std::io::BufRead;
use std::sync::Arc;

use breathhold_core::{
    AudioSink, Config, Database, Event, ExperienceLevel, Phase, ProgramCatalog, RunnerConfig,
    SafetyContext, SessionEngine, SessionHandle, SessionRunner, Severity, SilentAudioSink,
    StartDecision, TrainingProgram, TrainingSessionResult,
};
use chrono::Utc;
use clap::Subcommand;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

/// Session time per unit of real time with `--fast`.
const FAST_TIME_SCALE: u32 = 10;

#[derive(Subcommand)]
pub enum SessionAction {
    /// Run a program interactively
    ///
    /// Keys (followed by Enter): empty line or h = release hold, p = pause,
    /// r = resume, d [severity] [note] = report discomfort, s = stop,
    /// e or q = emergency stop.
    Run {
        /// Program ID
        program_id: String,
        /// Experience level (defaults to config)
        #[arg(long)]
        level: Option<ExperienceLevel>,
        /// Run all timers ten times faster
        #[arg(long)]
        fast: bool,
    },
    /// Check whether a program may start now
    Check {
        /// Program ID
        program_id: String,
        /// Experience level (defaults to config)
        #[arg(long)]
        level: Option<ExperienceLevel>,
    },
}

#[derive(Serialize)]
struct CheckReport {
    program_id: String,
    level: ExperienceLevel,
    approved: bool,
    reason: Option<String>,
    safety_ceiling_secs: u64,
}

/// Prints spoken instructions to the terminal.
struct ConsoleAudioSink;

impl AudioSink for ConsoleAudioSink {
    fn speak(&mut self, instruction: &str) {
        println!("  >> {instruction}");
    }

    fn stop_all(&mut self) {}
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SessionAction::Run {
            program_id,
            level,
            fast,
        } => run_session(&program_id, level, fast),
        SessionAction::Check { program_id, level } => check(&program_id, level),
    }
}

fn check(program_id: &str, level: Option<ExperienceLevel>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let program = ProgramCatalog::builtin().require(program_id)?;
    let level = level.unwrap_or_else(|| config.experience_level());
    let db = Database::open()?;
    let now = Utc::now();
    let history = db.user_history(now)?;

    let policy = config.safety_policy();
    let decision = policy.validate_can_start_session(&history, level, &program, now);
    let report = CheckReport {
        program_id: program.id.clone(),
        level,
        approved: decision.is_approved(),
        reason: match decision {
            StartDecision::Approved => None,
            StartDecision::Denied(reason) => Some(reason.to_string()),
        },
        safety_ceiling_secs: policy.max_allowed_hold(level, &program).as_secs(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_session(
    program_id: &str,
    level: Option<ExperienceLevel>,
    fast: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let program = ProgramCatalog::builtin().require(program_id)?;
    let level = level.unwrap_or_else(|| config.experience_level());
    let db = Database::open()?;
    let history = db.user_history(Utc::now())?;

    let audio: Box<dyn AudioSink> = if config.audio.enabled {
        Box::new(ConsoleAudioSink)
    } else {
        Box::new(SilentAudioSink)
    };
    let mut engine = SessionEngine::new(config.safety_policy(), audio, Box::new(db))
        .with_countdown_cues(config.audio.countdown_cues);
    let snapshot = engine.create_session(program.clone(), SafetyContext::new(level, history))?;
    print_intro(&program, snapshot.safety_ceiling_ms);

    let mut runner_config = config.runner_config();
    if fast {
        runner_config.time_scale = FAST_TIME_SCALE;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(drive(engine, runner_config))?;

    match result {
        Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
        None => return Err("session ended without a result".into()),
    }
    Ok(())
}

fn print_intro(program: &Arc<TrainingProgram>, ceiling_ms: u64) {
    println!("{} ({} rounds, {})", program.name, program.total_rounds, program.progression.describe());
    println!("Safety ceiling: {}s per hold", ceiling_ms / 1000);
    for note in &program.safety_notes {
        println!("  ! {note}");
    }
    println!("Enter = release hold, p = pause, r = resume, d = discomfort, s = stop, e = emergency stop");
}

async fn drive(
    engine: SessionEngine,
    config: RunnerConfig,
) -> Result<Option<TrainingSessionResult>, Box<dyn std::error::Error>> {
    let runner = SessionRunner::spawn(engine, config)?;
    let handle = runner.handle();
    let mut events = handle.subscribe();
    let mut input = spawn_stdin_reader();

    handle.start().await?;

    let mut input_open = true;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    print_event(&event);
                    if matches!(event, Event::SessionFinalized { .. }) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event display fell behind");
                    if handle.snapshot().is_some_and(|s| s.phase.is_terminal()) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            line = input.recv(), if input_open => match line {
                Some(line) => apply_key(&handle, &line).await,
                None => input_open = false,
            },
        }
    }

    drop(handle);
    Ok(runner.finished().await)
}

/// Reads stdin on a plain thread; a pending blocking read must not hold up
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn apply_key(handle: &SessionHandle, line: &str) {
    let mut parts = line.trim().splitn(3, ' ');
    let key = parts.next().unwrap_or("");
    let outcome = match key {
        "" | "h" => handle.complete_hold().await.map(|_| ()),
        "p" => handle.pause().await,
        "r" => handle.resume().await,
        "d" => {
            let severity = match parts.next().map(str::parse::<Severity>) {
                Some(Ok(severity)) => severity,
                Some(Err(e)) => {
                    eprintln!("! {e}");
                    return;
                }
                None => Severity::Medium,
            };
            let note = parts.next().map(str::to_string);
            handle.report_discomfort(severity, note).await.map(|_| ())
        }
        "s" => {
            handle.stop().await;
            Ok(())
        }
        "e" | "q" => {
            handle.emergency_stop().await;
            Ok(())
        }
        other => {
            eprintln!("! unknown key '{other}'");
            return;
        }
    };
    if let Err(e) = outcome {
        eprintln!("! {e}");
    }
}

fn print_event(event: &Event) {
    match event {
        Event::PhaseChanged {
            to,
            round,
            duration_ms,
            ..
        } => match (to, duration_ms) {
            (Phase::Complete | Phase::EmergencyStopped, _) => {}
            (_, Some(ms)) => println!("[round {}] {to} ({}s)", round + 1, ms / 1000),
            (_, None) => println!("[round {}] {to}", round + 1),
        },
        Event::HoldTargetReached { target_ms, .. } => {
            println!("  target of {}s reached", target_ms / 1000);
        }
        Event::SessionPaused { phase, .. } => println!("paused during {phase}"),
        Event::SessionResumed { phase, .. } => println!("resumed {phase}"),
        Event::SafetyEventRecorded { event, .. } => {
            println!("  safety: {:?} ({:?})", event.event_type, event.severity);
        }
        Event::SessionFinalized {
            reason, message, ..
        } => println!("{message} [{reason}]"),
        Event::SessionCreated { .. } => {}
    }
}
