//! CPR Coach terminal front end
//!
//! Runs one coaching session. Every line typed on stdin is treated as a final
//! voice transcript ("start cpr", "next", "stop", ...). Spoken instructions are
//! logged and echoed, the metronome click is printed as a running count.
//! Ctrl-C closes the session.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use cpr_coach::{
    ClickSink, CoachConfig, CoachNotice, CoachOrchestrator, CoachPorts, InhibitWakeLock, LineRecognizer, LogSpeech,
    NoopWakeLock, PrintClick, SilentClick, SpeechBackend, Step, TokioClock, UnsupportedWakeLock, WakeLockProvider,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cpr-coach", version)]
#[command(about = "Guided CPR coaching in the terminal", long_about = None)]
struct Args {
    /// Config file (TOML). Defaults to config/coach.toml when present.
    #[arg(long, env = "CPR_COACH_CONFIG")]
    config: Option<PathBuf>,

    /// Start with spoken instructions and the click turned off
    #[arg(long)]
    mute: bool,

    /// Do not treat stdin lines as voice commands until re-armed
    #[arg(long)]
    no_listen: bool,

    /// Print every notice as a JSON line on stdout
    #[arg(long)]
    json: bool,

    /// How to keep the display awake
    #[arg(long, value_enum, default_value = "noop")]
    wake_lock: WakeLockMode,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum WakeLockMode {
    Noop,
    Inhibit,
    #[value(name = "none")]
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[cpr-coach] .env not loaded: {} (using system environment)", e);
    }

    let args = Args::parse();

    // Logs go to stderr so stdout stays clean for --json.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match &args.config {
        Some(path) => CoachConfig::load_from(Some(path.as_path())),
        None => CoachConfig::load(),
    }
    .context("loading coach config")?;
    if args.mute {
        config.audio_enabled = false;
    }
    if args.no_listen {
        config.listening_enabled = false;
    }
    config.validate().context("invalid coach config")?;

    let clock = TokioClock::from_current().context("binding clock to runtime")?;
    let (speech, click) = output_ports(&config, args.json);
    let wake_lock: Arc<dyn WakeLockProvider> = match args.wake_lock {
        WakeLockMode::Noop => Arc::new(NoopWakeLock),
        WakeLockMode::Inhibit => Arc::new(InhibitWakeLock::new()),
        WakeLockMode::Off => Arc::new(UnsupportedWakeLock),
    };
    let ports = CoachPorts {
        clock: Arc::new(clock),
        speech,
        click,
        recognizer: Box::new(LineRecognizer::stdin()),
        wake_lock,
    };

    let mut coach = CoachOrchestrator::new(config, ports).context("creating coach")?;
    let notices = coach
        .take_notice_receiver()
        .context("notice receiver already taken")?;
    let printer = tokio::spawn(print_notices(notices, args.json));

    if !args.json {
        println!("🫀 CPR coach ready. Type a command and press Enter:");
        println!("   start cpr | stop | next | back | repeat | call 911 | help   (Ctrl-C to quit)");
    }
    tracing::info!(json = args.json, wake_lock = ?args.wake_lock, "CPR coach started");

    coach
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("CTRL-C received; closing session");
        })
        .await;

    // Dropping the orchestrator closes the notice channel and ends the printer.
    drop(coach);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "notice printer failed");
    }
    Ok(())
}

#[cfg(not(feature = "audio"))]
fn output_ports(_config: &CoachConfig, json: bool) -> (Box<dyn SpeechBackend>, Box<dyn ClickSink>) {
    text_ports(json)
}

#[cfg(feature = "audio")]
fn output_ports(config: &CoachConfig, json: bool) -> (Box<dyn SpeechBackend>, Box<dyn ClickSink>) {
    use cpr_coach::{AudioOutput, HttpTts, PlaybackSpeech, ToneClick, TtsBackend};

    let output = match AudioOutput::open_default() {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(error = %e, "no audio output; falling back to text");
            return text_ports(json);
        }
    };
    let click: Box<dyn ClickSink> = Box::new(ToneClick::new(output.clone(), config.click_settings()));
    if std::env::var("CPR_COACH_TTS_KEY").is_err() {
        tracing::info!("CPR_COACH_TTS_KEY not set; instructions are printed, not spoken");
        return (text_ports(json).0, click);
    }
    let speech: Box<dyn SpeechBackend> =
        match PlaybackSpeech::spawn(output, || Ok(Box::new(HttpTts::from_env()?) as Box<dyn TtsBackend>)) {
            Ok(speech) => Box::new(speech),
            Err(e) => {
                tracing::warn!(error = %e, "TTS unavailable; instructions are printed, not spoken");
                text_ports(json).0
            }
        };
    (speech, click)
}

fn text_ports(json: bool) -> (Box<dyn SpeechBackend>, Box<dyn ClickSink>) {
    if json {
        (Box::new(LogSpeech::new()), Box::new(SilentClick))
    } else {
        (Box::new(LogSpeech::stdout()), Box::new(PrintClick))
    }
}

async fn print_notices(mut notices: mpsc::UnboundedReceiver<CoachNotice>, json: bool) {
    let mut last_view: Option<(Step, bool, u32)> = None;
    while let Some(notice) = notices.recv().await {
        if json {
            match serde_json::to_string(&notice) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!(error = %e, "notice not serializable"),
            }
            continue;
        }
        match notice {
            CoachNotice::StateChanged { snapshot, .. } => {
                let view = (snapshot.state.current_step, snapshot.state.is_active, snapshot.state.cycle_count);
                if last_view == Some(view) {
                    continue;
                }
                last_view = Some(view);
                let status = snapshot.headline.unwrap_or("ready");
                println!("\n📋 {}  [{}]  cycle {}", snapshot.title, status, snapshot.display_cycle);
                if !snapshot.state.is_active {
                    let text = cpr_coach::StepInstructions::for_step(snapshot.state.current_step);
                    println!("{}\n{}", text.visual, text.bullets());
                }
            }
            CoachNotice::Spoke { .. } => {}
            CoachNotice::DialRequested { number } => println!("\n📞 Dial {} now", number),
            CoachNotice::CapabilityUnavailable { capability } => println!("\n⚠️ {} unavailable", capability),
            CoachNotice::ListeningChanged { listening } => {
                println!("\n🎙️ Commands {}", if listening { "on" } else { "off" })
            }
            CoachNotice::RecognitionGaveUp { failures } => {
                println!("\n🎙️ Command input stopped after {} failures", failures)
            }
            CoachNotice::Closed => println!("\n👋 Session closed"),
        }
    }
}
