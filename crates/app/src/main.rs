use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mindbeat_core::{
    is_exit_command, AppConfig, ChatSession, Collaborators, ControlLoop, ConversationState,
    EmotionClassifier, EmotionSampler, LoopSettings, PlaybackDispatcher,
};
use tracing_subscriber::EnvFilter;

mod camera;
mod http;
mod speaker;

use camera::{Camera, CameraFrame, Window};
use http::{CompletionClient, HttpEmotionClassifier, IpInfoLocator, OverpassDirectory};
use speaker::Speaker;

fn main() -> mindbeat_core::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run { camera: None }) {
        Commands::Run { camera } => run_live(config, camera),
        Commands::Chat => run_chat(&config),
    }
}

fn run_live(mut config: AppConfig, camera: Option<i32>) -> mindbeat_core::Result<()> {
    if let Some(index) = camera {
        config.capture.camera_index = index;
    }
    tracing::info!(camera = config.capture.camera_index, "starting MindBeat");

    let camera = match Camera::open(config.capture.camera_index) {
        Ok(camera) => camera,
        Err(err) => {
            tracing::error!(error = %err, "cannot open webcam");
            return Ok(());
        }
    };
    let window = Window::open(&config.capture.window_title)?;

    let classifier: Box<dyn EmotionClassifier<CameraFrame>> =
        Box::new(HttpEmotionClassifier::new(&config.classifier)?);
    let services = Collaborators {
        classifier,
        playback: PlaybackDispatcher::new(Speaker, config.session.playback_policy),
        locator: Box::new(IpInfoLocator::new(&config.network)?),
        providers: Box::new(OverpassDirectory::new(&config.network)?),
        console: Box::new(std::io::stdout()),
    };

    let control = ControlLoop::new(
        camera,
        window,
        EmotionSampler::new(config.sampler.debounce()),
        services,
        LoopSettings::from_config(&config),
    );
    let exit = control.run();
    tracing::info!(?exit, "MindBeat stopped");
    Ok(())
}

fn run_chat(config: &AppConfig) -> mindbeat_core::Result<()> {
    let backend = CompletionClient::new(&config.chat)?;
    let mut session = ChatSession::new(
        backend,
        ConversationState::new(config.chat.history_exchanges),
    );

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut line = String::new();
    loop {
        write!(stdout, "You: ")?;
        stdout.flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 || is_exit_command(&line) {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        match session.send(&line) {
            Ok(reply) => writeln!(stdout, "Neurox: {reply}")?,
            Err(err) => {
                tracing::warn!(error = %err, "chat request failed");
                writeln!(stdout, "Neurox is unavailable right now ({err}).")?;
            }
        }
    }
    Ok(())
}

/// Reads `RUST_LOG`, so `.env` must already be loaded.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Emotion-aware binaural beat companion", long_about = None)]
struct Cli {
    /// Optional TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the webcam and play binaural sessions on demand (default).
    Run {
        /// Camera index to open instead of the configured one.
        #[arg(long)]
        camera: Option<i32>,
    },
    /// Talk to the support chatbot from the terminal.
    Chat,
}
