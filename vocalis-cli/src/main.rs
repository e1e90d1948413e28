// vocalis command line interface
// Runs one request end to end and prints results and commands as JSON lines

use anyhow::{anyhow, Context};
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vocalis_core::{AudioFormat, CapabilityFlags, Emotion, SynthesisRequest, SynthesisResult};
use vocalis_me::{AnimationCommand, AnimationSyncEngine, VocalisConfig};
use vocalis_sc::{AudioEnhancer, EnhancementProfile, VisemeAnalyzer};

#[derive(Parser)]
#[command(name = "vocalis")]
#[command(about = "Speech synthesis with synchronized avatar animation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize text and print the result and animation commands
    Synthesize {
        #[arg(long)]
        text: String,

        /// BCP-47 language code
        #[arg(long, default_value = "ko")]
        language: String,

        /// Provider to try first
        #[arg(long)]
        provider: Option<String>,

        #[arg(long)]
        voice: Option<String>,

        /// Emotion hint (joy, sadness, anger, fear, surprise, calm, mystic, neutral)
        #[arg(long)]
        emotion: Option<String>,

        /// Context tags for motion rules (repeatable)
        #[arg(long)]
        context: Vec<String>,

        #[arg(long, default_value = "cli")]
        session: String,

        /// Pace commands against wall-clock time instead of printing them at once
        #[arg(long)]
        stream: bool,

        /// Write the delivered audio to this file
        #[arg(long, short)]
        output: Option<PathBuf>,

        #[arg(long)]
        no_lip_sync: bool,

        #[arg(long)]
        no_expressions: bool,

        #[arg(long)]
        no_motions: bool,
    },

    /// List catalog providers with credential and health state
    Providers {
        #[arg(long, default_value = "ko")]
        language: String,
    },

    /// Enhance a local WAV file and print its viseme frames
    Analyze {
        #[arg(long)]
        wav: PathBuf,

        #[arg(long, default_value = "ko")]
        language: String,

        #[arg(long, value_enum, default_value = "full")]
        profile: ProfileArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProfileArg {
    Full,
    Light,
    Off,
}

impl From<ProfileArg> for EnhancementProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Full => EnhancementProfile::Full,
            ProfileArg::Light => EnhancementProfile::Light,
            ProfileArg::Off => EnhancementProfile::Off,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs);

    let config = VocalisConfig::load(cli.config.as_deref()).context("loading configuration")?;

    let outcome = match cli.command {
        Commands::Synthesize {
            text,
            language,
            provider,
            voice,
            emotion,
            context,
            session,
            stream,
            output,
            no_lip_sync,
            no_expressions,
            no_motions,
        } => {
            let mut request = SynthesisRequest::new(session, "cli", text, language).with_capabilities(CapabilityFlags {
                lip_sync: !no_lip_sync,
                expressions: !no_expressions,
                motions: !no_motions,
            });
            if let Some(provider) = provider {
                request = request.with_provider(provider);
            }
            if let Some(voice) = voice {
                request = request.with_voice(voice);
            }
            if let Some(emotion) = emotion {
                let emotion = Emotion::parse(&emotion).ok_or_else(|| anyhow!("unknown emotion '{}'", emotion))?;
                request = request.with_emotion(emotion);
            }
            for tag in context {
                request = request.with_context(tag);
            }
            synthesize(config, request, stream, output.as_deref()).await
        }
        Commands::Providers { language } => list_providers(config, &language),
        Commands::Analyze { wav, language, profile } => analyze(config, &wav, &language, profile.into()).await,
    };

    if let Err(ref e) = outcome {
        error!(error = %e, "Command failed");
    }
    outcome
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_line(value: &serde_json::Value) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    stdout.write_all(b"\n")?;
    stdout.flush()?;
    Ok(())
}

fn print_command(command: &AnimationCommand) -> anyhow::Result<()> {
    print_line(&serde_json::to_value(command)?)
}

/// Result metadata without audio or viseme payloads
fn result_summary(result: &SynthesisResult) -> serde_json::Value {
    json!({
        "type": "result",
        "provider": result.provider,
        "voice": result.voice,
        "format": result.format.extension(),
        "duration": result.duration,
        "duration_source": result.duration_source,
        "latency_ms": result.latency.as_millis() as u64,
        "attempts": result.attempts,
        "cost": result.cost,
        "audio_bytes": result.audio.len(),
        "viseme_frames": result.visemes.as_ref().map(Vec::len),
    })
}

async fn synthesize(
    config: VocalisConfig,
    request: SynthesisRequest,
    stream: bool,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let engine = Arc::new(AnimationSyncEngine::builder(config).build()?);

    let result = if stream {
        let (mut rx, handle) = engine.stream_channel(request);
        while let Some(command) = rx.recv().await {
            print_command(&command)?;
        }
        let streamed = handle.await??;
        print_line(&json!({ "type": "stream", "outcome": streamed.outcome }))?;
        print_line(&result_summary(&streamed.output.result))?;
        streamed.output.result
    } else {
        let animated = engine.process(&request).await?;
        let mut summary = result_summary(&animated.result);
        summary["emotion"] = serde_json::to_value(&animated.emotion)?;
        summary["enhancement"] = serde_json::to_value(&animated.enhancement)?;
        print_line(&summary)?;
        for command in &animated.commands {
            print_command(command)?;
        }
        animated.result
    };

    if let Some(path) = output {
        std::fs::write(path, &result.audio).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), bytes = result.audio.len(), "Audio written");
    }
    Ok(())
}

fn list_providers(config: VocalisConfig, language: &str) -> anyhow::Result<()> {
    let engine = AnimationSyncEngine::builder(config).build()?;
    for status in engine.provider_status(language) {
        print_line(&serde_json::to_value(&status)?)?;
    }
    Ok(())
}

async fn analyze(config: VocalisConfig, path: &Path, language: &str, profile: EnhancementProfile) -> anyhow::Result<()> {
    let audio = Bytes::from(std::fs::read(path).with_context(|| format!("reading {}", path.display()))?);
    if AudioFormat::sniff(&audio) != Some(AudioFormat::Wav) {
        return Err(anyhow!("{} is not a WAV file", path.display()));
    }

    let enhancer = AudioEnhancer::new(config.enhancement)?;
    let analyzer = VisemeAnalyzer::new(config.analysis)?;
    let language = language.to_string();

    let (clip, analysis) = tokio::task::spawn_blocking(move || {
        let clip = enhancer.process_clip(&audio, AudioFormat::Wav, profile);
        let analysis = clip
            .samples
            .as_ref()
            .map(|samples| analyzer.analyze(samples, clip.sample_rate, Some(&language)));
        (clip, analysis)
    })
    .await?;

    let analysis = analysis.ok_or_else(|| anyhow!("could not decode {}", path.display()))?;
    print_line(&json!({
        "type": "analysis",
        "duration": clip.duration,
        "sample_rate": clip.sample_rate,
        "enhancement": clip.report,
        "frames": analysis.frames.len(),
        "lpc_frames": analysis.lpc_frames,
        "fallback_frames": analysis.fallback_frames,
        "silence_frames": analysis.silence_frames,
        "failed_frames": analysis.failed_frames,
    }))?;
    for frame in &analysis.frames {
        print_line(&serde_json::to_value(frame)?)?;
    }
    Ok(())
}
