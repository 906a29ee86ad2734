use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use speech_delivery::{
    FileAudioOutput, HdVoice, SpeakOutcome, SpeechConfig, SpeechManager, VoiceConfig,
    VoiceSelectionMode,
};

/// Speech delivery - HD voice synthesis with caching, retry and fallback
#[derive(Parser, Debug)]
#[command(name = "speech-delivery")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory that receives synthesized audio files
    #[arg(short = 'o', long = "out", default_value = "speech-out")]
    out: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Clone)]
struct VoiceArgs {
    /// HD voice id (alloy, ash, coral, echo, fable, nova, onyx, sage, shimmer)
    #[arg(long)]
    voice: Option<String>,

    /// Speaking rate multiplier
    #[arg(long, default_value_t = 1.0)]
    rate: f32,

    /// Tone instructions forwarded to the backend
    #[arg(long)]
    instructions: Option<String>,

    /// BCP-47 language tag
    #[arg(long)]
    language: Option<String>,
}

impl VoiceArgs {
    fn to_voice_config(&self, config: &SpeechConfig) -> VoiceConfig {
        let mut voice = config.default_voice_config().with_rate(self.rate);
        if let Some(id) = &self.voice {
            voice.voice = HdVoice::from_str_or_default(id).as_str().to_string();
        }
        if let Some(instructions) = &self.instructions {
            voice = voice.with_instructions(instructions.clone());
        }
        if let Some(language) = &self.language {
            voice = voice.with_language(language.clone());
        }
        voice
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synthesize text and write the audio to the output directory
    Speak {
        text: String,

        /// auto, network-only or local-only
        #[arg(short = 'm', long = "mode", default_value = "auto")]
        mode: String,

        #[command(flatten)]
        voice: VoiceArgs,
    },

    /// Warm the cache for one or more phrases
    Preload {
        #[arg(required = true)]
        texts: Vec<String>,

        #[command(flatten)]
        voice: VoiceArgs,
    },

    /// List the HD voices
    Voices,

    /// Print an availability report as JSON
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = if let Some(config_path) = &cli.config {
        info!("Loading configuration from {}", config_path.display());
        SpeechConfig::from_file(config_path)?
    } else {
        SpeechConfig::from_env()?
    };

    if let Commands::Voices = cli.command {
        for voice in HdVoice::all() {
            let descriptor = voice.descriptor();
            println!("{:<8} {:<8} {}", descriptor.id, descriptor.name, descriptor.description);
        }
        return Ok(());
    }

    let output = Arc::new(FileAudioOutput::new(&cli.out));
    let manager = SpeechManager::builder(&config, output.clone())
        .build()
        .context("Failed to initialize speech manager")?;

    match cli.command {
        Commands::Speak { text, mode, voice } => {
            let mode = VoiceSelectionMode::from_str_or_default(&mode);
            let voice = voice.to_voice_config(&config);
            match manager.speak(&text, &voice, mode).await {
                Ok(SpeakOutcome::Finished) => {
                    for path in output.written() {
                        println!("{}", path.display());
                    }
                }
                Ok(SpeakOutcome::Superseded) => println!("superseded"),
                Err(e) => return Err(anyhow!("{} ({e})", e.user_message())),
            }
        }
        Commands::Preload { texts, voice } => {
            let voice = voice.to_voice_config(&config);
            let mut failed = 0;
            for text in &texts {
                let cached = manager.preload(text, &voice).await;
                println!("{} {text}", if cached { "cached " } else { "failed " });
                if !cached {
                    failed += 1;
                }
            }
            if failed > 0 {
                anyhow::bail!("{failed} of {} phrases could not be preloaded", texts.len());
            }
        }
        Commands::Check => {
            let report = manager.check_availability();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Voices => {}
    }

    Ok(())
}
