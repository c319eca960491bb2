//! Command-line front end for offline voice cloning.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};

use voiceclone_rs::engines::command::CommandEngineLoader;
use voiceclone_rs::{ClonerConfig, Effects, Emotion, GenerationRequest, Result, VoiceCloner};

#[derive(Parser, Debug)]
#[command(name = "voiceclone")]
#[command(version, about = "Clone a voice from a reference recording and speak new text with it")]
struct Cli {
    /// Directory holding models, speaker embeddings and default outputs
    #[arg(long, short = 'd', global = true, env = "VOICECLONE_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Generator program implementing the engine protocol
    #[arg(long, global = true, env = "VOICECLONE_ENGINE", default_value = "voiceclone-generator")]
    engine: PathBuf,

    /// Extra arguments passed to the generator before its subcommand
    #[arg(long = "engine-arg", global = true, allow_hyphen_values = true)]
    engine_args: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a voice identity extracted from a reference recording
    Extract {
        /// Reference audio (wav, mp3, ogg, flac)
        #[arg(long = "ref")]
        reference: PathBuf,
        /// Identity id; generated when omitted
        #[arg(long)]
        id: Option<String>,
    },
    /// Synthesize text in a stored or freshly extracted voice
    Generate(GenerateArgs),
    /// List stored voice identities
    List,
    /// Load the generation engine and exit
    Prepare,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Text to speak
    #[arg(long)]
    text: String,
    /// Stored identity id
    #[arg(long, required_unless_present = "reference")]
    speaker: Option<String>,
    /// Reference audio to clone from
    #[arg(long = "ref")]
    reference: Option<PathBuf>,
    /// Language code (en, fr, es, de, ...)
    #[arg(long)]
    lang: Option<String>,
    /// Sampling temperature, 0.0–1.0
    #[arg(long)]
    temperature: Option<f32>,
    /// Emotion: neutral, happy, sad, angry, surprised, excited, concerned
    #[arg(long)]
    emotion: Option<Emotion>,
    /// Sprinkle laughter between sentences
    #[arg(long)]
    laughter: bool,
    /// Sprinkle breathing between sentences
    #[arg(long)]
    breathing: bool,
    /// Output WAV path
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => ClonerConfig::from_json_file(path)?,
        None => ClonerConfig::default(),
    };
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }

    let loader = CommandEngineLoader::new(cli.engine).with_args(cli.engine_args);
    let cloner = VoiceCloner::new(config, loader);

    match cli.command {
        Command::Extract { reference, id } => {
            let identity = cloner.extract_identity(&reference, id.as_deref())?;
            println!("{}", identity.id);
        }
        Command::Generate(args) => {
            let request = GenerationRequest {
                text: args.text,
                speaker_id: args.speaker,
                reference_audio: args.reference,
                language: args.lang,
                temperature: args.temperature,
                effects: Effects {
                    emotion: args.emotion,
                    laughter: args.laughter,
                    breathing: args.breathing,
                },
                output_path: args.output,
            };
            let start = Instant::now();
            let path = cloner.generate(&request)?;
            println!("{}", path.display());
            log::info!("Done in {:.2?}", start.elapsed());
        }
        Command::List => {
            let ids = cloner.list_identities()?;
            if ids.is_empty() {
                log::info!(
                    "No voice identities in {}",
                    cloner.config().speaker_embeddings_dir().display()
                );
            }
            for id in ids {
                println!("{id}");
            }
        }
        Command::Prepare => {
            let handle = cloner.prepare()?;
            println!("engine ready ({}Hz)", handle.sample_rate());
        }
    }
    Ok(())
}
