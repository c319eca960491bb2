//! Subprocess-backed Generation Engine.
//!
//! The neural model lives in a separate generator program; this backend
//! speaks a small protocol with it.
//!
//! # Protocol
//!
//! Every invocation receives `--model-dir <DIR>` after the subcommand.
//!
//! - `<program> info --model-dir DIR` loads the model and prints
//!   `{"sample_rate": 24000}` on stdout. Run once, during initialization.
//! - `<program> synthesize --model-dir DIR` reads one JSON request on stdin
//!   and writes the waveform to stdout as raw little-endian `f32` samples:
//!
//! ```json
//! {
//!   "text": "[HAPPY] Hello [laughs].",
//!   "voice_prompt": [0.01, -0.2],
//!   "text_temperature": 0.7,
//!   "waveform_temperature": 0.7
//! }
//! ```
//!
//! A non-zero exit status fails the call with the program's stderr.
//!
//! # Examples
//!
//! ```rust,no_run
//! use voiceclone_rs::engines::command::CommandEngineLoader;
//! use voiceclone_rs::{ClonerConfig, VoiceCloner};
//!
//! let loader = CommandEngineLoader::new("python3").with_args(["bark_generator.py"]);
//! let cloner = VoiceCloner::new(ClonerConfig::default(), loader);
//! cloner.prepare()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::{EngineLoader, GenerationEngine, GenerationParams};

#[derive(thiserror::Error, Debug)]
pub enum CommandEngineError {
    #[error("Generator program '{}' not found", .0.display())]
    ProgramNotFound(PathBuf),
    #[error("I/O error talking to the generator: {0}")]
    Io(#[from] std::io::Error),
    #[error("Generator `{subcommand}` exited with code {code:?}: {stderr}")]
    Failed {
        subcommand: &'static str,
        code: Option<i32>,
        stderr: String,
    },
    #[error("Generator protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, Deserialize)]
struct EngineInfo {
    sample_rate: u32,
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    voice_prompt: &'a [f32],
    text_temperature: f32,
    waveform_temperature: f32,
}

/// Starts the generator program once to load its model.
#[derive(Debug, Clone)]
pub struct CommandEngineLoader {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandEngineLoader {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Arguments placed before the subcommand (e.g. a script path).
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl EngineLoader for CommandEngineLoader {
    fn load(&self, model_dir: &Path) -> EngineResult<Box<dyn GenerationEngine>> {
        let invocation = Invocation {
            program: self.program.clone(),
            args: self.args.clone(),
            model_dir: model_dir.to_path_buf(),
        };
        let stdout = invocation.run("info", None)?;
        let info: EngineInfo = serde_json::from_slice(&stdout).map_err(|e| {
            CommandEngineError::Protocol(format!("invalid `info` response: {e}"))
        })?;
        if info.sample_rate == 0 {
            return Err(CommandEngineError::Protocol("sample_rate must be positive".into()).into());
        }
        log::info!(
            "Generator '{}' ready at {}Hz",
            self.program.display(),
            info.sample_rate
        );

        Ok(Box::new(CommandEngine {
            invocation,
            sample_rate: info.sample_rate,
        }))
    }
}

pub struct CommandEngine {
    invocation: Invocation,
    sample_rate: u32,
}

impl GenerationEngine for CommandEngine {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn synthesize(
        &self,
        text: &str,
        voice_prompt: &[f32],
        params: &GenerationParams,
    ) -> EngineResult<Vec<f32>> {
        let request = SynthesisRequest {
            text,
            voice_prompt,
            text_temperature: params.text_temperature,
            waveform_temperature: params.waveform_temperature,
        };
        let payload = serde_json::to_vec(&request)
            .map_err(|e| CommandEngineError::Protocol(format!("encoding request: {e}")))?;
        let stdout = self.invocation.run("synthesize", Some(payload))?;
        Ok(parse_samples(&stdout)?)
    }
}

#[derive(Debug, Clone)]
struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
    model_dir: PathBuf,
}

impl Invocation {
    fn run(
        &self,
        subcommand: &'static str,
        stdin_payload: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, CommandEngineError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(subcommand)
            .arg("--model-dir")
            .arg(&self.model_dir)
            .stdin(if stdin_payload.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CommandEngineError::ProgramNotFound(self.program.clone())
                } else {
                    CommandEngineError::Io(e)
                }
            })?;

        // Feed stdin from another thread so a chatty child cannot deadlock on
        // a full stdout pipe while we are still writing.
        let writer = match (child.stdin.take(), stdin_payload) {
            (Some(mut stdin), Some(payload)) => {
                Some(std::thread::spawn(move || stdin.write_all(&payload)))
            }
            _ => None,
        };

        let output = child.wait_with_output()?;
        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                // The child may exit without draining stdin; its status decides.
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => return Err(CommandEngineError::Io(e)),
                Err(_) => {
                    return Err(CommandEngineError::Protocol(
                        "stdin writer thread panicked".into(),
                    ))
                }
            }
        }

        if !output.status.success() {
            return Err(CommandEngineError::Failed {
                subcommand,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

fn parse_samples(bytes: &[u8]) -> Result<Vec<f32>, CommandEngineError> {
    if bytes.len() % 4 != 0 {
        return Err(CommandEngineError::Protocol(format!(
            "waveform length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
