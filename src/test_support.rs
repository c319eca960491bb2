//! Test doubles shared by the unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::EngineResult;
use crate::{EngineLoader, GenerationEngine, GenerationParams};

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisCall {
    pub text: String,
    pub voice_prompt: Vec<f32>,
    pub params: GenerationParams,
}

pub type CallLog = Arc<Mutex<Vec<SynthesisCall>>>;

/// Records every synthesis call and returns one sample per input character.
#[derive(Default)]
pub struct FakeEngine {
    pub calls: CallLog,
    pub fail_synthesis: bool,
}

impl FakeEngine {
    pub const SAMPLE_RATE: u32 = 24_000;
}

impl GenerationEngine for FakeEngine {
    fn sample_rate(&self) -> u32 {
        Self::SAMPLE_RATE
    }

    fn synthesize(
        &self,
        text: &str,
        voice_prompt: &[f32],
        params: &GenerationParams,
    ) -> EngineResult<Vec<f32>> {
        self.calls.lock().unwrap().push(SynthesisCall {
            text: text.to_string(),
            voice_prompt: voice_prompt.to_vec(),
            params: *params,
        });
        if self.fail_synthesis {
            return Err("fake engine refused".into());
        }
        Ok(text.chars().map(|_| params.waveform_temperature).collect())
    }
}

/// Loader that counts initializations and can be slowed down or made to fail.
pub struct CountingLoader {
    pub loads: Arc<AtomicUsize>,
    pub calls: CallLog,
    delay: Option<Duration>,
    failures_left: AtomicUsize,
    fail_synthesis: bool,
}

impl CountingLoader {
    pub fn new() -> Self {
        Self {
            loads: Arc::new(AtomicUsize::new(0)),
            calls: CallLog::default(),
            delay: None,
            failures_left: AtomicUsize::new(0),
            fail_synthesis: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_synthesis(mut self) -> Self {
        self.fail_synthesis = true;
        self
    }
}

impl EngineLoader for CountingLoader {
    fn load(&self, _model_dir: &Path) -> EngineResult<Box<dyn GenerationEngine>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err("weights missing".into());
        }
        Ok(Box::new(FakeEngine {
            calls: self.calls.clone(),
            fail_synthesis: self.fail_synthesis,
        }))
    }
}

/// Write a 16-bit mono WAV file.
pub fn write_wav_fixture(path: &Path, sample_rate: u32, samples: &[f32]) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &s in samples {
        writer
            .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .unwrap();
    }
    writer.finalize().unwrap();
}
