//! Scripted decode engines
//!
//! Stand-ins for the real decoders: each engine emits a fixed number of small
//! buffers tagged with a per-file byte, then finishes or fails. Used to drive the
//! queue ordering and transport scenarios without real audio files.

use audio_streamer::audio::{DecodeEngine, DecoderFactory, SampleBuffer, SampleFormat};
use audio_streamer::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

/// Microseconds between consecutive scripted buffers
pub const SCRIPTED_BUFFER_US: u64 = 1_000;

/// Behavior of one scripted source
pub struct Script {
    /// Byte filling every buffer of this source
    pub tag: u8,

    /// Buffers produced before finishing (or failing)
    pub buffers: u32,

    /// Fail with a decode error after `buffers` buffers instead of finishing
    pub fail: bool,

    /// Block before producing buffer `n` until the sender side signals or drops
    pub gate: Option<(u32, mpsc::Receiver<()>)>,

    /// Pause between buffers, to widen race windows
    pub delay: Duration,
}

impl Script {
    pub fn finishing(tag: u8, buffers: u32) -> Self {
        Self {
            tag,
            buffers,
            fail: false,
            gate: None,
            delay: Duration::from_millis(1),
        }
    }

    pub fn failing(tag: u8, buffers: u32) -> Self {
        Self {
            fail: true,
            ..Self::finishing(tag, buffers)
        }
    }

    /// Block before buffer `at` until the returned sender fires
    pub fn gated(mut self, at: u32) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        self.gate = Some((at, rx));
        (self, tx)
    }
}

struct ScriptedEngine {
    script: Script,
    produced: u32,
    started: bool,
    finished: bool,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    fn finish(&mut self) {
        if self.started && !self.finished {
            self.finished = true;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl DecodeEngine for ScriptedEngine {
    fn produce_next_buffer(&mut self) -> Result<Option<SampleBuffer>> {
        if !self.started {
            self.started = true;
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
        }

        if let Some((at, gate)) = &self.script.gate {
            if *at == self.produced {
                let _ = gate.recv();
            }
        }

        if self.produced == self.script.buffers {
            self.finish();
            return if self.script.fail {
                Err(Error::Decode(format!("scripted failure for tag {}", self.script.tag)))
            } else {
                Ok(None)
            };
        }

        std::thread::sleep(self.script.delay);

        let pts = self.produced as u64 * SCRIPTED_BUFFER_US;
        self.produced += 1;
        Ok(Some(SampleBuffer::new(vec![self.script.tag; 4], pts)))
    }

    fn cancel(&mut self) {
        self.finish();
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Factory handing out one scripted engine per registered file name
#[derive(Default)]
pub struct ScriptedFactory {
    scripts: Mutex<HashMap<String, Script>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, file_name: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(file_name.to_string(), script);
    }

    /// Highest number of engines that were ever producing at the same time
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl DecoderFactory for ScriptedFactory {
    fn create(&self, source: &Path, _format: SampleFormat) -> Box<dyn DecodeEngine> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let script = self
            .scripts
            .lock()
            .unwrap()
            .remove(&name)
            .unwrap_or_else(|| Script::finishing(0, 0));

        Box::new(ScriptedEngine {
            script,
            produced: 0,
            started: false,
            finished: false,
            active: self.active.clone(),
            max_active: self.max_active.clone(),
        })
    }
}
