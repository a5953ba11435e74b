//! Recognition station: clip in, at most one command out.

use crate::audio::wav::save_wav;
use crate::error::VoxswitchError;
use crate::pipeline::error::StationError;
use crate::pipeline::keywords::KeywordMatcher;
use crate::pipeline::station::Station;
use crate::pipeline::types::{Clip, CommandEvent};
use crate::stt::transcriber::Transcriber;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Transcribes each clip and classifies the transcript.
///
/// Recognition failures of any kind skip the clip; they never stop the worker.
pub struct RecognitionStation {
    transcriber: Arc<dyn Transcriber>,
    matcher: KeywordMatcher,
    sample_rate: u32,
    clip_dir: Option<PathBuf>,
}

impl RecognitionStation {
    pub fn new(transcriber: Arc<dyn Transcriber>, matcher: KeywordMatcher, sample_rate: u32) -> Self {
        Self {
            transcriber,
            matcher,
            sample_rate,
            clip_dir: None,
        }
    }

    /// Archive every clip as `clip-<sequence>.wav` under `dir` before recognition.
    pub fn with_clip_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.clip_dir = dir;
        self
    }

    fn archive(&self, clip: &Clip) {
        let Some(dir) = &self.clip_dir else {
            return;
        };
        let path = dir.join(format!("clip-{}.wav", clip.sequence));
        match save_wav(&path, &clip.samples, self.sample_rate) {
            Ok(()) => debug!(path = %path.display(), "clip archived"),
            Err(e) => warn!(path = %path.display(), "failed to archive clip: {e}"),
        }
    }
}

impl Station for RecognitionStation {
    type Input = Clip;
    type Output = CommandEvent;

    fn name(&self) -> &'static str {
        "recognition"
    }

    fn process(&mut self, clip: Clip) -> Result<Option<CommandEvent>, StationError> {
        self.archive(&clip);

        let start = Instant::now();
        let text = match self.transcriber.transcribe(&clip.samples, self.sample_rate) {
            Ok(text) => text.trim().to_lowercase(),
            Err(VoxswitchError::UnrecognizedSpeech) => {
                info!(clip = clip.sequence, "speech not understood");
                return Ok(None);
            }
            Err(e) => {
                return Err(StationError::Recoverable(format!(
                    "clip {}: {}",
                    clip.sequence, e
                )));
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if text.is_empty() {
            info!(clip = clip.sequence, elapsed_ms, "empty transcript");
            return Ok(None);
        }

        match self.matcher.classify(&text) {
            Some(direction) => {
                info!(clip = clip.sequence, %direction, elapsed_ms, transcript = %text, "command recognized");
                Ok(Some(CommandEvent::new(direction, clip.sequence, text)))
            }
            None => {
                info!(clip = clip.sequence, elapsed_ms, transcript = %text, "no keyword match");
                Ok(None)
            }
        }
    }
}
