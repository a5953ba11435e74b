use crate::error::{Result, VoxswitchError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Trait for speech-to-text transcription.
///
/// This trait allows swapping implementations (real service vs mock).
pub trait Transcriber: Send + Sync {
    /// Transcribe audio samples to text.
    ///
    /// # Arguments
    /// * `audio` - 16-bit mono PCM samples
    /// * `sample_rate` - Sample rate of `audio` in Hz
    ///
    /// # Returns
    /// Transcribed text, `UnrecognizedSpeech` when nothing was understood, or
    /// `RecognitionService` on any service fault
    fn transcribe(&self, audio: &[i16], sample_rate: u32) -> Result<String>;

    /// Name of the backend, for logs.
    fn name(&self) -> &str;
}

/// Implement Transcriber for Arc<T> to allow sharing across sessions.
impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    fn transcribe(&self, audio: &[i16], sample_rate: u32) -> Result<String> {
        (**self).transcribe(audio, sample_rate)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[derive(Debug, Clone)]
enum MockBehavior {
    Respond(String),
    Unrecognized,
    Fail,
}

/// Mock transcriber for testing
#[derive(Debug, Clone)]
pub struct MockTranscriber {
    name: String,
    script: Vec<MockBehavior>,
    calls: Arc<AtomicUsize>,
}

impl MockTranscriber {
    /// Create a new mock transcriber that answers "mock transcription"
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: vec![MockBehavior::Respond("mock transcription".to_string())],
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the mock to return a specific response
    pub fn with_response(mut self, response: &str) -> Self {
        self.script = vec![MockBehavior::Respond(response.to_string())];
        self
    }

    /// Configure the mock to fail with a service error
    pub fn with_failure(mut self) -> Self {
        self.script = vec![MockBehavior::Fail];
        self
    }

    /// Configure the mock to report unrecognized speech
    pub fn with_unrecognized(mut self) -> Self {
        self.script = vec![MockBehavior::Unrecognized];
        self
    }

    /// Answer successive calls in turn; `None` means unrecognized speech.
    ///
    /// The last entry repeats once the sequence is exhausted.
    pub fn with_sequence(mut self, responses: &[Option<&str>]) -> Self {
        self.script = responses
            .iter()
            .map(|r| match r {
                Some(text) => MockBehavior::Respond(text.to_string()),
                None => MockBehavior::Unrecognized,
            })
            .collect();
        self
    }

    /// Shared count of `transcribe` calls.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, _audio: &[i16], _sample_rate: u32) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .script
            .get(call)
            .or_else(|| self.script.last())
            .cloned()
            .unwrap_or(MockBehavior::Unrecognized);
        match behavior {
            MockBehavior::Respond(text) => Ok(text),
            MockBehavior::Unrecognized => Err(VoxswitchError::UnrecognizedSpeech),
            MockBehavior::Fail => Err(VoxswitchError::RecognitionService {
                message: "mock transcription failure".to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
