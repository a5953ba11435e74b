//! Wit.ai dictation backend.
//!
//! The clip is uploaded as a WAV file. The service answers with a stream of
//! concatenated JSON objects, partial hypotheses first; the transcript is the
//! text of every object flagged `is_final`.

use crate::audio::wav::encode_wav;
use crate::config::RecognitionConfig;
use crate::error::{Result, VoxswitchError};
use crate::stt::transcriber::Transcriber;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

pub struct WitTranscriber {
    client: Client,
    endpoint: String,
    token: String,
}

impl WitTranscriber {
    pub fn new(endpoint: &str, token: &str, timeout: Duration) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(VoxswitchError::ConfigInvalidValue {
                key: "recognition.api_key".to_string(),
                message: "a server access token is required".to_string(),
            });
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoxswitchError::RecognitionService {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            token: token.trim().to_string(),
        })
    }

    /// Builds the transcriber from `[recognition]`; the token is mandatory.
    pub fn from_config(config: &RecognitionConfig) -> Result<Self> {
        let token = config.api_key.as_deref().unwrap_or_default();
        Self::new(
            &config.endpoint,
            token,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

impl Transcriber for WitTranscriber {
    fn transcribe(&self, audio: &[i16], sample_rate: u32) -> Result<String> {
        let wav = encode_wav(audio, sample_rate)?;
        let started = Instant::now();

        let service_error = |e: reqwest::Error| VoxswitchError::RecognitionService {
            message: e.to_string(),
        };
        let body = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "audio/wav")
            .body(wav)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(service_error)?;

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = body.len(),
            "dictation response received"
        );
        parse_dictation(&body)
    }

    fn name(&self) -> &str {
        "wit.ai"
    }
}

/// Extracts the final transcript from a dictation response body.
pub fn parse_dictation(body: &str) -> Result<String> {
    let mut finals = Vec::new();
    for doc in serde_json::Deserializer::from_str(body).into_iter::<Value>() {
        let doc = doc.map_err(|e| VoxswitchError::RecognitionService {
            message: format!("Malformed dictation response: {}", e),
        })?;
        if let Some(error) = doc.get("error").and_then(Value::as_str) {
            return Err(VoxswitchError::RecognitionService {
                message: error.to_string(),
            });
        }
        if doc.get("is_final").and_then(Value::as_bool) == Some(true)
            && let Some(text) = doc.get("text").and_then(Value::as_str)
            && !text.trim().is_empty()
        {
            finals.push(text.trim().to_string());
        }
    }

    if finals.is_empty() {
        return Err(VoxswitchError::UnrecognizedSpeech);
    }
    Ok(finals.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_texts_are_joined() {
        let body = r#"{"text":"acc","is_final":false}
{"text":"accendi la","is_final":true}
{"text":"luce","is_final":true,"speech":{"confidence":0.9}}"#;
        assert_eq!(parse_dictation(body).unwrap(), "accendi la luce");
    }

    #[test]
    fn test_concatenated_objects_without_separator() {
        let body = r#"{"text":"spe","is_final":false}{"text":"spegni la luce","is_final":true}"#;
        assert_eq!(parse_dictation(body).unwrap(), "spegni la luce");
    }

    #[test]
    fn test_only_partials_is_unrecognized() {
        let body = r#"{"text":"mmh","is_final":false}"#;
        assert!(matches!(
            parse_dictation(body),
            Err(VoxswitchError::UnrecognizedSpeech)
        ));
        assert!(matches!(
            parse_dictation(""),
            Err(VoxswitchError::UnrecognizedSpeech)
        ));
    }

    #[test]
    fn test_error_object_is_service_error() {
        let body = r#"{"error":"Bad auth, check token/params","code":"no-auth"}"#;
        match parse_dictation(body) {
            Err(VoxswitchError::RecognitionService { message }) => {
                assert!(message.contains("Bad auth"));
            }
            other => panic!("expected service error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_body_is_service_error() {
        assert!(matches!(
            parse_dictation("<html>"),
            Err(VoxswitchError::RecognitionService { .. })
        ));
    }

    #[test]
    fn test_missing_token_is_rejected() {
        let config = RecognitionConfig::default();
        assert!(matches!(
            WitTranscriber::from_config(&config),
            Err(VoxswitchError::ConfigInvalidValue { .. })
        ));
    }
}
