use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use log::debug;
use reqwest::Client;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use super::{Capability, Provider, ProviderError, ResilientInvoker};
use crate::config::SpeechSettings;

pub type SpeechInvoker = ResilientInvoker<SpeechRequest, SpeechAudio>;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self { stability: 0.5, similarity_boost: 0.5 }
    }
}

#[derive(Clone, Debug)]
pub struct SpeechRequest {
    pub text: String,
    pub voice_settings: VoiceSettings,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), voice_settings: VoiceSettings::default() }
    }
}

/// Encoded audio returned by the speech provider.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeechAudio {
    pub data: Bytes,
    pub content_type: String,
}

impl SpeechAudio {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.data)
    }
}

/// Audio travels to callers as base64 text.
impl Serialize for SpeechAudio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SpeechAudio", 2)?;
        state.serialize_field("audio", &self.to_base64())?;
        state.serialize_field("contentType", &self.content_type)?;
        state.end()
    }
}

#[derive(Serialize)]
struct SynthesisBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// ElevenLabs text-to-speech endpoint.
#[derive(Clone)]
pub struct SpeechClient {
    client: Client,
    base_url: String,
    voice_id: String,
    model_id: String,
    output_format: String,
}

impl SpeechClient {
    pub fn new(
        base_url: impl Into<String>,
        voice_id: impl Into<String>,
        model_id: impl Into<String>,
        output_format: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            voice_id: voice_id.into(),
            model_id: model_id.into(),
            output_format: output_format.into(),
        }
    }

    pub fn from_settings(settings: &SpeechSettings) -> Self {
        Self::new(
            &settings.base_url,
            &settings.voice_id,
            &settings.model_id,
            &settings.output_format,
        )
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/text-to-speech/{}?output_format={}",
            self.base_url,
            urlencoding::encode(&self.voice_id),
            urlencoding::encode(&self.output_format)
        )
    }
}

#[async_trait]
impl Provider for SpeechClient {
    type Request = SpeechRequest;
    type Response = SpeechAudio;

    fn capability(&self) -> Capability {
        Capability::Speech
    }

    async fn send(&self, key: &str, request: &SpeechRequest) -> Result<SpeechAudio, ProviderError> {
        if request.text.trim().is_empty() {
            return Err(ProviderError::fatal("cannot synthesize empty text"));
        }

        let body = SynthesisBody {
            text: &request.text,
            model_id: &self.model_id,
            voice_settings: request.voice_settings,
        };

        debug!("Synthesizing {} chars with voice {}", request.text.len(), self.voice_id);

        let response = self
            .client
            .post(self.endpoint())
            .header("xi-api-key", key)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transient(format!("speech request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_http(status.as_u16(), error_text));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();

        let data = response
            .bytes()
            .await
            .map_err(|e| ProviderError::transient(format!("failed to read speech audio: {}", e)))?;

        if data.is_empty() {
            return Err(ProviderError::transient("speech provider returned no audio"));
        }

        Ok(SpeechAudio { data, content_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_voice() {
        let client = SpeechClient::new("https://api.elevenlabs.io/v1/", "voice id", "eleven_flash_v2_5", "mp3_44100_128");
        assert_eq!(
            client.endpoint(),
            "https://api.elevenlabs.io/v1/text-to-speech/voice%20id?output_format=mp3_44100_128"
        );
    }

    #[test]
    fn test_audio_serializes_as_base64() {
        let audio = SpeechAudio { data: Bytes::from_static(b"abc"), content_type: "audio/mpeg".into() };
        assert_eq!(audio.len(), 3);

        let json = serde_json::to_value(&audio).unwrap();
        assert_eq!(json["audio"], "YWJj");
        assert_eq!(json["contentType"], "audio/mpeg");
    }
}
