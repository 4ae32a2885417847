use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::SpeechAudio;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    #[error("Playback failed: {0}")]
    Playback(String),
    #[error("Device unavailable: {0}")]
    Device(String),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PermissionGrant {
    pub camera: bool,
    pub microphone: bool,
}

impl PermissionGrant {
    pub fn all() -> Self {
        Self { camera: true, microphone: true }
    }

    pub fn is_granted(&self) -> bool {
        self.camera && self.microphone
    }
}

/// What the interviewer says on one turn. `audio` is absent when synthesis
/// was unavailable; the text is still shown.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub audio: Option<SpeechAudio>,
}

/// Camera, microphone, speech recognition and playback on the candidate's
/// side. Finalized transcripts are fed back through
/// [`InterviewSession::handle_transcript`](super::InterviewSession::handle_transcript).
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn request_permissions(&self) -> PermissionGrant;

    async fn start_listening(&self);

    async fn stop_listening(&self);

    /// Resolves when playback has finished.
    async fn play(&self, utterance: &Utterance) -> Result<(), MediaError>;

    async fn stop_playback(&self);
}
