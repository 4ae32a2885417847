#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use mockmate_interviewer_lib::gateway::{
    Capability, ChatInvoker, ChatReply, ChatRequest, KeyPool, Provider, ProviderError, ResilientInvoker,
    RetryPolicy, SpeechAudio, SpeechInvoker, SpeechRequest,
};
use mockmate_interviewer_lib::interview::{
    Clock, InterviewProfile, InterviewSession, MediaDevices, MediaError, MemoryTimestampStore, PermissionGrant,
    SessionDeps, SessionOptions, Utterance,
};
use mockmate_interviewer_lib::notify::{CompletionEvent, Notifier, NotifyError};
use mockmate_interviewer_lib::store::{ApplicationStatus, MemoryConversationStore};

pub const APP_ID: &str = "app-42";

/// A model reply in the interviewer wire format.
pub fn turn_json(text: &str, ended: bool) -> String {
    serde_json::json!({
        "aiResponse": text,
        "isEditorQuestion": false,
        "isEnded": ended,
    })
    .to_string()
}

pub fn rate_limited() -> ProviderError {
    ProviderError::rate_limited(r#"{"error":{"code":"rate_limit_exceeded"}}"#)
}

/// Chat provider that plays back a script, one entry per key attempt.
pub struct ScriptedChat {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    otherwise: Result<String, ProviderError>,
    pub keys_seen: Mutex<Vec<String>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn new(script: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            otherwise: Ok(turn_json("Tell me more.", false)),
            keys_seen: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Reply used once the script runs out.
    pub fn otherwise(mut self, reply: Result<String, ProviderError>) -> Self {
        self.otherwise = reply;
        self
    }

    pub fn calls(&self) -> usize {
        self.keys_seen.lock().len()
    }
}

#[async_trait]
impl Provider for ScriptedChat {
    type Request = ChatRequest;
    type Response = ChatReply;

    fn capability(&self) -> Capability {
        Capability::Chat
    }

    async fn send(&self, key: &str, request: &ChatRequest) -> Result<ChatReply, ProviderError> {
        self.keys_seen.lock().push(key.to_string());
        self.requests.lock().push(request.clone());
        let next = self.script.lock().pop_front().unwrap_or_else(|| self.otherwise.clone());
        next.map(|content| ChatReply { content, finish_reason: Some("stop".into()) })
    }
}

/// Speech provider returning fixed audio, optionally slow or failing.
pub struct ScriptedSpeech {
    pub delay: Duration,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl ScriptedSpeech {
    pub fn ok() -> Self {
        Self { delay: Duration::ZERO, fail: false, calls: AtomicUsize::new(0) }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::ok() }
    }

    pub fn slow(delay: Duration) -> Self {
        Self { delay, ..Self::ok() }
    }
}

#[async_trait]
impl Provider for ScriptedSpeech {
    type Request = SpeechRequest;
    type Response = SpeechAudio;

    fn capability(&self) -> Capability {
        Capability::Speech
    }

    async fn send(&self, _key: &str, request: &SpeechRequest) -> Result<SpeechAudio, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(ProviderError::transient("speech backend down"));
        }
        Ok(SpeechAudio {
            data: Bytes::from(request.text.clone().into_bytes()),
            content_type: "audio/mpeg".into(),
        })
    }
}

#[derive(Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn at(ms: u64) -> Self {
        Self(AtomicU64::new(ms))
    }

    pub fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Media collaborator that records every call.
pub struct RecordingMedia {
    pub grant: PermissionGrant,
    pub listening_started: AtomicUsize,
    pub listening_stopped: AtomicUsize,
    pub playback_stopped: AtomicUsize,
    pub played: Mutex<Vec<Utterance>>,
}

impl RecordingMedia {
    pub fn new(grant: PermissionGrant) -> Self {
        Self {
            grant,
            listening_started: AtomicUsize::new(0),
            listening_stopped: AtomicUsize::new(0),
            playback_stopped: AtomicUsize::new(0),
            played: Mutex::new(Vec::new()),
        }
    }

    pub fn listen_count(&self) -> usize {
        self.listening_started.load(Ordering::SeqCst)
    }

    pub fn spoken(&self) -> Vec<String> {
        self.played.lock().iter().map(|u| u.text.clone()).collect()
    }
}

#[async_trait]
impl MediaDevices for RecordingMedia {
    async fn request_permissions(&self) -> PermissionGrant {
        self.grant
    }

    async fn start_listening(&self) {
        self.listening_started.fetch_add(1, Ordering::SeqCst);
    }

    async fn stop_listening(&self) {
        self.listening_stopped.fetch_add(1, Ordering::SeqCst);
    }

    async fn play(&self, utterance: &Utterance) -> Result<(), MediaError> {
        self.played.lock().push(utterance.clone());
        Ok(())
    }

    async fn stop_playback(&self) {
        self.playback_stopped.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct CountingNotifier {
    pub events: Mutex<Vec<CompletionEvent>>,
}

impl CountingNotifier {
    pub fn count(&self) -> usize {
        self.events.lock().len()
    }
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn interview_completed(&self, event: &CompletionEvent) -> Result<(), NotifyError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

pub fn test_policy() -> RetryPolicy {
    RetryPolicy::new(Duration::from_secs(1), Duration::from_millis(1))
}

pub fn chat_invoker(chat: Arc<ScriptedChat>, keys: usize) -> Arc<ChatInvoker> {
    let pool = KeyPool::new(Capability::Chat, (0..keys).map(|i| format!("chat-{}", i)).collect());
    let invoker: ChatInvoker = ResilientInvoker::new(chat, Arc::new(pool), test_policy());
    Arc::new(invoker)
}

pub fn speech_invoker(speech: Arc<ScriptedSpeech>) -> Arc<SpeechInvoker> {
    let pool = KeyPool::new(Capability::Speech, vec!["voice-0".into()]);
    let invoker: SpeechInvoker = ResilientInvoker::new(speech, Arc::new(pool), test_policy());
    Arc::new(invoker)
}

pub fn test_options(duration_ms: u64) -> SessionOptions {
    SessionOptions {
        countdown: Duration::ZERO,
        duration_ms,
        analytics_url: format!("https://example.com/analytics/{}", APP_ID),
        notify_timeout: Duration::from_secs(1),
        ..SessionOptions::default()
    }
}

pub struct Harness {
    pub session: Arc<InterviewSession>,
    pub chat: Arc<ScriptedChat>,
    pub speech: Arc<ScriptedSpeech>,
    pub media: Arc<RecordingMedia>,
    pub store: Arc<MemoryConversationStore>,
    pub notifier: Arc<CountingNotifier>,
    pub clock: Arc<ManualClock>,
    pub timestamps: Arc<MemoryTimestampStore>,
    deps: SessionDeps,
    options: SessionOptions,
}

impl Harness {
    /// A fresh session over the same store, timestamps and providers, as
    /// after the candidate reloads the page.
    pub fn reload(&self) -> Arc<InterviewSession> {
        Arc::new(InterviewSession::new(
            APP_ID,
            &InterviewProfile::default(),
            self.deps.clone(),
            self.options.clone(),
        ))
    }
}

pub struct HarnessBuilder {
    chat: ScriptedChat,
    speech: ScriptedSpeech,
    chat_keys: usize,
    grant: PermissionGrant,
    status: ApplicationStatus,
    options: SessionOptions,
}

impl HarnessBuilder {
    pub fn new(chat: ScriptedChat) -> Self {
        Self {
            chat,
            speech: ScriptedSpeech::ok(),
            chat_keys: 3,
            grant: PermissionGrant::all(),
            status: ApplicationStatus::Accepted,
            options: test_options(10 * 60_000),
        }
    }

    pub fn speech(mut self, speech: ScriptedSpeech) -> Self {
        self.speech = speech;
        self
    }

    pub fn chat_keys(mut self, n: usize) -> Self {
        self.chat_keys = n;
        self
    }

    pub fn grant(mut self, grant: PermissionGrant) -> Self {
        self.grant = grant;
        self
    }

    pub fn status(mut self, status: ApplicationStatus) -> Self {
        self.status = status;
        self
    }

    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Harness {
        let chat = Arc::new(self.chat);
        let speech = Arc::new(self.speech);
        let media = Arc::new(RecordingMedia::new(self.grant));
        let store = Arc::new(MemoryConversationStore::new().with_application(APP_ID, self.status));
        let notifier = Arc::new(CountingNotifier::default());
        let clock = Arc::new(ManualClock::at(1_700_000_000_000));
        let timestamps = Arc::new(MemoryTimestampStore::new());

        let deps = SessionDeps {
            chat: chat_invoker(chat.clone(), self.chat_keys),
            speech: speech_invoker(speech.clone()),
            media: media.clone(),
            store: store.clone(),
            applications: store.clone(),
            notifier: notifier.clone(),
            clock: clock.clone(),
            timestamps: timestamps.clone(),
        };
        let session = Arc::new(InterviewSession::new(
            APP_ID,
            &InterviewProfile::default(),
            deps.clone(),
            self.options.clone(),
        ));

        Harness { session, chat, speech, media, store, notifier, clock, timestamps, deps, options: self.options }
    }
}
