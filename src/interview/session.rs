use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::conversation::ConversationContext;
use super::media::{MediaDevices, MediaError, Utterance};
use super::prompts::{system_prompt, InterviewProfile, ABANDON_PROMPT, OPENING_CANDIDATE_MESSAGE};
use super::timer::{Clock, InterviewTimer, StartTimestampStore, TimerSnapshot};
use super::validator::{fallback_turn, validate, FallbackReason, ValidatedTurn};
use crate::config::AppConfig;
use crate::gateway::{ChatInvoker, ChatRequest, SpeechAudio, SpeechInvoker, SpeechRequest, VoiceSettings};
use crate::notify::{CompletionEvent, Notifier};
use crate::store::{
    list_with_timeout, ApplicationDirectory, ApplicationStatus, CandidateResponse, ConversationStore,
    InterviewTurn, InterviewerResponse, TurnEntry,
};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    RequestingPermissions,
    Countdown,
    Starting,
    Active,
    Ended,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::RequestingPermissions => "requesting-permissions",
            Stage::Countdown => "countdown",
            Stage::Starting => "starting",
            Stage::Active => "active",
            Stage::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// What ended an interview. Time running out is a normal cause, not an error.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    ModelEnded,
    TimeUp,
    UserEnded,
    External,
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EndReason::ModelEnded => "model_ended",
            EndReason::TimeUp => "time_up",
            EndReason::UserEnded => "user_ended",
            EndReason::External => "external",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Camera or microphone permission denied (camera: {camera}, microphone: {microphone})")]
    PermissionDenied { camera: bool, microphone: bool },
    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: Stage, to: Stage },
    #[error("Session is not active (stage: {0})")]
    NotActive(Stage),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Result of one pass through the turn loop.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The interviewer spoke and listening resumed.
    Continued { turn: InterviewerResponse },
    /// The retry cap was hit; the abandon prompt was spoken and listening resumed.
    Abandoned,
    /// The session is over.
    Ended(EndReason),
    /// A previous turn is still in flight; the input was dropped.
    Busy,
    /// Nothing was said.
    Ignored,
}

/// External collaborators of a session.
#[derive(Clone)]
pub struct SessionDeps {
    pub chat: Arc<ChatInvoker>,
    pub speech: Arc<SpeechInvoker>,
    pub media: Arc<dyn MediaDevices>,
    pub store: Arc<dyn ConversationStore>,
    pub applications: Arc<dyn ApplicationDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub timestamps: Arc<dyn StartTimestampStore>,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub countdown: Duration,
    pub duration_ms: u64,
    pub near_end_window_ms: u64,
    pub max_turn_retries: u32,
    pub max_context_messages: usize,
    pub temperature: f64,
    pub max_tokens: u32,
    pub voice_settings: VoiceSettings,
    pub analytics_url: String,
    pub notify_timeout: Duration,
    pub resume_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(5),
            duration_ms: 30 * 60_000,
            near_end_window_ms: 30_000,
            max_turn_retries: 3,
            max_context_messages: 50,
            temperature: 0.7,
            max_tokens: 1000,
            voice_settings: VoiceSettings::default(),
            analytics_url: String::new(),
            notify_timeout: Duration::from_secs(5),
            resume_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionOptions {
    /// Options for one application. A duration on the profile wins over the
    /// configured default.
    pub fn for_application(config: &AppConfig, profile: &InterviewProfile, application_id: &str) -> Self {
        let duration_ms = profile
            .duration_minutes
            .filter(|m| *m > 0)
            .map(|m| u64::from(m) * 60_000)
            .unwrap_or_else(|| config.interview.duration_ms());

        Self {
            countdown: config.interview.countdown(),
            duration_ms,
            near_end_window_ms: config.interview.near_end_window_ms,
            max_turn_retries: config.interview.max_turn_retries,
            max_context_messages: config.interview.max_context_messages,
            temperature: config.chat.temperature,
            max_tokens: config.chat.max_tokens,
            voice_settings: VoiceSettings {
                stability: config.speech.stability,
                similarity_boost: config.speech.similarity_boost,
            },
            analytics_url: config.analytics.report_url(application_id),
            notify_timeout: config.notify.timeout(),
            resume_timeout: config.interview.resume_timeout(),
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct SessionSnapshot {
    pub application_id: String,
    pub stage: Stage,
    pub timer: TimerSnapshot,
    pub retry_count: u32,
    pub last_chat_key: Option<usize>,
    pub last_speech_key: Option<usize>,
    pub end_reason: Option<EndReason>,
}

struct SessionInner {
    stage: Stage,
    context: ConversationContext,
    retry_count: u32,
    next_sequence: u32,
    last_chat_key: Option<usize>,
    last_speech_key: Option<usize>,
    end_reason: Option<EndReason>,
}

/// Drives one voice interview from permission request to completion.
pub struct InterviewSession {
    application_id: String,
    deps: SessionDeps,
    options: SessionOptions,
    timer: InterviewTimer,
    inner: Mutex<SessionInner>,
    generation: AtomicU64,
    turn_lock: tokio::sync::Mutex<()>,
    stage_tx: watch::Sender<Stage>,
}

impl InterviewSession {
    pub fn new(
        application_id: impl Into<String>,
        profile: &InterviewProfile,
        deps: SessionDeps,
        options: SessionOptions,
    ) -> Self {
        let application_id = application_id.into();
        let timer = InterviewTimer::new(
            application_id.clone(),
            options.duration_ms,
            options.near_end_window_ms,
            deps.clock.clone(),
            deps.timestamps.clone(),
        );
        let (stage_tx, _) = watch::channel(Stage::Idle);

        Self {
            inner: Mutex::new(SessionInner {
                stage: Stage::Idle,
                context: ConversationContext::new(system_prompt(profile), options.max_context_messages),
                retry_count: 0,
                next_sequence: 0,
                last_chat_key: None,
                last_speech_key: None,
                end_reason: None,
            }),
            application_id,
            deps,
            options,
            timer,
            generation: AtomicU64::new(0),
            turn_lock: tokio::sync::Mutex::new(()),
            stage_tx,
        }
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn stage(&self) -> Stage {
        self.inner.lock().stage
    }

    pub fn subscribe(&self) -> watch::Receiver<Stage> {
        self.stage_tx.subscribe()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.inner.lock().end_reason
    }

    pub fn retry_count(&self) -> u32 {
        self.inner.lock().retry_count
    }

    pub fn timer(&self) -> &InterviewTimer {
        &self.timer
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let timer = self.timer.remaining();
        let inner = self.inner.lock();
        SessionSnapshot {
            application_id: self.application_id.clone(),
            stage: inner.stage,
            timer,
            retry_count: inner.retry_count,
            last_chat_key: inner.last_chat_key,
            last_speech_key: inner.last_speech_key,
            end_reason: inner.end_reason,
        }
    }

    fn transition(&self, from: Stage, to: Stage) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.stage != from {
            return Err(SessionError::InvalidTransition { from: inner.stage, to });
        }
        inner.stage = to;
        self.stage_tx.send_replace(to);
        info!("🎬 {} {} -> {}", self.application_id, from, to);
        Ok(())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation && self.stage() == Stage::Active
    }

    async fn wait_until_ended(&self) {
        let mut rx = self.stage_tx.subscribe();
        loop {
            let ended = *rx.borrow_and_update() == Stage::Ended;
            if ended {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// `idle -> requesting-permissions -> countdown`. A denial returns the
    /// session to `idle`.
    pub async fn open(&self) -> Result<()> {
        self.transition(Stage::Idle, Stage::RequestingPermissions)?;

        let grant = self.deps.media.request_permissions().await;
        if !grant.is_granted() {
            warn!("🚫 Permissions denied for {}: {:?}", self.application_id, grant);
            self.transition(Stage::RequestingPermissions, Stage::Idle)?;
            return Err(SessionError::PermissionDenied {
                camera: grant.camera,
                microphone: grant.microphone,
            });
        }

        self.transition(Stage::RequestingPermissions, Stage::Countdown)
    }

    /// `countdown -> starting` once the countdown elapses.
    pub async fn run_countdown(&self) -> Result<()> {
        let stage = self.stage();
        if stage != Stage::Countdown {
            return Err(SessionError::InvalidTransition { from: stage, to: Stage::Starting });
        }
        info!("⏳ Interview for {} starts in {:?}", self.application_id, self.options.countdown);
        tokio::time::sleep(self.options.countdown).await;
        self.transition(Stage::Countdown, Stage::Starting)
    }

    /// `starting -> active`: runs the opening exchange and starts listening.
    /// A log already persisted for the application is resumed, not
    /// overwritten.
    pub async fn begin(&self) -> Result<TurnOutcome> {
        let _turn = self.turn_lock.lock().await;
        let stage = self.stage();
        if stage != Stage::Starting {
            return Err(SessionError::InvalidTransition { from: stage, to: Stage::Active });
        }

        if let Some(status) = self.application_status().await {
            if status.is_terminal() {
                info!("Application {} is already {}, not starting", self.application_id, status);
                self.finish(EndReason::External, false).await;
                return Ok(TurnOutcome::Ended(EndReason::External));
            }
        }

        let resumed = self.resume_log().await;

        self.transition(Stage::Starting, Stage::Active)?;
        if let Err(e) = self
            .deps
            .applications
            .set_status(&self.application_id, ApplicationStatus::InProgress)
            .await
        {
            warn!("Failed to mark {} in progress: {}", self.application_id, e);
        }
        self.timer.start();

        let opening = CandidateResponse {
            text: OPENING_CANDIDATE_MESSAGE.to_string(),
            near_end: false,
        };
        Ok(self.run_turn(opening, true, resumed == 0).await)
    }

    /// Continue numbering after the persisted log and replay it into the
    /// context. Returns the number of records found.
    async fn resume_log(&self) -> usize {
        let turns = match list_with_timeout(
            self.deps.store.as_ref(),
            &self.application_id,
            self.options.resume_timeout,
        )
        .await
        {
            Ok(turns) => turns,
            Err(e) => {
                error!("Could not read persisted log of {}, numbering from 0: {}", self.application_id, e);
                return 0;
            }
        };

        if turns.is_empty() {
            return 0;
        }

        let mut inner = self.inner.lock();
        for turn in &turns {
            match &turn.entry {
                TurnEntry::Interviewer(response) => inner.context.push_interviewer(response),
                TurnEntry::Candidate(response) => inner.context.push_candidate(response),
            }
        }
        inner.next_sequence = turns.iter().map(|t| t.sequence + 1).max().unwrap_or(0);
        info!(
            "🔁 Resuming {} after {} persisted records (next #{})",
            self.application_id,
            turns.len(),
            inner.next_sequence
        );
        turns.len()
    }

    /// Open, count down and begin.
    pub async fn start(&self) -> Result<TurnOutcome> {
        self.open().await?;
        self.run_countdown().await?;
        self.begin().await
    }

    /// Feed one finalized transcript into the turn loop.
    pub async fn handle_transcript(&self, text: &str) -> Result<TurnOutcome> {
        let stage = self.stage();
        if stage != Stage::Active {
            return Err(SessionError::NotActive(stage));
        }

        let _turn = match self.turn_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Turn in flight for {}, dropping transcript", self.application_id);
                return Ok(TurnOutcome::Busy);
            }
        };

        let snapshot = self.timer.remaining();
        if snapshot.expired {
            self.end(EndReason::TimeUp).await;
            return Ok(TurnOutcome::Ended(EndReason::TimeUp));
        }

        let text = text.trim();
        if text.is_empty() {
            return Ok(TurnOutcome::Ignored);
        }

        self.deps.media.stop_listening().await;
        let candidate = CandidateResponse {
            text: text.to_string(),
            near_end: snapshot.near_end,
        };
        Ok(self.run_turn(candidate, false, false).await)
    }

    /// `opening` turns do not persist their synthetic candidate message.
    /// `first` selects the greeting fallback.
    async fn run_turn(&self, candidate: CandidateResponse, opening: bool, first: bool) -> TurnOutcome {
        let generation = self.generation.load(Ordering::SeqCst);

        let (request, chat_start, candidate_sequence) = {
            let mut inner = self.inner.lock();
            inner.context.push_candidate(&candidate);
            let candidate_sequence = if opening {
                None
            } else {
                let sequence = inner.next_sequence;
                inner.next_sequence += 1;
                Some(sequence)
            };
            let request = ChatRequest::new(inner.context.request_messages())
                .with_sampling(self.options.temperature, self.options.max_tokens);
            (request, inner.last_chat_key, candidate_sequence)
        };

        let validated = match self.deps.chat.invoke(&request, chat_start).await {
            Ok(invocation) => {
                self.inner.lock().last_chat_key = Some(invocation.key_index);
                validate(&invocation.response.content, first)
            }
            Err(e) => {
                warn!("Chat unavailable for {}: {}", self.application_id, e);
                fallback_turn(first, FallbackReason::ProviderUnavailable)
            }
        };

        if !self.is_current(generation) {
            return self.ended_outcome();
        }

        let (turn, abandoned, interviewer_sequence) = {
            let mut inner = self.inner.lock();
            let mut abandoned = false;
            let turn = match validated {
                ValidatedTurn::Valid(turn) => {
                    inner.retry_count = 0;
                    turn
                }
                ValidatedTurn::Fallback { turn, reason } => {
                    inner.retry_count += 1;
                    warn!(
                        "Fallback turn for {} ({}), retry {}/{}",
                        self.application_id, reason, inner.retry_count, self.options.max_turn_retries
                    );
                    if inner.retry_count >= self.options.max_turn_retries {
                        error!("Abandoning turn for {} after {} failures", self.application_id, inner.retry_count);
                        inner.retry_count = 0;
                        abandoned = true;
                        InterviewerResponse::fallback(ABANDON_PROMPT)
                    } else {
                        turn
                    }
                }
            };
            inner.context.push_interviewer(&turn);
            let sequence = inner.next_sequence;
            inner.next_sequence += 1;
            (turn, abandoned, sequence)
        };

        if let Some(sequence) = candidate_sequence {
            self.persist(InterviewTurn::candidate(&self.application_id, sequence, candidate)).await;
        }
        self.persist(InterviewTurn::interviewer(&self.application_id, interviewer_sequence, turn.clone()))
            .await;

        if !self.is_current(generation) {
            return self.ended_outcome();
        }

        let audio = tokio::select! {
            audio = self.synthesize(&turn.text) => audio,
            _ = self.wait_until_ended() => return self.ended_outcome(),
        };

        let utterance = Utterance { text: turn.text.clone(), audio };
        let played: std::result::Result<(), MediaError> = tokio::select! {
            played = self.deps.media.play(&utterance) => played,
            _ = self.wait_until_ended() => return self.ended_outcome(),
        };
        if let Err(e) = played {
            warn!("Playback failed for {}: {}", self.application_id, e);
        }

        if turn.is_ended {
            self.end(EndReason::ModelEnded).await;
            return TurnOutcome::Ended(EndReason::ModelEnded);
        }

        if self.timer.remaining().expired {
            self.end(EndReason::TimeUp).await;
            return TurnOutcome::Ended(EndReason::TimeUp);
        }

        if !self.is_current(generation) {
            return self.ended_outcome();
        }
        self.deps.media.start_listening().await;

        if abandoned {
            TurnOutcome::Abandoned
        } else {
            TurnOutcome::Continued { turn }
        }
    }

    fn ended_outcome(&self) -> TurnOutcome {
        TurnOutcome::Ended(self.end_reason().unwrap_or(EndReason::External))
    }

    async fn synthesize(&self, text: &str) -> Option<SpeechAudio> {
        let request = SpeechRequest {
            text: text.to_string(),
            voice_settings: self.options.voice_settings,
        };
        let start = self.inner.lock().last_speech_key;

        match self.deps.speech.invoke(&request, start).await {
            Ok(invocation) => {
                self.inner.lock().last_speech_key = Some(invocation.key_index);
                Some(invocation.response)
            }
            Err(e) => {
                warn!("Speech unavailable for {}, delivering text only: {}", self.application_id, e);
                None
            }
        }
    }

    async fn persist(&self, turn: InterviewTurn) {
        if let Err(e) = self.deps.store.append(&turn).await {
            error!(
                "Failed to persist {} record #{} for {}: {}",
                turn.entry.speaker(),
                turn.sequence,
                self.application_id,
                e
            );
        }
    }

    async fn application_status(&self) -> Option<ApplicationStatus> {
        match self.deps.applications.status(&self.application_id).await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("Could not read status of {}: {}", self.application_id, e);
                None
            }
        }
    }

    /// Periodic check of the deadline and the externally owned status.
    pub async fn tick(&self) -> Option<EndReason> {
        if self.stage() != Stage::Active {
            return None;
        }

        let snapshot = self.timer.remaining();
        if snapshot.expired {
            self.end(EndReason::TimeUp).await;
            return Some(EndReason::TimeUp);
        }

        if let Some(status) = self.application_status().await {
            if status.is_terminal() {
                info!("Application {} became {} externally", self.application_id, status);
                self.end(EndReason::External).await;
                return Some(EndReason::External);
            }
        }

        None
    }

    /// Tick in the background until the session ends.
    pub fn spawn_ticker(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if session.stage() == Stage::Ended {
                    break;
                }
                if let Some(reason) = session.tick().await {
                    debug!("Ticker stopping for {}: {}", session.application_id, reason);
                    break;
                }
            }
        })
    }

    /// Enter `ended`. Returns false if the session had already ended, in which
    /// case nothing is persisted or notified again.
    pub async fn end(&self, reason: EndReason) -> bool {
        self.finish(reason, true).await
    }

    /// With `finalize` false the application status and the notification are
    /// left alone, as for an application that finished in an earlier session.
    async fn finish(&self, reason: EndReason, finalize: bool) -> bool {
        let started = {
            let mut inner = self.inner.lock();
            if inner.stage == Stage::Ended {
                return false;
            }
            let started = finalize && matches!(inner.stage, Stage::Starting | Stage::Active);
            inner.stage = Stage::Ended;
            inner.end_reason = Some(reason);
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.stage_tx.send_replace(Stage::Ended);
            started
        };

        info!("🏁 Interview {} ended: {}", self.application_id, reason);
        self.deps.media.stop_listening().await;
        self.deps.media.stop_playback().await;

        if started {
            if reason != EndReason::External {
                if let Err(e) = self
                    .deps
                    .applications
                    .set_status(&self.application_id, ApplicationStatus::Completed)
                    .await
                {
                    error!("Failed to mark {} completed: {}", self.application_id, e);
                }
            }

            let event = CompletionEvent {
                event_id: Uuid::new_v4(),
                application_id: self.application_id.clone(),
                analytics_url: self.options.analytics_url.clone(),
                reason,
                completed_at: Utc::now(),
            };
            match tokio::time::timeout(
                self.options.notify_timeout,
                self.deps.notifier.interview_completed(&event),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Completion notification failed for {}: {}", self.application_id, e),
                Err(_) => warn!("Completion notification timed out for {}", self.application_id),
            }
        }

        self.timer.clear();
        self.inner.lock().context.clear();
        true
    }
}
