use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Wall-clock source in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Durable home of each session's absolute start timestamp. Survives
/// process restarts so the deadline does not move on resume.
pub trait StartTimestampStore: Send + Sync {
    fn load(&self, session_id: &str) -> Option<u64>;
    fn save(&self, session_id: &str, start_ms: u64) -> io::Result<()>;
    fn clear(&self, session_id: &str) -> io::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryTimestampStore {
    starts: Mutex<HashMap<String, u64>>,
}

impl MemoryTimestampStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StartTimestampStore for MemoryTimestampStore {
    fn load(&self, session_id: &str) -> Option<u64> {
        self.starts.lock().get(session_id).copied()
    }

    fn save(&self, session_id: &str, start_ms: u64) -> io::Result<()> {
        self.starts.lock().insert(session_id.to_string(), start_ms);
        Ok(())
    }

    fn clear(&self, session_id: &str) -> io::Result<()> {
        self.starts.lock().remove(session_id);
        Ok(())
    }
}

/// One file per session under a directory.
#[derive(Debug, Clone)]
pub struct FileTimestampStore {
    dir: PathBuf,
}

impl FileTimestampStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        let safe: String = session_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.start", safe))
    }
}

impl StartTimestampStore for FileTimestampStore {
    fn load(&self, session_id: &str) -> Option<u64> {
        let raw = std::fs::read_to_string(self.path_for(session_id)).ok()?;
        match raw.trim().parse() {
            Ok(start) => Some(start),
            Err(e) => {
                warn!("Ignoring corrupt start timestamp for {}: {}", session_id, e);
                None
            }
        }
    }

    fn save(&self, session_id: &str, start_ms: u64) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(session_id), start_ms.to_string())
    }

    fn clear(&self, session_id: &str) -> io::Result<()> {
        match std::fs::remove_file(self.path_for(session_id)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub remaining_ms: u64,
    /// Sticky once the remaining time first drops into the near-end window.
    pub near_end: bool,
    /// True only on the reading where `near_end` first became true.
    pub near_end_started: bool,
    pub expired: bool,
}

#[derive(Debug, Default)]
struct TimerState {
    start_ms: Option<u64>,
    near_end: bool,
    expired: bool,
}

/// Deadline tracking for one interview.
pub struct InterviewTimer {
    session_id: String,
    duration_ms: u64,
    near_end_window_ms: u64,
    clock: Arc<dyn Clock>,
    store: Arc<dyn StartTimestampStore>,
    state: Mutex<TimerState>,
}

impl InterviewTimer {
    pub fn new(
        session_id: impl Into<String>,
        duration_ms: u64,
        near_end_window_ms: u64,
        clock: Arc<dyn Clock>,
        store: Arc<dyn StartTimestampStore>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            duration_ms,
            near_end_window_ms,
            clock,
            store,
            state: Mutex::new(TimerState::default()),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().start_ms.is_some()
    }

    /// Start the deadline, resuming from a persisted start if one exists.
    pub fn start(&self) -> u64 {
        let mut state = self.state.lock();
        if let Some(start) = state.start_ms {
            return start;
        }

        let start = match self.store.load(&self.session_id) {
            Some(persisted) => {
                info!("⏱️ Resuming timer for {} from persisted start {}", self.session_id, persisted);
                persisted
            }
            None => {
                let now = self.clock.now_ms();
                if let Err(e) = self.store.save(&self.session_id, now) {
                    warn!("Failed to persist start timestamp for {}: {}", self.session_id, e);
                }
                info!("⏱️ Timer started for {} ({} ms)", self.session_id, self.duration_ms);
                now
            }
        };

        state.start_ms = Some(start);
        start
    }

    /// Current reading. Before `start` the full duration remains.
    pub fn remaining(&self) -> TimerSnapshot {
        let mut state = self.state.lock();

        if state.expired {
            return TimerSnapshot {
                remaining_ms: 0,
                near_end: state.near_end,
                near_end_started: false,
                expired: true,
            };
        }

        let start = match self.store.load(&self.session_id).or(state.start_ms) {
            Some(start) if state.start_ms.is_some() => start,
            _ => {
                return TimerSnapshot {
                    remaining_ms: self.duration_ms,
                    near_end: false,
                    near_end_started: false,
                    expired: false,
                }
            }
        };

        let elapsed = self.clock.now_ms().saturating_sub(start);
        let remaining_ms = self.duration_ms.saturating_sub(elapsed);

        let mut near_end_started = false;
        if !state.near_end && remaining_ms <= self.near_end_window_ms {
            state.near_end = true;
            near_end_started = true;
            info!("⏳ {} entering final {} ms", self.session_id, self.near_end_window_ms);
        }

        if remaining_ms == 0 {
            state.expired = true;
            info!("⏰ Time is up for {}", self.session_id);
            if let Err(e) = self.store.clear(&self.session_id) {
                warn!("Failed to clear start timestamp for {}: {}", self.session_id, e);
            }
        }

        debug!("{} remaining {} ms", self.session_id, remaining_ms);
        TimerSnapshot {
            remaining_ms,
            near_end: state.near_end,
            near_end_started,
            expired: state.expired,
        }
    }

    /// Drop the persisted start timestamp.
    pub fn clear(&self) {
        if let Err(e) = self.store.clear(&self.session_id) {
            warn!("Failed to clear start timestamp for {}: {}", self.session_id, e);
        }
    }
}
