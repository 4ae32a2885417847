pub mod conversation;
pub mod media;
pub mod prompts;
pub mod session;
pub mod timer;
pub mod validator;

pub use conversation::{encode_candidate, encode_interviewer, ConversationContext};
pub use media::{MediaDevices, MediaError, PermissionGrant, Utterance};
pub use prompts::{system_prompt, InterviewProfile, ProjectSummary};
pub use session::{
    EndReason, InterviewSession, SessionDeps, SessionError, SessionOptions, SessionSnapshot, Stage, TurnOutcome,
};
pub use timer::{
    Clock, FileTimestampStore, InterviewTimer, MemoryTimestampStore, StartTimestampStore, SystemClock, TimerSnapshot,
};
pub use validator::{extract_json_object, validate, FallbackReason, ValidatedTurn};
