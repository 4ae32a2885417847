use log::warn;
use serde::Deserialize;

use super::prompts::{OPENING_FALLBACK, REPEAT_FALLBACK};
use crate::store::InterviewerResponse;

/// Why a model reply was replaced by a fallback turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    NoJsonObject,
    InvalidJson(String),
    EmptyResponse,
    ProviderUnavailable,
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackReason::NoJsonObject => write!(f, "no JSON object in reply"),
            FallbackReason::InvalidJson(e) => write!(f, "invalid turn JSON: {}", e),
            FallbackReason::EmptyResponse => write!(f, "aiResponse is empty"),
            FallbackReason::ProviderUnavailable => write!(f, "chat provider unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedTurn {
    Valid(InterviewerResponse),
    Fallback {
        turn: InterviewerResponse,
        reason: FallbackReason,
    },
}

impl ValidatedTurn {
    pub fn turn(&self) -> &InterviewerResponse {
        match self {
            ValidatedTurn::Valid(turn) => turn,
            ValidatedTurn::Fallback { turn, .. } => turn,
        }
    }

    pub fn into_turn(self) -> InterviewerResponse {
        match self {
            ValidatedTurn::Valid(turn) => turn,
            ValidatedTurn::Fallback { turn, .. } => turn,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ValidatedTurn::Fallback { .. })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTurn {
    ai_response: String,
    #[serde(default)]
    is_editor_question: bool,
    #[serde(default)]
    is_ended: bool,
}

/// The deterministic fallback turn for this position in the session.
pub fn fallback_turn(is_first_turn: bool, reason: FallbackReason) -> ValidatedTurn {
    let text = if is_first_turn { OPENING_FALLBACK } else { REPEAT_FALLBACK };
    ValidatedTurn::Fallback {
        turn: InterviewerResponse::fallback(text),
        reason,
    }
}

/// Return the first balanced `{...}` substring of `raw`, honoring JSON
/// string literals and escapes.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Turn raw model text into an interviewer turn. Total: every input yields
/// either a valid turn or a fallback.
pub fn validate(raw: &str, is_first_turn: bool) -> ValidatedTurn {
    let json = match extract_json_object(raw) {
        Some(json) => json,
        None => {
            warn!("Model reply contained no JSON object, using fallback");
            return fallback_turn(is_first_turn, FallbackReason::NoJsonObject);
        }
    };

    let parsed: RawTurn = match serde_json::from_str(json) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Model reply failed turn schema: {}", e);
            return fallback_turn(is_first_turn, FallbackReason::InvalidJson(e.to_string()));
        }
    };

    let text = parsed.ai_response.trim();
    if text.is_empty() {
        warn!("Model reply had an empty aiResponse, using fallback");
        return fallback_turn(is_first_turn, FallbackReason::EmptyResponse);
    }

    ValidatedTurn::Valid(InterviewerResponse {
        text: text.to_string(),
        is_editor_question: parsed.is_editor_question,
        is_ended: parsed.is_ended,
        is_fallback: false,
    })
}
