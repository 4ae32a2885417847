use serde_json::json;

use crate::gateway::ChatMessage;
use crate::store::{CandidateResponse, InterviewerResponse};

/// Encode a candidate utterance the way the system prompt announces it.
pub fn encode_candidate(response: &CandidateResponse) -> String {
    json!({
        "candidateResponse": response.text,
        "nearEnd": response.near_end,
    })
    .to_string()
}

/// Encode an interviewer turn as the assistant would have written it.
pub fn encode_interviewer(response: &InterviewerResponse) -> String {
    json!({
        "aiResponse": response.text,
        "isEditorQuestion": response.is_editor_question,
        "isEnded": response.is_ended,
    })
    .to_string()
}

/// Running dialogue for one session.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    system_prompt: String,
    history: Vec<ChatMessage>,
    max_messages: usize,
}

impl ConversationContext {
    /// `max_messages` bounds each request including the system prompt.
    pub fn new(system_prompt: impl Into<String>, max_messages: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            max_messages: max_messages.max(2),
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn push_candidate(&mut self, response: &CandidateResponse) {
        self.history.push(ChatMessage::user(encode_candidate(response)));
    }

    pub fn push_interviewer(&mut self, response: &InterviewerResponse) {
        self.history.push(ChatMessage::assistant(encode_interviewer(response)));
    }

    /// System prompt followed by the most recent history that fits.
    pub fn request_messages(&self) -> Vec<ChatMessage> {
        let keep = self.max_messages - 1;
        let skip = self.history.len().saturating_sub(keep);

        let mut messages = Vec::with_capacity(keep.min(self.history.len()) + 1);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(self.history[skip..].iter().cloned());
        messages
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ChatRole;

    #[test]
    fn test_candidate_encoding() {
        let encoded = encode_candidate(&CandidateResponse { text: "Hi \"there\"".into(), near_end: true });
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["candidateResponse"], "Hi \"there\"");
        assert_eq!(value["nearEnd"], true);
    }

    #[test]
    fn test_request_keeps_system_prompt_and_latest_history() {
        let mut context = ConversationContext::new("system", 50);
        for i in 0..60 {
            context.push_candidate(&CandidateResponse { text: format!("answer {}", i), near_end: false });
        }

        let messages = context.request_messages();
        assert_eq!(messages.len(), 50);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[1].content.contains("answer 11"));
        assert!(messages[49].content.contains("answer 59"));
    }

    #[test]
    fn test_short_history_is_sent_whole() {
        let mut context = ConversationContext::new("system", 50);
        context.push_interviewer(&InterviewerResponse::new("Welcome"));
        let messages = context.request_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, ChatRole::Assistant);
    }
}
