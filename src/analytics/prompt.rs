use crate::config::AnalyticsSettings;
use crate::gateway::{ChatMessage, ChatRequest};

use super::dialogue::DialogueStats;

pub const SCORING_PROMPT: &str = r#"You are an expert interview analyst. Score the interview transcript you are given.

Return one JSON object with exactly this shape. All numbers are plain JSON numbers.
{
  "overall": {"confidence": 0-100, "communication": 0-100, "technical": 0-100, "overall": 0-100},
  "radar": {"communication": 0-100, "technical": 0-100, "problemSolving": 0-100, "confidence": 0-100, "professionalism": 0-100},
  "questionScores": {"<question number>": 0-100},
  "detailedMetrics": {"clarity": 0-10, "grammar": 0-10, "structure": 0-10, "comprehension": 0-10, "knowledgeDepth": 0-10, "practicalApplication": 0-10, "learningAgility": 0-10, "stressHandling": 0-10},
  "timeSeries": {"confidence": [0-100 per candidate answer], "accuracy": [0-100 per candidate answer], "fluency": [0-100 per candidate answer]},
  "keywords": ["technical terms and skills the candidate used"],
  "insights": {
    "strengths": ["..."],
    "improvements": ["..."],
    "hrInsight": "short paragraph for the hiring team",
    "recommendation": "Strong Hire | Hire | No Hire | Strong No Hire",
    "riskFactors": ["..."]
  }
}

Base every score on the transcript only. Use 0 in a time series entry when an answer cannot be scored. Do not add fields or commentary outside the JSON object."#;

/// Build the single scoring call for one transcript.
pub fn scoring_request(dialogue: &str, stats: &DialogueStats, settings: &AnalyticsSettings) -> ChatRequest {
    let user = format!(
        "Interview transcript ({} interviewer lines, {} candidate answers):\n\n{}",
        stats.interviewer_lines, stats.candidate_answers, dialogue
    );

    ChatRequest::new(vec![ChatMessage::system(SCORING_PROMPT), ChatMessage::user(user)])
        .with_sampling(settings.temperature, settings.max_tokens)
}
