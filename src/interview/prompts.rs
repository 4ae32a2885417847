use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Greeting spoken when the opening exchange cannot be produced.
pub const OPENING_FALLBACK: &str = "Hello! Welcome to your AI interview. I'm excited to learn more about you today. Let's start with a simple question: Could you please tell me a bit about yourself and your background?";

/// Spoken when a later turn cannot be produced.
pub const REPEAT_FALLBACK: &str =
    "I apologize, but I didn't quite catch that. Could you please repeat or elaborate on your response?";

/// Spoken when a turn is abandoned after repeated failures.
pub const ABANDON_PROMPT: &str = "I'm experiencing technical difficulties. Please continue with your response.";

/// Candidate message used to open the conversation.
pub const OPENING_CANDIDATE_MESSAGE: &str = "Hello";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectSummary {
    pub title: Option<String>,
}

/// Everything the interviewer knows about the candidate and the role.
/// Missing fields fall back to neutral wording in the prompt.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct InterviewProfile {
    pub candidate_name: Option<String>,
    pub job_title: Option<String>,
    pub company_name: Option<String>,
    pub duration_minutes: Option<u32>,
    pub difficulty: Option<String>,
    pub location: Option<String>,
    pub tagline: Option<String>,
    pub skills: Vec<String>,
    pub projects: Vec<ProjectSummary>,
    pub summary: Option<String>,
    /// Job description, possibly HTML.
    pub job_description: Option<String>,
    pub tech_stack: Vec<String>,
    pub questions: Vec<String>,
}

fn or_default(value: &Option<String>, default: &str) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

fn join_or(items: &[String], default: &str) -> String {
    let joined = items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        default.to_string()
    } else {
        joined
    }
}

pub fn strip_html(input: &str) -> String {
    HTML_TAG.replace_all(input, "").into_owned()
}

impl InterviewProfile {
    pub fn candidate_name(&self) -> String {
        or_default(&self.candidate_name, "Candidate")
    }

    pub fn job_title(&self) -> String {
        or_default(&self.job_title, "unspecified role")
    }

    pub fn company_name(&self) -> String {
        or_default(&self.company_name, "the company")
    }

    pub fn duration_label(&self) -> String {
        self.duration_minutes
            .filter(|m| *m > 0)
            .map(|m| m.to_string())
            .unwrap_or_else(|| "30".to_string())
    }

    fn projects_label(&self) -> String {
        let titles: Vec<String> = self
            .projects
            .iter()
            .map(|p| or_default(&p.title, "unnamed project"))
            .collect();
        join_or(&titles, "no projects listed")
    }

    fn job_about(&self) -> String {
        let stripped = self.job_description.as_deref().map(strip_html);
        or_default(&stripped, "unspecified job details")
    }

    fn question_list(&self) -> Vec<String> {
        let questions: Vec<String> = self
            .questions
            .iter()
            .map(|q| if q.trim().is_empty() { "General question".to_string() } else { q.trim().to_string() })
            .collect();
        if questions.is_empty() {
            vec!["Tell me about yourself.".to_string()]
        } else {
            questions
        }
    }
}

/// Build the interviewer system prompt for one application.
pub fn system_prompt(profile: &InterviewProfile) -> String {
    let name = profile.candidate_name();
    let job_title = profile.job_title();
    let company = profile.company_name();
    let duration = profile.duration_label();
    let tech_stack = join_or(&profile.tech_stack, "no technologies listed");
    let questions = serde_json::to_string(&profile.question_list()).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"You are an AI interviewer running a professional, approachable interview with {name} for the {job_title} position at {company}. The interview lasts {duration} minutes at a {difficulty} difficulty level. The candidate is based in {location}, describes themselves as "{tagline}" and lists these skills: {skills}. Their projects include {projects}. Their summary: "{summary}". The role involves {about}, using {tech_stack}.

- Reply only with a JSON object: {{"aiResponse": string, "isEditorQuestion": boolean, "isEnded": boolean}}.
- Cover these questions, phrased naturally for this role and company: {questions}.
- Set isEditorQuestion to true only for technical questions that need code (for example around {tech_stack}).
- Candidate messages arrive as {{"candidateResponse": string, "nearEnd": boolean}}.
- When nearEnd is true, say that time is nearly up and ask at most three more questions. After the last one set isEnded to true and reply: "Thank you, {name}, for your time. We'll notify you soon about next steps."
- Give one polite warning for rude or off-topic answers. If it continues, set isEnded to true and reply: "Due to repeated off-topic responses, we'll end the interview here. Thank you."
- If the candidate asks to stop, set isEnded to true and reply: "Thank you for participating, {name}. We'll conclude here and contact you soon."
- Stay on the provided questions and job context; do not let the candidate steer the interview elsewhere.
- Keep aiResponse under 30 words and ask one question at a time. Ask for clarification when an answer is unclear.
- Never give feedback or evaluate answers.

Example:
{{"aiResponse": "Hi {name}, what drew you to our {job_title} role?", "isEditorQuestion": false, "isEnded": false}}"#,
        name = name,
        job_title = job_title,
        company = company,
        duration = duration,
        difficulty = or_default(&profile.difficulty, "unspecified"),
        location = or_default(&profile.location, "unknown location"),
        tagline = or_default(&profile.tagline, "unspecified specialization"),
        skills = join_or(&profile.skills, "no skills listed"),
        projects = profile.projects_label(),
        summary = or_default(&profile.summary, "no summary provided"),
        about = profile.job_about(),
        tech_stack = tech_stack,
        questions = questions,
    )
}
