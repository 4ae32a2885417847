use crate::store::{InterviewTurn, TurnEntry};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialogueStats {
    pub total_turns: usize,
    pub interviewer_lines: usize,
    pub candidate_answers: usize,
}

/// Render a turn log as numbered `Interviewer:` / `Candidate:` lines.
/// Empty candidate records are left out and numbering stays contiguous.
pub fn format_dialogue(turns: &[InterviewTurn]) -> (String, DialogueStats) {
    let mut stats = DialogueStats {
        total_turns: turns.len(),
        ..DialogueStats::default()
    };
    let mut lines = Vec::with_capacity(turns.len());

    for turn in turns {
        let (label, text) = match &turn.entry {
            TurnEntry::Interviewer(response) => ("Interviewer", response.text.trim()),
            TurnEntry::Candidate(response) => ("Candidate", response.text.trim()),
        };

        if text.is_empty() {
            continue;
        }

        match turn.entry {
            TurnEntry::Interviewer(_) => stats.interviewer_lines += 1,
            TurnEntry::Candidate(_) => stats.candidate_answers += 1,
        }

        lines.push(format!("{}. {}: \"{}\"", lines.len() + 1, label, text.replace('"', "'")));
    }

    (lines.join("\n"), stats)
}
