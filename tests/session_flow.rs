mod common;

use std::time::Duration;

use common::*;
use mockmate_interviewer_lib::interview::prompts::{ABANDON_PROMPT, OPENING_FALLBACK, REPEAT_FALLBACK};
use mockmate_interviewer_lib::interview::{EndReason, PermissionGrant, SessionError, Stage, TurnOutcome};
use mockmate_interviewer_lib::store::{ApplicationDirectory, ApplicationStatus, ConversationStore, TurnEntry};

#[tokio::test]
async fn test_start_runs_opening_exchange() {
    let h = HarnessBuilder::new(ScriptedChat::new(vec![Ok(turn_json("Hi! Tell me about yourself.", false))])).build();

    let outcome = h.session.start().await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Continued { .. }));
    assert_eq!(h.session.stage(), Stage::Active);
    assert_eq!(h.media.spoken(), vec!["Hi! Tell me about yourself."]);
    assert!(h.media.played.lock()[0].audio.is_some());
    assert_eq!(h.media.listen_count(), 1);
    assert_eq!(h.store.status(APP_ID).await.unwrap(), ApplicationStatus::InProgress);

    let turns = h.store.list_by_application(APP_ID).await.unwrap();
    assert_eq!(turns.len(), 1);
    assert!(matches!(turns[0].entry, TurnEntry::Interviewer(_)));

    let first_request = &h.chat.requests.lock()[0];
    assert!(first_request.messages[0].content.contains("AI interviewer"));
    assert!(first_request.messages[1].content.contains("candidateResponse"));
}

#[tokio::test]
async fn test_permission_denial_returns_to_idle() {
    let h = HarnessBuilder::new(ScriptedChat::new(vec![]))
        .grant(PermissionGrant { camera: true, microphone: false })
        .build();

    let err = h.session.open().await.unwrap_err();
    assert!(matches!(err, SessionError::PermissionDenied { camera: true, microphone: false }));
    assert_eq!(h.session.stage(), Stage::Idle);
    assert_eq!(h.chat.calls(), 0);

    assert!(matches!(
        h.session.handle_transcript("hello").await,
        Err(SessionError::NotActive(Stage::Idle))
    ));
}

#[tokio::test]
async fn test_turn_pair_persisted_in_order() {
    let h = HarnessBuilder::new(ScriptedChat::new(vec![
        Ok(turn_json("Welcome! Tell me about yourself.", false)),
        Ok(format!("Sure thing: {}", turn_json("What is ownership in Rust?", false))),
    ]))
    .build();
    h.session.start().await.unwrap();

    let outcome = h.session.handle_transcript("  I am a systems engineer.  ").await.unwrap();
    match outcome {
        TurnOutcome::Continued { turn } => assert_eq!(turn.text, "What is ownership in Rust?"),
        other => panic!("unexpected outcome {:?}", other),
    }

    let turns = h.store.list_by_application(APP_ID).await.unwrap();
    let shape: Vec<(u32, &str, &str)> = turns
        .iter()
        .map(|t| (t.sequence, t.entry.speaker(), t.entry.text()))
        .collect();
    assert_eq!(
        shape,
        vec![
            (0, "interviewer", "Welcome! Tell me about yourself."),
            (1, "candidate", "I am a systems engineer."),
            (2, "interviewer", "What is ownership in Rust?"),
        ]
    );
    assert_eq!(h.media.listen_count(), 2);
}

#[tokio::test]
async fn test_empty_transcript_is_ignored() {
    let h = HarnessBuilder::new(ScriptedChat::new(vec![])).build();
    h.session.start().await.unwrap();
    let calls = h.chat.calls();

    assert_eq!(h.session.handle_transcript("   ").await.unwrap(), TurnOutcome::Ignored);
    assert_eq!(h.chat.calls(), calls);
}

#[tokio::test]
async fn test_near_end_flag_reaches_model() {
    let h = HarnessBuilder::new(ScriptedChat::new(vec![])).options(test_options(60_000)).build();
    h.session.start().await.unwrap();

    h.clock.advance(40_000);
    h.session.handle_transcript("Still here").await.unwrap();

    let requests = h.chat.requests.lock();
    let last = requests.last().unwrap();
    let candidate = &last.messages.last().unwrap().content;
    assert!(candidate.contains("\"nearEnd\":true"), "got {}", candidate);
}

/// Scenario A: the candidate never speaks and the deadline passes.
#[tokio::test]
async fn test_silent_candidate_times_out_once() {
    let h = HarnessBuilder::new(ScriptedChat::new(vec![])).options(test_options(60_000)).build();
    h.session.start().await.unwrap();

    let mut stages = h.session.subscribe();
    let ticker = h.session.spawn_ticker(Duration::from_millis(5));

    h.clock.advance(30_000);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.session.stage(), Stage::Active);

    h.clock.advance(31_000);
    tokio::time::timeout(Duration::from_secs(2), async {
        while *stages.borrow_and_update() != Stage::Ended {
            stages.changed().await.unwrap();
        }
    })
    .await
    .expect("session should end when time is up");
    ticker.await.unwrap();

    assert_eq!(h.session.end_reason(), Some(EndReason::TimeUp));
    assert_eq!(h.session.tick().await, None);
    assert!(!h.session.end(EndReason::UserEnded).await);
    assert!(!h.session.end(EndReason::TimeUp).await);

    assert_eq!(h.notifier.count(), 1);
    assert_eq!(h.notifier.events.lock()[0].reason, EndReason::TimeUp);
    assert_eq!(h.store.status(APP_ID).await.unwrap(), ApplicationStatus::Completed);
    assert!(mockmate_interviewer_lib::interview::StartTimestampStore::load(h.timestamps.as_ref(), APP_ID).is_none());
    assert_eq!(h.store.turn_count(APP_ID), 1);
}

/// Scenario B: the model closes the interview on turn 3 with time to spare.
#[tokio::test]
async fn test_model_ends_interview_early() {
    let h = HarnessBuilder::new(ScriptedChat::new(vec![
        Ok(turn_json("Welcome!", false)),
        Ok(turn_json("Question one?", false)),
        Ok(turn_json("Question two?", false)),
        Ok(turn_json("Thank you for your time.", true)),
    ]))
    .build();
    h.session.start().await.unwrap();

    for answer in ["first answer", "second answer"] {
        h.clock.advance(40_000);
        assert!(matches!(
            h.session.handle_transcript(answer).await.unwrap(),
            TurnOutcome::Continued { .. }
        ));
    }

    h.clock.advance(40_000);
    let outcome = h.session.handle_transcript("third answer").await.unwrap();
    assert_eq!(outcome, TurnOutcome::Ended(EndReason::ModelEnded));
    assert_eq!(h.session.stage(), Stage::Ended);

    let remaining = h.session.timer().remaining();
    assert!(!remaining.expired);

    assert_eq!(h.media.spoken().last().map(String::as_str), Some("Thank you for your time."));
    assert_eq!(h.media.listen_count(), 3);
    assert_eq!(h.notifier.count(), 1);
    assert_eq!(h.notifier.events.lock()[0].reason, EndReason::ModelEnded);
    assert_eq!(h.store.turn_count(APP_ID), 7);

    assert!(matches!(
        h.session.handle_transcript("hello?").await,
        Err(SessionError::NotActive(Stage::Ended))
    ));
    assert_eq!(h.session.tick().await, None);
    assert_eq!(h.notifier.count(), 1);
}

/// Scenario C: every chat key is rate limited.
#[tokio::test]
async fn test_exhausted_pool_degrades_to_fallback_prompts() {
    let h = HarnessBuilder::new(ScriptedChat::new(vec![Ok(turn_json("Welcome!", false))]).otherwise(Err(rate_limited())))
        .chat_keys(3)
        .build();
    h.session.start().await.unwrap();

    let first = h.session.handle_transcript("answer one").await.unwrap();
    match first {
        TurnOutcome::Continued { turn } => {
            assert_eq!(turn.text, REPEAT_FALLBACK);
            assert!(turn.is_fallback);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(h.session.retry_count(), 1);
    assert_eq!(h.chat.calls(), 1 + 3);

    h.session.handle_transcript("answer two").await.unwrap();
    assert_eq!(h.session.retry_count(), 2);

    let third = h.session.handle_transcript("answer three").await.unwrap();
    assert_eq!(third, TurnOutcome::Abandoned);
    assert_eq!(h.session.retry_count(), 0);
    assert_eq!(h.session.stage(), Stage::Active);

    assert_eq!(
        h.media.spoken(),
        vec!["Welcome!", REPEAT_FALLBACK, REPEAT_FALLBACK, ABANDON_PROMPT]
    );
    assert_eq!(h.media.listen_count(), 4);
    assert_eq!(h.notifier.count(), 0);

    let keys = h.chat.keys_seen.lock().clone();
    assert_eq!(&keys[1..4], &["chat-0", "chat-1", "chat-2"]);
}

#[tokio::test]
async fn test_opening_fallback_is_greeting() {
    let h = HarnessBuilder::new(ScriptedChat::new(vec![Ok("I am not JSON".into())])).build();
    h.session.start().await.unwrap();
    assert_eq!(h.media.spoken(), vec![OPENING_FALLBACK]);
    assert_eq!(h.session.retry_count(), 1);
}

#[tokio::test]
async fn test_valid_turn_resets_retry_count() {
    let h = HarnessBuilder::new(ScriptedChat::new(vec![
        Ok(turn_json("Welcome!", false)),
        Ok("garbage".into()),
        Ok(turn_json("Back on track?", false)),
    ]))
    .build();
    h.session.start().await.unwrap();

    h.session.handle_transcript("one").await.unwrap();
    assert_eq!(h.session.retry_count(), 1);
    h.session.handle_transcript("two").await.unwrap();
    assert_eq!(h.session.retry_count(), 0);
}

#[tokio::test]
async fn test_speech_failure_still_delivers_text() {
    let h = HarnessBuilder::new(ScriptedChat::new(vec![Ok(turn_json("Welcome!", false))]))
        .speech(ScriptedSpeech::failing())
        .build();
    h.session.start().await.unwrap();

    let played = h.media.played.lock().clone();
    assert_eq!(played.len(), 1);
    assert_eq!(played[0].text, "Welcome!");
    assert!(played[0].audio.is_none());
    assert_eq!(h.media.listen_count(), 1);
}

#[tokio::test]
async fn test_terminal_status_ends_before_opening() {
    let h = HarnessBuilder::new(ScriptedChat::new(vec![])).status(ApplicationStatus::Completed).build();

    let outcome = h.session.start().await.unwrap();
    assert_eq!(outcome, TurnOutcome::Ended(EndReason::External));
    assert_eq!(h.session.stage(), Stage::Ended);
    assert_eq!(h.chat.calls(), 0);
    assert_eq!(h.media.listen_count(), 0);
    assert_eq!(h.notifier.count(), 0);
    assert_eq!(h.store.status(APP_ID).await.unwrap(), ApplicationStatus::Completed);
    assert!(!h.session.end(EndReason::UserEnded).await);
    assert_eq!(h.notifier.count(), 0);
}

#[tokio::test]
async fn test_reload_resumes_persisted_log() {
    let h = HarnessBuilder::new(ScriptedChat::new(vec![])).build();
    h.session.start().await.unwrap();
    h.session.handle_transcript("answer before reload").await.unwrap();
    h.clock.advance(60_000);

    let resumed = h.reload();
    resumed.start().await.unwrap();
    resumed.handle_transcript("answer after reload").await.unwrap();

    let turns = h.store.list_by_application(APP_ID).await.unwrap();
    let shape: Vec<(u32, &str, &str)> = turns
        .iter()
        .map(|t| (t.sequence, t.entry.speaker(), t.entry.text()))
        .collect();
    assert_eq!(
        shape,
        vec![
            (0, "interviewer", "Tell me more."),
            (1, "candidate", "answer before reload"),
            (2, "interviewer", "Tell me more."),
            (3, "interviewer", "Tell me more."),
            (4, "candidate", "answer after reload"),
            (5, "interviewer", "Tell me more."),
        ]
    );

    let last_request = h.chat.requests.lock().last().cloned().unwrap();
    assert!(last_request.messages.iter().any(|m| m.content.contains("answer before reload")));
    assert_eq!(resumed.timer().remaining().remaining_ms, 9 * 60_000);
}

#[tokio::test]
async fn test_empty_reply_falls_back_without_rotating_keys() {
    let h = HarnessBuilder::new(ScriptedChat::new(vec![Ok(turn_json("Welcome!", false)), Ok(String::new())])).build();
    h.session.start().await.unwrap();

    let outcome = h.session.handle_transcript("my answer").await.unwrap();
    match outcome {
        TurnOutcome::Continued { turn } => {
            assert_eq!(turn.text, REPEAT_FALLBACK);
            assert!(turn.is_fallback);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(h.chat.calls(), 2);
    assert_eq!(h.session.retry_count(), 1);
}

#[tokio::test]
async fn test_external_completion_observed_on_tick() {
    let h = HarnessBuilder::new(ScriptedChat::new(vec![])).build();
    h.session.start().await.unwrap();

    h.store.set_status(APP_ID, ApplicationStatus::Rejected).await.unwrap();
    assert_eq!(h.session.tick().await, Some(EndReason::External));
    assert_eq!(h.store.status(APP_ID).await.unwrap(), ApplicationStatus::Rejected);
    assert_eq!(h.notifier.count(), 1);
}

#[tokio::test]
async fn test_end_during_speech_does_not_resume_listening() {
    let h = HarnessBuilder::new(ScriptedChat::new(vec![Ok(turn_json("Welcome!", false))]))
        .speech(ScriptedSpeech::slow(Duration::from_millis(200)))
        .build();
    h.session.start().await.unwrap();
    let listens = h.media.listen_count();
    let played = h.media.played.lock().len();

    let session = h.session.clone();
    let turn = tokio::spawn(async move { session.handle_transcript("a long answer").await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.session.handle_transcript("talking over").await.unwrap(), TurnOutcome::Busy);
    assert!(h.session.end(EndReason::UserEnded).await);

    let outcome = turn.await.unwrap().unwrap();
    assert_eq!(outcome, TurnOutcome::Ended(EndReason::UserEnded));
    assert_eq!(h.media.listen_count(), listens);
    assert_eq!(h.media.played.lock().len(), played);
    assert!(h.media.playback_stopped.load(std::sync::atomic::Ordering::SeqCst) >= 1);
    assert_eq!(h.notifier.count(), 1);
}

#[tokio::test]
async fn test_expired_deadline_ends_on_next_transcript() {
    let h = HarnessBuilder::new(ScriptedChat::new(vec![])).options(test_options(60_000)).build();
    h.session.start().await.unwrap();
    let calls = h.chat.calls();

    h.clock.advance(61_000);
    let outcome = h.session.handle_transcript("am I late?").await.unwrap();
    assert_eq!(outcome, TurnOutcome::Ended(EndReason::TimeUp));
    assert_eq!(h.chat.calls(), calls);
    assert_eq!(h.notifier.count(), 1);
}
