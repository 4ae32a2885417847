use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::info;
use tokio::io::{AsyncBufReadExt, BufReader};

use mockmate_interviewer_lib::analytics::AnalyticsAggregator;
use mockmate_interviewer_lib::interview::{
    FileTimestampStore, MediaDevices, MediaError, PermissionGrant, SystemClock, Utterance,
};
use mockmate_interviewer_lib::{
    notifier_from_config, AppConfig, ApplicationStatus, EndReason, Gateways, InterviewProfile, InterviewSession,
    MemoryConversationStore, PostgresStore, SessionDeps, SessionOptions, Stage, TurnOutcome,
};

const USAGE: &str = "usage:
  mockmate-interviewer interview <application-id> [profile.json] [--save-audio] [--emit-json]
  mockmate-interviewer analytics <application-id>";

/// Console stand-in for camera, microphone and speakers. Finalized
/// transcripts are read from stdin by the driver loop.
struct ConsoleMedia {
    save_audio: bool,
    /// Print each utterance as a JSON line with base64 audio for a front end.
    emit_json: bool,
    played: AtomicUsize,
}

#[async_trait]
impl MediaDevices for ConsoleMedia {
    async fn request_permissions(&self) -> PermissionGrant {
        println!("🎥 Console mode: camera and microphone treated as granted");
        PermissionGrant::all()
    }

    async fn start_listening(&self) {
        println!("🎤 Listening... (type your answer, /end to finish)");
    }

    async fn stop_listening(&self) {}

    async fn play(&self, utterance: &Utterance) -> Result<(), MediaError> {
        if self.emit_json {
            let line = serde_json::to_string(utterance).map_err(|e| MediaError::Playback(e.to_string()))?;
            println!("{}", line);
        } else {
            println!("\n🤖 Interviewer: {}", utterance.text);
        }
        let index = self.played.fetch_add(1, Ordering::SeqCst) + 1;

        if let (true, Some(audio)) = (self.save_audio, &utterance.audio) {
            let path = PathBuf::from(format!("interviewer_{:03}.mp3", index));
            tokio::fs::write(&path, &audio.data)
                .await
                .map_err(|e| MediaError::Playback(e.to_string()))?;
            println!("🔊 Saved {} ({} bytes)", path.display(), audio.len());
        }
        Ok(())
    }

    async fn stop_playback(&self) {}
}

fn load_profile(path: Option<&String>) -> Result<InterviewProfile> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).with_context(|| format!("reading profile {}", path))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing profile {}", path))
        }
        None => Ok(InterviewProfile::default()),
    }
}

async fn run_interview(
    config: AppConfig,
    application_id: String,
    profile_path: Option<&String>,
    media: ConsoleMedia,
) -> Result<()> {
    let profile = load_profile(profile_path)?;
    let gateways = Gateways::from_env(&config)?;
    let store = Arc::new(MemoryConversationStore::new().with_application(&application_id, ApplicationStatus::Accepted));
    let clock = Arc::new(SystemClock);

    let deps = SessionDeps {
        chat: gateways.chat.clone(),
        speech: gateways.speech.clone(),
        media: Arc::new(media),
        store: store.clone(),
        applications: store.clone(),
        notifier: notifier_from_config(&config),
        clock: clock.clone(),
        timestamps: Arc::new(FileTimestampStore::new(&config.interview.timestamp_dir)),
    };
    let options = SessionOptions::for_application(&config, &profile, &application_id);
    let session = Arc::new(InterviewSession::new(application_id.clone(), &profile, deps, options));

    let mut stages = session.subscribe();
    session.open().await?;
    println!("⏳ Starting in {} seconds...", config.interview.countdown_secs);
    session.run_countdown().await?;
    let ticker = session.spawn_ticker(config.interview.tick_interval());
    session.begin().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while session.stage() != Stage::Ended {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => {
                        session.end(EndReason::UserEnded).await;
                        break;
                    }
                };
                if line.trim() == "/end" {
                    session.end(EndReason::UserEnded).await;
                    break;
                }
                match session.handle_transcript(&line).await {
                    Ok(TurnOutcome::Ended(reason)) => println!("🏁 Interview ended: {}", reason),
                    Ok(TurnOutcome::Busy) => println!("⌛ Still answering the previous turn"),
                    Ok(TurnOutcome::Abandoned) => println!("⚠️  Turn abandoned after repeated failures"),
                    Ok(TurnOutcome::Continued { .. }) | Ok(TurnOutcome::Ignored) => {}
                    Err(e) => println!("⚠️  {}", e),
                }
            }
            changed = stages.changed() => {
                if changed.is_err() || *stages.borrow() == Stage::Ended {
                    break;
                }
            }
        }
    }
    ticker.abort();

    println!("\n🏁 Interview finished ({:?}). Scoring...", session.end_reason());
    let aggregator = AnalyticsAggregator::new(gateways.chat.clone(), store, clock, config.analytics.clone());
    let report = aggregator.aggregate(&application_id).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_analytics(config: AppConfig, application_id: String) -> Result<()> {
    let gateways = Gateways::from_env(&config)?;
    let store = Arc::new(PostgresStore::connect(&config.database).await?);
    let aggregator = AnalyticsAggregator::new(gateways.chat, store, Arc::new(SystemClock), config.analytics.clone());

    let report = aggregator.aggregate(&application_id).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    println!("\n📋 Summary: {}", serde_json::to_string_pretty(&report.summary())?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let media = ConsoleMedia {
        save_audio: args.iter().any(|a| a == "--save-audio"),
        emit_json: args.iter().any(|a| a == "--emit-json"),
        played: AtomicUsize::new(0),
    };
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();

    let config = AppConfig::load()?;
    info!("MockMate interviewer starting");

    match positional.as_slice() {
        [cmd, app_id, rest @ ..] if cmd.as_str() == "interview" && rest.len() <= 1 => {
            run_interview(config, app_id.to_string(), rest.first().copied(), media).await
        }
        [cmd, app_id] if cmd.as_str() == "analytics" => run_analytics(config, app_id.to_string()).await,
        _ => bail!("{}", USAGE),
    }
}
