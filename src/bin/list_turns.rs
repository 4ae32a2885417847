use mockmate_interviewer_lib::store::{ConversationStore, PostgresStore, TurnEntry};
use mockmate_interviewer_lib::AppConfig;

#[tokio::main]
async fn main() {
    let application_id = match std::env::args().nth(1) {
        Some(id) => id,
        None => {
            eprintln!("usage: list_turns <application-id>");
            std::process::exit(2);
        }
    };

    println!("🔧 Listing conversation log for {}...", application_id);

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("❌ Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let store = match PostgresStore::connect(&config.database).await {
        Ok(store) => {
            println!("✅ Connected to database");
            store
        }
        Err(e) => {
            println!("❌ Database connection failed: {}", e);
            std::process::exit(1);
        }
    };

    match store.list_by_application(&application_id).await {
        Ok(turns) => {
            println!("\n📋 Found {} records:", turns.len());
            println!("{:-<100}", "");
            println!("{:<6} {:<12} {:<26} {}", "Seq", "Speaker", "Created", "Text");
            println!("{:-<100}", "");

            for turn in &turns {
                let flags = match &turn.entry {
                    TurnEntry::Interviewer(r) if r.is_ended => " [ended]",
                    TurnEntry::Interviewer(r) if r.is_fallback => " [fallback]",
                    TurnEntry::Interviewer(r) if r.is_editor_question => " [editor]",
                    TurnEntry::Candidate(r) if r.near_end => " [near end]",
                    _ => "",
                };
                println!(
                    "{:<6} {:<12} {:<26} {}{}",
                    turn.sequence,
                    turn.entry.speaker(),
                    turn.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    turn.entry.text().chars().take(60).collect::<String>(),
                    flags
                );
            }
            println!("{:-<100}", "");
        }
        Err(e) => println!("❌ Failed to query turns: {}", e),
    }
}
