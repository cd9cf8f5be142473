//! leafdoc - plant health scans and plant-care chat
//!
//! `scan` analyzes a leaf photo, `chat` asks the plant doctor one question,
//! `history` prints the stored conversation.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use leafdoc_core::{
    AnalysisResult, ChatOrchestrator, ChatTurn, Config, ConversationIdentity, ConversationLog,
    HttpInferenceClient, ScanOrchestrator, SendOutcome, SqliteStore,
};

#[derive(Parser)]
#[command(name = "leafdoc")]
#[command(about = "Plant health scans and plant-care chat")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a photo of a leaf
    Scan {
        /// Path to the image (jpeg, png, webp, heic)
        image: PathBuf,

        /// Output format: text (default) or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Send one message to the plant doctor and print the reply
    Chat {
        /// Conversation owner
        #[arg(short, long, default_value = "local")]
        user: String,

        /// The message to send
        message: String,
    },
    /// Print the current conversation window
    History {
        /// Conversation owner
        #[arg(short, long, default_value = "local")]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard =
        leafdoc_core::logging::init(&config.logging).context("failed to initialize logging")?;

    match args.command {
        Command::Scan { image, format } => scan(&config, &image, &format).await,
        Command::Chat { user, message } => chat(&config, &user, &message).await,
        Command::History { user } => history(&config, &user),
    }
}

async fn scan(config: &Config, image: &Path, format: &str) -> Result<ExitCode> {
    config.retry.validate().context("invalid retry configuration")?;
    let client =
        HttpInferenceClient::new(&config.inference).context("failed to create inference client")?;
    let scanner = ScanOrchestrator::new(Arc::new(client), &config.retry);

    let result = match scanner.scan_file(image).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{}", e.user_message());
            return Ok(ExitCode::FAILURE);
        }
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_analysis(&result);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_analysis(result: &AnalysisResult) {
    if let Some(summary) = result.summary() {
        println!("{}", summary);
        println!();
    }
    println!("Health:    {}%", result.health_percentage);
    println!("Diagnosis: {}", result.predicted_disease);
    println!();
    println!("Remedies:");
    for remedy in result.remedies.iter().skip(1) {
        println!("  - {}", remedy);
    }
}

async fn chat(config: &Config, user: &str, message: &str) -> Result<ExitCode> {
    config.validate().context("invalid configuration")?;
    let (log, identity) = open_log(config, user)?;
    let client =
        HttpInferenceClient::new(&config.inference).context("failed to create inference client")?;
    let orchestrator = ChatOrchestrator::new(log.clone(), Arc::new(client), &config.retry);

    let outcome = match orchestrator.send(&identity, message).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{}", e.user_message());
            return Ok(ExitCode::FAILURE);
        }
    };
    orchestrator.release(&identity);

    let reply = log
        .window(&identity)?
        .into_iter()
        .find(|turn| turn.id == outcome.reply_turn_id());
    if let Some(turn) = reply {
        println!("{}", turn.text);
    }

    Ok(match outcome {
        SendOutcome::Replied { .. } => ExitCode::SUCCESS,
        SendOutcome::Apologized { .. } => ExitCode::FAILURE,
    })
}

fn history(config: &Config, user: &str) -> Result<ExitCode> {
    config.store.validate().context("invalid store configuration")?;
    let (log, identity) = open_log(config, user)?;

    let turns = log
        .window(&identity)
        .context("failed to read conversation")?;
    if turns.is_empty() {
        println!("No messages yet for '{}'.", user);
        println!("Run 'leafdoc chat \"<question>\"' to start a conversation.");
        return Ok(ExitCode::SUCCESS);
    }

    for turn in &turns {
        print_turn(turn);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_turn(turn: &ChatTurn) {
    println!(
        "[{}] {}: {}",
        turn.created_at.format("%Y-%m-%d %H:%M:%S"),
        turn.role.as_str(),
        turn.text
    );
}

fn open_log(config: &Config, user: &str) -> Result<(Arc<ConversationLog>, ConversationIdentity)> {
    let identity = ConversationIdentity::new(&config.store.namespace, user)
        .with_context(|| format!("invalid user id '{}'", user))?;

    let db_path = config.store.database_path();
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::debug!(db = %db_path.display(), identity = %identity, "Opened conversation store");

    let log = ConversationLog::from_config(Arc::new(store), &config.store);
    Ok((Arc::new(log), identity))
}
