use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daily_question::{events, run_daily, scheduler, BotConfig, DiscordTransport, OpenAiGenerator};
use round_coordination::{DeliveryGateway, HistoryStore, OpenOutcome, RoundMachine};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file (env overrides still apply)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daily scheduler and read chat events from stdin
    Run,
    /// Open one round now and exit once its question is posted
    Ask,
    /// Print the most recent questions, oldest first
    History {
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
}

fn open_history(config: &BotConfig) -> Result<HistoryStore> {
    let store = match &config.history.path {
        Some(path) => HistoryStore::open(path, config.history.capacity)
            .with_context(|| format!("Failed to open history at {}", path.display()))?,
        None => HistoryStore::in_memory(config.history.capacity),
    };
    debug!(
        entries = store.len()?,
        capacity = store.capacity(),
        "History loaded"
    );
    Ok(store)
}

fn build_machine(config: &BotConfig) -> Result<Arc<RoundMachine>> {
    config.validate().context("Invalid configuration")?;
    let history = Arc::new(open_history(config)?);
    let generator =
        Arc::new(OpenAiGenerator::new(&config.openai).context("Failed to build OpenAI client")?);
    let transport = Arc::new(
        DiscordTransport::new(&config.discord).context("Failed to build Discord client")?,
    );
    let round_config = config.round_config()?;

    Ok(RoundMachine::new(
        round_config,
        history,
        generator,
        DeliveryGateway::new(transport),
    )
    .shared())
}

async fn run(config: &BotConfig) -> Result<()> {
    let machine = build_machine(config)?;
    let schedule = config.schedule()?;
    let cancel = CancellationToken::new();

    info!(
        participants = config.participants.len(),
        channel = config.discord.channel_id,
        at = %schedule.at(),
        offset = %schedule.offset(),
        "Daily question bot starting"
    );

    if config.schedule.ask_on_startup {
        scheduler::fire(&machine).await;
    }

    let scheduler_task = tokio::spawn(run_daily(machine.clone(), schedule, cancel.clone()));
    let event_task = tokio::spawn(events::run_event_loop(
        machine,
        BufReader::new(tokio::io::stdin()),
        cancel.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    cancel.cancel();

    let _ = tokio::join!(scheduler_task, event_task);
    Ok(())
}

async fn ask(config: &BotConfig) -> Result<()> {
    let machine = build_machine(config)?;
    match machine.open_round().await.context("Failed to open round")? {
        OpenOutcome::Opened {
            generation,
            question,
        } => info!(generation, question = %question, "Question posted"),
        OpenOutcome::GenerationFailed { reason } => {
            anyhow::bail!("Question generation failed: {reason}")
        }
    }
    Ok(())
}

fn history(config: &BotConfig, limit: usize) -> Result<()> {
    let store = open_history(config)?;
    for question in store.recent_ascending(limit)? {
        println!("{question}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = BotConfig::load(args.config.as_deref()).context("Invalid configuration")?;

    match args.command {
        Command::Run => run(&config).await,
        Command::Ask => ask(&config).await,
        Command::History { limit } => history(&config, limit),
    }
}
