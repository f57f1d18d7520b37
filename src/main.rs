//! Companion CLI
//!
//! Commands:
//!   ask    - Stream a companion completion about a conversation
//!   score  - Score the assistant replies of a transcript file
//!   window - Show the context window size for a purpose
//!   config - Show or initialize the config file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use companion::scoring::Trend;
use companion::{
    select, AnalysisOutcome, CompanionEngine, CompanionEvent, Config, ConversationMessage,
    ConversationStore, EnvCredentials, EventSink, Purpose,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "companion")]
#[command(about = "Chat companion: streamed analysis and heuristic reply scoring")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a provider about a conversation (streams the answer)
    Ask {
        /// Question to ask; defaults to the purpose's standard question
        instruction: Option<String>,

        /// analysis, summary, title or general
        #[arg(short, long, default_value = "general")]
        purpose: Purpose,

        /// Provider id from the config (defaults to the active provider)
        #[arg(long)]
        provider: Option<String>,

        /// JSON array of conversation messages to use as context
        #[arg(short, long)]
        transcript: Option<PathBuf>,
    },

    /// Score every assistant reply in a transcript
    Score {
        /// JSON array of {role, content, timestamp?} messages
        transcript: PathBuf,

        /// Print the full breakdown for each turn
        #[arg(short, long)]
        details: bool,
    },

    /// Show how many messages a purpose would request
    Window {
        #[arg(short, long)]
        purpose: Purpose,

        /// Total messages in the conversation
        #[arg(short, long)]
        total: usize,
    },

    /// Show the config, or write the default one
    Config {
        #[arg(long)]
        init: bool,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("companion=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_transcript(path: &Path) -> Result<Vec<ConversationMessage>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript {}", path.display()))?;
    let messages: Vec<ConversationMessage> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse transcript {}", path.display()))?;
    Ok(messages)
}

fn trend_colored(trend: Trend) -> ColoredString {
    match trend {
        Trend::Up => trend.symbol().green(),
        Trend::Down => trend.symbol().red(),
        Trend::Stable => trend.symbol().normal(),
    }
}

/// Print stream events as they arrive; returns when the sink is dropped
async fn print_events(mut rx: UnboundedReceiver<CompanionEvent>) {
    let mut printed = 0;
    while let Some(event) = rx.recv().await {
        match event {
            CompanionEvent::ContentUpdated { text, .. } => {
                print!("{}", text.get(printed..).unwrap_or(&text));
                let _ = std::io::stdout().flush();
                printed = text.len();
            }
            CompanionEvent::Finalized { .. } => {
                println!();
                printed = 0;
            }
            CompanionEvent::Progress { notice, .. } => {
                eprintln!("{}", notice.dimmed());
            }
            CompanionEvent::Error(error) => {
                eprintln!("{} [{}] {}", "✗".red(), error.stage.name(), error.message);
            }
            CompanionEvent::Kpi(_) | CompanionEvent::NotScored { .. } => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Ask {
            instruction,
            purpose,
            provider,
            transcript,
        } => {
            let config = Config::load_or_default()?;
            let mut store = ConversationStore::new();
            if let Some(path) = transcript {
                for message in read_transcript(&path)? {
                    store.push(message);
                }
            }

            let (sink, rx) = EventSink::channel();
            let printer = tokio::spawn(print_events(rx));

            let mut engine = CompanionEngine::new(config, store, EnvCredentials, sink)?;
            let result = engine
                .run(purpose, provider.as_deref(), instruction.as_deref())
                .await;
            drop(engine);
            let _ = printer.await;

            // Failures were already printed from the error event
            if result.is_err() {
                std::process::exit(1);
            }
        }

        Commands::Score { transcript, details } => {
            let config = Config::load_or_default()?;
            let messages = read_transcript(&transcript)?;
            let mut engine =
                CompanionEngine::new(config, ConversationStore::new(), EnvCredentials, EventSink::disconnected())?;

            for message in messages {
                let Some(outcome) = engine.push_message(message) else {
                    continue;
                };

                match &outcome {
                    AnalysisOutcome::Scored(snapshot) => {
                        let s = &snapshot.score;
                        println!(
                            "Turn {}: avg {:.2} {}  acc {:.1}  help {:.1}  comp {:.1}  human {:.1}  eff {:.1}",
                            snapshot.turn.to_string().bold(),
                            s.average(),
                            trend_colored(s.trend),
                            s.accuracy,
                            s.helpfulness,
                            s.completeness,
                            s.humanlikeness,
                            s.efficiency
                        );
                    }
                    AnalysisOutcome::NotScored { turn, reason } => {
                        println!("Turn {}: {} ({})", turn.to_string().bold(), "not scored".yellow(), reason);
                    }
                }

                if details {
                    if let Some(record) = engine.details(outcome.turn()) {
                        println!("{}", record.render().dimmed());
                    }
                }
            }

            let kpi = engine.kpi();
            println!();
            println!("{}", "KPI".green().bold());
            println!("  Accuracy:       {:.2}", kpi.accuracy);
            println!("  Helpfulness:    {:.2}", kpi.helpfulness);
            println!("  Completeness:   {:.2}", kpi.completeness);
            println!("  Human-likeness: {:.2}", kpi.humanlikeness);
            println!("  Efficiency:     {:.2}", kpi.efficiency);
            println!(
                "  Average:        {:.2} {} ({} analyses)",
                kpi.average(),
                trend_colored(kpi.trend),
                kpi.changes
            );
        }

        Commands::Window { purpose, total } => {
            let bounds = purpose.window_bounds();
            println!(
                "{}: {} messages (min {}, max {}, scale {})",
                purpose,
                select(purpose, total).to_string().green().bold(),
                bounds.min,
                bounds.max,
                bounds.scale
            );
        }

        Commands::Config { init } => {
            let path = Config::path()?;
            if init {
                if Config::exists() {
                    println!("Config already exists at {}", path.display());
                } else {
                    Config::default().save()?;
                    println!("{} Wrote default config to {}", "✓".green(), path.display());
                }
            } else {
                let config = Config::load_or_default()?;
                let source = if Config::exists() { "" } else { " (defaults, not saved)" };
                println!("{}{}\n", path.display().to_string().bold(), source.dimmed());
                println!("{}", toml::to_string_pretty(&config).context("Failed to serialize config")?);
            }
        }
    }

    Ok(())
}
