#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use anyhow::{bail, Result};
use chrono::{Local, Timelike};
use clap::{Parser, Subcommand};
use quipbot::channels::{self, IncomingMessage};
use quipbot::config::{Config, ConfigError, CONFIG_DIR_ENV};
use quipbot::gate::{ResponseGate, JITTER_RANGE};
use quipbot::providers::create_provider_chain;
use quipbot::responder::Responder;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::{fmt, EnvFilter};

/// `quipbot` - a chat bot with a personality and a sense of when to keep quiet.
#[derive(Parser, Debug)]
#[command(name = "quipbot")]
#[command(version)]
#[command(about = "Personality-driven chat responder.", long_about = None)]
struct Cli {
    /// Directory holding config.toml (overrides QUIPBOT_CONFIG_DIR)
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to Discord and start answering messages
    Run,

    /// Print the prompt that would be sent to the providers for a message
    Prompt {
        /// The user message
        message: String,
    },

    /// Produce one reply offline (trigger, provider chain, or fallback)
    Ask {
        /// The user message
        message: String,

        /// Seed the random source for a reproducible answer
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show how the response chance is computed for a hypothetical message
    Chance {
        /// Channel ID (uses the global chance when it has no override)
        #[arg(long, default_value = "")]
        channel: String,

        /// Hour of day 0-23 (defaults to the current local hour)
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..24))]
        hour: Option<u32>,

        /// Message length in characters
        #[arg(long, default_value_t = 50)]
        length: usize,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective configuration with secrets masked
    Show,
    /// Dump the full configuration JSON Schema to stdout
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install default crypto provider for Rustls TLS.
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Warning: Failed to install default crypto provider: {e:?}");
    }

    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var(CONFIG_DIR_ENV, config_dir);
    }

    // Schema output must stay machine-readable: no config load, no logging.
    if let Commands::Config {
        config_command: ConfigCommands::Schema,
    } = &cli.command
    {
        return print_schema();
    }

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match run(cli.command).await {
        Ok(()) => Ok(()),
        Err(e) => match e.downcast_ref::<ConfigError>() {
            Some(config_error) => {
                eprintln!("❌ Configuration error: {config_error}");
                std::process::exit(1);
            }
            None => Err(e),
        },
    }
}

fn print_schema() -> Result<()> {
    let schema = schemars::schema_for!(Config);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

async fn run(command: Commands) -> Result<()> {
    let config = Config::load_or_init().await?;

    match command {
        Commands::Run => channels::start_bot(config).await,

        Commands::Prompt { message } => {
            let responder = Responder::new(quipbot::providers::ProviderChain::empty());
            println!("{}", responder.prompt_for(&message, &config.personality));
            Ok(())
        }

        Commands::Ask { message, seed } => {
            let responder = Responder::new(create_provider_chain(&config))
                .with_max_tokens(config.generation.max_tokens);
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            let reply = responder
                .respond(&message, &config.personality, &mut rng)
                .await;
            println!("{}", reply.text);
            eprintln!("  (source: {})", reply.source);
            Ok(())
        }

        Commands::Chance {
            channel,
            hour,
            length,
        } => {
            let now = Local::now().fixed_offset();
            let hour = hour.unwrap_or_else(|| now.hour());
            let at = now.with_hour(hour).unwrap_or(now);
            let message = IncomingMessage {
                message_id: String::new(),
                author_id: String::new(),
                channel_id: channel,
                content: "x".repeat(length),
                mentions_bot: false,
                author_is_admin: false,
                timestamp: at,
            };

            let policy = &config.response.policy;
            let gate = ResponseGate::new(&config.personality, policy);
            let low = gate.chance(&message, at, *JITTER_RANGE.start());
            let mid = gate.chance(&message, at, 1.0);
            let high = gate.chance(&message, at, *JITTER_RANGE.end());

            println!("Base chance:     {}%", mid.base);
            println!("Time band:       {} (×{})", mid.band, mid.time_modifier);
            println!("Content factor:  ×{:.2} ({length} chars)", mid.content_factor);
            println!(
                "Final chance:    {:.1}% (jitter range {:.1}% – {:.1}%)",
                mid.final_chance, low.final_chance, high.final_chance
            );
            println!("Mentions and trigger phrases always respond unless cooling down.");
            Ok(())
        }

        Commands::Config { config_command } => match config_command {
            ConfigCommands::Show => {
                println!("{}", toml::to_string_pretty(&config.redacted())?);
                println!("# loaded from {}", config.config_path.display());
                Ok(())
            }
            ConfigCommands::Schema => print_schema(),
        },
    }
}
