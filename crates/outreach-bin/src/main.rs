//! Seller Outreach - durable delivery of proactive buyer chat messages.

mod app;
mod settings_file;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use outreach_outbox::{NewOutreachJob, DEFAULT_OUTREACH_TEXT};
use seller_config_and_utils::{init_logging, parse_level, Config, Paths};

/// Seller outreach command-line interface.
#[derive(Parser)]
#[command(name = "seller-outreach")]
#[command(about = "Durable, rate-limited delivery of proactive marketplace chat messages")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Overrides config and SELLER_LOG_LEVEL
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Storage root (queue files, settings, logs). Defaults to STORAGE_DIR or ~/.seller-assistant
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the delivery worker until interrupted
    Run,
    /// Show queue, sent-record and dead-letter sizes
    Status,
    /// Print the newest dead-letter entries as JSON lines
    DeadLetters {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Admit one outreach message into the durable queue
    Enqueue {
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        chat_id: String,
        /// Message text. Defaults to the stock thank-you message
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        template_id: Option<String>,
        #[arg(long)]
        template_version: Option<String>,
        /// Explicit idempotency key instead of the derived one
        #[arg(long)]
        idempotency_key: Option<String>,
    },
    /// Mark a buyer conversation as activated for outreach
    Activate {
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        chat_id: String,
    },
    /// Enable or disable outreach for a seller
    Outreach {
        #[arg(long)]
        user_id: i64,
        #[arg(long, action = ArgAction::Set)]
        enabled: bool,
        /// Pause after each finished job, in seconds
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.storage_dir {
        Some(dir) => Paths::with_base_dir(dir),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;

    let mut config = Config::load(&paths)?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    let foreground = matches!(cli.command, Commands::Run);
    init_logging(
        "seller-outreach",
        parse_level(&config.log_level).as_str(),
        &paths,
        foreground,
    );

    match cli.command {
        Commands::Run => app::run(&config, &paths).await?,
        Commands::Status => app::status(&config, &paths)?,
        Commands::DeadLetters { limit } => app::dead_letters(&config, &paths, limit)?,
        Commands::Enqueue {
            user_id,
            chat_id,
            text,
            template_id,
            template_version,
            idempotency_key,
        } => {
            let mut request = NewOutreachJob::new(
                user_id,
                chat_id,
                text.unwrap_or_else(|| DEFAULT_OUTREACH_TEXT.to_string()),
            );
            request.template_id = template_id;
            request.template_version = template_version;
            request.idempotency_key = idempotency_key;
            app::enqueue(&config, &paths, request)?;
        }
        Commands::Activate { user_id, chat_id } => app::activate(&paths, user_id, &chat_id)?,
        Commands::Outreach {
            user_id,
            enabled,
            interval_secs,
        } => app::set_outreach(&paths, user_id, enabled, interval_secs)?,
    }

    Ok(())
}
