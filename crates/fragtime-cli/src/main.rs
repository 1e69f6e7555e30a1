use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;

use context::{AppContext, CliResult};

#[derive(Parser)]
#[command(name = "fragtime", version, about = "Countdown timer for short bursts of work")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Countdown timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Work/break cycle
    Pomodoro {
        #[command(subcommand)]
        action: commands::pomodoro::PomodoroAction,
    },
    /// Task record history
    Record {
        #[command(subcommand)]
        action: commands::record::RecordAction,
    },
    /// User preferences
    Prefs {
        #[command(subcommand)]
        action: commands::prefs::PrefsAction,
    },
    /// Task statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Points and level (signed-in users)
    Points {
        /// Ask the backend to recompute totals first
        #[arg(long)]
        refresh: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Task catalog (needs a backend)
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Export, deletion, streaks and achievements
    Account {
        #[command(subcommand)]
        action: commands::account::AccountAction,
    },
    /// Account and guest mode
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
    /// Move guest data into an account
    Migrate {
        #[command(subcommand)]
        action: commands::migrate::MigrateAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

async fn dispatch(command: Commands) -> CliResult {
    // Config edits must work even when the rest of the setup is broken.
    let command = match command {
        Commands::Config { action } => return commands::config::run(action),
        other => other,
    };

    let ctx = AppContext::open().await?;
    let result = match command {
        Commands::Timer { action } => commands::timer::run(&ctx, action).await,
        Commands::Pomodoro { action } => commands::pomodoro::run(&ctx, action).await,
        Commands::Record { action } => commands::record::run(&ctx, action).await,
        Commands::Prefs { action } => commands::prefs::run(&ctx, action).await,
        Commands::Stats { json } => commands::stats::run(&ctx, json).await,
        Commands::Points { refresh, json } => commands::points::run(&ctx, refresh, json).await,
        Commands::Task { action } => commands::task::run(&ctx, action).await,
        Commands::Account { action } => commands::account::run(&ctx, action).await,
        Commands::Auth { action } => commands::auth::run(&ctx, action).await,
        Commands::Migrate { action } => commands::migrate::run(&ctx, action).await,
        Commands::Config { action } => commands::config::run(action),
    };
    ctx.finish().await;
    result
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = dispatch(cli.command).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
