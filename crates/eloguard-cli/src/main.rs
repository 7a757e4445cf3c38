use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "eloguard", version, about = "EloGuard rating discipline guard")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Switch the guard on or off
    Guard {
        #[command(subcommand)]
        action: commands::guard::GuardAction,
    },
    /// Show the live rating
    Rating(commands::rating::RatingArgs),
    /// Set stop-loss and target around the live rating
    Bracket(commands::bracket::BracketArgs),
    /// Loss streak for the configured player and mode
    Streak {
        #[command(subcommand)]
        action: commands::streak::StreakAction,
    },
    /// Run the guard in the foreground
    Run(commands::run::RunArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("eloguard=info,eloguard_core=info,warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Config { action } => commands::config::run(action),
        Commands::Guard { action } => commands::guard::run(action).await,
        Commands::Rating(args) => commands::rating::run(args).await,
        Commands::Bracket(args) => commands::bracket::run(args).await,
        Commands::Streak { action } => commands::streak::run(action).await,
        Commands::Run(args) => commands::run::run(args).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
