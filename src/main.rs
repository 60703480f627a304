use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use rust_decimal::Decimal;
use tasabcv::core::conversion::Direction;
use tasabcv::core::locale::parse_amount;
use tasabcv::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for tasabcv::AppCommand {
    fn from(cmd: Commands) -> tasabcv::AppCommand {
        match cmd {
            Commands::Rates { json } => tasabcv::AppCommand::Rates { json },
            Commands::Convert { amount, from } => tasabcv::AppCommand::Convert { amount, from },
            Commands::Calc => tasabcv::AppCommand::Calc,
            Commands::Serve => tasabcv::AppCommand::Serve,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Show today's official USD and EUR rates
    Rates {
        /// Print the JSON payload served by the widget endpoint
        #[arg(long)]
        json: bool,
    },
    /// Convert an amount in every direction
    Convert {
        /// Amount, e.g. 1.234,56 or 1234.56
        #[arg(value_parser = parse_amount_arg)]
        amount: Decimal,
        /// Highlight one direction: usd, eur, bs or bs-eur
        #[arg(short, long, value_parser = parse_direction_arg)]
        from: Option<Direction>,
    },
    /// Interactive calculator with live conversions
    Calc,
    /// Serve the rates as JSON over HTTP
    Serve,
}

fn parse_amount_arg(s: &str) -> Result<Decimal, String> {
    parse_amount(s).ok_or_else(|| format!("'{s}' is not a valid amount"))
}

fn parse_direction_arg(s: &str) -> Result<Direction, String> {
    s.parse::<Direction>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let long_running = matches!(cli.command, Some(Commands::Calc | Commands::Serve));
    init_logging(cli.verbose, long_running);

    let result = match cli.command {
        Some(Commands::Setup) => tasabcv::cli::setup::setup(),
        Some(cmd) => tasabcv::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
