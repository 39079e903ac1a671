pub mod config;
pub mod dashboard;
pub mod db;
pub mod errors;
pub mod format;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod redaction;
pub mod render;
pub mod settings;
pub mod sources;

use crate::config::AppConfig;
use crate::dashboard::DashboardCore;
use crate::errors::AppResult;
use crate::models::{ConversationFilter, OrderFilter, OrderStatus, SupportStatus};
use crate::pipeline::CrewDefinition;
use crate::redaction::redact_assignments;
use crate::settings::CredentialGroup;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

#[derive(Parser)]
#[command(name = "shop-crm-dashboard")]
#[command(about = "Shop CRM dashboard: orders, WhatsApp conversations and CRM interactions", long_about = None)]
struct Cli {
    /// Settings file in KEY=value format
    #[arg(long, global = true, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Directory for logs and crew run reports
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Headline metrics, daily sales and conversation status
    Overview,
    /// Order metrics, sales by status and the order list
    Orders {
        #[arg(long, value_name = "YYYY-MM-DD")]
        from: Option<NaiveDate>,
        #[arg(long, value_name = "YYYY-MM-DD")]
        to: Option<NaiveDate>,
        /// Repeat to include several statuses
        #[arg(long = "status", value_parser = parse_order_status)]
        statuses: Vec<OrderStatus>,
    },
    /// Customers joined across orders and conversations
    Customers,
    /// WhatsApp conversations and CRM interactions
    Conversations {
        #[arg(long, value_name = "YYYY-MM-DD")]
        from: Option<NaiveDate>,
        #[arg(long, value_name = "YYYY-MM-DD")]
        to: Option<NaiveDate>,
        #[arg(long = "status", value_parser = parse_support_status)]
        statuses: Vec<SupportStatus>,
    },
    /// Show or save integration credentials
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Run the support crew
    Crew {
        /// Crew definition in YAML; the built-in crew when omitted
        #[arg(long, global = true, value_name = "PATH")]
        definition: Option<PathBuf>,

        #[command(subcommand)]
        action: CrewAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Current values with secrets masked
    Show,
    /// Save one group's form
    Save {
        #[arg(value_enum)]
        group: CredentialGroup,
        #[arg(value_name = "KEY=VALUE")]
        values: Vec<String>,
    },
}

#[derive(Subcommand)]
enum CrewAction {
    /// Agents and tasks in execution order
    Show,
    /// Run every task in order
    Run {
        #[arg(long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,
    },
    /// Re-run from a task using the last run's earlier outputs
    Replay { task: String },
}

fn parse_order_status(raw: &str) -> Result<OrderStatus, String> {
    Ok(OrderStatus::from(raw.to_string()))
}

fn parse_support_status(raw: &str) -> Result<SupportStatus, String> {
    Ok(SupportStatus::from(raw.to_string()))
}

fn init_tracing(data_dir: &Path) -> Result<(), String> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "dashboard.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}

fn to_client_error(error: impl std::fmt::Display) -> String {
    redact_assignments(&error.to_string())
}

/// Renders one command. The flag is false when the command completed but reported a failure.
fn execute(command: Commands, config: AppConfig) -> AppResult<(String, bool)> {
    let mut core = DashboardCore::new(config);
    let output = match command {
        Commands::Overview => (render::overview(&core.overview()), true),
        Commands::Orders { from, to, statuses } => {
            let view = core.orders(&OrderFilter { from, to, statuses });
            (render::orders(&view), true)
        }
        Commands::Customers => (render::customers(&core.customers()), true),
        Commands::Conversations { from, to, statuses } => {
            let view = core.conversations(&ConversationFilter { from, to, statuses });
            (render::conversations(&view), true)
        }
        Commands::Settings {
            action: SettingsAction::Show,
        } => (render::settings(&core.settings_view()), true),
        Commands::Settings {
            action: SettingsAction::Save { group, values },
        } => (render::settings(&core.save_settings(group, &values)?), true),
        Commands::Crew { definition, action } => {
            let view = match action {
                CrewAction::Replay { task } => core.crew_replay(&task, definition.as_deref())?,
                CrewAction::Run { inputs } => core.crew_run(&inputs, definition.as_deref())?,
                CrewAction::Show => {
                    let crew = CrewDefinition::load(definition.as_deref())?;
                    return Ok((render::crew_definition(&crew), true));
                }
            };
            let succeeded = view.run.succeeded();
            (render::crew_run(&view), succeeded)
        }
    };
    Ok(output)
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.env_file.as_deref(), cli.data_dir.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("error: {}", to_client_error(error));
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = init_tracing(&config.data_dir) {
        eprintln!("warning: logging disabled: {}", error);
    }
    tracing::info!(
        env_file = %config.env_file.to_string_lossy(),
        data_dir = %config.data_dir.to_string_lossy(),
        "dashboard started"
    );

    match execute(cli.command, config) {
        Ok((output, succeeded)) => {
            print!("{}", output);
            if succeeded {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(error) => {
            let message = to_client_error(&error);
            tracing::error!(error = %message, "command failed");
            eprintln!("error: {}", message);
            ExitCode::FAILURE
        }
    }
}
