/// Version injected at compile time via ARMTABLES_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("ARMTABLES_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{anyhow, Result};
use armtables::azure::client::ArmClient;
use armtables::azure::error::format_arm_error;
use armtables::azure::subscriptions;
use armtables::config::Config;
use armtables::output::{self, OutputFormat};
use armtables::plugin::{Qual, QueryContext, Row};
use armtables::resource::{self, EngineOptions};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Query Azure Resource Manager resources as tables
#[derive(Parser, Debug)]
#[command(name = "armtables", version = VERSION, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Azure subscription to query
    #[arg(short, long, global = true)]
    subscription: Option<String>,

    /// Config file (JSON, or YAML by extension)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the available tables
    Tables {
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },
    /// Show the columns of a table
    Columns {
        table: String,
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },
    /// Query a table
    Query {
        table: String,
        /// Equality constraint, `column=value` (repeatable)
        #[arg(short = 'w', long = "where")]
        quals: Vec<String>,
        /// Maximum number of rows
        #[arg(long)]
        limit: Option<usize>,
        /// Columns to return, comma separated
        #[arg(short, long, value_delimiter = ',')]
        columns: Vec<String>,
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },
    /// List the subscriptions visible to the credentials
    Subscriptions {
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },
    /// Make a subscription the default for later queries
    UseSubscription { subscription_id: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> Option<&'static str> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some("error"),
            LogLevel::Warn => Some("warn"),
            LogLevel::Info => Some("info"),
            LogLevel::Debug => Some("debug"),
            LogLevel::Trace => Some("trace"),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_filter = level.as_filter()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    // ARMTABLES_LOG refines the level, e.g. `armtables::azure=trace`
    let filter =
        EnvFilter::try_from_env("ARMTABLES_LOG").unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("armtables {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("armtables").join("armtables.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".armtables").join("armtables.log");
    }
    PathBuf::from("armtables.log")
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if let Some(subscription) = &args.subscription {
        config.subscription_id = Some(subscription.clone());
    }
    Ok(config)
}

fn text_row(pairs: &[(&str, String)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
        .collect()
}

fn names(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

async fn run(args: Args) -> Result<()> {
    let mut stdout = io::stdout();

    match &args.command {
        Command::Tables { output } => {
            let rows: Vec<Row> = resource::get_all_table_names()
                .into_iter()
                .filter_map(resource::get_table)
                .map(|t| text_row(&[("name", t.name.clone()), ("description", t.description.clone())]))
                .collect();
            output::render(&rows, &names(&["name", "description"]), *output, &mut stdout)
        }
        Command::Columns { table, output } => {
            let table =
                resource::get_table(table).ok_or_else(|| anyhow!("Unknown table: {}", table))?;
            let rows: Vec<Row> = resource::columns_for(table)
                .into_iter()
                .map(|c| {
                    text_row(&[
                        ("name", c.name.clone()),
                        ("type", c.column_type.to_string()),
                        ("description", c.description.clone()),
                    ])
                })
                .collect();
            output::render(
                &rows,
                &names(&["name", "type", "description"]),
                *output,
                &mut stdout,
            )
        }
        Command::Query {
            table,
            quals,
            limit,
            columns,
            output,
        } => {
            let table_def =
                resource::get_table(table).ok_or_else(|| anyhow!("Unknown table: {}", table))?;

            let mut ctx = QueryContext::new();
            for qual in quals {
                ctx.quals.push(Qual::parse(qual)?);
            }
            ctx.limit = *limit;
            if !columns.is_empty() {
                ctx.columns = Some(columns.clone());
            }
            resource::validate_context(table_def, &ctx)?;

            let config = load_config(&args)?;
            let client = ArmClient::new(&config).await?;
            let rows = resource::query(&client, table, &ctx, &EngineOptions::from(&config)).await?;

            let shown: Vec<String> = match &ctx.columns {
                Some(columns) => columns.clone(),
                None => resource::columns_for(table_def)
                    .into_iter()
                    .map(|c| c.name.clone())
                    .collect(),
            };
            output::render(&rows, &shown, *output, &mut stdout)
        }
        Command::Subscriptions { output } => {
            let config = load_config(&args)?;
            let client = ArmClient::new(&config).await?;
            let rows: Vec<Row> = subscriptions::list_subscriptions(&client)
                .await?
                .into_iter()
                .map(|s| {
                    text_row(&[
                        ("subscription_id", s.subscription_id),
                        ("display_name", s.display_name),
                        ("state", s.state),
                        ("tenant_id", s.tenant_id),
                    ])
                })
                .collect();
            output::render(
                &rows,
                &names(&["subscription_id", "display_name", "state", "tenant_id"]),
                *output,
                &mut stdout,
            )
        }
        Command::UseSubscription { subscription_id } => {
            let mut config = Config::load();
            config.set_subscription(subscription_id)?;
            tracing::info!("Default subscription set to {}", subscription_id);
            writeln!(stdout, "Default subscription set to {}", subscription_id)?;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_guard = setup_logging(args.log_level);

    if let Err(err) = run(args).await {
        tracing::error!("armtables failed: {:#}", err);
        eprintln!("Error: {}", format_arm_error(&err));
        drop(log_guard);
        std::process::exit(1);
    }
}
