use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use db_table_tracker::config::Config;
use db_table_tracker::{
    classify, ClassificationReport, Dialect, PostgresExecutor, QueryOptions, Session,
};

#[derive(Parser, Debug)]
#[command(name = "db-table-tracker")]
#[command(about = "Track the tables SQL scripts create, rename and drop", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print what a script creates, drops and renames, without a database
    Classify {
        /// SQL file to analyze
        file: PathBuf,

        /// SQL dialect (defaults to DB_DIALECT)
        #[arg(short, long, value_enum)]
        dialect: Option<DialectArg>,

        /// Schema for unqualified table names
        #[arg(short, long)]
        schema: Option<String>,
    },
    /// Execute a script against DATABASE_URL and report the tables it touched
    Run {
        /// SQL file to execute
        file: PathBuf,

        /// Record created tables without an expiry
        #[arg(long)]
        no_temp: bool,

        /// Drop every table the script created before exiting
        #[arg(long)]
        cleanup: bool,
    },
    /// Drop expired tables and remove stale log rows
    Housekeep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DialectArg {
    Pg,
    Ms,
    Azure,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Pg => Dialect::Pg,
            DialectArg::Ms => Dialect::Ms,
            DialectArg::Azure => Dialect::Azure,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Command::Classify { file, dialect, schema } => run_classify(&config, &file, dialect, schema),
        Command::Run { file, no_temp, cleanup } => run_script(&config, &file, no_temp, cleanup).await,
        Command::Housekeep => run_housekeeping(&config).await,
    };

    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}

fn read_script(file: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

fn run_classify(
    config: &Config,
    file: &Path,
    dialect: Option<DialectArg>,
    schema: Option<String>,
) -> anyhow::Result<()> {
    let dialect = match dialect {
        Some(arg) => arg.into(),
        None => config.dialect()?,
    };
    let schema = schema.unwrap_or_else(|| dialect.fallback_schema().to_string());
    let script = read_script(file)?;

    let classification = classify(&script, &schema, dialect)?;
    let report = ClassificationReport::from(&classification);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn open_session(config: &Config) -> anyhow::Result<Session<PostgresExecutor>> {
    let ctx = config.session_context()?;
    if ctx.dialect != Dialect::Pg {
        bail!(
            "The bundled executor only speaks PostgreSQL; DB_DIALECT is {}",
            ctx.dialect
        );
    }

    let executor = PostgresExecutor::connect(&config.database.url, config.database.timeout_secs).await?;
    Ok(Session::open(ctx, executor).await?)
}

async fn run_script(config: &Config, file: &Path, no_temp: bool, cleanup: bool) -> anyhow::Result<()> {
    let script = read_script(file)?;
    let mut session = open_session(config).await?;

    let options = if no_temp {
        QueryOptions::permanent()
    } else {
        QueryOptions::default()
    };
    let result = session.query(&script, options).await?;
    if let Some(result) = result {
        info!(
            "Script finished in {} ms ({} rows)",
            result.execution_time_ms, result.row_count
        );
    }

    let summary = serde_json::json!({
        "session": session.id(),
        "created": session.tables_created(),
        "dropped": session.tables_dropped(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if cleanup {
        let dropped = session.cleanup_new_tables().await?;
        info!("Cleanup dropped {} tables", dropped);
    }
    session.close();
    Ok(())
}

async fn run_housekeeping(config: &Config) -> anyhow::Result<()> {
    let mut config = config.clone();
    // the explicit pass below is the one we report
    config.tracking.clean_logs_on_open = false;

    let mut session = open_session(&config).await?;
    let report = session.clean_logs().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    session.close();
    Ok(())
}
