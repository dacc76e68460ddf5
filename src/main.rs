//! fcircle-db - operator CLI for the friend circle store

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use fcircle_store::storage::{Engine, schema};
use fcircle_store::ui::{self, Icons, TableBuilder};
use fcircle_store::{ConfigResolver, FriendCircleStore, PostQuery, Record, SortRule, open_store};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "fcircle-db")]
#[command(version)]
#[command(about = "Manage the friend circle database")]
#[command(long_about = r#"
Inspect and maintain the database behind the friend circle aggregator.
The backend (sqlite, mysql, mongodb) comes from the settings file; connection
strings come from DEBUG, MYSQL_URI and MONGODB_URI.

Example usage:
  fcircle-db init
  fcircle-db stats
  fcircle-db clean --days 30
  fcircle-db dump posts
"#)]
struct Cli {
    /// Settings file (defaults to $FCIRCLE_SETTINGS or ./fc_settings.toml)
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create missing tables
    Init,

    /// Show the resolved backend and connection string
    Info,

    /// Show friend and post counts
    Stats,

    /// Delete posts not updated for a number of days
    Clean {
        /// Age in days (defaults to `outdate_clean` from the settings)
        #[arg(short, long)]
        days: Option<usize>,
    },

    /// Print stored records as JSON
    Dump {
        #[arg(value_enum)]
        records: RecordKind,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RecordKind {
    Friends,
    Posts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(cli).await {
        ui::error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let resolver = ConfigResolver::from_env(cli.settings.as_deref())
        .context("Failed to initialize database configuration")?;

    match cli.command {
        Commands::Init => init(&resolver).await,
        Commands::Info => info(&resolver),
        Commands::Stats => stats(&resolver).await,
        Commands::Clean { days } => {
            let days = days.unwrap_or(resolver.settings().outdate_clean);
            let store = connect(&resolver).await?;
            let removed = store.delete_outdated_posts(days).await?;
            println!("{} Removed {} posts older than {} days", Icons::BROOM, removed, days);
            Ok(())
        }
        Commands::Dump { records } => {
            let store = connect(&resolver).await?;
            let rows = match records {
                RecordKind::Friends => store
                    .list_friends()
                    .await?
                    .iter()
                    .map(Record::to_dict)
                    .collect::<fcircle_store::Result<Vec<_>>>()?,
                RecordKind::Posts => store
                    .list_posts(&PostQuery::all(SortRule::Updated))
                    .await?
                    .iter()
                    .map(Record::to_dict)
                    .collect::<fcircle_store::Result<Vec<_>>>()?,
            };
            println!("{}", serde_json::to_string_pretty(&rows)?);
            Ok(())
        }
    }
}

async fn connect(resolver: &ConfigResolver) -> anyhow::Result<Box<dyn FriendCircleStore>> {
    open_store(resolver)
        .await
        .context("Failed to initialize database connection")
}

async fn init(resolver: &ConfigResolver) -> anyhow::Result<()> {
    let backend = resolver.backend()?;
    ui::header(&format!("Initializing {} database", backend));

    if !backend.is_relational() {
        connect(resolver).await?;
        ui::success("Document backends need no schema");
        return Ok(());
    }

    let engine = Engine::connect(resolver.resolve()?)
        .await
        .context("Failed to initialize database connection")?;
    let report = schema::create_all(&engine).await?;
    for name in &report.created {
        ui::table_line(name, true);
    }
    for name in &report.existing {
        ui::table_line(name, false);
    }
    ui::success(&format!("{} created, {} already present", report.created.len(), report.existing.len()));
    Ok(())
}

fn info(resolver: &ConfigResolver) -> anyhow::Result<()> {
    let descriptor = resolver.resolve()?;
    ui::header("fcircle-db");
    ui::status(Icons::DATABASE, "Backend", descriptor.backend.as_str());
    ui::status(Icons::LINK, "URL", &descriptor.redacted_url());
    if let Some(path) = &descriptor.database_file {
        ui::status(Icons::FOLDER, "File", &path.display().to_string());
    }
    if resolver.read_only_fallback() {
        ui::warn("Read-only deployment: using the scratch copy of data.db");
    }
    if resolver.environment().debug {
        ui::status(Icons::GEAR, "Mode", "debug");
    }
    Ok(())
}

async fn stats(resolver: &ConfigResolver) -> anyhow::Result<()> {
    let store = connect(resolver).await?;
    let friends = store.list_friends().await?;
    let posts = store.list_posts(&PostQuery::all(SortRule::Updated)).await?;
    let latest = store.latest_created_at().await?;
    let failing = friends.iter().filter(|f| f.error).count();

    ui::section(&format!(" {} Friend circle ", Icons::STATS));
    let mut table = TableBuilder::new();
    table
        .add_row(&format!("{} Friends", Icons::FRIEND), friends.len())
        .add_row(&format!("{} Unreachable", Icons::WARN), failing)
        .add_row(&format!("{} Posts", Icons::POST), posts.len())
        .add_row(
            &format!("{} Last update", Icons::CLOCK),
            latest.unwrap_or_else(|| ui::dim("never")),
        );
    println!("{}", table.build());
    Ok(())
}
