use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use encore_needs::config::Config;
use encore_needs::datasource::{self, DataSource, ReadConfig, PROVIDER};
use encore_needs::error::Diagnostic;
use encore_needs::needs::NeedsCache;
use encore_needs::platform::client::PlatformClient;
use encore_needs::platform::http::format_platform_error;
use encore_needs::platform::query::needs_query;
use encore_needs::shape::registry;
use encore_needs::VERSION;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Encore infrastructure needs as typed data sources
#[derive(Parser, Debug)]
#[command(name = "encore-needs", version = VERSION, about, long_about = None)]
struct Args {
    /// Auth key for the Encore platform (defaults to the Encore CLI login)
    #[arg(long, global = true)]
    auth_key: Option<String>,

    /// Encore application id
    #[arg(long, global = true)]
    app_id: Option<String>,

    /// Default environment for lookups
    #[arg(long, global = true)]
    default_env: Option<String>,

    /// Encore platform API endpoint
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Format of printed documents
    #[arg(long, value_enum, default_value = "json", global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the available data sources
    DataSources,
    /// Print the schema of a data source
    Schema {
        /// Data source name, e.g. `pubsub_topic` or `encore_pubsub_topic`
        data_source: String,
    },
    /// Print the GraphQL query used to fetch needs
    Query,
    /// Read resources through a data source
    Read {
        data_source: String,
        /// Resource name; repeat to read several at once
        #[arg(long = "name", required = true)]
        names: Vec<String>,
        /// Environment, defaults to the configured default environment
        #[arg(long)]
        env: Option<String>,
    },
    /// Save the given global options as defaults
    Configure,
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
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

impl OutputFormat {
    fn render<T: Serialize>(self, value: &T) -> Result<String> {
        match self {
            OutputFormat::Json => serde_json::to_string_pretty(value).context("Failed to render JSON"),
            OutputFormat::Yaml => serde_yaml::to_string(value).context("Failed to render YAML"),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("encore-needs {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("encore-needs").join("encore-needs.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".encore-needs").join("encore-needs.log");
    }
    PathBuf::from("encore-needs.log")
}

impl Args {
    /// Configuration given on the command line
    fn cli_config(&self) -> Config {
        Config {
            auth_key: self.auth_key.clone(),
            app_id: self.app_id.clone(),
            env: self.default_env.clone(),
            api_url: self.api_url.clone(),
        }
    }
}

#[derive(Serialize)]
struct DataSourceInfo<'a> {
    name: String,
    type_ref: &'a str,
    description: &'a str,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ReadOutcome {
    State(encore_needs::extract::ValueTree),
    Error { error: Diagnostic },
}

fn find_source<'a>(sources: &'a [DataSource], name: &str) -> Result<&'a DataSource> {
    datasource::find(sources, name).ok_or_else(|| {
        let known: Vec<&str> = sources.iter().map(DataSource::name).collect();
        anyhow!("Unknown data source {:?}, expected one of: {}", name, known.join(", "))
    })
}

async fn read(
    args: &Args,
    config: &Config,
    sources: &[DataSource],
    name: &str,
    names: &[String],
    env: Option<&str>,
) -> Result<()> {
    let source = find_source(sources, name)?;

    let client = PlatformClient::connect(config, VERSION)
        .await
        .map_err(|e| anyhow!(format_platform_error(&e)))?;
    let cache = NeedsCache::new(
        client,
        config.effective_env(),
        datasource::registered_types(sources),
    );

    let reads = names.iter().map(|n| {
        let cfg = ReadConfig::new(n.clone(), env);
        let cache = &cache;
        async move { (cfg.name.clone(), source.read(cache, &cfg).await) }
    });
    let results = futures::future::join_all(reads).await;

    let mut failed = 0;
    let mut outcomes = BTreeMap::new();
    for (n, result) in results {
        let outcome = match result {
            Ok(state) => ReadOutcome::State(state),
            Err(e) => {
                failed += 1;
                tracing::error!("Reading {} {} failed: {}", source.type_name(PROVIDER), n, e);
                ReadOutcome::Error {
                    error: Diagnostic::from(&e),
                }
            }
        };
        outcomes.insert(n, outcome);
    }

    println!("{}", args.output.render(&outcomes)?);

    if failed > 0 {
        bail!("{} of {} reads failed", failed, names.len());
    }
    Ok(())
}

async fn run(args: &Args) -> Result<()> {
    let config = Config::load().with_env_overrides().merge(args.cli_config());
    let sources = datasource::data_sources().map_err(|e| anyhow!(Diagnostic::from(&e).to_string()))?;

    match &args.command {
        Command::DataSources => {
            let infos: Vec<DataSourceInfo> = sources
                .iter()
                .map(|ds| DataSourceInfo {
                    name: ds.type_name(PROVIDER),
                    type_ref: ds.type_ref().as_str(),
                    description: &ds.schema().description,
                })
                .collect();
            println!("{}", args.output.render(&infos)?);
        }
        Command::Schema { data_source } => {
            let source = find_source(&sources, data_source)?;
            println!("{}", args.output.render(source.schema())?);
        }
        Command::Query => {
            let query = needs_query(registry()).map_err(|e| anyhow!(Diagnostic::from(&e).to_string()))?;
            println!("{}", query);
        }
        Command::Read {
            data_source,
            names,
            env,
        } => read(args, &config, &sources, data_source, names, env.as_deref()).await?,
        Command::Configure => {
            let saved = Config::load().merge(args.cli_config());
            saved.save()?;
            match Config::config_path() {
                Some(path) => println!("Saved configuration to {}", path.display()),
                None => println!("No configuration directory available, nothing saved"),
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_guard = match setup_logging(args.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(1);
        }
    };

    let result = run(&args).await;
    if let Err(err) = &result {
        tracing::error!("{:#}", err);
        eprintln!("Error: {err:#}");
    }

    // Flush the log file before exiting
    drop(log_guard);
    if result.is_err() {
        std::process::exit(1);
    }
}
