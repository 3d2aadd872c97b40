//! sankey-engine CLI
//!
//! Serve flow graphs over HTTP, or compute them from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Run the HTTP service against ClickHouse and Redis
//! sankey-engine serve --config sankey.yaml
//!
//! # Print one graph as JSON
//! sankey-engine sankey --config sankey.yaml --filter frontend=Uniswap --exclude mempool
//!
//! # Same, over a local file of synthetic rows
//! sankey-engine generate --rows 5000 --seed 7 > rows.jsonl
//! sankey-engine sankey --rows-file rows.jsonl
//!
//! # Show the SQL a request would run
//! sankey-engine plan --liquidity --exclude pmm
//! ```

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use sankey_engine::backend::clickhouse::ClickHouseStore;
use sankey_engine::backend::memory::{MemoryCache, MemoryStore};
use sankey_engine::backend::redis::RedisCache;
use sankey_engine::backend::{Cache, Store};
use sankey_engine::config::Config;
use sankey_engine::core::column::{EntityColumn, FlowUniverse};
use sankey_engine::core::filter::{Filter, FlowRequest};
use sankey_engine::query::plan::QueryPlan;
use sankey_engine::service::engine::FlowEngine;
use sankey_engine::service::http::HttpServer;
use sankey_engine::simulation::synthetic::{
    from_table_row, generate_rows, to_table_row, SyntheticConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sankey-engine")]
#[command(about = "Entity-to-entity flow graphs for Sankey diagrams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service.
    Serve {
        #[command(flatten)]
        backends: BackendArgs,

        /// Listen address, overriding the config file.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Compute one graph and print it as JSON.
    Sankey {
        #[command(flatten)]
        backends: BackendArgs,

        #[command(flatten)]
        request: RequestArgs,

        /// Read table rows (JSON lines) instead of querying ClickHouse.
        #[arg(long)]
        rows_file: Option<PathBuf>,
    },
    /// Print the SQL plan for a request.
    Plan {
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Print synthetic table rows as JSON lines.
    Generate {
        #[arg(long, default_value_t = 1_000)]
        rows: usize,

        /// Distinct labels per column.
        #[arg(long, default_value_t = 40)]
        labels: usize,

        #[arg(long)]
        liquidity: bool,

        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Args)]
struct BackendArgs {
    /// YAML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, env = "CLICKHOUSE_URL")]
    clickhouse_url: Option<String>,

    #[arg(long, env = "CLICKHOUSE_USER")]
    clickhouse_user: Option<String>,

    #[arg(long, env = "CLICKHOUSE_PASSWORD", hide_env_values = true)]
    clickhouse_password: Option<String>,

    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,
}

impl BackendArgs {
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load_or_default(self.config.as_deref())?;
        if let Some(url) = &self.clickhouse_url {
            config.clickhouse.url = url.clone();
        }
        if let Some(user) = &self.clickhouse_user {
            config.clickhouse.user = user.clone();
        }
        if let Some(password) = &self.clickhouse_password {
            config.clickhouse.password = password.clone();
        }
        if let Some(url) = &self.redis_url {
            config.redis.url = url.clone();
        }
        Ok(config)
    }
}

#[derive(Args)]
struct RequestArgs {
    /// Use the liquidity universe instead of order flow.
    #[arg(long)]
    liquidity: bool,

    /// Allow a label in a column, as `column=label`. Repeatable.
    #[arg(long = "filter", value_name = "COLUMN=LABEL")]
    filters: Vec<String>,

    /// Hide a column from the graph. Repeatable.
    #[arg(long = "exclude", value_name = "COLUMN")]
    excludes: Vec<String>,
}

impl RequestArgs {
    fn universe(&self) -> FlowUniverse {
        if self.liquidity {
            FlowUniverse::Liquidity
        } else {
            FlowUniverse::Orderflow
        }
    }

    fn to_request(&self) -> anyhow::Result<FlowRequest> {
        let mut filter = Filter::new();
        for assignment in &self.filters {
            filter.allow_assignment(assignment)?;
        }
        for column in &self.excludes {
            filter.exclude_column(EntityColumn::new(column.as_str()));
        }
        Ok(FlowRequest::new(self.universe(), filter)?)
    }
}

fn production_backends(config: &Config) -> anyhow::Result<(Arc<dyn Store>, Arc<dyn Cache>)> {
    let store = ClickHouseStore::new(
        &config.clickhouse.url,
        &config.clickhouse.user,
        &config.clickhouse.password,
        &config.clickhouse.database,
    );
    let cache = RedisCache::new(&config.redis.url)
        .with_context(|| format!("invalid redis url '{}'", config.redis.url))?;
    let store: Arc<dyn Store> = Arc::new(store);
    let cache: Arc<dyn Cache> = Arc::new(cache);
    Ok((store, cache))
}

fn file_backends(
    path: &Path,
    universe: FlowUniverse,
) -> anyhow::Result<(Arc<dyn Store>, Arc<dyn Cache>)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read rows from '{}'", path.display()))?;
    let mut rows = Vec::new();
    for (n, line) in text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
        let value: serde_json::Value =
            serde_json::from_str(line).with_context(|| format!("line {}", n + 1))?;
        match from_table_row(universe, &value) {
            Some(row) => rows.push(row),
            None => bail!("line {}: not a {} table row", n + 1, universe),
        }
    }
    log::info!("loaded {} rows from {}", rows.len(), path.display());
    let store: Arc<dyn Store> = Arc::new(MemoryStore::with_rows(universe, rows));
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    Ok((store, cache))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Serve { backends, bind } => {
            let config = backends.load_config()?;
            let (store, cache) = production_backends(&config)?;
            let engine = Arc::new(FlowEngine::new(store, cache, config.engine_options()));
            let bind = bind.unwrap_or_else(|| config.http.bind.clone());
            HttpServer::new(engine, bind).start().await?;
        }
        Commands::Sankey {
            backends,
            request,
            rows_file,
        } => {
            let config = backends.load_config()?;
            let flow_request = request.to_request()?;
            let (store, cache) = match &rows_file {
                Some(path) => file_backends(path, flow_request.universe())?,
                None => production_backends(&config)?,
            };
            let engine = FlowEngine::new(store, cache, config.engine_options());
            let graph = engine.sankey(&flow_request).await?;
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }
        Commands::Plan { request } => {
            let plan = QueryPlan::build(&request.to_request()?);
            if !plan.entity_filter().is_empty() {
                println!("-- filter: {}", plan.entity_filter());
            }
            for query in plan.label_queries().iter().chain(plan.link_queries()) {
                println!("{};", query.sql());
            }
            eprintln!("{} queries", plan.len());
        }
        Commands::Generate {
            rows,
            labels,
            liquidity,
            seed,
        } => {
            let universe = if liquidity {
                FlowUniverse::Liquidity
            } else {
                FlowUniverse::Orderflow
            };
            let config = SyntheticConfig {
                universe,
                rows,
                labels_per_column: labels,
                seed,
                ..Default::default()
            };
            for row in generate_rows(&config) {
                println!("{}", serde_json::to_string(&to_table_row(universe, &row))?);
            }
        }
    }

    Ok(())
}
