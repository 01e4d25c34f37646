//! Parley worker binary: hosts one agent on a console session.
//!
//! Reads configuration, initializes structured logging and the database,
//! builds the configured agent's session store, tool registry and commit
//! sink, then serves the console until stdin closes or `/quit`.

mod config;
mod console;
mod error;

use std::process::ExitCode;
use std::sync::Arc;

use parley_agents::adventure::{self, World};
use parley_agents::coffee;
use parley_agents::fraud::{self, FraudCaseGateway, FraudDesk};
use parley_agents::fraud_store::{self, NewCase};
use parley_agents::grocery::{self, GroceryCatalog};
use parley_agents::improv::{self, ImprovRefs};
use parley_agents::sales::{self, SalesKnowledge};
use parley_core::{
    Dispatcher, Domain, JsonFileGateway, PersistenceGateway, SessionStore, SqliteGateway,
};
use parley_db::{DbPool, DbRuntimeSettings};
use tracing_subscriber::EnvFilter;

use crate::config::{AgentDomain, Config, LoggingConfig, SinkKind, StorageConfig};
use crate::error::WorkerError;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("PARLEY_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    // Stdout belongs to the console session.
    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn open_database(storage: &StorageConfig) -> Result<DbPool, WorkerError> {
    let pool = parley_db::create_pool(
        &storage.database_path,
        DbRuntimeSettings {
            busy_timeout_ms: storage.busy_timeout_ms,
            pool_max_size: storage.pool_max_size,
        },
    )?;

    let conn = pool.get()?;
    let applied = parley_db::run_migrations(&conn)?;
    if applied > 0 {
        tracing::info!(count = applied, "applied database migrations");
    }
    Ok(pool)
}

/// Commit sink for every agent except fraud.
fn sink<D: Domain>(storage: &StorageConfig, pool: &DbPool) -> Arc<dyn PersistenceGateway<D>> {
    match storage.sink {
        SinkKind::Json => Arc::new(JsonFileGateway::new(&storage.artifacts_dir)),
        SinkKind::Sqlite => Arc::new(SqliteGateway::new(pool.clone())),
    }
}

fn seed_demo_case(pool: &DbPool) -> Result<(), WorkerError> {
    let conn = pool.get()?;
    if !fraud_store::list_cases(&conn, None)?.is_empty() {
        return Ok(());
    }
    let case = fraud_store::create_case(
        &conn,
        &NewCase {
            case_id: "FC-1001".to_string(),
            customer_name: "John Smith".to_string(),
            security_question: "What is the name of your first pet?".to_string(),
            security_answer: "Rex".to_string(),
            card_ending: "4242".to_string(),
            merchant: "Skyline Electronics".to_string(),
            amount_cents: 129_999,
            transaction_time: "2024-03-02 14:11".to_string(),
            location: "Denver, CO".to_string(),
        },
    )?;
    tracing::info!(case_id = %case.case_id, "seeded demo fraud case");
    Ok(())
}

async fn run(config: Config) -> Result<(), WorkerError> {
    let pool = open_database(&config.storage)?;
    let storage = &config.storage;
    let reference = &config.reference;
    tracing::info!(
        domain = ?config.agent.domain,
        sink = ?storage.sink,
        "starting parley worker"
    );

    match config.agent.domain {
        AgentDomain::Coffee => {
            let dispatcher = Dispatcher::new(
                Arc::new(SessionStore::new(())),
                Arc::new(coffee::registry()?),
                sink(storage, &pool),
            );
            console::converse(dispatcher).await?;
        }
        AgentDomain::Improv => {
            let refs = ImprovRefs::load(reference.improv_scenarios.as_deref(), config.improv)?;
            tracing::info!(scenarios = refs.scenarios().len(), "improv scenarios loaded");
            let dispatcher = Dispatcher::new(
                Arc::new(SessionStore::new(refs)),
                Arc::new(improv::registry(&config.improv)?),
                sink(storage, &pool),
            );
            console::converse(dispatcher).await?;
        }
        AgentDomain::Sales => {
            let knowledge = SalesKnowledge::load(reference.sales_faq.as_deref())?;
            let dispatcher = Dispatcher::new(
                Arc::new(SessionStore::new(knowledge)),
                Arc::new(sales::registry()?),
                sink(storage, &pool),
            );
            console::drive(dispatcher).await?;
        }
        AgentDomain::Grocery => {
            let catalog = GroceryCatalog::load(reference.grocery_catalog.as_deref())?;
            let dispatcher = Dispatcher::new(
                Arc::new(SessionStore::new(catalog)),
                Arc::new(grocery::registry()?),
                sink(storage, &pool),
            );
            console::drive(dispatcher).await?;
        }
        AgentDomain::Adventure => {
            let world = World::load(reference.adventure_world.as_deref())?;
            let dispatcher = Dispatcher::new(
                Arc::new(SessionStore::new(world)),
                Arc::new(adventure::registry()?),
                sink(storage, &pool),
            );
            console::drive(dispatcher).await?;
        }
        AgentDomain::Fraud => {
            if storage.seed_demo_case {
                seed_demo_case(&pool)?;
            }
            let dispatcher = Dispatcher::new(
                Arc::new(SessionStore::new(FraudDesk::new(pool.clone()))),
                Arc::new(fraud::registry()?),
                Arc::new(FraudCaseGateway::new(pool.clone())),
            );
            console::drive(dispatcher).await?;
        }
    }

    tracing::info!("parley worker shut down");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = match config::load_config(selected_config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.logging);
    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "parley worker failed");
            ExitCode::FAILURE
        }
    }
}
