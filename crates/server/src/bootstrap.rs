use std::sync::Arc;

use salesagent_agent::{AgentRuntime, AgentSettings};
use salesagent_core::adapter::{AdServerAdapter, AdapterRegistry, EnvCredentialResolver, SimulationAdapter};
use salesagent_core::audit::TracingAuditSink;
use salesagent_core::config::{AppConfig, ConfigError};
use salesagent_db::{
    connect_with_config, migrations, DbPool, ProvisionSummary, ProvisioningError, RepositorySet,
    TenantManifest,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("tenant provisioning failed: {0}")]
    Provisioning(#[from] ProvisioningError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let repos = RepositorySet::sqlite(db_pool.clone());
    if let Some(path) = &config.tenancy.manifest_path {
        let summary = provision(&repos, &TenantManifest::load(path)?).await?;
        info!(
            event_name = "system.bootstrap.tenants_provisioned",
            correlation_id = "bootstrap",
            manifest = %path.display(),
            tenants = summary.tenants,
            principals = summary.principals,
            products = summary.products,
            "tenant manifest applied"
        );
    }

    let adapters = AdapterRegistry::new()
        .with_adapter(Arc::new(SimulationAdapter::new()) as Arc<dyn AdServerAdapter>);
    let runtime = AgentRuntime::new(
        repos,
        adapters,
        Arc::new(EnvCredentialResolver::from_process_env()),
        Arc::new(TracingAuditSink),
        AgentSettings::from_config(&config),
    );

    Ok(Application { config, db_pool, runtime: Arc::new(runtime) })
}

async fn provision(
    repos: &RepositorySet,
    manifest: &TenantManifest,
) -> Result<ProvisionSummary, ProvisioningError> {
    let lookup = |key: &str| std::env::var(key).ok();
    manifest
        .apply(repos.tenants.as_ref(), repos.principals.as_ref(), repos.products.as_ref(), &lookup)
        .await
}
