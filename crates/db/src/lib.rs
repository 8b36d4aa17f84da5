pub mod connection;
pub mod migrations;
pub mod provisioning;
pub mod repositories;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use provisioning::{ProvisionSummary, ProvisioningError, TenantManifest};
pub use repositories::{RepositoryError, RepositorySet};
