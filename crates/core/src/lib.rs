pub mod adapter;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod pricing;
pub mod workflow;

pub use adapter::{
    AdServerAdapter, AdapterCredentials, AdapterError, AdapterRegistry, CredentialResolver,
    RetryPolicy, SimulationAdapter,
};
pub use domain::creative::{Creative, CreativeId, CreativeView, ReviewStatus};
pub use domain::media_buy::{MediaBuy, MediaBuyId, MediaBuyStatus, Package, PackageId};
pub use domain::pricing_option::{Currency, PricingOption, PricingOptionId};
pub use domain::principal::{PermissionScope, Principal, PrincipalId, TokenHash};
pub use domain::product::{Product, ProductId};
pub use domain::tenant::{Tenant, TenantId};
pub use domain::workflow_step::{WorkflowStep, WorkflowStepKind};
pub use errors::{ApplicationError, DomainError, ErrorCode, InterfaceError};
pub use pricing::PricingError;
pub use workflow::WorkflowStateError;
