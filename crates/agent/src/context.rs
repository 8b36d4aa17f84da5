use salesagent_core::domain::principal::{PermissionScope, Principal, PrincipalId};
use salesagent_core::domain::tenant::{Tenant, TenantId};

/// The authenticated identity of one request. Only [`crate::guard::TenantGuard`]
/// builds these, and nothing mutates one after it is built.
#[derive(Clone, Debug)]
pub struct RequestContext {
    tenant: Tenant,
    principal: Principal,
    correlation_id: String,
}

impl RequestContext {
    pub(crate) fn new(tenant: Tenant, principal: Principal, correlation_id: String) -> Self {
        Self { tenant, principal, correlation_id }
    }

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant.id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn principal_id(&self) -> &PrincipalId {
        &self.principal.id
    }

    pub fn scope(&self) -> PermissionScope {
        self.principal.scope
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Reviewers and admins see every buy and creative in the tenant; buyers
    /// only their own.
    pub fn can_see(&self, owner: &PrincipalId) -> bool {
        self.principal.scope.can_review_creatives() || &self.principal.id == owner
    }

    /// Actor label recorded on workflow steps.
    pub fn actor(&self) -> String {
        format!("principal:{}", self.principal.id.0)
    }
}
