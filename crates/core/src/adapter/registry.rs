use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use secrecy::SecretString;

use crate::adapter::{AdServerAdapter, AdapterCredentials, AdapterError};
use crate::domain::tenant::{AdapterKind, CredentialRef};

/// Adapter instances by backend kind, shared by all tenants.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<AdapterKind, Arc<dyn AdServerAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn AdServerAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn register(&mut self, adapter: Arc<dyn AdServerAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: AdapterKind) -> Result<Arc<dyn AdServerAdapter>, AdapterError> {
        self.adapters.get(&kind).cloned().ok_or_else(|| {
            AdapterError::fatal(format!("no adapter registered for `{}`", kind.as_str()))
        })
    }

    pub fn kinds(&self) -> Vec<AdapterKind> {
        let mut kinds: Vec<_> = self.adapters.keys().copied().collect();
        kinds.sort_by_key(|kind| kind.as_str());
        kinds
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry").field("kinds", &self.kinds()).finish()
    }
}

/// Turns the credential reference stored on a tenant into secret material.
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, reference: &CredentialRef) -> Result<AdapterCredentials, AdapterError>;
}

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads credentials from environment variables named by the reference.
#[derive(Clone)]
pub struct EnvCredentialResolver {
    lookup: Lookup,
}

impl EnvCredentialResolver {
    pub fn from_process_env() -> Self {
        Self { lookup: Arc::new(|key| std::env::var(key).ok()) }
    }

    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self { lookup: Arc::new(lookup) }
    }

    fn secret(&self, key: &str) -> Result<SecretString, AdapterError> {
        match (self.lookup)(key) {
            Some(value) if !value.trim().is_empty() => Ok(SecretString::from(value)),
            _ => Err(AdapterError::fatal(format!("credential variable `{key}` is not set"))),
        }
    }
}

impl fmt::Debug for EnvCredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EnvCredentialResolver")
    }
}

impl CredentialResolver for EnvCredentialResolver {
    fn resolve(&self, reference: &CredentialRef) -> Result<AdapterCredentials, AdapterError> {
        match reference {
            CredentialRef::None => Ok(AdapterCredentials::Unauthenticated),
            CredentialRef::OAuthDelegated { access_token_env, refresh_token_env } => {
                let refresh_token = match refresh_token_env {
                    Some(key) => Some(self.secret(key)?),
                    None => None,
                };
                Ok(AdapterCredentials::OAuthDelegated {
                    access_token: self.secret(access_token_env)?,
                    refresh_token,
                })
            }
            CredentialRef::ServiceCredential { key_env, client_email } => {
                Ok(AdapterCredentials::ServiceCredential {
                    client_email: client_email.clone(),
                    private_key: self.secret(key_env)?,
                })
            }
        }
    }
}
