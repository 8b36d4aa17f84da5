use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::tenant::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalId(pub String);

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// blake3 digest of an access token. Raw tokens are never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenHash(pub String);

impl TokenHash {
    pub fn of(token: &str) -> Self {
        Self(blake3::hash(token.as_bytes()).to_hex().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionScope {
    Buyer,
    Reviewer,
    Admin,
}

impl PermissionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Reviewer => "reviewer",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "buyer" => Some(Self::Buyer),
            "reviewer" => Some(Self::Reviewer),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn can_review_creatives(&self) -> bool {
        matches!(self, Self::Reviewer | Self::Admin)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub tenant_id: TenantId,
    pub name: String,
    pub token_hash: TokenHash,
    pub scope: PermissionScope,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{PermissionScope, TokenHash};

    #[test]
    fn token_hash_is_stable_and_hides_the_token() {
        let first = TokenHash::of("secret-token");
        let second = TokenHash::of("secret-token");

        assert_eq!(first, second);
        assert_eq!(first.0.len(), 64);
        assert!(!first.0.contains("secret-token"));
        assert_ne!(first, TokenHash::of("secret-token-2"));
    }

    #[test]
    fn only_reviewers_and_admins_review_creatives() {
        assert!(!PermissionScope::Buyer.can_review_creatives());
        assert!(PermissionScope::Reviewer.can_review_creatives());
        assert!(PermissionScope::Admin.can_review_creatives());
    }
}
