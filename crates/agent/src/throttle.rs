//! Per-principal request throttling.
//!
//! A sliding one-minute window keyed by `(tenant, principal)`. Principals of
//! different tenants never share a bucket even when their ids collide.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::warn;

use salesagent_core::domain::principal::PrincipalId;
use salesagent_core::domain::tenant::TenantId;

const WINDOW: Duration = Duration::from_secs(60);
const PRUNE_THRESHOLD: usize = 4_096;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThrottleDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

impl ThrottleDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[derive(Default)]
struct Bucket {
    requests: Vec<Instant>,
}

impl Bucket {
    fn prune(&mut self, now: Instant, window: Duration) {
        self.requests.retain(|&at| now.duration_since(at) < window);
    }
}

pub struct RequestThrottle {
    requests_per_window: u32,
    window: Duration,
    buckets: RwLock<HashMap<(TenantId, PrincipalId), Bucket>>,
}

impl RequestThrottle {
    /// `requests_per_minute == 0` disables throttling.
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self::with_window(requests_per_minute, WINDOW)
    }

    pub fn with_window(requests_per_window: u32, window: Duration) -> Self {
        Self { requests_per_window, window, buckets: RwLock::new(HashMap::new()) }
    }

    pub fn is_enabled(&self) -> bool {
        self.requests_per_window > 0
    }

    /// Count one request against the bucket. Rejected requests are not counted.
    pub async fn check(&self, tenant_id: &TenantId, principal_id: &PrincipalId) -> ThrottleDecision {
        if !self.is_enabled() {
            return ThrottleDecision::Allowed { remaining: u32::MAX };
        }

        let now = Instant::now();
        let mut buckets = self.buckets.write().await;
        if buckets.len() > PRUNE_THRESHOLD {
            prune_idle(&mut buckets, now, self.window);
        }
        let bucket = buckets.entry((tenant_id.clone(), principal_id.clone())).or_default();
        bucket.prune(now, self.window);

        let used = u32::try_from(bucket.requests.len()).unwrap_or(u32::MAX);
        if used >= self.requests_per_window {
            let oldest = bucket.requests.first().copied().unwrap_or(now);
            let retry_after = self.window.saturating_sub(now.duration_since(oldest));
            warn!(
                event_name = "ingress.throttled",
                tenant_id = %tenant_id,
                principal_id = %principal_id,
                request_count = used,
                limit = self.requests_per_window,
                "principal exceeded request limit"
            );
            return ThrottleDecision::Limited { retry_after_secs: retry_after.as_secs().max(1) };
        }

        bucket.requests.push(now);
        ThrottleDecision::Allowed { remaining: self.requests_per_window - used - 1 }
    }

    /// Drop buckets with no requests inside the window.
    pub async fn sweep(&self) {
        let mut buckets = self.buckets.write().await;
        prune_idle(&mut buckets, Instant::now(), self.window);
    }
}

fn prune_idle(buckets: &mut HashMap<(TenantId, PrincipalId), Bucket>, now: Instant, window: Duration) {
    buckets.retain(|_, bucket| {
        bucket.prune(now, window);
        !bucket.requests.is_empty()
    });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use salesagent_core::domain::principal::PrincipalId;
    use salesagent_core::domain::tenant::TenantId;

    use super::{RequestThrottle, ThrottleDecision};

    fn ids(tenant: &str, principal: &str) -> (TenantId, PrincipalId) {
        (TenantId(tenant.to_string()), PrincipalId(principal.to_string()))
    }

    #[tokio::test]
    async fn limits_after_quota_and_reports_retry_after() {
        let throttle = RequestThrottle::per_minute(2);
        let (tenant, principal) = ids("acme", "buyer_1");

        assert_eq!(
            throttle.check(&tenant, &principal).await,
            ThrottleDecision::Allowed { remaining: 1 }
        );
        assert_eq!(
            throttle.check(&tenant, &principal).await,
            ThrottleDecision::Allowed { remaining: 0 }
        );
        match throttle.check(&tenant, &principal).await {
            ThrottleDecision::Limited { retry_after_secs } => {
                assert!((1..=60).contains(&retry_after_secs));
            }
            other => panic!("expected limited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn same_principal_id_in_another_tenant_has_its_own_bucket() {
        let throttle = RequestThrottle::per_minute(1);
        let (acme, buyer) = ids("acme", "buyer_1");
        let (globex, _) = ids("globex", "buyer_1");

        assert!(throttle.check(&acme, &buyer).await.is_allowed());
        assert!(!throttle.check(&acme, &buyer).await.is_allowed());
        assert!(throttle.check(&globex, &buyer).await.is_allowed());
    }

    #[tokio::test]
    async fn zero_limit_disables_throttling() {
        let throttle = RequestThrottle::per_minute(0);
        let (tenant, principal) = ids("acme", "buyer_1");
        for _ in 0..100 {
            assert!(throttle.check(&tenant, &principal).await.is_allowed());
        }
    }

    #[tokio::test]
    async fn window_expiry_frees_the_bucket() {
        let throttle = RequestThrottle::with_window(1, Duration::from_millis(20));
        let (tenant, principal) = ids("acme", "buyer_1");

        assert!(throttle.check(&tenant, &principal).await.is_allowed());
        assert!(!throttle.check(&tenant, &principal).await.is_allowed());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(throttle.check(&tenant, &principal).await.is_allowed());

        tokio::time::sleep(Duration::from_millis(30)).await;
        throttle.sweep().await;
        assert!(throttle.buckets.read().await.is_empty());
    }
}
