use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use salesagent_core::domain::creative::CreativeId;
use salesagent_core::domain::media_buy::MediaBuyId;
use salesagent_core::domain::tenant::TenantId;

const PRUNE_THRESHOLD: usize = 1_024;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Record {
    MediaBuy(MediaBuyId),
    Creative(CreativeId),
}

type RecordKey = (TenantId, Record);

/// One async mutex per media buy and per creative. Every read-modify-write
/// of either holds its lock, so requests and the reconciler never interleave
/// on the same record.
///
/// Lock order: a buy before any of its creatives, and creatives in id order.
#[derive(Default)]
pub struct RecordLocks {
    locks: Mutex<HashMap<RecordKey, Arc<AsyncMutex<()>>>>,
}

impl RecordLocks {
    pub async fn media_buy(&self, tenant_id: &TenantId, media_buy_id: &MediaBuyId) -> OwnedMutexGuard<()> {
        self.acquire((tenant_id.clone(), Record::MediaBuy(media_buy_id.clone()))).await
    }

    pub async fn creative(&self, tenant_id: &TenantId, creative_id: &CreativeId) -> OwnedMutexGuard<()> {
        self.acquire((tenant_id.clone(), Record::Creative(creative_id.clone()))).await
    }

    async fn acquire(&self, key: RecordKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(locks) => locks,
                Err(poisoned) => poisoned.into_inner(),
            };
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(key).or_insert_with(|| Arc::new(AsyncMutex::new(()))))
        };
        lock.lock_owned().await
    }
}
