use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use futures::StreamExt;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::{PoisonError, RwLock};

use super::{IdentityKind, identity_key};

/// Expected capacity and false-positive rate.
/// Usernames and emails share one filter.
const FILTER_CAPACITY: usize = 200_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

static IDENTITY_FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

/// Check if an identifier might exist (false positives possible)
pub fn might_exist(kind: IdentityKind, value: &str) -> bool {
    let key = identity_key(kind, value);
    IDENTITY_FILTER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(&key)
}

pub fn insert(kind: IdentityKind, value: &str) {
    let key = identity_key(kind, value);
    IDENTITY_FILTER
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .add(&key);
}

/// Forget an identifier, e.g. after a rename or a deleted account.
pub fn remove(kind: IdentityKind, value: &str) {
    let key = identity_key(kind, value);
    IDENTITY_FILTER
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&key);
}

/// Warm up the filter with every username and email, streamed in batches
pub async fn warmup_identity_filter(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String, String)>("SELECT username, email FROM users").fetch(pool);

    let mut batch = Vec::with_capacity(batch_size * 2);
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (username, email) = row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;

        batch.push(identity_key(IdentityKind::Username, &username));
        batch.push(identity_key(IdentityKind::Email, &email));
        total += 1;

        if batch.len() >= batch_size * 2 {
            insert_batch(&batch);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        insert_batch(&batch);
    }

    log::info!("Identity filter warmup complete: {} users", total);
    Ok(())
}

/// Insert a batch of already normalized keys
fn insert_batch(keys: &[String]) {
    let mut filter = IDENTITY_FILTER.write().unwrap_or_else(PoisonError::into_inner);

    for key in keys {
        filter.add(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_identifiers_are_reported() {
        insert(IdentityKind::Username, "Filter-Test-User");
        assert!(might_exist(IdentityKind::Username, "filter-test-user"));
        assert!(!might_exist(IdentityKind::Email, "filter-test-user"));

        remove(IdentityKind::Username, "filter-test-user");
        assert!(!might_exist(IdentityKind::Username, "filter-test-user"));
    }
}
