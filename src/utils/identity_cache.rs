use anyhow::Result;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;

use super::{IdentityKind, identity_key};

/// Keys present here are TAKEN. Absence proves nothing.
pub static IDENTITY_CACHE: Lazy<Cache<String, bool>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(500_000)
        .time_to_live(Duration::from_secs(86400)) // 24h TTL
        .build()
});

pub async fn mark_taken(kind: IdentityKind, value: &str) {
    IDENTITY_CACHE.insert(identity_key(kind, value), true).await;
}

pub async fn is_taken(kind: IdentityKind, value: &str) -> bool {
    IDENTITY_CACHE
        .get(&identity_key(kind, value))
        .await
        .unwrap_or(false)
}

pub async fn forget(kind: IdentityKind, value: &str) {
    IDENTITY_CACHE.invalidate(&identity_key(kind, value)).await;
}

async fn batch_mark(keys: &[String]) {
    let futures: Vec<_> = keys.iter().map(|k| IDENTITY_CACHE.insert(k.clone(), true)).collect();

    futures::future::join_all(futures).await;
}

/// Load identifiers of recently active users into the cache (batched)
pub async fn warmup_identity_cache(pool: &MySqlPool, days: u32, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String, String)>(
        r#"
        SELECT username, email
        FROM users
        WHERE last_login_at >= NOW() - INTERVAL ? DAY
        ORDER BY last_login_at DESC
        "#,
    )
    .bind(days)
    .fetch(pool);

    let mut batch = Vec::with_capacity(batch_size * 2);
    let mut total_count = 0usize;

    while let Some(row) = stream.next().await {
        let (username, email) = row?;
        batch.push(identity_key(IdentityKind::Username, &username));
        batch.push(identity_key(IdentityKind::Email, &email));
        total_count += 1;

        if batch.len() >= batch_size * 2 {
            batch_mark(&batch).await;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        batch_mark(&batch).await;
    }

    log::info!(
        "Identity cache warmup complete: {} recent users (last {} days)",
        total_count,
        days
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn marked_identifiers_are_taken_until_forgotten() {
        mark_taken(IdentityKind::Email, "Cache-Test@Company.com").await;
        assert!(is_taken(IdentityKind::Email, "cache-test@company.com").await);
        assert!(!is_taken(IdentityKind::Username, "cache-test@company.com").await);

        forget(IdentityKind::Email, "cache-test@company.com").await;
        assert!(!is_taken(IdentityKind::Email, "cache-test@company.com").await);
    }
}
