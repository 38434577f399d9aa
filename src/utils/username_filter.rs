use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use futures::StreamExt;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Expected capacity and false-positive rate.
const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

static USERNAME_FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

#[inline]
fn normalize(username: &str) -> String {
    username.to_lowercase()
}

// A panic while holding the lock leaves the filter usable; at worst it
// answers "might exist" and the caller falls back to the database.
fn read() -> RwLockReadGuard<'static, CuckooFilter<String>> {
    USERNAME_FILTER.read().unwrap_or_else(|e| e.into_inner())
}

fn write() -> RwLockWriteGuard<'static, CuckooFilter<String>> {
    USERNAME_FILTER.write().unwrap_or_else(|e| e.into_inner())
}

/// Check if a username might exist (false positives possible)
pub fn might_exist(username: &str) -> bool {
    read().contains(&normalize(username))
}

/// Insert a single username into the filter
pub fn insert(username: &str) {
    write().add(&normalize(username));
}

/// Remove a username from the filter
pub fn remove(username: &str) {
    write().remove(&normalize(username));
}

/// Warm up the username filter using streaming + batching
pub async fn warmup_username_filter(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String,)>("SELECT username FROM users").fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (username,) = row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;

        batch.push(normalize(&username));
        total += 1;

        if batch.len() == batch_size {
            insert_batch(&batch);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        insert_batch(&batch);
    }

    log::info!("Username filter warmup complete: {} users", total);
    Ok(())
}

/// Insert a batch of normalized usernames
fn insert_batch(usernames: &[String]) {
    let mut filter = write();
    for username in usernames {
        filter.add(username);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_names_might_exist_case_insensitively() {
        insert("Filter.Test.Alice");
        assert!(might_exist("filter.test.alice"));
        remove("filter.test.alice");
        assert!(!might_exist("filter.test.alice"));
    }

    #[test]
    fn unseen_name_is_definitely_free() {
        assert!(!might_exist("filter.test.never-inserted"));
    }
}
