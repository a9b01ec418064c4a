//! Fetch cache for the raw upstream batch.
//!
//! One pull of TidyHQ data is persisted to `cache.json` so closely spaced
//! runs don't hammer the API. Freshness is governed by `cache_expiry` in the
//! config. The cache holds the raw batch, not derived structures — indexing
//! is cheap and deterministic, so everything downstream is always recomputed.

use std::path::Path;

use chrono::Utc;

use crate::config::Config;
use crate::error::PullError;
use crate::tidyhq::RawBatch;
use crate::util::atomic_write_str;

/// Load the cached batch if present, parseable, and younger than `max_age_secs`.
fn load_cached(path: &Path, max_age_secs: i64, now_ts: i64) -> Option<RawBatch> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => {
            log::debug!("No cache file found");
            return None;
        }
    };
    let batch: RawBatch = match serde_json::from_str(&content) {
        Ok(batch) => batch,
        Err(e) => {
            log::error!("Cache file is invalid: {}", e);
            return None;
        }
    };
    if batch.fetched_at < now_ts - max_age_secs {
        log::debug!("Cache file is stale");
        return None;
    }
    log::debug!("Cache file is fresh");
    Some(batch)
}

/// Return a fresh raw batch.
///
/// Source is, in priority order: the cache file (unless stale or `force`),
/// then the upstream fetch via `fetch`. A successful fetch is written back
/// to the cache file; failure to write the cache is logged but does not
/// fail the run.
pub fn fresh_batch(
    config: &Config,
    cache_path: &Path,
    force: bool,
    fetch: impl FnOnce() -> Result<RawBatch, PullError>,
) -> Result<RawBatch, PullError> {
    if !force {
        if let Some(batch) = load_cached(cache_path, config.cache_expiry(), Utc::now().timestamp())
        {
            return Ok(batch);
        }
    }

    let batch = fetch()?;

    match serde_json::to_string(&batch) {
        Ok(body) => {
            if let Err(e) = atomic_write_str(cache_path, &body) {
                log::warn!("Could not write cache file {}: {}", cache_path.display(), e);
            }
        }
        Err(e) => log::warn!("Could not serialize cache: {}", e),
    }

    Ok(batch)
}
