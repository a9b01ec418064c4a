//! Pull run: fetch TidyHQ data and publish a fresh snapshot.
//!
//! Usage: `pull [--force]`. `--force` bypasses both the fetch cache and the
//! `pull.lock` concurrent-run guard.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tidycache::cache;
use tidycache::config::Config;
use tidycache::error::PullError;
use tidycache::publish::Publisher;
use tidycache::tidyhq::Client;

const CONFIG_PATH: &str = "config.json";
const CACHE_PATH: &str = "cache.json";
const LOCK_PATH: &str = "pull.lock";

/// Advisory lock file preventing overlapping scheduled runs. Removed when
/// the run finishes, success or not.
struct RunLock {
    path: PathBuf,
}

impl RunLock {
    fn acquire(path: &Path, force: bool) -> Result<RunLock, PullError> {
        if path.exists() {
            if force {
                log::warn!("{} found but --force given, continuing", path.display());
            } else {
                return Err(PullError::Config(format!(
                    "{} found. Exiting to prevent concurrent runs",
                    path.display()
                )));
            }
        }
        std::fs::write(path, "")?;
        log::info!("{} created", path.display());
        Ok(RunLock {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("Could not remove {}: {}", self.path.display(), e);
        }
    }
}

fn run(force: bool) -> Result<(), PullError> {
    let _lock = RunLock::acquire(Path::new(LOCK_PATH), force)?;

    let config = Config::load(Path::new(CONFIG_PATH))?;
    let client = Client::new(&config);
    let batch = cache::fresh_batch(&config, Path::new(CACHE_PATH), force, || {
        client.fetch_batch()
    })?;
    log::info!(
        "TidyHQ batch ready: {} contacts, {} groups",
        batch.contacts.len(),
        batch.groups.len()
    );

    let (plan, report) = tidycache::build_plan(&batch, &config.tidyhq.ids, chrono::Utc::now())?;
    let summary = Publisher::new(".").publish(&plan)?;

    log::info!(
        "Run complete: {} contacts, {} groups, {} memberships, {} invoices, {} identity rows",
        report.contacts,
        report.groups,
        report.memberships,
        report.invoices,
        report.identity_rows,
    );
    if report.normalize.total_skipped() > 0 {
        log::warn!(
            "{} malformed records were skipped this run",
            report.normalize.total_skipped()
        );
    }
    if report.identity_conflicts > 0 {
        log::warn!(
            "{} duplicate external-identity claims were resolved last-write-wins",
            report.identity_conflicts
        );
    }
    log::info!(
        "Snapshot generation {} visible ({} files)",
        summary.generation,
        summary.files_written
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let force = std::env::args().any(|arg| arg == "--force");

    match run(force) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Pull run failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
