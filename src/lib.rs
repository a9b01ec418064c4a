//! tidycache — pre-computed TidyHQ organization snapshots.
//!
//! Pulls contacts, groups, memberships, invoices, and org details from the
//! TidyHQ API, derives every indexed and cross-referenced artifact consumers
//! need (per-entity dictionaries, cross-service account maps, the legacy
//! combined cache), and publishes them as static JSON files with atomic
//! snapshot visibility. Latency-sensitive consumers (chat-bot triggers,
//! account-mapping lookups) read the files instead of issuing live paginated
//! API queries.
//!
//! Pipeline: fetch → [`normalize`] → [`index`] + [`identity`] +
//! [`aggregate`] → [`publish`]. Each run recomputes the full snapshot; no
//! incremental updates.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod identity;
pub mod index;
pub mod normalize;
pub mod publish;
pub mod tidyhq;
pub mod types;
pub mod util;

use chrono::{DateTime, Utc};

use crate::config::FieldIds;
use crate::error::PullError;
use crate::identity::AccountTable;
use crate::normalize::NormalizeReport;
use crate::publish::SnapshotPlan;
use crate::tidyhq::RawBatch;

/// What one build produced, surfaced to the invoking scheduler.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub contacts: usize,
    pub groups: usize,
    pub memberships: usize,
    pub invoices: usize,
    pub identity_rows: usize,
    pub identity_conflicts: usize,
    pub normalize: NormalizeReport,
}

/// Derive the complete snapshot plan from one raw batch.
///
/// This is the whole build minus I/O at either end: normalization, all
/// indices, the identity join, the legacy aggregate, and serialization.
/// Pure given `batch`, `ids`, and `now` — identical input yields a
/// byte-identical plan.
pub fn build_plan(
    batch: &RawBatch,
    ids: &FieldIds,
    now: DateTime<Utc>,
) -> Result<(SnapshotPlan, RunReport), PullError> {
    let (snapshot, normalize_report) = normalize::normalize(batch, ids)?;
    let indexes = index::build(&snapshot, now);
    let accounts = AccountTable::build(&snapshot.contacts);
    let plan = SnapshotPlan::build(&snapshot, &indexes, &accounts)?;

    Ok((
        plan,
        RunReport {
            contacts: snapshot.contacts.len(),
            groups: snapshot.groups.len(),
            memberships: snapshot.memberships.len(),
            invoices: snapshot.invoices.len(),
            identity_rows: accounts.rows().len(),
            identity_conflicts: accounts.conflicts.len(),
            normalize: normalize_report,
        },
    ))
}
