//! Snapshot Publisher: atomic visibility for one snapshot's artifacts.
//!
//! Every artifact is first staged under a generation-numbered hidden
//! directory next to the served path. The served path itself is a symlink
//! to the current generation directory; the switch renames a freshly
//! created symlink over it, which POSIX guarantees is atomic. A concurrent
//! reader resolves either the entirely previous snapshot or the entirely
//! new one at every instant — there is no moment where the served path is
//! missing. Any failure during staging or the switch leaves the previous
//! snapshot untouched and fails the run with
//! [`PullError::PublishIncomplete`]; the staging area is disposable.
//!
//! Orphaned per-entity files (an entity deleted upstream) need no separate
//! cleanup pass: they disappear with the old generation directory, which is
//! removed only after the pointer has moved to the new one.

use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

use crate::aggregate::legacy_cache;
use crate::error::PullError;
use crate::identity::{AccountTable, Service};
use crate::index::Indexes;
use crate::types::Snapshot;
use crate::util::sanitize_id;

/// Name of the served pointer under the publisher root: a symlink to the
/// current generation's snapshot directory.
pub const SERVE_DIR_NAME: &str = "serve";

/// One named artifact: a path relative to the snapshot root and its
/// serialized body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub body: String,
}

/// The complete, already-serialized set of artifacts for one snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotPlan {
    pub artifacts: Vec<Artifact>,
}

impl SnapshotPlan {
    /// Serialize every artifact for one snapshot.
    ///
    /// All serialization happens up front so a failure here costs nothing:
    /// no file has been touched yet.
    pub fn build(
        snapshot: &Snapshot,
        indexes: &Indexes,
        accounts: &AccountTable,
    ) -> Result<SnapshotPlan, PullError> {
        let mut plan = SnapshotPlan::default();

        // Legacy combined artifact
        plan.push_json("cache.json", &legacy_cache(snapshot, indexes))?;

        // Contacts
        plan.push_json("contacts/sorted.json", &indexes.contacts_by_id)?;
        for (id, contact) in &indexes.contacts_by_id {
            plan.push_json(format!("contacts/{}.json", sanitize_id(id)), contact)?;
        }

        // Groups, membership lists included
        plan.push_json("groups/sorted.json", &indexes.groups_by_id)?;
        for (id, group) in &indexes.groups_by_id {
            plan.push_json(format!("groups/{}.json", sanitize_id(id)), group)?;
        }

        // Invoices
        plan.push_json("invoices/sorted.json", &indexes.invoices_by_contact)?;
        for (contact_id, invoices) in &indexes.invoices_by_contact {
            plan.push_json(format!("invoices/{}.json", sanitize_id(contact_id)), invoices)?;
        }
        plan.push_json("invoices/all_sorted.json", &indexes.invoices_all_by_id)?;
        plan.push_json("invoices/all.json", &indexes.invoices_all_by_date)?;

        // Memberships
        plan.push_json(
            "memberships/sorted_by_contact.json",
            &indexes.memberships_by_contact,
        )?;
        plan.push_json("memberships/sorted_by_type.json", &indexes.memberships_by_type)?;
        for (contact_id, memberships) in &indexes.memberships_by_contact {
            plan.push_json(
                format!("memberships/{}.json", sanitize_id(contact_id)),
                memberships,
            )?;
        }

        // Account maps, one dictionary and one directory per service
        for service in Service::ALL {
            let view = accounts.view(service);
            plan.push_json(format!("map/{}.json", service.as_str()), &view)?;
            for (id, row) in &view {
                plan.push_json(
                    format!("map/{}/{}.json", service.as_str(), sanitize_id(id)),
                    row,
                )?;
            }
        }

        // Org singleton
        plan.push_json("org.json", &snapshot.org)?;

        Ok(plan)
    }

    fn push_json<T: Serialize>(
        &mut self,
        path: impl Into<PathBuf>,
        value: &T,
    ) -> Result<(), PullError> {
        self.artifacts.push(Artifact {
            path: path.into(),
            body: serde_json::to_string_pretty(value)?,
        });
        Ok(())
    }
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSummary {
    pub files_written: usize,
    pub generation: String,
}

// Only one publish may be staging or switching at a time. Overlapping runs
// in one process queue here; cross-process serialization is the run lock's
// job.
static PUBLISH_GATE: Mutex<()> = Mutex::new(());
static GENERATION_SEQ: AtomicU64 = AtomicU64::new(0);

/// Writes snapshot plans to a sink root, exposing them under
/// `{root}/serve/`.
pub struct Publisher {
    root: PathBuf,
}

impl Publisher {
    pub fn new(root: impl Into<PathBuf>) -> Publisher {
        Publisher { root: root.into() }
    }

    /// The path a static file server should expose. A symlink that always
    /// resolves to one complete snapshot directory.
    pub fn serve_dir(&self) -> PathBuf {
        self.root.join(SERVE_DIR_NAME)
    }

    /// Commit a snapshot plan: stage everything, then swap it in.
    pub fn publish(&self, plan: &SnapshotPlan) -> Result<PublishSummary, PullError> {
        let _gate = PUBLISH_GATE
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let generation = format!(
            "{}-{}",
            chrono::Utc::now().timestamp_millis(),
            GENERATION_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let staging = self.root.join(format!(".staging-{}", generation));

        std::fs::create_dir_all(&self.root)?;
        if let Err(e) = stage(&staging, plan) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(PullError::PublishIncomplete(e.to_string()));
        }

        if let Err(e) = self.switch(&staging, &generation) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(PullError::PublishIncomplete(e.to_string()));
        }

        log::info!(
            "Published snapshot generation {} ({} files)",
            generation,
            plan.artifacts.len()
        );
        Ok(PublishSummary {
            files_written: plan.artifacts.len(),
            generation,
        })
    }

    /// The visibility switch. The staged directory gets its permanent
    /// generation name (still invisible — nothing points at it), then a new
    /// symlink is renamed over the served path. `rename` replaces an
    /// existing symlink atomically, so readers never see the path missing.
    /// The old generation directory is deleted only after the pointer moved.
    fn switch(&self, staging: &Path, generation: &str) -> std::io::Result<()> {
        let serve = self.serve_dir();
        let snapshot_name = format!("snapshot-{}", generation);
        let snapshot_dir = self.root.join(&snapshot_name);
        std::fs::rename(staging, &snapshot_dir)?;

        // Where the pointer aims now, so the old generation can be removed
        // after the switch. The symlink target is relative to the root.
        let previous = std::fs::read_link(&serve)
            .ok()
            .map(|target| self.root.join(target));

        let tmp_link = self.root.join(format!(".serve-{}", generation));
        if let Err(e) = symlink(&snapshot_name, &tmp_link) {
            let _ = std::fs::remove_dir_all(&snapshot_dir);
            return Err(e);
        }
        if let Err(e) = std::fs::rename(&tmp_link, &serve) {
            let _ = std::fs::remove_file(&tmp_link);
            let _ = std::fs::remove_dir_all(&snapshot_dir);
            return Err(e);
        }

        if let Some(previous) = previous {
            // The new snapshot is already visible; a leftover old directory
            // is not worth failing the run over.
            if previous != snapshot_dir {
                if let Err(e) = std::fs::remove_dir_all(&previous) {
                    log::warn!(
                        "Could not remove previous snapshot {}: {}",
                        previous.display(),
                        e
                    );
                }
            }
        }
        Ok(())
    }
}

fn stage(staging: &Path, plan: &SnapshotPlan) -> std::io::Result<()> {
    std::fs::create_dir_all(staging)?;
    for artifact in &plan.artifacts {
        let path = staging.join(&artifact.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &artifact.body)?;
    }
    Ok(())
}
