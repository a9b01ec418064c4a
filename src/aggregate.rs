//! Legacy Aggregator: the combined `cache.json` artifact.
//!
//! Older consumers predate the per-entity indices and read one combined
//! file shaped like the original cache response. This is pure re-assembly of
//! structures the other builders already produced; nothing is computed here.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::index::Indexes;
use crate::types::{Contact, Group, Invoice, Membership, OrgDetails, Snapshot};

/// The backward-compatible combined artifact. Borrows everything from the
/// snapshot and its indexes; serialized once at publish time.
#[derive(Debug, Serialize)]
pub struct LegacyCache<'a> {
    pub contacts: &'a [Contact],
    pub groups: &'a BTreeMap<String, Group>,
    pub memberships: &'a [Membership],
    pub invoices: &'a BTreeMap<String, Vec<Invoice>>,
    pub org: &'a OrgDetails,
    /// Unix timestamp of the fetch this snapshot derives from.
    pub time: i64,
}

pub fn legacy_cache<'a>(snapshot: &'a Snapshot, indexes: &'a Indexes) -> LegacyCache<'a> {
    LegacyCache {
        contacts: &snapshot.contacts,
        groups: &indexes.groups_by_id,
        memberships: &snapshot.memberships,
        invoices: &indexes.invoices_by_contact,
        org: &snapshot.org,
        time: snapshot.fetched_at,
    }
}
