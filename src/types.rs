//! Canonical entity types for one normalized snapshot.
//!
//! Raw TidyHQ rows (loosely-shaped JSON) are shaped into these types by the
//! normalizer. Everything here is immutable for the duration of a run and
//! discarded after publish; a re-run always rebuilds from scratch.
//!
//! IDs are opaque strings. Upstream sends some IDs as JSON numbers; the
//! normalizer stringifies them so dictionary keys match what consumers see
//! in the published JSON objects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// TidyHQ date format for invoice timestamps, e.g. `2022-12-30T16:36:35+0000`.
pub const TIDYHQ_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

// ============================================================================
// Entities
// ============================================================================

/// A group as referenced from a contact record (stub, not the full group).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupRef {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// A TidyHQ contact with its cross-service links already resolved from
/// custom fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub nick_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Groups this contact belongs to, as reported on the contact record.
    /// The authoritative membership lists live on [`Group::membership`].
    #[serde(default)]
    pub groups: Vec<GroupRef>,
    /// Linked Slack user ID, if the slack custom field is set.
    #[serde(default)]
    pub slack_id: Option<String>,
    /// Linked Taiga user ID, if the taiga custom field is set.
    #[serde(default)]
    pub taiga_id: Option<String>,
}

impl Contact {
    pub fn has_external_link(&self) -> bool {
        self.slack_id.is_some() || self.taiga_id.is_some()
    }
}

/// A TidyHQ group. `membership` is derived by the normalizer from contact
/// records, never taken verbatim from the group payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Contact IDs of current members. Sorted, deduplicated, and restricted
    /// to contacts that survived normalization.
    #[serde(default)]
    pub membership: Vec<String>,
}

/// A membership record linking a contact to a membership level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Membership {
    pub id: String,
    pub contact_id: String,
    pub membership_level_id: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

/// An invoice owned by a contact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    pub id: String,
    pub contact_id: String,
    /// Issue timestamp in TidyHQ wire format; validated parseable during
    /// normalization.
    pub created_at: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub status: Option<String>,
}

impl Invoice {
    /// Issue time as a unix timestamp. Falls back to 0 for a timestamp that
    /// somehow bypassed normalization; ordering stays deterministic either way.
    pub fn issued_ts(&self) -> i64 {
        chrono::DateTime::parse_from_str(&self.created_at, TIDYHQ_DATE_FORMAT)
            .map(|dt| dt.timestamp())
            .unwrap_or(0)
    }
}

/// Singleton organization metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrgDetails {
    #[serde(default)]
    pub name: Option<String>,
    pub domain_prefix: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

// ============================================================================
// Snapshot
// ============================================================================

/// The complete normalized output of one run. Read-only input to the index
/// builder, identity join engine, and legacy aggregator.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// All valid contacts, sorted ascending by ID.
    pub contacts: Vec<Contact>,
    /// Groups by ID, with derived membership lists.
    pub groups: BTreeMap<String, Group>,
    pub memberships: Vec<Membership>,
    pub invoices: Vec<Invoice>,
    pub org: OrgDetails,
    /// Unix timestamp of the upstream fetch this snapshot derives from.
    pub fetched_at: i64,
}
