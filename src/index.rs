//! Index Builder: every single-entity dictionary derived from a snapshot.
//!
//! All builders are pure functions over a read-only [`Snapshot`] and an
//! injected reference time, so two passes over the same snapshot produce
//! identical output. Dictionaries are `BTreeMap`s keyed by the canonical ID
//! of exactly one entity kind; iteration order is therefore ID-sorted at
//! generation time. Only `invoices_all_by_date` promises an ordering that
//! survives past the publisher.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::types::{Contact, Group, Invoice, Membership, Snapshot};

/// Contacts whose newest invoice is older than this are trimmed from the
/// per-contact invoice lists: 18 months of 30 days.
pub const INVOICE_RETENTION_SECS: i64 = 86_400 * 30 * 18;

/// All derived dictionaries for one snapshot.
#[derive(Debug, Clone)]
pub struct Indexes {
    pub contacts_by_id: BTreeMap<String, Contact>,
    pub groups_by_id: BTreeMap<String, Group>,
    pub memberships_by_contact: BTreeMap<String, Vec<Membership>>,
    pub memberships_by_type: BTreeMap<String, Vec<Membership>>,
    pub invoices_by_contact: BTreeMap<String, Vec<Invoice>>,
    /// Generated ID-sorted; consumers must not rely on ordering after they
    /// parse it (only `invoices_all_by_date` guarantees order downstream).
    pub invoices_all_by_id: BTreeMap<String, Invoice>,
    /// Ascending by issue date, ties broken by invoice ID ascending.
    pub invoices_all_by_date: Vec<Invoice>,
}

/// Build every index for one snapshot.
pub fn build(snapshot: &Snapshot, now: DateTime<Utc>) -> Indexes {
    let invoices_by_contact = invoices_by_contact(snapshot, now);
    let invoices_all_by_date = invoices_all_by_date(&invoices_by_contact);
    let invoices_all_by_id = invoices_all_by_id(&invoices_all_by_date);
    Indexes {
        contacts_by_id: contacts_by_id(snapshot),
        groups_by_id: snapshot.groups.clone(),
        memberships_by_contact: memberships_by_contact(snapshot),
        memberships_by_type: memberships_by_type(snapshot),
        invoices_by_contact,
        invoices_all_by_id,
        invoices_all_by_date,
    }
}

pub fn contacts_by_id(snapshot: &Snapshot) -> BTreeMap<String, Contact> {
    snapshot
        .contacts
        .iter()
        .map(|c| (c.id.clone(), c.clone()))
        .collect()
}

/// Group memberships by owning contact. Every snapshot contact appears as a
/// key, with an empty list when it has no memberships.
pub fn memberships_by_contact(snapshot: &Snapshot) -> BTreeMap<String, Vec<Membership>> {
    let mut by_contact: BTreeMap<String, Vec<Membership>> = snapshot
        .contacts
        .iter()
        .map(|c| (c.id.clone(), Vec::new()))
        .collect();
    for membership in &snapshot.memberships {
        by_contact
            .entry(membership.contact_id.clone())
            .or_default()
            .push(membership.clone());
    }
    by_contact
}

/// Group memberships by membership level. Levels aren't snapshot entities,
/// so only observed levels appear as keys.
pub fn memberships_by_type(snapshot: &Snapshot) -> BTreeMap<String, Vec<Membership>> {
    let mut by_type: BTreeMap<String, Vec<Membership>> = BTreeMap::new();
    for membership in &snapshot.memberships {
        by_type
            .entry(membership.membership_level_id.clone())
            .or_default()
            .push(membership.clone());
    }
    by_type
}

/// Group invoices by owning contact, newest first per contact.
///
/// Contacts with no invoice in the last 18 months have their list emptied
/// (the stale invoices drop out of every invoice artifact). Every snapshot
/// contact still appears as a key, empty list included.
pub fn invoices_by_contact(snapshot: &Snapshot, now: DateTime<Utc>) -> BTreeMap<String, Vec<Invoice>> {
    let cutoff = now.timestamp() - INVOICE_RETENTION_SECS;

    let mut by_contact: BTreeMap<String, Vec<Invoice>> = snapshot
        .contacts
        .iter()
        .map(|c| (c.id.clone(), Vec::new()))
        .collect();
    for invoice in &snapshot.invoices {
        by_contact
            .entry(invoice.contact_id.clone())
            .or_default()
            .push(invoice.clone());
    }

    let mut trimmed = 0usize;
    for invoices in by_contact.values_mut() {
        let newest = invoices.iter().map(Invoice::issued_ts).max();
        if let Some(newest) = newest {
            if newest < cutoff {
                invoices.clear();
                trimmed += 1;
                continue;
            }
        }
        invoices.sort_by(|a, b| {
            b.issued_ts()
                .cmp(&a.issued_ts())
                .then_with(|| a.id.cmp(&b.id))
        });
    }
    if trimmed > 0 {
        log::debug!(
            "Trimmed {} invoice lists where the contact hasn't had an invoice in 18 months",
            trimmed
        );
    }
    by_contact
}

/// All retained invoices, ascending by issue date, ties by ID ascending.
pub fn invoices_all_by_date(by_contact: &BTreeMap<String, Vec<Invoice>>) -> Vec<Invoice> {
    let mut all: Vec<Invoice> = by_contact.values().flatten().cloned().collect();
    all.sort_by(|a, b| {
        a.issued_ts()
            .cmp(&b.issued_ts())
            .then_with(|| a.id.cmp(&b.id))
    });
    all
}

pub fn invoices_all_by_id(all: &[Invoice]) -> BTreeMap<String, Invoice> {
    all.iter().map(|i| (i.id.clone(), i.clone())).collect()
}
