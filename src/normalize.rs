//! Entity Normalizer: raw TidyHQ rows → one canonical [`Snapshot`].
//!
//! Records missing a required key (own ID, owning contact ID, a parseable
//! invoice date) are dropped, counted, and logged — never fatal on their
//! own. A batch that normalizes to zero usable contacts aborts the run with
//! [`PullError::EmptyDataset`].
//!
//! Group membership is derived here from the group stubs on each surviving
//! contact. The lists on the group payloads themselves are never trusted, so
//! a membership entry can only ever point at a contact that exists in the
//! same snapshot.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::config::FieldIds;
use crate::error::PullError;
use crate::tidyhq::RawBatch;
use crate::types::{
    Contact, Group, GroupRef, Invoice, Membership, OrgDetails, Snapshot, TIDYHQ_DATE_FORMAT,
};

/// Per-category skip counters for one normalization pass. Surfaced in the
/// run summary so data-quality drift is visible without failing the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub malformed_contacts: usize,
    pub malformed_groups: usize,
    pub malformed_memberships: usize,
    pub malformed_invoices: usize,
    /// Group stubs on contacts that name a group absent from the batch.
    pub unknown_group_refs: usize,
    /// Contacts sharing an ID with an earlier record; the later one wins.
    pub duplicate_contacts: usize,
}

impl NormalizeReport {
    pub fn total_skipped(&self) -> usize {
        self.malformed_contacts
            + self.malformed_groups
            + self.malformed_memberships
            + self.malformed_invoices
    }
}

// ============================================================================
// Field helpers
// ============================================================================

/// Read an ID field that upstream may send as a JSON number or string.
fn id_string(raw: &Value, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn opt_string(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Amount fields arrive as numbers or numeric strings depending on endpoint.
fn amount_f64(raw: &Value, key: &str) -> f64 {
    match raw.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Look up the value of a custom field on a raw contact by field ID.
fn custom_field_value(raw: &Value, field_id: &str) -> Option<String> {
    let fields = raw.get("custom_fields")?.as_array()?;
    for field in fields {
        if field.get("id").and_then(Value::as_str) == Some(field_id) {
            return field
                .get("value")
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
        }
    }
    None
}

// ============================================================================
// Per-record shaping
// ============================================================================

fn contact_from_raw(raw: &Value, ids: &FieldIds) -> Result<Contact, PullError> {
    let id = id_string(raw, "id")
        .ok_or_else(|| PullError::malformed("contact", "missing id"))?;

    let groups = raw
        .get("groups")
        .and_then(Value::as_array)
        .map(|stubs| {
            stubs
                .iter()
                .filter_map(|stub| {
                    id_string(stub, "id").map(|id| GroupRef {
                        id,
                        label: opt_string(stub, "label"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let slack_id = ids
        .slack
        .as_deref()
        .and_then(|field_id| custom_field_value(raw, field_id));
    let taiga_id = ids
        .taiga
        .as_deref()
        .and_then(|field_id| custom_field_value(raw, field_id));

    Ok(Contact {
        id,
        first_name: opt_string(raw, "first_name"),
        last_name: opt_string(raw, "last_name"),
        nick_name: opt_string(raw, "nick_name"),
        company: opt_string(raw, "company"),
        email_address: opt_string(raw, "email_address"),
        phone_number: opt_string(raw, "phone_number"),
        status: opt_string(raw, "status"),
        groups,
        slack_id,
        taiga_id,
    })
}

fn group_from_raw(raw: &Value) -> Result<Group, PullError> {
    let id = id_string(raw, "id")
        .ok_or_else(|| PullError::malformed("group", "missing id"))?;
    Ok(Group {
        id,
        label: opt_string(raw, "label"),
        description: opt_string(raw, "description"),
        membership: Vec::new(),
    })
}

fn membership_from_raw(raw: &Value) -> Result<Membership, PullError> {
    let id = id_string(raw, "id")
        .ok_or_else(|| PullError::malformed("membership", "missing id"))?;
    let contact_id = id_string(raw, "contact_id")
        .ok_or_else(|| PullError::malformed("membership", "missing contact_id"))?;
    let membership_level_id = id_string(raw, "membership_level_id")
        .ok_or_else(|| PullError::malformed("membership", "missing membership_level_id"))?;
    Ok(Membership {
        id,
        contact_id,
        membership_level_id,
        state: opt_string(raw, "state"),
        start_date: opt_string(raw, "start_date"),
        end_date: opt_string(raw, "end_date"),
    })
}

fn invoice_from_raw(raw: &Value) -> Result<Invoice, PullError> {
    let id = id_string(raw, "id")
        .ok_or_else(|| PullError::malformed("invoice", "missing id"))?;
    let contact_id = id_string(raw, "contact_id")
        .ok_or_else(|| PullError::malformed("invoice", "missing contact_id"))?;
    let created_at = opt_string(raw, "created_at")
        .ok_or_else(|| PullError::malformed("invoice", "missing created_at"))?;
    if chrono::DateTime::parse_from_str(&created_at, TIDYHQ_DATE_FORMAT).is_err() {
        return Err(PullError::malformed(
            "invoice",
            format!("unparseable created_at: {}", created_at),
        ));
    }
    Ok(Invoice {
        id,
        contact_id,
        created_at,
        amount: amount_f64(raw, "amount"),
        status: opt_string(raw, "status"),
    })
}

fn org_from_raw(raw: &Value) -> Result<OrgDetails, PullError> {
    let domain_prefix = opt_string(raw, "domain_prefix")
        .ok_or_else(|| PullError::MalformedOrg("missing domain_prefix".into()))?;
    Ok(OrgDetails {
        name: opt_string(raw, "name"),
        domain_prefix,
        created_at: opt_string(raw, "created_at"),
    })
}

// ============================================================================
// Batch normalization
// ============================================================================

/// Shape one collection, dropping and counting records that fail.
fn shape_all<T>(
    rows: &[Value],
    category: &'static str,
    skipped: &mut usize,
    shape: impl Fn(&Value) -> Result<T, PullError>,
) -> Vec<T> {
    let mut shaped = Vec::with_capacity(rows.len());
    for row in rows {
        match shape(row) {
            Ok(entity) => shaped.push(entity),
            Err(e) => {
                log::warn!("Skipping {} record: {}", category, e);
                *skipped += 1;
            }
        }
    }
    shaped
}

/// Normalize one raw batch into a snapshot.
///
/// The only hard failures are an unusable organization record and a batch
/// with zero valid contacts; everything else is skip + count.
pub fn normalize(batch: &RawBatch, ids: &FieldIds) -> Result<(Snapshot, NormalizeReport), PullError> {
    let mut report = NormalizeReport::default();

    let shaped_contacts =
        shape_all(&batch.contacts, "contact", &mut report.malformed_contacts, |raw| {
            contact_from_raw(raw, ids)
        });
    if shaped_contacts.is_empty() {
        return Err(PullError::EmptyDataset);
    }

    // Keys must be unique per dictionary, so duplicate contact IDs collapse
    // to one record here: last occurrence in batch order wins. Leaving both
    // in would give the identity join two rows for one tidyhq ID.
    let mut contacts_by_id: BTreeMap<String, Contact> = BTreeMap::new();
    for contact in shaped_contacts {
        if let Some(replaced) = contacts_by_id.insert(contact.id.clone(), contact) {
            log::warn!("Duplicate contact ID {}, keeping the later record", replaced.id);
            report.duplicate_contacts += 1;
        }
    }
    let contacts: Vec<Contact> = contacts_by_id.into_values().collect();

    let mut groups: BTreeMap<String, Group> =
        shape_all(&batch.groups, "group", &mut report.malformed_groups, group_from_raw)
            .into_iter()
            .map(|g| (g.id.clone(), g))
            .collect();

    // Groups don't include their members but should. Derive membership from
    // the surviving contacts only.
    for contact in &contacts {
        for stub in &contact.groups {
            match groups.get_mut(&stub.id) {
                Some(group) => group.membership.push(contact.id.clone()),
                None => {
                    log::debug!(
                        "Contact {} references unknown group {}",
                        contact.id,
                        stub.id
                    );
                    report.unknown_group_refs += 1;
                }
            }
        }
    }
    for group in groups.values_mut() {
        group.membership.sort();
        group.membership.dedup();
    }

    let memberships = shape_all(
        &batch.memberships,
        "membership",
        &mut report.malformed_memberships,
        membership_from_raw,
    );
    let invoices = shape_all(
        &batch.invoices,
        "invoice",
        &mut report.malformed_invoices,
        invoice_from_raw,
    );

    let org = org_from_raw(&batch.org)?;

    if report.total_skipped() > 0 {
        log::warn!(
            "Normalization skipped {} malformed records ({} contacts, {} groups, {} memberships, {} invoices)",
            report.total_skipped(),
            report.malformed_contacts,
            report.malformed_groups,
            report.malformed_memberships,
            report.malformed_invoices,
        );
    }

    Ok((
        Snapshot {
            contacts,
            groups,
            memberships,
            invoices,
            org,
            fetched_at: batch.fetched_at,
        },
        report,
    ))
}
