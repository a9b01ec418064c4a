//! Identity Join Engine: cross-service account mapping.
//!
//! One canonical table is built in a single pass over the normalized
//! contacts; the three published dictionaries (by Slack ID, by Taiga ID, by
//! TidyHQ ID) are projections of that table. Cross-view consistency is
//! structural: there is exactly one row per logical identity, so looking it
//! up through any key yields the same null/non-null peer IDs.
//!
//! TidyHQ is the sole authority. A row exists only for a contact with at
//! least one recorded external link; an identity that lives only in Slack or
//! Taiga never appears.

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::Contact;

/// One logical identity row. The field used as a view's key is non-null in
/// that view by construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountMapEntry {
    pub slack_id: Option<String>,
    pub taiga_id: Option<String>,
    pub tidyhq_id: Option<String>,
}

/// The three external ID spaces a row can be keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Slack,
    Taiga,
    TidyHq,
}

impl Service {
    pub const ALL: [Service; 3] = [Service::Slack, Service::Taiga, Service::TidyHq];

    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Slack => "slack",
            Service::Taiga => "taiga",
            Service::TidyHq => "tidyhq",
        }
    }
}

/// A duplicate claim on one external identity: two contacts recorded the
/// same Slack or Taiga ID. Resolved last-write-wins in contact-ID order,
/// reported so the data-quality problem is visible upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinConflict {
    pub service: Service,
    pub external_id: String,
    /// Contact whose claim was discarded.
    pub loser_contact_id: String,
    /// Contact whose claim stands.
    pub winner_contact_id: String,
}

/// The canonical identity table for one snapshot.
#[derive(Debug, Clone, Default)]
pub struct AccountTable {
    rows: Vec<AccountMapEntry>,
    pub conflicts: Vec<JoinConflict>,
}

impl AccountTable {
    /// Single pass over contacts in ascending contact-ID order (the order
    /// the snapshot guarantees). Later contacts win duplicate claims; the
    /// earlier row's link is cleared so every projection stays consistent,
    /// and rows left with no external link are dropped.
    pub fn build(contacts: &[Contact]) -> AccountTable {
        let mut rows: Vec<AccountMapEntry> = Vec::new();
        let mut conflicts: Vec<JoinConflict> = Vec::new();
        let mut claimed_slack: HashMap<String, usize> = HashMap::new();
        let mut claimed_taiga: HashMap<String, usize> = HashMap::new();

        for contact in contacts {
            if !contact.has_external_link() {
                continue;
            }
            let row_index = rows.len();
            rows.push(AccountMapEntry {
                slack_id: contact.slack_id.clone(),
                taiga_id: contact.taiga_id.clone(),
                tidyhq_id: Some(contact.id.clone()),
            });

            if let Some(slack_id) = contact.slack_id.clone() {
                if let Some(&earlier) = claimed_slack.get(&slack_id) {
                    conflicts.push(Self::resolve(
                        &mut rows,
                        earlier,
                        Service::Slack,
                        &slack_id,
                        &contact.id,
                    ));
                }
                claimed_slack.insert(slack_id, row_index);
            }
            if let Some(taiga_id) = contact.taiga_id.clone() {
                if let Some(&earlier) = claimed_taiga.get(&taiga_id) {
                    conflicts.push(Self::resolve(
                        &mut rows,
                        earlier,
                        Service::Taiga,
                        &taiga_id,
                        &contact.id,
                    ));
                }
                claimed_taiga.insert(taiga_id, row_index);
            }
        }

        // Losing rows that kept another link survive; fully unlinked ones go.
        rows.retain(|row| row.slack_id.is_some() || row.taiga_id.is_some());

        AccountTable { rows, conflicts }
    }

    /// Clear the earlier row's claim and report the conflict.
    fn resolve(
        rows: &mut [AccountMapEntry],
        earlier: usize,
        service: Service,
        external_id: &str,
        winner: &str,
    ) -> JoinConflict {
        let loser_row = &mut rows[earlier];
        let loser = loser_row.tidyhq_id.clone().unwrap_or_default();
        match service {
            Service::Slack => loser_row.slack_id = None,
            Service::Taiga => loser_row.taiga_id = None,
            Service::TidyHq => {}
        }
        log::warn!(
            "Contacts {} and {} both claim {} ID {}; keeping {}",
            loser,
            winner,
            service.as_str(),
            external_id,
            winner
        );
        JoinConflict {
            service,
            external_id: external_id.to_string(),
            loser_contact_id: loser,
            winner_contact_id: winner.to_string(),
        }
    }

    pub fn rows(&self) -> &[AccountMapEntry] {
        &self.rows
    }

    /// Project the table into a dictionary keyed by one service's ID. Rows
    /// without that field are absent from the view; a null is never a key.
    pub fn view(&self, service: Service) -> BTreeMap<String, AccountMapEntry> {
        self.rows
            .iter()
            .filter_map(|row| {
                let key = match service {
                    Service::Slack => row.slack_id.clone(),
                    Service::Taiga => row.taiga_id.clone(),
                    Service::TidyHq => row.tidyhq_id.clone(),
                };
                key.map(|k| (k, row.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(id: &str, slack: Option<&str>, taiga: Option<&str>) -> Contact {
        Contact {
            id: id.into(),
            first_name: None,
            last_name: None,
            nick_name: None,
            company: None,
            email_address: None,
            phone_number: None,
            status: None,
            groups: vec![],
            slack_id: slack.map(str::to_string),
            taiga_id: taiga.map(str::to_string),
        }
    }

    #[test]
    fn test_slack_only_contact_scenario() {
        let table = AccountTable::build(&[contact("C1", Some("S9"), None)]);
        let by_slack = table.view(Service::Slack);
        assert_eq!(
            by_slack["S9"],
            AccountMapEntry {
                slack_id: Some("S9".into()),
                taiga_id: None,
                tidyhq_id: Some("C1".into()),
            }
        );
        assert!(table.view(Service::Taiga).is_empty());
        assert!(table.view(Service::TidyHq).contains_key("C1"));
    }

    #[test]
    fn test_unlinked_contact_has_no_row() {
        let table = AccountTable::build(&[contact("C1", None, None)]);
        assert!(table.rows().is_empty());
        for service in Service::ALL {
            assert!(table.view(service).is_empty());
        }
    }

    #[test]
    fn test_views_never_key_a_null_field() {
        let table = AccountTable::build(&[
            contact("C1", Some("S1"), None),
            contact("C2", None, Some("T2")),
            contact("C3", Some("S3"), Some("T3")),
        ]);
        for (key, row) in table.view(Service::Slack) {
            assert_eq!(row.slack_id.as_deref(), Some(key.as_str()));
        }
        for (key, row) in table.view(Service::Taiga) {
            assert_eq!(row.taiga_id.as_deref(), Some(key.as_str()));
        }
        for (key, row) in table.view(Service::TidyHq) {
            assert_eq!(row.tidyhq_id.as_deref(), Some(key.as_str()));
        }
    }

    #[test]
    fn test_cross_view_consistency() {
        let table = AccountTable::build(&[contact("C3", Some("S3"), Some("T3"))]);
        let from_slack = &table.view(Service::Slack)["S3"];
        let from_taiga = &table.view(Service::Taiga)["T3"];
        let from_tidyhq = &table.view(Service::TidyHq)["C3"];
        assert_eq!(from_slack, from_taiga);
        assert_eq!(from_slack, from_tidyhq);
    }

    #[test]
    fn test_duplicate_claim_last_write_wins() {
        let table = AccountTable::build(&[
            contact("C1", Some("S9"), None),
            contact("C5", Some("S9"), None),
        ]);
        let by_slack = table.view(Service::Slack);
        assert_eq!(by_slack["S9"].tidyhq_id.as_deref(), Some("C5"));

        // C1 lost its only link, so it has no row anywhere
        assert!(!table.view(Service::TidyHq).contains_key("C1"));

        assert_eq!(table.conflicts.len(), 1);
        let conflict = &table.conflicts[0];
        assert_eq!(conflict.service, Service::Slack);
        assert_eq!(conflict.loser_contact_id, "C1");
        assert_eq!(conflict.winner_contact_id, "C5");
    }

    #[test]
    fn test_conflict_loser_keeps_other_links() {
        let table = AccountTable::build(&[
            contact("C1", Some("S9"), Some("T1")),
            contact("C5", Some("S9"), None),
        ]);
        let c1 = &table.view(Service::TidyHq)["C1"];
        assert_eq!(c1.slack_id, None);
        assert_eq!(c1.taiga_id.as_deref(), Some("T1"));
        // And the taiga view agrees with the tidyhq view
        assert_eq!(&table.view(Service::Taiga)["T1"], c1);
    }
}
