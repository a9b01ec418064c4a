//! End-to-end pipeline test: raw batch fixture → build → publish → read the
//! published files back the way a static-file consumer would.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use tidycache::config::FieldIds;
use tidycache::publish::Publisher;
use tidycache::tidyhq::RawBatch;

fn field_ids() -> FieldIds {
    FieldIds {
        slack: Some("f-slack".into()),
        taiga: Some("f-taiga".into()),
    }
}

/// A small but fully cross-referenced org:
/// - C1 linked to Slack S9, no Taiga, member of G1
/// - C2 malformed (no id) but referenced by G1 through its stub
/// - C3 linked to both Slack and Taiga
/// - invoices with a shared date to exercise the ID tie-break
fn fixture_batch() -> RawBatch {
    RawBatch {
        contacts: vec![
            json!({
                "id": "C1",
                "first_name": "Ada",
                "groups": [{"id": "G1", "label": "Members"}],
                "custom_fields": [{"id": "f-slack", "value": "S9"}]
            }),
            json!({
                "first_name": "Ghost",
                "groups": [{"id": "G1"}]
            }),
            json!({
                "id": "C3",
                "first_name": "Grace",
                "custom_fields": [
                    {"id": "f-slack", "value": "S3"},
                    {"id": "f-taiga", "value": "T3"}
                ]
            }),
        ],
        groups: vec![json!({"id": "G1", "label": "Members"})],
        memberships: vec![
            json!({"id": "M1", "contact_id": "C1", "membership_level_id": "L1", "state": "activated"}),
        ],
        invoices: vec![
            json!({"id": "I2", "contact_id": "C1", "created_at": "2024-06-01T10:00:00+0000", "amount": 25.0}),
            json!({"id": "I1", "contact_id": "C1", "created_at": "2024-06-01T10:00:00+0000", "amount": 10.0}),
            json!({"id": "I3", "contact_id": "C3", "created_at": "2024-05-01T10:00:00+0000", "amount": 5.0}),
        ],
        org: json!({"domain_prefix": "example", "name": "Example Org"}),
        fetched_at: 1_700_000_000,
    }
}

fn build_now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()
}

fn publish_fixture(root: &Path) {
    let (plan, report) = tidycache::build_plan(&fixture_batch(), &field_ids(), build_now()).unwrap();
    assert_eq!(report.contacts, 2);
    assert_eq!(report.normalize.malformed_contacts, 1);
    Publisher::new(root).publish(&plan).unwrap();
}

fn read_json(root: &Path, rel: &str) -> Value {
    let path = root.join("serve").join(rel);
    let content = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("missing artifact {}: {}", path.display(), e));
    serde_json::from_str(&content).unwrap()
}

#[test]
fn group_membership_only_references_published_contacts() {
    let root = tempfile::tempdir().unwrap();
    publish_fixture(root.path());

    let contacts = read_json(root.path(), "contacts/sorted.json");
    let groups = read_json(root.path(), "groups/sorted.json");

    let contact_ids: Vec<&String> = contacts.as_object().unwrap().keys().collect();
    for (_, group) in groups.as_object().unwrap() {
        for member in group["membership"].as_array().unwrap() {
            let member = member.as_str().unwrap();
            assert!(
                contact_ids.iter().any(|id| id.as_str() == member),
                "group member {} not in contact set",
                member
            );
        }
    }

    // The malformed contact was dropped, so G1 kept only C1
    assert_eq!(groups["G1"]["membership"], json!(["C1"]));
}

#[test]
fn account_map_views_are_mutually_consistent() {
    let root = tempfile::tempdir().unwrap();
    publish_fixture(root.path());

    let by_slack = read_json(root.path(), "map/slack.json");
    let by_taiga = read_json(root.path(), "map/taiga.json");
    let by_tidyhq = read_json(root.path(), "map/tidyhq.json");

    // Scenario from the fixture: C1 ↔ S9, no Taiga
    assert_eq!(
        by_slack["S9"],
        json!({"slack_id": "S9", "taiga_id": null, "tidyhq_id": "C1"})
    );
    assert!(by_taiga.get("C1").is_none());

    // C3 is reachable through all three keys with identical rows
    assert_eq!(by_slack["S3"], by_taiga["T3"]);
    assert_eq!(by_slack["S3"], by_tidyhq["C3"]);

    // No view keys a row whose own-service field is null
    for (service, view) in [("slack_id", &by_slack), ("taiga_id", &by_taiga), ("tidyhq_id", &by_tidyhq)] {
        for (key, row) in view.as_object().unwrap() {
            assert_eq!(row[service], json!(key));
        }
    }

    // Per-identity files mirror the dictionaries
    assert_eq!(read_json(root.path(), "map/slack/S9.json"), by_slack["S9"]);
    assert_eq!(read_json(root.path(), "map/tidyhq/C3.json"), by_tidyhq["C3"]);
}

#[test]
fn all_invoices_sorted_by_date_then_id() {
    let root = tempfile::tempdir().unwrap();
    publish_fixture(root.path());

    let all = read_json(root.path(), "invoices/all.json");
    let ids: Vec<&str> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_str().unwrap())
        .collect();
    // I3 is oldest; I1/I2 share a timestamp and fall back to ID order
    assert_eq!(ids, vec!["I3", "I1", "I2"]);

    let by_id = read_json(root.path(), "invoices/all_sorted.json");
    assert_eq!(by_id.as_object().unwrap().len(), 3);
}

#[test]
fn contact_without_records_still_indexed() {
    let root = tempfile::tempdir().unwrap();
    publish_fixture(root.path());

    // C3 has no memberships; it still gets a key and a per-contact file
    let by_contact = read_json(root.path(), "memberships/sorted_by_contact.json");
    assert_eq!(by_contact["C3"], json!([]));
    assert_eq!(read_json(root.path(), "memberships/C3.json"), json!([]));
}

#[test]
fn legacy_cache_artifact_has_pre_indexing_shape() {
    let root = tempfile::tempdir().unwrap();
    publish_fixture(root.path());

    let cache = read_json(root.path(), "cache.json");
    assert_eq!(cache["contacts"].as_array().unwrap().len(), 2);
    assert!(cache["groups"]["G1"].is_object());
    assert_eq!(cache["memberships"].as_array().unwrap().len(), 1);
    assert!(cache["invoices"]["C1"].is_array());
    assert_eq!(cache["org"]["domain_prefix"], "example");
    assert_eq!(cache["time"], json!(1_700_000_000));

    let org = read_json(root.path(), "org.json");
    assert_eq!(org["domain_prefix"], "example");
}

#[test]
fn rebuild_from_identical_input_is_byte_identical() {
    let (plan_a, _) = tidycache::build_plan(&fixture_batch(), &field_ids(), build_now()).unwrap();
    let (plan_b, _) = tidycache::build_plan(&fixture_batch(), &field_ids(), build_now()).unwrap();

    let a: BTreeMap<_, _> = plan_a
        .artifacts
        .iter()
        .map(|artifact| (artifact.path.clone(), artifact.body.clone()))
        .collect();
    let b: BTreeMap<_, _> = plan_b
        .artifacts
        .iter()
        .map(|artifact| (artifact.path.clone(), artifact.body.clone()))
        .collect();
    assert_eq!(a, b);
}
