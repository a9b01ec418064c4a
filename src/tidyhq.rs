//! TidyHQ API v1 client.
//!
//! Thin blocking HTTP layer: it fetches the five raw collections in one
//! batch per run and hands them over as loosely-shaped JSON rows. All
//! shaping and validation happens in the normalizer.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::error::PullError;

const API_BASE_URL: &str = "https://api.tidyhq.com/v1";

/// One full pull of raw upstream collections, as delivered by TidyHQ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBatch {
    pub contacts: Vec<Value>,
    pub groups: Vec<Value>,
    pub memberships: Vec<Value>,
    pub invoices: Vec<Value>,
    pub org: Value,
    /// Unix timestamp of the fetch.
    pub fetched_at: i64,
}

pub struct Client {
    http: reqwest::blocking::Client,
    token: String,
    base_url: String,
}

impl Client {
    pub fn new(config: &Config) -> Client {
        Client {
            http: reqwest::blocking::Client::new(),
            token: config.tidyhq.token.clone(),
            base_url: API_BASE_URL.to_string(),
        }
    }

    /// Send a query to the TidyHQ API: `GET {base}/{category}[/{term}]`.
    fn query(&self, category: &str, term: Option<&str>) -> Result<Value, PullError> {
        let mut url = format!("{}/{}", self.base_url, category);
        if let Some(term) = term {
            url.push('/');
            url.push_str(term);
        }
        log::debug!("Querying TidyHQ for {}", category);
        let response = self
            .http
            .get(&url)
            .query(&[("access_token", self.token.as_str())])
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }

    fn query_list(&self, category: &str) -> Result<Vec<Value>, PullError> {
        match self.query(category, None)? {
            Value::Array(rows) => Ok(rows),
            other => Err(PullError::Config(format!(
                "TidyHQ returned a non-list payload for {}: {}",
                category,
                payload_kind(&other)
            ))),
        }
    }

    /// Fetch all five collections as one batch.
    pub fn fetch_batch(&self) -> Result<RawBatch, PullError> {
        log::info!("Pulling fresh data from TidyHQ");

        let contacts = self.query_list("contacts")?;
        log::debug!("Got {} contacts from TidyHQ", contacts.len());

        let groups = self.query_list("groups")?;
        log::debug!("Got {} groups from TidyHQ", groups.len());

        let memberships = self.query_list("memberships")?;
        log::debug!("Got {} memberships from TidyHQ", memberships.len());

        let invoices = self.query_list("invoices")?;
        log::debug!("Got {} invoices from TidyHQ", invoices.len());

        let org = self.query("organization", None)?;
        if let Some(domain) = org.get("domain_prefix").and_then(Value::as_str) {
            log::debug!("Org domain is set to {}", domain);
        }

        Ok(RawBatch {
            contacts,
            groups,
            memberships,
            invoices,
            org,
            fetched_at: Utc::now().timestamp(),
        })
    }
}

fn payload_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
