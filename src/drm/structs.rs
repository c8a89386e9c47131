use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::CacheEntry;

/// A single record of the licence endpoint
///
/// Manifest synthesis reads `initial_url`, `pssh_set` and `kid`; key synthesis reads
/// `licence1` (key ID) and `licence2` (key). Both are hex in the latter case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenceData {
    pub initial_url: Option<String>,
    pub pssh_set: Option<String>,
    pub kid: Option<String>,
    pub licence1: Option<String>,
    pub licence2: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LicenceRecord {
    data: LicenceData,
}

impl LicenceData {
    /// Picks the first record out of a `[{ "data": { .. } }, ..]` response
    ///
    /// # Errors
    /// Errors when the response is not a non-empty array of records
    pub fn from_response(response: Value) -> Result<Self> {
        let records = serde_json::from_value::<Vec<LicenceRecord>>(response)
            .context("Parsing licence response")?;

        records
            .into_iter()
            .next()
            .map(|r| r.data)
            .context("Licence response contains no records")
    }
}

/// A W3C clear-key license document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearKeyDocument {
    pub keys: Vec<ClearKey>,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A single key entry, both fields are base64url without padding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearKey {
    pub kty: String,
    pub k: String,
    pub kid: String,
}

impl CacheEntry for ClearKeyDocument {
    fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Serialising clear-key document")
    }

    fn decode(bytes: Vec<u8>) -> Result<Self> {
        serde_json::from_slice(&bytes).context("Cached clear-key document is malformed")
    }
}
