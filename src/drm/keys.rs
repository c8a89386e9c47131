use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

use crate::drm::structs::{ClearKey, ClearKeyDocument};

/// Re-encodes a hex key ID and key into a single-key clear-key document
///
/// # Errors
/// Errors when either input is not valid hex
pub fn encode_clear_key(kid_hex: &str, key_hex: &str) -> Result<ClearKeyDocument> {
    let kid = hex_to_base64url(kid_hex).context("Decoding key ID")?;
    let k = hex_to_base64url(key_hex).context("Decoding key")?;

    Ok(ClearKeyDocument {
        keys: vec![ClearKey {
            kty: "oct".to_string(),
            k,
            kid,
        }],
        kind: "temporary".to_string(),
    })
}

fn hex_to_base64url(input: &str) -> Result<String> {
    let bytes = hex::decode(input.trim()).with_context(|| format!("`{input}` is not valid hex"))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
