pub mod keys;
pub mod manifest;
pub mod structs;

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, instrument};

use crate::{
    cache::{CacheKey, TtlCache},
    drm::{
        keys::encode_clear_key,
        manifest::{ManifestRewriter, SubstitutionRewriter, derive_manifest_url},
        structs::{ClearKeyDocument, LicenceData},
    },
    fetch::Fetcher,
};

/// Produces per-channel manifests and clear-key documents from the licence endpoint
#[derive(Debug, Clone, Copy)]
pub struct Synthesizer<'a> {
    pub fetcher: &'a Fetcher,
    pub cache: &'a TtlCache,
    /// Prefix the channel ID is appended to
    pub licence_url: &'a str,
    pub ttl: Duration,
}

impl Synthesizer<'_> {
    /// Returns a directly playable manifest for `channel_id`
    #[instrument(skip(self))]
    pub async fn manifest(&self, channel_id: &str) -> Option<String> {
        let key = CacheKey::new(format!("manifest-{channel_id}.mpd"));
        self.cache
            .get_or_fetch(&key, self.ttl, || self.produce_manifest(channel_id))
            .await
    }

    /// Returns the clear-key document for `channel_id`
    #[instrument(skip(self))]
    pub async fn keys(&self, channel_id: &str) -> Option<ClearKeyDocument> {
        let key = CacheKey::new(format!("keys-{channel_id}.json"));
        self.cache
            .get_or_fetch(&key, self.ttl, || self.produce_keys(channel_id))
            .await
    }

    async fn licence(&self, channel_id: &str) -> Option<LicenceData> {
        let response = self
            .fetcher
            .json(&format!("{}{channel_id}", self.licence_url))
            .await?;

        LicenceData::from_response(response)
            .inspect_err(|e| error!("Malformed licence data for {channel_id}: {e:#}"))
            .ok()
    }

    async fn produce_manifest(&self, channel_id: &str) -> Option<String> {
        let licence = self.licence(channel_id).await?;

        let (initial_url, pssh, kid) = match manifest_fields(&licence) {
            Ok(fields) => fields,
            Err(e) => {
                error!("Unable to generate manifest for {channel_id}: {e:#}");
                return None;
            }
        };

        let manifest_url = derive_manifest_url(initial_url);
        let raw = self.fetcher.text(&manifest_url).await?;

        let rewriter = SubstitutionRewriter {
            manifest_url: &manifest_url,
            pssh,
            kid,
        };
        let manifest = rewriter.rewrite(&raw);
        info!("Generated manifest for {channel_id}");

        Some(manifest)
    }

    async fn produce_keys(&self, channel_id: &str) -> Option<ClearKeyDocument> {
        let licence = self.licence(channel_id).await?;

        match key_document(&licence) {
            Ok(doc) => {
                info!("Generated keys for {channel_id}");
                Some(doc)
            }
            Err(e) => {
                error!("Unable to generate keys for {channel_id}: {e:#}");
                None
            }
        }
    }
}

fn manifest_fields(licence: &LicenceData) -> Result<(&str, &str, &str)> {
    Ok((
        licence
            .initial_url
            .as_deref()
            .context("Licence data has no `initialUrl`")?,
        licence
            .pssh_set
            .as_deref()
            .context("Licence data has no `psshSet`")?,
        licence.kid.as_deref().context("Licence data has no `kid`")?,
    ))
}

fn key_document(licence: &LicenceData) -> Result<ClearKeyDocument> {
    let kid = licence
        .licence1
        .as_deref()
        .context("Licence data has no `licence1`")?;
    let key = licence
        .licence2
        .as_deref()
        .context("Licence data has no `licence2`")?;

    encode_clear_key(kid, key)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::testing::{Reply, Responder};

    const TTL: Duration = Duration::from_secs(60);

    async fn setup(replies: Vec<Reply>) -> (TempDir, TtlCache, Fetcher, Responder) {
        let dir = tempfile::tempdir().unwrap();
        let cache = TtlCache::open(dir.path()).await.unwrap();
        let fetcher = Fetcher::new(reqwest::Client::new(), 2);
        let server = Responder::start(replies).await;
        (dir, cache, fetcher, server)
    }

    #[tokio::test]
    async fn keys_are_synthesised_and_cached() {
        let licence = json!([{ "data": { "licence1": "00ff10", "licence2": "fbff" } }]);
        let (_dir, cache, fetcher, server) = setup(vec![Reply::ok(licence.to_string())]).await;
        let licence_url = server.url("/licence/");
        let synth = Synthesizer {
            fetcher: &fetcher,
            cache: &cache,
            licence_url: &licence_url,
            ttl: TTL,
        };

        let doc = synth.keys("42").await.unwrap();
        assert_eq!(doc.keys.len(), 1);
        assert_eq!(doc.keys[0].kid, "AP8Q");
        assert_eq!(doc.keys[0].k, "-_8");

        let cached = synth.keys("42").await.unwrap();
        assert_eq!(cached, doc);
        assert_eq!(server.hits(), 1);
        assert!(cache.path_for(&CacheKey::new("keys-42.json")).is_file());
    }

    #[tokio::test]
    async fn malformed_hex_is_not_retried() {
        let licence = json!([{ "data": { "licence1": "not-hex", "licence2": "00" } }]);
        let (_dir, cache, fetcher, server) = setup(vec![Reply::ok(licence.to_string())]).await;
        let licence_url = server.url("/licence/");
        let synth = Synthesizer {
            fetcher: &fetcher,
            cache: &cache,
            licence_url: &licence_url,
            ttl: TTL,
        };

        assert!(synth.keys("42").await.is_none());
        assert_eq!(server.hits(), 1);
        assert!(!cache.path_for(&CacheKey::new("keys-42.json")).exists());
    }

    #[tokio::test]
    async fn unavailable_licence_yields_nothing() {
        let (_dir, cache, fetcher, server) = setup(vec![Reply::status(502)]).await;
        let licence_url = server.url("/licence/");
        let synth = Synthesizer {
            fetcher: &fetcher,
            cache: &cache,
            licence_url: &licence_url,
            ttl: TTL,
        };

        assert!(synth.manifest("42").await.is_none());
        assert_eq!(server.hits(), 2);
    }

    #[tokio::test]
    async fn manifest_is_fetched_rewritten_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TtlCache::open(dir.path()).await.unwrap();
        let fetcher = Fetcher::new(reqwest::Client::new(), 1);

        // The manifest server is started first so the licence can point at it
        let manifest_server = Responder::start(vec![Reply::ok(concat!(
            r#"<MPD xmlns="urn:mpeg:dash:schema:mpd:2011"><BaseURL>dash/</BaseURL>"#,
            r#"<ContentProtection value="cenc" schemeIdUri="urn:mpeg:dash:mp4protection:2011"/>"#,
            r#"<SegmentTemplate media="media-$Number$.m4s?idt=x"/></MPD>"#
        ))])
        .await;
        let initial_url = manifest_server.url("/bpweb/ch1/toxicify.mpd");
        let licence = json!([{ "data": {
            "initialUrl": initial_url,
            "psshSet": "UFNTSA==",
            "kid": "1234"
        } }]);
        let licence_server = Responder::start(vec![Reply::ok(licence.to_string())]).await;
        let licence_url = licence_server.url("/licence/");

        let synth = Synthesizer {
            fetcher: &fetcher,
            cache: &cache,
            licence_url: &licence_url,
            ttl: TTL,
        };

        let manifest = synth.manifest("ch1").await.unwrap();
        assert_eq!(
            manifest,
            format!(
                concat!(
                    r#"<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" xmlns:cenc="urn:mpeg:cenc:2013">"#,
                    "<BaseURL>{}</BaseURL>",
                    r#"<ContentProtection schemeIdUri="urn:mpeg:dash:mp4protection:2011" value="cenc" cenc:default_KID="1234"/>"#,
                    r#"<SegmentTemplate media="media-$Number$.m4s"/></MPD>"#
                ),
                manifest_server.url("/bpprod/ch1/dash/")
            )
        );

        assert_eq!(synth.manifest("ch1").await.as_deref(), Some(manifest.as_str()));
        assert_eq!(licence_server.hits(), 1);
        assert_eq!(manifest_server.hits(), 1);
    }

    #[tokio::test]
    async fn manifest_requires_licence_fields() {
        let licence = json!([{ "data": { "initialUrl": "http://127.0.0.1:1/toxicify.mpd" } }]);
        let (_dir, cache, fetcher, server) = setup(vec![Reply::ok(licence.to_string())]).await;
        let licence_url = server.url("/licence/");
        let synth = Synthesizer {
            fetcher: &fetcher,
            cache: &cache,
            licence_url: &licence_url,
            ttl: TTL,
        };

        assert!(synth.manifest("42").await.is_none());
        assert_eq!(server.hits(), 1);
    }
}
