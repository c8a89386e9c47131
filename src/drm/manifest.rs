use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Manifest file name in the upstream stream URL, replaced to form the segment base URL
const MANIFEST_FILE_NAME: &str = "toxicify.mpd";
const SEGMENT_DIR: &str = "dash/";

const RELATIVE_BASE_URL: &str = "<BaseURL>dash/</BaseURL>";
const DASH_NAMESPACE: &str = r#"xmlns="urn:mpeg:dash:schema:mpd:2011""#;
const CENC_NAMESPACE: &str = r#"xmlns:cenc="urn:mpeg:cenc:2013""#;
const CENC_MARKER: &str =
    r#"<ContentProtection value="cenc" schemeIdUri="urn:mpeg:dash:mp4protection:2011"/>"#;

/// `init*.dash` / `media*.m4s` with a query string carrying `idt` or `decryption_key`
///
/// The whole query is matched, whatever other parameters sit around those two.
static SEGMENT_DECORATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\b((?:init|media)[^"'?&=\s<>]*?\.(?:dash|m4s))(?:\?|&amp;|&)(?:[^"'\s<>]*?(?:&amp;|&))?(?:idt|decryption_key)=[^"'\s<>]*"#,
    )
    .expect("segment decoration regex is valid")
});

static WIDEVINE_PROTECTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<ContentProtection\s+schemeIdUri="(urn:[^"]+)"\s+value="Widevine"\s*/>"#)
        .expect("widevine protection regex is valid")
});

/// Derives the fetchable manifest URL from the `initialUrl` handed out upstream
#[must_use]
pub fn derive_manifest_url(initial_url: &str) -> String {
    initial_url
        .replacen("bpweb", "bpprod", 1)
        .replacen("akamaized-staging", "akamaized", 1)
}

/// Turns an upstream manifest into one a player can open directly
pub trait ManifestRewriter {
    fn rewrite(&self, raw: &str) -> String;
}

/// Rewrites a manifest by substituting known markup fragments
///
/// Each step is a no-op when its marker is missing from the input.
#[derive(Debug, Clone)]
pub struct SubstitutionRewriter<'a> {
    pub manifest_url: &'a str,
    pub pssh: &'a str,
    pub kid: &'a str,
}

impl SubstitutionRewriter<'_> {
    fn absolute_base_url(&self) -> String {
        format!(
            "<BaseURL>{}</BaseURL>",
            self.manifest_url.replacen(MANIFEST_FILE_NAME, SEGMENT_DIR, 1)
        )
    }
}

impl ManifestRewriter for SubstitutionRewriter<'_> {
    fn rewrite(&self, raw: &str) -> String {
        let manifest = raw.replacen(RELATIVE_BASE_URL, &self.absolute_base_url(), 1);
        let manifest = strip_segment_decoration(&manifest);

        // Every occurrence, one per adaptation set
        let manifest = WIDEVINE_PROTECTION_REGEX.replace_all(&manifest, |caps: &Captures| {
            format!(
                r#"<ContentProtection schemeIdUri="{}"><cenc:pssh>{}</cenc:pssh></ContentProtection>"#,
                &caps[1], self.pssh
            )
        });

        let manifest = if manifest.contains("xmlns:cenc=") {
            manifest.into_owned()
        } else {
            manifest.replacen(DASH_NAMESPACE, &format!("{DASH_NAMESPACE} {CENC_NAMESPACE}"), 1)
        };

        // Every occurrence, one per adaptation set
        manifest.replace(
            CENC_MARKER,
            &format!(
                r#"<ContentProtection schemeIdUri="urn:mpeg:dash:mp4protection:2011" value="cenc" cenc:default_KID="{}"/>"#,
                self.kid
            ),
        )
    }
}

/// Drops the query string from segment references that carry `idt` or `decryption_key`
///
/// The file name and whatever follows the query (a closing quote, or nothing at the
/// end of the input) are kept. Queries without either parameter are left alone.
#[must_use]
pub fn strip_segment_decoration(manifest: &str) -> String {
    SEGMENT_DECORATION_REGEX
        .replace_all(manifest, "$1")
        .into_owned()
}
