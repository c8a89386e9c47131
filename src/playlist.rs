use std::fmt::{self, Write as _};

use indoc::writedoc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Program guide advertised in the playlist header unless configured otherwise
pub const DEFAULT_EPG_URL: &str =
    "https://raw.githubusercontent.com/mitthu786/tvepg/main/tataplay/epg.xml.gz";

/// Channel identifiers arrive as strings or numbers, occasionally as floats
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(Value);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            Value::Number(n) => match n.as_f64() {
                // Integral floats print without a fraction, so `2.0` becomes `2`
                Some(v) if n.is_f64() && v.fract() == 0.0 && v.abs() < 1e21 => {
                    write!(f, "{v:.0}")
                }
                _ => write!(f, "{n}"),
            },
            other => write!(f, "{other}"),
        }
    }
}

/// A channel entry; only `base64` decides whether it ends up in the playlist
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    #[serde(default)]
    pub id: ChannelId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub genre: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub logo: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub initial_url: String,
    /// Upstream clear-key document, kept as-is so it is re-emitted verbatim
    #[serde(default)]
    pub base64: Option<Value>,
}

/// Accepts a string, `null`, or any other scalar rendered as text
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => ChannelId(other).to_string(),
    })
}

impl Channel {
    /// The clear-key document, if it has at least one key
    #[must_use]
    pub fn clear_key(&self) -> Option<&Value> {
        self.base64.as_ref().filter(|doc| {
            doc.get("keys")
                .and_then(Value::as_array)
                .is_some_and(|keys| !keys.is_empty())
        })
    }
}

/// The channel list endpoint response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelList {
    #[serde(default)]
    data: Vec<Value>,
}

impl ChannelList {
    /// Channels in upstream order, leaving out entries that are not JSON objects
    #[must_use]
    pub fn channels(&self) -> Vec<Channel> {
        self.data
            .iter()
            .filter_map(|c| Channel::deserialize(c).ok())
            .collect()
    }
}

/// Authorization context attached to every entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub user_agent: String,
    pub data: SessionData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub hdntl: String,
}

/// Renders the playlist, one entry per channel carrying a clear-key document
#[must_use]
pub fn assemble(epg_url: &str, channels: &[Channel], session: &SessionMetadata) -> String {
    let mut playlist = format!("#EXTM3U x-tvg-url=\"{epg_url}\"\n\n");

    for channel in channels {
        let Some(clear_key) = channel.clear_key() else {
            continue;
        };

        write_entry(&mut playlist, channel, clear_key, session).ok();
    }

    playlist
}

fn write_entry(
    out: &mut String,
    channel: &Channel,
    clear_key: &Value,
    session: &SessionMetadata,
) -> fmt::Result {
    let cookie = &session.data.hdntl;

    writedoc!(
        out,
        r#"
        #EXTINF:-1 tvg-id="{id}" group-title="{genre}" tvg-logo="{logo}", {title}
        #KODIPROP:inputstream.adaptive.license_type=clearkey
        #KODIPROP:inputstream.adaptive.license_key={clear_key}
        #EXTVLCOPT:http-user-agent={user_agent}
        #EXTHTTP:{{"cookie":"{cookie}"}}
        {url}|cookie:{cookie}

        "#,
        id = channel.id,
        genre = channel.genre,
        logo = channel.logo,
        title = channel.title,
        user_agent = session.user_agent,
        url = channel.initial_url,
    )
}
