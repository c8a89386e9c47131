#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
#![warn(clippy::perf)]
#![warn(clippy::complexity)]
#![warn(clippy::style)]
#![allow(clippy::multiple_crate_versions)]

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use serde::de::DeserializeOwned;
use tracing::{error, info, instrument};

use crate::{
    cache::{CacheKey, TtlCache},
    config::{Args, Command},
    drm::Synthesizer,
    fetch::Fetcher,
    playlist::{ChannelList, SessionMetadata, assemble},
    util::{init_http_client, write_atomic},
};

pub mod cache;
pub mod config;
pub mod drm;
pub mod fetch;
pub mod playlist;
pub mod util;

#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_target(false).init();

    let args = Args::parse();

    let cache = TtlCache::open(&args.cache_dir).await?;
    let fetcher = Fetcher::new(init_http_client()?, args.retries);

    match &args.command {
        Command::Playlist {
            channels_url,
            session_url,
            epg_url,
            output,
        } => {
            let sources = PlaylistSources {
                channels_url,
                session_url,
                epg_url,
            };
            write_playlist(&fetcher, &cache, args.long_ttl(), &sources, output).await?;
        }
        Command::Manifest {
            id,
            licence,
            output,
        } => {
            let synth = Synthesizer {
                fetcher: &fetcher,
                cache: &cache,
                licence_url: &licence.licence_url,
                ttl: args.short_ttl(),
            };
            match synth.manifest(id).await {
                Some(manifest) => emit(output.as_deref(), manifest).await?,
                None => error!("Failed to generate manifest for channel {id}"),
            }
        }
        Command::Keys {
            id,
            licence,
            output,
        } => {
            let synth = Synthesizer {
                fetcher: &fetcher,
                cache: &cache,
                licence_url: &licence.licence_url,
                ttl: args.short_ttl(),
            };
            match synth.keys(id).await {
                Some(doc) => {
                    let json = serde_json::to_string(&doc).context("Serialising keys")?;
                    emit(output.as_deref(), json).await?;
                }
                None => error!("Failed to generate keys for channel {id}"),
            }
        }
    }

    Ok(())
}

struct PlaylistSources<'a> {
    channels_url: &'a str,
    session_url: &'a str,
    epg_url: &'a str,
}

/// Fetches the channel list and session metadata and writes the playlist to `output`
///
/// Missing upstream data is logged and leaves `output` untouched.
///
/// # Errors
/// Errors only when the playlist file cannot be written
#[instrument(skip(fetcher, cache, sources))]
async fn write_playlist(
    fetcher: &Fetcher,
    cache: &TtlCache,
    ttl: Duration,
    sources: &PlaylistSources<'_>,
    output: &Path,
) -> Result<()> {
    let channels = cached_json::<ChannelList>(fetcher, cache, sources.channels_url, ttl).await;
    let session = cached_json::<SessionMetadata>(fetcher, cache, sources.session_url, ttl).await;

    let (Some(channels), Some(session)) = (channels, session) else {
        error!("Failed to fetch data from API");
        return Ok(());
    };

    let channels = channels.channels();
    let playlist = assemble(sources.epg_url, &channels, &session);
    write_atomic(output, playlist)
        .await
        .with_context(|| format!("Writing playlist to {}", output.display()))?;

    info!("M3U playlist generated and saved to {}", output.display());
    Ok(())
}

/// Fetches JSON through the cache, keyed by the URL, and decodes it as `T`
async fn cached_json<T: DeserializeOwned>(
    fetcher: &Fetcher,
    cache: &TtlCache,
    url: &str,
    ttl: Duration,
) -> Option<T> {
    let key = CacheKey::for_url(url, "json");
    let value = cache.get_or_fetch(&key, ttl, || fetcher.json(url)).await?;

    serde_json::from_value(value)
        .inspect_err(|e| error!("Unexpected response shape from {url}: {e}"))
        .ok()
}

async fn emit(output: Option<&Path>, contents: String) -> Result<()> {
    match output {
        Some(path) => {
            write_atomic(path, contents)
                .await
                .with_context(|| format!("Writing {}", path.display()))?;
            info!("Saved to {}", path.display());
        }
        None => println!("{contents}"),
    }
    Ok(())
}
