use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};

use crate::playlist::DEFAULT_EPG_URL;

/// Builds a clear-key IPTV playlist from upstream channel and licence endpoints
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory holding cached upstream responses
    #[arg(long, env = "CLEARLIST_CACHE_DIR", default_value = "_cache_")]
    pub cache_dir: PathBuf,

    /// Attempts per upstream request before giving up
    #[arg(
        long,
        env = "CLEARLIST_RETRIES",
        default_value_t = 3,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub retries: u32,

    /// Seconds a generated manifest or key document stays fresh
    #[arg(long, env = "CLEARLIST_SHORT_TTL", default_value_t = 60)]
    pub short_ttl: u64,

    /// Seconds the channel list and session metadata stay fresh
    #[arg(long, env = "CLEARLIST_LONG_TTL", default_value_t = 7200)]
    pub long_ttl: u64,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    #[must_use]
    pub const fn short_ttl(&self) -> Duration {
        Duration::from_secs(self.short_ttl)
    }

    #[must_use]
    pub const fn long_ttl(&self) -> Duration {
        Duration::from_secs(self.long_ttl)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetches the channel list and session, then writes the playlist
    Playlist {
        /// Channel list endpoint
        #[arg(long, env = "CLEARLIST_CHANNELS_URL")]
        channels_url: String,

        /// Session metadata endpoint (user agent and cookie)
        #[arg(long, env = "CLEARLIST_SESSION_URL")]
        session_url: String,

        /// Program guide advertised in the playlist header
        #[arg(long, env = "CLEARLIST_EPG_URL", default_value = DEFAULT_EPG_URL)]
        epg_url: String,

        /// Where the playlist is written
        #[arg(short, long, env = "CLEARLIST_OUTPUT", default_value = "ts.m3u")]
        output: PathBuf,
    },

    /// Generates a directly playable manifest for a channel
    Manifest {
        /// Channel ID
        id: String,

        #[command(flatten)]
        licence: LicenceArgs,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generates the clear-key document for a channel
    Keys {
        /// Channel ID
        id: String,

        #[command(flatten)]
        licence: LicenceArgs,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
pub struct LicenceArgs {
    /// Licence endpoint prefix, the channel ID is appended to it
    #[arg(long, env = "CLEARLIST_LICENCE_URL")]
    pub licence_url: String,
}
