use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tambayan-relay")]
#[command(author, version, about = "CORS-friendly streaming relay for IPTV players")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the relay server
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Check whether the allow-list accepts a target URL
    CheckHost {
        /// Target URL, as it would be passed in `?url=`
        url: String,
    },

    /// Print the player DRM configuration for a channel
    PlayerDrm {
        /// Clear-key channel id (the default pair when omitted)
        #[arg(long, conflicts_with_all = ["widevine", "playready"])]
        channel: Option<String>,

        /// Widevine license server URL
        #[arg(long, conflicts_with = "playready")]
        widevine: Option<String>,

        /// PlayReady license server URL
        #[arg(long)]
        playready: Option<String>,

        /// Route the license server through the relay at this base URL
        #[arg(long)]
        relay_base: Option<String>,
    },

    /// Display version information
    Version,
}
