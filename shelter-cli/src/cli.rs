use clap::{Parser, Subcommand};
use shelter_engine::Destination;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    author = "hua0512 <https://github.com/hua0512>",
    version,
    about = "Offline-capable caching proxy",
    long_about = "Serves a site through versioned cache partitions so it keeps working offline.\n\
                  \n\
                  Requests are classified into static files, images, network-first and\n\
                  default resources, each answered with its own caching strategy."
)]
pub struct CliArgs {
    /// Configuration file
    #[arg(short, long, global = true, help = "Path to the TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Override the origin
    #[arg(long, global = true, help = "Origin every relative path is resolved against")]
    pub origin: Option<String>,

    /// Override the cache directory
    #[arg(
        long,
        global = true,
        help = "Directory of the file-backed partition store (uses the memory store when unset)"
    )]
    pub cache_dir: Option<PathBuf>,

    /// Override the partition version token
    #[arg(long = "version-token", global = true, help = "Version token shared by all partition names")]
    pub version_token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the caching proxy
    Serve {
        /// Listen address
        #[arg(short, long, help = "Address to listen on (overrides the configuration)")]
        listen: Option<String>,
    },

    /// Install and activate the configured version
    Install,

    /// Refresh the dynamic partition
    Sync {
        #[arg(long, help = "Sync tag (defaults to the configured tag)")]
        tag: Option<String>,
    },

    /// Show the class, strategy and partition of URLs
    Classify {
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Run one request through the engine
    Fetch {
        url: String,

        #[arg(short, long, value_enum, default_value = "empty", help = "Fetch destination of the request")]
        dest: Destination,
    },

    /// List the partitions in the store
    Partitions,

    /// Fetch URLs into the dynamic partition as one batch
    CacheUrls {
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default configuration
    Init {
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
}
