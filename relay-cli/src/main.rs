//! # tunecast
//!
//! Command-line client for Tunecast relays.
//!
//! ## Commands
//!
//! - `init`: Write a default `config.toml`
//! - `keygen`: Generate a key pair
//! - `login`: Sign in with a local key or a remote signer
//! - `whoami`: Show the stored session
//! - `logout`: Forget the session
//! - `publish`: Sign and publish an event
//! - `query`: Fetch events from the relays
//! - `profile`: Show or update a profile
//! - `delete`: Request deletion of events
//!
//! ## Example
//!
//! ```bash
//! # Sign in by scanning a QR code with a signer app
//! tunecast login --connect
//!
//! # Publish a note
//! tunecast publish "Episode 12 is out"
//!
//! # Publish a podcast feed
//! tunecast publish --feed 917393e3-1b1e-5cef-ace4-edaa54e1f810 --title "My Show" --file feed.xml
//!
//! # Read it back
//! tunecast query --author <hex> --kind 30078 --latest
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod qr;
mod session;

use commands::{delete, init, keygen, login, logout, profile, publish, query, whoami};

/// Command-line client for Tunecast relays.
#[derive(Parser, Debug)]
#[command(name = "tunecast")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for config, session and key
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Relay URL, repeatable (overrides config.toml)
    #[arg(long = "relay", global = true)]
    relays: Vec<String>,

    /// Log debug output (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config.toml
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Generate a new key pair
    Keygen {
        /// Write the secret key to this file instead of printing it
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Sign in
    Login {
        /// Use a secret key (prompted without echo)
        #[arg(long, group = "method")]
        key: bool,

        /// Read the secret key from a file
        #[arg(long, group = "method")]
        key_file: Option<PathBuf>,

        /// Connect to a remote signer via bunker:// URI
        #[arg(long, group = "method")]
        bunker: Option<String>,

        /// Show a nostrconnect:// URI for a signer app to scan
        #[arg(long, group = "method")]
        connect: bool,

        /// Name to remember for this account
        #[arg(long)]
        name: Option<String>,
    },

    /// Show the stored session
    Whoami,

    /// Sign out and forget the session
    Logout,

    /// Sign and publish an event
    Publish {
        /// Event content (or use --file)
        content: Option<String>,

        /// Read content from a file
        #[arg(long, short, conflicts_with = "content")]
        file: Option<PathBuf>,

        /// Event kind
        #[arg(long, short, default_value = "1", conflicts_with = "feed")]
        kind: u32,

        /// Tag as name=value[,value...], repeatable
        #[arg(long = "tag", short)]
        tags: Vec<String>,

        /// Publish the content as the feed with this GUID
        #[arg(long, requires = "title")]
        feed: Option<String>,

        /// Feed title (with --feed)
        #[arg(long)]
        title: Option<String>,
    },

    /// Fetch events from the relays
    Query {
        /// Author public key (hex), repeatable
        #[arg(long = "author", short)]
        authors: Vec<String>,

        /// Event kind, repeatable
        #[arg(long = "kind", short)]
        kinds: Vec<u32>,

        /// Event id, repeatable
        #[arg(long = "id")]
        ids: Vec<String>,

        /// Only events at or after this unix time
        #[arg(long)]
        since: Option<u64>,

        /// Only events at or before this unix time
        #[arg(long)]
        until: Option<u64>,

        /// Maximum events each relay returns
        #[arg(long, short)]
        limit: Option<usize>,

        /// Keep only the newest version of replaceable events
        #[arg(long)]
        latest: bool,

        /// Print raw event JSON, one per line
        #[arg(long)]
        json: bool,
    },

    /// Show a profile, or update yours
    Profile {
        /// Public key (hex); defaults to the signed-in user
        pubkey: Option<String>,

        /// Set your name
        #[arg(long)]
        set_name: Option<String>,

        /// Set your display name
        #[arg(long)]
        set_display_name: Option<String>,

        /// Set your about text
        #[arg(long)]
        set_about: Option<String>,

        /// Set your picture URL
        #[arg(long)]
        set_picture: Option<String>,
    },

    /// Ask relays to delete your events
    Delete {
        /// Event ids to delete
        #[arg(required_unless_present = "coordinates")]
        ids: Vec<String>,

        /// Replaceable coordinate (<kind>:<pubkey>:<d>), repeatable
        #[arg(long = "coordinate")]
        coordinates: Vec<String>,

        /// Reason shown to readers
        #[arg(long, short)]
        reason: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    config::set_dir_permissions_0700(&data_dir).await?;

    match cli.command {
        Commands::Init { force } => {
            init::run(&data_dir, force).await?;
        }
        Commands::Keygen { output } => {
            keygen::run(output.as_deref()).await?;
        }
        Commands::Login {
            key,
            key_file,
            bunker,
            connect,
            name,
        } => {
            let config = config::load(&data_dir, &cli.relays)?;
            if let Some(path) = key_file {
                login::with_key_file(&data_dir, &config, &path, name).await?;
            } else if key {
                login::with_prompt(&data_dir, &config, name).await?;
            } else if let Some(uri) = bunker {
                login::with_bunker(&data_dir, &config, &uri, name).await?;
            } else if connect {
                login::with_nostrconnect(&data_dir, &config, name).await?;
            } else {
                anyhow::bail!("Must specify one of --key, --key-file, --bunker or --connect");
            }
        }
        Commands::Whoami => {
            whoami::run(&data_dir).await?;
        }
        Commands::Logout => {
            let config = config::load(&data_dir, &cli.relays)?;
            logout::run(&data_dir, &config).await?;
        }
        Commands::Publish {
            content,
            file,
            kind,
            tags,
            feed,
            title,
        } => {
            let content = if let Some(text) = content {
                text
            } else if let Some(path) = file {
                tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?
            } else {
                anyhow::bail!("Must specify content or --file");
            };
            let draft = publish::draft(content, kind, &tags, feed.as_deref(), title.as_deref())?;
            let config = config::load(&data_dir, &cli.relays)?;
            publish::run(&data_dir, &config, draft).await?;
        }
        Commands::Query {
            authors,
            kinds,
            ids,
            since,
            until,
            limit,
            latest,
            json,
        } => {
            let filter = query::filter(&authors, &kinds, &ids, since, until, limit)?;
            let config = config::load(&data_dir, &cli.relays)?;
            query::run(&config, &filter, latest, json).await?;
        }
        Commands::Profile {
            pubkey,
            set_name,
            set_display_name,
            set_about,
            set_picture,
        } => {
            let config = config::load(&data_dir, &cli.relays)?;
            let edits = profile::Edits {
                name: set_name,
                display_name: set_display_name,
                about: set_about,
                picture: set_picture,
            };
            if edits.is_empty() {
                profile::show(&data_dir, &config, pubkey.as_deref()).await?;
            } else {
                if pubkey.is_some() {
                    anyhow::bail!("Only your own profile can be updated");
                }
                profile::update(&data_dir, &config, edits).await?;
            }
        }
        Commands::Delete {
            ids,
            coordinates,
            reason,
        } => {
            let config = config::load(&data_dir, &cli.relays)?;
            delete::run(&data_dir, &config, &ids, &coordinates, reason.as_deref()).await?;
        }
    }

    Ok(())
}

/// Log to stderr, filtered by RUST_LOG (default `warn`, `-v` for `debug`).
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Get the default data directory for tunecast.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("fm", "tunecast", "tunecast")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
