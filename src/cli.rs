//! CLI argument parsing for Galax.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "gx",
    about = "Galaxy configuration repository with template instancing and package export",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/galax/logs/galax.log"
)]
pub struct Cli {
    /// Path to the node directory (default: current directory)
    #[arg(short = 'd', long, global = true)]
    pub dir: Option<PathBuf>,

    /// User name to log in with
    #[arg(short = 'u', long, global = true, default_value = "")]
    pub user: String,

    /// Password to log in with
    #[arg(short = 'p', long, global = true, default_value = "")]
    pub password: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new galaxy on the node, protected by --password if given
    CreateGalaxy {
        /// Galaxy name
        name: String,
    },

    /// List galaxies on the node
    Galaxies,

    /// Find or create an instance and place it under a parent
    Ensure {
        /// Galaxy name
        galaxy: String,

        /// Instance tagname
        tagname: String,

        /// Template to create from if the instance is missing
        template: String,

        /// Parent instance (an area, or a host for anything else)
        #[arg(long)]
        parent: Option<String>,
    },

    /// Derive a new template from an existing one
    Derive {
        /// Galaxy name
        galaxy: String,

        /// New template tagname (must start with $)
        tagname: String,

        /// Template to derive from
        from: String,
    },

    /// Show an object
    Get {
        /// Galaxy name
        galaxy: String,

        /// Object tagname
        tagname: String,
    },

    /// List objects in a galaxy
    List {
        /// Galaxy name
        galaxy: String,

        /// List templates instead of instances
        #[arg(short, long)]
        templates: bool,

        /// Filter by tagname pattern (SQL LIKE syntax)
        #[arg(short, long)]
        like: Option<String>,

        /// Filter by base template
        #[arg(short, long)]
        based_on: Option<String>,
    },

    /// Export instances to a package file
    Export {
        /// Galaxy name
        galaxy: String,

        /// Instance tagnames to export
        #[arg(required = true)]
        names: Vec<String>,

        /// Package format (json or yaml)
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Output path (default: <galaxy>.package.<format>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify a package file against its digest
    Verify {
        /// Package path
        path: PathBuf,
    },

    /// Provision the demo hierarchy in the first galaxy and export it
    Demo {
        /// Output path for the exported package
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the daemon in foreground
    Daemon,

    /// Stop the running daemon
    DaemonStop,

    /// Check daemon status
    DaemonStatus,
}
