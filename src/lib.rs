//! Galax: a galaxy configuration repository with template instancing.
//!
//! Galax hosts named configuration repositories (galaxies) on a node
//! directory. Each galaxy holds templates and the instances derived
//! from them, persisted in a JSONL object log with SQLite caching, and
//! can export instances to digest-verified package files.
//!
//! # Example
//!
//! ```no_run
//! use galax::{ExportFormat, Node, ensure_instance};
//! use std::path::Path;
//!
//! // Create a galaxy on a node; base templates are seeded
//! let node = Node::new(Path::new("."));
//! let mut galaxy = node.create_galaxy("Production", None).unwrap();
//! galaxy.login("operator", "").unwrap();
//!
//! // Provision a hierarchy; re-running is safe
//! let platform = ensure_instance(&mut galaxy, "GRPlatform", "$WinPlatform", None).unwrap();
//! let engine = ensure_instance(&mut galaxy, "AppEngine", "$AppEngine", Some(&platform)).unwrap();
//! let area = ensure_instance(&mut galaxy, "MainArea", "$Area", Some(&engine)).unwrap();
//!
//! // An area parent becomes the instance's area, anything else its host
//! let tank = ensure_instance(&mut galaxy, "MainTank", "$UserDefined", Some(&area)).unwrap();
//! assert_eq!(tank.area.as_deref(), Some("MainArea"));
//!
//! // Export a digest-verified package
//! let summary = galaxy
//!     .export_objects(
//!         &["GRPlatform", "AppEngine", "MainTank"],
//!         ExportFormat::Json,
//!         Path::new("demo.package.json"),
//!     )
//!     .unwrap();
//! println!("exported {} object(s), digest {}", summary.exported, summary.digest);
//! ```

mod ensure;
mod export;
mod galaxy;
mod node;
mod queryset;
mod session;
mod storage;
mod types;

pub mod client;
pub mod daemon;
pub mod protocol;

// Re-export public API
pub use client::Client;
pub use daemon::{Daemon, DaemonConfig, is_daemon_running, start_daemon};
pub use ensure::{ensure_instance, resolve_instance};
pub use export::{ExportFormat, ExportSummary, Package, PackageManifest, load_package};
pub use galaxy::{Galaxy, GalaxyError, GalaxyOps};
pub use node::{GalaxySummary, Node};
pub use protocol::{Request, Response};
pub use queryset::QuerySet;
pub use session::Session;
pub use types::{
    AREA_TEMPLATE, BASE_TEMPLATES, Condition, ConfigObject, ObjectKind, ValidationError,
};
