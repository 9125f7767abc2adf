//! Node-level galaxy registry.
//!
//! A node directory hosts any number of galaxies inside a hidden
//! `.galax` directory, one subdirectory per galaxy. Galaxies are
//! recognized by the presence of their object log.

use crate::galaxy::{Galaxy, GalaxyError};
use crate::storage::OBJECTS_FILE;
use crate::types::validate_galaxy_name;
use chrono::{DateTime, Utc};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory under the node root that holds all galaxy data.
pub(crate) const GALAX_DIR: &str = ".galax";

/// A galaxy visible on the node, as reported by [`Node::query_galaxies`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalaxySummary {
    pub name: String,
    pub path: PathBuf,
    pub object_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Handle to a node directory.
#[derive(Debug, Clone)]
pub struct Node {
    root: PathBuf,
}

impl Node {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn galax_dir(&self) -> PathBuf {
        self.root.join(GALAX_DIR)
    }

    fn galaxy_dir(&self, name: &str) -> PathBuf {
        self.galax_dir().join(name)
    }

    /// True if a galaxy with this name exists on the node.
    pub fn galaxy_exists(&self, name: &str) -> bool {
        self.galaxy_dir(name).join(OBJECTS_FILE).exists()
    }

    /// List the galaxies hosted on this node, sorted by name.
    ///
    /// A node with no `.galax` directory reports no galaxies.
    /// Unreadable galaxy directories are skipped with a warning rather
    /// than failing the whole listing.
    pub fn query_galaxies(&self) -> Result<Vec<GalaxySummary>> {
        let mut galaxies = Vec::new();

        let galax_dir = self.galax_dir();
        if !galax_dir.exists() {
            return Ok(galaxies);
        }

        for entry in std::fs::read_dir(&galax_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() || !path.join(OBJECTS_FILE).exists() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            match Galaxy::open(&path, &name) {
                Ok(galaxy) => {
                    galaxies.push(GalaxySummary {
                        name,
                        path,
                        object_count: galaxy.object_count()?,
                        created_at: galaxy.created_at(),
                    });
                }
                Err(e) => {
                    log::warn!("Skipping unreadable galaxy {}: {}", name, e);
                }
            }
        }

        galaxies.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(galaxies)
    }

    /// Create a new galaxy on the node, seeded with the base templates.
    pub fn create_galaxy(&self, name: &str, password: Option<&str>) -> Result<Galaxy> {
        validate_galaxy_name(name).map_err(|e| eyre::eyre!(GalaxyError::Validation(e)))?;

        if self.galaxy_exists(name) {
            return Err(eyre::eyre!(GalaxyError::DuplicateGalaxy(name.to_string())));
        }

        Galaxy::create(&self.galaxy_dir(name), name, password)
    }

    /// Open an existing galaxy on the node.
    pub fn open_galaxy(&self, name: &str) -> Result<Galaxy> {
        if !self.galaxy_exists(name) {
            return Err(eyre::eyre!(GalaxyError::GalaxyNotFound(name.to_string())));
        }

        Galaxy::open(&self.galaxy_dir(name), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BASE_TEMPLATES;
    use tempfile::TempDir;

    #[test]
    fn test_empty_node_reports_no_galaxies() {
        let temp_dir = TempDir::new().unwrap();
        let node = Node::new(temp_dir.path());

        assert!(node.query_galaxies().unwrap().is_empty());
    }

    #[test]
    fn test_create_and_list_galaxies() {
        let temp_dir = TempDir::new().unwrap();
        let node = Node::new(temp_dir.path());

        node.create_galaxy("Zeta", None).unwrap();
        node.create_galaxy("Alpha", None).unwrap();

        assert!(temp_dir.path().join(GALAX_DIR).join("Alpha").join(OBJECTS_FILE).exists());

        let galaxies = node.query_galaxies().unwrap();
        assert_eq!(galaxies.len(), 2);
        assert_eq!(galaxies[0].name, "Alpha");
        assert_eq!(galaxies[1].name, "Zeta");
        assert_eq!(galaxies[0].object_count, BASE_TEMPLATES.len());
    }

    #[test]
    fn test_create_duplicate_galaxy() {
        let temp_dir = TempDir::new().unwrap();
        let node = Node::new(temp_dir.path());

        node.create_galaxy("Test", None).unwrap();
        let result = node.create_galaxy("Test", None);
        assert!(result.unwrap_err().to_string().contains("galaxy already exists: Test"));
    }

    #[test]
    fn test_open_missing_galaxy() {
        let temp_dir = TempDir::new().unwrap();
        let node = Node::new(temp_dir.path());

        let result = node.open_galaxy("Nowhere");
        assert!(result.unwrap_err().to_string().contains("galaxy not found: Nowhere"));
    }

    #[test]
    fn test_open_created_galaxy() {
        let temp_dir = TempDir::new().unwrap();
        let node = Node::new(temp_dir.path());

        node.create_galaxy("Test", None).unwrap();
        assert!(node.galaxy_exists("Test"));

        let mut galaxy = node.open_galaxy("Test").unwrap();
        galaxy.login("", "").unwrap();
        assert_eq!(galaxy.name(), "Test");
    }

    #[test]
    fn test_listing_skips_non_galaxy_entries() {
        let temp_dir = TempDir::new().unwrap();
        let node = Node::new(temp_dir.path());

        node.create_galaxy("Test", None).unwrap();
        let galax_dir = temp_dir.path().join(GALAX_DIR);
        std::fs::create_dir(galax_dir.join("scratch")).unwrap();
        std::fs::write(galax_dir.join("notes.txt"), "hi").unwrap();

        let galaxies = node.query_galaxies().unwrap();
        assert_eq!(galaxies.len(), 1);
        assert_eq!(galaxies[0].name, "Test");
    }

    #[test]
    fn test_invalid_galaxy_name_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let node = Node::new(temp_dir.path());

        assert!(node.create_galaxy("", None).is_err());
        assert!(node.create_galaxy("bad/name", None).is_err());
    }
}
