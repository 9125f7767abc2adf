//! Package export and verification.
//!
//! A package is a self-describing snapshot of configuration objects:
//! a manifest carrying the galaxy name and a SHA-256 digest of the
//! payload, followed by the objects themselves. Packages can be written
//! as JSON or YAML and verified on load, but are never imported back
//! into a galaxy.

use crate::galaxy::GalaxyError;
use crate::queryset::QuerySet;
use crate::types::ConfigObject;
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// On-disk encoding of an exported package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Yaml,
}

impl ExportFormat {
    /// File extension conventionally used for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
        }
    }

    /// Guess the format from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Some(ExportFormat::Json),
            Some("yaml") | Some("yml") => Some(ExportFormat::Yaml),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            other => Err(format!("unknown export format: {} (expected json or yaml)", other)),
        }
    }
}

/// Header of an exported package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Galaxy the objects were exported from.
    pub galaxy: String,
    /// When the package was written.
    pub exported_at: DateTime<Utc>,
    /// Number of objects in the payload.
    pub object_count: usize,
    /// SHA-256 hex digest of the JSON-serialized payload.
    pub digest: String,
}

/// A complete exported package: manifest plus payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub manifest: PackageManifest,
    pub objects: Vec<ConfigObject>,
}

/// What an export produced. `requested` counts the names asked for;
/// `exported` counts the objects actually found and written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSummary {
    pub requested: usize,
    pub exported: usize,
    pub path: PathBuf,
    pub format: ExportFormat,
    pub digest: String,
}

fn digest_objects(objects: &[ConfigObject]) -> Result<String> {
    let payload =
        serde_json::to_string(objects).context("Failed to serialize package payload")?;
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Write the objects in `set` to a package file at `path`.
pub fn write_package(
    galaxy: &str,
    set: &QuerySet,
    format: ExportFormat,
    path: &Path,
    requested: usize,
) -> Result<ExportSummary> {
    let objects: Vec<ConfigObject> = set.iter().cloned().collect();
    let digest = digest_objects(&objects)?;

    let package = Package {
        manifest: PackageManifest {
            galaxy: galaxy.to_string(),
            exported_at: Utc::now(),
            object_count: objects.len(),
            digest: digest.clone(),
        },
        objects,
    };

    let serialized = match format {
        ExportFormat::Json => {
            serde_json::to_string_pretty(&package).context("Failed to serialize package")?
        }
        ExportFormat::Yaml => {
            serde_yaml::to_string(&package).context("Failed to serialize package")?
        }
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create export directory")?;
    }
    std::fs::write(path, serialized)
        .with_context(|| format!("Failed to write package to {}", path.display()))?;

    Ok(ExportSummary {
        requested,
        exported: package.manifest.object_count,
        path: path.to_path_buf(),
        format,
        digest,
    })
}

/// Read a package back and verify its digest against the payload.
pub fn load_package(path: &Path) -> Result<Package> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read package from {}", path.display()))?;

    let package: Package = match ExportFormat::from_path(path) {
        Some(ExportFormat::Json) => {
            serde_json::from_str(&data).context("Failed to parse package")?
        }
        Some(ExportFormat::Yaml) => {
            serde_yaml::from_str(&data).context("Failed to parse package")?
        }
        None => serde_json::from_str(&data)
            .or_else(|_| serde_yaml::from_str(&data))
            .context("Failed to parse package")?,
    };

    let actual = digest_objects(&package.objects)?;
    if actual != package.manifest.digest {
        return Err(eyre::eyre!(GalaxyError::DigestMismatch {
            expected: package.manifest.digest.clone(),
            actual,
        }));
    }

    Ok(package)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectKind;
    use tempfile::TempDir;

    fn sample_object(tagname: &str) -> ConfigObject {
        let now = Utc::now();
        ConfigObject {
            tagname: tagname.to_string(),
            kind: ObjectKind::Instance,
            based_on: "$UserDefined".to_string(),
            derived_from: Some("$UserDefined".to_string()),
            area: None,
            host: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_set() -> QuerySet {
        let mut set = QuerySet::new();
        set.push(sample_object("GRPlatform"));
        set.push(sample_object("MainTank"));
        set
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("YAML".parse::<ExportFormat>().unwrap(), ExportFormat::Yaml);
        assert_eq!("yml".parse::<ExportFormat>().unwrap(), ExportFormat::Yaml);
        assert!("xml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ExportFormat::from_path(Path::new("out/pkg.json")),
            Some(ExportFormat::Json)
        );
        assert_eq!(
            ExportFormat::from_path(Path::new("pkg.yml")),
            Some(ExportFormat::Yaml)
        );
        assert_eq!(ExportFormat::from_path(Path::new("pkg.bin")), None);
    }

    #[test]
    fn test_write_and_load_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pkg.json");

        let summary =
            write_package("Test", &sample_set(), ExportFormat::Json, &path, 3).unwrap();
        assert_eq!(summary.requested, 3);
        assert_eq!(summary.exported, 2);
        assert_eq!(summary.format, ExportFormat::Json);

        let package = load_package(&path).unwrap();
        assert_eq!(package.manifest.galaxy, "Test");
        assert_eq!(package.manifest.object_count, 2);
        assert_eq!(package.manifest.digest, summary.digest);
        assert_eq!(package.objects[0].tagname, "GRPlatform");
        assert_eq!(package.objects[1].tagname, "MainTank");
    }

    #[test]
    fn test_write_and_load_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pkg.yaml");

        write_package("Test", &sample_set(), ExportFormat::Yaml, &path, 2).unwrap();

        let package = load_package(&path).unwrap();
        assert_eq!(package.objects.len(), 2);
        assert_eq!(package.objects[1].tagname, "MainTank");
    }

    #[test]
    fn test_load_detects_tampering() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pkg.json");

        write_package("Test", &sample_set(), ExportFormat::Json, &path, 2).unwrap();

        let data = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, data.replace("MainTank", "FakeTank")).unwrap();

        let result = load_package(&path);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("digest mismatch"));
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/exports/pkg.json");

        write_package("Test", &sample_set(), ExportFormat::Json, &path, 2).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_empty_package_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.json");

        let summary =
            write_package("Test", &QuerySet::new(), ExportFormat::Json, &path, 1).unwrap();
        assert_eq!(summary.exported, 0);

        let package = load_package(&path).unwrap();
        assert!(package.objects.is_empty());
    }
}
