//! High-level galaxy repository API.

use crate::export::{self, ExportFormat, ExportSummary};
use crate::queryset::QuerySet;
use crate::session::{Session, hash_secret};
use crate::storage::Storage;
use crate::types::{
    BASE_TEMPLATES, Condition, ConfigObject, ObjectKind, ValidationError, validate_galaxy_name,
    validate_tagname,
};
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings file stored next to the object log.
const SETTINGS_FILE: &str = "galaxy.json";

/// Errors that can occur during galaxy operations.
#[derive(Debug)]
pub enum GalaxyError {
    /// No galaxy with this name exists on the node.
    GalaxyNotFound(String),
    /// A galaxy with this name already exists on the node.
    DuplicateGalaxy(String),
    /// Object not found.
    ObjectNotFound(String),
    /// Template required for instancing is absent.
    TemplateNotFound(String),
    /// Tagname already taken by another object.
    DuplicateTagname(String),
    /// Operation requires an instance but the object is a template.
    NotAnInstance(String),
    /// Operation attempted without a prior successful login.
    NotLoggedIn,
    /// Login rejected.
    AccessDenied,
    /// A loaded package's digest does not match its payload.
    DigestMismatch { expected: String, actual: String },
    /// Validation error.
    Validation(ValidationError),
}

impl std::fmt::Display for GalaxyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GalaxyError::GalaxyNotFound(name) => write!(f, "galaxy not found: {}", name),
            GalaxyError::DuplicateGalaxy(name) => write!(f, "galaxy already exists: {}", name),
            GalaxyError::ObjectNotFound(tagname) => write!(f, "object not found: {}", tagname),
            GalaxyError::TemplateNotFound(tagname) => write!(f, "template not found: {}", tagname),
            GalaxyError::DuplicateTagname(tagname) => {
                write!(f, "tagname already in use: {}", tagname)
            }
            GalaxyError::NotAnInstance(tagname) => {
                write!(f, "object is not an instance: {}", tagname)
            }
            GalaxyError::NotLoggedIn => write!(f, "not logged in to the galaxy"),
            GalaxyError::AccessDenied => write!(f, "Access Denied"),
            GalaxyError::DigestMismatch { expected, actual } => {
                write!(f, "package digest mismatch: expected {}, got {}", expected, actual)
            }
            GalaxyError::Validation(e) => write!(f, "validation error: {}", e),
        }
    }
}

impl std::error::Error for GalaxyError {}

/// Per-galaxy settings persisted as JSON next to the object log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalaxySettings {
    /// When the galaxy was created.
    pub created_at: DateTime<Utc>,

    /// SHA-256 hex of the login password. `None` means open security:
    /// login is still required but any credentials are accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
}

/// An open galaxy repository handle.
///
/// Every query and mutation requires a prior successful [`Galaxy::login`],
/// even when the galaxy has open security.
#[derive(Debug)]
pub struct Galaxy {
    name: String,
    dir: PathBuf,
    storage: Storage,
    settings: GalaxySettings,
    session: Option<Session>,
}

impl Galaxy {
    /// Create a new galaxy in the given directory, seeding the built-in
    /// base templates.
    pub(crate) fn create(dir: &Path, name: &str, password: Option<&str>) -> Result<Self> {
        validate_galaxy_name(name).map_err(|e| eyre::eyre!(GalaxyError::Validation(e)))?;

        let mut storage = Storage::init(dir)?;

        let settings = GalaxySettings {
            created_at: Utc::now(),
            password_hash: password.map(hash_secret),
        };
        let settings_json =
            serde_json::to_string_pretty(&settings).context("Failed to serialize galaxy settings")?;
        std::fs::write(dir.join(SETTINGS_FILE), settings_json)
            .context("Failed to write galaxy settings")?;

        // Seed the base templates directly; no login exists yet.
        let now = Utc::now();
        for tagname in BASE_TEMPLATES {
            let template = ConfigObject {
                tagname: tagname.to_string(),
                kind: ObjectKind::Template,
                based_on: tagname.to_string(),
                derived_from: None,
                area: None,
                host: None,
                created_at: now,
                updated_at: now,
            };
            storage
                .append_object(&template)
                .context("Failed to seed base template")?;
        }

        Ok(Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            storage,
            settings,
            session: None,
        })
    }

    /// Open an existing galaxy.
    pub(crate) fn open(dir: &Path, name: &str) -> Result<Self> {
        let storage = Storage::open(dir)?;

        let settings_json = std::fs::read_to_string(dir.join(SETTINGS_FILE))
            .context("Failed to read galaxy settings")?;
        let settings: GalaxySettings =
            serde_json::from_str(&settings_json).context("Failed to parse galaxy settings")?;

        Ok(Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            storage,
            settings,
            session: None,
        })
    }

    /// Galaxy name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding this galaxy's data.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// When the galaxy was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.settings.created_at
    }

    /// Number of objects stored in the galaxy. Listing metadata; does
    /// not require a login session.
    pub fn object_count(&self) -> Result<usize> {
        self.storage.count_objects()
    }

    /// Log in to the galaxy. Required before any query or mutation even
    /// when security is not enabled.
    pub fn login(&mut self, user: &str, password: &str) -> Result<()> {
        if let Some(expected) = &self.settings.password_hash
            && hash_secret(password) != *expected
        {
            return Err(eyre::eyre!(GalaxyError::AccessDenied));
        }

        self.session = Some(Session::begin(&self.name, user));
        Ok(())
    }

    /// True if a login session is active.
    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    /// The active login session, if any.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn require_login(&self) -> Result<()> {
        if self.session.is_none() {
            return Err(eyre::eyre!(GalaxyError::NotLoggedIn));
        }
        Ok(())
    }

    /// Get a single object by tagname, template or instance.
    pub fn get_object(&self, tagname: &str) -> Result<Option<ConfigObject>> {
        self.require_login()?;
        self.storage.get_object(tagname)
    }

    /// Exact-name lookup restricted to one kind. Names absent from the
    /// galaxy are simply not present in the result; the result preserves
    /// the requested order.
    pub fn query_objects_by_name(&self, kind: ObjectKind, names: &[&str]) -> Result<QuerySet> {
        self.require_login()?;

        let mut set = QuerySet::new();
        for name in names {
            if let Some(object) = self.storage.get_object_of_kind(name, kind)? {
                set.push(object);
            }
        }
        Ok(set)
    }

    /// Conditional lookup restricted to one kind, ordered by tagname.
    pub fn query_objects(&self, kind: ObjectKind, condition: &Condition) -> Result<QuerySet> {
        self.require_login()?;

        let objects = self.storage.query_objects(kind, condition)?;
        Ok(QuerySet::from_objects(objects))
    }

    /// Derive a new template from an existing one. The new template
    /// inherits `based_on` from its parent.
    pub fn create_template(&mut self, tagname: &str, derived_from: &str) -> Result<ConfigObject> {
        self.require_login()?;

        validate_tagname(tagname, ObjectKind::Template)
            .map_err(|e| eyre::eyre!(GalaxyError::Validation(e)))?;

        if self.storage.get_object(tagname)?.is_some() {
            return Err(eyre::eyre!(GalaxyError::DuplicateTagname(tagname.to_string())));
        }

        let parent = self
            .storage
            .get_object_of_kind(derived_from, ObjectKind::Template)?
            .ok_or_else(|| eyre::eyre!(GalaxyError::TemplateNotFound(derived_from.to_string())))?;

        let now = Utc::now();
        let template = ConfigObject {
            tagname: tagname.to_string(),
            kind: ObjectKind::Template,
            based_on: parent.based_on.clone(),
            derived_from: Some(parent.tagname),
            area: None,
            host: None,
            created_at: now,
            updated_at: now,
        };

        template
            .validate()
            .map_err(|e| eyre::eyre!(GalaxyError::Validation(e)))?;

        self.storage
            .append_object(&template)
            .context("Failed to persist template")?;

        Ok(template)
    }

    /// Create a new instance derived from the named template.
    pub fn create_instance(&mut self, template: &str, tagname: &str) -> Result<ConfigObject> {
        self.require_login()?;

        validate_tagname(tagname, ObjectKind::Instance)
            .map_err(|e| eyre::eyre!(GalaxyError::Validation(e)))?;

        if self.storage.get_object(tagname)?.is_some() {
            return Err(eyre::eyre!(GalaxyError::DuplicateTagname(tagname.to_string())));
        }

        let source = self
            .storage
            .get_object_of_kind(template, ObjectKind::Template)?
            .ok_or_else(|| eyre::eyre!(GalaxyError::TemplateNotFound(template.to_string())))?;

        let now = Utc::now();
        let instance = ConfigObject {
            tagname: tagname.to_string(),
            kind: ObjectKind::Instance,
            based_on: source.based_on.clone(),
            derived_from: Some(source.tagname),
            area: None,
            host: None,
            created_at: now,
            updated_at: now,
        };

        instance
            .validate()
            .map_err(|e| eyre::eyre!(GalaxyError::Validation(e)))?;

        self.storage
            .append_object(&instance)
            .context("Failed to persist instance")?;

        Ok(instance)
    }

    /// Assign an instance to an area. Clears any host assignment; area
    /// and host are mutually exclusive.
    pub fn assign_area(&mut self, tagname: &str, area: &str) -> Result<ConfigObject> {
        self.assign_parent(tagname, area, true)
    }

    /// Assign an instance to a host. Clears any area assignment.
    pub fn assign_host(&mut self, tagname: &str, host: &str) -> Result<ConfigObject> {
        self.assign_parent(tagname, host, false)
    }

    fn assign_parent(&mut self, tagname: &str, parent: &str, as_area: bool) -> Result<ConfigObject> {
        self.require_login()?;

        let target = self
            .storage
            .get_object(tagname)?
            .ok_or_else(|| eyre::eyre!(GalaxyError::ObjectNotFound(tagname.to_string())))?;
        if !target.is_instance() {
            return Err(eyre::eyre!(GalaxyError::NotAnInstance(tagname.to_string())));
        }

        let parent_object = self
            .storage
            .get_object(parent)?
            .ok_or_else(|| eyre::eyre!(GalaxyError::ObjectNotFound(parent.to_string())))?;
        if !parent_object.is_instance() {
            return Err(eyre::eyre!(GalaxyError::NotAnInstance(parent.to_string())));
        }

        let now = Utc::now();
        let updated = ConfigObject {
            area: as_area.then(|| parent.to_string()),
            host: (!as_area).then(|| parent.to_string()),
            updated_at: now,
            ..target
        };

        self.storage
            .append_object(&updated)
            .context("Failed to persist parent assignment")?;

        Ok(updated)
    }

    /// Query the named instances and write them to a package file.
    /// The path is caller-supplied and not validated beyond I/O errors.
    pub fn export_objects(
        &self,
        names: &[&str],
        format: ExportFormat,
        path: &Path,
    ) -> Result<ExportSummary> {
        let set = self.query_objects_by_name(ObjectKind::Instance, names)?;
        export::write_package(&self.name, &set, format, path, names.len())
    }
}

/// Operations the instance-ensure procedure needs from a galaxy.
///
/// Implemented by [`Galaxy`]; tests substitute a recording double to
/// observe which lookups the procedure performs.
pub trait GalaxyOps {
    /// Exact-name lookup restricted to one kind.
    fn query_objects_by_name(&self, kind: ObjectKind, names: &[&str]) -> Result<QuerySet>;

    /// Create a new instance derived from the named template.
    fn create_instance(&mut self, template: &str, tagname: &str) -> Result<ConfigObject>;

    /// Assign an instance to an area, clearing any host assignment.
    fn assign_area(&mut self, tagname: &str, area: &str) -> Result<ConfigObject>;

    /// Assign an instance to a host, clearing any area assignment.
    fn assign_host(&mut self, tagname: &str, host: &str) -> Result<ConfigObject>;
}

impl GalaxyOps for Galaxy {
    fn query_objects_by_name(&self, kind: ObjectKind, names: &[&str]) -> Result<QuerySet> {
        Galaxy::query_objects_by_name(self, kind, names)
    }

    fn create_instance(&mut self, template: &str, tagname: &str) -> Result<ConfigObject> {
        Galaxy::create_instance(self, template, tagname)
    }

    fn assign_area(&mut self, tagname: &str, area: &str) -> Result<ConfigObject> {
        Galaxy::assign_area(self, tagname, area)
    }

    fn assign_host(&mut self, tagname: &str, host: &str) -> Result<ConfigObject> {
        Galaxy::assign_host(self, tagname, host)
    }
}
