//! Core data types for galax configuration objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tagname of the built-in area base template. Parents based on this
/// template take the Area relation; everything else takes Host.
pub const AREA_TEMPLATE: &str = "$Area";

/// Built-in base templates seeded into every new galaxy.
pub const BASE_TEMPLATES: [&str; 5] = [
    "$WinPlatform",
    "$AppEngine",
    "$ViewEngine",
    "$Area",
    "$UserDefined",
];

/// Maximum tagname length, excluding the `$` template prefix.
pub const MAX_TAGNAME_LEN: usize = 32;

/// Whether an object is a reusable template or a concrete instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Template,
    Instance,
}

impl ObjectKind {
    /// Stable string form used in storage and queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Template => "template",
            ObjectKind::Instance => "instance",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Match condition for conditional object queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "condition", content = "pattern", rename_all = "snake_case")]
pub enum Condition {
    /// Exact tagname match.
    NamedEqual(String),

    /// SQL LIKE pattern match on tagname (`%` and `_` wildcards).
    NamedLike(String),

    /// Objects whose derivation chain roots at the given base template.
    BasedOn(String),
}

/// One configuration object in a galaxy: a template or an instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigObject {
    /// Unique name within the galaxy. Templates carry a `$` prefix.
    pub tagname: String,

    /// Template or instance.
    pub kind: ObjectKind,

    /// Root base template of the derivation chain. A base template is
    /// based on itself; derived templates and instances inherit this
    /// from the template they were created from.
    pub based_on: String,

    /// Immediate template this object was derived from. `None` only for
    /// the built-in base templates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<String>,

    /// Tagname of the area instance this object is assigned to.
    /// Mutually exclusive with `host`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,

    /// Tagname of the host instance this object is assigned to.
    /// Mutually exclusive with `area`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// When created
    pub created_at: DateTime<Utc>,

    /// Last modification
    pub updated_at: DateTime<Utc>,
}

/// Validation errors for objects and names.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyTagname,
    TagnameTooLong,
    InvalidTagname(String),
    MissingTemplatePrefix(String),
    UnexpectedTemplatePrefix(String),
    InvalidGalaxyName(String),
    InstanceWithoutTemplate,
    ParentAttributesOnTemplate,
    AreaAndHostBothSet,
    InvalidTimestamp,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyTagname => write!(f, "tagname cannot be empty"),
            ValidationError::TagnameTooLong => {
                write!(f, "tagname exceeds {} characters", MAX_TAGNAME_LEN)
            }
            ValidationError::InvalidTagname(name) => {
                write!(
                    f,
                    "invalid tagname '{}': must start with a letter and contain only letters, digits and underscores",
                    name
                )
            }
            ValidationError::MissingTemplatePrefix(name) => {
                write!(f, "template tagname '{}' must start with '$'", name)
            }
            ValidationError::UnexpectedTemplatePrefix(name) => {
                write!(f, "instance tagname '{}' must not start with '$'", name)
            }
            ValidationError::InvalidGalaxyName(name) => {
                write!(
                    f,
                    "invalid galaxy name '{}': must start with a letter and contain only letters, digits and underscores",
                    name
                )
            }
            ValidationError::InstanceWithoutTemplate => {
                write!(f, "instance has no source template")
            }
            ValidationError::ParentAttributesOnTemplate => {
                write!(f, "templates cannot carry area or host assignments")
            }
            ValidationError::AreaAndHostBothSet => {
                write!(f, "area and host assignments are mutually exclusive")
            }
            ValidationError::InvalidTimestamp => write!(f, "updated_at cannot be before created_at"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a tagname for the given object kind.
///
/// Templates: `$` followed by a letter, then letters/digits/underscores.
/// Instances: a letter, then letters/digits/underscores. The length cap
/// excludes the template prefix.
pub fn validate_tagname(tagname: &str, kind: ObjectKind) -> Result<(), ValidationError> {
    if tagname.is_empty() {
        return Err(ValidationError::EmptyTagname);
    }

    let bare = match kind {
        ObjectKind::Template => tagname
            .strip_prefix('$')
            .ok_or_else(|| ValidationError::MissingTemplatePrefix(tagname.to_string()))?,
        ObjectKind::Instance => {
            if tagname.starts_with('$') {
                return Err(ValidationError::UnexpectedTemplatePrefix(tagname.to_string()));
            }
            tagname
        }
    };

    if bare.is_empty() {
        return Err(ValidationError::EmptyTagname);
    }
    if bare.len() > MAX_TAGNAME_LEN {
        return Err(ValidationError::TagnameTooLong);
    }
    if !bare.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidTagname(tagname.to_string()));
    }
    if !bare.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::InvalidTagname(tagname.to_string()));
    }

    Ok(())
}

/// Validate a galaxy name. Same rule as instance tagnames; galaxy names
/// become directory names, so no separators or prefixes are allowed.
pub fn validate_galaxy_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty()
        || name.len() > MAX_TAGNAME_LEN
        || !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ValidationError::InvalidGalaxyName(name.to_string()));
    }
    Ok(())
}

impl ConfigObject {
    /// True if this object is a template.
    pub fn is_template(&self) -> bool {
        self.kind == ObjectKind::Template
    }

    /// True if this object is an instance.
    pub fn is_instance(&self) -> bool {
        self.kind == ObjectKind::Instance
    }

    /// True if this object derives, at the root of its chain, from the
    /// area base template.
    pub fn is_area_based(&self) -> bool {
        self.based_on == AREA_TEMPLATE
    }

    /// Validate the object's fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_tagname(&self.tagname, self.kind)?;

        match self.kind {
            ObjectKind::Instance => {
                if self.derived_from.is_none() {
                    return Err(ValidationError::InstanceWithoutTemplate);
                }
            }
            ObjectKind::Template => {
                if self.area.is_some() || self.host.is_some() {
                    return Err(ValidationError::ParentAttributesOnTemplate);
                }
            }
        }

        // Parent assignment is exclusive: area or host, never both.
        if self.area.is_some() && self.host.is_some() {
            return Err(ValidationError::AreaAndHostBothSet);
        }

        if self.updated_at < self.created_at {
            return Err(ValidationError::InvalidTimestamp);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_instance(tagname: &str) -> ConfigObject {
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

    fn make_template(tagname: &str) -> ConfigObject {
        let now = Utc::now();
        ConfigObject {
            tagname: tagname.to_string(),
            kind: ObjectKind::Template,
            based_on: tagname.to_string(),
            derived_from: None,
            area: None,
            host: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_instance_validation_valid() {
        let obj = make_instance("MainTank");
        assert!(obj.validate().is_ok());
    }

    #[test]
    fn test_template_validation_valid() {
        let obj = make_template("$UserDefined");
        assert!(obj.validate().is_ok());
    }

    #[test]
    fn test_instance_with_template_prefix_rejected() {
        let obj = make_instance("$MainTank");
        assert_eq!(
            obj.validate(),
            Err(ValidationError::UnexpectedTemplatePrefix("$MainTank".to_string()))
        );
    }

    #[test]
    fn test_template_without_prefix_rejected() {
        let obj = make_template("UserDefined");
        assert_eq!(
            obj.validate(),
            Err(ValidationError::MissingTemplatePrefix("UserDefined".to_string()))
        );
    }

    #[test]
    fn test_empty_tagname_rejected() {
        let obj = make_instance("");
        assert_eq!(obj.validate(), Err(ValidationError::EmptyTagname));
    }

    #[test]
    fn test_bare_dollar_rejected() {
        let obj = make_template("$");
        assert_eq!(obj.validate(), Err(ValidationError::EmptyTagname));
    }

    #[test]
    fn test_tagname_too_long() {
        let obj = make_instance(&"x".repeat(MAX_TAGNAME_LEN + 1));
        assert_eq!(obj.validate(), Err(ValidationError::TagnameTooLong));
    }

    #[test]
    fn test_template_prefix_excluded_from_length() {
        let obj = make_template(&format!("${}", "x".repeat(MAX_TAGNAME_LEN)));
        assert!(obj.validate().is_ok());
    }

    #[test]
    fn test_tagname_leading_digit_rejected() {
        let obj = make_instance("1Tank");
        assert_eq!(
            obj.validate(),
            Err(ValidationError::InvalidTagname("1Tank".to_string()))
        );
    }

    #[test]
    fn test_tagname_invalid_characters() {
        let obj = make_instance("Main Tank");
        assert_eq!(
            obj.validate(),
            Err(ValidationError::InvalidTagname("Main Tank".to_string()))
        );
    }

    #[test]
    fn test_instance_without_template_rejected() {
        let mut obj = make_instance("MainTank");
        obj.derived_from = None;
        assert_eq!(obj.validate(), Err(ValidationError::InstanceWithoutTemplate));
    }

    #[test]
    fn test_template_with_area_rejected() {
        let mut obj = make_template("$Tank");
        obj.area = Some("MainArea".to_string());
        assert_eq!(obj.validate(), Err(ValidationError::ParentAttributesOnTemplate));
    }

    #[test]
    fn test_area_and_host_exclusive() {
        let mut obj = make_instance("MainTank");
        obj.area = Some("MainArea".to_string());
        obj.host = Some("AppEngine".to_string());
        assert_eq!(obj.validate(), Err(ValidationError::AreaAndHostBothSet));
    }

    #[test]
    fn test_area_alone_valid() {
        let mut obj = make_instance("MainTank");
        obj.area = Some("MainArea".to_string());
        assert!(obj.validate().is_ok());
    }

    #[test]
    fn test_galaxy_name_validation() {
        assert!(validate_galaxy_name("Production").is_ok());
        assert!(validate_galaxy_name("plant_2").is_ok());
        assert!(validate_galaxy_name("").is_err());
        assert!(validate_galaxy_name("$Production").is_err());
        assert!(validate_galaxy_name("two words").is_err());
        assert!(validate_galaxy_name("../escape").is_err());
    }

    #[test]
    fn test_is_area_based() {
        let mut parent = make_instance("MainArea");
        parent.based_on = AREA_TEMPLATE.to_string();
        parent.derived_from = Some(AREA_TEMPLATE.to_string());
        assert!(parent.is_area_based());

        let engine = make_instance("AppEngine");
        assert!(!engine.is_area_based());
    }

    #[test]
    fn test_object_serialization_roundtrip() {
        let obj = make_instance("MainTank");
        let json = serde_json::to_string(&obj).unwrap();
        let deserialized: ConfigObject = serde_json::from_str(&json).unwrap();
        assert_eq!(obj, deserialized);
    }

    #[test]
    fn test_unset_parent_fields_not_serialized() {
        let obj = make_instance("MainTank");
        let json = serde_json::to_string(&obj).unwrap();
        assert!(!json.contains("\"area\""));
        assert!(!json.contains("\"host\""));
    }
}
