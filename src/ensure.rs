//! Idempotent instance provisioning.
//!
//! [`ensure_instance`] makes "this instance exists, derived from that
//! template, hosted under this parent" safe to run repeatedly. An
//! instance that already exists is reused as-is; the template is only
//! consulted when something has to be created. Parent assignment is
//! applied on every run, so a changed hierarchy converges.

use crate::galaxy::{GalaxyError, GalaxyOps};
use crate::types::{ConfigObject, ObjectKind};
use eyre::Result;

/// Find the instance by name, creating it from `template` if absent,
/// then place it under `parent`.
///
/// The existence check is by name only: if the instance is found, the
/// template is not looked up at all. A parent based on the area base
/// template becomes the instance's area; any other parent becomes its
/// host.
pub fn ensure_instance<G: GalaxyOps>(
    galaxy: &mut G,
    tagname: &str,
    template: &str,
    parent: Option<&ConfigObject>,
) -> Result<ConfigObject> {
    let found = galaxy.query_objects_by_name(ObjectKind::Instance, &[tagname])?;

    let instance = match found.by_name(tagname) {
        Some(existing) => {
            log::debug!("Instance {} already exists", tagname);
            existing.clone()
        }
        None => {
            let templates = galaxy.query_objects_by_name(ObjectKind::Template, &[template])?;
            if templates.by_name(template).is_none() {
                return Err(eyre::eyre!(GalaxyError::TemplateNotFound(template.to_string())));
            }
            log::info!("Creating instance {} from {}", tagname, template);
            galaxy.create_instance(template, tagname)?
        }
    };

    match parent {
        Some(parent) if parent.is_area_based() => {
            galaxy.assign_area(&instance.tagname, &parent.tagname)
        }
        Some(parent) => galaxy.assign_host(&instance.tagname, &parent.tagname),
        None => Ok(instance),
    }
}

/// Look up an existing instance by name.
pub fn resolve_instance<G: GalaxyOps>(galaxy: &G, tagname: &str) -> Result<ConfigObject> {
    let found = galaxy.query_objects_by_name(ObjectKind::Instance, &[tagname])?;
    found
        .by_name(tagname)
        .cloned()
        .ok_or_else(|| eyre::eyre!(GalaxyError::ObjectNotFound(tagname.to_string())))
}
