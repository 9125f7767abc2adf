//! Shared test infrastructure for Galax integration tests.
//!
//! Provides TestEnv helper for consistent test setup/teardown.

#![allow(dead_code)]

use galax::{Condition, ConfigObject, Galaxy, Node, ObjectKind, ensure_instance};
use tempfile::TempDir;

/// Test environment with automatic cleanup.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub node: Node,
    pub galaxy: Galaxy,
}

impl TestEnv {
    /// Create a new test environment with one open-security galaxy,
    /// already logged in.
    pub fn new() -> Self {
        Self::with_galaxy_name("Test")
    }

    /// Create a test environment with a named galaxy.
    pub fn with_galaxy_name(name: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let node = Node::new(temp_dir.path());
        let mut galaxy = node.create_galaxy(name, None).expect("Failed to create galaxy");
        galaxy.login("tester", "").expect("Failed to log in");
        Self { temp_dir, node, galaxy }
    }

    /// Create a test environment whose galaxy requires a password.
    pub fn with_password(password: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let node = Node::new(temp_dir.path());
        let mut galaxy = node
            .create_galaxy("Test", Some(password))
            .expect("Failed to create galaxy");
        galaxy.login("tester", password).expect("Failed to log in");
        Self { temp_dir, node, galaxy }
    }

    /// Create an instance from a template.
    pub fn create_instance(&mut self, template: &str, tagname: &str) -> ConfigObject {
        self.galaxy
            .create_instance(template, tagname)
            .expect("Failed to create instance")
    }

    /// Ensure an instance with no parent.
    pub fn ensure(&mut self, tagname: &str, template: &str) -> ConfigObject {
        ensure_instance(&mut self.galaxy, tagname, template, None)
            .expect("Failed to ensure instance")
    }

    /// Ensure an instance placed under a parent.
    pub fn ensure_under(
        &mut self,
        tagname: &str,
        template: &str,
        parent: &ConfigObject,
    ) -> ConfigObject {
        ensure_instance(&mut self.galaxy, tagname, template, Some(parent))
            .expect("Failed to ensure instance")
    }

    /// Look up one instance by name.
    pub fn get_instance(&self, tagname: &str) -> Option<ConfigObject> {
        let set = self
            .galaxy
            .query_objects_by_name(ObjectKind::Instance, &[tagname])
            .expect("Failed to query instance");
        set.by_name(tagname).cloned()
    }

    /// Count all instances in the galaxy.
    pub fn instance_count(&self) -> usize {
        self.galaxy
            .query_objects(ObjectKind::Instance, &Condition::NamedLike("%".to_string()))
            .expect("Failed to query instances")
            .len()
    }

    /// Count all templates in the galaxy.
    pub fn template_count(&self) -> usize {
        self.galaxy
            .query_objects(ObjectKind::Template, &Condition::NamedLike("%".to_string()))
            .expect("Failed to query templates")
            .len()
    }

    /// Assert that an instance exists.
    pub fn assert_instance_exists(&self, tagname: &str) {
        assert!(
            self.get_instance(tagname).is_some(),
            "Expected instance {} to exist, but it doesn't",
            tagname
        );
    }

    /// Assert that no instance with this name exists.
    pub fn assert_no_instance(&self, tagname: &str) {
        assert!(
            self.get_instance(tagname).is_none(),
            "Expected instance {} to not exist, but it does",
            tagname
        );
    }

    /// Provision the standard demo hierarchy:
    /// platform, engine on it, area on the engine, tank in the area.
    pub fn provision_demo(&mut self) -> (ConfigObject, ConfigObject, ConfigObject, ConfigObject) {
        let platform = self.ensure("GRPlatform", "$WinPlatform");
        let engine = self.ensure_under("AppEngine", "$AppEngine", &platform);
        let area = self.ensure_under("MainArea", "$Area", &engine);
        let tank = self.ensure_under("MainTank", "$UserDefined", &area);
        (platform, engine, area, tank)
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
