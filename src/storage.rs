//! Per-galaxy storage: JSONL object log + SQLite cache.

use crate::types::{Condition, ConfigObject, ObjectKind};
use eyre::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// JSONL file holding the object log. Source of truth; last write wins.
pub(crate) const OBJECTS_FILE: &str = "objects.jsonl";

/// SQLite cache database file.
const DB_FILE: &str = "galaxy.db";

/// Storage handle for one galaxy's data directory.
#[derive(Debug)]
pub struct Storage {
    dir: PathBuf,
    db: Connection,
}

impl Storage {
    /// Initialize storage in the given galaxy directory.
    pub fn init(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).context("Failed to create galaxy directory")?;

        let objects_path = dir.join(OBJECTS_FILE);
        if !objects_path.exists() {
            File::create(&objects_path).context("Failed to create objects.jsonl")?;
        }

        let db_path = dir.join(DB_FILE);
        let db = Connection::open(&db_path).context("Failed to open SQLite database")?;

        let mut storage = Self {
            dir: dir.to_path_buf(),
            db,
        };

        storage.init_schema()?;
        storage.rebuild_from_jsonl()?;

        Ok(storage)
    }

    /// Open existing storage.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.join(OBJECTS_FILE).exists() {
            eyre::bail!("No galaxy data found in {}", dir.display());
        }

        let db_path = dir.join(DB_FILE);
        let db = Connection::open(&db_path).context("Failed to open SQLite database")?;

        let mut storage = Self {
            dir: dir.to_path_buf(),
            db,
        };

        storage.init_schema()?;

        // Check consistency and rebuild if needed
        if storage.needs_rebuild()? {
            storage.rebuild_from_jsonl()?;
        }

        Ok(storage)
    }

    /// Initialize SQLite schema.
    fn init_schema(&self) -> Result<()> {
        self.db
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS objects (
                    tagname TEXT PRIMARY KEY,
                    kind TEXT NOT NULL CHECK (kind IN ('template', 'instance')),
                    based_on TEXT NOT NULL,
                    derived_from TEXT,
                    area TEXT,
                    host TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_objects_kind ON objects(kind);
                CREATE INDEX IF NOT EXISTS idx_objects_based_on ON objects(based_on);

                CREATE TABLE IF NOT EXISTS meta (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
            "#,
            )
            .context("Failed to initialize schema")?;

        Ok(())
    }

    /// Check if the SQLite cache needs to be rebuilt from JSONL.
    fn needs_rebuild(&self) -> Result<bool> {
        let objects_path = self.dir.join(OBJECTS_FILE);
        let objects_lines = count_lines(&objects_path)?;

        let stored_objects: i64 = self
            .db
            .query_row(
                "SELECT COALESCE((SELECT value FROM meta WHERE key = 'jsonl_objects_lines'), '0')",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        Ok(objects_lines as i64 != stored_objects)
    }

    /// Rebuild the SQLite cache from the JSONL log.
    pub fn rebuild_from_jsonl(&mut self) -> Result<()> {
        let objects_path = self.dir.join(OBJECTS_FILE);

        // Clear existing cache rows
        self.db
            .execute("DELETE FROM objects", [])
            .context("Failed to clear objects table")?;

        // Read objects (last occurrence wins)
        let mut objects: HashMap<String, ConfigObject> = HashMap::new();
        let mut line_count = 0;

        if objects_path.exists() {
            let file = File::open(&objects_path).context("Failed to open objects.jsonl")?;
            let reader = BufReader::new(file);

            for line in reader.lines() {
                line_count += 1;
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        log::warn!("Failed to read line {}: {}", line_count, e);
                        continue;
                    }
                };

                if line.trim().is_empty() {
                    continue;
                }

                match serde_json::from_str::<ConfigObject>(&line) {
                    Ok(object) => {
                        objects.insert(object.tagname.clone(), object);
                    }
                    Err(e) => {
                        log::warn!("Failed to parse object at line {}: {}", line_count, e);
                    }
                }
            }
        }

        for object in objects.values() {
            self.insert_object_to_db(object)?;
        }

        self.db.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('jsonl_objects_lines', ?)",
            params![line_count.to_string()],
        )?;

        Ok(())
    }

    /// Insert an object into the SQLite cache.
    fn insert_object_to_db(&self, object: &ConfigObject) -> Result<()> {
        self.db.execute(
            r#"
            INSERT OR REPLACE INTO objects (tagname, kind, based_on, derived_from, area, host, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                object.tagname,
                object.kind.as_str(),
                object.based_on,
                object.derived_from,
                object.area,
                object.host,
                object.created_at.to_rfc3339(),
                object.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Append an object record to the JSONL log and update the cache.
    pub fn append_object(&mut self, object: &ConfigObject) -> Result<()> {
        let objects_path = self.dir.join(OBJECTS_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&objects_path)
            .context("Failed to open objects.jsonl for append")?;

        let json = serde_json::to_string(object).context("Failed to serialize object")?;
        writeln!(file, "{}", json).context("Failed to write to objects.jsonl")?;
        file.sync_all().context("Failed to sync objects.jsonl")?;

        self.insert_object_to_db(object)?;

        self.db.execute(
            "UPDATE meta SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT) WHERE key = 'jsonl_objects_lines'",
            [],
        )?;

        Ok(())
    }

    /// Get an object by tagname, any kind.
    pub fn get_object(&self, tagname: &str) -> Result<Option<ConfigObject>> {
        let mut stmt = self.db.prepare(
            r#"
            SELECT tagname, kind, based_on, derived_from, area, host, created_at, updated_at
            FROM objects WHERE tagname = ?
            "#,
        )?;

        let object = stmt.query_row(params![tagname], Self::row_to_object).optional()?;
        Ok(object)
    }

    /// Get an object by tagname, restricted to one kind.
    pub fn get_object_of_kind(&self, tagname: &str, kind: ObjectKind) -> Result<Option<ConfigObject>> {
        let mut stmt = self.db.prepare(
            r#"
            SELECT tagname, kind, based_on, derived_from, area, host, created_at, updated_at
            FROM objects WHERE tagname = ? AND kind = ?
            "#,
        )?;

        let object = stmt
            .query_row(params![tagname, kind.as_str()], Self::row_to_object)
            .optional()?;
        Ok(object)
    }

    /// Query objects of one kind matching a condition, ordered by tagname.
    pub fn query_objects(&self, kind: ObjectKind, condition: &Condition) -> Result<Vec<ConfigObject>> {
        let (clause, pattern) = match condition {
            Condition::NamedEqual(name) => ("tagname = ?", name),
            Condition::NamedLike(pattern) => ("tagname LIKE ?", pattern),
            Condition::BasedOn(template) => ("based_on = ?", template),
        };

        let sql = format!(
            r#"
            SELECT tagname, kind, based_on, derived_from, area, host, created_at, updated_at
            FROM objects WHERE kind = ? AND {}
            ORDER BY tagname ASC
            "#,
            clause
        );

        let mut stmt = self.db.prepare(&sql)?;
        let objects: Vec<ConfigObject> = stmt
            .query_map(params![kind.as_str(), pattern], Self::row_to_object)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(objects)
    }

    /// Count all objects in the galaxy.
    pub fn count_objects(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM objects", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Convert a database row to a ConfigObject.
    fn row_to_object(row: &rusqlite::Row) -> rusqlite::Result<ConfigObject> {
        let kind_str: String = row.get(1)?;
        let kind = match kind_str.as_str() {
            "template" => ObjectKind::Template,
            _ => ObjectKind::Instance,
        };

        let created_at_str: String = row.get(6)?;
        let updated_at_str: String = row.get(7)?;

        Ok(ConfigObject {
            tagname: row.get(0)?,
            kind,
            based_on: row.get(2)?,
            derived_from: row.get(3)?,
            area: row.get(4)?,
            host: row.get(5)?,
            created_at: chrono::DateTime::parse_from_rfc3339(&created_at_str)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now()),
            updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at_str)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now()),
        })
    }
}

/// Count lines in a file.
fn count_lines(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let file = File::open(path).context("Failed to open file for line count")?;
    let reader = BufReader::new(file);
    Ok(reader.lines().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn make_object(tagname: &str, kind: ObjectKind) -> ConfigObject {
        let now = Utc::now();
        let (based_on, derived_from) = match kind {
            ObjectKind::Template => (tagname.to_string(), None),
            ObjectKind::Instance => ("$UserDefined".to_string(), Some("$UserDefined".to_string())),
        };
        ConfigObject {
            tagname: tagname.to_string(),
            kind,
            based_on,
            derived_from,
            area: None,
            host: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn setup_test_storage() -> (TempDir, Storage) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::init(temp_dir.path()).unwrap();
        (temp_dir, storage)
    }

    #[test]
    fn test_init_creates_files() {
        let temp_dir = TempDir::new().unwrap();
        let _storage = Storage::init(temp_dir.path()).unwrap();

        assert!(temp_dir.path().join(OBJECTS_FILE).exists());
        assert!(temp_dir.path().join(DB_FILE).exists());
    }

    #[test]
    fn test_open_without_data_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Storage::open(temp_dir.path()).is_err());
    }

    #[test]
    fn test_append_and_get_object() {
        let (_temp_dir, mut storage) = setup_test_storage();

        storage
            .append_object(&make_object("MainTank", ObjectKind::Instance))
            .unwrap();

        let retrieved = storage.get_object("MainTank").unwrap();
        assert!(retrieved.is_some());
        let retrieved = retrieved.unwrap();
        assert_eq!(retrieved.tagname, "MainTank");
        assert_eq!(retrieved.kind, ObjectKind::Instance);
        assert_eq!(retrieved.based_on, "$UserDefined");
    }

    #[test]
    fn test_get_object_of_kind_filters() {
        let (_temp_dir, mut storage) = setup_test_storage();

        storage
            .append_object(&make_object("$UserDefined", ObjectKind::Template))
            .unwrap();

        assert!(
            storage
                .get_object_of_kind("$UserDefined", ObjectKind::Template)
                .unwrap()
                .is_some()
        );
        assert!(
            storage
                .get_object_of_kind("$UserDefined", ObjectKind::Instance)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_query_named_like() {
        let (_temp_dir, mut storage) = setup_test_storage();

        storage
            .append_object(&make_object("$Area", ObjectKind::Template))
            .unwrap();
        storage
            .append_object(&make_object("$AppEngine", ObjectKind::Template))
            .unwrap();
        storage
            .append_object(&make_object("MainTank", ObjectKind::Instance))
            .unwrap();

        let all_templates = storage
            .query_objects(ObjectKind::Template, &Condition::NamedLike("%".to_string()))
            .unwrap();
        assert_eq!(all_templates.len(), 2);
        // Ordered by tagname
        assert_eq!(all_templates[0].tagname, "$AppEngine");
        assert_eq!(all_templates[1].tagname, "$Area");

        let apps = storage
            .query_objects(ObjectKind::Template, &Condition::NamedLike("$App%".to_string()))
            .unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].tagname, "$AppEngine");
    }

    #[test]
    fn test_query_based_on() {
        let (_temp_dir, mut storage) = setup_test_storage();

        let mut tank = make_object("MainTank", ObjectKind::Instance);
        tank.based_on = "$UserDefined".to_string();
        storage.append_object(&tank).unwrap();

        let mut area = make_object("MainArea", ObjectKind::Instance);
        area.based_on = "$Area".to_string();
        area.derived_from = Some("$Area".to_string());
        storage.append_object(&area).unwrap();

        let areas = storage
            .query_objects(ObjectKind::Instance, &Condition::BasedOn("$Area".to_string()))
            .unwrap();
        assert_eq!(areas.len(), 1);
        assert_eq!(areas[0].tagname, "MainArea");
    }

    #[test]
    fn test_last_write_wins_after_rebuild() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut storage = Storage::init(temp_dir.path()).unwrap();
            let first = make_object("MainTank", ObjectKind::Instance);
            storage.append_object(&first).unwrap();

            let mut second = first.clone();
            second.area = Some("MainArea".to_string());
            storage.append_object(&second).unwrap();
        }

        // Remove the cache so open() must replay the log.
        std::fs::remove_file(temp_dir.path().join(DB_FILE)).unwrap();

        let storage = Storage::open(temp_dir.path()).unwrap();
        let tank = storage.get_object("MainTank").unwrap().unwrap();
        assert_eq!(tank.area.as_deref(), Some("MainArea"));
    }

    #[test]
    fn test_count_objects() {
        let (_temp_dir, mut storage) = setup_test_storage();

        assert_eq!(storage.count_objects().unwrap(), 0);
        storage
            .append_object(&make_object("$Area", ObjectKind::Template))
            .unwrap();
        storage
            .append_object(&make_object("MainArea", ObjectKind::Instance))
            .unwrap();
        assert_eq!(storage.count_objects().unwrap(), 2);
    }
}
