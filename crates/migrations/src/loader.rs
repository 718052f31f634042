//! Migration Loader - File system discovery for migrations
//!
//! Lists, parses and checksums migration files, and creates new ones.
//! Definitions are re-read from disk on every call; nothing is cached.

use chrono::Utc;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tabletop_core::MigrationSettings;

use crate::definitions::Migration;
use crate::error::{MigrationError, MigrationResult};

const SEQUENCE_WIDTH: usize = 3;
const MAX_SEQUENCE: u32 = 999;

/// Finds and loads migration definitions from a directory
#[derive(Debug, Clone)]
pub struct MigrationLoader {
    directory: PathBuf,
    pattern: Regex,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Up,
    Down,
}

impl Section {
    fn label(self) -> &'static str {
        match self {
            Section::Up => "up",
            Section::Down => "down",
        }
    }
}

impl MigrationLoader {
    /// Create a loader from migration settings
    pub fn new(settings: &MigrationSettings) -> MigrationResult<Self> {
        Ok(Self {
            directory: settings.directory.clone(),
            pattern: settings.compiled_pattern()?,
        })
    }

    /// Directory migrations are loaded from
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// List migration filenames, sorted lexicographically.
    ///
    /// A missing directory means no migrations have been defined yet.
    pub fn list_migration_files(&self) -> MigrationResult<Vec<String>> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.discovery_error(e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.discovery_error(e))?;
            let is_file = entry
                .file_type()
                .map_err(|e| self.discovery_error(e))?
                .is_file();
            if !is_file {
                continue;
            }

            if let Some(name) = entry.file_name().to_str() {
                if self.pattern.is_match(name) {
                    files.push(name.to_string());
                }
            }
        }

        files.sort();
        tracing::debug!(
            directory = %self.directory.display(),
            count = files.len(),
            "Discovered migration files"
        );
        Ok(files)
    }

    /// Load and validate a migration definition, reading the file fresh.
    pub fn load_migration(&self, filename: &str) -> MigrationResult<Migration> {
        let path = self.resolve(filename)?;
        let bytes = fs::read(&path).map_err(|e| MigrationError::io(&path, e))?;
        let content = String::from_utf8(bytes)
            .map_err(|_| MigrationError::validation(filename, "file is not valid UTF-8"))?;

        let sequence = parse_sequence(filename).ok_or_else(|| {
            MigrationError::validation(filename, "filename must start with a three-digit sequence")
        })?;
        let (up_sql, down_sql) = parse_sections(filename, &content)?;

        Ok(Migration {
            sequence,
            name: migration_name(filename),
            filename: filename.to_string(),
            up_sql,
            down_sql,
            checksum: checksum(content.as_bytes()),
        })
    }

    /// SHA-256 hex digest over the exact bytes of a migration file
    pub fn compute_checksum(&self, filename: &str) -> MigrationResult<String> {
        let path = self.resolve(filename)?;
        let bytes = fs::read(&path).map_err(|e| MigrationError::io(&path, e))?;
        Ok(checksum(&bytes))
    }

    /// Create a new migration file with the next free sequence number.
    ///
    /// Returns the new filename.
    pub fn create_migration(&self, name: &str) -> MigrationResult<String> {
        if name.trim().is_empty() {
            return Err(MigrationError::InvalidArgument(
                "migration name must not be empty".to_string(),
            ));
        }

        fs::create_dir_all(&self.directory).map_err(|e| MigrationError::io(&self.directory, e))?;

        let next = self
            .list_migration_files()?
            .iter()
            .filter_map(|f| parse_sequence(f))
            .max()
            .unwrap_or(0)
            + 1;
        if next > MAX_SEQUENCE {
            return Err(MigrationError::InvalidArgument(format!(
                "sequence numbers are exhausted (maximum {})",
                MAX_SEQUENCE
            )));
        }

        let filename = format!("{:0width$}_{}.sql", next, slugify(name), width = SEQUENCE_WIDTH);
        if !self.pattern.is_match(&filename) {
            return Err(MigrationError::validation(
                &filename,
                "generated filename does not match the configured pattern",
            ));
        }

        let path = self.directory.join(&filename);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| MigrationError::io(&path, e))?;
        file.write_all(migration_template(name).as_bytes())
            .map_err(|e| MigrationError::io(&path, e))?;

        tracing::info!(migration = %filename, "Created migration");
        Ok(filename)
    }

    fn resolve(&self, filename: &str) -> MigrationResult<PathBuf> {
        let plain = Path::new(filename).file_name().and_then(|n| n.to_str()) == Some(filename);
        if !plain || !self.pattern.is_match(filename) {
            return Err(MigrationError::validation(
                filename,
                "not a migration filename in the configured directory",
            ));
        }
        Ok(self.directory.join(filename))
    }

    fn discovery_error(&self, source: io::Error) -> MigrationError {
        MigrationError::Discovery {
            path: self.directory.clone(),
            source,
        }
    }
}

/// SHA-256 hex digest of `bytes`
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Lower-case `name` and replace every non-alphanumeric character with `_`
pub fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn parse_sequence(filename: &str) -> Option<u32> {
    let prefix = filename.get(..SEQUENCE_WIDTH)?;
    if !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}

fn migration_name(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    stem.get(SEQUENCE_WIDTH..)
        .map(|rest| rest.trim_start_matches('_'))
        .unwrap_or(stem)
        .to_string()
}

/// A marker is a whole comment line reading `up` or `down`, optionally
/// followed by `migration` and a trailing colon: `-- Up migration`, `-- down:`.
/// Any other comment is part of the SQL.
fn section_marker(line: &str) -> Option<Section> {
    let comment = line.trim().strip_prefix("--")?;
    let label = comment.trim().trim_end_matches(':').trim_end().to_lowercase();
    match label.as_str() {
        "up" | "up migration" => Some(Section::Up),
        "down" | "down migration" => Some(Section::Down),
        _ => None,
    }
}

/// Split file content into its up and down SQL.
///
/// Each section's text is kept exactly as written apart from surrounding
/// whitespace. Both markers must appear once, up before down; either
/// section may be empty.
fn parse_sections(filename: &str, content: &str) -> MigrationResult<(String, String)> {
    // (start of marker line, end of marker line) per section
    let mut up: Option<(usize, usize)> = None;
    let mut down: Option<(usize, usize)> = None;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        let Some(section) = section_marker(line) else {
            continue;
        };
        let slot = match section {
            Section::Up => &mut up,
            Section::Down => &mut down,
        };
        if slot.is_some() {
            return Err(MigrationError::validation(
                filename,
                format!("duplicate {} section marker", section.label()),
            ));
        }
        *slot = Some((start, offset));
    }

    let (up_start, up_end) = up.ok_or_else(|| {
        MigrationError::validation(filename, "missing up section (-- Up migration)")
    })?;
    let (down_start, down_end) = down.ok_or_else(|| {
        MigrationError::validation(filename, "missing down section (-- Down migration)")
    })?;

    if down_start < up_start {
        return Err(MigrationError::validation(
            filename,
            "down section must follow the up section",
        ));
    }

    let header_has_sql = content[..up_start].lines().any(|line| {
        let trimmed = line.trim();
        !trimmed.is_empty() && !trimmed.starts_with("--")
    });
    if header_has_sql {
        return Err(MigrationError::validation(
            filename,
            "SQL found before the up section marker",
        ));
    }

    Ok((
        content[up_end..down_start].trim().to_string(),
        content[down_end..].trim().to_string(),
    ))
}

fn migration_template(name: &str) -> String {
    format!(
        "-- Migration: {}\n\
         -- Created: {}\n\n\
         -- Up migration\n\n\n\
         -- Down migration\n\n",
        name,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn loader_for(dir: &Path) -> MigrationLoader {
        MigrationLoader::new(&MigrationSettings::with_directory(dir)).unwrap()
    }

    fn write(dir: &Path, filename: &str, content: &str) {
        fs::write(dir.join(filename), content).unwrap();
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write(dir, "010_add_tips.sql", "");
        write(dir, "002_create_orders.sql", "");
        write(dir, "001_create_menus.sql", "");
        write(dir, "notes.txt", "");
        write(dir, "3_missing_padding.sql", "");
        write(dir, "004_wrong_ext.js", "");
        fs::create_dir(dir.join("005_directory.sql")).unwrap();

        let files = loader_for(dir).list_migration_files().unwrap();
        assert_eq!(
            files,
            vec!["001_create_menus.sql", "002_create_orders.sql", "010_add_tips.sql"]
        );
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let loader = loader_for(&temp_dir.path().join("does_not_exist"));
        assert!(loader.list_migration_files().unwrap().is_empty());
    }

    #[test]
    fn test_load_migration_sections() {
        let temp_dir = TempDir::new().unwrap();
        let content = "-- Migration: create menus\n\
                       -- Up migration\n\
                       CREATE TABLE menus (id INTEGER PRIMARY KEY);\n\
                       -- update the index too\n\
                       CREATE INDEX menus_id ON menus (id);\n\n\
                       -- Down migration\n\
                       DROP TABLE menus;\n";
        write(temp_dir.path(), "001_create_menus.sql", content);

        let migration = loader_for(temp_dir.path())
            .load_migration("001_create_menus.sql")
            .unwrap();
        assert_eq!(migration.sequence, 1);
        assert_eq!(migration.name, "create_menus");
        assert_eq!(
            migration.up_sql,
            "CREATE TABLE menus (id INTEGER PRIMARY KEY);\n\
             -- update the index too\n\
             CREATE INDEX menus_id ON menus (id);"
        );
        assert_eq!(migration.down_sql, "DROP TABLE menus;");
        assert_eq!(migration.checksum, checksum(content.as_bytes()));
    }

    #[test]
    fn test_comment_starting_with_section_word_stays_in_body() {
        let temp_dir = TempDir::new().unwrap();
        let content = "-- Up migration\n\
                       CREATE TABLE receipts (id INTEGER);\n\
                       -- Down payments live in their own table\n\
                       CREATE TABLE deposits (id INTEGER);\n\
                       -- Down migration\n\
                       DROP TABLE deposits;\n\
                       DROP TABLE receipts;\n";
        write(temp_dir.path(), "004_receipts.sql", content);

        let migration = loader_for(temp_dir.path())
            .load_migration("004_receipts.sql")
            .unwrap();
        assert_eq!(
            migration.up_sql,
            "CREATE TABLE receipts (id INTEGER);\n\
             -- Down payments live in their own table\n\
             CREATE TABLE deposits (id INTEGER);"
        );
        assert_eq!(migration.down_sql, "DROP TABLE deposits;\nDROP TABLE receipts;");
    }

    #[test]
    fn test_string_literals_are_kept_verbatim() {
        let temp_dir = TempDir::new().unwrap();
        let insert = "INSERT INTO settings VALUES ('receipt_footer', 'Thanks!\n\n-- see you soon');";
        let function = "CREATE FUNCTION touch() RETURNS trigger AS $$\n\
                        BEGIN\n\
                        \x20 -- keep updated_at fresh\n\n\
                        \x20 NEW.updated_at = now();\n\
                        \x20 RETURN NEW;\n\
                        END;\n\
                        $$ LANGUAGE plpgsql;";
        let content = format!(
            "-- up\n{}\n{}\n\n-- down\nDELETE FROM settings WHERE key = 'receipt_footer';\n",
            insert, function
        );
        write(temp_dir.path(), "005_receipt_footer.sql", &content);

        let migration = loader_for(temp_dir.path())
            .load_migration("005_receipt_footer.sql")
            .unwrap();
        assert_eq!(migration.up_sql, format!("{}\n{}", insert, function));
        assert_eq!(
            migration.down_sql,
            "DELETE FROM settings WHERE key = 'receipt_footer';"
        );
    }

    #[test]
    fn test_malformed_markers_fail_validation() {
        let temp_dir = TempDir::new().unwrap();
        let loader = loader_for(temp_dir.path());
        write(
            temp_dir.path(),
            "001_twice.sql",
            "-- up\nSELECT 1;\n-- down\nSELECT 2;\n-- Down migration\nSELECT 3;\n",
        );
        write(temp_dir.path(), "002_reversed.sql", "-- down\nSELECT 2;\n-- up\nSELECT 1;\n");
        write(temp_dir.path(), "003_preamble.sql", "-- header\nSELECT 0;\n-- up\n-- down\n");

        let err = loader.load_migration("001_twice.sql").unwrap_err();
        assert!(matches!(err, MigrationError::Validation { ref reason, .. } if reason.contains("duplicate down")));

        let err = loader.load_migration("002_reversed.sql").unwrap_err();
        assert!(matches!(err, MigrationError::Validation { ref reason, .. } if reason.contains("follow")));

        let err = loader.load_migration("003_preamble.sql").unwrap_err();
        assert!(matches!(err, MigrationError::Validation { ref reason, .. } if reason.contains("before")));
    }

    #[test]
    fn test_empty_down_section_is_valid() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "001_seed_settings.sql",
            "-- up\nINSERT INTO settings VALUES ('currency', 'EUR');\n-- down:\n",
        );

        let migration = loader_for(temp_dir.path())
            .load_migration("001_seed_settings.sql")
            .unwrap();
        assert!(migration.down_sql.is_empty());
    }

    #[test]
    fn test_missing_sections_fail_validation() {
        let temp_dir = TempDir::new().unwrap();
        let loader = loader_for(temp_dir.path());
        write(temp_dir.path(), "001_no_down.sql", "-- Up migration\nCREATE TABLE t (id INTEGER);\n");
        write(temp_dir.path(), "002_no_up.sql", "CREATE TABLE t (id INTEGER);\n-- Down migration\n");

        let err = loader.load_migration("001_no_down.sql").unwrap_err();
        assert!(matches!(err, MigrationError::Validation { ref reason, .. } if reason.contains("down")));

        let err = loader.load_migration("002_no_up.sql").unwrap_err();
        assert!(matches!(err, MigrationError::Validation { ref reason, .. } if reason.contains("up")));
    }

    #[test]
    fn test_load_rejects_foreign_paths() {
        let temp_dir = TempDir::new().unwrap();
        let loader = loader_for(temp_dir.path());

        assert!(matches!(
            loader.load_migration("001_../../etc/passwd.sql"),
            Err(MigrationError::Validation { .. })
        ));
        assert!(matches!(
            loader.load_migration("readme.md"),
            Err(MigrationError::Validation { .. })
        ));
        assert!(matches!(
            loader.load_migration("001_missing.sql"),
            Err(MigrationError::Io { .. })
        ));
    }

    #[test]
    fn test_reload_sees_changed_content() {
        let temp_dir = TempDir::new().unwrap();
        let loader = loader_for(temp_dir.path());
        write(temp_dir.path(), "001_tables.sql", "-- up\nSELECT 1;\n-- down\n");
        let first = loader.load_migration("001_tables.sql").unwrap();

        write(temp_dir.path(), "001_tables.sql", "-- up\nSELECT 2;\n-- down\n");
        let second = loader.load_migration("001_tables.sql").unwrap();

        assert_eq!(second.up_sql, "SELECT 2;");
        assert_ne!(first.checksum, second.checksum);
        assert_eq!(
            loader.compute_checksum("001_tables.sql").unwrap(),
            second.checksum
        );
    }

    #[test]
    fn test_checksum_is_sha256_hex() {
        assert_eq!(
            checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(checksum(b"").len(), 64);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Create Orders Table"), "create_orders_table");
        assert_eq!(slugify("add-tip%column"), "add_tip_column");
        assert_eq!(slugify("QR codes v2"), "qr_codes_v2");
    }

    #[test]
    fn test_create_migration_allocates_next_sequence() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("migrations");
        let loader = loader_for(&dir);

        let first = loader.create_migration("Create menus").unwrap();
        assert_eq!(first, "001_create_menus.sql");

        write(&dir, "007_manual.sql", "-- up\n-- down\n");
        let next = loader.create_migration("add receipts").unwrap();
        assert_eq!(next, "008_add_receipts.sql");

        let content = fs::read_to_string(dir.join(&next)).unwrap();
        assert!(content.contains("-- Migration: add receipts"));
        assert!(content.contains("-- Up migration"));
        assert!(content.contains("-- Down migration"));

        // The template itself must load cleanly as a no-op migration
        let migration = loader.load_migration(&next).unwrap();
        assert!(migration.up_sql.is_empty());
        assert!(migration.down_sql.is_empty());
    }

    #[test]
    fn test_create_migration_rejects_empty_name_and_exhaustion() {
        let temp_dir = TempDir::new().unwrap();
        let loader = loader_for(temp_dir.path());
        assert!(matches!(
            loader.create_migration("   "),
            Err(MigrationError::InvalidArgument(_))
        ));

        write(temp_dir.path(), "999_last.sql", "-- up\n-- down\n");
        assert!(matches!(
            loader.create_migration("one more"),
            Err(MigrationError::InvalidArgument(_))
        ));
    }
}
