//! Path utilities for determining data storage locations.
//!
//! Databases live under the user data directory (`~/.local/share` on Linux)
//! in `taskflow/projects/<name>-<hash>/`, one per project directory, keyed
//! by a hash of the canonical project path.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// The application directory name under the user data directory.
const DATA_DIR_NAME: &str = "taskflow";

/// The database filename.
pub const DATABASE_FILENAME: &str = "taskflow.sqlite3";

/// Get the base data directory, or `None` if the platform has none.
#[must_use]
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(DATA_DIR_NAME))
}

/// Get the project-specific data directory.
#[must_use]
pub fn project_data_dir(project_dir: &Path) -> Option<PathBuf> {
    let base = data_dir()?;
    Some(base.join("projects").join(create_project_dir_name(project_dir)))
}

/// Get the database path for a project.
///
/// Returns `<data_dir>/taskflow/projects/<name>-<hash>/taskflow.sqlite3`.
#[must_use]
pub fn project_db_path(project_dir: &Path) -> Option<PathBuf> {
    project_data_dir(project_dir).map(|dir| dir.join(DATABASE_FILENAME))
}

/// Format: `<project-name>-<hash>` e.g., `my-project-a1b2c3d4e5f60718`
fn create_project_dir_name(project_dir: &Path) -> String {
    let path_to_hash = project_dir.canonicalize().unwrap_or_else(|_| project_dir.to_path_buf());

    let prefix = path_to_hash.file_name().and_then(|n| n.to_str()).unwrap_or("project");
    let prefix: String =
        prefix.chars().map(|c| if c.is_alphanumeric() { c } else { '-' }).collect();
    let prefix = prefix.trim_matches('-');
    let prefix = if prefix.is_empty() { "project" } else { prefix };

    let mut hasher = DefaultHasher::new();
    path_to_hash.hash(&mut hasher);
    format!("{prefix}-{:016x}", hasher.finish())
}
