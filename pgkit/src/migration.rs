//! Loading SQL migration files from a directory.
//!
//! Migration files follow a naming convention rather than a versioning scheme: a file is
//! an "up" migration when its name contains `up.sql` and a "down" migration when it
//! contains `down.sql`. The match is a substring match, so `0001_users.up.sql.bak` is
//! still picked up as an "up" migration.
//!
//! Loading is all-or-nothing: if any matching file cannot be read or is empty, no
//! migrations are returned.
//!
//! ```no_run
//! use pgkit::{load_migrations, Direction, Migration};
//!
//! let ups = load_migrations("migrations", "up")?;
//! let downs = Migration::load("migrations", Direction::Down)?;
//! for migration in ups.iter().chain(downs.iter()) {
//!     println!("{} ({})", migration.filename(), migration.direction());
//! }
//! # Ok::<(), pgkit::Error>(())
//! ```

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// The direction a migration file applies in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Apply a schema change.
    Up,
    /// Revert a schema change.
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    /// The substring a file name must contain to belong to this direction.
    pub fn file_pattern(&self) -> String {
        format!("{}.sql", self.as_str())
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(Error::InvalidArgument(format!(
                "invalid direction '{}', must be 'up' or 'down'",
                other
            ))),
        }
    }
}

/// A single SQL migration file: its direction, file name and contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Migration {
    direction: Direction,
    filename: String,
    content: String,
}

impl Migration {
    /// Read every migration file for `direction` from `dir`.
    ///
    /// Files are returned sorted by file name. Sub-directories are skipped.
    ///
    /// # Errors
    ///
    /// - [Error::Io] if the directory or a matching file cannot be read, or a file is not UTF-8.
    /// - [Error::EmptyDirectory] if the directory has no entries at all.
    /// - [Error::EmptyFile] if any matching file is empty.
    /// - [Error::NoMatchingMigrations] if no file name contains `<direction>.sql`.
    pub fn load(dir: impl AsRef<Path>, direction: Direction) -> Result<Vec<Migration>, Error> {
        let dir = dir.as_ref();

        #[cfg(feature = "tracing")]
        tracing::debug!(dir = %dir.display(), direction = %direction, "fetching migrations");

        let mut entries = fs::read_dir(dir)
            .and_then(|entries| entries.collect::<Result<Vec<_>, _>>())
            .map_err(|e| {
                Error::io(
                    format!("unable to read directory '{}'", dir.display()),
                    e,
                )
            })?;
        if entries.is_empty() {
            return Err(Error::EmptyDirectory {
                dir: dir.to_path_buf(),
            });
        }
        entries.sort_by_key(|entry| entry.file_name());

        let pattern = direction.file_pattern();
        let mut migrations = Vec::new();
        for entry in entries {
            let filename = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();

            let file_type = entry.file_type().map_err(|e| {
                Error::io(format!("unable to stat '{}'", path.display()), e)
            })?;
            if file_type.is_dir() {
                #[cfg(feature = "tracing")]
                tracing::warn!(name = %filename, "skipping directory");
                continue;
            }
            if !filename.contains(&pattern) {
                continue;
            }

            let bytes = fs::read(&path).map_err(|e| {
                Error::io(format!("unable to read file '{}'", path.display()), e)
            })?;
            if bytes.is_empty() {
                return Err(Error::EmptyFile { path });
            }
            let content = String::from_utf8(bytes).map_err(|e| {
                Error::io(
                    format!("unable to read file '{}'", path.display()),
                    std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                )
            })?;

            #[cfg(feature = "tracing")]
            tracing::debug!(file = %filename, bytes = content.len(), "loaded migration");

            migrations.push(Migration {
                direction,
                filename,
                content,
            });
        }

        if migrations.is_empty() {
            return Err(Error::NoMatchingMigrations {
                dir: dir.to_path_buf(),
                pattern,
            });
        }
        Ok(migrations)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The SQL text of the file.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn into_content(self) -> String {
        self.content
    }
}

/// Read every migration file for a direction given as a string.
///
/// `direction` must be exactly `"up"` or `"down"`; any other value fails with
/// [Error::InvalidArgument] before the filesystem is touched. See [Migration::load].
pub fn load_migrations(
    dir: impl AsRef<Path>,
    direction: &str,
) -> Result<Vec<Migration>, Error> {
    let direction = direction.parse::<Direction>()?;
    Migration::load(dir, direction)
}
