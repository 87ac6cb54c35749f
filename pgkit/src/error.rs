use std::path::PathBuf;

/// Error type for the pgkit crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    #[error("no files found in directory '{}'", dir.display())]
    EmptyDirectory { dir: PathBuf },
    #[error("no files found with ending '{pattern}' in directory '{}'", dir.display())]
    NoMatchingMigrations { dir: PathBuf, pattern: String },
    #[error("empty file '{}'", path.display())]
    EmptyFile { path: PathBuf },
    #[error("invalid connection configuration: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
    #[error("{message}")]
    Connectivity {
        message: String,
        #[source]
        source: Option<postgres::Error>,
    },
    #[error("unable to query db ({query})")]
    Query {
        query: String,
        #[source]
        source: postgres::Error,
    },
    #[error("unable to decode column '{column}': {message}")]
    Decode { column: String, message: String },
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    #[cfg(feature = "testing")]
    #[error("container: {0}")]
    Container(String),
}

impl Error {
    pub(crate) fn io(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self::Io {
            context: context.into(),
            source: source.into(),
        }
    }

    pub(crate) fn not_connected() -> Self {
        Self::Connectivity {
            message: "connection is not open".to_string(),
            source: None,
        }
    }

    /// True for both the empty-directory and the no-matching-files cases.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EmptyDirectory { .. } | Self::NoMatchingMigrations { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn io_message_does_not_repeat_its_source() {
        let err = Error::io(
            "unable to read file 'a.up.sql'",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied"),
        );
        assert_eq!(err.to_string(), "unable to read file 'a.up.sql'");
        let source = err.source().expect("io error keeps its cause");
        assert_eq!(source.to_string(), "permission denied");
    }

    #[test]
    fn not_found_groups_both_cases() {
        let empty = Error::EmptyDirectory { dir: PathBuf::from("m") };
        let unmatched = Error::NoMatchingMigrations {
            dir: PathBuf::from("m"),
            pattern: "up.sql".to_string(),
        };
        assert!(empty.is_not_found());
        assert!(unmatched.is_not_found());
        assert!(!Error::NotImplemented("execute").is_not_found());
    }
}
