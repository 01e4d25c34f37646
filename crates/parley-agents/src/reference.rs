//! Loading read-only reference data.
//!
//! Every data set ships with a built-in JSON document compiled into the
//! binary. Deployments may point at a replacement file instead; either way
//! the data is parsed once at startup and handed to a session store.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::ReferenceDataError;

/// Parses a JSON document into `T`.
///
/// # Errors
///
/// Returns `ReferenceDataError::Parse` if the document does not match `T`.
pub fn parse<T: DeserializeOwned>(name: &str, json: &str) -> Result<T, ReferenceDataError> {
    serde_json::from_str(json).map_err(|source| ReferenceDataError::Parse {
        name: name.to_string(),
        source,
    })
}

/// Reads and parses a JSON document from disk.
///
/// # Errors
///
/// Returns `ReferenceDataError::Read` if the file cannot be read, or
/// `ReferenceDataError::Parse` if its contents do not match `T`.
pub fn load_from_path<T: DeserializeOwned>(path: &Path) -> Result<T, ReferenceDataError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ReferenceDataError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let value = parse(&path.display().to_string(), &contents)?;
    tracing::info!(path = %path.display(), "loaded reference data");
    Ok(value)
}

/// Loads from `path` when given, otherwise parses the built-in document.
pub(crate) fn load_or_builtin<T: DeserializeOwned>(
    path: Option<&Path>,
    builtin_name: &str,
    builtin: &str,
) -> Result<T, ReferenceDataError> {
    match path {
        Some(path) => load_from_path(path),
        None => parse(builtin_name, builtin),
    }
}

pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> ReferenceDataError {
    ReferenceDataError::Invalid {
        name: name.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pair {
        a: u32,
        b: String,
    }

    #[test]
    fn parse_reports_the_data_set_name() {
        let err = parse::<Pair>("pairs", "{\"a\": \"x\"}").expect_err("a is not a number");
        assert!(matches!(err, ReferenceDataError::Parse { ref name, .. } if name == "pairs"));
    }

    #[test]
    fn load_from_path_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"a\": 1, \"b\": \"two\"}}").unwrap();

        let pair: Pair = load_from_path(file.path()).expect("file should parse");
        assert_eq!(
            pair,
            Pair {
                a: 1,
                b: "two".into()
            }
        );
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_from_path::<Pair>(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ReferenceDataError::Read { .. }));
    }
}
