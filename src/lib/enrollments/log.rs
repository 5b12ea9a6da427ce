use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use super::record::EnrollmentRecord;

pub const ENROLLMENT_PROCESSED: &str = "enrollment_processed";

#[derive(Debug, Error)]
pub enum EnrollmentLogError {
    #[error("Could not write to enrollment log {path}. {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Could not serialize enrollment. {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Could not format log timestamp. {0}")]
    Timestamp(#[from] time::error::Format),
}

#[derive(Serialize)]
struct LogEntry<'a> {
    timestamp: String,
    action: &'static str,
    data: &'a EnrollmentRecord,
}

/// Append-only JSON lines, one per processed enrollment.
pub struct EnrollmentLog {
    path: PathBuf,
}

impl EnrollmentLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        EnrollmentLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &EnrollmentRecord) -> Result<(), EnrollmentLogError> {
        let entry = LogEntry {
            timestamp: OffsetDateTime::now_utc().format(&Rfc3339)?,
            action: ENROLLMENT_PROCESSED,
            data: record,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| {
                file.write_all(line.as_bytes())?;
                file.flush()
            })
            .map_err(|source| EnrollmentLogError::Io {
                path: self.path.display().to_string(),
                source,
            })
    }
}
