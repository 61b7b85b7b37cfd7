//! JSON-lines audit storage, one stream per pipeline.

use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use crate::core::AuditRecord;
use crate::pipeline::AuditLogger;

/// Appends audit records to `{audit_dir}/{pipeline_id}.jsonl`.
///
/// Writes are best-effort: an audit stream that cannot be appended to is
/// reported via `tracing::warn` and otherwise ignored, because losing an
/// observability line must not change pipeline disposition.
pub struct JsonlAuditLogger {
    audit_dir: PathBuf,
    // Serializes appends so concurrent pipelines cannot interleave
    // partial lines within one file.
    write_lock: Mutex<()>,
}

impl JsonlAuditLogger {
    /// Creates a logger writing under `audit_dir`. The directory is
    /// created on the first append.
    #[must_use]
    pub fn new(audit_dir: impl Into<PathBuf>) -> Self {
        Self {
            audit_dir: audit_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn file_path(&self, pipeline_id: &str) -> PathBuf {
        self.audit_dir.join(format!("{pipeline_id}.jsonl"))
    }

    fn try_append(&self, record: &AuditRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let _guard = self.write_lock.lock();
        fs::create_dir_all(&self.audit_dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_path(&record.pipeline_id))?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

impl AuditLogger for JsonlAuditLogger {
    fn log(&self, record: AuditRecord) {
        if let Err(err) = self.try_append(&record) {
            tracing::warn!(
                pipeline_id = %record.pipeline_id,
                event = %record.event,
                error = %err,
                "failed to append audit record"
            );
        }
    }

    fn pipeline_log(&self, pipeline_id: &str) -> Vec<AuditRecord> {
        let Ok(content) = fs::read_to_string(self.file_path(pipeline_id)) else {
            return Vec::new();
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}
