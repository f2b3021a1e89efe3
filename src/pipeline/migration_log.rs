use crate::error::Result;
use crate::pipeline::mapping::FieldMapping;
use chrono::{DateTime, Local, Utc};
use serde_json::Value;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

const SUCCESS_HEADER: [&str; 4] = ["source_id", "attio_id", "timestamp", "payload"];
const ERROR_HEADER: [&str; 4] = ["source_id", "error", "timestamp", "payload"];

/// Files one migration run writes, all stamped with the run timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct RunArtifacts {
    pub success_log: PathBuf,
    pub error_log: PathBuf,
    pub summary_log: PathBuf,
    pub mapping_log: PathBuf,
}

impl RunArtifacts {
    pub fn new(dir: &Path, timestamp: &str) -> Self {
        Self {
            success_log: dir.join(format!("migration_success_{timestamp}.csv")),
            error_log: dir.join(format!("migration_errors_{timestamp}.csv")),
            summary_log: dir.join(format!("migration_summary_{timestamp}.txt")),
            mapping_log: dir.join(format!("field_mapping_{timestamp}.json")),
        }
    }
}

/// Run settings echoed in the summary file
#[derive(Debug, Clone, Default)]
pub struct SummaryContext {
    pub source_url: String,
    pub dashboard_url: String,
    pub source_object: String,
    pub target_object: String,
    pub batch_size: usize,
    pub dry_run: bool,
}

/// Append-only success and error logs for one run.
///
/// Both CSV files exist (with headers) from the start of the run and are
/// flushed after every batch, so an interrupted run keeps what it wrote.
pub struct MigrationLogger {
    timestamp: String,
    artifacts: RunArtifacts,
    success: csv::Writer<File>,
    errors: csv::Writer<File>,
    success_count: usize,
    error_count: usize,
    skipped_count: usize,
}

impl MigrationLogger {
    pub fn create(dir: &Path, timestamp: &str) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let artifacts = RunArtifacts::new(dir, timestamp);
        let mut success = csv::Writer::from_path(&artifacts.success_log)?;
        success.write_record(SUCCESS_HEADER)?;
        let mut errors = csv::Writer::from_path(&artifacts.error_log)?;
        errors.write_record(ERROR_HEADER)?;
        info!("Migration logs in {}", dir.display());
        Ok(Self {
            timestamp: timestamp.to_string(),
            artifacts,
            success,
            errors,
            success_count: 0,
            error_count: 0,
            skipped_count: 0,
        })
    }

    pub fn artifacts(&self) -> &RunArtifacts {
        &self.artifacts
    }

    pub fn log_success(&mut self, source_id: &str, attio_id: &str, payload: &Value) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let payload = payload.to_string();
        self.success
            .write_record([source_id, attio_id, now.as_str(), payload.as_str()])?;
        self.success_count += 1;
        Ok(())
    }

    pub fn log_error(&mut self, source_id: &str, error: &str, payload: &Value) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let payload = payload.to_string();
        self.errors
            .write_record([source_id, error, now.as_str(), payload.as_str()])?;
        self.error_count += 1;
        Ok(())
    }

    pub fn log_skip(&mut self) {
        self.skipped_count += 1;
    }

    pub fn flush(&mut self) -> Result<()> {
        self.success.flush()?;
        self.errors.flush()?;
        Ok(())
    }

    pub fn success_count(&self) -> usize {
        self.success_count
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped_count
    }

    pub fn save_mapping(&self, mapping: &FieldMapping) -> Result<()> {
        mapping.save(&self.artifacts.mapping_log)
    }

    pub fn success_rate(&self) -> f64 {
        let processed = self.success_count + self.error_count;
        if processed == 0 {
            0.0
        } else {
            self.success_count as f64 / processed as f64 * 100.0
        }
    }

    pub fn render_summary(
        &self,
        context: &SummaryContext,
        started: DateTime<Local>,
        finished: DateTime<Local>,
    ) -> String {
        let rule = "=".repeat(50);
        let thin = "-".repeat(50);
        let duration = (finished - started).num_milliseconds() as f64 / 1000.0;
        format!(
            "CRM MIGRATION SUMMARY\n{rule}\n\
             Timestamp: {ts}\n\
             Start Time: {start}\n\
             End Time: {end}\n\
             Duration: {duration:.2} seconds\n\n\
             CONFIGURATION\n{thin}\n\
             Twenty CRM URL: {source}\n\
             Attio Dashboard: {dashboard}\n\
             Source Object: {source_object}\n\
             Target Object: {target_object}\n\
             Batch Size: {batch}\n\
             Dry Run: {dry_run}\n\n\
             RESULTS\n{thin}\n\
             Total Processed: {total}\n\
             Successful: {ok}\n\
             Failed: {failed}\n\
             Skipped: {skipped}\n\
             Success Rate: {rate:.2}%\n\n\
             LOGS\n{thin}\n\
             Success Log: {success_log}\n\
             Error Log: {error_log}\n\
             Mapping Log: {mapping_log}\n",
            ts = self.timestamp,
            start = started.to_rfc3339(),
            end = finished.to_rfc3339(),
            source = context.source_url,
            dashboard = context.dashboard_url,
            source_object = context.source_object,
            target_object = context.target_object,
            batch = context.batch_size,
            dry_run = context.dry_run,
            total = self.success_count + self.error_count,
            ok = self.success_count,
            failed = self.error_count,
            skipped = self.skipped_count,
            rate = self.success_rate(),
            success_log = self.artifacts.success_log.display(),
            error_log = self.artifacts.error_log.display(),
            mapping_log = self.artifacts.mapping_log.display(),
        )
    }

    /// Flush the CSV logs and write the summary file.
    pub fn finish(
        &mut self,
        context: &SummaryContext,
        started: DateTime<Local>,
        finished: DateTime<Local>,
    ) -> Result<PathBuf> {
        self.flush()?;
        fs::write(
            &self.artifacts.summary_log,
            self.render_summary(context, started, finished),
        )?;
        Ok(self.artifacts.summary_log.clone())
    }
}
