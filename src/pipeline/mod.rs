//! Twenty → Attio migration.
//!
//! A run walks [`MigrationStage`] strictly forward: validate options, test
//! both connections, extract and preview source records, resolve the field
//! mapping, select records, confirm, write in batches, summarize.

pub mod flatten;
pub mod mapping;
pub mod migration_log;
pub mod selection;
pub mod stage;

use crate::app::ports::{CrmApi, Prompter, SourceCrm};
use crate::config::Config;
use crate::constants::{ATTR_EMAIL_ADDRESSES, PEOPLE, RUN_TIMESTAMP_FORMAT, SOURCE_SYSTEM_FIELDS};
use crate::error::{CrmError, Result};
use crate::pipeline::flatten::{flatten_record, id_text};
use crate::pipeline::mapping::FieldMapping;
use crate::pipeline::migration_log::{MigrationLogger, RunArtifacts, SummaryContext};
use crate::pipeline::selection::{FlatRecord, Selection};
use crate::pipeline::stage::MigrationStage;
use crate::types::AttributeInfo;
use chrono::Local;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

/// Rows shown in the preview table
const PREVIEW_ROWS: usize = 5;

/// How one migration run behaves
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub dry_run: bool,
    /// Skip the final confirmation and select every record
    pub assume_yes: bool,
    pub source_object: Option<String>,
    pub target_object: Option<String>,
    pub mapping_file: Option<PathBuf>,
    pub selection: Option<Selection>,
    pub batch_size: usize,
    pub log_dir: PathBuf,
    pub source_url: String,
    pub dashboard_url: String,
}

impl MigrationOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dry_run: false,
            assume_yes: false,
            source_object: None,
            target_object: None,
            mapping_file: None,
            selection: None,
            batch_size: config.batch_size,
            log_dir: config.log_dir.clone(),
            source_url: config.twenty_base_url.clone().unwrap_or_default(),
            dashboard_url: config.attio_dashboard_url.clone(),
        }
    }
}

/// Counts and artifacts of a finished run
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub source_object: String,
    pub target_object: String,
    pub dry_run: bool,
    pub selected: usize,
    pub batches: usize,
    pub success: usize,
    pub errors: usize,
    pub skipped: usize,
    pub success_rate: f64,
    pub artifacts: RunArtifacts,
}

#[derive(Debug, Clone)]
pub enum MigrationOutcome {
    Completed(MigrationReport),
    /// The user said no at the confirmation step
    Declined,
    NothingToMigrate,
}

/// Drives one migration run
pub struct Migrator<'a> {
    source: &'a dyn SourceCrm,
    destination: &'a dyn CrmApi,
    prompter: &'a dyn Prompter,
    options: MigrationOptions,
    stage: MigrationStage,
}

impl<'a> Migrator<'a> {
    pub fn new(
        source: &'a dyn SourceCrm,
        destination: &'a dyn CrmApi,
        prompter: &'a dyn Prompter,
        options: MigrationOptions,
    ) -> Self {
        Self {
            source,
            destination,
            prompter,
            options,
            stage: MigrationStage::Configured,
        }
    }

    pub fn stage(&self) -> MigrationStage {
        self.stage
    }

    fn advance(&mut self, to: MigrationStage) -> Result<()> {
        self.stage.advance(to)?;
        info!(stage = %to, "Migration stage reached");
        Ok(())
    }

    #[instrument(skip(self), fields(dry_run = self.options.dry_run))]
    pub async fn run(&mut self) -> Result<MigrationOutcome> {
        let started = Local::now();

        if self.options.batch_size == 0 {
            return Err(CrmError::Config("batch size must be at least 1".into()));
        }
        self.advance(MigrationStage::Validated)?;

        let (source_objects, attio_objects) = self.test_connections().await?;
        self.advance(MigrationStage::ConnectionTested)?;

        let source_object = self.pick_source_object(&source_objects)?;
        let target_object = self.pick_target_object(&source_object, &attio_objects)?;
        let records = self.extract_records(&source_object).await?;
        if records.is_empty() {
            println!("No {source_object} records found in {}.", self.source.service_name());
            return Ok(MigrationOutcome::NothingToMigrate);
        }
        println!();
        println!("{}", crate::summary::preview_table(&records, PREVIEW_ROWS));
        self.advance(MigrationStage::Previewed)?;

        let mapping = self.resolve_mapping(&source_object, &target_object, &records)?;
        let attributes = self.destination.list_attributes(&target_object).await?;
        mapping.validate(&attributes)?;
        println!("{}", crate::summary::mapping_table(&mapping));
        self.advance(MigrationStage::FieldsMapped)?;

        let chosen = self.resolve_selection(&records)?;
        let extracted = records.len();
        let selected = selection::apply(&chosen, records, self.prompter)?;
        if selected.is_empty() {
            println!("No records selected.");
            return Ok(MigrationOutcome::NothingToMigrate);
        }
        self.advance(MigrationStage::RecordsSelected)?;

        if !self.options.assume_yes {
            let verb = if self.options.dry_run { "Simulate migration" } else { "Migrate" };
            let question = format!(
                "{verb} {} {} records to Attio {}?",
                selected.len(),
                source_object,
                target_object
            );
            if !self.prompter.confirm(&question, false)? {
                println!("Migration cancelled.");
                return Ok(MigrationOutcome::Declined);
            }
        }
        self.advance(MigrationStage::Confirmed)?;

        let timestamp = started.format(RUN_TIMESTAMP_FORMAT).to_string();
        let mut logger = MigrationLogger::create(&self.options.log_dir, &timestamp)?;
        logger.save_mapping(&mapping)?;
        for _ in selected.len()..extracted {
            logger.log_skip();
        }
        self.advance(MigrationStage::Running)?;
        let batches = self
            .execute(&selected, &mapping, &attributes, &mut logger)
            .await?;

        let context = SummaryContext {
            source_url: self.options.source_url.clone(),
            dashboard_url: self.options.dashboard_url.clone(),
            source_object: source_object.clone(),
            target_object: target_object.clone(),
            batch_size: self.options.batch_size,
            dry_run: self.options.dry_run,
        };
        logger.finish(&context, started, Local::now())?;
        self.advance(MigrationStage::Summarized)?;

        Ok(MigrationOutcome::Completed(MigrationReport {
            source_object,
            target_object,
            dry_run: self.options.dry_run,
            selected: selected.len(),
            batches,
            success: logger.success_count(),
            errors: logger.error_count(),
            skipped: logger.skipped_count(),
            success_rate: logger.success_rate(),
            artifacts: logger.artifacts().clone(),
        }))
    }

    async fn test_connections(&self) -> Result<(Vec<String>, Vec<String>)> {
        println!("Testing connection to {}...", self.source.service_name());
        let source_objects = self.source.list_objects().await?;
        println!("  Connected ({} objects)", source_objects.len());
        println!("Testing connection to {}...", self.destination.service_name());
        let attio_objects: Vec<String> = self
            .destination
            .list_objects()
            .await?
            .into_iter()
            .map(|o| o.api_slug)
            .collect();
        println!("  Connected ({} objects)", attio_objects.len());
        Ok((source_objects, attio_objects))
    }

    fn pick_source_object(&self, available: &[String]) -> Result<String> {
        if let Some(object) = &self.options.source_object {
            return Ok(object.clone());
        }
        if available.is_empty() {
            return Err(CrmError::Validation("source exposes no objects".into()));
        }
        let default = available.iter().position(|o| o == PEOPLE).unwrap_or(0);
        let index = self
            .prompter
            .choose("Select source object to migrate", available, default)?;
        Ok(available[index].clone())
    }

    fn pick_target_object(&self, source_object: &str, attio_objects: &[String]) -> Result<String> {
        let target = match &self.options.target_object {
            Some(target) => target.clone(),
            None if self.options.assume_yes => source_object.to_string(),
            None => self
                .prompter
                .ask("Target Attio object", Some(source_object))?,
        };
        if !attio_objects.is_empty() && !attio_objects.contains(&target) {
            return Err(CrmError::Validation(format!(
                "Attio has no object '{target}' (available: {})",
                attio_objects.join(", ")
            )));
        }
        Ok(target)
    }

    /// Every record of `object`, flattened, following the source cursor.
    #[instrument(skip(self))]
    pub async fn extract_records(&self, object: &str) -> Result<Vec<FlatRecord>> {
        println!("Extracting {object} from {}...", self.source.service_name());
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .source
                .fetch_page(object, self.options.batch_size, cursor.as_deref())
                .await?;
            let fetched = page.records.len();
            records.extend(page.records.iter().map(flatten_record));
            println!("  Fetched {} records (Total: {})", fetched, records.len());
            match page.next_cursor {
                Some(next) if fetched > 0 && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next)
                }
                Some(_) if fetched > 0 => {
                    warn!("Source returned the same cursor twice, stopping extraction");
                    break;
                }
                _ => break,
            }
        }
        info!("Extracted {} {} records", records.len(), object);
        Ok(records)
    }

    fn resolve_mapping(
        &self,
        source_object: &str,
        target_object: &str,
        records: &[FlatRecord],
    ) -> Result<FieldMapping> {
        if let Some(path) = &self.options.mapping_file {
            println!("Using field mapping from {}", path.display());
            return FieldMapping::load(path, source_object, target_object);
        }
        if let Some(mapping) = FieldMapping::builtin(source_object, target_object) {
            println!("Using automatic mapping for {target_object}");
            return Ok(mapping);
        }
        self.prompt_mapping(source_object, target_object, records)
    }

    fn prompt_mapping(
        &self,
        source_object: &str,
        target_object: &str,
        records: &[FlatRecord],
    ) -> Result<FieldMapping> {
        let mut mapping = FieldMapping::new(source_object, target_object);
        let Some(first) = records.first() else {
            return Ok(mapping);
        };
        println!(
            "Map fields from {} ({} fields) to Attio ({}); answer '-' to skip a field",
            self.source.service_name(),
            first.len(),
            target_object
        );
        for field in first.keys() {
            if SOURCE_SYSTEM_FIELDS.contains(&field.as_str()) {
                continue;
            }
            let answer = self
                .prompter
                .ask(&format!("Map field {field} to Attio attribute"), Some(field))?;
            let answer = answer.trim();
            if answer.is_empty() || answer == "-" {
                continue;
            }
            mapping.fields.insert(field.clone(), answer.to_string());
        }
        Ok(mapping)
    }

    fn resolve_selection(&self, records: &[FlatRecord]) -> Result<Selection> {
        if let Some(selection) = &self.options.selection {
            return Ok(selection.clone());
        }
        if self.options.assume_yes {
            return Ok(Selection::All);
        }
        println!("Found {} records.", records.len());
        selection::choose(records, self.prompter)
    }

    /// Write `records` in batches; returns the number of batches.
    ///
    /// `attributes` describes the target object and picks each value's write
    /// shape. Validation failures and write errors become error rows and the run
    /// continues. Authentication errors abort after flushing the logs.
    pub async fn execute(
        &self,
        records: &[FlatRecord],
        mapping: &FieldMapping,
        attributes: &[AttributeInfo],
        logger: &mut MigrationLogger,
    ) -> Result<usize> {
        let target = mapping.target_object.as_str();
        let batch_size = self.options.batch_size.max(1);
        let total_batches = records.len().div_ceil(batch_size);
        let mut processed = 0;

        for (batch_index, batch) in records.chunks(batch_size).enumerate() {
            for record in batch {
                let id = id_text(record.get("id"));
                let values = match mapping.build_payload(record, attributes) {
                    Ok(values) => values,
                    Err(e) => {
                        logger.log_error(&id, &e.to_string(), &Value::Object(record.clone()))?;
                        continue;
                    }
                };
                let payload = json!({ "values": values });

                if self.options.dry_run {
                    logger.log_success(&id, "dry-run-id", &payload)?;
                    continue;
                }

                match self.write_record(target, &values).await {
                    Ok(attio_id) => logger.log_success(&id, &attio_id, &payload)?,
                    Err(e) if e.is_auth() => {
                        logger.log_error(&id, &e.to_string(), &payload)?;
                        logger.flush()?;
                        return Err(e);
                    }
                    Err(e) => {
                        error!("Failed to migrate {}: {}", id, e);
                        logger.log_error(&id, &e.to_string(), &payload)?;
                    }
                }
            }
            logger.flush()?;
            processed += batch.len();
            println!(
                "Batch {}/{}: processed {}/{} records",
                batch_index + 1,
                total_batches,
                processed,
                records.len()
            );
        }
        Ok(total_batches)
    }

    /// People with an email are upserted on it; everything else is created.
    async fn write_record(&self, target: &str, values: &Value) -> Result<String> {
        let has_email = values
            .get(ATTR_EMAIL_ADDRESSES)
            .and_then(Value::as_array)
            .map_or(false, |a| !a.is_empty());
        let id = if target == PEOPLE && has_email {
            self.destination
                .upsert_record(target, ATTR_EMAIL_ADDRESSES, values)
                .await?
        } else {
            self.destination.create_record(target, values).await?
        };
        Ok(id.map(|id| id.to_string()).unwrap_or_else(|| "upserted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::in_memory::{InMemoryCrm, InMemorySource};

    struct NoPrompts;

    impl Prompter for NoPrompts {
        fn confirm(&self, question: &str, _default: bool) -> Result<bool> {
            Err(CrmError::Prompt(format!("unexpected: {question}")))
        }

        fn ask(&self, question: &str, _default: Option<&str>) -> Result<String> {
            Err(CrmError::Prompt(format!("unexpected: {question}")))
        }

        fn choose(&self, question: &str, _choices: &[String], _default: usize) -> Result<usize> {
            Err(CrmError::Prompt(format!("unexpected: {question}")))
        }
    }

    fn options(dir: &std::path::Path) -> MigrationOptions {
        MigrationOptions {
            dry_run: false,
            assume_yes: true,
            source_object: Some("people".into()),
            target_object: None,
            mapping_file: None,
            selection: None,
            batch_size: 2,
            log_dir: dir.to_path_buf(),
            source_url: "http://twenty.local".into(),
            dashboard_url: "https://app.attio.com".into(),
        }
    }

    fn person(i: usize) -> Value {
        json!({
            "id": format!("tw-{i}"),
            "name": { "firstName": "Person", "lastName": i.to_string() },
            "emails": { "primaryEmail": format!("p{i}@example.com") }
        })
    }

    #[tokio::test]
    async fn test_run_reaches_summarized() {
        let dir = tempfile::tempdir().unwrap();
        let source = InMemorySource::new((0..3).map(person).collect());
        let crm = InMemoryCrm::new();
        let mut migrator = Migrator::new(&source, &crm, &NoPrompts, options(dir.path()));
        let outcome = migrator.run().await.unwrap();
        assert_eq!(migrator.stage(), MigrationStage::Summarized);
        let MigrationOutcome::Completed(report) = outcome else {
            panic!("expected a completed run");
        };
        assert_eq!(report.batches, 2);
        assert_eq!(report.success, 3);
        assert_eq!(crm.records("people").len(), 3);
        assert_eq!(crm.calls().upserts, 3);
        assert!(report.artifacts.mapping_log.exists());
        assert!(report.artifacts.summary_log.exists());
    }

    #[tokio::test]
    async fn test_empty_source_stops_before_preview() {
        let dir = tempfile::tempdir().unwrap();
        let source = InMemorySource::new(Vec::new());
        let crm = InMemoryCrm::new();
        let mut migrator = Migrator::new(&source, &crm, &NoPrompts, options(dir.path()));
        let outcome = migrator.run().await.unwrap();
        assert!(matches!(outcome, MigrationOutcome::NothingToMigrate));
        assert_eq!(migrator.stage(), MigrationStage::ConnectionTested);
    }

    #[tokio::test]
    async fn test_unknown_target_object_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = InMemorySource::new(vec![person(1)]);
        let crm = InMemoryCrm::new().with_object("companies");
        let mut opts = options(dir.path());
        opts.target_object = Some("deals".into());
        let err = Migrator::new(&source, &crm, &NoPrompts, opts).run().await.unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
    }

    #[tokio::test]
    async fn test_people_without_email_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let source = InMemorySource::new(vec![json!({
            "id": "tw-1",
            "name": { "firstName": "No", "lastName": "Email" },
            "emails": { "primaryEmail": "" }
        })]);
        let crm = InMemoryCrm::new();
        Migrator::new(&source, &crm, &NoPrompts, options(dir.path()))
            .run()
            .await
            .unwrap();
        assert_eq!(crm.calls().creates, 1);
        assert_eq!(crm.calls().upserts, 0);
    }
}
