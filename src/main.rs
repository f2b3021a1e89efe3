use anyhow::{Context, Result};
use attio_tools::app::duplicates::{DuplicateFinder, ObjectFilter};
use attio_tools::app::lookup::{self, NewPerson};
use attio_tools::app::merge_use_case::{MergeOptions, MergeUseCase};
use attio_tools::config::{
    mask_secret, Config, ENV_ATTIO_API_TOKEN, ENV_TWENTY_API_KEY, ENV_TWENTY_BASE_URL,
};
use attio_tools::constants::{ATTIO_QUERY_PAGE_SIZE, DUPLICATES_REPORT_FILE};
use attio_tools::infra::attio::AttioClient;
use attio_tools::infra::prompt::StdinPrompter;
use attio_tools::infra::retrying::{RetryingCrm, RetryingSource};
use attio_tools::infra::twenty::TwentyClient;
use attio_tools::pipeline::selection::Selection;
use attio_tools::pipeline::{MigrationOptions, MigrationOutcome, Migrator};
use attio_tools::{logging, summary};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, Instrument};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "attio-tools")]
#[command(about = "Attio CRM maintenance: duplicates, merging and migration from Twenty")]
#[command(version = "0.1.0")]
struct Cli {
    /// Env file to load before reading configuration
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the objects in the Attio workspace
    ListObjects,
    /// Scan People and Companies for duplicates and write a report
    FindDuplicates {
        #[arg(long, value_enum, default_value = "all")]
        object: ObjectFilter,
        /// Report file
        #[arg(long, default_value = DUPLICATES_REPORT_FILE)]
        output: PathBuf,
    },
    /// Merge records with the same name into the oldest one
    MergeDuplicates {
        #[arg(long, value_enum, default_value = "companies")]
        object: ObjectFilter,
        /// Do not ask before deleting
        #[arg(long)]
        yes: bool,
        /// Only print what would be merged
        #[arg(long)]
        dry_run: bool,
    },
    /// Migrate records from Twenty CRM into Attio
    Migrate {
        /// Run every step but do not write to Attio
        #[arg(long)]
        dry_run: bool,
        /// Source object in Twenty (e.g. people)
        #[arg(long)]
        object: Option<String>,
        /// Target object in Attio; defaults to the source object
        #[arg(long)]
        target: Option<String>,
        /// Skip confirmation prompts and migrate every record
        #[arg(long)]
        yes: bool,
        /// JSON field mapping file
        #[arg(long)]
        mapping: Option<PathBuf>,
        /// Only migrate records where field=value
        #[arg(long)]
        filter: Option<String>,
    },
    /// Print one Attio record as JSON
    InspectRecord { object: String, record_id: String },
    /// Find people by email address
    FindPerson { email: String },
    /// Create a person, or update the one with the same email
    CreatePerson {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        job_title: Option<String>,
        #[arg(long)]
        linkedin: Option<String>,
    },
}

fn attio(config: &Config) -> Result<RetryingCrm<AttioClient>> {
    let client = AttioClient::from_config(config).context("Could not create the Attio client")?;
    Ok(RetryingCrm::new(client, config.retry_policy()))
}

fn print_migration_config(config: &Config) {
    let shown = |value: &Option<String>, secret: bool| match value {
        Some(v) if secret => mask_secret(v),
        Some(v) => v.clone(),
        None => "(not set)".to_string(),
    };
    println!("Configuration:");
    println!("   {}: {}", ENV_TWENTY_BASE_URL, shown(&config.twenty_base_url, false));
    println!("   {}: {}", ENV_TWENTY_API_KEY, shown(&config.twenty_api_key, true));
    println!("   {}: {}", ENV_ATTIO_API_TOKEN, shown(&config.attio_api_token, true));
    println!("   Batch size: {}", config.batch_size);
    println!("   Max retries: {}", config.max_retries);
    println!("   Log dir: {}", config.log_dir.display());
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.env_file)?;
    let _log_guard = logging::init_logging(&config.log_dir);

    if let Err(e) = run(cli.command, &config).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::ListObjects => {
            let api = attio(config)?;
            let objects = lookup::list_objects(&api).await?;
            println!("{}", summary::objects_table(&objects));
            println!("{} objects", objects.len());
        }
        Commands::FindDuplicates { object, output } => {
            let api = attio(config)?;
            println!("🔍 Scanning Attio for duplicates...");
            let report = DuplicateFinder::new(&api, ATTIO_QUERY_PAGE_SIZE)
                .find(object)
                .await?;
            report
                .write_to(&output)
                .with_context(|| format!("Could not write {}", output.display()))?;
            println!("{}", summary::duplicates_table(&report));
            println!("✅ Report written to {}", output.display());
        }
        Commands::MergeDuplicates {
            object,
            yes,
            dry_run,
        } => {
            let api = attio(config)?;
            if dry_run {
                println!("DRY RUN: nothing will be deleted or updated");
            } else {
                println!("⚠️  WARNING: merging deletes records permanently!");
            }
            let options = MergeOptions {
                assume_yes: yes,
                dry_run,
                ..MergeOptions::default()
            };
            let merged = MergeUseCase::new(&api, &StdinPrompter, options)
                .run(object)
                .await?;
            println!();
            println!("{}", summary::merge_table(&merged));
            println!(
                "Merged {} groups, deleted {} records, {} failures",
                merged.merged(),
                merged.deleted(),
                merged.failed()
            );
            if merged.failed() > 0 {
                error!("{} merge groups failed; re-run find-duplicates to review", merged.failed());
            }
        }
        Commands::Migrate {
            dry_run,
            object,
            target,
            yes,
            mapping,
            filter,
        } => {
            let run_id = Uuid::new_v4();
            let span = tracing::info_span!("migration", run_id = %run_id, dry_run);

            println!("🚚 CRM Migration: Twenty → Attio");
            if dry_run {
                println!("DRY RUN: no data will be written to Attio");
            }
            print_migration_config(config);
            config.validate_migration()?;

            let source = RetryingSource::new(TwentyClient::from_config(config)?, config.retry_policy());
            let destination = attio(config)?;
            let selection = filter.as_deref().map(Selection::parse_filter).transpose()?;
            let options = MigrationOptions {
                dry_run,
                assume_yes: yes,
                source_object: object,
                target_object: target,
                mapping_file: mapping,
                selection,
                ..MigrationOptions::from_config(config)
            };
            info!(%run_id, "Starting migration run");
            let mut migrator = Migrator::new(&source, &destination, &StdinPrompter, options);
            match migrator.run().instrument(span).await? {
                MigrationOutcome::Completed(report) => {
                    println!();
                    println!("{}", summary::migration_table(&report));
                    println!("📄 Success log: {}", report.artifacts.success_log.display());
                    println!("📄 Error log: {}", report.artifacts.error_log.display());
                    println!("📄 Summary: {}", report.artifacts.summary_log.display());
                    if !report.dry_run {
                        println!(
                            "🔗 Review the records in Attio: {}/{}",
                            config.attio_dashboard_url.trim_end_matches('/'),
                            report.target_object
                        );
                    }
                }
                MigrationOutcome::Declined => println!("Nothing was migrated."),
                MigrationOutcome::NothingToMigrate => println!("Nothing to migrate."),
            }
        }
        Commands::InspectRecord { object, record_id } => {
            let api = attio(config)?;
            let record = lookup::inspect_record(&api, &object, &record_id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::FindPerson { email } => {
            let api = attio(config)?;
            let people = lookup::find_person(&api, &email).await?;
            if people.is_empty() {
                println!("No people found with email {email}");
            } else {
                println!("{}", summary::records_table(&people));
            }
        }
        Commands::CreatePerson {
            name,
            email,
            job_title,
            linkedin,
        } => {
            let api = attio(config)?;
            let person = NewPerson {
                name,
                email,
                job_title,
                linkedin,
            };
            match lookup::create_person(&api, &person).await? {
                Some(id) => println!("✅ Person saved with id {id}"),
                None => println!("✅ Person saved"),
            }
        }
    }

    Ok(())
}
