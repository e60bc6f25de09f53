//
// cli.rs
// Dicom-Inference-Client
//
// Defines the CLI surface with Clap and dispatches user-selected commands to the corresponding modules.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use dicom::object::open_file;

use crate::anonymize::{self, Anonymizer};
use crate::batch;
use crate::client::JobClient;
use crate::codec;
use crate::config::AppConfig;
use crate::deanonymize::{Deanonymization, UserReplacement};
use crate::dicom_access::Record;
use crate::logging;
use crate::models::{JobHandle, JobOutcome};
use crate::registry::FieldRegistry;

/// Command-line interface glue code: defines the available verbs and dispatches to modules.
#[derive(Parser)]
#[command(name = "dicom-inference-client")]
#[command(about = "Anonymize DICOM studies, run remote inference, and restore identities", long_about = None)]
pub struct Cli {
    /// Client configuration (service endpoint, license, protocol)
    #[arg(short, long, global = true, default_value = "dicom-inference.toml")]
    pub config: PathBuf,

    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Anonymize a single DICOM file with the configured protocol
    Anonymize {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Anonymize every .dcm file under a directory
    Batch {
        #[arg(short, long)]
        directory: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Restore identifying fields on a result using the original files
    Deanonymize {
        result: PathBuf,
        /// Original files, in submission order (repeatable)
        #[arg(short, long = "reference", required = true)]
        references: Vec<PathBuf>,
        /// Keyword=Value override applied last (repeatable)
        #[arg(long = "replace")]
        replacements: Vec<String>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Submit one directory per channel to a model
    Submit {
        #[arg(short, long)]
        model: String,
        #[arg(required = true)]
        channels: Vec<PathBuf>,
        /// Wait for the result, restore it, and write it here
        #[arg(long)]
        wait: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        interval_secs: u64,
        #[arg(long, default_value_t = 360)]
        max_polls: usize,
    },
    /// Poll a job once
    Poll {
        #[arg(short, long)]
        model: String,
        job: String,
        /// Write the result here when the job is complete
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check that the service is reachable and the license is accepted
    Ping,
}

pub async fn run() -> anyhow::Result<()> {
    // Parse the raw CLI arguments once and dispatch to a subcommand handler.
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration {:?}", cli.config))?;
    let registry = FieldRegistry::standard();
    let anonymizer = service_anonymizer(&config, &registry)?;

    match cli.command {
        Commands::Anonymize { input, output } => {
            let written = anonymize::process_file(&input, output, &anonymizer)?;
            println!("Anonymized file saved to: {:?}", written);
        }
        Commands::Batch { directory, output } => {
            let summary = batch::process_directory(&directory, &output, &anonymizer)?;
            println!(
                "Processed {} file(s), {} failure(s)",
                summary.written.len() + summary.failed.len(),
                summary.failed.len()
            );
            for (path, error) in &summary.failed {
                eprintln!("Error in {:?}: {}", path, error);
            }
        }
        Commands::Deanonymize {
            result,
            references,
            replacements,
            output,
        } => {
            let result = read_record(&result)?;
            let references = references
                .iter()
                .map(|p| read_record(p))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let replacements = parse_replacements(&replacements, &registry)?;
            let top_level = config.top_level_fields(&registry)?;

            let restoration = Deanonymization::new(&anonymizer)
                .record(result)
                .references(&references)
                .top_level(&top_level)
                .replacements(&replacements)
                .resolve()?;
            write_record(&output, &restoration.record)?;
            println!("{}", serde_json::to_string_pretty(&restoration.report)?);
        }
        Commands::Submit {
            model,
            channels,
            wait,
            interval_secs,
            max_polls,
        } => {
            let channel_records = channels
                .iter()
                .map(|dir| read_channel(dir))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let client = JobClient::new(&config.service, anonymizer.clone())?;
            let submission = client.submit(&model, &channel_records).await?;
            println!("{}", serde_json::to_string_pretty(&submission.handle)?);

            if let Some(output) = wait {
                let record = client
                    .wait_for_result(
                        &submission.handle,
                        Duration::from_secs(interval_secs),
                        max_polls,
                    )
                    .await?;
                let references: Vec<Record> = channel_records.into_iter().flatten().collect();
                let top_level = config.top_level_fields(&registry)?;
                let restoration = Deanonymization::new(&anonymizer)
                    .record(record)
                    .references(&references)
                    .top_level(&top_level)
                    .replacements(&[])
                    .resolve()?;
                write_record(&output, &restoration.record)?;
                println!("{}", serde_json::to_string_pretty(&restoration.report)?);
            }
            client.shutdown();
        }
        Commands::Poll { model, job, output } => {
            let client = JobClient::new(&config.service, anonymizer)?;
            let handle = JobHandle::new(model, job);
            let outcome = client.poll(&handle).await?;
            println!("{}", serde_json::to_string_pretty(&outcome.summary(&handle))?);

            if let (Some(path), JobOutcome::Complete { record, .. }) =
                (output, &outcome)
            {
                write_record(&path, record)?;
                println!("Result saved to {:?}", path);
            }
            client.shutdown();
        }
        Commands::Ping => {
            let client = JobClient::new(&config.service, anonymizer)?;
            client.ping().await?;
            println!("Service reachable, license accepted");
            client.shutdown();
        }
    }

    Ok(())
}

/// The engine used for everything that leaves the machine: protocol rules plus suppression of
/// the top-level identity fields.
pub fn service_anonymizer(
    config: &AppConfig,
    registry: &FieldRegistry,
) -> anyhow::Result<Anonymizer> {
    let policy = config.policy(registry)?;
    let top_level = config.top_level_fields(registry)?;
    Ok(Anonymizer::new(policy).with_suppressed(top_level))
}

fn read_record(path: &Path) -> anyhow::Result<Record> {
    let obj = open_file(path).with_context(|| format!("Failed to open DICOM file {:?}", path))?;
    Ok(obj.into_inner())
}

fn read_channel(dir: &Path) -> anyhow::Result<Vec<Record>> {
    let files = batch::collect_dicom_files(dir);
    if files.is_empty() {
        bail!("No .dcm files found in {:?}", dir);
    }
    files.iter().map(|p| read_record(p)).collect()
}

fn write_record(path: &Path, record: &Record) -> anyhow::Result<()> {
    let bytes = codec::encode(record)?;
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {:?}", path))
}

fn parse_replacements(
    raw: &[String],
    registry: &FieldRegistry,
) -> anyhow::Result<Vec<UserReplacement>> {
    raw.iter()
        .map(|entry| {
            let (keyword, value) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("Replacement must be Keyword=Value, got {:?}", entry))?;
            let tag = registry.resolve(keyword)?;
            Ok(UserReplacement::new(tag, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::core::Tag;

    #[test]
    fn replacements_parse_keyword_value_pairs() {
        let parsed = parse_replacements(
            &["PatientID=NEW-1".to_string(), "StudyDescription=a=b".to_string()],
            &FieldRegistry::standard(),
        )
        .unwrap();
        assert_eq!(parsed[0].tag, Tag(0x0010, 0x0020));
        assert_eq!(parsed[0].value, "NEW-1");
        assert_eq!(parsed[1].value, "a=b");
    }

    #[test]
    fn malformed_replacements_are_rejected() {
        let registry = FieldRegistry::standard();
        assert!(parse_replacements(&["PatientID".to_string()], &registry).is_err());
        assert!(parse_replacements(&["Nope=1".to_string()], &registry).is_err());
    }
}
