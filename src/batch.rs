use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::anonymize::{self, Anonymizer};

/// Outcome of a directory sweep.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Collect every `.dcm` file under `dir`, sorted for stable channel ordering.
pub fn collect_dicom_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "dcm"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Anonymize every DICOM file under `dir` into `output_dir`, in parallel.
pub fn process_directory(
    dir: &Path,
    output_dir: &Path,
    anonymizer: &Anonymizer,
) -> Result<BatchSummary> {
    std::fs::create_dir_all(output_dir).context("Failed to create output directory")?;
    let files = collect_dicom_files(dir);
    tracing::info!(directory = ?dir, files = files.len(), "Processing directory");

    let results: Vec<_> = files
        .par_iter()
        .map(|path| -> Result<PathBuf> {
            // Mirror the relative layout so same-named files in different folders do not collide.
            let relative = path.strip_prefix(dir).unwrap_or(path);
            let target = output_dir.join(relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            anonymize::process_file(path, Some(target), anonymizer)
        })
        .collect();

    let mut summary = BatchSummary::default();
    for (path, result) in files.into_iter().zip(results) {
        match result {
            Ok(written) => summary.written.push(written),
            Err(e) => {
                tracing::warn!(file = ?path, error = %e, "Failed to anonymize file");
                summary.failed.push((path, e.to_string()));
            }
        }
    }

    Ok(summary)
}
