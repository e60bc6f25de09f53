use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use dicom::core::{Tag, VR};
use dicom::object::open_file;
use rand::Rng;
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::codec;
use crate::dicom_access::{ElementAccess, Record};
use crate::error::{Error, Result};
use crate::policy::{format_tag, AnonymizationPolicy, TransformMethod};

const SECONDS_PER_DAY: i64 = 86_400;
const MAX_DAY_SHIFT: i64 = 365;

/// Applies an [`AnonymizationPolicy`] to records.
///
/// Tags without a rule pass through untouched. Hashing is salted with the protocol id and is
/// stable across calls; date/time randomization is not.
#[derive(Debug, Clone)]
pub struct Anonymizer {
    policy: AnonymizationPolicy,
    suppressed: Vec<Tag>,
}

impl Anonymizer {
    pub fn new(policy: AnonymizationPolicy) -> Self {
        Self {
            policy,
            suppressed: Vec::new(),
        }
    }

    /// Remove these tags on the way out unless the policy has an explicit rule for them.
    pub fn with_suppressed(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.suppressed.extend(tags);
        self
    }

    /// Same policy, no suppression. Used when re-deriving hashes from reference records.
    pub fn without_suppression(&self) -> Self {
        Self::new(self.policy.clone())
    }

    pub fn policy(&self) -> &AnonymizationPolicy {
        &self.policy
    }

    pub fn protocol_id(&self) -> &str {
        self.policy.protocol_id()
    }

    pub fn anonymize(&self, record: &Record) -> Record {
        self.anonymize_with(record, &[])
    }

    /// Anonymize with per-call method overrides layered over the policy.
    pub fn anonymize_with(&self, record: &Record, overrides: &[(Tag, TransformMethod)]) -> Record {
        let mut copy = record.clone();
        self.apply(&mut copy, overrides);
        copy
    }

    /// Decode and anonymize a serialized record.
    pub fn anonymize_bytes(&self, bytes: &[u8]) -> Result<Record> {
        if bytes.is_empty() {
            return Err(Error::NullInput("empty record buffer".into()));
        }
        let record = codec::decode(bytes)?;
        Ok(self.anonymize(&record))
    }

    /// Records are independent, so the batch is processed in parallel. Output order matches input.
    pub fn anonymize_batch(&self, records: &[Record]) -> Vec<Record> {
        records.par_iter().map(|r| self.anonymize(r)).collect()
    }

    /// Rewrite `dataset` in place.
    pub fn apply(&self, dataset: &mut Record, overrides: &[(Tag, TransformMethod)]) {
        let mut rules: BTreeMap<Tag, TransformMethod> = self.policy.rules().collect();
        rules.extend(overrides.iter().copied());

        for tag in &self.suppressed {
            if !rules.contains_key(tag) {
                dataset.remove_element(*tag);
            }
        }

        for (tag, method) in rules {
            let Some(vr) = dataset.element_vr(tag) else {
                continue;
            };
            if !is_textual(vr) {
                tracing::warn!(tag = %format_tag(tag), ?vr, "Skipping non-textual element");
                continue;
            }
            let value = dataset.element_str(tag).unwrap_or_default();
            if value.is_empty() {
                continue;
            }

            let replacement = match method {
                TransformMethod::Keep => continue,
                TransformMethod::Hash => self.hash_value(tag, vr, &value),
                TransformMethod::RandomizeDateTime => randomize_date_time(vr, &value)
                    .unwrap_or_else(|| {
                        tracing::warn!(tag = %format_tag(tag), "Blanking unparseable date/time");
                        String::new()
                    }),
            };
            dataset.set_str(tag, vr, &replacement);
        }
    }

    /// Deterministic digest of one field value under this protocol.
    pub fn hash_value(&self, tag: Tag, vr: VR, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.policy.protocol_id().as_bytes());
        hasher.update([0u8]);
        hasher.update(format_tag(tag).as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
        let digest = hasher.finalize();

        if vr == VR::UI {
            // UIDs must stay numeric: use the UUID-derived 2.25 root.
            let mut head = [0u8; 16];
            head.copy_from_slice(&digest[..16]);
            format!("2.25.{}", u128::from_be_bytes(head))
        } else {
            hex::encode(digest)[..16].to_uppercase()
        }
    }
}

/// String-valued VRs. Binary numbers, bulk data and sequences cannot hold a digest.
fn is_textual(vr: VR) -> bool {
    matches!(
        vr,
        VR::AE
            | VR::AS
            | VR::CS
            | VR::DA
            | VR::DS
            | VR::DT
            | VR::IS
            | VR::LO
            | VR::LT
            | VR::PN
            | VR::SH
            | VR::ST
            | VR::TM
            | VR::UC
            | VR::UI
            | VR::UR
            | VR::UT
    )
}

fn random_day_shift<R: Rng>(rng: &mut R) -> i64 {
    let days = rng.gen_range(1..=MAX_DAY_SHIFT);
    if rng.gen_bool(0.5) {
        days
    } else {
        -days
    }
}

/// Perturb a DA, TM or DT value. Returns `None` when the value cannot be parsed.
pub fn randomize_date_time(vr: VR, value: &str) -> Option<String> {
    let mut rng = rand::thread_rng();
    let value = value.trim();

    match vr {
        VR::TM => {
            let time = parse_time(value)?;
            let shift = rng.gen_range(1..SECONDS_PER_DAY);
            let seconds = (time.num_seconds_from_midnight() as i64 + shift) % SECONDS_PER_DAY;
            let shifted = NaiveTime::from_num_seconds_from_midnight_opt(seconds as u32, 0)?;
            Some(shifted.format("%H%M%S").to_string())
        }
        VR::DT => {
            if let Some(head) = value.get(..14) {
                let dt = NaiveDateTime::parse_from_str(head, "%Y%m%d%H%M%S").ok()?;
                let shifted = dt
                    .checked_add_signed(Duration::days(random_day_shift(&mut rng)))?
                    .checked_add_signed(Duration::seconds(rng.gen_range(1..SECONDS_PER_DAY)))?;
                Some(shifted.format("%Y%m%d%H%M%S").to_string())
            } else {
                shift_date(value.get(..8)?, random_day_shift(&mut rng))
            }
        }
        _ => shift_date(value, random_day_shift(&mut rng)),
    }
}

fn shift_date(value: &str, days: i64) -> Option<String> {
    let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
    let shifted = date.checked_add_signed(Duration::days(days))?;
    Some(shifted.format("%Y%m%d").to_string())
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    // TM allows HH, HHMM, HHMMSS with an optional fraction.
    let whole = value.split('.').next()?;
    let padded = match whole.len() {
        2 => format!("{whole}0000"),
        4 => format!("{whole}00"),
        6 => whole.to_string(),
        _ => return None,
    };
    NaiveTime::parse_from_str(&padded, "%H%M%S").ok()
}

/// Anonymize a file on disk, defaulting the output to `*_anon.dcm` next to the input.
pub fn process_file(
    input: &Path,
    output: Option<PathBuf>,
    anonymizer: &Anonymizer,
) -> anyhow::Result<PathBuf> {
    let mut obj = open_file(input).context("Failed to open DICOM file")?; // Keep file meta so we can save later
    anonymizer.apply(&mut obj, &[]);

    let output_path = match output {
        Some(path) => path,
        None => {
            let stem = input
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Input path has no file name")?;
            input.with_file_name(format!("{}_anon.dcm", stem))
        }
    };

    obj.write_to_file(&output_path)
        .context("Failed to write anonymized file")?;
    tracing::info!(input = ?input, output = ?output_path, "Anonymized file written");

    Ok(output_path)
}
