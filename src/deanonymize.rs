//
// deanonymize.rs
// Dicom-Inference-Client
//
// Restores identifying attributes on a service result using the original records as reference.
//
// Thales Matheus Mendonça Santos - November 2025

use dicom::core::{Tag, VR};
use rayon::prelude::*;
use serde::Serialize;

use crate::anonymize::Anonymizer;
use crate::dicom_access::{ElementAccess, Record};
use crate::error::{Error, Result};
use crate::policy::{format_tag, TransformMethod};

/// Caller-supplied value that overrides anything the resolver derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserReplacement {
    pub tag: Tag,
    pub value: String,
    /// VR used when the result does not carry the element yet.
    pub vr: VR,
}

impl UserReplacement {
    pub fn new(tag: Tag, value: impl Into<String>) -> Self {
        Self {
            tag,
            value: value.into(),
            vr: VR::LO,
        }
    }

    pub fn with_vr(mut self, vr: VR) -> Self {
        self.vr = vr;
        self
    }
}

/// What happened to each field during restoration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestorationReport {
    pub restored_top_level: Vec<String>,
    pub restored_hashed: Vec<String>,
    pub unmatched: Vec<String>,
    pub replaced: Vec<String>,
}

impl RestorationReport {
    pub fn is_complete(&self) -> bool {
        self.unmatched.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Restoration {
    pub record: Record,
    pub report: RestorationReport,
}

/// Gathers the inputs for one restoration. Every input is required; `resolve` names the first
/// one that is missing.
///
/// Order of precedence on the same field, lowest first: top-level copy from the first reference,
/// hash matching against every reference, user replacements.
#[derive(Debug)]
pub struct Deanonymization<'a> {
    anonymizer: &'a Anonymizer,
    record: Option<Record>,
    references: Option<&'a [Record]>,
    top_level: Option<&'a [Tag]>,
    replacements: Option<&'a [UserReplacement]>,
}

impl<'a> Deanonymization<'a> {
    pub fn new(anonymizer: &'a Anonymizer) -> Self {
        Self {
            anonymizer,
            record: None,
            references: None,
            top_level: None,
            replacements: None,
        }
    }

    pub fn record(mut self, record: Record) -> Self {
        self.record = Some(record);
        self
    }

    pub fn references(mut self, references: &'a [Record]) -> Self {
        self.references = Some(references);
        self
    }

    pub fn top_level(mut self, tags: &'a [Tag]) -> Self {
        self.top_level = Some(tags);
        self
    }

    pub fn replacements(mut self, replacements: &'a [UserReplacement]) -> Self {
        self.replacements = Some(replacements);
        self
    }

    pub fn resolve(self) -> Result<Restoration> {
        let record = self.record.ok_or(Error::MissingArgument("record"))?;
        let references = self.references.ok_or(Error::MissingArgument("references"))?;
        let top_level = self.top_level.ok_or(Error::MissingArgument("top_level"))?;
        let replacements = self
            .replacements
            .ok_or(Error::MissingArgument("replacements"))?;

        deanonymize(record, references, top_level, replacements, self.anonymizer)
    }
}

/// Restore `record` against `references`, which must be the original records in the order they
/// were submitted.
pub fn deanonymize(
    mut record: Record,
    references: &[Record],
    top_level: &[Tag],
    replacements: &[UserReplacement],
    anonymizer: &Anonymizer,
) -> Result<Restoration> {
    let first = references.first().ok_or(Error::EmptyReferenceSet)?;
    let mut report = RestorationReport::default();

    // Hash matching must see the values the service returned, before any restore touches them.
    let hashed: Vec<(Tag, String)> = anonymizer
        .policy()
        .tags_with(TransformMethod::Hash)
        .into_iter()
        .filter_map(|tag| {
            record
                .element_str(tag)
                .filter(|v| !v.is_empty())
                .map(|v| (tag, v))
        })
        .collect();

    for tag in top_level {
        if record.copy_element_from(first, *tag) {
            report.restored_top_level.push(format_tag(*tag));
        } else {
            tracing::debug!(tag = %format_tag(*tag), "First reference lacks top-level field");
        }
    }

    if !hashed.is_empty() {
        // Each reference is re-transformed once and reused for every hashed field.
        let engine = anonymizer.without_suppression();
        let transformed: Vec<Record> = references.par_iter().map(|r| engine.anonymize(r)).collect();

        for (tag, value) in hashed {
            let matched = transformed
                .iter()
                .position(|t| t.element_str(tag).as_deref() == Some(value.as_str()));

            match matched {
                Some(idx) => {
                    record.copy_element_from(&references[idx], tag);
                    report.restored_hashed.push(format_tag(tag));
                }
                None => {
                    tracing::warn!(
                        tag = %format_tag(tag),
                        references = references.len(),
                        "No reference matches hashed value, leaving it in place"
                    );
                    report.unmatched.push(format_tag(tag));
                }
            }
        }
    }

    for replacement in replacements {
        record.set_str(replacement.tag, replacement.vr, &replacement.value);
        report.replaced.push(format_tag(replacement.tag));
    }

    tracing::info!(
        top_level = report.restored_top_level.len(),
        hashed = report.restored_hashed.len(),
        unmatched = report.unmatched.len(),
        replaced = report.replaced.len(),
        "Deanonymized result record"
    );

    Ok(Restoration { record, report })
}
