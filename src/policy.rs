//
// policy.rs
// Dicom-Inference-Client
//
// Transform methods and the versioned set of per-tag rules that forms an anonymization protocol.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use dicom::core::Tag;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransformMethod {
    Keep,
    Hash,
    RandomizeDateTime,
}

impl TransformMethod {
    /// Name used in protocol documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformMethod::Keep => "KEEP",
            TransformMethod::Hash => "HASH",
            TransformMethod::RandomizeDateTime => "RANDOM",
        }
    }
}

impl fmt::Display for TransformMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransformMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KEEP" => Ok(TransformMethod::Keep),
            "HASH" => Ok(TransformMethod::Hash),
            "RANDOM" => Ok(TransformMethod::RandomizeDateTime),
            _ => Err(Error::InvalidMethod(s.to_string())),
        }
    }
}

/// One method per tag, pinned to a protocol id.
///
/// The protocol id is the contract between the outbound and inbound halves: hashes produced
/// under one id can only be matched again under the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymizationPolicy {
    protocol_id: String,
    rules: BTreeMap<Tag, TransformMethod>,
}

impl AnonymizationPolicy {
    /// Build a policy from already-resolved rules. Rejects an empty rule set and conflicting
    /// methods for the same tag.
    pub fn new<I>(protocol_id: Option<String>, rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Tag, TransformMethod)>,
    {
        let mut map = BTreeMap::new();
        for (tag, method) in rules {
            if let Some(previous) = map.insert(tag, method) {
                if previous != method {
                    return Err(Error::ConflictingMethod {
                        field: format_tag(tag),
                        first: previous,
                        second: method,
                    });
                }
            }
        }

        if map.is_empty() {
            return Err(Error::EmptyPolicy);
        }

        let protocol_id = match protocol_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id,
            None => fingerprint(&map),
        };

        Ok(Self {
            protocol_id,
            rules: map,
        })
    }

    pub fn protocol_id(&self) -> &str {
        &self.protocol_id
    }

    pub fn method_for(&self, tag: Tag) -> Option<TransformMethod> {
        self.rules.get(&tag).copied()
    }

    pub fn rules(&self) -> impl Iterator<Item = (Tag, TransformMethod)> + '_ {
        self.rules.iter().map(|(t, m)| (*t, *m))
    }

    pub fn tags_with(&self, method: TransformMethod) -> Vec<Tag> {
        self.rules
            .iter()
            .filter(|(_, m)| **m == method)
            .map(|(t, _)| *t)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Stable id derived from the rule set, so it changes whenever the transforms change.
fn fingerprint(rules: &BTreeMap<Tag, TransformMethod>) -> String {
    let mut hasher = Sha256::new();
    for (tag, method) in rules {
        hasher.update(format!("{}={};", format_tag(*tag), method).as_bytes());
    }
    hex::encode(hasher.finalize())[..16].to_uppercase()
}

pub(crate) fn format_tag(tag: Tag) -> String {
    format!("({:04X},{:04X})", tag.group(), tag.element())
}
