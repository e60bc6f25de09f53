//
// protocol.rs
// Dicom-Inference-Client
//
// Turns a declarative "method -> keywords" document into a typed anonymization policy.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeMap;

use crate::error::Result;
use crate::policy::{AnonymizationPolicy, TransformMethod};
use crate::registry::FieldRegistry;

/// Parse a protocol mapping such as `{"HASH": ["StudyInstanceUID"], "KEEP": ["Modality"]}`.
///
/// Every method name and every keyword must resolve; an empty result is rejected so a blank
/// document can never silently disable anonymization.
pub fn parse_policy(
    protocol_id: Option<&str>,
    methods: &BTreeMap<String, Vec<String>>,
    registry: &FieldRegistry,
) -> Result<AnonymizationPolicy> {
    let mut rules = Vec::new();
    for (method_name, fields) in methods {
        let method: TransformMethod = method_name.parse()?;
        for field in fields {
            rules.push((registry.resolve(field)?, method));
        }
    }

    let policy = AnonymizationPolicy::new(protocol_id.map(str::to_string), rules)?;
    tracing::debug!(
        protocol_id = policy.protocol_id(),
        rules = policy.len(),
        "Parsed anonymization protocol"
    );
    Ok(policy)
}
