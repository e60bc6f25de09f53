//
// registry.rs
// Dicom-Inference-Client
//
// Closed table of DICOM keywords that anonymization protocols may reference.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::HashMap;
use std::sync::OnceLock;

use dicom::core::Tag;

use crate::error::{Error, Result};

/// Attributes touched by de-identification profiles, keyed by their standard keyword.
const STANDARD_FIELDS: &[(&str, Tag)] = &[
    // Patient
    ("PatientName", Tag(0x0010, 0x0010)),
    ("PatientID", Tag(0x0010, 0x0020)),
    ("IssuerOfPatientID", Tag(0x0010, 0x0021)),
    ("PatientBirthDate", Tag(0x0010, 0x0030)),
    ("PatientBirthTime", Tag(0x0010, 0x0032)),
    ("PatientSex", Tag(0x0010, 0x0040)),
    ("OtherPatientIDs", Tag(0x0010, 0x1000)),
    ("OtherPatientNames", Tag(0x0010, 0x1001)),
    ("PatientAge", Tag(0x0010, 0x1010)),
    ("PatientSize", Tag(0x0010, 0x1020)),
    ("PatientWeight", Tag(0x0010, 0x1030)),
    ("PatientAddress", Tag(0x0010, 0x1040)),
    ("PatientComments", Tag(0x0010, 0x4000)),
    // Study
    ("StudyDate", Tag(0x0008, 0x0020)),
    ("SeriesDate", Tag(0x0008, 0x0021)),
    ("AcquisitionDate", Tag(0x0008, 0x0022)),
    ("ContentDate", Tag(0x0008, 0x0023)),
    ("AcquisitionDateTime", Tag(0x0008, 0x002A)),
    ("StudyTime", Tag(0x0008, 0x0030)),
    ("SeriesTime", Tag(0x0008, 0x0031)),
    ("AcquisitionTime", Tag(0x0008, 0x0032)),
    ("ContentTime", Tag(0x0008, 0x0033)),
    ("AccessionNumber", Tag(0x0008, 0x0050)),
    ("Modality", Tag(0x0008, 0x0060)),
    ("InstitutionName", Tag(0x0008, 0x0080)),
    ("InstitutionAddress", Tag(0x0008, 0x0081)),
    ("ReferringPhysicianName", Tag(0x0008, 0x0090)),
    ("StationName", Tag(0x0008, 0x1010)),
    ("StudyDescription", Tag(0x0008, 0x1030)),
    ("SeriesDescription", Tag(0x0008, 0x103E)),
    ("InstitutionalDepartmentName", Tag(0x0008, 0x1040)),
    ("PerformingPhysicianName", Tag(0x0008, 0x1050)),
    ("OperatorsName", Tag(0x0008, 0x1070)),
    ("StudyID", Tag(0x0020, 0x0010)),
    ("SeriesNumber", Tag(0x0020, 0x0011)),
    ("InstanceNumber", Tag(0x0020, 0x0013)),
    // Identifiers
    ("SOPClassUID", Tag(0x0008, 0x0016)),
    ("SOPInstanceUID", Tag(0x0008, 0x0018)),
    ("StudyInstanceUID", Tag(0x0020, 0x000D)),
    ("SeriesInstanceUID", Tag(0x0020, 0x000E)),
    ("FrameOfReferenceUID", Tag(0x0020, 0x0052)),
    ("DeviceSerialNumber", Tag(0x0018, 0x1000)),
    ("BodyPartExamined", Tag(0x0018, 0x0015)),
];

fn standard_table() -> &'static HashMap<String, Tag> {
    static TABLE: OnceLock<HashMap<String, Tag>> = OnceLock::new();
    TABLE.get_or_init(|| {
        STANDARD_FIELDS
            .iter()
            .map(|(name, tag)| (name.to_ascii_lowercase(), *tag))
            .collect()
    })
}

/// Resolves field keywords to tags. Lookups are ASCII case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    extra: HashMap<String, Tag>,
}

impl FieldRegistry {
    pub fn standard() -> Self {
        Self::default()
    }

    /// Register an additional keyword, e.g. a private attribute used by a site protocol.
    pub fn with_field(mut self, name: &str, tag: Tag) -> Self {
        self.extra.insert(name.to_ascii_lowercase(), tag);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<Tag> {
        let key = name.trim().to_ascii_lowercase();
        self.extra
            .get(&key)
            .or_else(|| standard_table().get(&key))
            .copied()
            .ok_or_else(|| Error::UnknownField(name.to_string()))
    }

    pub fn resolve_all<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Tag>> {
        names.iter().map(|n| self.resolve(n.as_ref())).collect()
    }

    /// Reverse lookup used for log and report output.
    pub fn keyword(&self, tag: Tag) -> Option<&'static str> {
        STANDARD_FIELDS
            .iter()
            .find(|(_, t)| *t == tag)
            .map(|(name, _)| *name)
    }
}
