//
// lib.rs
// Dicom-Inference-Client
//
// Exposes the crate's modules and re-exports the main types for both binary and library consumers.
//
// Thales Matheus Mendonça Santos - November 2025

// Outbound: protocol -> policy -> anonymize -> archive -> client.
// Inbound: client -> codec -> deanonymize.
pub mod anonymize;
pub mod archive;
pub mod batch;
pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod deanonymize;
pub mod dicom_access;
pub mod error;
pub mod logging;
pub mod models;
pub mod policy;
pub mod protocol;
pub mod registry;
pub mod retry;

pub use anonymize::Anonymizer;
pub use cli::{run as run_cli, Cli, Commands};
pub use client::JobClient;
pub use deanonymize::{deanonymize, Deanonymization, Restoration, UserReplacement};
pub use dicom_access::Record;
pub use error::{Error, ErrorKind, Result};
pub use models::{JobHandle, JobOutcome, Submission};
pub use policy::{AnonymizationPolicy, TransformMethod};
pub use protocol::parse_policy;
pub use registry::FieldRegistry;
