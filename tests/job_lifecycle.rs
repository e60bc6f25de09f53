//
// job_lifecycle.rs
// Dicom-Inference-Client
//
// Drives the job client against an in-process mock inference service.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_inference_client::archive::{self, ArchiveEntry};
use dicom_inference_client::client::LICENSE_HEADER;
use dicom_inference_client::config::ServiceConfig;
use dicom_inference_client::dicom_access::ElementAccess;
use dicom_inference_client::retry::RetryConfig;
use dicom_inference_client::{
    codec, deanonymize, parse_policy, Anonymizer, Error, FieldRegistry, JobClient, JobHandle,
    JobOutcome, Record,
};
use secrecy::SecretString;

const LICENSE: &str = "test-license";
const PATIENT_NAME: Tag = Tag(0x0010, 0x0010);
const PATIENT_ID: Tag = Tag(0x0010, 0x0020);
const MODALITY: Tag = Tag(0x0008, 0x0060);
const SERIES_UID: Tag = Tag(0x0020, 0x000E);

#[derive(Clone)]
struct MockService {
    submit_status: u16,
    ping_status: u16,
    results: Arc<Mutex<VecDeque<(u16, Vec<u8>)>>>,
    uploads: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    licenses: Arc<Mutex<Vec<String>>>,
}

impl MockService {
    fn new() -> Self {
        Self {
            submit_status: 200,
            ping_status: 200,
            results: Arc::default(),
            uploads: Arc::default(),
            licenses: Arc::default(),
        }
    }

    fn queue_result(&self, status: u16, body: Vec<u8>) {
        self.results.lock().unwrap().push_back((status, body));
    }

    fn record_license(&self, headers: &HeaderMap) {
        let value = headers
            .get(LICENSE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.licenses.lock().unwrap().push(value);
    }
}

async fn start_job(
    State(state): State<MockService>,
    Path(model): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    state.record_license(&headers);
    let status = StatusCode::from_u16(state.submit_status).unwrap();
    if !status.is_success() {
        return (status, String::new());
    }
    state.uploads.lock().unwrap().push((model, body.to_vec()));
    (status, "job-1\n".to_string())
}

async fn job_results(
    State(state): State<MockService>,
    Path(_job): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Vec<u8>) {
    state.record_license(&headers);
    let next = state.results.lock().unwrap().pop_front();
    match next {
        Some((status, body)) => (StatusCode::from_u16(status).unwrap(), body),
        None => (StatusCode::NOT_FOUND, Vec::new()),
    }
}

async fn ping(State(state): State<MockService>, headers: HeaderMap) -> StatusCode {
    state.record_license(&headers);
    StatusCode::from_u16(state.ping_status).unwrap()
}

async fn spawn_service(state: MockService) -> String {
    let app = Router::new()
        .route("/v1/model/start/:model", post(start_job))
        .route("/v1/model/results/:job", get(job_results))
        .route("/v1/ping", get(ping))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock service");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{}", addr)
}

fn service_config(base_url: String, max_attempts: u32) -> ServiceConfig {
    ServiceConfig {
        base_url,
        license: SecretString::new(LICENSE.to_string()),
        timeout_seconds: 5,
        retry: RetryConfig {
            max_attempts,
            initial_delay_ms: 1,
            backoff_multiplier: 1.0,
            max_delay_ms: 5,
        },
    }
}

fn service_anonymizer() -> Anonymizer {
    let mut methods = BTreeMap::new();
    methods.insert("KEEP".to_string(), vec!["Modality".to_string()]);
    methods.insert(
        "HASH".to_string(),
        vec!["StudyInstanceUID".to_string(), "SeriesInstanceUID".to_string()],
    );
    let policy = parse_policy(Some("LIFECYCLE"), &methods, &FieldRegistry::standard())
        .expect("policy");
    Anonymizer::new(policy).with_suppressed([PATIENT_NAME, PATIENT_ID])
}

fn build_test_record(patient: &str, series: &str) -> Record {
    let mut obj = Record::new_empty();
    obj.put(DataElement::new(
        PATIENT_NAME,
        VR::PN,
        PrimitiveValue::from(format!("{}^Patient", patient)),
    ));
    obj.put(DataElement::new(PATIENT_ID, VR::LO, PrimitiveValue::from(patient)));
    obj.put(DataElement::new(MODALITY, VR::CS, PrimitiveValue::from("CT")));
    obj.put(DataElement::new(
        Tag(0x0020, 0x000D),
        VR::UI,
        PrimitiveValue::from("1.2.826.0.1.3680043.2.1125.77"),
    ));
    obj.put(DataElement::new(SERIES_UID, VR::UI, PrimitiveValue::from(series)));
    obj
}

fn result_archive(records: &[Record]) -> Vec<u8> {
    let entries: Vec<_> = records
        .iter()
        .enumerate()
        .map(|(i, r)| ArchiveEntry::new(format!("result_{}.dcm", i), codec::encode(r).unwrap()))
        .collect();
    archive::compress(&entries).unwrap()
}

#[tokio::test]
async fn submit_uploads_anonymized_channels_with_license() {
    let state = MockService::new();
    let base_url = spawn_service(state.clone()).await;
    let client = JobClient::new(&service_config(base_url, 1), service_anonymizer()).expect("client");

    let channels = vec![
        vec![build_test_record("Ann", "1.2.3.1"), build_test_record("Ann", "1.2.3.2")],
        vec![build_test_record("Ann", "1.2.3.3")],
    ];
    let submission = client.submit("lung-ct", &channels).await.expect("submit");

    assert_eq!(submission.handle, JobHandle::new("lung-ct", "job-1"));
    assert_eq!(submission.sent.len(), 3);
    assert!(submission.sent.iter().all(|r| !r.has_element(PATIENT_NAME)));

    let uploads = state.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, "lung-ct");
    let mut names: Vec<String> = archive::decompress(&uploads[0].1)
        .expect("uploaded archive")
        .into_iter()
        .map(|e| e.name)
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "channel_0/image_0.dcm",
            "channel_0/image_1.dcm",
            "channel_1/image_0.dcm"
        ]
    );
    assert_eq!(state.licenses.lock().unwrap().as_slice(), [LICENSE.to_string()]);
    client.shutdown();
}

#[tokio::test]
async fn empty_channel_is_rejected_before_upload() {
    let state = MockService::new();
    let base_url = spawn_service(state.clone()).await;
    let client = JobClient::new(&service_config(base_url, 1), service_anonymizer()).expect("client");

    let channels = vec![vec![build_test_record("Ann", "1.2.3.1")], Vec::new()];
    let err = client.submit("lung-ct", &channels).await.unwrap_err();
    assert!(matches!(err, Error::EmptyChannel(1)));
    assert!(state.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn rejected_submissions_surface_the_status() {
    let mut state = MockService::new();
    state.submit_status = 400;
    let base_url = spawn_service(state.clone()).await;
    let client = JobClient::new(&service_config(base_url, 1), service_anonymizer()).expect("client");
    let channels = vec![vec![build_test_record("Ann", "1.2.3.1")]];
    assert!(matches!(
        client.submit("lung-ct", &channels).await,
        Err(Error::InvalidRequest(_))
    ));

    let mut state = MockService::new();
    state.submit_status = 500;
    let base_url = spawn_service(state).await;
    let client = JobClient::new(&service_config(base_url, 1), service_anonymizer()).expect("client");
    match client.submit("lung-ct", &channels).await {
        Err(Error::ServiceError { status, reason }) => {
            assert_eq!(status, 500);
            assert_eq!(reason, "Internal Server Error");
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test]
async fn polling_moves_from_in_progress_to_complete() {
    let state = MockService::new();
    state.queue_result(202, b"Running".to_vec());
    let mut segmentation = Record::new_empty();
    segmentation.put(DataElement::new(MODALITY, VR::CS, PrimitiveValue::from("SEG")));
    state.queue_result(200, result_archive(&[segmentation]));

    let base_url = spawn_service(state).await;
    let client = JobClient::new(&service_config(base_url, 1), service_anonymizer()).expect("client");
    let handle = JobHandle::new("lung-ct", "job-1");

    match client.poll(&handle).await.expect("first poll") {
        JobOutcome::InProgress {
            progress_percent,
            message,
        } => {
            assert_eq!(progress_percent, 50);
            assert_eq!(message, "Running");
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let outcome = client.poll(&handle).await.expect("second poll");
    assert_eq!(outcome.progress_percent(), Some(100));
    match outcome {
        JobOutcome::Complete { record, .. } => {
            assert_eq!(record.element_str(MODALITY).as_deref(), Some("SEG"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn multi_entry_results_are_unsupported() {
    let state = MockService::new();
    let records = vec![build_test_record("A", "1.1"), build_test_record("B", "1.2")];
    state.queue_result(200, result_archive(&records));
    let base_url = spawn_service(state).await;
    let client = JobClient::new(&service_config(base_url, 1), service_anonymizer()).expect("client");

    let err = client.poll(&JobHandle::new("lung-ct", "job-1")).await.unwrap_err();
    match err {
        Error::UnsupportedPayload(reason) => assert!(reason.contains("found 2")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn unknown_job_names_job_and_model() {
    let base_url = spawn_service(MockService::new()).await;
    let client = JobClient::new(&service_config(base_url, 1), service_anonymizer()).expect("client");
    let handle = JobHandle::new("lung-ct", "missing-7");

    assert!(matches!(
        client.poll_outcome(&handle).await.expect("raw outcome"),
        JobOutcome::NotFound
    ));
    match client.poll(&handle).await {
        Err(Error::JobNotFound { job_id, model_id }) => {
            assert_eq!(job_id, "missing-7");
            assert_eq!(model_id, "lung-ct");
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test]
async fn transient_statuses_are_retried() {
    let state = MockService::new();
    state.queue_result(503, Vec::new());
    state.queue_result(202, b"Queued".to_vec());
    let base_url = spawn_service(state.clone()).await;
    let client = JobClient::new(&service_config(base_url, 2), service_anonymizer()).expect("client");

    let outcome = client.poll(&JobHandle::new("lung-ct", "job-1")).await.expect("poll");
    assert!(matches!(outcome, JobOutcome::InProgress { .. }));
    assert_eq!(state.licenses.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn exhausted_retries_report_a_transport_error() {
    let state = MockService::new();
    state.queue_result(503, Vec::new());
    let base_url = spawn_service(state).await;
    let client = JobClient::new(&service_config(base_url, 1), service_anonymizer()).expect("client");
    let handle = JobHandle::new("lung-ct", "job-1");

    match client.poll_outcome(&handle).await.expect("raw outcome") {
        JobOutcome::TransportError { reason } => assert_eq!(reason, "Service Unavailable"),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn ping_distinguishes_bad_credentials() {
    let base_url = spawn_service(MockService::new()).await;
    let client = JobClient::new(&service_config(base_url, 1), service_anonymizer()).expect("client");
    client.ping().await.expect("ping ok");

    let mut state = MockService::new();
    state.ping_status = 403;
    let base_url = spawn_service(state).await;
    let client = JobClient::new(&service_config(base_url, 1), service_anonymizer()).expect("client");
    assert!(matches!(client.ping().await, Err(Error::InvalidCredential)));

    let mut state = MockService::new();
    state.ping_status = 500;
    let base_url = spawn_service(state).await;
    let client = JobClient::new(&service_config(base_url, 1), service_anonymizer()).expect("client");
    assert!(matches!(client.ping().await, Err(Error::Transport(_))));
}

#[tokio::test]
async fn unreachable_service_is_a_transport_failure() {
    // Bind then drop a listener to get a port nothing is serving.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let client = JobClient::new(
        &service_config(format!("http://{}", addr), 1),
        service_anonymizer(),
    )
    .expect("client");
    let err = client.ping().await.unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(
        client.poll_outcome(&JobHandle::new("m", "j")).await,
        Ok(JobOutcome::TransportError { .. })
    ));
}

#[tokio::test]
async fn full_round_trip_restores_identity_on_the_result() {
    let state = MockService::new();
    let base_url = spawn_service(state.clone()).await;
    let anonymizer = service_anonymizer();
    let client = JobClient::new(&service_config(base_url, 1), anonymizer.clone()).expect("client");

    let originals = vec![
        build_test_record("Zed", "1.2.5.1"),
        build_test_record("Zed", "1.2.5.2"),
    ];
    let submission = client
        .submit("lung-ct", &[originals.clone()])
        .await
        .expect("submit");

    // The service answers with a derived object carrying the second input's series.
    let upload = state.uploads.lock().unwrap()[0].1.clone();
    let entry = archive::decompress(&upload)
        .expect("upload")
        .into_iter()
        .find(|e| e.name == "channel_0/image_1.dcm")
        .expect("second image");
    let sent = codec::decode(&entry.data).expect("decode upload");
    let mut derived = Record::new_empty();
    derived.copy_element_from(&sent, SERIES_UID);
    derived.put(DataElement::new(MODALITY, VR::CS, PrimitiveValue::from("SEG")));
    state.queue_result(202, Vec::new());
    state.queue_result(200, result_archive(&[derived]));

    let result = client
        .wait_for_result(&submission.handle, Duration::from_millis(5), 5)
        .await
        .expect("result");
    let restored = deanonymize(
        result,
        &originals,
        &[PATIENT_NAME, PATIENT_ID],
        &[],
        client.anonymizer(),
    )
    .expect("restore");

    assert_eq!(restored.record.element_str(SERIES_UID).as_deref(), Some("1.2.5.2"));
    assert_eq!(
        restored.record.element_str(PATIENT_NAME).as_deref(),
        Some("Zed^Patient")
    );
    assert_eq!(restored.record.element_str(PATIENT_ID).as_deref(), Some("Zed"));
    assert!(restored.report.is_complete());
    client.shutdown();
}
