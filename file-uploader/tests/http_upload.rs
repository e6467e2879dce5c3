//! End-to-end upload tests against a local multipart endpoint
//!
//! Each test starts an axum server on an ephemeral port and drives a real
//! `UploadController` with `ReqwestTransport` against it.

use axum::{
    extract::{Multipart, RawQuery, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use file_uploader::prelude::*;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// One multipart part as the server saw it
#[derive(Debug, Clone)]
struct ReceivedPart {
    field_name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

/// One request as the server saw it
#[derive(Debug, Clone, Default)]
struct ReceivedRequest {
    method: String,
    query: Option<String>,
    api_key: Option<String>,
    parts: Vec<ReceivedPart>,
}

#[derive(Clone, Default)]
struct Recorder {
    requests: Arc<Mutex<Vec<ReceivedRequest>>>,
}

async fn read_parts(mut multipart: Multipart) -> Vec<ReceivedPart> {
    let mut parts = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let field_name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.unwrap().to_vec();
        parts.push(ReceivedPart {
            field_name,
            file_name,
            content_type,
            data,
        });
    }
    parts
}

async fn store(
    State(recorder): State<Recorder>,
    method: axum::http::Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    let parts = read_parts(multipart).await;
    let stored = parts.len();
    recorder.requests.lock().push(ReceivedRequest {
        method: method.to_string(),
        query,
        api_key: headers
            .get("x-api-key")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        parts,
    });
    (StatusCode::CREATED, Json(json!({ "stored": stored })))
}

async fn disk_full(multipart: Multipart) -> (StatusCode, &'static str) {
    read_parts(multipart).await;
    (StatusCode::INTERNAL_SERVER_ERROR, "disk full")
}

async fn stall() -> StatusCode {
    tokio::time::sleep(Duration::from_secs(30)).await;
    StatusCode::OK
}

async fn spawn_server() -> (SocketAddr, Recorder) {
    let recorder = Recorder::default();
    let app = Router::new()
        .route("/upload", post(store).put(store))
        .route("/fail", post(disk_full))
        .route("/stall", post(stall))
        .with_state(recorder.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, recorder)
}

/// Observer that keeps every notification for later assertions
#[derive(Clone, Default)]
struct Recording {
    outcomes: Arc<Mutex<Vec<UploadOutcome>>>,
    batches: Arc<Mutex<Vec<Vec<UploadInfo>>>>,
}

impl UploadObserver for Recording {
    fn on_api_response(&mut self, outcome: &UploadOutcome) {
        self.outcomes.lock().push(outcome.clone());
    }

    fn on_all_done(&mut self, files: &[UploadInfo]) {
        self.batches.lock().push(files.to_vec());
    }
}

fn controller_for(config: UploadConfiguration, recording: &Recording) -> UploadController {
    let transport = Arc::new(ReqwestTransport::new().unwrap());
    UploadController::new(config, transport)
        .unwrap()
        .with_observer(recording.clone())
}

#[tokio::test]
async fn test_upload_memory_files_with_headers_and_params() {
    let (addr, recorder) = spawn_server().await;
    let config = UploadConfiguration::builder()
        .endpoint_url(format!("http://{addr}/upload"))
        .header("X-Api-Key", "secret")
        .query_param("folder", "inbox")
        .query_param("tag", vec!["a".to_string(), "b".to_string()])
        .multiple(true)
        .build()
        .unwrap();
    let recording = Recording::default();
    let mut controller = controller_for(config, &recording);

    controller
        .select_files(
            vec![
                CandidateFile::from_bytes("notes.txt", b"hello world".to_vec()),
                CandidateFile::from_bytes("pixel.png", vec![0x89, 0x50, 0x4E, 0x47]),
                CandidateFile::from_bytes("virus.exe", vec![0; 4]),
            ],
            SelectionSource::Drop,
        )
        .unwrap();
    assert_eq!(controller.view().rejected.len(), 1);

    controller.start_upload().unwrap();
    assert_eq!(controller.run_to_completion().await, SessionState::Succeeded);

    let requests = recorder.requests.lock().clone();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.api_key.as_deref(), Some("secret"));
    assert_eq!(request.query.as_deref(), Some("folder=inbox&tag=a&tag=b"));

    let names: Vec<&str> = request.parts.iter().map(|p| p.field_name.as_str()).collect();
    assert_eq!(names, vec!["file0", "file1"]);
    assert_eq!(request.parts[0].file_name.as_deref(), Some("notes.txt"));
    assert_eq!(request.parts[0].content_type.as_deref(), Some("text/plain"));
    assert_eq!(request.parts[0].data, b"hello world");
    assert_eq!(request.parts[1].content_type.as_deref(), Some("image/png"));

    let outcomes = recording.outcomes.lock();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status_code, Some(201));
    assert_eq!(outcomes[0].response, ResponseBody::Json(json!({ "stored": 2 })));

    let batches = recording.batches.lock();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
    assert!(batches[0].iter().all(|info| info.status == OutcomeStatus::Success));
}

#[tokio::test]
async fn test_upload_files_from_disk_with_captions() {
    let (addr, recorder) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("report.pdf");
    let notes = dir.path().join("notes.txt");
    // larger than one streaming chunk
    let report_bytes: Vec<u8> = (0..200_000u32)
        .map(|i| u8::try_from(i % 251).unwrap())
        .collect();
    std::fs::write(&report, &report_bytes).unwrap();
    std::fs::write(&notes, b"plain text").unwrap();

    let config = UploadConfiguration::builder()
        .endpoint_url(format!("http://{addr}/upload"))
        .http_method(HttpMethod::Put)
        .multiple(true)
        .use_indexed_field_names(false)
        .build()
        .unwrap();
    let recording = Recording::default();
    let mut controller = controller_for(config, &recording);

    controller
        .select_files(
            vec![
                CandidateFile::from_path(&report).unwrap(),
                CandidateFile::from_path(&notes).unwrap(),
            ],
            SelectionSource::Picker,
        )
        .unwrap();
    controller.set_caption(0, Some("quarterly".into())).unwrap();
    controller.start_upload().unwrap();
    assert_eq!(controller.run_to_completion().await, SessionState::Succeeded);

    let requests = recorder.requests.lock().clone();
    let request = &requests[0];
    assert_eq!(request.method, "PUT");
    assert_eq!(request.parts[0].field_name, "quarterly");
    assert_eq!(request.parts[0].data, report_bytes);
    assert_eq!(request.parts[1].field_name, "file");
    assert_eq!(request.parts[1].data, b"plain text");
}

#[tokio::test]
async fn test_server_error_fails_upload() {
    let (addr, _recorder) = spawn_server().await;
    let config = UploadConfiguration::builder()
        .endpoint_url(format!("http://{addr}/fail"))
        .build()
        .unwrap();
    let recording = Recording::default();
    let mut controller = controller_for(config, &recording);

    controller
        .select_files(
            vec![CandidateFile::from_bytes("a.txt", b"a".to_vec())],
            SelectionSource::Picker,
        )
        .unwrap();
    controller.start_upload().unwrap();

    assert_eq!(
        controller.run_to_completion().await,
        SessionState::Failed {
            message: "Upload Failed !".into()
        }
    );
    let outcomes = recording.outcomes.lock();
    assert_eq!(outcomes[0].status_code, Some(500));
    assert_eq!(outcomes[0].response, ResponseBody::Text("disk full".into()));
    assert_eq!(recording.batches.lock().len(), 1);
}

#[tokio::test]
async fn test_unreachable_endpoint_fails_upload() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = UploadConfiguration::builder()
        .endpoint_url(format!("http://{addr}/upload"))
        .build()
        .unwrap();
    let recording = Recording::default();
    let mut controller = controller_for(config, &recording);

    controller
        .select_files(
            vec![CandidateFile::from_bytes("a.txt", b"a".to_vec())],
            SelectionSource::Picker,
        )
        .unwrap();
    controller.start_upload().unwrap();

    assert!(matches!(
        controller.run_to_completion().await,
        SessionState::Failed { .. }
    ));
    let outcomes = recording.outcomes.lock();
    assert_eq!(outcomes[0].status_code, None);
    assert!(outcomes[0].error.is_some());
}

#[tokio::test]
async fn test_cancel_stalled_upload() {
    let (addr, _recorder) = spawn_server().await;
    let config = UploadConfiguration::builder()
        .endpoint_url(format!("http://{addr}/stall"))
        .build()
        .unwrap();
    let recording = Recording::default();
    let mut controller = controller_for(config, &recording);

    controller
        .select_files(
            vec![CandidateFile::from_bytes("a.txt", b"a".to_vec())],
            SelectionSource::Picker,
        )
        .unwrap();
    controller.start_upload().unwrap();

    let token = controller.cancellation_token().unwrap();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(token.cancel());
    });

    let state = tokio::time::timeout(Duration::from_secs(5), controller.run_to_completion())
        .await
        .expect("cancellation should end the upload promptly");
    assert_eq!(state, SessionState::Canceled);
    assert!(recording.outcomes.lock().is_empty());
    assert!(recording.batches.lock().is_empty());
}

#[tokio::test]
async fn test_transport_reports_progress_up_to_total() {
    let (addr, _recorder) = spawn_server().await;
    let transport = ReqwestTransport::new().unwrap().chunk_size(16);

    let request = file_uploader::transport::TransferRequest {
        url: format!("http://{addr}/upload").parse().unwrap(),
        method: HttpMethod::Post,
        headers: Default::default(),
        query_params: Default::default(),
        fields: vec![file_uploader::transport::MultipartField {
            field_name: "file0".into(),
            file_name: "data.txt".into(),
            content_type: "text/plain".into(),
            size_bytes: 100,
            source: FileSource::Memory(vec![b'x'; 100].into()),
        }],
        response_type: Some(ResponseType::Json),
    };

    let mut handle = transport.send(request).unwrap();
    let mut loaded_values = Vec::new();
    let mut terminal = None;
    while let Some(event) = handle.next_event().await {
        match event {
            TransferEvent::Progress { loaded, total } => {
                assert_eq!(total, 100);
                loaded_values.push(loaded);
            }
            other => terminal = Some(other),
        }
    }

    assert!(loaded_values.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(loaded_values.last(), Some(&100));
    assert!(matches!(
        terminal,
        Some(TransferEvent::Complete {
            status_code: 201,
            body: ResponseBody::Json(_)
        })
    ));
}
