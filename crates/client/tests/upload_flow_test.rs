//! End-to-end tests for the upload flow against an in-process mock of the
//! recordings API.
//!
//! The mock plays the server's part of the protocol for real: it reassembles
//! chunks by offset, checks the digest, unwraps the data key with its private
//! key and decrypts the recording, so a passing test means the server could
//! have recovered the exact bytes that were uploaded.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use voxdrop_client::api_client::UserToken;
use voxdrop_client::config::ServerConfig;
use voxdrop_client::{run_job, ApiClient, JobOutcome, UploadJob, Uploader};

const USER_TOKEN: &str = "user-jwt-123";

fn server_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap())
}

// ─── Mock server ───────────────────────────────────────────

#[derive(Default)]
struct Behavior {
    max_chunk_size: Option<u64>,
    /// Issue this id instead of `up-<n>`.
    upload_id: Option<&'static str>,
    malformed_pem: bool,
    init_status: Option<u16>,
    /// Fail the first `n` chunk calls with the given status.
    chunk_failures: Option<(u16, usize)>,
    complete_status: Option<(u16, &'static str)>,
}

#[derive(Debug, Clone)]
struct ChunkRecord {
    upload_id: String,
    authorization: Option<String>,
    offset: u64,
    field: String,
    file_name: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct Recorded {
    key_auth: Vec<Option<String>>,
    init_auth: Vec<Option<String>>,
    init_bodies: Vec<Value>,
    chunks: Vec<ChunkRecord>,
    chunk_calls: usize,
    completes: Vec<(Option<String>, Value)>,
    recovered: Vec<Vec<u8>>,
    sessions: u32,
}

#[derive(Clone)]
struct MockServer {
    behavior: Arc<Behavior>,
    recorded: Arc<Mutex<Recorded>>,
}

impl MockServer {
    fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap()
    }
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap()
}

async fn public_key(State(server): State<MockServer>, headers: HeaderMap) -> Json<Value> {
    server.recorded().key_auth.push(authorization(&headers));
    let pem = if server.behavior.malformed_pem {
        "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n".to_string()
    } else {
        server_key()
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap()
    };
    Json(json!({
        "pem": pem,
        "kid": "test-kid-1",
        "alg": "RSA-OAEP-256",
        "enc": "A256GCM",
        "kty": "RSA",
    }))
}

async fn init(
    State(server): State<MockServer>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut recorded = server.recorded();
    recorded.init_auth.push(authorization(&headers));
    recorded.init_bodies.push(body);

    if let Some(code) = server.behavior.init_status {
        return (status(code), Json(json!({"error": "invalid metadata"}))).into_response();
    }

    recorded.sessions += 1;
    let n = recorded.sessions;
    let upload_id = match server.behavior.upload_id {
        Some(id) => id.to_string(),
        None => format!("up-{n}"),
    };
    let mut resp = json!({
        "upload_id": upload_id,
        "upload_token": format!("sess-{n}"),
        "crypto": {"alg": "RSA-OAEP-256", "enc": "A256GCM", "kid": "test-kid-1"},
    });
    if let Some(max) = server.behavior.max_chunk_size {
        resp["max_chunk_size"] = json!(max);
    }
    Json(resp).into_response()
}

async fn chunk(
    State(server): State<MockServer>,
    Path(upload_id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let offset = headers
        .get("x-upload-offset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(u64::MAX);

    let mut fields = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.unwrap().to_vec();
        fields.push((name, file_name, bytes));
    }

    let mut recorded = server.recorded();
    recorded.chunk_calls += 1;
    if let Some((code, n)) = server.behavior.chunk_failures {
        if recorded.chunk_calls <= n {
            return (status(code), "storage unavailable").into_response();
        }
    }

    for (field, file_name, bytes) in fields {
        recorded.chunks.push(ChunkRecord {
            upload_id: upload_id.clone(),
            authorization: authorization(&headers),
            offset,
            field,
            file_name,
            bytes,
        });
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn complete(
    State(server): State<MockServer>,
    Path(upload_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut recorded = server.recorded();
    recorded
        .completes
        .push((authorization(&headers), body.clone()));

    if let Some((code, message)) = server.behavior.complete_status {
        return (status(code), message).into_response();
    }

    let mut ciphertext = Vec::new();
    for c in recorded.chunks.iter().filter(|c| c.upload_id == upload_id) {
        if c.offset != ciphertext.len() as u64 {
            return (StatusCode::CONFLICT, "offset gap").into_response();
        }
        ciphertext.extend_from_slice(&c.bytes);
    }

    let expected = body["expected_sha256"].as_str().unwrap_or_default();
    if hex::encode(Sha256::digest(&ciphertext)) != expected {
        return (StatusCode::BAD_REQUEST, "sha256 mismatch").into_response();
    }

    let field = |name: &str| {
        URL_SAFE_NO_PAD
            .decode(body[name].as_str().unwrap_or_default())
            .unwrap_or_default()
    };
    let Ok(data_key) = server_key().decrypt(Oaep::new::<Sha256>(), &field("wrapped_key")) else {
        return (StatusCode::BAD_REQUEST, "unwrap failed").into_response();
    };
    let iv = field("iv");
    if iv.len() != 12 {
        return (StatusCode::BAD_REQUEST, "bad iv").into_response();
    }
    ciphertext.extend_from_slice(&field("tag"));

    let cipher = Aes256Gcm::new_from_slice(&data_key).unwrap();
    let Ok(plaintext) = cipher.decrypt(Nonce::from_slice(&iv), ciphertext.as_slice()) else {
        return (StatusCode::BAD_REQUEST, "tag mismatch").into_response();
    };
    recorded.recovered.push(plaintext);

    Json(json!({
        "status": "ACCEPTED",
        "snr": 27.5,
        "recording_id": format!("rec-{upload_id}"),
    }))
    .into_response()
}

async fn list(State(_server): State<MockServer>) -> Json<Value> {
    Json(json!({
        "recordings": [
            {"id": "rec-1", "created_at": "2026-03-01T10:00:00Z", "snr": 21.0,
             "status": "ACCEPTED", "filename": "take-1.wav"},
            {"id": "rec-2", "created_at": "2026-03-02T10:00:00Z", "snr": null,
             "status": "PENDING", "filename": null},
        ],
        "pagination": {"page": 1, "pages": 1, "per_page": 20, "total": 2,
                       "has_next": false, "has_prev": false},
    }))
}

/// Start the mock on an ephemeral port; returns its base URL.
async fn spawn_server(behavior: Behavior) -> (String, MockServer) {
    let server = MockServer {
        behavior: Arc::new(behavior),
        recorded: Arc::default(),
    };
    let app = Router::new()
        .route("/api/v1/crypto/public-key", get(public_key))
        .route("/api/v1/recordings", get(list))
        .route("/api/v1/recordings/init", post(init))
        .route("/api/v1/recordings/:upload_id/chunk", post(chunk))
        .route("/api/v1/recordings/:upload_id/complete", post(complete))
        .with_state(server.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api/v1/"), server)
}

// ─── Helpers ───────────────────────────────────────────────

fn uploader(base_url: &str) -> Uploader<ApiClient> {
    let api = ApiClient::with_client(
        reqwest::Client::new(),
        base_url,
        Some(UserToken::new(USER_TOKEN)),
    )
    .unwrap();
    Uploader::new(api)
}

fn recording(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

fn write_recording(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, data).unwrap();
    path
}

fn job(file_path: PathBuf) -> UploadJob {
    UploadJob {
        file_path,
        pseudonym: "p-042".into(),
        task_id: "sustained-vowel".into(),
        sample_rate: 16_000,
        channels: 1,
        length_seconds: 78.1,
        client_snr: 19.5,
    }
}

// ─── Successful uploads ────────────────────────────────────

#[tokio::test]
async fn test_full_upload_is_recoverable_by_server() {
    let (base_url, server) = spawn_server(Behavior {
        max_chunk_size: Some(1_048_576),
        ..Behavior::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let data = recording(2_500_000);
    let path = write_recording(&dir, "take-1.wav", &data);

    let outcome = run_job(&uploader(&base_url), &job(path)).await;

    assert_eq!(
        outcome,
        JobOutcome::Succeeded {
            status: "ACCEPTED".into(),
            snr: 27.5,
            recording_id: Some("rec-up-1".into()),
        }
    );

    let recorded = server.recorded();
    assert_eq!(recorded.recovered, vec![data]);

    let offsets: Vec<u64> = recorded.chunks.iter().map(|c| c.offset).collect();
    let lengths: Vec<usize> = recorded.chunks.iter().map(|c| c.bytes.len()).collect();
    assert_eq!(offsets, [0, 1_048_576, 2_097_152]);
    assert_eq!(lengths, [1_048_576, 1_048_576, 402_848]);

    let names: Vec<_> = recorded
        .chunks
        .iter()
        .map(|c| c.file_name.clone().unwrap_or_default())
        .collect();
    assert_eq!(names, ["part_000000.bin", "part_000001.bin", "part_000002.bin"]);
    assert!(recorded.chunks.iter().all(|c| c.field == "chunk"));

    let init = &recorded.init_bodies[0];
    assert_eq!(init["pseudonym"], "p-042");
    assert_eq!(init["task_id"], "sustained-vowel");
    assert_eq!(init["sample_rate"], 16_000);
    assert_eq!(init["channels"], 1);
    assert_eq!(init["length_seconds"], 78.1);
    assert_eq!(init["client_snr"], 19.5);

    let (_, complete) = &recorded.completes[0];
    assert_eq!(complete["alg"], "RSA-OAEP-256");
    assert_eq!(complete["enc"], "A256GCM");
    assert_eq!(complete["kid"], "test-kid-1");
    for field in ["wrapped_key", "iv", "tag"] {
        let value = complete[field].as_str().unwrap();
        assert!(!value.contains(['+', '/', '=']), "{field} is not url-safe: {value}");
    }
}

#[tokio::test]
async fn test_upload_id_with_reserved_characters() {
    let (base_url, server) = spawn_server(Behavior {
        upload_id: Some("2024/07?a#b%"),
        ..Behavior::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let data = recording(100_000);
    let path = write_recording(&dir, "take.wav", &data);

    let outcome = run_job(&uploader(&base_url), &job(path)).await;

    assert_eq!(
        outcome,
        JobOutcome::Succeeded {
            status: "ACCEPTED".into(),
            snr: 27.5,
            recording_id: Some("rec-2024/07?a#b%".into()),
        }
    );
    let recorded = server.recorded();
    assert!(!recorded.chunks.is_empty());
    assert!(recorded.chunks.iter().all(|c| c.upload_id == "2024/07?a#b%"));
    assert_eq!(recorded.recovered, vec![data]);
}

#[tokio::test]
async fn test_user_and_session_credentials_never_mix() {
    let (base_url, server) = spawn_server(Behavior::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_recording(&dir, "take.wav", &recording(300_000));

    let outcome = run_job(&uploader(&base_url), &job(path)).await;
    assert!(matches!(outcome, JobOutcome::Succeeded { .. }));

    let user = Some(format!("Bearer {USER_TOKEN}"));
    let session = Some("Bearer sess-1".to_string());
    let recorded = server.recorded();
    assert_eq!(recorded.key_auth, [user.clone()]);
    assert_eq!(recorded.init_auth, [user]);
    assert!(!recorded.chunks.is_empty());
    for chunk in &recorded.chunks {
        assert_eq!(chunk.authorization, session);
    }
    assert_eq!(recorded.completes[0].0, session);
}

#[tokio::test]
async fn test_default_segment_size_when_server_is_silent() {
    let (base_url, server) = spawn_server(Behavior::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_recording(&dir, "short.wav", &recording(1_500_000));

    let outcome = run_job(&uploader(&base_url), &job(path)).await;
    assert!(matches!(outcome, JobOutcome::Succeeded { .. }));

    let lengths: Vec<usize> = server.recorded().chunks.iter().map(|c| c.bytes.len()).collect();
    assert_eq!(lengths, [1_048_576, 451_424]);
}

#[tokio::test]
async fn test_tiny_announced_segment_size_is_floored() {
    let (base_url, server) = spawn_server(Behavior {
        max_chunk_size: Some(1_000),
        ..Behavior::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let data = recording(200_000);
    let path = write_recording(&dir, "take.wav", &data);

    let outcome = run_job(&uploader(&base_url), &job(path)).await;
    assert!(matches!(outcome, JobOutcome::Succeeded { .. }));

    let recorded = server.recorded();
    let lengths: Vec<usize> = recorded.chunks.iter().map(|c| c.bytes.len()).collect();
    assert_eq!(lengths, [65_536, 65_536, 65_536, 3_392]);
    assert_eq!(recorded.recovered, vec![data]);
}

#[tokio::test]
async fn test_upload_without_user_token() {
    let (base_url, server) = spawn_server(Behavior::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_recording(&dir, "take.wav", &recording(1_000));

    let config = ServerConfig {
        endpoint: base_url,
        ..ServerConfig::default()
    };
    let api = ApiClient::from_config(&config, None).unwrap();
    let outcome = run_job(&Uploader::new(api), &job(path)).await;
    assert!(matches!(outcome, JobOutcome::Succeeded { .. }));

    let recorded = server.recorded();
    assert_eq!(recorded.key_auth, [None]);
    assert_eq!(recorded.init_auth, [None]);
    assert_eq!(recorded.completes[0].0.as_deref(), Some("Bearer sess-1"));
}

#[tokio::test]
async fn test_concurrent_jobs_use_separate_sessions() {
    let (base_url, server) = spawn_server(Behavior::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let first = recording(120_000);
    let second: Vec<u8> = recording(90_000).into_iter().rev().collect();
    let a = job(write_recording(&dir, "a.wav", &first));
    let b = job(write_recording(&dir, "b.wav", &second));

    let uploader = Arc::new(uploader(&base_url));
    let (ua, ub) = (Arc::clone(&uploader), Arc::clone(&uploader));
    let ta = tokio::spawn(async move { run_job(&ua, &a).await });
    let tb = tokio::spawn(async move { run_job(&ub, &b).await });

    assert!(matches!(ta.await.unwrap(), JobOutcome::Succeeded { .. }));
    assert!(matches!(tb.await.unwrap(), JobOutcome::Succeeded { .. }));

    let recorded = server.recorded();
    assert_eq!(recorded.sessions, 2);
    assert_eq!(recorded.recovered.len(), 2);
    assert!(recorded.recovered.contains(&first));
    assert!(recorded.recovered.contains(&second));
}

// ─── Failure classification ────────────────────────────────

#[tokio::test]
async fn test_low_snr_rejection_is_terminal() {
    let (base_url, server) = spawn_server(Behavior {
        complete_status: Some((422, r#"{"error":"low_snr","snr":4.2}"#)),
        ..Behavior::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_recording(&dir, "noisy.wav", &recording(10_000));

    let outcome = run_job(&uploader(&base_url), &job(path)).await;

    assert_eq!(
        outcome,
        JobOutcome::Failed {
            reason: "recording rejected by server (low_snr)".into(),
            detail: Some(r#"{"error":"low_snr","snr":4.2}"#.into()),
        }
    );
    assert!(outcome.is_terminal());
    assert_eq!(server.recorded().completes.len(), 1);
}

#[tokio::test]
async fn test_chunk_server_error_requests_retry() {
    let (base_url, server) = spawn_server(Behavior {
        chunk_failures: Some((503, usize::MAX)),
        ..Behavior::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_recording(&dir, "take.wav", &recording(300_000));

    let outcome = run_job(&uploader(&base_url), &job(path)).await;

    assert_eq!(outcome, JobOutcome::Retry);
    let recorded = server.recorded();
    assert_eq!(recorded.chunk_calls, 1);
    assert!(recorded.completes.is_empty());
}

#[tokio::test]
async fn test_retry_starts_a_fresh_session() {
    let (base_url, server) = spawn_server(Behavior {
        chunk_failures: Some((500, 1)),
        ..Behavior::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let data = recording(50_000);
    let upload = job(write_recording(&dir, "take.wav", &data));
    let uploader = uploader(&base_url);

    assert_eq!(run_job(&uploader, &upload).await, JobOutcome::Retry);
    assert!(matches!(
        run_job(&uploader, &upload).await,
        JobOutcome::Succeeded { .. }
    ));

    let recorded = server.recorded();
    assert_eq!(recorded.sessions, 2);
    assert_eq!(recorded.key_auth.len(), 2);
    assert!(recorded.chunks.iter().all(|c| c.upload_id == "up-2"));
    assert_eq!(recorded.recovered, vec![data]);
}

#[tokio::test]
async fn test_init_client_error_is_terminal() {
    let (base_url, server) = spawn_server(Behavior {
        init_status: Some(400),
        ..Behavior::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_recording(&dir, "take.wav", &recording(1_000));

    let outcome = run_job(&uploader(&base_url), &job(path)).await;

    assert!(matches!(
        &outcome,
        JobOutcome::Failed { reason, .. } if reason == "client error 400"
    ));
    assert_eq!(server.recorded().chunk_calls, 0);
}

#[tokio::test]
async fn test_complete_server_error_requests_retry() {
    let (base_url, _server) = spawn_server(Behavior {
        complete_status: Some((500, "internal error")),
        ..Behavior::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_recording(&dir, "take.wav", &recording(1_000));

    let outcome = run_job(&uploader(&base_url), &job(path)).await;
    assert_eq!(outcome, JobOutcome::Retry);
    assert!(!outcome.is_terminal());
}

#[tokio::test]
async fn test_malformed_server_key_is_terminal() {
    let (base_url, server) = spawn_server(Behavior {
        malformed_pem: true,
        ..Behavior::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_recording(&dir, "take.wav", &recording(1_000));

    let outcome = run_job(&uploader(&base_url), &job(path)).await;

    assert!(matches!(outcome, JobOutcome::Failed { detail: None, .. }));
    assert!(server.recorded().init_bodies.is_empty());
}

#[tokio::test]
async fn test_missing_source_is_terminal_and_offline() {
    let (base_url, server) = spawn_server(Behavior::default()).await;
    let dir = tempfile::tempdir().unwrap();

    let outcome = run_job(&uploader(&base_url), &job(dir.path().join("gone.wav"))).await;

    assert!(matches!(
        &outcome,
        JobOutcome::Failed { reason, .. } if reason.contains("gone.wav")
    ));
    assert!(server.recorded().key_auth.is_empty());
}

#[tokio::test]
async fn test_unreachable_server_requests_retry() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dir = tempfile::tempdir().unwrap();
    let path = write_recording(&dir, "take.wav", &recording(1_000));

    let outcome = run_job(&uploader(&format!("http://{addr}/api/v1/")), &job(path)).await;
    assert_eq!(outcome, JobOutcome::Retry);
}

// ─── Listing ───────────────────────────────────────────────

#[tokio::test]
async fn test_list_recordings() {
    let (base_url, _server) = spawn_server(Behavior::default()).await;
    let api = ApiClient::with_client(
        reqwest::Client::new(),
        &base_url,
        Some(UserToken::new(USER_TOKEN)),
    )
    .unwrap();

    let listing = api.list_recordings().await.unwrap();
    assert_eq!(listing.recordings.len(), 2);
    assert_eq!(listing.recordings[0].snr, Some(21.0));
    assert_eq!(listing.recordings[1].snr, None);
    assert_eq!(listing.pagination.unwrap().total, 2);
}
