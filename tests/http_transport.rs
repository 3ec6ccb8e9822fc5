//! End-to-end tests against an in-process HTTP server / 针对进程内HTTP服务器的端到端测试

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Router};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use bazaar_search::bazaar::{BazaarClient, Transport, API_KEY_HEADER};
use bazaar_search::config::AppConfig;
use bazaar_search::download::{DownloadOutcome, DownloadRequest};
use bazaar_search::error::TransportError;
use bazaar_search::messages::ErrorCode;
use bazaar_search::search::SearchOutcome;

const API_KEY: &str = "test-key";
const ARCHIVE: &[u8] = b"PK\x03\x04zipped-sample-bytes";

type Calls = Arc<Mutex<Vec<HashMap<String, String>>>>;

fn sample(hash: &str, tags: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "sha256_hash": hash,
        "file_name": format!("{}.exe", &hash[..8]),
        "file_type": "exe",
        "file_size": "2048",
        "signature": null,
        "first_seen": "2023-01-02 03:04:05",
        "tags": tags,
        "intelligence": {"downloads": "7", "uploads": "1"}
    })
}

fn hash(c: char) -> String {
    c.to_string().repeat(64)
}

async fn api(State(calls): State<Calls>, headers: HeaderMap, Form(form): Form<HashMap<String, String>>) -> Response {
    calls.lock().push(form.clone());

    if headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) != Some(API_KEY) {
        return (StatusCode::UNAUTHORIZED, "missing key").into_response();
    }

    let query = form.get("query").map(String::as_str).unwrap_or("");
    match query {
        "get_taginfo" => {
            let body = serde_json::json!({
                "query_status": "ok",
                "data": [sample(&hash('a'), &["emotet", "exe"]), sample(&hash('b'), &["emotet"])]
            });
            axum::Json(body).into_response()
        }
        "get_file_type" => {
            let body = serde_json::json!({
                "query_status": "ok",
                "data": [sample(&hash('b'), &["dll"]), sample(&hash('c'), &[])]
            });
            axum::Json(body).into_response()
        }
        "get_siginfo" => axum::Json(serde_json::json!({"query_status": "signature_not_found"})).into_response(),
        "get_info" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        "get_file" => match form.get("sha256_hash") {
            Some(h) if *h == hash('a') => ARCHIVE.to_vec().into_response(),
            _ => axum::Json(serde_json::json!({"query_status": "file_not_found"})).into_response(),
        },
        _ => axum::Json(serde_json::json!({"query_status": "illegal_query"})).into_response(),
    }
}

/// Start the fake API and return its endpoint / 启动模拟API并返回地址
async fn serve() -> (String, Calls) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/api/v1/", post(api))
        .with_state(calls.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/api/v1/", addr), calls)
}

fn test_config(endpoint: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.api.endpoint = endpoint.to_string();
    config.api.api_key = API_KEY.to_string();
    config.api.timeout_secs = 5;
    config.search.stagger_interval_ms = 200;
    config
}

fn client(endpoint: &str, key: &str) -> BazaarClient {
    BazaarClient::new(endpoint, key, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_post_form_sends_key_and_fields() {
    let (endpoint, calls) = serve().await;
    let client = client(&endpoint, API_KEY);

    let form = vec![
        ("query".to_string(), "get_taginfo".to_string()),
        ("tag".to_string(), "emotet".to_string()),
        ("limit".to_string(), "50".to_string()),
    ];
    let reply = client.post_form(&form).await.unwrap();
    assert!(reply.is_success());

    let parsed: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(parsed["query_status"], "ok");

    let calls = calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["tag"], "emotet");
    assert_eq!(calls[0]["limit"], "50");
}

#[tokio::test]
async fn test_wrong_key_is_http_error() {
    let (endpoint, _calls) = serve().await;
    let reply = client(&endpoint, "wrong").post_form(&vec![("query".to_string(), "get_taginfo".to_string())]).await.unwrap();
    assert_eq!(reply.status, 401);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_connection_error() {
    // 绑定后立即释放端口 / bind then drop so nothing is listening
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{}/", addr), API_KEY)
        .post_form(&vec![("query".to_string(), "get_info".to_string())])
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Connection(_)));
}

#[tokio::test]
async fn test_search_merges_and_dedups_over_http() {
    let (endpoint, calls) = serve().await;
    let config = test_config(&endpoint);
    let transport = bazaar_search::build_transport(&config).unwrap();
    let coordinator = bazaar_search::build_coordinator(&config, transport);

    let outcome = coordinator
        .search(&config.query_parser(), r#"tag:"emotet" file_type:"exe" limit:20"#)
        .await;

    let SearchOutcome::Completed(result) = outcome else {
        panic!("expected completed search");
    };
    let hashes: Vec<String> = result.records.iter().map(|r| r.sha256_hash.clone()).collect();
    assert_eq!(hashes, vec![hash('a'), hash('b'), hash('c')]);
    // 保留首次出现的记录 / first occurrence wins
    assert_eq!(result.records[1].tags, vec!["emotet".to_string()]);
    assert_eq!(result.records[0].downloads, 7);
    assert_eq!(result.records[0].signature, "");

    let display = result.display_records();
    assert_eq!(display[0].size, "2.0 kB");
    assert_eq!(display[0].tags, "emotet, exe");

    let calls = calls.lock();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|call| call.get("limit").map(String::as_str) == Some("20")));
}

#[tokio::test]
async fn test_search_http_failure_aborts_batch() {
    let (endpoint, _calls) = serve().await;
    let config = test_config(&endpoint);
    let transport = bazaar_search::build_transport(&config).unwrap();
    let coordinator = bazaar_search::build_coordinator(&config, transport);

    let hash_query = format!(r#"hash:"{}""#, hash('f'));
    let outcome = coordinator.search(&config.query_parser(), &hash_query).await;

    assert_eq!(outcome.error_code(), Some(ErrorCode::HttpError));
    let SearchOutcome::Failed(error) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(error.format_args(), vec!["500".to_string(), "Internal Server Error".to_string()]);
}

#[tokio::test]
async fn test_search_empty_status_is_reported() {
    let (endpoint, _calls) = serve().await;
    let config = test_config(&endpoint);
    let transport = bazaar_search::build_transport(&config).unwrap();
    let coordinator = bazaar_search::build_coordinator(&config, transport);

    let outcome = coordinator.search(&config.query_parser(), r#"signature:"Nobody""#).await;
    assert!(matches!(outcome, SearchOutcome::Completed(ref r) if r.is_empty()));
    assert_eq!(outcome.error_code(), Some(ErrorCode::NoResults));
}

#[tokio::test]
async fn test_download_streams_archive() {
    let (endpoint, calls) = serve().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&endpoint);
    config.download.dir = dir.path().join("malware").to_string_lossy().into_owned();

    let transport = bazaar_search::build_transport(&config).unwrap();
    let downloader = bazaar_search::build_downloader(&config, transport);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let outcome = downloader
        .download(
            &DownloadRequest::new(hash('a')),
            Some(Arc::new(move |p| sink.lock().push(p))),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let DownloadOutcome::Saved(path) = outcome else {
        panic!("expected saved file");
    };
    assert_eq!(path, dir.path().join("malware").join(format!("{}.zip", hash('a'))));
    assert_eq!(std::fs::read(&path).unwrap(), ARCHIVE);
    assert_eq!(seen.lock().last(), Some(&100));

    let calls = calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["query"], "get_file");
}

#[tokio::test]
async fn test_download_file_not_found() {
    let (endpoint, calls) = serve().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&endpoint);
    config.download.dir = dir.path().to_string_lossy().into_owned();

    let transport = bazaar_search::build_transport(&config).unwrap();
    let downloader = bazaar_search::build_downloader(&config, transport);

    let err = downloader
        .download(&DownloadRequest::new(hash('e')), None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::FileNotFound);
    assert!(!downloader.target_path(&hash('e')).exists());
    // 下载不重试 / downloads are never retried
    assert_eq!(calls.lock().len(), 1);
}
