//! Bulk fetcher against a mock HTTP source.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use roadwatch::config::FetchSettings;
use roadwatch::{ArtifactStore, Fetch, FetchError, HttpFetcher};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ─────────────────────── helpers ───────────────────────

fn fast_settings() -> FetchSettings {
    FetchSettings {
        max_attempts: 3,
        base_delay_ms: 10,
        connect_timeout_ms: 1_000,
        read_timeout_ms: 2_000,
        ..FetchSettings::default()
    }
}

fn fetcher(dir: &TempDir) -> (ArtifactStore, HttpFetcher) {
    let store = ArtifactStore::open(dir.path()).unwrap();
    let fetcher = HttpFetcher::new(store.clone(), fast_settings());
    (store, fetcher)
}

fn leftover_files(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).unwrap().count()
}

async fn read_request_head(socket: &mut TcpStream) {
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&chunk[..n]),
        }
    }
}

/// A bare TCP server that answers every request with `response` verbatim
/// and hangs up. Returns its base URL and a count of accepted connections.
async fn raw_server(response: &'static [u8]) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                read_request_head(&mut socket).await;
                let _ = socket.write_all(response).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{addr}"), accepted)
}

// ─────────────────────── tests ───────────────────────

#[tokio::test]
async fn test_download_persists_body_verbatim() {
    let server = MockServer::start().await;
    let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    Mock::given(method("GET"))
        .and(path("/radars.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (store, fetcher) = fetcher(&dir);
    let url = format!("{}/radars.csv", server.uri());

    fetcher.fetch(&url, Path::new("radars.csv")).await.unwrap();

    assert!(store.exists(Path::new("radars.csv")));
    assert_eq!(store.read(Path::new("radars.csv")).unwrap(), body);
    assert_eq!(leftover_files(&dir), 1);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.geojson"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (store, fetcher) = fetcher(&dir);
    let url = format!("{}/missing.geojson", server.uri());

    let err = fetcher
        .fetch(&url, Path::new("missing.geojson"))
        .await
        .unwrap_err();

    match err {
        FetchError::HttpStatus { status, url: failed } => {
            assert_eq!(status, 404);
            assert_eq!(failed, url);
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
    assert!(!store.exists(Path::new("missing.geojson")));
    assert_eq!(leftover_files(&dir), 0);
}

#[tokio::test]
async fn test_server_error_is_reported_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (_store, fetcher) = fetcher(&dir);

    let err = fetcher
        .fetch(&format!("{}/communes", server.uri()), Path::new("communes.geojson"))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::HttpStatus { status: 503, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_connection_refused_is_retried_with_backoff() {
    // Reserve a port, then free it so nothing listens there.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let dir = TempDir::new().unwrap();
    let (store, fetcher) = fetcher(&dir);
    let start = Instant::now();

    let err = fetcher
        .fetch(
            &format!("http://127.0.0.1:{port}/big.geojson"),
            Path::new("big.geojson"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Network(_)), "got {err:?}");
    assert!(err.is_retryable());
    // Two backoffs between three attempts: 10ms + 20ms.
    assert!(start.elapsed() >= Duration::from_millis(30));
    assert!(!store.exists(Path::new("big.geojson")));
    assert_eq!(leftover_files(&dir), 0);
}

#[tokio::test]
async fn test_stalled_source_times_out_and_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big.geojson"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let fetcher = HttpFetcher::new(
        store.clone(),
        FetchSettings {
            read_timeout_ms: 150,
            ..fast_settings()
        },
    );

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        fetcher.fetch(&format!("{}/big.geojson", server.uri()), Path::new("big.geojson")),
    )
    .await
    .expect("a stalled source must not block the fetch");

    let err = result.unwrap_err();
    assert!(matches!(err, FetchError::Network(_)), "got {err:?}");
    server.verify().await;
    assert!(!store.exists(Path::new("big.geojson")));
    assert_eq!(leftover_files(&dir), 0);
}

#[tokio::test]
async fn test_truncated_body_is_retried_and_discarded() {
    let (base, accepted) = raw_server(
        b"HTTP/1.1 200 OK\r\n\
          Content-Type: application/geo+json\r\n\
          Content-Length: 4096\r\n\
          \r\n\
          {\"type\":\"FeatureCollection\",\"features\":[",
    )
    .await;

    let dir = TempDir::new().unwrap();
    let (store, fetcher) = fetcher(&dir);

    let err = fetcher
        .fetch(&format!("{base}/big.geojson"), Path::new("big.geojson"))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Network(_)), "got {err:?}");
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
    assert!(!store.exists(Path::new("big.geojson")));
    assert_eq!(leftover_files(&dir), 0);
}

#[tokio::test]
async fn test_hang_up_uses_every_attempt() {
    let (base, accepted) = raw_server(b"").await;

    let dir = TempDir::new().unwrap();
    let (store, fetcher) = fetcher(&dir);

    let err = fetcher
        .fetch(&format!("{base}/radars.csv"), Path::new("radars.csv"))
        .await
        .unwrap_err();

    assert!(err.is_retryable(), "got {err:?}");
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
    assert!(!store.exists(Path::new("radars.csv")));
    assert_eq!(leftover_files(&dir), 0);
}
