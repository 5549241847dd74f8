use std::time::Duration;

use gleaner_client::HttpPayloadFetcher;
use gleaner_client::payload::partial_path;
use gleaner_core::error::AppError;
use gleaner_core::traits::PayloadFetcher;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn streams_payload_to_target() {
    let server = MockServer::start().await;
    let payload = vec![7u8; 64 * 1024];
    Mock::given(method("GET"))
        .and(path("/img/1.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(payload.clone(), "image/png"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("1.png");
    let fetcher = HttpPayloadFetcher::new().unwrap();

    let written = fetcher
        .fetch_to_path(&format!("{}/img/1.png", server.uri()), &target)
        .await
        .unwrap();

    assert_eq!(written, payload.len() as u64);
    assert_eq!(std::fs::read(&target).unwrap(), payload);
    assert!(!partial_path(&target).exists());
}

#[tokio::test]
async fn http_failure_leaves_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/2.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("2.png");
    let fetcher = HttpPayloadFetcher::new().unwrap();

    let err = fetcher
        .fetch_to_path(&format!("{}/img/2.png", server.uri()), &target)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Fetch { status: 404, .. }));
    assert!(!err.is_retryable());
    assert!(!target.exists());
    assert!(!partial_path(&target).exists());
}

#[tokio::test]
async fn throttled_payload_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/3.png"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let fetcher = HttpPayloadFetcher::new().unwrap();

    let err = fetcher
        .fetch_to_path(
            &format!("{}/img/3.png", server.uri()),
            &dir.path().join("3.png"),
        )
        .await
        .unwrap_err();

    assert!(err.is_retryable());
}

/// Serve a single response whose body arrives in chunks, `gap` apart.
async fn drip_server(chunks: Vec<&'static [u8]>, gap: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }

        let len: usize = chunks.iter().map(|c| c.len()).sum();
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: video/webm\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n"
        );
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        for chunk in chunks {
            tokio::time::sleep(gap).await;
            if socket.write_all(chunk).await.is_err() {
                return;
            }
        }
    });

    format!("http://{addr}/slow.webm")
}

#[tokio::test]
async fn slow_body_completes_while_data_keeps_arriving() {
    // 5 chunks 300ms apart: longer overall than the 1s idle timeout.
    let url = drip_server(vec![&b"ab"[..]; 5], Duration::from_millis(300)).await;
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("slow.webm");
    let fetcher =
        HttpPayloadFetcher::with_timeouts(Duration::from_secs(1), Duration::from_secs(1)).unwrap();

    let written = fetcher.fetch_to_path(&url, &target).await.unwrap();

    assert_eq!(written, 10);
    assert_eq!(std::fs::read(&target).unwrap(), b"ababababab");
    assert!(!partial_path(&target).exists());
}

#[tokio::test]
async fn stalled_body_times_out_and_leaves_no_file() {
    let url = drip_server(vec![&b"ab"[..], &b"cd"[..]], Duration::from_secs(3)).await;
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("stalled.webm");
    let fetcher =
        HttpPayloadFetcher::with_timeouts(Duration::from_secs(1), Duration::from_millis(300))
            .unwrap();

    let err = fetcher.fetch_to_path(&url, &target).await.unwrap_err();

    assert!(err.is_retryable());
    assert!(!target.exists());
    assert!(!partial_path(&target).exists());
}

#[tokio::test]
async fn fetch_bytes_reports_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vi/abc/maxresdefault.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"jpg".to_vec(), "image/jpeg"))
        .mount(&server)
        .await;
    let fetcher = HttpPayloadFetcher::new().unwrap();

    let fetched = fetcher
        .fetch_bytes(&format!("{}/vi/abc/maxresdefault.jpg", server.uri()))
        .await
        .unwrap();
    assert_eq!(fetched.bytes, b"jpg");
    assert_eq!(fetched.content_type.as_deref(), Some("image/jpeg"));

    let err = fetcher
        .fetch_bytes(&format!("{}/vi/missing.jpg", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Fetch { status: 404, .. }));
}
