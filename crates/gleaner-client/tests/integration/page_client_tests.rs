use gleaner_client::ReqwestPageClient;
use gleaner_core::error::AppError;
use gleaner_core::traits::PageClient;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEARCH: &str = "/api/v1/json/search/images";

fn search_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}{SEARCH}?q=safe&page=1&key=secret", server.uri())).unwrap()
}

#[tokio::test]
async fn returns_parsed_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SEARCH))
        .and(query_param("q", "safe"))
        .and(query_param("page", "1"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "images": [{"id": 1}],
            "total": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ReqwestPageClient::new().unwrap();
    let body = client.get_json(&search_url(&server)).await.unwrap();

    assert_eq!(body["total"], 1);
    assert_eq!(body["images"][0]["id"], 1);
}

#[tokio::test]
async fn too_many_requests_is_throttled_with_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SEARCH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
        .mount(&server)
        .await;

    let client = ReqwestPageClient::new().unwrap();
    let err = client.get_json(&search_url(&server)).await.unwrap_err();

    assert!(matches!(err, AppError::Throttled { retry_after_ms: 3000 }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn server_error_is_fetch_error_without_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SEARCH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = ReqwestPageClient::new().unwrap();
    let err = client.get_json(&search_url(&server)).await.unwrap_err();

    match err {
        AppError::Fetch { status, url } => {
            assert_eq!(status, 500);
            assert!(url.ends_with(SEARCH));
            assert!(!url.contains("secret"));
        }
        other => panic!("expected fetch error, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_is_serialization_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SEARCH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = ReqwestPageClient::new().unwrap();
    let err = client.get_json(&search_url(&server)).await.unwrap_err();

    assert!(matches!(err, AppError::SerializationError(_)));
}
