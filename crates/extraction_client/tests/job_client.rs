use std::sync::Arc;

use extraction_client::{ClientConfig, HttpBackend, JobClient, SubmitErrorKind};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> JobClient {
    let mut config = ClientConfig::default();
    config.backend.base_url = server.uri();
    let backend = HttpBackend::new(&config).expect("http backend");
    JobClient::new(Arc::new(backend))
}

#[tokio::test]
async fn accepted_submission_returns_async_handle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/demo/simple-try"))
        .and(body_partial_json(json!({
            "url": "https://example.com/article",
            "fingerprint_hash": "fp-123"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "job_id": "job-42", "status": "queued" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let handle = client_for(&server)
        .submit("https://example.com/article", "fp-123")
        .await
        .expect("submit");

    assert_eq!(handle.job_id(), "job-42");
    assert!(!handle.is_synchronous());
}

#[tokio::test]
async fn completed_submission_embeds_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/demo/simple-try"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "job-7",
            "status": "completed",
            "results": {
                "cleaned_html": "<p>clean</p>",
                "extracted_data": { "title": "Hello" }
            }
        })))
        .mount(&server)
        .await;

    let handle = client_for(&server)
        .submit("https://example.com/", "fp")
        .await
        .expect("submit");

    assert_eq!(handle.job_id(), "job-7");
    let result = handle.embedded_result().expect("embedded result");
    assert_eq!(result.cleaned_html.as_deref(), Some("<p>clean</p>"));
    assert_eq!(result.extracted_data, Some(json!({ "title": "Hello" })));
    assert!(!result.intelligent);
}

#[tokio::test]
async fn completed_submission_without_job_id_gets_local_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/demo/simple-try"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "results": { "raw_html": "<html></html>" }
        })))
        .mount(&server)
        .await;

    let handle = client_for(&server)
        .submit("https://example.com/", "fp")
        .await
        .expect("submit");

    assert!(handle.job_id().starts_with("local-"));
    assert!(handle.is_synchronous());
}

#[tokio::test]
async fn artifact_uris_are_resolved_against_base_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/demo/simple-try"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "job-9",
            "status": "completed",
            "results": {
                "cleaned_html_uri": "/artifacts/job-9/clean.html",
                "extracted_json_uri": "/artifacts/job-9/data.json"
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/artifacts/job-9/clean.html"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/html; charset=utf-8")
                .set_body_string("<p>from artifact</p>"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/artifacts/job-9/data.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"price": 12}"#))
        .mount(&server)
        .await;

    let handle = client_for(&server)
        .submit("https://example.com/", "fp")
        .await
        .expect("submit");

    let result = handle.embedded_result().expect("embedded result");
    assert_eq!(result.cleaned_html.as_deref(), Some("<p>from artifact</p>"));
    assert_eq!(result.extracted_data, Some(json!({ "price": 12 })));
}

#[tokio::test]
async fn error_status_carries_backend_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/demo/simple-try"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "detail": "scraper unavailable" })),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .submit("https://example.com/", "fp")
        .await
        .expect_err("server error");

    assert_eq!(err.kind, SubmitErrorKind::HttpStatus(500));
    assert_eq!(err.detail, "scraper unavailable");
}

#[tokio::test]
async fn body_without_job_id_or_results_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/demo/simple-try"))
        .respond_with(ResponseTemplate::new(200).set_body_string("definitely not json"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .submit("https://example.com/", "fp")
        .await
        .expect_err("malformed");
    assert_eq!(err.kind, SubmitErrorKind::MalformedBody);
}

#[tokio::test]
async fn invalid_urls_never_reach_the_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    for url in ["not a url", "ftp://example.com/file", "file:///etc/passwd"] {
        let err = client.submit(url, "fp").await.expect_err(url);
        assert_eq!(err.kind, SubmitErrorKind::InvalidUrl, "{url}");
    }
}
