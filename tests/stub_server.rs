//! End-to-end tests against a live server on an ephemeral port.

use http_stub_server::{MockServer, TextConstraint, DIAGNOSTIC_HEADER};
use hyper::{Method, StatusCode};
use std::io::Write;
use std::time::{Duration, Instant};

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

#[tokio::test]
async fn url_constraint_rejects_then_accepts() {
    let server = MockServer::start().await.unwrap();
    let stub = server
        .stub(Method::POST, "/firsttest")
        .with_url_constraint(|url: &str| !url.contains("/blah/blah"))
        .returns("<Xml>ShouldntBeReturned</Xml>")
        .as_xml_content()
        .ok();

    let rejected = client()
        .post(format!("{}/firsttest/blah/blah", server.uri()))
        .body("<search>bar</search>")
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status().as_u16(), 404);

    let accepted = client()
        .post(format!("{}/firsttest", server.uri()))
        .body("<search>bar</search>")
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status().as_u16(), 200);
    assert_eq!(
        accepted.headers()["content-type"].to_str().unwrap(),
        "text/xml"
    );
    assert_eq!(accepted.text().await.unwrap(), "<Xml>ShouldntBeReturned</Xml>");

    assert_eq!(stub.request_count(), 1);
    assert_eq!(server.miss_count(), 1);
    server.shutdown().await;
}

#[tokio::test]
async fn body_constraint_selects_request() {
    let server = MockServer::start().await.unwrap();
    let stub = server
        .stub(Method::POST, "/firsttest")
        .with_body_constraint(|body: &str| body.contains("<search>bar</search>"))
        .returns("<found/>")
        .ok();

    let miss = client()
        .post(format!("{}/firsttest", server.uri()))
        .body("<search>foo</search>")
        .send()
        .await
        .unwrap();
    assert_eq!(miss.status().as_u16(), 404);

    let hit = client()
        .post(format!("{}/firsttest?source=test", server.uri()))
        .header("x-trace", "abc")
        .body("<search>bar</search>")
        .send()
        .await
        .unwrap();
    assert_eq!(hit.status().as_u16(), 200);
    assert_eq!(hit.text().await.unwrap(), "<found/>");

    let observed = stub.last_request().unwrap();
    assert_eq!(observed.body, "<search>bar</search>");
    assert_eq!(observed.header("x-trace"), Some("abc"));
    assert_eq!(observed.query.get("source").map(String::as_str), Some("test"));
    server.shutdown().await;
}

#[tokio::test]
async fn no_stubs_is_a_diagnostic_miss() {
    let server = MockServer::start().await.unwrap();

    let response = client()
        .get(format!("{}/nothing", server.uri()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    assert_eq!(
        response.headers()[DIAGNOSTIC_HEADER.as_str()].to_str().unwrap(),
        "No handler found to handle request"
    );
    assert_eq!(response.text().await.unwrap(), "");
    assert_eq!(server.miss_count(), 1);
    server.shutdown().await;
}

#[tokio::test]
async fn delayed_stub_does_not_block_others() {
    let server = MockServer::start().await.unwrap();
    server
        .stub(Method::GET, "/slow")
        .with_delay(Duration::from_millis(200))
        .returns("slow")
        .ok();
    server.stub(Method::GET, "/fast").returns("fast").ok();

    let client = client();
    let started = Instant::now();
    let slow = async {
        let response = client.get(format!("{}/slow", server.uri())).send().await.unwrap();
        let text = response.text().await.unwrap();
        (text, started.elapsed())
    };
    let fast = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let response = client.get(format!("{}/fast", server.uri())).send().await.unwrap();
        let text = response.text().await.unwrap();
        (text, started.elapsed())
    };

    let ((slow_text, slow_elapsed), (fast_text, fast_elapsed)) = tokio::join!(slow, fast);
    assert_eq!(slow_text, "slow");
    assert_eq!(fast_text, "fast");
    assert!(slow_elapsed >= Duration::from_millis(200));
    assert!(fast_elapsed < slow_elapsed);
    server.shutdown().await;
}

#[tokio::test]
async fn intentional_not_found_has_no_diagnostic() {
    let server = MockServer::start().await.unwrap();
    let stub = server.stub(Method::GET, "/gone").not_found();

    let response = client()
        .get(format!("{}/gone", server.uri()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), StatusCode::NOT_FOUND.as_u16());
    assert!(response.headers().get(DIAGNOSTIC_HEADER.as_str()).is_none());
    assert_eq!(stub.request_count(), 1);
    assert_eq!(server.miss_count(), 0);
    server.shutdown().await;
}

#[tokio::test]
async fn file_range_body_is_streamed() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"0123456789").unwrap();
    file.flush().unwrap();

    let server = MockServer::start().await.unwrap();
    server
        .stub(Method::GET, "/slice")
        .returns_file_range(file.path(), 2, 6)
        .unwrap()
        .as_content_type("application/octet-stream")
        .ok();

    for _ in 0..2 {
        let response = client()
            .get(format!("{}/slice", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.headers()["content-length"].to_str().unwrap(), "4");
        assert_eq!(response.bytes().await.unwrap().as_ref(), b"2345");
    }
    server.shutdown().await;
}

#[tokio::test]
async fn head_request_gets_headers_only() {
    let server = MockServer::start().await.unwrap();
    let stub = server.stub(Method::HEAD, "/doc").returns("hello world").ok();

    let response = client()
        .head(format!("{}/doc", server.uri()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.headers()["content-length"].to_str().unwrap(), "11");
    assert_eq!(response.bytes().await.unwrap().len(), 0);
    assert_eq!(stub.request_count(), 1);
    server.shutdown().await;
}

#[tokio::test]
async fn clear_handlers_resets_server() {
    let server = MockServer::start().await.unwrap();
    server
        .stub(Method::GET, "/items")
        .with_url_constraint(TextConstraint::Contains("page=1".into()))
        .returns("page one")
        .ok();

    let response = client()
        .get(format!("{}/items?page=2", server.uri()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    assert_eq!(server.miss_count(), 1);

    server.processor().clear_handlers();
    assert_eq!(server.miss_count(), 0);
    assert!(server.processor().get_all_requests().is_empty());

    let response = client()
        .get(format!("{}/items?page=1", server.uri()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    assert_eq!(server.miss_count(), 1);
    server.shutdown().await;
}
