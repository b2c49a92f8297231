//! # HTTP Pass-Through Integration Tests
//!
//! Requests the cache does not handle must reach upstream unchanged and their
//! responses must come back unchanged.

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Method, Request, StatusCode};
use graphcl::caching::{InMemoryQueryStore, QueryStore};
use graphcl::{GatewayServer, ProxyConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{body_string, header as header_matcher, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_server(endpoint: &str) -> (GatewayServer, Arc<InMemoryQueryStore>) {
    let config = ProxyConfig::new(Url::parse(endpoint).unwrap());
    let store = Arc::new(InMemoryQueryStore::new());
    let server = GatewayServer::with_store(config, store.clone()).unwrap();
    (server, store)
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_mutation_is_forwarded_and_not_registered() {
    let mutation = r#"{"query":"mutation { createUser(name: \"Ada\") { id } }"}"#;

    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string(mutation))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"data":{"createUser":{"id":"7"}}}"#),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let (server, store) = create_server(&format!("{}/graphql", upstream.uri()));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(mutation))
        .unwrap();
    let response = server.app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_text(response).await,
        r#"{"data":{"createUser":{"id":"7"}}}"#
    );
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_body_without_query_is_forwarded() {
    let body = r#"{"operationName":"Users","variables":{}}"#;

    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string(body))
        .respond_with(ResponseTemplate::new(400).set_body_string("missing query"))
        .expect(1)
        .mount(&upstream)
        .await;

    let (server, store) = create_server(&format!("{}/graphql", upstream.uri()));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = server.app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "missing query");
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_non_json_post_is_forwarded() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header_matcher("content-type", "text/plain"))
        .and(body_string("query { User { id } }"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&upstream)
        .await;

    let (server, store) = create_server(&format!("{}/graphql", upstream.uri()));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("query { User { id } }"))
        .unwrap();
    let response = server.app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_get_is_forwarded_with_path_and_query() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/graphql/users"))
        .and(query_param("id", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-upstream", "yes")
                .set_body_string("user 1"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let (server, _store) = create_server(&format!("{}/graphql", upstream.uri()));

    let request = Request::builder()
        .uri("/users?id=1")
        .body(Body::empty())
        .unwrap();
    let response = server.app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-upstream"], "yes");
    assert_eq!(body_text(response).await, "user 1");
}

#[tokio::test]
async fn test_forwarded_for_carries_client_address() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header_matcher("x-forwarded-for", "10.1.2.3"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&upstream)
        .await;

    let (server, _store) = create_server(&format!("{}/graphql", upstream.uri()));

    let client: SocketAddr = "10.1.2.3:40000".parse().unwrap();
    let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
    request.extensions_mut().insert(ConnectInfo(client));

    let response = server.app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_upstream_redirect_is_relayed() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/elsewhere"))
        .mount(&upstream)
        .await;

    let (server, _store) = create_server(&format!("{}/graphql", upstream.uri()));

    let request = Request::builder().uri("/old").body(Body::empty()).unwrap();
    let response = server.app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/elsewhere");
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let (server, _store) = create_server(&format!("http://{}/graphql", closed));

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = server.app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let mut config = ProxyConfig::new(Url::parse(&format!("{}/graphql", upstream.uri())).unwrap());
    config.max_body_size = 16;
    let server = GatewayServer::new(config).unwrap();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"query":"query { User { id name email } }"}"#))
        .unwrap();
    let response = server.app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

fn create_small_body_server(endpoint: &str) -> GatewayServer {
    let mut config = ProxyConfig::new(Url::parse(endpoint).unwrap());
    config.max_body_size = 16;
    GatewayServer::new(config).unwrap()
}

#[tokio::test]
async fn test_large_multipart_upload_is_streamed_upstream() {
    let boundary = "graphcl-boundary";
    let upload = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"operations\"\r\n\r\n{{\"query\":\"mutation ($f: Upload!) {{ upload(file: $f) }}\"}}\r\n--{b}--\r\n",
        b = boundary
    );
    let content_type = format!("multipart/form-data; boundary={}", boundary);

    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header_matcher("content-type", content_type.as_str()))
        .and(body_string(upload.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_string("uploaded"))
        .expect(1)
        .mount(&upstream)
        .await;

    let server = create_small_body_server(&format!("{}/graphql", upstream.uri()));
    assert!(upload.len() > server.state().max_body_size);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/")
        .header(header::CONTENT_TYPE, content_type.as_str())
        .body(Body::from(upload))
        .unwrap();
    let response = server.app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "uploaded");
    assert!(server.state().cache.store().is_empty());
}

#[tokio::test]
async fn test_large_put_body_is_streamed_upstream() {
    let payload = "x".repeat(4096);

    let upstream = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/graphql/files/1"))
        .and(body_string(payload.clone()))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&upstream)
        .await;

    let server = create_small_body_server(&format!("{}/graphql", upstream.uri()));

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/files/1")
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(payload))
        .unwrap();
    let response = server.app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}
