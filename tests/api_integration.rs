use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use ivcap_api::{
    auth::{Claims, JwtAuthorizer},
    client::{ApiClient, ClientError},
    db,
    errors::ServiceError,
    models::service::ServiceDescriptionT,
    routes,
    state::AppState,
    views::View,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "integration-secret";

const ALL_SCOPES: &str = "artifact:read artifact:write aspect:read aspect:write \
    metadata:read metadata:write package:read package:write service:read service:write";

fn token(scope: &str) -> String {
    let exp = (chrono::Utc::now().timestamp() + 3600) as usize;
    encode(
        &Header::new(Algorithm::HS256),
        &Claims {
            sub: "alice".into(),
            exp,
            scope: scope.into(),
        },
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn app() -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::connect("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    let state = AppState::new(
        pool,
        dir.path(),
        "http://localhost:8088",
        Arc::new(JwtAuthorizer::hs256(SECRET)),
    );
    (dir, routes::app(state))
}

struct Req {
    builder: axum::http::request::Builder,
}

impl Req {
    fn new(method: Method, uri: &str) -> Self {
        Self {
            builder: Request::builder().method(method).uri(uri),
        }
    }

    fn auth(self, scope: &str) -> Self {
        self.header(header::AUTHORIZATION.as_str(), &format!("Bearer {}", token(scope)))
    }

    fn header(mut self, name: &str, value: &str) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    async fn send(self, app: &Router, body: impl Into<Body>) -> Response {
        app.clone()
            .oneshot(self.builder.body(body.into()).unwrap())
            .await
            .unwrap()
    }
}

async fn body_bytes(resp: Response) -> Vec<u8> {
    to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec()
}

async fn body_json(resp: Response) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

fn header<'a>(resp: &'a Response, name: &str) -> &'a str {
    resp.headers().get(name).unwrap().to_str().unwrap()
}

fn sha(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// Serve the router on an ephemeral local port and return its base url.
async fn serve() -> (TempDir, String) {
    let (dir, app) = app().await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (dir, format!("http://{}", addr))
}

async fn upload_text(app: &Router, text: &str) -> String {
    let resp = Req::new(Method::POST, "/1/artifacts")
        .auth(ALL_SCOPES)
        .header("content-type", "text/plain")
        .send(app, text.to_string())
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    body_json(resp).await["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_probes_need_no_token() {
    let (_dir, app) = app().await;
    let resp = Req::new(Method::GET, "/healthz").send(&app, Body::empty()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = Req::new(Method::GET, "/readyz").send(&app, Body::empty()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["checks"]["sqlite"]["ok"], true);
    assert_eq!(body["checks"]["disk"]["ok"], true);
}

#[tokio::test]
async fn missing_token_and_missing_scope_are_named() {
    let (_dir, app) = app().await;
    let resp = Req::new(Method::GET, "/1/artifacts").send(&app, Body::empty()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(header(&resp, "x-error-name"), "unauthorized");

    let resp = Req::new(Method::GET, "/1/artifacts")
        .auth("aspect:read")
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(header(&resp, "x-error-name"), "invalid-scopes");
}

#[tokio::test]
async fn tus_upload_then_download() {
    let (_dir, app) = app().await;

    let resp = Req::new(Method::POST, "/1/artifacts")
        .auth(ALL_SCOPES)
        .header("content-type", "text/plain")
        .header("x-name", "notes.txt")
        .header("upload-length", "11")
        .header("tus-resumable", "1.0.0")
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(header(&resp, "upload-offset"), "0");
    assert_eq!(header(&resp, "tus-resumable"), "1.0.0");
    let created = body_json(resp).await;
    let id = created["id"].as_str().unwrap().to_string();
    let blob = format!("/1/artifacts/{}/blob", id);

    let resp = Req::new(Method::PATCH, &blob)
        .auth(ALL_SCOPES)
        .header("upload-offset", "0")
        .header("tus-resumable", "1.0.0")
        .header("content-type", "application/offset+octet-stream")
        .send(&app, "hello ")
        .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(header(&resp, "upload-offset"), "6");

    let resp = Req::new(Method::HEAD, &blob)
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header(&resp, "upload-offset"), "6");
    assert_eq!(header(&resp, "upload-length"), "11");
    assert_eq!(header(&resp, "cache-control"), "no-store");

    // Wrong offset is rejected and does not move the upload.
    let resp = Req::new(Method::PATCH, &blob)
        .auth(ALL_SCOPES)
        .header("upload-offset", "3")
        .header("tus-resumable", "1.0.0")
        .header("content-type", "application/offset+octet-stream")
        .send(&app, "xx")
        .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let resp = Req::new(Method::PATCH, &blob)
        .auth(ALL_SCOPES)
        .header("upload-offset", "6")
        .header("tus-resumable", "1.0.0")
        .header("content-type", "application/offset+octet-stream")
        .send(&app, "world")
        .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(header(&resp, "upload-offset"), "11");

    let resp = Req::new(Method::GET, &format!("/1/artifacts/{}", id))
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    let status = body_json(resp).await;
    assert_eq!(status["status"], "ready");
    assert_eq!(status["size"], 11);

    let resp = Req::new(Method::GET, &blob)
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header(&resp, "content-type"), "text/plain");
    assert!(resp.headers().contains_key("etag"));
    assert_eq!(body_bytes(resp).await, b"hello world");
}

#[tokio::test]
async fn chunk_with_wrong_content_type_is_unsupported() {
    let (_dir, app) = app().await;
    let resp = Req::new(Method::POST, "/1/artifacts")
        .auth(ALL_SCOPES)
        .header("upload-length", "4")
        .header("tus-resumable", "1.0.0")
        .send(&app, Body::empty())
        .await;
    let id = body_json(resp).await["id"].as_str().unwrap().to_string();

    let resp = Req::new(Method::PATCH, &format!("/1/artifacts/{}/blob", id))
        .auth(ALL_SCOPES)
        .header("upload-offset", "0")
        .header("tus-resumable", "1.0.0")
        .header("content-type", "text/plain")
        .send(&app, "data")
        .await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(header(&resp, "x-error-name"), "unsupported-content-type");
}

#[tokio::test]
async fn unknown_blob_ids_are_not_found() {
    let (_dir, app) = app().await;
    let resp = Req::new(Method::GET, "/1/artifacts/not-a-uuid/blob")
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = Req::new(Method::GET, "/1/artifacts/not-a-uuid")
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn aspects_update_retracts_the_previous_assertion() {
    let (_dir, app) = app().await;
    let query = "entity=urn:ivcap:artifact:1&schema=urn:example:schema:a";

    let resp = Req::new(Method::POST, &format!("/1/aspects?{}", query))
        .auth(ALL_SCOPES)
        .header("content-type", "application/json")
        .send(&app, json!({"v": 1}).to_string())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let first = body_json(resp).await["id"].as_str().unwrap().to_string();

    let resp = Req::new(Method::PUT, &format!("/1/aspects?{}", query))
        .auth(ALL_SCOPES)
        .header("content-type", "application/json")
        .send(&app, json!({"v": 2}).to_string())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = Req::new(Method::GET, &format!("/1/aspects/{}", first))
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    let old = body_json(resp).await;
    assert!(old["valid_to"].is_string());

    let resp = Req::new(Method::GET, &format!("/1/aspects?{}&include-content=true", query))
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let list = body_json(resp).await;
    let items = list["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["content"]["v"], 2);

    let resp = Req::new(Method::GET, "/1/aspects?filter=v%3D1")
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn aspect_write_rejects_bad_entity() {
    let (_dir, app) = app().await;
    let resp = Req::new(Method::POST, "/1/aspects?entity=plain&schema=urn:s:1")
        .auth(ALL_SCOPES)
        .send(&app, "{}")
        .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(resp).await["name"], "entity");
}

#[tokio::test]
async fn metadata_add_revoke_and_read() {
    let (_dir, app) = app().await;
    let query = "entity-id=urn:ivcap:artifact:7&schema=urn:example:schema:m";

    let resp = Req::new(Method::POST, &format!("/1/metadata?{}", query))
        .auth(ALL_SCOPES)
        .header("content-type", "application/json")
        .send(&app, json!({"label": "cat"}).to_string())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let id = body_json(resp).await["record_id"].as_str().unwrap().to_string();

    let resp = Req::new(Method::GET, &format!("/1/metadata?{}", query))
        .auth("metadata:read")
        .send(&app, Body::empty())
        .await;
    assert_eq!(body_json(resp).await["records"].as_array().unwrap().len(), 1);

    let resp = Req::new(Method::DELETE, &format!("/1/metadata/{}", id))
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = Req::new(Method::GET, &format!("/1/metadata/{}", id))
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_json(resp).await["valid_to"].is_string());

    let resp = Req::new(Method::GET, &format!("/1/metadata?{}", query))
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert!(body_json(resp).await["records"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn package_blob_push_in_ranges_and_pull() {
    let (_dir, app) = app().await;
    let layer = b"0123456789abcdef".to_vec();
    let digest = sha(&layer);

    let resp = Req::new(Method::POST, "/1/pkgs/push?tag=demo:1&type=layer")
        .auth(ALL_SCOPES)
        .header("digest", &digest)
        .header("start", "0")
        .header("end", "10")
        .send(&app, layer[..10].to_vec())
        .await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let resp = Req::new(
        Method::GET,
        &format!("/1/pkgs/push/status?tag=demo:1&digest={}", digest),
    )
    .auth(ALL_SCOPES)
    .send(&app, Body::empty())
    .await;
    let status = body_json(resp).await;
    assert_eq!(status["status"], "partial");
    assert_eq!(status["available"], 10);

    let resp = Req::new(Method::POST, "/1/pkgs/push?tag=demo:1&type=layer")
        .auth(ALL_SCOPES)
        .header("digest", &digest)
        .header("start", "10")
        .header("end", "16")
        .send(&app, layer[10..].to_vec())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["digest"], digest.as_str());

    let resp = Req::new(
        Method::GET,
        &format!("/1/pkgs/pull?type=layer&digest={}&offset=4", digest),
    )
    .auth(ALL_SCOPES)
    .send(&app, Body::empty())
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header(&resp, "total"), "16");
    assert_eq!(header(&resp, "available"), "12");
    assert_eq!(body_bytes(resp).await, layer[4..].to_vec());
}

#[tokio::test]
async fn package_manifest_tag_list_and_remove() {
    let (_dir, app) = app().await;
    let manifest = json!({"layers": []}).to_string();

    let resp = Req::new(Method::POST, "/1/pkgs/push?tag=demo:2&type=manifest")
        .auth(ALL_SCOPES)
        .send(&app, manifest.clone())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = Req::new(Method::GET, "/1/pkgs?tag=demo")
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    let list = body_json(resp).await;
    assert_eq!(list["items"], json!(["demo:2"]));

    let resp = Req::new(Method::GET, "/1/pkgs/pull?type=manifest&ref=demo:2")
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert_eq!(body_bytes(resp).await, manifest.as_bytes());

    let resp = Req::new(Method::DELETE, "/1/pkgs?tag=demo:2")
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = Req::new(Method::DELETE, "/1/pkgs?tag=demo:2")
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn services_create_conflict_and_tiny_view() {
    let (_dir, app) = app().await;
    let desc = json!({
        "name": "gradient",
        "description": "Paints a gradient",
        "parameters": [{"name": "width", "type": "int"}],
        "workflow": {"type": "basic", "image": "gradient:latest"}
    })
    .to_string();

    let resp = Req::new(Method::POST, "/1/services")
        .auth(ALL_SCOPES)
        .header("content-type", "application/json")
        .send(&app, desc.clone())
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert!(resp.headers().contains_key("location"));
    let id = body_json(resp).await["id"].as_str().unwrap().to_string();

    let resp = Req::new(Method::POST, "/1/services")
        .auth(ALL_SCOPES)
        .header("content-type", "application/json")
        .send(&app, desc)
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(header(&resp, "x-error-name"), "already-created");
    assert_eq!(body_json(resp).await["id"], id.as_str());

    let resp = Req::new(Method::GET, &format!("/1/services/{}?view=tiny", id))
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let tiny = body_json(resp).await;
    assert_eq!(tiny["name"], "gradient");
    assert!(tiny.get("parameters").is_none_or(Value::is_null));

    let resp = Req::new(Method::GET, &format!("/1/services/{}?view=huge", id))
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = Req::new(Method::DELETE, &format!("/1/services/{}", id))
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn client_round_trips_against_a_live_server() {
    let (_dir, base) = serve().await;
    let client = ApiClient::new(&base, Some(token(ALL_SCOPES))).unwrap();
    let desc: ServiceDescriptionT = serde_json::from_value(json!({
        "name": "resize",
        "description": "Resizes images",
        "workflow": {"type": "basic", "image": "resize:1"}
    }))
    .unwrap();

    let created = client.create_service(&desc).await.unwrap();
    let read = client.read_service(&created.id, View::Default).await.unwrap();
    assert_eq!(read.id, created.id);
    assert_eq!(read.name.as_deref(), Some("resize"));

    let tiny = client.read_service(&created.id, View::Tiny).await.unwrap();
    assert_eq!(tiny.name.as_deref(), Some("resize"));
    assert!(tiny.description.is_none());

    match client.create_service(&desc).await {
        Err(ClientError::Service(ServiceError::AlreadyCreated(body))) => {
            assert_eq!(body.id, created.id)
        }
        other => panic!("expected already-created, got {:?}", other.map(|s| s.id)),
    }

    let missing = uuid::Uuid::new_v4().to_string();
    match client.read_service(&missing, View::Default).await {
        Err(ClientError::Service(ServiceError::NotFound(body))) => assert_eq!(body.id, missing),
        other => panic!("expected not-found, got {:?}", other.map(|s| s.id)),
    }
}

#[tokio::test]
async fn service_update_honours_force_create() {
    let (_dir, app) = app().await;
    let id = uuid::Uuid::new_v4().to_string();
    let desc = json!({
        "name": "late",
        "description": "Registered by update",
        "workflow": {"type": "basic"}
    })
    .to_string();

    let resp = Req::new(Method::PUT, &format!("/1/services/{}?force-create=false", id))
        .auth(ALL_SCOPES)
        .header("content-type", "application/json")
        .send(&app, desc.clone())
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(header(&resp, "x-error-name"), "not-found");

    let resp = Req::new(Method::PUT, &format!("/1/services/{}?force-create=true", id))
        .auth(ALL_SCOPES)
        .header("content-type", "application/json")
        .send(&app, desc)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["id"], id.as_str());

    let resp = Req::new(Method::GET, &format!("/1/services/{}", id))
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn metadata_update_one_and_update_record() {
    let (_dir, app) = app().await;
    let query = "entity-id=urn:ivcap:artifact:9&schema=urn:example:schema:u";

    let resp = Req::new(Method::PUT, &format!("/1/metadata?{}", query))
        .auth(ALL_SCOPES)
        .header("content-type", "application/json")
        .send(&app, json!({"label": "cat"}).to_string())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let first = body_json(resp).await["record_id"].as_str().unwrap().to_string();

    let resp = Req::new(Method::PUT, &format!("/1/metadata?{}", query))
        .auth(ALL_SCOPES)
        .header("content-type", "application/json")
        .send(&app, json!({"label": "dog"}).to_string())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let second = body_json(resp).await["record_id"].as_str().unwrap().to_string();
    assert_ne!(first, second);

    let resp = Req::new(Method::GET, &format!("/1/metadata/{}", first))
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert!(body_json(resp).await["valid_to"].is_string());

    let resp = Req::new(Method::PUT, &format!("/1/metadata/{}", second))
        .auth(ALL_SCOPES)
        .header("content-type", "application/json")
        .send(&app, json!({"label": "bird"}).to_string())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let third = body_json(resp).await["record_id"].as_str().unwrap().to_string();

    let resp = Req::new(Method::GET, &format!("/1/metadata/{}", third))
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    let record = body_json(resp).await;
    assert_eq!(record["aspect"]["label"], "bird");
    assert_eq!(record["entity"], "urn:ivcap:artifact:9");

    let resp = Req::new(Method::GET, &format!("/1/metadata?{}", query))
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    let records = body_json(resp).await["records"].clone();
    assert_eq!(records.as_array().unwrap().len(), 1);
    assert_eq!(records[0]["record_id"], third.as_str());
}

#[tokio::test]
async fn list_filters_are_not_implemented() {
    let (_dir, app) = app().await;
    for path in ["/1/artifacts", "/1/services", "/1/metadata"] {
        let resp = Req::new(Method::GET, &format!("{}?filter=name%3D%27x%27", path))
            .auth(ALL_SCOPES)
            .send(&app, Body::empty())
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED, "{}", path);
        assert_eq!(header(&resp, "x-error-name"), "not-implemented");
    }
}

#[tokio::test]
async fn list_limits_are_bounded_and_default_to_ten() {
    let (_dir, app) = app().await;
    for limit in ["0", "51", "ten"] {
        let resp = Req::new(Method::GET, &format!("/1/artifacts?limit={}", limit))
            .auth(ALL_SCOPES)
            .send(&app, Body::empty())
            .await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY, "limit={}", limit);
        assert_eq!(body_json(resp).await["name"], "limit");
    }

    for i in 0..11 {
        upload_text(&app, &format!("file {}", i)).await;
    }
    let resp = Req::new(Method::GET, "/1/artifacts")
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page = body_json(resp).await;
    assert_eq!(page["artifacts"].as_array().unwrap().len(), 10);
    let links = page["links"].as_array().unwrap();
    let next = links.iter().find(|l| l["rel"] == "next").unwrap();
    let next = next["href"].as_str().unwrap();
    let next = next.strip_prefix("http://localhost:8088").unwrap();

    let resp = Req::new(Method::GET, next)
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    let page = body_json(resp).await;
    assert_eq!(page["artifacts"].as_array().unwrap().len(), 1);
    assert!(!page["links"].as_array().unwrap().iter().any(|l| l["rel"] == "next"));
}

#[tokio::test]
async fn malformed_page_token_is_rejected() {
    let (_dir, app) = app().await;
    for path in ["/1/artifacts", "/1/services", "/1/pkgs"] {
        let resp = Req::new(Method::GET, &format!("{}?page=%21%21not-a-token", path))
            .auth(ALL_SCOPES)
            .send(&app, Body::empty())
            .await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY, "{}", path);
        assert_eq!(header(&resp, "x-error-name"), "invalid-parameter");
        assert_eq!(body_json(resp).await["name"], "page");
    }
}

#[tokio::test]
async fn unknown_view_on_reads_is_bad_request() {
    let (_dir, app) = app().await;
    let id = upload_text(&app, "viewed").await;
    let resp = Req::new(Method::GET, &format!("/1/artifacts/{}?view=huge", id))
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header(&resp, "x-error-name"), "bad-request");

    let resp = Req::new(Method::GET, &format!("/1/artifacts/{}?view=tiny", id))
        .auth(ALL_SCOPES)
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let tiny = body_json(resp).await;
    assert_eq!(tiny["status"], "ready");
    assert!(tiny.get("size").is_none_or(Value::is_null));
}

#[tokio::test]
async fn empty_blob_push_is_complete() {
    let (_dir, app) = app().await;
    let digest = sha(b"");
    let resp = Req::new(Method::POST, "/1/pkgs/push?tag=demo:3&type=config")
        .auth(ALL_SCOPES)
        .header("digest", &digest)
        .header("start", "0")
        .header("end", "0")
        .send(&app, Body::empty())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = Req::new(
        Method::GET,
        &format!("/1/pkgs/push/status?tag=demo:3&digest={}", digest),
    )
    .auth(ALL_SCOPES)
    .send(&app, Body::empty())
    .await;
    assert_eq!(body_json(resp).await["status"], "exists");
}
