use crate::api::api;
use crate::application_impl::testing::Harness;
use crate::application_port::*;
use crate::domain_model::*;
use crate::server::Server;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::StatusCode;

const AGENT: &str = "tokensmith-test/1.0";

fn server(h: &Harness) -> Arc<Server> {
    let token_service: Arc<dyn TokenService> = h.service.clone();
    let access_guard: Arc<dyn AccessGuard> = h.guard.clone();
    Arc::new(Server::new(token_service, access_guard))
}

fn peer() -> SocketAddr {
    "10.1.2.3:50000".parse().unwrap()
}

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

async fn generate(server: &Arc<Server>, user_id: &str) -> TokenPair {
    let res = warp::test::request()
        .method("POST")
        .path(&format!("/api/v1/tokens/generate?user_id={}", user_id))
        .header("user-agent", AGENT)
        .remote_addr(peer())
        .reply(&api(server.clone()))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    serde_json::from_slice(res.body()).unwrap()
}

async fn refresh(server: &Arc<Server>, pair: &TokenPair, agent: &str) -> (StatusCode, Value) {
    let res = warp::test::request()
        .method("POST")
        .path("/api/v1/tokens/refresh")
        .header("user-agent", agent)
        .remote_addr(peer())
        .json(pair)
        .reply(&api(server.clone()))
        .await;
    (res.status(), json(res.body()))
}

#[tokio::test]
async fn test_generate_returns_pair() {
    let h = Harness::new();
    let server = server(&h);

    let pair = generate(&server, "u1").await;
    let claims = h.codec.verify_access_token(&pair.access).await.unwrap();
    assert_eq!(claims.sub, UserId::from("u1"));

    let record = h
        .store
        .records_for_user(&UserId::from("u1"))
        .pop()
        .unwrap();
    assert_eq!(record.user_agent, AGENT);
    assert_eq!(record.ip, "10.1.2.3");
}

#[tokio::test]
async fn test_generate_requires_user_id() {
    let h = Harness::new();
    let server = server(&h);

    for path in ["/api/v1/tokens/generate?user_id=", "/api/v1/tokens/generate"] {
        let res = warp::test::request()
            .method("POST")
            .path(path)
            .reply(&api(server.clone()))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(res.body())["error"]["code"], "InvalidPayload");
    }
}

#[tokio::test]
async fn test_refresh_rotates_once() {
    let h = Harness::new();
    let server = server(&h);
    let pair = generate(&server, "u1").await;

    let (status, body) = refresh(&server, &pair, AGENT).await;
    assert_eq!(status, StatusCode::OK);
    let rotated: TokenPair = serde_json::from_value(body).unwrap();
    assert_ne!(rotated.access, pair.access);

    let (status, body) = refresh(&server, &pair, AGENT).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "RefreshNotFoundOrRevoked");
}

#[tokio::test]
async fn test_refresh_from_other_agent() {
    let h = Harness::new();
    let server = server(&h);
    let pair = generate(&server, "u1").await;

    let (status, body) = refresh(&server, &pair, "curl/8.0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "UserAgentChanged");

    let (status, body) = refresh(&server, &pair, AGENT).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "RefreshNotFoundOrRevoked");
}

#[tokio::test]
async fn test_refresh_rejects_bad_payload() {
    let h = Harness::new();
    let server = server(&h);

    let res = warp::test::request()
        .method("POST")
        .path("/api/v1/tokens/refresh")
        .header("content-type", "application/json")
        .body(r#"{"access": 42}"#)
        .reply(&api(server.clone()))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(res.body())["error"]["code"], "InvalidPayload");
}

#[tokio::test]
async fn test_refresh_rejects_wrong_secret() {
    let h = Harness::new();
    let server = server(&h);
    let mut pair = generate(&server, "u1").await;
    pair.refresh = RefreshToken("wrong".to_string());

    let (status, body) = refresh(&server, &pair, AGENT).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "InvalidRefreshToken");
}

#[tokio::test]
async fn test_whoami() {
    let h = Harness::new();
    let server = server(&h);
    let pair = generate(&server, "u1").await;

    let res = warp::test::request()
        .method("GET")
        .path("/api/v1/whoami")
        .header("authorization", format!("Bearer {}", pair.access.0))
        .reply(&api(server.clone()))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json(res.body())["user_id"], "u1");
}

#[tokio::test]
async fn test_whoami_rejections() {
    let h = Harness::new();
    let server = server(&h);

    let res = warp::test::request()
        .method("GET")
        .path("/api/v1/whoami")
        .reply(&api(server.clone()))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(res.body())["error"]["code"], "MissingToken");

    let res = warp::test::request()
        .method("GET")
        .path("/api/v1/whoami")
        .header("authorization", "Bearer not.a.token")
        .reply(&api(server.clone()))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(res.body())["error"]["code"], "Unauthorized");
}

#[tokio::test]
async fn test_logout_then_whoami_is_rejected() {
    let h = Harness::new();
    let server = server(&h);
    let pair = generate(&server, "u1").await;
    let bearer = format!("Bearer {}", pair.access.0);

    let res = warp::test::request()
        .method("POST")
        .path("/api/v1/logout")
        .header("authorization", &bearer)
        .reply(&api(server.clone()))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(res.body().is_empty());

    let res = warp::test::request()
        .method("GET")
        .path("/api/v1/whoami")
        .header("authorization", &bearer)
        .reply(&api(server.clone()))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(res.body())["error"]["code"], "Unauthorized");

    let (status, body) = refresh(&server, &pair, AGENT).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "RefreshNotFoundOrRevoked");
}

#[tokio::test]
async fn test_logout_requires_token() {
    let h = Harness::new();
    let server = server(&h);

    let res = warp::test::request()
        .method("POST")
        .path("/api/v1/logout")
        .reply(&api(server.clone()))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_route() {
    let h = Harness::new();
    let server = server(&h);

    let res = warp::test::request()
        .method("GET")
        .path("/api/v1/nope")
        .reply(&api(server.clone()))
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
