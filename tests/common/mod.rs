//! Shared fixtures: RSA key pairs, a token signer, a mock identity provider
//! and a request helper for the full router.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use warehouse_gate::auth::Authorizer;
use warehouse_gate::config::AuthConfig;
use warehouse_gate::server::create_router;
use warehouse_gate::warehouse::WarehouseStore;

pub const PEM_A: &[u8] = include_bytes!("../fixtures/rsa_a.pem");
pub const PEM_B: &[u8] = include_bytes!("../fixtures/rsa_b.pem");
const JWK_A: &str = include_str!("../fixtures/rsa_a.jwk.json");
const JWK_B: &str = include_str!("../fixtures/rsa_b.jwk.json");

pub const ISSUER: &str = "https://warehouse.example.auth0.com/";
pub const AUDIENCE: &str = "warehouse";
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Public JWK for key pair A (`kid = key-a`)
pub fn jwk_a() -> Value {
    serde_json::from_str(JWK_A).unwrap()
}

/// Public JWK for key pair B (`kid = key-b`)
pub fn jwk_b() -> Value {
    serde_json::from_str(JWK_B).unwrap()
}

/// Body of a JWKS document holding `keys`
pub fn jwks(keys: &[Value]) -> Value {
    json!({ "keys": keys })
}

/// Mock identity provider that always serves `keys`.
pub async fn identity_provider(keys: &[Value]) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(keys)))
        .mount(&server)
        .await;
    server
}

/// Auth settings pointing at `server`'s key set.
pub fn auth_config(server: &MockServer) -> AuthConfig {
    AuthConfig {
        issuer: ISSUER.to_string(),
        audience: AUDIENCE.to_string(),
        jwks_url: Some(format!("{}{JWKS_PATH}", server.uri())),
        jwks_fetch_timeout: Duration::from_secs(2),
        ..AuthConfig::default()
    }
}

pub fn authorizer(server: &MockServer) -> Arc<Authorizer> {
    Arc::new(Authorizer::from_config(&auth_config(server)).unwrap())
}

/// Full application router backed by `server` and a fresh store.
pub fn app(server: &MockServer) -> Router {
    create_router(
        Arc::new(WarehouseStore::new()),
        authorizer(server),
        Duration::from_secs(5),
    )
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Claims that pass every check, granting `permissions`.
pub fn claims(permissions: &[&str]) -> Value {
    json!({
        "iss": ISSUER,
        "sub": "auth0|warehouse-manager",
        "aud": [AUDIENCE, "https://warehouse.example.auth0.com/userinfo"],
        "iat": now(),
        "exp": now() + 3600,
        "permissions": permissions,
    })
}

/// Sign `claims` with RS256 using `pem`, stamping `kid` in the header.
pub fn sign(pem: &[u8], kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    jsonwebtoken::encode(&header, claims, &EncodingKey::from_rsa_pem(pem).unwrap()).unwrap()
}

/// A valid key-a token granting `permissions`.
pub fn token(permissions: &[&str]) -> String {
    sign(PEM_A, "key-a", &claims(permissions))
}

pub struct Reply {
    pub status: StatusCode,
    pub challenge: Option<String>,
    pub body: Value,
}

/// Send one request through `app`.
pub async fn send(
    app: &Router,
    verb: &str,
    uri: &str,
    authorization: Option<&str>,
    body: Option<Value>,
) -> Reply {
    let mut request = Request::builder().method(verb).uri(uri);
    if let Some(value) = authorization {
        request = request.header(header::AUTHORIZATION, value);
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let challenge = response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    Reply {
        status,
        challenge,
        body,
    }
}

/// `Bearer <token>`
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
