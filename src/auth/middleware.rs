//! Authorization middleware: extractor, verifier and permission check in one
//! call, plus the axum glue that puts it in front of each route.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use serde_json::json;
use tracing::{Instrument, debug, debug_span, error, warn};

use super::keyset::KeySetCache;
use super::{AuthFailureKind, AuthorizationOutcome, Denied, TokenVerifier, check, extract};
use crate::config::AuthConfig;

/// The single authorization entry point for protected operations.
pub struct Authorizer {
    verifier: TokenVerifier,
}

impl Authorizer {
    /// Wrap a verifier.
    #[must_use]
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }

    /// Build the verifier and its JWKS cache from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &AuthConfig) -> crate::Result<Self> {
        config.validate()?;
        let keys = Arc::new(KeySetCache::from_config(config)?);
        Ok(Self::new(TokenVerifier::new(keys, config)))
    }

    /// The underlying token verifier
    #[must_use]
    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Extract, verify and check `required` against the request headers.
    pub async fn authorize(&self, headers: &HeaderMap, required: &str) -> AuthorizationOutcome {
        let outcome = self.evaluate(headers, required).await;

        match &outcome {
            Ok(claims) => {
                debug!(subject = %claims.subject, permission = %required, "Authorized");
                telemetry_metrics::counter!("auth_decisions_total", "outcome" => "authorized")
                    .increment(1);
            }
            Err(denied) => {
                if denied.kind == AuthFailureKind::KeyFetchFailed {
                    error!(permission = %required, kind = %denied.kind, detail = %denied.detail, "Authorization failed: identity provider keys unavailable");
                } else {
                    warn!(permission = %required, kind = %denied.kind, detail = %denied.detail, "Request denied");
                }
                telemetry_metrics::counter!(
                    "auth_decisions_total",
                    "outcome" => "denied",
                    "kind" => denied.kind.as_str()
                )
                .increment(1);
            }
        }

        outcome
    }

    async fn evaluate(&self, headers: &HeaderMap, required: &str) -> AuthorizationOutcome {
        let token = extract(headers)?;
        let claims = self.verifier.verify(token.as_str()).await?;
        check(claims, required)
    }
}

/// Middleware state: which permission a route demands, and who checks it.
#[derive(Clone)]
pub struct RequirePermission {
    authorizer: Arc<Authorizer>,
    permission: &'static str,
}

impl RequirePermission {
    /// Guard requiring `permission`.
    #[must_use]
    pub fn new(authorizer: Arc<Authorizer>, permission: &'static str) -> Self {
        Self {
            authorizer,
            permission,
        }
    }

    /// The permission this guard enforces
    #[must_use]
    pub fn permission(&self) -> &'static str {
        self.permission
    }
}

/// Authorization middleware.
///
/// On success the [`VerifiedClaims`](super::VerifiedClaims) are inserted into
/// the request extensions for the handler; on failure the [`Denied`] is
/// rendered and the handler never runs.
pub async fn require_permission(
    State(guard): State<RequirePermission>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let span = debug_span!("authorize", path = %request.uri().path(), permission = guard.permission);
    let outcome = guard
        .authorizer
        .authorize(request.headers(), guard.permission)
        .instrument(span)
        .await;

    match outcome {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(denied) => denied.into_response(),
    }
}

/// Put `route` behind `permission`.
pub fn protect<S>(
    authorizer: &Arc<Authorizer>,
    permission: &'static str,
    route: MethodRouter<S>,
) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    route.route_layer(middleware::from_fn_with_state(
        RequirePermission::new(Arc::clone(authorizer), permission),
        require_permission,
    ))
}

impl IntoResponse for Denied {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        let body = Json(json!({
            "success": false,
            "error": status.as_u16(),
            "code": self.kind.as_str(),
            "message": self.detail,
        }));

        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}
