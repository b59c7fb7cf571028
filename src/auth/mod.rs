//! Bearer token verification and permission-based authorization.
//!
//! # Pipeline
//!
//! ```text
//! Authorization header
//!   -> extract::extract          (MissingHeader / MalformedHeader)
//!   -> verify::TokenVerifier     (InvalidHeader / KeyNotFound / KeyFetchFailed /
//!                                 InvalidSignature / TokenExpired /
//!                                 InvalidAudience / InvalidIssuer)
//!        -> keyset::KeySetCache  (JWKS snapshot, refreshed on unknown `kid`)
//!   -> permission::check         (InsufficientPermission)
//!   -> route handler
//! ```
//!
//! Every stage returns `Result<_, Denied>` and the first failure short-circuits
//! the rest. [`middleware::Authorizer`] is the single entry point route
//! handlers go through.
//!
//! # Security properties
//!
//! - Only RS256 is accepted. The algorithm is pinned on our side, so a header
//!   claiming `none` or `HS256` is rejected before any key lookup.
//! - Claims are read only after the signature verifies.
//! - Raw tokens never reach the logs; see [`redact_token`].

pub mod extract;
pub mod keyset;
pub mod middleware;
pub mod permission;
pub mod verify;

use std::fmt;

use axum::http::StatusCode;

pub use extract::{RawToken, extract};
pub use keyset::{
    HttpKeySetFetcher, KeySetCache, KeySetError, KeySetFetcher, KeySetSnapshot, SigningKey,
};
pub use middleware::{Authorizer, RequirePermission, protect, require_permission};
pub use permission::check;
pub use verify::{TokenHeader, TokenVerifier, VerifiedClaims};

/// Result of running the full pipeline for one request.
pub type AuthorizationOutcome = Result<VerifiedClaims, Denied>;

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthFailureKind {
    /// No `Authorization` header, or an empty one
    MissingHeader,
    /// Header present but not `Bearer <token>`
    MalformedHeader,
    /// Token header undecodable, missing `kid`, or disallowed algorithm
    InvalidHeader,
    /// `kid` absent from both the cached and the refreshed key set
    KeyNotFound,
    /// The key set could not be fetched or parsed
    KeyFetchFailed,
    /// Signature did not verify against the resolved key
    InvalidSignature,
    /// `exp` is not in the future
    TokenExpired,
    /// `aud` does not match the configured audience
    InvalidAudience,
    /// `iss` does not match the configured issuer
    InvalidIssuer,
    /// Token is valid but lacks the route's permission
    InsufficientPermission,
}

impl AuthFailureKind {
    /// Stable machine-readable code, used in response bodies and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingHeader => "missing_header",
            Self::MalformedHeader => "malformed_header",
            Self::InvalidHeader => "invalid_header",
            Self::KeyNotFound => "key_not_found",
            Self::KeyFetchFailed => "key_fetch_failed",
            Self::InvalidSignature => "invalid_signature",
            Self::TokenExpired => "token_expired",
            Self::InvalidAudience => "invalid_audience",
            Self::InvalidIssuer => "invalid_issuer",
            Self::InsufficientPermission => "insufficient_permission",
        }
    }

    /// HTTP status the web layer renders for this kind.
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::KeyFetchFailed => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InsufficientPermission => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl fmt::Display for AuthFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A refused request: the failure kind plus a human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct Denied {
    /// Failure kind
    pub kind: AuthFailureKind,
    /// Explanation safe to return to the caller
    pub detail: String,
}

impl Denied {
    /// Create a denial of the given kind.
    pub fn new(kind: AuthFailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Render a token for logs: an 8-character prefix and the total length.
#[must_use]
pub fn redact_token(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{prefix}...({} chars)", token.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(
            AuthFailureKind::KeyFetchFailed.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AuthFailureKind::InsufficientPermission.status(),
            StatusCode::FORBIDDEN
        );
        for kind in [
            AuthFailureKind::MissingHeader,
            AuthFailureKind::MalformedHeader,
            AuthFailureKind::InvalidHeader,
            AuthFailureKind::KeyNotFound,
            AuthFailureKind::InvalidSignature,
            AuthFailureKind::TokenExpired,
            AuthFailureKind::InvalidAudience,
            AuthFailureKind::InvalidIssuer,
        ] {
            assert_eq!(kind.status(), StatusCode::UNAUTHORIZED, "{kind}");
        }
    }

    #[test]
    fn denied_display_carries_kind_and_detail() {
        let denied = Denied::new(AuthFailureKind::TokenExpired, "token expired 3s ago");
        assert_eq!(denied.to_string(), "token_expired: token expired 3s ago");
    }

    #[test]
    fn redact_token_never_returns_full_token() {
        let token = "eyJhbGciOiJSUzI1NiJ9.payload.signature";
        let redacted = redact_token(token);
        assert!(redacted.starts_with("eyJhbGci"));
        assert!(!redacted.contains("payload"));
        assert!(redacted.contains(&token.len().to_string()));
    }
}
