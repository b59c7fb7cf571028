//! Bearer token extraction from the `Authorization` header.

use std::fmt;

use axum::http::{HeaderMap, header::AUTHORIZATION};

use super::{AuthFailureKind, Denied, redact_token};

/// An unverified token pulled from the request.
///
/// `Debug` is redacted so the token can't leak through `?token` in a log line.
#[derive(Clone, PartialEq, Eq)]
pub struct RawToken(String);

impl RawToken {
    /// The token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RawToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawToken")
            .field(&redact_token(&self.0))
            .finish()
    }
}

/// Pull the bearer token out of `headers`.
///
/// The header must be exactly `<scheme> <token>` separated by a single space,
/// with the scheme matching `bearer` case-insensitively.
pub fn extract(headers: &HeaderMap) -> Result<RawToken, Denied> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Err(missing());
    };
    if value.is_empty() {
        return Err(missing());
    }

    let value = value.to_str().map_err(|_| {
        Denied::new(
            AuthFailureKind::MalformedHeader,
            "Authorization header is not valid ASCII",
        )
    })?;

    let parts: Vec<&str> = value.split(' ').collect();
    let [scheme, token] = parts.as_slice() else {
        return Err(Denied::new(
            AuthFailureKind::MalformedHeader,
            "Authorization header must be of the form 'Bearer <token>'",
        ));
    };

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(Denied::new(
            AuthFailureKind::MalformedHeader,
            "Authorization header must start with 'Bearer'",
        ));
    }
    if token.is_empty() {
        return Err(Denied::new(
            AuthFailureKind::MalformedHeader,
            "Authorization header carries an empty token",
        ));
    }

    Ok(RawToken((*token).to_string()))
}

fn missing() -> Denied {
    Denied::new(
        AuthFailureKind::MissingHeader,
        "Authorization header is expected. Use: Authorization: Bearer <token>",
    )
}
