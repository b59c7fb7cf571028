//! JWT signature and claim verification.
//!
//! # Verification order
//!
//! 1. Decode the header (no verification). Reject anything but RS256 and
//!    headers without a `kid`.
//! 2. Resolve the signing key through the [`KeySetCache`].
//! 3. Verify the signature with the algorithm pinned to RS256.
//! 4. Check `exp`, then `aud`, then `iss` on the verified payload.
//! 5. Read the permission list from the configured claim.
//!
//! Registered-claim checks are done here rather than by `jsonwebtoken` so each
//! mismatch maps to its own failure kind and expiry has no leeway.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Validation, errors::ErrorKind};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::keyset::KeySetCache;
use super::{AuthFailureKind, Denied};
use crate::config::AuthConfig;

/// The algorithm every accepted token must be signed with.
const ACCEPTED_ALGORITHM: Algorithm = Algorithm::RS256;

/// The token's header fields that matter before verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Declared signing algorithm
    pub algorithm: Algorithm,
    /// Key identifier used to pick the signing key
    pub key_id: String,
}

impl TokenHeader {
    /// Decode and vet the header of `token` without verifying anything else.
    pub fn decode(token: &str) -> Result<Self, Denied> {
        let header = jsonwebtoken::decode_header(token).map_err(|e| {
            Denied::new(
                AuthFailureKind::InvalidHeader,
                format!("token header could not be decoded: {e}"),
            )
        })?;

        if header.alg != ACCEPTED_ALGORITHM {
            return Err(Denied::new(
                AuthFailureKind::InvalidHeader,
                format!("token algorithm {:?} is not accepted, expected RS256", header.alg),
            ));
        }

        let key_id = header.kid.filter(|kid| !kid.is_empty()).ok_or_else(|| {
            Denied::new(AuthFailureKind::InvalidHeader, "token header has no 'kid'")
        })?;

        Ok(Self {
            algorithm: header.alg,
            key_id,
        })
    }
}

/// Claims of a token that passed every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedClaims {
    /// `sub` claim; empty when the provider omits it
    pub subject: String,
    /// `iss` claim
    pub issuer: String,
    /// `aud` claim, normalized to a list
    pub audience: Vec<String>,
    /// `exp` claim
    pub expires_at: DateTime<Utc>,
    /// Granted permissions
    pub permissions: BTreeSet<String>,
}

impl VerifiedClaims {
    /// Whether `permission` was granted, by exact string match.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Verifies bearer tokens against the identity provider's published keys.
pub struct TokenVerifier {
    keys: Arc<KeySetCache>,
    issuer: String,
    audience: String,
    permission_claim: String,
}

impl TokenVerifier {
    /// Create a verifier using `keys` and the expectations in `config`.
    #[must_use]
    pub fn new(keys: Arc<KeySetCache>, config: &AuthConfig) -> Self {
        Self {
            keys,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            permission_claim: config.permission_claim.clone(),
        }
    }

    /// The key set cache this verifier consults
    #[must_use]
    pub fn keys(&self) -> &Arc<KeySetCache> {
        &self.keys
    }

    /// Verify `token` as of now.
    pub async fn verify(&self, token: &str) -> Result<VerifiedClaims, Denied> {
        self.verify_at(token, Utc::now().timestamp()).await
    }

    /// Verify `token` as of `now` (Unix seconds).
    pub async fn verify_at(&self, token: &str, now: i64) -> Result<VerifiedClaims, Denied> {
        let header = TokenHeader::decode(token)?;
        let key = self.keys.get_key(&header.key_id).await?;

        let mut validation = Validation::new(ACCEPTED_ALGORITHM);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        let payload = jsonwebtoken::decode::<Map<String, Value>>(token, key.decoding_key(), &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName
                | ErrorKind::MissingAlgorithm => Denied::new(
                    AuthFailureKind::InvalidHeader,
                    format!("token algorithm rejected: {e}"),
                ),
                _ => Denied::new(
                    AuthFailureKind::InvalidSignature,
                    format!("token signature verification failed: {e}"),
                ),
            })?
            .claims;

        debug!(kid = %header.key_id, "Token signature verified");
        self.check_claims(&payload, now)
    }

    /// Registered-claim checks on an already verified payload.
    fn check_claims(&self, payload: &Map<String, Value>, now: i64) -> Result<VerifiedClaims, Denied> {
        let exp = payload.get("exp").and_then(numeric_date).ok_or_else(|| {
            Denied::new(AuthFailureKind::TokenExpired, "token has no valid 'exp' claim")
        })?;
        if exp <= now {
            return Err(Denied::new(
                AuthFailureKind::TokenExpired,
                format!("token expired {}s ago", now.saturating_sub(exp)),
            ));
        }
        let expires_at = DateTime::from_timestamp(exp, 0).ok_or_else(|| {
            Denied::new(AuthFailureKind::TokenExpired, "token 'exp' claim is out of range")
        })?;

        let audience = audience_list(payload.get("aud"));
        if !audience.iter().any(|aud| *aud == self.audience) {
            return Err(Denied::new(
                AuthFailureKind::InvalidAudience,
                format!("token audience does not include '{}'", self.audience),
            ));
        }

        let issuer = payload.get("iss").and_then(Value::as_str).unwrap_or_default();
        if issuer != self.issuer {
            return Err(Denied::new(
                AuthFailureKind::InvalidIssuer,
                format!("token issuer '{issuer}' is not '{}'", self.issuer),
            ));
        }

        let subject = payload
            .get("sub")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(VerifiedClaims {
            subject,
            issuer: issuer.to_string(),
            audience,
            expires_at,
            permissions: permission_set(payload.get(&self.permission_claim)),
        })
    }
}

/// Read a JWT NumericDate, rounding fractional seconds up so that
/// `exp > now` keeps its meaning for whole-second `now`.
#[allow(clippy::cast_possible_truncation)]
fn numeric_date(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f.ceil() as i64))
}

/// `aud` may be a single string or an array of strings.
fn audience_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(aud)) => vec![aud.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Permissions are a JSON array of strings; anything else grants nothing.
fn permission_set(value: Option<&Value>) -> BTreeSet<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(other) => {
            debug!(claim_type = %json_type(other), "Permission claim is not an array, granting nothing");
            BTreeSet::new()
        }
        None => BTreeSet::new(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
