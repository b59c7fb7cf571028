//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The only signing algorithm accepted for inbound tokens.
pub const SUPPORTED_ALGORITHM: &str = "RS256";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    /// Variables are set into the process environment for `${VAR}` resolution.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Token verification configuration
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Identity provider settings used to verify bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Expected `iss` claim, e.g. `https://tenant.auth0.com/`
    pub issuer: String,
    /// Expected `aud` claim
    pub audience: String,
    /// JWKS endpoint. Derived from the issuer when unset.
    pub jwks_url: Option<String>,
    /// Claim holding the caller's permission list
    pub permission_claim: String,
    /// Signing algorithm (only `RS256` is accepted)
    pub algorithm: String,
    /// Upper bound on a single JWKS fetch
    #[serde(with = "humantime_serde")]
    pub jwks_fetch_timeout: Duration,
    /// Age after which the cached key set is refreshed on next use
    #[serde(with = "humantime_serde")]
    pub jwks_max_age: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            audience: String::new(),
            jwks_url: None,
            permission_claim: "permissions".to_string(),
            algorithm: SUPPORTED_ALGORITHM.to_string(),
            jwks_fetch_timeout: Duration::from_secs(5),
            jwks_max_age: Duration::from_secs(3600),
        }
    }
}

impl AuthConfig {
    /// The JWKS endpoint, falling back to the issuer's well-known path.
    #[must_use]
    pub fn resolved_jwks_url(&self) -> String {
        self.jwks_url
            .clone()
            .unwrap_or_else(|| default_jwks_url(&self.issuer))
    }

    /// Check that the settings can verify anything at all.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.issuer.trim().is_empty() {
            return Err(Error::Config("auth.issuer must not be empty".to_string()));
        }
        if self.audience.trim().is_empty() {
            return Err(Error::Config("auth.audience must not be empty".to_string()));
        }
        if self.permission_claim.trim().is_empty() {
            return Err(Error::Config(
                "auth.permission_claim must not be empty".to_string(),
            ));
        }
        if self.algorithm != SUPPORTED_ALGORITHM {
            return Err(Error::Config(format!(
                "auth.algorithm must be {SUPPORTED_ALGORITHM}, got {}",
                self.algorithm
            )));
        }
        if self.jwks_fetch_timeout.is_zero() {
            return Err(Error::Config(
                "auth.jwks_fetch_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Derive the default JWKS URL from the issuer URL.
fn default_jwks_url(issuer: &str) -> String {
    let base = issuer.trim_end_matches('/');
    format!("{base}/.well-known/jwks.json")
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // WAREHOUSE_AUTH__AUDIENCE=... -> auth.audience
        figment = figment.merge(Env::prefixed("WAREHOUSE_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.expand_env_vars()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                    Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in the identity provider settings
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Internal(e.to_string()))?;

        self.auth.issuer = Self::expand_string(&re, &self.auth.issuer);
        self.auth.audience = Self::expand_string(&re, &self.auth.audience);
        if let Some(url) = self.auth.jwks_url.as_mut() {
            *url = Self::expand_string(&re, url);
        }
        Ok(())
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn default_jwks_url_appends_well_known() {
        assert_eq!(
            default_jwks_url("https://warehouse.eu.auth0.com/"),
            "https://warehouse.eu.auth0.com/.well-known/jwks.json"
        );
        assert_eq!(
            default_jwks_url("https://idp.example"),
            "https://idp.example/.well-known/jwks.json"
        );
    }

    #[test]
    fn explicit_jwks_url_wins() {
        let auth = AuthConfig {
            issuer: "https://idp.example/".to_string(),
            jwks_url: Some("https://keys.example/jwks".to_string()),
            ..AuthConfig::default()
        };
        assert_eq!(auth.resolved_jwks_url(), "https://keys.example/jwks");
    }

    #[test]
    fn validate_rejects_missing_issuer_and_symmetric_algorithm() {
        let mut auth = AuthConfig {
            audience: "warehouse".to_string(),
            ..AuthConfig::default()
        };
        assert!(auth.validate().is_err());

        auth.issuer = "https://idp.example/".to_string();
        assert!(auth.validate().is_ok());

        auth.algorithm = "HS256".to_string();
        let err = auth.validate().unwrap_err();
        assert!(err.to_string().contains("RS256"));
    }

    #[test]
    fn load_reads_yaml_file() {
        // GIVEN: a YAML config on disk
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server:\n  port: 9191\nauth:\n  issuer: https://idp.example/\n  audience: warehouse\n  jwks_fetch_timeout: 2s"
        )
        .unwrap();

        // WHEN: loaded
        let config = Config::load(Some(file.path())).unwrap();

        // THEN: file values override defaults, the rest stay default
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.auth.audience, "warehouse");
        assert_eq!(config.auth.jwks_fetch_timeout, Duration::from_secs(2));
        assert_eq!(config.auth.permission_claim, "permissions");
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let result = Config::load(Some(Path::new("/definitely/not/here.yaml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn expand_string_uses_default_when_unset() {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
        let value = Config::expand_string(&re, "${WAREHOUSE_TEST_UNSET_AUD:-warehouse}");
        assert_eq!(value, "warehouse");
    }
}
