//! Range queries against the Prometheus HTTP API, as served by Prometheus
//! itself or a Thanos querier.

use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use url::Url;

use crate::{
    http::{Auth, HttpClient, HttpError},
    tls::{TlsError, TlsOptions, TlsSettings},
};

mod api;
mod client;

pub use client::PrometheusClient;

pub const DEFAULT_ENDPOINT: &str = "https://thanos-querier.openshift-monitoring.svc:9091";

/// Token mounted into every pod running under a service account.
pub const DEFAULT_TOKEN_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

#[derive(Debug, Snafu)]
pub enum BuildError {
    #[snafu(display("Invalid endpoint {:?}: {}", endpoint, source))]
    InvalidEndpoint {
        endpoint: String,
        source: url::ParseError,
    },
    #[snafu(display("Endpoint {:?} must be an http or https URL", endpoint))]
    UnsupportedEndpoint { endpoint: String },
    #[snafu(display("Could not read token file {:?}: {}", path, source))]
    ReadTokenFile { path: PathBuf, source: io::Error },
    #[snafu(display("Token file {:?} is empty", path))]
    EmptyTokenFile { path: PathBuf },
    #[snafu(display("Invalid TLS settings: {}", source))]
    Tls { source: TlsError },
    #[snafu(display("Failed to build HTTP client: {}", source))]
    Client { source: HttpError },
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Base URL of the Prometheus compatible API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Credentials sent with every request. Takes precedence over `token_file`.
    #[serde(default)]
    pub auth: Option<Auth>,

    /// File holding a bearer token. When unset, the service account token is
    /// used if it exists.
    #[serde(default)]
    pub token_file: Option<PathBuf>,

    #[serde(default)]
    pub tls: Option<TlsOptions>,

    /// Bound on every request, including reading the response.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            auth: None,
            token_file: None,
            tls: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_owned()
}

const fn default_timeout_secs() -> u64 {
    10
}

impl PrometheusConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Err(error) = self.endpoint_url() {
            errors.push(format!("`source.endpoint`: {error}."));
        }
        if self.timeout_secs == 0 {
            errors.push("`source.timeout_secs` must be greater than zero.".to_owned());
        }

        errors
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn endpoint_url(&self) -> Result<Url, BuildError> {
        let url = Url::parse(&self.endpoint).with_context(|_| InvalidEndpointSnafu {
            endpoint: &self.endpoint,
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return UnsupportedEndpointSnafu {
                endpoint: &self.endpoint,
            }
            .fail();
        }
        Ok(url)
    }

    /// The credentials to send: the literal `auth` if set, otherwise a bearer
    /// token read from `token_file` or the service account token.
    pub fn resolve_auth(&self) -> Result<Option<Auth>, BuildError> {
        if let Some(auth) = &self.auth {
            return Ok(Some(auth.clone()));
        }

        match &self.token_file {
            Some(path) => read_token(path).map(Some),
            None => {
                let path = Path::new(DEFAULT_TOKEN_FILE);
                if path.exists() {
                    read_token(path).map(Some)
                } else {
                    debug!(
                        message = "No service account token found, sending requests without credentials.",
                        path = %path.display(),
                    );
                    Ok(None)
                }
            }
        }
    }

    pub fn build(&self) -> Result<PrometheusClient, BuildError> {
        let endpoint = self.endpoint_url()?;
        let auth = self.resolve_auth()?;
        let tls = TlsSettings::from_options(&self.tls).context(TlsSnafu)?;
        let client = HttpClient::new(&tls).context(ClientSnafu)?;

        Ok(PrometheusClient::new(client, endpoint, auth, self.timeout()))
    }
}

fn read_token(path: &Path) -> Result<Auth, BuildError> {
    let token = std::fs::read_to_string(path).context(ReadTokenFileSnafu { path })?;
    let token = token.trim();
    if token.is_empty() {
        return EmptyTokenFileSnafu { path }.fail();
    }
    Ok(Auth::Bearer {
        token: token.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn default_endpoint_is_valid() {
        assert!(PrometheusConfig::default().validate().is_empty());
    }

    #[test]
    fn rejects_bad_endpoints() {
        for endpoint in ["not a url", "ftp://example.com", "mailto:someone@example.com"] {
            let config = PrometheusConfig {
                endpoint: endpoint.into(),
                ..Default::default()
            };
            assert_eq!(config.validate().len(), 1, "{endpoint}");
        }
    }

    #[test]
    fn literal_auth_wins_over_token_file() {
        let config = PrometheusConfig {
            auth: Some(Auth::Bearer {
                token: "literal".into(),
            }),
            token_file: Some("/nonexistent/token".into()),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_auth().unwrap(),
            Some(Auth::Bearer {
                token: "literal".into()
            })
        );
    }

    #[test]
    fn reads_and_trims_token_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  secret-token  ").unwrap();

        let config = PrometheusConfig {
            token_file: Some(file.path().to_owned()),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_auth().unwrap(),
            Some(Auth::Bearer {
                token: "secret-token".into()
            })
        );
    }

    #[test]
    fn missing_explicit_token_file_is_an_error() {
        let config = PrometheusConfig {
            token_file: Some("/nonexistent/token".into()),
            ..Default::default()
        };
        assert!(matches!(
            config.resolve_auth(),
            Err(BuildError::ReadTokenFile { .. })
        ));
    }

    #[test]
    fn empty_token_file_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = PrometheusConfig {
            token_file: Some(file.path().to_owned()),
            ..Default::default()
        };
        assert!(matches!(
            config.resolve_auth(),
            Err(BuildError::EmptyTokenFile { .. })
        ));
    }
}
