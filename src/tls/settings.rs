use std::{
    fmt::{self, Debug, Formatter},
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use openssl::{
    ssl::{ConnectConfiguration, SslContextBuilder, SslVerifyMode},
    x509::{X509, store::X509StoreBuilder},
};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use super::{
    AddCertToStoreSnafu, FileOpenFailedSnafu, FileReadFailedSnafu, MissingCertificateSnafu,
    NewStoreBuilderSnafu, Result, SetVerifyCertSnafu, X509ParseFailedSnafu,
};

const PEM_START_MARKER: &str = "-----BEGIN ";

/// Standard TLS options
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TlsOptions {
    /// Verify the certificate presented by the peer. Defaults to `true`.
    pub verify_certificate: Option<bool>,
    /// Verify that the peer's hostname matches its certificate. Defaults to `true`.
    pub verify_hostname: Option<bool>,
    /// Additional CA certificate(s) in PEM or DER format.
    #[serde(alias = "ca_path")]
    pub ca_file: Option<PathBuf>,
}

impl TlsOptions {
    /// Options that accept any certificate presented by the peer.
    pub fn insecure() -> Self {
        Self {
            verify_certificate: Some(false),
            verify_hostname: Some(false),
            ca_file: None,
        }
    }

    fn load_authorities(&self) -> Result<Vec<X509>> {
        match &self.ca_file {
            None => Ok(vec![]),
            Some(filename) => {
                let data = open_read(filename, "certificate")?;
                let authorities = if data.starts_with(PEM_START_MARKER.as_bytes()) {
                    X509::stack_from_pem(&data)
                } else {
                    X509::from_der(&data).map(|x509| vec![x509])
                }
                .with_context(|_| X509ParseFailedSnafu { filename })?;

                if authorities.is_empty() {
                    return MissingCertificateSnafu { filename }.fail();
                }
                Ok(authorities)
            }
        }
    }
}

/// Directly usable settings for TLS connectors
#[derive(Clone, Default)]
pub struct TlsSettings {
    verify_certificate: bool,
    verify_hostname: bool,
    authorities: Vec<X509>,
}

impl TlsSettings {
    /// Generate a filled out settings struct from the given optional
    /// option set, interpreted as client options. If `options` is
    /// `None`, certificates and hostnames are verified against the
    /// system roots.
    pub fn from_options(options: &Option<TlsOptions>) -> Result<Self> {
        let default = TlsOptions::default();
        let options = options.as_ref().unwrap_or(&default);

        if options.verify_certificate == Some(false) {
            warn!("`verify_certificate` is DISABLED, this may lead to security vulnerabilities.");
        }
        if options.verify_hostname == Some(false) {
            warn!("`verify_hostname` is DISABLED, this may lead to security vulnerabilities.");
        }

        Ok(Self {
            verify_certificate: options.verify_certificate.unwrap_or(true),
            verify_hostname: options.verify_hostname.unwrap_or(true),
            authorities: options.load_authorities()?,
        })
    }

    pub const fn verify_certificate(&self) -> bool {
        self.verify_certificate
    }

    pub(super) fn apply_context(&self, context: &mut SslContextBuilder) -> Result<()> {
        context.set_verify(if self.verify_certificate {
            SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT
        } else {
            SslVerifyMode::NONE
        });

        if !self.authorities.is_empty() {
            let mut store = X509StoreBuilder::new().context(NewStoreBuilderSnafu)?;
            for authority in &self.authorities {
                store
                    .add_cert(authority.clone())
                    .context(AddCertToStoreSnafu)?;
            }
            context
                .set_verify_cert_store(store.build())
                .context(SetVerifyCertSnafu)?;
        } else {
            debug!("Fetching system root certs.");
        }

        Ok(())
    }

    pub fn apply_connect_configuration(&self, connection: &mut ConnectConfiguration) {
        connection.set_verify_hostname(self.verify_hostname);
    }
}

impl Debug for TlsSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSettings")
            .field("verify_certificate", &self.verify_certificate)
            .field("verify_hostname", &self.verify_hostname)
            .field("authorities", &self.authorities.len())
            .finish()
    }
}

fn open_read(filename: &Path, note: &'static str) -> Result<Vec<u8>> {
    let mut text = Vec::<u8>::new();

    File::open(filename)
        .with_context(|_| FileOpenFailedSnafu { note, filename })?
        .read_to_end(&mut text)
        .with_context(|_| FileReadFailedSnafu { note, filename })?;

    Ok(text)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::tls::TlsError;

    #[test]
    fn defaults_verify_everything() {
        let settings = TlsSettings::from_options(&None).unwrap();
        assert!(settings.verify_certificate);
        assert!(settings.verify_hostname);
        assert!(settings.authorities.is_empty());
    }

    #[test]
    fn insecure_disables_verification() {
        let settings = TlsSettings::from_options(&Some(TlsOptions::insecure())).unwrap();
        assert!(!settings.verify_certificate());
        assert!(!settings.verify_hostname);
    }

    #[test]
    fn missing_ca_file_fails() {
        let options = TlsOptions {
            ca_file: Some("/nonexistent/ca.pem".into()),
            ..Default::default()
        };
        let error = TlsSettings::from_options(&Some(options)).unwrap_err();
        assert!(matches!(error, TlsError::FileOpenFailed { .. }), "{error}");
    }

    #[test]
    fn garbage_ca_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"-----BEGIN CERTIFICATE-----\nnot base64\n-----END CERTIFICATE-----\n")
            .unwrap();

        let options = TlsOptions {
            ca_file: Some(file.path().to_owned()),
            ..Default::default()
        };
        assert!(TlsSettings::from_options(&Some(options)).is_err());
    }
}
