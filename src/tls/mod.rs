use std::path::PathBuf;

use openssl::{
    error::ErrorStack,
    ssl::{SslConnector, SslConnectorBuilder, SslMethod},
};
use snafu::{ResultExt, Snafu};

mod settings;

pub use settings::{TlsOptions, TlsSettings};

pub type Result<T> = std::result::Result<T, TlsError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TlsError {
    #[snafu(display("Could not open {} file {:?}: {}", note, filename, source))]
    FileOpenFailed {
        note: &'static str,
        filename: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Could not read {} file {:?}: {}", note, filename, source))]
    FileReadFailed {
        note: &'static str,
        filename: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Could not parse X509 certificate in {:?}: {}", filename, source))]
    X509ParseFailed {
        filename: PathBuf,
        source: ErrorStack,
    },
    #[snafu(display("No certificates found in {:?}", filename))]
    MissingCertificate { filename: PathBuf },
    #[snafu(display("Could not build certificate store: {}", source))]
    NewStoreBuilder { source: ErrorStack },
    #[snafu(display("Could not add certificate to store: {}", source))]
    AddCertToStore { source: ErrorStack },
    #[snafu(display("Error setting verify certificate store: {}", source))]
    SetVerifyCert { source: ErrorStack },
    #[snafu(display("Could not build TLS connector: {}", source))]
    TlsBuildConnector { source: ErrorStack },
}

/// Builds an OpenSSL client connector configured from `settings`.
pub fn tls_connector_builder(settings: &TlsSettings) -> Result<SslConnectorBuilder> {
    let mut builder = SslConnector::builder(SslMethod::tls()).context(TlsBuildConnectorSnafu)?;
    settings.apply_context(&mut builder)?;
    Ok(builder)
}
