//! TLS configuration and certificate loading.
//!
//! # Responsibilities
//! - Load the server certificate chain and private key (PEM)
//! - Load the client trust anchor (PEM CA bundle)
//! - Require a client certificate and run identity checks in the handshake
//! - Build the rustls `ServerConfig` used by the acceptor

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::WebPkiClientVerifier;
use rustls::{DigitallySignedStruct, DistinguishedName, RootCertStore, ServerConfig, SignatureScheme};
use thiserror::Error;

use crate::config::TlsConfig;
use crate::security::ChainVerifier;

/// Error type for loading TLS material.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("Cannot read {kind} file '{}': {source}", path.display())]
    Read {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No {kind} found in '{}'", path.display())]
    Empty { kind: &'static str, path: PathBuf },

    #[error("Failed to build client verifier: {0}")]
    Verifier(String),

    #[error("TLS configuration error: {0}")]
    Rustls(#[from] rustls::Error),
}

fn read_file(kind: &'static str, path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|source| TlsError::Read {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

fn parse_certs(
    kind: &'static str,
    path: &Path,
    pem: &[u8],
) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            kind,
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::Empty {
            kind,
            path: path.to_path_buf(),
        });
    }
    Ok(certs)
}

/// Load all certificates from a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let pem = read_file("certificate", path)?;
    parse_certs("certificate", path, &pem)
}

/// Load the first private key (PKCS#8, PKCS#1 or SEC1) from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let pem = read_file("private key", path)?;
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|source| TlsError::Read {
            kind: "private key",
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::Empty {
            kind: "private key",
            path: path.to_path_buf(),
        })
}

/// The CA certificates client chains must lead to.
///
/// Built once at startup and shared read-only by every handshake.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    roots: Arc<RootCertStore>,
}

impl TrustAnchor {
    /// Load a PEM bundle. Certificates rustls cannot use are skipped with a
    /// warning; a bundle with no usable CA is an error.
    pub fn load(path: &Path) -> Result<Self, TlsError> {
        let pem = read_file("CA bundle", path)?;
        let certs = parse_certs("CA bundle", path, &pem)?;
        Self::from_certs(certs, path)
    }

    fn from_certs(certs: Vec<CertificateDer<'static>>, source: &Path) -> Result<Self, TlsError> {
        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(certs);

        if ignored > 0 {
            tracing::warn!(
                path = %source.display(),
                ignored,
                "Skipped unusable certificates in CA bundle"
            );
        }
        if added == 0 {
            return Err(TlsError::Empty {
                kind: "usable CA certificate",
                path: source.to_path_buf(),
            });
        }

        tracing::debug!(path = %source.display(), roots = added, "Trust anchor loaded");
        Ok(Self {
            roots: Arc::new(roots),
        })
    }

    pub fn roots(&self) -> Arc<RootCertStore> {
        Arc::clone(&self.roots)
    }
}

/// Mandatory client authentication: WebPKI chain validation against the
/// trust anchor, then the identity checks of a [`ChainVerifier`].
#[derive(Debug)]
pub struct MutualTlsVerifier {
    trust: Arc<dyn ClientCertVerifier>,
    identity: Arc<dyn ChainVerifier>,
}

impl MutualTlsVerifier {
    pub fn new(
        anchor: &TrustAnchor,
        identity: Arc<dyn ChainVerifier>,
        provider: Arc<CryptoProvider>,
    ) -> Result<Self, TlsError> {
        let trust = WebPkiClientVerifier::builder_with_provider(anchor.roots(), provider)
            .build()
            .map_err(|e| TlsError::Verifier(e.to_string()))?;
        Ok(Self { trust, identity })
    }
}

impl ClientCertVerifier for MutualTlsVerifier {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        true
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        self.trust.root_hint_subjects()
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        let verified = self
            .trust
            .verify_client_cert(end_entity, intermediates, now)
            .inspect_err(|e| {
                tracing::warn!(error = %e, "Client certificate chain not trusted");
            })?;

        let mut chain = Vec::with_capacity(intermediates.len() + 1);
        chain.push(end_entity.clone());
        chain.extend(intermediates.iter().cloned());

        self.identity.verify(&chain).map_err(|e| {
            tracing::warn!(error = %e, "Client certificate identity rejected");
            rustls::Error::from(e)
        })?;

        Ok(verified)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.trust.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.trust.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.trust.supported_verify_schemes()
    }
}

/// Build the server TLS configuration: TLS 1.2+, client certificate
/// required, ALPN h2 and http/1.1.
pub fn build_server_config(
    config: &TlsConfig,
    identity: Arc<dyn ChainVerifier>,
) -> Result<ServerConfig, TlsError> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());

    let server_certs = load_certs(Path::new(&config.cert))?;
    let server_key = load_private_key(Path::new(&config.key))?;
    let anchor = TrustAnchor::load(Path::new(&config.ca))?;

    let verifier = MutualTlsVerifier::new(&anchor, identity, Arc::clone(&provider))?;

    let mut server_config = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?
        .with_client_cert_verifier(Arc::new(verifier))
        .with_single_cert(server_certs, server_key)?;

    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    tracing::info!(
        cert = %config.cert,
        ca = %config.ca,
        trust_roots = anchor.roots().len(),
        "mTLS enabled: client certificates required"
    );

    Ok(server_config)
}
