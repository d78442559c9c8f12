//! Client certificate identity verification.
//!
//! # Responsibilities
//! - Parse every certificate of an already trust-validated chain
//! - Skip CA certificates (intermediates, roots)
//! - Check each end-entity certificate against the required identity
//!
//! # Design Decisions
//! - Chain-of-trust validation is done by rustls before this runs
//! - One unparsable certificate rejects the whole chain, even an intermediate
//! - Every non-CA certificate is checked, not only the first one
//! - Name matching uses the same rules as TLS server-name verification

use std::fmt;

use rustls::pki_types::{CertificateDer, InvalidDnsNameError, ServerName};
use rustls::server::ParsedCertificate;
use rustls::{CertificateError, Error as TlsError};
use thiserror::Error;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::config::ProxyConfig;

/// Why a presented chain was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no client certificate presented")]
    EmptyChain,

    #[error("certificate #{index} could not be parsed: {reason}")]
    Parse { index: usize, reason: String },

    #[error("certificate #{index} ({subject}) is not valid for '{expected}'")]
    IdentityMismatch {
        index: usize,
        subject: String,
        expected: String,
    },
}

impl From<AuthError> for TlsError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::EmptyChain => TlsError::NoCertificatesPresented,
            AuthError::Parse { .. } => TlsError::InvalidCertificate(CertificateError::BadEncoding),
            AuthError::IdentityMismatch { .. } => {
                TlsError::InvalidCertificate(CertificateError::NotValidForName)
            }
        }
    }
}

/// Decides whether a presented certificate chain is acceptable.
///
/// The chain is ordered end-entity first, as sent by the peer.
pub trait ChainVerifier: Send + Sync + fmt::Debug {
    fn verify(&self, chain: &[CertificateDer<'_>]) -> Result<(), AuthError>;
}

/// The identity client certificates must be valid for, if any.
#[derive(Debug, Clone, Default)]
pub struct IdentityConstraint(Option<ServerName<'static>>);

impl IdentityConstraint {
    /// No identity check beyond chain validity.
    pub fn none() -> Self {
        Self(None)
    }

    /// Parse a required identity (DNS name or IP address).
    ///
    /// A blank string means no constraint.
    pub fn new(name: &str) -> Result<Self, InvalidDnsNameError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(Self::none());
        }
        ServerName::try_from(name.to_string()).map(|name| Self(Some(name)))
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self, InvalidDnsNameError> {
        Self::new(config.required_identity().unwrap_or_default())
    }

    pub fn server_name(&self) -> Option<&ServerName<'static>> {
        self.0.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }
}

impl fmt::Display for IdentityConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(name) => f.write_str(&name.to_str()),
            None => f.write_str("<any>"),
        }
    }
}

/// Checks leaf certificates against an [`IdentityConstraint`].
#[derive(Debug, Clone, Default)]
pub struct IdentityVerifier {
    constraint: IdentityConstraint,
}

impl IdentityVerifier {
    pub fn new(constraint: IdentityConstraint) -> Self {
        Self { constraint }
    }
}

impl ChainVerifier for IdentityVerifier {
    fn verify(&self, chain: &[CertificateDer<'_>]) -> Result<(), AuthError> {
        if chain.is_empty() {
            return Err(AuthError::EmptyChain);
        }

        for (index, der) in chain.iter().enumerate() {
            let parse_err = |reason: String| AuthError::Parse { index, reason };

            let (_, cert) =
                X509Certificate::from_der(der.as_ref()).map_err(|e| parse_err(e.to_string()))?;
            let is_ca = cert
                .basic_constraints()
                .map_err(|e| parse_err(e.to_string()))?
                .is_some_and(|bc| bc.value.ca);
            if is_ca {
                continue;
            }

            let Some(expected) = self.constraint.server_name() else {
                continue;
            };

            let end_entity = ParsedCertificate::try_from(der).map_err(|e| parse_err(e.to_string()))?;
            if rustls::client::verify_server_name(&end_entity, expected).is_err() {
                return Err(AuthError::IdentityMismatch {
                    index,
                    subject: cert.subject().to_string(),
                    expected: expected.to_str().into_owned(),
                });
            }
        }

        Ok(())
    }
}

/// Short human-readable subject of a certificate, for logs.
pub fn describe_subject(der: &CertificateDer<'_>) -> String {
    match X509Certificate::from_der(der.as_ref()) {
        Ok((_, cert)) => cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_owned)
            .unwrap_or_else(|| cert.subject().to_string()),
        Err(_) => "<unparsable>".to_string(),
    }
}
