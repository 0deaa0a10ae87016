//! TLS client configuration and the pinning handshake hook.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::{VerifierBuilderError, WebPkiServerVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::observability::metrics;
use crate::security::pinning::{verify, PinnedKey};

/// Error constructing the TLS configuration.
#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    #[error("failed to build certificate verifier: {0}")]
    Builder(#[from] VerifierBuilderError),
    #[error("failed to configure TLS: {0}")]
    Config(#[from] rustls::Error),
}

/// Server certificate verifier that adds public-key pinning on top of WebPKI.
///
/// The default chain validation always runs first; pinning can only turn an
/// accepted chain into a rejected one.
#[derive(Debug)]
pub struct PinningVerifier {
    pins: Arc<[PinnedKey]>,
    inner: Arc<WebPkiServerVerifier>,
}

impl PinningVerifier {
    /// Verifier trusting the bundled web PKI roots.
    pub fn new(pins: Vec<PinnedKey>, provider: Arc<CryptoProvider>) -> Result<Self, VerifierError> {
        let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::with_roots(pins, roots, provider)
    }

    /// Verifier trusting `roots`.
    pub fn with_roots(
        pins: Vec<PinnedKey>,
        roots: RootCertStore,
        provider: Arc<CryptoProvider>,
    ) -> Result<Self, VerifierError> {
        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider).build()?;
        Ok(Self {
            pins: pins.into(),
            inner,
        })
    }

    pub fn pins(&self) -> &[PinnedKey] {
        &self.pins
    }
}

impl ServerCertVerifier for PinningVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let verified = self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        )?;

        let host = host_of(server_name);
        let chain: Vec<CertificateDer<'_>> = std::iter::once(end_entity.clone())
            .chain(intermediates.iter().cloned())
            .collect();

        if verify(&self.pins, &chain, &host) {
            Ok(verified)
        } else {
            tracing::warn!(host = %host, "Server certificate rejected by pin");
            metrics::record_pin_rejection();
            Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

fn host_of(server_name: &ServerName<'_>) -> String {
    match server_name {
        ServerName::DnsName(name) => name.as_ref().to_string(),
        ServerName::IpAddress(ip) => std::net::IpAddr::from(*ip).to_string(),
        _ => String::new(),
    }
}

/// Build a rustls client configuration using [`PinningVerifier`].
pub fn pinned_client_config(pins: Vec<PinnedKey>) -> Result<ClientConfig, VerifierError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = PinningVerifier::new(pins, provider.clone())?;
    tracing::debug!(pins = verifier.pins().len(), "Certificate pinning verifier ready");

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();

    Ok(config)
}
