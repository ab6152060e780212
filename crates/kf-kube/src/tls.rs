//! TLS client configuration
//!
//! One rustls config is built per cluster and shared by the REST client and
//! the WebSocket dialer, so both present the same client certificate and
//! trust the same roots.

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ClientConfig;

use kf_core::error::ConnectionError;
use kf_core::{ClusterConnectionInfo, Credentials};

/// Build the rustls client config for a cluster
pub(crate) fn client_config(info: &ClusterConnectionInfo) -> Result<ClientConfig, ConnectionError> {
    ensure_crypto_provider();

    let builder = if info.insecure_skip_tls_verify {
        tracing::warn!(
            "TLS verification disabled for cluster '{}' (INSECURE)",
            info.name
        );
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(SkipVerification::new())
    } else {
        ClientConfig::builder().with_root_certificates(root_store(info)?)
    };

    let config = match &info.credentials {
        Credentials::ClientCertificate {
            certificate_pem,
            key_pem,
        } => builder
            .with_client_auth_cert(parse_certs(certificate_pem)?, parse_key(key_pem)?)
            .map_err(|e| ConnectionError::Tls(format!("Invalid client certificate: {}", e)))?,
        _ => builder.with_no_client_auth(),
    };

    Ok(config)
}

fn root_store(info: &ClusterConnectionInfo) -> Result<rustls::RootCertStore, ConnectionError> {
    let mut roots = rustls::RootCertStore::empty();

    match &info.certificate_authority {
        Some(pem) => {
            for cert in parse_certs(pem)? {
                roots
                    .add(cert)
                    .map_err(|e| ConnectionError::Tls(format!("Invalid CA certificate: {}", e)))?;
            }
        }
        None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }

    Ok(roots)
}

fn parse_certs(pem: &str) -> Result<Vec<CertificateDer<'static>>, ConnectionError> {
    let certs = rustls_pemfile::certs(&mut pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConnectionError::Tls(format!("Failed to parse certificates: {}", e)))?;

    if certs.is_empty() {
        return Err(ConnectionError::Tls(
            "No certificates found in PEM data".to_string(),
        ));
    }
    Ok(certs)
}

fn parse_key(pem: &str) -> Result<PrivateKeyDer<'static>, ConnectionError> {
    rustls_pemfile::private_key(&mut pem.as_bytes())
        .map_err(|e| ConnectionError::Tls(format!("Failed to parse private key: {}", e)))?
        .ok_or_else(|| ConnectionError::Tls("No private key found in PEM data".to_string()))
}

// Initialize rustls crypto provider
static CRYPTO_PROVIDER_INIT: std::sync::Once = std::sync::Once::new();

fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            tracing::debug!("Rustls crypto provider already installed");
        }
    });
}

// Certificate verifier that accepts any server (INSECURE)
#[derive(Debug)]
struct SkipVerification;

impl SkipVerification {
    fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl rustls::client::danger::ServerCertVerifier for SkipVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roots() {
        let info = ClusterConnectionInfo::new("prod", "https://k8s.example.com");
        assert!(client_config(&info).is_ok());
    }

    #[test]
    fn test_insecure_mode() {
        let mut info = ClusterConnectionInfo::new("dev", "https://127.0.0.1:6443");
        info.insecure_skip_tls_verify = true;
        assert!(client_config(&info).is_ok());
    }

    #[test]
    fn test_garbage_ca_is_rejected() {
        let mut info = ClusterConnectionInfo::new("dev", "https://127.0.0.1:6443");
        info.certificate_authority = Some("not a certificate".to_string());
        assert!(matches!(
            client_config(&info),
            Err(ConnectionError::Tls(_))
        ));
    }

    #[test]
    fn test_missing_client_key_is_rejected() {
        let mut info = ClusterConnectionInfo::new("dev", "https://127.0.0.1:6443");
        info.insecure_skip_tls_verify = true;
        info.credentials = Credentials::ClientCertificate {
            certificate_pem: "garbage".to_string(),
            key_pem: "garbage".to_string(),
        };
        assert!(client_config(&info).is_err());
    }
}
