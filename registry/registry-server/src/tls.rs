// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Mutual TLS configuration of the registry API.
//!
//! Clients must present a certificate that chains to the configured client
//! CA. Connections without one fail during the handshake.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use rustls::{
    RootCertStore, ServerConfig,
    pki_types::{CertificateDer, PrivateKeyDer},
    server::{VerifierBuilderError, WebPkiClientVerifier},
};
use thiserror::Error;

/// TLS setup errors.
#[derive(Debug, Error)]
pub enum TlsSetupError {
    /// A PEM file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
    /// PEM input could not be parsed.
    #[error("invalid PEM in {what}: {source}")]
    Pem {
        /// Which input failed.
        what: &'static str,
        /// The underlying error.
        source: io::Error,
    },
    /// The input contained no certificate.
    #[error("no certificate found in {0}")]
    NoCertificate(&'static str),
    /// The key file contained no private key.
    #[error("no private key found")]
    NoPrivateKey,
    /// The client verifier could not be built.
    #[error("invalid client CA: {0}")]
    ClientVerifier(#[from] VerifierBuilderError),
    /// rustls rejected the configuration.
    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// PEM encoded TLS material of the registry endpoint.
#[derive(Clone)]
pub struct TlsMaterial {
    /// Server certificate chain, leaf first.
    pub cert_chain_pem: Vec<u8>,
    /// Private key of the server certificate.
    pub key_pem: Vec<u8>,
    /// Trust root for client certificates.
    pub client_ca_pem: Vec<u8>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial").finish_non_exhaustive()
    }
}

impl TlsMaterial {
    /// Reads the TLS material from PEM files.
    pub async fn load(
        cert_file: &Path,
        key_file: &Path,
        client_ca_file: &Path,
    ) -> Result<Self, TlsSetupError> {
        Ok(Self {
            cert_chain_pem: read(cert_file).await?,
            key_pem: read(key_file).await?,
            client_ca_pem: read(client_ca_file).await?,
        })
    }

    /// Builds the rustls server configuration. HTTP/2 and HTTP/1.1 are
    /// offered through ALPN.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>, TlsSetupError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut roots = RootCertStore::empty();
        for ca in parse_certs(&self.client_ca_pem, "client CA")? {
            roots.add(ca)?;
        }
        let verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
                .build()?;

        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_client_cert_verifier(verifier)
            .with_single_cert(
                parse_certs(&self.cert_chain_pem, "server certificate")?,
                parse_key(&self.key_pem)?,
            )?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        Ok(Arc::new(config))
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, TlsSetupError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| TlsSetupError::Read {
            path: path.to_path_buf(),
            source,
        })
}

fn parse_certs(
    pem: &[u8],
    what: &'static str,
) -> Result<Vec<CertificateDer<'static>>, TlsSetupError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsSetupError::Pem { what, source })?;
    if certs.is_empty() {
        return Err(TlsSetupError::NoCertificate(what));
    }
    Ok(certs)
}

fn parse_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, TlsSetupError> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|source| TlsSetupError::Pem {
            what: "private key",
            source,
        })?
        .ok_or(TlsSetupError::NoPrivateKey)
}

#[cfg(test)]
mod tests {
    use wgd_utils::test::TestPki;

    use super::*;

    fn material(pki: &TestPki) -> TlsMaterial {
        TlsMaterial {
            cert_chain_pem: pki.server.cert_pem.clone().into_bytes(),
            key_pem: pki.server.key_pem.clone().into_bytes(),
            client_ca_pem: pki.ca_pem().into_bytes(),
        }
    }

    #[test]
    fn builds_mutual_tls_config() {
        let pki = TestPki::generate().unwrap();
        let config = material(&pki).server_config().unwrap();
        assert_eq!(config.alpn_protocols[0], b"h2");
    }

    #[test]
    fn rejects_incomplete_material() {
        let pki = TestPki::generate().unwrap();

        let mut no_ca = material(&pki);
        no_ca.client_ca_pem = Vec::new();
        assert!(matches!(
            no_ca.server_config(),
            Err(TlsSetupError::NoCertificate("client CA"))
        ));

        let mut no_key = material(&pki);
        no_key.key_pem = pki.server.cert_pem.clone().into_bytes();
        assert!(matches!(
            no_key.server_config(),
            Err(TlsSetupError::NoPrivateKey)
        ));
    }

    #[test_log::test(tokio::test)]
    async fn loads_material_from_files() {
        let pki = TestPki::generate().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let files = pki.write_to(dir.path()).unwrap();

        let loaded = TlsMaterial::load(&files.server_cert, &files.server_key, &files.ca_cert)
            .await
            .unwrap();
        assert!(loaded.server_config().is_ok());

        let missing = TlsMaterial::load(
            &dir.path().join("missing.pem"),
            &files.server_key,
            &files.ca_cert,
        )
        .await;
        assert!(matches!(missing, Err(TlsSetupError::Read { .. })));
    }
}
