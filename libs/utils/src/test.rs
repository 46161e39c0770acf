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
//! Utilities for testing.

use std::path::{Path, PathBuf};

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use rustls::crypto::CryptoProvider;

/// A PEM encoded certificate together with its private key.
#[derive(Debug, Clone)]
pub struct PemIdentity {
    /// Certificate in PEM format.
    pub cert_pem: String,
    /// PKCS#8 private key in PEM format.
    pub key_pem: String,
}

impl PemIdentity {
    /// Certificate followed by key, the format `reqwest::Identity::from_pem`
    /// expects.
    pub fn combined_pem(&self) -> String {
        format!("{}{}", self.cert_pem, self.key_pem)
    }
}

/// A throwaway PKI: one CA, a server leaf and a client leaf signed by it.
pub struct TestPki {
    ca: Certificate,
    ca_key: KeyPair,
    /// Server identity valid for `localhost` and `127.0.0.1`.
    pub server: PemIdentity,
    /// Client identity.
    pub client: PemIdentity,
}

/// File locations written by [TestPki::write_to].
#[derive(Debug, Clone)]
pub struct TestPkiFiles {
    /// CA certificate.
    pub ca_cert: PathBuf,
    /// Server certificate.
    pub server_cert: PathBuf,
    /// Server private key.
    pub server_key: PathBuf,
}

impl TestPki {
    /// Generates a fresh PKI.
    pub fn generate() -> Result<Self, rcgen::Error> {
        let ca_key = KeyPair::generate()?;
        let mut params = CertificateParams::new(Vec::<String>::new())?;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
            .distinguished_name
            .push(DnType::CommonName, "wgd test CA");
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let ca = params.self_signed(&ca_key)?;

        let mut pki = Self {
            ca,
            ca_key,
            server: PemIdentity {
                cert_pem: String::new(),
                key_pem: String::new(),
            },
            client: PemIdentity {
                cert_pem: String::new(),
                key_pem: String::new(),
            },
        };
        pki.server = pki.issue(
            "wgd-registry",
            vec!["localhost".to_string(), "127.0.0.1".to_string()],
            ExtendedKeyUsagePurpose::ServerAuth,
        )?;
        pki.client = pki.issue_client("wgd-client")?;
        Ok(pki)
    }

    /// Issues an additional client certificate signed by the CA.
    pub fn issue_client(&self, common_name: &str) -> Result<PemIdentity, rcgen::Error> {
        self.issue(common_name, Vec::new(), ExtendedKeyUsagePurpose::ClientAuth)
    }

    fn issue(
        &self,
        common_name: &str,
        subject_alt_names: Vec<String>,
        usage: ExtendedKeyUsagePurpose,
    ) -> Result<PemIdentity, rcgen::Error> {
        let key = KeyPair::generate()?;
        let mut params = CertificateParams::new(subject_alt_names)?;
        params.distinguished_name.push(DnType::CommonName, common_name);
        params.extended_key_usages = vec![usage];
        let cert = params.signed_by(&key, &self.ca, &self.ca_key)?;
        Ok(PemIdentity {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        })
    }

    /// CA certificate in PEM format.
    pub fn ca_pem(&self) -> String {
        self.ca.pem()
    }

    /// Writes the CA certificate and the server identity into `dir`.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<TestPkiFiles> {
        let files = TestPkiFiles {
            ca_cert: dir.join("ca.pem"),
            server_cert: dir.join("server.pem"),
            server_key: dir.join("server.key"),
        };
        std::fs::write(&files.ca_cert, self.ca_pem())?;
        std::fs::write(&files.server_cert, &self.server.cert_pem)?;
        std::fs::write(&files.server_key, &self.server.key_pem)?;
        Ok(files)
    }
}

/// Installs the `ring` crypto provider for rustls.
pub fn install_rustls_crypto_provider() {
    use std::sync::Once;

    // Ensure this is only run once per process.
    static START: Once = Once::new();
    START.call_once(|| {
        // Fails only if another provider was installed first.
        let _ = CryptoProvider::install_default(rustls::crypto::ring::default_provider());
    });
}
