// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Key pair and CSR (Certificate Signing Request) generation.
//!
//! Every enrollment attempt gets a fresh RSA key. The private key never
//! leaves this process: it is used once to sign the PKCS#10 request and
//! once to render the downloadable key file, and is zeroized on drop.

use std::str::FromStr;

use const_oid::db::rfc4519;
use const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION;
use der::asn1::SetOfVec;
use der::pem::LineEnding;
use der::{DecodePem, Encode, EncodePem, Tag};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use x509_cert::attr::{AttributeTypeAndValue, AttributeValue};
use x509_cert::builder::{Builder, RequestBuilder};
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::request::CertReq;
use zeroize::Zeroizing;

use crate::error::{EnrollError, Result};

/// RSA modulus size for generated keys.
pub const RSA_KEY_BITS: usize = 2048;

/// Key material for one enrollment attempt.
///
/// Not `Clone`: an attempt owns its key exclusively.
pub struct KeyMaterial {
    private_key: RsaPrivateKey,
    csr: CertReq,
    csr_pem: String,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("private_key", &"<redacted>")
            .field("subject", &self.csr.info.subject.to_string())
            .finish()
    }
}

impl KeyMaterial {
    /// Generate a fresh key pair and a self-verified CSR for `subject`.
    ///
    /// See [`create_certificate_signing_request`].
    pub fn generate(subject: &str) -> Result<Self> {
        create_certificate_signing_request(subject)
    }

    /// PEM-encoded PKCS#10 request (`BEGIN CERTIFICATE REQUEST`).
    pub fn csr_pem(&self) -> &str {
        &self.csr_pem
    }

    /// The decoded request.
    pub fn csr(&self) -> &CertReq {
        &self.csr
    }

    /// The public half of the key pair.
    pub fn public_key(&self) -> RsaPublicKey {
        self.private_key.to_public_key()
    }

    /// PEM-encoded PKCS#1 private key (`BEGIN RSA PRIVATE KEY`).
    pub fn private_key_pem(&self) -> Result<Zeroizing<String>> {
        self.private_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| EnrollError::csr(format!("Failed to encode private key: {}", e)))
    }
}

/// Parse a configured subject into an X.509 name.
///
/// RFC 4514 strings such as `CN=client,O=Example` are parsed as a
/// distinguished name. Any other non-empty value becomes a single
/// `CN` attribute.
pub fn parse_subject(subject: &str) -> Result<Name> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(EnrollError::csr("Certificate subject is empty"));
    }

    if subject.contains('=')
        && let Ok(name) = RdnSequence::from_str(subject)
        && !name.0.is_empty()
    {
        return Ok(name);
    }

    common_name(subject)
}

fn common_name(value: &str) -> Result<Name> {
    let value = AttributeValue::new(Tag::Utf8String, value.as_bytes())
        .map_err(|e| EnrollError::csr(format!("Invalid common name: {}", e)))?;
    let atv = AttributeTypeAndValue {
        oid: rfc4519::CN,
        value,
    };
    let rdn = SetOfVec::try_from(vec![atv])
        .map_err(|e| EnrollError::csr(format!("Invalid common name: {}", e)))?;

    Ok(RdnSequence(vec![RelativeDistinguishedName(rdn)]))
}

/// Generate an RSA key pair and a CSR signed with SHA-256-with-RSA.
///
/// The request is verified against its own embedded public key before it
/// is returned; a request that fails verification is never handed out.
pub fn create_certificate_signing_request(subject: &str) -> Result<KeyMaterial> {
    let name = parse_subject(subject)?;

    tracing::debug!("Generating {}-bit RSA key pair", RSA_KEY_BITS);
    let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), RSA_KEY_BITS)
        .map_err(|e| EnrollError::csr(format!("Failed to generate key pair: {}", e)))?;

    let signer = SigningKey::<Sha256>::new(private_key.clone());
    let builder = RequestBuilder::new(name, &signer)
        .map_err(|e| EnrollError::csr(format!("Failed to build CSR: {}", e)))?;
    let csr = builder
        .build::<Signature>()
        .map_err(|e| EnrollError::csr(format!("Failed to sign CSR: {}", e)))?;

    verify_csr(&csr)?;

    let csr_pem = csr
        .to_pem(LineEnding::LF)
        .map_err(|e| EnrollError::csr(format!("Failed to encode CSR: {}", e)))?;

    tracing::debug!(subject = %csr.info.subject, "Generated certificate signing request");

    Ok(KeyMaterial {
        private_key,
        csr,
        csr_pem,
    })
}

/// Check a request's signature against the public key it embeds.
pub fn verify_csr(csr: &CertReq) -> Result<()> {
    if csr.algorithm.oid != SHA_256_WITH_RSA_ENCRYPTION {
        return Err(EnrollError::csr(format!(
            "Unexpected CSR signature algorithm {}",
            csr.algorithm.oid
        )));
    }

    let spki = csr
        .info
        .public_key
        .to_der()
        .map_err(|e| EnrollError::csr(format!("Failed to encode CSR public key: {}", e)))?;
    let public_key = RsaPublicKey::from_public_key_der(&spki)
        .map_err(|e| EnrollError::csr(format!("CSR public key is not RSA: {}", e)))?;

    let signature = Signature::try_from(csr.signature.raw_bytes())
        .map_err(|e| EnrollError::csr(format!("Malformed CSR signature: {}", e)))?;
    let info = csr
        .info
        .to_der()
        .map_err(|e| EnrollError::csr(format!("Failed to encode CSR info: {}", e)))?;

    VerifyingKey::<Sha256>::new(public_key)
        .verify(&info, &signature)
        .map_err(|_| EnrollError::csr("Generated CSR failed verification"))
}

/// Decode a PEM request and verify it.
pub fn verify_csr_pem(pem: &str) -> Result<CertReq> {
    let csr = CertReq::from_pem(pem)
        .map_err(|e| EnrollError::csr(format!("Invalid CSR PEM: {}", e)))?;
    verify_csr(&csr)?;
    Ok(csr)
}
