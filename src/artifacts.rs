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

//! Downloadable artifact lifecycle.
//!
//! The issued certificate and the private key are exposed to the host as
//! revocable object references (browser object URLs). [`ArtifactManager`]
//! guarantees at most one live reference per artifact: a replaced
//! reference is revoked before its successor is created, and everything is
//! revoked on [`reset`](ArtifactManager::reset) and on drop.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use zeroize::Zeroizing;

use crate::config::CertificateConfig;
use crate::error::Result;
use crate::types::content_types;

/// Immutable content handed to [`ObjectUrls::create`].
#[derive(Clone, PartialEq, Eq)]
pub struct Blob {
    content: Zeroizing<String>,
    mime: &'static str,
}

impl Blob {
    /// Wrap PEM text as an `application/x-pem-file` blob.
    pub fn pem(content: &str) -> Self {
        Self {
            content: Zeroizing::new(content.to_string()),
            mime: content_types::PEM_FILE,
        }
    }

    /// The blob content.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The blob MIME type.
    pub fn mime(&self) -> &'static str {
        self.mime
    }
}

impl std::fmt::Debug for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blob")
            .field("mime", &self.mime)
            .field("len", &self.content.len())
            .finish()
    }
}

/// Host capability for revocable object references.
///
/// In a browser this is `URL.createObjectURL` / `URL.revokeObjectURL`.
pub trait ObjectUrls {
    /// Create a reference to `blob`.
    fn create(&self, blob: &Blob) -> String;

    /// Revoke a reference. Revoking an unknown reference is a no-op.
    fn revoke(&self, url: &str);
}

impl<T: ObjectUrls + ?Sized> ObjectUrls for &T {
    fn create(&self, blob: &Blob) -> String {
        (**self).create(blob)
    }

    fn revoke(&self, url: &str) {
        (**self).revoke(url)
    }
}

impl<T: ObjectUrls + ?Sized> ObjectUrls for std::sync::Arc<T> {
    fn create(&self, blob: &Blob) -> String {
        (**self).create(blob)
    }

    fn revoke(&self, url: &str) {
        (**self).revoke(url)
    }
}

/// In-memory object URL registry that counts live references.
#[derive(Debug, Default)]
pub struct MemoryObjectUrls {
    live: Mutex<HashMap<String, Blob>>,
    next_id: AtomicU64,
    created: AtomicU64,
    revoked: AtomicU64,
}

impl MemoryObjectUrls {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of references created and not yet revoked.
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    /// Total number of references ever created.
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Total number of live references revoked.
    pub fn revoked_count(&self) -> u64 {
        self.revoked.load(Ordering::Relaxed)
    }

    /// Look up a live reference.
    pub fn resolve(&self, url: &str) -> Option<Blob> {
        self.lock().get(url).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Blob>> {
        self.live
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ObjectUrls for MemoryObjectUrls {
    fn create(&self, blob: &Blob) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let url = format!("blob:mtls-enroll/{id}");
        self.lock().insert(url.clone(), blob.clone());
        self.created.fetch_add(1, Ordering::Relaxed);
        url
    }

    fn revoke(&self, url: &str) {
        if self.lock().remove(url).is_some() {
            self.revoked.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// One downloadable artifact.
pub struct Artifact {
    url: String,
    filename: String,
    content: Zeroizing<String>,
}

impl Artifact {
    /// Object reference for the download link.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Suggested download filename.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// PEM content, byte-for-byte as presented.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// MIME type of the download.
    pub fn mime(&self) -> &'static str {
        content_types::PEM_FILE
    }

    /// Write the artifact into `dir` under its download filename.
    ///
    /// On Unix the file is created with mode `0600`.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.filename);
        std::fs::write(&path, self.content.as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(path)
    }
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact")
            .field("url", &self.url)
            .field("filename", &self.filename)
            .finish()
    }
}

/// Owner of the certificate and key downloads and the CA text.
#[derive(Debug)]
pub struct ArtifactManager<U: ObjectUrls> {
    urls: U,
    certificate_filename: String,
    private_key_filename: String,
    certificate: Option<Artifact>,
    private_key: Option<Artifact>,
    ca_text: Option<String>,
}

impl<U: ObjectUrls> ArtifactManager<U> {
    /// Create an empty manager using the configured download filenames.
    pub fn new(urls: U, certificate: &CertificateConfig) -> Self {
        Self {
            urls,
            certificate_filename: certificate.certificate_filename.clone(),
            private_key_filename: certificate.private_key_filename.clone(),
            certificate: None,
            private_key: None,
            ca_text: None,
        }
    }

    /// Replace the artifacts with a new certificate, key and CA text.
    ///
    /// Existing references are revoked before new ones are created.
    pub fn present(&mut self, certificate_pem: &str, private_key_pem: &str, ca_pem: Option<&str>) {
        self.revoke_all();

        let url = self.urls.create(&Blob::pem(certificate_pem));
        self.certificate = Some(Artifact {
            url,
            filename: self.certificate_filename.clone(),
            content: Zeroizing::new(certificate_pem.to_string()),
        });

        let url = self.urls.create(&Blob::pem(private_key_pem));
        self.private_key = Some(Artifact {
            url,
            filename: self.private_key_filename.clone(),
            content: Zeroizing::new(private_key_pem.to_string()),
        });

        self.ca_text = ca_pem.map(str::to_string);
        tracing::debug!(ca = self.ca_text.is_some(), "Presented downloadable artifacts");
    }

    /// Revoke both references and clear the CA text.
    pub fn reset(&mut self) {
        self.revoke_all();
        self.ca_text = None;
    }

    fn revoke_all(&mut self) {
        if let Some(artifact) = self.certificate.take() {
            self.urls.revoke(&artifact.url);
        }
        if let Some(artifact) = self.private_key.take() {
            self.urls.revoke(&artifact.url);
        }
    }

    /// The certificate download, if present.
    pub fn certificate(&self) -> Option<&Artifact> {
        self.certificate.as_ref()
    }

    /// The private key download, if present.
    pub fn private_key(&self) -> Option<&Artifact> {
        self.private_key.as_ref()
    }

    /// CA certificate or chain text, if the CA returned one.
    pub fn ca_text(&self) -> Option<&str> {
        self.ca_text.as_deref()
    }

    /// Returns true if nothing is presented.
    pub fn is_empty(&self) -> bool {
        self.certificate.is_none() && self.private_key.is_none() && self.ca_text.is_none()
    }

    /// The object URL capability.
    pub fn urls(&self) -> &U {
        &self.urls
    }
}

impl<U: ObjectUrls> Drop for ArtifactManager<U> {
    fn drop(&mut self) {
        self.reset();
    }
}
