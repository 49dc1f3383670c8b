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

//! Page location and navigation.

use std::sync::Mutex;

use url::Url;

/// Query parameters the identity provider appends to the redirect URI.
pub const CALLBACK_PARAMS: &[&str] = &["code", "state", "error", "error_description"];

/// Host capability for reading and changing the page location.
pub trait Navigator {
    /// The current page URL, including query and fragment.
    fn current_url(&self) -> Url;

    /// Full navigation to `url`; in a browser the page unloads.
    fn assign(&self, url: &Url);

    /// Replace the visible URL without navigating (history replace).
    fn replace(&self, url: &Url);
}

impl<T: Navigator + ?Sized> Navigator for &T {
    fn current_url(&self) -> Url {
        (**self).current_url()
    }

    fn assign(&self, url: &Url) {
        (**self).assign(url)
    }

    fn replace(&self, url: &Url) {
        (**self).replace(url)
    }
}

impl<T: Navigator + ?Sized> Navigator for std::sync::Arc<T> {
    fn current_url(&self) -> Url {
        (**self).current_url()
    }

    fn assign(&self, url: &Url) {
        (**self).assign(url)
    }

    fn replace(&self, url: &Url) {
        (**self).replace(url)
    }
}

/// Parameters of a login callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code.
    pub code: Option<String>,
    /// Returned `state`.
    pub state: Option<String>,
    /// Provider error code.
    pub error: Option<String>,
    /// Provider error description.
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Read the callback parameters from a URL. Empty values count as
    /// absent, except `state`.
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        params.code = params.code.filter(|v| !v.is_empty());
        params.error = params.error.filter(|v| !v.is_empty());
        params
    }

    /// Returns true if the URL is a login callback (success or error).
    pub fn is_callback(&self) -> bool {
        self.code.is_some() || self.error.is_some()
    }
}

/// The OIDC redirect URI for a page: its URL without query or fragment.
pub fn redirect_uri(current: &Url) -> Url {
    let mut url = current.clone();
    url.set_query(None);
    url.set_fragment(None);
    url
}

/// `current` with the callback parameters removed. Other query parameters
/// and the fragment are kept.
pub fn strip_callback_params(current: &Url) -> Url {
    let kept: Vec<(String, String)> = current
        .query_pairs()
        .filter(|(key, _)| !CALLBACK_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut url = current.clone();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url
}

/// In-memory navigator that records navigations.
///
/// `assign` records the target but leaves the current URL alone; tests
/// simulate the provider's redirect back with [`set_current`].
///
/// [`set_current`]: MemoryNavigator::set_current
#[derive(Debug)]
pub struct MemoryNavigator {
    current: Mutex<Url>,
    assigned: Mutex<Vec<Url>>,
}

impl MemoryNavigator {
    /// Start at `url`.
    pub fn new(url: Url) -> Self {
        Self {
            current: Mutex::new(url),
            assigned: Mutex::new(Vec::new()),
        }
    }

    /// Simulate a page load at `url`.
    pub fn set_current(&self, url: Url) {
        *lock(&self.current) = url;
    }

    /// Every URL passed to `assign`, oldest first.
    pub fn assigned(&self) -> Vec<Url> {
        lock(&self.assigned).clone()
    }

    /// The most recent `assign` target.
    pub fn last_assigned(&self) -> Option<Url> {
        lock(&self.assigned).last().cloned()
    }
}

impl Navigator for MemoryNavigator {
    fn current_url(&self) -> Url {
        lock(&self.current).clone()
    }

    fn assign(&self, url: &Url) {
        lock(&self.assigned).push(url.clone());
    }

    fn replace(&self, url: &Url) {
        *lock(&self.current) = url.clone();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
