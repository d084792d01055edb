// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the Apache 2.0 license found in the LICENSE file or at:
//     https://opensource.org/licenses/Apache-2.0

//! The message view a signature is computed over: method, target URI,
//! status, fields, trailers, and optionally the related request a signed
//! response answers.

use indexmap::IndexMap;
use url::Url;

/// Case-insensitive, order-preserving multimap of field lines. Names are
/// stored lowercase; values keep their original order and interior
/// whitespace.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    entries: IndexMap<String, Vec<String>>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one field line under the given name.
    pub fn append(&mut self, name: &str, value: &str) {
        self.entries
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.to_string());
    }

    /// All field lines for a name, in arrival order.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Field lines trimmed of outer whitespace and joined with `", "`,
    /// the combined form used for canonicalization.
    pub fn combined(&self, name: &str) -> Option<String> {
        self.get(name).map(|lines| {
            lines
                .iter()
                .map(|line| line.trim_matches([' ', '\t']))
                .collect::<Vec<_>>()
                .join(", ")
        })
    }
}

/// Everything a signature base can draw from. Immutable once built;
/// construct via [`SignatureContext::builder`].
#[derive(Debug, Clone, Default)]
pub struct SignatureContext {
    method: Option<String>,
    target: Option<Url>,
    status: Option<u16>,
    headers: FieldMap,
    trailers: FieldMap,
    related_request: Option<Box<SignatureContext>>,
}

impl SignatureContext {
    pub fn builder() -> SignatureContextBuilder {
        SignatureContextBuilder::default()
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn target(&self) -> Option<&Url> {
        self.target.as_ref()
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn headers(&self) -> &FieldMap {
        &self.headers
    }

    pub fn trailers(&self) -> &FieldMap {
        &self.trailers
    }

    /// The originating request while verifying or signing a response.
    pub fn related_request(&self) -> Option<&SignatureContext> {
        self.related_request.as_deref()
    }
}

/// Collapsing builder for [`SignatureContext`].
#[derive(Debug, Default)]
pub struct SignatureContextBuilder {
    context: SignatureContext,
}

impl SignatureContextBuilder {
    pub fn method(mut self, method: &str) -> Self {
        self.context.method = Some(method.to_string());
        self
    }

    pub fn target_uri(mut self, target: Url) -> Self {
        self.context.target = Some(target);
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.context.status = Some(status);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.context.headers.append(name, value);
        self
    }

    pub fn trailer(mut self, name: &str, value: &str) -> Self {
        self.context.trailers.append(name, value);
        self
    }

    pub fn related_request(mut self, related: SignatureContext) -> Self {
        self.context.related_request = Some(Box::new(related));
        self
    }

    pub fn build(self) -> SignatureContext {
        self.context
    }
}
