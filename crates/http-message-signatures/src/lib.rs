// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the Apache 2.0 license found in the LICENSE file or at:
//     https://opensource.org/licenses/Apache-2.0

//! # http-message-signatures library
//!
//! `http-message-signatures` implements end-to-end integrity and authenticity
//! for HTTP messages: it computes and verifies signatures over a canonical
//! selection of message components per HTTP Message Signatures, and produces
//! and validates content digests per Digest Fields. All header values involved
//! are structured field values, parsed and serialized by the [`structured`]
//! module.
//!
//! ## Features
//!
//! - **Message Signing**: build a signature base from covered components and
//!   sign it, producing `Signature-Input` and `Signature` header values
//! - **Message Verification**: parse those headers back, enforce component,
//!   parameter, and clock policy, and verify the signature against a key
//!   resolved through a caller-supplied [`KeyProvider`]
//! - **Content Digests**: compute and check `Content-Digest`, including
//!   `Want-Content-Digest` negotiation
//!
//! Transport, framework adapters, and key management stay with the caller:
//! the library is a pure computation layer over a [`context::SignatureContext`].

pub mod components;
pub mod context;
pub mod crypto;
pub mod digest;
pub mod structured;

mod base;
mod resolver;
mod sign;
mod verify;

pub use base::{SignatureParameter, SignatureParameters};
pub use crypto::{KeyMaterial, SignatureAlgorithm};
pub use sign::{SignatureSpec, SignatureSpecBuilder, SignedHeaders};
pub use verify::{KeyProvider, VerificationSpec, VerificationSpecBuilder, VerifiedSignature};

use thiserror::Error;

/// Field name carrying the covered components and signature parameters.
pub const SIGNATURE_INPUT_FIELD: &str = "Signature-Input";
/// Field name carrying the signature bytes.
pub const SIGNATURE_FIELD: &str = "Signature";
/// Field name carrying body digests.
pub const CONTENT_DIGEST_FIELD: &str = "Content-Digest";
/// Field name carrying digest algorithm preferences.
pub const WANT_CONTENT_DIGEST_FIELD: &str = "Want-Content-Digest";

/// Errors surfaced by signing, verification, digest handling, and structured
/// field processing. Each variant is a stable sub-code boundary callers can
/// match on.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// The input was not a valid structured field of the expected shape.
    /// Failures raised while scanning carry the byte offset where the
    /// parser stopped.
    #[error("invalid structured header{}: {reason}", .offset.map_or(String::new(), |o| format!(" at byte {o}")))]
    InvalidStructuredHeader {
        reason: String,
        offset: Option<usize>,
    },
    /// A covered component has no value in the message context.
    #[error("missing component: {0}")]
    MissingComponent(String),
    /// The same component identifier was listed more than once.
    #[error("duplicate component: {0}")]
    DuplicateComponent(String),
    /// The algorithm token is not one this crate implements, or it
    /// contradicts the algorithm bound to the resolved key.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// Key material could not be decoded or resolved. A failure from the
    /// caller-supplied key provider is preserved as the source.
    #[error("key error: {reason}")]
    KeyError {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    /// The underlying primitive rejected the operation, including wire form
    /// mismatches such as ASN.1 ECDSA where fixed-width was expected.
    #[error("crypto error: {0}")]
    CryptoError(String),
    /// The signature bytes did not verify against the rebuilt base.
    #[error("signature verification failed")]
    InvalidSignature,
    /// A parameter the verification policy requires was absent.
    #[error("missing parameter: {0}")]
    MissingParameter(String),
    /// A parameter the verification policy forbids was present.
    #[error("forbidden parameter: {0}")]
    ForbiddenParameter(String),
    /// No single signature could be selected from `Signature-Input`.
    #[error("ambiguous signature label: {0}")]
    AmbiguousLabel(String),
    /// `created` lies further in the future than the allowed skew.
    #[error("signature created in the future")]
    FutureSignature,
    /// `created` is older than the verifier's maximum age.
    #[error("signature exceeds maximum age")]
    TooOld,
    /// `expires` has passed, beyond the allowed skew.
    #[error("signature expired")]
    Expired,
    /// A recomputed content digest differed from the header value.
    #[error("digest mismatch: {0}")]
    Mismatch(String),
}

impl SignatureError {
    pub(crate) fn structured(reason: impl Into<String>) -> Self {
        SignatureError::InvalidStructuredHeader {
            reason: reason.into(),
            offset: None,
        }
    }

    pub(crate) fn structured_at(offset: usize, reason: impl Into<String>) -> Self {
        SignatureError::InvalidStructuredHeader {
            reason: reason.into(),
            offset: Some(offset),
        }
    }

    pub(crate) fn key(reason: impl Into<String>) -> Self {
        SignatureError::KeyError {
            reason: reason.into(),
            source: None,
        }
    }
}
