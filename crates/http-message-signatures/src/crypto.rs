// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the Apache 2.0 license found in the LICENSE file or at:
//     https://opensource.org/licenses/Apache-2.0

//! Algorithm dispatch: decode key material, sign a base, verify a
//! signature. Wire forms follow the registry: ECDSA is fixed-width
//! IEEE P1363, everything else is the primitive's raw output.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha512};
use signature::{RandomizedSigner, SignatureEncoding, Signer, Verifier};
use tracing::trace;

use crate::SignatureError;

/// The signature algorithms this crate implements, named by their
/// registered tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    RsaV15Sha256,
    /// RSASSA-PSS with SHA-512, MGF1-SHA-512, 64-byte salt.
    RsaPssSha512,
    /// ECDSA over P-256 with SHA-256, 64-byte fixed signatures.
    EcdsaP256Sha256,
    /// ECDSA over P-384 with SHA-384, 96-byte fixed signatures.
    EcdsaP384Sha384,
    /// Ed25519, 64-byte signatures.
    Ed25519,
    /// HMAC with SHA-256.
    HmacSha256,
}

impl SignatureAlgorithm {
    pub fn token(self) -> &'static str {
        match self {
            SignatureAlgorithm::RsaV15Sha256 => "rsa-v1_5-sha256",
            SignatureAlgorithm::RsaPssSha512 => "rsa-pss-sha512",
            SignatureAlgorithm::EcdsaP256Sha256 => "ecdsa-p256-sha256",
            SignatureAlgorithm::EcdsaP384Sha384 => "ecdsa-p384-sha384",
            SignatureAlgorithm::Ed25519 => "ed25519",
            SignatureAlgorithm::HmacSha256 => "hmac-sha256",
        }
    }

    /// Whether sign and verify use the same secret.
    pub fn is_symmetric(self) -> bool {
        matches!(self, SignatureAlgorithm::HmacSha256)
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rsa-v1_5-sha256" => Ok(SignatureAlgorithm::RsaV15Sha256),
            "rsa-pss-sha512" => Ok(SignatureAlgorithm::RsaPssSha512),
            "ecdsa-p256-sha256" => Ok(SignatureAlgorithm::EcdsaP256Sha256),
            "ecdsa-p384-sha384" => Ok(SignatureAlgorithm::EcdsaP384Sha384),
            "ed25519" => Ok(SignatureAlgorithm::Ed25519),
            "hmac-sha256" => Ok(SignatureAlgorithm::HmacSha256),
            other => Err(SignatureError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Key bytes in the forms callers hold them. Asymmetric keys are PKCS#8
/// (private side) or SubjectPublicKeyInfo (public side) DER; Ed25519
/// additionally accepts the raw 32-byte form, and HMAC secrets are always
/// raw. `Base64` wraps any of those encodings in base64.
#[derive(Debug, Clone)]
pub enum KeyMaterial {
    Der(Vec<u8>),
    Base64(String),
    Raw(Vec<u8>),
}

impl KeyMaterial {
    fn bytes(&self) -> Result<Vec<u8>, SignatureError> {
        match self {
            KeyMaterial::Der(bytes) | KeyMaterial::Raw(bytes) => Ok(bytes.clone()),
            KeyMaterial::Base64(encoded) => STANDARD.decode(encoded).map_err(|_| {
                SignatureError::key("key material is not valid base64")
            }),
        }
    }
}

fn key_error(context: &str, error: impl fmt::Display) -> SignatureError {
    SignatureError::key(format!("{context}: {error}"))
}

/// Sign `message` with the given algorithm, returning the signature in its
/// wire form.
pub fn sign(
    algorithm: SignatureAlgorithm,
    key: &KeyMaterial,
    message: &[u8],
) -> Result<Vec<u8>, SignatureError> {
    trace!(algorithm = algorithm.token(), bytes = message.len(), "signing");
    let key_bytes = key.bytes()?;
    match algorithm {
        SignatureAlgorithm::RsaV15Sha256 => {
            let private = RsaPrivateKey::from_pkcs8_der(&key_bytes)
                .map_err(|e| key_error("invalid PKCS#8 RSA private key", e))?;
            let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new(private);
            Ok(signing_key.sign(message).to_vec())
        }
        SignatureAlgorithm::RsaPssSha512 => {
            let private = RsaPrivateKey::from_pkcs8_der(&key_bytes)
                .map_err(|e| key_error("invalid PKCS#8 RSA private key", e))?;
            let signing_key = rsa::pss::SigningKey::<Sha512>::new(private);
            Ok(signing_key.sign_with_rng(&mut OsRng, message).to_vec())
        }
        SignatureAlgorithm::EcdsaP256Sha256 => {
            let signing_key = p256::ecdsa::SigningKey::from_pkcs8_der(&key_bytes)
                .map_err(|e| key_error("invalid PKCS#8 P-256 private key", e))?;
            let signature: p256::ecdsa::Signature = signing_key.sign(message);
            Ok(signature.to_vec())
        }
        SignatureAlgorithm::EcdsaP384Sha384 => {
            let signing_key = p384::ecdsa::SigningKey::from_pkcs8_der(&key_bytes)
                .map_err(|e| key_error("invalid PKCS#8 P-384 private key", e))?;
            let signature: p384::ecdsa::Signature = signing_key.sign(message);
            Ok(signature.to_vec())
        }
        SignatureAlgorithm::Ed25519 => {
            let signing_key = ed25519_signing_key(&key_bytes)?;
            Ok(signing_key.sign(message).to_vec())
        }
        SignatureAlgorithm::HmacSha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(&key_bytes)
                .map_err(|e| key_error("invalid HMAC key", e))?;
            mac.update(message);
            Ok(mac.finalize().into_bytes().to_vec())
        }
    }
}

/// Verify `signature` over `message`. Malformed signature bytes (wrong
/// length, wrong encoding) are a [`SignatureError::CryptoError`]; a
/// well-formed signature that does not match is
/// [`SignatureError::InvalidSignature`].
pub fn verify(
    algorithm: SignatureAlgorithm,
    key: &KeyMaterial,
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    trace!(
        algorithm = algorithm.token(),
        bytes = message.len(),
        "verifying"
    );
    let key_bytes = key.bytes()?;
    match algorithm {
        SignatureAlgorithm::RsaV15Sha256 => {
            let public = RsaPublicKey::from_public_key_der(&key_bytes)
                .map_err(|e| key_error("invalid RSA public key", e))?;
            let signature = rsa::pkcs1v15::Signature::try_from(signature)
                .map_err(|e| SignatureError::CryptoError(format!("malformed RSA signature: {e}")))?;
            rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public)
                .verify(message, &signature)
                .map_err(|_| SignatureError::InvalidSignature)
        }
        SignatureAlgorithm::RsaPssSha512 => {
            let public = RsaPublicKey::from_public_key_der(&key_bytes)
                .map_err(|e| key_error("invalid RSA public key", e))?;
            let signature = rsa::pss::Signature::try_from(signature)
                .map_err(|e| SignatureError::CryptoError(format!("malformed RSA signature: {e}")))?;
            rsa::pss::VerifyingKey::<Sha512>::new(public)
                .verify(message, &signature)
                .map_err(|_| SignatureError::InvalidSignature)
        }
        SignatureAlgorithm::EcdsaP256Sha256 => {
            let verifying_key = p256::ecdsa::VerifyingKey::from_public_key_der(&key_bytes)
                .map_err(|e| key_error("invalid P-256 public key", e))?;
            let signature = p256::ecdsa::Signature::from_slice(signature).map_err(|_| {
                SignatureError::CryptoError(
                    "ECDSA signature is not 64-byte fixed-width form".to_string(),
                )
            })?;
            verifying_key
                .verify(message, &signature)
                .map_err(|_| SignatureError::InvalidSignature)
        }
        SignatureAlgorithm::EcdsaP384Sha384 => {
            let verifying_key = p384::ecdsa::VerifyingKey::from_public_key_der(&key_bytes)
                .map_err(|e| key_error("invalid P-384 public key", e))?;
            let signature = p384::ecdsa::Signature::from_slice(signature).map_err(|_| {
                SignatureError::CryptoError(
                    "ECDSA signature is not 96-byte fixed-width form".to_string(),
                )
            })?;
            verifying_key
                .verify(message, &signature)
                .map_err(|_| SignatureError::InvalidSignature)
        }
        SignatureAlgorithm::Ed25519 => {
            let verifying_key = ed25519_verifying_key(&key_bytes)?;
            let signature = ed25519_dalek::Signature::try_from(signature).map_err(|_| {
                SignatureError::CryptoError("Ed25519 signature must be 64 bytes".to_string())
            })?;
            verifying_key
                .verify(message, &signature)
                .map_err(|_| SignatureError::InvalidSignature)
        }
        SignatureAlgorithm::HmacSha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(&key_bytes)
                .map_err(|e| key_error("invalid HMAC key", e))?;
            mac.update(message);
            mac.verify_slice(signature)
                .map_err(|_| SignatureError::InvalidSignature)
        }
    }
}

fn ed25519_signing_key(key_bytes: &[u8]) -> Result<ed25519_dalek::SigningKey, SignatureError> {
    if key_bytes.len() == ed25519_dalek::SECRET_KEY_LENGTH {
        return ed25519_dalek::SigningKey::try_from(key_bytes)
            .map_err(|e| key_error("invalid Ed25519 private key", e));
    }
    ed25519_dalek::SigningKey::from_pkcs8_der(key_bytes)
        .map_err(|e| key_error("invalid PKCS#8 Ed25519 private key", e))
}

fn ed25519_verifying_key(key_bytes: &[u8]) -> Result<ed25519_dalek::VerifyingKey, SignatureError> {
    if key_bytes.len() == ed25519_dalek::PUBLIC_KEY_LENGTH {
        return ed25519_dalek::VerifyingKey::try_from(key_bytes)
            .map_err(|e| key_error("invalid Ed25519 public key", e));
    }
    ed25519_dalek::VerifyingKey::from_public_key_der(key_bytes)
        .map_err(|e| key_error("invalid Ed25519 public key", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey};

    const MESSAGE: &[u8] = b"\"@method\": POST\n\"@signature-params\": (\"@method\")";

    // The published Ed25519 test key pair.
    const ED25519_SECRET: [u8; 32] = [
        0x9f, 0x83, 0x62, 0xf8, 0x7a, 0x48, 0x4a, 0x95, 0x4e, 0x6e, 0x74, 0x0c, 0x5b, 0x4c, 0x0e,
        0x84, 0x22, 0x91, 0x39, 0xa2, 0x0a, 0xa8, 0xab, 0x56, 0xff, 0x66, 0x58, 0x6f, 0x6a, 0x7d,
        0x29, 0xc5,
    ];
    const ED25519_PUBLIC: [u8; 32] = [
        0x26, 0xb4, 0x0b, 0x8f, 0x93, 0xff, 0xf3, 0xd8, 0x97, 0x11, 0x2f, 0x7e, 0xbc, 0x58, 0x2b,
        0x23, 0x2d, 0xbd, 0x72, 0x51, 0x7d, 0x08, 0x2f, 0xe8, 0x3c, 0xfb, 0x30, 0xdd, 0xce, 0x43,
        0xd1, 0xbb,
    ];

    #[test]
    fn algorithm_tokens_round_trip() {
        for algorithm in [
            SignatureAlgorithm::RsaV15Sha256,
            SignatureAlgorithm::RsaPssSha512,
            SignatureAlgorithm::EcdsaP256Sha256,
            SignatureAlgorithm::EcdsaP384Sha384,
            SignatureAlgorithm::Ed25519,
            SignatureAlgorithm::HmacSha256,
        ] {
            assert_eq!(algorithm.token().parse::<SignatureAlgorithm>().unwrap(), algorithm);
        }
        assert!(matches!(
            "rsa-sha1".parse::<SignatureAlgorithm>(),
            Err(SignatureError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn ed25519_round_trip_with_raw_keys() {
        let secret = KeyMaterial::Raw(ED25519_SECRET.to_vec());
        let public = KeyMaterial::Raw(ED25519_PUBLIC.to_vec());
        let signature = sign(SignatureAlgorithm::Ed25519, &secret, MESSAGE).unwrap();
        assert_eq!(signature.len(), 64);
        verify(SignatureAlgorithm::Ed25519, &public, MESSAGE, &signature).unwrap();
        assert!(matches!(
            verify(SignatureAlgorithm::Ed25519, &public, b"tampered", &signature),
            Err(SignatureError::InvalidSignature)
        ));
    }

    #[test]
    fn ed25519_accepts_base64_key_material() {
        let secret = KeyMaterial::Base64(STANDARD.encode(ED25519_SECRET));
        let public = KeyMaterial::Base64(STANDARD.encode(ED25519_PUBLIC));
        let signature = sign(SignatureAlgorithm::Ed25519, &secret, MESSAGE).unwrap();
        verify(SignatureAlgorithm::Ed25519, &public, MESSAGE, &signature).unwrap();
        assert!(matches!(
            sign(
                SignatureAlgorithm::Ed25519,
                &KeyMaterial::Base64("!!!".to_string()),
                MESSAGE
            ),
            Err(SignatureError::KeyError { .. })
        ));
    }

    #[test]
    fn ed25519_rejects_oversized_signatures() {
        let secret = KeyMaterial::Raw(ED25519_SECRET.to_vec());
        let public = KeyMaterial::Raw(ED25519_PUBLIC.to_vec());
        let mut signature = sign(SignatureAlgorithm::Ed25519, &secret, MESSAGE).unwrap();
        signature.push(0);
        assert!(matches!(
            verify(SignatureAlgorithm::Ed25519, &public, MESSAGE, &signature),
            Err(SignatureError::CryptoError(_))
        ));
    }

    #[test]
    fn hmac_round_trip() {
        let key = KeyMaterial::Raw(b"shared-secret-shared-secret!".to_vec());
        let mac = sign(SignatureAlgorithm::HmacSha256, &key, MESSAGE).unwrap();
        assert_eq!(mac.len(), 32);
        verify(SignatureAlgorithm::HmacSha256, &key, MESSAGE, &mac).unwrap();
        let other = KeyMaterial::Raw(b"some-other-secret".to_vec());
        assert!(matches!(
            verify(SignatureAlgorithm::HmacSha256, &other, MESSAGE, &mac),
            Err(SignatureError::InvalidSignature)
        ));
    }

    #[test]
    fn ecdsa_p256_signatures_are_fixed_width() {
        let signing_key = p256::ecdsa::SigningKey::random(&mut OsRng);
        let private = KeyMaterial::Der(signing_key.to_pkcs8_der().unwrap().as_bytes().to_vec());
        let public = KeyMaterial::Der(
            signing_key
                .verifying_key()
                .to_public_key_der()
                .unwrap()
                .into_vec(),
        );
        let signature = sign(SignatureAlgorithm::EcdsaP256Sha256, &private, MESSAGE).unwrap();
        assert_eq!(signature.len(), 64);
        verify(SignatureAlgorithm::EcdsaP256Sha256, &public, MESSAGE, &signature).unwrap();

        // Anything but the 64-byte fixed form is a wire form error.
        let mut widened = signature.clone();
        widened.push(0);
        assert!(matches!(
            verify(SignatureAlgorithm::EcdsaP256Sha256, &public, MESSAGE, &widened),
            Err(SignatureError::CryptoError(_))
        ));
    }

    #[test]
    fn ecdsa_p384_signatures_are_fixed_width() {
        let signing_key = p384::ecdsa::SigningKey::random(&mut OsRng);
        let private = KeyMaterial::Der(signing_key.to_pkcs8_der().unwrap().as_bytes().to_vec());
        let public = KeyMaterial::Der(
            signing_key
                .verifying_key()
                .to_public_key_der()
                .unwrap()
                .into_vec(),
        );
        let signature = sign(SignatureAlgorithm::EcdsaP384Sha384, &private, MESSAGE).unwrap();
        assert_eq!(signature.len(), 96);
        verify(SignatureAlgorithm::EcdsaP384Sha384, &public, MESSAGE, &signature).unwrap();
    }

    #[test]
    fn rsa_v15_and_pss_round_trip() {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let private = KeyMaterial::Der(private_key.to_pkcs8_der().unwrap().as_bytes().to_vec());
        let public = KeyMaterial::Der(
            RsaPublicKey::from(&private_key)
                .to_public_key_der()
                .unwrap()
                .into_vec(),
        );

        let v15 = sign(SignatureAlgorithm::RsaV15Sha256, &private, MESSAGE).unwrap();
        assert_eq!(v15.len(), 256);
        verify(SignatureAlgorithm::RsaV15Sha256, &public, MESSAGE, &v15).unwrap();

        let pss = sign(SignatureAlgorithm::RsaPssSha512, &private, MESSAGE).unwrap();
        assert_eq!(pss.len(), 256);
        verify(SignatureAlgorithm::RsaPssSha512, &public, MESSAGE, &pss).unwrap();
        assert!(matches!(
            verify(SignatureAlgorithm::RsaPssSha512, &public, b"tampered", &pss),
            Err(SignatureError::InvalidSignature)
        ));
    }

    #[test]
    fn garbage_key_material_is_a_key_error() {
        assert!(matches!(
            sign(
                SignatureAlgorithm::RsaV15Sha256,
                &KeyMaterial::Der(vec![0x30, 0x00]),
                MESSAGE
            ),
            Err(SignatureError::KeyError { .. })
        ));
        assert!(matches!(
            verify(
                SignatureAlgorithm::EcdsaP256Sha256,
                &KeyMaterial::Raw(vec![1, 2, 3]),
                MESSAGE,
                &[0; 64]
            ),
            Err(SignatureError::KeyError { .. })
        ));
    }
}
