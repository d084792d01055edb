// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the Apache 2.0 license found in the LICENSE file or at:
//     https://opensource.org/licenses/Apache-2.0

//! Signing: turn a spec into `Signature-Input` and `Signature` values.

use tracing::debug;

use crate::SignatureError;
use crate::base::{BaseEntry, SignatureParameters, build_base};
use crate::components::SignatureComponent;
use crate::context::SignatureContext;
use crate::crypto::{self, KeyMaterial, SignatureAlgorithm};
use crate::structured::{Item, Key, SerializeValue};

/// The outputs of a successful signing operation. The two header values
/// already carry the label; the base is exposed for debugging.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub signature_input: String,
    pub signature: String,
    pub base: String,
}

/// Immutable bundle of everything one signing operation needs. Build it
/// once with [`SignatureSpec::builder`], consume it with
/// [`SignatureSpec::sign`].
pub struct SignatureSpec {
    label: String,
    components: Vec<(SignatureComponent, bool)>,
    parameters: SignatureParameters,
    context: SignatureContext,
    algorithm: SignatureAlgorithm,
    key: KeyMaterial,
}

impl SignatureSpec {
    pub fn builder() -> SignatureSpecBuilder {
        SignatureSpecBuilder::default()
    }

    /// Build the signature base, sign it, and format the two header
    /// values.
    pub fn sign(&self) -> Result<SignedHeaders, SignatureError> {
        if let Some(alg) = self.parameters.algorithm() {
            if alg != self.algorithm.token() {
                return Err(SignatureError::UnsupportedAlgorithm(format!(
                    "`alg` parameter `{alg}` contradicts signing algorithm `{}`",
                    self.algorithm.token()
                )));
            }
        }

        let mut entries = Vec::with_capacity(self.components.len());
        for (component, used_if_present) in &self.components {
            entries.push(BaseEntry {
                identifier: Item::try_from(component)?,
                component: component.clone(),
                used_if_present: *used_if_present,
            });
        }

        let base = build_base(&entries, &self.parameters, &self.context)?;
        let signature = crypto::sign(self.algorithm, &self.key, base.base.as_bytes())?;
        debug!(
            label = %self.label,
            algorithm = self.algorithm.token(),
            "signed message"
        );

        let signature_input = format!("{}={}", self.label, base.params_value);
        let signature_item = Item::new(signature);
        let signature = format!("{}={}", self.label, signature_item.serialize_value());

        Ok(SignedHeaders {
            signature_input,
            signature,
            base: base.base,
        })
    }
}

/// Collapsing builder for [`SignatureSpec`].
#[derive(Default)]
pub struct SignatureSpecBuilder {
    label: Option<String>,
    components: Vec<(SignatureComponent, bool)>,
    parameters: SignatureParameters,
    context: Option<SignatureContext>,
    algorithm: Option<SignatureAlgorithm>,
    key: Option<KeyMaterial>,
}

impl SignatureSpecBuilder {
    /// The dictionary key both output headers are entered under.
    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// Append a component that must resolve for signing to succeed.
    pub fn component(mut self, component: SignatureComponent) -> Self {
        self.components.push((component, false));
        self
    }

    /// Append a component that is covered when present and silently
    /// dropped from the base and trailer when not.
    pub fn component_if_present(mut self, component: SignatureComponent) -> Self {
        self.components.push((component, true));
        self
    }

    pub fn parameters(mut self, parameters: SignatureParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn context(mut self, context: SignatureContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn key(mut self, key: KeyMaterial) -> Self {
        self.key = Some(key);
        self
    }

    pub fn build(self) -> Result<SignatureSpec, SignatureError> {
        let label = self
            .label
            .ok_or(SignatureError::MissingParameter("label".to_string()))?;
        // The label lands as a dictionary key in both headers.
        Key::new(label.clone())?;
        if self.components.is_empty() {
            return Err(SignatureError::MissingComponent(
                "at least one covered component is required".to_string(),
            ));
        }
        Ok(SignatureSpec {
            label,
            components: self.components,
            parameters: self.parameters,
            context: self
                .context
                .ok_or(SignatureError::MissingParameter("context".to_string()))?,
            algorithm: self
                .algorithm
                .ok_or(SignatureError::MissingParameter("algorithm".to_string()))?,
            key: self
                .key
                .ok_or(SignatureError::MissingParameter("key".to_string()))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{DerivedComponent, FieldComponent};
    use url::Url;

    const ED25519_SECRET: [u8; 32] = [
        0x9f, 0x83, 0x62, 0xf8, 0x7a, 0x48, 0x4a, 0x95, 0x4e, 0x6e, 0x74, 0x0c, 0x5b, 0x4c, 0x0e,
        0x84, 0x22, 0x91, 0x39, 0xa2, 0x0a, 0xa8, 0xab, 0x56, 0xff, 0x66, 0x58, 0x6f, 0x6a, 0x7d,
        0x29, 0xc5,
    ];

    fn context() -> SignatureContext {
        SignatureContext::builder()
            .method("post")
            .target_uri(Url::parse("https://example.com/foo").unwrap())
            .header("Content-Type", "application/json")
            .build()
    }

    fn spec_builder() -> SignatureSpecBuilder {
        SignatureSpec::builder()
            .label("sig1")
            .component(SignatureComponent::Derived(DerivedComponent::Method {
                req: false,
            }))
            .component(SignatureComponent::Field(FieldComponent::new(
                "content-type",
            )))
            .context(context())
            .algorithm(SignatureAlgorithm::Ed25519)
            .key(KeyMaterial::Raw(ED25519_SECRET.to_vec()))
    }

    #[test]
    fn sign_emits_labelled_header_values() {
        let spec = spec_builder()
            .parameters(
                SignatureParameters::new()
                    .with_created(1_618_884_473)
                    .unwrap()
                    .with_key_id("test-key-ed25519")
                    .unwrap(),
            )
            .build()
            .unwrap();
        let signed = spec.sign().unwrap();
        assert_eq!(
            signed.signature_input,
            "sig1=(\"@method\" \"content-type\");created=1618884473;keyid=\"test-key-ed25519\""
        );
        assert!(signed.signature.starts_with("sig1=:"));
        assert!(signed.signature.ends_with(":"));
        assert!(signed.base.ends_with(
            "\"@signature-params\": (\"@method\" \"content-type\");created=1618884473;keyid=\"test-key-ed25519\""
        ));
    }

    #[test]
    fn signing_is_deterministic_for_ed25519() {
        let build = || spec_builder().build().unwrap().sign().unwrap();
        let first = build();
        let second = build();
        assert_eq!(first.signature, second.signature);
        assert_eq!(first.base, second.base);
    }

    #[test]
    fn contradictory_alg_parameter_is_rejected() {
        let spec = spec_builder()
            .parameters(SignatureParameters::new().with_algorithm(SignatureAlgorithm::HmacSha256))
            .build()
            .unwrap();
        assert!(matches!(
            spec.sign(),
            Err(SignatureError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn builder_validates_label_and_components() {
        let missing_label = SignatureSpec::builder()
            .component(SignatureComponent::Derived(DerivedComponent::Method {
                req: false,
            }))
            .context(context())
            .algorithm(SignatureAlgorithm::Ed25519)
            .key(KeyMaterial::Raw(ED25519_SECRET.to_vec()))
            .build();
        assert!(matches!(
            missing_label,
            Err(SignatureError::MissingParameter(_))
        ));

        let bad_label = spec_builder().label("Not A Key").build();
        assert!(matches!(
            bad_label,
            Err(SignatureError::InvalidStructuredHeader { .. })
        ));

        let no_components = SignatureSpec::builder()
            .label("sig1")
            .context(context())
            .algorithm(SignatureAlgorithm::Ed25519)
            .key(KeyMaterial::Raw(ED25519_SECRET.to_vec()))
            .build();
        assert!(matches!(
            no_components,
            Err(SignatureError::MissingComponent(_))
        ));
    }

    #[test]
    fn absent_if_present_component_is_dropped_from_outputs() {
        let signed = spec_builder()
            .component_if_present(SignatureComponent::Field(FieldComponent::new(
                "authorization",
            )))
            .build()
            .unwrap()
            .sign()
            .unwrap();
        assert!(!signed.signature_input.contains("authorization"));
    }
}
