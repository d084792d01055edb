// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the Apache 2.0 license found in the LICENSE file or at:
//     https://opensource.org/licenses/Apache-2.0

//! Verification: select a signature from the incoming headers, enforce the
//! caller's component, parameter, and clock policy, rebuild the base
//! exactly as signed, and check the signature bytes.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::SignatureError;
use crate::base::{BaseEntry, SignatureParameter, SignatureParameters, build_base};
use crate::components::SignatureComponent;
use crate::context::SignatureContext;
use crate::crypto::{self, KeyMaterial, SignatureAlgorithm};
use crate::resolver;
use crate::structured::{BareItem, InnerList, ListEntry, Parser};

/// Resolves a `keyid` to the algorithm and key material to verify with.
/// Failures are wrapped as the cause of [`SignatureError::KeyError`].
pub trait KeyProvider {
    fn lookup(
        &self,
        key_id: Option<&str>,
    ) -> Result<(SignatureAlgorithm, KeyMaterial), Box<dyn std::error::Error + Send + Sync>>;
}

impl<F> KeyProvider for F
where
    F: Fn(
        Option<&str>,
    ) -> Result<(SignatureAlgorithm, KeyMaterial), Box<dyn std::error::Error + Send + Sync>>,
{
    fn lookup(
        &self,
        key_id: Option<&str>,
    ) -> Result<(SignatureAlgorithm, KeyMaterial), Box<dyn std::error::Error + Send + Sync>> {
        self(key_id)
    }
}

/// What a successful verification hands back: the selected label, the
/// decoded signature parameters, and the rebuilt base for audit logging.
#[derive(Debug)]
pub struct VerifiedSignature {
    pub label: String,
    pub parameters: SignatureParameters,
    pub base: String,
}

/// Immutable bundle of everything one verification needs. The message,
/// including its `Signature-Input` and `Signature` fields, lives in the
/// context.
pub struct VerificationSpec {
    label: Option<String>,
    required: Vec<SignatureComponent>,
    required_if_present: Vec<SignatureComponent>,
    required_parameters: Vec<SignatureParameter>,
    forbidden_parameters: Vec<SignatureParameter>,
    maximum_age: Option<i64>,
    maximum_skew: i64,
    now: Option<i64>,
    context: SignatureContext,
    key_provider: Box<dyn KeyProvider>,
}

impl VerificationSpec {
    pub fn builder() -> VerificationSpecBuilder {
        VerificationSpecBuilder::default()
    }

    pub fn verify(&self) -> Result<VerifiedSignature, SignatureError> {
        let input_value = self
            .context
            .headers()
            .combined("signature-input")
            .ok_or_else(|| SignatureError::structured("no `Signature-Input` field"))?;
        let signature_value = self
            .context
            .headers()
            .combined("signature")
            .ok_or_else(|| SignatureError::structured("no `Signature` field"))?;

        let input_dict = Parser::new(&input_value).parse_dictionary()?;
        let signature_dict = Parser::new(&signature_value).parse_dictionary()?;

        let (label, inner) = self.select_signature(&input_dict)?;
        debug!(label = %label, components = inner.items.len(), "selected signature");

        let mut entries = Vec::with_capacity(inner.items.len());
        for item in &inner.items {
            entries.push(BaseEntry {
                component: SignatureComponent::try_from(item.clone())?,
                identifier: item.clone(),
                used_if_present: false,
            });
        }
        let parameters = SignatureParameters::from_parameters(&inner.params);

        self.enforce_component_policy(&entries)?;
        self.enforce_parameter_policy(&parameters)?;
        self.enforce_clock_policy(&parameters)?;

        // The base is rebuilt from the identifiers exactly as parsed, so a
        // signer's flag ordering survives.
        let base = build_base(&entries, &parameters, &self.context)?;

        let (algorithm, key) = self
            .key_provider
            .lookup(parameters.key_id())
            .map_err(|source| SignatureError::KeyError {
                reason: "key provider failed".to_string(),
                source: Some(source),
            })?;
        if let Some(alg) = parameters.algorithm() {
            // The key binding is authoritative; a contradicting `alg`
            // parameter is rejected rather than believed.
            if alg != algorithm.token() {
                return Err(SignatureError::UnsupportedAlgorithm(format!(
                    "`alg` parameter `{alg}` contradicts key algorithm `{}`",
                    algorithm.token()
                )));
            }
        }

        let signature = match signature_dict.get(label.as_str()) {
            Some(ListEntry::Item(item)) => match &item.bare_item {
                BareItem::ByteSequence(bytes) => bytes.clone(),
                _ => {
                    return Err(SignatureError::structured(
                        "`Signature` entry must be a byte sequence",
                    ));
                }
            },
            Some(ListEntry::InnerList(_)) => {
                return Err(SignatureError::structured(
                    "`Signature` entry must be a byte sequence",
                ));
            }
            None => {
                return Err(SignatureError::AmbiguousLabel(format!(
                    "no `Signature` entry for label `{label}`"
                )));
            }
        };

        crypto::verify(algorithm, &key, base.base.as_bytes(), &signature)?;
        debug!(label = %label, algorithm = algorithm.token(), "verified message");

        Ok(VerifiedSignature {
            label,
            parameters,
            base: base.base,
        })
    }

    fn select_signature(
        &self,
        input_dict: &crate::structured::Dictionary,
    ) -> Result<(String, InnerList), SignatureError> {
        let (label, member) = match &self.label {
            Some(label) => {
                let member = input_dict.get(label.as_str()).ok_or_else(|| {
                    SignatureError::AmbiguousLabel(format!(
                        "no `Signature-Input` entry for label `{label}`"
                    ))
                })?;
                (label.clone(), member)
            }
            None => match input_dict.iter().next() {
                Some((key, member)) if input_dict.len() == 1 => {
                    (key.as_str().to_string(), member)
                }
                _ => {
                    return Err(SignatureError::AmbiguousLabel(format!(
                        "{} signatures present and no label requested",
                        input_dict.len()
                    )));
                }
            },
        };
        match member {
            ListEntry::InnerList(inner) => Ok((label, inner.clone())),
            ListEntry::Item(_) => Err(SignatureError::structured(
                "`Signature-Input` entry must be an inner list",
            )),
        }
    }

    fn enforce_component_policy(&self, entries: &[BaseEntry]) -> Result<(), SignatureError> {
        for required in &self.required {
            if !entries
                .iter()
                .any(|entry| entry.component.same_selector(required))
            {
                return Err(SignatureError::MissingComponent(format!(
                    "required component `{}` is not covered",
                    required.name()
                )));
            }
        }
        for required in &self.required_if_present {
            if resolver::is_present(required, &self.context)
                && !entries
                    .iter()
                    .any(|entry| entry.component.same_selector(required))
            {
                return Err(SignatureError::MissingComponent(format!(
                    "component `{}` is present but not covered",
                    required.name()
                )));
            }
        }
        Ok(())
    }

    fn enforce_parameter_policy(
        &self,
        parameters: &SignatureParameters,
    ) -> Result<(), SignatureError> {
        for parameter in &self.required_parameters {
            if !parameters.is_set(*parameter) {
                return Err(SignatureError::MissingParameter(parameter.key().to_string()));
            }
        }
        for parameter in &self.forbidden_parameters {
            if parameters.is_set(*parameter) {
                return Err(SignatureError::ForbiddenParameter(
                    parameter.key().to_string(),
                ));
            }
        }
        Ok(())
    }

    fn enforce_clock_policy(
        &self,
        parameters: &SignatureParameters,
    ) -> Result<(), SignatureError> {
        let now = match self.now {
            Some(now) => now,
            None => unix_now()?,
        };
        if let Some(created) = parameters.created() {
            if now < created - self.maximum_skew {
                return Err(SignatureError::FutureSignature);
            }
            if let Some(maximum_age) = self.maximum_age {
                if now > created + maximum_age {
                    return Err(SignatureError::TooOld);
                }
            }
        }
        if let Some(expires) = parameters.expires() {
            if now > expires + self.maximum_skew {
                return Err(SignatureError::Expired);
            }
        }
        Ok(())
    }
}

fn unix_now() -> Result<i64, SignatureError> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| SignatureError::CryptoError(format!("system clock predates the Unix epoch: {e}")))?;
    i64::try_from(elapsed.as_secs())
        .map_err(|_| SignatureError::CryptoError("system clock out of range".to_string()))
}

/// Collapsing builder for [`VerificationSpec`]. Skew defaults to zero and
/// the clock defaults to the system clock.
#[derive(Default)]
pub struct VerificationSpecBuilder {
    label: Option<String>,
    required: Vec<SignatureComponent>,
    required_if_present: Vec<SignatureComponent>,
    required_parameters: Vec<SignatureParameter>,
    forbidden_parameters: Vec<SignatureParameter>,
    maximum_age: Option<i64>,
    maximum_skew: i64,
    now: Option<i64>,
    context: Option<SignatureContext>,
    key_provider: Option<Box<dyn KeyProvider>>,
}

impl VerificationSpecBuilder {
    /// Verify the signature entered under this label. Without a label,
    /// the headers must carry exactly one signature.
    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// The signature must cover this component.
    pub fn required_component(mut self, component: SignatureComponent) -> Self {
        self.required.push(component);
        self
    }

    /// The signature must cover this component whenever the message
    /// carries its value.
    pub fn required_component_if_present(mut self, component: SignatureComponent) -> Self {
        self.required_if_present.push(component);
        self
    }

    pub fn required_parameter(mut self, parameter: SignatureParameter) -> Self {
        self.required_parameters.push(parameter);
        self
    }

    pub fn forbidden_parameter(mut self, parameter: SignatureParameter) -> Self {
        self.forbidden_parameters.push(parameter);
        self
    }

    /// Oldest acceptable `created`, in seconds before `now`.
    pub fn maximum_age(mut self, seconds: i64) -> Self {
        self.maximum_age = Some(seconds);
        self
    }

    /// Tolerated clock difference for `created` and `expires` checks.
    pub fn maximum_skew(mut self, seconds: i64) -> Self {
        self.maximum_skew = seconds;
        self
    }

    /// Override the verification clock, in seconds since the Unix epoch.
    pub fn now(mut self, seconds: i64) -> Self {
        self.now = Some(seconds);
        self
    }

    pub fn context(mut self, context: SignatureContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn key_provider(mut self, provider: impl KeyProvider + 'static) -> Self {
        self.key_provider = Some(Box::new(provider));
        self
    }

    pub fn build(self) -> Result<VerificationSpec, SignatureError> {
        Ok(VerificationSpec {
            label: self.label,
            required: self.required,
            required_if_present: self.required_if_present,
            required_parameters: self.required_parameters,
            forbidden_parameters: self.forbidden_parameters,
            maximum_age: self.maximum_age,
            maximum_skew: self.maximum_skew,
            now: self.now,
            context: self
                .context
                .ok_or(SignatureError::MissingParameter("context".to_string()))?,
            key_provider: self
                .key_provider
                .ok_or(SignatureError::MissingParameter("key provider".to_string()))?,
        })
    }
}
