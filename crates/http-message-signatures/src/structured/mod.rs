// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the Apache 2.0 license found in the LICENSE file or at:
//     https://opensource.org/licenses/Apache-2.0

//! Structured field values as defined in RFC 8941: the value model, a
//! [`Parser`], and a [`SerializeValue`] serializer. `Signature-Input`,
//! `Signature`, `Content-Digest`, and component identifiers are all
//! expressed in this grammar, so the rest of the crate is built on top of
//! this module.
//!
//! Values are immutable after construction and range-checked up front, so
//! serialization never fails and `parse(serialize(x)) == x` holds for any
//! value that can be constructed.

mod parser;
mod serializer;

pub use parser::Parser;
pub use serializer::SerializeValue;

use crate::SignatureError;
use indexmap::IndexMap;

/// Largest magnitude an sf-integer may carry (15 decimal digits).
const INTEGER_LIMIT: i64 = 999_999_999_999_999;

/// Largest magnitude of a decimal in thousandths (12 integer digits plus
/// 3 fractional digits).
const DECIMAL_LIMIT: i64 = 999_999_999_999_999;

/// Signed 64-bit integer restricted to the sf-integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Integer(i64);

impl Integer {
    /// Range-checked construction.
    pub fn new(value: i64) -> Result<Self, SignatureError> {
        if !(-INTEGER_LIMIT..=INTEGER_LIMIT).contains(&value) {
            return Err(SignatureError::structured(format!(
                "integer {value} out of range"
            )));
        }
        Ok(Self(value))
    }

    /// Construction for values known to be in range. Panics otherwise, so
    /// reserve it for literals.
    pub fn constant(value: i64) -> Self {
        Self::new(value).expect("integer literal out of range")
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Integer {
    type Error = SignatureError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Fixed-point decimal with at most 12 integer digits and 3 fractional
/// digits, stored in thousandths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Decimal(i64);

impl Decimal {
    /// Construct from a float, rounding the third fractional digit half to
    /// even as RFC 8941 prescribes.
    pub fn from_f64(value: f64) -> Result<Self, SignatureError> {
        if !value.is_finite() {
            return Err(SignatureError::structured("decimal must be finite"));
        }
        let scaled = (value * 1000.0).round_ties_even();
        if scaled.abs() > DECIMAL_LIMIT as f64 {
            return Err(SignatureError::structured(format!(
                "decimal {value} out of range"
            )));
        }
        Ok(Self(scaled as i64))
    }

    /// Construct from a count of thousandths.
    pub fn from_thousandths(thousandths: i64) -> Result<Self, SignatureError> {
        if !(-DECIMAL_LIMIT..=DECIMAL_LIMIT).contains(&thousandths) {
            return Err(SignatureError::structured(format!(
                "decimal {}.{:03} out of range",
                thousandths / 1000,
                (thousandths % 1000).abs()
            )));
        }
        Ok(Self(thousandths))
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    pub fn thousandths(self) -> i64 {
        self.0
    }
}

/// ASCII string covering %x20-7E, with `\` and `"` escaped on output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SfString(String);

impl SfString {
    pub fn new(value: impl Into<String>) -> Result<Self, SignatureError> {
        let value = value.into();
        if let Some(c) = value.chars().find(|c| !matches!(c, ' '..='~')) {
            return Err(SignatureError::structured(format!(
                "string contains unrepresentable character {c:?}"
            )));
        }
        Ok(Self(value))
    }

    /// Construction for values known to be printable ASCII. Panics
    /// otherwise, so reserve it for literals.
    pub fn constant(value: &str) -> Self {
        Self::new(value).expect("string literal contains unrepresentable characters")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_tchar(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

/// Token: begins with ALPHA or `*`, continues with tchar, `:`, or `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Result<Self, SignatureError> {
        let value = value.into();
        let mut chars = value.chars();
        let valid = match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '*' => {
                chars.all(|c| is_tchar(c) || c == ':' || c == '/')
            }
            _ => false,
        };
        if !valid {
            return Err(SignatureError::structured(format!(
                "invalid token {value:?}"
            )));
        }
        Ok(Self(value))
    }

    /// Construction for values known to satisfy the token grammar. Panics
    /// otherwise, so reserve it for literals.
    pub fn constant(value: &str) -> Self {
        Self::new(value).expect("token literal is not a valid token")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Parameter and dictionary key: begins with lcalpha or `*`, continues with
/// lcalpha, DIGIT, `_`, `-`, `.`, or `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(String);

impl Key {
    pub fn new(value: impl Into<String>) -> Result<Self, SignatureError> {
        let value = value.into();
        let mut chars = value.chars();
        let valid = match chars.next() {
            Some(c) if c.is_ascii_lowercase() || c == '*' => {
                chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "_-.*".contains(c))
            }
            _ => false,
        };
        if !valid {
            return Err(SignatureError::structured(format!("invalid key {value:?}")));
        }
        Ok(Self(value))
    }

    /// Construction for keys known to satisfy the key grammar. Panics
    /// otherwise, so reserve it for literals.
    pub fn constant(value: &str) -> Self {
        Self::new(value).expect("key literal is not a valid key")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A bare value: exactly one of the six RFC 8941 item types.
#[derive(Debug, Clone, PartialEq)]
pub enum BareItem {
    Integer(Integer),
    Decimal(Decimal),
    String(SfString),
    Token(Token),
    ByteSequence(Vec<u8>),
    Boolean(bool),
}

impl BareItem {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            BareItem::Integer(v) => Some(v.get()),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            BareItem::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            BareItem::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_token(&self) -> Option<&str> {
        match self {
            BareItem::Token(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_byte_sequence(&self) -> Option<&[u8]> {
        match self {
            BareItem::ByteSequence(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            BareItem::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<Integer> for BareItem {
    fn from(value: Integer) -> Self {
        BareItem::Integer(value)
    }
}

impl From<Decimal> for BareItem {
    fn from(value: Decimal) -> Self {
        BareItem::Decimal(value)
    }
}

impl From<SfString> for BareItem {
    fn from(value: SfString) -> Self {
        BareItem::String(value)
    }
}

impl From<Token> for BareItem {
    fn from(value: Token) -> Self {
        BareItem::Token(value)
    }
}

impl From<Vec<u8>> for BareItem {
    fn from(value: Vec<u8>) -> Self {
        BareItem::ByteSequence(value)
    }
}

impl From<bool> for BareItem {
    fn from(value: bool) -> Self {
        BareItem::Boolean(value)
    }
}

/// Ordered parameter map. Insertion order is significant on output;
/// duplicate keys keep their first position and last value.
pub type Parameters = IndexMap<Key, BareItem>;

/// A bare item plus its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub bare_item: BareItem,
    pub params: Parameters,
}

impl Item {
    pub fn new(bare_item: impl Into<BareItem>) -> Self {
        Self {
            bare_item: bare_item.into(),
            params: Parameters::new(),
        }
    }

    pub fn with_params(bare_item: impl Into<BareItem>, params: Parameters) -> Self {
        Self {
            bare_item: bare_item.into(),
            params,
        }
    }
}

/// Parenthesized sequence of items, itself parameterizable.
#[derive(Debug, Clone, PartialEq)]
pub struct InnerList {
    pub items: Vec<Item>,
    pub params: Parameters,
}

impl InnerList {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items,
            params: Parameters::new(),
        }
    }

    pub fn with_params(items: Vec<Item>, params: Parameters) -> Self {
        Self { items, params }
    }
}

/// A list or dictionary member.
#[derive(Debug, Clone, PartialEq)]
pub enum ListEntry {
    Item(Item),
    InnerList(InnerList),
}

impl From<Item> for ListEntry {
    fn from(value: Item) -> Self {
        ListEntry::Item(value)
    }
}

impl From<InnerList> for ListEntry {
    fn from(value: InnerList) -> Self {
        ListEntry::InnerList(value)
    }
}

/// Ordered top-level list.
pub type List = Vec<ListEntry>;

/// Ordered top-level dictionary. Duplicate keys keep their first position
/// and last value.
pub type Dictionary = IndexMap<Key, ListEntry>;
