// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the Apache 2.0 license found in the LICENSE file or at:
//     https://opensource.org/licenses/Apache-2.0

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::{
    BareItem, Decimal, Dictionary, InnerList, Integer, Item, Key, List, ListEntry, Parameters,
    SfString, Token, is_tchar,
};
use crate::SignatureError;

/// Left-to-right parser over one field value. Construct with the input,
/// then call exactly one of the `parse_*` entry points; each consumes the
/// parser and insists the whole input (minus trailing SP) was used.
///
/// Errors carry the byte offset at which scanning stopped.
pub struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    /// Parse the input as an sf-item.
    pub fn parse_item(mut self) -> Result<Item, SignatureError> {
        self.skip_sp();
        let item = self.item()?;
        self.finish()?;
        Ok(item)
    }

    /// Parse the input as an sf-list. Empty input is the empty list.
    pub fn parse_list(mut self) -> Result<List, SignatureError> {
        self.skip_sp();
        let mut list = List::new();
        if self.at_end() {
            return Ok(list);
        }
        loop {
            list.push(self.list_entry()?);
            self.skip_ows();
            if self.at_end() {
                return Ok(list);
            }
            self.expect(b',')?;
            self.skip_ows();
            if self.at_end() {
                return Err(self.error("trailing comma"));
            }
        }
    }

    /// Parse the input as an sf-dictionary. Empty input is the empty
    /// dictionary; duplicate keys keep the last value.
    pub fn parse_dictionary(mut self) -> Result<Dictionary, SignatureError> {
        self.skip_sp();
        let mut dict = Dictionary::new();
        if self.at_end() {
            return Ok(dict);
        }
        loop {
            let key = self.key()?;
            let member = if self.eat(b'=') {
                self.list_entry()?
            } else {
                // A bare key is boolean true carrying the parsed parameters.
                ListEntry::Item(Item::with_params(true, self.parameters()?))
            };
            dict.insert(key, member);
            self.skip_ows();
            if self.at_end() {
                return Ok(dict);
            }
            self.expect(b',')?;
            self.skip_ows();
            if self.at_end() {
                return Err(self.error("trailing comma"));
            }
        }
    }

    fn finish(&mut self) -> Result<(), SignatureError> {
        self.skip_sp();
        if !self.at_end() {
            return Err(self.error("trailing characters after value"));
        }
        Ok(())
    }

    fn list_entry(&mut self) -> Result<ListEntry, SignatureError> {
        if self.peek() == Some(b'(') {
            Ok(ListEntry::InnerList(self.inner_list()?))
        } else {
            Ok(ListEntry::Item(self.item()?))
        }
    }

    fn inner_list(&mut self) -> Result<InnerList, SignatureError> {
        self.expect(b'(')?;
        let mut items = Vec::new();
        loop {
            self.skip_sp();
            if self.eat(b')') {
                return Ok(InnerList::with_params(items, self.parameters()?));
            }
            if self.at_end() {
                return Err(self.error("unterminated inner list"));
            }
            items.push(self.item()?);
            match self.peek() {
                Some(b' ') | Some(b')') => {}
                _ => return Err(self.error("expected space or `)` in inner list")),
            }
        }
    }

    fn item(&mut self) -> Result<Item, SignatureError> {
        let bare_item = self.bare_item()?;
        Ok(Item::with_params(bare_item, self.parameters()?))
    }

    fn bare_item(&mut self) -> Result<BareItem, SignatureError> {
        match self.peek() {
            Some(b'-' | b'0'..=b'9') => self.number(),
            Some(b'"') => self.string(),
            Some(b':') => self.byte_sequence(),
            Some(b'?') => self.boolean(),
            Some(c) if c == b'*' || c.is_ascii_alphabetic() => self.token(),
            Some(_) => Err(self.error("unrecognized value start")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn number(&mut self) -> Result<BareItem, SignatureError> {
        let negative = self.eat(b'-');
        let mut integral: i64 = 0;
        let mut int_digits = 0usize;
        while let Some(c @ b'0'..=b'9') = self.peek() {
            integral = integral * 10 + i64::from(c - b'0');
            int_digits += 1;
            if int_digits > 15 {
                return Err(self.error("integer has more than 15 digits"));
            }
            self.pos += 1;
        }
        if int_digits == 0 {
            return Err(self.error("expected digit"));
        }
        if !self.eat(b'.') {
            let value = if negative { -integral } else { integral };
            return Integer::new(value)
                .map(BareItem::Integer)
                .map_err(|_| self.error("integer out of range"));
        }
        if int_digits > 12 {
            return Err(self.error("decimal integer part has more than 12 digits"));
        }
        let mut frac: i64 = 0;
        let mut frac_digits = 0usize;
        while let Some(c @ b'0'..=b'9') = self.peek() {
            frac = frac * 10 + i64::from(c - b'0');
            frac_digits += 1;
            if frac_digits > 3 {
                return Err(self.error("decimal has more than 3 fractional digits"));
            }
            self.pos += 1;
        }
        if frac_digits == 0 {
            return Err(self.error("decimal ends in `.`"));
        }
        for _ in frac_digits..3 {
            frac *= 10;
        }
        let thousandths = integral * 1000 + frac;
        let thousandths = if negative { -thousandths } else { thousandths };
        Decimal::from_thousandths(thousandths)
            .map(BareItem::Decimal)
            .map_err(|_| self.error("decimal out of range"))
    }

    fn string(&mut self) -> Result<BareItem, SignatureError> {
        self.expect(b'"')?;
        let mut value = String::new();
        loop {
            match self.advance() {
                Some(b'"') => return Ok(BareItem::String(SfString(value))),
                Some(b'\\') => match self.advance() {
                    Some(c @ (b'"' | b'\\')) => value.push(c as char),
                    _ => return Err(self.error("invalid escape in string")),
                },
                Some(c) if (0x20..=0x7e).contains(&c) => value.push(c as char),
                Some(_) => return Err(self.error("control or non-ascii character in string")),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn byte_sequence(&mut self) -> Result<BareItem, SignatureError> {
        self.expect(b':')?;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == b':' {
                break;
            }
            self.pos += 1;
        }
        if self.peek() != Some(b':') {
            return Err(self.error("unterminated byte sequence"));
        }
        let encoded = &self.input[start..self.pos];
        self.pos += 1;
        STANDARD
            .decode(encoded)
            .map(BareItem::ByteSequence)
            .map_err(|_| SignatureError::structured_at(start, "invalid base64 in byte sequence"))
    }

    fn boolean(&mut self) -> Result<BareItem, SignatureError> {
        self.expect(b'?')?;
        match self.advance() {
            Some(b'0') => Ok(BareItem::Boolean(false)),
            Some(b'1') => Ok(BareItem::Boolean(true)),
            _ => Err(self.error("boolean must be ?0 or ?1")),
        }
    }

    fn token(&mut self) -> Result<BareItem, SignatureError> {
        let start = self.pos;
        // First character was validated by the dispatcher.
        self.pos += 1;
        while let Some(c) = self.peek() {
            let c = c as char;
            if is_tchar(c) || c == ':' || c == '/' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let value = self.input[start..self.pos].iter().map(|&c| c as char).collect();
        Ok(BareItem::Token(Token(value)))
    }

    fn key(&mut self) -> Result<Key, SignatureError> {
        match self.peek() {
            Some(c) if c.is_ascii_lowercase() || c == b'*' => {}
            _ => return Err(self.error("expected key")),
        }
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, b'_' | b'-' | b'.' | b'*')
            {
                self.pos += 1;
            } else {
                break;
            }
        }
        let value = self.input[start..self.pos].iter().map(|&c| c as char).collect();
        Ok(Key(value))
    }

    fn parameters(&mut self) -> Result<Parameters, SignatureError> {
        let mut params = Parameters::new();
        while self.eat(b';') {
            self.skip_sp();
            let key = self.key()?;
            let value = if self.eat(b'=') {
                self.bare_item()?
            } else {
                BareItem::Boolean(true)
            };
            params.insert(key, value);
        }
        Ok(params)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), SignatureError> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{}`", byte as char)))
        }
    }

    fn skip_sp(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn skip_ows(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn error(&self, reason: impl Into<String>) -> SignatureError {
        SignatureError::structured_at(self.pos, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structured::SerializeValue;

    #[test]
    fn dictionary_duplicate_keys_last_wins() {
        let dict = Parser::new("a=1, a=2").parse_dictionary().unwrap();
        assert_eq!(dict.len(), 1);
        match dict.get("a").unwrap() {
            ListEntry::Item(item) => assert_eq!(item.bare_item.as_integer(), Some(2)),
            ListEntry::InnerList(_) => panic!("expected item"),
        }
    }

    #[test]
    fn dictionary_bare_key_is_boolean_true_with_params() {
        let dict = Parser::new("a;x=1, b=?0").parse_dictionary().unwrap();
        let ListEntry::Item(a) = dict.get("a").unwrap() else {
            panic!("expected item");
        };
        assert_eq!(a.bare_item.as_boolean(), Some(true));
        assert_eq!(a.params.get("x").unwrap().as_integer(), Some(1));
        let ListEntry::Item(b) = dict.get("b").unwrap() else {
            panic!("expected item");
        };
        assert_eq!(b.bare_item.as_boolean(), Some(false));
    }

    #[test]
    fn signature_input_shape_parses() {
        let dict = Parser::new(
            r#"sig1=("@method" "@path" "content-type";sf);created=1618884473;keyid="test-key""#,
        )
        .parse_dictionary()
        .unwrap();
        let ListEntry::InnerList(inner) = dict.get("sig1").unwrap() else {
            panic!("expected inner list");
        };
        assert_eq!(inner.items.len(), 3);
        assert_eq!(inner.items[0].bare_item.as_string(), Some("@method"));
        assert_eq!(inner.items[2].params.get("sf").unwrap().as_boolean(), Some(true));
        assert_eq!(inner.params.get("created").unwrap().as_integer(), Some(1618884473));
        assert_eq!(inner.params.get("keyid").unwrap().as_string(), Some("test-key"));
    }

    #[test]
    fn integer_overflow_fails_with_offset() {
        let err = Parser::new("1234567890123456").parse_item().unwrap_err();
        match err {
            SignatureError::InvalidStructuredHeader { offset, .. } => {
                assert_eq!(offset, Some(15));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(Parser::new("-999999999999999").parse_item().is_ok());
    }

    #[test]
    fn decimal_limits() {
        assert!(Parser::new("1.5").parse_item().is_ok());
        assert!(Parser::new("123456789012.1").parse_item().is_ok());
        assert!(Parser::new("1234567890123.1").parse_item().is_err());
        assert!(Parser::new("1.5678").parse_item().is_err());
        assert!(Parser::new("1.").parse_item().is_err());
    }

    #[test]
    fn strings_escapes_and_controls() {
        let item = Parser::new(r#""a\"b\\c""#).parse_item().unwrap();
        assert_eq!(item.bare_item.as_string(), Some(r#"a"b\c"#));
        assert!(Parser::new("\"tab\tchar\"").parse_item().is_err());
        assert!(Parser::new("\"open").parse_item().is_err());
        assert!(Parser::new(r#""bad\n""#).parse_item().is_err());
    }

    #[test]
    fn byte_sequences_round_base64() {
        let item = Parser::new(":aGVsbG8=:").parse_item().unwrap();
        assert_eq!(item.bare_item.as_byte_sequence(), Some(b"hello".as_slice()));
        assert!(Parser::new(":aGVsbG8:").parse_item().is_err());
        assert!(Parser::new(":aGVsbG8=").parse_item().is_err());
    }

    #[test]
    fn tokens_and_booleans() {
        let item = Parser::new("*tok/a:b").parse_item().unwrap();
        assert_eq!(item.bare_item.as_token(), Some("*tok/a:b"));
        assert_eq!(
            Parser::new("?0").parse_item().unwrap().bare_item.as_boolean(),
            Some(false)
        );
        assert!(Parser::new("?2").parse_item().is_err());
    }

    #[test]
    fn lists_ows_and_trailing_comma() {
        let list = Parser::new("a,\tb , (1 2);q=0.5").parse_list().unwrap();
        assert_eq!(list.len(), 3);
        assert!(Parser::new("a, b,").parse_list().is_err());
        assert!(Parser::new("a b").parse_list().is_err());
    }

    #[test]
    fn empty_input_is_empty_container() {
        assert!(Parser::new("").parse_list().unwrap().is_empty());
        assert!(Parser::new("   ").parse_dictionary().unwrap().is_empty());
        assert!(Parser::new("").parse_item().is_err());
    }

    #[test]
    fn leading_and_trailing_sp_only() {
        assert!(Parser::new("  1  ").parse_item().is_ok());
        assert!(Parser::new("1 x").parse_item().is_err());
    }

    #[test]
    fn serialized_form_is_canonical_and_idempotent() {
        let first = Parser::new("a=1,  b;x=?1 ,c=( \"s\"  tok)")
            .parse_dictionary()
            .unwrap()
            .serialize_value();
        assert_eq!(first, r#"a=1, b;x, c=("s" tok)"#);
        let second = Parser::new(&first).parse_dictionary().unwrap().serialize_value();
        assert_eq!(first, second);
    }
}
