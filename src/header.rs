// dkim-stream – streaming implementation of DKIM signing and verification
// Copyright © 2022–2023 David Bürgin <dbuergin@gluet.ch>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

//! Header field types.

use crate::parse::{is_wsp, is_wsp_byte};
use bstr::ByteSlice;
use std::{
    error::Error,
    fmt::{self, Debug, Display, Formatter},
    hash::{Hash, Hasher},
};

/// A header field, consisting of name and body.
pub type HeaderField = (FieldName, FieldBody);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeaderFieldError;

impl Display for HeaderFieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ill-formed header field")
    }
}

impl Error for HeaderFieldError {}

/// The header fields of a message, in the order in which they appeared.
///
/// Unlike a complete RFC 5322 message header, the sequence may be empty: a
/// message may consist of only a body.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HeaderFields(Box<[HeaderField]>);

impl HeaderFields {
    pub fn new(value: impl Into<Box<[HeaderField]>>) -> Self {
        Self(value.into())
    }

    pub fn from_vec(value: Vec<(String, Vec<u8>)>) -> Result<Self, HeaderFieldError> {
        let value: Vec<_> = value
            .into_iter()
            .map(|(name, value)| {
                let name = FieldName::new(name)?;
                let body = FieldBody::new(value)?;
                Ok((name, body))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self::new(value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the fields with the given name, top to bottom.
    pub fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a HeaderField> {
        self.0.iter().filter(move |(n, _)| *n == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.named(name).next().is_some()
    }
}

impl AsRef<[HeaderField]> for HeaderFields {
    fn as_ref(&self) -> &[HeaderField] {
        &self.0
    }
}

/// A header field name: printable ASCII without colon, compared
/// case-insensitively.
///
/// Whitespace between the name and the colon is kept as part of the raw name
/// but ignored when names are compared.
#[derive(Clone, Eq)]
pub struct FieldName(Box<str>);

impl FieldName {
    pub fn new(value: impl Into<Box<str>>) -> Result<Self, HeaderFieldError> {
        let value = value.into();
        let name = trim_name(&value);
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_graphic() && c != ':') {
            return Err(HeaderFieldError);
        }
        Ok(Self(value))
    }

    /// The name as it appeared in the message, including any whitespace
    /// before the colon.
    pub fn raw(&self) -> &str {
        &self.0
    }
}

fn trim_name(s: &str) -> &str {
    s.trim_end_matches(is_wsp)
}

impl AsRef<str> for FieldName {
    fn as_ref(&self) -> &str {
        trim_name(&self.0)
    }
}

impl Debug for FieldName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for FieldName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl PartialEq for FieldName {
    fn eq(&self, other: &Self) -> bool {
        self.as_ref().eq_ignore_ascii_case(other.as_ref())
    }
}

impl PartialEq<str> for FieldName {
    fn eq(&self, other: &str) -> bool {
        self.as_ref().eq_ignore_ascii_case(other)
    }
}

impl PartialEq<&str> for FieldName {
    fn eq(&self, other: &&str) -> bool {
        self.as_ref().eq_ignore_ascii_case(other)
    }
}

impl Hash for FieldName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_ref().to_ascii_lowercase().hash(state);
    }
}

/// A raw header field body: everything after the colon, with the original
/// folding line breaks preserved.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct FieldBody(Box<[u8]>);

impl FieldBody {
    pub fn new(value: impl Into<Box<[u8]>>) -> Result<Self, HeaderFieldError> {
        let value = value.into();

        for (i, line) in value.split_str("\r\n").enumerate() {
            // no stray CR or LF
            if line.contains(&b'\r') || line.contains(&b'\n') {
                return Err(HeaderFieldError);
            }
            // continuation lines are folded; they may consist of whitespace
            // only (obsolete folding, RFC 5322, section 4.2)
            if i > 0 && !line.first().copied().map_or(false, is_wsp_byte) {
                return Err(HeaderFieldError);
            }
        }

        // All other bytes are allowed, UTF-8 is not required.
        Ok(Self(value))
    }
}

impl AsRef<[u8]> for FieldBody {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for FieldBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldBody").field(&self.0.as_bstr()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_name_ok() {
        assert!(FieldName::new("X-Folded-Header").is_ok());

        assert!(FieldName::new("").is_err());
        assert!(FieldName::new(" ").is_err());
        assert!(FieldName::new(" Subject").is_err());
        assert!(FieldName::new("a:c").is_err());
        assert!(FieldName::new("Sub ject").is_err());
    }

    #[test]
    fn field_name_whitespace_before_colon() {
        let name = FieldName::new("Subject \t").unwrap();

        assert_eq!(name, "subject");
        assert_eq!(name, FieldName::new("Subject").unwrap());
        assert_eq!(name.as_ref(), "Subject");
        assert_eq!(name.raw(), "Subject \t");
        assert_eq!(name.to_string(), "Subject");

        let mut set = std::collections::HashSet::new();
        set.insert(FieldName::new("SUBJECT").unwrap());
        assert!(set.contains(&name));
    }

    #[test]
    fn field_name_case_insensitive() {
        let name = FieldName::new("Message-ID").unwrap();
        assert_eq!(name, "message-id");
        assert_eq!(name, FieldName::new("MESSAGE-ID").unwrap());
    }

    #[test]
    fn field_body_ok() {
        assert!(FieldBody::new(*b" line one\r\n\tline two").is_ok());
        assert!(FieldBody::new(*b"\r\n\ta").is_ok());
        assert!(FieldBody::new(*b"").is_ok());
        assert!(FieldBody::new(*b" caf\xe9").is_ok());

        assert!(FieldBody::new(*b" a\r\n \r\n b").is_ok());
        assert!(FieldBody::new(*b" a\r\n\t\r\n b").is_ok());

        assert!(FieldBody::new(*b" \r\na").is_err());
        assert!(FieldBody::new(*b" \na").is_err());
        assert!(FieldBody::new(*b" abc\r\n").is_err());
    }

    #[test]
    fn header_fields_named() {
        let headers = HeaderFields::from_vec(vec![
            ("Received".into(), b" a".to_vec()),
            ("From".into(), b" me".to_vec()),
            ("received".into(), b" b".to_vec()),
        ])
        .unwrap();

        let values: Vec<_> = headers.named("RECEIVED").map(|(_, v)| v.as_ref()).collect();
        assert_eq!(values, [b" a", b" b"]);
        assert!(headers.contains("from"));
        assert!(!headers.contains("to"));
        assert!(HeaderFields::default().is_empty());
    }
}
