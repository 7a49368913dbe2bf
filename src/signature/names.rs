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

use crate::tag_list;
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    hash::{Hash, Hasher},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParseDomainError;

impl Display for ParseDomainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "could not parse domain name")
    }
}

impl Error for ParseDomainError {}

/// A domain name, as used in the *d=* tag and in identities.
///
/// The string is validated and kept as given. Comparison is ASCII
/// case-insensitive.
#[derive(Clone, Eq)]
pub struct DomainName(Box<str>);

impl DomainName {
    pub fn new(s: &str) -> Result<Self, ParseDomainError> {
        if s.ends_with('.') || !is_valid_dns_name(s) {
            return Err(ParseDomainError);
        }
        Ok(Self(s.into()))
    }

    /// Whether this domain is equal to `other` or a subdomain of it.
    pub fn eq_or_subdomain_of(&self, other: &DomainName) -> bool {
        let (name, other) = (&self.0, &other.0);

        if name.eq_ignore_ascii_case(other) {
            return true;
        }

        name.len() > other.len()
            && matches!(name.get((name.len() - other.len())..), Some(s) if s.eq_ignore_ascii_case(other))
            && name.as_bytes()[name.len() - other.len() - 1] == b'.'
    }
}

impl Display for DomainName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DomainName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &self.0)
    }
}

impl AsRef<str> for DomainName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq for DomainName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Hash for DomainName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

fn is_valid_dns_name(s: &str) -> bool {
    fn is_tld(s: &str) -> bool {
        is_label(s) && !s.chars().all(|c| c.is_ascii_digit())
    }

    if !matches!(s.len(), 1..=253) {
        return false;
    }

    let mut labels = s.split('.').rev().peekable();

    if matches!(labels.next(), Some(l) if !is_tld(l)) {
        return false;
    }
    if labels.peek().is_none() {
        return false;
    }

    labels.all(is_label)
}

fn is_label(s: &str) -> bool {
    matches!(s.len(), 1..=63)
        && !s.starts_with('-')
        && !s.ends_with('-')
        && s.chars().all(|c| tag_list::is_tval_char(c) && c != '.')
}

/// A selector, as used in the *s=* tag.
#[derive(Clone, Eq)]
pub struct Selector(Box<str>);

impl Selector {
    pub fn new(s: &str) -> Result<Self, ParseDomainError> {
        // Lenient: labels like "dkim_2023" are accepted.
        if !s.split('.').all(is_label) {
            return Err(ParseDomainError);
        }
        Ok(Self(s.into()))
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &self.0)
    }
}

impl AsRef<str> for Selector {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Hash for Selector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

/// The agent or user identifier of the *i=* tag: an address whose local-part
/// is optional.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub local_part: Option<Box<str>>,
    pub domain: DomainName,
}

impl Identity {
    pub fn new(s: &str) -> Result<Self, ParseDomainError> {
        let (local_part, domain) = s.rsplit_once('@').ok_or(ParseDomainError)?;

        let local_part = if local_part.is_empty() {
            None
        } else if is_local_part(local_part) {
            Some(local_part.into())
        } else {
            return Err(ParseDomainError);
        };

        Ok(Self {
            local_part,
            domain: DomainName::new(domain)?,
        })
    }

}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(local_part) = &self.local_part {
            f.write_str(local_part)?;
        }
        write!(f, "@{}", self.domain)
    }
}

fn is_local_part(s: &str) -> bool {
    // RFC 5321, section 4.5.3.1.1
    if s.len() > 64 {
        return false;
    }

    if s.starts_with('"') {
        is_quoted_string(s)
    } else {
        is_dot_string(s)
    }
}

fn is_quoted_string(s: &str) -> bool {
    fn is_qtext(c: char) -> bool {
        c == ' ' || c.is_ascii_graphic() && !matches!(c, '"' | '\\') || !c.is_ascii()
    }

    let inner = match s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) => inner,
        None => return false,
    };

    let mut escaped = false;
    for c in inner.chars() {
        if escaped {
            if !(c == ' ' || c.is_ascii_graphic()) {
                return false;
            }
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if !is_qtext(c) {
            return false;
        }
    }
    !escaped
}

fn is_dot_string(s: &str) -> bool {
    fn is_atext(c: char) -> bool {
        c.is_ascii_alphanumeric()
            || matches!(
                c,
                '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '/' | '=' | '?' | '^' | '_'
                | '`' | '{' | '|' | '}' | '~'
            )
            || !c.is_ascii()
    }

    s.split('.').all(|atom| !atom.is_empty() && atom.chars().all(is_atext))
}
