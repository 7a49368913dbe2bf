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

//! Tag-list syntax (RFC 4871, section 3.2).

use crate::{
    parse::{remove_fws, strip_fws, strip_suffix},
    quoted_printable,
};
use base64ct::{Base64, Encoding};
use std::collections::HashSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagListParseError {
    DuplicateTag,
    Syntax,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagSpec<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

/// A parsed tag-list. Tag values are kept as they appear, with any inner
/// folding whitespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagList<'a>(Vec<TagSpec<'a>>);

impl<'a> AsRef<[TagSpec<'a>]> for TagList<'a> {
    fn as_ref(&self) -> &[TagSpec<'a>] {
        &self.0
    }
}

impl<'a> TagList<'a> {
    pub fn from_str(val: &'a str) -> Result<Self, TagListParseError> {
        match parse_tag_list(val) {
            Some((rest, tags)) if rest.is_empty() => {
                let mut names_seen = HashSet::new();
                if tags.iter().any(|tag| !names_seen.insert(tag.name)) {
                    return Err(TagListParseError::DuplicateTag);
                }
                Ok(Self(tags))
            }
            _ => Err(TagListParseError::Syntax),
        }
    }

    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.0.iter().find(|t| t.name == name).map(|t| t.value)
    }
}

fn parse_tag_list(val: &str) -> Option<(&str, Vec<TagSpec<'_>>)> {
    let (mut s, t) = parse_tag_spec(val)?;

    let mut tags = vec![t];

    while let Some((snext, t)) = s.strip_prefix(';').and_then(parse_tag_spec) {
        s = snext;
        tags.push(t);
    }

    // optional trailing semicolon, possibly followed by FWS
    let s = match s.strip_prefix(';') {
        Some(s) => strip_fws(s).unwrap_or(s),
        None => s,
    };

    Some((s, tags))
}

fn parse_tag_spec(val: &str) -> Option<(&str, TagSpec<'_>)> {
    let s = strip_fws(val).unwrap_or(val);

    let (s, name) = parse_tag_name(s)?;

    let s = strip_fws(s).unwrap_or(s);

    let s = s.strip_prefix('=')?;

    let s = strip_fws(s).unwrap_or(s);

    let (s, value) = match parse_tag_value(s) {
        Some((s, value)) => (strip_fws(s).unwrap_or(s), value),
        None => (s, ""),
    };

    Some((s, TagSpec { name, value }))
}

/// Strips a tag name and the following `=` from the start of `input`,
/// returning the remainder and the tag name.
pub fn strip_tag_name_and_equals(input: &str) -> Option<(&str, &str)> {
    let s = strip_fws(input).unwrap_or(input);

    let (s, name) = parse_tag_name(s)?;

    let s = strip_fws(s).unwrap_or(s);

    let s = s.strip_prefix('=')?;

    Some((s, name))
}

fn parse_tag_name(value: &str) -> Option<(&str, &str)> {
    let s = value
        .strip_prefix(|c: char| c.is_ascii_alphabetic())?
        .trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_');
    Some((s, strip_suffix(value, s)))
}

fn parse_tag_value(value: &str) -> Option<(&str, &str)> {
    fn strip_tval(s: &str) -> Option<&str> {
        s.strip_prefix(is_tval_char)
            .map(|s| s.trim_start_matches(is_tval_char))
    }

    let mut s = strip_tval(value)?;

    while let Some(snext) = strip_fws(s).and_then(strip_tval) {
        s = snext;
    }

    Some((s, strip_suffix(value, s)))
}

/// Printable ASCII without `;`, or any non-ASCII character.
pub fn is_tval_char(c: char) -> bool {
    matches!(c, '!'..=':' | '<'..='~') || !c.is_ascii()
}

/// Splits a colon-separated value, trimming folding whitespace around the
/// elements.
pub fn parse_colon_separated_tag_value(value: &str) -> Vec<&str> {
    value
        .split(':')
        .map(|s| s.trim_matches(|c| matches!(c, ' ' | '\t' | '\r' | '\n')))
        .collect()
}

pub fn parse_base64_tag_value(value: &str) -> Result<Vec<u8>, TagListParseError> {
    let value = remove_fws(value);
    Base64::decode_vec(&value).map_err(|_| TagListParseError::Syntax)
}

pub fn parse_qp_section_tag_value(value: &str) -> Result<Vec<u8>, TagListParseError> {
    quoted_printable::decode_qp_section(value).map_err(|_| TagListParseError::Syntax)
}

pub fn parse_dqp_tag_value(value: &str) -> Result<Vec<u8>, TagListParseError> {
    quoted_printable::decode(value).map_err(|_| TagListParseError::Syntax)
}
