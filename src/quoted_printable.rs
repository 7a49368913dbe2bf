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

//! DKIM-Quoted-Printable encoding (RFC 4871, section 2.6).

use crate::parse::{is_hexdig, is_wsp, strip_fws};
use bstr::ByteSlice;
use std::{
    error::Error,
    fmt::{self, Display, Formatter, Write},
};

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct QuotedPrintableError;

impl Display for QuotedPrintableError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "failed to decode Quoted-Printable data")
    }
}

impl Error for QuotedPrintableError {}

/// Encodes bytes in DKIM-Quoted-Printable. Safe characters, including
/// non-ASCII UTF-8, are kept as is; everything else becomes `=XX`.
pub fn encode(bytes: &[u8]) -> String {
    let mut result = String::with_capacity(bytes.len());

    for chunk in ByteSlice::utf8_chunks(bytes) {
        for c in chunk.valid().chars() {
            if is_dkim_safe_char(c) {
                result.push(c);
            } else {
                let mut buf = [0; 4];
                for b in c.encode_utf8(&mut buf).bytes() {
                    push_encoded(&mut result, b);
                }
            }
        }
        for &b in chunk.invalid() {
            push_encoded(&mut result, b);
        }
    }

    result
}

fn push_encoded(s: &mut String, b: u8) {
    let _ = write!(s, "={b:02X}");
}

/// Decodes a DKIM-Quoted-Printable value that may contain folding
/// whitespace, which is ignored.
pub fn decode(s: &str) -> Result<Vec<u8>, QuotedPrintableError> {
    let mut result = Vec::with_capacity(s.len());
    let mut rest = s;

    loop {
        if let Some(snext) = rest.strip_prefix('=') {
            let (snext, b) = strip_hex_octet(snext).ok_or(QuotedPrintableError)?;
            result.push(b);
            rest = snext;
        } else if let Some(c) = rest.chars().next().filter(|&c| is_dkim_safe_char(c)) {
            let mut buf = [0; 4];
            result.extend(c.encode_utf8(&mut buf).bytes());
            rest = &rest[c.len_utf8()..];
        } else if let Some(snext) = strip_fws(rest) {
            rest = snext;
        } else {
            break;
        }
    }

    if rest.is_empty() {
        Ok(result)
    } else {
        Err(QuotedPrintableError)
    }
}

fn strip_hex_octet(s: &str) -> Option<(&str, u8)> {
    let digits = s.get(..2).filter(|d| d.chars().all(is_hexdig))?;
    let b = u8::from_str_radix(digits, 16).ok()?;
    Some((&s[2..], b))
}

/// Decodes a *qp-section* value (as in the *n=* tag of key records), where
/// spaces and tabs are literal.
pub fn decode_qp_section(s: &str) -> Result<Vec<u8>, QuotedPrintableError> {
    let mut result = Vec::with_capacity(s.len());
    let mut rest = s;

    while let Some(c) = rest.chars().next() {
        if c == '=' {
            let (snext, b) = strip_hex_octet(&rest[1..]).ok_or(QuotedPrintableError)?;
            result.push(b);
            rest = snext;
        } else if is_dkim_safe_char(c) || is_wsp(c) {
            let mut buf = [0; 4];
            result.extend(c.encode_utf8(&mut buf).bytes());
            rest = &rest[c.len_utf8()..];
        } else {
            return Err(QuotedPrintableError);
        }
    }

    Ok(result)
}

fn is_dkim_safe_char(c: char) -> bool {
    // printable ASCII without ; and =, plus any non-ASCII UTF-8
    matches!(c, '!'..=':' | '<' | '>'..='~') || !c.is_ascii()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_basic() {
        assert_eq!(encode(b"tom"), "tom");
        assert_eq!(encode(b"a;b c=d"), "a=3Bb=20c=3Dd");
        assert_eq!(encode(b"d\xf0\x9f\x8f\xa0\xfee"), "d🏠=FEe");
        assert_eq!(encode(b"a\xe6\x88"), "a=E6=88");
        assert_eq!(encode(b"\xe6\x88\x91\xe6"), "我=E6");
    }

    #[test]
    fn decode_basic() {
        assert_eq!(decode(""), Ok(vec![]));
        assert_eq!(decode(" ab\r\n cd "), Ok(b"abcd".to_vec()));
        assert_eq!(decode("a=3Bb=20c"), Ok(b"a;b c".to_vec()));
        assert_eq!(decode("abc我"), Ok(b"abc\xe6\x88\x91".to_vec()));

        assert_eq!(decode("ab;cd"), Err(QuotedPrintableError));
        assert_eq!(decode("ab=4"), Err(QuotedPrintableError));
        assert_eq!(decode("ab=4g"), Err(QuotedPrintableError));
    }

    #[test]
    fn decode_inverts_encode() {
        let local_part = b"joe;smith=1 2";
        assert_eq!(decode(&encode(local_part)), Ok(local_part.to_vec()));
    }

    #[test]
    fn decode_qp_section_ok() {
        assert_eq!(
            decode_qp_section(" key for o=92fj"),
            Ok(b" key for o\x92fj".to_vec())
        );
        assert_eq!(decode_qp_section("a;b"), Err(QuotedPrintableError));
    }
}
