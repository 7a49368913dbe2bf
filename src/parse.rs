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

//! Small lexical helpers shared by the tag-list and header parsers.

pub const CRLF: &str = "\r\n";

/// Returns the prefix of `s` that precedes the remainder `rest`.
pub fn strip_suffix<'a>(s: &'a str, rest: &str) -> &'a str {
    debug_assert!(s.ends_with(rest));
    &s[..(s.len() - rest.len())]
}

/// Strips folding whitespace at the start, `None` if there is none.
pub fn strip_fws(input: &str) -> Option<&str> {
    // Strip as much as possible: `" \r\nx"` yields `"\r\nx"`.
    match strip_wsp(input) {
        Some(s) => s.strip_prefix(CRLF).and_then(strip_wsp).or(Some(s)),
        None => input.strip_prefix(CRLF).and_then(strip_wsp),
    }
}

/// Strips folding whitespace at the end, `None` if there is none.
pub fn rstrip_fws(input: &str) -> Option<&str> {
    let s = rstrip_wsp(input)?;
    match s.strip_suffix(CRLF) {
        Some(s) => rstrip_wsp(s).or(Some(s)),
        None => Some(s),
    }
}

fn strip_wsp(input: &str) -> Option<&str> {
    input
        .strip_prefix(is_wsp)
        .map(|s| s.trim_start_matches(is_wsp))
}

fn rstrip_wsp(input: &str) -> Option<&str> {
    input
        .strip_suffix(is_wsp)
        .map(|s| s.trim_end_matches(is_wsp))
}

pub fn is_wsp(c: char) -> bool {
    matches!(c, ' ' | '\t')
}

pub fn is_wsp_byte(b: u8) -> bool {
    matches!(b, b' ' | b'\t')
}

pub fn is_hexdig(c: char) -> bool {
    matches!(c, '0'..='9' | 'A'..='F')
}

/// Removes all folding whitespace characters from a well-formed value.
pub fn remove_fws(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '\r' | '\n'))
        .collect()
}
