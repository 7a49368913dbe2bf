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

//! Canonicalization of header fields and body (RFC 4871, section 3.4).

use crate::{
    header::{FieldName, HeaderFields},
    parse::{is_wsp, is_wsp_byte},
    signature::CanonicalizationAlgorithm,
};
use bstr::ByteSlice;
use std::collections::HashSet;

const SP: u8 = b' ';
const CR: u8 = b'\r';
const LF: u8 = b'\n';
const CRLF: [u8; 2] = [CR, LF];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum CanonState {
    Start,
    LineStart,
    Cr,
    Wsp,
    WspCr,
    Text,
}

/// Streaming body canonicalizer.
///
/// Only CRLF is recognised as a line break; stray CR and LF are ordinary
/// bytes. Empty lines are held back until it is known whether they are
/// trailing, so output may lag input.
#[derive(Clone, Debug)]
pub struct BodyCanonicalizer {
    kind: CanonicalizationAlgorithm,
    state: CanonState,
    // nothing but (possibly removed) whitespace on the current line
    blank_line: bool,
    pending_empty_lines: usize,
    // some content has been written
    content_seen: bool,
}

impl BodyCanonicalizer {
    pub fn new(kind: CanonicalizationAlgorithm) -> Self {
        Self {
            kind,
            state: CanonState::Start,
            blank_line: true,
            pending_empty_lines: 0,
            content_seen: false,
        }
    }

    pub fn simple() -> Self {
        Self::new(CanonicalizationAlgorithm::Simple)
    }

    pub fn relaxed() -> Self {
        Self::new(CanonicalizationAlgorithm::Relaxed)
    }

    pub fn kind(&self) -> CanonicalizationAlgorithm {
        self.kind
    }

    /// Canonicalizes the next chunk of body, appending the output to `out`.
    pub fn canonicalize_chunk(&mut self, bytes: &[u8], out: &mut Vec<u8>) {
        let relaxed = self.kind == CanonicalizationAlgorithm::Relaxed;

        for &b in bytes {
            match self.state {
                CanonState::Start | CanonState::LineStart | CanonState::Text => {
                    if b == CR {
                        self.state = CanonState::Cr;
                    } else if relaxed && is_wsp_byte(b) {
                        self.state = CanonState::Wsp;
                    } else {
                        self.write_content(out, &[b]);
                    }
                }
                CanonState::Cr => {
                    if b == LF {
                        self.end_line(out);
                    } else if b == CR {
                        self.write_content(out, &[CR]);
                        self.state = CanonState::Cr;
                    } else if relaxed && is_wsp_byte(b) {
                        self.write_content(out, &[CR]);
                        self.state = CanonState::Wsp;
                    } else {
                        self.write_content(out, &[CR, b]);
                    }
                }
                CanonState::Wsp => {
                    if b == CR {
                        self.state = CanonState::WspCr;
                    } else if !is_wsp_byte(b) {
                        self.write_content(out, &[SP, b]);
                    }
                }
                CanonState::WspCr => {
                    if b == LF {
                        // trailing whitespace is dropped
                        self.end_line(out);
                    } else if b == CR {
                        self.write_content(out, &[SP, CR]);
                        self.state = CanonState::Cr;
                    } else if is_wsp_byte(b) {
                        self.write_content(out, &[SP, CR]);
                        self.state = CanonState::Wsp;
                    } else {
                        self.write_content(out, &[SP, CR, b]);
                    }
                }
            }
        }
    }

    /// Ends the body, appending the final output to `out`.
    pub fn finish(mut self, out: &mut Vec<u8>) {
        match self.state {
            CanonState::Start | CanonState::LineStart => {
                // An empty simple body is a single CRLF.
                if self.kind == CanonicalizationAlgorithm::Simple && !self.content_seen {
                    out.extend(CRLF);
                }
            }
            CanonState::Text => out.extend(CRLF),
            CanonState::Cr => {
                self.write_content(out, &[CR]);
                out.extend(CRLF);
            }
            CanonState::Wsp => {
                if !self.blank_line {
                    out.extend(CRLF);
                }
            }
            CanonState::WspCr => {
                self.write_content(out, &[SP, CR]);
                out.extend(CRLF);
            }
        }
    }

    fn write_content(&mut self, out: &mut Vec<u8>, bytes: &[u8]) {
        for _ in 0..self.pending_empty_lines {
            out.extend(CRLF);
        }
        self.pending_empty_lines = 0;
        self.blank_line = false;
        self.content_seen = true;
        out.extend(bytes);
        self.state = CanonState::Text;
    }

    fn end_line(&mut self, out: &mut Vec<u8>) {
        if self.blank_line {
            self.pending_empty_lines += 1;
        } else {
            out.extend(CRLF);
            self.blank_line = true;
        }
        self.state = CanonState::LineStart;
    }
}

/// Canonicalizes a complete body.
pub fn canonicalize_body(kind: CanonicalizationAlgorithm, body: &[u8]) -> Vec<u8> {
    let mut canonicalizer = BodyCanonicalizer::new(kind);
    let mut result = Vec::with_capacity(body.len() + 2);
    canonicalizer.canonicalize_chunk(body, &mut result);
    canonicalizer.finish(&mut result);
    result
}

/// Canonicalizes the header fields selected by `selected_headers`, in that
/// order, each terminated with CRLF.
///
/// A name listed several times selects successive fields of that name, from
/// the bottom of the header upwards. Names without a remaining field
/// contribute nothing.
pub fn canonicalize_headers(
    kind: CanonicalizationAlgorithm,
    headers: &HeaderFields,
    selected_headers: &[FieldName],
) -> Vec<u8> {
    let mut result = vec![];
    let mut used = HashSet::with_capacity(selected_headers.len());

    for selected in selected_headers {
        let next = headers
            .as_ref()
            .iter()
            .enumerate()
            .rev()
            .find(|(i, (name, _))| name == selected && !used.contains(i));

        if let Some((i, (name, value))) = next {
            canonicalize_header(&mut result, kind, name.raw(), value);
            result.extend(CRLF);
            used.insert(i);
        }
    }

    result
}

/// Canonicalizes a single header field, without the final CRLF.
///
/// `name` is the raw field name, including any whitespace before the colon.
pub fn canonicalize_header(
    result: &mut Vec<u8>,
    kind: CanonicalizationAlgorithm,
    name: impl AsRef<str>,
    value: impl AsRef<[u8]>,
) {
    let name = name.as_ref();
    let value = value.as_ref();

    match kind {
        CanonicalizationAlgorithm::Simple => {
            result.extend(name.bytes());
            result.push(b':');
            result.extend(value);
        }
        CanonicalizationAlgorithm::Relaxed => {
            result.extend(name.trim_end_matches(is_wsp).to_ascii_lowercase().bytes());
            result.push(b':');
            canonicalize_header_value_relaxed(result, value);
        }
    }
}

fn canonicalize_header_value_relaxed(result: &mut Vec<u8>, value: &[u8]) {
    // Unfolding and whitespace compression in one pass: CR and LF only occur
    // as part of folding whitespace here.
    fn is_space(c: char) -> bool {
        matches!(c, ' ' | '\t' | '\r' | '\n')
    }

    let mut in_space = false;
    for &b in value.trim_with(is_space) {
        if is_space(b.into()) {
            if !in_space {
                result.push(SP);
                in_space = true;
            }
        } else {
            result.push(b);
            in_space = false;
        }
    }
}
