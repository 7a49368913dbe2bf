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


use crate::{
    header::FieldName,
    quoted_printable,
    signature::{
        Canonicalization, DkimSignature, DomainName, Identity, Selector, SignatureAlgorithm,
    },
};
use base64ct::{Base64, Encoding};
use std::{fmt::Write, iter};

// Formatting counts characters, not bytes: d=, s= and i= may be non-ASCII.

pub const LINE_WIDTH: usize = 78;
pub const INDENT: &str = "\t";

/// DKIM signature data that does not yet have a cryptographic signature.
pub struct UnsignedDkimSignature {
    pub algorithm: SignatureAlgorithm,
    pub body_hash: Box<[u8]>,
    pub canonicalization: Canonicalization,
    pub domain: DomainName,
    pub signed_headers: Box<[FieldName]>,
    pub identity: Option<Identity>,
    pub body_length: Option<u64>,
    pub selector: Selector,
    pub timestamp: Option<u64>,
    pub expiration: Option<u64>,
}

impl UnsignedDkimSignature {
    /// Returns the formatted header value ending in an empty *b=* tag, ready
    /// for computing the header hash. Line length accounts for a preceding
    /// header name of `name_len` characters plus colon.
    pub fn format_without_signature(&self, name_len: usize) -> String {
        format_without_signature(self, name_len)
    }

    pub fn into_signature(self, signature_data: Box<[u8]>) -> DkimSignature {
        DkimSignature {
            algorithm: self.algorithm,
            signature_data,
            body_hash: self.body_hash,
            canonicalization: self.canonicalization,
            domain: self.domain,
            signed_headers: self.signed_headers,
            identity: self.identity,
            body_length: self.body_length,
            selector: self.selector,
            timestamp: self.timestamp,
            expiration: self.expiration,
        }
    }
}

// Ephemeral context holding current formatting options.
#[derive(Clone, Copy)]
struct Fmt<'a> {
    width: usize,
    indent: &'a str,
    last: bool,
}

fn format_without_signature(sig: &UnsignedDkimSignature, name_len: usize) -> String {
    let mut output = String::new();

    // cursor position in the current line, just past header name and colon
    let mut i = name_len + 1;

    let out = &mut output;
    let i = &mut i;

    // The identifying tags always share the first line.
    let first_line = format!(
        " v=1; a={}; c={}; d={}; s={};",
        sig.algorithm, sig.canonicalization, sig.domain, sig.selector,
    );
    *i += first_line.chars().count();
    out.push_str(&first_line);

    let fmt = Fmt {
        width: LINE_WIDTH,
        indent: INDENT,
        last: false,
    };

    if let Some(identity) = &sig.identity {
        format_tag_i(out, i, fmt, identity);
    }
    if let Some(body_length) = sig.body_length {
        format_tag(out, i, fmt, "l", &body_length.to_string());
    }
    if let Some(timestamp) = sig.timestamp {
        format_tag(out, i, fmt, "t", &timestamp.to_string());
    }
    if let Some(expiration) = sig.expiration {
        format_tag(out, i, fmt, "x", &expiration.to_string());
    }
    format_tag_h(out, i, fmt, &sig.signed_headers);
    format_tag_bh(out, i, fmt, &sig.body_hash);
    format_tag_name_b(out, i, Fmt { last: true, ..fmt });

    output
}

fn format_tag_i(out: &mut String, i: &mut usize, fmt: Fmt<'_>, identity: &Identity) {
    let Identity { local_part, domain } = identity;

    let identity = match local_part {
        Some(l) => format!("{}@{domain}", quoted_printable::encode(l.as_bytes())),
        None => format!("@{domain}"),
    };

    format_tag(out, i, fmt, "i", &identity);
}

fn format_tag(out: &mut String, i: &mut usize, fmt: Fmt<'_>, name: &str, value: &str) {
    debug_assert!(name.is_ascii());

    let Fmt { last, .. } = fmt;

    // name + '=' + val [+ ';']
    let taglen = name.len() + value.chars().count() + if last { 1 } else { 2 };

    advance_i_initial(out, i, taglen, fmt);
    let _ = write!(out, "{name}={value}");

    if !last {
        out.push(';');
    }
}

fn format_tag_h(out: &mut String, i: &mut usize, fmt: Fmt<'_>, value: &[FieldName]) {
    let Fmt { last, .. } = fmt;

    let mut names = value.iter().map(|f| f.as_ref()).peekable();

    let first_name = names.next().unwrap_or_default();

    // "h=" + name [+ ';'/':']
    let taglen = first_name.chars().count() + if names.peek().is_none() && last { 2 } else { 3 };

    advance_i_initial(out, i, taglen, fmt);
    let _ = write!(out, "h={first_name}");

    while let Some(name) = names.next() {
        out.push(':');

        // name [+ ';'/':']
        let len = name.chars().count() + if names.peek().is_none() && last { 0 } else { 1 };

        advance_i(out, i, len, fmt);
        out.push_str(name);
    }

    if !last {
        out.push(';');
    }
}

fn format_tag_bh(out: &mut String, i: &mut usize, fmt: Fmt<'_>, value: &[u8]) {
    let Fmt { last, .. } = fmt;

    let value = Base64::encode_string(value);

    // "bh=" + 1 char, at least one character of the value goes behind =
    let taglen = 4;

    advance_i_initial(out, i, taglen, fmt);
    *i -= 1;
    out.push_str("bh=");

    format_chunks_into_string(out, i, fmt, &value);

    // a final ; may extend the line to width + 1
    if !last {
        out.push(';');
        *i += 1;
    }
}

fn format_tag_name_b(out: &mut String, i: &mut usize, fmt: Fmt<'_>) {
    // "b=" + 1 char
    let taglen = 3;

    advance_i_initial(out, i, taglen, fmt);
    *i -= 1;
    out.push_str("b=");
}

/// Advances the cursor `i`, making space for an item of length `len`, inserting
/// line break and indentation if necessary.
fn advance_i(out: &mut String, i: &mut usize, len: usize, fmt: Fmt<'_>) {
    let Fmt { width, indent, .. } = fmt;

    if *i + len <= width {
        *i += len;
    } else {
        let _ = write!(out, "\r\n{indent}");
        *i = indent.len() + len;
    }
}

fn advance_i_initial(out: &mut String, i: &mut usize, len: usize, fmt: Fmt<'_>) {
    let Fmt { width, indent, .. } = fmt;

    // + 1 for initial SP
    if *i + len + 1 <= width {
        out.push(' ');
        *i += len + 1;
    } else {
        let _ = write!(out, "\r\n{indent}");
        *i = indent.len() + len;
    }
}

fn format_chunks_into_string(out: &mut String, i: &mut usize, fmt: Fmt<'_>, mut s: &str) {
    let Fmt { width, indent, .. } = fmt;

    let first_chunk_len = width.saturating_sub(*i).min(s.chars().count());

    if first_chunk_len > 0 {
        let c = match s.char_indices().nth(first_chunk_len) {
            Some((c, _)) => c,
            None => s.len(),
        };
        let first_chunk;
        (first_chunk, s) = s.split_at(c);
        out.push_str(first_chunk);
        *i += first_chunk.chars().count();
    }

    let chunk_width = width.saturating_sub(indent.len()).max(1);  // no empty chunks
    let chunks = iter::from_fn(|| {
        if s.is_empty() {
            return None;
        }
        let c = match s.char_indices().nth(chunk_width) {
            Some((c, _)) => c,
            None => s.len(),
        };
        let chunk;
        (chunk, s) = s.split_at(c);
        Some(chunk)
    });

    for chunk in chunks {
        let _ = write!(out, "\r\n{indent}{chunk}");
        *i = chunk.chars().count() + indent.len();
    }
}

/// Appends the Base64-encoded signature to a header value produced by
/// [`UnsignedDkimSignature::format_without_signature`], folding as needed.
pub fn insert_signature_data(formatted_header: &mut String, name_len: usize, signature_data: &[u8]) {
    let fmt = Fmt {
        width: LINE_WIDTH,
        indent: INDENT,
        last: true,
    };

    let s = Base64::encode_string(signature_data);

    let mut lines = formatted_header.rsplit("\r\n");
    let last_line = lines.next().unwrap_or_default();
    let mut len = if lines.next().is_some() {
        last_line.chars().count()
    } else {
        name_len + last_line.chars().count() + 1
    };

    let mut result = String::with_capacity(s.len() + s.len() / LINE_WIDTH * 3);
    format_chunks_into_string(&mut result, &mut len, fmt, &s);

    formatted_header.push_str(&result);
}
