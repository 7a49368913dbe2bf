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

//! Splitting of the normalized stream into header fields and body.

use crate::{
    header::{FieldBody, FieldName, HeaderField, HeaderFields},
    input::{InputMode, Normalizer},
};
use bstr::ByteSlice;
use std::str;
use tracing::trace;

/// What became of a chunk fed to the [`HeaderSplitter`].
#[derive(Debug, PartialEq, Eq)]
pub enum Split<'a> {
    /// The chunk was consumed as part of the header.
    Header,
    /// The header ended within this chunk; the remainder is body.
    HeaderEnd(HeaderFields, &'a [u8]),
    /// The chunk is body.
    Body(&'a [u8]),
}

#[derive(Debug)]
enum SplitState {
    Header(Vec<u8>),
    Body,
}

/// Incremental splitter of a message into header and body.
#[derive(Debug)]
pub struct HeaderSplitter {
    state: SplitState,
}

impl Default for HeaderSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderSplitter {
    pub fn new() -> Self {
        Self {
            state: SplitState::Header(vec![]),
        }
    }

    pub fn process_chunk<'a>(&mut self, chunk: &'a [u8]) -> Split<'a> {
        let buf = match &mut self.state {
            SplitState::Body => return Split::Body(chunk),
            SplitState::Header(buf) => buf,
        };

        let old_len = buf.len();
        // The terminator may straddle the previous chunk.
        let search_start = old_len.saturating_sub(3);

        buf.extend_from_slice(chunk);

        let end = if buf.starts_with(b"\r\n") {
            Some((0, 2))
        } else {
            buf[search_start..]
                .find(b"\r\n\r\n")
                .map(|i| (search_start + i + 2, search_start + i + 4))
        };

        match end {
            Some((header_end, body_start)) => {
                let headers = parse_header(&buf[..header_end]);
                let body = &chunk[(body_start - old_len)..];
                self.state = SplitState::Body;
                Split::HeaderEnd(headers, body)
            }
            None => Split::Header,
        }
    }

    /// Ends input. If the header was not yet complete, everything received is
    /// taken to be the header, and the body is empty.
    pub fn finish(&mut self) -> Option<HeaderFields> {
        match std::mem::replace(&mut self.state, SplitState::Body) {
            SplitState::Header(buf) => Some(parse_header(&buf)),
            SplitState::Body => None,
        }
    }
}

fn parse_header(bytes: &[u8]) -> HeaderFields {
    let mut fields = vec![];
    let mut current: Option<(&[u8], Vec<u8>)> = None;

    for line in bytes.split_str("\r\n") {
        if line.is_empty() {
            continue;
        }

        if matches!(line[0], b' ' | b'\t') {
            match &mut current {
                Some((_, value)) => {
                    value.extend_from_slice(b"\r\n");
                    value.extend_from_slice(line);
                }
                None => trace!("skipping continuation line without header field"),
            }
            continue;
        }

        if let Some((name, value)) = current.take() {
            push_field(&mut fields, name, value);
        }

        match line.find_byte(b':') {
            Some(i) => current = Some((&line[..i], line[(i + 1)..].to_vec())),
            None => trace!(line = ?line.as_bstr(), "skipping header line without colon"),
        }
    }

    if let Some((name, value)) = current {
        push_field(&mut fields, name, value);
    }

    HeaderFields::new(fields)
}

fn push_field(fields: &mut Vec<HeaderField>, name: &[u8], value: Vec<u8>) {
    let field_name = str::from_utf8(name).ok().and_then(|n| FieldName::new(n).ok());
    match (field_name, FieldBody::new(value)) {
        (Some(field_name), Ok(body)) => fields.push((field_name, body)),
        _ => trace!(name = ?name.as_bstr(), "skipping ill-formed header field"),
    }
}

/// An event produced by a [`MessageStream`].
#[derive(Debug, PartialEq, Eq)]
pub enum StreamEvent<'a> {
    HeaderComplete(HeaderFields),
    Body(&'a [u8]),
}

/// The input pipeline shared by signer and verifier: normalization followed
/// by splitting into header and body.
#[derive(Debug)]
pub struct MessageStream {
    normalizer: Normalizer,
    splitter: HeaderSplitter,
}

impl MessageStream {
    pub fn new(mode: InputMode) -> Self {
        Self {
            normalizer: Normalizer::new(mode),
            splitter: HeaderSplitter::new(),
        }
    }

    pub fn input_mode(&self) -> InputMode {
        self.normalizer.mode()
    }

    pub fn process_chunk<F>(&mut self, chunk: &[u8], mut on_event: F)
    where
        F: FnMut(StreamEvent<'_>),
    {
        let splitter = &mut self.splitter;
        self.normalizer.process_chunk(chunk, |bytes| {
            dispatch(splitter.process_chunk(bytes), &mut on_event);
        });
    }

    pub fn finish<F>(&mut self, mut on_event: F)
    where
        F: FnMut(StreamEvent<'_>),
    {
        let splitter = &mut self.splitter;
        self.normalizer.finish(|bytes| {
            dispatch(splitter.process_chunk(bytes), &mut on_event);
        });
        if let Some(headers) = self.splitter.finish() {
            on_event(StreamEvent::HeaderComplete(headers));
        }
    }
}

fn dispatch<F>(split: Split<'_>, on_event: &mut F)
where
    F: FnMut(StreamEvent<'_>),
{
    match split {
        Split::Header => {}
        Split::HeaderEnd(headers, body) => {
            on_event(StreamEvent::HeaderComplete(headers));
            if !body.is_empty() {
                on_event(StreamEvent::Body(body));
            }
        }
        Split::Body(body) => {
            if !body.is_empty() {
                on_event(StreamEvent::Body(body));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(chunks: &[&[u8]]) -> (HeaderFields, Vec<u8>) {
        let mut stream = MessageStream::new(InputMode::Normal);
        let mut headers = None;
        let mut body = vec![];
        let mut on_event = |event: StreamEvent<'_>| match event {
            StreamEvent::HeaderComplete(h) => {
                assert!(headers.is_none());
                headers = Some(h);
            }
            StreamEvent::Body(b) => body.extend_from_slice(b),
        };
        for chunk in chunks {
            stream.process_chunk(chunk, &mut on_event);
        }
        stream.finish(&mut on_event);
        (headers.unwrap(), body)
    }

    fn names(headers: &HeaderFields) -> Vec<&str> {
        headers.as_ref().iter().map(|(n, _)| n.as_ref()).collect()
    }

    #[test]
    fn split_basic() {
        let (headers, body) = split(&[b"From: me\r\nTo: you\r\n\r\nHello\r\n"]);

        assert_eq!(names(&headers), ["From", "To"]);
        assert_eq!(headers.as_ref()[0].1.as_ref(), b" me");
        assert_eq!(body, b"Hello\r\n");
    }

    #[test]
    fn split_folded_header() {
        let (headers, body) = split(&[
            b"From: Tom Kistner <tom@duncanthrax.net>\r\n",
            b"X-Folded-Header: line one\r\n\tline two\r\n",
            b"To: PDKIM\r\nSubject: PDKIM Test\r\n\r\nTes",
            b"t 3,4\r\nHeute bug ich, morgen fix ich.\r\n",
        ]);

        assert_eq!(names(&headers), ["From", "X-Folded-Header", "To", "Subject"]);
        assert_eq!(headers.as_ref()[1].1.as_ref(), b" line one\r\n\tline two");
        assert_eq!(body, b"Test 3,4\r\nHeute bug ich, morgen fix ich.\r\n");
    }

    #[test]
    fn split_keeps_space_before_colon() {
        let (headers, _) = split(&[b"From: me\r\nSubject \t: hello\r\nTo: you\r\n\r\n"]);

        assert_eq!(names(&headers), ["From", "Subject", "To"]);

        let (name, value) = &headers.as_ref()[1];
        assert_eq!(name.raw(), "Subject \t");
        assert_eq!(value.as_ref(), b" hello");
        assert!(headers.contains("subject"));
    }

    #[test]
    fn split_keeps_blank_continuation_line() {
        let (headers, body) = split(&[b"Subject: one\r\n \r\n two\r\nTo: you\r\n\r\nx\r\n"]);

        assert_eq!(names(&headers), ["Subject", "To"]);
        assert_eq!(headers.as_ref()[0].1.as_ref(), b" one\r\n \r\n two");
        assert_eq!(body, b"x\r\n");
    }

    #[test]
    fn split_chunk_boundaries() {
        let input = b"A: 1\r\nB: 2\r\n 3\r\n\r\n\r\nbody\r\n";

        for i in 0..input.len() {
            let (a, b) = input.split_at(i);
            let (headers, body) = split(&[a, b]);
            assert_eq!(names(&headers), ["A", "B"], "split at {i}");
            assert_eq!(headers.as_ref()[1].1.as_ref(), b" 2\r\n 3");
            assert_eq!(body, b"\r\nbody\r\n", "split at {i}");
        }
    }

    #[test]
    fn split_header_only() {
        let (headers, body) = split(&[b"From: me\r\nSubject: x\r\n"]);
        assert_eq!(names(&headers), ["From", "Subject"]);
        assert!(body.is_empty());

        let (headers, body) = split(&[b"From: me"]);
        assert_eq!(names(&headers), ["From"]);
        assert!(body.is_empty());
    }

    #[test]
    fn split_body_only() {
        let (headers, body) = split(&[b"\r\nbody"]);
        assert!(headers.is_empty());
        assert_eq!(body, b"body");
    }

    #[test]
    fn split_skips_malformed_lines() {
        let (headers, _) = split(&[b" orphan\r\nno colon here\r\nFrom: me\r\nBad Name: x\r\n\r\n"]);
        assert_eq!(names(&headers), ["From"]);
    }

    #[test]
    fn split_smtp_stream() {
        let mut stream = MessageStream::new(InputMode::Smtp);
        let mut body = vec![];
        let mut header_count = 0;
        stream.process_chunk(b"From: me\r\n\r\n..dot\r\n.\r\nafter", |event| match event {
            StreamEvent::HeaderComplete(h) => header_count = h.len(),
            StreamEvent::Body(b) => body.extend_from_slice(b),
        });
        stream.finish(|_| panic!("no further events"));
        assert_eq!(header_count, 1);
        assert_eq!(body, b".dot\r\n");
    }
}
