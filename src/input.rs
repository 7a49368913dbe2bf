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

//! Normalization of the raw input stream.
//!
//! In SMTP mode the input is the payload of an SMTP `DATA` command: lines
//! starting with a dot carry an extra stuffed dot, and a line consisting of a
//! single dot marks the end of the message. The [`Normalizer`] undoes the
//! stuffing incrementally, so that chunk boundaries may fall anywhere.

use tracing::trace;

/// The kind of input fed to a context.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum InputMode {
    /// The message as is. The end of input is signalled by finishing.
    #[default]
    Normal,
    /// SMTP `DATA` payload, dot-stuffed and terminated by `CRLF.CRLF`.
    Smtp,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    LineStart,
    Text,
    Cr,
    // dot withheld at the start of a line
    Dot,
    // dot and CR withheld at the start of a line
    DotCr,
    Ended,
}

/// Incremental normalizer for the input byte stream.
#[derive(Clone, Debug)]
pub struct Normalizer {
    mode: InputMode,
    state: State,
}

impl Normalizer {
    pub fn new(mode: InputMode) -> Self {
        Self {
            mode,
            state: State::LineStart,
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    /// Whether the end-of-data line has been seen. Further input is ignored.
    pub fn is_ended(&self) -> bool {
        self.state == State::Ended
    }

    /// Normalizes `chunk`, handing the resulting bytes to `out`.
    pub fn process_chunk<F>(&mut self, chunk: &[u8], mut out: F)
    where
        F: FnMut(&[u8]),
    {
        if self.mode == InputMode::Normal {
            if !chunk.is_empty() {
                out(chunk);
            }
            return;
        }

        if self.state == State::Ended {
            return;
        }

        // Bytes from `start` up to the current position pass through
        // unchanged; withheld bytes are emitted separately.
        let mut start = 0;

        for (i, &b) in chunk.iter().enumerate() {
            match self.state {
                State::LineStart => {
                    if b == b'.' {
                        emit(&mut out, &chunk[start..i]);
                        start = i + 1;
                        self.state = State::Dot;
                    } else if b == b'\r' {
                        self.state = State::Cr;
                    } else {
                        self.state = State::Text;
                    }
                }
                State::Text => {
                    if b == b'\r' {
                        self.state = State::Cr;
                    }
                }
                State::Cr => {
                    self.state = match b {
                        b'\n' => State::LineStart,
                        b'\r' => State::Cr,
                        _ => State::Text,
                    };
                }
                State::Dot => match b {
                    b'.' => {
                        // stuffed dot: drop the withheld one
                        start = i;
                        self.state = State::Text;
                    }
                    b'\r' => {
                        start = i + 1;
                        self.state = State::DotCr;
                    }
                    _ => {
                        out(b".");
                        start = i;
                        self.state = State::Text;
                    }
                },
                State::DotCr => {
                    if b == b'\n' {
                        trace!("end of SMTP data reached");
                        self.state = State::Ended;
                        return;
                    }
                    out(b".\r");
                    start = i;
                    self.state = if b == b'\r' { State::Cr } else { State::Text };
                }
                State::Ended => unreachable!(),
            }
        }

        emit(&mut out, &chunk[start..]);
    }

    /// Flushes bytes still withheld at the end of input.
    pub fn finish<F>(&mut self, mut out: F)
    where
        F: FnMut(&[u8]),
    {
        match self.state {
            State::Dot => out(b"."),
            State::DotCr => out(b".\r"),
            _ => {}
        }
        self.state = State::Ended;
    }
}

fn emit<F: FnMut(&[u8])>(out: &mut F, bytes: &[u8]) {
    if !bytes.is_empty() {
        out(bytes);
    }
}
