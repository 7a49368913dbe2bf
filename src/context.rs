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


//! Signing and verification contexts.

use crate::{
    error::Error,
    input::InputMode,
    signature::Signature,
    signer::Signer,
    verifier::Verifier,
};
use std::{
    fmt::{self, Formatter},
    io::Write,
    slice,
};

/// Lifecycle of a context producing results of type `T`.
#[derive(Debug)]
pub(crate) enum State<T> {
    /// Nothing fed yet; options may still be changed.
    Ready,
    Feeding,
    Done(T),
    Failed(Error),
}

impl<T> State<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Transitions to `Feeding`. Feeding a finished context fails it.
    pub fn begin_feed(&mut self) -> Result<(), Error> {
        match self {
            Self::Ready | Self::Feeding => {
                *self = Self::Feeding;
                Ok(())
            }
            Self::Done(_) => {
                *self = Self::Failed(Error::FeedAfterFinish);
                Err(Error::FeedAfterFinish)
            }
            Self::Failed(e) => Err(e.clone()),
        }
    }

    /// Runs `f` on the first call and stores its outcome; every call returns
    /// the stored outcome.
    pub fn finish_with<F>(&mut self, f: F) -> Result<&T, Error>
    where
        F: FnOnce() -> Result<T, Error>,
    {
        if matches!(self, Self::Ready | Self::Feeding) {
            *self = match f() {
                Ok(t) => Self::Done(t),
                Err(e) => Self::Failed(e),
            };
        }

        match self {
            Self::Done(t) => Ok(&*t),
            Self::Failed(e) => Err(e.clone()),
            Self::Ready | Self::Feeding => unreachable!("outcome stored above"),
        }
    }
}

/// Optional sink for human-readable diagnostics. Write errors are ignored.
#[derive(Default)]
pub struct DebugSink(Option<Box<dyn Write + Send>>);

impl DebugSink {
    pub fn set(&mut self, writer: Box<dyn Write + Send>) {
        self.0 = Some(writer);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    /// Target of the `write!` and `writeln!` macros.
    pub fn write_fmt(&mut self, args: fmt::Arguments<'_>) {
        if let Some(w) = &mut self.0 {
            let _ = w.write_fmt(args);
        }
    }
}

impl fmt::Debug for DebugSink {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DebugSink")
            .field(&if self.is_enabled() { "enabled" } else { "disabled" })
            .finish()
    }
}

/// A signing or a verification context.
///
/// Both variants share the feed/finish protocol; the operations specific to
/// one mode are only available on the wrapped [`Signer`] or [`Verifier`].
#[derive(Debug)]
pub enum Context {
    Sign(Signer),
    Verify(Verifier),
}

impl Context {
    pub fn input_mode(&self) -> InputMode {
        match self {
            Self::Sign(signer) => signer.input_mode(),
            Self::Verify(verifier) => verifier.input_mode(),
        }
    }

    /// Feeds a chunk of the message. Chunks may be split anywhere.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), Error> {
        match self {
            Self::Sign(signer) => signer.feed(bytes),
            Self::Verify(verifier) => verifier.feed(bytes),
        }
    }

    /// Finishes processing and returns the signatures: exactly one when
    /// signing, one per DKIM-Signature header field when verifying.
    pub fn finish(&mut self) -> Result<&[Signature], Error> {
        match self {
            Self::Sign(signer) => signer.finish().map(slice::from_ref),
            Self::Verify(verifier) => verifier.finish(),
        }
    }

    pub fn set_debug_stream(&mut self, writer: Box<dyn Write + Send>) {
        match self {
            Self::Sign(signer) => signer.set_debug_stream(writer),
            Self::Verify(verifier) => verifier.set_debug_stream(writer),
        }
    }
}

impl From<Signer> for Context {
    fn from(signer: Signer) -> Self {
        Self::Sign(signer)
    }
}

impl From<Verifier> for Context {
    fn from(verifier: Verifier) -> Self {
        Self::Verify(verifier)
    }
}
