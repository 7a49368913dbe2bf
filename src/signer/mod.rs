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


//! Signer and supporting types.

mod format;
mod options;
mod sign;

pub use options::{default_signed_headers, BodyLength, SignOptions};

use crate::{
    context::{DebugSink, State},
    crypto::SigningKey,
    error::Error,
    header::HeaderFields,
    input::InputMode,
    message_hash::{BodyHasher, BodyHasherBuilder, BodyHasherStance},
    signature::{DomainName, Selector, Signature},
    signer::{
        options::SignConfig,
        sign::SigningRequest,
    },
    splitter::{MessageStream, StreamEvent},
};
use std::{fmt, io::Write};
use tracing::trace;

/// A signer for an email message.
///
/// The message is fed in chunks of any size; [`finish`][Signer::finish] then
/// produces a single signature whose `signature_header` is ready to be
/// prepended to the message.
///
/// # Examples
///
/// ```no_run
/// use dkim_stream::{InputMode, Signer};
///
/// # fn f(pem: &str) -> Result<(), dkim_stream::Error> {
/// let mut signer = Signer::new(InputMode::Normal, "example.com", "sel", pem)?;
///
/// signer.feed(b"From: me@example.com\r\nTo: you@example.org\r\n\r\n")?;
/// signer.feed(b"Hello!\r\n")?;
///
/// let signature = signer.finish()?;
///
/// println!("{}", signature.signature_header);
/// # Ok(())
/// # }
/// ```
pub struct Signer {
    domain: DomainName,
    selector: Selector,
    signing_key: SigningKey,
    config: SignConfig,
    stream: MessageStream,
    headers: Option<HeaderFields>,
    body_hasher: BodyHasher,
    body_done: bool,
    state: State<Signature>,
    debug: DebugSink,
}

impl Signer {
    /// Creates a signer for the given signing domain and selector, with a
    /// PKCS#1 or PKCS#8 PEM-encoded RSA private key.
    pub fn new(
        input_mode: InputMode,
        domain: &str,
        selector: &str,
        private_key_pem: &str,
    ) -> Result<Self, Error> {
        let domain = DomainName::new(domain).map_err(|_| Error::InvalidDomain)?;
        let selector = Selector::new(selector).map_err(|_| Error::InvalidSelector)?;
        let signing_key = SigningKey::from_pem(private_key_pem).ok_or(Error::InvalidPrivateKey)?;

        trace!(%domain, %selector, key_size = signing_key.key_size(), "signer created");

        let config = SignConfig::default();
        let body_hasher = make_body_hasher(&config);

        Ok(Self {
            domain,
            selector,
            signing_key,
            config,
            stream: MessageStream::new(input_mode),
            headers: None,
            body_hasher,
            body_done: false,
            state: State::Ready,
            debug: Default::default(),
        })
    }

    /// Replaces the signing options. Only allowed before the first chunk is
    /// fed.
    pub fn set_options(&mut self, options: SignOptions) -> Result<(), Error> {
        if !self.state.is_ready() {
            return Err(Error::OptionsAfterFeed);
        }

        let config = SignConfig::from_options(options, &self.domain)?;

        self.body_hasher = make_body_hasher(&config);
        self.config = config;

        Ok(())
    }

    pub fn input_mode(&self) -> InputMode {
        self.stream.input_mode()
    }

    pub fn set_debug_stream(&mut self, writer: Box<dyn Write + Send>) {
        self.debug.set(writer);
    }

    /// Feeds a chunk of the message.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.state.begin_feed()?;

        let Self {
            stream,
            headers,
            body_hasher,
            body_done,
            ..
        } = self;

        stream.process_chunk(bytes, |event| on_event(event, headers, body_hasher, body_done));

        Ok(())
    }

    /// Finishes the message and signs it. Later calls return the same
    /// signature, or the same error.
    pub fn finish(&mut self) -> Result<&Signature, Error> {
        let Self {
            domain,
            selector,
            signing_key,
            config,
            stream,
            headers,
            body_hasher,
            body_done,
            state,
            debug,
        } = self;

        state.finish_with(|| {
            stream.finish(|event| on_event(event, headers, body_hasher, body_done));

            let headers = headers.take().unwrap_or_default();
            let body_hasher = std::mem::replace(body_hasher, BodyHasherBuilder::new().build());

            let request = SigningRequest {
                domain,
                selector,
                signing_key,
                config,
            };

            sign::perform_signing(request, &headers, &body_hasher.finish(), debug)
        })
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("domain", &self.domain)
            .field("selector", &self.selector)
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn make_body_hasher(config: &SignConfig) -> BodyHasher {
    let mut builder = BodyHasherBuilder::new();
    builder.register((
        config.body_length,
        config.algorithm.hash_algorithm(),
        config.canonicalization.body,
    ));
    builder.build()
}

fn on_event(
    event: StreamEvent<'_>,
    headers: &mut Option<HeaderFields>,
    body_hasher: &mut BodyHasher,
    body_done: &mut bool,
) {
    match event {
        StreamEvent::HeaderComplete(h) => {
            trace!(fields = h.len(), "header complete");
            *headers = Some(h);
        }
        StreamEvent::Body(chunk) => {
            if !*body_done && body_hasher.hash_chunk(chunk) == BodyHasherStance::Done {
                trace!("body length limit reached");
                *body_done = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::{self, HashAlgorithm},
        signature::CanonicalizationAlgorithm,
    };

    #[test]
    fn body_hashing_stops_at_length_limit() {
        let config = SignConfig {
            body_length: Some(4),
            ..Default::default()
        };
        let mut body_hasher = make_body_hasher(&config);
        let mut headers = None;
        let mut body_done = false;

        let mut feed = |chunk: &[u8]| {
            on_event(StreamEvent::Body(chunk), &mut headers, &mut body_hasher, &mut body_done);
            body_done
        };

        assert!(!feed(b"ab"));
        assert!(feed(b"cd\r\nmore"));
        assert!(feed(b" text\r\n"));

        let results = body_hasher.finish();
        let result = results
            .get(&(Some(4), HashAlgorithm::Sha256, CanonicalizationAlgorithm::Simple))
            .unwrap();

        assert_eq!(result.bytes_hashed, 4);
        assert!(result.complete);
        assert_eq!(result.hash, crypto::digest_slices(HashAlgorithm::Sha256, [b"abcd"]));
    }
}
