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


//! Verifier and supporting types.

mod header;
mod lookup;
mod query;
mod verify;

pub use lookup::{LookupTxt, MAX_TXT_RECORD_LEN};
pub use query::key_record_name;

use crate::{
    context::{DebugSink, State},
    crypto::{VerificationError, VerifyingKey},
    error::{Error, ErrorKind},
    header::{FieldName, HeaderFields},
    input::InputMode,
    message_hash::{
        body_hasher_key, BodyHashResult, BodyHashResults, BodyHasher, BodyHasherBuilder,
        BodyHasherStance,
    },
    record::DkimKeyRecord,
    signature::{DkimSignature, DkimSignatureError, Signature, VerifyStatus},
    splitter::{MessageStream, StreamEvent},
    verifier::header::{TaskStatus, VerifyTask},
};
use base64ct::{Base64, Encoding};
use std::{
    error,
    fmt::{self, Display, Formatter},
    io::Write,
    time::{Duration, SystemTime},
};
use tracing::trace;

/// Configuration for a verifier.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Minimum acceptable key size in bits. Signatures made with a smaller
    /// RSA key are invalid.
    pub min_key_bits: usize,

    /// When this flag is set, signatures using the *rsa-sha1* algorithm are
    /// acceptable.
    pub allow_sha1: bool,

    /// When this flag is set, an expired DKIM signature (*x=*) is invalid.
    pub fail_if_expired: bool,

    /// When this flag is set, a DKIM signature with a timestamp in the future
    /// (*t=*) is invalid.
    pub fail_if_in_future: bool,

    /// Tolerance applied when checking expiration and timestamp, to allow for
    /// clock drift. Resolution is in seconds.
    pub time_tolerance: Duration,

    /// The `SystemTime` value to use as the instant ‘now’.
    pub fixed_system_time: Option<SystemTime>,

    /// Header fields that must be covered by a signature for it to be valid.
    /// *From* is always required.
    pub required_signed_headers: Vec<FieldName>,
}

impl Config {
    fn current_timestamp(&self) -> u64 {
        self.fixed_system_time
            .unwrap_or_else(SystemTime::now)
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_key_bits: 1024,
            allow_sha1: true,
            fail_if_expired: true,
            fail_if_in_future: false,
            time_tolerance: Duration::from_secs(30),
            fixed_system_time: None,
            required_signed_headers: vec![],
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PolicyError {
    RequiredHeadersNotSigned,
    SignatureExpired,
    TimestampInFuture,
    DisallowedSha1Hash,
    KeyTooSmall,
}

impl Display for PolicyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequiredHeadersNotSigned => write!(f, "headers required to be signed were not signed"),
            Self::SignatureExpired => write!(f, "signature expired"),
            Self::TimestampInFuture => write!(f, "timestamp in future"),
            Self::DisallowedSha1Hash => write!(f, "hash algorithm SHA-1 not acceptable"),
            Self::KeyTooSmall => write!(f, "public key size too small"),
        }
    }
}

impl error::Error for PolicyError {}

/// The cause of an unsuccessful verification of one signature.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VerifierError {
    DkimSignatureFormat(DkimSignatureError),
    KeyRecordSyntax,
    KeyRevoked,
    DisallowedHashAlgorithm,
    DisallowedServiceType,
    DomainMismatch,
    VerificationFailure(VerificationError),
    BodyHashMismatch,
    InsufficientBodyLength,
    NoKeyFound,
    KeyLookup,
    Policy(PolicyError),
}

impl VerifierError {
    /// The verification status that this error results in.
    pub fn status(&self) -> VerifyStatus {
        match self {
            Self::NoKeyFound | Self::KeyLookup => VerifyStatus::None,
            Self::VerificationFailure(VerificationError::VerificationFailure)
            | Self::BodyHashMismatch
            | Self::InsufficientBodyLength => VerifyStatus::Fail,
            Self::DkimSignatureFormat(_)
            | Self::KeyRecordSyntax
            | Self::KeyRevoked
            | Self::DisallowedHashAlgorithm
            | Self::DisallowedServiceType
            | Self::DomainMismatch
            | Self::VerificationFailure(VerificationError::InvalidKey)
            | Self::Policy(_) => VerifyStatus::Invalid,
        }
    }

    /// The error kind, for failures in key retrieval and cryptography.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::KeyRecordSyntax
            | Self::KeyRevoked
            | Self::DisallowedHashAlgorithm
            | Self::DisallowedServiceType
            | Self::DomainMismatch
            | Self::NoKeyFound
            | Self::KeyLookup => Some(ErrorKind::ResolutionFailure),
            Self::VerificationFailure(_) => Some(ErrorKind::CryptoFailure),
            Self::DkimSignatureFormat(_)
            | Self::BodyHashMismatch
            | Self::InsufficientBodyLength
            | Self::Policy(_) => None,
        }
    }
}

impl Display for VerifierError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::DkimSignatureFormat(error) => error.fmt(f),
            Self::KeyRecordSyntax => write!(f, "invalid syntax in key record"),
            Self::KeyRevoked => write!(f, "key in key record revoked"),
            Self::DisallowedHashAlgorithm => write!(f, "hash algorithm not allowed"),
            Self::DisallowedServiceType => write!(f, "service type not allowed"),
            Self::DomainMismatch => write!(f, "domain mismatch"),
            Self::VerificationFailure(error) => error.fmt(f),
            Self::BodyHashMismatch => write!(f, "body hash mismatch"),
            Self::InsufficientBodyLength => write!(f, "truncated body"),
            Self::NoKeyFound => write!(f, "no key record found"),
            Self::KeyLookup => write!(f, "key record lookup failed"),
            Self::Policy(error) => error.fmt(f),
        }
    }
}

impl error::Error for VerifierError {}

/// A verifier of the DKIM signatures in an email message.
///
/// The message is fed in chunks of any size. When the header is complete,
/// each *DKIM-Signature* header field becomes a candidate; on
/// [`finish`][Verifier::finish] every candidate is evaluated independently,
/// including one key record lookup through the [`LookupTxt`] resolver.
///
/// # Examples
///
/// ```
/// use dkim_stream::{InputMode, Verifier, VerifyStatus};
/// use std::io;
///
/// let resolver = |_name: &str, _answer: &mut [u8]| -> io::Result<usize> {
///     Err(io::ErrorKind::NotFound.into())
/// };
///
/// let mut verifier = Verifier::new(InputMode::Normal, resolver);
///
/// verifier.feed(b"DKIM-Signature: v=1; a=rsa-sha256; d=example.com; s=sel;\r\n\
///     \th=From; bh=47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=; b=YWJj\r\n\
///     From: me@example.com\r\n\
///     \r\n")?;
///
/// let signatures = verifier.finish()?;
///
/// assert_eq!(signatures.len(), 1);
/// assert_eq!(signatures[0].verify_status, VerifyStatus::None);
/// # Ok::<_, dkim_stream::Error>(())
/// ```
pub struct Verifier {
    resolver: Box<dyn LookupTxt + Send>,
    config: Config,
    stream: MessageStream,
    pipeline: Pipeline,
    state: State<Vec<Signature>>,
    debug: DebugSink,
}

impl Verifier {
    pub fn new<R>(input_mode: InputMode, resolver: R) -> Self
    where
        R: LookupTxt + Send + 'static,
    {
        Self {
            resolver: Box::new(resolver),
            config: Default::default(),
            stream: MessageStream::new(input_mode),
            pipeline: Default::default(),
            state: State::Ready,
            debug: Default::default(),
        }
    }

    /// Replaces the configuration. Takes effect only before the first chunk
    /// is fed.
    pub fn with_config(mut self, config: Config) -> Self {
        if self.state.is_ready() {
            self.config = config;
        }
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
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

        let Self { config, stream, pipeline, .. } = self;

        stream.process_chunk(bytes, |event| pipeline.on_event(event, config));

        Ok(())
    }

    /// Finishes the message and verifies all signatures found, returning one
    /// result per *DKIM-Signature* header field in header order. Later calls
    /// return the same results.
    pub fn finish(&mut self) -> Result<&[Signature], Error> {
        let Self {
            resolver,
            config,
            stream,
            pipeline,
            state,
            debug,
        } = self;

        state
            .finish_with(|| {
                stream.finish(|event| pipeline.on_event(event, config));
                Ok(pipeline.verify_all(&**resolver, config, debug))
            })
            .map(|sigs| sigs.as_slice())
    }
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verifier")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Pipeline {
    headers: Option<HeaderFields>,
    tasks: Vec<VerifyTask>,
    body_hasher: Option<BodyHasher>,
    body_done: bool,
}

impl Pipeline {
    fn on_event(&mut self, event: StreamEvent<'_>, config: &Config) {
        match event {
            StreamEvent::HeaderComplete(headers) => {
                let tasks = header::find_signatures(&headers, config);

                trace!(signatures = tasks.len(), "header complete");

                // one body hash per distinct parameter set of the signatures
                // still in progress
                let mut builder = BodyHasherBuilder::new();
                for task in &tasks {
                    if let (TaskStatus::InProgress, Some(sig)) = (&task.status, &task.signature) {
                        builder.register(body_hasher_key(sig));
                    }
                }

                self.body_hasher = Some(builder.build());
                self.tasks = tasks;
                self.headers = Some(headers);
            }
            StreamEvent::Body(chunk) => {
                if let (Some(body_hasher), false) = (&mut self.body_hasher, self.body_done) {
                    if body_hasher.hash_chunk(chunk) == BodyHasherStance::Done {
                        trace!("no body hash needs more input");
                        self.body_done = true;
                    }
                }
            }
        }
    }

    fn verify_all(
        &mut self,
        resolver: &dyn LookupTxt,
        config: &Config,
        debug: &mut DebugSink,
    ) -> Vec<Signature> {
        let headers = self.headers.take().unwrap_or_default();
        let tasks = std::mem::take(&mut self.tasks);
        let body_results = self
            .body_hasher
            .take()
            .map(BodyHasher::finish)
            .unwrap_or_default();

        tasks
            .into_iter()
            .map(|task| {
                let ctx = TaskContext {
                    headers: &headers,
                    body_results: &body_results,
                    resolver,
                    config,
                };
                evaluate_task(task, ctx, debug)
            })
            .collect()
    }
}

#[derive(Clone, Copy)]
struct TaskContext<'a> {
    headers: &'a HeaderFields,
    body_results: &'a BodyHashResults,
    resolver: &'a dyn LookupTxt,
    config: &'a Config,
}

fn evaluate_task(task: VerifyTask, ctx: TaskContext<'_>, debug: &mut DebugSink) -> Signature {
    let signature_header = task.signature_header();

    let mut key_record = None;
    let mut computed_body_hash = None;

    let outcome = match &task.status {
        TaskStatus::Failed(e) => Err(e.clone()),
        TaskStatus::InProgress => {
            let sig = task
                .signature
                .as_ref()
                .expect("signature of in-progress verification task not available");

            let body_result = ctx.body_results.get(&body_hasher_key(sig));
            computed_body_hash = body_result.map(|r| r.hash.clone());

            verify_task(sig, &task, body_result, ctx, &mut key_record, debug)
        }
    };

    let domain = task.domain.as_ref().map_or_else(|| "unknown".into(), |d| d.to_string());

    let (verify_status, error) = match outcome {
        Ok(()) => {
            trace!(%domain, "signature verified");
            writeln!(debug, "DKIM [{domain}]: pass");
            (VerifyStatus::Pass, None)
        }
        Err(e) => {
            let status = e.status();
            trace!(%domain, %status, "signature did not verify: {e}");
            writeln!(debug, "DKIM [{domain}]: {status} ({e})");
            (status, Some(e))
        }
    };

    Signature {
        domain: task.domain,
        signature: task.signature,
        signature_header,
        computed_body_hash,
        key_record,
        verify_status,
        error,
    }
}

fn verify_task(
    sig: &DkimSignature,
    task: &VerifyTask,
    body_result: Option<&BodyHashResult>,
    ctx: TaskContext<'_>,
    key_record: &mut Option<DkimKeyRecord>,
    debug: &mut DebugSink,
) -> Result<(), VerifierError> {
    let record = query::look_up_key_record(ctx.resolver, &sig.domain, &sig.selector)?;
    let record = key_record.insert(record);

    if let Some(notes) = &record.notes {
        writeln!(debug, "DKIM [{}]: key record notes: {notes}", sig.domain);
    }

    validate_key_record(sig, record)?;

    let public_key =
        VerifyingKey::from_key_data(&record.key_data).map_err(VerifierError::VerificationFailure)?;

    let key_size = public_key.key_size();
    if key_size < ctx.config.min_key_bits {
        trace!(key_size, "public key too small");
        return Err(VerifierError::Policy(PolicyError::KeyTooSmall));
    }

    verify::perform_verification(ctx.headers, &public_key, sig, &task.name, &task.value, debug)?;

    verify_body_hash(sig, body_result, debug)
}

fn validate_key_record(sig: &DkimSignature, record: &DkimKeyRecord) -> Result<(), VerifierError> {
    if !record.allows_hash_algorithm(sig.algorithm.hash_algorithm()) {
        trace!("disallowed hash algorithm");
        return Err(VerifierError::DisallowedHashAlgorithm);
    }
    if !record.allows_email() {
        trace!("disallowed service type");
        return Err(VerifierError::DisallowedServiceType);
    }
    if record.is_no_subdomains() {
        // parsing already ensured that the i= domain is within d=
        if let Some(identity) = &sig.identity {
            if identity.domain != sig.domain {
                trace!("domain mismatch");
                return Err(VerifierError::DomainMismatch);
            }
        }
    }
    Ok(())
}

fn verify_body_hash(
    sig: &DkimSignature,
    body_result: Option<&BodyHashResult>,
    debug: &mut DebugSink,
) -> Result<(), VerifierError> {
    let body_result = body_result.expect("requested body hash result not available");

    writeln!(
        debug,
        "DKIM [{}]: bh computed {}, declared {}",
        sig.domain,
        Base64::encode_string(&body_result.hash),
        Base64::encode_string(&sig.body_hash),
    );

    if !body_result.complete {
        trace!(bytes_hashed = body_result.bytes_hashed, "body shorter than l= tag");
        return Err(VerifierError::InsufficientBodyLength);
    }

    if body_result.hash != sig.body_hash {
        trace!("body hash mismatch");
        return Err(VerifierError::BodyHashMismatch);
    }

    trace!("body hash matched");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::DkimSignatureErrorKind;

    #[test]
    fn verifier_error_status_and_kind() {
        assert_eq!(VerifierError::KeyLookup.status(), VerifyStatus::None);
        assert_eq!(VerifierError::KeyLookup.kind(), Some(ErrorKind::ResolutionFailure));

        assert_eq!(VerifierError::KeyRevoked.status(), VerifyStatus::Invalid);
        assert_eq!(VerifierError::KeyRevoked.kind(), Some(ErrorKind::ResolutionFailure));

        let e = VerifierError::VerificationFailure(VerificationError::VerificationFailure);
        assert_eq!(e.status(), VerifyStatus::Fail);
        assert_eq!(e.kind(), Some(ErrorKind::CryptoFailure));

        let e = VerifierError::VerificationFailure(VerificationError::InvalidKey);
        assert_eq!(e.status(), VerifyStatus::Invalid);

        assert_eq!(VerifierError::BodyHashMismatch.status(), VerifyStatus::Fail);
        assert_eq!(VerifierError::InsufficientBodyLength.status(), VerifyStatus::Fail);

        let e = VerifierError::DkimSignatureFormat(DkimSignatureError {
            domain: None,
            kind: DkimSignatureErrorKind::MissingVersionTag,
        });
        assert_eq!(e.status(), VerifyStatus::Invalid);
        assert_eq!(e.kind(), None);

        let e = VerifierError::Policy(PolicyError::SignatureExpired);
        assert_eq!(e.status(), VerifyStatus::Invalid);
        assert_eq!(e.to_string(), "signature expired");
    }

    #[test]
    fn config_default() {
        let config = Config::default();

        assert_eq!(config.min_key_bits, 1024);
        assert!(config.allow_sha1);
        assert!(config.fail_if_expired);
        assert!(!config.fail_if_in_future);
        assert_eq!(config.time_tolerance, Duration::from_secs(30));
    }

    #[test]
    fn verifier_without_signatures() {
        let resolver = |_: &str, _: &mut [u8]| -> std::io::Result<usize> {
            panic!("no lookup expected")
        };

        let mut verifier = Verifier::new(InputMode::Normal, resolver);

        verifier.feed(b"From: me@example.com\r\n\r\nHi!\r\n").unwrap();

        // nothing to hash, so later body chunks are skipped
        assert!(verifier.pipeline.body_done);

        assert_eq!(verifier.finish(), Ok(&[][..]));
        assert_eq!(verifier.feed(b"more"), Err(Error::FeedAfterFinish));
    }
}
