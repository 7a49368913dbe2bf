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


//! A streaming engine for signing and verifying email messages with
//! *DomainKeys Identified Mail* (DKIM) signatures as described in [RFC 4871].
//!
//! A message is fed to a context in chunks of arbitrary size, either as plain
//! CRLF text or, in SMTP input mode, as the dot-stuffed DATA stream ending in
//! `CRLF.CRLF`. Header and body are processed incrementally; only the header
//! is buffered.
//!
//! # Usage
//!
//! The types [`Signer`] and [`Verifier`] provide the entry points. Both follow
//! the same protocol: configure, call `feed` any number of times, then
//! `finish` once to obtain the result. The enum [`Context`] wraps either for
//! code that does not care which mode it drives.
//!
//! The verifier does not perform DNS queries itself. Key records are
//! retrieved through a [`LookupTxt`] implementation supplied by the caller,
//! which may be a plain closure.
//!
//! The lower-level building blocks (canonicalization, body hashing, tag-list
//! and key record parsing) are available in the public modules.
//!
//! [RFC 4871]: https://www.rfc-editor.org/rfc/rfc4871

pub mod canonicalize;
mod context;
pub mod crypto;
mod error;
pub mod header;
pub mod input;
pub mod message_hash;
mod parse;
pub mod quoted_printable;
pub mod record;
pub mod signature;
pub mod signer;
pub mod splitter;
mod tag_list;
pub mod verifier;

pub use crate::{
    context::Context,
    crypto::{HashAlgorithm, SigningKey},
    error::{Error, ErrorKind},
    header::{FieldBody, FieldName, HeaderField, HeaderFields},
    input::InputMode,
    record::DkimKeyRecord,
    signature::{
        Canonicalization, CanonicalizationAlgorithm, DkimSignature, DomainName, Identity,
        Selector, Signature, SignatureAlgorithm, VerifyStatus,
    },
    signer::{default_signed_headers, BodyLength, SignOptions, Signer},
    verifier::{Config, LookupTxt, PolicyError, Verifier, VerifierError},
};
