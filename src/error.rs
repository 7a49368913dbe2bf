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

//! Error type of the signing and verification contexts.

use std::{
    error,
    fmt::{self, Display, Formatter},
};

/// Broad classification of an [`Error`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// Invalid parameters given at construction or configuration time.
    ConfigurationInvalid,
    /// Input could not be processed, or was fed in the wrong state.
    FeedFailure,
    /// A cryptographic operation failed.
    CryptoFailure,
    /// A public key could not be retrieved or used.
    ResolutionFailure,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigurationInvalid => write!(f, "invalid configuration"),
            Self::FeedFailure => write!(f, "feed failure"),
            Self::CryptoFailure => write!(f, "cryptographic failure"),
            Self::ResolutionFailure => write!(f, "key resolution failure"),
        }
    }
}

/// An error that aborts a signing or verification context operation.
///
/// Failures of individual signatures during verification are not reported
/// through this type; see [`VerifierError`][crate::verifier::VerifierError].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    InvalidDomain,
    InvalidSelector,
    InvalidPrivateKey,
    InvalidSignedHeaders,
    FromHeaderNotSigned,
    InvalidIdentity,
    DomainMismatch,
    ExpirationNotAfterCreation,
    OptionsAfterFeed,
    FeedAfterFinish,
    MissingFromHeader,
    SigningFailure,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDomain
            | Self::InvalidSelector
            | Self::InvalidSignedHeaders
            | Self::FromHeaderNotSigned
            | Self::InvalidIdentity
            | Self::DomainMismatch
            | Self::ExpirationNotAfterCreation
            | Self::OptionsAfterFeed => ErrorKind::ConfigurationInvalid,
            Self::FeedAfterFinish | Self::MissingFromHeader => ErrorKind::FeedFailure,
            Self::InvalidPrivateKey | Self::SigningFailure => ErrorKind::CryptoFailure,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDomain => write!(f, "invalid signing domain"),
            Self::InvalidSelector => write!(f, "invalid selector"),
            Self::InvalidPrivateKey => write!(f, "unusable private key"),
            Self::InvalidSignedHeaders => write!(f, "invalid list of headers to sign"),
            Self::FromHeaderNotSigned => write!(f, "From header not in list of headers to sign"),
            Self::InvalidIdentity => write!(f, "invalid agent or user identifier"),
            Self::DomainMismatch => write!(f, "identifier domain not within signing domain"),
            Self::ExpirationNotAfterCreation => write!(f, "expiration not after creation time"),
            Self::OptionsAfterFeed => write!(f, "options set after input was fed"),
            Self::FeedAfterFinish => write!(f, "input fed after context was finished"),
            Self::MissingFromHeader => write!(f, "message has no From header"),
            Self::SigningFailure => write!(f, "failed to produce signature"),
        }
    }
}

impl error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_ok() {
        assert_eq!(Error::InvalidSelector.kind(), ErrorKind::ConfigurationInvalid);
        assert_eq!(Error::FeedAfterFinish.kind(), ErrorKind::FeedFailure);
        assert_eq!(Error::SigningFailure.kind(), ErrorKind::CryptoFailure);
        assert_eq!(Error::InvalidPrivateKey.kind(), ErrorKind::CryptoFailure);
    }
}
