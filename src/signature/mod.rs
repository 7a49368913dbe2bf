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

//! The DKIM signature model.

mod names;

pub use names::{DomainName, Identity, ParseDomainError, Selector};

use crate::{
    crypto::HashAlgorithm,
    header::FieldName,
    record::DkimKeyRecord,
    tag_list::{
        parse_base64_tag_value, parse_colon_separated_tag_value, parse_dqp_tag_value, TagList,
        TagSpec,
    },
    verifier::VerifierError,
};
use base64ct::{Base64, Encoding};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    str::{self, FromStr},
};

/// The name of the DKIM signature header field.
pub const DKIM_SIGNATURE_NAME: &str = "DKIM-Signature";

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum SignatureAlgorithm {
    /// The *rsa-sha1* signature algorithm.
    RsaSha1,
    /// The *rsa-sha256* signature algorithm.
    #[default]
    RsaSha256,
}

impl SignatureAlgorithm {
    pub fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            Self::RsaSha1 => HashAlgorithm::Sha1,
            Self::RsaSha256 => HashAlgorithm::Sha256,
        }
    }

    pub fn canonical_str(&self) -> &'static str {
        match self {
            Self::RsaSha1 => "rsa-sha1",
            Self::RsaSha256 => "rsa-sha256",
        }
    }
}

impl From<HashAlgorithm> for SignatureAlgorithm {
    fn from(hash_alg: HashAlgorithm) -> Self {
        match hash_alg {
            HashAlgorithm::Sha1 => Self::RsaSha1,
            HashAlgorithm::Sha256 => Self::RsaSha256,
        }
    }
}

impl Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("rsa-sha256") {
            Ok(Self::RsaSha256)
        } else if s.eq_ignore_ascii_case("rsa-sha1") {
            Ok(Self::RsaSha1)
        } else {
            Err("unknown signature algorithm")
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum CanonicalizationAlgorithm {
    /// The *simple* canonicalization algorithm.
    #[default]
    Simple,
    /// The *relaxed* canonicalization algorithm.
    Relaxed,
}

impl CanonicalizationAlgorithm {
    pub fn canonical_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Relaxed => "relaxed",
        }
    }
}

impl Display for CanonicalizationAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

impl FromStr for CanonicalizationAlgorithm {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("simple") {
            Ok(Self::Simple)
        } else if s.eq_ignore_ascii_case("relaxed") {
            Ok(Self::Relaxed)
        } else {
            Err("unknown canonicalization algorithm")
        }
    }
}

/// Header and body canonicalization, as in the *c=* tag.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct Canonicalization {
    pub header: CanonicalizationAlgorithm,
    pub body: CanonicalizationAlgorithm,
}

impl Canonicalization {
    pub fn new(header: CanonicalizationAlgorithm, body: CanonicalizationAlgorithm) -> Self {
        Self { header, body }
    }
}

impl Display for Canonicalization {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.header, self.body)
    }
}

impl fmt::Debug for Canonicalization {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", &self.header, &self.body)
    }
}

impl FromStr for Canonicalization {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // A missing body part defaults to simple.
        Ok(match s.split_once('/') {
            Some((header, body)) => Self::new(header.parse()?, body.parse()?),
            None => Self::new(s.parse()?, Default::default()),
        })
    }
}

/// A parsed DKIM-Signature header field value.
#[derive(Clone, Eq, PartialEq)]
pub struct DkimSignature {
    pub algorithm: SignatureAlgorithm,
    pub signature_data: Box<[u8]>,
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

impl DkimSignature {
    fn from_tag_list(tag_list: &TagList<'_>) -> Result<Self, DkimSignatureErrorKind> {
        use DkimSignatureErrorKind as Kind;

        let mut version_seen = false;
        let mut algorithm = None;
        let mut signature_data = None;
        let mut body_hash = None;
        let mut canonicalization = None;
        let mut domain = None;
        let mut signed_headers = None;
        let mut identity = None;
        let mut body_length = None;
        let mut selector = None;
        let mut timestamp = None;
        let mut expiration = None;

        for &TagSpec { name, value } in tag_list.as_ref() {
            match name {
                "v" => {
                    if value != "1" {
                        return Err(Kind::UnsupportedVersion);
                    }
                    version_seen = true;
                }
                "a" => {
                    let value = value.parse().map_err(|_| Kind::UnsupportedAlgorithm)?;
                    algorithm = Some(value);
                }
                "b" => {
                    let value = parse_base64_tag_value(value).map_err(|_| Kind::ValueSyntax)?;
                    signature_data = Some(value.into());
                }
                "bh" => {
                    let value = parse_base64_tag_value(value).map_err(|_| Kind::ValueSyntax)?;
                    body_hash = Some(value.into());
                }
                "c" => {
                    let value = value.parse().map_err(|_| Kind::UnsupportedCanonicalization)?;
                    canonicalization = Some(value);
                }
                "d" => {
                    let value = DomainName::new(value).map_err(|_| Kind::InvalidDomain)?;
                    domain = Some(value);
                }
                "h" => {
                    let names = parse_colon_separated_tag_value(value)
                        .into_iter()
                        .map(FieldName::new)
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|_| Kind::ValueSyntax)?;
                    if !names.iter().any(|h| *h == "From") {
                        return Err(Kind::FromHeaderNotSigned);
                    }
                    signed_headers = Some(names.into());
                }
                "i" => {
                    let value = parse_dqp_tag_value(value).map_err(|_| Kind::InvalidIdentity)?;
                    let value = String::from_utf8(value).map_err(|_| Kind::InvalidIdentity)?;
                    let value = Identity::new(&value).map_err(|_| Kind::InvalidIdentity)?;
                    identity = Some(value);
                }
                "l" => {
                    let value = value.parse().map_err(|_| Kind::InvalidBodyLength)?;
                    body_length = Some(value);
                }
                "q" => {
                    if !parse_colon_separated_tag_value(value)
                        .iter()
                        .any(|v| v.eq_ignore_ascii_case("dns/txt") || v.eq_ignore_ascii_case("dns"))
                    {
                        return Err(Kind::QueryMethodsNotSupported);
                    }
                }
                "s" => {
                    let value = Selector::new(value).map_err(|_| Kind::InvalidSelector)?;
                    selector = Some(value);
                }
                "t" => {
                    let value = value.parse().map_err(|_| Kind::InvalidTimestamp)?;
                    timestamp = Some(value);
                }
                "x" => {
                    let value = value.parse().map_err(|_| Kind::InvalidExpiration)?;
                    expiration = Some(value);
                }
                _ => {}
            }
        }

        if !version_seen {
            return Err(Kind::MissingVersionTag);
        }

        let algorithm = algorithm.ok_or(Kind::MissingAlgorithmTag)?;
        let signature_data = signature_data.ok_or(Kind::MissingSignatureTag)?;
        let body_hash = body_hash.ok_or(Kind::MissingBodyHashTag)?;
        let domain = domain.ok_or(Kind::MissingDomainTag)?;
        let signed_headers = signed_headers.ok_or(Kind::MissingSignedHeadersTag)?;
        let selector = selector.ok_or(Kind::MissingSelectorTag)?;

        if let Some(i) = &identity {
            if !i.domain.eq_or_subdomain_of(&domain) {
                return Err(Kind::DomainMismatch);
            }
        }

        if let (Some(timestamp), Some(expiration)) = (timestamp, expiration) {
            if expiration <= timestamp {
                return Err(Kind::ExpirationNotAfterTimestamp);
            }
        }

        Ok(Self {
            algorithm,
            signature_data,
            body_hash,
            canonicalization: canonicalization.unwrap_or_default(),
            domain,
            signed_headers,
            identity,
            body_length,
            selector,
            timestamp,
            expiration,
        })
    }
}

impl FromStr for DkimSignature {
    type Err = DkimSignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag_list = TagList::from_str(s).map_err(|_| DkimSignatureError {
            domain: None,
            kind: DkimSignatureErrorKind::InvalidTagList,
        })?;

        Self::from_tag_list(&tag_list).map_err(|kind| {
            // keep the domain for diagnostics, if there is a usable one
            let domain = tag_list.get("d").and_then(|d| DomainName::new(d).ok());
            DkimSignatureError { domain, kind }
        })
    }
}

impl fmt::Debug for DkimSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DkimSignature")
            .field("algorithm", &self.algorithm)
            .field("signature_data", &Base64::encode_string(&self.signature_data))
            .field("body_hash", &Base64::encode_string(&self.body_hash))
            .field("canonicalization", &self.canonicalization)
            .field("domain", &self.domain)
            .field("signed_headers", &self.signed_headers)
            .field("identity", &self.identity)
            .field("body_length", &self.body_length)
            .field("selector", &self.selector)
            .field("timestamp", &self.timestamp)
            .field("expiration", &self.expiration)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DkimSignatureError {
    /// The *d=* domain, if one could be recovered.
    pub domain: Option<DomainName>,
    pub kind: DkimSignatureErrorKind,
}

impl Display for DkimSignatureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl Error for DkimSignatureError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DkimSignatureErrorKind {
    InvalidTagList,
    MissingVersionTag,
    UnsupportedVersion,
    UnsupportedAlgorithm,
    MissingAlgorithmTag,
    MissingSignatureTag,
    MissingBodyHashTag,
    UnsupportedCanonicalization,
    InvalidDomain,
    MissingDomainTag,
    FromHeaderNotSigned,
    MissingSignedHeadersTag,
    InvalidIdentity,
    InvalidBodyLength,
    QueryMethodsNotSupported,
    InvalidSelector,
    MissingSelectorTag,
    InvalidTimestamp,
    InvalidExpiration,
    ValueSyntax,
    DomainMismatch,
    ExpirationNotAfterTimestamp,
    Utf8Encoding,
}

impl Display for DkimSignatureErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTagList => write!(f, "invalid tag-list"),
            Self::MissingVersionTag => write!(f, "v= tag missing"),
            Self::UnsupportedVersion => write!(f, "unsupported version"),
            Self::UnsupportedAlgorithm => write!(f, "unsupported algorithm"),
            Self::MissingAlgorithmTag => write!(f, "a= tag missing"),
            Self::MissingSignatureTag => write!(f, "b= tag missing"),
            Self::MissingBodyHashTag => write!(f, "bh= tag missing"),
            Self::UnsupportedCanonicalization => write!(f, "unsupported canonicalization"),
            Self::InvalidDomain => write!(f, "invalid domain"),
            Self::MissingDomainTag => write!(f, "d= tag missing"),
            Self::FromHeaderNotSigned => write!(f, "From header not signed"),
            Self::MissingSignedHeadersTag => write!(f, "h= tag missing"),
            Self::InvalidIdentity => write!(f, "invalid agent or user identifier"),
            Self::InvalidBodyLength => write!(f, "invalid body length"),
            Self::QueryMethodsNotSupported => write!(f, "query method not supported"),
            Self::InvalidSelector => write!(f, "invalid selector"),
            Self::MissingSelectorTag => write!(f, "s= tag missing"),
            Self::InvalidTimestamp => write!(f, "invalid timestamp"),
            Self::InvalidExpiration => write!(f, "invalid expiration"),
            Self::ValueSyntax => write!(f, "syntax error"),
            Self::DomainMismatch => write!(f, "identifier domain not within signing domain"),
            Self::ExpirationNotAfterTimestamp => write!(f, "expiration not after timestamp"),
            Self::Utf8Encoding => write!(f, "header value not UTF-8"),
        }
    }
}

/// The verification status of a signature.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum VerifyStatus {
    /// Not verified, for example because no key could be retrieved.
    #[default]
    None,
    /// The signature or its key record is unusable.
    Invalid,
    /// The signature did not verify.
    Fail,
    /// The signature verified.
    Pass,
}

impl Display for VerifyStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Invalid => write!(f, "invalid"),
            Self::Fail => write!(f, "fail"),
            Self::Pass => write!(f, "pass"),
        }
    }
}

/// A signature produced by signing, or found and evaluated by verification.
#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    /// The signing domain, also when the signature could not be parsed fully.
    pub domain: Option<DomainName>,
    /// The parsed signature, if it was well-formed.
    pub signature: Option<DkimSignature>,
    /// The complete DKIM-Signature header field, as generated or as found in
    /// the message (without trailing CRLF).
    pub signature_header: String,
    /// The body hash computed from the message.
    pub computed_body_hash: Option<Box<[u8]>>,
    /// The key record used for verification.
    pub key_record: Option<DkimKeyRecord>,
    pub verify_status: VerifyStatus,
    pub error: Option<VerifierError>,
}

impl Signature {
    pub fn selector(&self) -> Option<&Selector> {
        self.signature.as_ref().map(|s| &s.selector)
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.signature.as_ref().and_then(|s| s.identity.as_ref())
    }

    pub fn algorithm(&self) -> Option<SignatureAlgorithm> {
        self.signature.as_ref().map(|s| s.algorithm)
    }

    pub fn canonicalization(&self) -> Option<Canonicalization> {
        self.signature.as_ref().map(|s| s.canonicalization)
    }

    /// Whether the key record marks the domain as testing DKIM (`t=y`).
    pub fn is_testing(&self) -> bool {
        self.key_record.as_ref().map_or(false, |r| r.is_testing())
    }
}
