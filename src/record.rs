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


//! DKIM public key record.

use crate::{
    crypto::HashAlgorithm,
    tag_list::{
        parse_base64_tag_value, parse_colon_separated_tag_value, parse_qp_section_tag_value,
        TagList, TagSpec,
    },
};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceType {
    Any,
    Email,
    Other(Box<str>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Flags {
    Testing,
    NoSubdomains,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DkimKeyRecordParseError {
    RecordSyntax,  // not valid UTF-8, or otherwise unusable TXT data
    InvalidQuotedPrintable,
    InvalidBase64,
    TagListSyntax,
    UnsupportedVersion,
    MisplacedVersionTag,
    UnsupportedKeyType,
    NoSupportedHashAlgorithms,
    RevokedKey,
    MissingKeyTag,
    ServiceTypesEmpty,
}

impl Display for DkimKeyRecordParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecordSyntax => write!(f, "ill-formed key record"),
            Self::InvalidQuotedPrintable => write!(f, "invalid Quoted-Printable string"),
            Self::InvalidBase64 => write!(f, "invalid Base64 string"),
            Self::TagListSyntax => write!(f, "invalid tag-list"),
            Self::UnsupportedVersion => write!(f, "unsupported version"),
            Self::MisplacedVersionTag => write!(f, "v= tag not initial"),
            Self::UnsupportedKeyType => write!(f, "unsupported key type"),
            Self::NoSupportedHashAlgorithms => write!(f, "no supported hash algorithms"),
            Self::RevokedKey => write!(f, "key revoked"),
            Self::MissingKeyTag => write!(f, "p= tag missing"),
            Self::ServiceTypesEmpty => write!(f, "service types empty"),
        }
    }
}

impl Error for DkimKeyRecordParseError {}

/// A DKIM public key record, as published in DNS at
/// `<selector>._domainkey.<domain>`. Only RSA keys are supported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DkimKeyRecord {
    pub hash_algorithms: Box<[HashAlgorithm]>,  // non-empty
    /// Human-readable notes (*n=*).
    pub notes: Option<Box<str>>,
    pub key_data: Box<[u8]>,
    pub service_types: Box<[ServiceType]>,  // non-empty
    pub flags: Box<[Flags]>,
}

impl DkimKeyRecord {
    fn from_tag_list(tag_list: &TagList<'_>) -> Result<Self, DkimKeyRecordParseError> {
        let mut hash_algorithms = HashAlgorithm::all();
        let mut notes = None;
        let mut key_data = None;
        let mut service_types = vec![ServiceType::Any];
        let mut flags = vec![];

        for (i, &TagSpec { name, value }) in tag_list.as_ref().iter().enumerate() {
            match name {
                "v" => {
                    if i != 0 {
                        return Err(DkimKeyRecordParseError::MisplacedVersionTag);
                    }
                    if value != "DKIM1" {
                        return Err(DkimKeyRecordParseError::UnsupportedVersion);
                    }
                }
                "h" => {
                    hash_algorithms.clear();

                    for s in parse_colon_separated_tag_value(value) {
                        if s.eq_ignore_ascii_case("sha256") {
                            hash_algorithms.push(HashAlgorithm::Sha256);
                        } else if s.eq_ignore_ascii_case("sha1") {
                            hash_algorithms.push(HashAlgorithm::Sha1);
                        }
                    }

                    if hash_algorithms.is_empty() {
                        return Err(DkimKeyRecordParseError::NoSupportedHashAlgorithms);
                    }
                }
                "k" => {
                    if !value.eq_ignore_ascii_case("rsa") {
                        return Err(DkimKeyRecordParseError::UnsupportedKeyType);
                    }
                }
                "n" => {
                    let s = parse_qp_section_tag_value(value)
                        .map_err(|_| DkimKeyRecordParseError::InvalidQuotedPrintable)?;
                    notes = Some(String::from_utf8_lossy(&s).into());
                }
                "p" => {
                    if value.is_empty() {
                        return Err(DkimKeyRecordParseError::RevokedKey);
                    }

                    let s = parse_base64_tag_value(value)
                        .map_err(|_| DkimKeyRecordParseError::InvalidBase64)?;

                    key_data = Some(s.into());
                }
                "s" => {
                    let st: Vec<_> = parse_colon_separated_tag_value(value)
                        .into_iter()
                        .filter(|s| !s.is_empty())
                        .map(|s| {
                            if s == "*" {
                                ServiceType::Any
                            } else if s.eq_ignore_ascii_case("email") {
                                ServiceType::Email
                            } else {
                                ServiceType::Other(s.into())
                            }
                        })
                        .collect();

                    if st.is_empty() {
                        return Err(DkimKeyRecordParseError::ServiceTypesEmpty);
                    }

                    service_types = st;
                }
                "t" => {
                    // unrecognised flags are ignored
                    flags = parse_colon_separated_tag_value(value)
                        .into_iter()
                        .filter_map(|s| {
                            if s.eq_ignore_ascii_case("y") {
                                Some(Flags::Testing)
                            } else if s.eq_ignore_ascii_case("s") {
                                Some(Flags::NoSubdomains)
                            } else {
                                None
                            }
                        })
                        .collect();
                }
                // unknown tags are ignored
                _ => {}
            }
        }

        let key_data = key_data.ok_or(DkimKeyRecordParseError::MissingKeyTag)?;

        Ok(Self {
            hash_algorithms: hash_algorithms.into(),
            notes,
            key_data,
            service_types: service_types.into(),
            flags: flags.into(),
        })
    }

    /// Parses key record data as received from DNS.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DkimKeyRecordParseError> {
        let s = std::str::from_utf8(bytes).map_err(|_| DkimKeyRecordParseError::RecordSyntax)?;
        s.parse()
    }

    pub fn is_testing(&self) -> bool {
        self.flags.contains(&Flags::Testing)
    }

    /// Whether the *i=* domain must equal the *d=* domain (`t=s`).
    pub fn is_no_subdomains(&self) -> bool {
        self.flags.contains(&Flags::NoSubdomains)
    }

    pub fn allows_hash_algorithm(&self, hash_alg: HashAlgorithm) -> bool {
        self.hash_algorithms.contains(&hash_alg)
    }

    pub fn allows_email(&self) -> bool {
        self.service_types
            .iter()
            .any(|s| matches!(s, ServiceType::Any | ServiceType::Email))
    }
}

impl FromStr for DkimKeyRecord {
    type Err = DkimKeyRecordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag_list = TagList::from_str(s).map_err(|_| DkimKeyRecordParseError::TagListSyntax)?;

        Self::from_tag_list(&tag_list)
    }
}
