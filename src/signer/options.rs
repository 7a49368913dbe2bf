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
    error::Error,
    header::{FieldName, HeaderFields},
    signature::{Canonicalization, DomainName, Identity, SignatureAlgorithm},
};
use std::collections::HashSet;

/// The body length cap, recorded in the *l=* tag.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum BodyLength {
    /// Sign the whole body: no *l=* tag.
    #[default]
    Unlimited,
    /// Sign at most this many bytes of canonicalized body. *l=* records the
    /// number of bytes actually signed.
    Limit(u64),
}

/// Options for a [`Signer`][crate::signer::Signer].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SignOptions {
    /// Colon-separated names of the header fields to sign, for example
    /// `"From:To:Subject"`. Must include *From*. When `None`, the default set
    /// from [`default_signed_headers`] is used.
    pub signed_headers: Option<String>,
    /// The agent or user identifier (*i=*). Its domain must be the signing
    /// domain or a subdomain of it.
    pub identity: Option<String>,
    pub canonicalization: Canonicalization,
    pub body_length: BodyLength,
    pub algorithm: SignatureAlgorithm,
    /// Creation time in seconds since the epoch (*t=*). `None` or 0 omits the
    /// tag.
    pub created: Option<u64>,
    /// Expiration time in seconds since the epoch (*x=*). `None` or 0 omits
    /// the tag.
    pub expires: Option<u64>,
}

/// Validated signing options.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SignConfig {
    pub signed_headers: Option<Vec<FieldName>>,
    pub identity: Option<Identity>,
    pub canonicalization: Canonicalization,
    pub body_length: Option<usize>,
    pub algorithm: SignatureAlgorithm,
    pub timestamp: Option<u64>,
    pub expiration: Option<u64>,
}

impl SignConfig {
    pub fn from_options(options: SignOptions, domain: &DomainName) -> Result<Self, Error> {
        let signed_headers = options
            .signed_headers
            .as_deref()
            .map(parse_signed_headers)
            .transpose()?;

        let identity = match options.identity.as_deref() {
            Some(s) => {
                let identity = Identity::new(s).map_err(|_| Error::InvalidIdentity)?;
                if !identity.domain.eq_or_subdomain_of(domain) {
                    return Err(Error::DomainMismatch);
                }
                Some(identity)
            }
            None => None,
        };

        let body_length = match options.body_length {
            BodyLength::Unlimited => None,
            BodyLength::Limit(n) => Some(usize::try_from(n).unwrap_or(usize::MAX)),
        };

        let timestamp = options.created.filter(|&t| t != 0);
        let expiration = options.expires.filter(|&t| t != 0);

        if let (Some(t), Some(x)) = (timestamp, expiration) {
            if x <= t {
                return Err(Error::ExpirationNotAfterCreation);
            }
        }

        Ok(Self {
            signed_headers,
            identity,
            canonicalization: options.canonicalization,
            body_length,
            algorithm: options.algorithm,
            timestamp,
            expiration,
        })
    }
}

fn parse_signed_headers(s: &str) -> Result<Vec<FieldName>, Error> {
    let names = s
        .split(':')
        .map(|name| {
            let name = name.trim_matches(|c| matches!(c, ' ' | '\t'));
            // header names containing ; cannot appear in an h= tag
            if name.contains(';') {
                return Err(Error::InvalidSignedHeaders);
            }
            FieldName::new(name).map_err(|_| Error::InvalidSignedHeaders)
        })
        .collect::<Result<Vec<_>, _>>()?;

    if !names.iter().any(|name| *name == "From") {
        return Err(Error::FromHeaderNotSigned);
    }

    Ok(names)
}

/// Returns the header fields signed by default: the set recommended in RFC
/// 4871, section 5.5.
pub fn default_signed_headers() -> Vec<FieldName> {
    let names = [
        "From",
        "Sender",
        "Reply-To",
        "Subject",
        "Date",
        "Message-ID",
        "To",
        "Cc",
        "MIME-Version",
        "Content-Type",
        "Content-Transfer-Encoding",
        "Content-ID",
        "Content-Description",
        "Resent-Date",
        "Resent-From",
        "Resent-Sender",
        "Resent-To",
        "Resent-Cc",
        "Resent-Message-ID",
        "In-Reply-To",
        "References",
        "List-Id",
        "List-Help",
        "List-Unsubscribe",
        "List-Subscribe",
        "List-Post",
        "List-Owner",
        "List-Archive",
    ];

    names
        .into_iter()
        .filter_map(|n| FieldName::new(n).ok())
        .collect()
}

/// Selects the header fields to sign, in message order. A name is listed
/// once for each occurrence in the header.
pub fn select_headers(headers: &HeaderFields, allowed: &[FieldName]) -> Vec<FieldName> {
    let allowed: HashSet<_> = allowed.iter().collect();

    headers
        .as_ref()
        .iter()
        .map(|(name, _)| name)
        .filter(|name| allowed.contains(name) && !name.as_ref().contains(';'))
        .cloned()
        .collect()
}
