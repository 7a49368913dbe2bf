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
    header::HeaderFields,
    signature::{
        DkimSignature, DkimSignatureError, DkimSignatureErrorKind, DomainName, SignatureAlgorithm,
        DKIM_SIGNATURE_NAME,
    },
    verifier::{Config, PolicyError, VerifierError},
};
use bstr::ByteSlice;
use std::str::{self, FromStr};
use tracing::trace;

#[derive(Clone, Debug, PartialEq)]
pub enum TaskStatus {
    InProgress,
    Failed(VerifierError),
}

/// A DKIM-Signature header field found in the message, awaiting
/// verification.
#[derive(Clone, Debug, PartialEq)]
pub struct VerifyTask {
    /// Index of the header field in the message header.
    pub index: usize,
    pub name: Box<str>,
    pub value: Box<str>,
    pub domain: Option<DomainName>,
    pub signature: Option<DkimSignature>,
    pub status: TaskStatus,
}

impl VerifyTask {
    fn new_failed(index: usize, name: &str, value: &str, error: DkimSignatureError) -> Self {
        Self {
            index,
            name: name.into(),
            value: value.into(),
            domain: error.domain.clone(),
            signature: None,
            status: TaskStatus::Failed(VerifierError::DkimSignatureFormat(error)),
        }
    }

    /// The complete header field, without trailing CRLF.
    pub fn signature_header(&self) -> String {
        format!("{}:{}", self.name, self.value)
    }
}

/// Collects all DKIM-Signature header fields in header order and evaluates
/// what can be decided without the key record.
pub fn find_signatures(headers: &HeaderFields, config: &Config) -> Vec<VerifyTask> {
    let now = config.current_timestamp();

    let mut tasks = vec![];

    for (index, (name, value)) in headers.as_ref().iter().enumerate() {
        if *name != DKIM_SIGNATURE_NAME {
            continue;
        }

        let name = name.raw();

        let value: &[u8] = value.as_ref();

        // well-formed DKIM-Signature contain only UTF-8
        let value = match str::from_utf8(value) {
            Ok(v) => v,
            Err(_) => {
                trace!(index, "DKIM-Signature header not UTF-8");
                let lossy = value.to_str_lossy();
                let error = DkimSignatureError {
                    domain: None,
                    kind: DkimSignatureErrorKind::Utf8Encoding,
                };
                tasks.push(VerifyTask::new_failed(index, name, &lossy, error));
                continue;
            }
        };

        let sig = match DkimSignature::from_str(value) {
            Ok(sig) => sig,
            Err(e) => {
                trace!(index, "unusable DKIM-Signature: {e}");
                tasks.push(VerifyTask::new_failed(index, name, value, e));
                continue;
            }
        };

        let status = match check_policy(&sig, config, now) {
            Ok(()) => TaskStatus::InProgress,
            Err(e) => {
                trace!(index, domain = %sig.domain, "signature rejected by policy: {e}");
                TaskStatus::Failed(VerifierError::Policy(e))
            }
        };

        tasks.push(VerifyTask {
            index,
            name: name.into(),
            value: value.into(),
            domain: Some(sig.domain.clone()),
            signature: Some(sig),
            status,
        });
    }

    tasks
}

fn check_policy(sig: &DkimSignature, config: &Config, now: u64) -> Result<(), PolicyError> {
    if config
        .required_signed_headers
        .iter()
        .any(|h| !sig.signed_headers.contains(h))
    {
        return Err(PolicyError::RequiredHeadersNotSigned);
    }

    if sig.algorithm == SignatureAlgorithm::RsaSha1 && !config.allow_sha1 {
        return Err(PolicyError::DisallowedSha1Hash);
    }

    let delta = config.time_tolerance.as_secs();

    if config.fail_if_expired {
        if let Some(x) = sig.expiration {
            if now >= x.saturating_add(delta) {
                return Err(PolicyError::SignatureExpired);
            }
        }
    }

    if config.fail_if_in_future {
        if let Some(t) = sig.timestamp {
            if t.saturating_sub(delta) > now {
                return Err(PolicyError::TimestampInFuture);
            }
        }
    }

    Ok(())
}
