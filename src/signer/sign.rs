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
    context::DebugSink,
    crypto::{self, SigningKey},
    error::Error,
    header::HeaderFields,
    message_hash::{self, BodyHashResults},
    signature::{DomainName, Selector, Signature, VerifyStatus, DKIM_SIGNATURE_NAME},
    signer::{
        format::{self, UnsignedDkimSignature},
        options::{self, SignConfig},
    },
};
use base64ct::{Base64, Encoding};
use bstr::ByteSlice;
use tracing::trace;

/// The fixed inputs of a signing operation.
pub struct SigningRequest<'a> {
    pub domain: &'a DomainName,
    pub selector: &'a Selector,
    pub signing_key: &'a SigningKey,
    pub config: &'a SignConfig,
}

pub fn perform_signing(
    request: SigningRequest<'_>,
    headers: &HeaderFields,
    hasher_results: &BodyHashResults,
    debug: &mut DebugSink,
) -> Result<Signature, Error> {
    let SigningRequest { domain, selector, signing_key, config } = request;

    if !headers.contains("From") {
        trace!("message has no From header");
        return Err(Error::MissingFromHeader);
    }

    let algorithm = config.algorithm;
    let hash_alg = algorithm.hash_algorithm();
    let canonicalization = config.canonicalization;

    // body hash

    let key = (config.body_length, hash_alg, canonicalization.body);

    let hasher_result = hasher_results
        .get(&key)
        .expect("requested body hash result not available");

    // l= records what was actually hashed, which is less than the cap for a
    // shorter body
    let body_length = config
        .body_length
        .map(|_| u64::try_from(hasher_result.bytes_hashed).unwrap_or(u64::MAX));

    // header selection

    let signed_headers = match &config.signed_headers {
        Some(names) => options::select_headers(headers, names),
        None => options::select_headers(headers, &options::default_signed_headers()),
    };

    trace!(?signed_headers, "selected headers to sign");

    let sig = UnsignedDkimSignature {
        algorithm,
        body_hash: hasher_result.hash.clone(),
        canonicalization,
        domain: domain.clone(),
        signed_headers: signed_headers.into(),
        identity: config.identity.clone(),
        body_length,
        selector: selector.clone(),
        timestamp: config.timestamp,
        expiration: config.expiration,
    };

    // header hash over the signature with empty b=

    let name_len = DKIM_SIGNATURE_NAME.len();

    let mut header_value = sig.format_without_signature(name_len);

    let cheaders = message_hash::canonicalize_signed_data(
        canonicalization.header,
        headers,
        &sig.signed_headers,
        DKIM_SIGNATURE_NAME,
        &header_value,
    );

    let data_hash = crypto::digest_slices(hash_alg, [&cheaders]);

    if debug.is_enabled() {
        writeln!(debug, "DKIM [{domain}]: canonicalized header data:");
        writeln!(debug, "{}", cheaders.as_bstr());
        writeln!(debug, "DKIM [{domain}]: bh={}", Base64::encode_string(&sig.body_hash));
    }

    let signature_data = match signing_key.sign(hash_alg, &data_hash) {
        Ok(s) => {
            trace!("RSA signing successful");
            s
        }
        Err(e) => {
            trace!("RSA signing failed: {e}");
            return Err(Error::SigningFailure);
        }
    };

    format::insert_signature_data(&mut header_value, name_len, &signature_data);

    let signature_header = format!("{DKIM_SIGNATURE_NAME}:{header_value}");

    writeln!(debug, "DKIM [{domain}]: {signature_header}");

    let sig = sig.into_signature(signature_data.into());

    Ok(Signature {
        domain: Some(sig.domain.clone()),
        computed_body_hash: Some(sig.body_hash.clone()),
        signature: Some(sig),
        signature_header,
        key_record: None,
        verify_status: VerifyStatus::None,
        error: None,
    })
}
