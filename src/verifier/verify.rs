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
    crypto::{self, HashAlgorithm, VerifyingKey},
    header::HeaderFields,
    message_hash,
    signature::DkimSignature,
    tag_list,
    verifier::VerifierError,
};
use bstr::ByteSlice;
use std::borrow::Cow;
use tracing::trace;

/// Verifies the header hash of a signature against `public_key`. `name` and
/// `value` are the DKIM-Signature header field as found in the message.
pub fn perform_verification(
    headers: &HeaderFields,
    public_key: &VerifyingKey,
    sig: &DkimSignature,
    name: &str,
    value: &str,
    debug: &mut DebugSink,
) -> Result<(), VerifierError> {
    let hash_alg = sig.algorithm.hash_algorithm();

    let original_dkim_sig = make_original_dkim_sig(value);

    let cheaders = message_hash::canonicalize_signed_data(
        sig.canonicalization.header,
        headers,
        &sig.signed_headers,
        name,
        &original_dkim_sig,
    );

    if debug.is_enabled() {
        writeln!(debug, "DKIM [{}]: canonicalized header data:", sig.domain);
        writeln!(debug, "{}", cheaders.as_bstr());
    }

    let data_hash = crypto::digest_slices(hash_alg, [&cheaders]);

    verify_signature(public_key, hash_alg, &data_hash, &sig.signature_data)
}

/// Empties the value of the *b=* tag, keeping everything else including
/// folding whitespace.
fn make_original_dkim_sig(value: &str) -> Cow<'_, str> {
    fn b_tag_prefix_len(s: &str) -> Option<usize> {
        let (rest, _) = tag_list::strip_tag_name_and_equals(s).filter(|(_, name)| *name == "b")?;
        Some(s.len() - rest.len())
    }

    // only clone the string if there is something to strip
    let mut val = Cow::from(value);

    let mut last_i = 0;
    let mut ms = value.match_indices(';');

    loop {
        match ms.next() {
            Some((i, _)) => {
                if let Some(n) = b_tag_prefix_len(&value[last_i..i]) {
                    val.to_mut().drain((last_i + n)..i);
                    break;
                }
                last_i = i + 1;
            }
            None => {
                if last_i != value.len() {
                    if let Some(n) = b_tag_prefix_len(&value[last_i..]) {
                        val = value[..(last_i + n)].into();
                    }
                }
                break;
            }
        }
    }

    val
}

fn verify_signature(
    public_key: &VerifyingKey,
    hash_alg: HashAlgorithm,
    data_hash: &[u8],
    signature_data: &[u8],
) -> Result<(), VerifierError> {
    match public_key.verify(hash_alg, data_hash, signature_data) {
        Ok(()) => {
            trace!("RSA public key verification successful");
            Ok(())
        }
        Err(e) => {
            trace!("RSA public key verification failed: {e}");
            Err(VerifierError::VerificationFailure(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_original_dkim_sig_basic() {
        assert_eq!(make_original_dkim_sig(" a = 1 ; b = 2 ; c = 3 "), " a = 1 ; b =; c = 3 ");
        assert_eq!(make_original_dkim_sig(" a = 1 ; b = 2 ;"), " a = 1 ; b =;");
        assert_eq!(make_original_dkim_sig(" a = 1 ; b = 2 "), " a = 1 ; b =");
        assert_eq!(make_original_dkim_sig(" a = 1 ; b ="), " a = 1 ; b =");
    }

    #[test]
    fn make_original_dkim_sig_folded() {
        assert_eq!(
            make_original_dkim_sig(" v=1; bh=YWJj;\r\n\tb=YWJj\r\n\tYWJj; x=1"),
            " v=1; bh=YWJj;\r\n\tb=; x=1"
        );
        assert_eq!(
            make_original_dkim_sig(" v=1; h=From;\r\n\tb=YW\r\n\tJj"),
            " v=1; h=From;\r\n\tb="
        );
        assert!(matches!(make_original_dkim_sig(" v=1; bh=YWJj"), Cow::Borrowed(_)));
    }
}
