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

//! Computation of the header hash and the body hashes.

use crate::{
    canonicalize::{self, BodyCanonicalizer},
    crypto::{CountingHasher, HashAlgorithm},
    header::{FieldName, HeaderFields},
    signature::{CanonicalizationAlgorithm, DkimSignature},
};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Produces the canonicalized input of the header hash.
pub fn canonicalize_signed_data(
    canon_alg: CanonicalizationAlgorithm,
    headers: &HeaderFields,
    selected_headers: &[FieldName],
    dkim_sig_header_name: &str,
    formatted_dkim_sig_header_value: &str,
) -> Vec<u8> {
    let mut cheaders = canonicalize::canonicalize_headers(canon_alg, headers, selected_headers);

    canonicalize::canonicalize_header(
        &mut cheaders,
        canon_alg,
        dkim_sig_header_name,
        formatted_dkim_sig_header_value,
    );

    cheaders
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[must_use]
pub enum BodyHasherStance {
    /// More input may still be needed.
    Interested,
    /// All length-limited hashers are full; further input is not needed.
    Done,
}

/// Length limit, hash algorithm, and body canonicalization of a body hash.
pub type BodyHasherKey = (Option<usize>, HashAlgorithm, CanonicalizationAlgorithm);

pub fn body_hasher_key(sig: &DkimSignature) -> BodyHasherKey {
    let body_len = sig
        .body_length
        .map(|len| usize::try_from(len).unwrap_or(usize::MAX));
    let hash_alg = sig.algorithm.hash_algorithm();
    let canon_kind = sig.canonicalization.body;
    (body_len, hash_alg, canon_kind)
}

#[derive(Clone, Debug, Default)]
pub struct BodyHasherBuilder {
    registrations: HashSet<BodyHasherKey>,
}

impl BodyHasherBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn register(&mut self, key: BodyHasherKey) {
        self.registrations.insert(key);
    }

    pub fn build(self) -> BodyHasher {
        let hashers = self
            .registrations
            .into_iter()
            .map(|key @ (len, alg, _)| (key, CountingHasher::new(alg, len)))
            .collect();

        BodyHasher {
            hashers,
            canonicalizer_simple: BodyCanonicalizer::simple(),
            canonicalizer_relaxed: BodyCanonicalizer::relaxed(),
        }
    }
}

/// Body hasher serving any number of body hash requests at once.
///
/// Each canonicalization is computed once per chunk and shared among the
/// hashers that need it.
pub struct BodyHasher {
    hashers: HashMap<BodyHasherKey, CountingHasher>,
    canonicalizer_simple: BodyCanonicalizer,
    canonicalizer_relaxed: BodyCanonicalizer,
}

impl BodyHasher {
    pub fn hash_chunk(&mut self, chunk: &[u8]) -> BodyHasherStance {
        let mut canonicalized_simple = None;
        let mut canonicalized_relaxed = None;

        let mut all_done = true;

        for ((_, _, canon), hasher) in self.hashers.iter_mut().filter(|(_, h)| !h.is_done()) {
            let canonicalized = match canon {
                CanonicalizationAlgorithm::Simple => canonicalized_simple
                    .get_or_insert_with(|| canonicalize_chunk(&mut self.canonicalizer_simple, chunk)),
                CanonicalizationAlgorithm::Relaxed => canonicalized_relaxed
                    .get_or_insert_with(|| canonicalize_chunk(&mut self.canonicalizer_relaxed, chunk)),
            };

            hasher.update(canonicalized);

            if !hasher.is_done() {
                all_done = false;
            }
        }

        if all_done {
            BodyHasherStance::Done
        } else {
            BodyHasherStance::Interested
        }
    }

    pub fn finish(self) -> BodyHashResults {
        let mut final_simple = None;
        let mut final_relaxed = None;

        let Self {
            hashers,
            canonicalizer_simple,
            canonicalizer_relaxed,
        } = self;

        let mut canonicalizer_simple = Some(canonicalizer_simple);
        let mut canonicalizer_relaxed = Some(canonicalizer_relaxed);

        let mut results = HashMap::with_capacity(hashers.len());

        for (key @ (limit, _, canon), mut hasher) in hashers {
            if !hasher.is_done() {
                let canonicalized: &[u8] = match canon {
                    CanonicalizationAlgorithm::Simple => {
                        final_simple.get_or_insert_with(|| finish_canonicalizer(&mut canonicalizer_simple))
                    }
                    CanonicalizationAlgorithm::Relaxed => {
                        final_relaxed.get_or_insert_with(|| finish_canonicalizer(&mut canonicalizer_relaxed))
                    }
                };
                let _ = hasher.update(canonicalized);
            }

            let complete = limit.map_or(true, |_| hasher.is_done());
            let (hash, bytes_hashed) = hasher.finish();

            trace!(?key, bytes_hashed, complete, "body hash computed");

            results.insert(
                key,
                BodyHashResult {
                    hash,
                    bytes_hashed,
                    complete,
                },
            );
        }

        BodyHashResults { results }
    }
}

fn canonicalize_chunk(canonicalizer: &mut BodyCanonicalizer, chunk: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(chunk.len());
    canonicalizer.canonicalize_chunk(chunk, &mut result);
    result
}

fn finish_canonicalizer(canonicalizer: &mut Option<BodyCanonicalizer>) -> Vec<u8> {
    let mut result = vec![];
    if let Some(c) = canonicalizer.take() {
        c.finish(&mut result);
    }
    result
}

/// The outcome of one body hash request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BodyHashResult {
    pub hash: Box<[u8]>,
    pub bytes_hashed: usize,
    /// False when a length limit was given and the body was shorter.
    pub complete: bool,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BodyHashResults {
    results: HashMap<BodyHasherKey, BodyHashResult>,
}

impl BodyHashResults {
    pub fn get(&self, key: &BodyHasherKey) -> Option<&BodyHashResult> {
        self.results.get(key)
    }
}
