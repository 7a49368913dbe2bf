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

//! Cryptographic primitives: hashing and RSA keys.

mod hash;
mod rsa;

pub use self::{
    hash::{digest_slices, CountingHasher},
    rsa::{get_public_key_size, read_rsa_private_key, read_rsa_public_key, sign_rsa, verify_rsa},
};

use ::rsa::{RsaPrivateKey, RsaPublicKey};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

/// An RSA private key used for signing.
#[derive(Clone, Debug)]
pub struct SigningKey(RsaPrivateKey);

impl SigningKey {
    /// Reads a PKCS#1 or PKCS#8 PEM document.
    pub fn from_pem(pem: &str) -> Option<Self> {
        read_rsa_private_key(pem).map(Self)
    }

    pub fn key_size(&self) -> usize {
        get_public_key_size(&self.0)
    }

    pub fn sign(&self, hash_alg: HashAlgorithm, data_hash: &[u8]) -> Result<Vec<u8>, SigningError> {
        sign_rsa(hash_alg, &self.0, data_hash)
    }
}

/// An RSA public key taken from a key record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VerifyingKey(RsaPublicKey);

impl VerifyingKey {
    /// Reads the key data of a `p=` tag.
    pub fn from_key_data(key_data: &[u8]) -> Result<Self, VerificationError> {
        read_rsa_public_key(key_data).map(Self)
    }

    pub fn key_size(&self) -> usize {
        get_public_key_size(&self.0)
    }

    pub fn verify(
        &self,
        hash_alg: HashAlgorithm,
        data_hash: &[u8],
        signature_data: &[u8],
    ) -> Result<(), VerificationError> {
        verify_rsa(hash_alg, &self.0, data_hash, signature_data)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    pub fn canonical_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    pub fn all() -> Vec<Self> {
        vec![Self::Sha1, Self::Sha256]
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum VerificationError {
    InvalidKey,
    VerificationFailure,
}

impl Display for VerificationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey => write!(f, "invalid key data"),
            Self::VerificationFailure => write!(f, "signature verification failed"),
        }
    }
}

impl Error for VerificationError {}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SigningError {
    SigningFailure,
}

impl Display for SigningError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::SigningFailure => write!(f, "failed to sign data"),
        }
    }
}

impl Error for SigningError {}
