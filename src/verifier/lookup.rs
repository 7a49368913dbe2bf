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


use std::io;

/// Size of the answer buffer passed to [`LookupTxt::lookup_txt`].
pub const MAX_TXT_RECORD_LEN: usize = 4096;

/// A trait for looking up DNS TXT records containing DKIM public key records.
///
/// The lookup writes the record text into `answer`, a zeroed buffer of
/// [`MAX_TXT_RECORD_LEN`] bytes, and returns the number of bytes written.
/// Strings of a multi-string TXT record are to be concatenated. Any error
/// counts as a failure to retrieve the record.
///
/// Closures of type `Fn(&str, &mut [u8]) -> io::Result<usize>` implement this
/// trait.
pub trait LookupTxt {
    /// Looks up the TXT record at `name`, for example
    /// `sel._domainkey.example.com`.
    fn lookup_txt(&self, name: &str, answer: &mut [u8]) -> io::Result<usize>;
}

impl<F> LookupTxt for F
where
    F: Fn(&str, &mut [u8]) -> io::Result<usize>,
{
    fn lookup_txt(&self, name: &str, answer: &mut [u8]) -> io::Result<usize> {
        self(name, answer)
    }
}
