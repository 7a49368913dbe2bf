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
    record::{DkimKeyRecord, DkimKeyRecordParseError},
    signature::{DomainName, Selector},
    verifier::{
        lookup::{LookupTxt, MAX_TXT_RECORD_LEN},
        VerifierError,
    },
};
use std::io::{self, ErrorKind};
use tracing::trace;

/// Returns the DNS name of the key record, `<selector>._domainkey.<domain>`.
pub fn key_record_name(domain: &DomainName, selector: &Selector) -> String {
    format!("{selector}._domainkey.{domain}")
}

/// Queries the resolver and returns the raw record data.
pub fn look_up_records<T>(resolver: &T, name: &str) -> io::Result<Vec<u8>>
where
    T: LookupTxt + ?Sized,
{
    let mut answer = vec![0; MAX_TXT_RECORD_LEN];

    let n = resolver.lookup_txt(name, &mut answer)?;

    if n > answer.len() {
        return Err(io::Error::new(ErrorKind::InvalidData, "answer length out of bounds"));
    }

    answer.truncate(n);

    // the answer may also be terminated early
    if let Some(i) = answer.iter().position(|&b| b == 0) {
        answer.truncate(i);
    }

    Ok(answer)
}

/// Retrieves and parses the key record for a signature.
pub fn look_up_key_record<T>(
    resolver: &T,
    domain: &DomainName,
    selector: &Selector,
) -> Result<DkimKeyRecord, VerifierError>
where
    T: LookupTxt + ?Sized,
{
    let name = key_record_name(domain, selector);

    trace!(%name, "looking up key record");

    let txt = match look_up_records(resolver, &name) {
        Ok(txt) => txt,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            trace!("no key record");
            return Err(VerifierError::NoKeyFound);
        }
        Err(e) => {
            trace!("could not look up key record: {e}");
            return Err(VerifierError::KeyLookup);
        }
    };

    if txt.is_empty() {
        trace!("empty key record");
        return Err(VerifierError::NoKeyFound);
    }

    DkimKeyRecord::from_bytes(&txt).map_err(|e| {
        trace!("unusable key record: {e}");
        match e {
            DkimKeyRecordParseError::RevokedKey => VerifierError::KeyRevoked,
            _ => VerifierError::KeyRecordSyntax,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn write_answer(answer: &mut [u8], txt: &[u8]) -> io::Result<usize> {
        answer[..txt.len()].copy_from_slice(txt);
        Ok(txt.len())
    }

    fn domain_and_selector(domain: &str, selector: &str) -> (DomainName, Selector) {
        (DomainName::new(domain).unwrap(), Selector::new(selector).unwrap())
    }

    #[test]
    fn key_record_name_ok() {
        let (domain, selector) = domain_and_selector("duncanthrax.net", "cheezburger");

        assert_eq!(
            key_record_name(&domain, &selector),
            "cheezburger._domainkey.duncanthrax.net"
        );
    }

    #[test]
    fn look_up_records_buffer() {
        let names = RefCell::new(vec![]);

        let resolver = |name: &str, answer: &mut [u8]| {
            names.borrow_mut().push(name.to_owned());
            assert_eq!(answer.len(), MAX_TXT_RECORD_LEN);
            assert!(answer.iter().all(|&b| b == 0));
            write_answer(answer, b"v=DKIM1; p=YWJj\0garbage")
        };

        let txt = look_up_records(&resolver, "sel._domainkey.example.com").unwrap();

        assert_eq!(txt, b"v=DKIM1; p=YWJj");
        assert_eq!(names.into_inner(), ["sel._domainkey.example.com"]);

        let resolver = |_: &str, _: &mut [u8]| -> io::Result<usize> { Ok(MAX_TXT_RECORD_LEN + 1) };

        assert_eq!(
            look_up_records(&resolver, "x").unwrap_err().kind(),
            ErrorKind::InvalidData
        );
    }

    #[test]
    fn look_up_key_record_errors() {
        let (domain, selector) = domain_and_selector("example.com", "sel");

        let not_found = |_: &str, _: &mut [u8]| -> io::Result<usize> { Err(ErrorKind::NotFound.into()) };
        let timed_out = |_: &str, _: &mut [u8]| -> io::Result<usize> { Err(ErrorKind::TimedOut.into()) };
        let empty = |_: &str, _: &mut [u8]| -> io::Result<usize> { Ok(0) };
        let revoked = |_: &str, answer: &mut [u8]| write_answer(answer, b"v=DKIM1; p=");
        let garbage = |_: &str, answer: &mut [u8]| write_answer(answer, b"not a record");

        let look_up = |resolver: &dyn LookupTxt| {
            look_up_key_record(resolver, &domain, &selector).unwrap_err()
        };

        assert_eq!(look_up(&not_found), VerifierError::NoKeyFound);
        assert_eq!(look_up(&timed_out), VerifierError::KeyLookup);
        assert_eq!(look_up(&empty), VerifierError::NoKeyFound);
        assert_eq!(look_up(&revoked), VerifierError::KeyRevoked);
        assert_eq!(look_up(&garbage), VerifierError::KeyRecordSyntax);
    }

    #[test]
    fn look_up_key_record_ok() {
        let (domain, selector) = domain_and_selector("example.com", "sel");

        let resolver = |_: &str, answer: &mut [u8]| write_answer(answer, b"v=DKIM1; t=y; p=YWJj");

        let record = look_up_key_record(&resolver, &domain, &selector).unwrap();

        assert!(record.is_testing());
        assert_eq!(&*record.key_data, b"abc");
    }
}
