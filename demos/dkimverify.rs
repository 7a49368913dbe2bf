use dkim_stream::{Config, InputMode, Verifier};
use std::{
    collections::HashMap,
    env, fs,
    io::{self, ErrorKind, Read},
    process,
};

// Key records are read from files given as `<name>=<file>`, for example
// `sel._domainkey.example.com=sel.txt`.
fn main() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut args = env::args();
    let program = args.next();

    let mut records = HashMap::new();
    for arg in args {
        match arg.split_once('=') {
            Some((name, file)) => {
                let record = fs::read_to_string(file).unwrap();
                records.insert(name.to_owned(), record.trim().to_owned());
            }
            None => {
                eprintln!("usage: {} [<name>=<record_file>...]", program.as_deref().unwrap_or("dkimverify"));
                process::exit(1);
            }
        }
    }

    let resolver = move |name: &str, answer: &mut [u8]| -> io::Result<usize> {
        let record = records.get(name).ok_or(ErrorKind::NotFound)?.as_bytes();
        let len = record.len().min(answer.len());
        answer[..len].copy_from_slice(&record[..len]);
        Ok(len)
    };

    let config = Config {
        fail_if_expired: false,
        ..Default::default()
    };

    let mut verifier = Verifier::new(InputMode::Normal, resolver).with_config(config);

    let mut msg = String::new();
    let n = io::stdin().read_to_string(&mut msg).unwrap();
    assert!(n > 0, "empty message on stdin");

    let msg = msg.replace('\n', "\r\n");

    for chunk in msg.as_bytes().chunks(4096) {
        verifier.feed(chunk).unwrap();
    }

    let sigs = verifier.finish().unwrap();

    for (i, sig) in sigs.iter().enumerate() {
        println!();
        println!("SIGNATURE {}", i + 1);
        println!("{:#?}", sig.signature);
        println!("{}", sig.verify_status);
        if let Some(error) = &sig.error {
            println!("{error}");
        }
    }
}
