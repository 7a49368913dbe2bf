use dkim_stream::{InputMode, Signer};
use std::{
    env, fs,
    io::{self, Read},
    process,
};

fn main() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut args = env::args();

    let (key_file, domain, selector) = match (
        args.next().as_deref(),
        args.next(),
        args.next(),
        args.next(),
        args.next(),
    ) {
        (_, Some(key_file), Some(domain), Some(selector), None) => (key_file, domain, selector),
        (program, ..) => {
            eprintln!("usage: {} <key_file> <domain> <selector>", program.unwrap_or("dkimsign"));
            process::exit(1);
        }
    };

    let key = fs::read_to_string(key_file).unwrap();

    let mut signer = Signer::new(InputMode::Normal, &domain, &selector, &key).unwrap();
    signer.set_debug_stream(Box::new(io::stderr()));

    let mut msg = String::new();
    let n = io::stdin().read_to_string(&mut msg).unwrap();
    assert!(n > 0, "empty message on stdin");

    let msg = msg.replace('\n', "\r\n");

    for chunk in msg.as_bytes().chunks(4096) {
        signer.feed(chunk).unwrap();
    }

    match signer.finish() {
        Ok(sig) => {
            let header = sig.signature_header.replace("\r\n", "\n");
            println!("{header}");
        }
        Err(error) => {
            println!("ERROR: {error}");
        }
    }
}
