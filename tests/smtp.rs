pub mod common;

use common::{MockResolver, PDKIM_DOMAIN, PDKIM_PRIVATE_KEY, PDKIM_SELECTOR};
use dkim_stream::{Context, InputMode, Signer, Verifier, VerifyStatus};

const MESSAGE: &[u8] = b"From: Tom Kistner <tom@duncanthrax.net>\r\n\
To: PDKIM\r\n\
Subject: dots\r\n\
\r\n\
.leading dot\r\n\
..\r\n\
end\r\n";

const SMTP_DATA: &[u8] = b"From: Tom Kistner <tom@duncanthrax.net>\r\n\
To: PDKIM\r\n\
Subject: dots\r\n\
\r\n\
..leading dot\r\n\
...\r\n\
end\r\n\
.\r\n";

#[test]
fn smtp_signature_equals_unstuffed_signature() {
    let _ = tracing_subscriber::fmt::try_init();

    let plain = common::sign(
        InputMode::Normal,
        PDKIM_PRIVATE_KEY,
        PDKIM_DOMAIN,
        PDKIM_SELECTOR,
        Default::default(),
        &[MESSAGE],
    );

    let chunks: Vec<&[u8]> = SMTP_DATA.chunks(3).collect();
    let smtp = common::sign(
        InputMode::Smtp,
        PDKIM_PRIVATE_KEY,
        PDKIM_DOMAIN,
        PDKIM_SELECTOR,
        Default::default(),
        &chunks,
    );

    assert_eq!(plain.signature_header, smtp.signature_header);
    assert_eq!(plain.computed_body_hash, smtp.computed_body_hash);
}

#[test]
fn smtp_input_after_terminator_is_ignored() {
    let mut signer = Signer::new(InputMode::Smtp, PDKIM_DOMAIN, PDKIM_SELECTOR, PDKIM_PRIVATE_KEY).unwrap();

    signer.feed(SMTP_DATA).unwrap();
    signer.feed(b"MAIL FROM:<other@example.org>\r\n").unwrap();

    let smtp = signer.finish().unwrap().clone();

    let plain = common::sign(
        InputMode::Normal,
        PDKIM_PRIVATE_KEY,
        PDKIM_DOMAIN,
        PDKIM_SELECTOR,
        Default::default(),
        &[MESSAGE],
    );

    assert_eq!(plain.signature_header, smtp.signature_header);
}

#[test]
fn smtp_sign_then_verify() {
    let resolver = MockResolver::pdkim();

    let sig = common::sign(
        InputMode::Smtp,
        PDKIM_PRIVATE_KEY,
        PDKIM_DOMAIN,
        PDKIM_SELECTOR,
        Default::default(),
        &[SMTP_DATA],
    );

    // verified in SMTP mode with the signature prepended to the DATA stream
    let data = common::prepend(&sig, SMTP_DATA);

    let mut ctx = Context::from(Verifier::new(InputMode::Smtp, resolver.lookup()));
    assert_eq!(ctx.input_mode(), InputMode::Smtp);

    for chunk in data.chunks(5) {
        ctx.feed(chunk).unwrap();
    }
    let sigs = ctx.finish().unwrap();

    assert_eq!(sigs.len(), 1);
    assert_eq!(sigs[0].verify_status, VerifyStatus::Pass);

    // and in normal mode against the unstuffed message
    let sigs = common::verify(&resolver, &common::prepend(&sig, MESSAGE));
    assert_eq!(sigs[0].verify_status, VerifyStatus::Pass);
}
