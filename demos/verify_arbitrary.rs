use http_message_signatures::context::SignatureContext;
use http_message_signatures::{KeyMaterial, SignatureAlgorithm, VerificationSpec};
use url::Url;

const PUBLIC_KEY: [u8; 32] = [
    0x26, 0xb4, 0x0b, 0x8f, 0x93, 0xff, 0xf3, 0xd8, 0x97, 0x11, 0x2f, 0x7e, 0xbc, 0x58, 0x2b,
    0x23, 0x2d, 0xbd, 0x72, 0x51, 0x7d, 0x08, 0x2f, 0xe8, 0x3c, 0xfb, 0x30, 0xdd, 0xce, 0x43,
    0xd1, 0xbb,
];

fn lookup(
    _key_id: Option<&str>,
) -> Result<(SignatureAlgorithm, KeyMaterial), Box<dyn std::error::Error + Send + Sync>> {
    Ok((
        SignatureAlgorithm::Ed25519,
        KeyMaterial::Raw(PUBLIC_KEY.to_vec()),
    ))
}

fn main() {
    // Verifying an arbitrary message signature
    let context = SignatureContext::builder()
        .target_uri(Url::parse("https://example.com/").unwrap())
        .header(
            "Signature-Input",
            r#"sig1=("@authority");created=1735689600;keyid="poqkLGiymh_W0uP6PZFw-dvez3QJT5SolqXBCW38r0U";alg="ed25519";expires=1735693200;nonce="gubxywVx7hzbYKatLgzuKDllDAIXAkz41PydU7aOY7vT+Mb3GJNxW0qD4zJ+IOQ1NVtg+BNbTCRUMt1Ojr5BgA==";tag="web-bot-auth""#,
        )
        .header(
            "Signature",
            "sig1=:uz2SAv+VIemw+Oo890bhYh6Xf5qZdLUgv6/PbiQfCFXcX/vt1A8Pf7OcgL2yUDUYXFtffNpkEr5W6dldqFrkDg==:",
        )
        .build();
    let verified = VerificationSpec::builder()
        .context(context)
        .key_provider(lookup)
        .now(1_735_690_000)
        .build()
        .unwrap()
        .verify()
        .unwrap();
    println!("verified `{}` created at {:?}", verified.label, verified.parameters.created());
}
