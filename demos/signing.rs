use http_message_signatures::components::{DerivedComponent, SignatureComponent};
use http_message_signatures::context::SignatureContext;
use http_message_signatures::{
    KeyMaterial, SignatureAlgorithm, SignatureParameters, SignatureSpec,
};
use url::Url;

fn main() {
    // Signing a message
    let private_key = vec![
        0x9f, 0x83, 0x62, 0xf8, 0x7a, 0x48, 0x4a, 0x95, 0x4e, 0x6e, 0x74, 0x0c, 0x5b, 0x4c, 0x0e,
        0x84, 0x22, 0x91, 0x39, 0xa2, 0x0a, 0xa8, 0xab, 0x56, 0xff, 0x66, 0x58, 0x6f, 0x6a, 0x7d,
        0x29, 0xc5,
    ];
    let context = SignatureContext::builder()
        .method("GET")
        .target_uri(Url::parse("https://example.com/").unwrap())
        .build();
    let parameters = SignatureParameters::new()
        .with_created(1_735_689_600)
        .unwrap()
        .with_expires(1_735_693_200)
        .unwrap()
        .with_key_id("poqkLGiymh_W0uP6PZFw-dvez3QJT5SolqXBCW38r0U")
        .unwrap()
        .with_nonce("ZO3/XMEZjrvSnLtAP9M7jK0WGQf3J+pbmQRUpKDhF9/jsNCWqUh2sq+TH4WTX3/GpNoSZUa8eNWMKqxWp2/c2g==")
        .unwrap()
        .with_algorithm(SignatureAlgorithm::Ed25519);
    let signed = SignatureSpec::builder()
        .label("sig1")
        .component(SignatureComponent::Derived(DerivedComponent::Authority {
            req: false,
        }))
        .parameters(parameters)
        .context(context)
        .algorithm(SignatureAlgorithm::Ed25519)
        .key(KeyMaterial::Raw(private_key))
        .build()
        .unwrap()
        .sign()
        .unwrap();

    assert!(!signed.signature_input.is_empty());
    assert!(!signed.signature.is_empty());
    println!("Signature-Input: {}", signed.signature_input);
    println!("Signature: {}", signed.signature);
}
