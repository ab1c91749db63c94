use hickory_resolver::TokioAsyncResolver;
use viaseal::{
    signature::SignatureType,
    verifier::{self, KeyError},
};

/// Resolve a key published by a large mail provider.
#[tokio::test]
#[ignore = "depends on live DNS records"]
async fn live_resolve_public_key() {
    let _ = tracing_subscriber::fmt::try_init();

    let resolver = TokioAsyncResolver::tokio(Default::default(), Default::default());

    let info = verifier::resolve_public_key(
        &resolver,
        SignatureType::Dkim,
        "20230601._domainkey.gmail.com.",
        1024,
    )
    .await
    .unwrap();

    assert!(info.modulus_length.is_some_and(|n| n >= 2048));
    assert!(info.record.contains("p="));
}

#[tokio::test]
#[ignore = "depends on live DNS records"]
async fn live_missing_key() {
    let _ = tracing_subscriber::fmt::try_init();

    let resolver = TokioAsyncResolver::tokio(Default::default(), Default::default());

    let result = verifier::resolve_public_key(
        &resolver,
        SignatureType::Dkim,
        "no-such-selector._domainkey.example.com.",
        1024,
    )
    .await;

    assert_eq!(result.err().map(|e| e.code()), Some(KeyError::NotFound.code()));
}
