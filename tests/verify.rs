pub mod common;

use common::MockLookup;
use std::{
    io::ErrorKind,
    time::{Duration, SystemTime},
};
use viaseal::{
    signature::{DomainName, Selector},
    signer::{SignRequest, Timestamp},
    verifier::{Config, DkimResult, PolicyTag},
    SigningKey,
};

const NAME: &str = "sel._domainkey.example.com.";

fn request(key: SigningKey) -> SignRequest<SigningKey> {
    SignRequest::new(
        DomainName::new("example.com").unwrap(),
        Selector::new("sel").unwrap(),
        key,
    )
}

async fn signed_message() -> Vec<u8> {
    let message = common::make_message();
    let output = common::sign(&message, [request(common::signing_key("rsa2048").await)]);
    common::prepend_header_block(&output.to_header_block(), &message)
}

async fn rsa_resolver() -> MockLookup {
    MockLookup::from_records([(NAME, common::key_record("rsa2048").await)])
}

#[tokio::test]
async fn body_hash_mismatch() {
    let _ = tracing_subscriber::fmt::try_init();

    let resolver = rsa_resolver().await;

    let mut message = signed_message().await;
    message.extend(b"one more line\r\n");

    let output = common::verify(&resolver, &message, Config::default()).await;

    let result = &output.results[0];
    assert_eq!(result.status.result, DkimResult::Neutral);
    assert_eq!(result.status.comment.as_deref(), Some("body hash did not verify"));
    // no lookup was necessary
    assert_eq!(result.record, None);
    assert!(result.info().starts_with("dkim=neutral (body hash did not verify) header.i=@example.com"));
}

#[tokio::test]
async fn weak_key() {
    let _ = tracing_subscriber::fmt::try_init();

    let resolver = rsa_resolver().await;

    let message = signed_message().await;

    let config = Config {
        min_key_bits: 4096,
        ..Default::default()
    };

    let output = common::verify(&resolver, &message, config).await;

    let result = &output.results[0];
    assert_eq!(result.status.result, DkimResult::Policy);
    assert_eq!(result.status.policy, Some(PolicyTag::WEAK_KEY));
    assert_eq!(result.modulus_length, Some(2048));
    assert!(result.public_key.as_deref().unwrap().starts_with("-----BEGIN PUBLIC KEY-----"));
    assert!(result.info().starts_with("dkim=policy policy.dkim-rules=weak-key header.i=@example.com"));
}

#[tokio::test]
async fn key_record_errors() {
    let _ = tracing_subscriber::fmt::try_init();

    let message = signed_message().await;

    let resolver = MockLookup::from_records([("other._domainkey.example.com.", "")]);

    let output = common::verify(&resolver, &message, Config::default()).await;
    let status = &output.results[0].status;
    assert_eq!(status.result, DkimResult::Neutral);
    assert_eq!(status.comment.as_deref(), Some("no key"));

    let record = common::key_record("rsa2048").await;

    let cases = [
        (record.replace("v=DKIM1", "v=DKIM2"), "unknown key version"),
        (record.replace("k=rsa", "k=dsa"), "unknown key type"),
        ("v=DKIM1; k=rsa; p=".to_owned(), "invalid public key"),
        (common::key_record("ed25519").await.replace("k=ed25519", "k=rsa"), "unknown key type"),
        (record.replace("k=rsa", "k=rsa; h=sha1"), "hash algorithm not allowed"),
    ];

    for (record, comment) in cases {
        let resolver = MockLookup::from_records([(NAME, record)]);

        let output = common::verify(&resolver, &message, Config::default()).await;

        let status = &output.results[0].status;
        assert_eq!(status.result, DkimResult::Neutral);
        assert_eq!(status.comment.as_deref(), Some(comment));
    }
}

#[tokio::test]
async fn dns_failure() {
    let _ = tracing_subscriber::fmt::try_init();

    let resolver = MockLookup::failing(ErrorKind::TimedOut);

    let message = signed_message().await;

    let output = common::verify(&resolver, &message, Config::default()).await;

    let status = &output.results[0].status;
    assert_eq!(status.result, DkimResult::Temperror);
    assert_eq!(status.comment.as_deref(), Some("dns failure timed out"));
}

#[tokio::test]
async fn unsigned_message() {
    let _ = tracing_subscriber::fmt::try_init();

    let resolver = rsa_resolver().await;

    let output = common::verify(&resolver, &common::make_message(), Config::default()).await;

    assert_eq!(output.results.len(), 1);

    let result = &output.results[0];
    assert_eq!(result.status.result, DkimResult::None);
    assert_eq!(result.signature, None);
    assert_eq!(result.info(), "dkim=none (message not signed)");
    assert_eq!(
        output.to_authentication_results("mx.example.org"),
        "mx.example.org; dkim=none (message not signed); arc=none"
    );
}

#[tokio::test]
async fn expiration() {
    let _ = tracing_subscriber::fmt::try_init();

    let resolver = rsa_resolver().await;

    let message = common::make_message();

    let mut req = request(common::signing_key("rsa2048").await);
    req.timestamp = Some(Timestamp::Exact(1_600_000_000));
    req.valid_duration = Some(Duration::from_secs(3600));

    let output = common::sign(&message, [req]);
    assert!(output.signatures[0].header_value.contains("x=1600003600;"));

    let message = common::prepend_header_block(&output.to_header_block(), &message);

    let output = common::verify(&resolver, &message, Config::default()).await;
    let status = &output.results[0].status;
    assert_eq!(status.result, DkimResult::Neutral);
    assert_eq!(status.comment.as_deref(), Some("expired"));

    let config = Config {
        fixed_system_time: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_001_000)),
        ..Default::default()
    };

    let output = common::verify(&resolver, &message, config).await;
    assert_eq!(output.results[0].status.result, DkimResult::Pass);
}

#[tokio::test]
async fn unaligned_signing_domain() {
    let _ = tracing_subscriber::fmt::try_init();

    let resolver = rsa_resolver().await;

    let message: Vec<u8> = String::from_utf8(common::make_message())
        .unwrap()
        .replace("From: Me <me@mail.example.com>", "From: me@example.net (Me)")
        .into_bytes();

    let output = common::sign(&message, [request(common::signing_key("rsa2048").await)]);
    let message = common::prepend_header_block(&output.to_header_block(), &message);

    let output = common::verify(&resolver, &message, Config::default()).await;

    let status = &output.results[0].status;
    assert_eq!(status.result, DkimResult::Pass);
    assert_eq!(status.aligned, None);
}

#[tokio::test]
async fn malformed_and_excess_signatures() {
    let _ = tracing_subscriber::fmt::try_init();

    let resolver = rsa_resolver().await;

    let message = signed_message().await;

    let with_garbage = common::prepend_header_block("DKIM-Signature: v=1; a=rsa-sha256; b=\r\n", &message);

    let output = common::verify(&resolver, &with_garbage, Config::default()).await;

    assert_eq!(output.results.len(), 1);
    assert_eq!(output.results[0].index, Some(1));
    assert_eq!(output.results[0].status.result, DkimResult::Pass);

    let doubly_signed = {
        let output = common::sign(&message, [request(common::signing_key("rsa2048").await)]);
        common::prepend_header_block(&output.to_header_block(), &message)
    };

    let config = Config {
        max_signatures: 1,
        ..Default::default()
    };

    let output = common::verify(&resolver, &doubly_signed, config).await;

    assert_eq!(output.results.len(), 1);
    assert_eq!(output.results[0].index, Some(0));
}
