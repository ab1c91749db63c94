pub mod common;

use common::MockLookup;
use viaseal::{
    signature::SignatureAlgorithm,
    verifier::{Config, DkimResult},
};

/// Example from RFC 6376, appendix A.2, with the key of appendix A.3.
#[tokio::test]
async fn rfc6376_rsa_simple() {
    let _ = tracing_subscriber::fmt::try_init();

    let resolver = MockLookup::from_records([(
        "brisbane._domainkey.example.com.",
        "v=DKIM1; p=MIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQDwIRP/UC3SBsEmGqZ9ZJW3/DkMoGeLnQg1fW\
        n7/zYtIxN2SnFCjxOCKG9v3b4jYfcTNh5ijSsq631uBItLa7od+v/RtdC2UzJ1lWT947qR+Rcac2gbto/NMqJ0f\
        zfVjH4OuKhitdY9tf6mcwGjaNBcWToIMmPSPDdQPNUYckcQ2QIDAQAB",
    )]);

    let output = common::verify(&resolver, &rfc6376_message(), Config::default()).await;

    assert_eq!(output.results.len(), 1);

    let result = &output.results[0];
    assert_eq!(result.status.result, DkimResult::Pass);
    assert_eq!(result.modulus_length, Some(1024));
    assert!(result.info().starts_with("dkim=pass header.i=@example.com header.s=brisbane header.a=rsa-sha256"));
}

/// Example from RFC 8463, appendix A.3, with the Ed25519 signature only.
#[tokio::test]
async fn rfc8463_ed25519_relaxed() {
    let _ = tracing_subscriber::fmt::try_init();

    let resolver = MockLookup::from_records([(
        "brisbane._domainkey.football.example.com.",
        "v=DKIM1; k=ed25519; p=11qYAYKxCrfVS/7TyWQHOg7hcvPapiMlrwIaaPcHURo=",
    )]);

    let output = common::verify(&resolver, &rfc8463_message(), Config::default()).await;

    assert_eq!(output.results.len(), 1);

    let result = &output.results[0];
    assert_eq!(result.status.result, DkimResult::Pass);
    assert_eq!(
        result.signature.as_ref().map(|s| s.algorithm),
        Some(SignatureAlgorithm::Ed25519Sha256)
    );
    assert_eq!(result.modulus_length, None);
}

/// The same message, with the body altered in a way that relaxed body
/// canonicalization ignores and with one that it does not.
#[tokio::test]
async fn rfc8463_body_changes() {
    let _ = tracing_subscriber::fmt::try_init();

    let resolver = MockLookup::from_records([(
        "brisbane._domainkey.football.example.com.",
        "v=DKIM1; k=ed25519; p=11qYAYKxCrfVS/7TyWQHOg7hcvPapiMlrwIaaPcHURo=",
    )]);

    let message = String::from_utf8(rfc8463_message()).unwrap();

    let respaced = message.replace("the game.  Are", "the game. \t Are") + "\r\n\r\n";
    let output = common::verify(&resolver, respaced.as_bytes(), Config::default()).await;
    assert_eq!(output.results[0].status.result, DkimResult::Pass);

    let altered = message.replace("hungry yet?", "hungry yet!");
    let output = common::verify(&resolver, altered.as_bytes(), Config::default()).await;
    assert_eq!(output.results[0].status.result, DkimResult::Neutral);
    assert_eq!(
        output.results[0].status.comment.as_deref(),
        Some("body hash did not verify")
    );
}

// Note RFC 6376, errata 4926 and 3192.
fn rfc6376_message() -> Vec<u8> {
    "\
DKIM-Signature: v=1; a=rsa-sha256; s=brisbane; d=example.com;
      c=simple/simple; q=dns/txt; i=joe@football.example.com;
      h=Received : From : To : Subject : Date : Message-ID;
      bh=2jUSOH9NhtVGCQWNr9BrIAPreKQjO6Sn7XIkfJVOzv8=;
      b=AuUoFEfDxTDkHlLXSZEpZj79LICEps6eda7W3deTVFOk4yAUoqOB
        4nujc7YopdG5dWLSdNg6xNAZpOPr+kHxt1IrE+NahM6L/LbvaHut
        KVdkLLkpVaVVQPzeRDI009SO2Il5Lu7rDNH6mZckBdrIx0orEtZV
        4bmp/YzhwvcubU4=;
Received: from client1.football.example.com  [192.0.2.1]
      by submitserver.example.com with SUBMISSION;
      Fri, 11 Jul 2003 21:01:54 -0700 (PDT)
From: Joe SixPack <joe@football.example.com>
To: Suzie Q <suzie@shopping.example.net>
Subject: Is dinner ready?
Date: Fri, 11 Jul 2003 21:00:37 -0700 (PDT)
Message-ID: <20030712040037.46341.5F8J@football.example.com>

Hi.

We lost the game. Are you hungry yet?

Joe.
"
    .replace('\n', "\r\n")
    .into_bytes()
}

fn rfc8463_message() -> Vec<u8> {
    "\
DKIM-Signature: v=1; a=ed25519-sha256; c=relaxed/relaxed;
 d=football.example.com; i=@football.example.com;
 q=dns/txt; s=brisbane; t=1528637909; h=from : to :
 subject : date : message-id : from : subject : date;
 bh=2jUSOH9NhtVGCQWNr9BrIAPreKQjO6Sn7XIkfJVOzv8=;
 b=/gCrinpcQOoIfuHNQIbq4pgh9kyIK3AQUdt9OdqQehSwhEIug4D11Bus
 Fa3bT3FY5OsU7ZbnKELq+eXdp1Q1Dw==
From: Joe SixPack <joe@football.example.com>
To: Suzie Q <suzie@shopping.example.net>
Subject: Is dinner ready?
Date: Fri, 11 Jul 2003 21:00:37 -0700 (PDT)
Message-ID: <20030712040037.46341.5F8J@football.example.com>

Hi.

We lost the game.  Are you hungry yet?

Joe.
"
    .replace('\n', "\r\n")
    .into_bytes()
}
