use std::{collections::HashMap, future::Future, io, pin::Pin, sync::Arc};
use tokio::fs;
use viaseal::{
    crypto::SigningKey,
    message::MessageSegmenter,
    signer::{SignOutput, SignRequest, Signer},
    verifier::{Config, LookupTxt, VerificationOutput, Verifier},
};

pub type LookupOutput = Vec<io::Result<Vec<u8>>>;
pub type LookupFuture<'a> = Pin<Box<dyn Future<Output = io::Result<LookupOutput>> + Send + 'a>>;

#[derive(Clone)]
pub struct MockLookup(Arc<dyn Fn(&str) -> LookupFuture<'_> + Send + Sync>);

impl MockLookup {
    pub fn new(f: impl Fn(&str) -> LookupFuture<'_> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// A lookup answering from a fixed table of single TXT records.
    pub fn from_records<I, K, V>(records: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let records: HashMap<String, String> = records
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        Self::new(move |name| {
            let answer: io::Result<LookupOutput> = match records.get(name) {
                Some(record) => Ok(vec![Ok(record.clone().into_bytes())]),
                None => Err(io::ErrorKind::NotFound.into()),
            };
            Box::pin(async move { answer })
        })
    }

    /// A lookup failing every query with an error of the given kind.
    pub fn failing(kind: io::ErrorKind) -> Self {
        Self::new(move |_| {
            let answer: io::Result<LookupOutput> = Err(kind.into());
            Box::pin(async move { answer })
        })
    }
}

impl LookupTxt for MockLookup {
    type Answer = LookupOutput;
    type Query<'a> = Pin<Box<dyn Future<Output = io::Result<Self::Answer>> + Send + 'a>>;

    fn lookup_txt(&self, domain: &str) -> Self::Query<'_> {
        let domain = domain.to_owned();

        Box::pin(async move { self.0(&domain).await })
    }
}

pub async fn read_public_key_file_base64(file_name: &str) -> io::Result<String> {
    let s = fs::read_to_string(file_name).await?;
    let mut key_base64: Vec<_> = s.lines().skip(1).collect();
    key_base64.pop();
    Ok(key_base64.join(""))
}

pub async fn read_signing_key_from_file(file_name: &str) -> io::Result<SigningKey> {
    let s = fs::read_to_string(file_name).await?;
    Ok(SigningKey::from_pem(&s).unwrap())
}

/// Reads one of the test keys, `rsa2048` or `ed25519`.
pub async fn signing_key(name: &str) -> SigningKey {
    read_signing_key_from_file(&format!("tests/keys/{name}.pem")).await.unwrap()
}

/// Builds the DNS key record for one of the test keys.
pub async fn key_record(name: &str) -> String {
    let k = if name.starts_with("rsa") { "rsa" } else { "ed25519" };
    let p = read_public_key_file_base64(&format!("tests/keys/{name}.pub")).await.unwrap();
    format!("v=DKIM1; k={k}; p={p}")
}

pub fn sign<I>(message: &[u8], requests: I) -> SignOutput
where
    I: IntoIterator<Item = SignRequest<SigningKey>>,
{
    let mut signer = Signer::new(requests).unwrap();

    MessageSegmenter::process(&mut signer, message);

    signer.finish().unwrap()
}

pub async fn verify<T>(resolver: &T, message: &[u8], config: Config) -> VerificationOutput
where
    T: LookupTxt + Clone + 'static,
{
    let mut verifier = Verifier::new(config);

    // odd chunk size, to exercise the segmenter and the body hashers
    let mut segmenter = MessageSegmenter::new();
    for chunk in message.chunks(13) {
        segmenter.feed(&mut verifier, chunk);
    }
    segmenter.finish(&mut verifier);

    verifier.finish(resolver).await
}

pub fn prepend_header_block(block: &str, message: &[u8]) -> Vec<u8> {
    let mut result = block.as_bytes().to_vec();
    result.extend(message);
    result
}

pub fn make_message() -> Vec<u8> {
    b"Message-ID: <1511928109048645963@example.com>\r\n\
Date: Fri, 9 Jun 2023 16:13:12 +0200\r\n\
MIME-Version: 1.0\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
References: <4344283917108237944@example.org>\r\n\
\x20<3993077819152979884@example.com>\r\n\
In-Reply-To: <3993077819152979884@example.com>\r\n\
From: Me <me@mail.example.com>\r\n\
To: you@example.org\r\n\
Subject:  Re: a  folded\r\n\
\tsubject line\r\n\
\r\n\
Hello,\r\n\
\r\n\
  a line with  extra   whitespace \t\r\n\
\r\n\
Bye\r\n\
\r\n\
\r\n"
        .to_vec()
}
