use anyhow::{Context, Result};

use voxdrop_client::{ApiClient, RecordingsApi};
use voxdrop_crypto::key_wrap::{key_bits, parse_public_key};

pub async fn run(api: &ApiClient) -> Result<()> {
    let published = api
        .public_key()
        .await
        .context("failed to fetch server public key")?;
    let key = parse_public_key(&published.pem).context("server key does not parse")?;

    println!("kid: {}", published.kid.as_deref().unwrap_or("\u{2014}"));
    println!("alg: {}", published.alg.as_deref().unwrap_or("\u{2014}"));
    println!("enc: {}", published.enc.as_deref().unwrap_or("\u{2014}"));
    println!("bits: {}", key_bits(&key));
    Ok(())
}
