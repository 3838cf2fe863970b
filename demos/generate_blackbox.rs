//! Example: Generating an ioBlackBox for a page that embeds snare.js.
//!
//! Run with: cargo run --example generate_blackbox -- <page_url> [user_agent]

use ioblackbox::{decode_blackbox, BlackboxParams, IntegrationType, SnareClient};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/144.0.0.0 Safari/537.36";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut args = std::env::args().skip(1);
    let page_url = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: generate_blackbox <page_url> [user_agent]"))?;
    let user_agent = args.next().unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

    let client = SnareClient::builder()
        // Optionally add proxy:
        // .proxy("http://127.0.0.1:8080")
        .build()?;

    let mut generator = client.generator_for_page(&page_url).await?;
    println!("=== Config ===");
    println!("{}", serde_json::to_string_pretty(generator.config())?);

    let params = BlackboxParams {
        user_agent,
        page_url: page_url.clone(),
        referer: String::new(),
        language: "en-US".to_string(),
        platform: "Win32".to_string(),
        resolution: None,
        timezone_offset: -60,
        integration_type: IntegrationType::Form,
    };

    let blackbox = generator.generate(&params);
    println!("\n=== Blackbox ===");
    println!("{}", blackbox);

    println!("\n=== Fields ===");
    for field in decode_blackbox(&generator.config().des_key, &blackbox)? {
        println!("{:>8}: {}", field.key, field.value);
    }

    Ok(())
}
