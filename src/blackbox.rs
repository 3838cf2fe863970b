//! Blackbox assembly: field derivation, serialization and encryption.

use crate::crypto::{decode_blackbox_payload, decrypt_des_ecb, encode_blackbox, encrypt_des_ecb};
use crate::error::{Result, SnareError};
use crate::models::{BlackboxParams, Field, Resolution, SnareConfig};
use crate::useragent::parse_user_agent;
use crate::wire::{deserialize_fields, serialize_fields};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// snare.js reads at most this many characters of `navigator.userAgent`.
const MAX_USER_AGENT_LEN: usize = 400;

/// `navigator.appName` of every modern browser.
const APP_NAME: &str = "Netscape";

/// Plugin list of desktop Chrome (five built-in PDF viewers).
const PLUGINS: &str = "internal-pdf-viewer;internal-pdf-viewer;internal-pdf-viewer;internal-pdf-viewer;internal-pdf-viewer;";

/// Resolutions picked from when the caller supplies none.
const RESOLUTIONS: &[Resolution] = &[Resolution {
    width: 2560,
    height: 1440,
}];

const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Generator for ioBlackBox fingerprints of one snare.js deployment.
///
/// Owns its random source, so an instance must not be shared between threads
/// without external locking; use one generator per concurrent caller.
///
/// # Example
/// ```ignore
/// use ioblackbox::{BlackboxGenerator, BlackboxParams, IntegrationType};
///
/// let mut generator = BlackboxGenerator::new(config)?;
/// let blackbox = generator.generate(&BlackboxParams {
///     user_agent: "Mozilla/5.0 (...)".into(),
///     page_url: "https://shop.example/checkout".into(),
///     referer: String::new(),
///     language: "en-US".into(),
///     platform: "Win32".into(),
///     resolution: None,
///     timezone_offset: -60,
///     integration_type: IntegrationType::Form,
/// });
/// assert!(blackbox.starts_with("0400"));
/// ```
pub struct BlackboxGenerator<R = StdRng> {
    config: SnareConfig,
    rng: R,
}

impl BlackboxGenerator<StdRng> {
    /// Create a generator with an entropy-seeded random source.
    ///
    /// Fails if the config is missing any constant.
    pub fn new(config: SnareConfig) -> Result<Self> {
        Self::with_rng(config, StdRng::from_entropy())
    }
}

impl<R: Rng> BlackboxGenerator<R> {
    /// Create a generator with a caller-supplied random source.
    pub fn with_rng(config: SnareConfig, rng: R) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, rng })
    }

    /// The deployment config this generator encodes for.
    pub fn config(&self) -> &SnareConfig {
        &self.config
    }

    /// Produce a blackbox stamped with the current UTC time.
    ///
    /// Returns an empty string if encryption fails, as snare.js does.
    pub fn generate(&mut self, params: &BlackboxParams) -> String {
        self.generate_at(params, Utc::now())
    }

    /// Produce a blackbox stamped with `now`.
    ///
    /// Returns an empty string if encryption fails, as snare.js does.
    pub fn generate_at(&mut self, params: &BlackboxParams, now: DateTime<Utc>) -> String {
        match self.try_generate_at(params, now) {
            Ok(blackbox) => blackbox,
            Err(e) => {
                tracing::error!("DES encryption failed: {}", e);
                String::new()
            }
        }
    }

    /// Produce a blackbox stamped with `now`, surfacing encryption errors.
    pub fn try_generate_at(&mut self, params: &BlackboxParams, now: DateTime<Utc>) -> Result<String> {
        tracing::info!("Generating blackbox fingerprint");

        let fields = self.build_fields(params, now);
        let serialized = serialize_fields(&fields);
        tracing::debug!(
            "Serialized {} fields ({} chars)",
            fields.len(),
            serialized.len()
        );

        let ciphertext = encrypt_des_ecb(&self.config.des_key, serialized.as_bytes())?;
        let blackbox = encode_blackbox(&ciphertext);

        tracing::info!("Generated blackbox ({} chars)", blackbox.len());
        Ok(blackbox)
    }

    /// Build the ordered field list snare.js would collect.
    ///
    /// Order follows the insertion order of the snare.js dictionary: the
    /// init-phase fields first, then the data-collection fields. Empty values
    /// are left out.
    pub fn build_fields(&mut self, params: &BlackboxParams, now: DateTime<Utc>) -> Vec<Field> {
        let ua = truncate_chars(&params.user_agent, MAX_USER_AGENT_LEN);

        let browser = parse_user_agent(ua);
        tracing::debug!(
            browser = %browser.browser_name,
            version = %browser.browser_version,
            os = %browser.os_name,
            comment = %browser.comment,
            "Parsed user agent"
        );

        let page_url = params
            .page_url
            .split_once('?')
            .map_or(params.page_url.as_str(), |(base, _)| base);

        let app_version = ua
            .find("Mozilla/")
            .map_or(ua, |idx| &ua[idx + "Mozilla/".len()..]);

        let resolution = match params.resolution {
            Some(resolution) => resolution,
            None => RESOLUTIONS[self.rng.gen_range(0..RESOLUTIONS.len())],
        };

        let config = &self.config;
        let mut fields = Vec::with_capacity(32);
        let mut add = |key: &str, value: &str| {
            if !value.is_empty() {
                fields.push(Field::new(key, value));
            }
        };

        // Init phase
        add(config.token_key.as_str(), &config.session_token);
        add("INTLOC", page_url);
        add("JINT", params.integration_type.as_str());

        // Data collection phase
        add("JENBL", "1");
        add("JSSRC", &config.source_id);
        add("UAGT", ua);
        if ua != config.baked_user_agent {
            add("JDIFF", "1");
            add("SUAGT", &config.baked_user_agent);
        }
        add("HACCLNG", &config.baked_accept_language);
        add("JSVER", &config.script_version);
        add("TZON", &params.timezone_offset.to_string());
        add("JSTIME", &now.format(TIMESTAMP_FORMAT).to_string());
        add("SVRTIME", &config.build_timestamp);
        add("JBRNM", &browser.browser_name);
        add("JBRVR", &browser.browser_version);
        add("JBROS", &browser.os_name);
        add("BBOUT", &config.output_element_id);
        add("APVER", app_version);
        add("APNAM", APP_NAME);
        add("NPLAT", &params.platform);
        add("JBRCM", &browser.comment);
        add("JLANG", &params.language);
        add("IGGY", &config.subscriber_id);
        add(
            "JRES",
            &format!("{}x{}", resolution.height, resolution.width),
        );
        add("JPLGNS", PLUGINS);
        add("JREFRR", &params.referer);

        fields
    }
}

/// Decrypt a blackbox and parse its payload back into fields.
pub fn decode_blackbox(key: &[u8], blackbox: &str) -> Result<Vec<Field>> {
    let ciphertext = decode_blackbox_payload(blackbox)?;
    let mut plaintext = decrypt_des_ecb(key, &ciphertext)?;

    while plaintext.last() == Some(&0) {
        plaintext.pop();
    }

    let wire = String::from_utf8(plaintext)
        .map_err(|e| SnareError::MalformedBlackbox(format!("payload is not UTF-8: {}", e)))?;
    deserialize_fields(&wire)
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
