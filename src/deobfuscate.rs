//! Extraction of build-specific constants from obfuscated snare.js.
//!
//! Every snare.js build bakes its constants into calls of an obfuscated
//! setter, e.g. `__if_fc("IGGY","...")`. The setter name changes between
//! builds but always has the `__xx_xx` shape, so each constant is located by
//! a named pattern in which `{call}` stands for that wildcard identifier.

use crate::error::{ConfigField, Result, SnareError};
use crate::models::{SnareConfig, TokenKey};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use std::collections::HashMap;

/// Matches an obfuscated snare.js function name such as `__if_fc`.
pub const OBFUSCATED_CALL: &str = r"__\w\w_\w\w";

/// Element id snare.js writes into when the page sets no `io_bbout_element_id`.
pub const DEFAULT_OUTPUT_ELEMENT_ID: &str = "ioBlackBox";

/// Number of `String.fromCharCode` entries forming the DES key.
const DES_KEY_LEN: usize = 8;

/// Built-in locator table: (name, pattern). The first capture group is the value.
const DEFAULT_LOCATORS: &[(&str, &str)] = &[
    ("IGGY", r#"{call}\("IGGY"\s*,\s*"([^"]+)"\)"#),
    ("SVRTIME", r#"{call}\("SVRTIME"\s*,\s*"([^"]+)"\)"#),
    ("JSSRC", r#"{call}\("JSSRC"\s*,\s*\w+\.{call}\("([^"]+)"\)\)"#),
    ("FLRTD", r#"{call}\("FLRTD"\s*,\s*"([^"]+)"\)"#),
    ("JSTOKEN", r#"{call}\("JSTOKEN"\s*,\s*"([^"]+)"\)"#),
    ("SUAGT", r#"decodeURIComponent\("(Mozilla[^"]+)"\)"#),
    ("HACCLNG", r#"{call}\("HACCLNG"\s*,\s*decodeURIComponent\("([^"]+)"\)"#),
    ("JSVER", r#"{call}\("JSVER"\s*,\s*"([^"]+)"\)"#),
    ("BBOUT", r#"{call}\("BBOUT"\s*,\s*"([^"]+)"\)"#),
    ("BBOUT", r#"io_bbout_element_id\s*=\s*["']([^"']+)["']"#),
    (
        "DESKEY",
        r"String\.fromCharCode\(((?:0x[0-9a-fA-F]+|\d+)(?:\s*,\s*(?:0x[0-9a-fA-F]+|\d+))*)\)",
    ),
    ("SNARE_URL", r"\.src\s*=\s*'(https://[^']+snare[^']*)'"),
    ("SNARE_URL", r#"\.src\s*=\s*"(https://[^"]+snare[^"]*)""#),
];

/// Recovers a [`SnareConfig`] from snare.js source text.
pub struct ConfigExtractor {
    locators: HashMap<String, Vec<Regex>>,
}

impl ConfigExtractor {
    /// Create an extractor with the built-in locator table.
    pub fn new() -> Result<Self> {
        let mut extractor = Self {
            locators: HashMap::new(),
        };
        for (name, pattern) in DEFAULT_LOCATORS {
            extractor.add_pattern(name, pattern)?;
        }
        Ok(extractor)
    }

    /// Register an extra pattern for a named locator.
    ///
    /// Patterns of the same name are tried in registration order; `{call}`
    /// expands to [`OBFUSCATED_CALL`].
    pub fn with_pattern(mut self, name: &str, pattern: &str) -> Result<Self> {
        self.add_pattern(name, pattern)?;
        Ok(self)
    }

    fn add_pattern(&mut self, name: &str, pattern: &str) -> Result<()> {
        let re = Regex::new(&pattern.replace("{call}", OBFUSCATED_CALL))?;
        self.locators.entry(name.to_string()).or_default().push(re);
        Ok(())
    }

    /// Run the named locator and return its first capture.
    pub fn locate(&self, name: &str, text: &str) -> Option<String> {
        self.locators.get(name)?.iter().find_map(|re| {
            re.captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        })
    }

    /// Run the named locator and return the first capture of every match, in
    /// pattern order and then text order.
    pub fn locate_all(&self, name: &str, text: &str) -> Vec<String> {
        self.locators
            .get(name)
            .map(|patterns| {
                patterns
                    .iter()
                    .flat_map(|re| re.captures_iter(text))
                    .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn require(&self, name: &str, field: ConfigField, text: &str) -> Result<String> {
        self.locate(name, text)
            .ok_or(SnareError::MissingConstant(field))
    }

    /// Extract every build constant from a snare.js body.
    ///
    /// Fails on the first constant that is missing or malformed.
    pub fn extract(&self, script: &str) -> Result<SnareConfig> {
        let subscriber_id = self.require("IGGY", ConfigField::SubscriberId, script)?;
        let build_timestamp = self.require("SVRTIME", ConfigField::BuildTimestamp, script)?;

        let encoded_source = self.require("JSSRC", ConfigField::SourceId, script)?;
        let source_id = decode_source_id(&encoded_source)?;

        let (session_token, token_key) = if let Some(token) = self.locate("FLRTD", script) {
            (token, TokenKey::Flrtd)
        } else if let Some(token) = self.locate("JSTOKEN", script) {
            (token, TokenKey::Jstoken)
        } else {
            return Err(SnareError::MissingConstant(ConfigField::SessionToken));
        };

        let baked_user_agent =
            percent_decode_or_raw(self.require("SUAGT", ConfigField::BakedUserAgent, script)?);
        let baked_accept_language = percent_decode_or_raw(self.require(
            "HACCLNG",
            ConfigField::BakedAcceptLanguage,
            script,
        )?);

        let script_version = self.require("JSVER", ConfigField::ScriptVersion, script)?;

        // Single-character String.fromCharCode calls are common in obfuscated
        // code; the key is the first call with exactly eight entries.
        let candidates = self.locate_all("DESKEY", script);
        let first = candidates
            .first()
            .ok_or(SnareError::MissingConstant(ConfigField::CipherKey))?;
        let key_list = candidates
            .iter()
            .find(|list| list.split(',').count() == DES_KEY_LEN)
            .unwrap_or(first);
        let des_key = parse_des_key(key_list)?;

        let output_element_id = self.locate("BBOUT", script).unwrap_or_else(|| {
            tracing::debug!(
                "No output element id in snare.js, using {}",
                DEFAULT_OUTPUT_ELEMENT_ID
            );
            DEFAULT_OUTPUT_ELEMENT_ID.to_string()
        });

        tracing::debug!(
            token_key = %token_key,
            script_version = %script_version,
            source_id = %source_id,
            "Extracted snare.js config"
        );

        Ok(SnareConfig {
            subscriber_id,
            source_id,
            output_element_id,
            build_timestamp,
            session_token,
            token_key,
            baked_user_agent,
            baked_accept_language,
            script_version,
            des_key,
        })
    }

    /// Find the snare.js script URL in page markup.
    pub fn find_snare_url(&self, page_html: &str) -> Result<String> {
        self.locate("SNARE_URL", page_html)
            .ok_or(SnareError::ScriptUrlNotFound)
    }

    /// Find a page-level `io_bbout_element_id` override in page markup.
    pub fn find_output_element_id(&self, page_html: &str) -> Option<String> {
        self.locate("BBOUT", page_html)
    }
}

/// Extract all build constants from a snare.js body with the default locators.
pub fn parse_snare_js(script: &str) -> Result<SnareConfig> {
    ConfigExtractor::new()?.extract(script)
}

/// Extract the snare.js script URL from an HTML body.
pub fn find_snare_url(page_html: &str) -> Result<String> {
    ConfigExtractor::new()?.find_snare_url(page_html)
}

fn decode_source_id(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| SnareError::MalformedConstant {
            field: ConfigField::SourceId,
            reason: format!("invalid base64: {}", e),
        })?;

    String::from_utf8(bytes).map_err(|e| SnareError::MalformedConstant {
        field: ConfigField::SourceId,
        reason: format!("not UTF-8: {}", e),
    })
}

/// Percent-decode like `decodeURIComponent`, keeping the raw text on failure.
fn percent_decode_or_raw(raw: String) -> String {
    let decoded = match urlencoding::decode(&raw) {
        Ok(decoded) => Some(decoded.into_owned()),
        Err(e) => {
            tracing::warn!("Failed to percent-decode {:?}, keeping raw value: {}", raw, e);
            None
        }
    };
    decoded.unwrap_or(raw)
}

/// Parse the comma-separated `String.fromCharCode` arguments into a DES key.
fn parse_des_key(list: &str) -> Result<[u8; 8]> {
    let parts: Vec<&str> = list.split(',').map(str::trim).collect();
    if parts.len() != DES_KEY_LEN {
        return Err(SnareError::MalformedConstant {
            field: ConfigField::CipherKey,
            reason: format!("expected 8 key bytes, got {}", parts.len()),
        });
    }

    let mut key = [0u8; 8];
    for (i, part) in parts.iter().enumerate() {
        let parsed = match part
            .strip_prefix("0x")
            .or_else(|| part.strip_prefix("0X"))
        {
            Some(hex) => u8::from_str_radix(hex, 16),
            None => part.parse::<u8>(),
        };
        key[i] = parsed.map_err(|e| SnareError::MalformedConstant {
            field: ConfigField::CipherKey,
            reason: format!("failed to parse key byte {} ({:?}): {}", i, part, e),
        })?;
    }

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"var _i_o={};(function(){__if_fc("IGGY","ajhX8U8YHxOyzdXEDGbRRazTg5OktIgQ4lN3PpeFbdPcPWTmwbnv9GX54KydaIMo");__if_fc("SVRTIME","2018/11/28 11:57:02");__if_fc("JSSRC",_i_o.__if_ap("YW0xcHJ3ZHAwMy5pb3ZhdGlvbi51cw=="));__if_fc("FLRTD","/eYbIxrn3mAExmFkurAILblYjwPfFgzes7T1pLQbJMI=");__if_fc("SUAGT",decodeURIComponent("Mozilla%2F5.0%20(Windows%20NT%2010.0%3B%20Win64%3B%20x64)%20AppleWebKit%2F537.36%20(KHTML%2C%20like%20Gecko)%20Chrome%2F64.0.3282.140%20Safari%2F537.36%20Edge%2F17.17134"));__if_fc("HACCLNG",decodeURIComponent("en-IL%2Cen-US%3Bq%3D0.8%2Cen%3Bq%3D0.5%2Che%3Bq%3D0.3"));__if_fc("JSVER","3.1.3");var k=String.fromCharCode(0x7c,0x4c,0x45,0x00,0x63,0x02,0xc8,0xa3);})();"#;

    #[test]
    fn test_extract_full_config() {
        let config = parse_snare_js(SCRIPT).unwrap();
        assert_eq!(config, SnareConfig::sample());
    }

    #[test]
    fn test_extract_tolerates_renamed_setter() {
        let script = SCRIPT.replace("__if_fc", "__zq_x9").replace("__if_ap", "__ab_cd");
        let config = parse_snare_js(&script).unwrap();
        assert_eq!(config.subscriber_id.len(), 64);
        assert_eq!(config.source_id, "am1prwdp03.iovation.us");
    }

    #[test]
    fn test_extract_falls_back_to_jstoken() {
        let script = SCRIPT.replace(r#"__if_fc("FLRTD""#, r#"__if_fc("JSTOKEN""#);
        let config = parse_snare_js(&script).unwrap();
        assert_eq!(config.token_key, TokenKey::Jstoken);
        assert_eq!(config.session_token, "/eYbIxrn3mAExmFkurAILblYjwPfFgzes7T1pLQbJMI=");
    }

    #[test]
    fn test_extract_missing_token() {
        let script = SCRIPT.replace(r#"__if_fc("FLRTD""#, r#"__if_fc("NOPE""#);
        assert!(matches!(
            parse_snare_js(&script),
            Err(SnareError::MissingConstant(ConfigField::SessionToken))
        ));
    }

    #[test]
    fn test_extract_fails_on_first_missing_constant() {
        let script = SCRIPT
            .replace(r#"__if_fc("SVRTIME""#, r#"__if_fc("XVRTIME""#)
            .replace(r#"__if_fc("JSVER""#, r#"__if_fc("XSVER""#);
        match parse_snare_js(&script) {
            Err(SnareError::MissingConstant(field)) => {
                assert_eq!(field, ConfigField::BuildTimestamp)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_extract_bad_source_base64() {
        let script = SCRIPT.replace("YW0xcHJ3ZHAwMy5pb3ZhdGlvbi51cw==", "not*base64");
        assert!(matches!(
            parse_snare_js(&script),
            Err(SnareError::MalformedConstant {
                field: ConfigField::SourceId,
                ..
            })
        ));
    }

    #[test]
    fn test_key_skips_short_char_code_calls() {
        let script = format!("var nl=String.fromCharCode(10);{}", SCRIPT);
        assert_eq!(parse_snare_js(&script).unwrap(), SnareConfig::sample());

        let script = format!(
            "var a=String.fromCharCode(72,105);{}var b=String.fromCharCode(0x41);",
            SCRIPT
        );
        assert_eq!(
            parse_snare_js(&script).unwrap().des_key,
            [0x7c, 0x4c, 0x45, 0x00, 0x63, 0x02, 0xc8, 0xa3]
        );
    }

    #[test]
    fn test_key_reports_first_candidate_when_none_fits() {
        let script = SCRIPT.replace(
            "String.fromCharCode(0x7c,0x4c,0x45,0x00,0x63,0x02,0xc8,0xa3)",
            "String.fromCharCode(10)",
        );
        let err = parse_snare_js(&script).unwrap_err();
        assert!(matches!(
            err,
            SnareError::MalformedConstant {
                field: ConfigField::CipherKey,
                ..
            }
        ));
        assert!(err.to_string().contains("got 1"));

        let script = SCRIPT.replace("String.fromCharCode", "String.noCharCode");
        assert!(matches!(
            parse_snare_js(&script),
            Err(SnareError::MissingConstant(ConfigField::CipherKey))
        ));
    }

    #[test]
    fn test_percent_decode_falls_back_to_raw() {
        assert_eq!(percent_decode_or_raw("en-US%2Cen".to_string()), "en-US,en");
        // %FF is not valid UTF-8 once decoded
        assert_eq!(percent_decode_or_raw("en%FF".to_string()), "en%FF");
    }

    #[test]
    fn test_parse_des_key_decimal_and_hex() {
        assert_eq!(
            parse_des_key("124, 0x4c, 69, 0, 0x63, 2, 200, 0xA3").unwrap(),
            [0x7c, 0x4c, 0x45, 0x00, 0x63, 0x02, 0xc8, 0xa3]
        );
    }

    #[test]
    fn test_parse_des_key_wrong_count() {
        let err = parse_des_key("0x01,0x02,0x03").unwrap_err();
        assert!(err.to_string().contains("got 3"));
    }

    #[test]
    fn test_parse_des_key_bad_byte() {
        let err = parse_des_key("1,2,3,4,5,6,7,0x1ff").unwrap_err();
        assert!(err.to_string().contains("key byte 7"));
    }

    #[test]
    fn test_output_element_id_from_script() {
        let script = format!(r#"{}__if_fc("BBOUT","myBlackBox");"#, SCRIPT);
        let config = parse_snare_js(&script).unwrap();
        assert_eq!(config.output_element_id, "myBlackBox");
    }

    #[test]
    fn test_find_output_element_id_in_page() {
        let extractor = ConfigExtractor::new().unwrap();
        let html = r#"<script>var io_bbout_element_id = 'bbField';</script>"#;
        assert_eq!(
            extractor.find_output_element_id(html),
            Some("bbField".to_string())
        );
        assert_eq!(extractor.find_output_element_id("<html></html>"), None);
    }

    #[test]
    fn test_find_snare_url() {
        let html = r#"<script>var po = document.createElement('script'); po.src = 'https://mpsnare.iesnare.com/snare.js'; s.parentNode.insertBefore(po, s);</script>"#;
        assert_eq!(
            find_snare_url(html).unwrap(),
            "https://mpsnare.iesnare.com/snare.js"
        );

        assert!(matches!(
            find_snare_url("<html></html>"),
            Err(SnareError::ScriptUrlNotFound)
        ));
    }

    #[test]
    fn test_custom_locator_pattern() {
        let extractor = ConfigExtractor::new()
            .unwrap()
            .with_pattern("JSVER", r#"version\s*:\s*'([^']+)'"#)
            .unwrap();
        assert_eq!(
            extractor.locate("JSVER", "cfg={version: '4.0.1'}"),
            Some("4.0.1".to_string())
        );
    }
}
