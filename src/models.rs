//! Data models for snare.js blackbox generation.

use serde::{Deserialize, Serialize};

/// Which snare.js field supplied the session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKey {
    /// First-load real-time detection token, served from the iesnare CDN
    #[serde(rename = "FLRTD")]
    Flrtd,
    /// Token of a third-party hosted snare.js
    #[serde(rename = "JSTOKEN")]
    Jstoken,
}

impl TokenKey {
    /// Returns the wire key for the token field.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKey::Flrtd => "FLRTD",
            TokenKey::Jstoken => "JSTOKEN",
        }
    }
}

impl std::fmt::Display for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build-specific constants of one snare.js deployment.
///
/// Produced once by [`ConfigExtractor`](crate::deobfuscate::ConfigExtractor)
/// (or written by hand) and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnareConfig {
    /// 64-char subscriber identifier, routes the blackbox to the right fraud rules (`IGGY`)
    pub subscriber_id: String,
    /// Server identifier of the deployment, base64-decoded (`JSSRC`)
    pub source_id: String,
    /// Element id the browser script writes the blackbox into (`BBOUT`)
    pub output_element_id: String,
    /// Build timestamp, `YYYY/MM/DD HH:MM:SS` (`SVRTIME`)
    pub build_timestamp: String,
    /// Token tying the blackbox to one script load
    pub session_token: String,
    /// Field the session token came from
    pub token_key: TokenKey,
    /// User agent baked into the build, compared against the real one (`SUAGT`)
    pub baked_user_agent: String,
    /// Accept-Language baked into the build (`HACCLNG`)
    pub baked_accept_language: String,
    /// snare.js version (`JSVER`)
    pub script_version: String,
    /// DES-ECB key from the `String.fromCharCode(...)` literal
    #[serde(with = "hex_key")]
    pub des_key: [u8; 8],
}

impl SnareConfig {
    /// Check that every constant is present.
    ///
    /// Fails on the first empty field (or an all-zero key) and names it.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::{ConfigField, SnareError};

        let required = [
            (ConfigField::SubscriberId, &self.subscriber_id),
            (ConfigField::SourceId, &self.source_id),
            (ConfigField::OutputElementId, &self.output_element_id),
            (ConfigField::BuildTimestamp, &self.build_timestamp),
            (ConfigField::SessionToken, &self.session_token),
            (ConfigField::BakedUserAgent, &self.baked_user_agent),
            (ConfigField::BakedAcceptLanguage, &self.baked_accept_language),
            (ConfigField::ScriptVersion, &self.script_version),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(SnareError::InvalidConfig(*field));
        }

        if self.des_key == [0u8; 8] {
            return Err(SnareError::InvalidConfig(ConfigField::CipherKey));
        }

        Ok(())
    }
}

#[cfg(test)]
impl SnareConfig {
    /// Reference config of a captured production deployment.
    pub(crate) fn sample() -> Self {
        SnareConfig {
            subscriber_id: "ajhX8U8YHxOyzdXEDGbRRazTg5OktIgQ4lN3PpeFbdPcPWTmwbnv9GX54KydaIMo"
                .to_string(),
            source_id: "am1prwdp03.iovation.us".to_string(),
            output_element_id: "ioBlackBox".to_string(),
            build_timestamp: "2018/11/28 11:57:02".to_string(),
            session_token: "/eYbIxrn3mAExmFkurAILblYjwPfFgzes7T1pLQbJMI=".to_string(),
            token_key: TokenKey::Flrtd,
            baked_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/64.0.3282.140 Safari/537.36 Edge/17.17134".to_string(),
            baked_accept_language: "en-IL,en-US;q=0.8,en;q=0.5,he;q=0.3".to_string(),
            script_version: "3.1.3".to_string(),
            des_key: [0x7c, 0x4c, 0x45, 0x00, 0x63, 0x02, 0xc8, 0xa3],
        }
    }
}

/// Serde adapter storing the DES key as a hex string.
mod hex_key {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(key: &[u8; 8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(key))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 8], D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        let mut key = [0u8; 8];
        hex::decode_to_slice(text.trim(), &mut key).map_err(de::Error::custom)?;
        Ok(key)
    }
}

/// How the page integrates snare.js.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationType {
    /// The page registered `io_bb_callback` to receive the blackbox
    Callback,
    /// snare.js writes the blackbox into a hidden `<input>`
    Form,
    /// `ioGetBlackbox()` was called on demand
    Function,
}

impl IntegrationType {
    /// Returns the `JINT` wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationType::Callback => "callback",
            IntegrationType::Form => "form",
            IntegrationType::Function => "function",
        }
    }
}

impl std::fmt::Display for IntegrationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Screen resolution in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Per-request browser context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackboxParams {
    /// Browser User-Agent (truncated to 400 characters before use)
    pub user_agent: String,
    /// Current page URL; the query string is dropped
    pub page_url: String,
    /// `document.referrer`
    #[serde(default)]
    pub referer: String,
    /// Browser language, e.g. `en-US`
    #[serde(default)]
    pub language: String,
    /// `navigator.platform`
    #[serde(default)]
    pub platform: String,
    /// Screen resolution; drawn from a fixed pool when absent
    #[serde(default)]
    pub resolution: Option<Resolution>,
    /// Timezone offset in minutes (e.g. -60 for UTC+1)
    #[serde(default)]
    pub timezone_offset: i32,
    pub integration_type: IntegrationType,
}

/// One named value of the blackbox payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub key: String,
    pub value: String,
}

impl Field {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
