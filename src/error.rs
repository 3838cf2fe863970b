//! Error types for the ioblackbox library.

use thiserror::Error;

/// A build-specific constant carried by [`SnareConfig`](crate::models::SnareConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    /// Subscriber identifier (`IGGY`)
    SubscriberId,
    /// Deployment server identifier (`JSSRC`)
    SourceId,
    /// Element the browser would write the blackbox into (`BBOUT`)
    OutputElementId,
    /// Build timestamp (`SVRTIME`)
    BuildTimestamp,
    /// Script-load token (`FLRTD` or `JSTOKEN`)
    SessionToken,
    /// User agent baked into the build (`SUAGT`)
    BakedUserAgent,
    /// Accept-Language baked into the build (`HACCLNG`)
    BakedAcceptLanguage,
    /// Script version (`JSVER`)
    ScriptVersion,
    /// 8-byte DES key
    CipherKey,
}

impl ConfigField {
    /// Returns the name the field goes by in snare.js.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigField::SubscriberId => "IGGY",
            ConfigField::SourceId => "JSSRC",
            ConfigField::OutputElementId => "BBOUT",
            ConfigField::BuildTimestamp => "SVRTIME",
            ConfigField::SessionToken => "FLRTD/JSTOKEN",
            ConfigField::BakedUserAgent => "SUAGT",
            ConfigField::BakedAcceptLanguage => "HACCLNG",
            ConfigField::ScriptVersion => "JSVER",
            ConfigField::CipherKey => "DES key",
        }
    }
}

impl std::fmt::Display for ConfigField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the ioblackbox library.
#[derive(Error, Debug)]
pub enum SnareError {
    /// A constant could not be located in the script text
    #[error("Failed to extract {0} from snare.js")]
    MissingConstant(ConfigField),

    /// A constant was located but its value could not be decoded
    #[error("Failed to decode {field}: {reason}")]
    MalformedConstant { field: ConfigField, reason: String },

    /// Configuration is missing a required value
    #[error("Invalid config: {0} not defined")]
    InvalidConfig(ConfigField),

    /// No snare.js script reference in the page markup
    #[error("snare.js URL not found in page HTML")]
    ScriptUrlNotFound,

    /// Encryption error
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Blackbox or wire payload could not be decoded
    #[error("Malformed blackbox: {0}")]
    MalformedBlackbox(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] rquest::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Regex error
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

/// Result type alias for ioblackbox operations.
pub type Result<T> = std::result::Result<T, SnareError>;
