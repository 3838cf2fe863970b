//! User-Agent analysis matching the browser detection of snare.js.
//!
//! snare.js derives `JBRNM`, `JBRVR`, `JBROS` and `JBRCM` from
//! `navigator.userAgent` with a handful of quirky heuristics. They are
//! reproduced here as-is, including the Linux pass that keeps scanning.

use once_cell::sync::Lazy;
use regex::Regex;

static BROWSER_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:Chrome|Firefox|Safari|Edge|Opera|OPR|MSIE|Trident)")
        .expect("browser name regex")
});
static CHROME_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Chrome/(\d+[\d.]*)").expect("chrome version regex"));
static FIREFOX_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Firefox/(\d+[\d.]*)").expect("firefox version regex"));
static EDGE_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Edg(?:e)?/(\d+[\d.]*)").expect("edge version regex"));
static PAREN_GROUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*\)").expect("paren group regex"));

/// OS candidates, most general first.
///
/// A match on index 0 (`Linux`) only records a guess and scanning goes on;
/// any later candidate returns on its first match.
const OS_PATTERNS: &[&str] = &[
    "Linux",
    "Windows Phone",
    "Android",
    "BSD",
    "Ubuntu",
    "Irix",
    "MIDP",
    "Windows ",
    "Mac OS X",
    "Debian",
    "Mac",
    "Playstation",
    "Wii",
    "Xbox",
    "Win9",
    "BlackBerry",
    "WinNT",
    "iPhone",
    "iPad",
    "OS",
];

/// `navigator.platform` fallback when no OS candidate matches.
const DEFAULT_OS: &str = "Win32";

/// Browser details derived from a User-Agent string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserAgentInfo {
    /// `JBRNM`
    pub browser_name: String,
    /// `JBRVR`
    pub browser_version: String,
    /// `JBROS`
    pub os_name: String,
    /// `JBRCM`: the UA attributes that follow the OS token
    pub comment: String,
}

/// Parse a User-Agent string the way snare.js does.
pub fn parse_user_agent(ua: &str) -> UserAgentInfo {
    let (browser_name, browser_version) = detect_browser(ua);

    let attributes = extract_attributes(ua);
    let os_name = detect_os(&attributes);
    let comment = build_comment(&attributes, &os_name);

    UserAgentInfo {
        browser_name,
        browser_version,
        os_name,
        comment,
    }
}

fn capture_version(re: &Regex, ua: &str) -> Option<String> {
    re.captures(ua)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn detect_browser(ua: &str) -> (String, String) {
    if let Some(chrome) = capture_version(&CHROME_VERSION_RE, ua) {
        // Chromium Edge appends its own marker after Chrome's
        return match capture_version(&EDGE_VERSION_RE, ua) {
            Some(edge) => ("Edge".to_string(), edge),
            None => ("Chrome".to_string(), chrome),
        };
    }

    if let Some(version) = capture_version(&FIREFOX_VERSION_RE, ua) {
        return ("Firefox".to_string(), version);
    }

    if let Some(version) = capture_version(&EDGE_VERSION_RE, ua) {
        return ("Edge".to_string(), version);
    }

    match BROWSER_NAME_RE.find(ua) {
        Some(m) => (m.as_str().to_string(), String::new()),
        None => ("Unknown".to_string(), String::new()),
    }
}

/// Collect the `;`-separated tokens of every parenthesized group, in order.
fn extract_attributes(ua: &str) -> Vec<String> {
    PAREN_GROUP_RE
        .find_iter(ua)
        .flat_map(|group| {
            group
                .as_str()
                .trim_matches(|c| c == '(' || c == ')')
                .split(';')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(String::from)
                .collect::<Vec<_>>()
        })
        .collect()
}

fn detect_os(attributes: &[String]) -> String {
    let mut os = DEFAULT_OS.to_string();

    for (i, pattern) in OS_PATTERNS.iter().enumerate() {
        let pattern = pattern.to_uppercase();
        for attr in attributes {
            if attr.to_uppercase().contains(&pattern) {
                os = attr.clone();
                if i > 0 {
                    return os;
                }
            }
        }
    }

    os
}

/// Join the attributes with `"; "` and cut everything up to and including
/// the last occurrence of the OS token (plus an optional `"; "`).
fn build_comment(attributes: &[String], os_name: &str) -> String {
    if attributes.is_empty() {
        return String::new();
    }

    let joined = attributes.join("; ");
    match Regex::new(&format!("^.*{};? ?", regex::escape(os_name))) {
        Ok(re) => re.replace(&joined, "").into_owned(),
        Err(e) => {
            tracing::warn!("Failed to build comment pattern for {:?}: {}", os_name, e);
            joined
        }
    }
}
