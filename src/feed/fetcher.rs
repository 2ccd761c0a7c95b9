//! HTTP download of feed documents with security measures.
//!
//! This module fetches raw feed bytes with SSRF protection and resource
//! limits, and provides the text cleanup shared by the crawler engines.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::config::SyncConfig;
use crate::{FeedmillError, Result};

/// User agent string for feed requests.
const USER_AGENT: &str = concat!("feedmill/", env!("CARGO_PKG_VERSION"));

/// Download limits and client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Total request timeout.
    pub timeout: Duration,
    /// Maximum number of redirects to follow.
    pub max_redirects: usize,
    /// Maximum document size in bytes.
    pub max_feed_size_bytes: u64,
    /// Maximum description length in characters.
    pub max_content_length: usize,
    /// Maximum entries taken from one document.
    pub max_entries: usize,
    /// Skip the private-host checks.
    pub allow_private_hosts: bool,
}

impl From<&SyncConfig> for FetchSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            timeout: config.fetch_timeout(),
            max_redirects: config.max_redirects,
            max_feed_size_bytes: config.max_feed_size_bytes,
            max_content_length: config.max_content_length,
            max_entries: config.max_entries_per_fetch,
            allow_private_hosts: config.allow_private_hosts,
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

/// Shared HTTP downloader used by all crawler engines.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    settings: FetchSettings,
}

impl Downloader {
    /// Create a downloader with the given settings.
    pub fn new(settings: FetchSettings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.max_redirects))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FeedmillError::Fetch(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, settings })
    }

    /// Settings in effect.
    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Download a feed document.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        if self.settings.allow_private_hosts {
            validate_scheme(url)?;
        } else {
            validate_url(url)?;
        }

        debug!("Downloading {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedmillError::Fetch(format!("failed to fetch feed: {}", e)))?;

        if !response.status().is_success() {
            return Err(FeedmillError::Fetch(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let max = self.settings.max_feed_size_bytes;
        if let Some(content_length) = response.content_length() {
            if content_length > max {
                return Err(too_large(content_length, max));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FeedmillError::Fetch(format!("failed to read response: {}", e)))?;

        // Content-Length may be absent or wrong
        if bytes.len() as u64 > max {
            return Err(too_large(bytes.len() as u64, max));
        }

        Ok(bytes.to_vec())
    }
}

fn too_large(size: u64, max: u64) -> FeedmillError {
    FeedmillError::Fetch(format!(
        "feed too large: {} bytes (max {} bytes)",
        size, max
    ))
}

fn parse_http_url(url: &str) -> Result<url::Url> {
    let parsed =
        url::Url::parse(url).map_err(|e| FeedmillError::Fetch(format!("invalid URL: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(FeedmillError::Fetch(format!(
            "unsupported URL scheme: {}",
            scheme
        ))),
    }
}

/// Validate only that the URL is well-formed http(s).
pub fn validate_scheme(url: &str) -> Result<()> {
    parse_http_url(url).map(|_| ())
}

/// Validate a URL for SSRF protection.
///
/// Rejects non-http(s) schemes, reserved hostnames and private or loopback
/// addresses.
pub fn validate_url(url: &str) -> Result<()> {
    let parsed = parse_http_url(url)?;
    let host = parsed
        .host()
        .ok_or_else(|| FeedmillError::Fetch("URL has no host".to_string()))?;

    let ip = match host {
        url::Host::Domain(domain) => {
            if is_forbidden_hostname(domain) {
                return Err(FeedmillError::Fetch(format!("forbidden host: {}", domain)));
            }
            return Ok(());
        }
        url::Host::Ipv4(ipv4) => IpAddr::V4(ipv4),
        url::Host::Ipv6(ipv6) => IpAddr::V6(ipv6),
    };

    if is_private_ip(&ip) {
        return Err(FeedmillError::Fetch(format!(
            "private IP address not allowed: {}",
            ip
        )));
    }
    Ok(())
}

fn is_forbidden_hostname(host: &str) -> bool {
    const FORBIDDEN_SUFFIXES: [&str; 7] = [
        ".local",
        ".localhost",
        ".internal",
        ".intranet",
        ".corp",
        ".home",
        ".lan",
    ];

    let host = host.to_lowercase();
    host == "localhost" || FORBIDDEN_SUFFIXES.iter().any(|suffix| host.ends_with(suffix))
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            let [a, b, c, _] = ipv4.octets();
            ipv4.is_loopback()
                || ipv4.is_private()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_unspecified()
                // Documentation ranges
                || (a == 192 && b == 0 && c == 2)
                || (a == 198 && b == 51 && c == 100)
                || (a == 203 && b == 0 && c == 113)
        }
        IpAddr::V6(ipv6) => {
            let first = ipv6.segments()[0];
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                // Unique local fc00::/7
                || (first & 0xfe00) == 0xfc00
                // Link-local fe80::/10
                || (first & 0xffc0) == 0xfe80
        }
    }
}

/// Strip HTML tags and decode entities, collapsing whitespace.
pub fn strip_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut entity: Option<String> = None;

    for ch in html.chars() {
        if let Some(name) = entity.as_mut() {
            if ch == ';' {
                decode_entity(name, &mut result);
                entity = None;
            } else {
                name.push(ch);
            }
            continue;
        }

        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            '&' if !in_tag => entity = Some(String::new()),
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }

    // Dangling '&' without a terminator
    if let Some(name) = entity {
        result.push('&');
        result.push_str(&name);
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entity(name: &str, out: &mut String) {
    let decoded = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => parse_numeric_entity(name).and_then(char::from_u32),
    };

    match decoded {
        Some(c) => out.push(c),
        None => {
            out.push('&');
            out.push_str(name);
            out.push(';');
        }
    }
}

fn parse_numeric_entity(entity: &str) -> Option<u32> {
    let digits = entity.strip_prefix('#')?;
    match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => digits.parse().ok(),
    }
}

/// Truncate text to at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url_accepts_public_http() {
        assert!(validate_url("https://example.com/feed.xml").is_ok());
        assert!(validate_url("http://example.com/feed.xml").is_ok());
        assert!(validate_url("http://172.32.0.1/feed.xml").is_ok());
    }

    #[test]
    fn test_validate_url_rejects_scheme() {
        let err = validate_url("ftp://example.com/feed.xml").unwrap_err();
        assert!(err.to_string().contains("unsupported URL scheme"));

        let err = validate_url("not a url").unwrap_err();
        assert!(err.to_string().contains("invalid URL"));
    }

    #[test]
    fn test_validate_url_rejects_forbidden_hosts() {
        for url in [
            "http://localhost/feed.xml",
            "http://server.local/feed.xml",
            "http://api.internal/feed.xml",
        ] {
            let err = validate_url(url).unwrap_err();
            assert!(err.to_string().contains("forbidden host"), "{url}");
        }
    }

    #[test]
    fn test_validate_url_rejects_private_ips() {
        for url in [
            "http://127.0.0.1/feed.xml",
            "http://10.0.0.1/feed.xml",
            "http://172.16.0.1/feed.xml",
            "http://192.168.1.1/feed.xml",
            "http://169.254.1.1/feed.xml",
            "http://[::1]/feed.xml",
        ] {
            let err = validate_url(url).unwrap_err();
            assert!(err.to_string().contains("private IP"), "{url}");
        }
    }

    #[test]
    fn test_validate_scheme_allows_private_hosts() {
        assert!(validate_scheme("http://127.0.0.1:8080/feed.xml").is_ok());
        assert!(validate_scheme("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_is_forbidden_hostname() {
        assert!(is_forbidden_hostname("LOCALHOST"));
        assert!(is_forbidden_hostname("api.localhost"));
        assert!(is_forbidden_hostname("corp.intranet"));
        assert!(!is_forbidden_hostname("localhost.example.com"));
        assert!(!is_forbidden_hostname("news.example.org"));
    }

    #[test]
    fn test_is_private_ip() {
        assert!(is_private_ip(&"127.255.255.255".parse().unwrap()));
        assert!(is_private_ip(&"172.31.255.255".parse().unwrap()));
        assert!(is_private_ip(&"0.0.0.0".parse().unwrap()));
        assert!(is_private_ip(&"198.51.100.7".parse().unwrap()));
        assert!(is_private_ip(&"fd00::1".parse().unwrap()));
        assert!(is_private_ip(&"fe80::1".parse().unwrap()));

        assert!(!is_private_ip(&"8.8.8.8".parse().unwrap()));
        assert!(!is_private_ip(&"2001:4860:4860::8888".parse().unwrap()));
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<div><p>Nested</p></div>"), "Nested");
        assert_eq!(strip_html("<b>Bold</b> text"), "Bold text");
        assert_eq!(strip_html("&lt;tag&gt; &amp; &quot;q&quot;"), "<tag> & \"q\"");
        assert_eq!(strip_html("&#65;&#x42;"), "AB");
        assert_eq!(strip_html("&bogus; kept"), "&bogus; kept");
        assert_eq!(strip_html("<p>\n\tNewlines\n  and tabs</p>"), "Newlines and tabs");
        assert_eq!(strip_html("Fish & chips"), "Fish & chips");
    }

    #[test]
    fn test_parse_numeric_entity() {
        assert_eq!(parse_numeric_entity("#65"), Some(65));
        assert_eq!(parse_numeric_entity("#x41"), Some(65));
        assert_eq!(parse_numeric_entity("#X41"), Some(65));
        assert_eq!(parse_numeric_entity("amp"), None);
        assert_eq!(parse_numeric_entity("#xZZ"), None);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exact", 5), "exact");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        // Multi-byte characters are never split
        assert_eq!(truncate_chars("ééé", 2), "éé");
    }

    #[test]
    fn test_fetch_settings_from_config() {
        let config = SyncConfig {
            fetch_timeout_secs: 7,
            max_entries_per_fetch: 3,
            allow_private_hosts: true,
            ..SyncConfig::default()
        };
        let settings = FetchSettings::from(&config);
        assert_eq!(settings.timeout, Duration::from_secs(7));
        assert_eq!(settings.max_entries, 3);
        assert!(settings.allow_private_hosts);
    }

    #[tokio::test]
    async fn test_download_rejects_private_host_before_request() {
        let downloader = Downloader::new(FetchSettings::default()).unwrap();
        let err = downloader.download("http://127.0.0.1/feed.xml").await.unwrap_err();
        assert!(matches!(err, FeedmillError::Fetch(_)));
    }
}
