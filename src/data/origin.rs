//! Web origins as they appear in `clientDataJSON`
//!
//! `http`/`https` origins compare by scheme, host and port, with the default
//! port filled in. Any other scheme, such as `android:apk-key-hash:` or
//! `ios:bundle-id:`, has no URL form; its scheme-specific part compares as an
//! opaque string.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::error::VerificationError;

fn invalid(value: &str, reason: impl fmt::Display) -> VerificationError {
    VerificationError::DataConversion(format!("invalid origin '{value}': {reason}"))
}

/// RFC 3986 scheme: a letter followed by letters, digits, `+`, `-` or `.`
fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// A parsed origin
#[derive(Debug, Clone)]
pub struct Origin {
    scheme: String,
    host: Option<String>,
    port: Option<u16>,
    scheme_specific_part: Option<String>,
    serialized: String,
}

impl Origin {
    /// Parse an origin string
    ///
    /// # Errors
    /// Returns `DataConversion` if the value has no scheme, is an http(s) URL
    /// without a host, or has an empty scheme-specific part.
    pub fn parse(value: &str) -> Result<Self, VerificationError> {
        let (scheme, rest) = value
            .split_once(':')
            .filter(|(scheme, _)| is_scheme(scheme))
            .ok_or_else(|| invalid(value, "missing scheme"))?;

        if !scheme.eq_ignore_ascii_case("https") && !scheme.eq_ignore_ascii_case("http") {
            if rest.is_empty() {
                return Err(invalid(value, "empty scheme-specific part"));
            }
            return Ok(Self {
                scheme: scheme.to_string(),
                host: None,
                port: None,
                scheme_specific_part: Some(rest.to_string()),
                serialized: value.to_string(),
            });
        }

        let url = Url::parse(value).map_err(|e| invalid(value, e))?;
        let host = url.host_str().ok_or_else(|| invalid(value, "no host"))?;

        Ok(Self {
            scheme: url.scheme().to_string(),
            host: Some(host.to_ascii_lowercase()),
            port: url.port_or_known_default(),
            scheme_specific_part: None,
            serialized: value.to_string(),
        })
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Port with the scheme default applied (443 for https, 80 for http)
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Opaque remainder of a non-http(s) origin, such as `apk-key-hash:...`
    #[must_use]
    pub fn scheme_specific_part(&self) -> Option<&str> {
        self.scheme_specific_part.as_deref()
    }

    /// The origin text exactly as it was parsed
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.serialized
    }
}

impl PartialEq for Origin {
    fn eq(&self, other: &Self) -> bool {
        self.scheme.eq_ignore_ascii_case(&other.scheme)
            && self.host == other.host
            && self.port == other.port
            && self.scheme_specific_part == other.scheme_specific_part
    }
}

impl Eq for Origin {}

impl Hash for Origin {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scheme.to_ascii_lowercase().hash(state);
        self.host.hash(state);
        self.port.hash(state);
        self.scheme_specific_part.hash(state);
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialized)
    }
}

impl FromStr for Origin {
    type Err = VerificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Origin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.serialized)
    }
}

impl<'de> Deserialize<'de> for Origin {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_default_port_is_equal() {
        let a = Origin::parse("https://example.com").unwrap();
        let b = Origin::parse("https://example.com:443").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.port(), Some(443));

        let http = Origin::parse("http://example.com:80").unwrap();
        assert_eq!(http, Origin::parse("http://example.com").unwrap());
    }

    #[test]
    fn test_host_and_scheme_are_case_insensitive() {
        let a = Origin::parse("HTTPS://Example.COM").unwrap();
        let b = Origin::parse("https://example.com").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_port_or_scheme_differs() {
        let a = Origin::parse("http://localhost:8080").unwrap();
        assert_ne!(a, Origin::parse("http://localhost:8081").unwrap());
        assert_ne!(a, Origin::parse("https://localhost:8080").unwrap());
    }

    #[test]
    fn test_android_apk_key_hash_origins() {
        let a = Origin::parse("android:apk-key-hash:pNiP5iKyQ8JwgGOaKA1zGPUPJIS-0H1xKCQcfIoGLck").unwrap();
        let b = Origin::parse("android:apk-key-hash:pNiP5iKyQ8JwgGOaKA1zGPUPJIS-0H1xKCQcfIoGLck").unwrap();
        let c = Origin::parse("android:apk-key-hash-sha256:xT5ZucZJ9N7oq3j3awG8J/NlKf8trfo6AAJB8deuuNo=").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.scheme(), "android");
        assert!(a.host().is_none());
        assert!(c
            .scheme_specific_part()
            .unwrap()
            .starts_with("apk-key-hash-sha256:"));
    }

    #[test]
    fn test_other_schemes_are_opaque() {
        let ios = Origin::parse("ios:bundle-id:com.example.app").unwrap();
        assert_eq!(ios.scheme(), "ios");
        assert_eq!(ios.scheme_specific_part(), Some("bundle-id:com.example.app"));
        assert!(ios.host().is_none() && ios.port().is_none());
        assert_eq!(ios, Origin::parse("IOS:bundle-id:com.example.app").unwrap());
        assert_ne!(ios, Origin::parse("ios:bundle-id:com.example.other").unwrap());
        assert_eq!(ios.to_string(), "ios:bundle-id:com.example.app");
    }

    #[test]
    fn test_invalid_origin() {
        for value in ["not an origin", "example.com", "ios:", "1ab:foo", "https://"] {
            assert!(
                matches!(Origin::parse(value), Err(VerificationError::DataConversion(_))),
                "{value} should be rejected"
            );
        }
    }
}
