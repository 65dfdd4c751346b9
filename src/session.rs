//! Session cookie codec.
//!
//! The browser owns the session: the gateway encodes an authenticated
//! identity into the `auth` cookie at login, decodes it on every request,
//! and clears it at logout. Nothing is persisted server-side.
//!
//! The cookie value is base64 of `{email, role, name?, exp}` with `exp`
//! in epoch milliseconds. Decoding fails closed: a missing field, an
//! unknown role, a garbled blob, or a past `exp` all read as "no
//! identity".

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed cookie name
pub const COOKIE_NAME: &str = "auth";

/// Session lifetime (24 h)
pub const SESSION_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// Roles understood by the records system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "student")]
    Student,
    #[serde(rename = "ARO")]
    Aro,
    #[serde(rename = "guardian")]
    Guardian,
    #[serde(rename = "DRO")]
    Dro,
    #[serde(rename = "DBA")]
    Dba,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Aro => "ARO",
            Role::Guardian => "guardian",
            Role::Dro => "DRO",
            Role::Dba => "DBA",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "ARO" => Ok(Role::Aro),
            "guardian" => Ok(Role::Guardian),
            "DRO" => Ok(Role::Dro),
            "DBA" => Ok(Role::Dba),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Authenticated identity carried by the session cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Expiry, epoch milliseconds
    pub exp: i64,
}

/// SameSite attribute policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    Strict,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Lax => "Lax",
            SameSite::Strict => "Strict",
            SameSite::None => "None",
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SameSite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lax" => Ok(SameSite::Lax),
            "strict" => Ok(SameSite::Strict),
            "none" => Ok(SameSite::None),
            other => Err(format!("unknown SameSite policy: {}", other)),
        }
    }
}

/// Cookie attribute configuration, environment-driven
#[derive(Debug, Clone)]
pub struct CookieOptions {
    pub secure: bool,
    pub same_site: SameSite,
    pub domain: Option<String>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            secure: true,
            same_site: SameSite::Lax,
            domain: None,
        }
    }
}

/// Encodes and decodes the `auth` session cookie.
#[derive(Debug, Clone)]
pub struct CookieCodec {
    options: CookieOptions,
}

impl CookieCodec {
    pub fn new(options: CookieOptions) -> Self {
        Self { options }
    }

    /// Encode an identity into a full `Set-Cookie` header value.
    ///
    /// `exp` is stamped here: now + 24 h.
    pub fn issue(&self, email: &str, role: Role, name: Option<&str>) -> String {
        let identity = Identity {
            email: email.to_string(),
            role,
            name: name.map(|n| n.to_string()),
            exp: Utc::now().timestamp_millis() + SESSION_TTL_MS,
        };
        // Identity serialization cannot fail; every field is a plain value
        let blob = BASE64.encode(serde_json::to_vec(&identity).unwrap_or_default());
        format!(
            "{}={}; Path=/; HttpOnly; SameSite={}; Max-Age={}{}{}",
            COOKIE_NAME,
            blob,
            self.options.same_site,
            SESSION_TTL_MS / 1000,
            if self.options.secure { "; Secure" } else { "" },
            match &self.options.domain {
                Some(domain) => format!("; Domain={}", domain),
                None => String::new(),
            },
        )
    }

    /// Decode the identity from a request `Cookie` header.
    ///
    /// Fails closed: any structural problem or a past expiry reads as
    /// `None`, never as a partial identity.
    pub fn read(&self, cookie_header: Option<&str>) -> Option<Identity> {
        let raw = cookie_value(cookie_header?, COOKIE_NAME)?;
        let bytes = BASE64.decode(raw).ok()?;
        let identity: Identity = serde_json::from_slice(&bytes).ok()?;

        if Utc::now().timestamp_millis() > identity.exp {
            return None;
        }
        Some(identity)
    }

    /// `Set-Cookie` value that clears the session
    pub fn revoke(&self) -> String {
        format!(
            "{}=; Path=/; HttpOnly; SameSite={}; Max-Age=0{}{}",
            COOKIE_NAME,
            self.options.same_site,
            if self.options.secure { "; Secure" } else { "" },
            match &self.options.domain {
                Some(domain) => format!("; Domain={}", domain),
                None => String::new(),
            },
        )
    }
}

/// Pull one cookie's value out of a `Cookie` header
fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}

/// Append `SameSite` to a backend `Set-Cookie` header when absent.
///
/// Backend cookies pass through the gateway untouched except for this
/// normalization.
pub fn ensure_same_site(set_cookie: &str, policy: SameSite) -> String {
    if set_cookie.is_empty() {
        return set_cookie.to_string();
    }
    let has_same_site = set_cookie
        .split(';')
        .any(|attr| attr.trim().to_ascii_lowercase().starts_with("samesite"));
    if has_same_site {
        set_cookie.to_string()
    } else {
        format!("{}; SameSite={}", set_cookie, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> CookieCodec {
        CookieCodec::new(CookieOptions {
            secure: false,
            same_site: SameSite::Lax,
            domain: None,
        })
    }

    fn header_for(set_cookie: &str) -> String {
        // Turn "auth=...; Path=/..." into the Cookie header a browser sends back
        set_cookie.split(';').next().unwrap().to_string()
    }

    #[test]
    fn test_issue_read_round_trip() {
        let codec = codec();
        let set_cookie = codec.issue("a@b.com", Role::Aro, Some("Alice"));
        let identity = codec.read(Some(&header_for(&set_cookie))).unwrap();

        assert_eq!(identity.email, "a@b.com");
        assert_eq!(identity.role, Role::Aro);
        assert_eq!(identity.name.as_deref(), Some("Alice"));
        assert!(identity.exp > Utc::now().timestamp_millis());
    }

    #[test]
    fn test_issue_renders_attributes() {
        let secure = CookieCodec::new(CookieOptions {
            secure: true,
            same_site: SameSite::Strict,
            domain: Some("records.example".into()),
        });
        let set_cookie = secure.issue("a@b.com", Role::Student, None);

        assert!(set_cookie.starts_with("auth="));
        assert!(set_cookie.contains("; Path=/"));
        assert!(set_cookie.contains("; HttpOnly"));
        assert!(set_cookie.contains("; SameSite=Strict"));
        assert!(set_cookie.contains("; Max-Age=86400"));
        assert!(set_cookie.contains("; Secure"));
        assert!(set_cookie.contains("; Domain=records.example"));
    }

    #[test]
    fn test_expired_cookie_reads_as_anonymous() {
        let codec = codec();
        let identity = Identity {
            email: "a@b.com".into(),
            role: Role::Student,
            name: None,
            exp: Utc::now().timestamp_millis() - 1_000,
        };
        let blob = BASE64.encode(serde_json::to_vec(&identity).unwrap());
        let header = format!("auth={}", blob);
        assert!(codec.read(Some(&header)).is_none());
    }

    #[test]
    fn test_garbage_reads_as_anonymous() {
        let codec = codec();
        assert!(codec.read(None).is_none());
        assert!(codec.read(Some("auth=not-base64!!!")).is_none());
        assert!(codec.read(Some("other=value")).is_none());

        // Valid base64, wrong shape
        let blob = BASE64.encode(br#"{"email":"a@b.com"}"#);
        assert!(codec.read(Some(&format!("auth={}", blob))).is_none());

        // Unknown role
        let blob = BASE64.encode(br#"{"email":"a@b.com","role":"wizard","exp":99999999999999}"#);
        assert!(codec.read(Some(&format!("auth={}", blob))).is_none());
    }

    #[test]
    fn test_read_among_other_cookies() {
        let codec = codec();
        let set_cookie = codec.issue("a@b.com", Role::Dro, None);
        let auth = header_for(&set_cookie);
        let header = format!("theme=dark; {}; locale=en", auth);
        assert_eq!(codec.read(Some(&header)).unwrap().role, Role::Dro);
    }

    #[test]
    fn test_revoke_clears_value() {
        let set_cookie = codec().revoke();
        assert!(set_cookie.starts_with("auth=;"));
        assert!(set_cookie.contains("; Max-Age=0"));
    }

    #[test]
    fn test_ensure_same_site_appends_only_when_absent() {
        assert_eq!(
            ensure_same_site("sid=abc; Path=/", SameSite::Lax),
            "sid=abc; Path=/; SameSite=Lax"
        );
        assert_eq!(
            ensure_same_site("sid=abc; SameSite=None", SameSite::Lax),
            "sid=abc; SameSite=None"
        );
        assert_eq!(
            ensure_same_site("sid=abc; samesite=strict", SameSite::Lax),
            "sid=abc; samesite=strict"
        );
        assert_eq!(ensure_same_site("", SameSite::Lax), "");
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(serde_json::to_string(&Role::Aro).unwrap(), "\"ARO\"");
        assert_eq!(serde_json::to_string(&Role::Student).unwrap(), "\"student\"");
        assert_eq!("DBA".parse::<Role>().unwrap(), Role::Dba);
        assert!("wizard".parse::<Role>().is_err());
    }
}
