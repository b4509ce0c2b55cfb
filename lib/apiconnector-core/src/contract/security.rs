use serde::Deserialize;

/// HTTP authentication schemes the connector knows how to fill in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum HttpAuthKind {
    /// `Authorization: Bearer <token>`
    #[display("bearer")]
    Bearer,
    /// `Authorization: Basic <base64(username:password)>`
    #[display("basic")]
    Basic,
}

/// A named entry of `components.securitySchemes`.
///
/// Type and scheme are kept as written (lower-cased), so unsupported schemes
/// can still be reported by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthScheme {
    /// Key of the scheme in `components.securitySchemes`.
    pub name: String,
    /// The scheme `type` (`http`, `apiKey`, `oauth2`, ...).
    pub kind: String,
    /// The `scheme` of an `http` security scheme (`bearer`, `basic`, ...).
    pub sub_scheme: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawScheme {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    scheme: Option<String>,
}

impl AuthScheme {
    pub(super) fn new(name: &str, raw: RawScheme) -> Self {
        Self {
            name: name.to_string(),
            kind: raw.kind.to_ascii_lowercase(),
            sub_scheme: raw.scheme.map(|scheme| scheme.to_ascii_lowercase()),
        }
    }

    /// Returns the HTTP authentication kind when the scheme is actionable.
    ///
    /// Only `type: http` with `scheme: bearer` or `scheme: basic` qualifies.
    pub fn http_kind(&self) -> Option<HttpAuthKind> {
        if self.kind != "http" {
            return None;
        }
        match self.sub_scheme.as_deref() {
            Some("bearer") => Some(HttpAuthKind::Bearer),
            Some("basic") => Some(HttpAuthKind::Basic),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme(kind: &str, sub_scheme: Option<&str>) -> AuthScheme {
        AuthScheme::new(
            "auth",
            RawScheme {
                kind: kind.to_string(),
                scheme: sub_scheme.map(ToString::to_string),
            },
        )
    }

    #[test]
    fn test_http_kind() {
        assert_eq!(
            scheme("http", Some("bearer")).http_kind(),
            Some(HttpAuthKind::Bearer)
        );
        assert_eq!(
            scheme("HTTP", Some("Basic")).http_kind(),
            Some(HttpAuthKind::Basic)
        );
        assert_eq!(scheme("http", Some("digest")).http_kind(), None);
        assert_eq!(scheme("apiKey", None).http_kind(), None);
        assert_eq!(scheme("oauth2", Some("bearer")).http_kind(), None);
    }
}
