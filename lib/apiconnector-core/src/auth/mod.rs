use std::fmt;

use http::HeaderValue;
use reqwest::header::{AUTHORIZATION, HeaderName};
use zeroize::{Zeroize, ZeroizeOnDrop};

mod configurator;
pub use self::configurator::{Authenticate, AuthenticationConfigurator, SchemeOutcome};

/// Errors that can occur while rendering credentials into a request header.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Error, derive_more::Display)]
pub enum AuthenticationError {
    /// Bearer token contains invalid characters for HTTP headers.
    #[display("Bearer token contains invalid characters: {message}")]
    InvalidBearerToken {
        /// Description of the invalid characters or format issue.
        message: String,
    },

    /// Basic authentication username contains invalid characters.
    #[display("Basic auth username contains invalid characters: {message}")]
    InvalidUsername {
        /// Description of the invalid characters or format issue.
        message: String,
    },

    /// Basic authentication password contains invalid characters.
    #[display("Basic auth password contains invalid characters: {message}")]
    InvalidPassword {
        /// Description of the invalid characters or format issue.
        message: String,
    },
}

/// Secure wrapper for sensitive string data that automatically zeroes memory on drop.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecureString(String);

impl SecureString {
    /// Creates a new secure string from the provided value.
    pub fn new(value: String) -> Self {
        Self(value)
    }

    /// Returns a reference to the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `SecureString` and returns the inner String.
    pub fn into_string(mut self) -> String {
        std::mem::take(&mut self.0)
    }

    /// Checks if the secure string equals the given string slice.
    pub fn equals_str(&self, other: &str) -> bool {
        self.0 == other
    }

    /// Whether the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn mask_sensitive(value: &str) -> String {
        if value.len() <= 8 {
            "***".to_string()
        } else {
            let head = value.get(..4).unwrap_or_default();
            let tail = value.get(value.len() - 4..).unwrap_or_default();
            format!("{head}...{tail}")
        }
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureString")
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::mask_sensitive(&self.0))
    }
}

impl From<String> for SecureString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecureString {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

/// Credentials registered for a security scheme.
#[derive(Clone)]
pub enum Credentials {
    /// Bearer token authentication (RFC 6750).
    /// Adds `Authorization: Bearer <token>` header.
    Bearer(SecureString),

    /// HTTP Basic authentication (RFC 7617).
    /// Adds `Authorization: Basic <base64(username:password)>` header.
    Basic {
        /// The username for Basic authentication.
        username: String,
        /// The password for Basic authentication.
        password: SecureString,
    },
}

impl Credentials {
    /// Converts the credentials into an HTTP header.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationError` if the credentials contain characters that
    /// cannot be carried in a header.
    pub fn to_header(&self) -> Result<(HeaderName, HeaderValue), AuthenticationError> {
        match self {
            Self::Bearer(token) => {
                let header_value = format!("Bearer {}", token.as_str());
                let value = HeaderValue::from_str(&header_value).map_err(|err| {
                    AuthenticationError::InvalidBearerToken {
                        message: err.to_string(),
                    }
                })?;
                Ok((AUTHORIZATION, value))
            }

            Self::Basic { username, password } => {
                if username.contains(':') {
                    return Err(AuthenticationError::InvalidUsername {
                        message: "Username cannot contain colon (:) character".to_string(),
                    });
                }

                use base64::Engine;
                let credentials_str = format!("{username}:{}", password.as_str());
                let credentials = base64::engine::general_purpose::STANDARD.encode(credentials_str);

                let header_value = format!("Basic {credentials}");
                let value = HeaderValue::from_str(&header_value).map_err(|err| {
                    AuthenticationError::InvalidPassword {
                        message: err.to_string(),
                    }
                })?;
                Ok((AUTHORIZATION, value))
            }
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"[REDACTED]").finish(),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(token) => write!(f, "Bearer {token}"),
            Self::Basic { username, .. } => write!(f, "Basic (username: {username})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_credentials() {
        let credentials = Credentials::Bearer("my-secret-token".into());
        let (header_name, header_value) = credentials.to_header().expect("valid header");

        assert_eq!(header_name, AUTHORIZATION);
        assert_eq!(header_value, "Bearer my-secret-token");
    }

    #[test]
    fn test_basic_credentials() {
        let credentials = Credentials::Basic {
            username: "user".to_string(),
            password: "pass".into(),
        };
        let (header_name, header_value) = credentials.to_header().expect("valid header");

        assert_eq!(header_name, AUTHORIZATION);
        // "user:pass" base64 encoded is "dXNlcjpwYXNz"
        assert_eq!(header_value, "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_empty_credentials_still_render() {
        let credentials = Credentials::Bearer(SecureString::default());
        let (_, header_value) = credentials.to_header().expect("valid header");
        assert_eq!(header_value, "Bearer ");

        let credentials = Credentials::Basic {
            username: String::new(),
            password: SecureString::default(),
        };
        let (_, header_value) = credentials.to_header().expect("valid header");
        // ":" base64 encoded is "Og=="
        assert_eq!(header_value, "Basic Og==");
    }

    #[test]
    fn test_display_masks_secrets() {
        let credentials = Credentials::Bearer("very-secret-token-12345".into());
        assert_eq!(credentials.to_string(), "Bearer very...2345");

        let credentials = Credentials::Basic {
            username: "user".to_string(),
            password: "password".into(),
        };
        assert_eq!(credentials.to_string(), "Basic (username: user)");
    }

    #[test]
    fn test_secure_string_mask_short_tokens() {
        assert_eq!(SecureString::mask_sensitive("short"), "***");
        assert_eq!(SecureString::mask_sensitive("12345678"), "***");
        assert_eq!(SecureString::mask_sensitive("123456789"), "1234...6789");
    }

    #[test]
    fn test_credentials_errors() {
        let credentials = Credentials::Bearer("\0invalid".into());
        assert!(matches!(
            credentials.to_header(),
            Err(AuthenticationError::InvalidBearerToken { .. })
        ));

        let credentials = Credentials::Basic {
            username: "user:invalid".to_string(),
            password: "password".into(),
        };
        assert!(matches!(
            credentials.to_header(),
            Err(AuthenticationError::InvalidUsername { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let secure = SecureString::new("secret-password".to_string());
        let debug_str = format!("{secure:?}");
        assert_eq!(debug_str, "SecureString { value: \"[REDACTED]\" }");

        let credentials = Credentials::Basic {
            username: "alice".to_string(),
            password: "secret-password".into(),
        };
        let debug_str = format!("{credentials:?}");
        assert!(!debug_str.contains("secret-password"));
        assert!(debug_str.contains("alice"));
    }
}
