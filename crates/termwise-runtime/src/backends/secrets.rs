//! Secure credential handling for the remote backend.
//!
//! Credentials are wrapped in [`secrecy::SecretString`] as soon as they are
//! read, so they cannot appear in Debug/Display output and are zeroed on
//! drop. The raw value is only exposed at the point of use.
//!
//! ```ignore
//! let cred = ApiCredential::from_env("HF_API_TOKEN", "Inference API token");
//! if cred.is_empty() {
//!     return Err(BackendError::unavailable("token missing"));
//! }
//! request.bearer_auth(cred.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Loaded from environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
    /// Nothing was found; the credential is empty
    Missing,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
            CredentialSource::Missing => write!(f, "missing"),
        }
    }
}

/// A securely-stored API credential.
///
/// - Debug and Display show `[REDACTED]`
/// - Memory is zeroed on drop via `secrecy`
/// - Explicit exposure via [`expose`](Self::expose)
/// - Source tracking for debugging configuration
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    /// Create a new credential from a string value.
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load a credential from an environment variable.
    ///
    /// An unset variable yields an empty credential with source
    /// [`CredentialSource::Missing`] instead of an error: absence is checked
    /// by the backend right before it would make a network call.
    pub fn from_env(env_var: &str, name: &'static str) -> Self {
        match std::env::var(env_var) {
            Ok(value) => Self::new(value, CredentialSource::Environment, name),
            Err(_) => Self::new(String::new(), CredentialSource::Missing, name),
        }
    }

    /// Expose the credential value for use in API calls.
    ///
    /// Only call this where the value is actually needed (e.g., setting an
    /// HTTP header). Never store the exposed value.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    /// Whether the credential is empty or whitespace.
    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().trim().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}
