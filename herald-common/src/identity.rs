use serde::{Deserialize, Serialize};

const DEFAULT_SUBMISSION_PORT: u16 = 587;

/// An opaque sender credential.
///
/// The engine never inspects the value; it is handed to the transport as-is.
/// `Debug` and `Display` redact it so credentials cannot leak through logs
/// or events.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Access the underlying secret. Only the transport should need this.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl From<String> for Credential {
    fn from(secret: String) -> Self {
        Self(secret)
    }
}

impl From<&str> for Credential {
    fn from(secret: &str) -> Self {
        Self(secret.to_string())
    }
}

/// A transport endpoint, host and port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port` form for connecting and logging.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A sender account used to dispatch messages, subject to its own daily
/// quota.
///
/// Identities are owned by the identity pool and mutated only through its
/// enable/disable and upsert/remove operations. Removing an identity hides
/// it from future rotation immediately but never aborts a send already in
/// flight with a clone of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    /// The sender address; unique key within the pool.
    pub address: String,

    /// Opaque secret handed to the transport.
    pub credential: Credential,

    /// Explicit transport endpoint. When absent the endpoint is inferred
    /// from the address domain.
    #[serde(default)]
    pub endpoint: Option<Endpoint>,

    /// Disabled identities are skipped by rotation but keep their usage
    /// history.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

impl SenderIdentity {
    #[must_use]
    pub fn new(address: impl Into<String>, credential: impl Into<Credential>) -> Self {
        Self {
            address: address.into(),
            credential: credential.into(),
            endpoint: None,
            enabled: true,
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// The domain part of the sender address, empty when the address is
    /// malformed.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.address
            .rsplit_once('@')
            .map_or("", |(_, domain)| domain)
    }

    /// The endpoint to hand to the transport: the explicit override when
    /// configured, otherwise `smtp.<domain>:587` inferred from the address.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint.clone().unwrap_or_else(|| Endpoint {
            host: format!("smtp.{}", self.domain()),
            port: DEFAULT_SUBMISSION_PORT,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_endpoint_inferred_from_domain() {
        let identity = SenderIdentity::new("sender@example.com", "secret");
        assert_eq!(identity.endpoint(), Endpoint::new("smtp.example.com", 587));
    }

    #[test]
    fn test_explicit_endpoint_wins() {
        let identity = SenderIdentity::new("sender@example.com", "secret")
            .with_endpoint(Endpoint::new("relay.internal", 2525));
        assert_eq!(identity.endpoint().address(), "relay.internal:2525");
    }

    #[test]
    fn test_credential_redacted_in_debug() {
        let identity = SenderIdentity::new("sender@example.com", "hunter2");
        let debugged = format!("{identity:?}");
        assert!(!debugged.contains("hunter2"));
        assert!(debugged.contains("<redacted>"));
    }

    #[test]
    fn test_domain_of_malformed_address() {
        let identity = SenderIdentity::new("not-an-address", "secret");
        assert_eq!(identity.domain(), "");
    }

    #[test]
    fn test_enabled_defaults_to_true() {
        let identity: SenderIdentity = serde_json::from_str(
            r#"{"address": "a@example.com", "credential": "s"}"#,
        )
        .unwrap();
        assert!(identity.enabled);
    }
}
