use serde::{Deserialize, Serialize};

/// A single message recipient as provided by an upload.
///
/// Recipients are immutable once created; the engine only ever moves them
/// between the pending and completed queues. The email address is the
/// recipient's key, but uploads are not deduplicated against each other:
/// importing the same address twice queues two sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Destination address. A recipient with an empty address is skipped at
    /// import time.
    pub email: String,

    /// Display name used for the `{name}` placeholder.
    #[serde(default)]
    pub name: String,

    /// Formal name used for the `{real_name}` placeholder.
    #[serde(default)]
    pub real_name: String,
}

impl Recipient {
    #[must_use]
    pub fn new(
        email: impl Into<String>,
        name: impl Into<String>,
        real_name: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            real_name: real_name.into(),
        }
    }

    /// Whether this recipient carries a usable address.
    #[must_use]
    pub fn has_email(&self) -> bool {
        !self.email.trim().is_empty()
    }

    /// The formal name, falling back to the display name when absent.
    #[must_use]
    pub fn real_name_or_name(&self) -> &str {
        if self.real_name.is_empty() {
            &self.name
        } else {
            &self.real_name
        }
    }
}
