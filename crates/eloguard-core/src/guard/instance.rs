// Instance identity for concurrently running sessions
// Format: "eloguard-<uuid>"

use std::fmt;

use uuid::Uuid;

use crate::storage::{keys, Store};

const INSTANCE_ID_PREFIX: &str = "eloguard-";

/// Session-lifetime random token. Namespaces per-session persisted state
/// (the cooldown record) so concurrent sessions don't clobber each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceIdentity(String);

impl InstanceIdentity {
    /// Fresh identity, not persisted anywhere.
    pub fn generate() -> Self {
        Self(format!("{}{}", INSTANCE_ID_PREFIX, Uuid::new_v4()))
    }

    /// Get or create the identity held in a session-scoped store.
    ///
    /// A malformed stored value is replaced. If the store cannot be read or
    /// written, an ephemeral identity is returned instead; the session then
    /// simply won't find its cooldown again after a restart.
    pub async fn load_or_create(session: &dyn Store) -> Self {
        match session.get(keys::INSTANCE_ID).await {
            Ok(Some(stored)) => {
                let stored = stored.trim().to_string();
                if stored.starts_with(INSTANCE_ID_PREFIX) {
                    return Self(stored);
                }
                tracing::warn!(stored = %stored, "replacing malformed instance id");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "session store unreadable, using ephemeral instance id");
                return Self::generate();
            }
        }

        let identity = Self::generate();
        if let Err(e) = session.set(keys::INSTANCE_ID, identity.as_str()).await {
            tracing::warn!(error = %e, "failed to persist instance id");
        }
        identity
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
