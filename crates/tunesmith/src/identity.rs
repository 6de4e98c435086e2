//! Request-scoped identity resolution.
//!
//! The orchestrator uses identity only for `created_by` stamping and
//! optional role checks, so the seam is a small trait: resolve a token
//! to an identity, with a fixed-anonymous degraded mode for setups
//! without authentication.

use tunesmith_protocol::Identity;

/// Resolves a request-scoped token to an identity.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, token: Option<&str>) -> Identity;
}

/// Degraded mode: every request resolves to the anonymous identity.
pub struct AnonymousIdentity;

impl IdentityProvider for AnonymousIdentity {
    fn resolve(&self, _token: Option<&str>) -> Identity {
        Identity::anonymous()
    }
}

/// A fixed identity, for development setups that pin one user.
pub struct StaticIdentity {
    identity: Identity,
}

impl StaticIdentity {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }
}

impl IdentityProvider for StaticIdentity {
    fn resolve(&self, _token: Option<&str>) -> Identity {
        self.identity.clone()
    }
}
