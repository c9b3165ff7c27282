//! Lifecycle controller
//!
//! Sequences the allocator, provisioner and reaper behind the four
//! operations the authentication framework drives, and reduces every code
//! path to an [`Outcome`]. Nothing here unwinds: a failed or denied guest
//! login must look exactly like a wrong password to the framework.

use guestpool_config::PoolPolicy;
use guestpool_host_api::SystemHandles;
use tracing::{debug, info, warn};

use crate::{
    ensure_group, next_guest_identity, provision, teardown, AllocError, EphemeralHome,
    Outcome, ProvisionStep, ReapPolicy, SlotName, TeardownReport,
};

/// Result of an authentication attempt
#[derive(Debug)]
pub enum AuthDecision {
    /// A slot was allocated and fully provisioned; the framework should
    /// resolve the session user to `user`
    Granted { user: SlotName, home: EphemeralHome },

    /// Refused; no resources are left behind
    Refused(Outcome),
}

impl AuthDecision {
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Granted { .. } => Outcome::Success,
            Self::Refused(outcome) => *outcome,
        }
    }
}

/// The guest pool: one policy snapshot plus capability handles
pub struct GuestPool {
    policy: PoolPolicy,
    system: SystemHandles,
    reap: ReapPolicy,
}

impl GuestPool {
    pub fn new(policy: PoolPolicy, system: SystemHandles) -> Self {
        Self {
            policy,
            system,
            reap: ReapPolicy::default(),
        }
    }

    pub fn with_reap_policy(mut self, reap: ReapPolicy) -> Self {
        self.reap = reap;
        self
    }

    pub fn policy(&self) -> &PoolPolicy {
        &self.policy
    }

    /// Does this name belong to the pool's naming contract?
    pub fn is_pool_member(&self, name: &str) -> bool {
        SlotName::parse(name, &self.policy.guest_name).is_some()
    }

    /// Authenticate a guest login request: allocate a slot and provision it.
    pub fn authenticate(&self, requested: &str) -> AuthDecision {
        if !self.policy.enabled {
            debug!("Guest login disabled");
            return AuthDecision::Refused(Outcome::Denied);
        }

        // Requests for any existing account are never handled here; real
        // accounts authenticate with their own password.
        match self.system.identity.user_by_name(requested) {
            Ok(Some(_)) => {
                debug!(requested, "Existing account, not a guest request");
                return AuthDecision::Refused(Outcome::Denied);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(requested, error = %e, "Identity lookup failed");
                return AuthDecision::Refused(Outcome::InfrastructureFailure);
            }
        }

        if requested != self.policy.guest_name {
            debug!(requested, "Not the configured guest name");
            return AuthDecision::Refused(Outcome::Denied);
        }

        if let Err(e) = ensure_group(self.system.identity.as_ref(), &self.policy.group) {
            warn!(group = %self.policy.group, error = %e, "Guest group unavailable");
            return AuthDecision::Refused(Outcome::Denied);
        }

        let slot = match next_guest_identity(
            self.system.identity.as_ref(),
            self.system.storage.as_ref(),
            &self.policy,
        ) {
            Ok(slot) => slot,
            Err(e @ (AllocError::Exhausted(_) | AllocError::Oversubscribed { .. })) => {
                warn!(error = %e, "Guest pool exhausted");
                return AuthDecision::Refused(Outcome::Exhausted);
            }
            Err(e) => {
                warn!(error = %e, "Slot allocation failed");
                return AuthDecision::Refused(Outcome::InfrastructureFailure);
            }
        };

        match provision(
            self.system.identity.as_ref(),
            self.system.mounts.as_ref(),
            self.system.storage.as_ref(),
            self.system.desktop.as_ref(),
            &self.policy,
            &slot,
        ) {
            Ok(home) => {
                info!(user = %slot, "Guest login granted");
                AuthDecision::Granted { user: slot, home }
            }
            Err(e) if e.step == ProvisionStep::Verify => {
                AuthDecision::Refused(Outcome::VerificationFailure)
            }
            Err(_) => AuthDecision::Refused(Outcome::InfrastructureFailure),
        }
    }

    /// Credential establishment: only confirm the resolved user is ours.
    pub fn set_credentials(&self, resolved: &str) -> Outcome {
        if !self.policy.enabled {
            return Outcome::Denied;
        }
        if self.is_pool_member(resolved) {
            Outcome::Success
        } else {
            Outcome::Denied
        }
    }

    /// Session open is a no-op; the home was prepared at authentication.
    pub fn open_session(&self) -> Outcome {
        Outcome::Success
    }

    /// Session close: reap pool members. Teardown is best-effort and must
    /// never block logout, so any reaper result maps to success.
    pub fn close_session(&self, resolved: &str) -> Outcome {
        if !self.policy.enabled {
            return Outcome::Denied;
        }
        if !self.is_pool_member(resolved) {
            debug!(resolved, "Not a guest session, leaving untouched");
            return Outcome::Success;
        }

        let report = self.teardown(resolved);
        if report.account_found && !report.account_deleted {
            warn!(resolved, "Teardown left the account behind");
        }
        Outcome::Success
    }

    /// Run the reaper directly (exposed for operators and tests)
    pub fn teardown(&self, name: &str) -> TeardownReport {
        teardown(
            self.system.identity.as_ref(),
            self.system.mounts.as_ref(),
            self.system.processes.as_ref(),
            self.system.storage.as_ref(),
            &self.reap,
            name,
        )
    }
}
