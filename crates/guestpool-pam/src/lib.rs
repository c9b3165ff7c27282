//! PAM-facing entry points
//!
//! The thin shim between the authentication framework and the guest pool:
//! it loads configuration per invocation, wires the lifecycle controller to
//! the capability handles, and maps every [`Outcome`] onto the small set of
//! result codes the framework understands. A denied or failed guest login is
//! indistinguishable from a wrong password on this boundary; nothing is ever
//! thrown across it.

use std::path::PathBuf;

use bitflags::bitflags;
use guestpool_config::{load_or_default, DEFAULT_CONFIG_PATH};
use guestpool_core::{AuthDecision, GuestPool, Outcome, ReapPolicy};
use guestpool_host_api::SystemHandles;
use tracing::debug;

bitflags! {
    /// Framework flags bitmask (Linux-PAM values)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PamFlags: u32 {
        const DISALLOW_NULL_AUTHTOK = 0x0001;
        const ESTABLISH_CRED = 0x0002;
        const DELETE_CRED = 0x0004;
        const REINITIALIZE_CRED = 0x0008;
        const REFRESH_CRED = 0x0010;
        const SILENT = 0x8000;
    }
}

/// Result codes returned to the framework
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PamStatus {
    Success,
    AuthError,
    AuthInfoUnavailable,
    MaxTries,
    SessionError,
}

impl PamStatus {
    /// Raw Linux-PAM return value
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::AuthError => 7,
            Self::AuthInfoUnavailable => 9,
            Self::MaxTries => 11,
            Self::SessionError => 14,
        }
    }
}

/// Opaque caller-identity handle provided by the framework
pub trait CallerIdentity {
    /// The login name the caller asked for, if known
    fn requested_user(&self) -> Option<String>;

    /// Resolve the session to a concrete account name
    fn set_user(&mut self, name: &str);
}

/// The guest login module: config location plus capability handles
pub struct GuestLogin {
    config_path: PathBuf,
    system: SystemHandles,
    reap: ReapPolicy,
}

impl GuestLogin {
    /// Production wiring: default config path, Linux adapters
    pub fn new() -> Self {
        Self::with_parts(
            PathBuf::from(DEFAULT_CONFIG_PATH),
            guestpool_host_linux::system_handles(),
        )
    }

    /// Custom wiring (tests, alternate config locations)
    pub fn with_parts(config_path: PathBuf, system: SystemHandles) -> Self {
        Self {
            config_path,
            system,
            reap: ReapPolicy::default(),
        }
    }

    pub fn with_reap_policy(mut self, reap: ReapPolicy) -> Self {
        self.reap = reap;
        self
    }

    /// Config is reloaded on every entry-point call; one invocation sees one
    /// immutable policy snapshot.
    fn pool(&self) -> GuestPool {
        let policy = load_or_default(&self.config_path);
        GuestPool::new(policy, self.system.clone()).with_reap_policy(self.reap.clone())
    }

    /// `pam_sm_authenticate`: hand out and provision a guest slot
    pub fn authenticate(
        &self,
        caller: &mut dyn CallerIdentity,
        _flags: PamFlags,
        args: &[String],
    ) -> PamStatus {
        init_debug_logging(args);

        let requested = match caller.requested_user() {
            Some(user) => user,
            None => return PamStatus::AuthInfoUnavailable,
        };

        match self.pool().authenticate(&requested) {
            AuthDecision::Granted { user, home } => {
                debug!(user = %user, home = %home.home.display(), "Resolving session user");
                caller.set_user(user.as_str());
                PamStatus::Success
            }
            AuthDecision::Refused(outcome) => auth_status(outcome),
        }
    }

    /// `pam_sm_setcred`: confirm the resolved user belongs to the pool
    pub fn set_credentials(
        &self,
        caller: &dyn CallerIdentity,
        _flags: PamFlags,
        args: &[String],
    ) -> PamStatus {
        init_debug_logging(args);

        let resolved = match caller.requested_user() {
            Some(user) => user,
            None => return PamStatus::AuthInfoUnavailable,
        };

        auth_status(self.pool().set_credentials(&resolved))
    }

    /// `pam_sm_open_session`: the home was prepared at authentication
    pub fn open_session(
        &self,
        _caller: &dyn CallerIdentity,
        _flags: PamFlags,
        args: &[String],
    ) -> PamStatus {
        init_debug_logging(args);
        match self.pool().open_session() {
            Outcome::Success => PamStatus::Success,
            _ => PamStatus::SessionError,
        }
    }

    /// `pam_sm_close_session`: reap guest sessions; teardown never blocks
    /// logout, so a guest session close always reports success
    pub fn close_session(
        &self,
        caller: &dyn CallerIdentity,
        _flags: PamFlags,
        args: &[String],
    ) -> PamStatus {
        init_debug_logging(args);

        let resolved = match caller.requested_user() {
            Some(user) => user,
            None => return PamStatus::SessionError,
        };

        match self.pool().close_session(&resolved) {
            Outcome::Success => PamStatus::Success,
            _ => PamStatus::SessionError,
        }
    }
}

impl Default for GuestLogin {
    fn default() -> Self {
        Self::new()
    }
}

fn auth_status(outcome: Outcome) -> PamStatus {
    match outcome {
        Outcome::Success => PamStatus::Success,
        Outcome::Denied => PamStatus::AuthInfoUnavailable,
        Outcome::Exhausted => PamStatus::MaxTries,
        Outcome::InfrastructureFailure | Outcome::VerificationFailure => PamStatus::AuthError,
    }
}

/// The second module argument, when equal to `debug`, turns on verbose
/// logging for this process
fn init_debug_logging(args: &[String]) {
    if args.get(1).map(|a| a == "debug").unwrap_or(false) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_linux_pam() {
        assert_eq!(PamStatus::Success.code(), 0);
        assert_eq!(PamStatus::AuthError.code(), 7);
        assert_eq!(PamStatus::AuthInfoUnavailable.code(), 9);
        assert_eq!(PamStatus::MaxTries.code(), 11);
        assert_eq!(PamStatus::SessionError.code(), 14);
    }

    #[test]
    fn outcome_mapping() {
        assert_eq!(auth_status(Outcome::Success), PamStatus::Success);
        assert_eq!(auth_status(Outcome::Denied), PamStatus::AuthInfoUnavailable);
        assert_eq!(auth_status(Outcome::Exhausted), PamStatus::MaxTries);
        assert_eq!(
            auth_status(Outcome::InfrastructureFailure),
            PamStatus::AuthError
        );
        assert_eq!(
            auth_status(Outcome::VerificationFailure),
            PamStatus::AuthError
        );
    }

    #[test]
    fn silent_flag_roundtrip() {
        let flags = PamFlags::SILENT | PamFlags::ESTABLISH_CRED;
        assert!(flags.contains(PamFlags::SILENT));
        assert_eq!(flags.bits(), 0x8002);
    }
}
