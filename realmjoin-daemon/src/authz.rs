//! Capability checks for the IPC surface.
//!
//! Every method maps to a named action identifier, fail-closed: a method
//! without a mapping is denied. Read-only discovery is open to any local
//! peer; enrollment and unenrollment require the policy to grant the
//! corresponding machine action.

pub const ACTION_ENROLL_MACHINE: &str = "realmjoin.enroll-machine";
pub const ACTION_UNENROLL_MACHINE: &str = "realmjoin.unenroll-machine";

/// What a given method requires before it may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodGate {
    /// Open to any local peer.
    Allowed,
    /// The policy must grant this action to the peer.
    RequiresAction(&'static str),
    /// No mapping; never runs.
    Denied,
}

/// Map a method name to its gate. Unknown methods are denied.
pub fn gate_for_method(method: &str) -> MethodGate {
    match method {
        "Discover" => MethodGate::Allowed,
        "EnrollWithPassword" | "EnrollWithCredentialCache" => {
            MethodGate::RequiresAction(ACTION_ENROLL_MACHINE)
        }
        "UnenrollWithPassword" | "UnenrollWithCredentialCache" => {
            MethodGate::RequiresAction(ACTION_UNENROLL_MACHINE)
        }
        _ => MethodGate::Denied,
    }
}

/// Identity of a connected peer, from socket credentials.
#[derive(Debug, Clone, Copy)]
pub struct Peer {
    pub uid: u32,
}

/// Decides whether a peer may perform a named action.
pub trait AuthorizationPolicy: Send + Sync {
    fn check(&self, peer: &Peer, action_id: &str) -> bool;
}

/// Grants every action to a fixed set of user ids.
#[derive(Debug, Clone)]
pub struct PeerUidPolicy {
    allowed: Vec<u32>,
}

impl PeerUidPolicy {
    /// Only root may enroll or unenroll.
    pub fn root_only() -> Self {
        Self { allowed: vec![0] }
    }

    pub fn allowing(uids: Vec<u32>) -> Self {
        Self { allowed: uids }
    }
}

impl AuthorizationPolicy for PeerUidPolicy {
    fn check(&self, peer: &Peer, action_id: &str) -> bool {
        let granted = self.allowed.contains(&peer.uid);
        if !granted {
            tracing::warn!(uid = peer.uid, action = %action_id, "Denied privileged action");
        }
        granted
    }
}
