// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proc Token: a lease granted to the single Agent instance permitted to
//! drive a given run at a time (§3 Proc Token, §4.5 Proc Store).

use serde::{Deserialize, Serialize};

use crate::{ProcTokenId, RunId};

/// A renewable, exclusive lease on a run's execution. The Agent holding the
/// live token is the only writer allowed to append to that run's log stream
/// or advance its node states (§4.5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcToken {
    pub token_id: ProcTokenId,
    pub run_id: RunId,
    pub holder: String,
    pub acquired_at_ms: u64,
    pub expires_at_ms: u64,
}

impl ProcToken {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    /// §4.5: a renewal must come from the same holder and must not be applied
    /// once the lease has already lapsed, to avoid two agents both believing
    /// they hold the lease after a restart.
    pub fn can_renew(&self, holder: &str, now_ms: u64) -> bool {
        holder == self.holder && !self.is_expired(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> ProcToken {
        ProcToken {
            token_id: ProcTokenId::new(),
            run_id: RunId::new(),
            holder: "agent-1".to_string(),
            acquired_at_ms: 0,
            expires_at_ms: 1_000,
        }
    }

    #[test]
    fn expires_at_boundary_is_inclusive() {
        let t = token();
        assert!(!t.is_expired(999));
        assert!(t.is_expired(1_000));
    }

    #[test]
    fn renew_rejects_other_holder() {
        let t = token();
        assert!(!t.can_renew("agent-2", 500));
    }

    #[test]
    fn renew_rejects_lapsed_lease_even_for_same_holder() {
        let t = token();
        assert!(!t.can_renew("agent-1", 1_000));
    }
}
