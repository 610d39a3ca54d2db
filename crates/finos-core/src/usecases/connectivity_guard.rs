//! Connectivity guard
//!
//! Decides whether an identity-destructive transition may start. Offline
//! switching is never allowed: the outgoing identity's unsaved rows would be
//! purged before they reach the server. A forced logout is the single,
//! explicit escape hatch and requires the user to have seen a data-loss
//! warning first.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{Email, Identity, PendingMutationSet, UnsavedSummary};

/// Why a transition was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    Offline,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::Offline => write!(f, "offline"),
        }
    }
}

/// Verdict of the guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum SwitchDecision {
    Allowed,
    Blocked { reason: BlockReason },
    /// The user acknowledged that `discarded` pending mutations may be lost
    Overridden { discarded: usize },
}

impl SwitchDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, SwitchDecision::Blocked { .. })
    }
}

/// Notice shown before a forced logout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataLossWarning {
    outgoing: Email,
    unsaved: UnsavedSummary,
}

impl DataLossWarning {
    pub fn outgoing(&self) -> &Email {
        &self.outgoing
    }

    pub fn unsaved(&self) -> UnsavedSummary {
        self.unsaved
    }

    /// Lines describing what will be lost
    pub fn message(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.unsaved.total() > 0 {
            lines.push(format!("{} has unsaved changes:", self.outgoing));
            if self.unsaved.transactions > 0 {
                lines.push(format!("  {} transaction(s)", self.unsaved.transactions));
            }
            if self.unsaved.wallets > 0 {
                lines.push(format!("  {} wallet change(s)", self.unsaved.wallets));
            }
            if self.unsaved.plans > 0 {
                lines.push(format!("  {} plan or budget change(s)", self.unsaved.plans));
            }
            if self.unsaved.other > 0 {
                lines.push(format!("  {} other change(s)", self.unsaved.other));
            }
        }
        lines.push(format!(
            "All local data for {} will be removed from this device.",
            self.outgoing
        ));
        lines
    }

    /// The user has read the warning and accepts the loss
    pub fn acknowledge(self) -> AcknowledgedDataLoss {
        AcknowledgedDataLoss {
            outgoing: self.outgoing,
            discarded: self.unsaved.total(),
        }
    }
}

/// Proof that a data-loss warning was acknowledged
///
/// Only [`DataLossWarning::acknowledge`] can construct this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcknowledgedDataLoss {
    outgoing: Email,
    discarded: usize,
}

impl AcknowledgedDataLoss {
    pub fn outgoing(&self) -> &Email {
        &self.outgoing
    }

    pub fn discarded(&self) -> usize {
        self.discarded
    }
}

/// Pure decision logic guarding destructive transitions
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectivityGuard;

impl ConnectivityGuard {
    pub fn new() -> Self {
        Self
    }

    /// Offline always blocks, whatever is pending
    pub fn can_switch_user(&self, pending: &PendingMutationSet, is_online: bool) -> SwitchDecision {
        if !is_online {
            warn!(
                pending = pending.len(),
                reason = %BlockReason::Offline,
                "Identity switch blocked"
            );
            return SwitchDecision::Blocked {
                reason: BlockReason::Offline,
            };
        }
        info!(pending = pending.len(), "Identity switch allowed");
        SwitchDecision::Allowed
    }

    /// Builds the notice listing what a forced logout would discard
    pub fn data_loss_warning(
        &self,
        pending: &PendingMutationSet,
        outgoing: &Identity,
    ) -> DataLossWarning {
        DataLossWarning {
            outgoing: outgoing.email().clone(),
            unsaved: pending.summarize(),
        }
    }

    /// Overrides the guard after an acknowledged warning
    pub fn force_logout(&self, ack: &AcknowledgedDataLoss) -> SwitchDecision {
        warn!(
            outgoing = %ack.outgoing(),
            discarded = ack.discarded(),
            "Forced logout acknowledged, unsaved data may be lost"
        );
        SwitchDecision::Overridden {
            discarded: ack.discarded(),
        }
    }
}
