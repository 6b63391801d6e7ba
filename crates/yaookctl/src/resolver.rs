//! Bootstrap source resolution.
//!
//! Picks the single replica a Galera cluster should be restarted from. The
//! decision is a pure function of the collected records: a replica flagged
//! safe-to-bootstrap wins, otherwise the replica with the highest known
//! sequence number does (first in input order on ties). Diverging cluster
//! UUIDs veto any choice.

use std::fmt;

use serde::Serialize;

use crate::grastate::ReplicaStateRecord;

/// Consistency fault observed while resolving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A further replica carries the safe-to-bootstrap flag.
    AlsoSafeToBootstrap { replica_id: String },
    /// A replica belongs to a different cluster than the first one seen.
    UuidMismatch {
        replica_id: String,
        expected: String,
        found: String,
    },
}

impl Diagnostic {
    /// Error-level diagnostics veto resolution; warnings do not.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::UuidMismatch { .. })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlsoSafeToBootstrap { replica_id } => {
                write!(f, "{replica_id} is *also* safe to bootstrap!")
            }
            Self::UuidMismatch {
                replica_id,
                expected,
                found,
            } => write!(
                f,
                "mismatching UUIDs! {replica_id} has {found}, expected {expected}"
            ),
        }
    }
}

/// Why a replica was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    SafeToBootstrap,
    HighestSequenceNumber,
}

/// Outcome of [`resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionResult {
    pub chosen_replica_id: Option<String>,
    pub reason: Option<SelectionReason>,
    pub uuid_consistent: bool,
    pub per_replica_records: Vec<ReplicaStateRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ResolutionResult {
    pub fn is_chosen(&self, replica_id: &str) -> bool {
        self.chosen_replica_id.as_deref() == Some(replica_id)
    }

    pub fn chosen_record(&self) -> Option<&ReplicaStateRecord> {
        let chosen = self.chosen_replica_id.as_deref()?;
        self.per_replica_records
            .iter()
            .find(|r| r.replica_id == chosen)
    }

    /// Whether the operator should inspect the table manually.
    pub fn needs_attention(&self) -> bool {
        self.chosen_replica_id.is_none() || !self.diagnostics.is_empty()
    }
}

/// Choose the bootstrap source among `records`.
pub fn resolve(records: &[ReplicaStateRecord]) -> ResolutionResult {
    let mut safe_to_bootstrap: Option<&ReplicaStateRecord> = None;
    let mut highest_seqno: Option<&ReplicaStateRecord> = None;
    let mut expected_uuid: Option<&str> = None;
    let mut uuid_consistent = true;
    let mut diagnostics = Vec::new();

    for record in records {
        if record.safe_to_bootstrap {
            if safe_to_bootstrap.is_none() {
                safe_to_bootstrap = Some(record);
            } else {
                diagnostics.push(Diagnostic::AlsoSafeToBootstrap {
                    replica_id: record.replica_id.clone(),
                });
            }
        }

        // strict comparison keeps the first replica on ties
        if record.has_known_position()
            && highest_seqno.map_or(true, |best| best.sequence_number < record.sequence_number)
        {
            highest_seqno = Some(record);
        }

        if record.has_known_uuid() {
            match expected_uuid {
                None => expected_uuid = Some(&record.cluster_uuid),
                Some(expected) if expected != record.cluster_uuid => {
                    uuid_consistent = false;
                    diagnostics.push(Diagnostic::UuidMismatch {
                        replica_id: record.replica_id.clone(),
                        expected: expected.to_string(),
                        found: record.cluster_uuid.clone(),
                    });
                }
                Some(_) => {}
            }
        }
    }

    let chosen = if !uuid_consistent {
        None
    } else if let Some(record) = safe_to_bootstrap {
        Some((record, SelectionReason::SafeToBootstrap))
    } else {
        highest_seqno.map(|record| (record, SelectionReason::HighestSequenceNumber))
    };

    ResolutionResult {
        chosen_replica_id: chosen.map(|(record, _)| record.replica_id.clone()),
        reason: chosen.map(|(_, reason)| reason),
        uuid_consistent,
        per_replica_records: records.to_vec(),
        diagnostics,
    }
}
