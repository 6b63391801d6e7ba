//! Collection of per-replica state records.
//!
//! A failure on one replica never aborts the batch: the affected replica is
//! degraded to the "unknown" sentinel and collection moves on.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::ControlPlaneError;
use crate::grastate::ReplicaStateRecord;

/// Errors from reading or deriving a replica's state.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The probe ran but did not succeed (missing file, crash, ...).
    #[error("probe for {replica} failed: {message}")]
    Failed { replica: String, message: String },

    /// The probe did not finish in time.
    #[error("probe for {replica} timed out after {seconds}s")]
    Timeout { replica: String, seconds: u64 },

    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),
}

/// Read-only access to the replication state stored on a replica's volume.
#[async_trait]
pub trait ReplicaStateSource: Send + Sync {
    /// Raw contents of the replica's persisted state file.
    async fn read_replica_state(&self, replica_id: &str) -> Result<String, ProbeError>;

    /// Log output of the read-only recovery tool run against the replica.
    async fn derive_replica_state_via_log_scan(
        &self,
        replica_id: &str,
    ) -> Result<String, ProbeError>;
}

/// Produces one [`ReplicaStateRecord`] per replica.
#[derive(Clone)]
pub struct ReplicaStateCollector {
    source: Arc<dyn ReplicaStateSource>,
}

impl ReplicaStateCollector {
    pub fn new(source: Arc<dyn ReplicaStateSource>) -> Self {
        Self { source }
    }

    /// Collect the state of a single replica.
    pub async fn collect(&self, replica_id: &str) -> ReplicaStateRecord {
        let record = match self.source.read_replica_state(replica_id).await {
            Ok(raw) => match ReplicaStateRecord::parse_grastate(replica_id, &raw) {
                Ok(record) => record,
                Err(e) => {
                    warn!(replica = %replica_id, error = %e, "failed to parse grastate.dat");
                    ReplicaStateRecord::unknown(replica_id)
                }
            },
            Err(e) => {
                debug!(replica = %replica_id, error = %e, "could not read grastate.dat");
                ReplicaStateRecord::unknown(replica_id)
            }
        };

        if record.has_known_position() {
            return record;
        }

        info!(replica = %replica_id, "position unknown, scanning recovery log");
        self.derive(replica_id).await
    }

    async fn derive(&self, replica_id: &str) -> ReplicaStateRecord {
        let fallback = || ReplicaStateRecord {
            recovered: true,
            ..ReplicaStateRecord::unknown(replica_id)
        };

        let log = match self.source.derive_replica_state_via_log_scan(replica_id).await {
            Ok(log) => log,
            Err(e) => {
                warn!(replica = %replica_id, error = %e, "recovery log scan failed");
                return fallback();
            }
        };

        match ReplicaStateRecord::parse_recovery_log(replica_id, &log) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    replica = %replica_id,
                    error = %e,
                    "failed to parse recovered position from log"
                );
                fallback()
            }
        }
    }

    /// Collect all replicas concurrently, preserving input order.
    pub async fn collect_all(&self, replica_ids: &[String]) -> Vec<ReplicaStateRecord> {
        join_all(replica_ids.iter().map(|id| self.collect(id))).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::grastate::{UNKNOWN_SEQNO, ZERO_UUID};

    const UUID: &str = "6b7e0d6c-2b1f-11ef-9f1a-0242ac120002";

    #[derive(Default)]
    struct FakeSource {
        grastate: HashMap<String, String>,
        logs: HashMap<String, String>,
        scanned: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReplicaStateSource for FakeSource {
        async fn read_replica_state(&self, replica_id: &str) -> Result<String, ProbeError> {
            self.grastate
                .get(replica_id)
                .cloned()
                .ok_or_else(|| ProbeError::Failed {
                    replica: replica_id.to_string(),
                    message: "no such file".to_string(),
                })
        }

        async fn derive_replica_state_via_log_scan(
            &self,
            replica_id: &str,
        ) -> Result<String, ProbeError> {
            self.scanned.lock().unwrap().push(replica_id.to_string());
            self.logs
                .get(replica_id)
                .cloned()
                .ok_or_else(|| ProbeError::Timeout {
                    replica: replica_id.to_string(),
                    seconds: 1,
                })
        }
    }

    fn collector(source: FakeSource) -> (ReplicaStateCollector, Arc<FakeSource>) {
        let source = Arc::new(source);
        (ReplicaStateCollector::new(source.clone()), source)
    }

    #[tokio::test]
    async fn test_direct_read_skips_log_scan() {
        let mut source = FakeSource::default();
        source.grastate.insert(
            "pvc-0".into(),
            format!("uuid: {UUID}\nseqno: 12\nsafe_to_bootstrap: 0\n"),
        );
        let (collector, source) = collector(source);

        let record = collector.collect("pvc-0").await;
        assert_eq!(record.sequence_number, 12);
        assert!(!record.recovered);
        assert!(source.scanned.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_seqno_is_recovered_from_log() {
        let mut source = FakeSource::default();
        source
            .grastate
            .insert("pvc-1".into(), format!("uuid: {UUID}\nseqno: -1\n"));
        source.logs.insert(
            "pvc-1".into(),
            format!("[Note] WSREP: Recovered position: {UUID}:77\n"),
        );
        let (collector, _) = collector(source);

        let record = collector.collect("pvc-1").await;
        assert_eq!(record.sequence_number, 77);
        assert_eq!(record.cluster_uuid, UUID);
        assert!(record.recovered);
    }

    #[tokio::test]
    async fn test_unreadable_state_falls_back_to_log_scan() {
        let mut source = FakeSource::default();
        source.logs.insert(
            "pvc-2".into(),
            format!("WSREP: Recovered position: {UUID}:5\n"),
        );
        let (collector, source) = collector(source);

        let record = collector.collect("pvc-2").await;
        assert_eq!(record.sequence_number, 5);
        assert_eq!(*source.scanned.lock().unwrap(), vec!["pvc-2".to_string()]);
    }

    #[tokio::test]
    async fn test_unparsable_log_degrades_to_unknown() {
        let mut source = FakeSource::default();
        source.grastate.insert("pvc-3".into(), "garbage".into());
        source.logs.insert("pvc-3".into(), "nothing useful".into());
        let (collector, _) = collector(source);

        let record = collector.collect("pvc-3").await;
        assert_eq!(record.sequence_number, UNKNOWN_SEQNO);
        assert_eq!(record.cluster_uuid, ZERO_UUID);
        assert!(!record.safe_to_bootstrap);
    }

    #[tokio::test]
    async fn test_collect_all_preserves_order_and_never_aborts() {
        let mut source = FakeSource::default();
        source
            .grastate
            .insert("pvc-0".into(), format!("uuid: {UUID}\nseqno: 3\n"));
        source
            .grastate
            .insert("pvc-2".into(), format!("uuid: {UUID}\nseqno: 9\n"));
        let (collector, _) = collector(source);

        let ids: Vec<String> = ["pvc-0", "pvc-1", "pvc-2"].map(String::from).to_vec();
        let records = collector.collect_all(&ids).await;
        let got: Vec<_> = records.iter().map(|r| r.replica_id.as_str()).collect();
        assert_eq!(got, vec!["pvc-0", "pvc-1", "pvc-2"]);
        assert_eq!(records[1].sequence_number, UNKNOWN_SEQNO);
    }
}
