//! Galera replica state records.
//!
//! A replica's durable position lives in `grastate.dat` on its data volume:
//!
//! ```text
//! # GALERA saved state
//! version: 2.1
//! uuid:    9acf4d34-acdb-11e6-bcc3-d3e36276629f
//! seqno:   -1
//! safe_to_bootstrap: 0
//! ```
//!
//! When `seqno` is `-1` the position has to be recovered by running
//! `mysqld --wsrep-recover`, which logs a line of the form
//! `WSREP: Recovered position: <uuid>:<seqno>`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Cluster UUID of a replica that never joined (or lost track of) a cluster.
pub const ZERO_UUID: &str = "00000000-0000-0000-0000-000000000000";

/// Sequence number meaning "unknown, must recover".
pub const UNKNOWN_SEQNO: i64 = -1;

static UUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid pattern is valid")
});

static RECOVERED_POSITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Recovered position:\s*([0-9a-fA-F-]{36}):(-?\d+)")
        .expect("recovered position pattern is valid")
});

/// Failure to interpret replica state output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing field {0:?}")]
    MissingField(&'static str),

    #[error("invalid value {value:?} for field {field:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("no recovered position found in log")]
    NoRecoveredPosition,
}

/// Persisted replication state of one replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicaStateRecord {
    /// PVC name (or ordinal) identifying the replica.
    pub replica_id: String,
    pub cluster_uuid: String,
    pub sequence_number: i64,
    pub safe_to_bootstrap: bool,
    /// Derived from a recovery log scan instead of read directly.
    pub recovered: bool,
}

impl ReplicaStateRecord {
    /// The sentinel "unknown" state.
    pub fn unknown(replica_id: impl Into<String>) -> Self {
        Self {
            replica_id: replica_id.into(),
            cluster_uuid: ZERO_UUID.to_string(),
            sequence_number: UNKNOWN_SEQNO,
            safe_to_bootstrap: false,
            recovered: false,
        }
    }

    pub fn has_known_position(&self) -> bool {
        self.sequence_number >= 0
    }

    pub fn has_known_uuid(&self) -> bool {
        self.cluster_uuid != ZERO_UUID
    }

    /// Parse the contents of `grastate.dat`.
    pub fn parse_grastate(replica_id: impl Into<String>, raw: &str) -> Result<Self, ParseError> {
        let mut uuid = None;
        let mut seqno = None;
        let mut safe_to_bootstrap = false;

        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "uuid" => uuid = Some(parse_uuid(value)?),
                "seqno" => seqno = Some(parse_seqno(value)?),
                "safe_to_bootstrap" => {
                    safe_to_bootstrap = match value {
                        "0" => false,
                        "1" => true,
                        other => {
                            return Err(ParseError::InvalidField {
                                field: "safe_to_bootstrap",
                                value: other.to_string(),
                            })
                        }
                    };
                }
                _ => {}
            }
        }

        Ok(Self {
            replica_id: replica_id.into(),
            cluster_uuid: uuid.ok_or(ParseError::MissingField("uuid"))?,
            sequence_number: seqno.ok_or(ParseError::MissingField("seqno"))?,
            safe_to_bootstrap,
            recovered: false,
        })
    }

    /// Parse the output of `mysqld --wsrep-recover`.
    ///
    /// The last reported position wins. Recovered records are never marked
    /// safe to bootstrap.
    pub fn parse_recovery_log(replica_id: impl Into<String>, log: &str) -> Result<Self, ParseError> {
        let captures = RECOVERED_POSITION
            .captures_iter(log)
            .last()
            .ok_or(ParseError::NoRecoveredPosition)?;

        Ok(Self {
            replica_id: replica_id.into(),
            cluster_uuid: parse_uuid(&captures[1])?,
            sequence_number: parse_seqno(&captures[2])?,
            safe_to_bootstrap: false,
            recovered: true,
        })
    }
}

impl fmt::Display for ReplicaStateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "uuid={} seqno={} safe_to_bootstrap={} recovered={}",
            self.cluster_uuid, self.sequence_number, self.safe_to_bootstrap, self.recovered
        )
    }
}

fn parse_uuid(value: &str) -> Result<String, ParseError> {
    if UUID_PATTERN.is_match(value) {
        Ok(value.to_lowercase())
    } else {
        Err(ParseError::InvalidField {
            field: "uuid",
            value: value.to_string(),
        })
    }
}

fn parse_seqno(value: &str) -> Result<i64, ParseError> {
    value
        .parse::<i64>()
        .ok()
        .filter(|n| *n >= UNKNOWN_SEQNO)
        .ok_or_else(|| ParseError::InvalidField {
            field: "seqno",
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "9acf4d34-acdb-11e6-bcc3-d3e36276629f";

    #[test]
    fn test_parse_grastate() {
        let raw = format!(
            "# GALERA saved state\nversion: 2.1\nuuid:    {UUID}\nseqno:   1234\nsafe_to_bootstrap: 1\n"
        );
        let record = ReplicaStateRecord::parse_grastate("data-db-0", &raw).unwrap();
        assert_eq!(record.cluster_uuid, UUID);
        assert_eq!(record.sequence_number, 1234);
        assert!(record.safe_to_bootstrap);
        assert!(!record.recovered);
    }

    #[test]
    fn test_parse_grastate_without_safe_to_bootstrap() {
        let raw = format!("version: 2.1\nuuid: {UUID}\nseqno: -1\n");
        let record = ReplicaStateRecord::parse_grastate("data-db-0", &raw).unwrap();
        assert_eq!(record.sequence_number, UNKNOWN_SEQNO);
        assert!(!record.safe_to_bootstrap);
    }

    #[test]
    fn test_parse_grastate_rejects_garbage() {
        assert_eq!(
            ReplicaStateRecord::parse_grastate("x", "version: 2.1\nseqno: 3\n"),
            Err(ParseError::MissingField("uuid"))
        );
        assert!(matches!(
            ReplicaStateRecord::parse_grastate("x", &format!("uuid: {UUID}\nseqno: -7\n")),
            Err(ParseError::InvalidField { field: "seqno", .. })
        ));
        assert!(matches!(
            ReplicaStateRecord::parse_grastate("x", "uuid: not-a-uuid\nseqno: 1\n"),
            Err(ParseError::InvalidField { field: "uuid", .. })
        ));
        assert!(matches!(
            ReplicaStateRecord::parse_grastate(
                "x",
                &format!("uuid: {UUID}\nseqno: 1\nsafe_to_bootstrap: yes\n")
            ),
            Err(ParseError::InvalidField { field: "safe_to_bootstrap", .. })
        ));
    }

    #[test]
    fn test_parse_recovery_log_takes_last_position() {
        let log = format!(
            "2024-01-01  0 [Note] WSREP: Recovered position: {ZERO_UUID}:-1\n\
             2024-01-01  0 [Note] InnoDB: Buffer pool(s) load completed\n\
             2024-01-01  0 [Note] WSREP: Recovered position: {UUID}:987\n"
        );
        let record = ReplicaStateRecord::parse_recovery_log("data-db-2", &log).unwrap();
        assert_eq!(record.cluster_uuid, UUID);
        assert_eq!(record.sequence_number, 987);
        assert!(record.recovered);
        assert!(!record.safe_to_bootstrap);
    }

    #[test]
    fn test_parse_recovery_log_without_position() {
        assert_eq!(
            ReplicaStateRecord::parse_recovery_log("x", "mysqld: ready for connections"),
            Err(ParseError::NoRecoveredPosition)
        );
    }

    #[test]
    fn test_unknown_record() {
        let record = ReplicaStateRecord::unknown("data-db-1");
        assert!(!record.has_known_position());
        assert!(!record.has_known_uuid());
        assert!(!record.safe_to_bootstrap);
    }
}
