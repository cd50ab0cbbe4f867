//! Snapshot command implementation.

use super::open_store;
use chrono::{DateTime, Utc};
use hubsync_protocol::{Envelope, HeartbeatResponse};
use hubsync_server::build_snapshot;
use hubsync_store::{AccessStore, ManagerId};
use std::path::Path;

/// Runs the snapshot command.
pub fn run(
    seed: &Path,
    journal: Option<&Path>,
    manager: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(seed, journal)?;
    let response = snapshot_of(&store, ManagerId::new(manager), Utc::now())?;

    let json: serde_json::Value = serde_json::from_slice(&response.encode()?)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// Builds the heartbeat response a manager would receive at `now`.
pub fn snapshot_of(
    store: &AccessStore,
    manager: ManagerId,
    now: DateTime<Utc>,
) -> Result<HeartbeatResponse, Box<dyn std::error::Error>> {
    let view = store.read();
    let record = view
        .records()
        .manager(manager)
        .ok_or_else(|| format!("{manager} not found"))?;
    let snapshot = build_snapshot(&view, record, now);
    Ok(HeartbeatResponse::new(Envelope::Manager, snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubsync_protocol::epoch;
    use hubsync_testkit::prelude::*;

    #[test]
    fn snapshot_from_seed_file() {
        let dir = tempfile::tempdir().unwrap();
        let seed = write_seed(dir.path(), &standard_seed());
        let store = open_store(&seed, None).unwrap();

        let response = snapshot_of(&store, MANAGER, at(0)).unwrap();

        assert_eq!(response.snapshot.cloud_last_access_event_at, epoch());
        let users: Vec<_> = response.snapshot.access_users.iter().map(|u| u.id).collect();
        assert_eq!(users, [ADA, GRACE]);
    }

    #[test]
    fn unknown_manager_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let seed = write_seed(dir.path(), &standard_seed());
        let store = open_store(&seed, None).unwrap();

        assert!(snapshot_of(&store, ManagerId::new(404), at(0)).is_err());
    }

    #[test]
    fn journal_is_created_and_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let seed = write_seed(dir.path(), &standard_seed());
        let journal = dir.path().join("data").join("events.journal");

        drop(open_store(&seed, Some(&journal)).unwrap());

        assert!(journal.exists());
        assert!(open_store(&seed, Some(&journal)).is_ok());
    }
}
