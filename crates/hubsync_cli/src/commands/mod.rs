//! CLI command implementations.

pub mod events;
pub mod serve;
pub mod snapshot;

use hubsync_store::{AccessStore, FileJournal, Records, Seed};
use std::path::Path;
use std::sync::Arc;

/// Loads the seed records and opens the store over them.
pub fn open_store(
    seed: &Path,
    journal: Option<&Path>,
) -> Result<Arc<AccessStore>, Box<dyn std::error::Error>> {
    let seed: Seed = serde_json::from_slice(&std::fs::read(seed)?)?;
    let records = Records::from_seed(seed)?;

    let store = match journal {
        Some(path) => {
            AccessStore::open(Box::new(FileJournal::open_with_create_dirs(path)?), records)?
        }
        None => AccessStore::in_memory(records),
    };
    Ok(Arc::new(store))
}
