//! Events command implementation.

use hubsync_store::{decode_frames, AccessEvent, ManagerId};
use std::path::Path;

/// Runs the events command.
pub fn run(
    journal: &Path,
    manager: Option<u64>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !journal.exists() {
        return Err(format!("journal not found at {}", journal.display()).into());
    }

    let events = read_events(journal, manager.map(ManagerId::new))?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        _ => {
            print_text_output(&events);
        }
    }

    Ok(())
}

/// Reads a journal and returns its events in commit order.
///
/// The file is only read: it is neither locked nor truncated, so this works
/// next to a running server. A torn tail is reported and skipped.
pub fn read_events(
    path: &Path,
    manager: Option<ManagerId>,
) -> Result<Vec<AccessEvent>, Box<dyn std::error::Error>> {
    let image = std::fs::read(path)?;
    let decoded = decode_frames(&image)?;
    if decoded.valid_len < image.len() as u64 {
        tracing::warn!(
            path = %path.display(),
            valid_len = decoded.valid_len,
            len = image.len(),
            "journal ends in a torn frame; showing complete frames only"
        );
    }

    let events = decoded
        .entries
        .into_iter()
        .flat_map(|entry| entry.events)
        .filter(|event| manager.map_or(true, |manager| event.manager_id == manager))
        .collect();
    Ok(events)
}

fn print_text_output(events: &[AccessEvent]) {
    println!("Access events ({} total)", events.len());
    println!("================");
    println!();

    for event in events {
        print!(
            "[{}] {} {} {} code={}",
            event.id,
            event.at.to_rfc3339(),
            event.manager_id,
            event.access_point_id,
            event.code
        );
        match event.access_user_id {
            Some(user) => print!(" {} {}", event.access, user),
            None => print!(" {}", event.access),
        }
        println!();
    }
}
