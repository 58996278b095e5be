use anyhow::Result;

use crate::classify::known_partitions;
use crate::config::Config;

/// `vrank partitions`: known partition ids, their category, and whether the
/// scheduler refreshes them.
pub fn list_partitions(config: &Config) -> Result<()> {
    let scheduled = &config.scheduler.partitions;

    println!("{:<10} {:<16} SCHEDULED", "PARTITION", "CATEGORY");
    for (id, category) in known_partitions() {
        println!(
            "{:<10} {:<16} {}",
            id,
            category.label(),
            scheduled.contains(id)
        );
    }

    // Scheduled ids outside the table still refresh; they classify by keyword.
    for id in scheduled {
        if !known_partitions().iter().any(|(k, _)| k == id) {
            println!("{:<10} {:<16} {}", id, "(keywords)", true);
        }
    }

    Ok(())
}
