//! Compact command implementation.

use super::{format_size, open_store};
use std::path::Path;

/// Compaction statistics.
#[derive(Debug, PartialEq, Eq)]
pub struct CompactStats {
    /// Records before compaction.
    pub records_before: u64,
    /// Bytes before compaction.
    pub bytes_before: u64,
    /// Bytes after compaction.
    pub bytes_after: u64,
    /// Whether the log was rewritten.
    pub performed: bool,
}

/// Compacts the store at `path`, or only measures it when `dry_run` is set.
///
/// A log that is already a single record is left alone.
pub fn compact(path: &Path, dry_run: bool) -> Result<CompactStats, Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let stats = store.stats();
    let bytes_after = store.compacted_size()?;
    let needed = stats.records > 1 && bytes_after < stats.log_bytes;

    if dry_run || !needed {
        return Ok(CompactStats {
            records_before: stats.records,
            bytes_before: stats.log_bytes,
            bytes_after: if needed { bytes_after } else { stats.log_bytes },
            performed: false,
        });
    }

    let result = store.compact()?;
    Ok(CompactStats {
        records_before: result.records_before,
        bytes_before: result.bytes_before,
        bytes_after: result.bytes_after,
        performed: true,
    })
}

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Compacting store at {:?}", path);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let stats = compact(path, dry_run)?;
    let saved = stats.bytes_before.saturating_sub(stats.bytes_after);

    println!("Compaction Analysis:");
    println!("  Records:     {}", stats.records_before);
    println!("  Size before: {}", format_size(stats.bytes_before));
    println!("  Size after:  {}", format_size(stats.bytes_after));
    println!(
        "  Space saved: {} ({:.1}%)",
        format_size(saved),
        if stats.bytes_before > 0 {
            saved as f64 / stats.bytes_before as f64 * 100.0
        } else {
            0.0
        }
    );

    if stats.performed {
        println!();
        println!("✓ Compaction complete");
    } else if !dry_run {
        println!();
        println!("No compaction needed - store is already compact");
    }
    Ok(())
}
