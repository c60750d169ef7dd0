//! WAL directory management.
//!
//! Discovers and orders segment files, selects the scan start for a given
//! snapshot, fsyncs directories so renames and file creation survive a
//! crash, and quarantines broken directories for postmortem inspection.
//!
//! Anything in a WAL directory that does not parse as a segment name is
//! ignored with a warning; external tooling (purgers, editors) is allowed
//! to leave droppings.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::WalError;
use crate::segment::parse_segment_name;
use chrono::Local;
use tracing::{info, warn};

/// Suffix of the transient directory used by atomic initialization.
pub(crate) const TMP_DIR_SUFFIX: &str = ".tmp";

// ------------------------------------------------------------------------------------------------
// Discovery
// ------------------------------------------------------------------------------------------------

/// True iff `dir` contains at least one file that parses as a WAL segment.
pub fn exists(dir: impl AsRef<Path>) -> bool {
    matches!(segment_names(dir.as_ref()), Ok(names) if !names.is_empty())
}

/// List the segment basenames in `dir`, sorted.
///
/// Fixed-width hex names make the lexicographic sort numeric. Files that do
/// not parse are skipped with a warning.
pub(crate) fn segment_names(dir: &Path) -> Result<Vec<String>, WalError> {
    let mut names = Vec::new();
    for dirent in fs::read_dir(dir)? {
        let dirent = dirent?;
        let name = dirent.file_name();
        let Some(name) = name.to_str() else {
            warn!(dir = %dir.display(), "ignoring file with non-UTF-8 name");
            continue;
        };
        match parse_segment_name(name) {
            Ok(_) => names.push(name.to_string()),
            Err(_) => {
                warn!(dir = %dir.display(), file = name, "ignoring non-segment file");
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Parse every name into `(seq, first_index)`, preserving order.
pub(crate) fn parse_all(names: &[String]) -> Result<Vec<(u64, u64)>, WalError> {
    names.iter().map(|n| parse_segment_name(n)).collect()
}

/// Locate the scan start for `index`: the position of the last segment
/// whose first covered index is `<= index`. `None` when every segment
/// starts past `index`.
pub(crate) fn search_index(names: &[String], index: u64) -> Result<Option<usize>, WalError> {
    for (i, name) in names.iter().enumerate().rev() {
        let (_, first_index) = parse_segment_name(name)?;
        if first_index <= index {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

/// Verify that the sequence numbers of an ordered slice of segments
/// increase by exactly one — a larger step means a mid-stream segment was
/// deleted out from under the log.
pub(crate) fn is_continuous(parsed: &[(u64, u64)]) -> bool {
    parsed.windows(2).all(|w| w[1].0 == w[0].0 + 1)
}

// ------------------------------------------------------------------------------------------------
// Durability
// ------------------------------------------------------------------------------------------------

/// Fsync a directory so entry creation, deletion, and renames inside it
/// are durable.
pub(crate) fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

// ------------------------------------------------------------------------------------------------
// Quarantine
// ------------------------------------------------------------------------------------------------

/// Move a broken WAL directory aside under
/// `<name>.broken.<YYYYMMDD>.<HHMMSS>.<pid>` and return the new path.
///
/// The renamed directory is left for postmortem inspection; nothing in the
/// crate reads it back.
pub fn quarantine(dir: impl AsRef<Path>) -> Result<PathBuf, WalError> {
    let dir = dir.as_ref();
    let stamp = Local::now().format("%Y%m%d.%H%M%S");
    let pid = std::process::id();
    let mut target = dir.as_os_str().to_os_string();
    target.push(format!(".broken.{stamp}.{pid}"));
    let target = PathBuf::from(target);
    fs::rename(dir, &target)?;
    if let Some(parent) = dir.parent().filter(|p| !p.as_os_str().is_empty()) {
        fsync_dir(parent)?;
    }
    info!(from = %dir.display(), to = %target.display(), "WAL directory quarantined");
    Ok(target)
}

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------
