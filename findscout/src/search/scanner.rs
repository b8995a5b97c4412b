use crossbeam_channel::Sender;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::{trace, warn};

use crate::config::CompiledConfig;
use crate::errors::{SearchError, SearchResult};
use crate::filters::{is_binary, line_matches};
use crate::results::MatchLine;
use crate::sync::{HaltFlag, PermitPool};

/// Everything a content scan needs, shared by all scan tasks of one run
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub config: Arc<CompiledConfig>,
    pub permits: Arc<PermitPool>,
    pub matches: Sender<MatchLine>,
    pub errors: Sender<SearchError>,
    pub halt: HaltFlag,
}

/// How a single file scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The file was searched; this many match lines were sent
    Searched(usize),
    /// Binary file and binary search is disabled
    SkippedBinary,
    /// Nothing was read: the file is empty, the run halted, or the consumer went away
    Skipped,
}

/// Searches one file and sends its match lines.
///
/// Open, stat and map failures are reported on the error stream and end the scan
/// without matches; they never affect other scans.
pub fn scan_file(path: &Path, ctx: &ScanContext) -> ScanOutcome {
    match search_file(path, ctx) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!("Skipping {}: {}", path.display(), err);
            let _ = ctx.errors.send(err);
            ScanOutcome::Skipped
        }
    }
}

fn search_file(path: &Path, ctx: &ScanContext) -> SearchResult<ScanOutcome> {
    if ctx.halt.is_halted() {
        return Ok(ScanOutcome::Skipped);
    }

    // Held until the map and the file are dropped, which happens first
    let _permit = ctx.permits.acquire();
    trace!("Scanning file: {}", path.display());

    let file = File::open(path).map_err(|e| SearchError::from_file_io(path, e))?;
    let size = file
        .metadata()
        .map_err(|e| SearchError::from_file_io(path, e))?
        .len();
    if size == 0 {
        return Ok(ScanOutcome::Skipped);
    }

    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| SearchError::from_file_io(path, e))?;
    Ok(scan_content(path, &mmap, ctx))
}

/// Runs the line search over an in-memory view of a file.
pub(crate) fn scan_content(path: &Path, content: &[u8], ctx: &ScanContext) -> ScanOutcome {
    let binary = is_binary(content);
    if binary && !ctx.config.scope.binary {
        trace!("Skipping binary file: {}", path.display());
        return ScanOutcome::SkippedBinary;
    }

    let mut sent = 0;
    for (index, line) in split_lines(content).enumerate() {
        if !line_matches(line, &ctx.config) {
            continue;
        }

        let record = if binary {
            MatchLine::binary(path.to_path_buf())
        } else {
            MatchLine::line(
                path.to_path_buf(),
                index + 1,
                String::from_utf8_lossy(line).into_owned(),
            )
        };
        if ctx.matches.send(record).is_err() {
            return ScanOutcome::Skipped;
        }
        sent += 1;

        // One hit is enough for a binary file
        if binary {
            break;
        }
    }
    ScanOutcome::Searched(sent)
}

/// Splits on '\n'. An unterminated last line is still a line; a trailing '\r' is dropped.
fn split_lines(content: &[u8]) -> impl Iterator<Item = &[u8]> {
    let body = content.strip_suffix(b"\n").unwrap_or(content);
    body.split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
}
