//! Name filtering and content-scan fan-out.
//!
//! Each raw category stream has its own consumer thread so a backlog of file
//! scans never delays directory or symlink results. The match stream is closed
//! only after the raw file stream has ended and every scan it started is done.
use crossbeam_channel::{Receiver, Sender};
use rayon::ThreadPool;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

use crate::config::CompiledConfig;
use crate::errors::SearchResult;
use crate::results::Entry;
use crate::search::{scan_file, ScanContext};
use crate::sync::WorkCounter;

/// Consumer side of the walker's raw entry streams
#[derive(Debug)]
pub struct RawEntries {
    pub dirs: Receiver<Entry>,
    pub files: Receiver<Entry>,
    pub symlinks: Receiver<Entry>,
}

/// Producer side of the filtered entry streams
#[derive(Debug)]
pub struct FilteredSenders {
    pub dirs: Sender<Entry>,
    pub files: Sender<Entry>,
    pub symlinks: Sender<Entry>,
}

/// Whether a raw entry is reported downstream
pub fn name_matches(entry: &Entry, config: &CompiledConfig) -> bool {
    config.pattern.is_match(&entry.base_name())
}

/// Starts the three consumer threads.
///
/// `scan` carries the match sender; it is dropped once all scans have finished.
pub fn spawn_dispatch(
    raw: RawEntries,
    out: FilteredSenders,
    scan: ScanContext,
    pool: Arc<ThreadPool>,
) -> SearchResult<Vec<JoinHandle<()>>> {
    let config = Arc::clone(&scan.config);
    let RawEntries {
        dirs,
        files,
        symlinks,
    } = raw;
    let FilteredSenders {
        dirs: dirs_out,
        files: files_out,
        symlinks: symlinks_out,
    } = out;

    let mut handles = Vec::with_capacity(3);

    let dir_config = Arc::clone(&config);
    let enabled = config.scope.dirs;
    handles.push(spawn_named("findscout-dirs", move || {
        forward_matching(&dirs, &dirs_out, enabled, &dir_config)
    })?);

    let link_config = Arc::clone(&config);
    let enabled = config.scope.symlinks;
    handles.push(spawn_named("findscout-links", move || {
        forward_matching(&symlinks, &symlinks_out, enabled, &link_config)
    })?);

    handles.push(spawn_named("findscout-files", move || {
        dispatch_files(&files, &files_out, scan, &pool)
    })?);

    Ok(handles)
}

fn spawn_named<F>(name: &str, body: F) -> SearchResult<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    Ok(thread::Builder::new().name(name.to_string()).spawn(body)?)
}

/// Drains `input`, sending entries whose name matches. Keeps draining when
/// the category is disabled or the reporter is gone so the walker never blocks.
fn forward_matching(
    input: &Receiver<Entry>,
    output: &Sender<Entry>,
    enabled: bool,
    config: &CompiledConfig,
) {
    for entry in input.iter() {
        if enabled && name_matches(&entry, config) {
            trace!("Reporting {}", entry.path.display());
            let _ = output.send(entry);
        }
    }
}

fn dispatch_files(
    input: &Receiver<Entry>,
    output: &Sender<Entry>,
    scan: ScanContext,
    pool: &ThreadPool,
) {
    let scope = scan.config.scope;
    let scans = Arc::new(WorkCounter::new(0));

    for entry in input.iter() {
        // Name and content filters are independent of each other
        if scope.content {
            let pending = scans.track();
            let ctx = scan.clone();
            let path = entry.path.clone();
            pool.spawn(move || {
                scan_file(&path, &ctx);
                drop(ctx);
                drop(pending);
            });
        }

        if scope.files && name_matches(&entry, &scan.config) {
            trace!("Reporting {}", entry.path.display());
            let _ = output.send(entry);
        }
    }

    debug!(
        "File stream ended, waiting for {} content scans",
        scans.outstanding()
    );
    scans.wait_idle();
    debug!("Content scans finished, closing match stream");
    drop(scan);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::results::{EntryKind, MatchLine};
    use crate::sync::{HaltFlag, PermitPool};
    use crossbeam_channel::unbounded;
    use rayon::ThreadPoolBuilder;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    struct Harness {
        raw_dirs: Sender<Entry>,
        raw_files: Sender<Entry>,
        raw_links: Sender<Entry>,
        dirs: Receiver<Entry>,
        files: Receiver<Entry>,
        symlinks: Receiver<Entry>,
        matches: Receiver<MatchLine>,
        handles: Vec<JoinHandle<()>>,
    }

    fn harness(config: SearchConfig) -> Harness {
        let compiled = Arc::new(config.compile().unwrap());
        let (raw_dirs, raw_dir_rx) = unbounded();
        let (raw_files, raw_file_rx) = unbounded();
        let (raw_links, raw_link_rx) = unbounded();
        let (dir_tx, dirs) = unbounded();
        let (file_tx, files) = unbounded();
        let (link_tx, symlinks) = unbounded();
        let (match_tx, matches) = unbounded();
        let (error_tx, _errors) = unbounded();

        let scan = ScanContext {
            permits: Arc::new(PermitPool::new(compiled.max_open_files)),
            config: compiled,
            matches: match_tx,
            errors: error_tx,
            halt: HaltFlag::new(),
        };
        let pool = Arc::new(ThreadPoolBuilder::new().num_threads(2).build().unwrap());
        let handles = spawn_dispatch(
            RawEntries {
                dirs: raw_dir_rx,
                files: raw_file_rx,
                symlinks: raw_link_rx,
            },
            FilteredSenders {
                dirs: dir_tx,
                files: file_tx,
                symlinks: link_tx,
            },
            scan,
            pool,
        )
        .unwrap();

        Harness {
            raw_dirs,
            raw_files,
            raw_links,
            dirs,
            files,
            symlinks,
            matches,
            handles,
        }
    }

    #[test]
    fn test_name_filter_per_category() {
        let mut config = SearchConfig::new("^src", ".");
        config.find_symlinks = false;
        let h = harness(config);

        h.raw_dirs
            .send(Entry::new(PathBuf::from("a/src"), EntryKind::Directory))
            .unwrap();
        h.raw_dirs
            .send(Entry::new(PathBuf::from("src/a"), EntryKind::Directory))
            .unwrap();
        h.raw_files
            .send(Entry::new(PathBuf::from("x/src.rs"), EntryKind::File))
            .unwrap();
        h.raw_links
            .send(Entry::new(PathBuf::from("x/src-link"), EntryKind::Symlink))
            .unwrap();
        drop((h.raw_dirs, h.raw_files, h.raw_links));

        let dirs: Vec<PathBuf> = h.dirs.iter().map(|e| e.path).collect();
        let files: Vec<PathBuf> = h.files.iter().map(|e| e.path).collect();
        assert_eq!(dirs, vec![PathBuf::from("a/src")]);
        assert_eq!(files, vec![PathBuf::from("x/src.rs")]);
        assert_eq!(h.symlinks.iter().count(), 0);
        assert_eq!(h.matches.iter().count(), 0);
        for handle in h.handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_content_scan_ignores_name_filter() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        fs::write(&path, "one\nneedle\n").unwrap();

        let mut config = SearchConfig::new("needle", dir.path());
        config.grep = true;
        let h = harness(config);

        h.raw_files
            .send(Entry::new(path.clone(), EntryKind::File))
            .unwrap();
        drop((h.raw_dirs, h.raw_files, h.raw_links));

        assert_eq!(h.files.iter().count(), 0);
        let found: Vec<MatchLine> = h.matches.iter().collect();
        assert_eq!(found, vec![MatchLine::line(path, 2, "needle".to_string())]);
        for handle in h.handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_match_stream_waits_for_all_scans() {
        let dir = tempdir().unwrap();
        let mut config = SearchConfig::new("hit", dir.path());
        config.grep = true;
        config.max_open_files = 2;
        let h = harness(config);

        for i in 0..40 {
            let path = dir.path().join(format!("f{}.txt", i));
            fs::write(&path, "hit\nmiss\nhit\n").unwrap();
            h.raw_files.send(Entry::new(path, EntryKind::File)).unwrap();
        }
        drop((h.raw_dirs, h.raw_files, h.raw_links));

        // The stream must not close before the last scan has reported
        assert_eq!(h.matches.iter().count(), 80);
        for handle in h.handles {
            handle.join().unwrap();
        }
    }
}
