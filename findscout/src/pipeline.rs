//! Wires the walker to the dispatch stage and hands the result streams to a reporter.
use crossbeam_channel::{bounded, unbounded, Receiver, Select};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fs;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info};

use crate::config::{CompiledConfig, SearchConfig};
use crate::dispatch::{spawn_dispatch, FilteredSenders, RawEntries};
use crate::errors::{SearchError, SearchResult};
use crate::results::{Entry, MatchLine, Reporter, SearchOutput};
use crate::search::ScanContext;
use crate::sync::{HaltFlag, PermitPool, WorkCounter};
use crate::walker::{spawn_walker, EntrySenders, WalkContext};

/// A configured search that can be started one or more times.
///
/// Each pipeline owns its thread pool and permit pool; nothing is shared
/// between pipelines, so several can run in one process.
#[derive(Debug)]
pub struct Pipeline {
    config: Arc<CompiledConfig>,
    pool: Arc<ThreadPool>,
    permits: Arc<PermitPool>,
}

impl Pipeline {
    /// Validates and compiles `config`. Fails on an invalid pattern or setting.
    pub fn new(config: &SearchConfig) -> SearchResult<Self> {
        Self::from_compiled(config.compile()?)
    }

    pub fn from_compiled(config: CompiledConfig) -> SearchResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.thread_count.get())
            .thread_name(|i| format!("findscout-worker-{}", i))
            .build()
            .map_err(|e| SearchError::config_error(format!("cannot start thread pool: {}", e)))?;

        Ok(Self {
            permits: Arc::new(PermitPool::new(config.max_open_files)),
            pool: Arc::new(pool),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &CompiledConfig {
        &self.config
    }

    /// The pool bounding files open for content scanning
    pub fn permits(&self) -> &PermitPool {
        &self.permits
    }

    /// Starts a run and returns its result streams.
    ///
    /// An unreadable root fails here, before any stream exists.
    pub fn start(&self) -> SearchResult<SearchStreams> {
        let root = self.config.root_path.clone();
        info!(
            "Starting search for {:?} under {}",
            self.config.pattern.as_str(),
            root.display()
        );
        fs::read_dir(&root).map_err(|e| SearchError::directory_unreadable(&root, e))?;

        let capacity = self.config.channel_capacity;
        let (raw_dir_tx, raw_dir_rx) = bounded(capacity);
        let (raw_file_tx, raw_file_rx) = bounded(capacity);
        let (raw_link_tx, raw_link_rx) = bounded(capacity);
        let (dir_tx, dir_rx) = bounded(capacity);
        let (file_tx, file_rx) = bounded(capacity);
        let (link_tx, link_rx) = bounded(capacity);
        let (match_tx, match_rx) = bounded(capacity);
        let (error_tx, error_rx) = unbounded();
        let halt = HaltFlag::new();

        // The walker starts first: dispatch only ever attaches to streams that will close
        let walk_ctx = Arc::new(WalkContext {
            config: Arc::clone(&self.config),
            pool: Arc::clone(&self.pool),
            outstanding: Arc::new(WorkCounter::new(0)),
            errors: error_tx.clone(),
            halt: halt.clone(),
        });
        let walker = spawn_walker(
            root,
            walk_ctx,
            EntrySenders {
                dirs: raw_dir_tx,
                files: raw_file_tx,
                symlinks: raw_link_tx,
            },
        )?;

        let scan = ScanContext {
            config: Arc::clone(&self.config),
            permits: Arc::clone(&self.permits),
            matches: match_tx,
            errors: error_tx,
            halt,
        };
        let mut workers = spawn_dispatch(
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
            Arc::clone(&self.pool),
        )?;
        workers.push(walker);

        Ok(SearchStreams {
            dirs: dir_rx,
            files: file_rx,
            symlinks: link_rx,
            matches: match_rx,
            errors: error_rx,
            workers,
        })
    }
}

/// The output of a running search.
///
/// Every stream is closed by its producers once the run is complete. A consumer
/// must read all of them concurrently (as [`SearchStreams::drain`] does), since
/// the entry and match streams are bounded.
#[derive(Debug)]
pub struct SearchStreams {
    pub dirs: Receiver<Entry>,
    pub files: Receiver<Entry>,
    pub symlinks: Receiver<Entry>,
    pub matches: Receiver<MatchLine>,
    pub errors: Receiver<SearchError>,
    workers: Vec<JoinHandle<()>>,
}

impl SearchStreams {
    /// Feeds every record to `reporter` in arrival order until all streams close.
    pub fn drain<R: Reporter + ?Sized>(self, reporter: &mut R) {
        let SearchStreams {
            dirs,
            files,
            symlinks,
            matches,
            errors,
            workers,
        } = self;

        let mut select = Select::new();
        let dir_op = select.recv(&dirs);
        let file_op = select.recv(&files);
        let link_op = select.recv(&symlinks);
        let match_op = select.recv(&matches);
        let error_op = select.recv(&errors);

        let mut open = 5;
        while open > 0 {
            let op = select.select();
            let index = op.index();
            let received = if index == dir_op {
                op.recv(&dirs).map(|e| reporter.on_entry(e))
            } else if index == file_op {
                op.recv(&files).map(|e| reporter.on_entry(e))
            } else if index == link_op {
                op.recv(&symlinks).map(|e| reporter.on_entry(e))
            } else if index == match_op {
                op.recv(&matches).map(|m| reporter.on_match(m))
            } else {
                debug_assert_eq!(index, error_op);
                op.recv(&errors).map(|e| reporter.on_error(e))
            };

            if received.is_err() {
                select.remove(index);
                open -= 1;
            }
        }

        for worker in workers {
            if worker.join().is_err() {
                error!("A pipeline worker thread panicked");
            }
        }
    }

    /// Drains the run into a [`SearchOutput`]. Fatal errors stay in
    /// `errors`; [`find`] is the form that turns them into an `Err`.
    pub fn collect(self) -> SearchOutput {
        let mut output = SearchOutput::new();
        self.drain(&mut output);
        output
    }
}

/// Runs a whole search and gathers its results.
///
/// A run stopped by a fatal error yields that error; records gathered before
/// the halt are discarded.
pub fn find(config: &SearchConfig) -> SearchResult<SearchOutput> {
    let mut output = Pipeline::new(config)?.start()?.collect();
    if let Some(err) = output.take_fatal_error() {
        error!("Search aborted: {}", err);
        return Err(err);
    }

    let summary = output.summary();
    info!(
        "Search complete. Found {} dirs, {} files, {} symlinks, {} matching lines in {} files",
        summary.dirs,
        summary.files,
        summary.symlinks,
        summary.match_lines,
        summary.files_with_matches
    );
    Ok(output)
}
