//! Concurrent directory expansion.
//!
//! Every directory found is expanded by its own task on the run's thread pool.
//! A [`WorkCounter`] tracks expansions that have been handed to the pool but have
//! not finished listing yet. It starts at one for the root; a task raises it
//! before spawning each child and lowers it once its own listing is done. The
//! supervisor thread waits for the zero transition and then drops the last
//! senders, which closes the three entry streams.
use crossbeam_channel::Sender;
use rayon::ThreadPool;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace, warn};

use crate::config::CompiledConfig;
use crate::errors::{SearchError, SearchResult};
use crate::filters::should_prune;
use crate::results::{base_name, Entry, EntryKind};
use crate::sync::{HaltFlag, WorkCounter, WorkGuard};

/// Producer side of the raw entry streams, one per category
#[derive(Debug, Clone)]
pub struct EntrySenders {
    pub dirs: Sender<Entry>,
    pub files: Sender<Entry>,
    pub symlinks: Sender<Entry>,
}

impl EntrySenders {
    /// Sends `entry` on its category stream. Fails once the consumer is gone.
    fn send(&self, entry: Entry) -> Result<(), Entry> {
        let sender = match entry.kind {
            EntryKind::Directory => &self.dirs,
            EntryKind::File => &self.files,
            EntryKind::Symlink => &self.symlinks,
        };
        sender.send(entry).map_err(|e| e.into_inner())
    }
}

/// State shared by every expansion task of one run
#[derive(Debug)]
pub struct WalkContext {
    pub config: Arc<CompiledConfig>,
    pub pool: Arc<ThreadPool>,
    pub outstanding: Arc<WorkCounter>,
    pub errors: Sender<SearchError>,
    pub halt: HaltFlag,
}

/// One directory waiting to be listed
struct Expansion {
    dir: PathBuf,
    senders: EntrySenders,
    // Declared last so the senders are gone before the counter drops
    _pending: WorkGuard,
}

/// Starts walking `root` and returns the supervisor thread.
///
/// `senders` are released when the outstanding-work counter reaches zero.
pub fn spawn_walker(
    root: PathBuf,
    ctx: Arc<WalkContext>,
    senders: EntrySenders,
) -> SearchResult<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("findscout-walker".to_string())
        .spawn(move || {
            debug!("Walking {}", root.display());
            spawn_expansion(root, &ctx, senders.clone());

            ctx.outstanding.wait_idle();
            debug!("Directory expansion finished, closing entry streams");
            drop(senders);
        })?;
    Ok(handle)
}

fn spawn_expansion(dir: PathBuf, ctx: &Arc<WalkContext>, senders: EntrySenders) {
    let task = Expansion {
        dir,
        senders,
        _pending: ctx.outstanding.track(),
    };
    let task_ctx = Arc::clone(ctx);
    ctx.pool.spawn(move || expand(task, &task_ctx));
}

fn expand(task: Expansion, ctx: &Arc<WalkContext>) {
    if ctx.halt.is_halted() {
        return;
    }

    if let Err(err) = expand_dir(&task.dir, &task.senders, ctx) {
        error!("{}", err);
        ctx.halt.halt();
        let _ = ctx.errors.send(err);
    }
}

/// Lists `dir`, emitting every child that survives the prune filters and
/// spawning an expansion for each subdirectory.
fn expand_dir(dir: &Path, senders: &EntrySenders, ctx: &Arc<WalkContext>) -> SearchResult<()> {
    let listing = fs::read_dir(dir).map_err(|e| SearchError::directory_unreadable(dir, e))?;

    for child in listing {
        let child = child.map_err(|e| SearchError::directory_unreadable(dir, e))?;
        let path = child.path();

        let Some(kind) = classify(&path, child.file_type()) else {
            continue;
        };
        if should_prune(&base_name(&path), &ctx.config) {
            trace!("Pruned: {}", path.display());
            continue;
        }

        trace!("Found {:?}: {}", kind, path.display());
        if senders.send(Entry::new(path.clone(), kind)).is_err() {
            debug!("Entry consumer gone, stopping at {}", dir.display());
            return Ok(());
        }

        if kind == EntryKind::Directory {
            spawn_expansion(path, ctx, senders.clone());
        }
    }
    Ok(())
}

/// Category of a listed child. Special files and children that vanished or
/// cannot be stat'd mid-walk yield `None`.
fn classify(path: &Path, file_type: io::Result<fs::FileType>) -> Option<EntryKind> {
    match file_type {
        Ok(file_type) => {
            let kind = EntryKind::from_file_type(file_type);
            if kind.is_none() {
                trace!("Skipping special file: {}", path.display());
            }
            kind
        }
        Err(err) => {
            warn!("Cannot stat {}: {}", path.display(), err);
            None
        }
    }
}
