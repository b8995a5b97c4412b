//! Records produced by a search run and the consumer-side types that gather them.
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::SearchError;

/// Text reported in place of a line when a binary file matches.
pub const BINARY_MATCH_MARKER: &str = "binary file matches";

/// Category of a filesystem object found during traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
}

impl EntryKind {
    /// Classifies a file type as reported by `symlink_metadata` / `DirEntry::file_type`.
    /// Devices, fifos and sockets have no category.
    pub fn from_file_type(file_type: std::fs::FileType) -> Option<Self> {
        if file_type.is_symlink() {
            Some(Self::Symlink)
        } else if file_type.is_dir() {
            Some(Self::Directory)
        } else if file_type.is_file() {
            Some(Self::File)
        } else {
            None
        }
    }

    /// Fixed-width label used by reporters
    pub fn label(self) -> &'static str {
        match self {
            Self::Directory => "Dir ",
            Self::File => "File",
            Self::Symlink => "Link",
        }
    }
}

/// One filesystem object discovered during traversal
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entry {
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl Entry {
    pub fn new(path: PathBuf, kind: EntryKind) -> Self {
        Self { path, kind }
    }

    /// The final path component, lossily decoded
    pub fn base_name(&self) -> std::borrow::Cow<'_, str> {
        base_name(&self.path)
    }
}

/// Returns the final component of `path`, or the whole path when it has none.
pub(crate) fn base_name(path: &Path) -> std::borrow::Cow<'_, str> {
    match path.file_name() {
        Some(name) => name.to_string_lossy(),
        None => path.as_os_str().to_string_lossy(),
    }
}

/// Where in a file a content match was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LineNumber {
    /// 1-based line number
    Line(usize),
    /// The file is binary; the hit is reported for the file as a whole
    WholeFile,
}

impl fmt::Display for LineNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line(n) => write!(f, "{}", n),
            Self::WholeFile => write!(f, "-"),
        }
    }
}

/// One content-search hit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchLine {
    pub path: PathBuf,
    pub line_number: LineNumber,
    /// The matched line without its terminator, or [`BINARY_MATCH_MARKER`]
    pub text: String,
}

impl MatchLine {
    pub fn line(path: PathBuf, line_number: usize, text: String) -> Self {
        Self {
            path,
            line_number: LineNumber::Line(line_number),
            text,
        }
    }

    pub fn binary(path: PathBuf) -> Self {
        Self {
            path,
            line_number: LineNumber::WholeFile,
            text: BINARY_MATCH_MARKER.to_string(),
        }
    }

    pub fn is_binary(&self) -> bool {
        self.line_number == LineNumber::WholeFile
    }
}

/// Consumer of a running search. Called from a single thread, in arrival order.
pub trait Reporter {
    fn on_entry(&mut self, entry: Entry);
    fn on_match(&mut self, line: MatchLine);
    fn on_error(&mut self, error: SearchError);
}

/// Counters over everything a run reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchSummary {
    pub dirs: usize,
    pub files: usize,
    pub symlinks: usize,
    pub match_lines: usize,
    pub files_with_matches: usize,
    pub errors: usize,
}

/// Everything a run reported, gathered into order-independent sets
#[derive(Debug, Default)]
pub struct SearchOutput {
    pub dirs: BTreeSet<PathBuf>,
    pub files: BTreeSet<PathBuf>,
    pub symlinks: BTreeSet<PathBuf>,
    /// Match lines in arrival order
    pub matches: Vec<MatchLine>,
    pub errors: Vec<SearchError>,
}

impl SearchOutput {
    /// Creates a new empty search output
    pub fn new() -> Self {
        Default::default()
    }

    /// Match lines reported for `path`, in arrival order
    pub fn matches_in<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = &'a MatchLine> + 'a {
        self.matches.iter().filter(move |m| m.path == path)
    }

    pub fn has_fatal_error(&self) -> bool {
        self.errors.iter().any(SearchError::is_fatal)
    }

    /// Removes and returns the first fatal error, if the run had one
    pub fn take_fatal_error(&mut self) -> Option<SearchError> {
        let index = self.errors.iter().position(SearchError::is_fatal)?;
        Some(self.errors.remove(index))
    }

    pub fn summary(&self) -> SearchSummary {
        let files_with_matches = self
            .matches
            .iter()
            .map(|m| m.path.as_path())
            .collect::<BTreeSet<_>>()
            .len();

        SearchSummary {
            dirs: self.dirs.len(),
            files: self.files.len(),
            symlinks: self.symlinks.len(),
            match_lines: self.matches.len(),
            files_with_matches,
            errors: self.errors.len(),
        }
    }
}

impl Reporter for SearchOutput {
    fn on_entry(&mut self, entry: Entry) {
        let set = match entry.kind {
            EntryKind::Directory => &mut self.dirs,
            EntryKind::File => &mut self.files,
            EntryKind::Symlink => &mut self.symlinks,
        };
        set.insert(entry.path);
    }

    fn on_match(&mut self, line: MatchLine) {
        self.matches.push(line);
    }

    fn on_error(&mut self, error: SearchError) {
        self.errors.push(error);
    }
}
