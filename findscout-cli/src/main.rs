use anyhow::Result;
use clap::{Parser, ValueEnum};
use colored::Colorize;
use findscout::{
    logging, search::PatternMatcher, Entry, EntryKind, MatchLine, Pipeline, Reporter,
    SearchConfig, SearchError, SearchSummary,
};
use std::collections::BTreeSet;
use std::io::IsTerminal;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process;
use tracing::debug;

/// Exit status when the run stopped on a fatal error
const FATAL_EXIT_CODE: i32 = 2;

#[derive(Parser)]
#[command(author, version, about = "Find files by name and grep their contents in parallel", long_about = None)]
struct Cli {
    /// Regular expression matched against names (and lines with --grep)
    pattern: String,

    /// Root directory to search in
    path: Option<PathBuf>,

    /// Also search file contents
    #[arg(short, long, overrides_with = "no_grep")]
    grep: bool,

    /// Do not search file contents, even if a config file enables it
    #[arg(long, overrides_with = "grep")]
    no_grep: bool,

    /// Do not report regular files
    #[arg(long, overrides_with = "files")]
    no_files: bool,

    /// Report regular files, even if a config file disables them
    #[arg(long, overrides_with = "no_files")]
    files: bool,

    /// Do not report directories
    #[arg(long, overrides_with = "dirs")]
    no_dirs: bool,

    /// Report directories, even if a config file disables them
    #[arg(long, overrides_with = "no_dirs")]
    dirs: bool,

    /// Do not report symbolic links
    #[arg(long, overrides_with = "symlinks")]
    no_symlinks: bool,

    /// Report symbolic links, even if a config file disables them
    #[arg(long, overrides_with = "no_symlinks")]
    symlinks: bool,

    /// Names matching this expression are pruned; lines matching it are dropped
    #[arg(short, long)]
    ignore: Option<String>,

    /// Include hidden files and directories
    #[arg(short = 'a', long, overrides_with = "no_hidden")]
    hidden: bool,

    /// Skip hidden entries, even if a config file includes them
    #[arg(long, overrides_with = "hidden")]
    no_hidden: bool,

    /// Search inside binary files
    #[arg(short, long, overrides_with = "no_binary")]
    binary: bool,

    /// Skip binary files, even if a config file includes them
    #[arg(long, overrides_with = "binary")]
    no_binary: bool,

    /// Number of threads to use
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Maximum number of files open for content search at once
    #[arg(long = "max-open")]
    max_open: Option<usize>,

    /// Extra configuration file (YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// When to color output
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Show only statistics, not results
    #[arg(short, long)]
    stats: bool,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    fn apply(self) {
        let enabled = match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => std::io::stdout().is_terminal(),
        };
        colored::control::set_override(enabled);
    }
}

impl Cli {
    /// The settings given on the command line, defaults elsewhere
    fn search_config(&self) -> SearchConfig {
        let mut config = SearchConfig::new(self.pattern.clone(), ".");
        if let Some(path) = &self.path {
            config.root_path = path.clone();
        }
        config.ignore_pattern = self.ignore.clone();
        config.find_files = !self.no_files;
        config.find_dirs = !self.no_dirs;
        config.find_symlinks = !self.no_symlinks;
        config.grep = self.grep;
        config.include_binary = self.binary;
        config.include_hidden = self.hidden;
        if let Some(threads) = self.threads {
            config.thread_count = threads;
        }
        if let Some(max_open) = self.max_open {
            config.max_open_files = max_open;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        config
    }

    /// Applies the switches that move a setting back to its default. These
    /// must run after [`SearchConfig::merge_with_cli`], which only lets the
    /// command line move a switch away from its default.
    fn apply_reverting_switches(&self, config: &mut SearchConfig) {
        let reverts = [
            (self.no_grep, &mut config.grep, false),
            (self.files, &mut config.find_files, true),
            (self.dirs, &mut config.find_dirs, true),
            (self.symlinks, &mut config.find_symlinks, true),
            (self.no_hidden, &mut config.include_hidden, false),
            (self.no_binary, &mut config.include_binary, false),
        ];
        for (given, setting, value) in reverts {
            if given {
                *setting = value;
            }
        }
    }

    /// Config files merged with the command line
    fn effective_config(&self) -> findscout::SearchResult<SearchConfig> {
        let from_files = match self.config.as_deref() {
            Some(path) => SearchConfig::load_from(Some(path))?,
            None => SearchConfig::load()?,
        };
        let mut config = from_files.merge_with_cli(self.search_config());
        self.apply_reverting_switches(&mut config);
        Ok(config)
    }
}

/// Prints results as they arrive
struct ConsoleReporter {
    matcher: PatternMatcher,
    stats_only: bool,
    summary: SearchSummary,
    matched_files: BTreeSet<PathBuf>,
}

impl ConsoleReporter {
    fn new(matcher: PatternMatcher, stats_only: bool) -> Self {
        Self {
            matcher,
            stats_only,
            summary: SearchSummary::default(),
            matched_files: BTreeSet::new(),
        }
    }

    fn highlight(&self, text: &str) -> String {
        self.matcher
            .highlight(text, |m| m.red().bold().to_string())
            .into_owned()
    }

    /// Highlights within the final component only, since that is what was matched
    fn display_entry(&self, entry: &Entry) -> String {
        let full = entry.path.display().to_string();
        let name = entry.base_name();
        match full.strip_suffix(name.as_ref()) {
            Some(parent) => format!("{}{}", parent, self.highlight(&name)),
            None => full,
        }
    }

    fn print_summary(&self) {
        let s = &self.summary;
        println!(
            "\nFound {} dirs, {} files, {} symlinks, {} matches in {} files",
            s.dirs, s.files, s.symlinks, s.match_lines, s.files_with_matches
        );
        if s.errors > 0 {
            println!("{} errors", s.errors);
        }
    }
}

impl Reporter for ConsoleReporter {
    fn on_entry(&mut self, entry: Entry) {
        match entry.kind {
            EntryKind::Directory => self.summary.dirs += 1,
            EntryKind::File => self.summary.files += 1,
            EntryKind::Symlink => self.summary.symlinks += 1,
        }
        if self.stats_only {
            return;
        }

        let label = format!("[{}]", entry.kind.label());
        println!("{} {}", label.blue(), self.display_entry(&entry));
    }

    fn on_match(&mut self, line: MatchLine) {
        self.summary.match_lines += 1;
        if self.matched_files.insert(line.path.clone()) {
            self.summary.files_with_matches += 1;
        }
        if self.stats_only {
            return;
        }

        let path = line.path.display().to_string();
        if line.is_binary() {
            println!("{} {}: {}", "[Grep]".green(), path.cyan(), line.text);
        } else {
            println!(
                "{} {}:{}: {}",
                "[Grep]".green(),
                path.cyan(),
                line.line_number.to_string().green(),
                self.highlight(&line.text)
            );
        }
    }

    fn on_error(&mut self, error: SearchError) {
        self.summary.errors += 1;
        if error.is_fatal() {
            eprintln!("{} {}", "error:".red().bold(), error);
            process::exit(FATAL_EXIT_CODE);
        }
        eprintln!("{} {}", "warning:".yellow(), error);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.color.apply();

    match run(&cli) {
        Err(err) if err.is_fatal() => {
            eprintln!("{} {}", "error:".red().bold(), err);
            process::exit(FATAL_EXIT_CODE);
        }
        other => Ok(other?),
    }
}

fn run(cli: &Cli) -> findscout::SearchResult<()> {
    let config = cli.effective_config()?;
    logging::init(&config.log_level);
    debug!("Effective configuration: {:?}", config);

    if cli.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    let pipeline = Pipeline::new(&config)?;
    let mut reporter = ConsoleReporter::new(pipeline.config().pattern.clone(), cli.stats);
    pipeline.start()?.drain(&mut reporter);

    if cli.stats {
        reporter.print_summary();
    }
    Ok(())
}
