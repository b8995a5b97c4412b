use anyhow::Result;
use findscout::{
    find, LineNumber, MatchLine, Pipeline, SearchConfig, SearchError, BINARY_MATCH_MARKER,
};
use std::collections::BTreeSet;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

// Builds a small project-like tree with hidden and ignorable parts
fn create_tree(root: &Path) -> Result<()> {
    for dir in [
        "src/search",
        "src/util",
        "tests",
        "target/debug/deps",
        ".git/objects/ab",
        "docs/.drafts",
    ] {
        fs::create_dir_all(root.join(dir))?;
    }
    let files = [
        ("src/lib.rs", "pub mod search;\n// TODO: docs\n"),
        ("src/search/mod.rs", "fn find() {}\n"),
        ("src/util/strings.rs", "// TODO: trim\nfn trim() {}\n"),
        ("tests/basic.rs", "#[test]\nfn ok() {}\n"),
        ("target/debug/deps/out.d", "TODO in build output\n"),
        (".git/objects/ab/cdef", "TODO inside git\n"),
        ("docs/.drafts/plan.md", "TODO hidden draft\n"),
        ("docs/readme.md", "nothing to do\n"),
        (".gitignore", "target\n"),
    ];
    for (name, content) in files {
        fs::write(root.join(name), content)?;
    }
    Ok(())
}

fn paths(root: &Path, rel: &[&str]) -> BTreeSet<PathBuf> {
    rel.iter().map(|p| root.join(p)).collect()
}

#[test]
fn test_all_visible_directories_are_reported() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    create_tree(root)?;

    let mut config = SearchConfig::new(".*", root);
    config.ignore_pattern = Some("^target$".to_string());
    let output = find(&config)?;

    assert_eq!(
        output.dirs,
        paths(root, &["src", "src/search", "src/util", "tests", "docs"])
    );
    assert_eq!(
        output.files,
        paths(
            root,
            &[
                "src/lib.rs",
                "src/search/mod.rs",
                "src/util/strings.rs",
                "tests/basic.rs",
                "docs/readme.md",
            ]
        )
    );
    assert!(output.errors.is_empty());
    Ok(())
}

#[test]
fn test_hidden_search_only_grows_results() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    create_tree(root)?;

    let mut config = SearchConfig::new("s|TODO", root);
    config.grep = true;
    let visible = find(&config)?;

    config.include_hidden = true;
    let hidden = find(&config)?;

    assert!(visible.dirs.is_subset(&hidden.dirs));
    assert!(visible.files.is_subset(&hidden.files));
    assert!(visible.symlinks.is_subset(&hidden.symlinks));
    let visible_matches: BTreeSet<MatchLine> = visible.matches.iter().cloned().collect();
    let hidden_matches: BTreeSet<MatchLine> = hidden.matches.iter().cloned().collect();
    assert!(visible_matches.is_subset(&hidden_matches));

    assert!(hidden.dirs.contains(&root.join("docs/.drafts")));
    assert!(hidden
        .matches_in(&root.join(".git/objects/ab/cdef"))
        .next()
        .is_some());
    assert!(!visible.dirs.contains(&root.join(".git")));
    Ok(())
}

#[test]
fn test_content_search_reports_exact_lines() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    let file = root.join("log.txt");
    let content: String = (1..=12)
        .map(|i| match i {
            2 | 5 | 9 => format!("{}: ERROR something broke\n", i),
            _ => format!("{}: ok\n", i),
        })
        .collect();
    fs::write(&file, content)?;

    let mut config = SearchConfig::new("ERROR", root);
    config.grep = true;
    let output = find(&config)?;

    let found: Vec<&MatchLine> = output.matches_in(&file).collect();
    assert_eq!(
        found.iter().map(|m| m.line_number).collect::<Vec<_>>(),
        vec![LineNumber::Line(2), LineNumber::Line(5), LineNumber::Line(9)]
    );
    assert_eq!(found[0].text, "2: ERROR something broke");
    assert_eq!(found[2].text, "9: ERROR something broke");
    Ok(())
}

#[test]
fn test_binary_files() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    let blob = root.join("image.dat");
    fs::write(&blob, b"\x00\x00header\npayload\npayload again\n")?;

    let mut config = SearchConfig::new("payload", root);
    config.grep = true;
    let output = find(&config)?;
    assert!(output.matches.is_empty());

    config.include_binary = true;
    let output = find(&config)?;
    assert_eq!(output.matches.len(), 1);
    assert_eq!(output.matches[0].path, blob);
    assert_eq!(output.matches[0].line_number, LineNumber::WholeFile);
    assert_eq!(output.matches[0].text, BINARY_MATCH_MARKER);
    Ok(())
}

#[test]
fn test_open_files_never_exceed_permit_pool() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    for d in 0..8 {
        let sub = root.join(format!("dir_{}", d));
        fs::create_dir(&sub)?;
        for f in 0..25 {
            fs::write(
                sub.join(format!("file_{}.txt", f)),
                "alpha\nbeta TODO\ngamma\n".repeat(50),
            )?;
        }
    }

    let mut config = SearchConfig::new("TODO", root);
    config.grep = true;
    config.max_open_files = 3;
    config.thread_count = NonZeroUsize::new(8).unwrap();
    config.channel_capacity = 4;

    let pipeline = Pipeline::new(&config)?;
    let output = pipeline.start()?.collect();

    assert_eq!(output.matches.len(), 8 * 25 * 50);
    assert!(pipeline.permits().peak_in_use() <= 3);
    assert!(pipeline.permits().peak_in_use() >= 1);
    assert_eq!(pipeline.permits().in_use(), 0);
    Ok(())
}

#[test]
fn test_repeated_runs_are_identical_as_sets() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    create_tree(root)?;

    let mut config = SearchConfig::new("TODO|s", root);
    config.grep = true;
    config.include_hidden = true;

    let first = find(&config)?;
    let second = find(&config)?;
    assert_eq!(first.dirs, second.dirs);
    assert_eq!(first.files, second.files);
    assert_eq!(
        first.matches.into_iter().collect::<BTreeSet<_>>(),
        second.matches.into_iter().collect::<BTreeSet<_>>()
    );
    Ok(())
}

#[test]
fn test_missing_root_is_fatal() -> Result<()> {
    let dir = tempdir()?;
    let config = SearchConfig::new(".*", dir.path().join("nope"));

    match find(&config) {
        Err(err @ SearchError::DirectoryUnreadable { .. }) => assert!(err.is_fatal()),
        other => panic!("expected a fatal listing error, got {:?}", other.map(|o| o.summary())),
    }
    Ok(())
}

#[test]
fn test_root_that_is_a_file_is_fatal() -> Result<()> {
    let dir = tempdir()?;
    let file = dir.path().join("plain.txt");
    fs::write(&file, "x")?;

    let err = find(&SearchConfig::new(".*", &file)).unwrap_err();
    assert!(err.is_fatal());
    Ok(())
}

#[test]
fn test_scope_flags() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    create_tree(root)?;

    let mut config = SearchConfig::new("s", root);
    config.find_dirs = false;
    let output = find(&config)?;
    assert!(output.dirs.is_empty());
    assert!(!output.files.is_empty());

    config.find_dirs = true;
    config.find_files = false;
    let output = find(&config)?;
    assert!(output.files.is_empty());
    assert!(output.dirs.contains(&root.join("tests")));
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_symlinks_reported_not_followed() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    create_tree(root)?;
    std::os::unix::fs::symlink(root.join("src"), root.join("src_link"))?;

    let mut config = SearchConfig::new("src", root);
    config.grep = true;
    let output = find(&config)?;
    assert_eq!(output.symlinks, paths(root, &["src_link"]));
    assert!(!output.dirs.iter().any(|d| d.starts_with(root.join("src_link"))));

    config.find_symlinks = false;
    let output = find(&config)?;
    assert!(output.symlinks.is_empty());
    Ok(())
}

// Builds `depth` nested directories with `name_len`-byte names. Each level is
// created short and renamed from the bottom up, so no call ever sees a path
// longer than the final parent of the renamed component.
#[cfg(unix)]
fn create_overlong_chain(root: &Path, depth: usize, name_len: usize) -> Result<()> {
    let short: PathBuf = (0..depth).map(|_| "d").collect();
    fs::create_dir_all(root.join(&short))?;

    for level in (1..=depth).rev() {
        let prefix: PathBuf = (0..level - 1).map(|_| "d").collect();
        let parent = root.join(prefix);
        let long_name = format!("{}{}", level % 10, "n".repeat(name_len - 1));
        fs::rename(parent.join("d"), parent.join(long_name))?;
    }
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_unlistable_subdirectory_aborts_search() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::write(root.join("early.txt"), "x")?;
    // Far past PATH_MAX, so listing the deep levels fails with ENAMETOOLONG
    create_overlong_chain(root, 25, 200)?;

    match find(&SearchConfig::new(".*", root)) {
        Err(err @ SearchError::DirectoryUnreadable { .. }) => assert!(err.is_fatal()),
        other => panic!("expected the search to abort, got {:?}", other.map(|o| o.summary())),
    }

    // The streaming form still delivers the error alongside what was emitted
    let output = Pipeline::new(&SearchConfig::new(".*", root))?.start()?.collect();
    assert!(output.has_fatal_error());
    assert!(!output.dirs.is_empty());
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_special_files_are_skipped() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::write(root.join("pipe_note.txt"), "pipe here
")?;
    let fifo = root.join("pipe");
    let status = std::process::Command::new("mkfifo").arg(&fifo).status()?;
    assert!(status.success());

    let mut config = SearchConfig::new("pipe", root);
    config.grep = true;
    // Opening the fifo for reading would block forever
    let output = find(&config)?;

    assert_eq!(output.files, paths(root, &["pipe_note.txt"]));
    assert!(output.dirs.is_empty() && output.symlinks.is_empty());
    assert_eq!(output.matches.len(), 1);
    assert!(output.matches_in(&fifo).next().is_none());
    Ok(())
}

#[test]
fn test_concurrent_pipelines_are_independent() -> Result<()> {
    let a = tempdir()?;
    let b = tempdir()?;
    fs::write(a.path().join("only_a.txt"), "x")?;
    fs::write(b.path().join("only_b.txt"), "x")?;

    let config_a = SearchConfig::new("only", a.path());
    let config_b = SearchConfig::new("only", b.path());
    let handle = std::thread::spawn(move || find(&config_a));
    let out_b = find(&config_b)?;
    let out_a = handle.join().expect("search thread panicked")?;

    assert_eq!(out_a.files, paths(a.path(), &["only_a.txt"]));
    assert_eq!(out_b.files, paths(b.path(), &["only_b.txt"]));
    Ok(())
}
