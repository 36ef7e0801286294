//! End-to-end indexing behaviour against real directories

use filetime::FileTime;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use typomat_core::store::{FileRecord, TokenRecord};
use typomat_core::{Config, Engine, IndexStats, Indexer, TokenStore, TypomatError};

fn config() -> Config {
    let mut config = Config::default();
    config.indexing.max_workers = Some(4);
    config
}

fn run(store: &mut TokenStore, config: &Config, dir: &Path) -> IndexStats {
    Indexer::new(store, config).run(dir).unwrap()
}

fn snapshot(store: &TokenStore) -> (Vec<FileRecord>, Vec<TokenRecord>) {
    let mut files = store.list_files().unwrap();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    (files, store.all_tokens().unwrap())
}

fn key(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

fn write(dir: &TempDir, name: &str, content: &str) {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn reindexing_an_unchanged_tree_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.rs", "fn parseConfig(input: &str) -> Config");
    write(&dir, "b.md", "# Getting started\nInstall the binary.");
    write(&dir, "nested/c.txt", "lorem ipsum dolor sit amet");

    let config = config();
    let mut store = TokenStore::open_in_memory(100).unwrap();
    let first = run(&mut store, &config, dir.path());
    assert_eq!(first.files_new, 3);
    let before = snapshot(&store);

    let second = run(&mut store, &config, dir.path());
    assert_eq!(second.files_tokenized(), 0);
    assert_eq!(second.files_unchanged, 3);
    assert_eq!(second.tokens_written, 0);
    assert_eq!(second.flushes, 0);
    assert_eq!(snapshot(&store), before);
}

#[test]
fn mtime_or_size_change_triggers_retokenization() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.txt", "alpha beta");
    write(&dir, "b.txt", "gamma delta");

    let config = config();
    let mut store = TokenStore::open_in_memory(100).unwrap();
    run(&mut store, &config, dir.path());

    // Same content, different mtime
    filetime::set_file_mtime(dir.path().join("a.txt"), FileTime::from_unix_time(1_000_000, 0))
        .unwrap();
    // Different size
    write(&dir, "b.txt", "gamma delta epsilon");

    let stats = run(&mut store, &config, dir.path());
    assert_eq!(stats.files_changed, 2);
    assert_eq!(stats.files_new, 0);
    assert_eq!(
        store.tokens_of_path(&key(&dir, "a.txt")).unwrap(),
        vec!["alpha", "beta"]
    );
    assert_eq!(
        store.tokens_of_path(&key(&dir, "b.txt")).unwrap(),
        vec!["delta", "epsilon", "gamma"]
    );
}

#[test]
fn content_rewrite_with_same_size_and_mtime_is_not_detected() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.txt", "alpha beta");
    let path = dir.path().join("a.txt");
    let original = FileTime::from_last_modification_time(&fs::metadata(&path).unwrap());

    let config = config();
    let mut store = TokenStore::open_in_memory(100).unwrap();
    run(&mut store, &config, dir.path());

    fs::write(&path, "gamma zeta").unwrap();
    filetime::set_file_mtime(&path, original).unwrap();

    let stats = run(&mut store, &config, dir.path());
    assert_eq!(stats.files_unchanged, 1);
    assert_eq!(
        store.tokens_of_path(&key(&dir, "a.txt")).unwrap(),
        vec!["alpha", "beta"]
    );
}

#[test]
fn changed_file_loses_its_old_tokens() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.txt", "alpha beta");

    let config = config();
    let mut store = TokenStore::open_in_memory(100).unwrap();
    run(&mut store, &config, dir.path());

    write(&dir, "a.txt", "completely different words");
    run(&mut store, &config, dir.path());
    assert_eq!(
        store.tokens_of_path(&key(&dir, "a.txt")).unwrap(),
        vec!["completely", "different", "words"]
    );
}

#[test]
fn deleted_files_are_pruned() {
    let dir = TempDir::new().unwrap();
    write(&dir, "keep.txt", "alpha");
    write(&dir, "gone.txt", "omega");
    write(&dir, "sub/also-gone.txt", "sigma");

    let config = config();
    let mut store = TokenStore::open_in_memory(100).unwrap();
    run(&mut store, &config, dir.path());

    fs::remove_file(dir.path().join("gone.txt")).unwrap();
    fs::remove_dir_all(dir.path().join("sub")).unwrap();
    let stats = run(&mut store, &config, dir.path());
    assert_eq!(stats.files_removed, 2);

    let (files, tokens) = snapshot(&store);
    assert_eq!(
        files.iter().map(|f| f.path.clone()).collect::<Vec<_>>(),
        vec![key(&dir, "keep.txt")]
    );
    assert!(tokens.iter().all(|t| t.path == key(&dir, "keep.txt")));
}

#[test]
fn file_becoming_ineligible_is_pruned() {
    let dir = TempDir::new().unwrap();
    write(&dir, "grows.txt", "alpha beta");
    write(&dir, "turns-binary.txt", "gamma delta");

    let mut config = config();
    config.indexing.max_file_size = 64;
    let mut store = TokenStore::open_in_memory(100).unwrap();
    run(&mut store, &config, dir.path());
    assert_eq!(store.list_files().unwrap().len(), 2);

    write(&dir, "grows.txt", &"alpha beta ".repeat(20));
    fs::write(dir.path().join("turns-binary.txt"), [0xffu8, 0xfe, 0xfd]).unwrap();

    let stats = run(&mut store, &config, dir.path());
    assert_eq!(stats.files_ineligible, 2);
    assert_eq!(stats.files_removed, 2);
    let (files, tokens) = snapshot(&store);
    assert!(files.is_empty());
    assert!(tokens.is_empty());
}

#[test]
fn stored_tokens_respect_length_bounds() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "mixed.txt",
        "a ab abc abcdefghijk abcdefghijkl supercalifragilisticexpialidocious fooBarBazQux",
    );

    let config = config();
    let mut store = TokenStore::open_in_memory(100).unwrap();
    run(&mut store, &config, dir.path());

    let values: Vec<String> = store.all_tokens().unwrap().into_iter().map(|t| t.value).collect();
    assert!(!values.is_empty());
    for value in &values {
        let len = value.chars().count();
        assert!(len > 2 && len < 12, "{value}");
    }
    assert!(values.contains(&"abc".to_string()));
    assert!(values.contains(&"abcdefghijk".to_string()));
    assert!(values.contains(&"qux".to_string()));
}

#[test]
fn each_file_stores_distinct_tokens() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.txt", "repeat repeat Repeat REPEAT other");

    let config = config();
    let mut store = TokenStore::open_in_memory(100).unwrap();
    let stats = run(&mut store, &config, dir.path());
    assert_eq!(stats.tokens_written, 2);
    assert_eq!(
        store.tokens_of_path(&key(&dir, "a.txt")).unwrap(),
        vec!["other", "repeat"]
    );
}

#[test]
fn empty_directory_is_an_error() {
    let dir = TempDir::new().unwrap();
    let mut store = TokenStore::open_in_memory(100).unwrap();
    let err = Indexer::new(&mut store, &config()).run(dir.path()).unwrap_err();
    assert!(matches!(err, TypomatError::EmptyDirectory(_)));
}

#[test]
fn ignore_file_and_git_dir_are_skipped() {
    let dir = TempDir::new().unwrap();
    write(&dir, ".git/config", "repositoryformatversion gitdir");
    write(&dir, ".gitignore", "build/\n");
    write(&dir, "build/out.txt", "generated artifact");
    write(&dir, "src/lib.rs", "visible source");

    let config = config();
    let mut store = TokenStore::open_in_memory(100).unwrap();
    run(&mut store, &config, dir.path());

    let values: HashSet<String> = store.all_tokens().unwrap().into_iter().map(|t| t.value).collect();
    assert!(values.contains("visible"));
    assert!(values.contains("source"));
    assert!(!values.contains("generated"));
    assert!(!values.contains("gitdir"));
}

#[cfg(unix)]
#[test]
fn strict_mode_aborts_on_first_file_error() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.txt", "alpha");
    std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("dangling")).unwrap();

    let mut store = TokenStore::open_in_memory(100).unwrap();
    let err = Indexer::new(&mut store, &config()).run(dir.path()).unwrap_err();
    assert!(matches!(err, TypomatError::FileOperation { .. }));
}

#[cfg(unix)]
#[test]
fn error_budget_absorbs_failures_until_exhausted() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.txt", "alpha");
    std::os::unix::fs::symlink(dir.path().join("missing1"), dir.path().join("dangling1")).unwrap();

    let mut config = config();
    config.indexing.max_file_errors = 1;
    let mut store = TokenStore::open_in_memory(100).unwrap();
    let stats = run(&mut store, &config, dir.path());
    assert_eq!(stats.files_failed, 1);
    assert_eq!(stats.files_new, 1);

    std::os::unix::fs::symlink(dir.path().join("missing2"), dir.path().join("dangling2")).unwrap();
    let err = Indexer::new(&mut store, &config).run(dir.path()).unwrap_err();
    assert!(matches!(err, TypomatError::TooManyErrors { count: 2, limit: 1 }));
}

#[cfg(unix)]
#[test]
fn failed_run_resumes_from_flushed_batches() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.txt", "alpha");
    write(&dir, "b.txt", "beta");
    std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("c-dangling")).unwrap();

    // One worker walks the sorted paths in order; every file flushes
    let mut config = config();
    config.indexing.max_workers = Some(1);
    config.indexing.token_buffer_size = 1;
    let mut store = TokenStore::open_in_memory(100).unwrap();
    assert!(Indexer::new(&mut store, &config).run(dir.path()).is_err());
    assert_eq!(store.list_files().unwrap().len(), 2);

    fs::remove_file(dir.path().join("c-dangling")).unwrap();
    let stats = run(&mut store, &config, dir.path());
    assert_eq!(stats.files_unchanged, 2);
    assert_eq!(stats.files_tokenized(), 0);
}

#[cfg(unix)]
#[test]
fn hard_error_unblocks_workers_behind_a_full_channel() {
    let dir = TempDir::new().unwrap();
    for i in 0..1000 {
        write(&dir, &format!("f{i:05}.txt"), "alpha beta gamma delta");
    }
    std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("f00500")).unwrap();

    let mut config = config();
    config.indexing.max_workers = Some(8);
    config.indexing.channel_capacity = 1;
    config.indexing.token_buffer_size = 7;
    let mut store = TokenStore::open_in_memory(100).unwrap();

    let started = std::time::Instant::now();
    let err = Indexer::new(&mut store, &config).run(dir.path()).unwrap_err();
    assert!(matches!(err, TypomatError::FileOperation { .. }), "{err}");
    assert!(started.elapsed() < std::time::Duration::from_secs(30));

    // Whatever was committed is consistent: no tokens without a file row
    let files: HashSet<String> = store.list_files().unwrap().into_iter().map(|f| f.path).collect();
    let tokens = store.all_tokens().unwrap();
    assert!(tokens.iter().all(|t| files.contains(&t.path)));
}

#[test]
fn stats_serialize_for_json_output() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.txt", "alpha beta");
    let mut store = TokenStore::open_in_memory(100).unwrap();
    let stats = run(&mut store, &config(), dir.path());

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["files_new"], 1);
    assert_eq!(json["tokens_written"], 2);
}

fn engine(cache: &TempDir) -> Engine {
    Engine::new(config().with_cache_dir(cache.path())).unwrap()
}

#[test]
fn prompt_draws_only_from_the_corpus() {
    let cache = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    write(&dir, "one.js", "helloWorld();");
    write(&dir, "two.go", "fooBar()");

    let engine = engine(&cache);
    let allowed: HashSet<&str> = ["hello", "world", "foo", "bar"].into_iter().collect();
    let prompt = engine.prompt(dir.path(), 1000).unwrap();

    let words: HashSet<&str> = prompt.split(' ').collect();
    assert!(words.is_subset(&allowed), "{prompt:?}");
    assert_eq!(words.len(), prompt.split(' ').count(), "tokens repeat: {prompt:?}");
    // Room for every token, so every token is drawn
    assert_eq!(words, allowed);
}

#[test]
fn prompt_never_exceeds_max_len() {
    let cache = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "prose.txt",
        "The quick brown fox jumps over the lazy dog while seven wizards \
         quickly jinx gnomes before they vex the dwarves",
    );

    let engine = engine(&cache);
    for max_len in 0..120 {
        let prompt = engine.prompt(dir.path(), max_len).unwrap();
        assert!(prompt.chars().count() <= max_len, "{max_len}: {prompt:?}");
    }
}

#[test]
fn prompt_only_indexes_once_per_session() {
    let cache = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    write(&dir, "a.txt", "alpha");

    let engine = engine(&cache);
    assert_eq!(engine.prompt(dir.path(), 100).unwrap(), "alpha");

    // Not picked up until an explicit index pass
    write(&dir, "b.txt", "omega");
    assert_eq!(engine.prompt(dir.path(), 100).unwrap(), "alpha");

    engine.index(dir.path()).unwrap();
    let mut words: Vec<String> = engine
        .prompt(dir.path(), 100)
        .unwrap()
        .split(' ')
        .map(str::to_string)
        .collect();
    words.sort();
    assert_eq!(words, vec!["alpha", "omega"]);
}

#[test]
fn corpus_persists_across_engines() {
    let cache = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    write(&dir, "a.txt", "alpha beta");

    let first = engine(&cache).index(dir.path()).unwrap();
    assert_eq!(first.files_new, 1);

    let second = engine(&cache).index(dir.path()).unwrap();
    assert_eq!(second.files_unchanged, 1);
    assert_eq!(second.tokens_written, 0);
}
