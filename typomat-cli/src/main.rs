//! Typomat CLI - index directories and draw typing prompts from their vocabulary

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use typomat_core::{Config, Engine, IndexStats, Score, StoreStatus, TypomatError};

/// Environment variable holding the log filter
const LOG_ENV: &str = "TYPOMAT_LOG";

#[derive(Parser)]
#[command(name = "typomat")]
#[command(about = "Typing prompts from the words in your files", long_about = None)]
struct Cli {
    /// Config file (default: <config_dir>/typomat/config.toml)
    #[arg(long, global = true, env = "TYPOMAT_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a directory (full pass, unconditionally)
    Index {
        /// Directory to index
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Draw prompts from a directory, indexing it first
    Prompt {
        /// Directory to draw from
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Maximum prompt length in characters
        #[arg(short, long, default_value_t = 80)]
        max_len: usize,

        /// Number of prompts
        #[arg(short, long, default_value_t = 1)]
        count: usize,

        /// Type each prompt on stdin and report WPM and accuracy
        #[arg(long)]
        check: bool,
    },

    /// Show what is stored for a directory
    Status {
        /// Directory to inspect
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Delete stored corpora (one directory, or all)
    Purge {
        /// Only forget this directory
        dir: Option<PathBuf>,
    },
}

fn main() {
    use colored::Colorize;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = load_config(cli.config.as_deref())
        .and_then(Engine::new)
        .and_then(|engine| match cli.command {
            Commands::Index { dir } => cmd_index(&engine, &dir, cli.json),
            Commands::Prompt {
                dir,
                max_len,
                count,
                check,
            } => cmd_prompt(&engine, &dir, max_len, count, check, cli.json),
            Commands::Status { dir } => cmd_status(&engine, &dir, cli.json),
            Commands::Purge { dir } => cmd_purge(&engine, dir.as_deref(), cli.json),
        });

    if let Err(e) = result {
        if cli.json {
            let error_json = serde_json::json!({
                "code": e.kind().as_str(),
                "message": e.to_string(),
                "hint": hint(&e),
            });
            eprintln!("{error_json}");
        } else {
            eprintln!("Error: {}", e);
            let hint = hint(&e);
            if !hint.is_empty() {
                eprintln!("{}: {}", "Hint".yellow(), hint);
            }
        }
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("typomat=debug,typomat_core=debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> typomat_core::Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::load_default(),
    }
}

fn print_json<T: Serialize>(value: &T) -> typomat_core::Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(io::Error::from)?;
    println!("{text}");
    Ok(())
}

fn cmd_index(engine: &Engine, dir: &Path, json: bool) -> typomat_core::Result<()> {
    use colored::Colorize;

    let stats = engine.index(dir)?;
    if json {
        return print_json(&stats);
    }

    print_index_stats(&stats);
    let status = engine.status(dir)?;
    println!(
        "{}: {} distinct tokens in {} files ({:.1} MB)",
        "Corpus".blue(),
        status.distinct_tokens,
        status.files,
        status.size_bytes as f64 / 1_000_000.0
    );
    Ok(())
}

fn print_index_stats(stats: &IndexStats) {
    use colored::Colorize;

    println!(
        "{}: {} files ({} new, {} changed, {} tokens)",
        "Indexed".green(),
        stats.files_tokenized(),
        stats.files_new,
        stats.files_changed,
        stats.tokens_written
    );
    println!(
        "{}: {} unchanged, {} ineligible",
        "Skipped".yellow(),
        stats.files_unchanged,
        stats.files_ineligible
    );
    if stats.files_removed > 0 {
        println!("{}: {} files", "Removed".yellow(), stats.files_removed);
    }
    if stats.files_failed > 0 {
        println!("{}: {} files", "Failed".red(), stats.files_failed);
    }
    println!(
        "{}",
        format!("{} files seen in {} ms", stats.files_seen, stats.elapsed_ms).dimmed()
    );
}

#[derive(Serialize)]
struct PromptOutput {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<Score>,
}

fn cmd_prompt(
    engine: &Engine,
    dir: &Path,
    max_len: usize,
    count: usize,
    check: bool,
    json: bool,
) -> typomat_core::Result<()> {
    use colored::Colorize;

    let session = engine.session(dir)?;
    let mut outputs = Vec::with_capacity(count);
    let stdin = io::stdin();

    for _ in 0..count {
        let prompt = session.prompt(max_len)?;
        let score = if check {
            if !json {
                println!("{}", prompt.bold());
                io::stdout().flush()?;
            }
            let started = Instant::now();
            let mut input = String::new();
            stdin.lock().read_line(&mut input)?;
            let input = input.trim_end_matches(&['\n', '\r'][..]);
            let score = Score::new(&prompt, input, started.elapsed());
            if !json {
                println!(
                    "{}: {:.1}  {}: {:.1}%",
                    "WPM".cyan(),
                    score.wpm,
                    "Accuracy".cyan(),
                    score.accuracy
                );
            }
            Some(score)
        } else {
            if !json {
                println!("{prompt}");
            }
            None
        };
        outputs.push(PromptOutput { prompt, score });
    }

    if json {
        print_json(&outputs)?;
    }
    Ok(())
}

fn cmd_status(engine: &Engine, dir: &Path, json: bool) -> typomat_core::Result<()> {
    use colored::Colorize;

    let session = engine.session(dir)?;
    let status: StoreStatus = session.status()?;
    if json {
        return print_json(&serde_json::json!({
            "dir": session.dir(),
            "dir_id": session.id().as_str(),
            "status": status,
        }));
    }

    println!("{}: {}", "Directory".blue(), session.dir().display());
    println!("{}: {}", "Id".blue(), session.id().to_string().cyan());
    println!("{}: {}", "Files".blue(), status.files);
    println!(
        "{}: {} ({} distinct)",
        "Tokens".blue(),
        status.tokens,
        status.distinct_tokens
    );
    match status.last_indexed {
        Some(ts) => println!("{}: {} (unix)", "Last indexed".blue(), ts),
        None => println!("{}: {}", "Last indexed".blue(), "never".yellow()),
    }
    println!(
        "{}: {:.1} MB",
        "Store".blue(),
        status.size_bytes as f64 / 1_000_000.0
    );
    Ok(())
}

fn cmd_purge(engine: &Engine, dir: Option<&Path>, json: bool) -> typomat_core::Result<()> {
    use colored::Colorize;

    match dir {
        Some(dir) => {
            engine.forget(dir)?;
            if json {
                return print_json(&serde_json::json!({ "forgotten": dir }));
            }
            println!("{}: {}", "Forgot".yellow(), dir.display());
        }
        None => {
            let removed = engine.purge_cache()?;
            if json {
                return print_json(&serde_json::json!({ "removed_files": removed }));
            }
            println!(
                "{}: {} files under {}",
                "Purged".yellow(),
                removed,
                engine.cache_dir().join("db").display()
            );
        }
    }
    Ok(())
}

/// Targeted advice for the failures a user can act on
fn hint(e: &TypomatError) -> &'static str {
    match e {
        TypomatError::EmptyDirectory(_) => "the directory has no files to index",
        TypomatError::NoTokens(_) => "no file yielded usable words; try a directory with text files",
        TypomatError::InvalidDirectory(_) => "pass an existing directory",
        TypomatError::TooManyErrors { .. } => "raise indexing.max_file_errors or fix file permissions",
        TypomatError::NoCacheDir => "set TYPOMAT_CACHE_DIR",
        _ => "",
    }
}
