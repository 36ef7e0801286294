//! Lexical tokenizer for prose and source code.
//!
//! Text is split on ASCII whitespace into words, words are split on
//! punctuation and digits into raw tokens, and raw tokens are split at
//! letter-case transitions (`camelCase`, `PascalCase`, `JSONData`). Only
//! purely alphabetic ASCII tokens survive, lowercased.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::iter::FusedIterator;
use std::path::Path;

/// ASCII whitespace: space, tab, newline, vertical tab, form feed, carriage return
const WORD_DELIMITERS: [char; 6] = [' ', '\t', '\n', '\u{0B}', '\u{0C}', '\r'];

/// Punctuation used in text and code. ASCII digits are delimiters too.
const TOKEN_DELIMITERS: [char; 21] = [
    '.', ',', '!', '?', ';', ':', '(', ')', '[', ']', '{', '}', '"', '\'', '-', '_', '/', '<',
    '>', '@', '`',
];

fn is_word_delimiter(c: char) -> bool {
    WORD_DELIMITERS.contains(&c)
}

fn is_token_delimiter(c: char) -> bool {
    c.is_ascii_digit() || TOKEN_DELIMITERS.contains(&c)
}

/// Word filter that keeps every word
pub fn accept_all(_word: &str) -> bool {
    true
}

/// Tokenize text without a word filter
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    tokenize_with(text, accept_all)
}

/// Tokenize text, skipping whitespace-delimited words rejected by `word_filter`
/// before any further splitting happens.
pub fn tokenize_with<'a, F>(text: &'a str, word_filter: F) -> impl Iterator<Item = String> + 'a
where
    F: Fn(&str) -> bool + 'a,
{
    text.split(is_word_delimiter)
        .filter(|word| !word.is_empty())
        .filter(move |word| word_filter(*word))
        .flat_map(tokenize_word)
}

fn tokenize_word(word: &str) -> Vec<String> {
    word.split(is_token_delimiter)
        .filter(|raw| is_valid_token(raw))
        .flat_map(split_mixed_case)
        .map(str::to_ascii_lowercase)
        .collect()
}

/// A token is valid only if it is non-empty and made of ASCII letters
fn is_valid_token(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_alphabetic())
}

/// Split a mixed-case identifier into subtokens.
///
/// `camelCaseWord` → `camel`, `Case`, `Word`. An uppercase run followed by a
/// lowercase letter is an acronym ending before its last capital:
/// `JSONData` → `JSON`, `Data`; `NumCPU` → `Num`, `CPU`.
///
/// Expects a token that passed [`is_valid_token`], so byte indices are char indices.
fn split_mixed_case(token: &str) -> Vec<&str> {
    let bytes = token.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;

    for i in 1..bytes.len() {
        let prev = bytes[i - 1];
        let cur = bytes[i];
        if !cur.is_ascii_uppercase() {
            continue;
        }

        let next_is_lower = bytes.get(i + 1).is_some_and(|b| b.is_ascii_lowercase());
        if prev.is_ascii_lowercase() || (prev.is_ascii_uppercase() && next_is_lower) {
            parts.push(&token[start..i]);
            start = i;
        }
    }

    if start < bytes.len() {
        parts.push(&token[start..]);
    }
    parts
}

/// Streaming tokenizer over a line-oriented reader.
///
/// Lines are decoded lossily, so invalid UTF-8 never fails a file; the bad
/// bytes simply never form a valid token. Read errors are yielded once and
/// end the stream.
pub struct FileTokens<R, F> {
    reader: R,
    line: Vec<u8>,
    pending: VecDeque<String>,
    word_filter: F,
    done: bool,
}

/// Open `path` and tokenize it line by line
pub fn tokenize_file<F>(path: &Path, word_filter: F) -> io::Result<FileTokens<BufReader<File>, F>>
where
    F: Fn(&str) -> bool,
{
    let file = File::open(path)?;
    Ok(tokenize_reader(BufReader::new(file), word_filter))
}

/// Tokenize any buffered reader line by line
pub fn tokenize_reader<R, F>(reader: R, word_filter: F) -> FileTokens<R, F>
where
    R: BufRead,
    F: Fn(&str) -> bool,
{
    FileTokens {
        reader,
        line: Vec::new(),
        pending: VecDeque::new(),
        word_filter,
        done: false,
    }
}

impl<R, F> Iterator for FileTokens<R, F>
where
    R: BufRead,
    F: Fn(&str) -> bool,
{
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(Ok(token));
            }
            if self.done {
                return None;
            }

            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&self.line);
                    self.pending
                        .extend(tokenize_with(&text, &self.word_filter));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<R, F> FusedIterator for FileTokens<R, F>
where
    R: BufRead,
    F: Fn(&str) -> bool,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn tokens(s: &str) -> Vec<String> {
        tokenize(s).collect()
    }

    #[test]
    fn test_tokenize_literal_cases() {
        let cases: &[(&str, &[&str])] = &[
            ("Hello, world!", &["hello", "world"]),
            ("PascalCaseWord", &["pascal", "case", "word"]),
            ("camelCaseWord", &["camel", "case", "word"]),
            ("snake_case-word", &["snake", "case", "word"]),
            ("", &[]),
            (" ,;! ", &[]),
            ("var1 = 42;", &["var"]),
            ("JSONData", &["json", "data"]),
            ("NumCPU", &["num", "cpu"]),
            ("HTTPServer getHTTP", &["http", "server", "get", "http"]),
            ("ALLCAPS", &["allcaps"]),
        ];

        for (input, want) in cases {
            assert_eq!(tokens(input), *want, "input: {input:?}");
        }
    }

    #[test]
    fn test_non_ascii_tokens_are_dropped_whole() {
        assert_eq!(tokens("héllo wörld ok"), vec!["ok"]);
        // A non-letter inside a raw token drops the entire raw token
        assert_eq!(tokens("a=b fooBar=baz qux"), vec!["qux"]);
    }

    #[test]
    fn test_all_ascii_whitespace_splits_words() {
        assert_eq!(
            tokens("one\ttwo\nthree\u{0B}four\u{0C}five\r\nsix"),
            vec!["one", "two", "three", "four", "five", "six"]
        );
    }

    #[test]
    fn test_duplicates_and_order_are_preserved() {
        assert_eq!(tokens("b a b"), vec!["b", "a", "b"]);
    }

    #[test]
    fn test_word_filter_runs_before_splitting() {
        let short_only = |w: &str| w.chars().count() < 8;
        let got: Vec<String> = tokenize_with("tiny extremelyLongWord fooBar", short_only).collect();
        assert_eq!(got, vec!["tiny", "foo", "bar"]);
    }

    #[test]
    fn test_reader_matches_string_tokenizer() {
        let text = "fn helloWorld() {\n    let jsonData = 42;\n}";
        let from_reader: Vec<String> = tokenize_reader(Cursor::new(text), accept_all)
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(from_reader, tokens(text));
    }

    #[test]
    fn test_reader_handles_missing_trailing_newline() {
        let with: Vec<String> = tokenize_reader(Cursor::new("alpha beta\n"), accept_all)
            .map(Result::unwrap)
            .collect();
        let without: Vec<String> = tokenize_reader(Cursor::new("alpha beta"), accept_all)
            .map(Result::unwrap)
            .collect();
        assert_eq!(with, vec!["alpha", "beta"]);
        assert_eq!(with, without);
    }

    #[test]
    fn test_reader_decodes_invalid_utf8_lossily() {
        let bytes: &[u8] = b"good \xff\xfebad more\n";
        let got: Vec<String> = tokenize_reader(Cursor::new(bytes), accept_all)
            .map(Result::unwrap)
            .collect();
        assert_eq!(got, vec!["good", "more"]);
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("disk on fire"))
        }
    }

    #[test]
    fn test_reader_error_is_yielded_once() {
        let mut it = tokenize_reader(BufReader::new(FailingReader), accept_all);
        assert!(matches!(it.next(), Some(Err(_))));
        assert!(it.next().is_none());
        assert!(it.next().is_none());
    }

    #[test]
    fn test_tokenize_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sample.txt");
        std::fs::write(&path, "Hello, world!\nPascalCaseWord snake_case-word\nNumCPU").unwrap();

        let got: Vec<String> = tokenize_file(&path, accept_all)
            .unwrap()
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(
            got,
            vec!["hello", "world", "pascal", "case", "word", "snake", "case", "word", "num", "cpu"]
        );
    }

    #[test]
    fn test_tokenize_missing_file_fails_to_open() {
        assert!(tokenize_file(Path::new("/nonexistent/typomat.txt"), accept_all).is_err());
    }
}
