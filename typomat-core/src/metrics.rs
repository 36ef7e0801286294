//! Typing metrics for an attempt at a prompt

use serde::Serialize;
use std::time::Duration;

/// Characters per "word" in the WPM convention
const CHARS_PER_WORD: f64 = 5.0;

/// Words per minute, counting every character except space, tab and newline.
/// Zero when no time has elapsed.
pub fn wpm(input: &str, elapsed: Duration) -> f64 {
    let minutes = elapsed.as_secs_f64() / 60.0;
    if minutes == 0.0 {
        return 0.0;
    }

    let chars = input
        .chars()
        .filter(|c| !matches!(c, ' ' | '\n' | '\t'))
        .count();
    chars as f64 / CHARS_PER_WORD / minutes
}

/// Percentage of matching characters over the part of `input` that overlaps
/// `prompt`. 100 when nothing overlaps.
pub fn accuracy(prompt: &str, input: &str) -> f64 {
    let (measured, correct) = prompt
        .chars()
        .zip(input.chars())
        .fold((0usize, 0usize), |(measured, correct), (p, i)| {
            (measured + 1, correct + usize::from(p == i))
        });

    if measured == 0 {
        return 100.0;
    }
    correct as f64 / measured as f64 * 100.0
}

/// Both metrics for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Score {
    pub wpm: f64,
    pub accuracy: f64,
}

impl Score {
    pub fn new(prompt: &str, input: &str, elapsed: Duration) -> Self {
        Self {
            wpm: wpm(input, elapsed),
            accuracy: accuracy(prompt, input),
        }
    }
}
