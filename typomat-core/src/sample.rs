//! Prompt assembly: reservoir sampling, shuffling and greedy packing

use crate::store::TokenStore;
use rand::Rng;
use std::convert::Infallible;

/// Number of tokens to sample for a prompt of `max_len` characters.
///
/// Upper bound on how many shortest accepted tokens (`min_token_len + 1`
/// characters) plus separators fit, rounded half away from zero.
pub fn sample_size(max_len: usize, min_token_len: usize) -> usize {
    let k = (max_len as f64 + 1.0) / (min_token_len as f64 + 1.0);
    k.round() as usize
}

/// Slots reserved up front; larger samples grow with the stream
const RESERVE_LIMIT: usize = 1024;

/// Single-pass reservoir sample of `k` items from a fallible stream.
///
/// Stops at the first error. A stream shorter than `k` is returned whole,
/// in stream order.
pub fn try_reservoir<T, E, I, R>(items: I, k: usize, rng: &mut R) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = Result<T, E>>,
    R: Rng,
{
    let mut sample = Vec::with_capacity(k.min(RESERVE_LIMIT));
    if k == 0 {
        return Ok(sample);
    }

    for (i, item) in items.into_iter().enumerate() {
        let item = item?;
        if i < k {
            sample.push(item);
        } else {
            let j = rng.random_range(0..=i);
            if j < k {
                sample[j] = item;
            }
        }
    }
    Ok(sample)
}

/// [`try_reservoir`] for infallible streams
pub fn reservoir<T, I, R>(items: I, k: usize, rng: &mut R) -> Vec<T>
where
    I: IntoIterator<Item = T>,
    R: Rng,
{
    match try_reservoir(items.into_iter().map(Ok::<T, Infallible>), k, rng) {
        Ok(sample) => sample,
        Err(never) => match never {},
    }
}

/// In-place Fisher-Yates shuffle
pub fn shuffle<T, R: Rng>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}

/// Join tokens with single spaces, stopping before the first token that
/// would push the length (in chars) past `max_len`.
pub fn pack<S: AsRef<str>>(tokens: &[S], max_len: usize) -> String {
    let mut out = String::new();
    let mut len = 0;

    for (i, token) in tokens.iter().enumerate() {
        let token = token.as_ref();
        let sep = usize::from(i > 0);
        let next = len + sep + token.chars().count();
        if next > max_len {
            break;
        }
        if sep == 1 {
            out.push(' ');
        }
        out.push_str(token);
        len = next;
    }
    out
}

/// Build a prompt of at most `max_len` characters from the store's distinct
/// tokens.
///
/// Returns `None` when a non-empty sample was wanted but the store holds
/// no tokens.
pub fn prompt<R: Rng>(
    store: &TokenStore,
    max_len: usize,
    min_token_len: usize,
    rng: &mut R,
) -> crate::Result<Option<String>> {
    let k = sample_size(max_len, min_token_len);
    if k == 0 {
        return Ok(Some(String::new()));
    }

    let mut tokens = store.with_distinct_tokens(|cursor| try_reservoir(cursor, k, rng))??;
    if tokens.is_empty() {
        return Ok(None);
    }

    shuffle(&mut tokens, rng);
    Ok(Some(pack(&tokens, max_len)))
}
