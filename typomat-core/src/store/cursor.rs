//! Streaming cursor over distinct token values

use rusqlite::Rows;
use std::iter::FusedIterator;

/// Finite, single-pass cursor over token values.
///
/// Each pull may fail on its own; after the first error or the end of the
/// result set the cursor yields nothing more. Dropping it releases the
/// underlying statement.
pub struct TokenCursor<'stmt> {
    rows: Rows<'stmt>,
    finished: bool,
    pulled: usize,
}

impl<'stmt> TokenCursor<'stmt> {
    pub(crate) fn new(rows: Rows<'stmt>) -> Self {
        Self {
            rows,
            finished: false,
            pulled: 0,
        }
    }

    /// Number of values yielded so far
    pub fn pulled(&self) -> usize {
        self.pulled
    }
}

impl Iterator for TokenCursor<'_> {
    type Item = crate::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let row = match self.rows.next() {
            Ok(Some(row)) => row,
            Ok(None) => {
                self.finished = true;
                return None;
            }
            Err(e) => {
                self.finished = true;
                return Some(Err(e.into()));
            }
        };

        match row.get::<_, String>(0) {
            Ok(value) => {
                self.pulled += 1;
                Some(Ok(value))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e.into()))
            }
        }
    }
}

impl FusedIterator for TokenCursor<'_> {}
