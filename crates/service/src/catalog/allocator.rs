//! Id allocation for new records.
//!
//! There is no persistent counter: the next id is one past the highest id in a
//! fresh read of the index. Deleting the current maximum frees that id for the
//! next create. Two writers reading the same maximum get the same id; callers
//! that need distinct ids must serialize read-then-write themselves.

use super::domain::Book;

/// `1 + max(id)`, or `1` for an empty collection.
pub fn next_id(existing: &[Book]) -> i64 {
    existing.iter().map(|b| b.id).max().map_or(1, |max| max + 1)
}
