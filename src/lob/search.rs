//! # LOB Pattern Search
//!
//! Naive single-pass search over forward-only cursors:
//!
//! 1. Seek the haystack to the start offset.
//! 2. Read one byte at a time until it equals the first pattern byte.
//! 3. Verify the rest of the pattern with [`check_match`], which reads both
//!    cursors forward from there.
//! 4. On a mismatch, seek the haystack back to one past the tentative match
//!    start and continue with step 2.
//!
//! Worst case is O(n·m). LOB search is called rarely, on objects that are
//! already large, and the cursors only support cheap forward movement, so
//! skip tables buy little here.
//!
//! An empty pattern matches immediately at the start offset, like SQL LOCATE,
//! without validating the start against the haystack length.

use crate::error::Result;

use super::cursor::ByteCursor;

/// Returns the zero-based offset where `pattern` first occurs at or after
/// `start`.
pub(crate) fn search<H, P>(haystack: &mut H, pattern: &mut P, start: u64) -> Result<Option<u64>>
where
    H: ByteCursor + ?Sized,
    P: ByteCursor + ?Sized,
{
    pattern.seek(0)?;
    let Some(first) = pattern.next_byte()? else {
        return Ok(Some(start));
    };

    haystack.seek(start)?;
    loop {
        let Some(byte) = haystack.next_byte()? else {
            return Ok(None);
        };
        if byte != first {
            continue;
        }
        let resume = haystack.position();
        if check_match(haystack, pattern)? {
            return Ok(Some(resume - 1));
        }
        haystack.seek(resume)?;
    }
}

/// Compares the pattern, from its second byte on, against the haystack from
/// its current position. Running out of haystack is a mismatch.
fn check_match<H, P>(haystack: &mut H, pattern: &mut P) -> Result<bool>
where
    H: ByteCursor + ?Sized,
    P: ByteCursor + ?Sized,
{
    pattern.seek(1)?;
    while let Some(expected) = pattern.next_byte()? {
        match haystack.next_byte()? {
            Some(actual) if actual == expected => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}
