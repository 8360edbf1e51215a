//! Candidate pointer scanning.
//!
//! This is the only place where the collector interprets memory without
//! type information: a range of bytes is read one aligned word at a time
//! and every value that falls inside the heap extent filter is taken for a
//! possible pointer. Whether a word really was a pointer is never known;
//! an integer that happens to look like a tracked address keeps its block
//! alive. That over-approximation is the price of scanning untyped stack
//! and heap memory, and it only ever errs towards retaining.
//!
//! Everything else in the crate works on typed, owned data.

use std::hint::black_box;
use std::ptr;

use crate::record::Record;
use crate::registry::Registry;
use crate::utils::WORD_SIZE;

/// Returns an address strictly below the caller's stack frame.
///
/// The collector scans the window between this floor and the high anchor
/// recorded at initialization. The function must keep its own frame for
/// the address to be meaningful, so inlining is forbidden and the marker
/// local is routed through `black_box`.
#[inline(never)]
pub(crate) fn stack_floor() -> usize {
    let marker: usize = 0;
    black_box(&marker as *const usize as usize)
}

/// Scans every pointer-aligned word in `(floor, top]`, highest address
/// first, and inserts each value inside the exclusive `(low, high)` filter
/// into `candidates` as a possible pointer.
///
/// **SAFETY**: Caller must guarantee that the whole window is mapped,
/// readable memory; for the collector this is the live region of the
/// current thread's stack.
pub(crate) unsafe fn scan_stack_window(
    floor: usize,
    top: usize,
    low: usize,
    high: usize,
    candidates: &mut Registry,
) {
    let mut current = top & !(WORD_SIZE - 1);

    while current > floor {
        let value = unsafe { ptr::read_volatile(current as *const usize) };
        if value > low && value < high {
            candidates.insert(Record::new(value, 0));
        }
        current -= WORD_SIZE;
    }
}

/// Scans the pointer-aligned interior words of the block at `addr`,
/// lowest offset first, and inserts each value inside the exclusive
/// `(low, high)` filter into `candidates`. Blocks smaller than one word
/// hold no whole word and are skipped by the caller.
///
/// **SAFETY**: Caller must guarantee that `addr..addr + size` is a live
/// allocation; the collector only passes blocks it handed out itself.
pub(crate) unsafe fn scan_block(
    addr: usize,
    size: usize,
    low: usize,
    high: usize,
    candidates: &mut Registry,
) {
    let mut offset = 0;

    while offset + WORD_SIZE <= size {
        let value = unsafe { ptr::read_volatile((addr + offset) as *const usize) };
        if value > low && value < high {
            candidates.insert(Record::new(value, 0));
        }
        offset += WORD_SIZE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_floor_is_below_the_calling_frame() {
        let here: usize = 0;
        let caller_slot = &here as *const usize as usize;

        // The stack grows downward; the helper's frame sits below ours.
        assert!(stack_floor() < caller_slot);
    }

    #[test]
    fn scan_block_finds_planted_values() {
        let planted = 0x5_5AA0usize;
        let mut block = [0usize; 8];
        block[3] = planted;
        block[6] = planted + 0x1000; // outside the filter

        let mut candidates = Registry::new();
        unsafe {
            scan_block(
                block.as_ptr() as usize,
                std::mem::size_of_val(&block),
                planted - 1,
                planted + 1,
                &mut candidates,
            );
        }

        assert!(candidates.contains(planted));
        assert!(!candidates.contains(planted + 0x1000));
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn scan_block_skips_partial_tail_words() {
        let planted = 0x5_5AA0usize;
        let mut block = [0usize; 4];
        block[3] = planted;

        let mut candidates = Registry::new();
        unsafe {
            // One byte short: the last word is not fully inside the block.
            scan_block(
                block.as_ptr() as usize,
                std::mem::size_of_val(&block) - 1,
                planted - 1,
                planted + 1,
                &mut candidates,
            );
        }

        assert!(candidates.is_empty());
    }

    #[test]
    fn window_scan_covers_the_whole_range() {
        let planted = 0x5_5AA0usize;
        let mut window = [0usize; 16];
        window[0] = planted; // lowest word, read last
        window[15] = planted + 8; // highest word, read first

        let base = window.as_ptr() as usize;
        let mut candidates = Registry::new();
        unsafe {
            scan_stack_window(
                base - WORD_SIZE,
                base + 15 * WORD_SIZE,
                planted - 1,
                planted + 9,
                &mut candidates,
            );
        }

        assert!(candidates.contains(planted));
        assert!(candidates.contains(planted + 8));
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn duplicate_candidates_collapse_into_one_entry() {
        let planted = 0x5_5AA0usize;
        let window = [planted; 8];

        let base = window.as_ptr() as usize;
        let mut candidates = Registry::new();
        unsafe {
            scan_stack_window(
                base - WORD_SIZE,
                base + 7 * WORD_SIZE,
                planted - 1,
                planted + 1,
                &mut candidates,
            );
        }

        assert_eq!(candidates.len(), 1);
    }
}
