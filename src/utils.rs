//! This file contains the raw byte-range primitives used by the collector.
//! They all work the same way: process the range in native-word chunks and
//! then finish the remainder with a byte tail.

use std::mem;

/// Native word size of the computer in bytes. Every primitive in this
/// module moves memory in chunks of this size before falling back to
/// single bytes. It is also the stride of the pointer scans in
/// [`crate::scan`].
pub(crate) const WORD_SIZE: usize = mem::size_of::<usize>();

/// Zeroes `size` bytes starting at `dst`.
///
/// **SAFETY**: Caller must guarantee that `dst..dst + size` is valid for
/// writes.
pub unsafe fn clear(dst: *mut u8, size: usize) {
    let words = size / WORD_SIZE;

    unsafe {
        for i in 0..words {
            (dst as *mut usize).add(i).write_unaligned(0);
        }

        for offset in (words * WORD_SIZE)..size {
            dst.add(offset).write(0);
        }
    }
}

/// Copies `size` bytes from `src` to `dst`, lowest address first.
///
/// **SAFETY**: Caller must guarantee that both ranges are valid and that
/// they do not overlap with `dst` above `src`.
pub unsafe fn copy(src: *const u8, dst: *mut u8, size: usize) {
    let words = size / WORD_SIZE;

    unsafe {
        for i in 0..words {
            let word = (src as *const usize).add(i).read_unaligned();
            (dst as *mut usize).add(i).write_unaligned(word);
        }

        for offset in (words * WORD_SIZE)..size {
            dst.add(offset).write(src.add(offset).read());
        }
    }
}

/// Copies `size` bytes from `src` to `dst` starting from the highest
/// address: first the partial-word byte tail, top byte downwards, then the
/// whole words from the highest word index down to zero.
///
/// This order is for callers shifting overlapping ranges towards lower
/// addresses; the registry itself never needs overlap-safe copies.
///
/// **SAFETY**: Caller must guarantee that both ranges are valid for the
/// accesses described above.
pub unsafe fn copy_reversed(src: *const u8, dst: *mut u8, size: usize) {
    let words = size / WORD_SIZE;
    let tail = size % WORD_SIZE;

    unsafe {
        let mut offset = size;
        for _ in 0..tail {
            offset -= 1;
            dst.add(offset).write(src.add(offset).read());
        }

        for i in (0..words).rev() {
            let word = (src as *const usize).add(i).read_unaligned();
            (dst as *mut usize).add(i).write_unaligned(word);
        }
    }
}

/// Compares `size` bytes at `a` and `b` for equality.
///
/// **SAFETY**: Caller must guarantee that both ranges are valid for reads.
pub unsafe fn equal(a: *const u8, b: *const u8, size: usize) -> bool {
    let words = size / WORD_SIZE;

    unsafe {
        for i in 0..words {
            let left = (a as *const usize).add(i).read_unaligned();
            let right = (b as *const usize).add(i).read_unaligned();
            if left != right {
                return false;
            }
        }

        for offset in (words * WORD_SIZE)..size {
            if a.add(offset).read() != b.add(offset).read() {
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_covers_word_chunks_and_tail() {
        // 19 bytes: two whole words plus a tail on 64-bit computers.
        let mut buffer = [0xAAu8; 19];

        unsafe { clear(buffer.as_mut_ptr(), buffer.len()) };

        assert!(buffer.iter().all(|&byte| byte == 0));
    }

    #[test]
    fn copy_moves_every_byte() {
        let src: Vec<u8> = (0..27).collect();
        let mut dst = vec![0u8; 27];

        unsafe { copy(src.as_ptr(), dst.as_mut_ptr(), src.len()) };

        assert_eq!(src, dst);
    }

    #[test]
    fn copy_reversed_matches_forward_copy() {
        let src: Vec<u8> = (0..42).rev().collect();
        let mut dst = vec![0u8; 42];

        unsafe { copy_reversed(src.as_ptr(), dst.as_mut_ptr(), src.len()) };

        assert_eq!(src, dst);
    }

    #[test]
    fn equal_detects_differences_in_word_and_tail() {
        let a: Vec<u8> = (0..21).collect();
        let mut b = a.clone();

        unsafe {
            assert!(equal(a.as_ptr(), b.as_ptr(), a.len()));

            // Difference inside a whole word.
            b[3] ^= 0xFF;
            assert!(!equal(a.as_ptr(), b.as_ptr(), a.len()));
            b[3] ^= 0xFF;

            // Difference in the byte tail.
            b[20] ^= 0xFF;
            assert!(!equal(a.as_ptr(), b.as_ptr(), a.len()));
        }
    }

    #[test]
    fn zero_sized_ranges_are_noops() {
        let a = [1u8];
        let mut b = [2u8];

        unsafe {
            clear(b.as_mut_ptr(), 0);
            copy(a.as_ptr(), b.as_mut_ptr(), 0);
            copy_reversed(a.as_ptr(), b.as_mut_ptr(), 0);
            assert!(equal(a.as_ptr(), b.as_ptr(), 0));
        }

        assert_eq!(b[0], 2);
    }
}
