use std::fmt;
use std::ptr;

use log::debug;

use crate::kernel;
use crate::record::Record;
use crate::registry::Registry;
use crate::scan;
use crate::utils::{self, WORD_SIZE};

/// A conservative mark-and-sweep collector over a manually managed heap.
///
/// User code requests memory through [`Collector::alloc`] instead of the
/// raw allocator; the collector keeps one [`Record`] per block and
/// periodically reclaims the blocks no longer reachable from the scanned
/// stack window or from the interior bytes of other tracked blocks.
///
/// A collection cycle has two phases, always run back to back:
///
/// ```text
///   stack window  ----+
///                     |        +----------------+        +-----------+
///                     +------> | candidate set  | -----> | mark bits | --+
///                     |        +----------------+        +-----------+   |
///   block interiors --+                                                  |
///                                                             sweep <----+
/// ```
///
/// Single-threaded and non-reentrant: no API call may run concurrently
/// with a collection on the same instance.
///
/// Two usage notes carried by the conservative design:
///
/// * Keep the instance itself off the scanned stack window (boxed, or
///   above the anchor). The extent fields hold real block addresses, so a
///   collector sitting inside the window would keep its own extreme
///   blocks alive.
/// * Dropping the collector releases only the registry's storage. Blocks
///   still tracked at that point are **not** released; run [`Collector::collect`]
///   with no surviving roots first if full reclamation is wanted.
pub struct Collector {
    /// One record per tracked block, keyed by address.
    records: Registry,
    /// High boundary of the stack scan window, captured at initialization.
    stack_base: usize,
    /// Lowest tracked block address observed, 0 while nothing is tracked.
    min_addr: usize,
    /// Highest tracked block address observed, 0 while nothing is tracked.
    max_addr: usize,
    /// Number of blocks currently tracked.
    section_count: usize,
    /// Sum of the tracked block sizes in bytes.
    byte_count: usize,
    /// Tracked-byte level above which [`Collector::alloc`] runs a full
    /// collection before servicing the request.
    collect_threshold: usize,
}

impl Collector {
    /// Creates a collector that scans the stack down from `stack_base`.
    ///
    /// The [`crate::stack_anchor`] macro evaluates to a suitable anchor in
    /// the invoking frame.
    ///
    /// **SAFETY**: Caller must guarantee that `stack_base` is a readable
    /// address on the current thread's stack, at or above the frame that
    /// will call [`Collector::collect`] and [`Collector::alloc`]. Every
    /// word between that anchor and the collection call site gets read
    /// during marking.
    pub unsafe fn new(stack_base: usize) -> Self {
        Self {
            records: Registry::new(),
            stack_base,
            min_addr: 0,
            max_addr: 0,
            section_count: 0,
            byte_count: 0,
            collect_threshold: 0,
        }
    }

    /// Requests `size` bytes of tracked memory.
    ///
    /// Runs a full collection first whenever the tracked byte count is
    /// above the collection threshold. Returns a null pointer if the
    /// underlying allocator fails; nothing is registered and no counter
    /// moves in that case.
    ///
    /// **SAFETY**: See [`Collector::new`]; the stack anchor contract must
    /// still hold because this call may collect.
    pub unsafe fn alloc(&mut self, size: usize) -> *mut u8 {
        if self.byte_count > self.collect_threshold {
            self.collect();
        }

        let ptr = unsafe { kernel::raw_alloc(size) };
        if ptr.is_null() {
            return ptr::null_mut();
        }

        let addr = ptr as usize;
        let inserted = self.records.insert(Record::new(addr, size));

        // A fresh pointer colliding with a live record means the system
        // allocator reused an address we still track. Loud in debug
        // builds, a silent no-op in release.
        debug_assert!(inserted, "allocator returned tracked address {addr:#x}");

        if inserted {
            if addr < self.min_addr || self.min_addr == 0 {
                self.min_addr = addr;
            }
            if addr > self.max_addr || self.max_addr == 0 {
                self.max_addr = addr;
            }
            self.section_count += 1;
            self.byte_count += size;
        }

        debug!("allocated {size} bytes @ {addr:#x}");
        ptr
    }

    /// Like [`Collector::alloc`], with the block zeroed before return.
    ///
    /// **SAFETY**: Same contract as [`Collector::alloc`].
    pub unsafe fn alloc_zeroed(&mut self, size: usize) -> *mut u8 {
        let ptr = unsafe { self.alloc(size) };

        if !ptr.is_null() {
            unsafe { utils::clear(ptr, size) };
        }

        ptr
    }

    /// Releases one tracked block directly, without marking.
    ///
    /// A null pointer, an address that was never tracked, and an address
    /// freed twice are all tolerated no-ops.
    ///
    /// **SAFETY**: Caller must guarantee that nothing reads `ptr` after
    /// this call; the memory goes back to the system allocator.
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        let addr = ptr as usize;
        let Some(record) = self.records.get(addr) else {
            return;
        };
        let size = record.size;

        // Heuristic extent narrowing, not an exact recomputation: when
        // the extreme block goes away the bound steps just past it. The
        // next allocation widens the extent again.
        if addr == self.min_addr {
            self.min_addr += size;
        }
        if addr == self.max_addr {
            self.max_addr -= 1;
        }

        self.section_count -= 1;
        self.byte_count -= size;
        self.records.remove(addr);

        debug!("freed {size} bytes @ {addr:#x}");
        unsafe { kernel::raw_free(ptr) };
    }

    /// Runs one full collection cycle, mark then sweep, to completion.
    pub fn collect(&mut self) {
        let before = self.section_count;

        self.mark();
        self.sweep();

        debug!(
            "collection reclaimed {} of {} sections",
            before - self.section_count,
            before
        );
    }

    /// Mark phase: builds the candidate address set from the stack window
    /// and from every tracked block's interior, then rewrites every mark
    /// flag from candidate membership.
    fn mark(&mut self) {
        // Transient candidate set. Its storage is ordinary Rust memory,
        // so growing it mid-collection never re-enters the tracked
        // allocation path.
        let mut candidates = Registry::new();

        // The filter is carried as exclusive, off-by-one fences. The
        // fence values themselves match no tracked address, so spilled
        // copies of them in the scan path's own frames cannot retain the
        // extreme blocks. With nothing tracked both fences collapse and
        // nothing qualifies.
        let low = self.min_addr.wrapping_sub(1);
        let high = self.max_addr.wrapping_add(1);

        let floor = scan::stack_floor();
        unsafe {
            scan::scan_stack_window(floor, self.stack_base, low, high, &mut candidates);
        }

        // One extra hop from every tracked block, marked or not. This is
        // deliberately not a transitive closure: a block referenced only
        // from the interior of another tracked block survives exactly one
        // cycle beyond its referrer, and nothing directly referenced is
        // ever freed.
        for record in &self.records {
            if record.size < WORD_SIZE {
                continue;
            }
            unsafe {
                scan::scan_block(record.addr, record.size, low, high, &mut candidates);
            }
        }

        // Always an explicit assignment, never state left over from the
        // previous cycle.
        self.records
            .for_each_mut(|record| record.in_use = candidates.contains(record.addr));
    }

    /// Sweep phase: releases every unmarked block and clears the flag on
    /// the survivors for the next cycle.
    fn sweep(&mut self) {
        let mut doomed: Vec<usize> = Vec::new();

        self.records.for_each_mut(|record| {
            if record.in_use {
                record.in_use = false;
            } else {
                doomed.push(record.addr);
            }
        });

        // Gathered first so releasing never runs inside the traversal.
        for addr in doomed {
            unsafe { self.free(addr as *mut u8) };
        }
    }

    /// Sets the tracked-byte level above which [`Collector::alloc`]
    /// collects first. The threshold never moves on its own; with the
    /// default of zero any tracked byte triggers a collection on the next
    /// request.
    pub fn set_collect_threshold(&mut self, bytes: usize) {
        self.collect_threshold = bytes;
    }

    /// Whether `ptr` is currently a tracked block address.
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.records.contains(ptr as usize)
    }

    /// Number of blocks currently tracked.
    pub fn section_count(&self) -> usize {
        self.section_count
    }

    /// Sum of the tracked block sizes in bytes.
    pub fn byte_count(&self) -> usize {
        self.byte_count
    }

    /// Snapshot of the observed heap extent and the tracking counters.
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            min_addr: self.min_addr,
            max_addr: self.max_addr,
            section_count: self.section_count,
            byte_count: self.byte_count,
        }
    }
}

impl Drop for Collector {
    /// Teardown releases the registry's own storage and nothing else.
    /// Still-tracked blocks stay allocated; see the type-level note.
    fn drop(&mut self) {
        if !self.records.is_empty() {
            debug!(
                "collector dropped with {} sections ({} bytes) still tracked",
                self.records.len(),
                self.byte_count
            );
        }
    }
}

/// Human-readable collector summary. The fields are the contract; the
/// rendered text is informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diagnostics {
    pub min_addr: usize,
    pub max_addr: usize,
    pub section_count: usize,
    pub byte_count: usize,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GC Summary:")?;
        writeln!(
            f,
            "\t Minimal Address: [{:#x}] Maximal Address: [{:#x}]",
            self.min_addr, self.max_addr
        )?;
        write!(
            f,
            "\t Memory sections count: {} \t Total memory allocated: {} bytes",
            self.section_count, self.byte_count
        )
    }
}
