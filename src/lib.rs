//! `gcalloc` is a conservative mark-and-sweep garbage collector layered
//! over a manually managed heap. User code requests memory through a
//! [`Collector`] instead of the raw allocator, and the collector
//! periodically reclaims blocks that are no longer reachable from the
//! program's call stack or from the interiors of other tracked blocks.
//!
//! "Conservative" means the collector never knows whether a word really
//! is a pointer: any stack or heap word whose value matches a tracked
//! block address keeps that block alive. Reachability is therefore
//! over-approximated, never under-approximated, and objects never move.
//!
//! ```no_run
//! use gcalloc::{Collector, stack_anchor};
//!
//! // Boxed: see the usage notes on `Collector`.
//! let mut gc = Box::new(unsafe { Collector::new(stack_anchor!()) });
//!
//! unsafe {
//!     let scratch = gc.alloc(128);
//!     // ... use scratch, drop the pointer on the floor ...
//!     let _ = scratch;
//! }
//!
//! gc.collect(); // unreferenced blocks go back to the system allocator
//! println!("{}", gc.diagnostics());
//! ```
//!
//! Not a moving or compacting collector, not generational, and not
//! thread-aware: one collector instance belongs to one thread.

mod collector;
mod kernel;
mod record;
mod registry;
mod scan;

pub mod utils;

pub use collector::{Collector, Diagnostics};
pub use record::Record;

/// Evaluates to the address of a fresh local in the invoking frame,
/// suitable as the `stack_base` argument of [`Collector::new`].
///
/// Invoke it in a frame that stays alive for as long as the collector is
/// used (typically `main`, or the test function driving a collector), so
/// that every later collection scans a window inside live stack.
#[macro_export]
macro_rules! stack_anchor {
    () => {{
        let anchor: usize = 0;
        ::std::hint::black_box(&anchor as *const usize as usize)
    }};
}
