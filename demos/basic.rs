use gcalloc::Collector;
use gcalloc::stack_anchor;

/// Allocates a scratch buffer and drops the pointer on the floor, the
/// way short-lived buffers go out of scope between collections.
fn churn(gc: &mut Collector) {
    unsafe {
        let scratch = gc.alloc_zeroed(50);
        println!("scratch buffer @ {scratch:?} dropped without freeing");
    }
}

fn main() {
    // Boxed so the collector's own bookkeeping stays off the scanned
    // stack; the anchor comes from main's frame.
    let mut gc = Box::new(unsafe { Collector::new(stack_anchor!()) });

    churn(&mut gc);
    churn(&mut gc);

    println!("{}", gc.diagnostics());

    gc.collect();

    println!("after collection:");
    println!("{}", gc.diagnostics());
}
