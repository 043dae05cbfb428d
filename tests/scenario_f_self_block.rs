/*
 * Scenario F: self-block. A thread blocking itself transfers control away
 * without returning until another thread resumes it.
 */

use std::sync::atomic::{AtomicBool, Ordering};

static ENTERED_BLOCK: AtomicBool = AtomicBool::new(false);
static RETURNED_FROM_BLOCK: AtomicBool = AtomicBool::new(false);

fn self_blocking_worker() {
    let id = uthreads::get_tid();
    ENTERED_BLOCK.store(true, Ordering::SeqCst);
    uthreads::block(id).expect("self-block");
    RETURNED_FROM_BLOCK.store(true, Ordering::SeqCst);
    loop {
        std::hint::spin_loop();
    }
}

#[test]
fn self_block_suspends_until_another_thread_resumes_it() {
    uthreads::init(10_000).expect("init");

    let id = uthreads::spawn(self_blocking_worker).expect("spawn");

    while !ENTERED_BLOCK.load(Ordering::SeqCst) {
        std::hint::spin_loop();
    }

    // Give main several more quanta to prove it keeps running with the
    // worker parked, not returned from its own block() call.
    let start = uthreads::get_total_quantums();
    while uthreads::get_total_quantums() < start + 3 {
        std::hint::spin_loop();
    }
    assert!(!RETURNED_FROM_BLOCK.load(Ordering::SeqCst));

    uthreads::resume(id).expect("resume from main");
    while !RETURNED_FROM_BLOCK.load(Ordering::SeqCst) {
        std::hint::spin_loop();
    }
}
