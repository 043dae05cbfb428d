/*
 * Scenario E: block/resume interaction with sleep. Explicitly blocking a
 * sleeping thread suppresses its wake-up until resume clears the explicit
 * block, even after its sleep quota has elapsed.
 */

use std::sync::atomic::{AtomicBool, Ordering};

static SLEEP_STARTED: AtomicBool = AtomicBool::new(false);
static RESUMED: AtomicBool = AtomicBool::new(false);

fn worker() {
    SLEEP_STARTED.store(true, Ordering::SeqCst);
    uthreads::sleep(5).expect("sleep");
    RESUMED.store(true, Ordering::SeqCst);
    loop {
        std::hint::spin_loop();
    }
}

#[test]
fn explicit_block_outlasts_sleep_expiry_until_resumed() {
    uthreads::init(10_000).expect("init");

    let id = uthreads::spawn(worker).expect("spawn");
    assert_eq!(id, uthreads::ThreadId(1));

    while !SLEEP_STARTED.load(Ordering::SeqCst) {
        std::hint::spin_loop();
    }

    // The worker just started its 5-quantum sleep; block it explicitly
    // well before that sleep would otherwise expire.
    uthreads::block(id).expect("block from main");
    let quantums_at_block = uthreads::get_quantums(id).unwrap();

    // Let more than 5 quanta pass. Because the block was explicit, the
    // worker must remain BLOCKED (and therefore un-rescheduled) despite
    // its sleep quota having elapsed.
    let start = uthreads::get_total_quantums();
    while uthreads::get_total_quantums() < start + 8 {
        std::hint::spin_loop();
    }
    assert!(!RESUMED.load(Ordering::SeqCst));
    assert_eq!(uthreads::get_quantums(id).unwrap(), quantums_at_block);

    uthreads::resume(id).expect("resume from main");
    while !RESUMED.load(Ordering::SeqCst) {
        std::hint::spin_loop();
    }
    assert!(uthreads::get_quantums(id).unwrap() > quantums_at_block);
}
