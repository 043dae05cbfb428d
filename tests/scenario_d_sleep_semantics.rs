/*
 * Scenario D: sleep semantics. A worker that sleeps for k quanta is not
 * rescheduled for at least k quanta after the call.
 */

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static T0: AtomicU64 = AtomicU64::new(0);
static T1: AtomicU64 = AtomicU64::new(0);
static DONE: AtomicBool = AtomicBool::new(false);

fn sleepy_worker() {
    T0.store(uthreads::get_total_quantums(), Ordering::SeqCst);
    uthreads::sleep(3).expect("sleep");
    T1.store(uthreads::get_total_quantums(), Ordering::SeqCst);
    DONE.store(true, Ordering::SeqCst);
    loop {
        std::hint::spin_loop();
    }
}

#[test]
fn sleeping_thread_is_not_rescheduled_before_its_quota_elapses() {
    uthreads::init(10_000).expect("init");

    let id = uthreads::spawn(sleepy_worker).expect("spawn");
    assert_eq!(id, uthreads::ThreadId(1));

    while !DONE.load(Ordering::SeqCst) {
        std::hint::spin_loop();
    }

    let t0 = T0.load(Ordering::SeqCst);
    let t1 = T1.load(Ordering::SeqCst);
    assert!(t1 >= t0 + 4, "t0={t0} t1={t1}");
}
