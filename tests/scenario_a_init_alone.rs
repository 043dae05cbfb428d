/*
 * Scenario A: init alone. Immediately after init, bookkeeping reflects the
 * main thread as having run for its first (synthetic) quantum.
 */

#[test]
fn init_alone_reports_main_thread_running_its_first_quantum() {
    uthreads::init(100_000).expect("init should succeed exactly once per process");

    assert_eq!(uthreads::get_total_quantums(), 1);
    assert_eq!(uthreads::get_tid(), uthreads::ThreadId(0));
    assert_eq!(uthreads::get_quantums(uthreads::ThreadId(0)).unwrap(), 1);
}
