/*
 * Scenario C: terminate-other. Terminating a non-self, non-main thread
 * frees its id for reuse by the next spawn.
 */

fn busy_worker() {
    loop {
        std::hint::spin_loop();
    }
}

#[test]
fn terminating_a_worker_frees_its_id_for_reuse() {
    uthreads::init(10_000).expect("init");

    let f_id = uthreads::spawn(busy_worker).expect("spawn f");
    let _g_id = uthreads::spawn(busy_worker).expect("spawn g");

    while uthreads::get_total_quantums() < 4 {
        std::hint::spin_loop();
    }

    uthreads::terminate(f_id).expect("terminate f from main");
    assert!(uthreads::get_quantums(f_id).is_err());

    let h_id = uthreads::spawn(busy_worker).expect("spawn h");
    assert_eq!(h_id, f_id, "smallest free id must be reused");
}
