/*
 * TCB Registry
 *
 * Maps thread ids to their TCB and assigns the smallest free id on spawn.
 * Adapted to a HashMap (rather than a Vec scanned linearly) since the
 * dispatch wake-scan and the ready-queue/blocked-set invariants need O(1)
 * id membership tests over every live thread.
 */

use std::collections::HashMap;

use crate::error::ThreadLibError;
use crate::stack_pool::MAX_THREADS;
use crate::tcb::{Tcb, ThreadId};

#[derive(Default)]
pub struct Registry {
    threads: HashMap<ThreadId, Tcb>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            threads: HashMap::new(),
        }
    }

    pub fn insert(&mut self, tcb: Tcb) {
        self.threads.insert(tcb.id, tcb);
    }

    pub fn get(&self, id: ThreadId) -> Option<&Tcb> {
        self.threads.get(&id)
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut Tcb> {
        self.threads.get_mut(&id)
    }

    pub fn remove(&mut self, id: ThreadId) -> Option<Tcb> {
        self.threads.remove(&id)
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        self.threads.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.threads.keys().copied()
    }

    /// Returns the smallest non-negative integer not currently registered,
    /// subject to `id < MAX_THREADS`.
    pub fn smallest_free_id(&self) -> Result<ThreadId, ThreadLibError> {
        for candidate in 0..MAX_THREADS {
            let id = ThreadId(candidate);
            if !self.threads.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(ThreadLibError::Capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn smallest_free_id_fills_gaps() {
        let mut reg = Registry::new();
        reg.insert(Tcb::main());
        reg.insert(Tcb::spawned(ThreadId(1), 0, Context::blank(), || {}));
        reg.insert(Tcb::spawned(ThreadId(2), 1, Context::blank(), || {}));

        assert_eq!(reg.smallest_free_id().unwrap(), ThreadId(3));
        reg.remove(ThreadId(1));
        assert_eq!(reg.smallest_free_id().unwrap(), ThreadId(1));
    }

    #[test]
    fn smallest_free_id_exhausted() {
        let mut reg = Registry::new();
        for i in 0..MAX_THREADS {
            reg.insert(Tcb::spawned(ThreadId(i), i, Context::blank(), || {}));
        }
        assert!(matches!(reg.smallest_free_id(), Err(ThreadLibError::Capacity)));
    }

    #[test]
    fn get_and_remove_round_trip() {
        let mut reg = Registry::new();
        reg.insert(Tcb::main());
        assert!(reg.contains(ThreadId(0)));
        assert_eq!(reg.len(), 1);

        let removed = reg.remove(ThreadId(0)).expect("must be present");
        assert_eq!(removed.id, ThreadId(0));
        assert!(reg.is_empty());
        assert!(reg.get(ThreadId(0)).is_none());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Spawn,
        Remove(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => Just(Op::Spawn),
            1 => (0..MAX_THREADS).prop_map(Op::Remove),
        ]
    }

    proptest! {
        /// Spawn always assigns the smallest id not currently registered,
        /// for any interleaving of spawns and removals that never exceeds
        /// capacity.
        #[test]
        fn smallest_free_id_is_always_the_true_minimum_gap(ops in prop::collection::vec(op_strategy(), 0..200)) {
            let mut reg = Registry::new();
            let mut live: Vec<usize> = Vec::new();

            for op in ops {
                match op {
                    Op::Spawn => {
                        if reg.len() >= MAX_THREADS {
                            continue;
                        }
                        let id = reg.smallest_free_id().unwrap();
                        let expected = (0..MAX_THREADS).find(|c| !live.contains(c)).unwrap();
                        prop_assert_eq!(id.0, expected);

                        reg.insert(Tcb::spawned(id, id.0, Context::blank(), || {}));
                        live.push(id.0);
                    }
                    Op::Remove(candidate) => {
                        if let Some(pos) = live.iter().position(|&id| id == candidate) {
                            live.remove(pos);
                            reg.remove(ThreadId(candidate));
                        }
                    }
                }
            }
        }
    }
}
