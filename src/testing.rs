//! Test-only seam for stubbing probe outcomes and observing invocation
//! counts, so the aggregator's contract (§8) can be verified without
//! depending on the host's actual virtualization state.
#![cfg(test)]

pub(crate) mod seam {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use crate::brand::BrandId;
    use crate::flags::TechniqueId;

    thread_local! {
        static OVERRIDES: RefCell<HashMap<TechniqueId, (bool, Option<(BrandId, u32)>)>> =
            RefCell::new(HashMap::new());
        static COUNTS: RefCell<HashMap<TechniqueId, u32>> = RefCell::new(HashMap::new());
    }

    /// Force `id`'s probe to report `hit`, casting `vote` (if any) when hit.
    pub(crate) fn stub(id: TechniqueId, hit: bool, vote: Option<(BrandId, u32)>) {
        OVERRIDES.with(|o| o.borrow_mut().insert(id, (hit, vote)));
    }

    /// Clear all stubs and invocation counters. Call at the start of every
    /// test that uses the seam: thread-local state otherwise leaks across
    /// tests run on the same worker thread.
    pub(crate) fn reset() {
        OVERRIDES.with(|o| o.borrow_mut().clear());
        COUNTS.with(|c| c.borrow_mut().clear());
    }

    pub(crate) fn invocation_count(id: TechniqueId) -> u32 {
        COUNTS.with(|c| *c.borrow().get(&id).unwrap_or(&0))
    }

    pub(crate) fn record_invocation(id: TechniqueId) {
        COUNTS.with(|c| *c.borrow_mut().entry(id).or_insert(0) += 1);
    }

    pub(crate) fn lookup(id: TechniqueId) -> Option<(bool, Option<(BrandId, u32)>)> {
        OVERRIDES.with(|o| o.borrow().get(&id).copied())
    }
}
