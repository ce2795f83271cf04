//! Detects whether the current process is executing inside a virtualized,
//! emulated, or sandboxed environment, and attributes a brand where
//! possible (VMware, VirtualBox, KVM, QEMU, Hyper-V, Parallels, Xen, Bochs,
//! Wine, Docker, common sandbox analyzers).
//!
//! The crate is a collection of independent, platform-gated probes
//! ("techniques") combined by a weighted-score aggregator into a single
//! boolean verdict or confidence percentage, plus a brand tally that
//! attributes the result to a specific hypervisor/sandbox by plurality
//! vote. Four operations make up the public surface:
//!
//! - [`detect`] — does *anything* in `flags` look like a VM?
//! - [`percentage`] — same evidence, as a `0..=100` confidence score.
//! - [`brand`] — which hypervisor/sandbox, if any, does the evidence point to?
//! - [`check`] — run exactly one named technique, bypassing the aggregator
//!   and the memoization cache entirely.
//!
//! ```no_run
//! if vmdetect::detect(vmdetect::FlagSet::DEFAULT) {
//!     eprintln!("running inside: {}", vmdetect::brand());
//! }
//! ```
//!
//! Every probe is read-only with respect to the host and absorbs its own
//! OS-level failures: a missing `/sys` entry or an inaccessible registry
//! key is evidence of absence, not a crate error. The only error this
//! crate returns is [`Error::InvalidArgument`], from [`check`] alone.

mod aggregator;
mod brand;
mod cache;
mod error;
mod flags;
mod probes;
mod registry;
mod result;
#[cfg(test)]
mod testing;

pub use brand::BrandId;
pub use error::Error;
pub use flags::FlagSet;
pub use flags::TechniqueId;
pub use result::DetectionResult;

/// Run the aggregator over `flags` (subject to the memoization cache) and
/// return the boolean verdict (§4.4, §4.5).
///
/// An empty `flags` is treated as [`FlagSet::DEFAULT`].
pub fn detect(flags: FlagSet) -> bool {
    run(flags).verdict
}

/// Same evidence as [`detect`], reported as a confidence percentage in
/// `0..=100`.
pub fn percentage(flags: FlagSet) -> u8 {
    run(flags).percentage
}

/// Run the aggregator with [`FlagSet::DEFAULT`] and return the
/// human-readable name of the winning brand, or the literal `"Unknown"`
/// when the tally is empty or tied at the top.
pub fn brand() -> String {
    run(FlagSet::DEFAULT).brand.to_string()
}

/// Invoke exactly one named technique, bypassing the aggregator's scoring
/// and the memoization cache entirely (§4.5).
///
/// `flag` must carry exactly one [`TechniqueId`] bit and no meta-flag bit;
/// any other shape is [`Error::InvalidArgument`].
pub fn check(flag: FlagSet) -> Result<bool, Error> {
    if !flag.is_single_technique() {
        return Err(Error::invalid_argument(format!(
            "check() requires exactly one technique flag and no meta-flags, got {flag:?}"
        )));
    }

    let technique_bit = flag.technique_bits();
    let id = flags::technique_from_bit(technique_bit)
        .expect("is_single_technique() guarantees a valid technique bit");

    let descriptor = registry::lookup(id);

    #[cfg(test)]
    if let Some((hit, _vote)) = testing::seam::lookup(id) {
        testing::seam::record_invocation(id);
        return Ok(hit);
    }

    let current_platform = registry::Platforms::current();
    let runnable = match current_platform {
        Some(platform) => descriptor.platforms.intersects(platform),
        None => false,
    };
    if !runnable {
        return Ok(false);
    }

    let mut scratch = brand::BrandTally::new();
    Ok((descriptor.run)(&mut scratch))
}

/// Shared path behind `detect`/`percentage`/`brand`: expand meta-flags,
/// consult the cache, run the aggregator on a miss (or when `NO_MEMO` is
/// set), and store the result unless `NO_MEMO` was set (§4.3, §4.6).
fn run(flags: FlagSet) -> DetectionResult {
    let (enabled, no_memo, extreme) = flags::expand(flags);

    if !no_memo {
        if let Some(cached) = cache::load() {
            return cached;
        }
    }

    let result = aggregator::run(enabled, extreme);

    if !no_memo {
        cache::store(result);
    }

    result
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::MutexGuard;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::seam;

    /// `detect`/`percentage`/`brand` all read and write the single
    /// process-global cache slot in `src/cache.rs`. `cargo test` runs
    /// `#[test]` fns concurrently across threads in one process, so every
    /// test below takes this once, for its whole duration, before touching
    /// the seam or the cache at all — `reset()` itself does not lock, so
    /// that a test may call it more than once without deadlocking itself.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn lock() -> MutexGuard<'static, ()> {
        TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reset() {
        seam::reset();
        cache::clear();
    }

    #[test]
    fn percentage_is_always_in_range() {
        let _guard = lock();
        reset();
        seam::stub(TechniqueId::Vmid, true, None);
        assert!(percentage(FlagSet::DEFAULT) <= 100);
        reset();
        assert!(percentage(FlagSet::ALL) <= 100);
    }

    #[test]
    fn verdict_matches_percentage_threshold_outside_extreme() {
        let _guard = lock();
        reset();
        seam::stub(TechniqueId::Vmid, true, None);
        let pct = percentage(FlagSet::VMID | FlagSet::NO_MEMO);
        reset();
        seam::stub(TechniqueId::Vmid, true, None);
        let verdict = detect(FlagSet::VMID | FlagSet::NO_MEMO);
        assert_eq!(verdict, pct >= 100);
    }

    #[test]
    fn extreme_is_true_whenever_any_enabled_probe_hits() {
        let _guard = lock();
        reset();
        seam::stub(TechniqueId::Rdtsc, true, None);
        assert!(detect(FlagSet::RDTSC | FlagSet::EXTREME | FlagSet::NO_MEMO));
    }

    #[test]
    fn subset_monotonicity_of_score() {
        let _guard = lock();
        reset();
        seam::stub(TechniqueId::Vmid, true, None);
        seam::stub(TechniqueId::Brand, true, None);
        let small = percentage(FlagSet::VMID | FlagSet::NO_MEMO);
        reset();
        seam::stub(TechniqueId::Vmid, true, None);
        seam::stub(TechniqueId::Brand, true, None);
        let big = percentage(FlagSet::VMID | FlagSet::BRAND | FlagSet::NO_MEMO);
        assert!(small <= big);
    }

    #[test]
    fn check_is_pure_and_bypasses_cache() {
        let _guard = lock();
        reset();
        seam::stub(TechniqueId::Vmid, true, None);
        let first = check(FlagSet::VMID).unwrap();
        let second = check(FlagSet::VMID).unwrap();
        assert_eq!(first, second);
        assert!(cache::load().is_none());
    }

    #[test]
    fn check_rejects_multiple_technique_bits() {
        let _guard = lock();
        reset();
        let err = check(FlagSet::VMID | FlagSet::BRAND).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn check_rejects_meta_flag() {
        let _guard = lock();
        reset();
        let err = check(FlagSet::NO_MEMO).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn check_rejects_empty_flag() {
        let _guard = lock();
        reset();
        let err = check(FlagSet::empty()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn default_subtraction_skips_the_removed_probe() {
        let _guard = lock();
        reset();
        seam::stub(TechniqueId::Dockerenv, true, None);
        let _ = detect((FlagSet::DEFAULT & !FlagSet::DOCKERENV) | FlagSet::NO_MEMO);
        assert_eq!(seam::invocation_count(TechniqueId::Dockerenv), 0);
    }

    #[test]
    fn all_includes_cursor_default_does_not() {
        assert!(FlagSet::ALL.contains(FlagSet::CURSOR));
        assert!(!FlagSet::DEFAULT.contains(FlagSet::CURSOR));
    }

    #[test]
    fn memoized_calls_invoke_each_probe_at_most_once() {
        let _guard = lock();
        reset();
        seam::stub(TechniqueId::Vmid, true, None);
        let _ = detect(FlagSet::VMID);
        let _ = detect(FlagSet::VMID);
        assert_eq!(seam::invocation_count(TechniqueId::Vmid), 1);

        reset();
        seam::stub(TechniqueId::Vmid, true, None);
        let _ = detect(FlagSet::VMID | FlagSet::NO_MEMO);
        let _ = detect(FlagSet::VMID | FlagSet::NO_MEMO);
        assert_eq!(seam::invocation_count(TechniqueId::Vmid), 2);
    }

    #[test]
    fn brand_is_a_stable_literal_or_unknown() {
        let _guard = lock();
        reset();
        let name = brand();
        assert!(!name.is_empty());
    }

    // S1: one probe, weight 100, hit.
    #[test]
    fn scenario_single_strong_probe_reaches_certainty() {
        let _guard = lock();
        reset();
        seam::stub(TechniqueId::Vmid, true, None);
        assert!(detect(FlagSet::VMID | FlagSet::NO_MEMO));
        reset();
        seam::stub(TechniqueId::Vmid, true, None);
        assert_eq!(percentage(FlagSet::VMID | FlagSet::NO_MEMO), 100);
    }

    // S2: two weight-50 probes; both hit reaches certainty, one disabled halves it.
    #[test]
    fn scenario_two_moderate_probes_combine_to_certainty() {
        let _guard = lock();
        reset();
        seam::stub(TechniqueId::Brand, true, None);
        seam::stub(TechniqueId::Vmid0x4, true, None);
        let flags = FlagSet::BRAND | FlagSet::VMID_0X4 | FlagSet::NO_MEMO;
        assert!(detect(flags));
        reset();
        seam::stub(TechniqueId::Brand, true, None);
        seam::stub(TechniqueId::Vmid0x4, true, None);
        assert_eq!(percentage(flags), 100);

        reset();
        seam::stub(TechniqueId::Brand, true, None);
        let only_one = FlagSet::BRAND | FlagSet::NO_MEMO;
        assert!(!detect(only_one));
        reset();
        seam::stub(TechniqueId::Brand, true, None);
        assert_eq!(percentage(only_one), 50);
    }

    // S3: one weight-30 probe voting VirtualBox.
    #[test]
    fn scenario_weak_probe_with_brand_vote() {
        let _guard = lock();
        reset();
        seam::stub(TechniqueId::Gamarue, true, Some((BrandId::VirtualBox, 1)));
        let flags = FlagSet::GAMARUE | FlagSet::NO_MEMO;
        assert!(!detect(flags));
        reset();
        seam::stub(TechniqueId::Gamarue, true, Some((BrandId::VirtualBox, 1)));
        assert_eq!(percentage(flags), 30);
        reset();
        seam::stub(TechniqueId::Gamarue, true, Some((BrandId::VirtualBox, 1)));
        assert!(detect(flags | FlagSet::EXTREME));
        reset();
        seam::stub(TechniqueId::Gamarue, true, Some((BrandId::VirtualBox, 1)));
        let result = aggregator::run(flags::expand(flags).0, false);
        assert_eq!(result.brand, BrandId::VirtualBox);
    }

    // S4: plurality vote across two probes for KVM vs. one for QEMU.
    #[test]
    fn scenario_plurality_brand_vote() {
        let _guard = lock();
        reset();
        seam::stub(TechniqueId::KvmReg, true, Some((BrandId::Kvm, 1)));
        seam::stub(TechniqueId::KvmDrivers, true, Some((BrandId::Kvm, 1)));
        seam::stub(TechniqueId::QemuBrand, true, Some((BrandId::Qemu, 1)));
        let flags = FlagSet::KVM_REG | FlagSet::KVM_DRIVERS | FlagSet::QEMU_BRAND | FlagSet::NO_MEMO;
        let result = aggregator::run(flags::expand(flags).0, false);
        assert_eq!(result.brand, BrandId::Kvm);
    }

    // S5: a tie between two brands resolves to Unknown.
    #[test]
    fn scenario_tied_brand_vote_is_unknown() {
        let _guard = lock();
        reset();
        seam::stub(TechniqueId::Vmid, true, Some((BrandId::Vmware, 1)));
        seam::stub(TechniqueId::VboxReg, true, Some((BrandId::VirtualBox, 1)));
        let flags = FlagSet::VMID | FlagSet::VBOX_REG | FlagSet::NO_MEMO;
        let result = aggregator::run(flags::expand(flags).0, false);
        assert_eq!(result.brand, BrandId::Unknown);
    }

    // S6: check() success and argument-error cases.
    #[test]
    fn scenario_check_success_and_invalid_argument() {
        let _guard = lock();
        reset();
        seam::stub(TechniqueId::Vmid, true, None);
        assert!(check(FlagSet::VMID).unwrap());
        assert!(check(FlagSet::VMID | FlagSet::BRAND).is_err());
    }
}
