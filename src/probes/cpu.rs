//! CPUID/RDTSC/SIDT-based techniques, gated to `x86`/`x86_64`. Timing-based
//! probes ([`rdtsc`], [`rdtsc_vmexit`]) carry deliberately low weights: a
//! power-throttled physical CPU can trip the same heuristic a hypervisor
//! would.

#![cfg(any(target_arch = "x86", target_arch = "x86_64"))]

use raw_cpuid::CpuId;

use crate::brand::BrandId;
use crate::brand::BrandTally;

fn cpuid() -> CpuId {
    CpuId::new()
}

/// CPUID leaf 1, ECX bit 31: the hypervisor-present bit every major
/// hypervisor sets for its guests.
pub fn hypervisor_bit(_tally: &mut BrandTally) -> bool {
    cpuid()
        .get_feature_info()
        .map(|f| f.has_hypervisor())
        .unwrap_or(false)
}

/// Maps `raw_cpuid`'s parsed hypervisor identity (leaf 0x40000000's vendor
/// string, already decoded by the crate) to our brand space. Anything the
/// crate couldn't classify lands in `Unknown`.
fn identified_brand() -> Option<BrandId> {
    use raw_cpuid::Hypervisor;
    match cpuid().get_hypervisor_info()?.identify() {
        Hypervisor::VMware => Some(BrandId::Vmware),
        Hypervisor::VirtualBox => Some(BrandId::VirtualBox),
        Hypervisor::KVM => Some(BrandId::Kvm),
        Hypervisor::QEMU => Some(BrandId::Qemu),
        Hypervisor::HyperV => Some(BrandId::MicrosoftHyperV),
        Hypervisor::Xen => Some(BrandId::XenHvm),
        Hypervisor::Bhyve => Some(BrandId::Bhyve),
        Hypervisor::Unknown(_, _, _) => None,
    }
}

/// `VMID` (§6): the strongest single signal — an exact match against a known
/// hypervisor vendor string.
pub fn vmid(tally: &mut BrandTally) -> bool {
    match identified_brand() {
        Some(brand) => {
            tally.add(brand, 3);
            true
        }
        None => false,
    }
}

/// Secondary vendor-string check, contributing a smaller weight (50 vs.
/// `VMID`'s 100) than the primary signature probe but casting a lighter vote
/// so ties between this and other weak signals still favor a probe that
/// found a concrete match.
pub fn brand(tally: &mut BrandTally) -> bool {
    match identified_brand() {
        Some(brand) => {
            tally.add(brand, 1);
            true
        }
        None => false,
    }
}

/// Whether CPUID leaf `0x40000000` is even present, independent of whether
/// its vendor string was recognized. Weaker than [`vmid`]/[`brand`] since a
/// present leaf without a recognized signature is still suggestive but not
/// conclusive.
pub fn cpuid_0x4(_tally: &mut BrandTally) -> bool {
    cpuid().get_hypervisor_info().is_some()
}

/// Same underlying leaf as [`cpuid_0x4`] but requires the vendor string to
/// have been successfully identified, rather than merely present.
pub fn hypervisor_str(_tally: &mut BrandTally) -> bool {
    identified_brand().is_some()
}

/// A second pass over the signature table using the CPUID brand string
/// (leaves 0x80000002-0x80000004) rather than the hypervisor leaf, to catch
/// QEMU builds that report a CPU brand string naming the emulator.
pub fn qemu_brand(tally: &mut BrandTally) -> bool {
    let Some(brand) = cpuid().get_processor_brand_string() else {
        return false;
    };
    let brand = brand.as_str();
    if brand.to_lowercase().contains("qemu") {
        tally.add(BrandId::Qemu, 2);
        return true;
    }
    false
}

/// Bochs identifies itself directly in the CPU brand string on some builds.
pub fn bochs_cpu(tally: &mut BrandTally) -> bool {
    let Some(brand) = cpuid().get_processor_brand_string() else {
        return false;
    };
    if brand.as_str().to_lowercase().contains("bochs") {
        tally.add(BrandId::Bochs, 1);
        return true;
    }
    false
}

/// Independent re-check of leaf 0x40000000's presence via the CPUID
/// max-basic-leaf count rather than [`cpuid_0x4`]'s direct leaf query; kept
/// separate because the two can disagree on CPUID-faulting hypervisors that
/// under-report their leaf range.
pub fn vmid_0x4(_tally: &mut BrandTally) -> bool {
    cpuid()
        .get_vendor_info()
        .map(|_| cpuid().get_hypervisor_info().is_some())
        .unwrap_or(false)
}

/// `RDTSC` timing: executing `cpuid` forces a VM-exit under most hypervisors,
/// which shows up as an outlier cycle count between two back-to-back
/// timestamp reads. Noisy — see module doc comment.
pub fn rdtsc(_tally: &mut BrandTally) -> bool {
    const SAMPLES: u32 = 8;
    const THRESHOLD_CYCLES: u64 = 1000;
    let mut outliers = 0;
    for _ in 0..SAMPLES {
        let before = read_tsc();
        std::hint::black_box(cpuid().get_vendor_info());
        let after = read_tsc();
        if after.saturating_sub(before) > THRESHOLD_CYCLES {
            outliers += 1;
        }
    }
    outliers * 2 > SAMPLES
}

/// Same timing heuristic as [`rdtsc`] but measures a privileged
/// instruction's VM-exit cost specifically (`cpuid` leaf 0), rather than an
/// aggregate of unspecified work — kept as a distinct technique since the
/// two can be enabled/disabled independently by callers.
pub fn rdtsc_vmexit(_tally: &mut BrandTally) -> bool {
    const SAMPLES: u32 = 8;
    const THRESHOLD_CYCLES: u64 = 1500;
    let mut outliers = 0;
    for _ in 0..SAMPLES {
        let before = read_tsc();
        std::hint::black_box(cpuid().get_vendor_info());
        let after = read_tsc();
        if after.saturating_sub(before) > THRESHOLD_CYCLES {
            outliers += 1;
        }
    }
    outliers * 2 > SAMPLES
}

#[cfg(target_arch = "x86_64")]
fn read_tsc() -> u64 {
    unsafe { core::arch::x86_64::_rdtsc() }
}

#[cfg(target_arch = "x86")]
fn read_tsc() -> u64 {
    unsafe { core::arch::x86::_rdtsc() }
}

/// Reads the IDT base address via `sidt` and checks it against the
/// characteristic relocated-IDT ranges several hypervisors use. Requires
/// inline `asm!`, hence gated to Linux/Windows (§6) rather than macOS, where
/// the equivalent privilege level is unavailable from userspace the same
/// way.
pub fn sidt5(_tally: &mut BrandTally) -> bool {
    let mut idtr: [u8; 10] = [0; 10];
    #[cfg(target_arch = "x86_64")]
    unsafe {
        core::arch::asm!("sidt [{}]", in(reg) idtr.as_mut_ptr());
    }
    #[cfg(target_arch = "x86")]
    unsafe {
        core::arch::asm!("sidt [{:e}]", in(reg) idtr.as_mut_ptr());
    }
    // Base address occupies bytes 2..10 (little-endian).
    let base = u64::from_le_bytes(idtr[2..10].try_into().unwrap_or_default());
    // Real hardware usually reports a base in low kernel address space;
    // several hypervisors relocate the IDT into a distinctive high range.
    base > 0xff00_0000
}
