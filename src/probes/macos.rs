//! `sysctl`/IOKit/subprocess-based macOS techniques.

use std::process::Command;

use sysctl::Sysctl;

use crate::brand::BrandId;
use crate::brand::BrandTally;

/// `sysctl`'s `CtlValue` renders through `Display` regardless of its
/// underlying C type, which is the simplest way to read both string-typed
/// (`hw.model`) and integer-typed (`hw.memsize`) names through one path.
pub(crate) fn sysctl_string(name: &str) -> Option<String> {
    let val = sysctl::Ctl::new(name).ok()?.value().ok()?;
    Some(val.to_string())
}

pub(crate) fn sysctl_u64(name: &str) -> Option<u64> {
    sysctl_string(name)?.trim().parse().ok()
}

/// `hw.model` names the virtual machine platform directly on Apple's own
/// Virtualization.framework and on third-party hypervisors that forge a
/// Mac model string.
pub fn hwmodel(tally: &mut BrandTally) -> bool {
    let Some(model) = sysctl_string("hw.model") else {
        return false;
    };
    let lower = model.to_lowercase();
    if lower.contains("vmware") {
        tally.add(BrandId::Vmware, 2);
        return true;
    }
    if lower.contains("parallels") {
        tally.add(BrandId::Parallels, 2);
        return true;
    }
    if lower.is_empty() || lower == "virtualmac2,1" || lower.starts_with("vmm") {
        tally.add(BrandId::VirtualApple, 1);
        return true;
    }
    false
}

/// `hw.physicalcpu` vs. `hw.logicalcpu`: a host that reports no SMT/
/// hyperthreading on hardware that should have it is consistent with a
/// virtualized topology.
pub fn mac_hyperthread(_tally: &mut BrandTally) -> bool {
    let physical = sysctl_u64("hw.physicalcpu");
    let logical = sysctl_u64("hw.logicalcpu");
    match (physical, logical) {
        (Some(p), Some(l)) => p == l && p > 1,
        _ => false,
    }
}

/// Same low-memory heuristic as [`crate::probes::common::memory`] but
/// sourced directly from `hw.memsize` rather than the cross-platform path,
/// so it still fires even if the common probe is disabled independently.
pub fn mac_memsize(_tally: &mut BrandTally) -> bool {
    sysctl_u64("hw.memsize")
        .map(|bytes| bytes < 4 * 1024 * 1024 * 1024)
        .unwrap_or(false)
}

/// `ioreg -l` dumps the IOKit registry; virtualized Macs typically lack a
/// battery/platform-expert entry a physical Mac always has.
pub fn mac_iokit(_tally: &mut BrandTally) -> bool {
    let Ok(output) = Command::new("ioreg").args(["-rd1", "-c", "IOPlatformExpertDevice"]).output() else {
        return false;
    };
    let text = String::from_utf8_lossy(&output.stdout);
    !text.contains("board-id") && !text.is_empty()
}

/// Broader `ioreg -l` text scan for known hypervisor vendor strings, kept
/// separate from [`mac_iokit`]'s structural check since it targets a
/// different entry (the root device tree, not the platform expert alone).
pub fn ioreg_grep(tally: &mut BrandTally) -> bool {
    let Ok(output) = Command::new("ioreg").args(["-l"]).output() else {
        return false;
    };
    let text = String::from_utf8_lossy(&output.stdout).to_lowercase();
    if text.contains("vmware") {
        tally.add(BrandId::Vmware, 1);
        return true;
    }
    if text.contains("virtualbox") {
        tally.add(BrandId::VirtualBox, 1);
        return true;
    }
    if text.contains("parallels") {
        tally.add(BrandId::Parallels, 1);
        return true;
    }
    if text.contains("apple virtual machine") {
        tally.add(BrandId::VirtualApple, 1);
        return true;
    }
    false
}

/// `csrutil status` reporting System Integrity Protection disabled is
/// common in CI/analysis images, including Apple's own virtualized CI
/// runners; weight is low (20) since plenty of real developer machines
/// disable SIP deliberately.
pub fn mac_sip(_tally: &mut BrandTally) -> bool {
    let Ok(output) = Command::new("csrutil").arg("status").output() else {
        return false;
    };
    let text = String::from_utf8_lossy(&output.stdout).to_lowercase();
    text.contains("disabled")
}

pub(crate) fn running_process_names() -> std::io::Result<Vec<String>> {
    let output = Command::new("ps").args(["-Ao", "comm="]).output()?;
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(text.lines().map(|l| l.trim().to_string()).collect())
}
