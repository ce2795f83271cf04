//! `/sys`, `/proc`, and subprocess-based Linux techniques. Subprocess probes
//! ([`dmidecode`], [`dmesg`]) require root and check `geteuid()` before
//! spawning anything (§4.2).

use std::fs;
use std::process::Command;

use crate::brand::BrandId;
use crate::brand::BrandTally;

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Thermal zones are near-universal on physical laptops/desktops and almost
/// never exposed to a VM guest.
pub fn temperature(_tally: &mut BrandTally) -> bool {
    fs::read_dir("/sys/class/thermal")
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

/// `systemd-detect-virt` already does exactly this job; shelling out to it
/// is the simplest reliable source on systemd distributions.
pub fn systemd(tally: &mut BrandTally) -> bool {
    let Ok(output) = Command::new("systemd-detect-virt").output() else {
        return false;
    };
    let result = String::from_utf8_lossy(&output.stdout).trim().to_lowercase();
    if result.is_empty() || result == "none" {
        return false;
    }
    if let Some(brand) = brand_from_systemd_detect_virt(&result) {
        tally.add(brand, 2);
    }
    true
}

fn brand_from_systemd_detect_virt(name: &str) -> Option<BrandId> {
    match name {
        "kvm" => Some(BrandId::Kvm),
        "qemu" => Some(BrandId::Qemu),
        "vmware" => Some(BrandId::Vmware),
        "oracle" | "virtualbox" => Some(BrandId::VirtualBox),
        "microsoft" => Some(BrandId::MicrosoftHyperV),
        "xen" => Some(BrandId::XenHvm),
        "parallels" => Some(BrandId::Parallels),
        "bochs" => Some(BrandId::Bochs),
        "docker" => Some(BrandId::Docker),
        _ => None,
    }
}

/// `/sys/class/dmi/id/sys_vendor` names the platform vendor directly on
/// most distributions.
pub fn cvendor(tally: &mut BrandTally) -> bool {
    let Ok(vendor) = fs::read_to_string("/sys/class/dmi/id/sys_vendor") else {
        return false;
    };
    let vendor = vendor.trim();
    if let Some(brand) = brand_from_vendor_string(vendor) {
        tally.add(brand, 2);
        return true;
    }
    false
}

fn brand_from_vendor_string(vendor: &str) -> Option<BrandId> {
    let lower = vendor.to_lowercase();
    if lower.contains("vmware") {
        Some(BrandId::Vmware)
    } else if lower.contains("virtualbox") || lower.contains("innotek") {
        Some(BrandId::VirtualBox)
    } else if lower.contains("qemu") {
        Some(BrandId::Qemu)
    } else if lower.contains("microsoft") {
        Some(BrandId::MicrosoftHyperV)
    } else if lower.contains("xen") {
        Some(BrandId::XenHvm)
    } else if lower.contains("parallels") {
        Some(BrandId::Parallels)
    } else if lower.contains("bochs") {
        Some(BrandId::Bochs)
    } else {
        None
    }
}

/// `/sys/class/dmi/id/chassis_type` value `1` ("Other") is common in
/// minimal VM chassis definitions; physical machines report a concrete type.
pub fn ctype(_tally: &mut BrandTally) -> bool {
    fs::read_to_string("/sys/class/dmi/id/chassis_type")
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .map(|t| t == 1)
        .unwrap_or(false)
}

/// Docker bind-mounts `/.dockerenv` into every container.
pub fn dockerenv(tally: &mut BrandTally) -> bool {
    let hit = std::path::Path::new("/.dockerenv").exists()
        || std::path::Path::new("/.dockerinit").exists();
    if hit {
        tally.add(BrandId::Docker, 3);
    }
    hit
}

/// `dmidecode -s system-product-name` reads the same DMI table as
/// [`cvendor`] but from a privileged source, catching fields that aren't
/// exposed under `/sys/class/dmi/id` on some kernels. Requires root.
pub fn dmidecode(tally: &mut BrandTally) -> bool {
    if !is_root() {
        return false;
    }
    let Ok(output) = Command::new("dmidecode")
        .args(["-s", "system-product-name"])
        .output()
    else {
        return false;
    };
    let product = String::from_utf8_lossy(&output.stdout).trim().to_lowercase();
    if let Some(brand) = brand_from_vendor_string(&product) {
        tally.add(brand, 2);
        return true;
    }
    false
}

/// `dmesg` often logs the hypervisor's paravirtualized device probes at
/// boot. Requires root (kernel ring buffer access is typically restricted).
pub fn dmesg(_tally: &mut BrandTally) -> bool {
    if !is_root() {
        return false;
    }
    let Ok(output) = Command::new("dmesg").output() else {
        return false;
    };
    let text = String::from_utf8_lossy(&output.stdout).to_lowercase();
    ["vboxguest", "vmware", "qemu", "kvm", "hyperv", "xen"]
        .iter()
        .any(|needle| text.contains(needle))
}

/// Hardware monitoring (`/sys/class/hwmon`) exposes fan/voltage sensors on
/// physical machines; a VM guest typically has none registered.
pub fn hwmon(_tally: &mut BrandTally) -> bool {
    fs::read_dir("/sys/class/hwmon")
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

/// Combination of username and hostname patterns specific to Linux
/// analysis-sandbox images (distinct from [`crate::probes::common::user`]'s
/// cross-platform username list — this one pairs user *and* host).
pub fn linux_user_host(_tally: &mut BrandTally) -> bool {
    let user = std::env::var("USER").unwrap_or_default().to_lowercase();
    let host = fs::read_to_string("/etc/hostname")
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    (user == "user" || user == "sandbox") && (host == "ubuntu" || host.is_empty())
}

/// `virtio` drivers are near-universal in KVM/QEMU guests and rare on bare
/// metal; a distinct signal from the broader module-name scan in
/// [`crate::probes::common::kvm_reg`].
pub fn kvm_drivers(tally: &mut BrandTally) -> bool {
    let Ok(modules) = fs::read_to_string("/proc/modules") else {
        return false;
    };
    if modules.to_lowercase().contains("virtio") {
        tally.add(BrandId::QemuKvm, 1);
        return true;
    }
    false
}

/// `/dev/virtio-ports` and `/dev/vport*` are created by the paravirtualized
/// console driver in KVM guests.
pub fn kvm_dirs(_tally: &mut BrandTally) -> bool {
    std::path::Path::new("/dev/virtio-ports").exists()
}
