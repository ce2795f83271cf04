//! Cross-platform heuristics: techniques meaningful on more than one OS
//! (MAC OUI prefixes, host/user naming conventions, process enumeration,
//! disk/memory size, thread count).

use std::env;

use crate::brand::BrandId;
use crate::brand::BrandTally;

/// Hypervisors tend to under-provision hardware threads relative to a
/// typical physical workstation. Weak signal on its own (weight 10).
pub fn threadcount(_tally: &mut BrandTally) -> bool {
    std::thread::available_parallelism()
        .map(|n| n.get() <= 2)
        .unwrap_or(false)
}

/// Known NIC vendor OUI prefixes assigned to virtualization vendors.
/// First three octets, upper-case, colon-separated.
const VM_MAC_PREFIXES: &[(&str, BrandId)] = &[
    ("00:05:69", BrandId::Vmware),
    ("00:0C:29", BrandId::Vmware),
    ("00:1C:14", BrandId::Vmware),
    ("00:50:56", BrandId::Vmware),
    ("08:00:27", BrandId::VirtualBox),
    ("0A:00:27", BrandId::VirtualBox),
    ("00:03:FF", BrandId::MicrosoftHyperV),
    ("00:15:5D", BrandId::MicrosoftHyperV),
    ("00:16:3E", BrandId::XenHvm),
    ("52:54:00", BrandId::QemuKvm),
];

pub fn mac(tally: &mut BrandTally) -> bool {
    let addrs = match local_mac_addresses() {
        Ok(addrs) => addrs,
        Err(_) => return false,
    };
    let mut hit = false;
    for addr in addrs {
        let prefix = addr.get(..8).map(str::to_uppercase);
        if let Some(prefix) = prefix {
            if let Some((_, brand)) = VM_MAC_PREFIXES.iter().find(|(p, _)| *p == prefix) {
                tally.add(*brand, 1);
                hit = true;
            }
        }
    }
    hit
}

#[cfg(unix)]
fn local_mac_addresses() -> std::io::Result<Vec<String>> {
    use std::fs;
    let mut addrs = Vec::new();
    let net_dir = fs::read_dir("/sys/class/net")?;
    for entry in net_dir.flatten() {
        let addr_path = entry.path().join("address");
        if let Ok(addr) = fs::read_to_string(addr_path) {
            addrs.push(addr.trim().to_string());
        }
    }
    Ok(addrs)
}

#[cfg(windows)]
fn local_mac_addresses() -> std::io::Result<Vec<String>> {
    crate::probes::windows::enumerate_mac_addresses()
}

/// Usernames chosen by default by sandbox/analysis tooling.
const SANDBOX_USERNAMES: &[&str] = &[
    "sandbox", "malware", "maltest", "test", "virus", "sample", "currentuser",
];

pub fn user(_tally: &mut BrandTally) -> bool {
    let name = env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_default()
        .to_lowercase();
    !name.is_empty() && SANDBOX_USERNAMES.contains(&name.as_str())
}

/// Hostnames chosen by default by common sandbox images.
const SANDBOX_HOSTNAMES: &[&str] = &["sandbox", "malware-test", "virus-test", "sample"];

pub fn computer_name(_tally: &mut BrandTally) -> bool {
    let name = hostname_lowercase();
    !name.is_empty() && SANDBOX_HOSTNAMES.contains(&name.as_str())
}

/// Windows-only per the registry's `HOSTNAME` descriptor (§9 open question:
/// preserved at weight 25 despite the upstream table's ambiguity).
pub fn hostname(_tally: &mut BrandTally) -> bool {
    let name = hostname_lowercase();
    name.len() <= 8 && name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

fn hostname_lowercase() -> String {
    #[cfg(unix)]
    {
        nix_hostname().unwrap_or_default().to_lowercase()
    }
    #[cfg(windows)]
    {
        env::var("COMPUTERNAME").unwrap_or_default().to_lowercase()
    }
}

#[cfg(unix)]
fn nix_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if ret != 0 {
        return None;
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..len]).ok().map(str::to_string)
}

/// A suspiciously small disk is common in minimal VM images.
pub fn disk_size(_tally: &mut BrandTally) -> bool {
    total_disk_bytes()
        .map(|bytes| bytes < 80 * 1024 * 1024 * 1024)
        .unwrap_or(false)
}

#[cfg(unix)]
fn total_disk_bytes() -> Option<u64> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    let path = CString::new("/").ok()?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();
    let ret = unsafe { libc::statvfs(path.as_ptr(), stat.as_mut_ptr()) };
    if ret != 0 {
        return None;
    }
    let stat = unsafe { stat.assume_init() };
    Some(stat.f_blocks as u64 * stat.f_frsize as u64)
}

#[cfg(windows)]
fn total_disk_bytes() -> Option<u64> {
    crate::probes::windows::system_disk_bytes()
}

/// A VM rarely ships more than a few GB of RAM by default.
pub fn memory(_tally: &mut BrandTally) -> bool {
    total_memory_bytes()
        .map(|bytes| bytes < 4 * 1024 * 1024 * 1024)
        .unwrap_or(false)
}

#[cfg(target_os = "linux")]
fn total_memory_bytes() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let line = meminfo.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

#[cfg(windows)]
fn total_memory_bytes() -> Option<u64> {
    crate::probes::windows::system_memory_bytes()
}

#[cfg(target_os = "macos")]
fn total_memory_bytes() -> Option<u64> {
    crate::probes::macos::sysctl_u64("hw.memsize")
}

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
fn total_memory_bytes() -> Option<u64> {
    None
}

/// Process names associated with hypervisor guest tooling or analysis
/// sandboxes, checked regardless of host OS via `/proc` or the Windows
/// tool-help snapshot.
const VM_PROCESS_NAMES: &[(&str, BrandId)] = &[
    ("vmtoolsd", BrandId::Vmware),
    ("vmwaretray", BrandId::Vmware),
    ("vboxservice", BrandId::VirtualBox),
    ("vboxtray", BrandId::VirtualBox),
    ("qemu-ga", BrandId::Qemu),
    ("xenservice", BrandId::XenHvm),
    ("prl_tools", BrandId::Parallels),
];

pub fn vm_processes(tally: &mut BrandTally) -> bool {
    let names = match running_process_names() {
        Ok(names) => names,
        Err(_) => return false,
    };
    let mut hit = false;
    for name in names {
        let lower = name.to_lowercase();
        if let Some((_, brand)) = VM_PROCESS_NAMES.iter().find(|(p, _)| lower.contains(p)) {
            tally.add(*brand, 1);
            hit = true;
        }
    }
    hit
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn running_process_names() -> std::io::Result<Vec<String>> {
    #[cfg(target_os = "linux")]
    {
        use std::fs;
        let mut names = Vec::new();
        for entry in fs::read_dir("/proc")?.flatten() {
            if !entry.file_name().to_string_lossy().chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            if let Ok(comm) = fs::read_to_string(entry.path().join("comm")) {
                names.push(comm.trim().to_string());
            }
        }
        Ok(names)
    }
    #[cfg(target_os = "macos")]
    {
        crate::probes::macos::running_process_names()
    }
}

#[cfg(windows)]
fn running_process_names() -> std::io::Result<Vec<String>> {
    crate::probes::windows::running_process_names()
}

/// `KVM_REG` (§6, platforms Linux+Windows): the `kvm` kernel module shows
/// up in a nested-virtualization Linux guest; on Windows the equivalent
/// signal is one of the paravirtual driver services KVM/QEMU install for
/// their Windows guests (`netkvm`, `viostor`, `vioscsi`, `balloon`).
pub fn kvm_reg(tally: &mut BrandTally) -> bool {
    let hit = kvm_driver_signal_present();
    if hit {
        tally.add(BrandId::Kvm, 1);
    }
    hit
}

#[cfg(target_os = "linux")]
fn kvm_driver_signal_present() -> bool {
    std::fs::read_to_string("/proc/modules")
        .map(|modules| modules.to_lowercase().contains("kvm"))
        .unwrap_or(false)
}

#[cfg(windows)]
fn kvm_driver_signal_present() -> bool {
    crate::probes::windows::kvm_driver_service_present()
}

#[cfg(not(any(target_os = "linux", windows)))]
fn kvm_driver_signal_present() -> bool {
    false
}

/// `WINE_CHECK` (§6, platforms Windows+Linux): on Windows, the presence of
/// `kernel32.dll`'s Wine-only export `wine_get_version` means the process
/// is actually running under Wine rather than a real Windows kernel. On
/// Linux, the equivalent signal is a `wineserver`/`wine-preloader` process
/// already running, or a `WINEPREFIX`/`WINEARCH` environment variable set
/// by the launching `wine` wrapper script.
pub fn wine_check(tally: &mut BrandTally) -> bool {
    let hit = wine_signal_present();
    if hit {
        tally.add(BrandId::Wine, 1);
    }
    hit
}

#[cfg(windows)]
fn wine_signal_present() -> bool {
    crate::probes::windows::wine_loader_export_present()
}

#[cfg(not(windows))]
fn wine_signal_present() -> bool {
    if env::var_os("WINEPREFIX").is_some() || env::var_os("WINEARCH").is_some() {
        return true;
    }
    running_process_names()
        .map(|names| {
            names.iter().any(|n| {
                let lower = n.to_lowercase();
                lower.contains("wineserver") || lower.contains("wine-preloader") || lower.contains("wine64-preloader")
            })
        })
        .unwrap_or(false)
}

/// Both this probe's detection AND its in-default-set membership hinge on
/// this being cheap; it uses the same process-name source as
/// [`vm_processes`] but flags only VirtualBox's default process name
/// without casting a brand vote (the registry already treats the
/// `VBOX_DEFAULT` probe as a plain yes/no corroborator, not a brand source).
pub fn vbox_default(_tally: &mut BrandTally) -> bool {
    running_process_names()
        .map(|names| names.iter().any(|n| n.eq_ignore_ascii_case("VBoxService")))
        .unwrap_or(false)
}
