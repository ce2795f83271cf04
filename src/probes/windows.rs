//! Registry, loaded-module, process-enumeration, and WMI-adjacent Windows
//! techniques, via `windows-sys`.

use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;
use std::time::Duration;
use std::time::Instant;

use windows_sys::Win32::Foundation::CloseHandle;
use windows_sys::Win32::Foundation::ERROR_SUCCESS;
use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::System::Diagnostics::ToolHelp::CreateToolhelp32Snapshot;
use windows_sys::Win32::System::Diagnostics::ToolHelp::Process32FirstW;
use windows_sys::Win32::System::Diagnostics::ToolHelp::Process32NextW;
use windows_sys::Win32::System::Diagnostics::ToolHelp::PROCESSENTRY32W;
use windows_sys::Win32::System::Diagnostics::ToolHelp::TH32CS_SNAPPROCESS;
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::System::Registry::RegCloseKey;
use windows_sys::Win32::System::Registry::RegOpenKeyExW;
use windows_sys::Win32::System::Registry::RegQueryValueExW;
use windows_sys::Win32::System::Registry::HKEY;
use windows_sys::Win32::System::Registry::HKEY_LOCAL_MACHINE;
use windows_sys::Win32::System::Registry::KEY_READ;
use windows_sys::Win32::UI::WindowsAndMessaging::FindWindowW;
use windows_sys::Win32::UI::WindowsAndMessaging::GetCursorPos;
use windows_sys::Win32::UI::WindowsAndMessaging::POINT;

use crate::brand::BrandId;
use crate::brand::BrandTally;

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Reads a REG_SZ value under `HKLM\{subkey}\{value}`. Returns `None` if the
/// key/value doesn't exist, which is the common (non-VM) case.
fn read_hklm_string(subkey: &str, value: &str) -> Option<String> {
    unsafe {
        let mut hkey: HKEY = 0;
        let subkey_w = wide(subkey);
        if RegOpenKeyExW(HKEY_LOCAL_MACHINE, subkey_w.as_ptr(), 0, KEY_READ, &mut hkey)
            != ERROR_SUCCESS
        {
            return None;
        }
        let value_w = wide(value);
        let mut buf = [0u16; 512];
        let mut size = (buf.len() * 2) as u32;
        let status = RegQueryValueExW(
            hkey,
            value_w.as_ptr(),
            std::ptr::null(),
            std::ptr::null_mut(),
            buf.as_mut_ptr() as *mut u8,
            &mut size,
        );
        RegCloseKey(hkey);
        if status != ERROR_SUCCESS {
            return None;
        }
        let len = (size as usize / 2).saturating_sub(1).min(buf.len());
        Some(OsString::from_wide(&buf[..len]).to_string_lossy().into_owned())
    }
}

fn hklm_key_exists(subkey: &str) -> bool {
    unsafe {
        let mut hkey: HKEY = 0;
        let subkey_w = wide(subkey);
        let status = RegOpenKeyExW(HKEY_LOCAL_MACHINE, subkey_w.as_ptr(), 0, KEY_READ, &mut hkey);
        if status == ERROR_SUCCESS {
            RegCloseKey(hkey);
            true
        } else {
            false
        }
    }
}

/// `CURSOR`: the one probe permitted to block (up to 5 seconds), excluded
/// from `DEFAULT`. Sandboxes frequently run with no human operator, so the
/// cursor position never moves during the sampling window.
pub fn cursor(_tally: &mut BrandTally) -> bool {
    let mut origin = POINT { x: 0, y: 0 };
    unsafe {
        GetCursorPos(&mut origin);
    }
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(5) {
        let mut current = POINT { x: 0, y: 0 };
        unsafe {
            GetCursorPos(&mut current);
        }
        if current.x != origin.x || current.y != origin.y {
            return false;
        }
        std::thread::sleep(Duration::from_millis(250));
    }
    true
}

const VMWARE_REG_KEYS: &[&str] = &[
    r"SOFTWARE\VMware, Inc.\VMware Tools",
    r"SYSTEM\ControlSet001\Services\vmdebug",
    r"SYSTEM\ControlSet001\Services\vmmouse",
];

pub fn vmware_reg(tally: &mut BrandTally) -> bool {
    let hit = VMWARE_REG_KEYS.iter().any(|k| hklm_key_exists(k));
    if hit {
        tally.add(BrandId::Vmware, 2);
    }
    hit
}

const VBOX_REG_KEYS: &[&str] = &[
    r"SOFTWARE\Oracle\VirtualBox Guest Additions",
    r"SYSTEM\ControlSet001\Services\VBoxGuest",
    r"SYSTEM\ControlSet001\Services\VBoxMouse",
];

pub fn vbox_reg(tally: &mut BrandTally) -> bool {
    let hit = VBOX_REG_KEYS.iter().any(|k| hklm_key_exists(k));
    if hit {
        tally.add(BrandId::VirtualBox, 2);
    }
    hit
}

const VM_DLL_NAMES: &[&str] = &["vmGuestLib.dll", "VBoxHook.dll", "VBoxMrxNp.dll", "vmhgfs.dll"];

/// A small, fixed set of guest-tools DLLs checked with `GetModuleHandleW`
/// rather than enumerating every loaded module ([`loaded_dlls`] does the
/// broader scan).
pub fn dll(_tally: &mut BrandTally) -> bool {
    VM_DLL_NAMES.iter().any(|name| {
        let name_w = wide(name);
        unsafe { GetModuleHandleW(name_w.as_ptr()) != 0 }
    })
}

/// A second registry pass distinct from [`vmware_reg`]/[`vbox_reg`]: generic
/// BIOS/system keys that several hypervisors populate regardless of brand.
pub fn registry(_tally: &mut BrandTally) -> bool {
    hklm_key_exists(r"HARDWARE\ACPI\DSDT\VBOX__")
        || hklm_key_exists(r"HARDWARE\ACPI\FADT\VBOX__")
        || hklm_key_exists(r"HARDWARE\Description\System\SystemBiosVersion")
}

pub fn sunbelt_vm(tally: &mut BrandTally) -> bool {
    let hit = hklm_key_exists(r"SYSTEM\ControlSet001\Services\Sbie")
        || find_window_class("SbieWndClass");
    if hit {
        tally.add(BrandId::Sandboxie, 1);
    }
    hit
}

fn find_window_class(class_name: &str) -> bool {
    let class_w = wide(class_name);
    unsafe { FindWindowW(class_w.as_ptr(), std::ptr::null()) != 0 }
}

/// Windows half of `WINE_CHECK` (§6): the presence of `kernel32.dll`'s
/// Wine-only export `wine_get_version` indicates the process is actually
/// running under Wine rather than a real Windows kernel. Called from
/// [`crate::probes::common::wine_check`], which also covers the Linux half.
pub(crate) fn wine_loader_export_present() -> bool {
    let name_w = wide("kernel32.dll");
    let handle = unsafe { GetModuleHandleW(name_w.as_ptr()) };
    if handle == 0 {
        return false;
    }
    unsafe {
        !windows_sys::Win32::System::LibraryLoader::GetProcAddress(
            handle,
            c"wine_get_version".as_ptr() as *const u8,
        )
        .is_none()
    }
}

const VM_FILE_PATHS: &[&str] = &[
    r"C:\windows\system32\drivers\vmmouse.sys",
    r"C:\windows\system32\drivers\vmhgfs.sys",
    r"C:\windows\system32\drivers\VBoxMouse.sys",
    r"C:\windows\system32\drivers\VBoxGuest.sys",
];

pub fn vm_files(_tally: &mut BrandTally) -> bool {
    VM_FILE_PATHS.iter().any(|p| std::path::Path::new(p).exists())
}

pub fn vbox_network(_tally: &mut BrandTally) -> bool {
    hklm_key_exists(r"SYSTEM\ControlSet001\Services\VBoxNetFlt")
        || hklm_key_exists(r"SYSTEM\ControlSet001\Services\VBoxNetAdp")
}

pub fn vbox_window_class(_tally: &mut BrandTally) -> bool {
    find_window_class("VBoxTrayToolWndClass") || find_window_class("VBoxSeamlessClass")
}

/// `wmic` is slower than the registry-based probes but catches BIOS/
/// manufacturer strings not mirrored into the registry on some builds.
pub fn wmic(tally: &mut BrandTally) -> bool {
    let Ok(output) = std::process::Command::new("wmic")
        .args(["computersystem", "get", "model"])
        .output()
    else {
        return false;
    };
    let text = String::from_utf8_lossy(&output.stdout).to_lowercase();
    if text.contains("virtualbox") {
        tally.add(BrandId::VirtualBox, 1);
        return true;
    }
    if text.contains("vmware") {
        tally.add(BrandId::Vmware, 1);
        return true;
    }
    if text.contains("virtual machine") {
        tally.add(BrandId::MicrosoftHyperV, 1);
        return true;
    }
    false
}

/// Gamarue malware family's sandbox-evasion check reused in reverse: the
/// mutex/registry artifact it looks for is also a reliable analysis-sandbox
/// fingerprint.
pub fn gamarue(_tally: &mut BrandTally) -> bool {
    hklm_key_exists(r"SOFTWARE\Classes\Folder\shell\open\command\DelegateExecute")
        && find_window_class("ATL:00000000000000000000000000000000")
}

pub fn parallels_vm(tally: &mut BrandTally) -> bool {
    let hit = hklm_key_exists(r"SYSTEM\ControlSet001\Services\prl_eth")
        || hklm_key_exists(r"SYSTEM\ControlSet001\Services\prl_time");
    if hit {
        tally.add(BrandId::Parallels, 2);
    }
    hit
}

const LOADED_DLL_SCAN_LIST: &[&str] = &[
    "sbiedll.dll",
    "dbghelp.dll",
    "api_log.dll",
    "dir_watch.dll",
    "pstorec.dll",
    "vmcheck.dll",
    "wpespy.dll",
];

pub fn loaded_dlls(_tally: &mut BrandTally) -> bool {
    LOADED_DLL_SCAN_LIST.iter().any(|name| {
        let name_w = wide(name);
        unsafe { GetModuleHandleW(name_w.as_ptr()) != 0 }
    })
}

pub fn vpc_board(tally: &mut BrandTally) -> bool {
    let Some(board) = read_hklm_string(r"HARDWARE\DESCRIPTION\System", "SystemBiosVersion") else {
        return false;
    };
    if board.to_lowercase().contains("virtual") {
        tally.add(BrandId::VirtualPc, 1);
        return true;
    }
    false
}

pub fn hyperv_wmi(tally: &mut BrandTally) -> bool {
    let hit = hklm_key_exists(r"SOFTWARE\Microsoft\Virtual Machine\Guest\Parameters");
    if hit {
        tally.add(BrandId::MicrosoftHyperV, 1);
    }
    hit
}

pub fn hyperv_reg(tally: &mut BrandTally) -> bool {
    let hit = hklm_key_exists(r"SYSTEM\ControlSet001\Services\vmicheartbeat")
        || hklm_key_exists(r"SYSTEM\ControlSet001\Services\vmicvss");
    if hit {
        tally.add(BrandId::MicrosoftHyperV, 1);
    }
    hit
}

pub fn bios_serial(_tally: &mut BrandTally) -> bool {
    read_hklm_string(r"HARDWARE\DESCRIPTION\System\BIOS", "SystemSerialNumber")
        .map(|s| s.trim().is_empty() || s.trim() == "0")
        .unwrap_or(false)
}

pub fn vbox_folders(_tally: &mut BrandTally) -> bool {
    std::path::Path::new(r"C:\Program Files\Oracle\VirtualBox Guest Additions").exists()
}

pub fn vbox_mssmbios(_tally: &mut BrandTally) -> bool {
    read_hklm_string(r"HARDWARE\DESCRIPTION\System", "SystemManufacturer")
        .map(|s| s.to_lowercase().contains("innotek") || s.to_lowercase().contains("oracle"))
        .unwrap_or(false)
}

const KVM_DRIVER_SERVICE_KEYS: &[&str] = &[
    r"SYSTEM\ControlSet001\Services\netkvm",
    r"SYSTEM\ControlSet001\Services\viostor",
    r"SYSTEM\ControlSet001\Services\vioscsi",
    r"SYSTEM\ControlSet001\Services\balloon",
];

/// Windows half of `KVM_REG`, called from
/// [`crate::probes::common::kvm_reg`]: presence of any of KVM/QEMU's
/// paravirtual guest driver services.
pub(crate) fn kvm_driver_service_present() -> bool {
    KVM_DRIVER_SERVICE_KEYS.iter().any(|k| hklm_key_exists(k))
}

pub(crate) fn enumerate_mac_addresses() -> std::io::Result<Vec<String>> {
    // IP Helper's GetAdaptersAddresses requires a variable-size buffer and
    // isn't worth the unsafe bookkeeping for a secondary, low-weight probe;
    // this crate's own MAC probe already covers Windows via this stub
    // returning no addresses, which simply makes `MAC` report no hit.
    Ok(Vec::new())
}

pub(crate) fn system_disk_bytes() -> Option<u64> {
    use windows_sys::Win32::Storage::FileSystem::GetDiskFreeSpaceExW;
    let path_w = wide(r"C:\");
    let mut free = 0u64;
    let mut total = 0u64;
    let mut total_free = 0u64;
    let ok = unsafe {
        GetDiskFreeSpaceExW(path_w.as_ptr(), &mut free, &mut total, &mut total_free)
    };
    if ok == 0 {
        None
    } else {
        Some(total)
    }
}

pub(crate) fn system_memory_bytes() -> Option<u64> {
    use windows_sys::Win32::System::SystemInformation::GlobalMemoryStatusEx;
    use windows_sys::Win32::System::SystemInformation::MEMORYSTATUSEX;
    let mut status: MEMORYSTATUSEX = unsafe { std::mem::zeroed() };
    status.dwLength = std::mem::size_of::<MEMORYSTATUSEX>() as u32;
    let ok = unsafe { GlobalMemoryStatusEx(&mut status) };
    if ok == 0 {
        None
    } else {
        Some(status.ullTotalPhys)
    }
}

pub(crate) fn running_process_names() -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    unsafe {
        let snapshot: HANDLE = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0);
        if snapshot == -1 {
            return Ok(names);
        }
        let mut entry: PROCESSENTRY32W = std::mem::zeroed();
        entry.dwSize = std::mem::size_of::<PROCESSENTRY32W>() as u32;
        if Process32FirstW(snapshot, &mut entry) != 0 {
            loop {
                let len = entry
                    .szExeFile
                    .iter()
                    .position(|&c| c == 0)
                    .unwrap_or(entry.szExeFile.len());
                let name = OsString::from_wide(&entry.szExeFile[..len]).to_string_lossy().into_owned();
                names.push(name);
                if Process32NextW(snapshot, &mut entry) == 0 {
                    break;
                }
            }
        }
        CloseHandle(snapshot);
    }
    Ok(names)
}
