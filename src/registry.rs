//! The static probe table: the single source of truth for weights,
//! platform availability, privilege requirements, and default-set
//! membership. Nothing outside this module is allowed to invoke a probe
//! function directly (§4.1).

use std::sync::OnceLock;

use strum::IntoEnumIterator;

use crate::brand::BrandTally;
use crate::flags::TechniqueId;
use crate::flags::DEFAULT_MASK;
use crate::flags::TECHNIQUE_COUNT;
use crate::probes;

bitflags::bitflags! {
    /// The set of operating systems a probe can run on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Platforms: u8 {
        const LINUX = 0b001;
        const WINDOWS = 0b010;
        const MACOS = 0b100;
    }
}

impl Platforms {
    pub const ALL: Platforms = Platforms::LINUX.union(Platforms::WINDOWS).union(Platforms::MACOS);

    /// The platform this binary is currently running on, if it's one we model.
    pub fn current() -> Option<Platforms> {
        if cfg!(target_os = "linux") || cfg!(target_os = "android") {
            Some(Platforms::LINUX)
        } else if cfg!(windows) {
            Some(Platforms::WINDOWS)
        } else if cfg!(target_os = "macos") {
            Some(Platforms::MACOS)
        } else {
            None
        }
    }
}

/// A probe's static metadata plus the function that realizes it.
pub struct ProbeDescriptor {
    pub id: TechniqueId,
    pub name: &'static str,
    pub run: fn(&mut BrandTally) -> bool,
    pub weight: u8,
    pub platforms: Platforms,
    pub requires_root: bool,
    pub in_default_set: bool,
}

impl ProbeDescriptor {
    const fn new(
        id: TechniqueId,
        name: &'static str,
        run: fn(&mut BrandTally) -> bool,
        weight: u8,
        platforms: Platforms,
        requires_root: bool,
        in_default_set: bool,
    ) -> Self {
        ProbeDescriptor {
            id,
            name,
            run,
            weight,
            platforms,
            requires_root,
            in_default_set,
        }
    }
}

/// Declares one row of the registry. `platforms` is a `|`-separated list of
/// `Platforms` associated constants; `root` and `default` are bare `bool`
/// literals. Keeping this as a macro (rather than 58 repetitive struct
/// literals) is the only way the table stays reviewable.
macro_rules! probe_row {
    ($id:ident, $name:literal, $run:path, $weight:literal, [$($platform:ident)|+], root = $root:literal, default = $default:literal) => {
        ProbeDescriptor::new(
            TechniqueId::$id,
            $name,
            $run,
            $weight,
            Platforms::empty()$(.union(Platforms::$platform))+,
            $root,
            $default,
        )
    };
}

const ROW_COUNT: usize = TECHNIQUE_COUNT as usize;

fn build_table() -> [ProbeDescriptor; ROW_COUNT] {
    use probes::common as pc;
    use probes::cpu as px;
    use probes::linux as pl;
    use probes::macos as pm;
    use probes::windows as pw;

    [
        probe_row!(Vmid, "VMID", px::vmid, 100, [LINUX | WINDOWS | MACOS], root = false, default = true),
        probe_row!(Brand, "BRAND", px::brand, 50, [LINUX | WINDOWS | MACOS], root = false, default = true),
        probe_row!(HypervisorBit, "HYPERVISOR_BIT", px::hypervisor_bit, 95, [LINUX | WINDOWS | MACOS], root = false, default = true),
        probe_row!(Cpuid0x4, "CPUID_0X4", px::cpuid_0x4, 40, [LINUX | WINDOWS | MACOS], root = false, default = true),
        probe_row!(HypervisorStr, "HYPERVISOR_STR", px::hypervisor_str, 45, [LINUX | WINDOWS | MACOS], root = false, default = true),
        probe_row!(Rdtsc, "RDTSC", px::rdtsc, 10, [LINUX | WINDOWS | MACOS], root = false, default = true),
        probe_row!(Sidt5, "SIDT5", px::sidt5, 45, [LINUX | WINDOWS], root = false, default = true),
        probe_row!(Threadcount, "THREADCOUNT", pc::threadcount, 10, [LINUX | WINDOWS | MACOS], root = false, default = true),
        probe_row!(Mac, "MAC", pc::mac, 60, [LINUX | WINDOWS | MACOS], root = false, default = true),
        probe_row!(Temperature, "TEMPERATURE", pl::temperature, 15, [LINUX], root = false, default = true),
        probe_row!(Systemd, "SYSTEMD", pl::systemd, 70, [LINUX], root = false, default = true),
        probe_row!(Cvendor, "CVENDOR", pl::cvendor, 90, [LINUX], root = false, default = true),
        probe_row!(Ctype, "CTYPE", pl::ctype, 30, [LINUX], root = false, default = true),
        probe_row!(Dockerenv, "DOCKERENV", pl::dockerenv, 100, [LINUX], root = false, default = true),
        probe_row!(Dmidecode, "DMIDECODE", pl::dmidecode, 90, [LINUX], root = true, default = true),
        probe_row!(Dmesg, "DMESG", pl::dmesg, 55, [LINUX], root = true, default = true),
        probe_row!(Hwmon, "HWMON", pl::hwmon, 20, [LINUX], root = false, default = true),
        probe_row!(Cursor, "CURSOR", pw::cursor, 10, [WINDOWS], root = false, default = false),
        probe_row!(VmwareReg, "VMWARE_REG", pw::vmware_reg, 100, [WINDOWS], root = false, default = true),
        probe_row!(VboxReg, "VBOX_REG", pw::vbox_reg, 100, [WINDOWS], root = false, default = true),
        probe_row!(User, "USER", pc::user, 30, [LINUX | WINDOWS], root = false, default = true),
        probe_row!(Dll, "DLL", pw::dll, 65, [WINDOWS], root = false, default = true),
        probe_row!(Registry, "REGISTRY", pw::registry, 75, [WINDOWS], root = false, default = true),
        probe_row!(SunbeltVm, "SUNBELT_VM", pw::sunbelt_vm, 40, [WINDOWS], root = false, default = true),
        probe_row!(WineCheck, "WINE_CHECK", pc::wine_check, 85, [WINDOWS | LINUX], root = false, default = true),
        probe_row!(VmFiles, "VM_FILES", pw::vm_files, 70, [WINDOWS], root = false, default = true),
        probe_row!(Hwmodel, "HWMODEL", pm::hwmodel, 80, [MACOS], root = false, default = true),
        probe_row!(DiskSize, "DISK_SIZE", pc::disk_size, 15, [LINUX | WINDOWS | MACOS], root = false, default = true),
        probe_row!(VboxDefault, "VBOX_DEFAULT", pc::vbox_default, 35, [LINUX | WINDOWS], root = false, default = true),
        probe_row!(VboxNetwork, "VBOX_NETWORK", pw::vbox_network, 55, [WINDOWS], root = false, default = true),
        probe_row!(ComputerName, "COMPUTER_NAME", pc::computer_name, 20, [LINUX | WINDOWS | MACOS], root = false, default = true),
        probe_row!(Hostname, "HOSTNAME", pc::hostname, 25, [WINDOWS], root = false, default = true),
        probe_row!(Memory, "MEMORY", pc::memory, 20, [LINUX | WINDOWS | MACOS], root = false, default = true),
        probe_row!(VmProcesses, "VM_PROCESSES", pc::vm_processes, 65, [LINUX | WINDOWS | MACOS], root = false, default = true),
        probe_row!(LinuxUserHost, "LINUX_USER_HOST", pl::linux_user_host, 20, [LINUX], root = false, default = true),
        probe_row!(VboxWindowClass, "VBOX_WINDOW_CLASS", pw::vbox_window_class, 40, [WINDOWS], root = false, default = true),
        probe_row!(Wmic, "WMIC", pw::wmic, 70, [WINDOWS], root = false, default = true),
        probe_row!(Gamarue, "GAMARUE", pw::gamarue, 30, [WINDOWS], root = false, default = true),
        probe_row!(Vmid0x4, "VMID_0X4", px::vmid_0x4, 50, [LINUX | WINDOWS | MACOS], root = false, default = true),
        probe_row!(ParallelsVm, "PARALLELS_VM", pw::parallels_vm, 85, [WINDOWS | MACOS], root = false, default = true),
        probe_row!(RdtscVmexit, "RDTSC_VMEXIT", px::rdtsc_vmexit, 15, [LINUX | WINDOWS | MACOS], root = false, default = true),
        probe_row!(LoadedDlls, "LOADED_DLLS", pw::loaded_dlls, 60, [WINDOWS], root = false, default = true),
        probe_row!(QemuBrand, "QEMU_BRAND", px::qemu_brand, 80, [LINUX | WINDOWS | MACOS], root = false, default = true),
        probe_row!(BochsCpu, "BOCHS_CPU", px::bochs_cpu, 80, [LINUX | WINDOWS | MACOS], root = false, default = true),
        probe_row!(VpcBoard, "VPC_BOARD", pw::vpc_board, 70, [WINDOWS], root = false, default = true),
        probe_row!(HypervWmi, "HYPERV_WMI", pw::hyperv_wmi, 70, [WINDOWS], root = false, default = true),
        probe_row!(HypervReg, "HYPERV_REG", pw::hyperv_reg, 80, [WINDOWS], root = false, default = true),
        probe_row!(BiosSerial, "BIOS_SERIAL", pw::bios_serial, 60, [WINDOWS], root = false, default = true),
        probe_row!(VboxFolders, "VBOX_FOLDERS", pw::vbox_folders, 50, [WINDOWS], root = false, default = true),
        probe_row!(VboxMssmbios, "VBOX_MSSMBIOS", pw::vbox_mssmbios, 70, [WINDOWS], root = false, default = true),
        probe_row!(MacHyperthread, "MAC_HYPERTHREAD", pm::mac_hyperthread, 15, [MACOS], root = false, default = true),
        probe_row!(MacMemsize, "MAC_MEMSIZE", pm::mac_memsize, 20, [MACOS], root = false, default = true),
        probe_row!(MacIokit, "MAC_IOKIT", pm::mac_iokit, 75, [MACOS], root = false, default = true),
        probe_row!(IoregGrep, "IOREG_GREP", pm::ioreg_grep, 80, [MACOS], root = false, default = true),
        probe_row!(MacSip, "MAC_SIP", pm::mac_sip, 20, [MACOS], root = false, default = true),
        probe_row!(KvmReg, "KVM_REG", pc::kvm_reg, 55, [LINUX | WINDOWS], root = false, default = true),
        probe_row!(KvmDrivers, "KVM_DRIVERS", pl::kvm_drivers, 55, [LINUX], root = false, default = true),
        probe_row!(KvmDirs, "KVM_DIRS", pl::kvm_dirs, 45, [LINUX], root = false, default = true),
    ]
}

static REGISTRY: OnceLock<[ProbeDescriptor; ROW_COUNT]> = OnceLock::new();

fn table() -> &'static [ProbeDescriptor; ROW_COUNT] {
    REGISTRY.get_or_init(|| {
        let table = build_table();
        debug_assert_invariants(&table);
        table
    })
}

/// Every invariant from §3: one descriptor per technique, in bit-position
/// order, no empty platform set, no weight above 100. Only runs in debug
/// builds — a violation here is a programming error in this crate, not a
/// runtime fault a caller should see.
fn debug_assert_invariants(table: &[ProbeDescriptor; ROW_COUNT]) {
    #[cfg(debug_assertions)]
    {
        for (expected, (row, id)) in table.iter().zip(TechniqueId::iter()).enumerate() {
            if row.id as usize != expected || id as usize != expected {
                tracing::error!(technique = row.name, "registry row out of position");
                panic!("registry row {expected} does not match TechniqueId position");
            }
            if row.weight > 100 {
                tracing::error!(technique = row.name, weight = row.weight, "weight exceeds 100");
                panic!("probe {} has weight > 100", row.name);
            }
            if row.platforms.is_empty() {
                tracing::error!(technique = row.name, "probe declares no runnable platform");
                panic!("probe {} has an empty platform set", row.name);
            }
        }
        let computed = table
            .iter()
            .filter(|d| d.in_default_set)
            .fold(0u64, |acc, d| acc | d.id.bit());
        if computed != DEFAULT_MASK {
            tracing::error!("registry default set disagrees with FlagSet::DEFAULT");
            panic!("registry in_default_set rows do not match flags::DEFAULT_MASK");
        }
    }
    #[cfg(not(debug_assertions))]
    {
        let _ = table;
    }
}

/// Look up a single probe's descriptor by id. O(1): `TechniqueId`'s
/// discriminant is its index into the table.
pub fn lookup(id: TechniqueId) -> &'static ProbeDescriptor {
    &table()[id as usize]
}

/// Walk the full registry in declaration order (§4.1, §4.4).
pub fn iterate() -> impl Iterator<Item = &'static ProbeDescriptor> {
    table().iter()
}

/// The bitwise OR of every `in_default_set` technique's bit; computed once
/// rather than hand-maintained (§4.3).
pub fn default_bits() -> u64 {
    static BITS: OnceLock<u64> = OnceLock::new();
    *BITS.get_or_init(|| {
        iterate()
            .filter(|d| d.in_default_set)
            .fold(0u64, |acc, d| acc | d.id.bit())
    })
}
