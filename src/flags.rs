//! The bit-mask flag space: one bit per [`TechniqueId`], two independent
//! meta-flags that steer the aggregator instead of selecting a probe
//! (`NO_MEMO`, `EXTREME`), and two named presets that are themselves unions
//! of technique bits (`ALL`, `DEFAULT`).

use strum::IntoEnumIterator;
use strum_macros::AsRefStr;
use strum_macros::EnumIter;

/// One independently runnable detection technique.
///
/// Discriminants are declared explicitly because they double as the bit
/// position used by [`FlagSet`]; `TechniqueId::iter()` (via
/// [`strum::IntoEnumIterator`]) walks them in this same order, which is also
/// the registry's invocation order (§4.4 of the design doc: registry order is
/// semantically significant for brand-tally tie scanning).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum TechniqueId {
    Vmid = 0,
    Brand = 1,
    HypervisorBit = 2,
    Cpuid0x4 = 3,
    HypervisorStr = 4,
    Rdtsc = 5,
    Sidt5 = 6,
    Threadcount = 7,
    Mac = 8,
    Temperature = 9,
    Systemd = 10,
    Cvendor = 11,
    Ctype = 12,
    Dockerenv = 13,
    Dmidecode = 14,
    Dmesg = 15,
    Hwmon = 16,
    Cursor = 17,
    VmwareReg = 18,
    VboxReg = 19,
    User = 20,
    Dll = 21,
    Registry = 22,
    SunbeltVm = 23,
    WineCheck = 24,
    VmFiles = 25,
    Hwmodel = 26,
    DiskSize = 27,
    VboxDefault = 28,
    VboxNetwork = 29,
    ComputerName = 30,
    Hostname = 31,
    Memory = 32,
    VmProcesses = 33,
    LinuxUserHost = 34,
    VboxWindowClass = 35,
    Wmic = 36,
    Gamarue = 37,
    Vmid0x4 = 38,
    ParallelsVm = 39,
    RdtscVmexit = 40,
    LoadedDlls = 41,
    QemuBrand = 42,
    BochsCpu = 43,
    VpcBoard = 44,
    HypervWmi = 45,
    HypervReg = 46,
    BiosSerial = 47,
    VboxFolders = 48,
    VboxMssmbios = 49,
    MacHyperthread = 50,
    MacMemsize = 51,
    MacIokit = 52,
    IoregGrep = 53,
    MacSip = 54,
    KvmReg = 55,
    KvmDrivers = 56,
    KvmDirs = 57,
}

/// Total number of techniques; also the lowest bit position free for meta-flags.
pub const TECHNIQUE_COUNT: u32 = 58;

impl TechniqueId {
    /// The bit this technique occupies in a [`FlagSet`]/raw `u64` mask.
    pub const fn bit(self) -> u64 {
        1u64 << (self as u8)
    }
}

/// Recover the single [`TechniqueId`] whose bit is set in `bit`, if any.
/// Used by `check()` after [`FlagSet::is_single_technique`] has already
/// confirmed exactly one technique bit is present.
pub fn technique_from_bit(bit: u64) -> Option<TechniqueId> {
    if bit == 0 || !bit.is_power_of_two() {
        return None;
    }
    TechniqueId::iter().find(|id| id.bit() == bit)
}

/// Mask covering every technique bit (0..57).
pub const TECHNIQUE_MASK: u64 = (1u64 << TECHNIQUE_COUNT) - 1;

/// Mask covering every *default* technique bit — every technique except
/// `CURSOR` (§2: "excludes the 5-second cursor-wait probe").
///
/// `ALL` and `DEFAULT` are deliberately *not* separate reserved bits the way
/// `NO_MEMO`/`EXTREME` are. They are named presets equal to a union of
/// technique bits, exactly as §4.3 states ("DEFAULT is itself defined as the
/// bitwise OR of all in_default_set technique bits"). That is what makes
/// `DEFAULT & !SOME_TECHNIQUE` work as ordinary `u64` arithmetic: the technique
/// bit is a real constituent of `DEFAULT`'s value, not hidden behind a
/// sentinel bit that arithmetic can't see through.
pub const DEFAULT_MASK: u64 = TECHNIQUE_MASK & !TechniqueId::Cursor.bit();

bitflags::bitflags! {
    /// A bit-mask over the technique-identifier space plus two independent
    /// meta-flags (`NO_MEMO`, `EXTREME`). `ALL` and `DEFAULT` are named
    /// presets within the technique space, not additional reserved bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FlagSet: u64 {
        const VMID = TechniqueId::Vmid.bit();
        const BRAND = TechniqueId::Brand.bit();
        const HYPERVISOR_BIT = TechniqueId::HypervisorBit.bit();
        const CPUID_0X4 = TechniqueId::Cpuid0x4.bit();
        const HYPERVISOR_STR = TechniqueId::HypervisorStr.bit();
        const RDTSC = TechniqueId::Rdtsc.bit();
        const SIDT5 = TechniqueId::Sidt5.bit();
        const THREADCOUNT = TechniqueId::Threadcount.bit();
        const MAC = TechniqueId::Mac.bit();
        const TEMPERATURE = TechniqueId::Temperature.bit();
        const SYSTEMD = TechniqueId::Systemd.bit();
        const CVENDOR = TechniqueId::Cvendor.bit();
        const CTYPE = TechniqueId::Ctype.bit();
        const DOCKERENV = TechniqueId::Dockerenv.bit();
        const DMIDECODE = TechniqueId::Dmidecode.bit();
        const DMESG = TechniqueId::Dmesg.bit();
        const HWMON = TechniqueId::Hwmon.bit();
        const CURSOR = TechniqueId::Cursor.bit();
        const VMWARE_REG = TechniqueId::VmwareReg.bit();
        const VBOX_REG = TechniqueId::VboxReg.bit();
        const USER = TechniqueId::User.bit();
        const DLL = TechniqueId::Dll.bit();
        const REGISTRY = TechniqueId::Registry.bit();
        const SUNBELT_VM = TechniqueId::SunbeltVm.bit();
        const WINE_CHECK = TechniqueId::WineCheck.bit();
        const VM_FILES = TechniqueId::VmFiles.bit();
        const HWMODEL = TechniqueId::Hwmodel.bit();
        const DISK_SIZE = TechniqueId::DiskSize.bit();
        const VBOX_DEFAULT = TechniqueId::VboxDefault.bit();
        const VBOX_NETWORK = TechniqueId::VboxNetwork.bit();
        const COMPUTER_NAME = TechniqueId::ComputerName.bit();
        const HOSTNAME = TechniqueId::Hostname.bit();
        const MEMORY = TechniqueId::Memory.bit();
        const VM_PROCESSES = TechniqueId::VmProcesses.bit();
        const LINUX_USER_HOST = TechniqueId::LinuxUserHost.bit();
        const VBOX_WINDOW_CLASS = TechniqueId::VboxWindowClass.bit();
        const WMIC = TechniqueId::Wmic.bit();
        const GAMARUE = TechniqueId::Gamarue.bit();
        const VMID_0X4 = TechniqueId::Vmid0x4.bit();
        const PARALLELS_VM = TechniqueId::ParallelsVm.bit();
        const RDTSC_VMEXIT = TechniqueId::RdtscVmexit.bit();
        const LOADED_DLLS = TechniqueId::LoadedDlls.bit();
        const QEMU_BRAND = TechniqueId::QemuBrand.bit();
        const BOCHS_CPU = TechniqueId::BochsCpu.bit();
        const VPC_BOARD = TechniqueId::VpcBoard.bit();
        const HYPERV_WMI = TechniqueId::HypervWmi.bit();
        const HYPERV_REG = TechniqueId::HypervReg.bit();
        const BIOS_SERIAL = TechniqueId::BiosSerial.bit();
        const VBOX_FOLDERS = TechniqueId::VboxFolders.bit();
        const VBOX_MSSMBIOS = TechniqueId::VboxMssmbios.bit();
        const MAC_HYPERTHREAD = TechniqueId::MacHyperthread.bit();
        const MAC_MEMSIZE = TechniqueId::MacMemsize.bit();
        const MAC_IOKIT = TechniqueId::MacIokit.bit();
        const IOREG_GREP = TechniqueId::IoregGrep.bit();
        const MAC_SIP = TechniqueId::MacSip.bit();
        const KVM_REG = TechniqueId::KvmReg.bit();
        const KVM_DRIVERS = TechniqueId::KvmDrivers.bit();
        const KVM_DIRS = TechniqueId::KvmDirs.bit();

        // Meta-flags: independent reserved bits above the technique space
        // (§3). These steer the aggregator; they do not select a probe.
        const NO_MEMO = 1 << 58;
        const EXTREME = 1 << 59;

        // Named presets, not independent bits: both are unions of technique
        // bits and live entirely inside 0..57. `from_bits_retain` is required
        // here because these values don't correspond to single named flags
        // above; bitflags still renders/parses them correctly since every
        // constituent bit is itself a named flag.
        const ALL = TECHNIQUE_MASK;
        const DEFAULT = DEFAULT_MASK;
    }
}

impl FlagSet {
    /// Mask covering only the meta-flag bits.
    pub const META_MASK: u64 = Self::NO_MEMO.bits() | Self::EXTREME.bits();

    /// The subset of `self` that names techniques (meta-flags stripped).
    pub fn technique_bits(self) -> u64 {
        self.bits() & TECHNIQUE_MASK
    }

    /// True if `self` carries exactly one technique bit and no meta-flag bit.
    pub fn is_single_technique(self) -> bool {
        let techniques = self.technique_bits();
        techniques != 0 && techniques.is_power_of_two() && (self.bits() & Self::META_MASK) == 0
    }
}

/// Expand a caller-supplied [`FlagSet`] into the three inputs the aggregator
/// actually needs (§4.3–§4.4): the raw technique-bit mask to run (falling
/// back to [`DEFAULT_MASK`] when no technique bit was named), whether
/// memoization is suppressed, and whether extreme (any-hit) verdict mode
/// applies.
pub fn expand(flags: FlagSet) -> (u64, bool, bool) {
    let no_memo = flags.contains(FlagSet::NO_MEMO);
    let extreme = flags.contains(FlagSet::EXTREME);
    let technique_bits = flags.technique_bits();
    let enabled = if technique_bits == 0 {
        DEFAULT_MASK
    } else {
        technique_bits
    };
    (enabled, no_memo, extreme)
}
