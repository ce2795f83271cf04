//! Probe implementations (§4.2), one free function per [`crate::flags::TechniqueId`].
//!
//! Every function here has the signature `fn(&mut BrandTally) -> bool` and is
//! only ever called through [`crate::registry`] — nothing in this module
//! tree is `pub(crate)` by accident; it's enforced by never re-exporting a
//! probe function as `pub`.

pub mod common;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod cpu;
#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
pub mod cpu {
    //! Stand-ins compiled on non-x86 targets. The registry's CPUID/RDTSC/
    //! SIDT rows are gated by OS (`Platforms`), not CPU architecture, so
    //! these are reachable on e.g. aarch64 Linux — they report "no hit"
    //! rather than failing to build, since CPUID itself doesn't exist there.
    use crate::brand::BrandTally;

    macro_rules! noop_probe {
        ($($name:ident),+ $(,)?) => {
            $(pub fn $name(_tally: &mut BrandTally) -> bool { false })+
        };
    }

    noop_probe!(
        vmid,
        brand,
        hypervisor_bit,
        cpuid_0x4,
        hypervisor_str,
        rdtsc,
        sidt5,
        vmid_0x4,
        rdtsc_vmexit,
        qemu_brand,
        bochs_cpu,
    );
}
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod linux;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub mod linux {
    //! Stand-ins compiled on non-Linux targets so the registry still builds.
    //! The registry never calls these on the wrong platform (§4.2), but the
    //! `fn` pointers in the static table need a body to point at regardless
    //! of `cfg`.
    use crate::brand::BrandTally;

    macro_rules! unreachable_probe {
        ($($name:ident),+ $(,)?) => {
            $(pub fn $name(_tally: &mut BrandTally) -> bool { false })+
        };
    }

    unreachable_probe!(
        temperature,
        systemd,
        cvendor,
        ctype,
        dockerenv,
        dmidecode,
        dmesg,
        hwmon,
        linux_user_host,
        kvm_reg,
        kvm_drivers,
        kvm_dirs
    );
}

#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(not(target_os = "macos"))]
pub mod macos {
    //! Stand-ins compiled on non-macOS targets; see [`super::linux`] fallback.
    use crate::brand::BrandTally;

    macro_rules! unreachable_probe {
        ($($name:ident),+ $(,)?) => {
            $(pub fn $name(_tally: &mut BrandTally) -> bool { false })+
        };
    }

    unreachable_probe!(
        hwmodel,
        mac_hyperthread,
        mac_memsize,
        mac_iokit,
        ioreg_grep,
        mac_sip
    );
}

#[cfg(windows)]
pub mod windows;
#[cfg(not(windows))]
pub mod windows {
    //! Stand-ins compiled on non-Windows targets; see [`super::linux`] fallback.
    use crate::brand::BrandTally;

    macro_rules! unreachable_probe {
        ($($name:ident),+ $(,)?) => {
            $(pub fn $name(_tally: &mut BrandTally) -> bool { false })+
        };
    }

    unreachable_probe!(
        cursor,
        vmware_reg,
        vbox_reg,
        dll,
        registry,
        sunbelt_vm,
        vm_files,
        vbox_network,
        vbox_window_class,
        wmic,
        gamarue,
        parallels_vm,
        loaded_dlls,
        vpc_board,
        hyperv_wmi,
        hyperv_reg,
        bios_serial,
        vbox_folders,
        vbox_mssmbios,
    );
}
