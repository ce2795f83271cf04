//! Brand identity and the per-run vote tally.

use std::collections::HashMap;

use strum_macros::AsRefStr;
use strum_macros::EnumIter;

/// The suspected hypervisor or sandbox brand, chosen by plurality vote
/// (§4.4). `Display`/`AsRef<str>` render the exact external literals from
/// §6 — never hand-duplicated as a separate string table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, AsRefStr)]
pub enum BrandId {
    #[strum(serialize = "VMware")]
    Vmware,
    #[strum(serialize = "VirtualBox")]
    VirtualBox,
    #[strum(serialize = "bhyve")]
    Bhyve,
    #[strum(serialize = "KVM")]
    Kvm,
    #[strum(serialize = "QEMU")]
    Qemu,
    #[strum(serialize = "QEMU/KVM")]
    QemuKvm,
    #[strum(serialize = "Microsoft Hyper-V")]
    MicrosoftHyperV,
    #[strum(serialize = "Microsoft x86-to-ARM")]
    MicrosoftX86ToArm,
    #[strum(serialize = "Parallels")]
    Parallels,
    #[strum(serialize = "Xen HVM")]
    XenHvm,
    #[strum(serialize = "ACRN")]
    Acrn,
    #[strum(serialize = "QNX hypervisor")]
    QnxHypervisor,
    #[strum(serialize = "Hybrid Analysis")]
    HybridAnalysis,
    #[strum(serialize = "Sandboxie")]
    Sandboxie,
    #[strum(serialize = "Docker")]
    Docker,
    #[strum(serialize = "Wine")]
    Wine,
    #[strum(serialize = "Virtual Apple")]
    VirtualApple,
    #[strum(serialize = "Virtual PC")]
    VirtualPc,
    #[strum(serialize = "Anubis")]
    Anubis,
    #[strum(serialize = "JoeBox")]
    JoeBox,
    #[strum(serialize = "Thread Expert")]
    ThreadExpert,
    #[strum(serialize = "CW Sandbox")]
    CwSandbox,
    #[strum(serialize = "SunBelt")]
    SunBelt,
    #[strum(serialize = "Comodo")]
    Comodo,
    #[strum(serialize = "Bochs")]
    Bochs,
    #[strum(serialize = "Unknown")]
    Unknown,
}

impl std::fmt::Display for BrandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// Per-run vote tally: stack-local, created fresh for every aggregator
/// invocation and passed through by `&mut` reference rather than living as
/// global state (§9 redesign note — this is the adopted behavior, not an
/// open item).
#[derive(Debug, Default)]
pub struct BrandTally {
    votes: HashMap<BrandId, u32>,
}

impl BrandTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cast `n` votes for `brand`.
    pub fn add(&mut self, brand: BrandId, n: u32) {
        *self.votes.entry(brand).or_insert(0) += n;
    }

    /// The brand with the strictly highest vote count, or `Unknown` on a
    /// tie (including an empty tally).
    pub fn winner(&self) -> BrandId {
        let mut best: Option<(BrandId, u32)> = None;
        let mut tied = false;
        for (&brand, &count) in &self.votes {
            match best {
                None => best = Some((brand, count)),
                Some((_, best_count)) if count > best_count => {
                    best = Some((brand, count));
                    tied = false;
                }
                Some((_, best_count)) if count == best_count => tied = true,
                _ => {}
            }
        }
        match best {
            Some((brand, _)) if !tied => brand,
            _ => BrandId::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_tally_is_unknown() {
        assert_eq!(BrandTally::new().winner(), BrandId::Unknown);
    }

    #[test]
    fn single_vote_wins() {
        let mut tally = BrandTally::new();
        tally.add(BrandId::VirtualBox, 1);
        assert_eq!(tally.winner(), BrandId::VirtualBox);
    }

    #[test]
    fn plurality_wins() {
        let mut tally = BrandTally::new();
        tally.add(BrandId::Kvm, 1);
        tally.add(BrandId::Kvm, 1);
        tally.add(BrandId::Qemu, 1);
        assert_eq!(tally.winner(), BrandId::Kvm);
    }

    #[test]
    fn tie_is_unknown() {
        let mut tally = BrandTally::new();
        tally.add(BrandId::Vmware, 1);
        tally.add(BrandId::VirtualBox, 1);
        assert_eq!(tally.winner(), BrandId::Unknown);
    }

    #[test]
    fn display_matches_exact_literal() {
        assert_eq!(BrandId::QemuKvm.to_string(), "QEMU/KVM");
        assert_eq!(BrandId::MicrosoftHyperV.to_string(), "Microsoft Hyper-V");
        assert_eq!(BrandId::Unknown.to_string(), "Unknown");
    }
}
