//! Walks the enabled subset of the registry and produces a [`DetectionResult`]
//! (§4.4). This is the one place that actually invokes probe functions
//! outside of [`crate::check`].

use crate::brand::BrandTally;
use crate::registry;
use crate::registry::Platforms;
use crate::result::DetectionResult;

/// Run every enabled, platform-available probe once, in registry order, and
/// fold the outcome into a single [`DetectionResult`].
///
/// `enabled` is a raw technique-bit mask already expanded by
/// [`crate::flags::expand`] — meta-flags play no part here.
pub fn run(enabled: u64, extreme: bool) -> DetectionResult {
    let mut score: u32 = 0;
    let mut tally = BrandTally::new();
    let current_platform = Platforms::current();

    for descriptor in registry::iterate() {
        if enabled & descriptor.id.bit() == 0 {
            continue;
        }

        #[cfg(test)]
        if let Some((hit, vote)) = crate::testing::seam::lookup(descriptor.id) {
            crate::testing::seam::record_invocation(descriptor.id);
            if hit {
                score += descriptor.weight as u32;
                if let Some((brand, n)) = vote {
                    tally.add(brand, n);
                }
            }
            tracing::debug!(technique = descriptor.name, hit, stubbed = true, "probe");
            continue;
        }

        let runnable = match current_platform {
            Some(platform) => descriptor.platforms.intersects(platform),
            None => false,
        };
        if !runnable {
            continue;
        }

        let hit = (descriptor.run)(&mut tally);
        #[cfg(test)]
        crate::testing::seam::record_invocation(descriptor.id);
        tracing::debug!(technique = descriptor.name, hit, "probe");
        if hit {
            score += descriptor.weight as u32;
        }
    }

    let percentage = score.min(100) as u8;
    let verdict = if extreme { score > 0 } else { percentage >= 100 };
    let brand = tally.winner();

    DetectionResult {
        verdict,
        percentage,
        brand,
    }
}
