//! Tier allocation.
//!
//! Orders picks by composite score and partitions them into
//! elite/premium/free. Every input pick lands in exactly one tier.

use serde::Serialize;

use crate::config::TierConfig;
use crate::types::{Pick, Tier};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierAllocation {
    pub elite: Vec<Pick>,
    pub premium: Vec<Pick>,
    pub free: Vec<Pick>,
}

impl TierAllocation {
    pub fn picks(&self, tier: Tier) -> &[Pick] {
        match tier {
            Tier::Elite => &self.elite,
            Tier::Premium => &self.premium,
            Tier::Free => &self.free,
        }
    }

    pub fn total(&self) -> usize {
        self.elite.len() + self.premium.len() + self.free.len()
    }

    /// Non-empty tiers in priority order.
    pub fn non_empty(&self) -> impl Iterator<Item = (Tier, &[Pick])> {
        Tier::ALL
            .iter()
            .map(move |&t| (t, self.picks(t)))
            .filter(|(_, picks)| !picks.is_empty())
    }
}

pub struct TierAllocator {
    config: TierConfig,
}

impl TierAllocator {
    pub fn new(config: TierConfig) -> Self {
        Self { config }
    }

    /// Tier for one pick. An upstream `elite` label is honoured; other
    /// labels are recomputed from confidence.
    pub fn classify(&self, pick: &Pick) -> Tier {
        if pick.confidence >= self.config.elite_min_confidence || pick.tier == Some(Tier::Elite) {
            Tier::Elite
        } else if pick.confidence >= self.config.premium_min_confidence {
            Tier::Premium
        } else {
            Tier::Free
        }
    }

    pub fn allocate(&self, mut picks: Vec<Pick>) -> TierAllocation {
        picks.sort_by(|a, b| {
            b.sort_score()
                .partial_cmp(&a.sort_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut out = TierAllocation::default();
        for mut pick in picks {
            let tier = self.classify(&pick);
            pick.tier = Some(tier);
            match tier {
                Tier::Elite => out.elite.push(pick),
                Tier::Premium => out.premium.push(pick),
                Tier::Free => out.free.push(pick),
            }
        }
        out
    }
}
