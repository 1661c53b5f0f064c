//! Reward catalog read model and the static membership perks.

use crate::error::AccountError;
use crate::store::records::RewardRecord;
use crate::store::{LedgerStore, RewardStore};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

// ── Perks ───────────────────────────────────────────────────────

/// A group of membership perks shown together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PerkSection {
    pub title: &'static str,
    pub perks: &'static [&'static str],
}

/// Membership perks by zone.
pub const PERK_SECTIONS: &[PerkSection] = &[
    PerkSection {
        title: "General Benefits",
        perks: &[
            "Earn 20 iAccess points per visit.",
            "5% birthday discount.",
            "Redeem points starting at 300 iAccess points.",
            "50 iAccess points per referral.",
        ],
    },
    PerkSection {
        title: "iEAT Zone Benefits",
        perks: &["Earn 20 iAccess points per ₱500 spent", "5% birthday discount"],
    },
    PerkSection {
        title: "iDRINK Zone Benefits",
        perks: &[
            "Buy 7 drinks, get 1 free (Milk Tea or Coffee)",
            "Free water refill access",
        ],
    },
    PerkSection {
        title: "iPLAY Zone Benefits",
        perks: &["10% off darts & billiards"],
    },
    PerkSection {
        title: "iLOUNGE Zone Benefits",
        perks: &["Free lounge access with any order", "Member Wi-Fi zone"],
    },
];

/// Look up a perk section by title.
pub fn find_section(title: &str) -> Option<&'static PerkSection> {
    PERK_SECTIONS.iter().find(|s| s.title == title)
}

// ── Rewards ─────────────────────────────────────────────────────

/// A reward as seen by one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardView {
    pub voucher_code: String,
    pub name: String,
    pub description: String,
    pub needed_points: i64,
    pub image: Option<String>,
    pub per_customer: bool,
    /// The member already has a transaction carrying this voucher code.
    pub already_redeemed: bool,
}

impl RewardView {
    pub fn new(reward: RewardRecord, already_redeemed: bool) -> Self {
        Self {
            voucher_code: reward.voucher_code,
            name: reward.name,
            description: reward.description,
            needed_points: reward.needed_points,
            image: reward.image,
            per_customer: reward.per_customer,
            already_redeemed,
        }
    }

    /// False only for a once-per-member reward the member already redeemed.
    pub fn is_claimable(&self) -> bool {
        !(self.per_customer && self.already_redeemed)
    }

    pub fn affordable(&self, balance: i64) -> bool {
        self.needed_points <= balance
    }
}

/// Rewards merged with a member's redemption history.
pub struct RewardCatalog {
    rewards: Arc<dyn RewardStore>,
    ledger: Arc<dyn LedgerStore>,
}

impl RewardCatalog {
    pub fn new(rewards: Arc<dyn RewardStore>, ledger: Arc<dyn LedgerStore>) -> Self {
        Self { rewards, ledger }
    }

    /// Every reward, flagged with whether this member already redeemed it.
    pub async fn rewards_for(&self, user_id: &str) -> Result<Vec<RewardView>, AccountError> {
        let redeemed: HashSet<String> = self
            .ledger
            .redeemed_voucher_codes(user_id)
            .await?
            .into_iter()
            .collect();
        let rewards = self.rewards.list_rewards().await?;

        Ok(rewards
            .into_iter()
            .map(|reward| {
                let already = redeemed.contains(&reward.voucher_code);
                RewardView::new(reward, already)
            })
            .collect())
    }
}
