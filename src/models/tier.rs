//! Subscription tiers and the quota policy.
//!
//! This module is the single source of truth for how a tier translates into
//! a daily call allowance. Both the direct-key and the proxy authenticators
//! read quotas from here, so a tier change lands identically on either path.
//!
//! # Tier Table
//!
//! | Tier         | Calls/day | Price (USD/month) |
//! |--------------|-----------|-------------------|
//! | `free`       | 100       | 0                 |
//! | `starter`    | 1,000     | 19                |
//! | `pro`        | 10,000    | 99                |
//! | `enterprise` | 1,000,000 | 499               |

use serde::{Deserialize, Serialize};
use std::fmt;

/// A subscription level. Determines the tenant's daily quota.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Starter,
    Pro,
    Enterprise,
}

impl Tier {
    /// Every tier, lowest first.
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Starter, Tier::Pro, Tier::Enterprise];

    /// Parse a stored or user-supplied tier label.
    ///
    /// Unknown or empty labels resolve to [`Tier::Free`]. An unrecognized label
    /// must never be granted more than the lowest allowance.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "starter" => Tier::Starter,
            "pro" => Tier::Pro,
            "enterprise" => Tier::Enterprise,
            _ => Tier::Free,
        }
    }

    /// Map a marketplace subscription plan to an internal tier.
    ///
    /// # Mapping
    ///
    /// - `BASIC` → `free`
    /// - `PRO` → `starter`
    /// - `ULTRA` → `pro`
    /// - `MEGA` → `enterprise`
    ///
    /// Plan labels are matched case-insensitively. Anything else, including a
    /// missing plan, maps to `free`.
    pub fn from_marketplace_plan(plan: Option<&str>) -> Self {
        match plan.map(|p| p.trim().to_ascii_uppercase()).as_deref() {
            Some("PRO") => Tier::Starter,
            Some("ULTRA") => Tier::Pro,
            Some("MEGA") => Tier::Enterprise,
            _ => Tier::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Starter => "starter",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        }
    }

    /// Daily call allowance for this tier.
    pub fn daily_quota(&self) -> i64 {
        match self {
            Tier::Free => 100,
            Tier::Starter => 1_000,
            Tier::Pro => 10_000,
            Tier::Enterprise => 1_000_000,
        }
    }

    /// Display name used on the pricing page.
    pub fn display_name(&self) -> &'static str {
        match self {
            Tier::Free => "Free",
            Tier::Starter => "Starter",
            Tier::Pro => "Pro",
            Tier::Enterprise => "Enterprise",
        }
    }

    /// Monthly price in whole US dollars.
    pub fn monthly_price_usd(&self) -> u32 {
        match self {
            Tier::Free => 0,
            Tier::Starter => 19,
            Tier::Pro => 99,
            Tier::Enterprise => 499,
        }
    }

    /// Feature bullets shown next to the tier on the pricing page.
    pub fn features(&self) -> &'static [&'static str] {
        match self {
            Tier::Free => &["Employer lookup", "Regional data", "Basic analytics"],
            Tier::Starter => &[
                "Everything in Free",
                "Income predictions",
                "Extended rate limits",
            ],
            Tier::Pro => &[
                "Everything in Starter",
                "Document scanning",
                "Fraud detection",
                "Priority support",
            ],
            Tier::Enterprise => &[
                "Everything in Pro",
                "Unlimited calls",
                "Custom integrations",
                "SLA",
                "Dedicated support",
            ],
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
