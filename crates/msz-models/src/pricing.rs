//! Tier and price calculation.
//!
//! Pure functions, no I/O. The tier is the larger of the duration-based and
//! size-based buckets; the price is the provider's base price for that tier
//! plus upsells, with a 10% service uplift, rounded to cents.

use thiserror::Error;

use crate::job::{Provider, Upsells};

/// Hard input ceilings. Anything beyond these is rejected before a job exists.
pub const MAX_DURATION_SEC: u32 = 1200;
pub const MAX_SIZE_MB: u64 = 2048;

/// Upsell surcharges (USD).
pub const PRIORITY_UPSELL: f64 = 0.75;
pub const TRANSCRIPT_UPSELL: f64 = 1.50;

/// Service uplift applied on top of base + upsells.
pub const SERVICE_UPLIFT: f64 = 1.10;

const MB: u64 = 1024 * 1024;

pub type PricingResult<T> = Result<T, PricingError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Computed tier and final price for a job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    /// Price bracket, 1-3
    pub tier: u8,
    /// Final price in USD, rounded to cents
    pub price: f64,
}

/// Duration bucket: <=5 min is tier 1, <=10 min tier 2, above tier 3.
/// Boundary values belong to the lower tier.
pub fn tier_by_duration(duration_sec: u32) -> u8 {
    if duration_sec <= 300 {
        1
    } else if duration_sec <= 600 {
        2
    } else {
        3
    }
}

/// Size bucket: <=500 MB is tier 1, <=1 GB tier 2, above tier 3.
pub fn tier_by_size(size_bytes: u64) -> u8 {
    if size_bytes <= 500 * MB {
        1
    } else if size_bytes <= 1024 * MB {
        2
    } else {
        3
    }
}

/// Round to cents, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Derive the tier for a job, rejecting inputs beyond the global ceilings.
pub fn tier_for(size_bytes: u64, duration_sec: u32) -> PricingResult<u8> {
    if duration_sec > MAX_DURATION_SEC {
        return Err(PricingError::InvalidInput(format!(
            "duration {}s exceeds the {}s limit",
            duration_sec, MAX_DURATION_SEC
        )));
    }
    if size_bytes > MAX_SIZE_MB * MB {
        return Err(PricingError::InvalidInput(format!(
            "size {} bytes exceeds the {} MB limit",
            size_bytes, MAX_SIZE_MB
        )));
    }
    Ok(tier_by_duration(duration_sec).max(tier_by_size(size_bytes)))
}

/// Price a job: provider base for the tier, plus upsells, times the uplift.
pub fn price_for(provider: Provider, tier: u8, upsells: Upsells) -> f64 {
    let mut total = provider.base_price(tier);
    if upsells.priority {
        total += PRIORITY_UPSELL;
    }
    if upsells.transcript {
        total += TRANSCRIPT_UPSELL;
    }
    round2(total * SERVICE_UPLIFT)
}

/// Full quote for an upload. Upsells default to none at upload time; the
/// checkout confirmation re-prices with the chosen upsells.
pub fn quote(
    size_bytes: u64,
    duration_sec: u32,
    provider: Provider,
    upsells: Upsells,
) -> PricingResult<Quote> {
    let tier = tier_for(size_bytes, duration_sec)?;
    Ok(Quote {
        tier,
        price: price_for(provider, tier, upsells),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_upsells() -> Upsells {
        Upsells::default()
    }

    #[test]
    fn duration_boundaries_inclusive_of_lower_tier() {
        assert_eq!(tier_by_duration(300), 1);
        assert_eq!(tier_by_duration(301), 2);
        assert_eq!(tier_by_duration(600), 2);
        assert_eq!(tier_by_duration(601), 3);
        assert_eq!(tier_by_duration(1200), 3);
    }

    #[test]
    fn size_boundaries_inclusive_of_lower_tier() {
        assert_eq!(tier_by_size(500 * MB), 1);
        assert_eq!(tier_by_size(500 * MB + 1), 2);
        assert_eq!(tier_by_size(501 * MB), 2);
        assert_eq!(tier_by_size(1024 * MB), 2);
        assert_eq!(tier_by_size(1024 * MB + 1), 3);
        assert_eq!(tier_by_size(2048 * MB), 3);
    }

    #[test]
    fn tier_is_max_of_both_buckets() {
        // 400MB (tier 1 by size) at 480s (tier 2 by duration) -> tier 2
        assert_eq!(tier_for(400 * MB, 480).unwrap(), 2);
        // 900MB (tier 2 by size) at 120s (tier 1 by duration) -> tier 2
        assert_eq!(tier_for(900 * MB, 120).unwrap(), 2);
        // both tier 3
        assert_eq!(tier_for(2000 * MB, 1100).unwrap(), 3);
    }

    #[test]
    fn oversized_inputs_rejected_before_job_creation() {
        assert!(matches!(
            tier_for(2100 * MB, 60),
            Err(PricingError::InvalidInput(_))
        ));
        assert!(matches!(
            tier_for(MB, 1201),
            Err(PricingError::InvalidInput(_))
        ));
        // exactly at the ceilings is fine
        assert!(tier_for(2048 * MB, 1200).is_ok());
    }

    #[test]
    fn worked_example_gmail_tier2_with_priority() {
        // 400MB / 480s / gmail / priority: tier 2, (2.99 + 0.75) * 1.10 = 4.11
        let q = quote(
            400 * MB,
            480,
            Provider::Gmail,
            Upsells {
                priority: true,
                transcript: false,
            },
        )
        .unwrap();
        assert_eq!(q.tier, 2);
        assert!((q.price - 4.11).abs() < 1e-9);
    }

    #[test]
    fn price_matches_table_for_all_providers_and_tiers() {
        let table = [
            (Provider::Gmail, [1.99, 2.99, 4.99]),
            (Provider::Outlook, [2.19, 3.29, 4.99]),
            (Provider::Other, [2.49, 3.99, 5.49]),
        ];
        for (provider, bases) in table {
            for tier in 1..=3u8 {
                let expected = round2(bases[(tier - 1) as usize] * SERVICE_UPLIFT);
                assert_eq!(price_for(provider, tier, no_upsells()), expected);
            }
        }
    }

    #[test]
    fn upsells_are_added_before_uplift() {
        // gmail tier 1 with both upsells: (1.99 + 0.75 + 1.50) * 1.10 = 4.664 -> 4.66
        let price = price_for(
            Provider::Gmail,
            1,
            Upsells {
                priority: true,
                transcript: true,
            },
        );
        assert!((price - 4.66).abs() < 1e-9);
    }
}
