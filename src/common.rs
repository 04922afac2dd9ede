//! Small helpers shared by entities, services and handlers.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Rounds a monetary amount to cents, half away from zero, always at scale 2.
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Largest page size a listing serves.
pub const MAX_PAGE_SIZE: u64 = 100;
/// Largest page number a listing accepts.
pub const MAX_PAGE: u64 = 10_000;

/// Zero-based page index for a 1-based page number from the client, clamped to
/// `1..=MAX_PAGE`.
pub fn page_index(page: Option<u64>) -> u64 {
    page.unwrap_or(1).clamp(1, MAX_PAGE) - 1
}

/// Clamps a requested page size to `1..=MAX_PAGE_SIZE`.
pub fn page_size(limit: Option<u64>, default: u64) -> u64 {
    limit.unwrap_or(default).clamp(1, MAX_PAGE_SIZE)
}

/// Number of pages needed to show `total` rows `per_page` at a time.
pub fn total_pages(total: u64, per_page: u64) -> u64 {
    if per_page == 0 {
        return 0;
    }
    total.div_ceil(per_page)
}

/// Serde adapter writing money as a two-decimal string (`"96.25"`).
pub mod money {
    use super::round_money;
    use rust_decimal::Decimal;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&round_money(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        <Decimal as Deserialize>::deserialize(deserializer)
    }
}

/// A page of results plus the page count for the same filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, per_page: u64) -> Self {
        Self {
            data,
            total,
            total_pages: total_pages(total, per_page),
        }
    }
}
