use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::MAX_MONEY_AMOUNT;

/// Represents the 'rate_cards' table. The oldest card is the global one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateCard {
    pub id: i64,
    pub category: String,
    pub price_per_post: i64,
    pub ads_types: Vec<AdsTypePrice>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AdsTypePrice {
    #[validate(length(min = 1, max = 100))]
    pub ads_type: String,
    /// Price per day for this ad type.
    #[validate(range(min = 0, max = MAX_MONEY_AMOUNT))]
    pub price: i64,
}

impl RateCard {
    /// Exact-name lookup used when pricing a new sponsor proposal.
    pub fn price_for(&self, ads_type: &str) -> Option<i64> {
        self.ads_types
            .iter()
            .find(|ad| ad.ads_type == ads_type)
            .map(|ad| ad.price)
    }
}

/// DTO for creating or replacing a rate card.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RateCardRequest {
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    #[validate(range(min = 0, max = MAX_MONEY_AMOUNT))]
    pub price_per_post: i64,
    #[validate(nested)]
    #[serde(default)]
    pub ads_types: Vec<AdsTypePrice>,
}

impl RateCardRequest {
    pub fn category(&self) -> String {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|category| !category.is_empty())
            .unwrap_or("category")
            .to_string()
    }
}
