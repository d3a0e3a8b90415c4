use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub duration: String, // label shown at checkout, e.g. "1 Month"
    pub duration_value: i32,
    pub duration_unit: String,
    pub price: BigDecimal,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PromoCode {
    pub id: Uuid,
    pub product_id: Uuid,
    pub code: String,
    pub discount_amount: Option<BigDecimal>,
    pub used_count: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCatalogEntry {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub variants: Vec<ProductVariant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl DurationUnit {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "minute" | "minutes" => Some(Self::Minutes),
            "hour" | "hours" => Some(Self::Hours),
            "day" | "days" => Some(Self::Days),
            "week" | "weeks" => Some(Self::Weeks),
            "month" | "months" => Some(Self::Months),
            "year" | "years" => Some(Self::Years),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_unit_parsing_is_case_and_plural_insensitive() {
        assert_eq!(DurationUnit::parse("Months"), Some(DurationUnit::Months));
        assert_eq!(DurationUnit::parse("month"), Some(DurationUnit::Months));
        assert_eq!(DurationUnit::parse(" YEARS "), Some(DurationUnit::Years));
        assert_eq!(DurationUnit::parse("week"), Some(DurationUnit::Weeks));
        assert_eq!(DurationUnit::parse("fortnight"), None);
        assert_eq!(DurationUnit::parse(""), None);
    }
}
