use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Coverage state of one purchased interval. The wire strings are load-bearing
/// (clients filter on them), so variants serialize to exactly
/// `active`, `expiresoon` and `expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    ExpireSoon,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::ExpireSoon => "expiresoon",
            Self::Expired => "expired",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "expiresoon" => Some(Self::ExpireSoon),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenewalType {
    Contiguous,
    Fresh,
}

/// Purchase-time audit trail. Every field is enumerated on purpose; none of
/// the invariants of the subscription lifecycle depend on this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<BigDecimal>,
    pub renewal_type: RenewalType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap_in_days: Option<i64>,
    pub initial_status: SubscriptionStatus,
    pub should_notify: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    // plan snapshot taken at purchase time; catalog edits never touch it
    pub variant_duration: String,
    pub variant_duration_value: i32,
    pub variant_duration_unit: String,
    pub variant_price: BigDecimal,
    pub original_price: BigDecimal,
    pub discount_applied: BigDecimal,
    pub amount_paid: BigDecimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub original_start_date: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub payment_status: String,
    pub is_renewal: bool,
    pub renewed_from: Option<Uuid>,
    pub contiguous_chain_id: Uuid,
    pub is_latest: bool,
    pub replaced_subscription: Option<Uuid>,
    pub payment_id: String,
    pub transaction_id: String,
    pub metadata: SubscriptionMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for the transaction writer; ids are generated at insert.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub variant_duration: String,
    pub variant_duration_value: i32,
    pub variant_duration_unit: String,
    pub variant_price: BigDecimal,
    pub original_price: BigDecimal,
    pub discount_applied: BigDecimal,
    pub amount_paid: BigDecimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub original_start_date: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub is_renewal: bool,
    pub renewed_from: Option<Uuid>,
    pub contiguous_chain_id: Uuid,
    pub replaced_subscription: Option<Uuid>,
    pub payment_id: String,
    pub transaction_id: String,
    pub metadata: SubscriptionMetadata,
}

/// A subscription joined with the product it covers, as served to clients and
/// consumed by the post-commit notifier.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionDetail {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub product_name: String,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionStatusSummary {
    pub has_active_subscription: bool,
    pub current_subscription: Option<SubscriptionDetail>,
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_serializes_to_the_exact_wire_strings() {
        assert_eq!(
            serde_json::to_string(&SubscriptionStatus::Active).unwrap(),
            r#""active""#
        );
        assert_eq!(
            serde_json::to_string(&SubscriptionStatus::ExpireSoon).unwrap(),
            r#""expiresoon""#
        );
        assert_eq!(
            serde_json::to_string(&SubscriptionStatus::Expired).unwrap(),
            r#""expired""#
        );
    }

    #[test]
    fn status_parse_accepts_only_known_values() {
        assert_eq!(
            SubscriptionStatus::parse("expiresoon"),
            Some(SubscriptionStatus::ExpireSoon)
        );
        assert_eq!(SubscriptionStatus::parse("EXPIRED"), None);
        assert_eq!(SubscriptionStatus::parse("pending"), None);
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let metadata = SubscriptionMetadata {
            payment_method: Some("upi".to_string()),
            promo_code: Some("DIWALI24".to_string()),
            discount_amount: Some(BigDecimal::from_str("50.00").unwrap()),
            renewal_type: RenewalType::Contiguous,
            gap_in_days: Some(-5),
            initial_status: SubscriptionStatus::Active,
            should_notify: true,
        };

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["renewal_type"], "contiguous");
        assert_eq!(json["gap_in_days"], -5);

        let back: SubscriptionMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, metadata);
    }

    #[test]
    fn absent_optional_metadata_fields_are_omitted() {
        let metadata = SubscriptionMetadata {
            payment_method: None,
            promo_code: None,
            discount_amount: None,
            renewal_type: RenewalType::Fresh,
            gap_in_days: None,
            initial_status: SubscriptionStatus::Active,
            should_notify: true,
        };

        let json = serde_json::to_value(&metadata).unwrap();
        assert!(json.get("promo_code").is_none());
        assert!(json.get("gap_in_days").is_none());
        assert_eq!(json["renewal_type"], "fresh");
    }
}
