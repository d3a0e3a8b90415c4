use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One gateway order, keyed by the Razorpay order id. Created at
/// order-creation time (outside this service's verification flow) and mutated
/// exactly twice in its life: a failure log entry, or the capture transition.
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub order_id: String,
    pub user_id: Option<Uuid>,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: String, // created | captured | failed
    pub payment_id: Option<String>,
    pub payment_method: Option<String>,
    pub cart_snapshot: Vec<PaymentCartItem>,
    pub promo_code: Option<String>,
    pub discount_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-item pricing captured when the order was created. Authoritative for
/// what the user was actually charged; the writer never recomputes discounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCartItem {
    pub product_id: Uuid,
    pub original_price: BigDecimal,
    pub discounted_price: BigDecimal,
    pub discount_applied: BigDecimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,
}

impl PaymentRecord {
    pub fn snapshot_for(&self, product_id: Uuid) -> Option<&PaymentCartItem> {
        self.cart_snapshot
            .iter()
            .find(|item| item.product_id == product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn snapshot_item(product_id: Uuid, original: &str) -> PaymentCartItem {
        PaymentCartItem {
            product_id,
            original_price: BigDecimal::from_str(original).unwrap(),
            discounted_price: BigDecimal::from_str(original).unwrap(),
            discount_applied: BigDecimal::from(0),
            promo_code: None,
        }
    }

    #[test]
    fn snapshot_lookup_matches_on_product_id() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let record = PaymentRecord {
            id: Uuid::new_v4(),
            order_id: "order_Mz1aBcDeFgHiJk".to_string(),
            user_id: None,
            amount: BigDecimal::from(300),
            currency: "INR".to_string(),
            status: "created".to_string(),
            payment_id: None,
            payment_method: None,
            cart_snapshot: vec![snapshot_item(first, "100"), snapshot_item(second, "200")],
            promo_code: None,
            discount_amount: BigDecimal::from(0),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(
            record.snapshot_for(second).map(|i| i.product_id),
            Some(second)
        );
        assert!(record.snapshot_for(Uuid::new_v4()).is_none());
    }

    #[test]
    fn cart_snapshot_deserializes_from_stored_json() {
        let product_id = Uuid::new_v4();
        let raw = serde_json::json!([{
            "product_id": product_id,
            "original_price": "499.00",
            "discounted_price": "449.00",
            "discount_applied": "50.00",
            "promo_code": "DIWALI24"
        }]);

        let items: Vec<PaymentCartItem> = serde_json::from_value(raw).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id, product_id);
        assert_eq!(items[0].promo_code.as_deref(), Some("DIWALI24"));
    }
}
