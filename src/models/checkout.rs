use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::subscriptions::SubscriptionStatus;

/// Body of `POST /payments/verify`, exactly as the web checkout sends it.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[validate]
    pub payment_response: PaymentGatewayResponse,
    #[validate(length(min = 1, message = "cart must contain at least one item"))]
    pub cart_items: Vec<CartItem>,
    pub promo_code: Option<String>,
    pub promo_details: Option<PromoDetails>,
}

/// The triple Razorpay posts back after a successful checkout, field names
/// theirs.
#[derive(Debug, Deserialize, Validate)]
pub struct PaymentGatewayResponse {
    #[validate(length(min = 1, message = "razorpay_order_id is required"))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1, message = "razorpay_payment_id is required"))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1, message = "razorpay_signature is required"))]
    pub razorpay_signature: String,
    pub method: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: Uuid,
    pub duration: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoDetails {
    pub code: String,
    pub discount_amount: BigDecimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub message: String,
    pub payment_id: String,
    pub order_id: String,
    pub created_subscription_ids: Vec<Uuid>,
    pub payment_record_id: Uuid,
    pub invoice_email: InvoiceEmailReport,
    pub amount: BigDecimal,
    pub summary: OrderSummary,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub total_subscriptions: usize,
    pub total_amount: BigDecimal,
    pub tax_amount: BigDecimal,
    pub subtotal: BigDecimal,
}

/// Outcome of the best-effort invoice email, reported verbatim in the
/// response whatever happened.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceEmailReport {
    pub sent: bool,
    pub attempted: bool,
    pub error: Option<String>,
    pub to: String,
    pub timestamp: DateTime<Utc>,
}

/// What the writer records about each created subscription, for the invoice
/// and the notification fan-out.
#[derive(Debug, Clone)]
pub struct CreatedSubscriptionSummary {
    pub subscription_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub duration: String,
    pub original_price: BigDecimal,
    pub discount_applied: BigDecimal,
    pub amount_paid: BigDecimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub should_notify: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_ok};

    fn checkout_body() -> serde_json::Value {
        serde_json::json!({
            "paymentResponse": {
                "razorpay_order_id": "order_Mz1aBcDeFgHiJk",
                "razorpay_payment_id": "pay_Mz2bCdEfGhIjKl",
                "razorpay_signature": "deadbeef",
                "method": "upi"
            },
            "cartItems": [
                { "productId": Uuid::new_v4(), "duration": "1 Month" }
            ],
            "promoCode": "DIWALI24",
            "promoDetails": { "code": "DIWALI24", "discountAmount": "50.00" }
        })
    }

    #[test]
    fn the_checkout_body_deserializes_from_camel_case() {
        let request: VerifyPaymentRequest = serde_json::from_value(checkout_body()).unwrap();
        assert_eq!(
            request.payment_response.razorpay_order_id,
            "order_Mz1aBcDeFgHiJk"
        );
        assert_eq!(request.cart_items.len(), 1);
        assert_eq!(request.cart_items[0].duration, "1 Month");
        assert_eq!(request.promo_code.as_deref(), Some("DIWALI24"));
        assert_ok!(request.validate());
    }

    #[test]
    fn an_empty_cart_fails_validation() {
        let mut body = checkout_body();
        body["cartItems"] = serde_json::json!([]);
        let request: VerifyPaymentRequest = serde_json::from_value(body).unwrap();
        assert_err!(request.validate());
    }

    #[test]
    fn a_blank_order_id_fails_validation() {
        let mut body = checkout_body();
        body["paymentResponse"]["razorpay_order_id"] = serde_json::json!("");
        let request: VerifyPaymentRequest = serde_json::from_value(body).unwrap();
        assert_err!(request.validate());
    }

    #[test]
    fn promo_fields_are_optional() {
        let mut body = checkout_body();
        body.as_object_mut().unwrap().remove("promoCode");
        body.as_object_mut().unwrap().remove("promoDetails");
        let request: VerifyPaymentRequest = serde_json::from_value(body).unwrap();
        assert!(request.promo_code.is_none());
        assert!(request.promo_details.is_none());
    }
}
