use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::models::checkout::CartItem;
use crate::models::payments::{PaymentCartItem, PaymentRecord};

pub struct PaymentsTbl;

impl PaymentsTbl {
    pub async fn find_by_order_id(
        tx: &mut Transaction<'_, Postgres>,
        order_id: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, user_id, amount, currency, status, payment_id,
                   payment_method, cart_snapshot, promo_code, discount_amount,
                   created_at, updated_at
            FROM payments
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(tx.as_mut())
        .await?;

        Ok(row.map(|row| Self::map_payment_row(&row)))
    }

    /// Append a verification failure to the payment's failure log and park
    /// the record in `failed`. Runs outside any transaction; a verification
    /// rejection has nothing else to roll back.
    pub async fn log_failure(
        pool: &PgPool,
        order_id: &str,
        error_details: &str,
        cart_items: &[CartItem],
    ) -> Result<(), sqlx::Error> {
        let entry = serde_json::json!({
            "at": Utc::now(),
            "error": error_details,
            "cart": cart_items
                .iter()
                .map(|item| serde_json::json!({
                    "product_id": item.product_id,
                    "duration": item.duration,
                }))
                .collect::<Vec<_>>(),
        });

        sqlx::query(
            r#"
            UPDATE payments
            SET status = 'failed',
                failure_log = failure_log || $2::jsonb,
                updated_at = now()
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .bind(sqlx::types::Json(entry))
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Transition the record to captured, attaching the gateway payment id,
    /// the subscriptions this order produced and the paying user.
    pub async fn mark_captured(
        tx: &mut Transaction<'_, Postgres>,
        order_id: &str,
        payment_id: &str,
        payment_method: Option<&str>,
        subscription_ids: &[Uuid],
        user_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'captured',
                payment_id = $2,
                payment_method = COALESCE($3, payment_method),
                subscription_ids = $4,
                user_id = $5,
                updated_at = now()
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .bind(payment_id)
        .bind(payment_method)
        .bind(subscription_ids)
        .bind(user_id)
        .execute(tx.as_mut())
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }

    fn map_payment_row(row: &PgRow) -> PaymentRecord {
        let cart_snapshot: serde_json::Value = row.get("cart_snapshot");
        let cart_snapshot: Vec<PaymentCartItem> =
            serde_json::from_value(cart_snapshot).unwrap_or_default();

        PaymentRecord {
            id: row.get("id"),
            order_id: row.get("order_id"),
            user_id: row.get("user_id"),
            amount: row.get("amount"),
            currency: row.get("currency"),
            status: row.get("status"),
            payment_id: row.get("payment_id"),
            payment_method: row.get("payment_method"),
            cart_snapshot,
            promo_code: row.get("promo_code"),
            discount_amount: row.get("discount_amount"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}
