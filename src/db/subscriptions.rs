use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::core::renewal::PriorCoverage;
use crate::core::AppError;
use crate::models::subscriptions::{
    NewSubscription, RenewalType, Subscription, SubscriptionDetail, SubscriptionMetadata,
    SubscriptionStatus,
};

/// Flip the current latest subscription for (user, product) off, returning
/// its id so the incoming record can point at what it replaced. Runs inside
/// the order transaction, so an abort rolls the flip back too.
pub async fn demote_latest_subscription(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    product_id: Uuid,
) -> Result<Option<Uuid>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE subscriptions
        SET is_latest = false, updated_at = now()
        WHERE user_id = $1 AND product_id = $2 AND is_latest = true
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_optional(tx.as_mut())
    .await?;

    Ok(row.map(|row| row.get("id")))
}

/// The contiguity oracle: the most recent subscription for (user, product)
/// whose coverage ends in the future or inside the grace window.
pub async fn find_contiguous_candidate(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    product_id: Uuid,
    now: DateTime<Utc>,
    grace_days: i64,
) -> Result<Option<PriorCoverage>, sqlx::Error> {
    let cutoff = now - Duration::days(grace_days);

    let row = sqlx::query(
        r#"
        SELECT id, end_date, original_start_date, contiguous_chain_id
        FROM subscriptions
        WHERE user_id = $1 AND product_id = $2 AND end_date >= $3
        ORDER BY end_date DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(cutoff)
    .fetch_optional(tx.as_mut())
    .await?;

    Ok(row.map(|row| map_prior_coverage(&row)))
}

/// Independent guard for early renewals: a subscription still running past
/// `now`, whatever the oracle said.
pub async fn find_unexpired_subscription(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    product_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<PriorCoverage>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, end_date, original_start_date, contiguous_chain_id
        FROM subscriptions
        WHERE user_id = $1 AND product_id = $2
          AND status IN ('active', 'expiresoon')
          AND end_date > $3
        ORDER BY end_date DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(now)
    .fetch_optional(tx.as_mut())
    .await?;

    Ok(row.map(|row| map_prior_coverage(&row)))
}

fn map_prior_coverage(row: &PgRow) -> PriorCoverage {
    PriorCoverage {
        subscription_id: row.get("id"),
        end_date: row.get("end_date"),
        original_start_date: row.get("original_start_date"),
        contiguous_chain_id: row.get("contiguous_chain_id"),
    }
}

pub async fn insert_subscription(
    tx: &mut Transaction<'_, Postgres>,
    subscription: &NewSubscription,
) -> Result<Uuid, sqlx::Error> {
    let subscription_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO subscriptions (
            id, user_id, product_id,
            variant_duration, variant_duration_value, variant_duration_unit, variant_price,
            original_price, discount_applied, amount_paid,
            start_date, end_date, original_start_date,
            status, payment_status,
            is_renewal, renewed_from, contiguous_chain_id, is_latest, replaced_subscription,
            payment_id, transaction_id, metadata
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
            $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23
        )
        "#,
    )
    .bind(subscription_id)
    .bind(subscription.user_id)
    .bind(subscription.product_id)
    .bind(&subscription.variant_duration)
    .bind(subscription.variant_duration_value)
    .bind(&subscription.variant_duration_unit)
    .bind(&subscription.variant_price)
    .bind(&subscription.original_price)
    .bind(&subscription.discount_applied)
    .bind(&subscription.amount_paid)
    .bind(subscription.start_date)
    .bind(subscription.end_date)
    .bind(subscription.original_start_date)
    .bind(subscription.status.as_str())
    .bind("completed")
    .bind(subscription.is_renewal)
    .bind(subscription.renewed_from)
    .bind(subscription.contiguous_chain_id)
    .bind(true)
    .bind(subscription.replaced_subscription)
    .bind(&subscription.payment_id)
    .bind(&subscription.transaction_id)
    .bind(sqlx::types::Json(&subscription.metadata))
    .execute(tx.as_mut())
    .await?;

    Ok(subscription_id)
}

pub async fn get_subscription_detail(
    pool: &PgPool,
    subscription_id: Uuid,
) -> Result<Option<SubscriptionDetail>, AppError> {
    let row = sqlx::query(&detail_query("s.id = $1"))
        .bind(subscription_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::db_error)?;

    Ok(row.map(|row| map_subscription_detail(&row)))
}

pub async fn get_user_subscriptions(
    pool: &PgPool,
    user_id: Uuid,
    limit: i32,
    offset: i32,
) -> Result<Vec<SubscriptionDetail>, AppError> {
    let rows = sqlx::query(&format!(
        "{} ORDER BY s.created_at DESC LIMIT $2 OFFSET $3",
        detail_query("s.user_id = $1")
    ))
    .bind(user_id)
    .bind(i64::from(limit))
    .bind(i64::from(offset))
    .fetch_all(pool)
    .await
    .map_err(AppError::db_error)?;

    Ok(rows.iter().map(map_subscription_detail).collect())
}

pub async fn count_user_subscriptions(pool: &PgPool, user_id: Uuid) -> Result<i64, AppError> {
    let total: i64 =
        sqlx::query_scalar("SELECT Count(*) FROM subscriptions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .map_err(AppError::db_error)?;

    Ok(total)
}

/// The subscription that currently backs the user's entitlement, if any:
/// latest per product, still inside coverage, soonest expiry first.
pub async fn get_latest_active_subscription(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<SubscriptionDetail>, AppError> {
    let row = sqlx::query(&format!(
        "{} AND s.is_latest = true AND s.status IN ('active', 'expiresoon') AND s.end_date > now() \
         ORDER BY s.end_date ASC LIMIT 1",
        detail_query("s.user_id = $1")
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::db_error)?;

    Ok(row.map(|row| map_subscription_detail(&row)))
}

fn detail_query(predicate: &str) -> String {
    format!(
        r#"
        SELECT
            s.id, s.user_id, s.product_id,
            s.variant_duration, s.variant_duration_value, s.variant_duration_unit, s.variant_price,
            s.original_price, s.discount_applied, s.amount_paid,
            s.start_date, s.end_date, s.original_start_date,
            s.status, s.payment_status,
            s.is_renewal, s.renewed_from, s.contiguous_chain_id, s.is_latest, s.replaced_subscription,
            s.payment_id, s.transaction_id, s.metadata,
            s.created_at, s.updated_at,
            p.name AS product_name
        FROM subscriptions s
        JOIN products p ON p.id = s.product_id
        WHERE {}
        "#,
        predicate
    )
}

fn map_subscription_detail(row: &PgRow) -> SubscriptionDetail {
    let status_raw: String = row.get("status");
    let status = SubscriptionStatus::parse(&status_raw).unwrap_or(SubscriptionStatus::Expired);

    let metadata: serde_json::Value = row.get("metadata");
    let metadata: SubscriptionMetadata =
        serde_json::from_value(metadata).unwrap_or(SubscriptionMetadata {
            payment_method: None,
            promo_code: None,
            discount_amount: None,
            renewal_type: RenewalType::Fresh,
            gap_in_days: None,
            initial_status: status,
            should_notify: false,
        });

    SubscriptionDetail {
        subscription: Subscription {
            id: row.get("id"),
            user_id: row.get("user_id"),
            product_id: row.get("product_id"),
            variant_duration: row.get("variant_duration"),
            variant_duration_value: row.get("variant_duration_value"),
            variant_duration_unit: row.get("variant_duration_unit"),
            variant_price: row.get("variant_price"),
            original_price: row.get("original_price"),
            discount_applied: row.get("discount_applied"),
            amount_paid: row.get("amount_paid"),
            start_date: row.get("start_date"),
            end_date: row.get("end_date"),
            original_start_date: row.get("original_start_date"),
            status,
            payment_status: row.get("payment_status"),
            is_renewal: row.get("is_renewal"),
            renewed_from: row.get("renewed_from"),
            contiguous_chain_id: row.get("contiguous_chain_id"),
            is_latest: row.get("is_latest"),
            replaced_subscription: row.get("replaced_subscription"),
            payment_id: row.get("payment_id"),
            transaction_id: row.get("transaction_id"),
            metadata,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        },
        product_name: row.get("product_name"),
    }
}
