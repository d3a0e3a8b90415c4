use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{error, info};

/// Background job that walks subscriptions past their coverage window:
/// `active` moves to `expiresoon` inside the warning window and anything
/// past its end date moves to `expired`.
pub fn start_subscription_expiry_checker(pool: PgPool, expire_soon_days: i64) {
    info!("Starting subscription expiry checker background job");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600)); // Run every hour

        loop {
            interval.tick().await;

            if let Err(e) = check_and_expire_subscriptions(&pool, expire_soon_days).await {
                error!("Failed to check expired subscriptions: {}", e);
            }
        }
    });
}

async fn check_and_expire_subscriptions(
    pool: &PgPool,
    expire_soon_days: i64,
) -> Result<(), sqlx::Error> {
    let now = Utc::now();

    let expired = sqlx::query(
        r#"
        UPDATE subscriptions
        SET status = 'expired', updated_at = now()
        WHERE status IN ('active', 'expiresoon')
        AND end_date < $1
        "#,
    )
    .bind(now)
    .execute(pool)
    .await?;

    let soon_cutoff = now + ChronoDuration::days(expire_soon_days);
    let expiring_soon = sqlx::query(
        r#"
        UPDATE subscriptions
        SET status = 'expiresoon', updated_at = now()
        WHERE status = 'active'
        AND end_date >= $1
        AND end_date < $2
        "#,
    )
    .bind(now)
    .bind(soon_cutoff)
    .execute(pool)
    .await?;

    if expired.rows_affected() > 0 {
        info!("Expired {} subscription(s)", expired.rows_affected());
    }
    if expiring_soon.rows_affected() > 0 {
        info!(
            "Marked {} subscription(s) as expiring soon",
            expiring_soon.rows_affected()
        );
    }

    Ok(())
}
