use sqlx::PgPool;
use uuid::Uuid;

use crate::core::AppError;
use crate::models::subscriptions::SubscriptionDetail;

/// "Your subscription is live" notification for a freshly activated
/// subscription.
pub async fn create_new_subscription_notification(
    pool: &PgPool,
    detail: &SubscriptionDetail,
) -> Result<Uuid, AppError> {
    let title = format!("{} subscription activated", detail.product_name);
    let message = format!(
        "Your {} subscription ({}) is now active until {}.",
        detail.product_name,
        detail.subscription.variant_duration,
        detail.subscription.end_date.format("%d %b %Y"),
    );

    insert_notification(
        pool,
        detail.subscription.user_id,
        detail.subscription.id,
        "subscription_activated",
        &title,
        &message,
    )
    .await
}

/// Status-transition notification, e.g. a subscription that is already
/// inside the expiry window at purchase time.
pub async fn create_status_change_notification(
    pool: &PgPool,
    detail: &SubscriptionDetail,
    from_status: &str,
    to_status: &str,
    trigger: &str,
) -> Result<Uuid, AppError> {
    let title = format!("{} subscription expiring soon", detail.product_name);
    let message = format!(
        "Your {} subscription moved from {} to {} ({}) and ends on {}. Renew to keep uninterrupted access.",
        detail.product_name,
        from_status,
        to_status,
        trigger,
        detail.subscription.end_date.format("%d %b %Y"),
    );

    insert_notification(
        pool,
        detail.subscription.user_id,
        detail.subscription.id,
        "subscription_expiring",
        &title,
        &message,
    )
    .await
}

async fn insert_notification(
    pool: &PgPool,
    user_id: Uuid,
    subscription_id: Uuid,
    notification_type: &str,
    title: &str,
    message: &str,
) -> Result<Uuid, AppError> {
    let notification_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO notifications (id, user_id, subscription_id, notification_type, title, message)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(notification_id)
    .bind(user_id)
    .bind(subscription_id)
    .bind(notification_type)
    .bind(title)
    .bind(message)
    .execute(pool)
    .await
    .map_err(AppError::db_error)?;

    Ok(notification_id)
}
