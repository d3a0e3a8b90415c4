use crate::core::jwt_auth::AuthenticatedUser;
use crate::core::AppError;
use crate::core::AppSuccessResponse;
use crate::db::subscriptions;
use crate::models::pagination::{PaginationMeta, PaginationQuery};
use crate::models::subscriptions::SubscriptionStatusSummary;

use actix_web::{get, web, HttpResponse, Result};
use chrono::Utc;
use sqlx::PgPool;

#[tracing::instrument(name = "Get My Subscriptions", skip(pool, user, query))]
#[get("/my-subscriptions")]
pub async fn get_my_subscriptions(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    query: web::Query<PaginationQuery>,
) -> Result<HttpResponse, AppError> {
    let mut pagination = query.into_inner();
    pagination.validate();

    let subscriptions = subscriptions::get_user_subscriptions(
        &pool,
        user.user_id,
        pagination.per_page,
        pagination.offset(),
    )
    .await?;
    let total = subscriptions::count_user_subscriptions(&pool, user.user_id).await?;

    Ok(HttpResponse::Ok().json(AppSuccessResponse {
        success: true,
        data: subscriptions,
        message: "User subscriptions retrieved successfully".to_string(),
        pagination: Some(PaginationMeta::new(
            pagination.page,
            pagination.per_page,
            total,
        )),
    }))
}

#[tracing::instrument(name = "Get Subscription Status", skip(pool, user))]
#[get("/status")]
pub async fn get_subscription_status(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let current_subscription =
        subscriptions::get_latest_active_subscription(&pool, user.user_id).await?;

    let (has_active_subscription, subscription_expires_at, days_remaining) =
        if let Some(ref detail) = current_subscription {
            let expires_at = detail.subscription.end_date;
            let days_remaining = (expires_at - Utc::now()).num_days();
            (true, Some(expires_at), Some(days_remaining))
        } else {
            (false, None, None)
        };

    let status = SubscriptionStatusSummary {
        has_active_subscription,
        current_subscription,
        subscription_expires_at,
        days_remaining,
    };

    Ok(HttpResponse::Ok().json(AppSuccessResponse {
        success: true,
        data: status,
        message: "Subscription status retrieved successfully".to_string(),
        pagination: None,
    }))
}
