use crate::core::{AppError, AppSuccessResponse, RedisHelper};
use crate::db::products;
use crate::models::products::ProductCatalogEntry;

use actix_web::{get, web, HttpResponse, Result};
use sqlx::PgPool;
use std::time::Duration;

const CATALOG_CACHE_KEY: &str = "catalog:active_products";
const CATALOG_CACHE_TTL: Duration = Duration::from_secs(300);

#[tracing::instrument(name = "Get Product Catalog", skip(pool, redis_helper))]
#[get("")]
pub async fn get_products(
    pool: web::Data<PgPool>,
    redis_helper: web::Data<RedisHelper>,
) -> Result<HttpResponse, AppError> {
    if let Ok(cached) = redis_helper
        .get::<Vec<ProductCatalogEntry>>(CATALOG_CACHE_KEY)
        .await
    {
        return Ok(HttpResponse::Ok().json(AppSuccessResponse {
            success: true,
            data: cached,
            message: "Products retrieved successfully".to_string(),
            pagination: None,
        }));
    }

    let catalog = products::get_active_products_with_variants(&pool).await?;

    if let Err(e) = redis_helper
        .set(CATALOG_CACHE_KEY, &catalog, Some(CATALOG_CACHE_TTL))
        .await
    {
        tracing::warn!("failed to cache the product catalog: {}", e);
    }

    Ok(HttpResponse::Ok().json(AppSuccessResponse {
        success: true,
        data: catalog,
        message: "Products retrieved successfully".to_string(),
        pagination: None,
    }))
}
