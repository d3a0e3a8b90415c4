use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::core::AppError;
use crate::models::products::{Product, ProductCatalogEntry, ProductVariant, PromoCode};

pub async fn get_active_product(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(
        r#"
        SELECT id, name, description, is_active, created_at, updated_at
        FROM products
        WHERE id = $1 AND is_active = true
        "#,
    )
    .bind(product_id)
    .fetch_optional(tx.as_mut())
    .await
}

pub async fn get_active_variant(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
    duration: &str,
) -> Result<Option<ProductVariant>, sqlx::Error> {
    sqlx::query_as::<_, ProductVariant>(
        r#"
        SELECT id, product_id, duration, duration_value, duration_unit, price, is_active
        FROM product_variants
        WHERE product_id = $1 AND duration = $2 AND is_active = true
        "#,
    )
    .bind(product_id)
    .bind(duration)
    .fetch_optional(tx.as_mut())
    .await
}

pub async fn get_promo_for_product(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
    code: &str,
) -> Result<Option<PromoCode>, sqlx::Error> {
    sqlx::query_as::<_, PromoCode>(
        r#"
        SELECT id, product_id, code, discount_amount, used_count, is_active
        FROM promo_codes
        WHERE product_id = $1 AND code = $2 AND is_active = true
        "#,
    )
    .bind(product_id)
    .bind(code)
    .fetch_optional(tx.as_mut())
    .await
}

pub async fn increment_promo_usage(
    tx: &mut Transaction<'_, Postgres>,
    promo_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE promo_codes
        SET used_count = used_count + 1, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(promo_id)
    .execute(tx.as_mut())
    .await?;

    Ok(result.rows_affected())
}

pub async fn get_active_products_with_variants(
    pool: &PgPool,
) -> Result<Vec<ProductCatalogEntry>, AppError> {
    let products = sqlx::query_as::<_, Product>(
        r#"
        SELECT id, name, description, is_active, created_at, updated_at
        FROM products
        WHERE is_active = true
        ORDER BY name ASC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(AppError::db_error)?;

    let variants = sqlx::query_as::<_, ProductVariant>(
        r#"
        SELECT v.id, v.product_id, v.duration, v.duration_value, v.duration_unit, v.price, v.is_active
        FROM product_variants v
        JOIN products p ON p.id = v.product_id
        WHERE v.is_active = true AND p.is_active = true
        ORDER BY v.duration_value ASC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(AppError::db_error)?;

    let catalog = products
        .into_iter()
        .map(|product| {
            let product_variants = variants
                .iter()
                .filter(|v| v.product_id == product.id)
                .cloned()
                .collect();
            ProductCatalogEntry {
                id: product.id,
                name: product.name,
                description: product.description,
                variants: product_variants,
            }
        })
        .collect();

    Ok(catalog)
}
