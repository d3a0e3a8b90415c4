use std::collections::{HashMap, HashSet};

use actix_web::{post, web, HttpResponse};
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;
use validator::Validate;

use crate::core::invoice::{
    compute_order_totals, render_invoice_pdf, InvoiceCustomer, InvoiceDocument, InvoiceLine,
    OrderTotals,
};
use crate::core::jwt_auth::AuthenticatedUser;
use crate::core::razorpay::verify_payment_signature;
use crate::core::renewal::{
    advance_coverage, fresh_chain, resolve_renewal, RenewalResolution, StatusClassifier,
    WindowStatusClassifier,
};
use crate::core::{AppConfig, CheckoutError, CheckoutFailureResponse, EmailService};
use crate::db::payments::PaymentsTbl;
use crate::db::{notifications, products, subscriptions};
use crate::models::checkout::{
    CartItem, CreatedSubscriptionSummary, InvoiceEmailReport, OrderSummary, VerifyPaymentRequest,
    VerifyPaymentResponse,
};
use crate::models::products::DurationUnit;
use crate::models::subscriptions::{NewSubscription, SubscriptionMetadata, SubscriptionStatus};

/// Verify a Razorpay checkout and turn its cart into subscriptions.
///
/// The flow is: authenticate, verify the gateway signature, then one atomic
/// transaction for everything entitlement-related, then best-effort side
/// effects (invoice email, notifications) that can no longer change the
/// outcome of the purchase.
#[tracing::instrument(
    name = "Verify Subscription Payment",
    skip(pool, config, email_service, user, request),
    fields(user_id = %user.user_id)
)]
#[post("/verify")]
pub async fn verify_payment(
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    email_service: web::Data<EmailService>,
    user: AuthenticatedUser,
    request: web::Json<VerifyPaymentRequest>,
) -> Result<HttpResponse, CheckoutError> {
    let request = request.into_inner();
    request
        .validate()
        .map_err(|e| CheckoutError::InvalidRequestBody(e.to_string()))?;

    if config.razorpay.key_secret.expose_secret().trim().is_empty() {
        return Err(CheckoutError::MissingConfiguration("razorpay key secret"));
    }

    let gateway = &request.payment_response;
    if let Err(reason) = verify_payment_signature(
        &gateway.razorpay_order_id,
        &gateway.razorpay_payment_id,
        &gateway.razorpay_signature,
        &config.razorpay.key_secret,
    ) {
        tracing::warn!(
            order_id = %gateway.razorpay_order_id,
            "rejected payment with an invalid signature"
        );
        if let Err(e) = PaymentsTbl::log_failure(
            &pool,
            &gateway.razorpay_order_id,
            &reason.to_string(),
            &request.cart_items,
        )
        .await
        {
            tracing::error!(
                error = %e,
                order_id = %gateway.razorpay_order_id,
                "failed to record the signature failure on the payment"
            );
        }
        return Err(CheckoutError::InvalidSignature);
    }

    let now = Utc::now();
    let classifier = WindowStatusClassifier {
        expire_soon_days: config.billing.expire_soon_days,
    };

    let outcome =
        write_checkout_transaction(&pool, &config, &classifier, &user, &request, now).await?;

    // Post-commit side effects. Each one is caught and logged on its own;
    // from here on nothing changes the outcome of the purchase.
    let invoice_email = send_invoice_email(&email_service, &config, &user, &outcome, now).await;
    create_subscription_notifications(&pool, &outcome.created).await;

    if outcome.capture_update_failed {
        // The subscriptions are committed and the gateway already captured
        // the money; report the hiccup without failing the purchase.
        return Ok(HttpResponse::Ok().json(CheckoutFailureResponse {
            success: false,
            error: None,
            details: Some(
                "Your subscriptions are active; the payment record update is pending".to_string(),
            ),
            failed_item_index: None,
            timestamp: Utc::now(),
        }));
    }

    let created_subscription_ids: Vec<Uuid> = outcome
        .created
        .iter()
        .map(|summary| summary.subscription_id)
        .collect();

    Ok(HttpResponse::Ok().json(VerifyPaymentResponse {
        success: true,
        message: format!(
            "Payment verified and {} subscription(s) activated",
            outcome.created.len()
        ),
        payment_id: outcome.payment_id.clone(),
        order_id: outcome.order_id.clone(),
        created_subscription_ids,
        payment_record_id: outcome.payment_record_id,
        invoice_email,
        amount: outcome.totals.total.clone(),
        summary: OrderSummary {
            total_subscriptions: outcome.created.len(),
            total_amount: outcome.totals.total.clone(),
            tax_amount: outcome.totals.tax_amount.clone(),
            subtotal: outcome.totals.subtotal.clone(),
        },
        timestamp: Utc::now(),
    }))
}

struct CheckoutOutcome {
    payment_record_id: Uuid,
    order_id: String,
    payment_id: String,
    created: Vec<CreatedSubscriptionSummary>,
    totals: OrderTotals,
    promo_code: Option<String>,
    capture_update_failed: bool,
}

/// The atomic piece: demotions, promo credit, per-item subscription writes
/// and the payment capture all live or die with one transaction.
async fn write_checkout_transaction(
    pool: &PgPool,
    config: &AppConfig,
    classifier: &dyn StatusClassifier,
    user: &AuthenticatedUser,
    request: &VerifyPaymentRequest,
    now: DateTime<Utc>,
) -> Result<CheckoutOutcome, CheckoutError> {
    let order_id = request.payment_response.razorpay_order_id.clone();
    let payment_id = request.payment_response.razorpay_payment_id.clone();

    let mut tx = pool.begin().await?;

    // Demote whatever is currently latest for each purchased product,
    // remembering the demoted ids so the new records can point back at them.
    // If anything later in the transaction fails this is rolled back too.
    let mut replaced: HashMap<Uuid, Uuid> = HashMap::new();
    for product_id in distinct_in_cart_order(&request.cart_items) {
        if let Some(previous) =
            subscriptions::demote_latest_subscription(&mut tx, user.user_id, product_id).await?
        {
            replaced.insert(product_id, previous);
        }
    }

    if let Some(code) = request.promo_code.as_deref() {
        credit_promo_code(&mut tx, &request.cart_items, code).await?;
    }

    // The payment record captured at order creation is the pricing
    // authority; discounts are never recomputed here.
    let payment = PaymentsTbl::find_by_order_id(&mut tx, &order_id)
        .await?
        .ok_or_else(|| CheckoutError::PaymentRecordMissing {
            order_id: order_id.clone(),
        })?;

    let mut created: Vec<CreatedSubscriptionSummary> =
        Vec::with_capacity(request.cart_items.len());
    let mut subtotal = BigDecimal::zero();
    let mut discount_total = BigDecimal::zero();

    for (item_index, item) in request.cart_items.iter().enumerate() {
        let product = products::get_active_product(&mut tx, item.product_id)
            .await?
            .ok_or(CheckoutError::ProductUnavailable { item_index })?;
        let variant = products::get_active_variant(&mut tx, product.id, &item.duration)
            .await?
            .ok_or_else(|| CheckoutError::VariantUnavailable {
                item_index,
                duration: item.duration.clone(),
            })?;

        let resolution = resolve_item_renewal(
            &mut tx,
            user.user_id,
            product.id,
            now,
            config.billing.renewal_grace_days,
        )
        .await;

        let unit = DurationUnit::parse(&variant.duration_unit);
        if unit.is_none() {
            tracing::warn!(
                duration_unit = %variant.duration_unit,
                product = %product.name,
                "unknown variant duration unit, defaulting to one month"
            );
        }
        let end_date = advance_coverage(resolution.coverage_start, variant.duration_value, unit);

        let (original_price, amount_paid, discount_applied, item_promo) =
            match payment.snapshot_for(product.id) {
                Some(snapshot) => (
                    snapshot.original_price.clone(),
                    snapshot.discounted_price.clone(),
                    snapshot.discount_applied.clone(),
                    snapshot.promo_code.clone(),
                ),
                None => {
                    tracing::warn!(
                        order_id = %order_id,
                        product = %product.name,
                        "payment record carries no snapshot for this product, using the catalog price"
                    );
                    (
                        variant.price.clone(),
                        variant.price.clone(),
                        BigDecimal::zero(),
                        None,
                    )
                }
            };

        let decision = classifier
            .classify(end_date, now)
            .map_err(|e| CheckoutError::Internal(e.to_string()))?;

        let metadata = SubscriptionMetadata {
            payment_method: request.payment_response.method.clone(),
            promo_code: item_promo.or_else(|| request.promo_code.clone()),
            discount_amount: if discount_applied.is_zero() {
                None
            } else {
                Some(discount_applied.clone())
            },
            renewal_type: resolution.renewal_type,
            gap_in_days: resolution.gap_in_days,
            initial_status: decision.status,
            should_notify: decision.should_notify,
        };

        let new_subscription = NewSubscription {
            user_id: user.user_id,
            product_id: product.id,
            variant_duration: variant.duration.clone(),
            variant_duration_value: variant.duration_value,
            variant_duration_unit: variant.duration_unit.clone(),
            variant_price: variant.price.clone(),
            original_price: original_price.clone(),
            discount_applied: discount_applied.clone(),
            amount_paid: amount_paid.clone(),
            // users see "started today"; the paid-for time lives in end_date
            start_date: now,
            end_date,
            original_start_date: resolution.original_start_date,
            status: decision.status,
            is_renewal: resolution.is_renewal,
            renewed_from: resolution.renewed_from,
            contiguous_chain_id: resolution.contiguous_chain_id,
            replaced_subscription: replaced.get(&product.id).copied(),
            payment_id: payment_id.clone(),
            transaction_id: order_id.clone(),
            metadata,
        };

        let subscription_id =
            match subscriptions::insert_subscription(&mut tx, &new_subscription).await {
                Ok(id) => id,
                Err(e) if is_unique_violation(&e) => {
                    return Err(CheckoutError::DuplicateSubscription)
                }
                Err(e) => return Err(e.into()),
            };

        subtotal += &original_price;
        discount_total += &discount_applied;

        created.push(CreatedSubscriptionSummary {
            subscription_id,
            product_id: product.id,
            product_name: product.name.clone(),
            duration: variant.duration.clone(),
            original_price,
            discount_applied,
            amount_paid,
            start_date: now,
            end_date,
            status: decision.status,
            should_notify: decision.should_notify,
        });
    }

    if created.is_empty() {
        return Err(CheckoutError::NoSubscriptionsCreated);
    }

    let totals = compute_order_totals(subtotal, discount_total, config.billing.tax_rate_percent);

    let created_ids: Vec<Uuid> = created.iter().map(|c| c.subscription_id).collect();
    let mut capture_update_failed = false;
    if let Err(e) = PaymentsTbl::mark_captured(
        &mut tx,
        &order_id,
        &payment_id,
        request.payment_response.method.as_deref(),
        &created_ids,
        user.user_id,
    )
    .await
    {
        tracing::error!(
            error = %e,
            order_id = %order_id,
            "payment capture update failed after the subscriptions were written; committing anyway"
        );
        capture_update_failed = true;
    }

    tx.commit().await?;

    Ok(CheckoutOutcome {
        payment_record_id: payment.id,
        order_id,
        payment_id,
        created,
        totals,
        promo_code: request.promo_code.clone(),
        capture_update_failed,
    })
}

/// Cart product ids, deduplicated, first occurrence first. Both the latest
/// demotion and the promo credit walk the cart in this order.
fn distinct_in_cart_order(cart_items: &[CartItem]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    cart_items
        .iter()
        .map(|item| item.product_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Credit the promo usage counter once per order: the first cart product
/// whose catalog defines the code wins and the scan stops there, even if a
/// later product defines the same code string.
async fn credit_promo_code(
    tx: &mut Transaction<'_, Postgres>,
    cart_items: &[CartItem],
    code: &str,
) -> Result<(), CheckoutError> {
    for product_id in distinct_in_cart_order(cart_items) {
        if let Some(promo) = products::get_promo_for_product(tx, product_id, code).await? {
            products::increment_promo_usage(tx, promo.id).await?;
            tracing::info!(code, product_id = %product_id, "promo code usage credited");
            break;
        }
    }
    Ok(())
}

/// Run the contiguity oracle for one (user, product); a lookup failure
/// degrades to a fresh chain instead of failing the purchase.
async fn resolve_item_renewal(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    product_id: Uuid,
    now: DateTime<Utc>,
    grace_days: i64,
) -> RenewalResolution {
    let contiguous = match subscriptions::find_contiguous_candidate(
        tx, user_id, product_id, now, grace_days,
    )
    .await
    {
        Ok(candidate) => candidate,
        Err(e) => {
            tracing::warn!(
                error = %e,
                %product_id,
                "contiguity lookup failed; trying the unexpired fallback"
            );
            return degrade_to_fresh(tx, user_id, product_id, now).await;
        }
    };

    if contiguous.is_some() {
        return resolve_renewal(contiguous, None, now);
    }

    // The oracle found nothing inside the grace window. Independently, a
    // subscription that is still running must keep its paid-for time.
    let unexpired =
        match subscriptions::find_unexpired_subscription(tx, user_id, product_id, now).await {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::warn!(error = %e, %product_id, "unexpired lookup failed");
                None
            }
        };

    resolve_renewal(None, unexpired, now)
}

async fn degrade_to_fresh(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    product_id: Uuid,
    now: DateTime<Utc>,
) -> RenewalResolution {
    match subscriptions::find_unexpired_subscription(tx, user_id, product_id, now).await {
        Ok(candidate) => resolve_renewal(None, candidate, now),
        Err(e) => {
            tracing::warn!(
                error = %e,
                %product_id,
                "fallback lookup failed as well; issuing a fresh chain"
            );
            fresh_chain(now)
        }
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Assemble, render and send the invoice email. Every failure mode ends in a
/// report, never in an error: a purchase is not allowed to fail over its
/// paperwork.
async fn send_invoice_email(
    email_service: &EmailService,
    config: &AppConfig,
    user: &AuthenticatedUser,
    outcome: &CheckoutOutcome,
    now: DateTime<Utc>,
) -> InvoiceEmailReport {
    let invoice = InvoiceDocument {
        invoice_number: outcome.order_id.clone(),
        issued_at: now,
        customer: InvoiceCustomer {
            name: user.display_name(),
            email: user.email.clone(),
        },
        lines: outcome
            .created
            .iter()
            .map(|summary| InvoiceLine {
                description: summary.product_name.clone(),
                duration: summary.duration.clone(),
                original_price: summary.original_price.clone(),
                amount_paid: summary.amount_paid.clone(),
            })
            .collect(),
        totals: outcome.totals.clone(),
        promo_code: outcome.promo_code.clone(),
    };

    let pdf_bytes = match render_invoice_pdf(&invoice, config.billing.invoice_logo_path.as_deref())
    {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(
                error = %e,
                order_id = %outcome.order_id,
                "invoice pdf rendering failed; the email is skipped"
            );
            return InvoiceEmailReport {
                sent: false,
                attempted: true,
                error: Some(e.to_string()),
                to: user.email.clone(),
                timestamp: Utc::now(),
            };
        }
    };

    match email_service
        .send_subscription_invoice(&user.email, &invoice, pdf_bytes)
        .await
    {
        Ok(()) => InvoiceEmailReport {
            sent: true,
            attempted: true,
            error: None,
            to: user.email.clone(),
            timestamp: Utc::now(),
        },
        Err(e) => {
            tracing::error!(
                error = %e,
                order_id = %outcome.order_id,
                "invoice email could not be sent"
            );
            InvoiceEmailReport {
                sent: false,
                attempted: true,
                error: Some(e.message()),
                to: user.email.clone(),
                timestamp: Utc::now(),
            }
        }
    }
}

/// One notification per created subscription that asked for one. Each
/// creation is isolated; a failure is logged and the loop moves on.
async fn create_subscription_notifications(
    pool: &PgPool,
    created: &[CreatedSubscriptionSummary],
) {
    for summary in created {
        if !summary.should_notify {
            continue;
        }

        let detail = match subscriptions::get_subscription_detail(pool, summary.subscription_id)
            .await
        {
            Ok(Some(detail)) => detail,
            Ok(None) => {
                tracing::warn!(
                    subscription_id = %summary.subscription_id,
                    "created subscription was not found when building its notification"
                );
                continue;
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    subscription_id = %summary.subscription_id,
                    "could not load the subscription for its notification"
                );
                continue;
            }
        };

        let result = match detail.subscription.status {
            SubscriptionStatus::ExpireSoon => {
                notifications::create_status_change_notification(
                    pool,
                    &detail,
                    "active",
                    "expiresoon",
                    "purchase",
                )
                .await
            }
            _ => notifications::create_new_subscription_notification(pool, &detail).await,
        };

        if let Err(e) = result {
            tracing::error!(
                error = %e,
                subscription_id = %summary.subscription_id,
                "notification creation failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cart(ids: &[Uuid]) -> Vec<CartItem> {
        ids.iter()
            .map(|id| CartItem {
                product_id: *id,
                duration: "1 Month".to_string(),
            })
            .collect()
    }

    #[test]
    fn distinct_products_keep_first_occurrence_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        let items = cart(&[a, b, a, c, b]);
        assert_eq!(distinct_in_cart_order(&items), vec![a, b, c]);
    }

    #[test]
    fn a_single_item_cart_yields_one_product() {
        let a = Uuid::new_v4();
        let items = cart(&[a]);
        assert_eq!(distinct_in_cart_order(&items), vec![a]);
    }
}
