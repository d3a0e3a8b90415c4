use chrono::{DateTime, Duration, Months, TimeZone, Utc};
use uuid::Uuid;

use crate::core::AppError;
use crate::models::products::DurationUnit;
use crate::models::subscriptions::{RenewalType, SubscriptionStatus};

/// The slice of a prior subscription the resolver needs: where its coverage
/// ends, where its chain began, and the chain it belongs to.
#[derive(Debug, Clone)]
pub struct PriorCoverage {
    pub subscription_id: Uuid,
    pub end_date: DateTime<Utc>,
    pub original_start_date: DateTime<Utc>,
    pub contiguous_chain_id: Uuid,
}

/// How the new purchase relates to what the user already holds for this
/// product. `coverage_start` feeds the end-date math; the stored start date
/// is always the purchase instant, regardless.
#[derive(Debug, Clone)]
pub struct RenewalResolution {
    pub is_renewal: bool,
    pub renewal_type: RenewalType,
    pub renewed_from: Option<Uuid>,
    pub contiguous_chain_id: Uuid,
    pub original_start_date: DateTime<Utc>,
    pub coverage_start: DateTime<Utc>,
    pub gap_in_days: Option<i64>,
}

/// Decide contiguity for one (user, product) purchase.
///
/// `contiguous` is the oracle's answer (latest subscription ending within the
/// grace window); `unexpired` is the independent fallback (an
/// active/expiresoon subscription whose end date is still ahead), consulted
/// when the oracle comes back empty or was unavailable. Either way, a prior
/// record extends its own chain; no prior record starts a fresh one.
pub fn resolve_renewal(
    contiguous: Option<PriorCoverage>,
    unexpired: Option<PriorCoverage>,
    now: DateTime<Utc>,
) -> RenewalResolution {
    let prior = contiguous.or(unexpired);

    match prior {
        Some(prior) => {
            // extend from whichever is later, so early renewals lose nothing
            let coverage_start = if prior.end_date > now {
                prior.end_date
            } else {
                now
            };
            RenewalResolution {
                is_renewal: true,
                renewal_type: RenewalType::Contiguous,
                renewed_from: Some(prior.subscription_id),
                contiguous_chain_id: prior.contiguous_chain_id,
                original_start_date: prior.original_start_date,
                coverage_start,
                gap_in_days: Some((now - prior.end_date).num_days()),
            }
        }
        None => fresh_chain(now),
    }
}

/// A brand-new chain: coverage starts now, with a freshly generated chain id.
/// Also the degraded path when the contiguity lookups fail outright.
pub fn fresh_chain(now: DateTime<Utc>) -> RenewalResolution {
    RenewalResolution {
        is_renewal: false,
        renewal_type: RenewalType::Fresh,
        renewed_from: None,
        contiguous_chain_id: Uuid::new_v4(),
        original_start_date: now,
        coverage_start: now,
        gap_in_days: None,
    }
}

/// Advance `start` by the variant duration. Months and years use calendar
/// arithmetic (Jan 31 + 1 month lands on Feb 28/29, not Mar 3). An unknown
/// unit advances by exactly one calendar month.
pub fn advance_coverage(
    start: DateTime<Utc>,
    value: i32,
    unit: Option<DurationUnit>,
) -> DateTime<Utc> {
    let value = i64::from(value.max(0));
    match unit {
        Some(DurationUnit::Minutes) => start + Duration::minutes(value),
        Some(DurationUnit::Hours) => start + Duration::hours(value),
        Some(DurationUnit::Days) => start + Duration::days(value),
        Some(DurationUnit::Weeks) => start + Duration::weeks(value),
        Some(DurationUnit::Months) => add_calendar_months(start, value as u32),
        Some(DurationUnit::Years) => add_calendar_months(start, value as u32 * 12),
        None => add_calendar_months(start, 1),
    }
}

fn add_calendar_months(start: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    match start.naive_utc().checked_add_months(Months::new(months)) {
        Some(advanced) => Utc.from_utc_datetime(&advanced),
        // unreachable for any date a payment gateway will hand us
        None => start + Duration::days(30 * i64::from(months)),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StatusDecision {
    pub status: SubscriptionStatus,
    pub should_notify: bool,
}

/// Classification of a freshly computed coverage interval. Kept behind a
/// trait so the writer consults it as a fallible collaborator.
pub trait StatusClassifier {
    fn classify(
        &self,
        end_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<StatusDecision, AppError>;
}

/// Window-based classifier: anything ending inside `expire_soon_days` of now
/// is already `expiresoon` at creation.
pub struct WindowStatusClassifier {
    pub expire_soon_days: i64,
}

impl StatusClassifier for WindowStatusClassifier {
    fn classify(
        &self,
        end_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<StatusDecision, AppError> {
        if end_date <= now {
            // a degenerate interval; nothing worth announcing
            return Ok(StatusDecision {
                status: SubscriptionStatus::ExpireSoon,
                should_notify: false,
            });
        }

        if end_date - now <= Duration::days(self.expire_soon_days) {
            Ok(StatusDecision {
                status: SubscriptionStatus::ExpireSoon,
                should_notify: true,
            })
        } else {
            Ok(StatusDecision {
                status: SubscriptionStatus::Active,
                should_notify: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::assert_ok;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .expect("bad test timestamp")
            .with_timezone(&Utc)
    }

    fn prior(end: &str, original_start: &str) -> PriorCoverage {
        PriorCoverage {
            subscription_id: Uuid::new_v4(),
            end_date: at(end),
            original_start_date: at(original_start),
            contiguous_chain_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn a_first_purchase_starts_a_fresh_chain() {
        let now = at("2024-01-15T00:00:00Z");
        let resolution = resolve_renewal(None, None, now);

        assert!(!resolution.is_renewal);
        assert_eq!(resolution.renewal_type, RenewalType::Fresh);
        assert_eq!(resolution.coverage_start, now);
        assert_eq!(resolution.original_start_date, now);
        assert!(resolution.renewed_from.is_none());
        assert!(resolution.gap_in_days.is_none());
    }

    #[test]
    fn fresh_chains_get_distinct_chain_ids() {
        let now = at("2024-01-15T00:00:00Z");
        let first = fresh_chain(now);
        let second = fresh_chain(now);
        assert_ne!(first.contiguous_chain_id, second.contiguous_chain_id);
    }

    #[test]
    fn an_early_renewal_extends_from_the_prior_end_date() {
        // first month ran 2024-01-15 → 2024-02-15,
        // the user renews five days early on 2024-02-10
        let now = at("2024-02-10T00:00:00Z");
        let prior = prior("2024-02-15T00:00:00Z", "2024-01-15T00:00:00Z");
        let chain = prior.contiguous_chain_id;
        let prior_id = prior.subscription_id;

        let resolution = resolve_renewal(Some(prior), None, now);

        assert!(resolution.is_renewal);
        assert_eq!(resolution.renewal_type, RenewalType::Contiguous);
        assert_eq!(resolution.coverage_start, at("2024-02-15T00:00:00Z"));
        assert_eq!(resolution.original_start_date, at("2024-01-15T00:00:00Z"));
        assert_eq!(resolution.contiguous_chain_id, chain);
        assert_eq!(resolution.renewed_from, Some(prior_id));
        assert_eq!(resolution.gap_in_days, Some(-5));

        let end = advance_coverage(resolution.coverage_start, 1, Some(DurationUnit::Months));
        assert_eq!(end, at("2024-03-15T00:00:00Z"));
    }

    #[test]
    fn a_late_renewal_within_grace_keeps_the_chain_but_starts_now() {
        let now = at("2024-02-17T00:00:00Z");
        let prior = prior("2024-02-15T00:00:00Z", "2024-01-15T00:00:00Z");
        let chain = prior.contiguous_chain_id;

        let resolution = resolve_renewal(Some(prior), None, now);

        assert!(resolution.is_renewal);
        assert_eq!(resolution.contiguous_chain_id, chain);
        // expired two days ago; coverage restarts from the purchase instant
        assert_eq!(resolution.coverage_start, now);
        assert_eq!(resolution.gap_in_days, Some(2));
    }

    #[test]
    fn the_unexpired_fallback_still_protects_paid_time() {
        // oracle came back empty (or errored); the fallback row still wins
        let now = at("2024-02-10T00:00:00Z");
        let fallback = prior("2024-02-15T00:00:00Z", "2024-01-15T00:00:00Z");
        let chain = fallback.contiguous_chain_id;

        let resolution = resolve_renewal(None, Some(fallback), now);

        assert!(resolution.is_renewal);
        assert_eq!(resolution.coverage_start, at("2024-02-15T00:00:00Z"));
        assert_eq!(resolution.contiguous_chain_id, chain);
    }

    #[test]
    fn the_oracle_result_takes_precedence_over_the_fallback() {
        let now = at("2024-02-10T00:00:00Z");
        let oracle = prior("2024-02-15T00:00:00Z", "2024-01-15T00:00:00Z");
        let oracle_chain = oracle.contiguous_chain_id;
        let fallback = prior("2024-02-12T00:00:00Z", "2024-01-12T00:00:00Z");

        let resolution = resolve_renewal(Some(oracle), Some(fallback), now);
        assert_eq!(resolution.contiguous_chain_id, oracle_chain);
    }

    #[test]
    fn one_month_from_mid_month_is_the_same_day_next_month() {
        // a first purchase: one month from the purchase instant
        let start = at("2024-01-15T00:00:00Z");
        let end = advance_coverage(start, 1, Some(DurationUnit::Months));
        assert_eq!(end, at("2024-02-15T00:00:00Z"));
    }

    #[test]
    fn month_arithmetic_clamps_to_the_end_of_shorter_months() {
        let end = advance_coverage(at("2024-01-31T10:30:00Z"), 1, Some(DurationUnit::Months));
        assert_eq!(end, at("2024-02-29T10:30:00Z")); // 2024 is a leap year

        let end = advance_coverage(at("2023-01-31T10:30:00Z"), 1, Some(DurationUnit::Months));
        assert_eq!(end, at("2023-02-28T10:30:00Z"));
    }

    #[test]
    fn year_arithmetic_is_calendar_aware() {
        let end = advance_coverage(at("2024-02-29T00:00:00Z"), 1, Some(DurationUnit::Years));
        assert_eq!(end, at("2025-02-28T00:00:00Z"));
    }

    #[test]
    fn fixed_width_units_advance_exactly() {
        let start = at("2024-01-15T00:00:00Z");
        assert_eq!(
            advance_coverage(start, 45, Some(DurationUnit::Minutes)),
            at("2024-01-15T00:45:00Z")
        );
        assert_eq!(
            advance_coverage(start, 6, Some(DurationUnit::Hours)),
            at("2024-01-15T06:00:00Z")
        );
        assert_eq!(
            advance_coverage(start, 10, Some(DurationUnit::Days)),
            at("2024-01-25T00:00:00Z")
        );
        assert_eq!(
            advance_coverage(start, 2, Some(DurationUnit::Weeks)),
            at("2024-01-29T00:00:00Z")
        );
    }

    #[test]
    fn an_unknown_unit_defaults_to_one_calendar_month() {
        let start = at("2024-01-31T00:00:00Z");
        assert_eq!(advance_coverage(start, 7, None), at("2024-02-29T00:00:00Z"));
    }

    #[test]
    fn the_classifier_window_separates_active_from_expiresoon() {
        let classifier = WindowStatusClassifier {
            expire_soon_days: 7,
        };
        let now = at("2024-01-15T00:00:00Z");

        let decision = assert_ok!(classifier.classify(at("2024-02-15T00:00:00Z"), now));
        assert_eq!(decision.status, SubscriptionStatus::Active);
        assert!(decision.should_notify);

        let decision = assert_ok!(classifier.classify(at("2024-01-20T00:00:00Z"), now));
        assert_eq!(decision.status, SubscriptionStatus::ExpireSoon);
        assert!(decision.should_notify);

        // degenerate: already over at creation
        let decision = assert_ok!(classifier.classify(at("2024-01-14T00:00:00Z"), now));
        assert_eq!(decision.status, SubscriptionStatus::ExpireSoon);
        assert!(!decision.should_notify);
    }
}
