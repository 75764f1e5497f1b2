use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tokio::time::{Duration, sleep};
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::expansion::{DispatchTime, SkippedSubscription, expand};
use crate::error::AppError;
use crate::state::AppState;
use crate::storage::CreateOutcome;

#[derive(Debug, Clone, Serialize)]
pub struct ExpansionReport {
    pub target_date: NaiveDate,
    pub weekday: &'static str,
    pub created: Vec<Uuid>,
    pub duplicates: usize,
    pub failed: usize,
    pub skipped: Vec<SkippedSubscription>,
    pub ran_at: DateTime<Utc>,
}

/// Expands active subscriptions for `target_date` and stores the resulting
/// deliveries. Safe to repeat: deliveries that already exist are counted as
/// duplicates rather than created again.
pub fn run_expansion(
    state: &AppState,
    target_date: NaiveDate,
) -> Result<ExpansionReport, AppError> {
    let zone = state.config.time_zone()?;
    let dispatch = DispatchTime::new(state.config.dispatch_hour, zone).ok_or_else(|| {
        AppError::Internal(format!("invalid dispatch hour {}", state.config.dispatch_hour))
    })?;

    let subscriptions = state.storage.active_subscriptions();
    let expansion = expand(&subscriptions, target_date, &dispatch);
    let now = state.clock.now();

    let mut created = Vec::new();
    let mut duplicates = 0;
    let mut failed = 0;

    for request in &expansion.requests {
        match state.storage.create_delivery(request, now) {
            Ok(CreateOutcome::Created(delivery)) => {
                info!(
                    subscription_id = %request.subscription_id,
                    delivery_id = %delivery.id,
                    %target_date,
                    "delivery created"
                );
                created.push(delivery.id);
            }
            Ok(CreateOutcome::Duplicate(existing)) => {
                duplicates += 1;
                info!(
                    subscription_id = %request.subscription_id,
                    delivery_id = %existing,
                    "delivery already exists"
                );
            }
            Err(err) => {
                failed += 1;
                error!(
                    subscription_id = %request.subscription_id,
                    error = %err,
                    "failed to store delivery"
                );
            }
        }
    }

    let metrics = &state.metrics;
    metrics
        .deliveries_created_total
        .with_label_values(&["created"])
        .inc_by(created.len() as u64);
    metrics
        .deliveries_created_total
        .with_label_values(&["duplicate"])
        .inc_by(duplicates as u64);
    metrics
        .subscriptions_skipped_total
        .inc_by(expansion.skipped.len() as u64);
    metrics.expansion_runs_total.inc();

    let report = ExpansionReport {
        target_date,
        weekday: expansion.weekday,
        created,
        duplicates,
        failed,
        skipped: expansion.skipped,
        ran_at: now,
    };

    info!(
        %target_date,
        weekday = report.weekday,
        created = report.created.len(),
        duplicates = report.duplicates,
        skipped = report.skipped.len(),
        "expansion completed"
    );

    state.storage.expansion_runs.insert(target_date, report.clone());
    Ok(report)
}

/// Date the daily job expands for: today plus the configured lead.
pub fn next_target_date(state: &AppState) -> Result<NaiveDate, AppError> {
    let zone = state.config.time_zone()?;
    let today = state.clock.today(zone);
    Ok(today + ChronoDuration::days(i64::from(state.config.expansion_lead_days)))
}

/// Date to catch up on at startup, or `None` when the coming date already
/// has a run in the ledger.
pub fn startup_target(state: &AppState) -> Result<Option<NaiveDate>, AppError> {
    let target = next_target_date(state)?;
    if state.storage.expansion_runs.contains_key(&target) {
        return Ok(None);
    }
    Ok(Some(target))
}

/// Time left until the next `hour:00` in `zone`, strictly after `now`.
pub fn until_next_run(now: DateTime<Utc>, zone: FixedOffset, hour: u32) -> Duration {
    let local = now.with_timezone(&zone).naive_local();
    let Some(at) = NaiveTime::from_hms_opt(hour, 0, 0) else {
        return Duration::from_secs(24 * 60 * 60);
    };

    let mut next = local.date().and_time(at);
    if next <= local {
        next += ChronoDuration::days(1);
    }

    (next - local).to_std().unwrap_or(Duration::ZERO)
}

/// Daily expansion job. Catches up at startup when the coming date has not
/// been expanded in this process, then runs every day at the configured hour.
pub async fn run_expansion_scheduler(state: Arc<AppState>) {
    info!(hour = state.config.expansion_hour, "expansion scheduler started");

    match startup_target(&state) {
        Ok(Some(target)) => {
            if let Err(err) = run_expansion(&state, target) {
                error!(error = %err, "startup expansion failed");
            }
        }
        Ok(None) => info!("coming date already expanded; skipping startup run"),
        Err(err) => error!(error = %err, "cannot resolve expansion date"),
    }

    loop {
        let zone = match state.config.time_zone() {
            Ok(zone) => zone,
            Err(err) => {
                error!(error = %err, "expansion scheduler stopped");
                return;
            }
        };

        sleep(until_next_run(state.clock.now(), zone, state.config.expansion_hour)).await;

        let result = next_target_date(&state).and_then(|target| run_expansion(&state, target));
        if let Err(err) = result {
            error!(error = %err, "scheduled expansion failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};
    use tokio::time::Duration;
    use uuid::Uuid;

    use super::{next_target_date, run_expansion, startup_target, until_next_run};
    use crate::clock::FixedClock;
    use crate::config::Config;
    use crate::models::subscription::{Subscription, SubscriptionStatus};
    use crate::state::AppState;

    fn state_at(y: i32, m: u32, d: u32, h: u32) -> AppState {
        let config = Config {
            utc_offset_minutes: 0,
            ..Config::default()
        };
        let clock = FixedClock::new(Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap());
        AppState::new(config, Arc::new(clock))
    }

    fn add_subscription(state: &AppState, days: &str) -> Uuid {
        let subscription = Subscription {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            address_id: Uuid::new_v4(),
            quantity: 1,
            days_of_week: days.to_string(),
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            status: SubscriptionStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let id = subscription.id;
        state.storage.subscriptions.insert(id, subscription);
        id
    }

    #[test]
    fn second_run_for_same_date_creates_nothing() {
        let state = state_at(2024, 1, 2, 23);
        add_subscription(&state, r#"["wed"]"#);
        add_subscription(&state, r#"["tue"]"#);
        add_subscription(&state, "not json");

        let target = next_target_date(&state).unwrap();
        assert_eq!(target, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());

        let first = run_expansion(&state, target).unwrap();
        assert_eq!(first.weekday, "wed");
        assert_eq!(first.created.len(), 1);
        assert_eq!(first.skipped.len(), 1);

        let second = run_expansion(&state, target).unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.duplicates, 1);
        assert_eq!(state.storage.deliveries_for_date(target).len(), 1);
        assert!(state.storage.expansion_runs.contains_key(&target));
    }

    #[test]
    fn startup_catches_up_when_ledger_lacks_the_date() {
        let state = state_at(2024, 1, 2, 23);
        add_subscription(&state, r#"["wed"]"#);

        // A run for some other date does not count.
        let yesterday = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        run_expansion(&state, yesterday).unwrap();

        assert_eq!(
            startup_target(&state).unwrap(),
            Some(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap())
        );
    }

    #[test]
    fn startup_skips_a_date_already_in_the_ledger() {
        let state = state_at(2024, 1, 2, 23);
        add_subscription(&state, r#"["wed"]"#);

        let target = next_target_date(&state).unwrap();
        run_expansion(&state, target).unwrap();

        assert_eq!(startup_target(&state).unwrap(), None);
        assert_eq!(state.storage.deliveries_for_date(target).len(), 1);
    }

    #[test]
    fn next_run_is_later_today_or_tomorrow() {
        let zone = FixedOffset::east_opt(0).unwrap();

        let morning = Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap();
        assert_eq!(
            until_next_run(morning, zone, 23),
            Duration::from_secs(15 * 60 * 60)
        );

        let on_the_hour = Utc.with_ymd_and_hms(2024, 1, 2, 23, 0, 0).unwrap();
        assert_eq!(
            until_next_run(on_the_hour, zone, 23),
            Duration::from_secs(24 * 60 * 60)
        );
    }

    #[test]
    fn next_run_respects_deployment_offset() {
        // 17:00 UTC is 22:30 at +05:30, half an hour before 23:00 local.
        let zone = FixedOffset::east_opt(330 * 60).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 17, 0, 0).unwrap();
        assert_eq!(until_next_run(now, zone, 23), Duration::from_secs(30 * 60));
    }
}
