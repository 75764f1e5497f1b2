//! Recurring subscription expansion.
//!
//! Turns the weekday rules of active subscriptions into concrete delivery
//! requests for one calendar date. Pure: the caller supplies the
//! subscriptions, the date and the dispatch time, and persists the result.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::delivery::DeliveryRequest;
use crate::models::status::DeliveryStatus;
use crate::models::subscription::{Subscription, SubscriptionStatus};

const DAY_TOKENS: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExpansionError {
    #[error("malformed recurrence rule: {0}")]
    MalformedRecurrenceRule(String),
}

/// Lowercase three-letter token for the calendar day of `date`.
pub fn weekday_token(date: NaiveDate) -> &'static str {
    DAY_TOKENS[date.weekday().num_days_from_sunday() as usize]
}

/// Set of weekdays, one bit per day counted from Sunday.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_sunday();
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_sunday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }
}

fn day_from_name(name: &str) -> Option<Weekday> {
    let day = match name.trim().to_ascii_lowercase().as_str() {
        "sun" | "sunday" => Weekday::Sun,
        "mon" | "monday" => Weekday::Mon,
        "tue" | "tuesday" => Weekday::Tue,
        "wed" | "wednesday" => Weekday::Wed,
        "thu" | "thursday" => Weekday::Thu,
        "fri" | "friday" => Weekday::Fri,
        "sat" | "saturday" => Weekday::Sat,
        _ => return None,
    };
    Some(day)
}

/// Parses a persisted weekday set: a JSON array of day names, either
/// three-letter tokens or full names, in any case.
pub fn parse_days_of_week(raw: &str) -> Result<WeekdaySet, ExpansionError> {
    let names: Vec<String> = serde_json::from_str(raw).map_err(|err| {
        ExpansionError::MalformedRecurrenceRule(format!("not a JSON array of day names: {err}"))
    })?;

    let mut days = WeekdaySet::default();
    for name in &names {
        let day = day_from_name(name).ok_or_else(|| {
            ExpansionError::MalformedRecurrenceRule(format!("unknown day name {name:?}"))
        })?;
        days.insert(day);
    }

    if days.is_empty() {
        return Err(ExpansionError::MalformedRecurrenceRule(
            "weekday set is empty".to_string(),
        ));
    }

    Ok(days)
}

/// Local time of day at which generated deliveries are dispatched, in the
/// single deployment time zone.
#[derive(Debug, Clone, Copy)]
pub struct DispatchTime {
    time: NaiveTime,
    zone: FixedOffset,
}

impl DispatchTime {
    pub fn new(hour: u32, zone: FixedOffset) -> Option<Self> {
        Some(Self {
            time: NaiveTime::from_hms_opt(hour, 0, 0)?,
            zone,
        })
    }

    pub fn instant_for(&self, date: NaiveDate) -> DateTime<Utc> {
        let local = date.and_time(self.time);
        let offset = Duration::seconds(i64::from(self.zone.local_minus_utc()));
        (local - offset).and_utc()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedSubscription {
    pub subscription_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Expansion {
    pub target_date: NaiveDate,
    pub weekday: &'static str,
    pub requests: Vec<DeliveryRequest>,
    pub skipped: Vec<SkippedSubscription>,
}

pub fn expand(
    subscriptions: &[Subscription],
    target_date: NaiveDate,
    dispatch: &DispatchTime,
) -> Expansion {
    let weekday = target_date.weekday();
    let scheduled_for = dispatch.instant_for(target_date);

    let mut requests = Vec::new();
    let mut skipped = Vec::new();

    for subscription in subscriptions {
        if subscription.status != SubscriptionStatus::Active {
            continue;
        }

        let days = match parse_days_of_week(&subscription.days_of_week) {
            Ok(days) => days,
            Err(err) => {
                warn!(
                    subscription_id = %subscription.id,
                    error = %err,
                    "skipping subscription with malformed weekday set"
                );
                skipped.push(SkippedSubscription {
                    subscription_id: subscription.id,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        if !days.contains(weekday) {
            continue;
        }

        if subscription.start_date > target_date {
            debug!(
                subscription_id = %subscription.id,
                start_date = %subscription.start_date,
                "subscription not started yet"
            );
            continue;
        }

        requests.push(DeliveryRequest {
            subscription_id: subscription.id,
            scheduled_date: target_date,
            scheduled_for,
            status: DeliveryStatus::Pending,
        });
    }

    Expansion {
        target_date,
        weekday: weekday_token(target_date),
        requests,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    use super::{DispatchTime, ExpansionError, expand, parse_days_of_week, weekday_token};
    use crate::models::status::DeliveryStatus;
    use crate::models::subscription::{Subscription, SubscriptionStatus};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dispatch() -> DispatchTime {
        DispatchTime::new(6, FixedOffset::east_opt(0).unwrap()).unwrap()
    }

    fn subscription(seed: u128, days: &str) -> Subscription {
        Subscription {
            id: Uuid::from_u128(seed),
            customer_id: Uuid::from_u128(1000 + seed),
            product_id: Uuid::from_u128(2000),
            address_id: Uuid::from_u128(3000 + seed),
            quantity: 1,
            days_of_week: days.to_string(),
            start_date: date(2023, 12, 1),
            status: SubscriptionStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn weekday_tokens_follow_the_calendar() {
        assert_eq!(weekday_token(date(2024, 1, 1)), "mon");
        assert_eq!(weekday_token(date(2024, 1, 3)), "wed");
        assert_eq!(weekday_token(date(2024, 1, 7)), "sun");
    }

    #[test]
    fn mon_wed_fri_matches_wednesday_only_once() {
        let subs = vec![subscription(1, r#"["mon","wed","fri"]"#)];

        let wednesday = expand(&subs, date(2024, 1, 3), &dispatch());
        assert_eq!(wednesday.requests.len(), 1);
        let request = &wednesday.requests[0];
        assert_eq!(request.subscription_id, Uuid::from_u128(1));
        assert_eq!(request.scheduled_date, date(2024, 1, 3));
        assert_eq!(request.status, DeliveryStatus::Pending);

        let tuesday = expand(&subs, date(2024, 1, 2), &dispatch());
        assert!(tuesday.requests.is_empty());
    }

    #[test]
    fn malformed_subscription_does_not_block_others() {
        let subs = vec![
            subscription(1, r#"["wed"]"#),
            subscription(2, r#"["mon","wed"]"#),
            subscription(3, "wed,fri"),
            subscription(4, r#"["Wednesday"]"#),
            subscription(5, r#"["sun","wed","sat"]"#),
        ];

        let expansion = expand(&subs, date(2024, 1, 3), &dispatch());

        let ids: Vec<Uuid> = expansion
            .requests
            .iter()
            .map(|request| request.subscription_id)
            .collect();
        assert_eq!(
            ids,
            vec![
                Uuid::from_u128(1),
                Uuid::from_u128(2),
                Uuid::from_u128(4),
                Uuid::from_u128(5)
            ]
        );
        assert_eq!(expansion.skipped.len(), 1);
        assert_eq!(expansion.skipped[0].subscription_id, Uuid::from_u128(3));
    }

    #[test]
    fn inactive_and_future_subscriptions_are_ignored() {
        let mut paused = subscription(1, r#"["wed"]"#);
        paused.status = SubscriptionStatus::Paused;
        let mut cancelled = subscription(2, r#"["wed"]"#);
        cancelled.status = SubscriptionStatus::Cancelled;
        let mut future = subscription(3, r#"["wed"]"#);
        future.start_date = date(2024, 1, 4);
        let mut starts_today = subscription(4, r#"["wed"]"#);
        starts_today.start_date = date(2024, 1, 3);

        let expansion = expand(
            &[paused, cancelled, future, starts_today],
            date(2024, 1, 3),
            &dispatch(),
        );

        assert_eq!(expansion.requests.len(), 1);
        assert_eq!(expansion.requests[0].subscription_id, Uuid::from_u128(4));
        assert!(expansion.skipped.is_empty());
    }

    #[test]
    fn dispatch_instant_is_local_hour_in_deployment_zone() {
        let ist = FixedOffset::east_opt(330 * 60).unwrap();
        let dispatch = DispatchTime::new(6, ist).unwrap();

        let instant = dispatch.instant_for(date(2024, 1, 3));
        assert_eq!(instant, Utc.with_ymd_and_hms(2024, 1, 3, 0, 30, 0).unwrap());
    }

    #[test]
    fn parses_mixed_day_names() {
        let days = parse_days_of_week(r#"["MON","tuesday"," fri "]"#).unwrap();
        assert_eq!(days.len(), 3);
        assert!(days.contains(chrono::Weekday::Tue));
        assert!(!days.contains(chrono::Weekday::Wed));
    }

    #[test]
    fn rejects_empty_and_unknown_sets() {
        assert!(matches!(
            parse_days_of_week("[]"),
            Err(ExpansionError::MalformedRecurrenceRule(_))
        ));
        assert!(parse_days_of_week(r#"["funday"]"#).is_err());
        assert!(parse_days_of_week(r#"{"mon":true}"#).is_err());
        assert!(parse_days_of_week("").is_err());
    }

    #[test]
    fn empty_input_yields_empty_expansion() {
        let expansion = expand(&[], date(2024, 1, 3), &dispatch());
        assert!(expansion.requests.is_empty());
        assert!(expansion.skipped.is_empty());
        assert_eq!(expansion.weekday, "wed");
    }
}
