use crate::models::{Notification, NotificationType, Priority, Request, RequestStatus};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::collections::HashSet;

pub const DAY_MS: i64 = 86_400_000;

pub const DELAYED_RESPONSE_DAYS: i64 = 14;
pub const DELAYED_IMPLEMENTATION_DAYS: i64 = 30;
pub const RESPONSE_DEADLINE_DAYS: i64 = 3;
pub const FOLLOWUP_REMINDER_DAYS: i64 = 1;
pub const NEEDS_FOLLOWUP_DAYS: i64 = 7;
pub const STALLED_IN_PROGRESS_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertRule {
    DelayedResponse,
    DelayedImplementation,
    UpcomingResponse,
    UpcomingFollowup,
    NeedsFollowup,
}

impl AlertRule {
    /// First segment of the notification id. Must not contain `-`.
    pub fn slug(self) -> &'static str {
        match self {
            Self::DelayedResponse => "delayedResponse",
            Self::DelayedImplementation => "delayedImplementation",
            Self::UpcomingResponse => "upcomingResponse",
            Self::UpcomingFollowup => "upcomingFollowup",
            Self::NeedsFollowup => "needsFollowup",
        }
    }

    pub fn notification_type(self) -> NotificationType {
        match self {
            Self::DelayedResponse | Self::DelayedImplementation => NotificationType::Delayed,
            Self::UpcomingResponse | Self::UpcomingFollowup => NotificationType::Upcoming,
            Self::NeedsFollowup => NotificationType::Followup,
        }
    }

    pub fn priority(self) -> Priority {
        match self {
            Self::DelayedResponse | Self::NeedsFollowup => Priority::High,
            Self::DelayedImplementation | Self::UpcomingResponse => Priority::Medium,
            Self::UpcomingFollowup => Priority::Low,
        }
    }
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Whole days between two instants, rounded up. Direction is ignored.
pub fn elapsed_days(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let ms = (to - from).num_milliseconds().abs();
    (ms + DAY_MS - 1) / DAY_MS
}

/// Days from `now` until `date`, rounded up. Negative once the date is past.
pub fn days_until(date: NaiveDate, now: DateTime<Utc>) -> i64 {
    let ms = (start_of_day(date) - now).num_milliseconds();
    -(-ms).div_euclid(DAY_MS)
}

/// Rule slug plus request id: the notification id without its trailing
/// `-{millis}`. Request ids may themselves contain dashes.
pub fn dedupe_key(notification_id: &str) -> String {
    match notification_id.rsplit_once('-') {
        Some((key, _)) => key.to_string(),
        None => notification_id.to_string(),
    }
}

pub fn notification_id(rule: AlertRule, request_id: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}-{}", rule.slug(), request_id, now.timestamp_millis())
}

pub fn needs_followup(request: &Request, now: DateTime<Utc>) -> bool {
    let unanswered = !request.response_status
        && request.status != RequestStatus::Completed
        && request
            .submission_date
            .is_some_and(|submitted| elapsed_days(start_of_day(submitted), now) > NEEDS_FOLLOWUP_DAYS);
    let stalled = request.status == RequestStatus::InProgress
        && elapsed_days(request.updated_at, now) > STALLED_IN_PROGRESS_DAYS;
    unanswered || stalled
}

pub fn requests_needing_followup<'a, I>(requests: I, now: DateTime<Utc>) -> Vec<Request>
where
    I: IntoIterator<Item = &'a Request>,
{
    requests
        .into_iter()
        .filter(|request| needs_followup(request, now))
        .cloned()
        .collect()
}

/// Rules that currently match `request`, each with the message to show.
pub fn matching_rules(request: &Request, now: DateTime<Utc>) -> Vec<(AlertRule, String)> {
    let mut matched = Vec::new();
    let subject = format!("\"{}\" ({})", request.title, request.receiving_authority);

    if !request.response_status {
        if let Some(submitted) = request.submission_date {
            let days = elapsed_days(start_of_day(submitted), now);
            if days > DELAYED_RESPONSE_DAYS {
                matched.push((
                    AlertRule::DelayedResponse,
                    format!("Request {} has had no response for {} days.", subject, days),
                ));
            }
        }
    }

    if request.status == RequestStatus::InProgress {
        if let Some(implementation) = request.implementation_date {
            let days = elapsed_days(start_of_day(implementation), now);
            if days > DELAYED_IMPLEMENTATION_DAYS {
                matched.push((
                    AlertRule::DelayedImplementation,
                    format!("Implementation of request {} is {} days past its start date.", subject, days),
                ));
            }
        }
    }

    if let Some(response_date) = request.response_date {
        if days_until(response_date, now) == RESPONSE_DEADLINE_DAYS {
            matched.push((
                AlertRule::UpcomingResponse,
                format!(
                    "The response deadline for request {} is in {} days ({}).",
                    subject, RESPONSE_DEADLINE_DAYS, response_date
                ),
            ));
        }
    }

    if let Some(followup_date) = request.followup_date {
        if days_until(followup_date, now) == FOLLOWUP_REMINDER_DAYS {
            matched.push((
                AlertRule::UpcomingFollowup,
                format!("Follow up on request {} tomorrow ({}).", subject, followup_date),
            ));
        }
    }

    if needs_followup(request, now) {
        matched.push((
            AlertRule::NeedsFollowup,
            format!("Request {} needs a follow-up.", subject),
        ));
    }

    matched
}

fn rule_title(rule: AlertRule) -> &'static str {
    match rule {
        AlertRule::DelayedResponse => "Delayed response",
        AlertRule::DelayedImplementation => "Delayed implementation",
        AlertRule::UpcomingResponse => "Response deadline approaching",
        AlertRule::UpcomingFollowup => "Follow-up due tomorrow",
        AlertRule::NeedsFollowup => "Follow-up needed",
    }
}

/// New notifications for `requests` at `now`. A candidate is dropped when
/// its dedupe key is already held by `existing` or by an earlier candidate.
pub fn generate_notifications<'a, I>(requests: I, existing: &[Notification], now: DateTime<Utc>) -> Vec<Notification>
where
    I: IntoIterator<Item = &'a Request>,
{
    let mut seen: HashSet<String> = existing
        .iter()
        .map(|notification| dedupe_key(&notification.id))
        .collect();

    let mut generated = Vec::new();
    for request in requests {
        for (rule, message) in matching_rules(request, now) {
            let id = notification_id(rule, &request.id, now);
            if !seen.insert(dedupe_key(&id)) {
                continue;
            }
            generated.push(Notification {
                id,
                r#type: rule.notification_type(),
                title: rule_title(rule).to_string(),
                message,
                request_id: request.id.clone(),
                priority: rule.priority(),
                timestamp: now,
                read: false,
            });
        }
    }
    generated
}
