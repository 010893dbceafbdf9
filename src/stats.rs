use crate::filter::sort_newest_first;
use crate::models::{Request, RequestStatus, Statistics};
use crate::reminders::{elapsed_days, start_of_day};
use std::collections::BTreeSet;

pub const DEFAULT_RECENT_LIMIT: usize = 5;

pub fn compute_statistics<'a, I>(requests: I, recent_limit: usize) -> Statistics
where
    I: IntoIterator<Item = &'a Request>,
{
    let mut stats = Statistics::default();
    let mut authorities = BTreeSet::new();
    let mut response_days_total: i64 = 0;
    let mut responded: i64 = 0;
    let mut all = Vec::new();

    for request in requests {
        stats.total += 1;
        match request.status {
            RequestStatus::Completed => stats.completed += 1,
            RequestStatus::InProgress => stats.in_progress += 1,
            RequestStatus::Pending => stats.pending += 1,
            RequestStatus::UnderReview => stats.under_review += 1,
            RequestStatus::Rejected => stats.rejected += 1,
        }

        let authority = request.receiving_authority.trim();
        if !authority.is_empty() {
            authorities.insert(authority.to_string());
        }

        if request.response_status {
            if let (Some(submitted), Some(answered)) = (request.submission_date, request.response_date) {
                response_days_total += elapsed_days(start_of_day(submitted), start_of_day(answered));
                responded += 1;
            }
        }

        all.push(request.clone());
    }

    if stats.total > 0 {
        stats.completion_rate = ((stats.completed as f64 / stats.total as f64) * 100.0).round() as u32;
    }
    if responded > 0 {
        stats.average_response_days = (response_days_total as f64 / responded as f64).round() as u32;
    }

    sort_newest_first(&mut all);
    all.truncate(recent_limit);
    stats.authorities = authorities.into_iter().collect();
    stats.recent = all;
    stats
}
