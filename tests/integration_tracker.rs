use chrono::{Duration, NaiveDate};
use request_tracker_lib::config::DataPaths;
use request_tracker_lib::models::{
    CreateRequestPayload, FilterCriteria, NotificationType, Priority, RequestStatus, UpdateRequestPayload,
};
use request_tracker_lib::reminders::start_of_day;
use request_tracker_lib::tracker::TrackerCore;

fn payload(title: &str, authority: &str, submitted: (i32, u32, u32)) -> CreateRequestPayload {
    CreateRequestPayload {
        title: title.to_string(),
        receiving_authority: authority.to_string(),
        submission_date: NaiveDate::from_ymd_opt(submitted.0, submitted.1, submitted.2),
        ..CreateRequestPayload::default()
    }
}

#[test]
fn sqlite_backed_tracker_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = DataPaths::new(dir.path().to_path_buf());

    let created = {
        let core = TrackerCore::open(paths.clone()).expect("open");
        let mut data = payload("Hospital wing", "Ministry of Health", (2024, 1, 1));
        data.manual_id = Some("MP-2024-001".to_string());
        data.documents = vec!["petition.pdf".to_string()];
        core.add_request(data).expect("add")
    };

    let core = TrackerCore::open(paths).expect("reopen");
    let loaded = core.get_request("MP-2024-001").expect("request persisted");
    assert_eq!(loaded, created);

    let mut duplicate = payload("Again", "Ministry of Health", (2024, 1, 2));
    duplicate.manual_id = Some("MP-2024-001".to_string());
    assert!(core.add_request(duplicate).is_err());
}

#[test]
fn end_to_end_filtering_statistics_and_reminders() {
    let dir = tempfile::tempdir().expect("tempdir");
    let core = TrackerCore::open(DataPaths::new(dir.path().to_path_buf())).expect("open");

    let overdue = core
        .add_request(payload("Road resurfacing", "Ministry of Works", (2024, 1, 1)))
        .expect("add");
    let answered = core
        .add_request(payload("School roof", "Ministry of Education", (2024, 1, 5)))
        .expect("add");
    core.update_request(
        &answered.id,
        UpdateRequestPayload {
            status: Some(RequestStatus::Completed),
            response_status: Some(true),
            response_date: NaiveDate::from_ymd_opt(2024, 1, 9),
            ..UpdateRequestPayload::default()
        },
    )
    .expect("update");

    let now = start_of_day(NaiveDate::from_ymd_opt(2024, 1, 20).expect("date"));
    let deadline = core
        .add_request(payload("Water permits", "Ministry of Water", (2024, 1, 18)))
        .expect("add");
    core.update_request(
        &deadline.id,
        UpdateRequestPayload {
            response_date: Some(now.date_naive() + Duration::days(3)),
            ..UpdateRequestPayload::default()
        },
    )
    .expect("update");

    let works = core.filter_requests(&FilterCriteria {
        text: Some("ROAD".to_string()),
        ..FilterCriteria::default()
    });
    assert_eq!(works.len(), 1);
    assert_eq!(works[0].id, overdue.id);

    let stats = core.get_statistics();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.completion_rate, 33);
    assert_eq!(stats.average_response_days, 4);
    assert_eq!(stats.authorities.len(), 3);

    let batch = core.check_for_notifications_at(now);
    let delayed: Vec<_> = batch
        .iter()
        .filter(|notification| notification.r#type == NotificationType::Delayed)
        .collect();
    assert_eq!(delayed.len(), 1);
    assert_eq!(delayed[0].request_id, overdue.id);
    assert_eq!(delayed[0].priority, Priority::High);

    let upcoming: Vec<_> = batch
        .iter()
        .filter(|notification| notification.r#type == NotificationType::Upcoming)
        .collect();
    assert_eq!(upcoming.len(), 1);
    assert_eq!(upcoming[0].request_id, deadline.id);
    assert_eq!(upcoming[0].priority, Priority::Medium);

    assert!(core.check_for_notifications_at(now + Duration::minutes(1)).is_empty());
    assert_eq!(core.list_notifications().len(), batch.len());

    let followup = core.requests_needing_followup_at(now);
    let ids: Vec<&str> = followup.iter().map(|request| request.id.as_str()).collect();
    assert_eq!(ids, vec![overdue.id.as_str()]);
}

#[test]
fn dashed_manual_ids_each_get_their_own_alerts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let core = TrackerCore::open(DataPaths::new(dir.path().to_path_buf())).expect("open");
    for manual_id in ["MP-2024-001", "MP-2024-002"] {
        let mut data = payload("Clinic staffing", "Ministry of Health", (2024, 1, 1));
        data.manual_id = Some(manual_id.to_string());
        core.add_request(data).expect("add");
    }

    let now = start_of_day(NaiveDate::from_ymd_opt(2024, 1, 20).expect("date"));
    let batch = core.check_for_notifications_at(now);
    for manual_id in ["MP-2024-001", "MP-2024-002"] {
        let delayed = batch
            .iter()
            .filter(|notification| {
                notification.request_id == manual_id && notification.r#type == NotificationType::Delayed
            })
            .count();
        assert_eq!(delayed, 1, "delayed alert for {}", manual_id);
    }
    assert!(core.check_for_notifications_at(now + Duration::minutes(1)).is_empty());
}
