//! Administrator roster: one line per agent with verification flags.

use crate::analysis::aggregator::group_by_user;
use crate::models::{Profile, Report, RosterEntry};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Pending-review flags for a single agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerificationFlags {
    pub unverified_today: bool,
    pub unverified_earlier: bool,
}

/// Derive verification flags from one agent's canonical reports.
pub fn verification_flags(canonical: &[Report], today: NaiveDate) -> VerificationFlags {
    let mut flags = VerificationFlags::default();

    for report in canonical.iter().filter(|r| r.status.is_pending()) {
        if report.date == today {
            flags.unverified_today = true;
        } else if report.date < today {
            flags.unverified_earlier = true;
        }
    }

    flags
}

/// Build the roster from canonical reports of any number of agents.
///
/// Entries are ordered by display name (agents without one last), then
/// by user id.
pub fn build_roster(
    canonical: &[Report],
    profiles: &BTreeMap<String, Profile>,
    today: NaiveDate,
) -> Vec<RosterEntry> {
    let mut roster: Vec<RosterEntry> = group_by_user(canonical)
        .into_iter()
        .map(|(user_id, reports)| {
            let flags = verification_flags(&reports, today);
            let last_report_date = reports.iter().map(|r| r.date).max();

            RosterEntry {
                display_name: profiles.get(&user_id).and_then(Profile::display_name),
                last_report_date,
                report_count: reports.len(),
                reported_today: reports.iter().any(|r| r.date == today),
                unverified_today: flags.unverified_today,
                unverified_earlier: flags.unverified_earlier,
                stale: last_report_date.is_some_and(|d| d < today),
                user_id,
            }
        })
        .collect();

    roster.sort_by_cached_key(|entry| {
        (
            entry.display_name.is_none(),
            entry.display_name.as_deref().map(str::to_lowercase),
            entry.user_id.clone(),
        )
    });

    roster
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregator::reconcile;
    use crate::models::ReportStatus;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn create_test_report(user: &str, day: &str, status: ReportStatus) -> Report {
        Report {
            id: format!("{}-{}-{}", user, day, status),
            user_id: user.to_string(),
            date: date(day),
            status,
            created_at: None,
            metrics: BTreeMap::new(),
        }
    }

    #[test]
    fn test_flags_today_and_earlier() {
        let today = date("2024-05-10");
        let reports = vec![
            create_test_report("u1", "2024-05-08", ReportStatus::Edit),
            create_test_report("u1", "2024-05-09", ReportStatus::Ready),
            create_test_report("u1", "2024-05-10", ReportStatus::Set),
        ];

        let flags = verification_flags(&reports, today);
        assert!(flags.unverified_today);
        assert!(flags.unverified_earlier);

        let approved = vec![create_test_report("u1", "2024-05-10", ReportStatus::Ready)];
        assert_eq!(
            verification_flags(&approved, today),
            VerificationFlags::default()
        );
    }

    #[test]
    fn test_ready_today_clears_pending_after_reconcile() {
        let today = date("2024-05-10");
        let raw = vec![
            create_test_report("u1", "2024-05-10", ReportStatus::Set),
            create_test_report("u1", "2024-05-10", ReportStatus::Ready),
        ];

        let flags = verification_flags(&reconcile(&raw), today);
        assert!(!flags.unverified_today);
    }

    #[test]
    fn test_build_roster() {
        let today = date("2024-05-10");
        let canonical = vec![
            create_test_report("u1", "2024-05-09", ReportStatus::Ready),
            create_test_report("u2", "2024-05-10", ReportStatus::Edit),
            create_test_report("u3", "2024-05-01", ReportStatus::Set),
        ];
        let mut profiles = BTreeMap::new();
        profiles.insert(
            "u1".to_string(),
            Profile {
                first_name: Some("Zoya".to_string()),
                ..Profile::default()
            },
        );
        profiles.insert(
            "u2".to_string(),
            Profile {
                first_name: Some("anna".to_string()),
                ..Profile::default()
            },
        );

        let roster = build_roster(&canonical, &profiles, today);
        let order: Vec<_> = roster.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(order, vec!["u2", "u1", "u3"]);

        assert!(roster[0].reported_today);
        assert!(roster[0].unverified_today);
        assert!(!roster[0].stale);

        assert!(roster[1].stale);
        assert!(!roster[1].is_unverified());

        assert!(roster[2].unverified_earlier);
        assert_eq!(roster[2].last_report_date, Some(date("2024-05-01")));
        assert_eq!(roster[2].display_name, None);
    }
}
