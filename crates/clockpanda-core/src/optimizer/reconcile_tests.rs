//! Tests for calendar reconciliation.

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    use crate::calendar::{
        CalendarEvent, CalendarEventType, CalendarFacade, EventDetails, InMemoryCalendarFacade, InstantCalendarEvent,
        Mutation,
    };
    use crate::error::CalendarError;
    use crate::optimizer::event::OptimizerEvent;
    use crate::optimizer::reconcile::{apply_reconciliation, plan_reconciliation, Operation};
    use crate::time::{TimeGrain, TimeSpan};
    use crate::user::User;

    const EMAIL: &str = "dev@example.com";
    const TZ: chrono_tz::Tz = chrono_tz::UTC;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 8, day, hour, 0, 0).unwrap()
    }

    fn calendar_event(id: &str, event_type: CalendarEventType, start: DateTime<Utc>, hours: i64) -> CalendarEvent {
        CalendarEvent::Instant(InstantCalendarEvent {
            details: EventDetails {
                id: id.into(),
                title: "Focus Time".into(),
                description: None,
                ical_uid: None,
                is_recurring: false,
                owner: EMAIL.into(),
                busy: true,
                event_type,
                personal_task_id: None,
                attendees: Vec::new(),
            },
            start,
            end: start + Duration::hours(hours),
        })
    }

    fn focus_event(id: &str, start: DateTime<Utc>, hours: i64) -> CalendarEvent {
        calendar_event(id, CalendarEventType::FocusTime, start, hours)
    }

    fn new_focus(date: u32, start: DateTime<Utc>, hours: u32) -> OptimizerEvent {
        let mut e = OptimizerEvent::focus_time_placeholder(
            NaiveDate::from_ymd_opt(2023, 8, date).unwrap(),
            EMAIL,
            "Focus Time",
            None,
        );
        e.start_time_grain = TimeGrain::new(start);
        e.duration_in_time_grains = hours * 4;
        e
    }

    fn seeded_from(original: &CalendarEvent, start: DateTime<Utc>, hours: u32) -> OptimizerEvent {
        let mut e = OptimizerEvent::from_calendar_event(original, EMAIL, TZ);
        e.start_time_grain = TimeGrain::new(start);
        e.duration_in_time_grains = hours * 4;
        e
    }

    fn owned_in_range(calendar: &InMemoryCalendarFacade) -> Vec<CalendarEvent> {
        let user = User::new(EMAIL);
        calendar
            .list_events(&user, &TimeSpan::new(at(21, 0), at(28, 0)))
            .unwrap()
            .into_iter()
            .filter(|e| e.event_type().is_owned_by_clock_panda())
            .collect()
    }

    #[test]
    fn diff_classifies_create_update_delete_and_unchanged() {
        let kept = focus_event("kept", at(21, 9), 2);
        let moved = focus_event("moved", at(22, 9), 2);
        let stale = focus_event("stale", at(23, 9), 2);
        let solved = vec![
            seeded_from(&kept, at(21, 9), 2),
            seeded_from(&moved, at(22, 13), 2),
            new_focus(24, at(24, 10), 3),
        ];

        let plan = plan_reconciliation(&[kept, moved, stale.clone()], &solved, TZ);

        assert_eq!(plan.unchanged, 1);
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].0.id(), "moved");
        assert_eq!(plan.updates[0].1.span, TimeSpan::new(at(22, 13), at(22, 15)));
        assert_eq!(plan.creations.len(), 1);
        assert_eq!(plan.creations[0].span, TimeSpan::new(at(24, 10), at(24, 13)));
        assert_eq!(plan.deletions, vec![stale]);
        assert_eq!(plan.mutation_count(), 3);
    }

    #[test]
    fn new_entity_adopts_identical_existing_event() {
        let existing = focus_event("mem-0", at(21, 9), 2);
        let solved = vec![new_focus(21, at(21, 9), 2)];
        let plan = plan_reconciliation(&[existing], &solved, TZ);
        assert!(plan.is_empty());
        assert_eq!(plan.unchanged, 1);
    }

    #[test]
    fn original_that_vanished_is_recreated() {
        let gone = focus_event("gone", at(21, 9), 2);
        let solved = vec![seeded_from(&gone, at(21, 9), 2)];
        let plan = plan_reconciliation(&[], &solved, TZ);
        assert_eq!(plan.creations.len(), 1);
        assert!(plan.updates.is_empty());
    }

    #[test]
    fn renamed_event_is_updated_in_place() {
        let gym = calendar_event("gym", CalendarEventType::PersonalTask, at(21, 18), 1);
        let mut renamed = seeded_from(&gym, at(21, 18), 1);
        renamed.title = "Swimming".into();

        let plan = plan_reconciliation(&[gym], &[renamed], TZ);

        assert_eq!(plan.unchanged, 0);
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].0.id(), "gym");
        assert_eq!(plan.updates[0].1.title, "Swimming");
        assert_eq!(plan.updates[0].1.span, TimeSpan::new(at(21, 18), at(21, 19)));
    }

    #[test]
    fn adopted_event_with_new_description_is_updated() {
        let existing = focus_event("mem-0", at(21, 9), 2);
        let mut solved = new_focus(21, at(21, 9), 2);
        solved.description = Some("Deep work".into());

        let plan = plan_reconciliation(&[existing], &[solved], TZ);

        assert!(plan.creations.is_empty());
        assert!(plan.deletions.is_empty());
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].0.id(), "mem-0");
        assert_eq!(plan.updates[0].1.description.as_deref(), Some("Deep work"));
    }

    #[test]
    fn empty_description_matches_missing_one() {
        let mut existing = focus_event("mem-0", at(21, 9), 2);
        if let CalendarEvent::Instant(e) = &mut existing {
            e.details.description = Some(String::new());
        }
        let plan = plan_reconciliation(&[existing], &[new_focus(21, at(21, 9), 2)], TZ);
        assert!(plan.is_empty());
        assert_eq!(plan.unchanged, 1);
    }

    #[test]
    #[should_panic(expected = "external event")]
    fn external_event_in_current_set_is_a_bug() {
        let external = calendar_event("meeting", CalendarEventType::ExternalEvent, at(21, 9), 1);
        plan_reconciliation(&[external], &[], TZ);
    }

    #[test]
    fn deletions_run_before_updates_and_creations() {
        let calendar = InMemoryCalendarFacade::new();
        let user = User::new(EMAIL);
        let moved = focus_event("moved", at(22, 9), 2);
        calendar.insert(EMAIL, focus_event("stale", at(23, 9), 2));
        calendar.insert(EMAIL, moved.clone());

        let solved = vec![seeded_from(&moved, at(22, 13), 2), new_focus(24, at(24, 10), 2)];
        let plan = plan_reconciliation(&owned_in_range(&calendar), &solved, TZ);
        let report = apply_reconciliation(&calendar, &user, plan);

        assert!(report.is_clean());
        assert_eq!((report.deleted, report.updated, report.created), (1, 1, 1));
        let mutations = calendar.mutations();
        assert!(matches!(&mutations[0], Mutation::Deleted { event_id, .. } if event_id == "stale"));
        assert!(matches!(&mutations[1], Mutation::Updated { event_id, .. } if event_id == "moved"));
        assert!(matches!(&mutations[2], Mutation::Created { .. }));
    }

    #[test]
    fn failures_do_not_stop_remaining_operations() {
        let calendar = InMemoryCalendarFacade::new();
        let user = User::new(EMAIL);
        calendar.insert(EMAIL, focus_event("stuck", at(21, 9), 2));
        calendar.insert(EMAIL, focus_event("stale", at(23, 9), 2));
        calendar.fail_mutations_of("stuck");

        let solved = vec![new_focus(24, at(24, 10), 2)];
        let plan = plan_reconciliation(&owned_in_range(&calendar), &solved, TZ);
        let report = apply_reconciliation(&calendar, &user, plan);

        assert_eq!(report.deleted, 1);
        assert_eq!(report.created, 1);
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.operation, Operation::Delete);
        assert_eq!(failure.event_id, "stuck");
        assert!(matches!(failure.error, CalendarError::Api { status: 500, .. }));
    }

    #[test]
    fn second_pass_over_same_result_makes_no_calls() {
        let calendar = InMemoryCalendarFacade::new();
        let user = User::new(EMAIL);
        let moved = focus_event("moved", at(22, 9), 2);
        calendar.insert(EMAIL, moved.clone());
        calendar.insert(EMAIL, focus_event("stale", at(23, 9), 2));
        let solved = vec![
            seeded_from(&moved, at(22, 13), 2),
            new_focus(24, at(24, 10), 2),
            new_focus(25, at(25, 9), 4),
        ];

        let first = apply_reconciliation(
            &calendar,
            &user,
            plan_reconciliation(&owned_in_range(&calendar), &solved, TZ),
        );
        assert_eq!(first.mutations(), 4);
        calendar.clear_mutations();

        let second_plan = plan_reconciliation(&owned_in_range(&calendar), &solved, TZ);
        assert!(second_plan.is_empty());
        let second = apply_reconciliation(&calendar, &user, second_plan);
        assert_eq!(second.mutations(), 0);
        assert_eq!(second.unchanged, 3);
        assert!(calendar.mutations().is_empty());
    }
}
