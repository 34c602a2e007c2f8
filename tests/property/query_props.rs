//! Property-based tests for the query and statistics layers.
//!
//! Uses proptest to verify:
//! 1. Every sort is a permutation of its input.
//! 2. Descending order is the exact reverse of ascending for every key
//!    except the due-date key, where undated tasks stay last either way.
//! 3. Combined filter criteria (status, priority, search, due range,
//!    overdue, tags) equal applying each criterion in turn.
//! 4. Dashboard counts are internally consistent.
//! 5. Tag normalisation and monthly recurrence stay within their bounds.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use tasktrack::fields::*;
use tasktrack::query::{filter, sort, FilterCriteria};
use tasktrack::stats::calculate_statistics;
use tasktrack::store::calculate_next_occurrence;
use tasktrack::task::{Recurrence, Task};
use tasktrack::util::{normalise_tags, MAX_TAG_LEN};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

// --- Strategies ---

fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![Just(Priority::Low), Just(Priority::Medium), Just(Priority::High)]
}

fn arb_status() -> impl Strategy<Value = Status> {
    prop_oneof![Just(Status::Active), Just(Status::Completed)]
}

fn arb_tags() -> impl Strategy<Value = Vec<String>> {
    prop::sample::subsequence(vec!["work", "home", "urgent"], 0..=3)
        .prop_map(|tags| tags.into_iter().map(String::from).collect())
}

/// Fields of one task; the id is assigned from the position in the list so
/// ids are unique.
type TaskFields = (Priority, Status, Option<i64>, i64, i64, String, Vec<String>);

fn arb_task_fields() -> impl Strategy<Value = TaskFields> {
    (
        arb_priority(),
        arb_status(),
        prop::option::of(-30i64..30),
        0i64..5,
        0i64..5,
        "[a-zA-Z]{1,8}",
        arb_tags(),
    )
}

fn arb_tasks() -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec(arb_task_fields(), 0..25).prop_map(|fields| {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        fields
            .into_iter()
            .enumerate()
            .map(|(i, (priority, status, due, created, updated, title, tags))| {
                // Small ranges force plenty of ties on every key.
                let created_at = base + Duration::hours(created);
                let updated_at = created_at + Duration::hours(updated);
                Task {
                    id: format!("t{i:03}"),
                    title,
                    description: String::new(),
                    priority,
                    status,
                    tags,
                    due_date: due.map(|d| today() + Duration::days(d)),
                    parent_id: None,
                    subtasks: vec![],
                    recurring: None,
                    created_at,
                    updated_at,
                    completed_at: (status == Status::Completed).then_some(updated_at),
                }
            })
            .collect()
    })
}

fn arb_sort_key() -> impl Strategy<Value = SortKey> {
    prop_oneof![
        Just(SortKey::Manual),
        Just(SortKey::Due),
        Just(SortKey::Priority),
        Just(SortKey::Created),
        Just(SortKey::Updated),
        Just(SortKey::Title),
    ]
}

fn ids(tasks: &[Task]) -> Vec<String> {
    tasks.iter().map(|t| t.id.clone()).collect()
}

// --- Properties ---

proptest! {
    #[test]
    fn sort_is_a_permutation(tasks in arb_tasks(), key in arb_sort_key()) {
        for order in [SortOrder::Asc, SortOrder::Desc] {
            let mut sorted = ids(&sort(&tasks, key, order));
            let mut original = ids(&tasks);
            sorted.sort();
            original.sort();
            prop_assert_eq!(sorted, original);
        }
    }

    #[test]
    fn desc_reverses_asc(tasks in arb_tasks(), key in arb_sort_key()) {
        prop_assume!(key != SortKey::Due);
        let mut asc = ids(&sort(&tasks, key, SortOrder::Asc));
        asc.reverse();
        prop_assert_eq!(asc, ids(&sort(&tasks, key, SortOrder::Desc)));
    }

    #[test]
    fn undated_tasks_sort_last(tasks in arb_tasks()) {
        for order in [SortOrder::Asc, SortOrder::Desc] {
            let sorted = sort(&tasks, SortKey::Due, order);
            let first_undated = sorted.iter().position(|t| t.due_date.is_none()).unwrap_or(sorted.len());
            prop_assert!(sorted[first_undated..].iter().all(|t| t.due_date.is_none()));
            let dated: Vec<NaiveDate> = sorted.iter().filter_map(|t| t.due_date).collect();
            let ordered = match order {
                SortOrder::Asc => dated.windows(2).all(|w| w[0] <= w[1]),
                SortOrder::Desc => dated.windows(2).all(|w| w[0] >= w[1]),
            };
            prop_assert!(ordered);
        }
    }

    #[test]
    fn combined_filter_is_intersection(
        tasks in arb_tasks(),
        status in prop_oneof![Just(StatusFilter::All), Just(StatusFilter::Active), Just(StatusFilter::Completed)],
        priority in prop_oneof![Just(PriorityFilter::All), Just(PriorityFilter::High), Just(PriorityFilter::Low)],
        overdue_only in any::<bool>(),
        tag in prop::option::of(prop_oneof![Just("work"), Just("urgent")]),
        search in prop::option::of("[a-cA-C]{0,2}"),
        from in prop::option::of(-30i64..30),
        to in prop::option::of(-30i64..30),
    ) {
        let tags: Vec<String> = tag.into_iter().map(String::from).collect();
        let due_from = from.map(|d| today() + Duration::days(d));
        let due_to = to.map(|d| today() + Duration::days(d));
        let combined = FilterCriteria {
            status,
            priority,
            search: search.clone(),
            due_from,
            due_to,
            overdue_only,
            tags: tags.clone(),
        };
        let stepwise = [
            FilterCriteria { status, ..Default::default() },
            FilterCriteria { priority, ..Default::default() },
            FilterCriteria { search, ..Default::default() },
            FilterCriteria { due_from, ..Default::default() },
            FilterCriteria { due_to, ..Default::default() },
            FilterCriteria { overdue_only, ..Default::default() },
            FilterCriteria { tags, ..Default::default() },
        ]
        .iter()
        .fold(tasks.clone(), |acc, c| filter(&acc, c, today()));

        let result = filter(&tasks, &combined, today());
        prop_assert_eq!(ids(&result), ids(&stepwise));
        prop_assert!(result.iter().all(|t| combined.matches(t, today())));
    }

    #[test]
    fn statistics_are_consistent(tasks in arb_tasks()) {
        let s = calculate_statistics(&tasks, today());
        prop_assert_eq!(s.active + s.completed, s.total);
        prop_assert_eq!(s.high_priority + s.medium_priority + s.low_priority, s.total);
        prop_assert!(s.overdue <= s.active);
        prop_assert!(s.due_today <= s.due_soon);
        prop_assert!(s.due_soon <= s.due_this_week);
        prop_assert!(s.completion_rate <= 100);
    }

    #[test]
    fn normalised_tags_are_bounded(raw in prop::collection::vec("[ a-zA-Z,]{0,40}", 0..5)) {
        for tag in normalise_tags(&raw) {
            prop_assert!(!tag.is_empty());
            prop_assert!(tag.chars().count() <= MAX_TAG_LEN);
            prop_assert!(!tag.contains(','));
            prop_assert!(!tag.chars().any(char::is_uppercase));
        }
    }

    #[test]
    fn monthly_recurrence_moves_forward(offset in 0i64..1500, interval in 1u32..13) {
        let due = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + Duration::days(offset);
        let mut task = fixed_task();
        task.due_date = Some(due);
        task.recurring = Some(Recurrence::new(Frequency::Monthly, interval).unwrap());
        let next = calculate_next_occurrence(&task).unwrap();
        prop_assert!(next > due);
        prop_assert!((next - due).num_days() <= 31 * i64::from(interval));
    }
}

fn fixed_task() -> Task {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    Task {
        id: "fixed".into(),
        title: "Fixed".into(),
        description: String::new(),
        priority: Priority::Medium,
        status: Status::Active,
        tags: vec![],
        due_date: None,
        parent_id: None,
        subtasks: vec![],
        recurring: None,
        created_at: now,
        updated_at: now,
        completed_at: None,
    }
}
