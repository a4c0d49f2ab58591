//! Burndown chart derivation.
//!
//! Replays a sprint's backlog history left to right and tracks the story
//! points still outstanding. Each item contributes its points while it sits in
//! the sprint with a status that is not done, and nothing otherwise; an
//! event's delta is the change of that contribution. This covers every case
//! the chart cares about:
//!
//! | Event                          | Delta                      |
//! |--------------------------------|----------------------------|
//! | create, not done               | `+points`                  |
//! | update into a done status      | `-last points`             |
//! | update out of a done status    | `+points`                  |
//! | points change, not done        | `new - old`                |
//! | moved into / out of the sprint | `+points` / `-points`      |
//! | delete                         | `-current contribution`    |

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{BacklogHistory, HistoryType};

/// Remaining story points right after one history event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryPointSample {
    pub date: DateTime<Utc>,
    pub point: i64,
    #[serde(rename = "type")]
    pub history_type: HistoryType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Burndown {
    pub sprint_id: i64,
    /// Every input record, ascending by date.
    pub sorted: Vec<BacklogHistory>,
    /// The same records keyed by backlog id, each group ascending by date.
    pub grouped: BTreeMap<i64, Vec<BacklogHistory>>,
    pub samples: Vec<StoryPointSample>,
}

/// Derive the burndown series of `sprint_id` from unordered history.
///
/// `is_done` decides whether a status name belongs to the done category.
/// Updates that leave status, points and sprint untouched (reassignment,
/// priority, type) do not move the chart and produce no sample.
pub fn compute<F>(history: &[BacklogHistory], sprint_id: i64, is_done: F) -> Burndown
where
    F: Fn(&str) -> bool,
{
    let mut sorted = history.to_vec();
    // Stable: events sharing a timestamp keep their log order.
    sorted.sort_by_key(|h| h.date);

    let mut grouped: BTreeMap<i64, Vec<BacklogHistory>> = BTreeMap::new();
    for h in &sorted {
        grouped.entry(h.backlog_id).or_default().push(h.clone());
    }

    let contribution = |h: &BacklogHistory| -> i64 {
        if h.sprint_id == Some(sprint_id) && !is_done(&h.status) {
            h.points.unwrap_or(0)
        } else {
            0
        }
    };

    let mut last_seen: HashMap<i64, &BacklogHistory> = HashMap::new();
    let mut total = 0i64;
    let mut samples = Vec::with_capacity(sorted.len());

    for event in &sorted {
        let previous = last_seen.get(&event.backlog_id).copied();
        let before = previous.map(contribution).unwrap_or(0);

        let (after, moves_chart) = match event.history_type {
            HistoryType::Create => {
                last_seen.insert(event.backlog_id, event);
                (contribution(event), true)
            }
            HistoryType::Update => {
                let relevant = previous.is_none_or(|p| {
                    p.status != event.status
                        || p.points != event.points
                        || p.sprint_id != event.sprint_id
                });
                last_seen.insert(event.backlog_id, event);
                (contribution(event), relevant)
            }
            HistoryType::Delete => {
                last_seen.remove(&event.backlog_id);
                (0, true)
            }
        };

        if moves_chart {
            total += after - before;
            samples.push(StoryPointSample {
                date: event.date,
                point: total,
                history_type: event.history_type,
            });
        }
    }

    Burndown {
        sprint_id,
        sorted,
        grouped,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BacklogPriority, BacklogType};

    const SPRINT: i64 = 901;
    const TODO: &str = "To do";
    const DONE: &str = "Done";

    fn is_done(status: &str) -> bool {
        status == DONE
    }

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    fn base() -> BacklogHistory {
        BacklogHistory {
            project_id: 903,
            backlog_id: 3,
            sprint_id: Some(SPRINT),
            history_type: HistoryType::Create,
            backlog_type: BacklogType::Task,
            priority: Some(BacklogPriority::Medium),
            reporter_id: 901,
            assignee_id: Some(901),
            points: Some(1),
            status: TODO.to_string(),
            date: at("2022-10-11T07:03:56.000Z"),
        }
    }

    fn update(date: &str) -> BacklogHistory {
        BacklogHistory {
            history_type: HistoryType::Update,
            date: at(date),
            ..base()
        }
    }

    fn points(burndown: &Burndown) -> Vec<i64> {
        burndown.samples.iter().map(|s| s.point).collect()
    }

    fn mixed_history() -> Vec<BacklogHistory> {
        let create = |backlog_id: i64, points: i64, date: &str| BacklogHistory {
            backlog_id,
            points: Some(points),
            date: at(date),
            ..base()
        };
        let change = |backlog_id: i64, points: i64, date: &str| BacklogHistory {
            backlog_id,
            points: Some(points),
            history_type: HistoryType::Update,
            date: at(date),
            ..base()
        };
        vec![
            create(2, 2, "2022-10-10T07:03:56.000Z"),
            create(1, 2, "2022-10-09T07:03:56.000Z"),
            create(5, 2, "2022-10-13T07:03:56.000Z"),
            create(4, 3, "2022-10-12T07:03:56.000Z"),
            change(3, 20, "2023-01-12T10:51:45.418Z"),
            change(5, 66, "2023-01-12T10:56:28.107Z"),
            change(5, 2, "2023-01-12T10:58:41.798Z"),
            change(3, 2, "2023-01-12T10:58:48.355Z"),
            create(3, 1, "2022-10-11T07:03:56.000Z"),
        ]
    }

    #[test]
    fn test_sorted_keeps_every_record_in_time_order() {
        let history = mixed_history();
        let burndown = compute(&history, SPRINT, is_done);

        assert_eq!(burndown.sorted.len(), history.len());
        for pair in burndown.sorted.windows(2) {
            assert!(pair[0].date <= pair[1].date);
        }
    }

    #[test]
    fn test_grouped_partitions_history_by_backlog() {
        let history = mixed_history();
        let burndown = compute(&history, SPRINT, is_done);

        let mut count = 0;
        for (id, group) in &burndown.grouped {
            for pair in group.windows(2) {
                assert!(pair[0].date <= pair[1].date);
            }
            for h in group {
                assert_eq!(h.backlog_id, *id);
                count += 1;
            }
        }
        assert_eq!(count, history.len());
        assert_eq!(burndown.grouped.len(), 5);
    }

    #[test]
    fn test_single_create() {
        let burndown = compute(&[base()], SPRINT, is_done);
        assert_eq!(points(&burndown), vec![1]);
        assert_eq!(burndown.samples[0].date, base().date);
        assert_eq!(burndown.samples[0].history_type, HistoryType::Create);
    }

    #[test]
    fn test_update_without_point_relevant_change_adds_no_sample() {
        let history = vec![
            base(),
            BacklogHistory {
                assignee_id: Some(111),
                reporter_id: 222,
                priority: Some(BacklogPriority::High),
                backlog_type: BacklogType::Bug,
                ..update("2022-10-12T07:03:56.000Z")
            },
        ];
        let burndown = compute(&history, SPRINT, is_done);
        assert_eq!(points(&burndown), vec![1]);
    }

    #[test]
    fn test_todo_to_done() {
        let history = vec![
            base(),
            BacklogHistory {
                status: DONE.to_string(),
                ..update("2022-10-12T07:03:56.000Z")
            },
        ];
        let burndown = compute(&history, SPRINT, is_done);
        assert_eq!(points(&burndown), vec![1, 0]);
    }

    #[test]
    fn test_todo_to_done_and_back() {
        let history = vec![
            BacklogHistory {
                date: at("2022-10-10T07:03:56.000Z"),
                ..base()
            },
            BacklogHistory {
                status: DONE.to_string(),
                ..update("2022-10-11T07:03:56.000Z")
            },
            update("2022-10-12T07:03:56.000Z"),
        ];
        let burndown = compute(&history, SPRINT, is_done);
        assert_eq!(points(&burndown), vec![1, 0, 1]);
    }

    #[test]
    fn test_todo_to_in_progress_keeps_points() {
        let history = vec![
            base(),
            BacklogHistory {
                status: "In progress".to_string(),
                ..update("2022-10-12T07:03:56.000Z")
            },
        ];
        let burndown = compute(&history, SPRINT, is_done);
        assert_eq!(points(&burndown), vec![1, 1]);
    }

    #[test]
    fn test_point_increase_and_decrease() {
        let up = vec![
            base(),
            BacklogHistory {
                points: Some(2),
                ..update("2022-10-12T07:03:56.000Z")
            },
        ];
        assert_eq!(points(&compute(&up, SPRINT, is_done)), vec![1, 2]);

        let down = vec![
            base(),
            BacklogHistory {
                points: Some(0),
                ..update("2022-10-12T07:03:56.000Z")
            },
        ];
        assert_eq!(points(&compute(&down, SPRINT, is_done)), vec![1, 0]);
    }

    #[test]
    fn test_delete_removes_contribution() {
        let history = vec![
            base(),
            BacklogHistory {
                history_type: HistoryType::Delete,
                date: at("2022-10-12T07:03:56.000Z"),
                ..base()
            },
        ];
        let burndown = compute(&history, SPRINT, is_done);
        assert_eq!(points(&burndown), vec![1, 0]);
        assert_eq!(burndown.samples[1].history_type, HistoryType::Delete);
    }

    #[test]
    fn test_delete_of_done_item_changes_nothing() {
        let history = vec![
            base(),
            BacklogHistory {
                status: DONE.to_string(),
                ..update("2022-10-12T07:03:56.000Z")
            },
            BacklogHistory {
                history_type: HistoryType::Delete,
                status: DONE.to_string(),
                date: at("2022-10-13T07:03:56.000Z"),
                ..base()
            },
        ];
        assert_eq!(points(&compute(&history, SPRINT, is_done)), vec![1, 0, 0]);
    }

    #[test]
    fn test_moving_item_out_of_sprint_burns_its_points() {
        let history = vec![
            base(),
            BacklogHistory {
                sprint_id: None,
                ..update("2022-10-12T07:03:56.000Z")
            },
            update("2022-10-13T07:03:56.000Z"),
        ];
        assert_eq!(points(&compute(&history, SPRINT, is_done)), vec![1, 0, 1]);
    }

    #[test]
    fn test_running_total_across_items() {
        let burndown = compute(&mixed_history(), SPRINT, is_done);
        // creates 1..5 (2,2,1,3,2), then 3 -> 20, 5 -> 66, 5 -> 2, 3 -> 2
        assert_eq!(points(&burndown), vec![2, 4, 5, 8, 10, 29, 93, 29, 11]);
    }

    #[test]
    fn test_empty_history() {
        let burndown = compute(&[], SPRINT, is_done);
        assert!(burndown.sorted.is_empty());
        assert!(burndown.grouped.is_empty());
        assert!(burndown.samples.is_empty());
    }
}
