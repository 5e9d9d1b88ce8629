//! Child seeding for repeated todos.
//!
//! # Responsibility
//! - Expand a todo's repeat metadata into point-interval child payloads.
//!
//! # Invariants
//! - Seeded children lie inside the parent interval.
//! - Children are named `#1`, `#2`, ... in start order.

use crate::model::todo::{NewTodo, Todo};
use time::Duration;

const SECONDS_PER_DAY: i64 = 86_400;

/// Builds child payloads for `parent`. Empty when `repeat_times` is zero.
///
/// `repeat_times` instances are spread over each repeat period, spaced by
/// whole days; the span is rounded up to full periods and generation stops
/// once an instance would start after the parent's end date or outside the
/// representable date range.
pub fn seed_children(parent: &Todo) -> Vec<NewTodo> {
    let repeat_times = i64::from(parent.repeat_times);
    if repeat_times == 0 {
        return Vec::new();
    }

    let span = (parent.end_date - parent.start_date).whole_seconds();
    let period = parent.repeat_period.length().whole_seconds();
    let periods = (span + period - 1).div_euclid(period).max(0);
    let spacing = Duration::days(period / repeat_times / SECONDS_PER_DAY);

    let mut children = Vec::new();
    for index in 0..repeat_times * periods {
        let Some(start_date) = i32::try_from(index)
            .ok()
            .and_then(|index| spacing.checked_mul(index))
            .and_then(|offset| parent.start_date.checked_add(offset))
        else {
            break;
        };
        if start_date > parent.end_date {
            break;
        }
        let mut child = NewTodo::new(
            parent.project_id,
            format!("#{}", index + 1),
            start_date,
            start_date,
        );
        child.color = parent.color.clone();
        children.push(child);
    }
    children
}
