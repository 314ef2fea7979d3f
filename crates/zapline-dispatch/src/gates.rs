// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pure gate predicates consulted before AI dispatch and outbound send.

use chrono::{Datelike, NaiveDateTime, Timelike};

use zapline_core::types::{PlanLimits, WeeklySchedule};

/// Outcome of the business-hours gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoursGate {
    Allowed,
    OutOfHours,
}

/// Outcome of the usage-limit gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageGate {
    Allowed,
    LimitExceeded,
}

/// Checks `now` against the weekly schedule. An absent schedule means the
/// business is always open. A day window with `open == close` counts as
/// closed all day; `close < open` spans midnight.
pub fn check_business_hours(schedule: Option<&WeeklySchedule>, now: NaiveDateTime) -> HoursGate {
    let Some(schedule) = schedule else {
        return HoursGate::Allowed;
    };

    let weekday = now.date().weekday().num_days_from_monday() as usize;
    let Some(window) = schedule.days[weekday] else {
        return HoursGate::OutOfHours;
    };

    let t = now.time();
    let open = if window.open < window.close {
        t >= window.open && t < window.close
    } else if window.open > window.close {
        // Overnight window, e.g. 18:00 -> 02:00.
        t >= window.open || t < window.close
    } else {
        false
    };

    if open { HoursGate::Allowed } else { HoursGate::OutOfHours }
}

/// Renders the canned out-of-hours reply from the template and the day's
/// schedule. `{hours}` expands to the day's window or a closed marker.
pub fn closed_message(
    template: &str,
    schedule: Option<&WeeklySchedule>,
    now: NaiveDateTime,
) -> String {
    let hours = schedule
        .and_then(|s| s.days[now.date().weekday().num_days_from_monday() as usize])
        .map(|w| {
            format!(
                "{:02}:{:02}–{:02}:{:02}",
                w.open.hour(),
                w.open.minute(),
                w.close.hour(),
                w.close.minute()
            )
        })
        .unwrap_or_else(|| "—".to_string());
    template.replace("{hours}", &hours)
}

/// Checks the tenant's monthly reply count against plan limits. Tenants
/// without a limit are always allowed.
pub fn check_usage(used: u32, plan: &PlanLimits) -> UsageGate {
    match plan.monthly_reply_limit {
        Some(limit) if used >= limit => UsageGate::LimitExceeded,
        _ => UsageGate::Allowed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate, NaiveTime};
    use zapline_core::types::DayWindow;

    fn nine_to_six_all_week() -> WeeklySchedule {
        let window = DayWindow {
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        };
        WeeklySchedule {
            days: [Some(window); 7],
        }
    }

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        // 2026-08-03 is a Monday.
        NaiveDate::from_ymd_opt(2026, 8, 3)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap())
    }

    #[test]
    fn message_at_23h_is_out_of_hours_for_nine_to_six() {
        let schedule = nine_to_six_all_week();
        assert_eq!(
            check_business_hours(Some(&schedule), at(23, 0)),
            HoursGate::OutOfHours
        );
    }

    #[test]
    fn message_within_window_is_allowed() {
        let schedule = nine_to_six_all_week();
        assert_eq!(
            check_business_hours(Some(&schedule), at(10, 30)),
            HoursGate::Allowed
        );
    }

    #[test]
    fn window_edges_are_half_open() {
        let schedule = nine_to_six_all_week();
        assert_eq!(
            check_business_hours(Some(&schedule), at(9, 0)),
            HoursGate::Allowed
        );
        assert_eq!(
            check_business_hours(Some(&schedule), at(18, 0)),
            HoursGate::OutOfHours
        );
    }

    #[test]
    fn no_schedule_means_always_open() {
        assert_eq!(check_business_hours(None, at(3, 0)), HoursGate::Allowed);
    }

    #[test]
    fn closed_day_is_out_of_hours() {
        let mut schedule = nine_to_six_all_week();
        schedule.days[0] = None; // Monday closed
        assert_eq!(
            check_business_hours(Some(&schedule), at(10, 0)),
            HoursGate::OutOfHours
        );
    }

    #[test]
    fn overnight_window_spans_midnight() {
        let window = DayWindow {
            open: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
        };
        let schedule = WeeklySchedule {
            days: [Some(window); 7],
        };
        assert_eq!(
            check_business_hours(Some(&schedule), at(23, 0)),
            HoursGate::Allowed
        );
        assert_eq!(
            check_business_hours(Some(&schedule), at(1, 30)),
            HoursGate::Allowed
        );
        assert_eq!(
            check_business_hours(Some(&schedule), at(12, 0)),
            HoursGate::OutOfHours
        );
    }

    #[test]
    fn equal_open_close_counts_as_closed() {
        let window = DayWindow {
            open: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        };
        let schedule = WeeklySchedule {
            days: [Some(window); 7],
        };
        assert_eq!(
            check_business_hours(Some(&schedule), at(12, 0)),
            HoursGate::OutOfHours
        );
    }

    #[test]
    fn closed_message_interpolates_day_window() {
        let schedule = nine_to_six_all_week();
        let message = closed_message(
            "Estamos fechados. Horário de hoje: {hours}.",
            Some(&schedule),
            at(23, 0),
        );
        assert_eq!(message, "Estamos fechados. Horário de hoje: 09:00–18:00.");
        assert_eq!(at(23, 0).date().weekday().num_days_from_monday(), 0);
    }

    #[test]
    fn usage_gate_respects_plan_limit() {
        let plan = PlanLimits {
            monthly_reply_limit: Some(100),
        };
        assert_eq!(check_usage(99, &plan), UsageGate::Allowed);
        assert_eq!(check_usage(100, &plan), UsageGate::LimitExceeded);
        assert_eq!(check_usage(150, &plan), UsageGate::LimitExceeded);
    }

    #[test]
    fn unlimited_plan_always_allows() {
        assert_eq!(check_usage(1_000_000, &PlanLimits::default()), UsageGate::Allowed);
    }
}
