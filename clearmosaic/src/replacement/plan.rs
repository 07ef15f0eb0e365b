//! Backward search windows.

use chrono::{Days, NaiveDate};

use crate::config::EngineConfig;
use crate::provider::DateWindow;

/// Sequence of date windows searched for replacement pixels, newest first.
///
/// Windows are `[s, s + day_step]` for `s = end − step, end − 2·step, …`
/// while `s ≥ start − day_reserve`:
///
/// ```text
///         start−reserve      start              end
///  ─────────┼─────────────────┼──────────────────┼──▶ time
///           │      [s4,  ][s3,  ][s2,  ][s1,    ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchPlan {
    start: NaiveDate,
    end: NaiveDate,
    day_step: u32,
    day_reserve: u32,
}

impl SearchPlan {
    /// Plan for a `start..=end` request. A zero step is treated as one day.
    pub fn new(start: NaiveDate, end: NaiveDate, day_step: u32, day_reserve: u32) -> Self {
        Self {
            start,
            end,
            day_step: day_step.max(1),
            day_reserve,
        }
    }

    pub fn from_config(start: NaiveDate, end: NaiveDate, config: &EngineConfig) -> Self {
        Self::new(start, end, config.day_step, config.day_reserve)
    }

    /// Oldest date a window may start on.
    pub fn floor(&self) -> Option<NaiveDate> {
        self.start
            .checked_sub_days(Days::new(self.day_reserve as u64))
    }

    /// Upper bound on the number of windows: `ceil(L / day_step) + 1` with
    /// lookback `L = (end − start) + day_reserve`.
    pub fn max_windows(&self) -> usize {
        let lookback = (self.end - self.start).num_days().max(0) + self.day_reserve as i64;
        let step = self.day_step as i64;
        ((lookback + step - 1) / step) as usize + 1
    }

    pub fn windows(&self) -> SearchWindows {
        let step = Days::new(self.day_step as u64);
        SearchWindows {
            next: self.end.checked_sub_days(step),
            floor: self.floor(),
            step,
        }
    }
}

impl IntoIterator for &SearchPlan {
    type Item = DateWindow;
    type IntoIter = SearchWindows;

    fn into_iter(self) -> SearchWindows {
        self.windows()
    }
}

/// Iterator over the windows of a [`SearchPlan`].
#[derive(Debug, Clone)]
pub struct SearchWindows {
    next: Option<NaiveDate>,
    floor: Option<NaiveDate>,
    step: Days,
}

impl Iterator for SearchWindows {
    type Item = DateWindow;

    fn next(&mut self) -> Option<DateWindow> {
        let start = self.next?;
        let floor = self.floor?;
        if start < floor {
            self.next = None;
            return None;
        }
        let end = start.checked_add_days(self.step)?;
        self.next = start.checked_sub_days(self.step);
        Some(DateWindow::new(start, end))
    }
}
