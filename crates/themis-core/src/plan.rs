//! Crawl plan generation.
//!
//! Splits a date range into bounded windows and crosses them with the
//! category taxonomy to produce the (category × keyword × window) task list.
//! Everything here is pure: no I/O, no clock.

use std::fmt;

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::config::SearchCategory;
use crate::error::AppError;

/// A contiguous, inclusive `[start, end]` date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Number of days covered, both ends included.
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Splits `[from, to]` into consecutive windows of `width_days` days.
///
/// Windows never overlap, cover the range without gaps, and the last one is
/// clipped to `to`.
pub fn generate_windows(
    from: NaiveDate,
    to: NaiveDate,
    width_days: u32,
) -> Result<Vec<DateWindow>, AppError> {
    if width_days == 0 {
        return Err(AppError::ConfigError(
            "window width must be at least one day".to_string(),
        ));
    }
    if to < from {
        return Err(AppError::ConfigError(format!(
            "date range is inverted: {} > {}",
            from, to
        )));
    }

    let span = TimeDelta::days(i64::from(width_days) - 1);
    let mut windows = Vec::new();
    let mut start = from;

    loop {
        let end = start
            .checked_add_signed(span)
            .map_or(to, |candidate| candidate.min(to));
        windows.push(DateWindow::new(start, end));

        if end >= to {
            break;
        }
        match end.succ_opt() {
            Some(next) => start = next,
            None => break,
        }
    }

    Ok(windows)
}

/// One unit of search work.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrawlTask<'a> {
    pub category: &'a SearchCategory,
    pub keyword: &'a str,
    pub window: DateWindow,
}

/// The slice of a plan belonging to one category.
#[derive(Debug, Clone)]
pub struct CategoryPlan<'a> {
    /// Position of the category in the taxonomy.
    pub index: usize,
    pub category: &'a SearchCategory,
    pub windows: Vec<DateWindow>,
}

impl<'a> CategoryPlan<'a> {
    /// Non-blank keywords of the category, in configured order.
    pub fn keywords(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.category
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
    }

    pub fn task_count(&self) -> usize {
        self.keywords().count() * self.windows.len()
    }

    /// Tasks in keyword-major order.
    pub fn tasks(&self) -> Vec<CrawlTask<'a>> {
        let category = self.category;
        self.keywords()
            .flat_map(|keyword| {
                self.windows.iter().map(move |window| CrawlTask {
                    category,
                    keyword,
                    window: *window,
                })
            })
            .collect()
    }

    /// Regenerates the windows with a later lower bound.
    ///
    /// A `from` after `to` leaves the category with no windows.
    pub fn restrict_from(
        &mut self,
        from: NaiveDate,
        to: NaiveDate,
        width_days: u32,
    ) -> Result<(), AppError> {
        self.windows = if from > to {
            Vec::new()
        } else {
            generate_windows(from, to, width_days)?
        };
        Ok(())
    }
}

/// Full task list for a run, grouped by category.
#[derive(Debug, Clone)]
pub struct CrawlPlan<'a> {
    pub categories: Vec<CategoryPlan<'a>>,
}

impl<'a> CrawlPlan<'a> {
    /// Crosses the selected categories with the windows of `[from, to]`.
    pub fn build(
        categories: &'a [SearchCategory],
        skip: &[usize],
        only: Option<&[usize]>,
        from: NaiveDate,
        to: NaiveDate,
        width_days: u32,
    ) -> Result<Self, AppError> {
        let windows = generate_windows(from, to, width_days)?;
        let categories = select_categories(categories, skip, only)
            .into_iter()
            .map(|(index, category)| CategoryPlan {
                index,
                category,
                windows: windows.clone(),
            })
            .collect();
        Ok(Self { categories })
    }

    pub fn total_tasks(&self) -> usize {
        self.categories.iter().map(CategoryPlan::task_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_tasks() == 0
    }
}

/// Applies the enabled flag and the skip/only index lists.
///
/// Indices refer to positions in the full taxonomy, disabled entries included.
pub fn select_categories<'a>(
    categories: &'a [SearchCategory],
    skip: &[usize],
    only: Option<&[usize]>,
) -> Vec<(usize, &'a SearchCategory)> {
    categories
        .iter()
        .enumerate()
        .filter(|(_, c)| c.enabled)
        .filter(|(i, _)| !skip.contains(i))
        .filter(|(i, _)| only.is_none_or(|only| only.contains(i)))
        .collect()
}
