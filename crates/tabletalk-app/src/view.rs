// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::model::{Record, ResultSet, SortDirection};

pub const PAGE_SIZES: [usize; 4] = [5, 10, 25, 50];
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// One page sliced out of a derived view.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<'a> {
    pub page_count: usize,
    pub items: &'a [Record],
}

/// Pure page projection. `page` is 1-based. Does not clamp: a page past the
/// end yields an empty slice, and keeping `page` inside bounds is the
/// caller's job (see [`ViewState`]).
pub fn paginate(view: &[Record], page: usize, page_size: usize) -> Page<'_> {
    let page_count = if view.is_empty() {
        0
    } else {
        view.len().div_ceil(page_size)
    };

    let start = page.saturating_sub(1).saturating_mul(page_size);
    let end = start.saturating_add(page_size).min(view.len());
    let items = if page == 0 || start >= view.len() {
        &[]
    } else {
        &view[start..end]
    };

    Page { page_count, items }
}

/// Derive the filtered view of `source` for a search query.
///
/// `column = needle` restricts the match to that column; anything else is a
/// case-insensitive substring match against every column. A query naming a
/// column the dataset does not have yields the unfiltered source -- a
/// half-typed column name should not blank the table.
pub fn filter(source: &ResultSet, query: &str) -> Vec<Record> {
    if query.is_empty() {
        return source.records().to_vec();
    }

    if let Some((column, needle)) = parse_column_query(query) {
        if !source.has_column(&column) {
            return source.records().to_vec();
        }
        let needle = needle.to_lowercase();
        return source
            .records()
            .iter()
            .filter(|record| {
                record
                    .get(&column)
                    .is_some_and(|value| value.display().to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
    }

    let needle = query.to_lowercase();
    source
        .records()
        .iter()
        .filter(|record| {
            record
                .values()
                .any(|value| value.display().to_lowercase().contains(&needle))
        })
        .cloned()
        .collect()
}

fn parse_column_query(query: &str) -> Option<(String, String)> {
    let (lhs, rhs) = query.split_once('=')?;
    let column = lhs.trim();
    if !is_identifier(column) {
        return None;
    }
    Some((column.to_owned(), rhs.trim().to_owned()))
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Stable sort of a derived view on one column. Direction is an explicit
/// argument; toggling it across invocations belongs to [`ViewState`], never
/// to hidden state in here.
pub fn sort_by(view: &[Record], column: &str, direction: SortDirection) -> Vec<Record> {
    let mut sorted = view.to_vec();
    sorted.sort_by(|left, right| {
        let ordering = compare_column(left, right, column);
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
    sorted
}

fn compare_column(left: &Record, right: &Record, column: &str) -> Ordering {
    let left = left.get(column);
    let right = right.get(column);
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(left), Some(right)) => {
            if let (Some(left), Some(right)) = (left.as_number(), right.as_number()) {
                left.total_cmp(&right)
            } else {
                left.display().cmp(&right.display())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

/// The filter/sort/page parameters currently applied to a result set.
///
/// Invariant: `page` stays within `[1, max(1, page_count)]` for the filtered
/// view; every mutation below maintains that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    query: String,
    sort: Option<SortSpec>,
    page: usize,
    page_size: usize,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            query: String::new(),
            sort: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ViewState {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Replace the search query. Always returns to page 1: the page count of
    /// the new view has no relation to the old one.
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.page = 1;
    }

    /// Change the page size (zero is coerced to one) and return to page 1.
    pub fn set_page_size(&mut self, size: usize) {
        self.page_size = size.max(1);
        self.page = 1;
    }

    /// Sort by `column`, flipping direction when it is already the sort key.
    /// Sorting reorders in place and does not move the page.
    pub fn toggle_sort(&mut self, column: &str) -> SortDirection {
        let direction = match &self.sort {
            Some(spec) if spec.column == column => spec.direction.toggled(),
            _ => SortDirection::Asc,
        };
        self.sort = Some(SortSpec {
            column: column.to_owned(),
            direction,
        });
        direction
    }

    pub fn next_page(&mut self, page_count: usize) -> bool {
        if self.page < page_count {
            self.page += 1;
            true
        } else {
            false
        }
    }

    pub fn prev_page(&mut self) -> bool {
        if self.page > 1 {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    /// Drop query, sort, and page position for a fresh result-set generation;
    /// the page size is a user preference and survives.
    pub fn reset(&mut self) {
        self.query.clear();
        self.sort = None;
        self.page = 1;
    }
}

/// A renderable grid: headers, the rows of the current page, and the page
/// indicator. Empty headers mean "no results" -- the render layer shows the
/// placeholder row instead of a grid.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableProjection {
    pub headers: Vec<String>,
    pub rows: Vec<Record>,
    pub page: usize,
    pub page_count: usize,
}

impl TableProjection {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn has_prev_page(&self) -> bool {
        self.page > 1
    }

    pub fn has_next_page(&self) -> bool {
        self.page < self.page_count
    }
}

/// Project `source` through `view`: filter, then sort, then paginate. The
/// order is a contract -- sorting before filtering would shift which page
/// boundary a record lands on. Idempotent for identical inputs.
pub fn project(source: &ResultSet, view: &ViewState) -> TableProjection {
    if source.is_empty() {
        return TableProjection::default();
    }

    let filtered = filter(source, view.query());
    let sorted = match view.sort() {
        Some(spec) => sort_by(&filtered, &spec.column, spec.direction),
        None => filtered,
    };
    let page = paginate(&sorted, view.page(), view.page_size());

    TableProjection {
        headers: source.headers().to_vec(),
        rows: page.items.to_vec(),
        page: view.page(),
        page_count: page.page_count,
    }
}
