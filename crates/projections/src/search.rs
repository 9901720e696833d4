//! Search and pagination over read models.
//!
//! Every listing uses the same contract: predicates select rows, the
//! request sorts them and cuts one offset/limit page, and the result
//! reports the total before paging together with the log position the
//! view had processed.

use std::borrow::Cow;

use event_store::Position;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

/// Offset/limit page with an optional sort column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest<C> {
    #[serde(default)]
    pub offset: usize,
    /// 0 means the default limit; anything above the maximum is capped.
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub sort: Option<C>,
    #[serde(default = "ascending")]
    pub asc: bool,
}

fn ascending() -> bool {
    true
}

impl<C> Default for SearchRequest<C> {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 0,
            sort: None,
            asc: true,
        }
    }
}

impl<C> SearchRequest<C> {
    pub fn page(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit,
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, column: C, asc: bool) -> Self {
        self.sort = Some(column);
        self.asc = asc;
        self
    }

    pub fn effective_limit(&self) -> usize {
        match self.limit {
            0 => DEFAULT_LIMIT,
            limit => limit.min(MAX_LIMIT),
        }
    }
}

/// How a text column is compared against a search value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextMethod {
    Equals,
    EqualsIgnoreCase,
    Contains,
    ContainsIgnoreCase,
    StartsWith,
    StartsWithIgnoreCase,
}

impl TextMethod {
    pub fn matches(&self, candidate: &str, value: &str) -> bool {
        match self {
            TextMethod::Equals => candidate == value,
            TextMethod::EqualsIgnoreCase => candidate.to_lowercase() == value.to_lowercase(),
            TextMethod::Contains => candidate.contains(value),
            TextMethod::ContainsIgnoreCase => {
                candidate.to_lowercase().contains(&value.to_lowercase())
            }
            TextMethod::StartsWith => candidate.starts_with(value),
            TextMethod::StartsWithIgnoreCase => candidate
                .to_lowercase()
                .starts_with(&value.to_lowercase()),
        }
    }
}

/// A predicate over the columns `C` of a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchQuery<C> {
    Text {
        column: C,
        method: TextMethod,
        value: String,
    },
    And(Vec<SearchQuery<C>>),
    Or(Vec<SearchQuery<C>>),
    Not(Box<SearchQuery<C>>),
}

impl<C: Copy> SearchQuery<C> {
    pub fn text(column: C, method: TextMethod, value: impl Into<String>) -> Self {
        SearchQuery::Text {
            column,
            method,
            value: value.into(),
        }
    }

    pub fn equals(column: C, value: impl Into<String>) -> Self {
        Self::text(column, TextMethod::Equals, value)
    }

    /// Matches rows whose column equals any of `values`.
    pub fn one_of<I, V>(column: C, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        SearchQuery::Or(values.into_iter().map(|v| Self::equals(column, v)).collect())
    }

    pub fn negate(self) -> Self {
        SearchQuery::Not(Box::new(self))
    }

    pub fn matches<R: Searchable<C>>(&self, row: &R) -> bool {
        match self {
            SearchQuery::Text {
                column,
                method,
                value,
            } => method.matches(&row.column(*column), value),
            SearchQuery::And(queries) => queries.iter().all(|q| q.matches(row)),
            SearchQuery::Or(queries) => queries.iter().any(|q| q.matches(row)),
            SearchQuery::Not(query) => !query.matches(row),
        }
    }
}

/// A row that exposes text columns to search predicates and sorting.
pub trait Searchable<C> {
    /// Stable identity, used as the default order and as the tie-break.
    fn key(&self) -> &str;

    fn column(&self, column: C) -> Cow<'_, str>;
}

/// One page of matching rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult<T> {
    pub items: Vec<T>,
    /// Number of matches before paging.
    pub total_count: usize,
    /// Log position the read model had processed when the search ran.
    pub processed_position: Position,
}

impl<T> SearchResult<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> SearchResult<U> {
        SearchResult {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            processed_position: self.processed_position,
        }
    }
}

/// Filters, sorts and pages `rows`; every query in `queries` must match.
pub fn search<'a, C, R>(
    rows: impl IntoIterator<Item = &'a R>,
    queries: &[SearchQuery<C>],
    request: &SearchRequest<C>,
    processed_position: Position,
) -> SearchResult<R>
where
    C: Copy + 'a,
    R: Searchable<C> + Clone + 'a,
{
    let mut matches: Vec<&R> = rows
        .into_iter()
        .filter(|row| queries.iter().all(|q| q.matches(*row)))
        .collect();

    matches.sort_by(|a, b| {
        let ordering = match request.sort {
            Some(column) => a.column(column).cmp(&b.column(column)),
            None => std::cmp::Ordering::Equal,
        }
        .then_with(|| a.key().cmp(b.key()));
        if request.asc { ordering } else { ordering.reverse() }
    });

    let total_count = matches.len();
    let items = matches
        .into_iter()
        .skip(request.offset)
        .take(request.effective_limit())
        .cloned()
        .collect();

    SearchResult {
        items,
        total_count,
        processed_position,
    }
}
