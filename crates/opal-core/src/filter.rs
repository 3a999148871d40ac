//! Work package search query builder.
//!
//! Translates structured search criteria into the OpenProject filter
//! encoding: a JSON array of single-key `{field: {operator, values}}`
//! objects under the `filters` query parameter, and a `[[field, dir]]`
//! pair under `sortBy`. Multiple values under one key are OR-ed by the
//! server; distinct filter keys are AND-ed.

use serde_json::{json, Value};

/// Sort fields accepted by the work packages endpoint. Anything else
/// silently falls back to `id`; existing callers rely on this fail-open
/// behavior.
pub const SORT_FIELDS: &[&str] = &[
    "id",
    "subject",
    "updatedAt",
    "createdAt",
    "dueDate",
    "startDate",
    "status",
    "priority",
    "type",
];

/// Sentinel lower bound used when a date range has no explicit start.
///
/// The API has no one-sided date operator in this integration's usage, so
/// open ranges are encoded with extreme bounds. A genuine date in 1900 or
/// 2099 is therefore indistinguishable from "unbounded"; this is a known
/// approximation inherited from the wire contract, not something to fix
/// here.
pub const DATE_FLOOR: &str = "1900-01-01";

/// Sentinel upper bound used when a date range has no explicit end.
pub const DATE_CEILING: &str = "2099-12-31";

/// Upper limit the API enforces on page sizes.
const MAX_PAGE_SIZE: u32 = 100;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    #[default]
    Desc,
}

impl SortOrder {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Build a single OpenProject filter object.
///
/// Values are always stringified; the API expects string-typed values
/// regardless of the underlying field type.
#[must_use]
pub fn filter(field: &str, operator: &str, values: &[impl ToString]) -> Value {
    let values: Vec<String> = values.iter().map(ToString::to_string).collect();
    json!({ field: { "operator": operator, "values": values } })
}

/// Structured search criteria for work packages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkPackageQuery {
    /// Restrict to one project.
    pub project_id: Option<i64>,

    /// Match any of these statuses.
    pub status_ids: Vec<i64>,

    /// Restrict to one assignee.
    pub assignee_id: Option<i64>,

    /// Match any of these work package types.
    pub type_ids: Vec<i64>,

    /// Match any of these priorities.
    pub priority_ids: Vec<i64>,

    /// Created on or after this date (`YYYY-MM-DD`).
    pub created_after: Option<String>,

    /// Created on or before this date (`YYYY-MM-DD`).
    pub created_before: Option<String>,

    /// Due on or after this date (`YYYY-MM-DD`).
    pub due_after: Option<String>,

    /// Due on or before this date (`YYYY-MM-DD`).
    pub due_before: Option<String>,

    /// Substring match on the subject.
    pub subject_contains: Option<String>,

    /// Pre-built filter objects appended verbatim after the generated ones.
    pub custom_filters: Vec<Value>,

    /// Sort field; values outside [`SORT_FIELDS`] fall back to `id`.
    pub sort_by: Option<String>,

    /// Sort direction.
    pub sort_order: SortOrder,

    /// Results per page, clamped to `[1, 100]`.
    pub page_size: Option<u32>,

    /// Pagination offset.
    pub offset: Option<u32>,
}

impl WorkPackageQuery {
    /// Create an empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one project.
    #[must_use]
    pub fn in_project(mut self, project_id: i64) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Match any of the given statuses.
    #[must_use]
    pub fn with_statuses(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.status_ids = ids.into_iter().collect();
        self
    }

    /// Restrict to one assignee.
    #[must_use]
    pub fn assigned_to(mut self, assignee_id: i64) -> Self {
        self.assignee_id = Some(assignee_id);
        self
    }

    /// Match any of the given types.
    #[must_use]
    pub fn with_types(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.type_ids = ids.into_iter().collect();
        self
    }

    /// Match any of the given priorities.
    #[must_use]
    pub fn with_priorities(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.priority_ids = ids.into_iter().collect();
        self
    }

    /// Filter on creation date, either bound optional.
    #[must_use]
    pub fn created_between(
        mut self,
        after: Option<impl Into<String>>,
        before: Option<impl Into<String>>,
    ) -> Self {
        self.created_after = after.map(Into::into);
        self.created_before = before.map(Into::into);
        self
    }

    /// Filter on due date, either bound optional.
    #[must_use]
    pub fn due_between(
        mut self,
        after: Option<impl Into<String>>,
        before: Option<impl Into<String>>,
    ) -> Self {
        self.due_after = after.map(Into::into);
        self.due_before = before.map(Into::into);
        self
    }

    /// Substring match on the subject.
    #[must_use]
    pub fn subject_contains(mut self, text: impl Into<String>) -> Self {
        self.subject_contains = Some(text.into());
        self
    }

    /// Append a pre-built filter object verbatim.
    #[must_use]
    pub fn with_custom_filter(mut self, filter: Value) -> Self {
        self.custom_filters.push(filter);
        self
    }

    /// Set the sort field and direction.
    #[must_use]
    pub fn sorted_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(field.into());
        self.sort_order = order;
        self
    }

    /// Set the page size (clamped to `[1, 100]` at encoding time).
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Set the pagination offset.
    #[must_use]
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Build the generated filter list (without custom filters).
    fn filter_list(&self) -> Vec<Value> {
        let mut filters = Vec::new();

        if let Some(id) = self.project_id {
            filters.push(filter("project", "=", &[id]));
        }
        if !self.status_ids.is_empty() {
            filters.push(filter("status", "=", &self.status_ids));
        }
        if let Some(id) = self.assignee_id {
            filters.push(filter("assignee", "=", &[id]));
        }
        if !self.type_ids.is_empty() {
            filters.push(filter("type", "=", &self.type_ids));
        }
        if !self.priority_ids.is_empty() {
            filters.push(filter("priority", "=", &self.priority_ids));
        }
        if let Some(range) = date_range(self.created_after.as_deref(), self.created_before.as_deref())
        {
            filters.push(filter("createdAt", "<>d", &range));
        }
        if let Some(range) = date_range(self.due_after.as_deref(), self.due_before.as_deref()) {
            filters.push(filter("dueDate", "<>d", &range));
        }
        if let Some(text) = &self.subject_contains {
            filters.push(filter("subject", "~", &[text]));
        }
        filters
    }

    /// Encode the query as URL parameters.
    ///
    /// Custom filters are concatenated after the generated ones, never
    /// merged or deduplicated. An unknown sort field degrades to `id`
    /// rather than failing.
    #[must_use]
    pub fn to_params(&self) -> Vec<(String, String)> {
        let page_size = self.page_size.unwrap_or(MAX_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let mut params = vec![
            ("pageSize".to_string(), page_size.to_string()),
            ("offset".to_string(), self.offset.unwrap_or(0).to_string()),
        ];

        let sort_by = self
            .sort_by
            .as_deref()
            .filter(|field| SORT_FIELDS.contains(field))
            .unwrap_or("id");
        params.push((
            "sortBy".to_string(),
            json!([[sort_by, self.sort_order.as_str()]]).to_string(),
        ));

        let mut filters = self.filter_list();
        filters.extend(self.custom_filters.iter().cloned());
        if !filters.is_empty() {
            params.push(("filters".to_string(), Value::Array(filters).to_string()));
        }
        params
    }
}

/// Normalize an optional date range to a two-element `<>d` bound,
/// synthesizing the missing side from the sentinel extremes.
fn date_range(after: Option<&str>, before: Option<&str>) -> Option<[String; 2]> {
    match (after, before) {
        (Some(after), Some(before)) => Some([after.to_string(), before.to_string()]),
        (Some(after), None) => Some([after.to_string(), DATE_CEILING.to_string()]),
        (None, Some(before)) => Some([DATE_FLOOR.to_string(), before.to_string()]),
        (None, None) => None,
    }
}
