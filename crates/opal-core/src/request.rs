//! Validated request types for creating and updating OpenProject entities.
//!
//! Remote entities are passed around as loosely-typed envelopes, but
//! construction payloads are validated here before serialization:
//! required strings must be non-empty after trimming, IDs positive and
//! dates in `YYYY-MM-DD` form. Each type's `payload()` produces the exact
//! wire shape the v3 API expects (descriptions as `{"raw": …}`, entity
//! references as `_links` hrefs, estimated effort as `PT<hours>H`).

use crate::error::{CoreError, Result};
use chrono::NaiveDate;
use serde_json::{json, Map, Value};

/// Relation types accepted by the work package relations endpoint.
pub const RELATION_TYPES: &[&str] = &[
    "follows",
    "precedes",
    "blocks",
    "blocked",
    "relates",
    "duplicates",
    "duplicated",
];

/// Validate a `YYYY-MM-DD` date string.
///
/// # Errors
/// Returns `CoreError::InvalidDate` if the value does not parse.
pub fn check_date(field: &'static str, value: &str) -> Result<()> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| CoreError::InvalidDate { field })
}

fn check_positive(field: &'static str, value: i64) -> Result<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(CoreError::InvalidId { field })
    }
}

fn require_trimmed(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(CoreError::MissingField { field })
    } else {
        Ok(trimmed.to_string())
    }
}

/// Build a `_links` entry pointing at an API resource.
fn link(collection: &str, id: i64) -> Value {
    json!({ "href": format!("/api/v3/{collection}/{id}") })
}

/// Request to create a new project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectCreateRequest {
    /// Project name.
    pub name: String,

    /// Project description (may be empty).
    pub description: String,

    /// Project status; the API default is "active".
    pub status: Option<String>,
}

impl ProjectCreateRequest {
    /// Create a new project request.
    ///
    /// # Errors
    /// Returns `CoreError::MissingField` if the name is empty after trimming.
    pub fn new(name: impl AsRef<str>, description: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: require_trimmed("name", name.as_ref())?,
            description: description.into().trim().to_string(),
            status: None,
        })
    }

    /// Set the project status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Build the wire payload.
    ///
    /// The status is only included when it differs from the API default.
    #[must_use]
    pub fn payload(&self) -> Value {
        let mut payload = json!({
            "name": self.name,
            "description": { "raw": self.description },
        });
        if let Some(status) = &self.status {
            let status = status.trim();
            if !status.is_empty() && status != "active" {
                payload["status"] = Value::String(status.to_string());
            }
        }
        payload
    }
}

/// Request to create a new work package.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkPackageCreateRequest {
    /// Project to create the work package in.
    pub project_id: i64,

    /// Work package subject/title.
    pub subject: String,

    /// Detailed description (omitted from the payload when empty).
    pub description: String,

    /// Work package type ID.
    pub type_id: Option<i64>,

    /// Initial status ID.
    pub status_id: Option<i64>,

    /// Priority ID.
    pub priority_id: Option<i64>,

    /// User ID to assign the work package to.
    pub assignee_id: Option<i64>,

    /// Parent work package ID for hierarchy.
    pub parent_id: Option<i64>,

    /// Start date (`YYYY-MM-DD`).
    pub start_date: Option<String>,

    /// Due date (`YYYY-MM-DD`).
    pub due_date: Option<String>,

    /// Estimated effort in hours.
    pub estimated_hours: Option<f64>,
}

impl WorkPackageCreateRequest {
    /// Create a new work package request.
    ///
    /// # Errors
    /// Returns an error if the subject is empty or the project ID is not
    /// positive.
    pub fn new(project_id: i64, subject: impl AsRef<str>) -> Result<Self> {
        check_positive("project_id", project_id)?;
        Ok(Self {
            project_id,
            subject: require_trimmed("subject", subject.as_ref())?,
            ..Self::default()
        })
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into().trim().to_string();
        self
    }

    /// Set the work package type.
    #[must_use]
    pub fn with_type(mut self, type_id: i64) -> Self {
        self.type_id = Some(type_id);
        self
    }

    /// Set the initial status.
    #[must_use]
    pub fn with_status(mut self, status_id: i64) -> Self {
        self.status_id = Some(status_id);
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority_id: i64) -> Self {
        self.priority_id = Some(priority_id);
        self
    }

    /// Set the assignee.
    #[must_use]
    pub fn with_assignee(mut self, assignee_id: i64) -> Self {
        self.assignee_id = Some(assignee_id);
        self
    }

    /// Set the parent work package.
    #[must_use]
    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Set the start date (`YYYY-MM-DD`).
    #[must_use]
    pub fn with_start_date(mut self, date: impl Into<String>) -> Self {
        self.start_date = Some(date.into());
        self
    }

    /// Set the due date (`YYYY-MM-DD`).
    #[must_use]
    pub fn with_due_date(mut self, date: impl Into<String>) -> Self {
        self.due_date = Some(date.into());
        self
    }

    /// Set the estimated effort in hours.
    #[must_use]
    pub fn with_estimated_hours(mut self, hours: f64) -> Self {
        self.estimated_hours = Some(hours);
        self
    }

    fn validate(&self) -> Result<()> {
        check_positive("project_id", self.project_id)?;
        require_trimmed("subject", &self.subject)?;
        for (field, id) in [
            ("type_id", self.type_id),
            ("status_id", self.status_id),
            ("priority_id", self.priority_id),
            ("assignee_id", self.assignee_id),
            ("parent_id", self.parent_id),
        ] {
            if let Some(id) = id {
                check_positive(field, id)?;
            }
        }
        if let Some(date) = &self.start_date {
            check_date("start_date", date)?;
        }
        if let Some(date) = &self.due_date {
            check_date("due_date", date)?;
        }
        Ok(())
    }

    /// Build the wire payload.
    ///
    /// Only the optional fields that were supplied appear in the result;
    /// the server applies its own defaults for the rest.
    ///
    /// # Errors
    /// Returns an error if any field fails validation.
    pub fn payload(&self) -> Result<Value> {
        self.validate()?;

        let mut links = Map::new();
        links.insert("project".to_string(), link("projects", self.project_id));
        if let Some(id) = self.type_id {
            links.insert("type".to_string(), link("types", id));
        }
        if let Some(id) = self.status_id {
            links.insert("status".to_string(), link("statuses", id));
        }
        if let Some(id) = self.priority_id {
            links.insert("priority".to_string(), link("priorities", id));
        }
        if let Some(id) = self.assignee_id {
            links.insert("assignee".to_string(), link("users", id));
        }
        if let Some(id) = self.parent_id {
            links.insert("parent".to_string(), link("work_packages", id));
        }

        let mut payload = json!({
            "subject": self.subject,
            "_links": Value::Object(links),
        });
        if !self.description.is_empty() {
            payload["description"] = json!({ "raw": self.description });
        }
        if let Some(date) = &self.start_date {
            payload["startDate"] = json!(date);
        }
        if let Some(date) = &self.due_date {
            payload["dueDate"] = json!(date);
        }
        if let Some(hours) = self.estimated_hours {
            payload["estimatedTime"] = json!(format!("PT{hours}H"));
        }
        Ok(payload)
    }
}

/// Request to create a relation between two work packages.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationCreateRequest {
    /// Work package the relation is created from.
    pub from_id: i64,

    /// Target work package.
    pub to_id: i64,

    /// Relation type (see [`RELATION_TYPES`]).
    pub relation_type: String,

    /// Optional description of the relation.
    pub description: String,

    /// Working days between finish of predecessor and start of successor.
    pub lag: i64,
}

impl RelationCreateRequest {
    /// Create a new relation request with the default type `follows`.
    ///
    /// # Errors
    /// Returns an error if either work package ID is not positive.
    pub fn new(from_id: i64, to_id: i64) -> Result<Self> {
        check_positive("from_id", from_id)?;
        check_positive("to_id", to_id)?;
        Ok(Self {
            from_id,
            to_id,
            relation_type: "follows".to_string(),
            description: String::new(),
            lag: 0,
        })
    }

    /// Set the relation type.
    #[must_use]
    pub fn with_type(mut self, relation_type: impl Into<String>) -> Self {
        self.relation_type = relation_type.into();
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the lag in working days.
    #[must_use]
    pub fn with_lag(mut self, lag: i64) -> Self {
        self.lag = lag;
        self
    }

    /// Build the wire payload.
    ///
    /// # Errors
    /// Returns an error if the relation type is not one of [`RELATION_TYPES`].
    pub fn payload(&self) -> Result<Value> {
        if !RELATION_TYPES.contains(&self.relation_type.as_str()) {
            return Err(CoreError::InvalidValue {
                field: "relation_type",
                reason: format!(
                    "'{}' is not one of: {}",
                    self.relation_type,
                    RELATION_TYPES.join(", ")
                ),
            });
        }
        let mut payload = json!({
            "type": self.relation_type,
            "_links": {
                "to": link("work_packages", self.to_id),
            },
        });
        if !self.description.is_empty() {
            payload["description"] = json!(self.description);
        }
        if self.lag != 0 {
            payload["lag"] = json!(self.lag);
        }
        Ok(payload)
    }
}

/// Partial update for an existing work package.
///
/// All fields are optional; an update that supplies none of them is a
/// no-op and is rejected by the client before any request is made. The
/// `lockVersion` token is supplied by the client at dispatch time, never
/// by callers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkPackageUpdate {
    /// New subject/title.
    pub subject: Option<String>,

    /// New description.
    pub description: Option<String>,

    /// New start date (`YYYY-MM-DD`).
    pub start_date: Option<String>,

    /// New due date (`YYYY-MM-DD`).
    pub due_date: Option<String>,

    /// New assignee user ID.
    pub assignee_id: Option<i64>,

    /// New status ID.
    pub status_id: Option<i64>,

    /// New estimated effort in hours.
    pub estimated_hours: Option<f64>,
}

impl WorkPackageUpdate {
    /// Create an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a new subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set a new description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set a new start date (`YYYY-MM-DD`).
    #[must_use]
    pub fn start_date(mut self, date: impl Into<String>) -> Self {
        self.start_date = Some(date.into());
        self
    }

    /// Set a new due date (`YYYY-MM-DD`).
    #[must_use]
    pub fn due_date(mut self, date: impl Into<String>) -> Self {
        self.due_date = Some(date.into());
        self
    }

    /// Set a new assignee.
    #[must_use]
    pub fn assignee(mut self, assignee_id: i64) -> Self {
        self.assignee_id = Some(assignee_id);
        self
    }

    /// Set a new status.
    #[must_use]
    pub fn status(mut self, status_id: i64) -> Self {
        self.status_id = Some(status_id);
        self
    }

    /// Set new estimated effort in hours.
    #[must_use]
    pub fn estimated_hours(mut self, hours: f64) -> Self {
        self.estimated_hours = Some(hours);
        self
    }

    /// Whether the update carries no fields at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Check every supplied field without building a payload.
    ///
    /// The client runs this before the fetch-then-patch sequence so that
    /// caller mistakes never trigger a network call.
    ///
    /// # Errors
    /// Returns an error if a supplied field fails validation.
    pub fn validate(&self) -> Result<()> {
        if let Some(subject) = &self.subject {
            require_trimmed("subject", subject)?;
        }
        if let Some(date) = &self.start_date {
            check_date("start_date", date)?;
        }
        if let Some(date) = &self.due_date {
            check_date("due_date", date)?;
        }
        if let Some(id) = self.assignee_id {
            check_positive("assignee_id", id)?;
        }
        if let Some(id) = self.status_id {
            check_positive("status_id", id)?;
        }
        Ok(())
    }

    /// Build the PATCH payload, including the optimistic-locking token.
    ///
    /// # Errors
    /// Returns an error if a supplied field fails validation.
    pub fn payload(&self, lock_version: u64) -> Result<Value> {
        self.validate()?;
        let mut payload = json!({ "lockVersion": lock_version });

        if let Some(subject) = &self.subject {
            payload["subject"] = json!(subject.trim());
        }
        if let Some(description) = &self.description {
            payload["description"] = json!({ "raw": description.trim() });
        }
        if let Some(date) = &self.start_date {
            payload["startDate"] = json!(date);
        }
        if let Some(date) = &self.due_date {
            payload["dueDate"] = json!(date);
        }

        let mut links = Map::new();
        if let Some(id) = self.assignee_id {
            links.insert("assignee".to_string(), link("users", id));
        }
        if let Some(id) = self.status_id {
            links.insert("status".to_string(), link("statuses", id));
        }
        if !links.is_empty() {
            payload["_links"] = Value::Object(links);
        }

        if let Some(hours) = self.estimated_hours {
            payload["estimatedTime"] = json!(format!("PT{hours}H"));
        }
        Ok(payload)
    }
}
