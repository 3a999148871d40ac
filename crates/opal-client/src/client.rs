//! The OpenProject API client.
//!
//! Every outbound call goes through a single dispatcher that builds the
//! URL, attaches authentication, logs the exchange and classifies the
//! outcome into the [`ApiError`] taxonomy. Domain operations compose the
//! dispatcher with the query builder, the pagination walker, the
//! reference-data cache and the optimistic-locking protocol.

use crate::cache::{TtlCache, DEFAULT_TTL};
use crate::error::{ApiError, Result};
use crate::settings::Settings;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use opal_core::filter::filter;
use opal_core::{
    hal, ProjectCreateRequest, RelationCreateRequest, WorkPackageCreateRequest, WorkPackageQuery,
    WorkPackageUpdate,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, HOST};
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Path prefix of the v3 API.
const API_BASE: &str = "/api/v3";

/// Page size used by the pagination walker (the API maximum).
const WALK_PAGE_SIZE: u64 = 100;

/// Outcome of the connectivity probe.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    /// Whether the root endpoint answered successfully.
    pub success: bool,

    /// Human-readable outcome description.
    pub message: String,

    /// Remote core version, when the probe succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Async client for one OpenProject instance.
///
/// The client owns its HTTP connection pool and its reference-data cache
/// for its full lifetime. Callers may share it across tasks; the cache is
/// the only internal mutable state. [`close`](Self::close) releases the
/// client logically; operations issued afterwards fail with
/// [`ApiError::State`] instead of hanging.
pub struct OpenProjectClient {
    http: reqwest::Client,
    base_url: String,
    cache: TtlCache,
    closed: AtomicBool,
}

impl OpenProjectClient {
    /// Build a client from settings.
    ///
    /// The Basic-auth header is computed once here from
    /// `"apikey:" + key` and installed as a default header; it is never
    /// recomputed per call.
    ///
    /// # Errors
    /// Returns `ApiError::Validation` if the credential or host header
    /// cannot form a valid header value, or `ApiError::Transport` if the
    /// HTTP backend fails to initialize.
    pub fn new(settings: &Settings) -> Result<Self> {
        let auth = BASE64.encode(format!("apikey:{}", settings.api_key));
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {auth}"))
                .map_err(|e| ApiError::Validation(format!("invalid API key: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(host) = &settings.host_header {
            headers.insert(
                HOST,
                HeaderValue::from_str(host)
                    .map_err(|e| ApiError::Validation(format!("invalid host header: {e}")))?,
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: settings.base_url.clone(),
            cache: TtlCache::new(DEFAULT_TTL),
            closed: AtomicBool::new(false),
        })
    }

    /// Release the client. Subsequent operations fail with
    /// [`ApiError::State`]; calling close twice is harmless.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        debug!("client closed");
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // --- Dispatcher ---

    /// Single chokepoint for outbound calls.
    ///
    /// Timeouts and connection failures surface as `Transport`; non-2xx
    /// responses as `Protocol` with whatever structured detail the body
    /// carries (an unparseable error body is tolerated and treated as
    /// empty); a 2xx response with an empty body yields an empty object.
    /// No retries happen here or anywhere below.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(String, String)]>,
        body: Option<&Value>,
    ) -> Result<Value> {
        if self.is_closed() {
            return Err(ApiError::State("client is closed".to_string()));
        }

        let url = format!("{}{API_BASE}{path}", self.base_url);
        debug!(%method, %url, "dispatching API request");

        let mut builder = self.http.request(method.clone(), &url);
        if let Some(query) = query {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        debug!(%method, %url, status = status.as_u16(), "received API response");

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            let body: Value = serde_json::from_str(&text).unwrap_or_else(|_| json!({}));
            let error = ApiError::protocol(
                status.as_u16(),
                status.canonical_reason().unwrap_or(""),
                body,
            );
            warn!(%method, %url, status = status.as_u16(), %error, "API request failed");
            return Err(error);
        }

        if text.is_empty() {
            return Ok(json!({}));
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::invalid_json(status.as_u16(), &e.to_string()))
    }

    /// GET a collection endpoint and return its embedded elements.
    async fn fetch_elements(&self, path: &str) -> Result<Value> {
        let response = self.request(Method::GET, path, None, None).await?;
        Ok(Value::Array(hal::elements(&response)))
    }

    // --- Pagination walker ---

    /// Walk a collection endpoint page by page until exhausted.
    ///
    /// Stops on the first empty page even when `total` claims more, as a
    /// defense against inconsistent server state. Results keep arrival
    /// order and are never deduplicated.
    async fn walk(&self, path: &str, extra: &[(String, String)]) -> Result<Vec<Value>> {
        let mut all = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let mut params = vec![
                ("pageSize".to_string(), WALK_PAGE_SIZE.to_string()),
                ("offset".to_string(), offset.to_string()),
            ];
            params.extend_from_slice(extra);

            let response = self.request(Method::GET, path, Some(&params), None).await?;
            let elements = hal::elements(&response);
            if elements.is_empty() {
                break;
            }
            all.extend(elements);

            let total = hal::total(&response);
            if offset + WALK_PAGE_SIZE >= total {
                break;
            }
            offset += WALK_PAGE_SIZE;
        }
        Ok(all)
    }

    // --- Projects ---

    /// List projects. With `paginate`, all pages are walked; otherwise a
    /// single page (the service's default size) is returned.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn get_projects(&self, paginate: bool) -> Result<Vec<Value>> {
        if paginate {
            return self.walk("/projects", &[]).await;
        }
        let response = self.request(Method::GET, "/projects", None, None).await?;
        Ok(hal::elements(&response))
    }

    /// Create a project.
    ///
    /// # Errors
    /// Returns an error if validation or the request fails.
    pub async fn create_project(&self, request: &ProjectCreateRequest) -> Result<Value> {
        let payload = request.payload();
        self.request(Method::POST, "/projects", None, Some(&payload))
            .await
    }

    /// List the members of a project.
    ///
    /// # Errors
    /// Returns an error if the ID is not positive or the request fails.
    pub async fn get_project_memberships(&self, project_id: i64) -> Result<Vec<Value>> {
        check_id("project ID", project_id)?;
        let response = self
            .fetch_elements(&format!("/projects/{project_id}/memberships"))
            .await?;
        Ok(into_array(response))
    }

    // --- Work packages ---

    /// List the work packages of a project, optionally walking all pages.
    ///
    /// # Errors
    /// Returns an error if the ID is not positive or the request fails.
    pub async fn get_work_packages(&self, project_id: i64, paginate: bool) -> Result<Vec<Value>> {
        check_id("project ID", project_id)?;
        let path = format!("/projects/{project_id}/work_packages");
        if paginate {
            return self.walk(&path, &[]).await;
        }
        let response = self.request(Method::GET, &path, None, None).await?;
        Ok(hal::elements(&response))
    }

    /// Fetch a single work package by ID.
    ///
    /// # Errors
    /// Returns an error if the ID is not positive or the request fails.
    pub async fn get_work_package(&self, work_package_id: i64) -> Result<Value> {
        check_id("work package ID", work_package_id)?;
        self.request(
            Method::GET,
            &format!("/work_packages/{work_package_id}"),
            None,
            None,
        )
        .await
    }

    /// Create a work package.
    ///
    /// # Errors
    /// Returns an error if validation or the request fails.
    pub async fn create_work_package(&self, request: &WorkPackageCreateRequest) -> Result<Value> {
        let payload = request.payload()?;
        self.request(Method::POST, "/work_packages", None, Some(&payload))
            .await
    }

    /// Search work packages with structured criteria.
    ///
    /// Returns the full collection envelope (one page, bounded by the
    /// query's page size) so callers can read `total` and paginate
    /// themselves.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn search_work_packages(&self, query: &WorkPackageQuery) -> Result<Value> {
        let params = query.to_params();
        self.request(Method::GET, "/work_packages", Some(&params), None)
            .await
    }

    /// Update a work package using the optimistic-locking protocol.
    ///
    /// The sequence is always fetch-then-patch: the current entity is
    /// read to obtain its `lockVersion`, the delta of supplied fields
    /// plus the token is built, and only then is the PATCH dispatched.
    /// A concurrent writer between the two steps makes the server reject
    /// the stale token; that conflict surfaces as a `Protocol` error and
    /// is never retried here.
    ///
    /// # Errors
    /// - `ApiError::Validation` if the ID is not positive, the update is
    ///   empty, or a supplied field is malformed (all before any request)
    /// - `ApiError::State` if the current entity carries no lock version
    /// - `ApiError::Protocol` / `ApiError::Transport` from dispatch
    pub async fn update_work_package(
        &self,
        work_package_id: i64,
        update: &WorkPackageUpdate,
    ) -> Result<Value> {
        check_id("work package ID", work_package_id)?;
        if update.is_empty() {
            return Err(ApiError::Validation(
                "no updates provided; specify at least one field to update".to_string(),
            ));
        }
        update.validate()?;

        let current = self.get_work_package(work_package_id).await?;
        let lock_version = current
            .get("lockVersion")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                ApiError::State(format!(
                    "unable to determine lock version for work package {work_package_id}; \
                     it may not exist"
                ))
            })?;

        let payload = update.payload(lock_version)?;
        self.request(
            Method::PATCH,
            &format!("/work_packages/{work_package_id}"),
            None,
            Some(&payload),
        )
        .await
    }

    /// Add a comment to a work package's activity stream.
    ///
    /// # Errors
    /// Returns an error if the ID is not positive, the comment is empty,
    /// or the request fails.
    pub async fn add_comment(&self, work_package_id: i64, comment: &str) -> Result<Value> {
        check_id("work package ID", work_package_id)?;
        if comment.trim().is_empty() {
            return Err(ApiError::Validation(
                "comment cannot be empty".to_string(),
            ));
        }
        let payload = json!({ "comment": { "raw": comment } });
        self.request(
            Method::POST,
            &format!("/work_packages/{work_package_id}/activities"),
            None,
            Some(&payload),
        )
        .await
    }

    /// Fetch the activity history of a work package (comments, status
    /// changes, field updates).
    ///
    /// # Errors
    /// Returns an error if the ID is not positive or the request fails.
    pub async fn get_activities(&self, work_package_id: i64) -> Result<Vec<Value>> {
        check_id("work package ID", work_package_id)?;
        let response = self
            .fetch_elements(&format!("/work_packages/{work_package_id}/activities"))
            .await?;
        Ok(into_array(response))
    }

    // --- Relations ---

    /// Create a relation between two work packages.
    ///
    /// # Errors
    /// Returns an error if validation or the request fails.
    pub async fn create_relation(&self, request: &RelationCreateRequest) -> Result<Value> {
        let payload = request.payload()?;
        self.request(
            Method::POST,
            &format!("/work_packages/{}/relations", request.from_id),
            None,
            Some(&payload),
        )
        .await
    }

    /// List all relations of a work package.
    ///
    /// # Errors
    /// Returns an error if the ID is not positive or the request fails.
    pub async fn get_relations(&self, work_package_id: i64) -> Result<Vec<Value>> {
        check_id("work package ID", work_package_id)?;
        let response = self
            .fetch_elements(&format!("/work_packages/{work_package_id}/relations"))
            .await?;
        Ok(into_array(response))
    }

    /// Delete a relation by its ID.
    ///
    /// # Errors
    /// Returns an error if the ID is not positive or the request fails.
    pub async fn delete_relation(&self, relation_id: i64) -> Result<Value> {
        check_id("relation ID", relation_id)?;
        self.request(
            Method::DELETE,
            &format!("/relations/{relation_id}"),
            None,
            None,
        )
        .await
    }

    // --- Users ---

    /// List users, optionally filtered by exact email address.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn get_users(&self, email: Option<&str>) -> Result<Vec<Value>> {
        let params = email.map(|email| {
            vec![(
                "filters".to_string(),
                Value::Array(vec![filter("email", "=", &[email])]).to_string(),
            )]
        });
        let response = self
            .request(Method::GET, "/users", params.as_deref(), None)
            .await?;
        Ok(hal::elements(&response))
    }

    /// Fetch a single user by ID.
    ///
    /// # Errors
    /// Returns an error if the ID is not positive or the request fails.
    pub async fn get_user(&self, user_id: i64) -> Result<Value> {
        check_id("user ID", user_id)?;
        self.request(Method::GET, &format!("/users/{user_id}"), None, None)
            .await
    }

    /// Best-effort lookup of a user by email address.
    ///
    /// Returns the first match, or `None` when there is no match or the
    /// lookup fails; callers treat absence and failure the same way.
    pub async fn find_user_by_email(&self, email: &str) -> Option<Value> {
        match self.get_users(Some(email)).await {
            Ok(users) => users.into_iter().next(),
            Err(error) => {
                debug!(email, %error, "user lookup failed");
                None
            }
        }
    }

    /// Assign a work package to the user with the given email address.
    ///
    /// Runs the normal optimistic-locking update once the user is
    /// resolved.
    ///
    /// # Errors
    /// Returns `ApiError::State` if no user matches the email, plus any
    /// error from the update itself.
    pub async fn assign_work_package_by_email(
        &self,
        work_package_id: i64,
        email: &str,
    ) -> Result<Value> {
        check_id("work package ID", work_package_id)?;
        let user = self
            .find_user_by_email(email)
            .await
            .ok_or_else(|| ApiError::State(format!("no user found with email '{email}'")))?;
        let user_id = user.get("id").and_then(Value::as_i64).ok_or_else(|| {
            ApiError::State(format!("user record for '{email}' carries no ID"))
        })?;

        let update = WorkPackageUpdate::new().assignee(user_id);
        self.update_work_package(work_package_id, &update).await
    }

    // --- Reference data (cached) ---

    /// List work package types. Served from the cache unless `use_cache`
    /// is false or the entry is stale.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn get_types(&self, use_cache: bool) -> Result<Vec<Value>> {
        self.reference_data("work_package_types", "/types", use_cache)
            .await
    }

    /// List work package statuses.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn get_statuses(&self, use_cache: bool) -> Result<Vec<Value>> {
        self.reference_data("work_package_statuses", "/statuses", use_cache)
            .await
    }

    /// List priorities.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn get_priorities(&self, use_cache: bool) -> Result<Vec<Value>> {
        self.reference_data("priorities", "/priorities", use_cache)
            .await
    }

    async fn reference_data(
        &self,
        key: &str,
        path: &str,
        use_cache: bool,
    ) -> Result<Vec<Value>> {
        let value = if use_cache {
            self.cache
                .get_or_fetch(key, || self.fetch_elements(path))
                .await?
        } else {
            self.fetch_elements(path).await?
        };
        Ok(into_array(value))
    }

    /// Drop one cached reference-data collection.
    pub async fn invalidate_cache(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// Drop all cached reference data.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    // --- Connectivity ---

    /// Probe the API root endpoint.
    ///
    /// Never returns an error; failures are folded into the status value
    /// so health checks can render them.
    pub async fn test_connection(&self) -> ConnectionStatus {
        match self.request(Method::GET, "/", None, None).await {
            Ok(response) => ConnectionStatus {
                success: true,
                message: "Connection successful".to_string(),
                version: response
                    .get("coreVersion")
                    .and_then(Value::as_str)
                    .map(String::from),
            },
            Err(error) => ConnectionStatus {
                success: false,
                message: format!("Connection failed: {error}"),
                version: None,
            },
        }
    }
}

fn check_id(name: &str, id: i64) -> Result<()> {
    if id > 0 {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "{name} must be a positive integer"
        )))
    }
}

fn into_array(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> OpenProjectClient {
        let settings =
            Settings::new("http://localhost:9999", "0123456789abcdef0123456789abcdef").unwrap();
        OpenProjectClient::new(&settings).unwrap()
    }

    #[tokio::test]
    async fn test_empty_update_rejected_locally() {
        let client = test_client();
        // Port 9999 is not listening; a Validation error proves no
        // request was attempted.
        let result = client
            .update_work_package(1, &WorkPackageUpdate::new())
            .await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn test_invalid_update_fields_rejected_locally() {
        let client = test_client();
        let update = WorkPackageUpdate::new().due_date("not-a-date");
        let result = client.update_work_package(1, &update).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn test_nonpositive_ids_rejected_locally() {
        let client = test_client();
        assert!(matches!(
            client.get_work_package(0).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            client.get_work_packages(-3, false).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            client.delete_relation(0).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_comment_rejected_locally() {
        let client = test_client();
        let result = client.add_comment(1, "   ").await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn test_operations_after_close_fail_cleanly() {
        let client = test_client();
        client.close();
        assert!(client.is_closed());

        let result = client.get_projects(false).await;
        assert!(matches!(result, Err(ApiError::State(_))));
    }
}
