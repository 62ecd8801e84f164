//! Client for the evergreen REST API.
//!
//! Only the two queries needed for generation are supported: looking up the executions of a
//! task and querying the historic runtime statistics of tests.
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    header::{HeaderMap, LINK},
    StatusCode,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use tracing::{event, warn, Level};

use crate::evergreen_names::{MAINLINE_REQUESTER, TASK_STATUS_SUCCESS};

const DEFAULT_API_SERVER_HOST: &str = "https://evergreen.mongodb.com/api";
const MAX_RETRIES: u32 = 3;
const TEST_STATS_PAGE_LIMIT: usize = 1000;
/// Number of days test statistics are grouped over.
pub const LOOKBACK_DURATION_DAYS: i64 = 14;

/// Authentication details for the evergreen API.
#[derive(Debug, Clone, Deserialize)]
pub struct EvgAuth {
    /// Evergreen user to authenticate as.
    pub user: String,
    /// API key of the evergreen user.
    pub api_key: String,
    /// Base url of the evergreen API.
    #[serde(default = "default_api_server_host")]
    pub api_server_host: String,
}

fn default_api_server_host() -> String {
    DEFAULT_API_SERVER_HOST.to_string()
}

impl EvgAuth {
    /// Read evergreen authentication from the given yaml file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to YAML file to read.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }
}

/// A single execution of an evergreen task.
#[derive(Debug, Clone, Deserialize)]
pub struct EvgTaskExecution {
    /// Execution number.
    pub execution: u64,
    /// Status of the execution.
    pub status: String,
}

/// An evergreen task along with its earlier executions.
#[derive(Debug, Clone, Deserialize)]
pub struct EvgTaskInfo {
    /// Execution number of the current execution.
    pub execution: u64,
    /// Earlier executions of the task.
    #[serde(default)]
    pub previous_executions: Vec<EvgTaskExecution>,
}

/// Historic statistics of a test as reported by evergreen.
#[derive(Debug, Clone, Deserialize)]
pub struct EvgTestStats {
    /// Test file, or `<test file>:<hook>` for hooks.
    pub test_file: String,
    /// Average duration of passing runs, in seconds.
    pub avg_duration_pass: f64,
    /// Number of passing runs.
    #[serde(default)]
    pub num_pass: u64,
}

/// A service for querying the evergreen API.
#[async_trait]
pub trait EvgApiService: Send + Sync {
    /// Get the given task including all of its executions.
    ///
    /// # Arguments
    ///
    /// * `task_id` - ID of task to query.
    async fn get_task(&self, task_id: &str) -> Result<EvgTaskInfo>;

    /// Get historic test statistics for a task.
    ///
    /// # Arguments
    ///
    /// * `project` - Evergreen project to query.
    /// * `build_variant` - Build variant to query.
    /// * `task` - Name of task to query.
    /// * `start` - Start of window to query.
    /// * `end` - End of window to query.
    ///
    /// # Returns
    ///
    /// Statistics for each test that ran in the window. Empty if evergreen could not provide
    /// any statistics.
    async fn get_test_stats(
        &self,
        project: &str,
        build_variant: &str,
        task: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EvgTestStats>>;
}

/// Build a http client that retries transient failures.
pub fn build_retryable_client() -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);
    ClientBuilder::new(reqwest::Client::new())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

/// Implementation of the evergreen API service.
pub struct EvgApiServiceImpl {
    client: ClientWithMiddleware,
    auth: EvgAuth,
}

impl EvgApiServiceImpl {
    /// Create a new instance of the evergreen API service.
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client to issue requests with.
    /// * `auth` - Evergreen authentication details.
    pub fn new(client: ClientWithMiddleware, auth: EvgAuth) -> Self {
        Self { client, auth }
    }

    fn build_url(&self, endpoint: &str) -> String {
        format!(
            "{}/rest/v2/{}",
            self.auth.api_server_host.trim_end_matches('/'),
            endpoint
        )
    }

    fn authed_get(&self, url: &str) -> RequestBuilder {
        self.client
            .get(url)
            .header("Api-User", &self.auth.user)
            .header("Api-Key", &self.auth.api_key)
    }
}

#[async_trait]
impl EvgApiService for EvgApiServiceImpl {
    async fn get_task(&self, task_id: &str) -> Result<EvgTaskInfo> {
        let url = self.build_url(&format!("tasks/{}", task_id));
        let response = self
            .authed_get(&url)
            .query(&[("fetch_all_executions", "true")])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<EvgTaskInfo>().await?)
    }

    async fn get_test_stats(
        &self,
        project: &str,
        build_variant: &str,
        task: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EvgTestStats>> {
        let url = self.build_url(&format!("projects/{}/test_stats", project));
        let after_date = start.format("%Y-%m-%d").to_string();
        let before_date = end.format("%Y-%m-%d").to_string();
        let group_num_days = LOOKBACK_DURATION_DAYS.to_string();
        let limit = TEST_STATS_PAGE_LIMIT.to_string();
        let mut response = self
            .authed_get(&url)
            .query(&[
                ("after_date", after_date.as_str()),
                ("before_date", before_date.as_str()),
                ("group_num_days", group_num_days.as_str()),
                ("variants", build_variant),
                ("tasks", task),
                ("requesters", MAINLINE_REQUESTER),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        let mut stats = vec![];
        let mut n_pages = 0;
        loop {
            if response.status() == StatusCode::SERVICE_UNAVAILABLE {
                warn!(
                    project,
                    build_variant,
                    task,
                    page = n_pages,
                    "Evergreen test stats are unavailable"
                );
                return Ok(vec![]);
            }

            let response_ok = response.error_for_status()?;
            let next_url = next_page_url(response_ok.headers());
            stats.extend(response_ok.json::<Vec<EvgTestStats>>().await?);
            n_pages += 1;

            match next_url {
                Some(next_url) => response = self.authed_get(&next_url).send().await?,
                None => break,
            }
        }

        event!(
            Level::INFO,
            task,
            build_variant,
            n_pages,
            n_stats = stats.len(),
            "Fetched test stats"
        );
        Ok(stats)
    }
}

/// Get the url of the next page of a paginated response.
///
/// Evergreen points to the next page with a `Link: <url>; rel="next"` header.
fn next_page_url(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let url = parts
            .next()?
            .trim()
            .strip_prefix('<')?
            .strip_suffix('>')?
            .to_string();
        if parts.any(|p| matches!(p.trim(), "rel=\"next\"" | "rel=next")) {
            Some(url)
        } else {
            None
        }
    })
}

/// Determine whether tasks should be generated for the given task.
///
/// Tasks are not generated if an earlier execution of the task already succeeded, since the
/// generated configuration has already been handed to evergreen.
///
/// # Arguments
///
/// * `evg_api` - Service to query evergreen with.
/// * `task_id` - ID of task doing the generation.
///
/// # Returns
///
/// true if tasks should be generated.
pub async fn should_tasks_be_generated(
    evg_api: &dyn EvgApiService,
    task_id: &str,
) -> Result<bool> {
    let task = evg_api.get_task(task_id).await?;
    let previous_success = task
        .previous_executions
        .iter()
        .find(|e| e.execution < task.execution && e.status == TASK_STATUS_SUCCESS);

    if let Some(execution) = previous_success {
        event!(
            Level::INFO,
            task_id,
            execution = execution.execution,
            "Found a previous successful execution"
        );
        return Ok(false);
    }

    Ok(true)
}
