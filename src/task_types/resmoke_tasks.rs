//! Service for splitting a resmoke suite into sub-suites.
//!
//! This service will query the historic runtime of tests in the given task and then
//! use that information to divide the tests into sub-suites that can be run in parallel.
//! Tests without any runtime history are not placed in a sub-suite; they are picked up by the
//! `_misc` suite that runs everything the sub-suites do not.
use std::{
    cmp::{min, Ordering},
    sync::Arc,
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{event, warn, Level};

use crate::{
    evergreen::{evg_api::EvgApiService, evg_task_history::TaskRuntimeHistory},
    resmoke::resmoke_proxy::TestDiscovery,
    utils::{fs_service::FsService, task_name::name_generated_task},
};

/// Representation of generated sub-suite.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubSuite {
    /// Name of generated sub-suite.
    pub name: String,

    /// List of tests belonging to sub-suite.
    pub test_list: Vec<String>,
}

/// Parameters describing how a suite should be split.
#[derive(Clone, Debug, Default)]
pub struct SubSuiteParams {
    /// Name of suite being split.
    pub suite_name: String,
    /// Name of task the historic runtimes were recorded under.
    pub task_name: String,
    /// Build variant the historic runtimes were recorded on.
    pub build_variant: String,
    /// Evergreen project the historic runtimes were recorded in.
    pub project: String,
    /// Target runtime of a sub-suite, in seconds.
    pub target_runtime_secs: f64,
    /// Max number of sub-suites to create.
    pub max_sub_suites: usize,
    /// Max number of tests in a sub-suite.
    pub max_tests_per_suite: usize,
    /// Number of sub-suites to create when there is no runtime history.
    pub fallback_num_sub_suites: usize,
}

/// A service for splitting a suite into sub-suites.
#[async_trait]
pub trait SubSuiteService: Sync + Send {
    /// Split the suite into sub-suites based on test runtimes in the given window.
    ///
    /// # Arguments
    ///
    /// * `start` - Start of the window to consider runtimes from.
    /// * `end` - End of the window to consider runtimes from.
    ///
    /// # Returns
    ///
    /// A list of sub-suites in generation order.
    async fn calculate_suites(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SubSuite>>;
}

/// Implementation of service to split suites.
pub struct SubSuiteServiceImpl {
    /// Service to query evergreen.
    evg_api: Arc<dyn EvgApiService>,

    /// Test discovery service.
    test_discovery: Arc<dyn TestDiscovery>,

    /// Service to interact with file system.
    fs_service: Arc<dyn FsService>,

    /// Parameters for how the suite should be split.
    params: SubSuiteParams,
}

impl SubSuiteServiceImpl {
    /// Create a new instance of the service implementation.
    ///
    /// # Arguments
    ///
    /// * `evg_api` - An instance of the service to query evergreen.
    /// * `test_discovery` - An instance of the service to query tests belonging to a suite.
    /// * `fs_service` - An instance of the service too work with the file system.
    /// * `params` - Parameters for how the suite should be split.
    pub fn new(
        evg_api: Arc<dyn EvgApiService>,
        test_discovery: Arc<dyn TestDiscovery>,
        fs_service: Arc<dyn FsService>,
        params: SubSuiteParams,
    ) -> Self {
        Self {
            evg_api,
            test_discovery,
            fs_service,
            params,
        }
    }

    /// Get the list of tests belonging to the suite being split.
    fn get_test_list(&self) -> Result<Vec<String>> {
        Ok(self
            .test_discovery
            .discover_tests(&self.params.suite_name)?
            .into_iter()
            .filter(|s| self.fs_service.file_exists(s))
            .collect())
    }

    /// Split the tests into sub-suites based on their historic runtime.
    ///
    /// # Arguments
    ///
    /// * `test_list` - Tests belonging to the suite.
    /// * `task_stats` - Statistics on the historic runtimes of tests in the task.
    ///
    /// # Returns
    ///
    /// A list of sub-suites containing all the tests that have runtime history.
    fn split_task(&self, test_list: &[String], task_stats: &TaskRuntimeHistory) -> Vec<SubSuite> {
        let mut tests_with_runtime: Vec<(String, f64)> = test_list
            .iter()
            .filter_map(|t| task_stats.get(t).map(|h| (t.clone(), h.average_runtime)))
            .collect();
        if tests_with_runtime.is_empty() {
            return vec![];
        }
        tests_with_runtime.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(Ordering::Equal));

        let total_runtime: f64 = tests_with_runtime.iter().map(|(_, r)| r).sum();
        let num_suites = self.determine_num_suites(total_runtime, tests_with_runtime.len());
        event!(
            Level::INFO,
            suite = self.params.suite_name.as_str(),
            total_runtime,
            num_suites,
            tests = tests_with_runtime.len(),
            tests_without_runtime = test_list.len() - tests_with_runtime.len(),
            "Splitting suite by runtime"
        );

        let mut running_tests = vec![vec![]; num_suites];
        let mut running_runtimes = vec![0.0; num_suites];
        for (test, runtime) in tests_with_runtime {
            let min_idx = get_min_index(&running_runtimes);
            running_runtimes[min_idx] += runtime;
            running_tests[min_idx].push(test);
        }

        self.build_sub_suites(running_tests)
    }

    /// Determine how many sub-suites to split into.
    ///
    /// # Arguments
    ///
    /// * `total_runtime` - Total historic runtime of all tests, in seconds.
    /// * `num_tests` - Number of tests with historic runtimes.
    fn determine_num_suites(&self, total_runtime: f64, num_tests: usize) -> usize {
        let by_runtime = if self.params.target_runtime_secs > 0.0 {
            (total_runtime / self.params.target_runtime_secs).ceil() as usize
        } else {
            1
        };
        let by_test_count = if self.params.max_tests_per_suite > 0 {
            (num_tests + self.params.max_tests_per_suite - 1) / self.params.max_tests_per_suite
        } else {
            1
        };
        let upper_bound = min(self.params.max_sub_suites, num_tests).max(1);

        by_runtime.max(by_test_count).max(1).min(upper_bound)
    }

    /// Split a suite with no historic runtime information.
    ///
    /// Since we don't have any runtime information, we will just deal the tests evenly among
    /// the number of suites we want to create.
    ///
    /// # Arguments
    ///
    /// * `test_list` - Tests belonging to the suite.
    fn split_task_fallback(&self, test_list: &[String]) -> Vec<SubSuite> {
        if test_list.is_empty() {
            return vec![];
        }

        let num_suites = min(test_list.len(), self.params.fallback_num_sub_suites.max(1));
        let mut running_tests = vec![vec![]; num_suites];
        for (i, test) in test_list.iter().enumerate() {
            running_tests[i % num_suites].push(test.clone());
        }

        self.build_sub_suites(running_tests)
    }

    fn build_sub_suites(&self, test_lists: Vec<Vec<String>>) -> Vec<SubSuite> {
        let total = test_lists.len();
        test_lists
            .into_iter()
            .enumerate()
            .map(|(index, test_list)| SubSuite {
                name: name_generated_task(&self.params.suite_name, Some(index), total, None),
                test_list,
            })
            .collect()
    }
}

/// Get the index of sub suite with the least total runtime of tests.
///
/// # Arguments
///
/// * `running_runtimes` - Total runtimes of tests of sub suites.
///
/// # Returns
///
/// Index of sub suite with the least total runtime.
fn get_min_index(running_runtimes: &[f64]) -> usize {
    let mut min_idx = 0;
    for (i, value) in running_runtimes.iter().enumerate() {
        if value < &running_runtimes[min_idx] {
            min_idx = i;
        }
    }
    min_idx
}

#[async_trait]
impl SubSuiteService for SubSuiteServiceImpl {
    async fn calculate_suites(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SubSuite>> {
        let test_list = self.get_test_list()?;
        let stats = self
            .evg_api
            .get_test_stats(
                &self.params.project,
                &self.params.build_variant,
                &self.params.task_name,
                start,
                end,
            )
            .await?;
        let task_stats = TaskRuntimeHistory::from_stats(&stats);

        if task_stats.is_empty() {
            warn!(
                suite = self.params.suite_name.as_str(),
                fallback_num_sub_suites = self.params.fallback_num_sub_suites,
                "No test history, splitting suite with fallback"
            );
            return Ok(self.split_task_fallback(&test_list));
        }

        Ok(self.split_task(&test_list, &task_stats))
    }
}
