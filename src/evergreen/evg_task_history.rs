//! Build the runtime history of tests from evergreen test stats.

use std::collections::HashMap;

use super::evg_api::EvgTestStats;

const HOOK_DELIMITER: char = ':';

/// Runtime history of a test in evergreen.
#[derive(Debug, Clone)]
pub struct TestRuntimeHistory {
    /// Average runtime of test, including the hooks that ran with it.
    pub average_runtime: f64,
}

/// Runtime history of a task from evergreen.
#[derive(Debug, Clone, Default)]
pub struct TaskRuntimeHistory {
    /// Map of test base names to the runtime history for that test.
    pub test_map: HashMap<String, TestRuntimeHistory>,
}

impl TaskRuntimeHistory {
    /// Build the runtime history from a list of stats.
    ///
    /// Stats of tests that never passed carry no usable runtime and are ignored. Hook runtimes
    /// are added to the runtime of the test they ran with.
    ///
    /// # Arguments
    ///
    /// * `stat_list` - List of stats from evergreen.
    pub fn from_stats(stat_list: &[EvgTestStats]) -> Self {
        let usable_stats: Vec<&EvgTestStats> =
            stat_list.iter().filter(|s| s.num_pass > 0).collect();
        let hook_map = gather_hook_stats(&usable_stats);
        let test_map = gather_test_stats(&usable_stats, &hook_map);

        Self { test_map }
    }

    /// Get the runtime history of the given test file.
    ///
    /// # Arguments
    ///
    /// * `test_file` - Relative path to test file.
    pub fn get(&self, test_file: &str) -> Option<&TestRuntimeHistory> {
        self.test_map.get(&get_test_name(&normalize_test_file(test_file)))
    }

    /// Whether any runtime history is available.
    pub fn is_empty(&self) -> bool {
        self.test_map.is_empty()
    }
}

/// Convert the list of stats into a map of test names to test stats.
///
/// # Arguments
///
/// * `stat_list` - List of stats.
/// * `hook_map` - Map of test names to total hook runtime of hooks that ran with the test.
///
/// # Returns
///
/// Map of test names to stats belong to that test.
fn gather_test_stats(
    stat_list: &[&EvgTestStats],
    hook_map: &HashMap<String, f64>,
) -> HashMap<String, TestRuntimeHistory> {
    let mut test_map: HashMap<String, TestRuntimeHistory> = HashMap::new();
    for stat in stat_list {
        let normalized_test_file = normalize_test_file(&stat.test_file);
        if !is_hook(&normalized_test_file) {
            let test_name = get_test_name(&normalized_test_file);
            if let Some(v) = test_map.get_mut(&test_name) {
                v.average_runtime += stat.avg_duration_pass;
            } else {
                let hook_runtime = hook_map.get(&test_name).copied().unwrap_or(0.0);
                test_map.insert(
                    test_name,
                    TestRuntimeHistory {
                        average_runtime: stat.avg_duration_pass + hook_runtime,
                    },
                );
            }
        }
    }

    test_map
}

/// Gather the total runtime of hooks in the given list by the test the hooks ran with.
///
/// # Arguments
///
/// * `stat_list` - List of stats.
///
/// # Returns
///
/// Map of test name and total runtime of hooks that ran with the test.
fn gather_hook_stats(stat_list: &[&EvgTestStats]) -> HashMap<String, f64> {
    let mut hook_map: HashMap<String, f64> = HashMap::new();
    for stat in stat_list {
        let normalized_test_file = normalize_test_file(&stat.test_file);
        if is_hook(&normalized_test_file) {
            let test_name = get_test_name(hook_test_name(&normalized_test_file));
            *hook_map.entry(test_name).or_insert(0.0) += stat.avg_duration_pass;
        }
    }
    hook_map
}

/// Determine if the given identifier is a hook.
///
/// Identifiers for hooks have a ':' in them separating the test name from the hook name.
fn is_hook(identifier: &str) -> bool {
    identifier.contains(HOOK_DELIMITER)
}

/// Get the test name part of a given hook identifier.
fn hook_test_name(identifier: &str) -> &str {
    identifier.split(HOOK_DELIMITER).next().unwrap_or(identifier)
}

/// Normalize the given test files.
///
/// Converts windows path separators (\) to unix style (/).
fn normalize_test_file(test_file: &str) -> String {
    test_file.replace('\\', "/")
}

/// Get the base name of the given test file.
///
/// # Arguments
///
/// * `test_file` - Relative path to test file.
///
/// # Returns
///
/// Base name of test file with extension removed.
pub fn get_test_name(test_file: &str) -> String {
    let s = test_file.split('/');
    s.last().unwrap_or(test_file).trim_end_matches(".js").to_string()
}
