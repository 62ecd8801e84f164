//! Representation of a resmoke suite file.

use std::{collections::BTreeMap, path::Path, str::FromStr};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Error, Value};

use crate::task_types::multiversion::SuiteShape;

const SHARDED_CLUSTER_FIXTURE_NAME: &str = "ShardedClusterFixture";

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ResmokeSelector {
    /// A list of paths or glob patterns of tests to run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<Vec<String>>,
    /// A list of paths or glob patterns the tests must not be included in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_files: Option<Vec<String>>,
    /// Any other selector options, carried over untouched.
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ResmokeFixture {
    pub class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_nodes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linear_chain: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_shards: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_rs_nodes_per_shard: Option<usize>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ResmokeExecutor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixture: Option<ResmokeFixture>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// Configuration of a resmoke test suite.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ResmokeSuiteConfig {
    pub test_kind: String,
    pub selector: ResmokeSelector,
    pub executor: ResmokeExecutor,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl FromStr for ResmokeSuiteConfig {
    type Err = Error;

    /// Read Resmoke suite configuration from the given string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(s)
    }
}

impl ResmokeSuiteConfig {
    /// Read the configuration of the named suite from the given suite directory.
    ///
    /// # Arguments
    ///
    /// * `suite_dir` - Directory containing resmoke suite definitions.
    /// * `suite_name` - Name of suite to read, the file is expected at `<suite_name>.yml`.
    ///
    /// # Returns
    ///
    /// Resmoke configuration for the given suite.
    pub fn from_suite_dir(suite_dir: &Path, suite_name: &str) -> Result<Self> {
        let mut path = suite_dir.to_path_buf();
        path.push(format!("{}.yml", suite_name));
        let contents = std::fs::read_to_string(&path)?;
        Ok(Self::from_str(&contents)?)
    }

    /// Render this configuration as yaml.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Determine the shape of the cluster this suite runs against.
    ///
    /// Suites running against a `ShardedClusterFixture` are sharded, any other fixture is
    /// treated as a replica set. A suite without a fixture cannot be run in multiversion.
    pub fn get_suite_shape(&self) -> Result<SuiteShape> {
        if let Some(fixture) = &self.executor.fixture {
            if fixture.class == SHARDED_CLUSTER_FIXTURE_NAME {
                Ok(SuiteShape::Sharded)
            } else {
                Ok(SuiteShape::ReplicaSet)
            }
        } else {
            bail!("Suite does not define an executor fixture")
        }
    }

    /// Create a new resmoke suite configuration based on this one but running certain tests.
    ///
    /// # Arguments
    ///
    /// * `run_tests` - When provided, the new configuration should only run these tests.
    /// * `exclude_tests` - When provided, the new configuration should exclude these tests.
    ///
    /// # Returns
    ///
    /// New resmoke configuration with a selector based on provided parameters.
    pub fn with_new_tests(
        &self,
        run_tests: Option<&[String]>,
        exclude_tests: Option<&[String]>,
    ) -> Self {
        let mut config = self.clone();
        let mut updated_selector = self.selector.clone();
        if let Some(exclude_tests) = exclude_tests {
            let mut files_to_exclude = vec![];
            if let Some(excluded_files) = &updated_selector.exclude_files {
                files_to_exclude.extend(excluded_files.iter().cloned());
            }
            files_to_exclude.extend(exclude_tests.iter().cloned());
            updated_selector.exclude_files = Some(files_to_exclude);
        } else if let Some(run_tests) = run_tests {
            updated_selector.exclude_files = None;
            updated_selector.roots = Some(run_tests.to_vec());
        }

        config.selector = updated_selector;
        config
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    const SHARDED_SUITE: &str = "
        test_kind: js_test

        selector:
          roots:
            - jstests/sharding/*.js
          exclude_files:
            - jstests/sharding/skip.js

        executor:
          config:
            shell_options:
              nodb: ''
          fixture:
            class: ShardedClusterFixture
            num_shards: 2
            mongod_options:
              set_parameters:
                enableTestCommands: 1
    ";

    // get_suite_shape tests.
    #[test]
    fn test_sharded_cluster_fixture_should_return_sharded() {
        let config = ResmokeSuiteConfig::from_str(SHARDED_SUITE).unwrap();

        assert_eq!(config.get_suite_shape().unwrap(), SuiteShape::Sharded);
    }

    #[test]
    fn test_replica_set_fixture_should_return_replica_set() {
        let config_yaml = "
            test_kind: js_test

            selector:
              roots:
                - jstests/core/txns/*.js

            executor:
              fixture:
                class: ReplicaSetFixture
                num_nodes: 1
        ";

        let config = ResmokeSuiteConfig::from_str(config_yaml).unwrap();

        assert_eq!(config.get_suite_shape().unwrap(), SuiteShape::ReplicaSet);
    }

    #[test]
    fn test_other_fixture_should_return_replica_set() {
        let config_yaml = "
            test_kind: js_test

            selector:
              roots:
                - jstests/core/*.js

            executor:
              fixture:
                class: SomeOtherFixture
        ";

        let config = ResmokeSuiteConfig::from_str(config_yaml).unwrap();

        assert_eq!(config.get_suite_shape().unwrap(), SuiteShape::ReplicaSet);
    }

    #[test]
    fn test_no_fixture_defined_should_fail() {
        let config_yaml = "
            test_kind: js_test

            selector:
              roots:
                - jstests/auth/*.js

            executor:
              config:
                shell_options:
                  nodb: ''
        ";

        let config = ResmokeSuiteConfig::from_str(config_yaml).unwrap();

        assert!(config.get_suite_shape().is_err());
    }

    // from_suite_dir tests.
    #[test]
    fn test_from_suite_dir_should_read_named_suite() {
        let tmp_dir = TempDir::new("suites").unwrap();
        std::fs::write(tmp_dir.path().join("sharding.yml"), SHARDED_SUITE).unwrap();

        let config = ResmokeSuiteConfig::from_suite_dir(tmp_dir.path(), "sharding").unwrap();

        assert_eq!(config.test_kind, "js_test");
        assert_eq!(config.executor.fixture.unwrap().num_shards, Some(2));
    }

    #[test]
    fn test_from_suite_dir_with_missing_suite_should_fail() {
        let tmp_dir = TempDir::new("suites").unwrap();

        assert!(ResmokeSuiteConfig::from_suite_dir(tmp_dir.path(), "missing").is_err());
    }

    #[test]
    fn test_rendering_should_keep_unknown_fields() {
        let config = ResmokeSuiteConfig::from_str(SHARDED_SUITE).unwrap();

        let rendered: Value = serde_yaml::from_str(&config.to_yaml().unwrap()).unwrap();

        assert_eq!(
            rendered["executor"]["fixture"]["mongod_options"]["set_parameters"]
                ["enableTestCommands"],
            Value::from(1)
        );
        assert_eq!(
            rendered["executor"]["config"]["shell_options"]["nodb"],
            Value::from("")
        );
        assert!(rendered["executor"]["fixture"].get("num_nodes").is_none());
    }

    // with_new_tests tests
    #[test]
    fn test_with_new_tests_can_add_tests_to_exclude_list() {
        let exclude_test_list = vec!["test0.js".to_string(), "test1.js".to_string()];

        let resmoke_suite = ResmokeSuiteConfig::from_str(SHARDED_SUITE).unwrap();
        let new_config = resmoke_suite.with_new_tests(None, Some(&exclude_test_list));

        let excluded_files = new_config.selector.exclude_files.unwrap();
        assert!(excluded_files.contains(&"jstests/sharding/skip.js".to_string()));
        for test in exclude_test_list {
            assert!(excluded_files.contains(&test));
        }
        assert_eq!(
            new_config.selector.roots,
            Some(vec!["jstests/sharding/*.js".to_string()])
        );
    }

    #[test]
    fn test_with_new_tests_can_replace_roots() {
        let new_test_list = vec!["test0.js".to_string(), "test1.js".to_string()];

        let resmoke_suite = ResmokeSuiteConfig::from_str(SHARDED_SUITE).unwrap();
        let new_config = resmoke_suite.with_new_tests(Some(&new_test_list), None);

        assert_eq!(new_config.selector.roots, Some(new_test_list));
        assert!(new_config.selector.exclude_files.is_none());
    }
}
