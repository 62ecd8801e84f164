use std::{path::PathBuf, time::Instant};

use anyhow::Result;
use cmd_lib::run_fun;
use serde::Deserialize;
use tracing::{event, Level};

use super::resmoke_suite::ResmokeSuiteConfig;

/// Interface for discovering details about test suites.
pub trait TestDiscovery: Send + Sync {
    /// Get a list of tests that belong to the given suite.
    ///
    /// # Arguments
    ///
    /// * `suite_name` - Name of test suite to query.
    ///
    /// # Returns
    ///
    /// A list of tests belonging to given suite.
    fn discover_tests(&self, suite_name: &str) -> Result<Vec<String>>;

    /// Get the configuration for the given suite.
    ///
    /// # Arguments
    ///
    /// * `suite_name` - Name of test suite to query.
    ///
    /// # Return
    ///
    /// Resmoke configuration for the given suite.
    fn get_suite_config(&self, suite_name: &str) -> Result<ResmokeSuiteConfig>;
}

/// Implementation of `TestDiscovery` that queries tests from resmoke and reads suite
/// definitions from the resmoke suite directory.
#[derive(Debug, Clone)]
pub struct ResmokeProxy {
    /// Primary command to invoke resmoke (usually `python`).
    resmoke_cmd: String,
    /// Script to invoke resmoke.
    resmoke_script: String,
    /// Directory containing resmoke suite definitions.
    suites_dir: PathBuf,
}

impl ResmokeProxy {
    /// Create a new `ResmokeProxy` instance.
    ///
    /// # Arguments
    ///
    /// * `resmoke_cmd` - Command to invoke resmoke.
    /// * `suites_dir` - Directory containing resmoke suite definitions.
    pub fn new(resmoke_cmd: &str, suites_dir: PathBuf) -> Self {
        let cmd_parts: Vec<_> = resmoke_cmd.split(' ').collect();
        let cmd = cmd_parts[0];
        let script = cmd_parts[1..].join(" ");
        Self {
            resmoke_cmd: cmd.to_string(),
            resmoke_script: script,
            suites_dir,
        }
    }
}

/// Details about tests comprising a test suite.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct TestDiscoveryOutput {
    /// Name of suite.
    pub suite_name: String,

    /// Name of tests comprising suite.
    pub tests: Vec<String>,
}

impl TestDiscovery for ResmokeProxy {
    fn discover_tests(&self, suite_name: &str) -> Result<Vec<String>> {
        let cmd = &self.resmoke_cmd;
        let script = &self.resmoke_script;
        let start = Instant::now();
        let cmd_output = run_fun!(
            $cmd $script test-discovery --suite $suite_name
        )?;
        event!(
            Level::INFO,
            suite_name,
            duration_ms = start.elapsed().as_millis() as u64,
            "Resmoke test discovery finished"
        );

        let output: TestDiscoveryOutput = serde_yaml::from_str(&cmd_output)?;
        Ok(output.tests)
    }

    fn get_suite_config(&self, suite_name: &str) -> Result<ResmokeSuiteConfig> {
        ResmokeSuiteConfig::from_suite_dir(&self.suites_dir, suite_name)
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn test_new_should_split_command_from_script() {
        let proxy = ResmokeProxy::new("python buildscripts/resmoke.py", PathBuf::from("suites"));

        assert_eq!(proxy.resmoke_cmd, "python");
        assert_eq!(proxy.resmoke_script, "buildscripts/resmoke.py");
    }

    #[test]
    fn test_get_suite_config_should_read_from_suite_dir() {
        let tmp_dir = TempDir::new("suites").unwrap();
        std::fs::write(
            tmp_dir.path().join("core_txns.yml"),
            "
test_kind: js_test
selector:
  roots:
    - jstests/core/txns/*.js
executor:
  fixture:
    class: ReplicaSetFixture
",
        )
        .unwrap();
        let proxy = ResmokeProxy::new("python resmoke.py", tmp_dir.path().to_path_buf());

        let config = proxy.get_suite_config("core_txns").unwrap();

        assert_eq!(
            config.selector.roots,
            Some(vec!["jstests/core/txns/*.js".to_string()])
        );
    }
}
