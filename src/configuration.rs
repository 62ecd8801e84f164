//! Configuration for generating multiversion tasks.
//!
//! Options are read from the expansions file evergreen writes for the generating task. Values
//! in that file are usually strings, so numeric options accept either form.

use std::{convert::TryFrom, fmt, path::Path, path::PathBuf};

use anyhow::{bail, Result};
use serde::{de::Error, Deserialize, Deserializer};

use crate::utils::task_name::remove_gen_suffix;

/// Expansions that must be present to generate tasks.
pub const REQUIRED_CONFIG_KEYS: &[&str] = &[
    "build_variant",
    "fallback_num_sub_suites",
    "project",
    "task_id",
    "task_name",
    "use_multiversion",
];

const DEFAULT_GENERATED_CONFIG_DIR: &str = "generated_resmoke_config";
const DEFAULT_TEST_SUITES_DIR: &str = "buildscripts/resmokeconfig/suites";
const DEFAULT_RESMOKE_COMMAND: &str = "python buildscripts/resmoke.py";
const DEFAULT_TARGET_RESMOKE_TIME_MINS: u64 = 60;
const DEFAULT_MAX_SUB_SUITES: usize = 5;
const DEFAULT_MAX_TESTS_PER_SUITE: usize = 100;

/// Expansions from evergreen to determine settings for how tasks should be generated.
///
/// Every key is optional here so that all missing required keys can be reported together.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EvgExpansions {
    /// Build variant to generate tasks for.
    #[serde(deserialize_with = "deserialize_scalar_string")]
    pub build_variant: Option<String>,
    /// Number of sub-suites to split into when no runtime history is available.
    #[serde(deserialize_with = "deserialize_scalar_u64")]
    pub fallback_num_sub_suites: Option<u64>,
    /// Evergreen project being run.
    #[serde(deserialize_with = "deserialize_scalar_string")]
    pub project: Option<String>,
    /// ID of the evergreen task doing the generation.
    #[serde(deserialize_with = "deserialize_scalar_string")]
    pub task_id: Option<String>,
    /// Name of the evergreen task doing the generation.
    #[serde(deserialize_with = "deserialize_scalar_string")]
    pub task_name: Option<String>,
    /// Location of the multiversion binaries.
    #[serde(deserialize_with = "deserialize_scalar_string")]
    pub use_multiversion: Option<String>,
    /// Resmoke suite to generate tasks for.
    #[serde(deserialize_with = "deserialize_scalar_string")]
    pub suite: Option<String>,
    /// Arguments to pass to every resmoke invocation.
    #[serde(deserialize_with = "deserialize_scalar_string")]
    pub resmoke_args: Option<String>,
    /// Command used to invoke resmoke.
    #[serde(deserialize_with = "deserialize_scalar_string")]
    pub resmoke_command: Option<String>,
    /// Directory to write generated configuration to.
    #[serde(deserialize_with = "deserialize_scalar_string")]
    pub generated_config_dir: Option<String>,
    /// Directory containing resmoke suite definitions.
    #[serde(deserialize_with = "deserialize_scalar_string")]
    pub test_suites_dir: Option<String>,
    /// Target runtime of each sub-suite, in minutes.
    #[serde(deserialize_with = "deserialize_scalar_u64")]
    pub target_resmoke_time: Option<u64>,
    /// Max number of sub-suites to split a suite into.
    #[serde(deserialize_with = "deserialize_scalar_u64")]
    pub max_sub_suites: Option<u64>,
    /// Max number of tests to put in a single sub-suite.
    #[serde(deserialize_with = "deserialize_scalar_u64")]
    pub max_tests_per_suite: Option<u64>,
}

impl EvgExpansions {
    /// Read evergreen expansions from the given yaml file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to YAML file to read.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Required keys that were not provided, in the order of `REQUIRED_CONFIG_KEYS`.
    fn missing_keys(&self) -> Vec<&'static str> {
        let present = [
            self.build_variant.is_some(),
            self.fallback_num_sub_suites.is_some(),
            self.project.is_some(),
            self.task_id.is_some(),
            self.task_name.is_some(),
            self.use_multiversion.is_some(),
        ];
        REQUIRED_CONFIG_KEYS
            .iter()
            .zip(present)
            .filter(|(_, present)| !*present)
            .map(|(key, _)| *key)
            .collect()
    }
}

/// A scalar expansion value. Evergreen writes most values as strings but hand written
/// expansion files often do not quote numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScalarValue {
    Integer(i64),
    Float(f64),
    Flag(bool),
    Text(String),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Integer(n) => write!(f, "{}", n),
            ScalarValue::Float(n) => write!(f, "{}", n),
            ScalarValue::Flag(b) => write!(f, "{}", b),
            ScalarValue::Text(s) => write!(f, "{}", s),
        }
    }
}

fn deserialize_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<ScalarValue> = Option::deserialize(deserializer)?;
    Ok(value.map(|v| v.to_string()))
}

fn deserialize_scalar_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<ScalarValue> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(ScalarValue::Integer(n)) => u64::try_from(n)
            .map(Some)
            .map_err(|_| {
                D::Error::custom(format!("expected an unsigned integer, found '{}'", n))
            }),
        Some(ScalarValue::Text(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected an integer, found '{}'", s))),
        Some(other) => Err(D::Error::custom(format!(
            "expected an integer, found '{}'",
            other
        ))),
    }
}

/// Options controlling how tasks are generated.
#[derive(Debug, Clone)]
pub struct ConfigOptions {
    /// Build variant to generate tasks for.
    pub build_variant: String,
    /// Number of sub-suites to split into when no runtime history is available.
    pub fallback_num_sub_suites: usize,
    /// Evergreen project being run.
    pub project: String,
    /// ID of the evergreen task doing the generation.
    pub task_id: String,
    /// Name of the evergreen task doing the generation.
    pub task_name: String,
    /// Location of the multiversion binaries as provided by evergreen.
    pub use_multiversion: String,
    /// Resmoke suite the generated tasks are based on.
    pub suite: String,
    /// Arguments to pass to every resmoke invocation.
    pub resmoke_args: String,
    /// Command used to invoke resmoke.
    pub resmoke_command: String,
    /// Directory to write generated configuration to.
    pub generated_config_dir: PathBuf,
    /// Directory containing resmoke suite definitions.
    pub test_suites_dir: PathBuf,
    /// Target runtime of each sub-suite, in minutes.
    pub target_resmoke_time: u64,
    /// Max number of sub-suites to split a suite into.
    pub max_sub_suites: usize,
    /// Max number of tests to put in a single sub-suite.
    pub max_tests_per_suite: usize,
}

impl ConfigOptions {
    /// Read configuration options from the given expansions file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to YAML file to read.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        Self::from_expansions(EvgExpansions::from_yaml_file(path)?)
    }

    /// Build configuration options from evergreen expansions.
    ///
    /// # Arguments
    ///
    /// * `expansions` - Expansions to build options from.
    pub fn from_expansions(expansions: EvgExpansions) -> Result<Self> {
        let missing_keys = expansions.missing_keys();
        if !missing_keys.is_empty() {
            bail!(
                "Missing required configuration keys: {}",
                missing_keys.join(", ")
            );
        }

        let EvgExpansions {
            build_variant: Some(build_variant),
            fallback_num_sub_suites: Some(fallback_num_sub_suites),
            project: Some(project),
            task_id: Some(task_id),
            task_name: Some(task_name),
            use_multiversion: Some(use_multiversion),
            suite,
            resmoke_args,
            resmoke_command,
            generated_config_dir,
            test_suites_dir,
            target_resmoke_time,
            max_sub_suites,
            max_tests_per_suite,
        } = expansions
        else {
            bail!("Missing required configuration keys");
        };

        if fallback_num_sub_suites == 0 {
            bail!("'fallback_num_sub_suites' must be greater than 0");
        }

        let suite = suite.unwrap_or_else(|| remove_gen_suffix(&task_name).to_string());

        Ok(Self {
            build_variant,
            fallback_num_sub_suites: fallback_num_sub_suites as usize,
            project,
            task_id,
            use_multiversion,
            suite,
            resmoke_args: resmoke_args.unwrap_or_default(),
            resmoke_command: resmoke_command
                .unwrap_or_else(|| DEFAULT_RESMOKE_COMMAND.to_string()),
            generated_config_dir: PathBuf::from(
                generated_config_dir.unwrap_or_else(|| DEFAULT_GENERATED_CONFIG_DIR.to_string()),
            ),
            test_suites_dir: PathBuf::from(
                test_suites_dir.unwrap_or_else(|| DEFAULT_TEST_SUITES_DIR.to_string()),
            ),
            target_resmoke_time: target_resmoke_time.unwrap_or(DEFAULT_TARGET_RESMOKE_TIME_MINS),
            max_sub_suites: max_sub_suites
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_MAX_SUB_SUITES),
            max_tests_per_suite: max_tests_per_suite
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_MAX_TESTS_PER_SUITE),
            task_name,
        })
    }

    /// Name of the task being generated, without the `_gen` suffix.
    pub fn task(&self) -> &str {
        remove_gen_suffix(&self.task_name)
    }

    /// Path generated sub-suite files are referenced by in generated tasks.
    ///
    /// # Arguments
    ///
    /// * `suite_name` - Name of generated suite.
    pub fn generated_suite_path(&self, suite_name: &str) -> PathBuf {
        let mut path = self.generated_config_dir.clone();
        path.push(format!("{}.yml", suite_name));
        path
    }
}
