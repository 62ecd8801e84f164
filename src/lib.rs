//! Entry point into the multiversion task generation logic.
//!
//! A resmoke suite is split into sub-suites based on historic test runtimes. Every sub-suite,
//! along with a `_misc` suite for the remaining tests, is then run against each mixed version
//! cluster configuration that applies to the shape of the suite. The generated evergreen
//! configuration is written to disk for evergreen to pick up with `generate.tasks`.
#![cfg_attr(feature = "strict", deny(missing_docs))]

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use chrono::{Duration, SubsecRound, Utc};
use evergreen::evg_api::{
    build_retryable_client, should_tasks_be_generated, EvgApiService, EvgApiServiceImpl,
    LOOKBACK_DURATION_DAYS,
};
use evergreen_names::BURN_IN_PREFIX;
use resmoke::resmoke_proxy::{ResmokeProxy, TestDiscovery};
use shrub_rs::models::project::EvgProject;
use task_types::{
    multiversion_tasks::MultiversionTaskBuilder,
    resmoke_config_writer::{ResmokeConfigWriter, ResmokeConfigWriterImpl},
    resmoke_tasks::{SubSuite, SubSuiteParams, SubSuiteService, SubSuiteServiceImpl},
};
use tracing::{event, Level};
use utils::{
    fs_service::{FsService, FsServiceImpl},
    task_name::name_generated_task,
};

pub use configuration::ConfigOptions;
pub use evergreen::evg_api::EvgAuth;

pub mod configuration;
mod evergreen;
mod evergreen_names;
mod resmoke;
mod task_types;
mod utils;

const SECONDS_PER_MINUTE: f64 = 60.0;

/// Collection of services needed for generation.
#[derive(Clone)]
pub struct Dependencies {
    evg_api: Arc<dyn EvgApiService>,
    test_discovery: Arc<dyn TestDiscovery>,
    sub_suite_service: Arc<dyn SubSuiteService>,
    config_writer: Arc<dyn ResmokeConfigWriter>,
    fs_service: Arc<dyn FsService>,
}

impl Dependencies {
    /// Create a new set of dependency instances.
    ///
    /// # Arguments
    ///
    /// * `options` - Options controlling how generation takes place.
    /// * `evg_auth` - Authentication for the evergreen API.
    ///
    /// # Returns
    ///
    /// A set of dependencies to run against.
    pub fn new(options: &ConfigOptions, evg_auth: EvgAuth) -> Self {
        let fs_service = Arc::new(FsServiceImpl::new());
        let evg_api = Arc::new(EvgApiServiceImpl::new(build_retryable_client(), evg_auth));
        let test_discovery = Arc::new(ResmokeProxy::new(
            &options.resmoke_command,
            options.test_suites_dir.clone(),
        ));
        let sub_suite_service = Arc::new(SubSuiteServiceImpl::new(
            evg_api.clone(),
            test_discovery.clone(),
            fs_service.clone(),
            SubSuiteParams {
                suite_name: options.suite.clone(),
                task_name: options.task().to_string(),
                build_variant: options.build_variant.clone(),
                project: options.project.clone(),
                target_runtime_secs: options.target_resmoke_time as f64 * SECONDS_PER_MINUTE,
                max_sub_suites: options.max_sub_suites,
                max_tests_per_suite: options.max_tests_per_suite,
                fallback_num_sub_suites: options.fallback_num_sub_suites,
            },
        ));
        let config_writer = Arc::new(ResmokeConfigWriterImpl::new(
            fs_service.clone(),
            options.generated_config_dir.clone(),
        ));

        Self {
            evg_api,
            test_discovery,
            sub_suite_service,
            config_writer,
            fs_service,
        }
    }
}

/// A single test to generate burn_in tasks for.
#[derive(Debug, Clone)]
pub struct BurnInTest {
    /// Test file to run.
    pub test_name: String,
    /// Index used to name the generated tasks.
    pub task_index: usize,
}

/// Result of a generation run.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// Configuration was already generated by an earlier execution, nothing was written.
    Skipped,
    /// Configuration was generated and written to the given file.
    Persisted(PathBuf),
}

/// Generator of multiversion tasks for a single resmoke suite.
pub struct MultiversionGenerator {
    deps: Dependencies,
    options: ConfigOptions,
}

impl MultiversionGenerator {
    /// Create a new generator.
    ///
    /// # Arguments
    ///
    /// * `deps` - Services to generate with.
    /// * `options` - Options controlling how generation takes place.
    pub fn new(deps: Dependencies, options: ConfigOptions) -> Self {
        Self { deps, options }
    }

    /// Generate the multiversion tasks and write their configuration to disk.
    ///
    /// Nothing is generated if an earlier execution of the generating task already succeeded.
    pub async fn run(&self) -> Result<GenerationOutcome> {
        let should_generate =
            should_tasks_be_generated(self.deps.evg_api.as_ref(), &self.options.task_id).await?;
        if !should_generate {
            event!(
                Level::INFO,
                task_id = self.options.task_id.as_str(),
                "Not generating configuration due to previous successful generation"
            );
            return Ok(GenerationOutcome::Skipped);
        }

        let evg_project = self.generate_evg_tasks(None).await?;
        let config_file = self.write_evergreen_config(&evg_project)?;
        Ok(GenerationOutcome::Persisted(config_file))
    }

    /// Split the suite, write the sub-suite files and build the evergreen tasks to run them.
    ///
    /// # Arguments
    ///
    /// * `burn_in_test` - If provided, generate tasks running only this test, one per version
    ///    combination. No display task is created in this case.
    ///
    /// # Returns
    ///
    /// Evergreen configuration for the generated tasks.
    pub async fn generate_evg_tasks(
        &self,
        burn_in_test: Option<&BurnInTest>,
    ) -> Result<EvgProject> {
        let end_date = Utc::now().trunc_subsecs(0);
        let start_date = end_date - Duration::days(LOOKBACK_DURATION_DAYS);
        let sub_suites = self
            .deps
            .sub_suite_service
            .calculate_suites(start_date, end_date)
            .await?;

        let origin_config = self
            .deps
            .test_discovery
            .get_suite_config(&self.options.suite)?;
        let shape = origin_config.get_suite_shape()?;
        let suite_files = self.deps.config_writer.write_suite_files(
            &origin_config,
            shape,
            &sub_suites,
            &self.options.suite,
        )?;
        event!(
            Level::INFO,
            suite = self.options.suite.as_str(),
            suite_files = ?suite_files,
            "Wrote generated suite files"
        );

        let task = self.options.task();
        let mut builder = MultiversionTaskBuilder::new(
            &self.options.build_variant,
            &self.options.resmoke_args,
            task,
        );

        if let Some(burn_in_test) = burn_in_test {
            let burn_in_task = format!("{}:{}", BURN_IN_PREFIX, task);
            let source_suite = self.burn_in_source_suite(&sub_suites);
            for combination in shape.version_combinations() {
                builder.generate_sub_task(
                    combination,
                    &burn_in_task,
                    burn_in_test.task_index,
                    &source_suite,
                    1,
                    Some(&burn_in_test.test_name),
                );
            }
        } else {
            let misc_suite =
                self.suite_file(&name_generated_task(&self.options.suite, None, 1, None));
            let mut index = 0;
            for combination in shape.version_combinations() {
                for sub_suite in &sub_suites {
                    builder.generate_sub_task(
                        combination,
                        task,
                        index,
                        &self.suite_file(&sub_suite.name),
                        sub_suites.len(),
                        None,
                    );
                    index += 1;
                }

                builder.generate_sub_task(combination, task, index, &misc_suite, 1, None);
                index += 1;
            }
            builder.create_display_task()?;
        }

        event!(
            Level::INFO,
            task,
            shape = ?shape,
            n_sub_suites = sub_suites.len(),
            n_tasks = builder.tasks().len(),
            burn_in = burn_in_test.is_some(),
            "Generated multiversion tasks"
        );
        Ok(builder.build())
    }

    /// Write the given evergreen configuration to `<task>.json` in the generated config dir.
    ///
    /// # Arguments
    ///
    /// * `evg_project` - Evergreen configuration to write.
    ///
    /// # Returns
    ///
    /// Path to the file that was written.
    pub fn write_evergreen_config(&self, evg_project: &EvgProject) -> Result<PathBuf> {
        let mut config_file = self.options.generated_config_dir.clone();
        config_file.push(format!("{}.json", self.options.task()));
        self.deps
            .fs_service
            .write_file(&config_file, &serde_json::to_string_pretty(evg_project)?)?;

        event!(
            Level::INFO,
            config_file = config_file.display().to_string().as_str(),
            "Wrote evergreen configuration"
        );
        Ok(config_file)
    }

    /// Path generated tasks should reference the given suite file by.
    fn suite_file(&self, suite_name: &str) -> String {
        self.options
            .generated_suite_path(suite_name)
            .display()
            .to_string()
    }

    /// Suite file burn_in tasks should run with.
    ///
    /// All generated suite files share the same executor configuration, so the first sub-suite
    /// is used. If the suite could not be split, the `_misc` suite is used instead.
    fn burn_in_source_suite(&self, sub_suites: &[SubSuite]) -> String {
        if let Some(sub_suite) = sub_suites.first() {
            self.suite_file(&sub_suite.name)
        } else {
            self.suite_file(&name_generated_task(&self.options.suite, None, 1, None))
        }
    }
}
