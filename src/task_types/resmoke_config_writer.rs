//! Render and write resmoke configuration files for generated sub-suites.
//!
//! Every generated sub-suite gets a suite file running only its tests. An additional `_misc`
//! suite file runs the base suite's tests minus everything that was placed in a sub-suite,
//! which picks up tests that had no runtime history.
use std::{path::PathBuf, sync::Arc};

use anyhow::Result;

use crate::{
    resmoke::resmoke_suite::ResmokeSuiteConfig,
    utils::{fs_service::FsService, task_name::name_generated_task},
};

use super::{multiversion::SuiteShape, resmoke_tasks::SubSuite};

/// A service for writing resmoke configuration for generated sub-suites.
pub trait ResmokeConfigWriter: Sync + Send {
    /// Write suite files for the given sub-suites and their `_misc` suite.
    ///
    /// # Arguments
    ///
    /// * `origin_config` - Configuration of the suite being split.
    /// * `shape` - Shape of the suite being split.
    /// * `sub_suites` - Sub-suites to write configuration for.
    /// * `suite_name` - Name of the suite being split.
    ///
    /// # Returns
    ///
    /// Paths of the files written, sub-suites first with the `_misc` suite last.
    fn write_suite_files(
        &self,
        origin_config: &ResmokeSuiteConfig,
        shape: SuiteShape,
        sub_suites: &[SubSuite],
        suite_name: &str,
    ) -> Result<Vec<PathBuf>>;
}

/// Implementation of the resmoke configuration writer.
pub struct ResmokeConfigWriterImpl {
    /// Filesystem service.
    fs_service: Arc<dyn FsService>,

    /// Directory to write generated files to.
    target_dir: PathBuf,
}

impl ResmokeConfigWriterImpl {
    /// Create a new instance of the writer.
    ///
    /// # Arguments
    ///
    /// * `fs_service` - Service to work with the filesystem.
    /// * `target_dir` - Directory to write generated files to.
    pub fn new(fs_service: Arc<dyn FsService>, target_dir: PathBuf) -> Self {
        Self {
            fs_service,
            target_dir,
        }
    }

    fn suite_path(&self, name: &str) -> PathBuf {
        let mut path = self.target_dir.clone();
        path.push(format!("{}.yml", name));
        path
    }

    /// Write resmoke configurations for the given sub-suites.
    ///
    /// # Arguments
    ///
    /// * `sub_suites` - List of sub-suites to write configuration for.
    /// * `config` - Configuration to base sub-suite configuration on.
    fn write_sub_suites(
        &self,
        sub_suites: &[SubSuite],
        config: &ResmokeSuiteConfig,
    ) -> Result<Vec<PathBuf>> {
        let mut written = vec![];
        for sub_suite in sub_suites {
            let sub_suite_config = config.with_new_tests(Some(&sub_suite.test_list), None);
            let path = self.suite_path(&sub_suite.name);
            self.fs_service
                .write_file(&path, &sub_suite_config.to_yaml()?)?;
            written.push(path);
        }
        Ok(written)
    }

    /// Write resmoke configuration for a "_misc" suite.
    ///
    /// # Arguments
    ///
    /// * `sub_suites` - List of sub-suites comprising the generated suite.
    /// * `config` - Configuration to base _misc configuration on.
    /// * `suite_name` - Name of the suite being split.
    fn write_misc_suite(
        &self,
        sub_suites: &[SubSuite],
        config: &ResmokeSuiteConfig,
        suite_name: &str,
    ) -> Result<PathBuf> {
        let all_tests: Vec<String> = sub_suites
            .iter()
            .flat_map(|s| s.test_list.clone())
            .collect();
        let misc_config = config.with_new_tests(None, Some(&all_tests));
        let path = self.suite_path(&name_generated_task(suite_name, None, 1, None));
        self.fs_service.write_file(&path, &misc_config.to_yaml()?)?;
        Ok(path)
    }
}

impl ResmokeConfigWriter for ResmokeConfigWriterImpl {
    fn write_suite_files(
        &self,
        origin_config: &ResmokeSuiteConfig,
        shape: SuiteShape,
        sub_suites: &[SubSuite],
        suite_name: &str,
    ) -> Result<Vec<PathBuf>> {
        let mut config = origin_config.clone();
        shape.update_suite_config(&mut config)?;

        let mut written = self.write_sub_suites(sub_suites, &config)?;
        written.push(self.write_misc_suite(sub_suites, &config, suite_name)?);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, path::Path, str::FromStr, sync::Mutex};

    use super::*;

    const REPL_SUITE: &str = "
        test_kind: js_test

        selector:
          roots:
            - jstests/core/txns/*.js
          exclude_files:
            - jstests/core/txns/skip.js

        executor:
          config:
            shell_options:
              nodb: ''
          fixture:
            class: ReplicaSetFixture
            num_nodes: 1
    ";

    struct MockFsService {
        pub files: Mutex<HashMap<String, String>>,
    }

    impl MockFsService {
        pub fn new() -> Self {
            Self {
                files: Mutex::new(HashMap::new()),
            }
        }

        pub fn get_config(&self, path: &str) -> ResmokeSuiteConfig {
            let files = self.files.lock().unwrap();
            ResmokeSuiteConfig::from_str(files.get(path).unwrap()).unwrap()
        }
    }

    impl FsService for MockFsService {
        fn file_exists(&self, _path: &str) -> bool {
            todo!()
        }

        fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
            let mut files = self.files.lock().unwrap();
            files.insert(path.to_str().unwrap().to_string(), contents.to_string());
            Ok(())
        }
    }

    fn build_sub_suites() -> Vec<SubSuite> {
        vec![
            SubSuite {
                name: "core_txns_0".to_string(),
                test_list: vec!["jstests/core/txns/a.js".to_string()],
            },
            SubSuite {
                name: "core_txns_1".to_string(),
                test_list: vec![
                    "jstests/core/txns/b.js".to_string(),
                    "jstests/core/txns/c.js".to_string(),
                ],
            },
        ]
    }

    #[test]
    fn test_write_suite_files_should_write_sub_suites_and_misc() {
        let fs_service = Arc::new(MockFsService::new());
        let writer = ResmokeConfigWriterImpl::new(fs_service.clone(), PathBuf::from("generated"));
        let origin = ResmokeSuiteConfig::from_str(REPL_SUITE).unwrap();

        let written = writer
            .write_suite_files(
                &origin,
                SuiteShape::ReplicaSet,
                &build_sub_suites(),
                "core_txns",
            )
            .unwrap();

        assert_eq!(
            written,
            vec![
                PathBuf::from("generated/core_txns_0.yml"),
                PathBuf::from("generated/core_txns_1.yml"),
                PathBuf::from("generated/core_txns_misc.yml"),
            ]
        );

        let sub_suite = fs_service.get_config("generated/core_txns_1.yml");
        assert_eq!(
            sub_suite.selector.roots,
            Some(vec![
                "jstests/core/txns/b.js".to_string(),
                "jstests/core/txns/c.js".to_string()
            ])
        );
        assert_eq!(sub_suite.selector.exclude_files, None);

        let misc_suite = fs_service.get_config("generated/core_txns_misc.yml");
        assert_eq!(
            misc_suite.selector.roots,
            Some(vec!["jstests/core/txns/*.js".to_string()])
        );
        assert_eq!(
            misc_suite.selector.exclude_files,
            Some(vec![
                "jstests/core/txns/skip.js".to_string(),
                "jstests/core/txns/a.js".to_string(),
                "jstests/core/txns/b.js".to_string(),
                "jstests/core/txns/c.js".to_string(),
            ])
        );
    }

    #[test]
    fn test_written_suites_should_be_updated_for_multiversion() {
        let fs_service = Arc::new(MockFsService::new());
        let writer = ResmokeConfigWriterImpl::new(fs_service.clone(), PathBuf::from("generated"));
        let origin = ResmokeSuiteConfig::from_str(REPL_SUITE).unwrap();

        writer
            .write_suite_files(
                &origin,
                SuiteShape::ReplicaSet,
                &build_sub_suites(),
                "core_txns",
            )
            .unwrap();

        for path in &[
            "generated/core_txns_0.yml",
            "generated/core_txns_1.yml",
            "generated/core_txns_misc.yml",
        ] {
            let config = fs_service.get_config(path);
            let fixture = config.executor.fixture.unwrap();
            assert_eq!(fixture.num_nodes, Some(3));
            assert_eq!(fixture.linear_chain, Some(true));
            assert!(config.executor.other.contains_key("config"));
        }
        assert_eq!(origin.executor.fixture.unwrap().num_nodes, Some(1));
    }

    #[test]
    fn test_invalid_sharded_suite_should_not_write_files() {
        let fs_service = Arc::new(MockFsService::new());
        let writer = ResmokeConfigWriterImpl::new(fs_service.clone(), PathBuf::from("generated"));
        let origin = ResmokeSuiteConfig::from_str(
            "
            test_kind: js_test
            selector:
              roots:
                - jstests/sharding/*.js
            executor:
              fixture:
                class: ShardedClusterFixture
                num_shards: 3
                num_rs_nodes_per_shard: 3
            ",
        )
        .unwrap();

        let result =
            writer.write_suite_files(&origin, SuiteShape::Sharded, &build_sub_suites(), "sharding");

        assert!(result.is_err());
        assert!(fs_service.files.lock().unwrap().is_empty());
    }

    #[test]
    fn test_no_sub_suites_should_only_write_misc() {
        let fs_service = Arc::new(MockFsService::new());
        let writer = ResmokeConfigWriterImpl::new(fs_service.clone(), PathBuf::from("generated"));
        let origin = ResmokeSuiteConfig::from_str(REPL_SUITE).unwrap();

        let written = writer
            .write_suite_files(&origin, SuiteShape::ReplicaSet, &[], "core_txns")
            .unwrap();

        assert_eq!(written, vec![PathBuf::from("generated/core_txns_misc.yml")]);
    }
}
