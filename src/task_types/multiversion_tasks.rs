//! Build the evergreen task graph for multiversion generated tasks.
use std::collections::HashMap;

use anyhow::{bail, Result};
use maplit::hashmap;
use shrub_rs::models::{
    commands::{fn_call, fn_call_with_params, EvgCommand},
    params::ParamValue,
    project::EvgProject,
    task::{EvgTask, TaskDependency},
    variant::{BuildVariant, DisplayTask},
};

use crate::{
    evergreen_names::{
        BURN_IN_TASK, COMPILE_TASK, DO_MULTIVERSION_SETUP, DO_SETUP, RESMOKE_ARGS,
        RUN_GENERATED_TESTS, TASK_NAME,
    },
    utils::task_name::name_generated_task,
};

use super::multiversion::exclude_tags;

const GEN_TASK_SUFFIX: &str = "_gen";

/// Builder accumulating the generated tasks of a single generation run.
#[derive(Debug, Clone)]
pub struct MultiversionTaskBuilder {
    /// Build variant generated tasks will run on.
    build_variant: String,
    /// Resmoke arguments every generated task should pass along.
    resmoke_args: String,
    /// Name of the task being generated, without the `_gen` suffix.
    task: String,
    /// Generated tasks, in generation order.
    tasks: Vec<EvgTask>,
    /// Display task grouping the generated tasks, once created.
    display_task: Option<DisplayTask>,
}

impl MultiversionTaskBuilder {
    /// Create a new builder.
    ///
    /// # Arguments
    ///
    /// * `build_variant` - Build variant generated tasks will run on.
    /// * `resmoke_args` - Resmoke arguments every generated task should pass along.
    /// * `task` - Name of the task being generated, without the `_gen` suffix.
    pub fn new(build_variant: &str, resmoke_args: &str, task: &str) -> Self {
        Self {
            build_variant: build_variant.to_string(),
            resmoke_args: resmoke_args.to_string(),
            task: task.to_string(),
            tasks: vec![],
            display_task: None,
        }
    }

    /// Add a generated task running a suite file against a version combination.
    ///
    /// # Arguments
    ///
    /// * `combination` - Version combination to run against, e.g. `new-old-new`.
    /// * `base_task` - Name the generated task name is based on.
    /// * `index` - Index used to disambiguate the generated task name.
    /// * `suite_file` - Path to the suite file the task should run.
    /// * `suite_count` - Total number of suites, used to pad the index.
    /// * `burn_in_test` - Single test to run when generating burn_in tasks.
    pub fn generate_sub_task(
        &mut self,
        combination: &str,
        base_task: &str,
        index: usize,
        suite_file: &str,
        suite_count: usize,
        burn_in_test: Option<&str>,
    ) {
        let task_name = format!("{}_{}", base_task, combination);
        let sub_task_name = name_generated_task(
            &task_name,
            Some(index),
            suite_count,
            Some(&self.build_variant),
        );

        let run_tests_vars = self.build_run_tests_vars(suite_file, combination, burn_in_test);
        self.tasks.push(EvgTask {
            name: sub_task_name,
            commands: Some(multiversion_commands(run_tests_vars)),
            depends_on: Some(vec![TaskDependency {
                name: COMPILE_TASK.to_string(),
                variant: None,
            }]),
            ..Default::default()
        });
    }

    /// Build the variables to pass to the run tests function.
    ///
    /// # Arguments
    ///
    /// * `suite_file` - Path to the suite file to run.
    /// * `combination` - Version combination to run against.
    /// * `burn_in_test` - Single test to run when generating burn_in tasks.
    fn build_run_tests_vars(
        &self,
        suite_file: &str,
        combination: &str,
        burn_in_test: Option<&str>,
    ) -> HashMap<String, ParamValue> {
        let mut resmoke_args = format!(
            "{} --suite={} --mixedBinVersions={} --excludeWithAnyTags={} --dryRun=tests ",
            self.resmoke_args,
            suite_file,
            combination,
            exclude_tags()
        );
        let gen_task_name = if let Some(burn_in_test) = burn_in_test {
            resmoke_args.push_str(burn_in_test);
            BURN_IN_TASK
        } else {
            self.task.as_str()
        };

        hashmap! {
            RESMOKE_ARGS.to_string() => ParamValue::from(resmoke_args.as_str()),
            TASK_NAME.to_string() => ParamValue::from(gen_task_name),
        }
    }

    /// Group every generated task under a display task named after the task being generated.
    ///
    /// The generating `_gen` task is grouped under the display task as well. The display task
    /// and references to all generated tasks are attached to the build variant.
    pub fn create_display_task(&mut self) -> Result<()> {
        if self.display_task.is_some() {
            bail!("Display task for '{}' was already created", self.task);
        }

        let mut execution_tasks: Vec<String> =
            self.tasks.iter().map(|t| t.name.clone()).collect();
        execution_tasks.push(format!("{}{}", self.task, GEN_TASK_SUFFIX));
        self.display_task = Some(DisplayTask {
            name: self.task.clone(),
            execution_tasks,
        });
        Ok(())
    }

    /// The generated tasks, in generation order.
    pub fn tasks(&self) -> &[EvgTask] {
        &self.tasks
    }

    /// Build an evergreen project from the generated tasks.
    ///
    /// The build variant is only included once a display task has been created. Without one,
    /// the project only defines the tasks and attaching them is left to the caller.
    pub fn build(&self) -> EvgProject {
        let buildvariants = if let Some(display_task) = &self.display_task {
            vec![BuildVariant {
                name: self.build_variant.clone(),
                tasks: self
                    .tasks
                    .iter()
                    .map(|t| t.get_reference(None, None))
                    .collect(),
                display_tasks: Some(vec![display_task.clone()]),
                ..Default::default()
            }]
        } else {
            vec![]
        };

        EvgProject {
            buildvariants,
            tasks: self.tasks.clone(),
            ..Default::default()
        }
    }
}

/// Create the list of commands to run a multiversion task in evergreen.
///
/// # Arguments
///
/// * `run_tests_vars` - Variables to pass to the run tests function.
fn multiversion_commands(run_tests_vars: HashMap<String, ParamValue>) -> Vec<EvgCommand> {
    vec![
        fn_call(DO_SETUP),
        fn_call(DO_MULTIVERSION_SETUP),
        fn_call_with_params(RUN_GENERATED_TESTS, run_tests_vars),
    ]
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn get_evg_fn_name(evg_command: &EvgCommand) -> Option<&str> {
        if let EvgCommand::Function(func) = evg_command {
            Some(&func.func)
        } else {
            None
        }
    }

    fn get_run_tests_vars(task: &EvgTask) -> HashMap<String, ParamValue> {
        let commands = task.commands.as_ref().unwrap();
        if let EvgCommand::Function(func) = &commands[2] {
            assert_eq!(func.func, RUN_GENERATED_TESTS);
            func.vars.clone().unwrap()
        } else {
            panic!("Expected a function call")
        }
    }

    fn get_var(vars: &HashMap<String, ParamValue>, name: &str) -> String {
        match vars.get(name) {
            Some(ParamValue::String(value)) => value.clone(),
            _ => panic!("Expected string var '{}'", name),
        }
    }

    #[rstest]
    #[case(0, 3, "core_txns_multiversion_new-old-new_0_linux-64")]
    #[case(12, 20, "core_txns_multiversion_new-old-new_12_linux-64")]
    #[case(3, 20, "core_txns_multiversion_new-old-new_03_linux-64")]
    #[case(5, 1, "core_txns_multiversion_new-old-new_5_linux-64")]
    fn test_generate_sub_task_names(
        #[case] index: usize,
        #[case] suite_count: usize,
        #[case] expected_name: &str,
    ) {
        let mut builder = MultiversionTaskBuilder::new("linux-64", "", "core_txns_multiversion");

        builder.generate_sub_task(
            "new-old-new",
            "core_txns_multiversion",
            index,
            "generated_resmoke_config/core_txns_0.yml",
            suite_count,
            None,
        );

        let tasks = builder.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, expected_name);
    }

    #[test]
    fn test_generate_sub_task_commands() {
        let mut builder =
            MultiversionTaskBuilder::new("linux-64", "--storageEngine=wiredTiger", "core_txns");

        builder.generate_sub_task(
            "old-new-new",
            "core_txns",
            0,
            "generated_resmoke_config/core_txns_0.yml",
            2,
            None,
        );

        let task = &builder.tasks()[0];
        let commands = task.commands.as_ref().unwrap();
        assert_eq!(commands.len(), 3);
        assert_eq!(get_evg_fn_name(&commands[0]), Some(DO_SETUP));
        assert_eq!(get_evg_fn_name(&commands[1]), Some(DO_MULTIVERSION_SETUP));

        let vars = get_run_tests_vars(task);
        assert_eq!(
            get_var(&vars, RESMOKE_ARGS),
            "--storageEngine=wiredTiger --suite=generated_resmoke_config/core_txns_0.yml --mixedBinVersions=old-new-new --excludeWithAnyTags=requires_fcv_44,multiversion_incompatible --dryRun=tests "
        );
        assert_eq!(get_var(&vars, TASK_NAME), "core_txns");

        let depends_on = task.depends_on.as_ref().unwrap();
        assert_eq!(depends_on.len(), 1);
        assert_eq!(depends_on[0].name, COMPILE_TASK);
    }

    #[test]
    fn test_generate_burn_in_sub_task() {
        let mut builder = MultiversionTaskBuilder::new("linux-64", "", "core_txns");

        builder.generate_sub_task(
            "new-old-new",
            "burn_in_multiversion:core_txns",
            4,
            "generated_resmoke_config/core_txns_0.yml",
            1,
            Some("jstests/core/txns/abort.js"),
        );

        let task = &builder.tasks()[0];
        assert_eq!(
            task.name,
            "burn_in_multiversion:core_txns_new-old-new_4_linux-64"
        );
        let vars = get_run_tests_vars(task);
        assert!(get_var(&vars, RESMOKE_ARGS)
            .ends_with("--dryRun=tests jstests/core/txns/abort.js"));
        assert_eq!(get_var(&vars, TASK_NAME), BURN_IN_TASK);
    }

    #[test]
    fn test_create_display_task_should_group_all_tasks() {
        let mut builder = MultiversionTaskBuilder::new("linux-64", "", "core_txns");
        builder.generate_sub_task("new-old-new", "core_txns", 0, "s_0.yml", 2, None);
        builder.generate_sub_task("new-old-new", "core_txns", 1, "s_1.yml", 2, None);

        builder.create_display_task().unwrap();
        let project = builder.build();

        assert_eq!(project.tasks.len(), 2);
        assert_eq!(project.buildvariants.len(), 1);
        let build_variant = &project.buildvariants[0];
        assert_eq!(build_variant.name, "linux-64");
        assert_eq!(build_variant.tasks.len(), 2);
        let display_tasks = build_variant.display_tasks.as_ref().unwrap();
        assert_eq!(display_tasks.len(), 1);
        assert_eq!(display_tasks[0].name, "core_txns");
        assert_eq!(
            display_tasks[0].execution_tasks,
            vec![
                "core_txns_new-old-new_0_linux-64",
                "core_txns_new-old-new_1_linux-64",
                "core_txns_gen",
            ]
        );
    }

    #[test]
    fn test_create_display_task_twice_should_fail() {
        let mut builder = MultiversionTaskBuilder::new("linux-64", "", "core_txns");
        builder.create_display_task().unwrap();

        assert!(builder.create_display_task().is_err());
    }

    #[test]
    fn test_build_without_display_task_has_no_build_variant() {
        let mut builder = MultiversionTaskBuilder::new("linux-64", "", "core_txns");
        builder.generate_sub_task("new-old-new", "core_txns", 0, "s_0.yml", 1, None);

        let project = builder.build();

        assert_eq!(project.tasks.len(), 1);
        assert!(project.buildvariants.is_empty());

        builder.create_display_task().unwrap();
        assert_eq!(builder.build().buildvariants.len(), 1);
    }
}
