//! Names referencing items in the mongodb/mongo etc/evergreen.yml.

// Functions to setup tasks
/// Function to setup a resmoke task.
pub const DO_SETUP: &str = "do setup";
/// Function to fetch the old mongod binaries needed for multiversion testing.
pub const DO_MULTIVERSION_SETUP: &str = "do multiversion setup";

// Functions for running generated tasks.
/// Function to run generated tasks.
pub const RUN_GENERATED_TESTS: &str = "run generated tests";

// Tasks
/// Task which builds the binaries generated tasks run against.
pub const COMPILE_TASK: &str = "compile";
/// Task that executes multiversion burn_in tests.
pub const BURN_IN_TASK: &str = "burn_in_tests_multiversion";
/// Prefix given to the generated multiversion burn_in tasks.
pub const BURN_IN_PREFIX: &str = "burn_in_multiversion";

// Parameters
/// Arguments to pass to resmoke command.
pub const RESMOKE_ARGS: &str = "resmoke_args";
/// Name of task being executed.
pub const TASK_NAME: &str = "task";

// Evergreen task statuses.
/// Status of a task execution that succeeded.
pub const TASK_STATUS_SUCCESS: &str = "success";
/// Requester for commits on the mainline branch.
pub const MAINLINE_REQUESTER: &str = "mainline";
