pub mod multiversion;
pub mod multiversion_tasks;
pub mod resmoke_config_writer;
pub mod resmoke_tasks;
