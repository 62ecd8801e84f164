pub mod evg_api;
pub mod evg_task_history;
