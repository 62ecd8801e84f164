//! Utilities for working with task names.

const GEN_SUFFIX: &str = "_gen";

/// Generate a name for a generated task.
///
/// # Arguments
///
/// * `display_name` - Name of parent task being generated.
/// * `sub_task_index` - Index of sub-task being named.
/// * `total_tasks` - Total number of sub-tasks generated for this parent task.
/// * `build_variant` - Build variant the task will run on.
pub fn name_generated_task(
    display_name: &str,
    sub_task_index: Option<usize>,
    total_tasks: usize,
    build_variant: Option<&str>,
) -> String {
    let suffix = if let Some(build_variant) = build_variant {
        format!("_{}", build_variant)
    } else {
        "".to_string()
    };

    if let Some(index) = sub_task_index {
        let alignment = (total_tasks as f64).log10().ceil() as usize;
        format!(
            "{}_{:0fill$}{}",
            display_name,
            index,
            suffix,
            fill = alignment
        )
    } else {
        format!("{}_misc{}", display_name, suffix)
    }
}

/// Remove the '_gen' from end of the given task name if it exists.
///
/// # Arguments
///
/// * `task_name` - Name of task.
///
/// # Returns
///
/// Name of task with `_gen` stripped off.
pub fn remove_gen_suffix(task_name: &str) -> &str {
    if task_name.ends_with(GEN_SUFFIX) {
        let end = task_name.len() - GEN_SUFFIX.len();
        &task_name[..end]
    } else {
        task_name
    }
}
