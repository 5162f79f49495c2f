use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

const BUILD_NAMES: [&str; 3] = ["build", "compile", "watch"];
const TEST_NAMES: [&str; 2] = ["test", "lint"];

/// What a provider needs to run or re-resolve a task. Shared behind an `Arc`
/// so a resolved item can carry the exact definition the host handed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    #[serde(rename = "type")]
    pub task_type: String,
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TaskDefinition {
    pub fn new(task_type: &str, task: impl Into<String>, description: Option<String>) -> Self {
        Self {
            task_type: task_type.to_string(),
            task: task.into(),
            description,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskGroup {
    Build,
    Test,
}

impl TaskGroup {
    /// Substring match on the lower-cased name. Build indicators win over test
    /// indicators, so "build-and-test" lands in Build.
    pub fn classify(name: &str) -> Option<TaskGroup> {
        let lower = name.to_lowercase();
        if BUILD_NAMES.iter().any(|n| lower.contains(n)) {
            Some(TaskGroup::Build)
        } else if TEST_NAMES.iter().any(|n| lower.contains(n)) {
            Some(TaskGroup::Test)
        } else {
            None
        }
    }
}

impl fmt::Display for TaskGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskGroup::Build => f.write_str("build"),
            TaskGroup::Test => f.write_str("test"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellExecution {
    pub command_line: String,
}

impl ShellExecution {
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
        }
    }

    /// `<executable> <task>`, the way the task runner expects to be called.
    pub fn for_task(executable: &str, task: &str) -> Self {
        Self::new(format!("{executable} {task}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub definition: Arc<TaskDefinition>,
    pub name: String,
    /// Provider tag shown by the host next to the name, e.g. "task".
    pub source: String,
    pub execution: ShellExecution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<TaskGroup>,
    #[serde(default)]
    pub problem_matchers: Vec<String>,
}

impl WorkItem {
    pub fn new(
        definition: Arc<TaskDefinition>,
        name: impl Into<String>,
        source: &str,
        execution: ShellExecution,
    ) -> Self {
        Self {
            definition,
            name: name.into(),
            source: source.to_string(),
            execution,
            group: None,
            problem_matchers: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: Option<TaskGroup>) -> Self {
        self.group = group;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_build_indicators() {
        assert_eq!(TaskGroup::classify("build"), Some(TaskGroup::Build));
        assert_eq!(TaskGroup::classify("compile-assets"), Some(TaskGroup::Build));
        assert_eq!(TaskGroup::classify("watch"), Some(TaskGroup::Build));
        assert_eq!(TaskGroup::classify("rebuild-docs"), Some(TaskGroup::Build));
    }

    #[test]
    fn classify_is_case_insensitive() {
        assert_eq!(TaskGroup::classify("BUILD"), Some(TaskGroup::Build));
        assert_eq!(TaskGroup::classify("Lint"), Some(TaskGroup::Test));
    }

    #[test]
    fn classify_build_wins_over_test() {
        assert_eq!(TaskGroup::classify("Build-Watch-Test"), Some(TaskGroup::Build));
        assert_eq!(TaskGroup::classify("test-then-compile"), Some(TaskGroup::Build));
    }

    #[test]
    fn classify_test_indicators() {
        assert_eq!(TaskGroup::classify("test-unit"), Some(TaskGroup::Test));
        assert_eq!(TaskGroup::classify("lint"), Some(TaskGroup::Test));
    }

    #[test]
    fn classify_keeps_substring_semantics() {
        // Imprecise, but hosts already group tasks this way.
        assert_eq!(TaskGroup::classify("unbuildable"), Some(TaskGroup::Build));
        assert_eq!(TaskGroup::classify("contest"), Some(TaskGroup::Test));
    }

    #[test]
    fn classify_uncategorized() {
        assert_eq!(TaskGroup::classify("deploy"), None);
        assert_eq!(TaskGroup::classify(""), None);
    }

    #[test]
    fn shell_execution_joins_executable_and_task() {
        assert_eq!(ShellExecution::for_task("task", "lint").command_line, "task lint");
    }

    #[test]
    fn definition_serializes_type_tag() {
        let def = TaskDefinition::new("task", "build", None);
        let json = serde_json::to_string(&def).unwrap();
        assert!(json.contains(r#""type":"task""#));
        assert!(!json.contains("description"));

        let parsed: TaskDefinition =
            serde_json::from_str(r#"{"type":"task","task":"lint","description":"run linters"}"#)
                .unwrap();
        assert_eq!(parsed.task, "lint");
        assert_eq!(parsed.description.as_deref(), Some("run linters"));
    }

    #[test]
    fn work_item_serialization_omits_missing_group() {
        let def = Arc::new(TaskDefinition::new("task", "deploy", None));
        let item = WorkItem::new(def, "deploy", "task", ShellExecution::for_task("task", "deploy"));
        let json = serde_json::to_string(&item).unwrap();
        assert!(!json.contains("group"));
        assert!(json.contains("task deploy"));
    }
}
