use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::activation::{self, Activation};
use crate::config::{self, AppConfig};
use crate::diagnostics::{self, OutputChannel};
use crate::event;
use crate::host::Registry;
use crate::model::work_item::{TaskDefinition, WorkItem};
use crate::providers::taskfile::TASK_TYPE;
use crate::util::exec::{ProcessRunner, ToolRunner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List { root: Option<PathBuf>, json: bool },
    Resolve { task: String, task_type: String, root: Option<PathBuf> },
    Watch { root: Option<PathBuf> },
    Log { limit: Option<usize> },
    Help,
}

/// Parse `task-detect` arguments. No subcommand means `list`.
///
/// Supported forms:
///   task-detect [list] [--root DIR] [--json]
///   task-detect resolve <task> [--type TYPE] [--root DIR]
///   task-detect watch [--root DIR]
///   task-detect log [--limit N]
pub fn parse_args(args: &[String]) -> Result<Command> {
    let (sub, rest) = match args.first().map(String::as_str) {
        None => ("list", &args[..0]),
        Some(first) if first.starts_with('-') => ("list", args),
        Some(first) => (first, &args[1..]),
    };

    let mut root: Option<PathBuf> = None;
    let mut json = false;
    let mut task_type: Option<String> = None;
    let mut limit: Option<usize> = None;
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < rest.len() {
        match rest[i].as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "--root" => {
                i += 1;
                match rest.get(i) {
                    Some(dir) => root = Some(PathBuf::from(dir)),
                    None => bail!("Missing value for --root"),
                }
            }
            "--type" => {
                i += 1;
                match rest.get(i) {
                    Some(t) => task_type = Some(t.clone()),
                    None => bail!("Missing value for --type"),
                }
            }
            "--limit" => {
                i += 1;
                let value = rest.get(i).context("Missing value for --limit")?;
                limit = Some(
                    value
                        .parse()
                        .with_context(|| format!("Invalid --limit value: {value}"))?,
                );
            }
            "--json" => json = true,
            flag if flag.starts_with('-') => bail!("Unknown option: {flag}"),
            _ => positional.push(rest[i].clone()),
        }
        i += 1;
    }

    let command = match sub {
        "list" => Command::List { root, json },
        "resolve" => {
            let task = match positional.as_slice() {
                [task] => task.clone(),
                [] => bail!("Usage: task-detect resolve <task> [--type TYPE] [--root DIR]"),
                _ => bail!("resolve takes exactly one task name"),
            };
            return Ok(Command::Resolve {
                task,
                task_type: task_type.unwrap_or_else(|| TASK_TYPE.to_string()),
                root,
            });
        }
        "watch" => Command::Watch { root },
        "log" => Command::Log { limit },
        "help" => Command::Help,
        other => bail!("Unknown command: {other}. Run `task-detect help` for usage."),
    };

    if !positional.is_empty() {
        bail!("Unexpected argument: {}", positional[0]);
    }
    Ok(command)
}

pub async fn run(command: Command, config: &AppConfig) -> Result<()> {
    match command {
        Command::List { root, json } => {
            let session = Session::start(config, root, false)?;
            let tasks = session.registry.fetch_tasks().await;
            print_tasks(&tasks, json)?;
            session.finish();
        }
        Command::Resolve { task, task_type, root } => {
            let session = Session::start(config, root, false)?;
            let definition = Arc::new(TaskDefinition::new(&task_type, task.clone(), None));
            let resolved = session.registry.resolve(definition);
            session.finish();
            match resolved {
                Some(item) => println!("{}", item.execution.command_line),
                None => bail!("Task '{task}' of type '{task_type}' cannot be resolved"),
            }
        }
        Command::Watch { root } => {
            let mut session = Session::start(config, root, true)?;
            let result = event::run_watch(&mut session).await;
            session.finish();
            result?;
        }
        Command::Log { limit } => handle_log(limit),
        Command::Help => print_help(),
    }
    Ok(())
}

/// Stands in for the editor: one registry, the providers activated for one
/// project root, and the shared diagnostic channel.
pub struct Session {
    pub registry: Registry,
    pub root: PathBuf,
    pub log: Arc<OutputChannel>,
    config: AppConfig,
    runner: Arc<dyn ToolRunner>,
    activation: Option<Activation>,
    log_printed: usize,
}

impl Session {
    pub fn start(config: &AppConfig, root: Option<PathBuf>, watch: bool) -> Result<Self> {
        let root = project_root(root)?;
        let log = OutputChannel::shared(config.log.persist.then(config::log_path));
        let runner: Arc<dyn ToolRunner> =
            Arc::new(ProcessRunner::new(config.detection.timeout()));

        let mut session = Self {
            registry: Registry::new(),
            root,
            log,
            config: config.clone(),
            runner,
            activation: None,
            log_printed: 0,
        };
        session.activate();

        if session.registry.is_empty() && !watch {
            bail!(
                "Nothing to detect in {}: no {} found and the custom build task is disabled",
                session.root.display(),
                session.config.detection.manifest
            );
        }
        Ok(session)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(&self.config.detection.manifest)
    }

    fn activate(&mut self) {
        self.activation = activation::activate(
            &self.registry,
            &self.config,
            Some(&self.root),
            self.runner.clone(),
            self.log.clone(),
        );
        if let Some(activation) = &self.activation {
            debug!(
                types = ?activation.task_types(),
                root = %self.root.display(),
                "providers activated"
            );
        }
    }

    /// Re-register providers when the manifest appeared or disappeared since
    /// activation. Returns whether anything changed.
    pub fn refresh_activation(&mut self) -> bool {
        let registered = self
            .registry
            .provider_types()
            .iter()
            .any(|t| t == TASK_TYPE);
        if registered == self.manifest_path().is_file() {
            return false;
        }
        if let Some(activation) = self.activation.take() {
            activation.deactivate();
        }
        self.activate();
        true
    }

    /// Show the diagnostic channel if a provider asked for it.
    pub fn flush_log(&mut self) {
        if let Err(e) = self.flush_log_to(&mut std::io::stderr()) {
            debug!("cannot print diagnostic log: {e}");
        }
    }

    /// Writes the lines appended since the previous flush.
    fn flush_log_to(&mut self, out: &mut impl Write) -> std::io::Result<()> {
        if !self.log.take_revealed() {
            return Ok(());
        }
        let lines = self.log.lines_since(self.log_printed);
        if lines.is_empty() {
            return Ok(());
        }
        self.log_printed += lines.len();
        writeln!(out, "--- {} ---", self.log.name())?;
        for line in lines {
            writeln!(out, "{}", line.trim_end())?;
        }
        Ok(())
    }

    pub fn finish(mut self) {
        self.flush_log();
        if let Some(activation) = self.activation.take() {
            activation.deactivate();
        }
    }
}

fn project_root(root: Option<PathBuf>) -> Result<PathBuf> {
    let root = match root {
        Some(root) => root,
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };
    root.canonicalize()
        .with_context(|| format!("Project root {} does not exist", root.display()))
}

pub fn print_tasks(tasks: &[WorkItem], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(tasks)?);
        return Ok(());
    }
    if tasks.is_empty() {
        println!("No tasks detected.");
    }
    for item in tasks {
        println!("{}", format_item(item));
    }
    Ok(())
}

pub fn format_item(item: &WorkItem) -> String {
    let group = item
        .group
        .map(|g| g.to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "{:<24} {:<6} {}",
        item.name, group, item.execution.command_line
    );
    if let Some(desc) = &item.definition.description {
        line.push_str("  # ");
        line.push_str(desc);
    }
    line
}

fn handle_log(limit: Option<usize>) {
    let path = config::log_path();
    print_log(&path, limit);
}

fn print_log(path: &Path, limit: Option<usize>) {
    let entries = diagnostics::read_entries(path, limit);
    if entries.is_empty() {
        println!("No diagnostic entries in {}", path.display());
        return;
    }
    for entry in entries {
        println!("{} {}", entry.timestamp, entry.line.trim_end());
    }
}

pub fn print_help() {
    println!("task-detect: discover task runner tasks for a project\n");
    println!("USAGE:");
    println!("  task-detect [list]          List detected tasks");
    println!("  task-detect resolve <task>  Print the command line for one task");
    println!("  task-detect watch           List tasks again whenever the Taskfile changes");
    println!("  task-detect log             Show the detection log");
    println!();
    println!("OPTIONS:");
    println!("  --root <dir>    Project root (default: current directory)");
    println!("  --json          Print tasks as JSON (list)");
    println!("  --type <type>   Task type to resolve (default: task)");
    println!("  --limit <n>     Show only the last n log entries (log)");
    println!();
    println!("Configuration is read from ~/.taskdetect/config.toml");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::work_item::{ShellExecution, TaskGroup};

    fn args(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_args_lists() {
        assert_eq!(
            parse_args(&args(&[])).unwrap(),
            Command::List { root: None, json: false }
        );
    }

    #[test]
    fn flags_without_subcommand_list() {
        assert_eq!(
            parse_args(&args(&["--json", "--root", "/tmp/p"])).unwrap(),
            Command::List {
                root: Some(PathBuf::from("/tmp/p")),
                json: true
            }
        );
    }

    #[test]
    fn resolve_defaults_to_task_type() {
        assert_eq!(
            parse_args(&args(&["resolve", "lint"])).unwrap(),
            Command::Resolve {
                task: "lint".into(),
                task_type: "task".into(),
                root: None
            }
        );
    }

    #[test]
    fn resolve_with_type_and_root() {
        assert_eq!(
            parse_args(&args(&["resolve", "build", "--type", "custombuildscript", "--root", "."]))
                .unwrap(),
            Command::Resolve {
                task: "build".into(),
                task_type: "custombuildscript".into(),
                root: Some(PathBuf::from("."))
            }
        );
    }

    #[test]
    fn resolve_requires_one_task() {
        assert!(parse_args(&args(&["resolve"])).is_err());
        assert!(parse_args(&args(&["resolve", "a", "b"])).is_err());
    }

    #[test]
    fn log_limit_must_be_number() {
        assert_eq!(
            parse_args(&args(&["log", "--limit", "5"])).unwrap(),
            Command::Log { limit: Some(5) }
        );
        assert!(parse_args(&args(&["log", "--limit", "many"])).is_err());
        assert!(parse_args(&args(&["log", "--limit"])).is_err());
    }

    #[test]
    fn rejects_unknown_input() {
        assert!(parse_args(&args(&["deploy"])).is_err());
        assert!(parse_args(&args(&["list", "--verbose"])).is_err());
        assert!(parse_args(&args(&["list", "extra"])).is_err());
        assert!(parse_args(&args(&["--root"])).is_err());
    }

    #[test]
    fn help_anywhere() {
        assert_eq!(parse_args(&args(&["help"])).unwrap(), Command::Help);
        assert_eq!(parse_args(&args(&["watch", "-h"])).unwrap(), Command::Help);
    }

    #[test]
    fn format_item_shows_group_command_and_description() {
        let def = Arc::new(TaskDefinition::new("task", "build", Some("compiles".into())));
        let item = WorkItem::new(def, "build", "task", ShellExecution::for_task("task", "build"))
            .with_group(Some(TaskGroup::Build));
        let line = format_item(&item);
        assert!(line.starts_with("build "));
        assert!(line.contains("build  task build"));
        assert!(line.ends_with("# compiles"));

        let def = Arc::new(TaskDefinition::new("task", "deploy", None));
        let item = WorkItem::new(def, "deploy", "task", ShellExecution::for_task("task", "deploy"));
        assert!(format_item(&item).contains(" -      task deploy"));
    }

    #[test]
    fn project_root_must_exist() {
        assert!(project_root(Some(PathBuf::from("/definitely/not/here"))).is_err());
        let dir = tempfile::tempdir().unwrap();
        let root = project_root(Some(dir.path().to_path_buf())).unwrap();
        assert!(root.is_absolute());
    }

    #[test]
    fn session_tracks_manifest_appearing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.log.persist = false;

        let mut session = Session::start(&config, Some(dir.path().to_path_buf()), false).unwrap();
        assert_eq!(session.registry.provider_types(), vec!["custombuildscript"]);
        assert!(!session.refresh_activation());

        std::fs::write(dir.path().join("Taskfile.yml"), "version: '3'\n").unwrap();
        assert!(session.refresh_activation());
        assert_eq!(session.registry.provider_types(), vec!["task", "custombuildscript"]);

        std::fs::remove_file(dir.path().join("Taskfile.yml")).unwrap();
        assert!(session.refresh_activation());
        assert_eq!(session.registry.provider_types(), vec!["custombuildscript"]);
        session.finish();
    }

    #[test]
    fn session_without_providers_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.custom.enabled = false;
        config.log.persist = false;
        assert!(Session::start(&config, Some(dir.path().to_path_buf()), false).is_err());
    }

    #[test]
    fn flushed_log_lines_are_printed_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.log.persist = false;
        let mut session = Session::start(&config, Some(dir.path().to_path_buf()), false).unwrap();
        session.log = Arc::new(OutputChannel::new("test"));

        session.log.append_line("running command");
        session.log.append_line("first failure");
        session.log.show();
        let mut out = Vec::new();
        session.flush_log_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "--- test ---\nrunning command\nfirst failure\n"
        );

        session.log.append_line("running command");
        session.log.append_line("second failure");
        session.log.show();
        let mut out = Vec::new();
        session.flush_log_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "--- test ---\nrunning command\nsecond failure\n"
        );

        session.log.append_line("unrevealed");
        let mut out = Vec::new();
        session.flush_log_to(&mut out).unwrap();
        assert!(out.is_empty());
    }
}
