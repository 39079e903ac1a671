//! Sequential support crew: named agents, tasks bound to them, and a runner
//! that walks the tasks in order.
//!
//! Tasks carry no tool implementations. A [`StageHandler`] decides what a
//! stage does; the default one records every stage as skipped.

use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const DEFAULT_CREW_YAML: &str = include_str!("../config/crew.yaml");

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    pub agent: String,
    pub description: String,
    pub expected_output: String,
    /// Earlier tasks whose output this task consumes.
    #[serde(default)]
    pub context: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrewDefinition {
    pub agents: Vec<AgentDefinition>,
    pub tasks: Vec<TaskDefinition>,
}

impl CrewDefinition {
    pub fn builtin() -> AppResult<Self> {
        Self::from_yaml(DEFAULT_CREW_YAML)
    }

    pub fn from_yaml(raw: &str) -> AppResult<Self> {
        let definition: Self = serde_yaml::from_str(raw)?;
        definition.validate()?;
        Ok(definition)
    }

    /// The file at `path` when given, the built-in crew otherwise.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .map_err(|error| AppError::Io(format!("{}: {}", path.to_string_lossy(), error)))?;
                Self::from_yaml(&raw)
            }
            None => Self::builtin(),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.tasks.is_empty() {
            return Err(AppError::Pipeline("crew defines no tasks".to_string()));
        }

        let mut agents = HashSet::new();
        for agent in &self.agents {
            if !agents.insert(agent.name.as_str()) {
                return Err(AppError::Pipeline(format!("duplicate agent `{}`", agent.name)));
            }
        }

        let mut earlier: HashSet<&str> = HashSet::new();
        for task in &self.tasks {
            if !agents.contains(task.agent.as_str()) {
                return Err(AppError::Pipeline(format!(
                    "task `{}` references unknown agent `{}`",
                    task.name, task.agent
                )));
            }
            for upstream in &task.context {
                if !earlier.contains(upstream.as_str()) {
                    return Err(AppError::Pipeline(format!(
                        "task `{}` consumes `{}`, which does not run before it",
                        task.name, upstream
                    )));
                }
            }
            if !earlier.insert(task.name.as_str()) {
                return Err(AppError::Pipeline(format!("duplicate task `{}`", task.name)));
            }
        }
        Ok(())
    }

    pub fn agent(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|agent| agent.name == name)
    }

    fn task_index(&self, name: &str) -> Option<usize> {
        self.tasks.iter().position(|task| task.name == name)
    }

    /// Every `{KEY}` the crew text expects from the kickoff inputs.
    pub fn placeholders(&self) -> BTreeSet<String> {
        let agent_text = self
            .agents
            .iter()
            .flat_map(|agent| [agent.role.as_str(), agent.goal.as_str(), agent.backstory.as_str()]);
        let task_text = self
            .tasks
            .iter()
            .flat_map(|task| [task.description.as_str(), task.expected_output.as_str()]);
        agent_text
            .chain(task_text)
            .flat_map(|text| PLACEHOLDER.captures_iter(text).map(|caps| caps[1].to_string()))
            .collect()
    }
}

fn interpolate(text: &str, inputs: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(text.trim(), |caps: &regex::Captures<'_>| {
            inputs.get(&caps[1]).cloned().unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Task text with inputs applied, as handed to a [`StageHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStage {
    pub task: String,
    pub agent: AgentDefinition,
    pub description: String,
    pub expected_output: String,
    pub context: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageStatus {
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    pub task: String,
    pub agent: String,
    pub status: StageStatus,
    pub output: Option<String>,
    pub note: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub inputs: BTreeMap<String, String>,
    pub replayed_from: Option<String>,
    pub stages: Vec<StageOutcome>,
}

impl PipelineRun {
    pub fn succeeded(&self) -> bool {
        self.stages.iter().all(|stage| stage.status != StageStatus::Failed)
    }
}

/// What a stage produces: its output text, or a note explaining why it did nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    Completed(String),
    Skipped(String),
}

pub trait StageHandler {
    fn handle(&self, stage: &PreparedStage, upstream: &[&StageOutcome]) -> AppResult<StageResult>;
}

/// Handler for a crew whose agents have no tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredHandler;

impl StageHandler for UnconfiguredHandler {
    fn handle(&self, stage: &PreparedStage, _upstream: &[&StageOutcome]) -> AppResult<StageResult> {
        Ok(StageResult::Skipped(format!("agent {} has no tools configured", stage.agent.name)))
    }
}

pub struct Pipeline<H: StageHandler> {
    definition: CrewDefinition,
    handler: H,
}

impl<H: StageHandler> Pipeline<H> {
    pub fn new(definition: CrewDefinition, handler: H) -> AppResult<Self> {
        definition.validate()?;
        Ok(Self { definition, handler })
    }

    pub fn kickoff(&self, inputs: BTreeMap<String, String>) -> AppResult<PipelineRun> {
        self.execute(inputs, Vec::new(), 0, None)
    }

    /// Re-runs from `task`, reusing the outcomes `previous` recorded for the
    /// tasks before it.
    pub fn replay(&self, previous: &PipelineRun, task: &str) -> AppResult<PipelineRun> {
        let start = self
            .definition
            .task_index(task)
            .ok_or_else(|| AppError::NotFound(format!("task `{}` is not part of the crew", task)))?;

        let mut carried = Vec::with_capacity(start);
        for earlier in &self.definition.tasks[..start] {
            let outcome = previous
                .stages
                .iter()
                .find(|stage| stage.task == earlier.name && stage.status != StageStatus::Failed)
                .ok_or_else(|| {
                    AppError::Pipeline(format!(
                        "run {} has no usable outcome for `{}`; run the crew again instead",
                        previous.run_id, earlier.name
                    ))
                })?;
            carried.push(outcome.clone());
        }

        self.execute(previous.inputs.clone(), carried, start, Some(task.to_string()))
    }

    fn execute(
        &self,
        inputs: BTreeMap<String, String>,
        mut stages: Vec<StageOutcome>,
        start: usize,
        replayed_from: Option<String>,
    ) -> AppResult<PipelineRun> {
        let missing: Vec<String> = self
            .definition
            .placeholders()
            .into_iter()
            .filter(|key| !inputs.contains_key(key))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Pipeline(format!("missing crew inputs: {}", missing.join(", "))));
        }

        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        tracing::info!(run_id = %run_id, start_task = %self.definition.tasks[start].name, "crew run started");

        for task in &self.definition.tasks[start..] {
            let agent = self
                .definition
                .agent(&task.agent)
                .ok_or_else(|| AppError::Pipeline(format!("unknown agent `{}`", task.agent)))?;
            let stage = PreparedStage {
                task: task.name.clone(),
                agent: AgentDefinition {
                    name: agent.name.clone(),
                    role: interpolate(&agent.role, &inputs),
                    goal: interpolate(&agent.goal, &inputs),
                    backstory: interpolate(&agent.backstory, &inputs),
                },
                description: interpolate(&task.description, &inputs),
                expected_output: interpolate(&task.expected_output, &inputs),
                context: task.context.clone(),
            };
            let upstream: Vec<&StageOutcome> = stages
                .iter()
                .filter(|outcome| task.context.contains(&outcome.task))
                .collect();

            let stage_started = Utc::now();
            let (status, output, note) = match self.handler.handle(&stage, &upstream) {
                Ok(StageResult::Completed(output)) => (StageStatus::Completed, Some(output), None),
                Ok(StageResult::Skipped(note)) => (StageStatus::Skipped, None, Some(note)),
                Err(error) => {
                    tracing::warn!(run_id = %run_id, task = %task.name, error = %error, "crew stage failed");
                    (StageStatus::Failed, None, Some(error.to_string()))
                }
            };
            tracing::info!(run_id = %run_id, task = %task.name, agent = %agent.name, status = ?status, "crew stage finished");

            stages.push(StageOutcome {
                task: task.name.clone(),
                agent: agent.name.clone(),
                status,
                output,
                note,
                started_at: stage_started,
                finished_at: Utc::now(),
            });
            if status == StageStatus::Failed {
                break;
            }
        }

        Ok(PipelineRun {
            run_id,
            started_at,
            finished_at: Utc::now(),
            inputs,
            replayed_from,
            stages,
        })
    }
}

/// Keeps the last crew run so `replay` can pick it up in a later invocation.
#[derive(Debug, Clone)]
pub struct RunLog {
    dir: PathBuf,
}

impl RunLog {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("crew"),
        }
    }

    fn last_run_path(&self) -> PathBuf {
        self.dir.join("last_run.json")
    }

    pub fn save(&self, run: &PipelineRun) -> AppResult<()> {
        write_json_file(&self.last_run_path(), run)?;
        write_json_file(&self.dir.join("runs").join(format!("{}.json", run.run_id)), run)
    }

    pub fn load_last(&self) -> AppResult<PipelineRun> {
        let path = self.last_run_path();
        if !path.exists() {
            return Err(AppError::NotFound("no recorded crew run; use `crew run` first".to_string()));
        }
        read_json_file(&path)
    }
}

fn write_json_file<T: Serialize>(path: &Path, value: &T) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| AppError::Io(error.to_string()))?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(path, bytes).map_err(|error| AppError::Io(error.to_string()))
}

fn read_json_file<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    let bytes = fs::read(path).map_err(|error| AppError::Io(error.to_string()))?;
    serde_json::from_slice(&bytes).map_err(AppError::from)
}
