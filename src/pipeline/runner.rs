use anyhow::{bail, Context, Result};
use log::info;
use tracing::instrument;

use super::Pipeline;
use crate::aws::{AwsSettings, ClientRegistry};
use crate::tasks::RunContext;

/// Executes pipelines strictly in task order. Validation of every task
/// happens up front, before any network call.
pub struct Runner {
    settings: AwsSettings,
}

impl Runner {
    pub fn new(settings: AwsSettings) -> Self {
        Self { settings }
    }

    /// Validates every task and reports all failing tasks at once.
    pub fn validate(&self, pipeline: &Pipeline) -> Result<()> {
        let mut failures = Vec::new();
        for (index, spec) in pipeline.tasks.iter().enumerate() {
            let task = spec.as_task();
            if let Err(e) = task.validate() {
                failures.push(format!("task {} '{}': {}", index + 1, task.name(), e));
            }
        }
        if !failures.is_empty() {
            bail!("pipeline validation failed:\n{}", failures.join("\n"));
        }
        Ok(())
    }

    #[instrument(skip(self, pipeline), fields(pipeline_name = pipeline.name.as_deref().unwrap_or("unnamed")))]
    pub async fn run(&self, pipeline: &Pipeline) -> Result<()> {
        self.validate(pipeline)?;

        let mut settings = self.settings.clone();
        if settings.region.is_none() {
            settings.region = pipeline.region.clone();
        }

        let mut cx = RunContext::new(ClientRegistry::new(settings));
        let total = pipeline.tasks.len();

        for (index, spec) in pipeline.tasks.iter().enumerate() {
            let task = spec.as_task();
            info!("running task {}/{} '{}'", index + 1, total, task.name());
            task.execute(&mut cx)
                .await
                .with_context(|| format!("task {} '{}' failed", index + 1, task.name()))?;
        }

        info!("pipeline complete, {} tasks executed", total);
        Ok(())
    }
}
