use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use duration_string::DurationString;
use log::info;
use regex::Regex;
use serde::Deserialize;

use super::{resolve_outcome, PipelineTask, RunContext};
use crate::aws::clients::traits::{
    BeanstalkOperations, CreateEnvironmentRequest, EnvironmentTierSpec, OptionSetting,
};
use crate::error::{TaskError, Violations};
use crate::wait::{PollConfig, StatusMatcher, StatusPoller, StatusProbe};

const READY: &str = "Ready";

// Between 4 and 23 characters, letters, numbers, and hyphens, not beginning
// or ending with a hyphen.
fn cname_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9-]{2,21}[a-zA-Z0-9]$").expect("valid cname pattern")
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateApplicationTask {
    pub application_name: Option<String>,
    pub description: Option<String>,
}

#[async_trait]
impl PipelineTask for CreateApplicationTask {
    fn name(&self) -> &'static str {
        "create-beanstalk-application"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(
            self.application_name.is_some(),
            "application_name is required",
        );
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let application_name = self.application_name.clone().unwrap_or_default();
        let beanstalk = cx.clients.beanstalk(None).await;

        info!("creating application {}", application_name);
        beanstalk
            .create_application(&application_name, self.description.as_deref())
            .await?;
        info!("application {} created", application_name);
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub tier_type: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingSpec {
    pub namespace: String,
    pub option_name: String,
    pub value: String,
}

/// Creates a Beanstalk environment. When a CNAME prefix is given, its
/// availability is checked before the environment is requested.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateEnvironmentTask {
    pub application_name: Option<String>,
    pub environment_name: Option<String>,
    pub environment_description: Option<String>,
    pub solution_stack_name: Option<String>,
    pub version_label: Option<String>,
    pub cname_prefix: Option<String>,
    pub tier: Option<TierSpec>,
    #[serde(default)]
    pub settings: Vec<SettingSpec>,
}

#[async_trait]
impl PipelineTask for CreateEnvironmentTask {
    fn name(&self) -> &'static str {
        "create-beanstalk-environment"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(
            self.environment_name.is_some(),
            "environment_name is required",
        );
        v.require(
            self.environment_description.is_some(),
            "environment_description is required",
        );
        v.require(
            self.solution_stack_name.is_some(),
            "solution_stack_name is required",
        );
        v.require(
            self.application_name.is_some(),
            "application_name is required",
        );
        if let Some(prefix) = self.cname_prefix.as_deref() {
            if !cname_pattern().is_match(prefix) {
                v.push(format!(
                    "error in parameter configuration: cname_prefix '{}' must be 4-23 characters, contain only letters, numbers, and hyphens, and not begin or end with a hyphen",
                    prefix
                ));
            }
        }
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let environment_name = self.environment_name.clone().unwrap_or_default();
        let beanstalk = cx.clients.beanstalk(None).await;

        if let Some(prefix) = self.cname_prefix.as_deref() {
            if !beanstalk.is_cname_available(prefix).await? {
                return Err(TaskError::Provider(anyhow!(
                    "the specified CNAME {} was not available",
                    prefix
                )));
            }
        }

        let request = CreateEnvironmentRequest {
            application_name: self.application_name.clone().unwrap_or_default(),
            environment_name: environment_name.clone(),
            description: self.environment_description.clone().unwrap_or_default(),
            solution_stack_name: self.solution_stack_name.clone().unwrap_or_default(),
            version_label: self.version_label.clone(),
            cname_prefix: self.cname_prefix.clone(),
            tier: self.tier.as_ref().map(|t| EnvironmentTierSpec {
                name: t.name.clone(),
                tier_type: t.tier_type.clone(),
                version: t.version.clone(),
            }),
            option_settings: self
                .settings
                .iter()
                .map(|s| OptionSetting {
                    namespace: s.namespace.clone(),
                    option_name: s.option_name.clone(),
                    value: s.value.clone(),
                })
                .collect(),
        };

        info!("creating environment {}...", environment_name);
        match beanstalk.create_environment(request).await? {
            Some(cname) => info!(
                "create environment request submitted. When the environment is finished launching, your deployment will be available at {}",
                cname
            ),
            None => info!(
                "create environment request submitted. The environment configuration does not support a CNAME."
            ),
        }
        Ok(())
    }
}

/// Uploads an application bundle to S3 (when a local file is given), creates
/// an application version from it, and points the environment at the new
/// version.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployApplicationTask {
    pub bucket_name: Option<String>,
    pub key: Option<String>,
    pub file: Option<PathBuf>,
    pub version_label: Option<String>,
    pub version_description: Option<String>,
    pub application_name: Option<String>,
    pub environment_name: Option<String>,
}

#[async_trait]
impl PipelineTask for DeployApplicationTask {
    fn name(&self) -> &'static str {
        "deploy-beanstalk-application"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(self.bucket_name.is_some(), "bucket_name is required");
        v.forbid(
            self.key.is_none() && self.file.is_none(),
            "either key or file must be set; specify an application already in S3 or a local application to upload",
        );
        v.require(self.version_label.is_some(), "version_label is required");
        v.require(
            self.version_description.is_some(),
            "version_description is required",
        );
        v.require(
            self.application_name.is_some(),
            "application_name is required",
        );
        v.require(
            self.environment_name.is_some(),
            "environment_name is required",
        );
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let bucket_name = self.bucket_name.clone().unwrap_or_default();
        let version_label = self.version_label.clone().unwrap_or_default();
        let beanstalk = cx.clients.beanstalk(None).await;

        let key = match (&self.key, &self.file) {
            (Some(key), _) => key.clone(),
            (None, Some(file)) => file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| anyhow!("file {} has no file name", file.display()))?,
            (None, None) => unreachable!("validated above"),
        };

        if let Some(file) = &self.file {
            let s3 = cx.clients.s3(None).await;
            info!("uploading file {} to S3", file.display());
            s3.put_file(&bucket_name, &key, file).await?;
            info!("upload successful");
        }

        info!("creating application version {}...", version_label);
        beanstalk
            .create_application_version(
                self.application_name.as_deref().unwrap_or_default(),
                &version_label,
                self.version_description.as_deref().unwrap_or_default(),
                &bucket_name,
                &key,
            )
            .await?;
        info!("application version successfully created");

        info!("updating environment...");
        beanstalk
            .update_environment_version(
                self.environment_name.as_deref().unwrap_or_default(),
                &version_label,
            )
            .await?;
        info!("update environment request submitted");
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TerminateEnvironmentTask {
    pub environment_name: Option<String>,
}

#[async_trait]
impl PipelineTask for TerminateEnvironmentTask {
    fn name(&self) -> &'static str {
        "terminate-beanstalk-environment"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(
            self.environment_name.is_some(),
            "environment_name is required",
        );
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let environment_name = self.environment_name.clone().unwrap_or_default();
        let beanstalk = cx.clients.beanstalk(None).await;

        info!("terminating environment {}...", environment_name);
        beanstalk.terminate_environment(&environment_name).await?;
        info!("the request to terminate the environment has been submitted");
        Ok(())
    }
}

/// Reports environment status, or "status/health" when the wait also cares
/// about health.
struct EnvironmentProbe {
    ops: Arc<dyn BeanstalkOperations>,
    with_health: bool,
}

#[async_trait]
impl StatusProbe for EnvironmentProbe {
    async fn status(&self, handle: &str) -> Result<Option<String>> {
        let state = self.ops.environment_state(handle).await?;
        Ok(state.map(|state| {
            if self.with_health {
                format!(
                    "{}/{}",
                    state.status,
                    state.health.unwrap_or_default()
                )
            } else {
                state.status
            }
        }))
    }
}

/// Blocks until the environment reaches the given status (default Ready),
/// and optionally the given health. An environment that disappears from the
/// describe response resolves successfully.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitForEnvironmentTask {
    pub environment_name: Option<String>,
    pub status: Option<String>,
    pub health: Option<String>,
    pub poll_interval: Option<DurationString>,
    pub max_attempts: Option<u32>,
}

#[async_trait]
impl PipelineTask for WaitForEnvironmentTask {
    fn name(&self) -> &'static str {
        "wait-for-beanstalk-environment"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(
            self.environment_name.is_some(),
            "environment_name is required",
        );
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let environment_name = self.environment_name.clone().unwrap_or_default();
        let status = self.status.clone().unwrap_or_else(|| READY.to_string());
        let beanstalk = cx.clients.beanstalk(None).await;

        let target = match &self.health {
            Some(health) => format!("{}/{}", status, health),
            None => status,
        };
        let probe = EnvironmentProbe {
            ops: beanstalk,
            with_health: self.health.is_some(),
        };
        let matcher = StatusMatcher::new(target.clone()).case_insensitive();
        let outcome = StatusPoller::new(PollConfig::overridden(
            self.poll_interval.clone().map(Into::into),
            self.max_attempts,
        ))
        .wait(&probe, &environment_name, &matcher)
        .await?;
        resolve_outcome(&environment_name, &target, outcome)
    }
}
