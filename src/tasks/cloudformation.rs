use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use duration_string::DurationString;
use log::{info, warn};
use serde::Deserialize;
use url::Url;

use super::{resolve_outcome, PipelineTask, RunContext};
use crate::aws::clients::traits::{
    CloudFormationOperations, CreateStackRequest, StackParameter, UpdateStackRequest,
};
use crate::error::{TaskError, Violations};
use crate::wait::{PollConfig, StatusMatcher, StatusPoller, StatusProbe};

const CREATE_COMPLETE: &str = "CREATE_COMPLETE";
const UPDATE_COMPLETE: &str = "UPDATE_COMPLETE";
const FAILED: &str = "FAILED";

struct StackStatusProbe {
    ops: Arc<dyn CloudFormationOperations>,
}

#[async_trait]
impl StatusProbe for StackStatusProbe {
    async fn status(&self, handle: &str) -> Result<Option<String>> {
        self.ops.stack_status(handle).await
    }
}

fn check_url(violations: &mut Violations, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        if Url::parse(value).is_err() {
            violations.push(format!(
                "error in parameter configuration: {} '{}' is not a valid URL",
                name, value
            ));
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackParameterSpec {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub use_previous_value: bool,
}

impl StackParameterSpec {
    fn to_request(&self) -> StackParameter {
        StackParameter {
            key: self.key.clone(),
            value: self.value.clone(),
            use_previous_value: self.use_previous_value,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackTagSpec {
    pub key: String,
    pub value: String,
}

/// Creates a CloudFormation stack, optionally waiting for it to reach
/// CREATE_COMPLETE.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStackTask {
    pub stack_name: Option<String>,
    pub template_body: Option<String>,
    pub template_url: Option<String>,
    pub stack_policy_body: Option<String>,
    pub stack_policy_url: Option<String>,
    pub on_failure: Option<String>,
    pub disable_rollback: Option<bool>,
    pub timeout_in_minutes: Option<i32>,
    #[serde(default)]
    pub wait_for_creation: bool,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub notification_arns: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<StackParameterSpec>,
    #[serde(default)]
    pub tags: Vec<StackTagSpec>,
    pub poll_interval: Option<DurationString>,
    pub max_attempts: Option<u32>,
}

impl CreateStackTask {
    fn poll_config(&self) -> PollConfig {
        PollConfig::overridden(self.poll_interval.clone().map(Into::into), self.max_attempts)
    }
}

#[async_trait]
impl PipelineTask for CreateStackTask {
    fn name(&self) -> &'static str {
        "create-stack"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(self.stack_name.is_some(), "stack_name is required");
        v.require(
            self.timeout_in_minutes.map(|t| t > 0).unwrap_or(false),
            "timeout_in_minutes is required and cannot be 0",
        );
        v.forbid(
            self.stack_policy_body.is_some() && self.stack_policy_url.is_some(),
            "you can set either stack_policy_body or stack_policy_url, but not both",
        );
        v.forbid(
            self.template_body.is_none() == self.template_url.is_none(),
            "you must set either template_body or template_url (but not both)",
        );
        v.forbid(
            self.disable_rollback.is_some() && self.on_failure.is_some(),
            "you can specify disable_rollback or on_failure, but not both",
        );
        check_url(&mut v, "template_url", self.template_url.as_deref());
        check_url(&mut v, "stack_policy_url", self.stack_policy_url.as_deref());
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let stack_name = self.stack_name.clone().unwrap_or_default();
        let cfn = cx.clients.cloudformation(None).await;

        let request = CreateStackRequest {
            stack_name: stack_name.clone(),
            template_body: self.template_body.clone(),
            template_url: self.template_url.clone(),
            stack_policy_body: self.stack_policy_body.clone(),
            stack_policy_url: self.stack_policy_url.clone(),
            on_failure: self.on_failure.clone(),
            disable_rollback: self.disable_rollback,
            timeout_in_minutes: self.timeout_in_minutes.unwrap_or_default(),
            capabilities: self.capabilities.clone(),
            notification_arns: self.notification_arns.clone(),
            parameters: self.parameters.iter().map(|p| p.to_request()).collect(),
            tags: self
                .tags
                .iter()
                .map(|t| (t.key.clone(), t.value.clone()))
                .collect(),
        };

        let stack_id = cfn.create_stack(request).await?;
        info!("create stack {} request submitted ({})", stack_name, stack_id);

        if self.wait_for_creation {
            let probe = StackStatusProbe { ops: cfn };
            let matcher = StatusMatcher::new(CREATE_COMPLETE).failing_on(FAILED);
            let outcome = StatusPoller::new(self.poll_config())
                .wait(&probe, &stack_name, &matcher)
                .await?;
            resolve_outcome(&stack_name, CREATE_COMPLETE, outcome)?;
        }
        Ok(())
    }
}

/// Updates a CloudFormation stack, optionally waiting for UPDATE_COMPLETE.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStackTask {
    pub stack_name: Option<String>,
    pub template_body: Option<String>,
    pub template_url: Option<String>,
    #[serde(default)]
    pub use_previous_template: bool,
    pub stack_policy_body: Option<String>,
    pub stack_policy_url: Option<String>,
    pub stack_policy_during_update_body: Option<String>,
    pub stack_policy_during_update_url: Option<String>,
    #[serde(default)]
    pub wait_for_update: bool,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub notification_arns: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<StackParameterSpec>,
    pub poll_interval: Option<DurationString>,
    pub max_attempts: Option<u32>,
}

#[async_trait]
impl PipelineTask for UpdateStackTask {
    fn name(&self) -> &'static str {
        "update-stack"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(self.stack_name.is_some(), "stack_name is required");
        if self.use_previous_template {
            v.forbid(
                self.template_body.is_some() || self.template_url.is_some(),
                "use_previous_template excludes template_body and template_url",
            );
        } else {
            v.forbid(
                self.template_body.is_none() == self.template_url.is_none(),
                "you must set either template_body or template_url (but not both)",
            );
        }
        v.forbid(
            self.stack_policy_body.is_some() && self.stack_policy_url.is_some(),
            "you can set either stack_policy_body or stack_policy_url, but not both",
        );
        v.forbid(
            self.stack_policy_during_update_body.is_some()
                && self.stack_policy_during_update_url.is_some(),
            "you can set either stack_policy_during_update_body or stack_policy_during_update_url, but not both",
        );
        check_url(&mut v, "template_url", self.template_url.as_deref());
        check_url(&mut v, "stack_policy_url", self.stack_policy_url.as_deref());
        check_url(
            &mut v,
            "stack_policy_during_update_url",
            self.stack_policy_during_update_url.as_deref(),
        );
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let stack_name = self.stack_name.clone().unwrap_or_default();
        let cfn = cx.clients.cloudformation(None).await;

        let request = UpdateStackRequest {
            stack_name: stack_name.clone(),
            template_body: self.template_body.clone(),
            template_url: self.template_url.clone(),
            use_previous_template: self.use_previous_template.then_some(true),
            stack_policy_body: self.stack_policy_body.clone(),
            stack_policy_url: self.stack_policy_url.clone(),
            stack_policy_during_update_body: self.stack_policy_during_update_body.clone(),
            stack_policy_during_update_url: self.stack_policy_during_update_url.clone(),
            capabilities: self.capabilities.clone(),
            notification_arns: self.notification_arns.clone(),
            parameters: self.parameters.iter().map(|p| p.to_request()).collect(),
        };

        let stack_id = cfn.update_stack(request).await?;
        info!("update stack {} request submitted ({})", stack_name, stack_id);

        if self.wait_for_update {
            let probe = StackStatusProbe { ops: cfn };
            let matcher = StatusMatcher::new(UPDATE_COMPLETE).failing_on(FAILED);
            let outcome = StatusPoller::new(PollConfig::overridden(
                self.poll_interval.clone().map(Into::into),
                self.max_attempts,
            ))
            .wait(&probe, &stack_name, &matcher)
            .await?;
            resolve_outcome(&stack_name, UPDATE_COMPLETE, outcome)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetStackPolicyTask {
    pub stack_name: Option<String>,
    pub stack_policy_body: Option<String>,
    pub stack_policy_url: Option<String>,
}

#[async_trait]
impl PipelineTask for SetStackPolicyTask {
    fn name(&self) -> &'static str {
        "set-stack-policy"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(self.stack_name.is_some(), "stack_name is required");
        v.forbid(
            self.stack_policy_body.is_none() == self.stack_policy_url.is_none(),
            "you must set either stack_policy_body or stack_policy_url (but not both)",
        );
        check_url(&mut v, "stack_policy_url", self.stack_policy_url.as_deref());
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let stack_name = self.stack_name.clone().unwrap_or_default();
        let cfn = cx.clients.cloudformation(None).await;
        cfn.set_stack_policy(
            &stack_name,
            self.stack_policy_body.as_deref(),
            self.stack_policy_url.as_deref(),
        )
        .await?;
        info!("stack policy set for {}", stack_name);
        Ok(())
    }
}

/// One exported item of a described stack: a parameter, tag, or output to
/// copy into the property map, with an optional default when absent.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackItemSpec {
    pub name: String,
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub default: Option<String>,
}

impl StackItemSpec {
    fn property_name(&self) -> &str {
        self.property.as_deref().unwrap_or(&self.name)
    }
}

/// Reads a stack description and exports selected parameters, tags, and
/// outputs into the property map.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DescribeStackTask {
    pub stack_name: Option<String>,
    #[serde(default)]
    pub parameters: Vec<StackItemSpec>,
    #[serde(default)]
    pub tags: Vec<StackItemSpec>,
    #[serde(default)]
    pub outputs: Vec<StackItemSpec>,
}

fn export_items(
    props: &mut crate::pipeline::PipelineContext,
    items: &[StackItemSpec],
    source: &std::collections::HashMap<String, String>,
    kind: &str,
) {
    for item in items {
        match source.get(&item.name).or(item.default.as_ref()) {
            Some(value) => props.set_new(item.property_name(), value),
            None => warn!(
                "stack {} '{}' was not found and has no default",
                kind, item.name
            ),
        }
    }
}

#[async_trait]
impl PipelineTask for DescribeStackTask {
    fn name(&self) -> &'static str {
        "describe-stack"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(self.stack_name.is_some(), "stack_name is required");
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let stack_name = self.stack_name.clone().unwrap_or_default();
        let cfn = cx.clients.cloudformation(None).await;

        let facts = cfn
            .describe_stack(&stack_name)
            .await?
            .ok_or_else(|| anyhow!("stack {} was not found", stack_name))?;

        info!("stack {} is in status {}", stack_name, facts.status);
        export_items(&mut cx.props, &self.parameters, &facts.parameters, "parameter");
        export_items(&mut cx.props, &self.tags, &facts.tags, "tag");
        export_items(&mut cx.props, &self.outputs, &facts.outputs, "output");
        Ok(())
    }
}

/// Blocks until the stack reaches the given status, a FAILED status, or the
/// attempt cap.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitForStackTask {
    pub stack_name: Option<String>,
    pub status: Option<String>,
    pub poll_interval: Option<DurationString>,
    pub max_attempts: Option<u32>,
}

#[async_trait]
impl PipelineTask for WaitForStackTask {
    fn name(&self) -> &'static str {
        "wait-for-stack"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(self.stack_name.is_some(), "stack_name is required");
        v.require(self.status.is_some(), "status is required");
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let stack_name = self.stack_name.clone().unwrap_or_default();
        let status = self.status.clone().unwrap_or_default();
        let cfn = cx.clients.cloudformation(None).await;

        let probe = StackStatusProbe { ops: cfn };
        let matcher = StatusMatcher::new(status.clone()).failing_on(FAILED);
        let outcome = StatusPoller::new(PollConfig::overridden(
            self.poll_interval.clone().map(Into::into),
            self.max_attempts,
        ))
        .wait(&probe, &stack_name, &matcher)
        .await?;
        resolve_outcome(&stack_name, &status, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_create() -> CreateStackTask {
        CreateStackTask {
            stack_name: Some("web".to_string()),
            template_body: Some("{}".to_string()),
            template_url: None,
            stack_policy_body: None,
            stack_policy_url: None,
            on_failure: None,
            disable_rollback: None,
            timeout_in_minutes: Some(10),
            wait_for_creation: false,
            capabilities: Vec::new(),
            notification_arns: Vec::new(),
            parameters: Vec::new(),
            tags: Vec::new(),
            poll_interval: None,
            max_attempts: None,
        }
    }

    fn violations(err: TaskError) -> Vec<String> {
        match err {
            TaskError::Configuration { violations } => violations,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn minimal_create_stack_passes() {
        assert!(minimal_create().validate().is_ok());
    }

    #[test]
    fn create_stack_collects_every_violation() {
        let task = CreateStackTask {
            stack_name: None,
            template_body: None,
            timeout_in_minutes: None,
            ..minimal_create()
        };
        let v = violations(task.validate().unwrap_err());
        assert_eq!(v.len(), 3);
        assert!(v.iter().any(|m| m.contains("stack_name")));
        assert!(v.iter().any(|m| m.contains("timeout_in_minutes")));
        assert!(v.iter().any(|m| m.contains("template_body")));
    }

    #[test]
    fn create_stack_rejects_both_template_sources() {
        let task = CreateStackTask {
            template_url: Some("https://example.com/t.json".to_string()),
            ..minimal_create()
        };
        let v = violations(task.validate().unwrap_err());
        assert!(v[0].contains("template_body or template_url"));
    }

    #[test]
    fn create_stack_rejects_rollback_conflict() {
        let task = CreateStackTask {
            disable_rollback: Some(true),
            on_failure: Some("DELETE".to_string()),
            ..minimal_create()
        };
        let v = violations(task.validate().unwrap_err());
        assert!(v[0].contains("disable_rollback or on_failure"));
    }

    #[test]
    fn create_stack_rejects_zero_timeout() {
        let task = CreateStackTask {
            timeout_in_minutes: Some(0),
            ..minimal_create()
        };
        assert!(task.validate().is_err());
    }

    #[test]
    fn create_stack_rejects_malformed_template_url() {
        let task = CreateStackTask {
            template_body: None,
            template_url: Some("not a url".to_string()),
            ..minimal_create()
        };
        let v = violations(task.validate().unwrap_err());
        assert!(v[0].contains("not a valid URL"));
    }

    #[test]
    fn update_stack_allows_previous_template() {
        let task = UpdateStackTask {
            stack_name: Some("web".to_string()),
            template_body: None,
            template_url: None,
            use_previous_template: true,
            stack_policy_body: None,
            stack_policy_url: None,
            stack_policy_during_update_body: None,
            stack_policy_during_update_url: None,
            wait_for_update: false,
            capabilities: Vec::new(),
            notification_arns: Vec::new(),
            parameters: Vec::new(),
            poll_interval: None,
            max_attempts: None,
        };
        assert!(task.validate().is_ok());
    }

    #[test]
    fn set_stack_policy_needs_exactly_one_source() {
        let task = SetStackPolicyTask {
            stack_name: Some("web".to_string()),
            stack_policy_body: None,
            stack_policy_url: None,
        };
        assert!(task.validate().is_err());

        let task = SetStackPolicyTask {
            stack_name: Some("web".to_string()),
            stack_policy_body: Some("{}".to_string()),
            stack_policy_url: Some("https://example.com/p.json".to_string()),
        };
        assert!(task.validate().is_err());
    }

    #[test]
    fn wait_for_stack_requires_name_and_status() {
        let task = WaitForStackTask {
            stack_name: None,
            status: None,
            poll_interval: None,
            max_attempts: None,
        };
        let v = violations(task.validate().unwrap_err());
        assert_eq!(v.len(), 2);
    }
}
