use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_cloudformation::types::{Capability, OnFailure, Parameter, Stack, Tag};
use aws_sdk_cloudformation::Client as CloudFormationClient;

use super::traits::{
    CloudFormationOperations, CreateStackRequest, StackFacts, UpdateStackRequest,
};

pub struct CloudFormationModule {
    client: CloudFormationClient,
}

impl CloudFormationModule {
    pub fn new(client: CloudFormationClient) -> Self {
        Self { client }
    }

    async fn find_stack(&self, stack_name: &str) -> Result<Option<Stack>> {
        match self
            .client
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await
        {
            Ok(result) => Ok(result.stacks().first().cloned()),
            Err(e) => {
                let err_str = format!("{:?}", e);
                if err_str.contains("does not exist") {
                    Ok(None)
                } else {
                    Err(e).with_context(|| format!("Failed to describe stack {}", stack_name))
                }
            }
        }
    }
}

fn to_sdk_parameters(parameters: &[super::traits::StackParameter]) -> Option<Vec<Parameter>> {
    if parameters.is_empty() {
        return None;
    }
    Some(
        parameters
            .iter()
            .map(|p| {
                Parameter::builder()
                    .parameter_key(&p.key)
                    .set_parameter_value(p.value.clone())
                    .use_previous_value(p.use_previous_value)
                    .build()
            })
            .collect(),
    )
}

fn key_values<I, K, V>(pairs: I) -> HashMap<String, String>
where
    I: Iterator<Item = (Option<K>, Option<V>)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .filter_map(|(k, v)| Some((k?.into(), v?.into())))
        .collect()
}

#[async_trait]
impl CloudFormationOperations for CloudFormationModule {
    async fn create_stack(&self, request: CreateStackRequest) -> Result<String> {
        let capabilities = if request.capabilities.is_empty() {
            None
        } else {
            Some(
                request
                    .capabilities
                    .iter()
                    .map(|c| Capability::from(c.as_str()))
                    .collect(),
            )
        };
        let tags = if request.tags.is_empty() {
            None
        } else {
            Some(
                request
                    .tags
                    .iter()
                    .map(|(k, v)| Tag::builder().key(k).value(v).build())
                    .collect(),
            )
        };

        let result = self
            .client
            .create_stack()
            .stack_name(&request.stack_name)
            .set_template_body(request.template_body.clone())
            .set_template_url(request.template_url.clone())
            .set_stack_policy_body(request.stack_policy_body.clone())
            .set_stack_policy_url(request.stack_policy_url.clone())
            .set_on_failure(request.on_failure.as_deref().map(OnFailure::from))
            .set_disable_rollback(request.disable_rollback)
            .timeout_in_minutes(request.timeout_in_minutes)
            .set_capabilities(capabilities)
            .set_notification_arns(if request.notification_arns.is_empty() {
                None
            } else {
                Some(request.notification_arns.clone())
            })
            .set_parameters(to_sdk_parameters(&request.parameters))
            .set_tags(tags)
            .send()
            .await
            .with_context(|| format!("Failed to create stack {}", request.stack_name))?;

        Ok(result
            .stack_id()
            .unwrap_or(request.stack_name.as_str())
            .to_string())
    }

    async fn update_stack(&self, request: UpdateStackRequest) -> Result<String> {
        let capabilities = if request.capabilities.is_empty() {
            None
        } else {
            Some(
                request
                    .capabilities
                    .iter()
                    .map(|c| Capability::from(c.as_str()))
                    .collect(),
            )
        };

        let result = self
            .client
            .update_stack()
            .stack_name(&request.stack_name)
            .set_template_body(request.template_body.clone())
            .set_template_url(request.template_url.clone())
            .set_use_previous_template(request.use_previous_template)
            .set_stack_policy_body(request.stack_policy_body.clone())
            .set_stack_policy_url(request.stack_policy_url.clone())
            .set_stack_policy_during_update_body(request.stack_policy_during_update_body.clone())
            .set_stack_policy_during_update_url(request.stack_policy_during_update_url.clone())
            .set_capabilities(capabilities)
            .set_notification_arns(if request.notification_arns.is_empty() {
                None
            } else {
                Some(request.notification_arns.clone())
            })
            .set_parameters(to_sdk_parameters(&request.parameters))
            .send()
            .await
            .with_context(|| format!("Failed to update stack {}", request.stack_name))?;

        Ok(result
            .stack_id()
            .unwrap_or(request.stack_name.as_str())
            .to_string())
    }

    async fn set_stack_policy(
        &self,
        stack_name: &str,
        policy_body: Option<&str>,
        policy_url: Option<&str>,
    ) -> Result<()> {
        self.client
            .set_stack_policy()
            .stack_name(stack_name)
            .set_stack_policy_body(policy_body.map(String::from))
            .set_stack_policy_url(policy_url.map(String::from))
            .send()
            .await
            .with_context(|| format!("Failed to set stack policy for {}", stack_name))?;

        Ok(())
    }

    async fn describe_stack(&self, stack_name: &str) -> Result<Option<StackFacts>> {
        let Some(stack) = self.find_stack(stack_name).await? else {
            return Ok(None);
        };

        Ok(Some(StackFacts {
            stack_id: stack.stack_id().map(String::from),
            status: stack
                .stack_status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            parameters: key_values(
                stack
                    .parameters()
                    .iter()
                    .map(|p| (p.parameter_key(), p.parameter_value())),
            ),
            tags: key_values(stack.tags().iter().map(|t| (t.key(), t.value()))),
            outputs: key_values(
                stack
                    .outputs()
                    .iter()
                    .map(|o| (o.output_key(), o.output_value())),
            ),
        }))
    }

    async fn stack_status(&self, stack_name: &str) -> Result<Option<String>> {
        let stack = self.find_stack(stack_name).await?;
        Ok(stack.and_then(|s| s.stack_status().map(|status| status.as_str().to_string())))
    }
}
