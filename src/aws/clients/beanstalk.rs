use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_elasticbeanstalk::types::{
    ConfigurationOptionSetting, EnvironmentTier, S3Location,
};
use aws_sdk_elasticbeanstalk::Client as BeanstalkClient;

use super::traits::{BeanstalkOperations, CreateEnvironmentRequest, EnvironmentState};

pub struct BeanstalkModule {
    client: BeanstalkClient,
}

impl BeanstalkModule {
    pub fn new(client: BeanstalkClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BeanstalkOperations for BeanstalkModule {
    async fn create_application(&self, name: &str, description: Option<&str>) -> Result<()> {
        self.client
            .create_application()
            .application_name(name)
            .set_description(description.map(String::from))
            .send()
            .await
            .with_context(|| format!("Failed to create application {}", name))?;

        Ok(())
    }

    async fn is_cname_available(&self, prefix: &str) -> Result<bool> {
        let result = self
            .client
            .check_dns_availability()
            .cname_prefix(prefix)
            .send()
            .await
            .with_context(|| format!("Failed to check DNS availability for {}", prefix))?;

        Ok(result.available().unwrap_or(false))
    }

    async fn create_environment(
        &self,
        request: CreateEnvironmentRequest,
    ) -> Result<Option<String>> {
        let tier = request.tier.as_ref().map(|t| {
            EnvironmentTier::builder()
                .name(&t.name)
                .r#type(&t.tier_type)
                .version(&t.version)
                .build()
        });
        let option_settings = if request.option_settings.is_empty() {
            None
        } else {
            Some(
                request
                    .option_settings
                    .iter()
                    .map(|s| {
                        ConfigurationOptionSetting::builder()
                            .namespace(&s.namespace)
                            .option_name(&s.option_name)
                            .value(&s.value)
                            .build()
                    })
                    .collect(),
            )
        };

        let result = self
            .client
            .create_environment()
            .application_name(&request.application_name)
            .environment_name(&request.environment_name)
            .description(&request.description)
            .solution_stack_name(&request.solution_stack_name)
            .set_version_label(request.version_label.clone())
            .set_cname_prefix(request.cname_prefix.clone())
            .set_tier(tier)
            .set_option_settings(option_settings)
            .send()
            .await
            .with_context(|| {
                format!("Failed to create environment {}", request.environment_name)
            })?;

        Ok(result.cname().map(String::from))
    }

    async fn create_application_version(
        &self,
        application: &str,
        label: &str,
        description: &str,
        bucket: &str,
        key: &str,
    ) -> Result<()> {
        let source_bundle = S3Location::builder().s3_bucket(bucket).s3_key(key).build();

        self.client
            .create_application_version()
            .application_name(application)
            .version_label(label)
            .description(description)
            .source_bundle(source_bundle)
            .send()
            .await
            .with_context(|| format!("Failed to create application version {}", label))?;

        Ok(())
    }

    async fn update_environment_version(&self, environment: &str, label: &str) -> Result<()> {
        self.client
            .update_environment()
            .environment_name(environment)
            .version_label(label)
            .send()
            .await
            .with_context(|| format!("Failed to update environment {}", environment))?;

        Ok(())
    }

    async fn terminate_environment(&self, environment: &str) -> Result<()> {
        self.client
            .terminate_environment()
            .environment_name(environment)
            .send()
            .await
            .with_context(|| format!("Failed to terminate environment {}", environment))?;

        Ok(())
    }

    async fn environment_state(&self, environment: &str) -> Result<Option<EnvironmentState>> {
        let result = self
            .client
            .describe_environments()
            .environment_names(environment)
            .send()
            .await
            .with_context(|| format!("Failed to describe environment {}", environment))?;

        Ok(result.environments().first().map(|env| EnvironmentState {
            status: env
                .status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            health: env.health().map(|h| h.as_str().to_string()),
        }))
    }
}
