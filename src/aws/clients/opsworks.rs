use std::collections::{BTreeSet, HashMap};

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_opsworks::types::{
    AppType, Architecture, AutoScalingType, ChefConfiguration, DeploymentCommand,
    DeploymentCommandName, LayerAttributesKeys, LayerType, Recipes, RootDeviceType, Source,
    SourceType, StackAttributesKeys, StackConfigurationManager,
};
use aws_sdk_opsworks::Client as OpsWorksClient;

use super::traits::{
    CreateAppRequest, CreateDeploymentRequest, CreateInstanceRequest, CreateLayerRequest,
    CreateOpsWorksStackRequest, OpsWorksOperations, SourceSpec, UpdateAppRequest,
};

pub struct OpsWorksModule {
    client: OpsWorksClient,
}

impl OpsWorksModule {
    pub fn new(client: OpsWorksClient) -> Self {
        Self { client }
    }
}

fn to_sdk_source(spec: &SourceSpec) -> Source {
    Source::builder()
        .set_type(spec.source_type.as_deref().map(SourceType::from))
        .set_url(spec.url.clone())
        .set_username(spec.username.clone())
        .set_password(spec.password.clone())
        .set_ssh_key(spec.ssh_key.clone())
        .set_revision(spec.revision.clone())
        .build()
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values.to_vec())
    }
}

#[async_trait]
impl OpsWorksOperations for OpsWorksModule {
    async fn create_stack(&self, request: CreateOpsWorksStackRequest) -> Result<String> {
        let configuration_manager = request.chef_version.as_ref().map(|version| {
            StackConfigurationManager::builder()
                .name("Chef")
                .version(version)
                .build()
        });
        let chef_configuration =
            if request.manage_berkshelf.is_some() || request.berkshelf_version.is_some() {
                Some(
                    ChefConfiguration::builder()
                        .set_manage_berkshelf(request.manage_berkshelf)
                        .set_berkshelf_version(request.berkshelf_version.clone())
                        .build(),
                )
            } else {
                None
            };
        let attributes = if request.attributes.is_empty() {
            None
        } else {
            Some(
                request
                    .attributes
                    .iter()
                    .map(|(k, v)| (StackAttributesKeys::from(k.as_str()), v.clone()))
                    .collect::<HashMap<_, _>>(),
            )
        };

        let result = self
            .client
            .create_stack()
            .name(&request.name)
            .region(&request.region)
            .service_role_arn(&request.service_role_arn)
            .default_instance_profile_arn(&request.default_instance_profile_arn)
            .set_vpc_id(request.vpc_id.clone())
            .set_default_availability_zone(request.default_availability_zone.clone())
            .set_default_os(request.default_os.clone())
            .set_default_root_device_type(
                request
                    .default_root_device_type
                    .as_deref()
                    .map(RootDeviceType::from),
            )
            .set_default_ssh_key_name(request.default_ssh_key_name.clone())
            .set_hostname_theme(request.hostname_theme.clone())
            .set_custom_json(request.custom_json.clone())
            .use_custom_cookbooks(request.use_custom_cookbooks)
            .use_opsworks_security_groups(request.use_opsworks_security_groups)
            .set_configuration_manager(configuration_manager)
            .set_chef_configuration(chef_configuration)
            .set_custom_cookbooks_source(request.cookbooks_source.as_ref().map(to_sdk_source))
            .set_attributes(attributes)
            .send()
            .await
            .with_context(|| format!("Failed to create OpsWorks stack {}", request.name))?;

        result
            .stack_id()
            .map(String::from)
            .context("No stack ID in create stack response")
    }

    async fn start_stack(&self, stack_id: &str) -> Result<()> {
        self.client
            .start_stack()
            .stack_id(stack_id)
            .send()
            .await
            .with_context(|| format!("Failed to start stack {}", stack_id))?;

        Ok(())
    }

    async fn create_layer(&self, request: CreateLayerRequest) -> Result<String> {
        let attributes = if request.attributes.is_empty() {
            None
        } else {
            Some(
                request
                    .attributes
                    .iter()
                    .map(|(k, v)| (LayerAttributesKeys::from(k.as_str()), v.clone()))
                    .collect::<HashMap<_, _>>(),
            )
        };
        let custom_recipes = if request.custom_recipes.is_empty() {
            None
        } else {
            Some(
                Recipes::builder()
                    .set_configure(non_empty(&request.custom_recipes.configure))
                    .set_deploy(non_empty(&request.custom_recipes.deploy))
                    .set_setup(non_empty(&request.custom_recipes.setup))
                    .set_shutdown(non_empty(&request.custom_recipes.shutdown))
                    .set_undeploy(non_empty(&request.custom_recipes.undeploy))
                    .build(),
            )
        };

        let result = self
            .client
            .create_layer()
            .stack_id(&request.stack_id)
            .r#type(LayerType::from(request.layer_type.as_str()))
            .name(&request.name)
            .shortname(&request.shortname)
            .set_custom_instance_profile_arn(request.custom_instance_profile_arn.clone())
            .enable_auto_healing(request.enable_auto_healing)
            .auto_assign_elastic_ips(request.auto_assign_elastic_ips)
            .auto_assign_public_ips(request.auto_assign_public_ips)
            .install_updates_on_boot(request.install_updates_on_boot)
            .use_ebs_optimized_instances(request.use_ebs_optimized_instances)
            .set_attributes(attributes)
            .set_packages(non_empty(&request.packages))
            .set_custom_security_group_ids(non_empty(&request.custom_security_group_ids))
            .set_custom_recipes(custom_recipes)
            .send()
            .await
            .with_context(|| format!("Failed to create layer {}", request.name))?;

        result
            .layer_id()
            .map(String::from)
            .context("No layer ID in create layer response")
    }

    async fn create_instance(&self, request: CreateInstanceRequest) -> Result<String> {
        let result = self
            .client
            .create_instance()
            .stack_id(&request.stack_id)
            .set_layer_ids(non_empty(&request.layer_ids))
            .instance_type(&request.instance_type)
            .set_os(request.os.clone())
            .set_ami_id(request.ami_id.clone())
            .set_ssh_key_name(request.ssh_key_name.clone())
            .set_availability_zone(request.availability_zone.clone())
            .set_subnet_id(request.subnet_id.clone())
            .set_virtualization_type(request.virtualization_type.clone())
            .set_architecture(request.architecture.as_deref().map(Architecture::from))
            .set_auto_scaling_type(
                request
                    .auto_scaling_type
                    .as_deref()
                    .map(AutoScalingType::from),
            )
            .set_root_device_type(request.root_device_type.as_deref().map(RootDeviceType::from))
            .install_updates_on_boot(request.install_updates_on_boot)
            .ebs_optimized(request.ebs_optimized)
            .send()
            .await
            .context("Failed to create instance")?;

        result
            .instance_id()
            .map(String::from)
            .context("No instance ID in create instance response")
    }

    async fn start_instance(&self, instance_id: &str) -> Result<()> {
        self.client
            .start_instance()
            .instance_id(instance_id)
            .send()
            .await
            .with_context(|| format!("Failed to start instance {}", instance_id))?;

        Ok(())
    }

    async fn create_app(&self, request: CreateAppRequest) -> Result<String> {
        let result = self
            .client
            .create_app()
            .stack_id(&request.stack_id)
            .name(&request.name)
            .r#type(AppType::from(request.app_type.as_str()))
            .set_shortname(request.shortname.clone())
            .set_description(request.description.clone())
            .enable_ssl(request.enable_ssl)
            .set_app_source(request.app_source.as_ref().map(to_sdk_source))
            .set_domains(non_empty(&request.domains))
            .send()
            .await
            .with_context(|| format!("Failed to create app {}", request.name))?;

        result
            .app_id()
            .map(String::from)
            .context("No app ID in create app response")
    }

    async fn update_app(&self, request: UpdateAppRequest) -> Result<()> {
        self.client
            .update_app()
            .app_id(&request.app_id)
            .set_name(request.name.clone())
            .set_type(request.app_type.as_deref().map(AppType::from))
            .set_description(request.description.clone())
            .set_enable_ssl(request.enable_ssl)
            .set_app_source(request.app_source.as_ref().map(to_sdk_source))
            .set_domains(non_empty(&request.domains))
            .send()
            .await
            .with_context(|| format!("Failed to update app {}", request.app_id))?;

        Ok(())
    }

    async fn create_deployment(&self, request: CreateDeploymentRequest) -> Result<String> {
        let args = if request.command_args.is_empty() {
            None
        } else {
            Some(request.command_args.clone())
        };
        let command = DeploymentCommand::builder()
            .name(DeploymentCommandName::from(request.command.as_str()))
            .set_args(args)
            .build()
            .context("Failed to build deployment command")?;

        let result = self
            .client
            .create_deployment()
            .stack_id(&request.stack_id)
            .app_id(&request.app_id)
            .command(command)
            .set_instance_ids(non_empty(&request.instance_ids))
            .set_comment(request.comment.clone())
            .set_custom_json(request.custom_json.clone())
            .send()
            .await
            .context("Failed to create deployment")?;

        result
            .deployment_id()
            .map(String::from)
            .context("No deployment ID in create deployment response")
    }

    async fn deployment_statuses(
        &self,
        deployment_ids: &BTreeSet<String>,
    ) -> Result<HashMap<String, String>> {
        let result = self
            .client
            .describe_deployments()
            .set_deployment_ids(Some(deployment_ids.iter().cloned().collect()))
            .send()
            .await
            .context("Failed to describe deployments")?;

        Ok(result
            .deployments()
            .iter()
            .filter_map(|d| {
                Some((d.deployment_id()?.to_string(), d.status()?.to_string()))
            })
            .collect())
    }

    async fn instance_status(&self, instance_id: &str) -> Result<Option<String>> {
        match self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
        {
            Ok(result) => Ok(result
                .instances()
                .first()
                .and_then(|i| i.status().map(String::from))),
            Err(e) => {
                let err_str = format!("{:?}", e);
                if err_str.contains("ResourceNotFoundException") {
                    Ok(None)
                } else {
                    Err(e).with_context(|| format!("Failed to describe instance {}", instance_id))
                }
            }
        }
    }
}
