use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use duration_string::DurationString;
use log::info;
use serde::Deserialize;

use super::{resolve_outcome, PipelineTask, RunContext};
use crate::aws::clients::traits::{
    CreateAppRequest, CreateDeploymentRequest, CreateInstanceRequest, CreateLayerRequest,
    CreateOpsWorksStackRequest, LayerRecipes, OpsWorksOperations, SourceSpec, UpdateAppRequest,
};
use crate::error::{TaskError, Violations};
use crate::pipeline::PipelineContext;
use crate::wait::deploy::{
    DeployError, DeploymentDriver, DeploymentGroup, DeploymentOrchestrator, DeploymentPlan,
};
use crate::wait::{PollConfig, StatusMatcher, StatusPoller, StatusProbe};

// Property names tasks use to hand OpsWorks identifiers to each other.
pub const STACK_ID_PROPERTY: &str = "stackId";
pub const APP_ID_PROPERTY: &str = "appId";
pub const LAYER_IDS_PROPERTY: &str = "layerIds";
pub const INSTANCE_IDS_PROPERTY: &str = "instanceIds";
pub const DEPLOYMENT_IDS_PROPERTY: &str = "deploymentIds";

fn default_true() -> bool {
    true
}

/// Uses the explicit parameter when given, otherwise falls back to the
/// shared property published by an earlier task.
fn resolve_id(
    field: &Option<String>,
    props: &PipelineContext,
    key: &str,
    name: &str,
) -> Result<String, TaskError> {
    if let Some(value) = field {
        return Ok(value.clone());
    }
    if let Some(value) = props.shared(key) {
        info!("using {} property as {}", key, name);
        return Ok(value.to_string());
    }
    Err(TaskError::Configuration {
        violations: vec![format!("missing parameter: {} is required", name)],
    })
}

fn check_custom_json(violations: &mut Violations, custom_json: Option<&str>) {
    if let Some(json) = custom_json {
        if serde_json::from_str::<serde_json::Value>(json).is_err() {
            violations.push(
                "error in parameter configuration: custom_json is not valid JSON".to_string(),
            );
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppSourceSpec {
    #[serde(rename = "type")]
    pub source_type: Option<String>,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssh_key: Option<String>,
    pub revision: Option<String>,
}

impl AppSourceSpec {
    fn to_request(&self) -> SourceSpec {
        SourceSpec {
            source_type: self.source_type.clone(),
            url: self.url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            ssh_key: self.ssh_key.clone(),
            revision: self.revision.clone(),
        }
    }
}

/// Creates an OpsWorks stack and publishes its ID for the tasks that follow.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStackTask {
    pub name: Option<String>,
    pub region: Option<String>,
    pub service_role_arn: Option<String>,
    pub default_instance_profile_arn: Option<String>,
    pub vpc_id: Option<String>,
    pub default_availability_zone: Option<String>,
    pub default_os: Option<String>,
    pub default_root_device_type: Option<String>,
    pub default_ssh_key_name: Option<String>,
    pub hostname_theme: Option<String>,
    pub chef_version: Option<String>,
    pub berkshelf_version: Option<String>,
    pub manage_berkshelf: Option<bool>,
    pub custom_json: Option<String>,
    #[serde(default)]
    pub use_custom_cookbooks: bool,
    #[serde(default = "default_true")]
    pub use_opsworks_security_groups: bool,
    pub cookbooks_source: Option<AppSourceSpec>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub start_on_create: bool,
    pub property_name_for_stack_id: Option<String>,
}

#[async_trait]
impl PipelineTask for CreateStackTask {
    fn name(&self) -> &'static str {
        "create-opsworks-stack"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(self.name.is_some(), "name is required");
        v.require(self.region.is_some(), "region is required");
        v.require(self.service_role_arn.is_some(), "service_role_arn is required");
        v.require(
            self.default_instance_profile_arn.is_some(),
            "default_instance_profile_arn is required",
        );
        check_custom_json(&mut v, self.custom_json.as_deref());
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let ops = cx.clients.opsworks(None).await;

        let request = CreateOpsWorksStackRequest {
            name: self.name.clone().unwrap_or_default(),
            region: self.region.clone().unwrap_or_default(),
            service_role_arn: self.service_role_arn.clone().unwrap_or_default(),
            default_instance_profile_arn: self
                .default_instance_profile_arn
                .clone()
                .unwrap_or_default(),
            vpc_id: self.vpc_id.clone(),
            default_availability_zone: self.default_availability_zone.clone(),
            default_os: self.default_os.clone(),
            default_root_device_type: self.default_root_device_type.clone(),
            default_ssh_key_name: self.default_ssh_key_name.clone(),
            hostname_theme: self.hostname_theme.clone(),
            chef_version: self.chef_version.clone(),
            berkshelf_version: self.berkshelf_version.clone(),
            manage_berkshelf: self.manage_berkshelf,
            custom_json: self.custom_json.clone(),
            use_custom_cookbooks: self.use_custom_cookbooks,
            use_opsworks_security_groups: self.use_opsworks_security_groups,
            cookbooks_source: self.cookbooks_source.as_ref().map(|s| s.to_request()),
            attributes: self.attributes.clone(),
        };

        let stack_id = ops.create_stack(request).await?;
        info!("created stack with ID {}", stack_id);

        cx.props.publish(STACK_ID_PROPERTY, &stack_id);
        if let Some(property) = &self.property_name_for_stack_id {
            cx.props.set(property, &stack_id);
        }

        if self.start_on_create {
            ops.start_stack(&stack_id).await?;
            info!("start stack {} request submitted", stack_id);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipesSpec {
    #[serde(default)]
    pub configure: Vec<String>,
    #[serde(default)]
    pub deploy: Vec<String>,
    #[serde(default)]
    pub setup: Vec<String>,
    #[serde(default)]
    pub shutdown: Vec<String>,
    #[serde(default)]
    pub undeploy: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateLayerTask {
    pub stack_id: Option<String>,
    pub layer_type: Option<String>,
    pub name: Option<String>,
    pub shortname: Option<String>,
    pub custom_instance_profile_arn: Option<String>,
    #[serde(default = "default_true")]
    pub enable_auto_healing: bool,
    #[serde(default)]
    pub auto_assign_elastic_ips: bool,
    #[serde(default = "default_true")]
    pub auto_assign_public_ips: bool,
    #[serde(default = "default_true")]
    pub install_updates_on_boot: bool,
    #[serde(default = "default_true")]
    pub use_ebs_optimized_instances: bool,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub custom_security_group_ids: Vec<String>,
    pub custom_recipes: Option<RecipesSpec>,
    pub property_name_for_layer_id: Option<String>,
}

#[async_trait]
impl PipelineTask for CreateLayerTask {
    fn name(&self) -> &'static str {
        "create-opsworks-layer"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(self.layer_type.is_some(), "layer_type is required");
        v.require(self.name.is_some(), "name is required");
        v.require(self.shortname.is_some(), "shortname is required");
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let stack_id = resolve_id(&self.stack_id, &cx.props, STACK_ID_PROPERTY, "stack_id")?;
        let ops = cx.clients.opsworks(None).await;

        let recipes = self.custom_recipes.clone().unwrap_or_default();
        let request = CreateLayerRequest {
            stack_id,
            layer_type: self.layer_type.clone().unwrap_or_default(),
            name: self.name.clone().unwrap_or_default(),
            shortname: self.shortname.clone().unwrap_or_default(),
            custom_instance_profile_arn: self.custom_instance_profile_arn.clone(),
            enable_auto_healing: self.enable_auto_healing,
            auto_assign_elastic_ips: self.auto_assign_elastic_ips,
            auto_assign_public_ips: self.auto_assign_public_ips,
            install_updates_on_boot: self.install_updates_on_boot,
            use_ebs_optimized_instances: self.use_ebs_optimized_instances,
            attributes: self.attributes.clone(),
            packages: self.packages.clone(),
            custom_security_group_ids: self.custom_security_group_ids.clone(),
            custom_recipes: LayerRecipes {
                configure: recipes.configure,
                deploy: recipes.deploy,
                setup: recipes.setup,
                shutdown: recipes.shutdown,
                undeploy: recipes.undeploy,
            },
        };

        let layer_id = ops.create_layer(request).await?;
        info!("created layer with ID {}", layer_id);

        cx.props.append(LAYER_IDS_PROPERTY, &layer_id);
        if let Some(property) = &self.property_name_for_layer_id {
            cx.props.set(property, &layer_id);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateInstanceTask {
    pub stack_id: Option<String>,
    #[serde(default)]
    pub layer_ids: Vec<String>,
    /// Fall back to the layer IDs created earlier in this run when no
    /// explicit layer IDs are given.
    #[serde(default = "default_true")]
    pub use_project_layer_ids: bool,
    pub instance_type: Option<String>,
    pub os: Option<String>,
    pub ami_id: Option<String>,
    pub ssh_key_name: Option<String>,
    pub availability_zone: Option<String>,
    pub subnet_id: Option<String>,
    pub virtualization_type: Option<String>,
    pub architecture: Option<String>,
    pub auto_scaling_type: Option<String>,
    pub root_device_type: Option<String>,
    #[serde(default = "default_true")]
    pub install_updates_on_boot: bool,
    #[serde(default)]
    pub ebs_optimized: bool,
    #[serde(default = "default_true")]
    pub start_on_create: bool,
    pub property_name_for_instance_id: Option<String>,
}

#[async_trait]
impl PipelineTask for CreateInstanceTask {
    fn name(&self) -> &'static str {
        "create-opsworks-instance"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(self.instance_type.is_some(), "instance_type is required");
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let stack_id = resolve_id(&self.stack_id, &cx.props, STACK_ID_PROPERTY, "stack_id")?;

        let mut layer_ids = self.layer_ids.clone();
        if layer_ids.is_empty() && self.use_project_layer_ids {
            if let Some(ids) = cx.props.get(LAYER_IDS_PROPERTY) {
                info!("using {} property as layer_ids", LAYER_IDS_PROPERTY);
                layer_ids = ids.split(',').map(String::from).collect();
            }
        }
        if layer_ids.is_empty() {
            return Err(TaskError::Configuration {
                violations: vec![
                    "missing parameter: at least one layer ID is required".to_string(),
                ],
            });
        }

        let ops = cx.clients.opsworks(None).await;
        let request = CreateInstanceRequest {
            stack_id,
            layer_ids,
            instance_type: self.instance_type.clone().unwrap_or_default(),
            os: self.os.clone(),
            ami_id: self.ami_id.clone(),
            ssh_key_name: self.ssh_key_name.clone(),
            availability_zone: self.availability_zone.clone(),
            subnet_id: self.subnet_id.clone(),
            virtualization_type: self.virtualization_type.clone(),
            architecture: self.architecture.clone(),
            auto_scaling_type: self.auto_scaling_type.clone(),
            root_device_type: self.root_device_type.clone(),
            install_updates_on_boot: self.install_updates_on_boot,
            ebs_optimized: self.ebs_optimized,
        };

        let instance_id = ops.create_instance(request).await?;
        info!("created instance with ID {}", instance_id);

        cx.props.append(INSTANCE_IDS_PROPERTY, &instance_id);
        if let Some(property) = &self.property_name_for_instance_id {
            cx.props.set(property, &instance_id);
        }

        if self.start_on_create {
            ops.start_instance(&instance_id).await?;
            info!("start instance {} request submitted", instance_id);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateAppTask {
    pub stack_id: Option<String>,
    pub name: Option<String>,
    pub app_type: Option<String>,
    pub shortname: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub enable_ssl: bool,
    pub app_source: Option<AppSourceSpec>,
    #[serde(default)]
    pub domains: Vec<String>,
    pub property_name_for_app_id: Option<String>,
}

#[async_trait]
impl PipelineTask for CreateAppTask {
    fn name(&self) -> &'static str {
        "create-opsworks-app"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(self.name.is_some(), "name is required");
        v.require(self.app_type.is_some(), "app_type is required");
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let stack_id = resolve_id(&self.stack_id, &cx.props, STACK_ID_PROPERTY, "stack_id")?;
        let ops = cx.clients.opsworks(None).await;

        let request = CreateAppRequest {
            stack_id,
            name: self.name.clone().unwrap_or_default(),
            app_type: self.app_type.clone().unwrap_or_default(),
            shortname: self.shortname.clone(),
            description: self.description.clone(),
            enable_ssl: self.enable_ssl,
            app_source: self.app_source.as_ref().map(|s| s.to_request()),
            domains: self.domains.clone(),
        };

        let app_id = ops.create_app(request).await?;
        info!("created app with ID {}", app_id);

        cx.props.publish(APP_ID_PROPERTY, &app_id);
        if let Some(property) = &self.property_name_for_app_id {
            cx.props.set(property, &app_id);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAppTask {
    pub app_id: Option<String>,
    pub name: Option<String>,
    pub app_type: Option<String>,
    pub description: Option<String>,
    pub enable_ssl: Option<bool>,
    pub app_source: Option<AppSourceSpec>,
    #[serde(default)]
    pub domains: Vec<String>,
}

#[async_trait]
impl PipelineTask for UpdateAppTask {
    fn name(&self) -> &'static str {
        "update-opsworks-app"
    }

    fn validate(&self) -> Result<(), TaskError> {
        Ok(())
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        let app_id = resolve_id(&self.app_id, &cx.props, APP_ID_PROPERTY, "app_id")?;
        let ops = cx.clients.opsworks(None).await;

        let request = UpdateAppRequest {
            app_id: app_id.clone(),
            name: self.name.clone(),
            app_type: self.app_type.clone(),
            description: self.description.clone(),
            enable_ssl: self.enable_ssl,
            app_source: self.app_source.as_ref().map(|s| s.to_request()),
            domains: self.domains.clone(),
        };

        ops.update_app(request).await?;
        info!("app {} updated", app_id);
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSpec {
    pub name: String,
    #[serde(default)]
    pub args: HashMap<String, Vec<String>>,
}

/// Starts one OpsWorks deployment. As a standalone task it only submits the
/// deployment; grouped under `incremental-deployment` the orchestrator also
/// waits for it.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployAppTask {
    pub stack_id: Option<String>,
    pub app_id: Option<String>,
    pub command: Option<CommandSpec>,
    #[serde(default)]
    pub instance_ids: Vec<String>,
    pub comment: Option<String>,
    pub custom_json: Option<String>,
    pub property_name_for_deployment_id: Option<String>,
}

impl DeployAppTask {
    /// Resolves stack and app IDs against the property map and assembles the
    /// deployment request.
    fn to_request(&self, props: &PipelineContext) -> Result<CreateDeploymentRequest, TaskError> {
        let stack_id = resolve_id(&self.stack_id, props, STACK_ID_PROPERTY, "stack_id")?;
        let app_id = resolve_id(&self.app_id, props, APP_ID_PROPERTY, "app_id")?;
        let command = self.command.clone().ok_or_else(|| TaskError::Configuration {
            violations: vec!["missing parameter: you must specify one command".to_string()],
        })?;

        Ok(CreateDeploymentRequest {
            stack_id,
            app_id,
            command: command.name,
            command_args: command.args,
            instance_ids: self.instance_ids.clone(),
            comment: self.comment.clone(),
            custom_json: self.custom_json.clone(),
        })
    }
}

#[async_trait]
impl PipelineTask for DeployAppTask {
    fn name(&self) -> &'static str {
        "deploy-opsworks-app"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(self.command.is_some(), "you must specify one command");
        check_custom_json(&mut v, self.custom_json.as_deref());
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let request = self.to_request(&cx.props)?;
        let stack_id = request.stack_id.clone();
        let ops = cx.clients.opsworks(None).await;

        let deployment_id = ops.create_deployment(request).await?;
        info!(
            "deployment request submitted. You can view the status of your deployment at https://console.aws.amazon.com/opsworks/home?#/stack/{}/deployments/{}",
            stack_id, deployment_id
        );

        cx.props.append(DEPLOYMENT_IDS_PROPERTY, &deployment_id);
        if let Some(property) = &self.property_name_for_deployment_id {
            cx.props.set(property, &deployment_id);
        }
        Ok(())
    }
}

struct OpsWorksDeploymentDriver {
    ops: Arc<dyn OpsWorksOperations>,
}

#[async_trait]
impl DeploymentDriver for OpsWorksDeploymentDriver {
    type Spec = CreateDeploymentRequest;

    async fn launch(&self, spec: &CreateDeploymentRequest) -> Result<String> {
        let deployment_id = self.ops.create_deployment(spec.clone()).await?;
        info!(
            "deployment request submitted. You can view the status of your deployment at https://console.aws.amazon.com/opsworks/home?#/stack/{}/deployments/{}",
            spec.stack_id, deployment_id
        );
        Ok(deployment_id)
    }

    async fn statuses(
        &self,
        pending: &std::collections::BTreeSet<String>,
    ) -> Result<HashMap<String, String>> {
        self.ops.deployment_statuses(pending).await
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentGroupSpec {
    #[serde(default)]
    pub deployments: Vec<DeployAppTask>,
}

/// Runs groups of deployments in strict sequence. Deployments within a group
/// run in parallel on the provider side; the next group starts only after
/// every deployment in the current group succeeded.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncrementalDeploymentTask {
    #[serde(default)]
    pub groups: Vec<DeploymentGroupSpec>,
    pub poll_interval: Option<DurationString>,
    pub max_attempts: Option<u32>,
}

#[async_trait]
impl PipelineTask for IncrementalDeploymentTask {
    fn name(&self) -> &'static str {
        "incremental-deployment"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        for (group_index, group) in self.groups.iter().enumerate() {
            for (deploy_index, deployment) in group.deployments.iter().enumerate() {
                if let Err(TaskError::Configuration { violations }) = deployment.validate() {
                    for violation in violations {
                        v.push(format!(
                            "group {} deployment {}: {}",
                            group_index + 1,
                            deploy_index + 1,
                            violation
                        ));
                    }
                }
            }
        }
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;

        let mut groups = Vec::new();
        for group in &self.groups {
            let mut requests = Vec::new();
            for deployment in &group.deployments {
                requests.push(deployment.to_request(&cx.props)?);
            }
            groups.push(DeploymentGroup::new(requests));
        }
        let plan = DeploymentPlan::new(groups);

        let driver = OpsWorksDeploymentDriver {
            ops: cx.clients.opsworks(None).await,
        };
        let orchestrator = DeploymentOrchestrator::new(PollConfig::overridden(
            self.poll_interval.clone().map(Into::into),
            self.max_attempts,
        ));

        orchestrator
            .run(&driver, &plan)
            .await
            .map_err(|e| match e {
                DeployError::Failed { id, status } => TaskError::ResourceFailed {
                    resource: format!("deployment {}", id),
                    status,
                },
                DeployError::TimedOut { attempts, pending } => TaskError::Timeout {
                    resource: format!("deployments {}", pending.join(", ")),
                    target: "successful".to_string(),
                    attempts,
                },
                DeployError::Provider(e) => TaskError::Provider(e),
            })
    }
}

struct InstanceProbe {
    ops: Arc<dyn OpsWorksOperations>,
}

#[async_trait]
impl StatusProbe for InstanceProbe {
    async fn status(&self, handle: &str) -> Result<Option<String>> {
        self.ops.instance_status(handle).await
    }
}

/// Blocks until the instance reaches the given state (e.g. "online").
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitForInstanceTask {
    pub instance_id: Option<String>,
    pub state: Option<String>,
    pub poll_interval: Option<DurationString>,
    pub max_attempts: Option<u32>,
}

#[async_trait]
impl PipelineTask for WaitForInstanceTask {
    fn name(&self) -> &'static str {
        "wait-for-opsworks-instance"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(self.instance_id.is_some(), "instance_id is required");
        v.require(self.state.is_some(), "state is required");
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let instance_id = self.instance_id.clone().unwrap_or_default();
        let state = self.state.clone().unwrap_or_default();
        let ops = cx.clients.opsworks(None).await;

        let probe = InstanceProbe { ops };
        let matcher = StatusMatcher::new(state.clone())
            .failing_on("fail")
            .case_insensitive();
        let outcome = StatusPoller::new(PollConfig::overridden(
            self.poll_interval.clone().map(Into::into),
            self.max_attempts,
        ))
        .wait(&probe, &instance_id, &matcher)
        .await?;
        resolve_outcome(&instance_id, &state, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deploy_task(stack_id: Option<&str>, app_id: Option<&str>) -> DeployAppTask {
        DeployAppTask {
            stack_id: stack_id.map(String::from),
            app_id: app_id.map(String::from),
            command: Some(CommandSpec {
                name: "deploy".to_string(),
                args: HashMap::new(),
            }),
            instance_ids: Vec::new(),
            comment: None,
            custom_json: None,
            property_name_for_deployment_id: None,
        }
    }

    #[test]
    fn deploy_requires_a_command() {
        let task = DeployAppTask {
            command: None,
            ..deploy_task(Some("s-1"), Some("a-1"))
        };
        assert!(task.validate().is_err());
    }

    #[test]
    fn deploy_rejects_malformed_custom_json() {
        let task = DeployAppTask {
            custom_json: Some("{not json".to_string()),
            ..deploy_task(Some("s-1"), Some("a-1"))
        };
        assert!(task.validate().is_err());
    }

    #[test]
    fn request_uses_explicit_ids() {
        let props = PipelineContext::new();
        let request = deploy_task(Some("s-1"), Some("a-1"))
            .to_request(&props)
            .unwrap();
        assert_eq!(request.stack_id, "s-1");
        assert_eq!(request.app_id, "a-1");
    }

    #[test]
    fn request_falls_back_to_published_ids() {
        let mut props = PipelineContext::new();
        props.publish(STACK_ID_PROPERTY, "s-published");
        props.publish(APP_ID_PROPERTY, "a-published");
        let request = deploy_task(None, None).to_request(&props).unwrap();
        assert_eq!(request.stack_id, "s-published");
        assert_eq!(request.app_id, "a-published");
    }

    #[test]
    fn request_fails_when_stack_id_is_ambiguous() {
        let mut props = PipelineContext::new();
        props.publish(STACK_ID_PROPERTY, "s-1");
        props.publish(STACK_ID_PROPERTY, "s-2");
        let err = deploy_task(None, Some("a-1"))
            .to_request(&props)
            .unwrap_err();
        assert!(matches!(err, TaskError::Configuration { .. }));
    }

    #[test]
    fn incremental_deployment_collects_nested_violations() {
        let task = IncrementalDeploymentTask {
            groups: vec![
                DeploymentGroupSpec {
                    deployments: vec![deploy_task(Some("s-1"), Some("a-1"))],
                },
                DeploymentGroupSpec {
                    deployments: vec![DeployAppTask {
                        command: None,
                        ..deploy_task(None, None)
                    }],
                },
            ],
            poll_interval: None,
            max_attempts: None,
        };
        let err = task.validate().unwrap_err();
        match err {
            TaskError::Configuration { violations } => {
                assert_eq!(violations.len(), 1);
                assert!(violations[0].starts_with("group 2 deployment 1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
