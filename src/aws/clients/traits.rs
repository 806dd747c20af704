use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, Default)]
pub struct StackParameter {
    pub key: String,
    pub value: Option<String>,
    pub use_previous_value: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CreateStackRequest {
    pub stack_name: String,
    pub template_body: Option<String>,
    pub template_url: Option<String>,
    pub stack_policy_body: Option<String>,
    pub stack_policy_url: Option<String>,
    pub on_failure: Option<String>,
    pub disable_rollback: Option<bool>,
    pub timeout_in_minutes: i32,
    pub capabilities: Vec<String>,
    pub notification_arns: Vec<String>,
    pub parameters: Vec<StackParameter>,
    pub tags: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateStackRequest {
    pub stack_name: String,
    pub template_body: Option<String>,
    pub template_url: Option<String>,
    pub use_previous_template: Option<bool>,
    pub stack_policy_body: Option<String>,
    pub stack_policy_url: Option<String>,
    pub stack_policy_during_update_body: Option<String>,
    pub stack_policy_during_update_url: Option<String>,
    pub capabilities: Vec<String>,
    pub notification_arns: Vec<String>,
    pub parameters: Vec<StackParameter>,
}

/// Snapshot of a described stack, flattened to what the tasks consume.
#[derive(Debug, Clone, Default)]
pub struct StackFacts {
    pub stack_id: Option<String>,
    pub status: String,
    pub parameters: HashMap<String, String>,
    pub tags: HashMap<String, String>,
    pub outputs: HashMap<String, String>,
}

#[async_trait]
pub trait CloudFormationOperations: Send + Sync {
    async fn create_stack(&self, request: CreateStackRequest) -> Result<String>;
    async fn update_stack(&self, request: UpdateStackRequest) -> Result<String>;
    async fn set_stack_policy(
        &self,
        stack_name: &str,
        policy_body: Option<&str>,
        policy_url: Option<&str>,
    ) -> Result<()>;
    async fn describe_stack(&self, stack_name: &str) -> Result<Option<StackFacts>>;
    async fn stack_status(&self, stack_name: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone)]
pub struct EnvironmentTierSpec {
    pub name: String,
    pub tier_type: String,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct OptionSetting {
    pub namespace: String,
    pub option_name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct CreateEnvironmentRequest {
    pub application_name: String,
    pub environment_name: String,
    pub description: String,
    pub solution_stack_name: String,
    pub version_label: Option<String>,
    pub cname_prefix: Option<String>,
    pub tier: Option<EnvironmentTierSpec>,
    pub option_settings: Vec<OptionSetting>,
}

#[derive(Debug, Clone)]
pub struct EnvironmentState {
    pub status: String,
    pub health: Option<String>,
}

#[async_trait]
pub trait BeanstalkOperations: Send + Sync {
    async fn create_application(&self, name: &str, description: Option<&str>) -> Result<()>;
    async fn is_cname_available(&self, prefix: &str) -> Result<bool>;
    /// Returns the environment CNAME when the configuration supports one.
    async fn create_environment(&self, request: CreateEnvironmentRequest)
        -> Result<Option<String>>;
    async fn create_application_version(
        &self,
        application: &str,
        label: &str,
        description: &str,
        bucket: &str,
        key: &str,
    ) -> Result<()>;
    async fn update_environment_version(&self, environment: &str, label: &str) -> Result<()>;
    async fn terminate_environment(&self, environment: &str) -> Result<()>;
    async fn environment_state(&self, environment: &str) -> Result<Option<EnvironmentState>>;
}

#[derive(Debug, Clone, Default)]
pub struct SourceSpec {
    pub source_type: Option<String>,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssh_key: Option<String>,
    pub revision: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateOpsWorksStackRequest {
    pub name: String,
    pub region: String,
    pub service_role_arn: String,
    pub default_instance_profile_arn: String,
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
    pub use_custom_cookbooks: bool,
    pub use_opsworks_security_groups: bool,
    pub cookbooks_source: Option<SourceSpec>,
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct LayerRecipes {
    pub configure: Vec<String>,
    pub deploy: Vec<String>,
    pub setup: Vec<String>,
    pub shutdown: Vec<String>,
    pub undeploy: Vec<String>,
}

impl LayerRecipes {
    pub fn is_empty(&self) -> bool {
        self.configure.is_empty()
            && self.deploy.is_empty()
            && self.setup.is_empty()
            && self.shutdown.is_empty()
            && self.undeploy.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateLayerRequest {
    pub stack_id: String,
    pub layer_type: String,
    pub name: String,
    pub shortname: String,
    pub custom_instance_profile_arn: Option<String>,
    pub enable_auto_healing: bool,
    pub auto_assign_elastic_ips: bool,
    pub auto_assign_public_ips: bool,
    pub install_updates_on_boot: bool,
    pub use_ebs_optimized_instances: bool,
    pub attributes: HashMap<String, String>,
    pub packages: Vec<String>,
    pub custom_security_group_ids: Vec<String>,
    pub custom_recipes: LayerRecipes,
}

#[derive(Debug, Clone, Default)]
pub struct CreateInstanceRequest {
    pub stack_id: String,
    pub layer_ids: Vec<String>,
    pub instance_type: String,
    pub os: Option<String>,
    pub ami_id: Option<String>,
    pub ssh_key_name: Option<String>,
    pub availability_zone: Option<String>,
    pub subnet_id: Option<String>,
    pub virtualization_type: Option<String>,
    pub architecture: Option<String>,
    pub auto_scaling_type: Option<String>,
    pub root_device_type: Option<String>,
    pub install_updates_on_boot: bool,
    pub ebs_optimized: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CreateAppRequest {
    pub stack_id: String,
    pub name: String,
    pub app_type: String,
    pub shortname: Option<String>,
    pub description: Option<String>,
    pub enable_ssl: bool,
    pub app_source: Option<SourceSpec>,
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateAppRequest {
    pub app_id: String,
    pub name: Option<String>,
    pub app_type: Option<String>,
    pub description: Option<String>,
    pub enable_ssl: Option<bool>,
    pub app_source: Option<SourceSpec>,
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateDeploymentRequest {
    pub stack_id: String,
    pub app_id: String,
    pub command: String,
    pub command_args: HashMap<String, Vec<String>>,
    pub instance_ids: Vec<String>,
    pub comment: Option<String>,
    pub custom_json: Option<String>,
}

#[async_trait]
pub trait OpsWorksOperations: Send + Sync {
    async fn create_stack(&self, request: CreateOpsWorksStackRequest) -> Result<String>;
    async fn start_stack(&self, stack_id: &str) -> Result<()>;
    async fn create_layer(&self, request: CreateLayerRequest) -> Result<String>;
    async fn create_instance(&self, request: CreateInstanceRequest) -> Result<String>;
    async fn start_instance(&self, instance_id: &str) -> Result<()>;
    async fn create_app(&self, request: CreateAppRequest) -> Result<String>;
    async fn update_app(&self, request: UpdateAppRequest) -> Result<()>;
    async fn create_deployment(&self, request: CreateDeploymentRequest) -> Result<String>;
    async fn deployment_statuses(
        &self,
        deployment_ids: &BTreeSet<String>,
    ) -> Result<HashMap<String, String>>;
    async fn instance_status(&self, instance_id: &str) -> Result<Option<String>>;
}

#[async_trait]
pub trait S3Operations: Send + Sync {
    async fn create_bucket(&self, name: &str) -> Result<()>;
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()>;
    async fn get_to_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()>;
    async fn list_keys(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<String>>;
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;
}
