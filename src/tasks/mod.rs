pub mod beanstalk;
pub mod cloudformation;
pub mod opsworks;
pub mod s3;

use async_trait::async_trait;
use log::info;
use serde::Deserialize;

use crate::aws::ClientRegistry;
use crate::error::TaskError;
use crate::pipeline::PipelineContext;
use crate::wait::PollOutcome;

/// Everything a task sees while executing: the per-run client registry and
/// the shared property map.
pub struct RunContext {
    pub clients: ClientRegistry,
    pub props: PipelineContext,
}

impl RunContext {
    pub fn new(clients: ClientRegistry) -> Self {
        Self {
            clients,
            props: PipelineContext::new(),
        }
    }
}

#[async_trait]
pub trait PipelineTask: Send + Sync {
    fn name(&self) -> &'static str;

    /// Parameter validation only. Never touches the network; collects every
    /// violation into one configuration error.
    fn validate(&self) -> Result<(), TaskError>;

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError>;
}

/// All task types a pipeline document can contain.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TaskSpec {
    CreateStack(cloudformation::CreateStackTask),
    UpdateStack(cloudformation::UpdateStackTask),
    SetStackPolicy(cloudformation::SetStackPolicyTask),
    DescribeStack(cloudformation::DescribeStackTask),
    WaitForStack(cloudformation::WaitForStackTask),
    CreateBeanstalkApplication(beanstalk::CreateApplicationTask),
    CreateBeanstalkEnvironment(beanstalk::CreateEnvironmentTask),
    DeployBeanstalkApplication(beanstalk::DeployApplicationTask),
    TerminateBeanstalkEnvironment(beanstalk::TerminateEnvironmentTask),
    WaitForBeanstalkEnvironment(beanstalk::WaitForEnvironmentTask),
    CreateOpsworksStack(opsworks::CreateStackTask),
    CreateOpsworksLayer(opsworks::CreateLayerTask),
    CreateOpsworksInstance(opsworks::CreateInstanceTask),
    CreateOpsworksApp(opsworks::CreateAppTask),
    UpdateOpsworksApp(opsworks::UpdateAppTask),
    DeployOpsworksApp(opsworks::DeployAppTask),
    IncrementalDeployment(opsworks::IncrementalDeploymentTask),
    WaitForOpsworksInstance(opsworks::WaitForInstanceTask),
    CreateS3Bucket(s3::CreateBucketTask),
    UploadToS3(s3::UploadTask),
    DownloadFromS3(s3::DownloadTask),
}

impl TaskSpec {
    pub fn as_task(&self) -> &dyn PipelineTask {
        match self {
            TaskSpec::CreateStack(t) => t,
            TaskSpec::UpdateStack(t) => t,
            TaskSpec::SetStackPolicy(t) => t,
            TaskSpec::DescribeStack(t) => t,
            TaskSpec::WaitForStack(t) => t,
            TaskSpec::CreateBeanstalkApplication(t) => t,
            TaskSpec::CreateBeanstalkEnvironment(t) => t,
            TaskSpec::DeployBeanstalkApplication(t) => t,
            TaskSpec::TerminateBeanstalkEnvironment(t) => t,
            TaskSpec::WaitForBeanstalkEnvironment(t) => t,
            TaskSpec::CreateOpsworksStack(t) => t,
            TaskSpec::CreateOpsworksLayer(t) => t,
            TaskSpec::CreateOpsworksInstance(t) => t,
            TaskSpec::CreateOpsworksApp(t) => t,
            TaskSpec::UpdateOpsworksApp(t) => t,
            TaskSpec::DeployOpsworksApp(t) => t,
            TaskSpec::IncrementalDeployment(t) => t,
            TaskSpec::WaitForOpsworksInstance(t) => t,
            TaskSpec::CreateS3Bucket(t) => t,
            TaskSpec::UploadToS3(t) => t,
            TaskSpec::DownloadFromS3(t) => t,
        }
    }
}

/// Maps a poll outcome onto the task result. `Gone` resolves successfully
/// for every resource type.
pub(crate) fn resolve_outcome(
    resource: &str,
    target: &str,
    outcome: PollOutcome,
) -> Result<(), TaskError> {
    match outcome {
        PollOutcome::Reached { status, .. } => {
            info!("{} reached status {}", resource, status);
            Ok(())
        }
        PollOutcome::Gone { .. } => Ok(()),
        PollOutcome::Failed { status, .. } => Err(TaskError::ResourceFailed {
            resource: resource.to_string(),
            status,
        }),
        PollOutcome::TimedOut { attempts } => Err(TaskError::Timeout {
            resource: resource.to_string(),
            target: target.to_string(),
            attempts,
        }),
    }
}
