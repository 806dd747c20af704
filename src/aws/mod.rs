pub mod clients;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::config::Credentials;
use log::debug;

use clients::beanstalk::BeanstalkModule;
use clients::cloudformation::CloudFormationModule;
use clients::opsworks::OpsWorksModule;
use clients::s3::S3Module;
use clients::traits::{
    BeanstalkOperations, CloudFormationOperations, OpsWorksOperations, S3Operations,
};

/// Explicit client configuration. Static keys are for testing or throwaway
/// accounts; when absent the SDK default credential chain applies.
#[derive(Debug, Clone, Default)]
pub struct AwsSettings {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: Option<String>,
}

impl AwsSettings {
    fn static_credentials(&self) -> Option<Credentials> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(key), Some(secret)) => {
                Some(Credentials::new(key.clone(), secret.clone(), None, None, "rigger"))
            }
            _ => None,
        }
    }
}

const DEFAULT_REGION_KEY: &str = "default";

/// Lazily-constructed service clients, cached per (service, region) for the
/// lifetime of one pipeline run. Owned by the run, never process-global.
pub struct ClientRegistry {
    settings: AwsSettings,
    cloudformation: Mutex<HashMap<String, Arc<CloudFormationModule>>>,
    beanstalk: Mutex<HashMap<String, Arc<BeanstalkModule>>>,
    opsworks: Mutex<HashMap<String, Arc<OpsWorksModule>>>,
    s3: Mutex<HashMap<String, Arc<S3Module>>>,
}

impl ClientRegistry {
    pub fn new(settings: AwsSettings) -> Self {
        Self {
            settings,
            cloudformation: Mutex::new(HashMap::new()),
            beanstalk: Mutex::new(HashMap::new()),
            opsworks: Mutex::new(HashMap::new()),
            s3: Mutex::new(HashMap::new()),
        }
    }

    fn region_key(&self, region: Option<&str>) -> String {
        region
            .or(self.settings.region.as_deref())
            .unwrap_or(DEFAULT_REGION_KEY)
            .to_string()
    }

    async fn sdk_config(&self, region: Option<&str>) -> SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = region.or(self.settings.region.as_deref()) {
            loader = loader.region(Region::new(region.to_string()));
        }
        if let Some(credentials) = self.settings.static_credentials() {
            loader = loader.credentials_provider(credentials);
        }

        loader.load().await
    }

    pub async fn cloudformation(
        &self,
        region: Option<&str>,
    ) -> Arc<dyn CloudFormationOperations> {
        let key = self.region_key(region);
        if let Some(module) = self.cloudformation.lock().unwrap().get(&key) {
            return module.clone();
        }

        debug!("constructing CloudFormation client for region '{}'", key);
        let config = self.sdk_config(region).await;
        let module = Arc::new(CloudFormationModule::new(
            aws_sdk_cloudformation::Client::new(&config),
        ));
        self.cloudformation
            .lock()
            .unwrap()
            .entry(key)
            .or_insert(module)
            .clone()
    }

    pub async fn beanstalk(&self, region: Option<&str>) -> Arc<dyn BeanstalkOperations> {
        let key = self.region_key(region);
        if let Some(module) = self.beanstalk.lock().unwrap().get(&key) {
            return module.clone();
        }

        debug!("constructing Elastic Beanstalk client for region '{}'", key);
        let config = self.sdk_config(region).await;
        let module = Arc::new(BeanstalkModule::new(aws_sdk_elasticbeanstalk::Client::new(
            &config,
        )));
        self.beanstalk
            .lock()
            .unwrap()
            .entry(key)
            .or_insert(module)
            .clone()
    }

    pub async fn opsworks(&self, region: Option<&str>) -> Arc<dyn OpsWorksOperations> {
        let key = self.region_key(region);
        if let Some(module) = self.opsworks.lock().unwrap().get(&key) {
            return module.clone();
        }

        debug!("constructing OpsWorks client for region '{}'", key);
        let config = self.sdk_config(region).await;
        let module = Arc::new(OpsWorksModule::new(aws_sdk_opsworks::Client::new(&config)));
        self.opsworks
            .lock()
            .unwrap()
            .entry(key)
            .or_insert(module)
            .clone()
    }

    pub async fn s3(&self, region: Option<&str>) -> Arc<dyn S3Operations> {
        let key = self.region_key(region);
        if let Some(module) = self.s3.lock().unwrap().get(&key) {
            return module.clone();
        }

        debug!("constructing S3 client for region '{}'", key);
        let config = self.sdk_config(region).await;
        let region_label = config.region().map(|r| r.to_string());
        let module = Arc::new(S3Module::new(
            aws_sdk_s3::Client::new(&config),
            region_label,
        ));
        self.s3.lock().unwrap().entry(key).or_insert(module).clone()
    }
}
