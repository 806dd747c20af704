use std::time::Duration;

use rigger::pipeline::Pipeline;
use rigger::pipeline::runner::Runner;
use rigger::aws::AwsSettings;
use rigger::tasks::TaskSpec;

const FULL_PIPELINE: &str = r#"
name: release
region: us-east-1
tasks:
  - type: create-s3-bucket
    bucket_name: deploy-artifacts
  - type: upload-to-s3
    bucket_name: deploy-artifacts
    dir: target/dist
    include:
      - "**/*.war"
    key_prefix: builds/
    continue_on_fail: true
  - type: download-from-s3
    bucket_name: deploy-artifacts
    key_prefix: builds/
    dir: incoming
  - type: create-stack
    stack_name: web
    template_url: https://templates.example.com/web.json
    timeout_in_minutes: 15
    wait_for_creation: true
    poll_interval: 30s
    max_attempts: 60
    capabilities:
      - CAPABILITY_IAM
    parameters:
      - key: InstanceType
        value: m3.medium
    tags:
      - key: team
        value: platform
  - type: update-stack
    stack_name: web
    use_previous_template: true
  - type: set-stack-policy
    stack_name: web
    stack_policy_body: "{}"
  - type: describe-stack
    stack_name: web
    outputs:
      - name: LoadBalancerDNS
        property: web.dns
  - type: wait-for-stack
    stack_name: web
    status: UPDATE_COMPLETE
  - type: create-beanstalk-application
    application_name: storefront
  - type: create-beanstalk-environment
    application_name: storefront
    environment_name: storefront-prod
    environment_description: production environment
    solution_stack_name: 64bit Amazon Linux running Tomcat 7
    cname_prefix: storefront-prod
    settings:
      - namespace: aws:autoscaling:launchconfiguration
        option_name: InstanceType
        value: m3.medium
  - type: deploy-beanstalk-application
    bucket_name: deploy-artifacts
    file: target/dist/app.war
    version_label: v42
    version_description: release 42
    application_name: storefront
    environment_name: storefront-prod
  - type: wait-for-beanstalk-environment
    environment_name: storefront-prod
    status: Ready
    health: Green
  - type: terminate-beanstalk-environment
    environment_name: storefront-staging
  - type: create-opsworks-stack
    name: api
    region: us-east-1
    service_role_arn: arn:aws:iam::123456789012:role/opsworks-service
    default_instance_profile_arn: arn:aws:iam::123456789012:instance-profile/opsworks
    custom_json: '{"env": "prod"}'
  - type: create-opsworks-layer
    layer_type: java-app
    name: API Servers
    shortname: api
  - type: create-opsworks-instance
    instance_type: c3.large
  - type: create-opsworks-app
    name: api
    app_type: java
    app_source:
      type: git
      url: git@github.com:example/api.git
      revision: release
  - type: update-opsworks-app
    description: updated description
  - type: deploy-opsworks-app
    command:
      name: deploy
  - type: wait-for-opsworks-instance
    instance_id: i-0abc
    state: online
  - type: incremental-deployment
    poll_interval: 10s
    max_attempts: 100
    groups:
      - deployments:
          - command:
              name: deploy
            instance_ids:
              - i-0abc
      - deployments:
          - command:
              name: deploy
            instance_ids:
              - i-0def
"#;

#[test]
fn full_pipeline_parses_and_validates() {
    let pipeline = Pipeline::from_yaml(FULL_PIPELINE).unwrap();
    assert_eq!(pipeline.tasks.len(), 21);
    assert_eq!(pipeline.region.as_deref(), Some("us-east-1"));

    let runner = Runner::new(AwsSettings::default());
    runner.validate(&pipeline).unwrap();
}

#[test]
fn poll_overrides_are_parsed() {
    let pipeline = Pipeline::from_yaml(FULL_PIPELINE).unwrap();
    let Some(TaskSpec::CreateStack(task)) = pipeline
        .tasks
        .iter()
        .find(|t| matches!(t, TaskSpec::CreateStack(_)))
    else {
        panic!("create-stack task not found");
    };
    let interval: Duration = task.poll_interval.clone().unwrap().into();
    assert_eq!(interval, Duration::from_secs(30));
    assert_eq!(task.max_attempts, Some(60));
}

#[test]
fn incremental_deployment_groups_keep_their_order() {
    let pipeline = Pipeline::from_yaml(FULL_PIPELINE).unwrap();
    let Some(TaskSpec::IncrementalDeployment(task)) = pipeline
        .tasks
        .iter()
        .find(|t| matches!(t, TaskSpec::IncrementalDeployment(_)))
    else {
        panic!("incremental-deployment task not found");
    };
    assert_eq!(task.groups.len(), 2);
    assert_eq!(task.groups[0].deployments[0].instance_ids, vec!["i-0abc"]);
    assert_eq!(task.groups[1].deployments[0].instance_ids, vec!["i-0def"]);
}

#[test]
fn unknown_task_type_is_rejected() {
    let err = Pipeline::from_yaml(
        r#"
tasks:
  - type: make-coffee
"#,
    )
    .unwrap_err();
    assert!(format!("{:#}", err).contains("unknown variant"));
}

#[test]
fn unknown_task_field_is_rejected() {
    let result = Pipeline::from_yaml(
        r#"
tasks:
  - type: create-s3-bucket
    bucket_name: deploy-artifacts
    bucketname: typo
"#,
    );
    assert!(result.is_err());
}

#[test]
fn invalid_pipeline_reports_every_failing_task() {
    let pipeline = Pipeline::from_yaml(
        r#"
tasks:
  - type: create-stack
  - type: deploy-beanstalk-application
"#,
    )
    .unwrap();

    let runner = Runner::new(AwsSettings::default());
    let message = runner.validate(&pipeline).unwrap_err().to_string();
    assert!(message.contains("task 1 'create-stack'"));
    assert!(message.contains("task 2 'deploy-beanstalk-application'"));
    assert!(message.contains("stack_name is required"));
    assert!(message.contains("bucket_name is required"));
}

mod aws_integration {
    use super::*;
    use std::io::Write;

    use rigger::aws::ClientRegistry;
    use rigger::tasks::{PipelineTask, RunContext};
    use rigger::tasks::s3::{CreateBucketTask, DownloadTask, UploadTask};

    fn test_settings() -> AwsSettings {
        AwsSettings {
            access_key_id: None,
            secret_access_key: None,
            region: std::env::var("AWS_REGION").ok(),
        }
    }

    fn test_bucket_name() -> String {
        format!("rigger-test-{}", std::process::id())
    }

    #[tokio::test]
    #[ignore = "Integration test - requires AWS credentials"]
    async fn s3_upload_download_round_trip() {
        let bucket_name = test_bucket_name();
        let mut cx = RunContext::new(ClientRegistry::new(test_settings()));

        let create = CreateBucketTask {
            bucket_name: Some(bucket_name.clone()),
        };
        create.validate().unwrap();
        create.execute(&mut cx).await.unwrap();

        let upload_dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(upload_dir.path().join("artifact.war")).unwrap();
        writeln!(file, "artifact body").unwrap();

        let upload = UploadTask {
            bucket_name: Some(bucket_name.clone()),
            dir: Some(upload_dir.path().to_path_buf()),
            include: vec!["*.war".to_string()],
            key_prefix: Some("builds/".to_string()),
            continue_on_fail: false,
        };
        upload.validate().unwrap();
        upload.execute(&mut cx).await.unwrap();

        let download_dir = tempfile::tempdir().unwrap();
        let download = DownloadTask {
            bucket_name: Some(bucket_name.clone()),
            key: None,
            key_prefix: Some("builds/".to_string()),
            file: None,
            dir: Some(download_dir.path().to_path_buf()),
        };
        download.validate().unwrap();
        download.execute(&mut cx).await.unwrap();

        let downloaded =
            std::fs::read_to_string(download_dir.path().join("builds/artifact.war")).unwrap();
        assert_eq!(downloaded, "artifact body\n");

        // Cleanup.
        let s3 = cx.clients.s3(None).await;
        for key in s3.list_keys(&bucket_name, None).await.unwrap() {
            s3.delete_object(&bucket_name, &key).await.unwrap();
        }
        s3.delete_bucket(&bucket_name).await.unwrap();
    }
}
