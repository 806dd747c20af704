use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use super::traits::S3Operations;

pub struct S3Module {
    client: S3Client,
    region: Option<String>,
}

impl S3Module {
    pub fn new(client: S3Client, region: Option<String>) -> Self {
        Self { client, region }
    }
}

#[async_trait]
impl S3Operations for S3Module {
    async fn create_bucket(&self, name: &str) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(name);

        if let Some(region) = self.region.as_deref() {
            if region != "us-east-1" {
                let constraint = aws_sdk_s3::types::BucketLocationConstraint::from(region);
                let cfg = aws_sdk_s3::types::CreateBucketConfiguration::builder()
                    .location_constraint(constraint)
                    .build();
                request = request.create_bucket_configuration(cfg);
            }
        }

        request
            .send()
            .await
            .with_context(|| format!("Failed to create S3 bucket: {}", name))?;

        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err_str = format!("{:?}", e);
                if err_str.contains("NotFound") || err_str.contains("404") {
                    Ok(false)
                } else if err_str.contains("301") {
                    // Redirect means the bucket exists in another region.
                    Ok(true)
                } else {
                    Err(e).with_context(|| format!("Failed to check bucket {}", bucket))
                }
            }
        }
    }

    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("Failed to read file {}", path.display()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to upload {}/{}", bucket, key))?;

        Ok(())
    }

    async fn get_to_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let result = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to download {}/{}", bucket, key))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let bytes = result
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read object body for {}/{}", bucket, key))?
            .into_bytes();
        tokio::fs::write(path, &bytes)
            .await
            .with_context(|| format!("Failed to write file {}", path.display()))?;

        Ok(())
    }

    async fn list_keys(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let result = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_prefix(prefix.map(String::from))
                .set_continuation_token(continuation_token.clone())
                .send()
                .await
                .with_context(|| format!("Failed to list objects in {}", bucket))?;

            keys.extend(
                result
                    .contents()
                    .iter()
                    .filter_map(|o| o.key().map(String::from)),
            );

            match result.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to delete object {}/{}", bucket, key))?;

        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .with_context(|| format!("Failed to delete bucket {}", bucket))?;

        Ok(())
    }
}
