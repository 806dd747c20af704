use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use glob::Pattern;
use log::{error, info};
use serde::Deserialize;
use walkdir::WalkDir;

use super::{PipelineTask, RunContext};
use crate::error::{TaskError, Violations};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateBucketTask {
    pub bucket_name: Option<String>,
}

#[async_trait]
impl PipelineTask for CreateBucketTask {
    fn name(&self) -> &'static str {
        "create-s3-bucket"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(self.bucket_name.is_some(), "bucket_name is required");
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let bucket_name = self.bucket_name.clone().unwrap_or_default();
        let s3 = cx.clients.s3(None).await;

        if s3.bucket_exists(&bucket_name).await? {
            info!("bucket {} already exists", bucket_name);
            return Ok(());
        }

        info!("creating bucket {}", bucket_name);
        s3.create_bucket(&bucket_name).await?;
        info!("bucket {} created", bucket_name);
        Ok(())
    }
}

/// Walks `dir` and returns every file whose path relative to `dir` matches
/// one of the include patterns.
fn matching_files(dir: &Path, patterns: &[Pattern]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("Failed to walk directory {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or(entry.path());
        if patterns.is_empty() || patterns.iter().any(|p| p.matches_path(relative)) {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Uploads every matching file under `dir` to the bucket, flat under the key
/// prefix. `continue_on_fail` keeps going past individual upload failures,
/// since the files are independent of each other.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadTask {
    pub bucket_name: Option<String>,
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub include: Vec<String>,
    pub key_prefix: Option<String>,
    #[serde(default)]
    pub continue_on_fail: bool,
}

#[async_trait]
impl PipelineTask for UploadTask {
    fn name(&self) -> &'static str {
        "upload-to-s3"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(self.bucket_name.is_some(), "bucket_name is required");
        v.require(self.dir.is_some(), "dir is required");
        for pattern in &self.include {
            if Pattern::new(pattern).is_err() {
                v.push(format!(
                    "error in parameter configuration: include pattern '{}' is not a valid glob",
                    pattern
                ));
            }
        }
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let bucket_name = self.bucket_name.clone().unwrap_or_default();
        let dir = self.dir.clone().unwrap_or_default();
        let key_prefix = self.key_prefix.clone().unwrap_or_default();
        let s3 = cx.clients.s3(None).await;

        let patterns: Vec<Pattern> = self
            .include
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect();
        let files = matching_files(&dir, &patterns)?;
        info!("uploading {} files to bucket {}", files.len(), bucket_name);

        for file in &files {
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let key = format!("{}{}", key_prefix, file_name);

            info!("uploading file {}...", file.display());
            match s3.put_file(&bucket_name, &key, file).await {
                Ok(()) => info!("upload successful"),
                Err(e) => {
                    if self.continue_on_fail {
                        error!("the file {} failed to upload, continuing: {}", file.display(), e);
                    } else {
                        return Err(TaskError::Provider(e.context(format!(
                            "the file that failed to upload was: {}",
                            file.display()
                        ))));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Downloads a single object to a file, or every object under a key prefix
/// into a directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownloadTask {
    pub bucket_name: Option<String>,
    pub key: Option<String>,
    pub key_prefix: Option<String>,
    pub file: Option<PathBuf>,
    pub dir: Option<PathBuf>,
}

#[async_trait]
impl PipelineTask for DownloadTask {
    fn name(&self) -> &'static str {
        "download-from-s3"
    }

    fn validate(&self) -> Result<(), TaskError> {
        let mut v = Violations::new();
        v.require(self.bucket_name.is_some(), "bucket_name is required");
        v.forbid(
            self.key.is_some() && self.key_prefix.is_some(),
            "key and key_prefix cannot both be set; download either a single file or all files with a prefix",
        );
        v.forbid(
            self.key.is_none() && self.key_prefix.is_none(),
            "either key or key_prefix must be set",
        );
        v.forbid(
            self.key_prefix.is_some() && self.file.is_some(),
            "key_prefix and file cannot both be set; with key_prefix, files are downloaded as their keys",
        );
        v.forbid(
            self.key_prefix.is_some() && self.dir.is_none(),
            "if key_prefix is set, then dir must be set to specify what directory to download the files to",
        );
        v.into_result()
    }

    async fn execute(&self, cx: &mut RunContext) -> Result<(), TaskError> {
        self.validate()?;
        let bucket_name = self.bucket_name.clone().unwrap_or_default();
        let s3 = cx.clients.s3(None).await;

        if let Some(key) = &self.key {
            let target = self
                .file
                .clone()
                .unwrap_or_else(|| PathBuf::from(key));
            info!(
                "downloading object {}/{} to file {}...",
                bucket_name,
                key,
                target.display()
            );
            s3.get_to_file(&bucket_name, key, &target).await?;
            info!("download successful");
            return Ok(());
        }

        let key_prefix = self.key_prefix.clone().unwrap_or_default();
        let dir = self.dir.clone().unwrap_or_default();
        let keys = s3.list_keys(&bucket_name, Some(&key_prefix)).await?;
        info!(
            "downloading {} objects with prefix '{}' from bucket {}",
            keys.len(),
            key_prefix,
            bucket_name
        );

        for key in &keys {
            let target = dir.join(key);
            info!("downloading object {} to {}...", key, target.display());
            s3.get_to_file(&bucket_name, key, &target).await?;
        }
        info!("download successful");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violations(err: TaskError) -> Vec<String> {
        match err {
            TaskError::Configuration { violations } => violations,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn download_mutual_exclusions() {
        let both = DownloadTask {
            bucket_name: Some("bucket".to_string()),
            key: Some("a".to_string()),
            key_prefix: Some("p/".to_string()),
            file: None,
            dir: None,
        };
        assert!(both.validate().is_err());

        let neither = DownloadTask {
            bucket_name: Some("bucket".to_string()),
            key: None,
            key_prefix: None,
            file: None,
            dir: None,
        };
        let v = violations(neither.validate().unwrap_err());
        assert!(v[0].contains("either key or key_prefix"));

        let prefix_without_dir = DownloadTask {
            bucket_name: Some("bucket".to_string()),
            key: None,
            key_prefix: Some("p/".to_string()),
            file: None,
            dir: None,
        };
        let v = violations(prefix_without_dir.validate().unwrap_err());
        assert!(v[0].contains("dir must be set"));
    }

    #[test]
    fn upload_rejects_bad_glob() {
        let task = UploadTask {
            bucket_name: Some("bucket".to_string()),
            dir: Some(PathBuf::from(".")),
            include: vec!["[".to_string()],
            key_prefix: None,
            continue_on_fail: false,
        };
        let v = violations(task.validate().unwrap_err());
        assert!(v[0].contains("not a valid glob"));
    }

    #[test]
    fn matching_files_honors_patterns() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.war"), b"war").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"txt").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/c.war"), b"war").unwrap();

        let patterns = vec![Pattern::new("**/*.war").unwrap()];
        let files = matching_files(dir.path(), &patterns).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| {
                f.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names, vec!["a.war".to_string(), "sub/c.war".to_string()]);
    }

    #[test]
    fn matching_files_defaults_to_everything() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.war"), b"war").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"txt").unwrap();

        let files = matching_files(dir.path(), &[]).unwrap();
        assert_eq!(files.len(), 2);
    }
}
