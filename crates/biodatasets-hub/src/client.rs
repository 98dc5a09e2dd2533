//! Minimal client for the dataset hub HTTP API.
//!
//! Covers what an upload needs: repository creation, listing and reading
//! files, Git LFS uploads and NDJSON commits.
use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";
const LFS_CONTENT_TYPE: &str = "application/vnd.git-lfs+json";

/// Token from the argument, then `HF_TOKEN`, then the local hub token cache.
pub fn resolve_token(explicit: Option<String>) -> Option<String> {
    explicit
        .or_else(|| std::env::var("HF_TOKEN").ok().filter(|token| !token.is_empty()))
        .or_else(|| hf_hub::Cache::default().token())
}

/// Endpoint from the argument, then `HF_ENDPOINT`, then the public hub.
pub fn resolve_endpoint(explicit: Option<String>) -> String {
    explicit
        .or_else(|| std::env::var("HF_ENDPOINT").ok().filter(|endpoint| !endpoint.is_empty()))
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Hex SHA-256 and size of a file, as used for LFS object ids.
pub fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let mut file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let size = std::io::copy(&mut file, &mut hasher)?;
    Ok((format!("{:x}", hasher.finalize()), size))
}

/// One change in a commit.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOperation {
    /// Small file committed inline.
    Add { path_in_repo: String, content: Vec<u8> },
    /// File uploaded through LFS and committed as a pointer.
    AddLfs {
        path_in_repo: String,
        local_path: PathBuf,
        oid: String,
        size: u64,
    },
    Delete { path_in_repo: String },
}

impl CommitOperation {
    pub fn lfs(path_in_repo: impl Into<String>, local_path: impl Into<PathBuf>) -> Result<Self> {
        let local_path = local_path.into();
        let (oid, size) = sha256_file(&local_path)?;
        Ok(CommitOperation::AddLfs {
            path_in_repo: path_in_repo.into(),
            local_path,
            oid,
            size,
        })
    }

    pub fn path_in_repo(&self) -> &str {
        match self {
            CommitOperation::Add { path_in_repo, .. }
            | CommitOperation::AddLfs { path_in_repo, .. }
            | CommitOperation::Delete { path_in_repo } => path_in_repo,
        }
    }

    /// NDJSON line of this operation in the commit payload.
    fn commit_line(&self) -> serde_json::Value {
        match self {
            CommitOperation::Add { path_in_repo, content } => json!({
                "key": "file",
                "value": {"path": path_in_repo, "content": BASE64.encode(content), "encoding": "base64"},
            }),
            CommitOperation::AddLfs { path_in_repo, oid, size, .. } => json!({
                "key": "lfsFile",
                "value": {"path": path_in_repo, "algo": "sha256", "oid": oid, "size": size},
            }),
            CommitOperation::Delete { path_in_repo } => json!({
                "key": "deletedFile",
                "value": {"path": path_in_repo},
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub commit_url: String,
    pub commit_oid: String,
}

#[derive(Debug, Deserialize)]
struct LfsBatchResponse {
    objects: Vec<LfsObject>,
}

#[derive(Debug, Deserialize)]
struct LfsObject {
    oid: String,
    #[serde(default)]
    actions: Option<LfsActions>,
    #[serde(default)]
    error: Option<LfsObjectError>,
}

#[derive(Debug, Deserialize)]
struct LfsActions {
    upload: Option<LfsAction>,
    verify: Option<LfsAction>,
}

#[derive(Debug, Deserialize)]
struct LfsAction {
    href: String,
    #[serde(default)]
    header: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct LfsObjectError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    #[serde(rename = "type")]
    kind: String,
    path: String,
}

#[derive(Debug, Clone)]
pub struct HubClient {
    endpoint: String,
    token: Option<String>,
    http: Client,
}

fn encode_revision(revision: &str) -> String {
    revision.replace('/', "%2F")
}

fn check(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    bail!("{action} failed with {status}: {body}")
}

impl HubClient {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("biodatasets/", env!("CARGO_PKG_VERSION")))
            .timeout(None)
            .build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            token,
            http,
        })
    }

    /// Client for the endpoint and token found in the environment.
    pub fn from_env(token: Option<String>, endpoint: Option<String>) -> Result<Self> {
        Self::new(resolve_endpoint(endpoint), resolve_token(token))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Creates a dataset repository; an existing repository is not an error.
    pub fn create_repo(&self, repo_id: &str, private: bool) -> Result<()> {
        let (organization, name) = match repo_id.split_once('/') {
            Some((organization, name)) => (Some(organization), name),
            None => (None, repo_id),
        };
        let response = self
            .request(Method::POST, &format!("{}/api/repos/create", self.endpoint))
            .json(&json!({
                "type": "dataset",
                "name": name,
                "organization": organization,
                "private": private,
            }))
            .send()
            .context("failed to reach the hub")?;
        if response.status() == StatusCode::CONFLICT {
            debug!(repo_id, "repository already exists");
            return Ok(());
        }
        check(response, "repository creation")?;
        info!(repo_id, private, "created dataset repository");
        Ok(())
    }

    /// Reads a text file from the repository, `None` when it does not exist.
    pub fn read_file(&self, repo_id: &str, revision: &str, path: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/datasets/{repo_id}/resolve/{}/{path}",
            self.endpoint,
            encode_revision(revision)
        );
        let response = self.request(Method::GET, &url).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check(response, "file download")?.text()?))
    }

    /// Files under `prefix`, recursively.
    pub fn list_files(&self, repo_id: &str, revision: &str, prefix: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/api/datasets/{repo_id}/tree/{}/{prefix}?recursive=true",
            self.endpoint,
            encode_revision(revision)
        );
        let response = self.request(Method::GET, &url).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let entries: Vec<TreeEntry> = check(response, "file listing")?.json()?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.kind == "file")
            .map(|entry| entry.path)
            .collect())
    }

    /// Uploads the contents of every LFS operation the hub does not have yet.
    pub fn upload_lfs(&self, repo_id: &str, revision: &str, operations: &[CommitOperation]) -> Result<()> {
        let files: HashMap<&str, (&Path, u64)> = operations
            .iter()
            .filter_map(|op| match op {
                CommitOperation::AddLfs {
                    local_path, oid, size, ..
                } => Some((oid.as_str(), (local_path.as_path(), *size))),
                _ => None,
            })
            .collect();
        if files.is_empty() {
            return Ok(());
        }
        let objects: Vec<_> = files
            .iter()
            .map(|(oid, (_, size))| json!({"oid": oid, "size": size}))
            .collect();
        let url = format!("{}/datasets/{repo_id}.git/info/lfs/objects/batch", self.endpoint);
        let response = self
            .request(Method::POST, &url)
            .header("Accept", LFS_CONTENT_TYPE)
            .header("Content-Type", LFS_CONTENT_TYPE)
            .body(serde_json::to_vec(&json!({
                "operation": "upload",
                "transfers": ["basic"],
                "objects": objects,
                "hash_algo": "sha256",
                "ref": {"name": revision},
            }))?)
            .send()?;
        let batch: LfsBatchResponse = check(response, "LFS batch request")?.json()?;

        for object in batch.objects {
            if let Some(error) = object.error {
                bail!("LFS object {} rejected ({}): {}", object.oid, error.code, error.message);
            }
            let Some((path, size)) = files.get(object.oid.as_str()).copied() else {
                bail!("hub returned unknown LFS object {}", object.oid);
            };
            let Some(actions) = object.actions else {
                debug!(oid = %object.oid, "LFS object already on the hub");
                continue;
            };
            if let Some(upload) = actions.upload {
                info!(file = %path.display(), size, "uploading LFS object");
                let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
                let mut request = self.http.put(&upload.href).body(Body::sized(file, size));
                for (key, value) in &upload.header {
                    request = request.header(key, value);
                }
                check(request.send()?, "LFS upload")?;
            }
            if let Some(verify) = actions.verify {
                let mut request = self
                    .request(Method::POST, &verify.href)
                    .header("Content-Type", LFS_CONTENT_TYPE)
                    .body(serde_json::to_vec(&json!({"oid": object.oid, "size": size}))?);
                for (key, value) in &verify.header {
                    request = request.header(key, value);
                }
                check(request.send()?, "LFS verification")?;
            }
        }
        Ok(())
    }

    /// Creates one commit out of `operations`. LFS contents must be uploaded first.
    pub fn create_commit(
        &self,
        repo_id: &str,
        revision: &str,
        summary: &str,
        operations: &[CommitOperation],
    ) -> Result<CommitInfo> {
        let mut payload = serde_json::to_string(&json!({
            "key": "header",
            "value": {"summary": summary, "description": ""},
        }))?;
        for op in operations {
            payload.push('\n');
            payload.push_str(&serde_json::to_string(&op.commit_line())?);
        }
        let url = format!(
            "{}/api/datasets/{repo_id}/commit/{}",
            self.endpoint,
            encode_revision(revision)
        );
        let response = self
            .request(Method::POST, &url)
            .header("Content-Type", "application/x-ndjson")
            .body(payload)
            .send()?;
        let commit: CommitInfo = check(response, "commit")?.json()?;
        info!(repo_id, url = %commit.commit_url, files = operations.len(), "created commit");
        Ok(commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_commit_lines() {
        let add = CommitOperation::Add {
            path_in_repo: "README.md".into(),
            content: b"hi".to_vec(),
        };
        assert_eq!(add.commit_line()["value"]["content"], "aGk=");
        let delete = CommitOperation::Delete {
            path_in_repo: "default/train-00000-of-00002.parquet".into(),
        };
        assert_eq!(delete.commit_line()["key"], "deletedFile");
        assert_eq!(delete.path_in_repo(), "default/train-00000-of-00002.parquet");
    }

    #[test]
    fn test_lfs_operation_hashes_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        let op = CommitOperation::lfs("data/x.parquet", file.path()).unwrap();
        match op {
            CommitOperation::AddLfs { oid, size, .. } => {
                assert_eq!(size, 3);
                assert_eq!(oid, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
            }
            other => panic!("unexpected operation {other:?}"),
        }
    }

    #[test]
    fn test_endpoint_resolution() {
        assert_eq!(
            resolve_endpoint(Some("http://localhost:8080/".into())),
            "http://localhost:8080"
        );
        assert_eq!(resolve_token(Some("hf_x".into())).as_deref(), Some("hf_x"));
    }
}
