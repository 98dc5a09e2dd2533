//! Shared handling for file-backed leaves stored as `{bytes, path}`.
//!
//! Paths are either local files or hub references of the form
//! `hf://datasets/<org>/<name>[@<revision>]/<path in repo>`.
use crate::custom::TokenPerRepoId;
use crate::error::{FeatureError, Result};
use crate::example::Example;
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

const HUB_DATASETS_PREFIX: &str = "hf://datasets/";

/// A dataset file referenced through the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubPath {
    pub repo_id: String,
    pub revision: Option<String>,
    pub path_in_repo: String,
}

impl HubPath {
    pub fn parse(path: &str) -> Option<Self> {
        let rest = path.strip_prefix(HUB_DATASETS_PREFIX)?;
        let mut parts = rest.splitn(3, '/');
        let org = parts.next()?;
        let name = parts.next()?;
        let path_in_repo = parts.next()?;
        let (name, revision) = match name.split_once('@') {
            Some((name, rev)) => (name, Some(rev.to_string())),
            None => (name, None),
        };
        if org.is_empty() || name.is_empty() || path_in_repo.is_empty() {
            return None;
        }
        Some(Self {
            repo_id: format!("{org}/{name}"),
            revision,
            path_in_repo: path_in_repo.to_string(),
        })
    }
}

/// Builds the `{bytes, path}` map stored for blob leaves.
pub fn blob_example(bytes: Option<Vec<u8>>, path: Option<String>) -> Example {
    let mut map = BTreeMap::new();
    map.insert("bytes".to_string(), Example::from(bytes));
    map.insert("path".to_string(), Example::from(path));
    Example::Map(map)
}

/// Normalizes a path, raw bytes or a `{bytes, path}` map into the stored form.
pub fn encode_blob(example: Example) -> Result<Example> {
    match example {
        Example::Null => Ok(Example::Null),
        Example::Str(path) => Ok(blob_example(None, Some(path))),
        Example::Bytes(bytes) => Ok(blob_example(Some(bytes), None)),
        Example::Map(mut map) => {
            let bytes = match map.remove("bytes") {
                None | Some(Example::Null) => None,
                Some(Example::Bytes(b)) => Some(b),
                Some(other) => return Err(FeatureError::mismatch("bytes", other.kind())),
            };
            let path = match map.remove("path") {
                None | Some(Example::Null) => None,
                Some(Example::Str(p)) => Some(p),
                Some(other) => return Err(FeatureError::mismatch("string path", other.kind())),
            };
            if bytes.is_none() && path.is_none() {
                return Err(FeatureError::mismatch(
                    "a dict with `bytes` or `path`",
                    "a dict with neither",
                ));
            }
            Ok(blob_example(bytes, path))
        }
        other => Err(FeatureError::mismatch("path, bytes or {bytes, path}", other.kind())),
    }
}

/// Fills in missing `bytes` of a stored blob from its path.
pub fn resolve_blob(example: Example, tokens: &TokenPerRepoId) -> Result<Example> {
    let (bytes, path) = split_blob(example)?;
    match (bytes, path) {
        (Some(bytes), path) => Ok(blob_example(Some(bytes), path)),
        (None, Some(path)) => {
            let bytes = read_blob_bytes(&path, tokens)?;
            Ok(blob_example(Some(bytes), Some(path)))
        }
        (None, None) => Ok(Example::Null),
    }
}

/// Splits a stored blob into its optional bytes and path.
pub fn split_blob(example: Example) -> Result<(Option<Vec<u8>>, Option<String>)> {
    match example {
        Example::Null => Ok((None, None)),
        Example::Map(mut map) => {
            let bytes = match map.remove("bytes") {
                Some(Example::Bytes(b)) => Some(b),
                _ => None,
            };
            let path = match map.remove("path") {
                Some(Example::Str(p)) => Some(p),
                _ => None,
            };
            Ok((bytes, path))
        }
        other => Err(FeatureError::mismatch("{bytes, path}", other.kind())),
    }
}

/// Reads the file behind a local path or an `hf://datasets/...` reference.
///
/// Hub references use the token registered for their repository, if any.
pub fn read_blob_bytes(path: &str, tokens: &TokenPerRepoId) -> Result<Vec<u8>> {
    let local = match HubPath::parse(path) {
        Some(hub_path) => download(&hub_path, tokens)?,
        None => PathBuf::from(path),
    };
    std::fs::read(&local).map_err(|source| FeatureError::Io {
        path: local.clone(),
        source,
    })
}

/// Token to use instead of the cached login: `None` keeps the cached token,
/// `Some(None)` forces anonymous access.
fn token_override(hub_path: &HubPath, tokens: &TokenPerRepoId) -> Option<Option<String>> {
    tokens.get(&hub_path.repo_id).cloned()
}

fn download(hub_path: &HubPath, tokens: &TokenPerRepoId) -> Result<PathBuf> {
    debug!(repo_id = %hub_path.repo_id, file = %hub_path.path_in_repo, "fetching hub file");
    let mut builder = ApiBuilder::new();
    if let Some(token) = token_override(hub_path, tokens) {
        builder = builder.with_token(token);
    }
    let api = builder.build().map_err(|e| FeatureError::Hub(e.to_string()))?;
    let repo = match &hub_path.revision {
        Some(rev) => Repo::with_revision(hub_path.repo_id.clone(), RepoType::Dataset, rev.clone()),
        None => Repo::new(hub_path.repo_id.clone(), RepoType::Dataset),
    };
    api.repo(repo)
        .get(&hub_path.path_in_repo)
        .map_err(|e| FeatureError::Hub(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_hub_path() {
        let p = HubPath::parse("hf://datasets/biodatasets/pdb@main/structures/1abc.cif").unwrap();
        assert_eq!(p.repo_id, "biodatasets/pdb");
        assert_eq!(p.revision.as_deref(), Some("main"));
        assert_eq!(p.path_in_repo, "structures/1abc.cif");

        let p = HubPath::parse("hf://datasets/org/name/a.pdb").unwrap();
        assert_eq!(p.revision, None);
        assert!(HubPath::parse("/local/a.pdb").is_none());
        assert!(HubPath::parse("hf://datasets/org").is_none());
    }

    #[test]
    fn test_token_override_only_for_listed_repos() {
        let path = HubPath::parse("hf://datasets/org/name/a.pdb").unwrap();
        let mut tokens = TokenPerRepoId::new();
        assert_eq!(token_override(&path, &tokens), None);

        tokens.insert("other/repo".into(), Some("hf_other".into()));
        assert_eq!(token_override(&path, &tokens), None);

        tokens.insert("org/name".into(), None);
        assert_eq!(token_override(&path, &tokens), Some(None));

        tokens.insert("org/name".into(), Some("hf_token".into()));
        assert_eq!(token_override(&path, &tokens), Some(Some("hf_token".into())));
    }

    #[test]
    fn test_encode_blob_forms() {
        let from_path = encode_blob(Example::from("a.png")).unwrap();
        assert_eq!(from_path, blob_example(None, Some("a.png".into())));

        let from_bytes = encode_blob(Example::Bytes(vec![1, 2])).unwrap();
        assert_eq!(from_bytes, blob_example(Some(vec![1, 2]), None));

        assert!(encode_blob(Example::Int(1)).is_err());
        assert!(encode_blob(Example::map([("other", 1i64)])).is_err());
    }

    #[test]
    fn test_resolve_local_blob() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"payload").unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let resolved = resolve_blob(blob_example(None, Some(path.clone())), &TokenPerRepoId::new())
            .unwrap();
        assert_eq!(resolved, blob_example(Some(b"payload".to_vec()), Some(path)));
    }
}
