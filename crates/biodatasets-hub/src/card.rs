//! Dataset card (`README.md`) with YAML front matter.
//!
//! The front matter carries the `configs` (which files make up each split)
//! and `dataset_info` (features and split sizes) of every config.
use anyhow::{bail, Context, Result};
use biodatasets_features::{FeatureRegistry, Features};
use serde_json::{json, Map, Value as Json};

const FRONT_MATTER_DELIMITER: &str = "---";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetCard {
    pub metadata: Map<String, Json>,
    pub body: String,
}

/// Size information of one uploaded split.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitInfo {
    pub name: String,
    pub num_bytes: u64,
    pub num_examples: usize,
}

impl DatasetCard {
    pub fn parse(text: &str) -> Result<Self> {
        let Some(rest) = text.strip_prefix(FRONT_MATTER_DELIMITER) else {
            return Ok(Self {
                metadata: Map::new(),
                body: text.to_string(),
            });
        };
        let Some((yaml, body)) = rest.split_once(&format!("\n{FRONT_MATTER_DELIMITER}")) else {
            bail!("dataset card front matter is not terminated");
        };
        let metadata = match serde_yaml::from_str::<Json>(yaml).context("invalid dataset card metadata")? {
            Json::Object(map) => map,
            Json::Null => Map::new(),
            other => bail!("dataset card metadata must be a mapping, got {other}"),
        };
        Ok(Self {
            metadata,
            body: body.trim_start_matches('\n').to_string(),
        })
    }

    pub fn render(&self) -> Result<String> {
        let yaml = serde_yaml::to_string(&Json::Object(self.metadata.clone()))?;
        Ok(format!(
            "{FRONT_MATTER_DELIMITER}\n{yaml}{FRONT_MATTER_DELIMITER}\n{}",
            self.body
        ))
    }

    /// Adds or replaces one config in `configs` and `dataset_info`.
    pub fn upsert_config(&mut self, config_name: &str, features: &Features, split: &SplitInfo) -> Result<()> {
        let data_files = json!([{
            "split": split.name,
            "path": format!("{config_name}/{}-*", split.name),
        }]);
        let configs = list_entry(&mut self.metadata, "configs")?;
        let config = find_or_push(configs, config_name)?;
        merge_split_entry(config, "data_files", "split", &split.name, data_files);

        let infos = list_entry(&mut self.metadata, "dataset_info")?;
        let info = find_or_push(infos, config_name)?;
        info.insert("features".to_string(), features.to_yaml_list()?);
        let split_entry = json!([{
            "name": split.name,
            "num_bytes": split.num_bytes,
            "num_examples": split.num_examples,
        }]);
        merge_split_entry(info, "splits", "name", &split.name, split_entry);
        let total: u64 = info
            .get("splits")
            .and_then(Json::as_array)
            .map(|splits| splits.iter().filter_map(|s| s["num_bytes"].as_u64()).sum())
            .unwrap_or_default();
        info.insert("download_size".to_string(), json!(total));
        info.insert("dataset_size".to_string(), json!(total));
        Ok(())
    }

    /// Features recorded for `config_name`, if any.
    pub fn features(&self, config_name: &str, registry: &FeatureRegistry) -> Result<Option<Features>> {
        let info = match self.metadata.get("dataset_info") {
            Some(Json::Array(infos)) => infos
                .iter()
                .find(|info| info["config_name"].as_str() == Some(config_name)),
            Some(info @ Json::Object(_)) => Some(info),
            _ => None,
        };
        info.and_then(|info| info.get("features"))
            .map(|yaml| Features::from_yaml_list(yaml, registry).map_err(Into::into))
            .transpose()
    }
}

/// The list under `key`; a single mapping is promoted to a one-element list.
fn list_entry<'a>(metadata: &'a mut Map<String, Json>, key: &str) -> Result<&'a mut Vec<Json>> {
    let entry = metadata.entry(key.to_string()).or_insert_with(|| json!([]));
    if entry.is_object() {
        let single = entry.take();
        *entry = json!([single]);
    }
    match entry {
        Json::Array(items) => Ok(items),
        other => bail!("dataset card `{key}` must be a list, got {other}"),
    }
}

fn find_or_push<'a>(entries: &'a mut Vec<Json>, config_name: &str) -> Result<&'a mut Map<String, Json>> {
    let position = entries
        .iter()
        .position(|entry| entry["config_name"].as_str().unwrap_or("default") == config_name);
    let idx = match position {
        Some(idx) => idx,
        None => {
            entries.push(json!({"config_name": config_name}));
            entries.len() - 1
        }
    };
    match &mut entries[idx] {
        Json::Object(map) => Ok(map),
        other => bail!("dataset card entry for `{config_name}` must be a mapping, got {other}"),
    }
}

/// Replaces the entry of `split` in the list under `key`, keeping other splits.
fn merge_split_entry(target: &mut Map<String, Json>, key: &str, split_key: &str, split: &str, new: Json) {
    let mut entries = match target.remove(key) {
        Some(Json::Array(entries)) => entries,
        _ => Vec::new(),
    };
    entries.retain(|entry| entry[split_key].as_str() != Some(split));
    if let Json::Array(new) = new {
        entries.extend(new);
    }
    target.insert(key.to_string(), Json::Array(entries));
}

#[cfg(test)]
mod tests {
    use super::*;
    use biodatasets_features::{Dtype, SchemaNode};

    fn features() -> Features {
        Features::new()
            .with("id", SchemaNode::value(Dtype::String))
            .with("expression", SchemaNode::sequence(SchemaNode::value(Dtype::Float32)))
    }

    fn split(name: &str, num_bytes: u64) -> SplitInfo {
        SplitInfo {
            name: name.to_string(),
            num_bytes,
            num_examples: 3,
        }
    }

    #[test]
    fn test_render_and_parse() {
        let mut card = DatasetCard::default();
        card.upsert_config("default", &features(), &split("train", 100)).unwrap();
        let text = card.render().unwrap();
        assert!(text.starts_with("---\n"));
        assert!(text.contains("default/train-*"));
        assert!(text.contains("sequence: float32"));

        let parsed = DatasetCard::parse(&text).unwrap();
        assert_eq!(parsed, card);
        assert_eq!(
            parsed.features("default", &FeatureRegistry::new()).unwrap(),
            Some(features())
        );
        assert_eq!(parsed.features("other", &FeatureRegistry::new()).unwrap(), None);
    }

    #[test]
    fn test_upsert_keeps_other_configs_and_splits() {
        let mut card = DatasetCard::parse("---\nlicense: mit\n---\n# Title\n").unwrap();
        assert_eq!(card.body, "# Title\n");
        card.upsert_config("a", &features(), &split("train", 10)).unwrap();
        card.upsert_config("a", &features(), &split("test", 5)).unwrap();
        card.upsert_config("b", &features(), &split("train", 1)).unwrap();
        card.upsert_config("a", &features(), &split("train", 20)).unwrap();

        assert_eq!(card.metadata["license"], "mit");
        let configs = card.metadata["configs"].as_array().unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0]["data_files"].as_array().unwrap().len(), 2);

        let info_a = &card.metadata["dataset_info"][0];
        assert_eq!(info_a["dataset_size"], 25);
    }

    #[test]
    fn test_card_without_front_matter() {
        let card = DatasetCard::parse("just text").unwrap();
        assert!(card.metadata.is_empty());
        assert!(DatasetCard::parse("---\nkey: value\nno end").is_err());
    }
}
