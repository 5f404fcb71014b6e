use crate::domain::model::PortSpec;
use crate::utils::error::{RelayError, Result};
use std::collections::HashSet;

/// 位置標籤表的預設值 (依序：身體、左手、右手、臉)
pub const DEFAULT_LABELS: [&str; 4] = ["pose", "leftHand", "rightHand", "face"];

#[derive(Debug, Clone, PartialEq)]
pub enum TagPolicy {
    /// tag = port 宣告的 stream 名稱
    Name,
    /// tag = labels[port 位置]
    Position(Vec<String>),
}

impl TagPolicy {
    pub fn default_labels() -> Self {
        TagPolicy::Position(DEFAULT_LABELS.iter().map(|s| s.to_string()).collect())
    }
}

/// 在 setup 時建好的 port → tag 對照表，之後每個 tick 只讀取
#[derive(Debug, Clone, PartialEq)]
pub struct TagMap {
    tags: Vec<String>,
}

impl TagMap {
    pub fn build(policy: &TagPolicy, inputs: &[PortSpec]) -> Result<Self> {
        let tags: Vec<String> = match policy {
            TagPolicy::Name => inputs.iter().map(|p| p.stream.clone()).collect(),
            TagPolicy::Position(labels) => {
                if inputs.len() > labels.len() {
                    return Err(RelayError::TagTableTooShort {
                        ports: inputs.len(),
                        labels: labels.len(),
                    });
                }
                labels[..inputs.len()].to_vec()
            }
        };

        let mut seen = HashSet::with_capacity(tags.len());
        for tag in &tags {
            if !seen.insert(tag.as_str()) {
                return Err(RelayError::DuplicateTag { tag: tag.clone() });
            }
        }

        Ok(Self { tags })
    }

    pub fn tag(&self, port: usize) -> Option<&str> {
        self.tags.get(port).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }
}
