use crate::utils::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Tick 時間戳 (微秒)
pub type Timestamp = i64;

/// 單一 landmark：x, y, z 以及可選的 visibility / presence
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: None,
            presence: None,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.z.is_finite()
            && self.visibility.map_or(true, f32::is_finite)
            && self.presence.map_or(true, f32::is_finite)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkList {
    pub landmarks: Vec<Landmark>,
}

impl LandmarkList {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}

impl From<Vec<Landmark>> for LandmarkList {
    fn from(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }
}

/// 某個 port 在單一 tick 送達的資料，轉送時沿用同一份
pub type Packet = Arc<LandmarkList>;

#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEntry {
    pub tag: String,
    pub landmarks: LandmarkList,
}

impl TaggedEntry {
    pub fn new(tag: impl Into<String>, landmarks: LandmarkList) -> Self {
        Self {
            tag: tag.into(),
            landmarks,
        }
    }

    /// 該 tick 沒有資料的 port 以空列表佔位
    pub fn empty(tag: impl Into<String>) -> Self {
        Self::new(tag, LandmarkList::default())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub entries: Vec<TaggedEntry>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 所有 entry 都是空列表 (或完全沒有 entry)
    pub fn all_empty(&self) -> bool {
        self.entries.iter().all(|e| e.landmarks.is_empty())
    }

    pub fn get(&self, tag: &str) -> Option<&TaggedEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    pub fn landmark_count(&self) -> usize {
        self.entries.iter().map(|e| e.landmarks.len()).sum()
    }
}

/// Port 宣告：`TAG:index:stream`、`TAG:stream` 或 `stream`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortSpec {
    pub tag: String,
    pub index: usize,
    pub stream: String,
}

impl PortSpec {
    pub fn new(tag: impl Into<String>, index: usize, stream: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            index,
            stream: stream.into(),
        }
    }

    pub fn key(&self) -> (&str, usize) {
        (self.tag.as_str(), self.index)
    }

    /// 解析多個 port 宣告；未指定 index 時依同 tag 出現順序編號
    pub fn parse_list(specs: &[String]) -> Result<Vec<PortSpec>> {
        let mut next_index: HashMap<String, usize> = HashMap::new();
        let mut ports: Vec<PortSpec> = Vec::with_capacity(specs.len());

        for raw in specs {
            let (tag, index, stream) = split_spec(raw)?;
            let counter = next_index.entry(tag.to_string()).or_insert(0);
            let index = index.unwrap_or(*counter);
            *counter = index + 1;

            let port = PortSpec::new(tag, index, stream);
            if ports.iter().any(|p| p.key() == port.key()) {
                return Err(RelayError::InvalidPortSpec {
                    spec: raw.clone(),
                    reason: format!("'{}' is declared twice", port),
                });
            }
            ports.push(port);
        }

        Ok(ports)
    }
}

fn split_spec(raw: &str) -> Result<(&str, Option<usize>, &str)> {
    let invalid = |reason: &str| RelayError::InvalidPortSpec {
        spec: raw.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = raw.trim().split(':').collect();
    let (tag, index, stream) = match parts.as_slice() {
        [stream] => ("", None, *stream),
        [tag, stream] => (*tag, None, *stream),
        [tag, index, stream] => {
            let index = index
                .parse::<usize>()
                .map_err(|_| invalid("index must be a non-negative integer"))?;
            (*tag, Some(index), *stream)
        }
        _ => return Err(invalid("too many ':' separators")),
    };

    if stream.is_empty() {
        return Err(invalid("stream name cannot be empty"));
    }
    if !stream
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(invalid("stream name may only contain letters, digits and '_'"));
    }
    if !tag
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        || tag.starts_with(|c: char| c.is_ascii_digit())
    {
        return Err(invalid("tag must be upper-case letters, digits and '_'"));
    }

    Ok((tag, index, stream))
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.tag, self.index, self.stream)
    }
}

/// Stage 宣告的所有 port
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageContract {
    pub inputs: Vec<PortSpec>,
    pub outputs: Vec<PortSpec>,
    pub input_side_packets: Vec<PortSpec>,
    pub output_side_packets: Vec<PortSpec>,
}

impl StageContract {
    pub fn with_inputs(inputs: Vec<PortSpec>) -> Self {
        Self {
            inputs,
            ..Default::default()
        }
    }

    pub fn parse(
        inputs: &[String],
        outputs: &[String],
        input_side_packets: &[String],
        output_side_packets: &[String],
    ) -> Result<Self> {
        Ok(Self {
            inputs: PortSpec::parse_list(inputs)?,
            outputs: PortSpec::parse_list(outputs)?,
            input_side_packets: PortSpec::parse_list(input_side_packets)?,
            output_side_packets: PortSpec::parse_list(output_side_packets)?,
        })
    }
}

/// 在 open 時一次性提供給 stage 的資料：每個 input 的 header 與 side packet
#[derive(Debug, Clone, Default)]
pub struct StageSetup {
    pub headers: Vec<Option<serde_json::Value>>,
    pub side_packets: Vec<serde_json::Value>,
}

/// Host 在一個 tick 交給 stage 的資料，每個宣告的 input port 一格
#[derive(Debug, Clone)]
pub struct Tick {
    pub timestamp: Timestamp,
    pub packets: Vec<Option<Packet>>,
}

impl Tick {
    pub fn new(timestamp: Timestamp, slots: Vec<Option<LandmarkList>>) -> Self {
        Self {
            timestamp,
            packets: slots.into_iter().map(|s| s.map(Arc::new)).collect(),
        }
    }

    pub fn empty(timestamp: Timestamp, width: usize) -> Self {
        Self {
            timestamp,
            packets: vec![None; width],
        }
    }

    pub fn width(&self) -> usize {
        self.packets.len()
    }

    pub fn packet(&self, port: usize) -> Option<&Packet> {
        self.packets.get(port).and_then(Option::as_ref)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageVariant {
    /// tag = port 的 stream 名稱
    #[default]
    Named,
    /// 同 Named，另外把 input 原封不動轉送到對應 output
    Forwarding,
    /// tag = 固定標籤表依 port 位置查得
    Indexed,
}

impl StageVariant {
    pub fn forwards(self) -> bool {
        matches!(self, StageVariant::Forwarding)
    }
}

impl fmt::Display for StageVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageVariant::Named => "named",
            StageVariant::Forwarding => "forwarding",
            StageVariant::Indexed => "indexed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendPolicy {
    /// 每個 tick 都送出一個 datagram
    #[default]
    Always,
    /// 所有 entry 皆為空時不送
    SkipEmpty,
}
