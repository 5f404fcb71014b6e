//! Snapshot wire format.
//!
//! One datagram carries one protobuf `TaggedLandmarkListVector`, with no
//! length prefix or other framing:
//!
//! ```text
//! message Landmark {
//!   required float x = 1;
//!   required float y = 2;
//!   required float z = 3;
//!   optional float visibility = 4;
//!   optional float presence = 5;
//! }
//! message LandmarkList { repeated Landmark landmark = 1; }
//! message TaggedLandmarkList {
//!   optional string tag = 1;
//!   optional LandmarkList landmark_list = 2;
//! }
//! message TaggedLandmarkListVector {
//!   repeated TaggedLandmarkList landmark_list_tagged = 1;
//! }
//! ```
//!
//! Coordinates are `required` so every value (including `0.0` and `-0.0`) is
//! written as a fixed32 and survives a round trip bit for bit. Fields are
//! emitted in tag order, so equal snapshots give identical bytes.

use crate::domain::model::{Landmark, LandmarkList, Snapshot, TaggedEntry};
use crate::utils::error::Result;
use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct WireLandmark {
    #[prost(float, required, tag = "1")]
    pub x: f32,
    #[prost(float, required, tag = "2")]
    pub y: f32,
    #[prost(float, required, tag = "3")]
    pub z: f32,
    #[prost(float, optional, tag = "4")]
    pub visibility: Option<f32>,
    #[prost(float, optional, tag = "5")]
    pub presence: Option<f32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireLandmarkList {
    #[prost(message, repeated, tag = "1")]
    pub landmark: Vec<WireLandmark>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireTaggedList {
    #[prost(string, optional, tag = "1")]
    pub tag: Option<String>,
    #[prost(message, optional, tag = "2")]
    pub landmark_list: Option<WireLandmarkList>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireTaggedVector {
    #[prost(message, repeated, tag = "1")]
    pub landmark_list_tagged: Vec<WireTaggedList>,
}

impl From<&Landmark> for WireLandmark {
    fn from(l: &Landmark) -> Self {
        debug_assert!(l.is_finite(), "non-finite landmark passed to encoder: {:?}", l);
        Self {
            x: l.x,
            y: l.y,
            z: l.z,
            visibility: l.visibility,
            presence: l.presence,
        }
    }
}

impl From<WireLandmark> for Landmark {
    fn from(w: WireLandmark) -> Self {
        Self {
            x: w.x,
            y: w.y,
            z: w.z,
            visibility: w.visibility,
            presence: w.presence,
        }
    }
}

impl From<&TaggedEntry> for WireTaggedList {
    fn from(entry: &TaggedEntry) -> Self {
        Self {
            tag: Some(entry.tag.clone()),
            // 空列表也寫出 (presence 明確)，接收端不必區分缺欄位與空列表
            landmark_list: Some(WireLandmarkList {
                landmark: entry.landmarks.landmarks.iter().map(Into::into).collect(),
            }),
        }
    }
}

impl From<WireTaggedList> for TaggedEntry {
    fn from(w: WireTaggedList) -> Self {
        let landmarks = w
            .landmark_list
            .map(|list| LandmarkList::new(list.landmark.into_iter().map(Into::into).collect()))
            .unwrap_or_default();
        TaggedEntry::new(w.tag.unwrap_or_default(), landmarks)
    }
}

fn to_wire(snapshot: &Snapshot) -> WireTaggedVector {
    WireTaggedVector {
        landmark_list_tagged: snapshot.entries.iter().map(Into::into).collect(),
    }
}

pub fn encode(snapshot: &Snapshot) -> Vec<u8> {
    to_wire(snapshot).encode_to_vec()
}

pub fn encoded_len(snapshot: &Snapshot) -> usize {
    to_wire(snapshot).encoded_len()
}

pub fn decode(bytes: &[u8]) -> Result<Snapshot> {
    let wire = WireTaggedVector::decode(bytes)?;
    Ok(Snapshot {
        entries: wire
            .landmark_list_tagged
            .into_iter()
            .map(Into::into)
            .collect(),
    })
}
