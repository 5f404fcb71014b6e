use crate::core::tags::TagMap;
use crate::domain::model::{Snapshot, TaggedEntry, Tick};
use crate::utils::error::{RelayError, Result};

pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// 依宣告順序為每個 input port 產生一筆 entry；沒資料的 port 放空列表
    pub fn build(tags: &TagMap, tick: &Tick) -> Result<Snapshot> {
        if tick.width() != tags.len() {
            return Err(RelayError::TickShape {
                timestamp: tick.timestamp,
                expected: tags.len(),
                actual: tick.width(),
            });
        }

        let entries = tags
            .iter()
            .zip(&tick.packets)
            .map(|(tag, packet)| match packet {
                Some(list) => TaggedEntry::new(tag, list.as_ref().clone()),
                None => TaggedEntry::empty(tag),
            })
            .collect();

        Ok(Snapshot { entries })
    }
}
