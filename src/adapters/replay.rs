use crate::domain::model::{LandmarkList, Tick, Timestamp};
use crate::domain::ports::TickSource;
use crate::utils::error::{RelayError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

/// tick 檔中的一行：`{"timestamp": 0, "ports": [null, [{"x":..,"y":..,"z":..}]]}`
#[derive(Debug, Deserialize)]
struct TickLine {
    timestamp: Timestamp,
    ports: Vec<Option<LandmarkList>>,
}

/// 從 JSON lines 重播 tick；空白行與 `#` 開頭的行會略過
pub struct JsonLinesTickSource<R> {
    lines: Lines<R>,
    line_number: usize,
}

impl JsonLinesTickSource<BufReader<tokio::fs::File>> {
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesTickSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> TickSource for JsonLinesTickSource<R> {
    async fn next_tick(&mut self) -> Result<Option<Tick>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_number += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let parsed: TickLine =
                serde_json::from_str(trimmed).map_err(|e| RelayError::ReplayError {
                    line: self.line_number,
                    message: e.to_string(),
                })?;
            return Ok(Some(Tick::new(parsed.timestamp, parsed.ports)));
        }

        Ok(None)
    }
}

#[derive(Debug, Default)]
pub struct MemoryTickSource {
    ticks: VecDeque<Tick>,
}

impl MemoryTickSource {
    pub fn new(ticks: impl IntoIterator<Item = Tick>) -> Self {
        Self {
            ticks: ticks.into_iter().collect(),
        }
    }
}

#[async_trait]
impl TickSource for MemoryTickSource {
    async fn next_tick(&mut self) -> Result<Option<Tick>> {
        Ok(self.ticks.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_ticks_from_json_lines() {
        let input = r#"
# pose, leftHand, face
{"timestamp": 0, "ports": [[{"x": 0.5, "y": 0.5, "z": 0.0}], null, []]}

{"timestamp": 33333, "ports": [null, null, null]}
"#;
        let mut source = JsonLinesTickSource::new(BufReader::new(input.as_bytes()));

        let first = source.next_tick().await.unwrap().unwrap();
        assert_eq!(first.timestamp, 0);
        assert_eq!(first.width(), 3);
        assert_eq!(first.packet(0).unwrap().len(), 1);
        assert!(first.packet(1).is_none());
        assert!(first.packet(2).unwrap().is_empty());

        let second = source.next_tick().await.unwrap().unwrap();
        assert_eq!(second.timestamp, 33333);
        assert!(second.packets.iter().all(Option::is_none));

        assert!(source.next_tick().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_line_reports_line_number() {
        let input = "{\"timestamp\": 1, \"ports\": []}\n{\"timestamp\": \"late\"}\n";
        let mut source = JsonLinesTickSource::new(BufReader::new(input.as_bytes()));

        assert!(source.next_tick().await.unwrap().is_some());
        let err = source.next_tick().await.unwrap_err();
        assert!(matches!(err, RelayError::ReplayError { line: 2, .. }));
    }

    #[tokio::test]
    async fn test_memory_source_drains_in_order() {
        let mut source = MemoryTickSource::new([Tick::empty(1, 2), Tick::empty(2, 2)]);

        assert_eq!(source.next_tick().await.unwrap().unwrap().timestamp, 1);
        assert_eq!(source.next_tick().await.unwrap().unwrap().timestamp, 2);
        assert!(source.next_tick().await.unwrap().is_none());
    }
}
