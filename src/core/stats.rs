use crate::core::transmitter::SendFailure;
use serde::Serialize;
use std::collections::HashMap;

/// 單一 stage 實例的計數器
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageStats {
    pub ticks: u64,
    pub datagrams_sent: u64,
    pub bytes_sent: u64,
    pub skipped_empty: u64,
    pub packets_forwarded: u64,
    pub send_failures: HashMap<SendFailure, u64>,
}

impl StageStats {
    pub fn record_sent(&mut self, bytes: usize) {
        self.datagrams_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_failure(&mut self, kind: SendFailure) {
        *self.send_failures.entry(kind).or_insert(0) += 1;
    }

    pub fn total_failures(&self) -> u64 {
        self.send_failures.values().sum()
    }

    pub fn failures_of(&self, kind: SendFailure) -> u64 {
        self.send_failures.get(&kind).copied().unwrap_or(0)
    }
}
