use crate::domain::model::{Packet, Timestamp};
use crate::domain::ports::OutputStreams;
use std::collections::HashMap;

/// 把 stage 寫出的所有 output 收集在記憶體中
#[derive(Debug, Default)]
pub struct CollectedOutputs {
    pub headers: HashMap<usize, serde_json::Value>,
    pub side_packets: HashMap<usize, serde_json::Value>,
    pub packets: Vec<(usize, Timestamp, Packet)>,
}

impl CollectedOutputs {
    pub fn packets_on(&self, port: usize) -> impl Iterator<Item = &(usize, Timestamp, Packet)> {
        self.packets.iter().filter(move |(p, _, _)| *p == port)
    }
}

impl OutputStreams for CollectedOutputs {
    fn set_header(&mut self, port: usize, header: serde_json::Value) {
        self.headers.insert(port, header);
    }

    fn set_side_packet(&mut self, port: usize, value: serde_json::Value) {
        self.side_packets.insert(port, value);
    }

    fn add_packet(&mut self, port: usize, timestamp: Timestamp, packet: Packet) {
        self.packets.push((port, timestamp, packet));
    }
}
