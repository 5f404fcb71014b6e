use crate::domain::model::{PortSpec, StageContract, StageSetup, Tick};
use crate::domain::ports::OutputStreams;
use crate::utils::error::{RelayError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// input 位置 → 對應 output 位置 (tag 與 index 相同)
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardPlan {
    outputs: Vec<usize>,
    side_outputs: Option<Vec<usize>>,
}

impl ForwardPlan {
    /// 在第一個 tick 之前檢查 input/output 是否一對一對應
    pub fn validate(contract: &StageContract) -> Result<Self> {
        let outputs = correspond(&contract.inputs, &contract.outputs, "input and output streams")?;

        let side_outputs = if contract.output_side_packets.is_empty() {
            None
        } else {
            Some(correspond(
                &contract.input_side_packets,
                &contract.output_side_packets,
                "input and output side packets",
            )?)
        };

        Ok(Self {
            outputs,
            side_outputs,
        })
    }

    pub fn output_for(&self, input: usize) -> Option<usize> {
        self.outputs.get(input).copied()
    }

    /// 宣告了 output side packet 時，每個 input side packet 都必須有值
    pub fn check_setup(&self, setup: &StageSetup) -> Result<()> {
        match &self.side_outputs {
            Some(side_outputs) if setup.side_packets.len() != side_outputs.len() => {
                Err(RelayError::ContractMismatch {
                    message: format!(
                        "{} input side packets declared but {} values supplied",
                        side_outputs.len(),
                        setup.side_packets.len()
                    ),
                })
            }
            _ => Ok(()),
        }
    }

    /// open 時複製 header 與 side packet 到對應 output
    pub fn copy_setup(&self, setup: &StageSetup, outputs: &mut dyn OutputStreams) {
        for (input, header) in setup.headers.iter().enumerate() {
            if let (Some(header), Some(output)) = (header, self.output_for(input)) {
                outputs.set_header(output, header.clone());
            }
        }

        if let Some(side_outputs) = &self.side_outputs {
            for (value, output) in setup.side_packets.iter().zip(side_outputs) {
                outputs.set_side_packet(*output, value.clone());
            }
        }
    }

    /// 把本 tick 有資料的 input 原封不動送到對應 output，回傳轉送數量
    pub fn forward(&self, tick: &Tick, outputs: &mut dyn OutputStreams) -> usize {
        let mut forwarded = 0;

        for (input, packet) in tick.packets.iter().enumerate() {
            let (Some(packet), Some(output)) = (packet, self.output_for(input)) else {
                continue;
            };
            tracing::trace!("Passing input {} to output {} at {}", input, output, tick.timestamp);
            outputs.add_packet(output, tick.timestamp, Arc::clone(packet));
            forwarded += 1;
        }

        forwarded
    }
}

fn correspond(inputs: &[PortSpec], outputs: &[PortSpec], what: &str) -> Result<Vec<usize>> {
    let mismatch = |detail: String| RelayError::ContractMismatch {
        message: format!("{} must use matching tags and indexes: {}", what, detail),
    };

    if inputs.len() != outputs.len() {
        return Err(mismatch(format!(
            "{} inputs vs {} outputs",
            inputs.len(),
            outputs.len()
        )));
    }

    let mut by_key: HashMap<(&str, usize), usize> = HashMap::with_capacity(outputs.len());
    for (position, port) in outputs.iter().enumerate() {
        if by_key.insert(port.key(), position).is_some() {
            return Err(mismatch(format!("output {} declared twice", port)));
        }
    }

    inputs
        .iter()
        .map(|port| {
            by_key
                .remove(&port.key())
                .ok_or_else(|| mismatch(format!("no output for input {}", port)))
        })
        .collect()
}
