use crate::core::codec;
use crate::core::forwarder::ForwardPlan;
use crate::core::snapshot::SnapshotBuilder;
use crate::core::stats::StageStats;
use crate::core::tags::{TagMap, TagPolicy, DEFAULT_LABELS};
use crate::core::transmitter::{
    resolve_destination, SendFailure, UdpTransmitter, DEFAULT_BIND_ADDR,
};
use crate::domain::model::{SendPolicy, StageContract, StageSetup, StageVariant, Tick, Timestamp};
use crate::domain::ports::{ConfigProvider, OutputStreams, Stage, Transport};
use crate::utils::error::{RelayError, Result};
use crate::utils::validation::validate_bind_addr;
use async_trait::async_trait;
use std::net::SocketAddr;

/// 建立 stage 所需的設定 (一個 stage 實例一份)
#[derive(Debug, Clone, PartialEq)]
pub struct StageConfig {
    pub name: String,
    pub variant: StageVariant,
    pub send_policy: SendPolicy,
    pub address: String,
    pub port: u16,
    pub bind: String,
    pub labels: Vec<String>,
}

impl StageConfig {
    pub fn new(name: impl Into<String>, variant: StageVariant) -> Self {
        Self {
            name: name.into(),
            variant,
            send_policy: SendPolicy::default(),
            address: "127.0.0.1".to_string(),
            port: 8080,
            bind: DEFAULT_BIND_ADDR.to_string(),
            labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn from_provider<C: ConfigProvider>(config: &C) -> Self {
        let mut stage = Self::new(config.stage_name(), config.variant());
        stage.send_policy = config.send_policy();
        stage.address = config.destination_address().to_string();
        stage.port = config.destination_port();
        stage.bind = config.bind_address().to_string();
        if !config.tag_labels().is_empty() {
            stage.labels = config.tag_labels().to_vec();
        }
        stage
    }

    pub fn with_destination(mut self, address: impl Into<String>, port: u16) -> Self {
        self.address = address.into();
        self.port = port;
        self
    }

    pub fn with_send_policy(mut self, policy: SendPolicy) -> Self {
        self.send_policy = policy;
        self
    }

    pub fn tag_policy(&self) -> TagPolicy {
        match self.variant {
            StageVariant::Named | StageVariant::Forwarding => TagPolicy::Name,
            StageVariant::Indexed => TagPolicy::Position(self.labels.clone()),
        }
    }
}

/// Unconfigured：設定與 port 宣告，尚未配置任何資源
#[derive(Debug, Clone)]
pub struct PendingStage {
    pub config: StageConfig,
    pub contract: StageContract,
}

impl PendingStage {
    pub fn new(config: StageConfig, contract: StageContract) -> Self {
        Self { config, contract }
    }

    pub fn from_provider<C: ConfigProvider>(config: &C) -> Result<Self> {
        let contract = StageContract::parse(
            config.input_ports(),
            config.output_ports(),
            config.input_side_packets(),
            config.output_side_packets(),
        )?;
        Ok(Self::new(StageConfig::from_provider(config), contract))
    }
}

/// declare_contract 與 open 共用的檢查；open 會重新建立一次
struct StagePlan {
    tags: TagMap,
    forward: Option<ForwardPlan>,
}

impl StagePlan {
    fn declare(pending: &PendingStage) -> Result<Self> {
        let PendingStage { config, contract } = pending;

        if config.variant == StageVariant::Indexed && contract.inputs.is_empty() {
            return Err(RelayError::ContractMismatch {
                message: format!("indexed stage '{}' needs at least one input", config.name),
            });
        }

        let tags = TagMap::build(&config.tag_policy(), &contract.inputs)?;

        let forward = if config.variant.forwards() {
            Some(ForwardPlan::validate(contract)?)
        } else {
            if !contract.outputs.is_empty() {
                tracing::warn!(
                    "Stage '{}' ({}) ignores its {} declared outputs",
                    config.name,
                    config.variant,
                    contract.outputs.len()
                );
            }
            None
        };

        Ok(Self { tags, forward })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { bytes: usize },
    SkippedEmpty,
    Failed(SendFailure),
    /// 沒有任何 input port，不處理
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub timestamp: Timestamp,
    pub entries: usize,
    pub landmarks: usize,
    pub forwarded: usize,
    pub outcome: SendOutcome,
    pub stop: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageSummary {
    pub name: String,
    pub variant: StageVariant,
    pub destination: SocketAddr,
    pub stats: StageStats,
}

/// Ready 狀態的 stage：socket 已開、tag 對照表與 forward 對照已驗證
pub struct RelayStage<T: Transport = UdpTransmitter> {
    name: String,
    variant: StageVariant,
    send_policy: SendPolicy,
    contract: StageContract,
    tags: TagMap,
    forward: Option<ForwardPlan>,
    transport: T,
    stats: StageStats,
}

impl<T: Transport> RelayStage<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    pub fn stats(&self) -> &StageStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn transmit(&mut self, datagram: &[u8], timestamp: Timestamp) -> SendOutcome {
        match self.transport.send(datagram).await {
            Ok(bytes) => {
                self.stats.record_sent(bytes);
                tracing::trace!(
                    "Sent {} bytes to {} at {}",
                    bytes,
                    self.transport.destination(),
                    timestamp
                );
                SendOutcome::Sent { bytes }
            }
            Err(e) => {
                let kind = match &e {
                    RelayError::SendError { kind, .. } => *kind,
                    _ => SendFailure::Other,
                };
                self.stats.record_failure(kind);
                tracing::warn!(
                    "⚠️ Stage '{}' failed to send tick {} ({} failures so far): {}",
                    self.name,
                    timestamp,
                    self.stats.total_failures(),
                    e
                );
                SendOutcome::Failed(kind)
            }
        }
    }
}

#[async_trait]
impl<T: Transport + 'static> Stage for RelayStage<T> {
    type Pending = PendingStage;
    type Report = TickReport;
    type Summary = StageSummary;

    fn declare_contract(pending: &PendingStage) -> Result<()> {
        StagePlan::declare(pending).map(|_| ())
    }

    async fn open(
        pending: PendingStage,
        setup: &StageSetup,
        outputs: &mut dyn OutputStreams,
    ) -> Result<Self> {
        let plan = StagePlan::declare(&pending)?;
        let PendingStage { config, contract } = pending;

        if let Some(forward) = &plan.forward {
            forward.check_setup(setup)?;
        }

        let destination = resolve_destination(&config.address, config.port)?;
        let bind = validate_bind_addr("destination.bind", &config.bind)?;
        let transport = T::open(destination, bind).await?;

        if let Some(forward) = &plan.forward {
            forward.copy_setup(setup, outputs);
        }

        tracing::info!(
            "🚀 Stage '{}' ready ({}, {} inputs → {})",
            config.name,
            config.variant,
            contract.inputs.len(),
            destination
        );

        Ok(Self {
            name: config.name,
            variant: config.variant,
            send_policy: config.send_policy,
            contract,
            tags: plan.tags,
            forward: plan.forward,
            transport,
            stats: StageStats::default(),
        })
    }

    async fn process(&mut self, tick: &Tick, outputs: &mut dyn OutputStreams) -> Result<TickReport> {
        self.stats.ticks += 1;

        if self.contract.inputs.is_empty() {
            tracing::debug!("Stage '{}' has no inputs, requesting stop", self.name);
            return Ok(TickReport {
                timestamp: tick.timestamp,
                entries: 0,
                landmarks: 0,
                forwarded: 0,
                outcome: SendOutcome::NotAttempted,
                stop: true,
            });
        }

        let snapshot = SnapshotBuilder::build(&self.tags, tick)?;

        let forwarded = match &self.forward {
            Some(forward) => forward.forward(tick, outputs),
            None => 0,
        };
        self.stats.packets_forwarded += forwarded as u64;

        let outcome = if self.send_policy == SendPolicy::SkipEmpty && snapshot.all_empty() {
            self.stats.skipped_empty += 1;
            SendOutcome::SkippedEmpty
        } else {
            let datagram = codec::encode(&snapshot);
            self.transmit(&datagram, tick.timestamp).await
        };

        tracing::debug!(
            "Tick {}: {} entries, {} landmarks, {} forwarded, {:?}",
            tick.timestamp,
            snapshot.len(),
            snapshot.landmark_count(),
            forwarded,
            outcome
        );

        Ok(TickReport {
            timestamp: tick.timestamp,
            entries: snapshot.len(),
            landmarks: snapshot.landmark_count(),
            forwarded,
            outcome,
            stop: false,
        })
    }

    fn wants_stop(report: &TickReport) -> bool {
        report.stop
    }

    async fn close(self) -> StageSummary {
        let destination = self.transport.destination();
        // socket 在此釋放，之後不再有任何 send
        drop(self.transport);

        tracing::info!(
            "🏁 Stage '{}' closed: {} ticks, {} datagrams ({} bytes), {} failures, {} skipped",
            self.name,
            self.stats.ticks,
            self.stats.datagrams_sent,
            self.stats.bytes_sent,
            self.stats.total_failures(),
            self.stats.skipped_empty
        );

        StageSummary {
            name: self.name,
            variant: self.variant,
            destination,
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::outputs::CollectedOutputs;
    use crate::domain::model::{Landmark, LandmarkList, PortSpec};
    use std::collections::VecDeque;
    use std::net::SocketAddrV4;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MockTransport {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        failures: Arc<Mutex<VecDeque<SendFailure>>>,
        destination: Option<SocketAddr>,
    }

    impl MockTransport {
        fn datagrams(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }

        fn fail_next(&self, kind: SendFailure) {
            self.failures.lock().unwrap().push_back(kind);
        }
    }

    impl Transport for MockTransport {
        async fn open(destination: SocketAddrV4, _bind: SocketAddr) -> Result<Self> {
            Ok(Self {
                destination: Some(SocketAddr::V4(destination)),
                ..Default::default()
            })
        }

        async fn send(&self, datagram: &[u8]) -> Result<usize> {
            if let Some(kind) = self.failures.lock().unwrap().pop_front() {
                return Err(RelayError::SendError {
                    destination: self.destination(),
                    kind,
                    source: std::io::Error::other("injected"),
                });
            }
            self.sent.lock().unwrap().push(datagram.to_vec());
            Ok(datagram.len())
        }

        fn destination(&self) -> SocketAddr {
            self.destination
                .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080)))
        }
    }

    fn inputs(streams: &[&str]) -> Vec<PortSpec> {
        streams
            .iter()
            .enumerate()
            .map(|(i, s)| PortSpec::new("", i, *s))
            .collect()
    }

    fn points(n: usize) -> LandmarkList {
        (0..n)
            .map(|i| Landmark::new(i as f32, 0.5, 0.25))
            .collect::<Vec<_>>()
            .into()
    }

    async fn open_stage(pending: PendingStage) -> (RelayStage<MockTransport>, CollectedOutputs) {
        let mut outputs = CollectedOutputs::default();
        let stage = RelayStage::<MockTransport>::open(pending, &StageSetup::default(), &mut outputs)
            .await
            .unwrap();
        (stage, outputs)
    }

    #[tokio::test]
    async fn test_named_stage_sends_one_datagram_per_tick() {
        let pending = PendingStage::new(
            StageConfig::new("holistic", StageVariant::Named),
            StageContract::with_inputs(inputs(&["pose", "leftHand", "face"])),
        );
        let (mut stage, mut outputs) = open_stage(pending).await;

        let tick = Tick::new(1, vec![Some(points(21)), None, Some(points(468))]);
        let report = stage.process(&tick, &mut outputs).await.unwrap();

        assert_eq!(report.entries, 3);
        assert_eq!(report.landmarks, 489);
        assert!(matches!(report.outcome, SendOutcome::Sent { .. }));

        let datagrams = stage.transport().datagrams();
        assert_eq!(datagrams.len(), 1);
        let decoded = codec::decode(&datagrams[0]).unwrap();
        let layout: Vec<(String, usize)> = decoded
            .entries
            .into_iter()
            .map(|e| (e.tag, e.landmarks.len()))
            .collect();
        assert_eq!(
            layout,
            vec![
                ("pose".to_string(), 21),
                ("leftHand".to_string(), 0),
                ("face".to_string(), 468)
            ]
        );
        assert!(outputs.packets.is_empty());
    }

    #[tokio::test]
    async fn test_indexed_stage_uses_label_table() {
        let pending = PendingStage::new(
            StageConfig::new("indexed", StageVariant::Indexed),
            StageContract::with_inputs(inputs(&["a", "b", "c", "d"])),
        );
        let (mut stage, mut outputs) = open_stage(pending).await;

        stage.process(&Tick::empty(9, 4), &mut outputs).await.unwrap();

        let decoded = codec::decode(&stage.transport().datagrams()[0]).unwrap();
        let tags: Vec<&str> = decoded.entries.iter().map(|e| e.tag.as_str()).collect();
        assert_eq!(tags, DEFAULT_LABELS.to_vec());
    }

    #[tokio::test]
    async fn test_skip_empty_policy() {
        let config = StageConfig::new("skip", StageVariant::Named).with_send_policy(SendPolicy::SkipEmpty);
        let pending = PendingStage::new(config, StageContract::with_inputs(inputs(&["pose", "face"])));
        let (mut stage, mut outputs) = open_stage(pending).await;

        let empty = stage.process(&Tick::empty(1, 2), &mut outputs).await.unwrap();
        let full = stage
            .process(&Tick::new(2, vec![None, Some(points(3))]), &mut outputs)
            .await
            .unwrap();

        assert_eq!(empty.outcome, SendOutcome::SkippedEmpty);
        assert_eq!(empty.entries, 2);
        assert!(matches!(full.outcome, SendOutcome::Sent { .. }));
        assert_eq!(stage.transport().datagrams().len(), 1);
        assert_eq!(stage.stats().skipped_empty, 1);
    }

    #[tokio::test]
    async fn test_send_failure_is_counted_and_tick_completes() {
        let pending = PendingStage::new(
            StageConfig::new("lossy", StageVariant::Named),
            StageContract::with_inputs(inputs(&["pose"])),
        );
        let (mut stage, mut outputs) = open_stage(pending).await;
        stage.transport().fail_next(SendFailure::Refused);

        let failed = stage
            .process(&Tick::new(1, vec![Some(points(2))]), &mut outputs)
            .await
            .unwrap();
        let ok = stage
            .process(&Tick::new(2, vec![Some(points(2))]), &mut outputs)
            .await
            .unwrap();

        assert_eq!(failed.outcome, SendOutcome::Failed(SendFailure::Refused));
        assert!(matches!(ok.outcome, SendOutcome::Sent { .. }));

        let summary = stage.close().await;
        assert_eq!(summary.stats.ticks, 2);
        assert_eq!(summary.stats.datagrams_sent, 1);
        assert_eq!(summary.stats.failures_of(SendFailure::Refused), 1);
    }

    #[tokio::test]
    async fn test_forwarding_stage_republishes_present_inputs() {
        let contract = StageContract::parse(
            &["POSE:pose".to_string(), "FACE:face".to_string()],
            &["POSE:pose_out".to_string(), "FACE:face_out".to_string()],
            &[],
            &[],
        )
        .unwrap();
        let pending = PendingStage::new(StageConfig::new("pass", StageVariant::Forwarding), contract);
        let (mut stage, mut outputs) = open_stage(pending).await;

        let tick = Tick::new(5, vec![None, Some(points(468))]);
        let report = stage.process(&tick, &mut outputs).await.unwrap();

        assert_eq!(report.forwarded, 1);
        assert_eq!(outputs.packets_on(0).count(), 0);
        let (_, timestamp, packet) = outputs.packets_on(1).next().unwrap();
        assert_eq!(*timestamp, 5);
        assert!(Arc::ptr_eq(packet, tick.packet(1).unwrap()));

        let decoded = codec::decode(&stage.transport().datagrams()[0]).unwrap();
        assert_eq!(decoded.get("face").unwrap().landmarks, **packet);
        assert!(decoded.get("pose").unwrap().landmarks.is_empty());
    }

    #[tokio::test]
    async fn test_setup_errors_prevent_ready() {
        let too_many = PendingStage::new(
            StageConfig::new("indexed", StageVariant::Indexed),
            StageContract::with_inputs(inputs(&["a", "b", "c", "d", "e"])),
        );
        let bad_address = PendingStage::new(
            StageConfig::new("named", StageVariant::Named).with_destination("256.1.1.1", 8080),
            StageContract::with_inputs(inputs(&["pose"])),
        );
        let mismatched = PendingStage::new(
            StageConfig::new("pass", StageVariant::Forwarding),
            StageContract {
                inputs: inputs(&["pose"]),
                outputs: vec![],
                ..Default::default()
            },
        );

        for pending in [too_many, bad_address, mismatched] {
            let mut outputs = CollectedOutputs::default();
            let result =
                RelayStage::<MockTransport>::open(pending, &StageSetup::default(), &mut outputs).await;
            assert!(result.err().unwrap().is_setup_error());
        }
    }

    #[tokio::test]
    async fn test_missing_side_packet_value_fails_open() {
        let contract = StageContract::parse(
            &["POSE:pose".to_string()],
            &["POSE:pose_out".to_string()],
            &["A:a".to_string(), "B:b".to_string()],
            &["A:a_out".to_string(), "B:b_out".to_string()],
        )
        .unwrap();
        let pending = PendingStage::new(StageConfig::new("pass", StageVariant::Forwarding), contract);
        let setup = StageSetup {
            headers: vec![],
            side_packets: vec![serde_json::json!(1)],
        };

        let mut outputs = CollectedOutputs::default();
        let result = RelayStage::<MockTransport>::open(pending, &setup, &mut outputs).await;

        assert!(matches!(result, Err(RelayError::ContractMismatch { .. })));
        assert!(outputs.side_packets.is_empty());
    }

    #[tokio::test]
    async fn test_stage_without_inputs_requests_stop() {
        let pending = PendingStage::new(
            StageConfig::new("idle", StageVariant::Named),
            StageContract::default(),
        );
        let (mut stage, mut outputs) = open_stage(pending).await;

        let report = stage.process(&Tick::empty(0, 0), &mut outputs).await.unwrap();

        assert!(RelayStage::<MockTransport>::wants_stop(&report));
        assert!(stage.transport().datagrams().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_tick_width_is_an_error() {
        let pending = PendingStage::new(
            StageConfig::new("named", StageVariant::Named),
            StageContract::with_inputs(inputs(&["pose", "face"])),
        );
        let (mut stage, mut outputs) = open_stage(pending).await;

        let err = stage.process(&Tick::empty(3, 1), &mut outputs).await.unwrap_err();

        assert!(matches!(err, RelayError::TickShape { .. }));
        assert!(stage.transport().datagrams().is_empty());
    }
}
