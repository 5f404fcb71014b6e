use crate::domain::model::{
    Packet, SendPolicy, StageSetup, StageVariant, Tick, Timestamp,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::net::{SocketAddr, SocketAddrV4};

/// 無連線的 datagram 通道；每個 stage 實例各自擁有一個
pub trait Transport: Send + Sync + Sized {
    fn open(
        destination: SocketAddrV4,
        bind: SocketAddr,
    ) -> impl std::future::Future<Output = Result<Self>> + Send;

    /// 送出一個完整的 datagram，不等待任何回應
    fn send(&self, datagram: &[u8]) -> impl std::future::Future<Output = Result<usize>> + Send;

    fn destination(&self) -> SocketAddr;
}

pub trait ConfigProvider: Send + Sync {
    fn stage_name(&self) -> &str;
    fn variant(&self) -> StageVariant;
    fn send_policy(&self) -> SendPolicy;
    fn destination_address(&self) -> &str;
    fn destination_port(&self) -> u16;
    fn bind_address(&self) -> &str;
    fn tag_labels(&self) -> &[String];
    fn input_ports(&self) -> &[String];
    fn output_ports(&self) -> &[String];
    fn input_side_packets(&self) -> &[String];
    fn output_side_packets(&self) -> &[String];
}

/// Host 端的 output 串流，forwarding stage 會寫入
pub trait OutputStreams: Send {
    fn set_header(&mut self, port: usize, header: serde_json::Value);
    fn set_side_packet(&mut self, port: usize, value: serde_json::Value);
    fn add_packet(&mut self, port: usize, timestamp: Timestamp, packet: Packet);
}

#[async_trait]
pub trait TickSource: Send {
    /// 回傳 `None` 代表 host 不會再送資料
    async fn next_tick(&mut self) -> Result<Option<Tick>>;
}

/// Stage 生命週期：Unconfigured (`Pending`) → Ready (`Self`) → Closed (`Summary`)
#[async_trait]
pub trait Stage: Sized + Send {
    type Pending: Send;
    type Report: Send;
    type Summary: Send;

    /// 只做檢查，不配置資源；`open` 會再檢查一次，單獨呼叫 `open` 也安全
    fn declare_contract(pending: &Self::Pending) -> Result<()>;

    async fn open(
        pending: Self::Pending,
        setup: &StageSetup,
        outputs: &mut dyn OutputStreams,
    ) -> Result<Self>;

    async fn process(
        &mut self,
        tick: &Tick,
        outputs: &mut dyn OutputStreams,
    ) -> Result<Self::Report>;

    /// 是否已要求 host 停止送 tick
    fn wants_stop(report: &Self::Report) -> bool;

    async fn close(self) -> Self::Summary;
}
