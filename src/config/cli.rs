use crate::config::{CliConfig, RelayConfig};

/// 命令列參數覆蓋 TOML 設定
pub fn apply_overrides(config: &mut RelayConfig, cli: &CliConfig) {
    if let Some(address) = &cli.address {
        tracing::info!("🔧 destination.address overridden to: {}", address);
        config.destination.address = address.clone();
    }

    if let Some(port) = cli.port {
        tracing::info!("🔧 destination.port overridden to: {}", port);
        config.destination.port = port;
    }
}
