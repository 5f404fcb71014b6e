use anyhow::Context;
use clap::Parser;
use landmark_relay::adapters::{CollectedOutputs, JsonLinesTickSource};
use landmark_relay::config::cli::apply_overrides;
use landmark_relay::core::ConfigProvider;
use landmark_relay::utils::error::ErrorSeverity;
use landmark_relay::utils::{logger, validation::Validate};
use landmark_relay::{CliConfig, PendingStage, RelayConfig, RelayError, RelayStage, StageRunner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 載入 TOML 配置
    let mut config = match RelayConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", cli.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 初始化日誌
    if cli.json_logs || config.json_logging() {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose || config.verbose_logging());
    }

    tracing::info!("🚀 Starting landmark-relay");
    tracing::info!("📁 Configuration loaded from: {}", cli.config);

    apply_overrides(&mut config, &cli);

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let pending = PendingStage::from_provider(&config)?;
    display_stage_summary(&config, &pending);

    if cli.dry_run {
        tracing::info!("🔍 DRY RUN MODE - nothing will be sent");
        return Ok(());
    }

    let setup = config.stage_setup()?;
    let mut source = JsonLinesTickSource::from_file(&cli.ticks)
        .await
        .with_context(|| format!("opening tick file '{}'", cli.ticks))?;
    let mut outputs = CollectedOutputs::default();

    let runner = StageRunner::<RelayStage>::with_setup(setup);
    match runner.run(pending, &mut source, &mut outputs).await {
        Ok(summary) => {
            tracing::info!(
                "✅ Relay finished: {} datagrams to {} ({} failed, {} forwarded packets)",
                summary.stats.datagrams_sent,
                summary.destination,
                summary.stats.total_failures(),
                outputs.packets.len()
            );
            println!("{}", serde_json::to_string_pretty(&summary.stats)?);
        }
        Err(e) => exit_with(e),
    }

    Ok(())
}

fn display_stage_summary(config: &RelayConfig, pending: &PendingStage) {
    tracing::info!(
        "🧩 Stage '{}' ({}), send policy {:?}",
        config.stage_name(),
        config.variant(),
        config.send_policy()
    );
    tracing::info!(
        "📡 Destination {}:{} (bind {})",
        config.destination_address(),
        config.destination_port(),
        config.bind_address()
    );
    for port in &pending.contract.inputs {
        tracing::info!("   ↳ input {}", port);
    }
    for port in &pending.contract.outputs {
        tracing::info!("   ↦ output {}", port);
    }
}

fn exit_with(e: RelayError) -> ! {
    tracing::error!(
        "❌ Relay failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());

    let exit_code = match e.severity() {
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}
