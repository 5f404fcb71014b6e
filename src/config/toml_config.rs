use crate::core::forwarder::ForwardPlan;
use crate::core::stage::{PendingStage, RelayStage};
use crate::core::transmitter::DEFAULT_BIND_ADDR;
use crate::core::{ConfigProvider, Stage};
use crate::domain::model::{PortSpec, SendPolicy, StageSetup, StageVariant};
use crate::utils::error::{RelayError, Result};
use crate::utils::validation::{
    validate_bind_addr, validate_ipv4, validate_labels, validate_non_empty_string, validate_port,
    Validate,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub stage: StageSection,
    pub destination: DestinationConfig,
    pub ports: PortsConfig,
    pub tags: Option<TagsConfig>,
    pub setup: Option<SetupConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSection {
    pub name: String,
    #[serde(default)]
    pub variant: StageVariant,
    #[serde(default)]
    pub send_policy: SendPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub address: String,
    pub port: u16,
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortsConfig {
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub input_side: Vec<String>,
    #[serde(default)]
    pub output_side: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagsConfig {
    pub labels: Vec<String>,
}

/// open 時交給 stage 的 header (以 input stream 名稱為鍵) 與 side packet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupConfig {
    pub headers: Option<HashMap<String, toml::Value>>,
    pub side_packets: Option<Vec<toml::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub verbose: Option<bool>,
    pub json: Option<bool>,
}

impl RelayConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(RelayError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| RelayError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${RELAY_HOST})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| RelayError::config(format!("env pattern: {}", e)))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("stage.name", &self.stage.name)?;
        validate_ipv4("destination.address", &self.destination.address)?;
        validate_port("destination.port", self.destination.port)?;
        validate_bind_addr("destination.bind", self.bind_address())?;

        if let Some(tags) = &self.tags {
            validate_labels("tags.labels", &tags.labels)?;
        }

        // 與 open 相同的檢查：tag 表、重複 tag、forwarding 的 port 對應
        let pending = PendingStage::from_provider(self)?;
        <RelayStage as Stage>::declare_contract(&pending)?;
        if self.stage.variant.forwards() {
            ForwardPlan::validate(&pending.contract)?.check_setup(&self.stage_setup()?)?;
        }

        if let Some(headers) = self.setup.as_ref().and_then(|s| s.headers.as_ref()) {
            for stream in headers.keys() {
                if !pending.contract.inputs.iter().any(|p| &p.stream == stream) {
                    return Err(RelayError::InvalidConfigValueError {
                        field: "setup.headers".to_string(),
                        value: stream.clone(),
                        reason: "No input port with this stream name".to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// 依 input 宣告順序整理出 open 時的 header 與 side packet
    pub fn stage_setup(&self) -> Result<StageSetup> {
        let Some(setup) = &self.setup else {
            return Ok(StageSetup::default());
        };

        let inputs = PortSpec::parse_list(&self.ports.inputs)?;
        let headers = inputs
            .iter()
            .map(|port| {
                setup
                    .headers
                    .as_ref()
                    .and_then(|h| h.get(&port.stream))
                    .map(serde_json::to_value)
                    .transpose()
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let side_packets = setup
            .side_packets
            .iter()
            .flatten()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(StageSetup {
            headers,
            side_packets,
        })
    }

    pub fn verbose_logging(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|l| l.verbose)
            .unwrap_or(false)
    }

    pub fn json_logging(&self) -> bool {
        self.logging.as_ref().and_then(|l| l.json).unwrap_or(false)
    }
}

impl ConfigProvider for RelayConfig {
    fn stage_name(&self) -> &str {
        &self.stage.name
    }

    fn variant(&self) -> StageVariant {
        self.stage.variant
    }

    fn send_policy(&self) -> SendPolicy {
        self.stage.send_policy
    }

    fn destination_address(&self) -> &str {
        &self.destination.address
    }

    fn destination_port(&self) -> u16 {
        self.destination.port
    }

    fn bind_address(&self) -> &str {
        self.destination.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR)
    }

    fn tag_labels(&self) -> &[String] {
        self.tags.as_ref().map(|t| t.labels.as_slice()).unwrap_or(&[])
    }

    fn input_ports(&self) -> &[String] {
        &self.ports.inputs
    }

    fn output_ports(&self) -> &[String] {
        &self.ports.outputs
    }

    fn input_side_packets(&self) -> &[String] {
        &self.ports.input_side
    }

    fn output_side_packets(&self) -> &[String] {
        &self.ports.output_side
    }
}

impl Validate for RelayConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
