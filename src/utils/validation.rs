use crate::utils::error::{RelayError, Result};
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_ipv4(field_name: &str, address: &str) -> Result<Ipv4Addr> {
    if address.is_empty() {
        return Err(RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: address.to_string(),
            reason: "Address cannot be empty".to_string(),
        });
    }

    address
        .trim()
        .parse::<Ipv4Addr>()
        .map_err(|e| RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: address.to_string(),
            reason: format!("Not an IPv4 address: {}", e),
        })
}

pub fn validate_port(field_name: &str, port: u16) -> Result<()> {
    if port == 0 {
        return Err(RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: port.to_string(),
            reason: "Port must be between 1 and 65535".to_string(),
        });
    }
    Ok(())
}

pub fn validate_bind_addr(field_name: &str, bind: &str) -> Result<SocketAddr> {
    bind.parse::<SocketAddr>()
        .map_err(|e| RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: bind.to_string(),
            reason: format!("Invalid socket address: {}", e),
        })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

/// 標籤表不可有空白或重複項目
pub fn validate_labels(field_name: &str, labels: &[String]) -> Result<()> {
    let mut seen = HashSet::new();

    for label in labels {
        validate_non_empty_string(field_name, label)?;
        if !seen.insert(label.as_str()) {
            return Err(RelayError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: label.clone(),
                reason: "Duplicate label".to_string(),
            });
        }
    }

    Ok(())
}
