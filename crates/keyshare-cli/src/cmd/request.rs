//! `keyshare get` / `keyshare set`: one manager request.

use crate::cli::RequestTarget;
use crate::ui;
use keyshare_types::config::KeyShareConfig;
use keyshare_types::value::MibValue;
use keyshare_wire::{ManagerClient, Pdu, VarBind, WireError};

/// Split `OID[:N]` into the OID and its follow count (0 when absent).
pub fn parse_get_item(item: &str) -> Result<(String, u32), String> {
    let (oid, follow) = match item.rsplit_once(':') {
        Some((oid, n)) => {
            let n = n
                .parse::<u32>()
                .map_err(|_| format!("invalid follow count in '{item}'"))?;
            (oid, n)
        }
        None => (item, 0),
    };
    if oid.is_empty() {
        return Err(format!("missing OID in '{item}'"));
    }
    Ok((oid.to_string(), follow))
}

/// Split `OID=VALUE`. The value is sent as an integer when it is written in
/// canonical decimal form, so digit strings such as `0799` stay strings.
pub fn parse_set_item(item: &str) -> Result<VarBind, String> {
    let (oid, value) = item
        .split_once('=')
        .ok_or_else(|| format!("expected OID=VALUE, got '{item}'"))?;
    if oid.is_empty() {
        return Err(format!("missing OID in '{item}'"));
    }
    let value = match value.parse::<i64>() {
        Ok(n) if n.to_string() == value => MibValue::Int(n),
        _ => MibValue::Str(value.to_string()),
    };
    Ok(VarBind::new(oid, value))
}

fn client(config: &KeyShareConfig, target: &RequestTarget) -> ManagerClient {
    let mut manager = config.manager.clone();
    if let Some(agent) = target.agent {
        manager.agent_addr = agent;
    }
    ManagerClient::from_config(&manager)
}

pub fn cmd_get(config: &KeyShareConfig, target: RequestTarget, items: &[String]) {
    let items: Vec<(String, u32)> = match items.iter().map(|i| parse_get_item(i)).collect() {
        Ok(items) => items,
        Err(e) => exit_usage(&e),
    };
    let manager = client(config, &target);
    run(async move { manager.get(target.request_id, items).await });
}

pub fn cmd_set(config: &KeyShareConfig, target: RequestTarget, items: &[String]) {
    let items: Vec<VarBind> = match items.iter().map(|i| parse_set_item(i)).collect() {
        Ok(items) => items,
        Err(e) => exit_usage(&e),
    };
    let manager = client(config, &target);
    run(async move { manager.set(target.request_id, items).await });
}

fn run(request: impl std::future::Future<Output = Result<Pdu, WireError>>) {
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            ui::error(&format!("Failed to start the tokio runtime: {e}"));
            std::process::exit(1);
        }
    };
    match rt.block_on(request) {
        Ok(pdu) => {
            ui::response(&pdu);
            if !pdu.errors.is_empty() {
                std::process::exit(2);
            }
        }
        Err(e) => {
            ui::error_with_fix(
                &format!("Request failed: {e}"),
                "Is the agent running? Check [manager] agent_addr or pass --agent",
            );
            std::process::exit(1);
        }
    }
}

fn exit_usage(msg: &str) -> ! {
    ui::error(msg);
    std::process::exit(64);
}
