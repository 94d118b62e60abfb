//! systemd 服务控制实现
//!
//! 通过 systemctl 命令查询和控制本机 systemd 服务

use crate::error::{Result, ServiceWardenError};
use crate::host::{RunState, ServiceHost, ServiceIdentity, StartupMode};
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Output;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, warn};

/// 查询服务时读取的属性列表
const SHOW_PROPERTIES: &str =
    "Id,Description,LoadState,ActiveState,FreezerState,UnitFileState,CanStop";

/// 已知的 systemd 单元后缀
const UNIT_SUFFIXES: [&str; 8] = [
    ".service", ".socket", ".target", ".timer", ".mount", ".path", ".scope", ".slice",
];

/// systemd 主机实现
#[derive(Debug, Clone)]
pub struct SystemdHost {
    /// systemctl 可执行文件
    systemctl: String,
    /// 是否使用 --user 实例
    user_mode: bool,
}

impl Default for SystemdHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemdHost {
    /// 创建使用系统实例的 systemd 主机
    pub fn new() -> Self {
        Self {
            systemctl: "systemctl".to_string(),
            user_mode: false,
        }
    }

    /// 创建使用 --user 实例的 systemd 主机
    pub fn user() -> Self {
        Self {
            systemctl: "systemctl".to_string(),
            user_mode: true,
        }
    }

    /// 检查 systemd 是否可用
    pub async fn is_available(&self) -> bool {
        AsyncCommand::new(&self.systemctl)
            .arg("--version")
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// 执行 systemctl 命令
    async fn run_systemctl(&self, args: &[&str]) -> Result<Output> {
        let mut command = AsyncCommand::new(&self.systemctl);
        if self.user_mode {
            command.arg("--user");
        }
        debug!("执行 systemctl {:?}", args);
        let output = command.args(args).output().await?;
        Ok(output)
    }

    /// 读取服务属性
    async fn show(&self, service_name: &str) -> Result<HashMap<String, String>> {
        let unit = unit_name(service_name);
        let property_arg = format!("--property={SHOW_PROPERTIES}");
        let output = self.run_systemctl(&["show", &unit, &property_arg]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!("systemctl show {} 执行失败: {}", unit, stderr.trim()).into());
        }

        let properties = parse_properties(&String::from_utf8_lossy(&output.stdout));
        if properties.get("LoadState").map(String::as_str) == Some("not-found") {
            return Err(ServiceWardenError::not_found(service_name));
        }

        Ok(properties)
    }

    /// 发出控制命令
    async fn control(&self, verb: &str, service_name: &str) -> Result<()> {
        let unit = unit_name(service_name);
        let output = self.run_systemctl(&[verb, "--no-block", &unit]).await?;

        if output.status.success() {
            debug!("systemctl {} {} 已接受", verb, unit);
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!("systemctl {} {} 被拒绝: {}", verb, unit, stderr);

        // systemctl 对不存在的单元返回 5
        if output.status.code() == Some(5) || stderr.contains("not found") {
            return Err(ServiceWardenError::not_found(service_name));
        }

        Err(ServiceWardenError::rejected(service_name, verb, stderr))
    }
}

#[async_trait]
impl ServiceHost for SystemdHost {
    async fn describe(&self, service_name: &str) -> Result<ServiceIdentity> {
        let properties = self.show(service_name).await?;
        let display_name = properties
            .get("Description")
            .filter(|d| !d.is_empty())
            .cloned()
            .unwrap_or_else(|| service_name.to_string());

        Ok(ServiceIdentity::new(service_name, display_name))
    }

    async fn query_state(&self, service_name: &str) -> Result<RunState> {
        let properties = self.show(service_name).await?;
        Ok(map_active_state(
            properties.get("ActiveState").map(String::as_str).unwrap_or(""),
            properties.get("FreezerState").map(String::as_str).unwrap_or(""),
        ))
    }

    async fn can_stop(&self, service_name: &str) -> Result<bool> {
        let properties = self.show(service_name).await?;
        Ok(properties.get("CanStop").map(String::as_str) == Some("yes"))
    }

    async fn startup_mode(&self, service_name: &str) -> Result<StartupMode> {
        let properties = self.show(service_name).await?;
        Ok(map_unit_file_state(
            properties
                .get("UnitFileState")
                .map(String::as_str)
                .unwrap_or(""),
        ))
    }

    async fn start(&self, service_name: &str) -> Result<()> {
        self.control("start", service_name).await
    }

    async fn stop(&self, service_name: &str) -> Result<()> {
        self.control("stop", service_name).await
    }
}

/// 补全单元名称后缀
pub fn unit_name(service_name: &str) -> String {
    if UNIT_SUFFIXES
        .iter()
        .any(|suffix| service_name.ends_with(suffix))
    {
        service_name.to_string()
    } else {
        format!("{service_name}.service")
    }
}

/// 解析 `systemctl show` 输出的 Key=Value 行
pub fn parse_properties(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// 将 ActiveState/FreezerState 映射为运行状态
pub fn map_active_state(active_state: &str, freezer_state: &str) -> RunState {
    match active_state {
        "active" | "reloading" => match freezer_state {
            "frozen" => RunState::Paused,
            "freezing" => RunState::PausePending,
            _ => RunState::Running,
        },
        "activating" => RunState::StartPending,
        "deactivating" => RunState::StopPending,
        _ => RunState::Stopped,
    }
}

/// 将 UnitFileState 映射为启动模式
pub fn map_unit_file_state(unit_file_state: &str) -> StartupMode {
    match unit_file_state {
        "enabled" | "enabled-runtime" | "linked" | "linked-runtime" | "alias" => {
            StartupMode::Automatic
        }
        "masked" | "masked-runtime" => StartupMode::Disabled,
        _ => StartupMode::Manual,
    }
}
