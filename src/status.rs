//! 服务状态看板
//!
//! 汇总监控事件，提供按服务查询的状态快照

use crate::host::{RunState, ServiceIdentity, StartupMode};
use crate::monitor::{ChangeCause, MonitorEvent};
use crate::presentation::{needs_attention, status_color, StatusColor};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 单个服务的状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// 服务名称
    pub service_name: String,
    /// 显示名称
    pub display_name: String,
    /// 最后观察到的状态
    pub state: Option<RunState>,
    /// 启动模式
    pub startup_mode: Option<StartupMode>,
    /// 颜色提示
    pub color: Option<StatusColor>,
    /// 是否需要人工处理
    pub needs_attention: bool,
    /// 是否为依赖服务
    pub is_dependent: bool,
    /// 最后变化时间
    pub last_change: Option<DateTime<Utc>>,
    /// 轮询失败原因，恢复后清空
    pub degraded_reason: Option<String>,
}

impl ServiceStatus {
    fn new(identity: &ServiceIdentity) -> Self {
        Self {
            service_name: identity.service_name.clone(),
            display_name: identity.display_name.clone(),
            state: None,
            startup_mode: None,
            color: None,
            needs_attention: false,
            is_dependent: false,
            last_change: None,
            degraded_reason: None,
        }
    }

    fn set_state(&mut self, state: RunState, at: DateTime<Utc>) {
        self.state = Some(state);
        self.color = Some(status_color(state));
        self.needs_attention = needs_attention(state);
        self.last_change = Some(at);
    }
}

/// 看板汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardOverview {
    /// 生成时间
    pub generated_at: DateTime<Utc>,
    /// 总服务数
    pub total_services: usize,
    /// 运行中的服务数
    pub running_services: usize,
    /// 需要处理的服务数
    pub attention_services: usize,
    /// 降级的服务数
    pub degraded_services: usize,
    /// 服务详细状态，按名称排序
    pub services: Vec<ServiceStatus>,
}

/// 状态看板
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    services: Arc<RwLock<HashMap<String, ServiceStatus>>>,
}

impl StatusBoard {
    /// 创建空看板
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接记录一次状态读取结果
    pub async fn record(
        &self,
        identity: &ServiceIdentity,
        state: RunState,
        startup_mode: Option<StartupMode>,
        is_dependent: bool,
    ) {
        let mut services = self.services.write().await;
        let entry = services
            .entry(identity.service_name.clone())
            .or_insert_with(|| ServiceStatus::new(identity));
        entry.set_state(state, Utc::now());
        entry.startup_mode = startup_mode;
        entry.is_dependent = is_dependent;
        entry.degraded_reason = None;
    }

    /// 记录一次失败的状态读取
    pub async fn record_error(&self, service_name: &str, reason: impl Into<String>, is_dependent: bool) {
        let mut services = self.services.write().await;
        let identity = ServiceIdentity::new(service_name, service_name);
        let entry = services
            .entry(service_name.to_string())
            .or_insert_with(|| ServiceStatus::new(&identity));
        entry.is_dependent = is_dependent;
        entry.degraded_reason = Some(reason.into());
    }

    /// 应用监控事件
    pub async fn apply(&self, event: &MonitorEvent) {
        let mut services = self.services.write().await;
        let identity = event.service();
        let entry = services
            .entry(identity.service_name.clone())
            .or_insert_with(|| ServiceStatus::new(identity));

        match event {
            MonitorEvent::StateChanged(change) => {
                entry.set_state(change.state, change.timestamp);
                entry.is_dependent = change.cause == ChangeCause::DependentStateChanged;
                if !entry.is_dependent {
                    entry.degraded_reason = None;
                }
            }
            MonitorEvent::Degraded { reason, .. } => {
                entry.degraded_reason = Some(reason.clone());
            }
        }
    }

    /// 获取特定服务状态
    pub async fn get(&self, service_name: &str) -> Option<ServiceStatus> {
        self.services.read().await.get(service_name).cloned()
    }

    /// 获取汇总
    pub async fn overview(&self) -> BoardOverview {
        let services = self.services.read().await;
        let mut rows: Vec<ServiceStatus> = services.values().cloned().collect();
        rows.sort_by(|a, b| a.service_name.cmp(&b.service_name));

        BoardOverview {
            generated_at: Utc::now(),
            total_services: rows.len(),
            running_services: rows
                .iter()
                .filter(|s| s.state == Some(RunState::Running))
                .count(),
            attention_services: rows.iter().filter(|s| s.needs_attention).count(),
            degraded_services: rows.iter().filter(|s| s.degraded_reason.is_some()).count(),
            services: rows,
        }
    }

    /// 保存状态到文件
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let overview = self.overview().await;
        let json_data = serde_json::to_string_pretty(&overview).context("序列化状态数据失败")?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context("创建状态文件目录失败")?;
            }
        }

        fs::write(path, json_data).context("写入状态文件失败")?;
        Ok(())
    }

    /// 从文件加载状态
    pub fn load_from_file(path: &Path) -> Result<BoardOverview> {
        let json_data = fs::read_to_string(path).context("读取状态文件失败")?;
        let overview = serde_json::from_str(&json_data).context("解析状态文件失败")?;
        Ok(overview)
    }
}
