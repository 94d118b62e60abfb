//! 监控器集合
//!
//! 根据配置批量创建监控器并统一管理其生命周期

use crate::config::Config;
use crate::error::{Result, ServiceWardenError};
use crate::host::ServiceHost;
use crate::monitor::{detect_cycle, ServiceMonitor};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

/// 按服务名称索引的监控器集合
#[derive(Debug, Default)]
pub struct MonitorSet {
    monitors: BTreeMap<String, Arc<ServiceMonitor>>,
}

impl MonitorSet {
    /// 为配置中所有启用的监控项创建监控器
    ///
    /// 依赖图存在环时拒绝创建；任一监控器创建失败时关闭已创建的监控器并返回错误
    pub async fn build(host: Arc<dyn ServiceHost>, config: &Config) -> Result<Self> {
        if let Some(path) = detect_cycle(&config.dependency_graph()) {
            return Err(ServiceWardenError::DependencyCycle { path });
        }

        let mut set = Self::default();
        for monitor_config in config.enabled_monitors() {
            let options = monitor_config.to_options(&config.global);
            match ServiceMonitor::new(Arc::clone(&host), options).await {
                Ok(monitor) => {
                    set.monitors
                        .insert(monitor_config.service.clone(), Arc::new(monitor));
                }
                Err(e) => {
                    error!("创建监控器失败 {}: {}", monitor_config.service, e);
                    set.shutdown_all().await;
                    return Err(e);
                }
            }
        }

        info!("已创建 {} 个监控器", set.monitors.len());
        Ok(set)
    }

    /// 按服务名称获取监控器
    pub fn get(&self, service: &str) -> Option<&Arc<ServiceMonitor>> {
        self.monitors.get(service)
    }

    /// 所有监控器，按服务名称排序
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<ServiceMonitor>)> {
        self.monitors.iter()
    }

    /// 监控器数量
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// 关闭所有监控器
    pub async fn shutdown_all(&self) {
        for monitor in self.monitors.values() {
            monitor.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GlobalConfig, MonitorConfig};
    use crate::host::{FakeHost, FakeService};

    fn config(monitors: Vec<MonitorConfig>) -> Config {
        Config {
            global: GlobalConfig {
                poll_interval_ms: 10,
                wait_poll_interval_ms: 2,
                ..GlobalConfig::default()
            },
            monitors,
        }
    }

    fn host() -> Arc<FakeHost> {
        Arc::new(
            FakeHost::new()
                .with_service("alpha", FakeService::new("Alpha"))
                .with_service("beta", FakeService::new("Beta")),
        )
    }

    #[tokio::test]
    async fn test_build_skips_disabled() {
        let disabled = MonitorConfig {
            enabled: false,
            ..MonitorConfig::new("beta")
        };
        let set = MonitorSet::build(host(), &config(vec![MonitorConfig::new("alpha"), disabled]))
            .await
            .unwrap();

        assert_eq!(set.len(), 1);
        assert!(set.get("alpha").is_some());
        assert!(set.get("beta").is_none());
        set.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_build_rejects_cycle() {
        let a = MonitorConfig {
            dependents: vec!["beta".to_string()],
            ..MonitorConfig::new("alpha")
        };
        let b = MonitorConfig {
            dependents: vec!["alpha".to_string()],
            ..MonitorConfig::new("beta")
        };

        let err = MonitorSet::build(host(), &config(vec![a, b])).await.unwrap_err();
        assert!(matches!(err, ServiceWardenError::DependencyCycle { .. }));
    }

    #[tokio::test]
    async fn test_build_fails_on_unknown_service() {
        let err = MonitorSet::build(
            host(),
            &config(vec![MonitorConfig::new("alpha"), MonitorConfig::new("ghost")]),
        )
        .await
        .unwrap_err();

        assert!(err.is_not_found());
    }
}
