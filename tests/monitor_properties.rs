//! 服务监控集成测试
//!
//! 使用内存主机验证命令顺序、通知顺序和缓存一致性

use service_warden::host::{FakeHost, FakeService, HostCommand, RunState, StartupMode};
use service_warden::monitor::{
    ChangeCause, CommandOutcome, MonitorEvent, MonitorOptions, ServiceMonitor,
};
use service_warden::ServiceWardenError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn fast_options(name: &str) -> MonitorOptions {
    MonitorOptions::new(name)
        .with_poll_interval(Duration::from_millis(10))
        .with_wait_poll_interval(Duration::from_millis(2))
        .with_transition_timeout(Duration::from_secs(2))
}

fn alpha_beta_gamma() -> Arc<FakeHost> {
    Arc::new(
        FakeHost::new()
            .with_service("alpha", FakeService::new("Alpha"))
            .with_service(
                "beta",
                FakeService::new("Beta").with_startup_mode(StartupMode::Automatic),
            )
            .with_service(
                "gamma",
                FakeService::new("Gamma").with_startup_mode(StartupMode::Disabled),
            ),
    )
}

fn drain(rx: &mut broadcast::Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_start_skips_disabled_dependent() {
    let host = alpha_beta_gamma();
    let monitor = ServiceMonitor::new(
        host.clone(),
        fast_options("alpha").with_dependents(["beta", "gamma"]),
    )
    .await
    .unwrap();

    let outcome = monitor.start().await.unwrap();

    assert_eq!(outcome, CommandOutcome::Completed(RunState::Running));
    assert_eq!(
        host.command_log(),
        vec![
            HostCommand::Start("alpha".to_string()),
            HostCommand::Start("beta".to_string()),
        ]
    );
    assert_eq!(monitor.cached_state().await, RunState::Running);
    assert_eq!(host.state_of("beta"), Some(RunState::Running));
    assert_eq!(host.state_of("gamma"), Some(RunState::Stopped));
    monitor.shutdown().await;
}

#[tokio::test]
async fn test_stop_orders_dependents_before_primary() {
    let host = Arc::new(
        FakeHost::new()
            .with_service("alpha", FakeService::new("Alpha").with_state(RunState::Running))
            .with_service("beta", FakeService::new("Beta").with_state(RunState::Running))
            .with_service("delta", FakeService::new("Delta").with_state(RunState::Running)),
    );
    let monitor = ServiceMonitor::new(
        host.clone(),
        fast_options("alpha").with_dependents(["beta", "delta"]),
    )
    .await
    .unwrap();

    let mut rx = monitor.subscribe();

    let outcome = monitor.stop().await.unwrap();

    assert_eq!(outcome, CommandOutcome::Completed(RunState::Stopped));
    assert_eq!(
        host.command_log(),
        vec![
            HostCommand::Stop("beta".to_string()),
            HostCommand::Stop("delta".to_string()),
            HostCommand::Stop("alpha".to_string()),
        ]
    );

    // 依赖服务的停止通知先于主服务的停止通知
    let stopped: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            MonitorEvent::StateChanged(change) if change.state == RunState::Stopped => {
                Some((change.service.service_name, change.cause))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        stopped,
        vec![
            ("beta".to_string(), ChangeCause::DependentStateChanged),
            ("delta".to_string(), ChangeCause::DependentStateChanged),
            ("alpha".to_string(), ChangeCause::PrimaryStateChanged),
        ]
    );
    monitor.shutdown().await;
}

#[tokio::test]
async fn test_stop_skips_disabled_dependent() {
    let host = Arc::new(
        FakeHost::new()
            .with_service("alpha", FakeService::new("Alpha").with_state(RunState::Running))
            .with_service(
                "beta",
                FakeService::new("Beta")
                    .with_state(RunState::Running)
                    .with_startup_mode(StartupMode::Disabled),
            ),
    );
    let monitor = ServiceMonitor::new(host.clone(), fast_options("alpha").with_dependents(["beta"]))
        .await
        .unwrap();
    let mut rx = monitor.subscribe();

    let outcome = monitor.stop().await.unwrap();

    assert_eq!(outcome, CommandOutcome::Completed(RunState::Stopped));
    assert_eq!(host.command_log(), vec![HostCommand::Stop("alpha".to_string())]);
    assert_eq!(host.state_of("beta"), Some(RunState::Running));
    assert!(drain(&mut rx).iter().all(|event| match event {
        MonitorEvent::StateChanged(change) => change.cause != ChangeCause::DependentStateChanged,
        _ => true,
    }));
    monitor.shutdown().await;
}

#[tokio::test]
async fn test_start_emits_exactly_one_running_notification() {
    let host = alpha_beta_gamma();
    let monitor = ServiceMonitor::new(host, fast_options("alpha").with_dependents(["beta"]))
        .await
        .unwrap();
    let mut rx = monitor.subscribe();

    monitor.start().await.unwrap();
    // 再经过几次轮询，确认不会重复通知
    tokio::time::sleep(Duration::from_millis(50)).await;

    let events = drain(&mut rx);
    let primary_running = events
        .iter()
        .filter(|event| match event {
            MonitorEvent::StateChanged(change) => {
                change.cause == ChangeCause::PrimaryStateChanged
                    && change.state == RunState::Running
            }
            _ => false,
        })
        .count();
    assert_eq!(primary_running, 1);

    // 依赖服务以级联来源通知
    let dependents: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            MonitorEvent::StateChanged(change)
                if change.cause == ChangeCause::DependentStateChanged =>
            {
                Some((change.service.service_name.clone(), change.state))
            }
            _ => None,
        })
        .collect();
    assert_eq!(dependents, vec![("beta".to_string(), RunState::Running)]);

    // 同一监控器的所有事件携带相同的关联ID
    assert!(events.iter().all(|event| event.monitor_id() == monitor.id()));
    monitor.shutdown().await;
}

#[tokio::test]
async fn test_cached_state_follows_external_changes() {
    let host = Arc::new(FakeHost::new().with_service("alpha", FakeService::new("Alpha")));
    let monitor = ServiceMonitor::new(host.clone(), fast_options("alpha"))
        .await
        .unwrap();
    let mut rx = monitor.subscribe();

    for state in [RunState::Running, RunState::Paused, RunState::Stopped] {
        host.set_state("alpha", state);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(monitor.cached_state().await, state);
    }

    let states: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            MonitorEvent::StateChanged(change) => Some((change.previous, change.state)),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            (Some(RunState::Stopped), RunState::Running),
            (Some(RunState::Running), RunState::Paused),
            (Some(RunState::Paused), RunState::Stopped),
        ]
    );
    monitor.shutdown().await;
}

#[tokio::test]
async fn test_restart_with_rejected_stop_does_not_start() {
    let host = Arc::new(FakeHost::new().with_service(
        "alpha",
        FakeService::new("Alpha")
            .with_state(RunState::Running)
            .rejecting_stop("access denied"),
    ));
    let monitor = ServiceMonitor::new(host.clone(), fast_options("alpha"))
        .await
        .unwrap();

    let err = monitor.restart().await.unwrap_err();

    assert!(matches!(err, ServiceWardenError::CommandRejected { .. }));
    assert_eq!(host.command_log(), vec![HostCommand::Stop("alpha".to_string())]);
    assert_eq!(host.state_of("alpha"), Some(RunState::Running));
    monitor.shutdown().await;
}

#[tokio::test]
async fn test_restart_cycles_primary_and_dependents() {
    let host = Arc::new(
        FakeHost::new()
            .with_service("alpha", FakeService::new("Alpha").with_state(RunState::Running))
            .with_service("beta", FakeService::new("Beta").with_state(RunState::Running)),
    );
    let monitor = ServiceMonitor::new(host.clone(), fast_options("alpha").with_dependents(["beta"]))
        .await
        .unwrap();

    let outcome = monitor.restart().await.unwrap();

    assert_eq!(outcome, CommandOutcome::Completed(RunState::Running));
    assert_eq!(
        host.command_log(),
        vec![
            HostCommand::Stop("beta".to_string()),
            HostCommand::Stop("alpha".to_string()),
            HostCommand::Start("alpha".to_string()),
            HostCommand::Start("beta".to_string()),
        ]
    );
    monitor.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_commands_are_serialized() {
    let host = Arc::new(FakeHost::with_transition_polls(3).with_service("alpha", FakeService::new("Alpha")));
    let monitor = Arc::new(
        ServiceMonitor::new(host.clone(), fast_options("alpha"))
            .await
            .unwrap(),
    );

    let first = tokio::spawn({
        let monitor = Arc::clone(&monitor);
        async move { monitor.start().await }
    });
    let second = tokio::spawn({
        let monitor = Arc::clone(&monitor);
        async move { monitor.start().await }
    });

    let outcomes = [first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];

    // 只有一次真正执行启动，另一次看到运行状态后跳过
    assert_eq!(outcomes.iter().filter(|o| o.is_completed()).count(), 1);
    assert_eq!(host.command_log(), vec![HostCommand::Start("alpha".to_string())]);
    monitor.shutdown().await;
}

#[tokio::test]
async fn test_uninstalled_service_reports_degraded() {
    let host = Arc::new(FakeHost::new().with_service("alpha", FakeService::new("Alpha")));
    let monitor = ServiceMonitor::new(host.clone(), fast_options("alpha"))
        .await
        .unwrap();
    let mut rx = monitor.subscribe();

    host.remove_service("alpha");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(monitor.is_degraded().await);
    assert_eq!(monitor.cached_state().await, RunState::Stopped);
    let err = monitor.start().await.unwrap_err();
    assert!(err.is_not_found());

    let degraded: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|event| matches!(event, MonitorEvent::Degraded { .. }))
        .collect();
    assert_eq!(degraded.len(), 1);
    monitor.shutdown().await;
}

#[tokio::test]
async fn test_dropped_monitor_stops_polling() {
    let host = Arc::new(FakeHost::new().with_service("alpha", FakeService::new("Alpha")));
    let monitor = ServiceMonitor::new(host.clone(), fast_options("alpha"))
        .await
        .unwrap();
    let mut rx = monitor.subscribe();

    drop(monitor);
    host.set_state("alpha", RunState::Running);
    tokio::time::sleep(Duration::from_millis(40)).await;

    // 轮询任务已中止，事件通道随之关闭
    assert!(matches!(
        rx.try_recv(),
        Err(broadcast::error::TryRecvError::Closed)
    ));
}
