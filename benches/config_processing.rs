//! 配置处理基准测试
//!
//! 测试配置解析、验证和依赖环检测的性能

use criterion::{criterion_group, criterion_main, Criterion};
use service_warden::config::{
    sample_config, validate_config, Config, ConfigLoader, GlobalConfig, MonitorConfig,
    TomlConfigLoader,
};
use service_warden::monitor::detect_cycle;
use std::hint::black_box;

/// 构造一条依赖链: svc-0 -> svc-1 -> ... -> svc-(n-1)
fn chained_config(count: usize) -> Config {
    let monitors = (0..count)
        .map(|i| {
            let mut monitor = MonitorConfig::new(format!("svc-{i}"));
            if i + 1 < count {
                monitor.dependents = vec![format!("svc-{}", i + 1)];
            }
            monitor.description = Some(format!("服务 {i}"));
            monitor
        })
        .collect();

    Config {
        global: GlobalConfig::default(),
        monitors,
    }
}

/// 配置处理基准测试
fn config_processing_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let loader = TomlConfigLoader::new(false);

    c.bench_function("config_parse_sample", |b| {
        b.iter(|| {
            let config = runtime
                .block_on(loader.load_from_string(black_box(sample_config())))
                .unwrap();
            black_box(config)
        });
    });

    let config = chained_config(100);
    c.bench_function("config_validate_chain_100", |b| {
        b.iter(|| black_box(validate_config(black_box(&config))).unwrap());
    });

    let serialized = toml::to_string(&config).unwrap();
    c.bench_function("config_parse_chain_100", |b| {
        b.iter(|| {
            let config = runtime
                .block_on(loader.load_from_string(black_box(&serialized)))
                .unwrap();
            black_box(config)
        });
    });

    let graph = config.dependency_graph();
    c.bench_function("dependency_cycle_detection", |b| {
        b.iter(|| black_box(detect_cycle(black_box(&graph))));
    });
}

criterion_group!(benches, config_processing_benchmark);
criterion_main!(benches);
