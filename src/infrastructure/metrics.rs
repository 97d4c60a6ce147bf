// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::config::settings::MetricsSettings;

/// 按配置启动 Prometheus 指标导出
///
/// 未启用时什么也不做；地址无效或端口被占用只记录警告
pub fn init_metrics(settings: &MetricsSettings) {
    if !settings.enabled {
        return;
    }

    let addr: SocketAddr = match settings.listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics address {}: {}", settings.listen_addr, e);
            return;
        }
    };

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!(
            "Failed to install Prometheus recorder: {}. This might happen if the port is already in use.",
            e
        );
        return;
    }

    info!("Metrics exporter listening on {}", addr);
}
