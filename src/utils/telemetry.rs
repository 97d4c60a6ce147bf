// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 初始化日志
///
/// `RUST_LOG` 优先；`json` 为 true 时输出结构化JSON日志
pub fn init_telemetry(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,realty_crawler=debug".into());

    let registry = tracing_subscriber::registry().with(filter);

    // try_init: a second initialisation (e.g. in tests) is ignored
    if json {
        let _ = registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init();
    } else {
        let _ = registry.with(tracing_subscriber::fmt::layer()).try_init();
    }
}
