// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::queue::work_queue::WorkQueue;
use crate::workers::crawl_worker::{CrawlPipeline, CrawlWorker};

/// 工作管理器
///
/// 在同一组管线上运行固定数量的工作者
pub struct WorkerManager {
    pipeline: Arc<CrawlPipeline>,
    worker_count: usize,
    cancel: CancellationToken,
}

impl WorkerManager {
    pub fn new(pipeline: Arc<CrawlPipeline>, worker_count: usize, cancel: CancellationToken) -> Self {
        Self {
            pipeline,
            worker_count: worker_count.max(1),
            cancel,
        }
    }

    pub fn pipeline(&self) -> &Arc<CrawlPipeline> {
        &self.pipeline
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// 运行一遍队列
    ///
    /// 启动工作者并等待它们全部退出：队列耗尽，或收到取消信号后处理完手头的单元
    ///
    /// # 参数
    ///
    /// * `queue` - 本遍要处理的队列
    pub async fn run_pass(&self, queue: Arc<WorkQueue>) {
        let handles: Vec<JoinHandle<()>> = (0..self.worker_count)
            .map(|id| {
                let worker = CrawlWorker::new(id, self.pipeline.clone());
                let queue = queue.clone();
                let cancel = self.cancel.clone();
                tokio::spawn(async move {
                    worker.run(queue, cancel).await;
                })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("Worker task failed: {}", e);
            }
        }
    }

    /// 监听关闭信号
    ///
    /// 收到 Ctrl-C 或 SIGTERM 后触发取消，工作者停止领取新单元
    pub fn spawn_shutdown_listener(&self) -> JoinHandle<()> {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_signal() => {
                    info!("Shutdown signal received");
                    info!("Draining in-flight units...");
                    cancel.cancel();
                }
                _ = cancel.cancelled() => {}
            }
        })
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Unable to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!("Unable to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
