//! 租约恢复与去重清理扫描
//!
//! 周期性回收到期租约（worker 崩溃或心跳丢失的任务重新可租，
//! 超限的进入死信），并清理过期的去重条目。扫描通过
//! `tokio::select!` 监听关闭信号优雅退出。

use std::sync::Arc;
use std::time::Duration;

use corretor_core::{AppConfig, CorretorResult};
use corretor_domain::DedupStore;
use corretor_infrastructure::InMemoryJobQueue;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{error, info};
use uuid::Uuid;

pub struct RecoveryService {
    queue: Arc<InMemoryJobQueue>,
    dedup: Arc<dyn DedupStore>,
    scan_interval: Duration,
    purge_interval: Duration,
}

impl RecoveryService {
    pub fn new(queue: Arc<InMemoryJobQueue>, dedup: Arc<dyn DedupStore>, config: &AppConfig) -> Self {
        // 租约有效期内至少扫描两次，过期任务不会长时间滞留
        let scan_secs = (config.queue.lease_seconds / 2).max(1);
        Self {
            queue,
            dedup,
            scan_interval: Duration::from_secs(scan_secs),
            purge_interval: Duration::from_secs(config.dedup.purge_interval_seconds),
        }
    }

    /// 单轮租约回收，返回被回收的任务 id
    pub async fn scan_once(&self) -> CorretorResult<Vec<Uuid>> {
        self.queue.recover_expired().await
    }

    /// 单轮去重清理，返回清除的条目数
    pub async fn purge_once(&self) -> CorretorResult<usize> {
        self.dedup.purge_expired().await
    }

    /// 启动后台扫描循环，收到关闭信号后退出
    pub fn spawn(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        tokio::spawn(async move {
            let mut scan_tick = interval(self.scan_interval);
            let mut purge_tick = interval(self.purge_interval);

            loop {
                tokio::select! {
                    _ = scan_tick.tick() => {
                        match self.scan_once().await {
                            Ok(recovered) if !recovered.is_empty() => {
                                info!("recovered {} expired leases", recovered.len());
                            }
                            Ok(_) => {}
                            Err(e) => error!("lease recovery scan failed: {}", e),
                        }
                    }
                    _ = purge_tick.tick() => {
                        if let Err(e) = self.purge_once().await {
                            error!("dedup purge failed: {}", e);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("recovery service shutting down");
                        break;
                    }
                }
            }
        });
    }
}
