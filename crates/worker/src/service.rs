//! Worker 服务
//!
//! 每个 worker 一次只处理一个任务：租约 -> 检索上下文 -> 并发分析
//! -> 合并 -> 上报。处理期间由心跳任务续约；首次心跳把任务置为
//! 执行中。除队列、去重与元数据存储外 worker 之间不共享状态。

use std::sync::Arc;
use std::time::Duration;

use corretor_analyzers::AnalyzerHarness;
use corretor_core::{AppConfig, CorretorError, CorretorResult, EssayRejection};
use corretor_domain::{CorrectionReport, Job, JobQueue};
use corretor_retrieval::IndexHandle;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::consolidator::Consolidator;

pub struct WorkerService {
    worker_id: String,
    queue: Arc<dyn JobQueue>,
    index: Arc<IndexHandle>,
    harness: Arc<AnalyzerHarness>,
    consolidator: Consolidator,
    top_k: usize,
    lease_duration: Duration,
    poll_interval: Duration,
    heartbeat_interval: Duration,
}

impl WorkerService {
    pub fn new(
        worker_id: String,
        queue: Arc<dyn JobQueue>,
        index: Arc<IndexHandle>,
        harness: Arc<AnalyzerHarness>,
        config: &AppConfig,
    ) -> Self {
        Self {
            worker_id,
            queue,
            index,
            harness,
            consolidator: Consolidator::new(config.analysis.clone()),
            top_k: config.retrieval.top_k,
            lease_duration: Duration::from_secs(config.queue.lease_seconds),
            poll_interval: Duration::from_millis(config.worker.poll_interval_ms),
            heartbeat_interval: Duration::from_secs(config.worker.heartbeat_interval_seconds),
        }
    }

    /// 拉取循环：一次一个任务，收到关闭信号后不再接新任务
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("worker {} started", self.worker_id);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("worker {} shutting down", self.worker_id);
                    break;
                }
                leased = self.queue.lease(&self.worker_id, self.lease_duration) => {
                    match leased {
                        Ok(Some(job)) => self.process(job).await,
                        Ok(None) => tokio::time::sleep(self.poll_interval).await,
                        Err(e) => {
                            error!("worker {} lease failed: {}", self.worker_id, e);
                            tokio::time::sleep(self.poll_interval).await;
                        }
                    }
                }
            }
        }
    }

    /// 处理一个已租到的任务并上报结果
    pub async fn process(&self, job: Job) {
        let job_id = job.id;
        debug!(
            "worker {} processing job {} (essay {}, attempt {})",
            self.worker_id, job_id, job.essay.id, job.attempt_count
        );

        // 处理期间的心跳续约；首次心跳把任务置为执行中
        let heartbeat_stop = CancellationToken::new();
        let heartbeat_task = {
            let queue = Arc::clone(&self.queue);
            let worker_id = self.worker_id.clone();
            let stop = heartbeat_stop.clone();
            let interval_duration = self.heartbeat_interval;
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(interval_duration);
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            if let Err(e) = queue.heartbeat(job_id, &worker_id).await {
                                warn!("heartbeat for job {} failed: {}", job_id, e);
                                break;
                            }
                        }
                        _ = stop.cancelled() => break,
                    }
                }
            })
        };

        let outcome = self.analyze(&job).await;

        heartbeat_stop.cancel();
        let _ = heartbeat_task.await;

        match outcome {
            Ok(report) => {
                if let Err(e) = self.queue.complete(job_id, &self.worker_id, report).await {
                    error!("completing job {} failed: {}", job_id, e);
                }
            }
            Err(e) => {
                let retryable = e.is_retryable();
                warn!(
                    "job {} attempt failed ({}retryable): {}",
                    job_id,
                    if retryable { "" } else { "non-" },
                    e
                );
                if let Err(report_err) = self
                    .queue
                    .fail(job_id, &self.worker_id, e.to_string(), retryable)
                    .await
                {
                    error!("reporting failure of job {} failed: {}", job_id, report_err);
                }
            }
        }
    }

    /// 检索 -> 并发分析 -> 合并；每一步都是纯函数，重试安全
    async fn analyze(&self, job: &Job) -> CorretorResult<CorrectionReport> {
        // 入口已校验；直接入队的任务仍按永久失败处理
        if job.essay.text.trim().is_empty() {
            return Err(CorretorError::invalid_essay(EssayRejection::EmptyText));
        }

        let context = self.index.query(&job.essay.text, self.top_k)?;
        debug!(
            "job {}: retrieved {} passages from corpus v{}",
            job.id,
            context.passages.len(),
            context.corpus_version
        );

        let fanout = self.harness.run(&job.essay, &context).await;
        let metrics = corretor_analyzers::text::metrics(&job.essay.text);

        Ok(self
            .consolidator
            .consolidate(job.id, &fanout.results, metrics, fanout.budget_exhausted))
    }
}
