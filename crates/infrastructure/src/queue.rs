//! 内存任务队列实现
//!
//! 使用 Tokio 互斥锁保护的单份状态实现可见性租约队列，适用于
//! 嵌入式部署场景。投递语义为 at-least-once：租约到期未续约的任务
//! 由恢复扫描回收重派；重试按指数退避加抖动推迟；超过最大尝试次数
//! 进入死信，保留最后一次错误，只可查询，不再自动重试。
//!
//! 每次状态迁移先写穿元数据存储（write-ahead-of-acknowledgment），
//! 写入失败则回滚内存状态并向调用方返回错误。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corretor_core::{CorretorError, CorretorResult, QueueConfig};
use corretor_domain::{
    CorrectionReport, Job, JobPriority, JobQueue, JobSnapshot, JobStatus, ReportRepository,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct LeaseRecord {
    worker_id: String,
    expires_at: DateTime<Utc>,
    lease_duration: Duration,
}

#[derive(Debug, Clone)]
struct PendingEntry {
    job_id: Uuid,
    enqueued_at: DateTime<Utc>,
    /// 退避重试的任务在该时刻之前不可租
    not_before: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct QueueState {
    jobs: HashMap<Uuid, Job>,
    pending: Vec<PendingEntry>,
    leases: HashMap<Uuid, LeaseRecord>,
}

pub struct InMemoryJobQueue {
    state: Mutex<QueueState>,
    repository: Arc<dyn ReportRepository>,
    config: QueueConfig,
}

impl InMemoryJobQueue {
    pub fn new(repository: Arc<dyn ReportRepository>, config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            repository,
            config,
        }
    }

    /// 指数退避加随机抖动，避免雷群效应
    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.config.retry_base_seconds as f64;
        let exponential = base
            * self
                .config
                .retry_backoff_multiplier
                .powi(attempt.saturating_sub(1) as i32);
        let capped = exponential.min(self.config.retry_max_seconds as f64);
        let jitter = capped * self.config.retry_jitter_factor * (rand::random::<f64>() - 0.5) * 2.0;
        Duration::from_secs_f64((capped + jitter).max(base))
    }

    /// 租约选择用的有效优先级：等待每超过一个老化阈值提升一档
    fn effective_priority(&self, base: JobPriority, waited: chrono::Duration) -> JobPriority {
        let threshold = self.config.aging_threshold_seconds as i64;
        let mut priority = base;
        let mut crossings = if threshold > 0 {
            waited.num_seconds() / threshold
        } else {
            0
        };
        while crossings > 0 && priority < JobPriority::High {
            priority = priority.promoted();
            crossings -= 1;
        }
        priority
    }

    /// 回收租约到期的任务：未超限的重新入队（带退避），超限的进入死信
    ///
    /// 由 dispatcher 的恢复扫描周期性驱动；worker 崩溃或心跳丢失
    /// 正是通过这里让任务重新可租，保证 at-least-once 投递。
    pub async fn recover_expired(&self) -> CorretorResult<Vec<Uuid>> {
        let now = Utc::now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let expired: Vec<(Uuid, String)> = state
            .leases
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(job_id, lease)| (*job_id, lease.worker_id.clone()))
            .collect();

        let mut recovered = Vec::new();
        for (job_id, worker_id) in expired {
            state.leases.remove(&job_id);
            let Some(job) = state.jobs.get_mut(&job_id) else {
                continue;
            };
            job.lease_expiry = None;
            job.last_error = Some(format!("lease expired on worker {worker_id}"));

            if job.attempt_count >= self.config.max_attempts {
                job.status = JobStatus::DeadLettered;
                warn!(
                    "job {} dead-lettered after {} attempts (lease expired)",
                    job_id, job.attempt_count
                );
            } else {
                job.status = JobStatus::Pending;
                let delay = self.retry_delay(job.attempt_count);
                state.pending.push(PendingEntry {
                    job_id,
                    enqueued_at: job.created_at,
                    not_before: Some(now + chrono::Duration::from_std(delay).unwrap_or_default()),
                });
                info!(
                    "job {} recovered from expired lease, retry in {:?} (attempt {})",
                    job_id, delay, job.attempt_count
                );
            }

            let snapshot = state.jobs[&job_id].snapshot(None);
            self.repository.upsert_job(&snapshot).await?;
            recovered.push(job_id);
        }
        Ok(recovered)
    }

    fn verify_lease(state: &QueueState, job_id: Uuid, worker_id: &str) -> CorretorResult<()> {
        match state.leases.get(&job_id) {
            Some(lease) if lease.worker_id == worker_id => Ok(()),
            Some(_) | None => Err(CorretorError::lease_conflict(job_id, worker_id)),
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> CorretorResult<()> {
        let mut state = self.state.lock().await;
        if state.jobs.contains_key(&job.id) {
            return Err(CorretorError::queue_error(format!(
                "job {} already enqueued",
                job.id
            )));
        }

        let snapshot = job.snapshot(None);
        self.repository.upsert_job(&snapshot).await?;

        debug!(
            "enqueued job {} (priority {:?}, essay {})",
            job.id, job.priority, job.essay.id
        );
        state.pending.push(PendingEntry {
            job_id: job.id,
            enqueued_at: job.created_at,
            not_before: None,
        });
        state.jobs.insert(job.id, job);
        Ok(())
    }

    async fn lease(
        &self,
        worker_id: &str,
        lease_duration: Duration,
    ) -> CorretorResult<Option<Job>> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        // 可租集合中选有效优先级最高的；同级按入队时间先来先服务
        let mut best: Option<(usize, JobPriority, DateTime<Utc>)> = None;
        for (idx, entry) in state.pending.iter().enumerate() {
            if entry.not_before.is_some_and(|t| t > now) {
                continue;
            }
            let Some(job) = state.jobs.get(&entry.job_id) else {
                continue;
            };
            let effective =
                self.effective_priority(job.priority, now - entry.enqueued_at);
            let candidate = (idx, effective, entry.enqueued_at);
            best = match best {
                None => Some(candidate),
                Some(current) => {
                    let (_, cur_priority, cur_enqueued) = current;
                    if effective > cur_priority
                        || (effective == cur_priority && entry.enqueued_at < cur_enqueued)
                    {
                        Some(candidate)
                    } else {
                        Some(current)
                    }
                }
            };
        }

        let Some((idx, _, _)) = best else {
            return Ok(None);
        };
        let entry = state.pending.remove(idx);
        let job_id = entry.job_id;

        {
            let job = state
                .jobs
                .get_mut(&job_id)
                .ok_or_else(|| CorretorError::job_not_found(job_id))?;
            job.status = JobStatus::Leased;
            job.attempt_count += 1;
            job.lease_expiry = Some(
                now + chrono::Duration::from_std(lease_duration).unwrap_or_default(),
            );
        }

        let snapshot = state.jobs[&job_id].snapshot(Some(worker_id.to_string()));
        if let Err(e) = self.repository.upsert_job(&snapshot).await {
            // 写穿失败则回滚，任务保持可租
            let job = state.jobs.get_mut(&job_id).expect("job vanished");
            job.status = JobStatus::Pending;
            job.attempt_count -= 1;
            job.lease_expiry = None;
            let insert_at = idx.min(state.pending.len());
            state.pending.insert(insert_at, entry);
            return Err(e);
        }

        state.leases.insert(
            job_id,
            LeaseRecord {
                worker_id: worker_id.to_string(),
                expires_at: now + chrono::Duration::from_std(lease_duration).unwrap_or_default(),
                lease_duration,
            },
        );

        let job = state.jobs[&job_id].clone();
        info!(
            "job {} leased by {} (attempt {}/{})",
            job_id, worker_id, job.attempt_count, self.config.max_attempts
        );
        Ok(Some(job))
    }

    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> CorretorResult<()> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        Self::verify_lease(&state, job_id, worker_id)?;

        let lease_duration = {
            let lease = state.leases.get_mut(&job_id).expect("lease verified");
            lease.expires_at =
                now + chrono::Duration::from_std(lease.lease_duration).unwrap_or_default();
            lease.lease_duration
        };

        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| CorretorError::job_not_found(job_id))?;
        job.lease_expiry =
            Some(now + chrono::Duration::from_std(lease_duration).unwrap_or_default());
        // 首次心跳把租到的任务置为执行中
        if job.status == JobStatus::Leased {
            job.status = JobStatus::Running;
            let snapshot = job.snapshot(Some(worker_id.to_string()));
            self.repository.upsert_job(&snapshot).await?;
        }
        debug!("job {} heartbeat from {}", job_id, worker_id);
        Ok(())
    }

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        report: CorrectionReport,
    ) -> CorretorResult<()> {
        let mut state = self.state.lock().await;
        Self::verify_lease(&state, job_id, worker_id)?;

        {
            let job = state
                .jobs
                .get_mut(&job_id)
                .ok_or_else(|| CorretorError::job_not_found(job_id))?;
            job.status = JobStatus::Succeeded;
            job.lease_expiry = None;
            job.last_error = None;
        }

        let snapshot = state.jobs[&job_id].snapshot(Some(worker_id.to_string()));
        self.repository.save_report(&report).await?;
        if let Err(e) = self.repository.upsert_job(&snapshot).await {
            let job = state.jobs.get_mut(&job_id).expect("job vanished");
            job.status = JobStatus::Running;
            return Err(e);
        }

        state.leases.remove(&job_id);
        info!("job {} completed by {}", job_id, worker_id);
        Ok(())
    }

    async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error: String,
        retryable: bool,
    ) -> CorretorResult<()> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        Self::verify_lease(&state, job_id, worker_id)?;

        let (snapshot, requeue_entry, rollback) = {
            let job = state
                .jobs
                .get_mut(&job_id)
                .ok_or_else(|| CorretorError::job_not_found(job_id))?;
            let rollback = (job.status, job.last_error.clone(), job.lease_expiry);
            job.lease_expiry = None;
            job.last_error = Some(error.clone());

            let mut requeue_entry = None;
            if !retryable {
                job.status = JobStatus::Failed;
                warn!("job {} failed permanently: {}", job_id, error);
            } else if job.attempt_count >= self.config.max_attempts {
                job.status = JobStatus::DeadLettered;
                warn!(
                    "job {} dead-lettered after {} attempts: {}",
                    job_id, job.attempt_count, error
                );
            } else {
                job.status = JobStatus::Pending;
                let delay = self.retry_delay(job.attempt_count);
                requeue_entry = Some(PendingEntry {
                    job_id,
                    enqueued_at: job.created_at,
                    not_before: Some(now + chrono::Duration::from_std(delay).unwrap_or_default()),
                });
                info!(
                    "job {} will retry in {:?} (attempt {}/{}): {}",
                    job_id, delay, job.attempt_count, self.config.max_attempts, error
                );
            }
            (job.snapshot(None), requeue_entry, rollback)
        };

        if let Err(e) = self.repository.upsert_job(&snapshot).await {
            // 写穿失败则回滚，租约保留，worker 可重新上报
            let job = state.jobs.get_mut(&job_id).expect("job vanished");
            let (status, last_error, lease_expiry) = rollback;
            job.status = status;
            job.last_error = last_error;
            job.lease_expiry = lease_expiry;
            return Err(e);
        }

        state.leases.remove(&job_id);
        if let Some(entry) = requeue_entry {
            state.pending.push(entry);
        }
        Ok(())
    }

    async fn snapshot(&self, job_id: Uuid) -> CorretorResult<Option<JobSnapshot>> {
        let state = self.state.lock().await;
        Ok(state.jobs.get(&job_id).map(|job| {
            let worker = state.leases.get(&job_id).map(|l| l.worker_id.clone());
            job.snapshot(worker)
        }))
    }

    async fn dead_lettered(&self) -> CorretorResult<Vec<JobSnapshot>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::DeadLettered)
            .map(|job| job.snapshot(None))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report_store::InMemoryReportRepository;
    use corretor_domain::Essay;

    fn queue_with(config: QueueConfig) -> InMemoryJobQueue {
        InMemoryJobQueue::new(Arc::new(InMemoryReportRepository::new()), config)
    }

    fn fast_retry_config() -> QueueConfig {
        QueueConfig {
            max_attempts: 2,
            retry_base_seconds: 0,
            retry_max_seconds: 0,
            ..QueueConfig::default()
        }
    }

    fn job(text: &str, priority: JobPriority) -> Job {
        Job::new(
            Arc::new(Essay::new(text.to_string(), "pt".to_string())),
            priority,
        )
    }

    fn report(job_id: Uuid) -> CorrectionReport {
        CorrectionReport {
            job_id,
            overall_score: 0.8,
            dimension_scores: Default::default(),
            findings: Vec::new(),
            metrics: Default::default(),
            completeness: corretor_domain::Completeness::Final,
            generated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_lease_respects_priority_then_fifo() {
        let queue = queue_with(QueueConfig::default());
        let low = job("texto um", JobPriority::Low);
        let high = job("texto dois", JobPriority::High);
        let normal_old = job("texto três", JobPriority::Normal);
        let normal_new = job("texto quatro", JobPriority::Normal);

        queue.enqueue(low.clone()).await.unwrap();
        queue.enqueue(normal_old.clone()).await.unwrap();
        queue.enqueue(normal_new.clone()).await.unwrap();
        queue.enqueue(high.clone()).await.unwrap();

        let lease_time = Duration::from_secs(30);
        let first = queue.lease("w1", lease_time).await.unwrap().unwrap();
        assert_eq!(first.id, high.id);
        let second = queue.lease("w1", lease_time).await.unwrap().unwrap();
        assert_eq!(second.id, normal_old.id);
        let third = queue.lease("w1", lease_time).await.unwrap().unwrap();
        assert_eq!(third.id, normal_new.id);
        let fourth = queue.lease("w1", lease_time).await.unwrap().unwrap();
        assert_eq!(fourth.id, low.id);
        assert!(queue.lease("w1", lease_time).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_never_double_leases() {
        let queue = queue_with(QueueConfig::default());
        let j = job("texto", JobPriority::Normal);
        queue.enqueue(j.clone()).await.unwrap();

        let leased = queue
            .lease("w1", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(leased.id, j.id);
        assert_eq!(leased.status, JobStatus::Leased);
        // 租约未过期期间其他 worker 拿不到任务
        assert!(queue
            .lease("w2", Duration::from_secs(30))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_heartbeat_marks_running_and_rejects_stranger() {
        let queue = queue_with(QueueConfig::default());
        let j = job("texto", JobPriority::Normal);
        queue.enqueue(j.clone()).await.unwrap();
        queue
            .lease("w1", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();

        queue.heartbeat(j.id, "w1").await.unwrap();
        let snapshot = queue.snapshot(j.id).await.unwrap().unwrap();
        assert_eq!(snapshot.status, JobStatus::Running);

        let err = queue.heartbeat(j.id, "w2").await.unwrap_err();
        assert!(matches!(err, CorretorError::LeaseConflict { .. }));
    }

    #[tokio::test]
    async fn test_complete_is_terminal() {
        let queue = queue_with(QueueConfig::default());
        let j = job("texto", JobPriority::Normal);
        queue.enqueue(j.clone()).await.unwrap();
        queue
            .lease("w1", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();

        queue.complete(j.id, "w1", report(j.id)).await.unwrap();
        let snapshot = queue.snapshot(j.id).await.unwrap().unwrap();
        assert_eq!(snapshot.status, JobStatus::Succeeded);
        // 完成后心跳被拒绝
        assert!(queue.heartbeat(j.id, "w1").await.is_err());
    }

    #[tokio::test]
    async fn test_permanent_failure_skips_retry() {
        let queue = queue_with(QueueConfig::default());
        let j = job("texto", JobPriority::Normal);
        queue.enqueue(j.clone()).await.unwrap();
        queue
            .lease("w1", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();

        queue
            .fail(j.id, "w1", "EMPTY_TEXT".to_string(), false)
            .await
            .unwrap();
        let snapshot = queue.snapshot(j.id).await.unwrap().unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.last_error.as_deref(), Some("EMPTY_TEXT"));
        // 不再可租
        assert!(queue
            .lease("w1", Duration::from_secs(30))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_retryable_failure_requeues_then_dead_letters() {
        let queue = queue_with(fast_retry_config());
        let j = job("texto", JobPriority::Normal);
        queue.enqueue(j.clone()).await.unwrap();

        // 第一次尝试失败，重新入队
        queue
            .lease("w1", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        queue
            .fail(j.id, "w1", "index unavailable".to_string(), true)
            .await
            .unwrap();
        let snapshot = queue.snapshot(j.id).await.unwrap().unwrap();
        assert_eq!(snapshot.status, JobStatus::Pending);
        assert_eq!(snapshot.attempt_count, 1);

        // 第二次尝试（达到 max_attempts=2）失败后进入死信
        let again = queue
            .lease("w1", Duration::from_secs(30))
            .await
            .unwrap()
            .expect("retried job should be leasable");
        assert_eq!(again.id, j.id);
        assert_eq!(again.attempt_count, 2);
        queue
            .fail(j.id, "w1", "index unavailable".to_string(), true)
            .await
            .unwrap();

        let snapshot = queue.snapshot(j.id).await.unwrap().unwrap();
        assert_eq!(snapshot.status, JobStatus::DeadLettered);
        let dead = queue.dead_lettered().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, j.id);
        assert!(dead[0].last_error.is_some());
        // 死信任务不再可租
        assert!(queue
            .lease("w1", Duration::from_secs(30))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_expired_lease_is_recovered_once_then_dead_lettered() {
        let queue = queue_with(fast_retry_config());
        let j = job("texto", JobPriority::Normal);
        queue.enqueue(j.clone()).await.unwrap();

        // 租约立即过期，模拟 worker 崩溃
        queue
            .lease("w1", Duration::from_secs(0))
            .await
            .unwrap()
            .unwrap();
        let recovered = queue.recover_expired().await.unwrap();
        assert_eq!(recovered, vec![j.id]);
        let snapshot = queue.snapshot(j.id).await.unwrap().unwrap();
        assert_eq!(snapshot.status, JobStatus::Pending);

        // 再租一次（attempt 2 = max）再次崩溃后进入死信
        queue
            .lease("w2", Duration::from_secs(0))
            .await
            .unwrap()
            .unwrap();
        queue.recover_expired().await.unwrap();
        let snapshot = queue.snapshot(j.id).await.unwrap().unwrap();
        assert_eq!(snapshot.status, JobStatus::DeadLettered);
    }

    #[tokio::test]
    async fn test_aging_promotes_waiting_low_priority() {
        let config = QueueConfig {
            aging_threshold_seconds: 1,
            ..QueueConfig::default()
        };
        let queue = queue_with(config);
        let low = job("texto velho", JobPriority::Low);
        queue.enqueue(low.clone()).await.unwrap();

        // 低优先级任务等待超过阈值后，不再被新来的 Normal 任务插队
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let normal = job("texto novo", JobPriority::Normal);
        queue.enqueue(normal.clone()).await.unwrap();

        let first = queue
            .lease("w1", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.id, low.id);
    }
}
