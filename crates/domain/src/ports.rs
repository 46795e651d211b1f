//! 核心组件之间的抽象接口
//!
//! 定义队列、去重与元数据存储的抽象，遵循依赖倒置原则；
//! 内存实现位于 infrastructure crate。

use std::time::Duration;

use async_trait::async_trait;
use corretor_core::CorretorResult;
use uuid::Uuid;

use crate::entities::{Job, JobSnapshot};
use crate::fingerprint::ContentFingerprint;
use crate::report::CorrectionReport;

/// 任务队列抽象
///
/// 投递语义为 at-least-once：租约是任务所有权的唯一互斥机制，
/// worker 崩溃或心跳超时后任务重新变为可租。首次 `heartbeat`
/// 把 Leased 任务置为 Running，之后的心跳只续约。
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> CorretorResult<()>;

    /// 取一个可执行任务并建立租约；队列为空时返回 `None`（由调用方轮询）。
    /// 高优先级优先，同级按入队时间先来先服务；等待超过老化阈值的任务
    /// 在排序时提升档位，避免低优先级饿死。
    async fn lease(&self, worker_id: &str, lease_duration: Duration)
        -> CorretorResult<Option<Job>>;

    /// 续约；任务不再属于该 worker 时返回 `LeaseConflict`
    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> CorretorResult<()>;

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        report: CorrectionReport,
    ) -> CorretorResult<()>;

    /// 上报失败；`retryable=false` 立即置为 Failed，
    /// `retryable=true` 按退避策略重新入队，超限后进入死信
    async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error: String,
        retryable: bool,
    ) -> CorretorResult<()>;

    async fn snapshot(&self, job_id: Uuid) -> CorretorResult<Option<JobSnapshot>>;

    /// 死信任务永不静默丢弃，保留最后一次错误供人工处理
    async fn dead_lettered(&self) -> CorretorResult<Vec<JobSnapshot>>;
}

/// 指纹注册结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    /// 并发首次提交竞争的败者拿到胜者的任务 id，按缓存命中处理
    Exists(Uuid),
}

/// 去重存储抽象，条件插入（compare-and-set）语义
#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn lookup(&self, fingerprint: &ContentFingerprint) -> CorretorResult<Option<Uuid>>;

    async fn register(
        &self,
        fingerprint: &ContentFingerprint,
        job_id: Uuid,
    ) -> CorretorResult<RegisterOutcome>;

    /// 清除超出保留窗口的条目；不影响仍在运行的任务，
    /// 只是之后相同文本不再命中
    async fn purge_expired(&self) -> CorretorResult<usize>;
}

/// 外部元数据存储的 upsert 契约，按 job_id 为键
///
/// 每次状态迁移先写穿本接口再确认迁移（write-ahead-of-acknowledgment）。
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn upsert_job(&self, snapshot: &JobSnapshot) -> CorretorResult<()>;
    async fn save_report(&self, report: &CorrectionReport) -> CorretorResult<()>;
    async fn get_report(&self, job_id: Uuid) -> CorretorResult<Option<CorrectionReport>>;
}
