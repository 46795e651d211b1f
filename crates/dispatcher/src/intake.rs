//! 任务接收与去重
//!
//! 提交入口：校验输入、计算指纹、查去重、入队。格式问题
//! （空文本、文本过短、不支持的语言）是永久失败，立即带原因码
//! 返回调用方，不创建任务、不重试。保留窗口内重复提交相同文本
//! 返回已有任务，不产生新任务（也就不会重复计费）。

use std::sync::Arc;

use corretor_core::{CorretorError, CorretorResult, EssayRejection, WorkerConfig};
use corretor_domain::{
    ContentFingerprint, DedupStore, Essay, Job, JobPriority, JobQueue, JobStatus, RegisterOutcome,
};
use tracing::{debug, info};
use uuid::Uuid;

/// 提交结果
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub job_id: Uuid,
    pub status: JobStatus,
    /// 命中去重时为 true，调用方拿到的是已有任务
    pub deduplicated: bool,
}

pub struct SubmissionService {
    queue: Arc<dyn JobQueue>,
    dedup: Arc<dyn DedupStore>,
    config: WorkerConfig,
}

impl SubmissionService {
    pub fn new(queue: Arc<dyn JobQueue>, dedup: Arc<dyn DedupStore>, config: WorkerConfig) -> Self {
        Self {
            queue,
            dedup,
            config,
        }
    }

    pub async fn submit(
        &self,
        text: &str,
        language: &str,
        priority: JobPriority,
    ) -> CorretorResult<SubmitOutcome> {
        self.validate(text, language)?;

        let fingerprint = ContentFingerprint::of_text(text);
        if let Some(existing) = self.dedup.lookup(&fingerprint).await? {
            return self.dedup_hit(existing).await;
        }

        let essay = Arc::new(Essay::new(text.to_string(), language.to_string()));
        let job = Job::new(essay, priority);
        let job_id = job.id;

        // 条件插入解决并发首次提交的竞争；败者按缓存命中处理
        match self.dedup.register(&fingerprint, job_id).await? {
            RegisterOutcome::Exists(winner) => self.dedup_hit(winner).await,
            RegisterOutcome::Registered => {
                self.queue.enqueue(job).await?;
                info!("essay accepted as job {} (priority {:?})", job_id, priority);
                Ok(SubmitOutcome {
                    job_id,
                    status: JobStatus::Pending,
                    deduplicated: false,
                })
            }
        }
    }

    async fn dedup_hit(&self, job_id: Uuid) -> CorretorResult<SubmitOutcome> {
        let status = self
            .queue
            .snapshot(job_id)
            .await?
            .map(|s| s.status)
            .unwrap_or(JobStatus::Pending);
        debug!("dedup hit: returning existing job {} ({:?})", job_id, status);
        Ok(SubmitOutcome {
            job_id,
            status,
            deduplicated: true,
        })
    }

    fn validate(&self, text: &str, language: &str) -> CorretorResult<()> {
        if text.trim().is_empty() {
            return Err(CorretorError::invalid_essay(EssayRejection::EmptyText));
        }
        if text.split_whitespace().count() < self.config.min_essay_words {
            return Err(CorretorError::invalid_essay(EssayRejection::TooShort));
        }
        if !self
            .config
            .supported_languages
            .iter()
            .any(|l| l == language)
        {
            return Err(CorretorError::invalid_essay(
                EssayRejection::UnsupportedLanguage,
            ));
        }
        Ok(())
    }
}
