//! 嵌入式应用装配
//!
//! 把索引、队列、去重、worker 池和恢复扫描装配成一个进程内运行的
//! 批改流水线，并暴露提交/查询/重建索引三个外部接口。

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use corretor_analyzers::{default_analyzers, AnalyzerHarness};
use corretor_core::{AppConfig, CorretorResult};
use corretor_dispatcher::{RecoveryService, SubmissionService, SubmitOutcome};
use corretor_domain::{
    CorrectionReport, JobPriority, JobQueue, JobSnapshot, JobStatus, ReferencePassage,
    ReportRepository,
};
use corretor_infrastructure::{InMemoryDedupStore, InMemoryJobQueue, InMemoryReportRepository};
use corretor_retrieval::{builtin_corpus, load_corpus_dir, IndexHandle, TfIdfIndex};
use corretor_worker::WorkerService;
use tracing::info;
use uuid::Uuid;

use crate::shutdown::ShutdownManager;

/// `get_result` 的返回：有报告给报告，否则给任务当前状态
#[derive(Debug, Clone)]
pub struct JobResultView {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub report: Option<CorrectionReport>,
    pub last_error: Option<String>,
}

pub struct Application {
    config: AppConfig,
    queue: Arc<InMemoryJobQueue>,
    repository: Arc<InMemoryReportRepository>,
    index: Arc<IndexHandle>,
    submission: SubmissionService,
    recovery: Arc<RecoveryService>,
}

impl Application {
    pub fn new(config: AppConfig) -> Result<Self> {
        let corpus = match &config.retrieval.corpus_dir {
            Some(dir) => load_corpus_dir(Path::new(dir))
                .with_context(|| format!("加载语料目录失败: {dir}"))?,
            None => builtin_corpus(),
        };
        info!("building retrieval index over {} passages", corpus.len());
        let index = Arc::new(IndexHandle::new(TfIdfIndex::build(corpus, 1)));

        let repository = Arc::new(InMemoryReportRepository::new());
        let queue = Arc::new(InMemoryJobQueue::new(
            repository.clone(),
            config.queue.clone(),
        ));
        let dedup = Arc::new(InMemoryDedupStore::new(&config.dedup));

        let submission = SubmissionService::new(
            queue.clone(),
            dedup.clone(),
            config.worker.clone(),
        );
        let recovery = Arc::new(RecoveryService::new(queue.clone(), dedup, &config));

        Ok(Self {
            config,
            queue,
            repository,
            index,
            submission,
            recovery,
        })
    }

    /// 启动 worker 池与恢复扫描
    pub fn start(&self, shutdown: &ShutdownManager) {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());

        for n in 0..self.config.worker.workers {
            let worker = WorkerService::new(
                format!("{host}-worker-{n}"),
                self.queue.clone() as Arc<dyn JobQueue>,
                self.index.clone(),
                Arc::new(AnalyzerHarness::new(
                    default_analyzers(),
                    &self.config.analysis,
                )),
                &self.config,
            );
            let shutdown_rx = shutdown.subscribe();
            tokio::spawn(async move {
                worker.run(shutdown_rx).await;
            });
        }

        self.recovery.clone().spawn(shutdown.subscribe());
        info!(
            "correction pipeline started with {} workers",
            self.config.worker.workers
        );
    }

    /// 提交作文；保留窗口内重复文本返回已有任务
    pub async fn submit_essay(
        &self,
        text: &str,
        language: &str,
        priority: JobPriority,
    ) -> CorretorResult<SubmitOutcome> {
        self.submission.submit(text, language, priority).await
    }

    /// 查询任务结果或当前状态
    pub async fn get_result(&self, job_id: Uuid) -> CorretorResult<Option<JobResultView>> {
        let Some(snapshot) = self.queue.snapshot(job_id).await? else {
            return Ok(None);
        };
        let report = if snapshot.status == JobStatus::Succeeded {
            self.repository.get_report(job_id).await?
        } else {
            None
        };
        Ok(Some(JobResultView {
            job_id,
            status: snapshot.status,
            report,
            last_error: snapshot.last_error,
        }))
    }

    /// 原子替换检索索引；进行中的查询继续使用旧版本
    pub fn rebuild_index(
        &self,
        passages: Vec<ReferencePassage>,
        corpus_version: u64,
    ) -> CorretorResult<()> {
        self.index.rebuild(passages, corpus_version)
    }

    /// 死信任务清单，保留最后一次错误供人工处理
    pub async fn dead_lettered(&self) -> CorretorResult<Vec<JobSnapshot>> {
        self.queue.dead_lettered().await
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
