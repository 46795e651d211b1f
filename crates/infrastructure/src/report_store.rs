//! 内存版元数据存储
//!
//! 实现外部元数据存储的 upsert 契约，用于嵌入式部署和测试。
//! 核心只依赖接口，不关心真实存储的 schema。

use std::collections::HashMap;

use async_trait::async_trait;
use corretor_core::CorretorResult;
use corretor_domain::{CorrectionReport, JobSnapshot, ReportRepository};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryReportRepository {
    jobs: Mutex<HashMap<Uuid, JobSnapshot>>,
    reports: Mutex<HashMap<Uuid, CorrectionReport>>,
}

impl InMemoryReportRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 测试与状态查询辅助：最近一次持久化的任务快照
    pub async fn job_record(&self, job_id: Uuid) -> Option<JobSnapshot> {
        self.jobs.lock().await.get(&job_id).cloned()
    }
}

#[async_trait]
impl ReportRepository for InMemoryReportRepository {
    async fn upsert_job(&self, snapshot: &JobSnapshot) -> CorretorResult<()> {
        self.jobs.lock().await.insert(snapshot.id, snapshot.clone());
        Ok(())
    }

    async fn save_report(&self, report: &CorrectionReport) -> CorretorResult<()> {
        self.reports
            .lock()
            .await
            .insert(report.job_id, report.clone());
        Ok(())
    }

    async fn get_report(&self, job_id: Uuid) -> CorretorResult<Option<CorrectionReport>> {
        Ok(self.reports.lock().await.get(&job_id).cloned())
    }
}
