use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fingerprint::ContentFingerprint;

/// 待批改的作文，提交后不可变
///
/// 下游实体通过 `Arc<Essay>` 引用作文，不复制文本。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Essay {
    pub id: Uuid,
    pub text: String,
    /// 调用方声明的语言代码，如 "pt"
    pub language: String,
    pub submitted_at: DateTime<Utc>,
}

impl Essay {
    pub fn new(text: String, language: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            text,
            language,
            submitted_at: Utc::now(),
        }
    }

    pub fn fingerprint(&self) -> ContentFingerprint {
        ContentFingerprint::of_text(&self.text)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "LEASED")]
    Leased,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "DEAD_LETTERED")]
    DeadLettered,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::DeadLettered
        )
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, JobStatus::Leased | JobStatus::Running)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobPriority {
    Low = 1,
    Normal = 5,
    High = 10,
}

impl JobPriority {
    /// 公平性老化：等待超过阈值的任务在排序时提升一个档位
    pub fn promoted(self) -> Self {
        match self {
            JobPriority::Low => JobPriority::Normal,
            JobPriority::Normal | JobPriority::High => JobPriority::High,
        }
    }
}

impl Default for JobPriority {
    fn default() -> Self {
        JobPriority::Normal
    }
}

/// 批改任务
///
/// 只有 Dispatcher 和持有租约的 worker 可以修改任务状态；
/// Succeeded、Failed、DeadLettered 是终态。
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub essay: Arc<Essay>,
    pub fingerprint: ContentFingerprint,
    pub status: JobStatus,
    pub attempt_count: u32,
    pub priority: JobPriority,
    pub created_at: DateTime<Utc>,
    pub lease_expiry: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Job {
    pub fn new(essay: Arc<Essay>, priority: JobPriority) -> Self {
        let fingerprint = essay.fingerprint();
        Self {
            id: Uuid::new_v4(),
            essay,
            fingerprint,
            status: JobStatus::Pending,
            attempt_count: 0,
            priority,
            created_at: Utc::now(),
            lease_expiry: None,
            last_error: None,
        }
    }

    pub fn snapshot(&self, worker_id: Option<String>) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            essay_id: self.essay.id,
            fingerprint: self.fingerprint.clone(),
            status: self.status,
            attempt_count: self.attempt_count,
            priority: self.priority,
            created_at: self.created_at,
            lease_expiry: self.lease_expiry,
            last_error: self.last_error.clone(),
            worker_id,
        }
    }
}

/// 任务的可持久化视图，元数据存储按 job_id upsert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub essay_id: Uuid,
    pub fingerprint: ContentFingerprint,
    pub status: JobStatus,
    pub attempt_count: u32,
    pub priority: JobPriority,
    pub created_at: DateTime<Utc>,
    pub lease_expiry: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub worker_id: Option<String>,
}

/// 参考语料中的一个段落
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencePassage {
    pub id: String,
    pub title: String,
    pub text: String,
}

/// 检索命中的段落及其相似度
#[derive(Debug, Clone)]
pub struct ScoredPassage {
    pub passage: Arc<ReferencePassage>,
    pub score: f64,
}

/// 每个任务检索一次的上下文，所有分析器只读共享
///
/// 可重算：重试时对同一索引版本重新查询必须得到相同结果，
/// 因此从不作为真值持久化。
#[derive(Debug, Clone, Default)]
pub struct RetrievalContext {
    pub corpus_version: u64,
    pub passages: Vec<ScoredPassage>,
}

impl RetrievalContext {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}
