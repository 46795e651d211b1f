use thiserror::Error;
use uuid::Uuid;

/// 作文被拒收的具体原因，作为永久失败的原因码暴露给调用方
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EssayRejection {
    #[serde(rename = "EMPTY_TEXT")]
    EmptyText,
    #[serde(rename = "TEXT_TOO_SHORT")]
    TooShort,
    #[serde(rename = "UNSUPPORTED_LANGUAGE")]
    UnsupportedLanguage,
}

impl EssayRejection {
    pub fn code(&self) -> &'static str {
        match self {
            EssayRejection::EmptyText => "EMPTY_TEXT",
            EssayRejection::TooShort => "TEXT_TOO_SHORT",
            EssayRejection::UnsupportedLanguage => "UNSUPPORTED_LANGUAGE",
        }
    }
}

impl std::fmt::Display for EssayRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Error, Debug, Clone)]
pub enum CorretorError {
    #[error("作文不合法: {reason}")]
    InvalidEssay { reason: EssayRejection },
    #[error("批改任务不存在: id={id}")]
    JobNotFound { id: Uuid },
    #[error("租约冲突: 任务 {id} 不属于 worker {worker_id}")]
    LeaseConflict { id: Uuid, worker_id: String },
    #[error("队列操作失败: {0}")]
    QueueOperation(String),
    #[error("检索索引不可用: {0}")]
    IndexUnavailable(String),
    #[error("元数据存储操作失败: {0}")]
    Repository(String),
    #[error("分析器执行失败: {0}")]
    Analyzer(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("数据序列化错误: {0}")]
    Serialization(String),
    #[error("系统内部错误: {0}")]
    Internal(String),
}

pub type CorretorResult<T> = Result<T, CorretorError>;

impl CorretorError {
    pub fn invalid_essay(reason: EssayRejection) -> Self {
        Self::InvalidEssay { reason }
    }
    pub fn job_not_found(id: Uuid) -> Self {
        Self::JobNotFound { id }
    }
    pub fn lease_conflict(id: Uuid, worker_id: impl Into<String>) -> Self {
        Self::LeaseConflict {
            id,
            worker_id: worker_id.into(),
        }
    }
    pub fn queue_error<S: Into<String>>(msg: S) -> Self {
        Self::QueueOperation(msg.into())
    }
    pub fn repository_error<S: Into<String>>(msg: S) -> Self {
        Self::Repository(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 瞬态失败，按退避策略重试，超过最大尝试次数后进入死信
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CorretorError::QueueOperation(_)
                | CorretorError::IndexUnavailable(_)
                | CorretorError::Repository(_)
                | CorretorError::Analyzer(_)
                | CorretorError::Timeout(_)
        )
    }

    /// 永久失败，立即上报调用方，不重试
    pub fn is_permanent(&self) -> bool {
        matches!(self, CorretorError::InvalidEssay { .. })
    }

    /// 被拒作文的原因码（仅 InvalidEssay 有值）
    pub fn rejection(&self) -> Option<EssayRejection> {
        match self {
            CorretorError::InvalidEssay { reason } => Some(*reason),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CorretorError {
    fn from(err: serde_json::Error) -> Self {
        CorretorError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for CorretorError {
    fn from(err: anyhow::Error) -> Self {
        CorretorError::Internal(err.to_string())
    }
}
