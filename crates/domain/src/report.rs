use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 发现项严重级别，排序为 Info < Warning < Error
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "ERROR")]
    Error,
}

/// 单条批改发现，span 为作文文本中的字节偏移区间 [start, end)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub span: (usize, usize),
    pub severity: Severity,
    pub message: String,
    pub analyzer_id: String,
}

impl Finding {
    pub fn new(
        span: (usize, usize),
        severity: Severity,
        message: impl Into<String>,
        analyzer_id: impl Into<String>,
    ) -> Self {
        Self {
            span,
            severity,
            message: message.into(),
            analyzer_id: analyzer_id.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.span.1.saturating_sub(self.span.0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AnalyzerStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERRORED")]
    Errored,
    #[serde(rename = "TIMED_OUT")]
    TimedOut,
}

/// 一个分析器在一次尝试中的部分结果，发出后不可变
///
/// 失败或超时的分析器分数按缺失处理（不折算为零），发现列表为空，
/// 由合并阶段在归一化时排除该维度。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerResult {
    pub analyzer_id: String,
    pub sub_score: Option<f64>,
    pub findings: Vec<Finding>,
    pub status: AnalyzerStatus,
}

impl AnalyzerResult {
    pub fn ok(analyzer_id: impl Into<String>, sub_score: f64, findings: Vec<Finding>) -> Self {
        Self {
            analyzer_id: analyzer_id.into(),
            sub_score: Some(sub_score.clamp(0.0, 1.0)),
            findings,
            status: AnalyzerStatus::Ok,
        }
    }

    pub fn errored(analyzer_id: impl Into<String>) -> Self {
        Self {
            analyzer_id: analyzer_id.into(),
            sub_score: None,
            findings: Vec::new(),
            status: AnalyzerStatus::Errored,
        }
    }

    pub fn timed_out(analyzer_id: impl Into<String>) -> Self {
        Self {
            analyzer_id: analyzer_id.into(),
            sub_score: None,
            findings: Vec::new(),
            status: AnalyzerStatus::TimedOut,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, AnalyzerStatus::Ok)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Completeness {
    #[serde(rename = "FINAL")]
    Final,
    #[serde(rename = "PARTIAL")]
    Partial,
}

/// 作文文本的基础度量，随报告返回，仅供展示
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TextMetrics {
    pub word_count: usize,
    pub sentence_count: usize,
    pub paragraph_count: usize,
    pub avg_sentence_len: f64,
    pub avg_word_len: f64,
}

/// 最终批改报告，创建后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionReport {
    pub job_id: Uuid,
    pub overall_score: f64,
    pub dimension_scores: BTreeMap<String, f64>,
    pub findings: Vec<Finding>,
    pub metrics: TextMetrics,
    pub completeness: Completeness,
    pub generated_at: DateTime<Utc>,
}

impl CorrectionReport {
    pub fn is_partial(&self) -> bool {
        matches!(self.completeness, Completeness::Partial)
    }
}
