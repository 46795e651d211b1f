//! 结构组织维度
//!
//! 按段落切分检查引言/论证/结论的组织：段落数量、各部分比例、
//! 结论段是否带结论连接词。理想结构：引言 1 段，论证 2-3 段，
//! 结论 1 段。

use async_trait::async_trait;
use corretor_core::{CorretorError, CorretorResult};
use corretor_domain::{Essay, Finding, RetrievalContext, Severity};
use tokio_util::sync::CancellationToken;

use crate::rules::{contains_connective, CONNECTIVES};
use crate::text::{paragraph_spans, word_spans};
use crate::{Analyzer, AnalyzerOutput};

pub struct StructureAnalyzer;

impl StructureAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StructureAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

pub const ANALYZER_ID: &str = "estrutura";

/// 引言占比上限：超过全文词数的 40% 视为头重脚轻
const INTRO_SHARE_LIMIT: f64 = 0.4;
/// 理想总段数区间（引言 1 + 论证 2-3 + 结论 1）
const IDEAL_PARAGRAPHS: (usize, usize) = (4, 5);

#[async_trait]
impl Analyzer for StructureAnalyzer {
    fn id(&self) -> &'static str {
        ANALYZER_ID
    }

    async fn analyze(
        &self,
        essay: &Essay,
        _context: &RetrievalContext,
        cancel: &CancellationToken,
    ) -> CorretorResult<AnalyzerOutput> {
        if cancel.is_cancelled() {
            return Err(CorretorError::Timeout(
                "structure analysis cancelled".into(),
            ));
        }

        let text = &essay.text;
        let paragraphs = paragraph_spans(text);
        let mut findings = Vec::new();
        let mut issues = 0u32;

        if paragraphs.len() < 3 {
            issues += 1;
            // 文档级发现用零长度区间，不与词级发现判重
            findings.push(Finding::new(
                (0, 0),
                Severity::Warning,
                format!(
                    "texto com {} parágrafo(s); uma redação argumentativa pede \
                     introdução, desenvolvimento e conclusão em parágrafos próprios",
                    paragraphs.len()
                ),
                ANALYZER_ID,
            ));
        } else {
            if paragraphs.len() < IDEAL_PARAGRAPHS.0 || paragraphs.len() > IDEAL_PARAGRAPHS.1 {
                issues += 1;
                findings.push(Finding::new(
                    (0, 0),
                    Severity::Info,
                    format!(
                        "{} parágrafos; a estrutura ideal tem de {} a {} \
                         (introdução, 2-3 de desenvolvimento, conclusão)",
                        paragraphs.len(),
                        IDEAL_PARAGRAPHS.0,
                        IDEAL_PARAGRAPHS.1
                    ),
                    ANALYZER_ID,
                ));
            }

            // 引言比例
            let total_words = word_spans(text).len().max(1);
            let (intro_start, intro_end) = paragraphs[0];
            let intro_words = word_spans(&text[intro_start..intro_end]).len();
            if intro_words as f64 / total_words as f64 > INTRO_SHARE_LIMIT {
                issues += 1;
                findings.push(Finding::new(
                    (intro_start, intro_end),
                    Severity::Warning,
                    "introdução desproporcional: ocupa mais de 40% do texto".to_string(),
                    ANALYZER_ID,
                ));
            }

            // 结论段应有结论连接词
            let (last_start, last_end) = paragraphs[paragraphs.len() - 1];
            let conclusion_lowered = text[last_start..last_end].to_lowercase();
            let conclusion_words = CONNECTIVES
                .iter()
                .find(|(cat, _)| *cat == "conclusão")
                .map(|(_, words)| *words)
                .unwrap_or(&[]);
            if !conclusion_words
                .iter()
                .any(|w| contains_connective(&conclusion_lowered, w))
            {
                issues += 1;
                findings.push(Finding::new(
                    (last_start, last_end),
                    Severity::Info,
                    "o parágrafo final não retoma a tese com um conectivo conclusivo \
                     (portanto, dessa forma, ...)"
                        .to_string(),
                    ANALYZER_ID,
                ));
            }
        }

        let sub_score = (1.0 - 0.2 * issues as f64).clamp(0.0, 1.0);

        Ok(AnalyzerOutput {
            sub_score,
            findings,
        })
    }
}
