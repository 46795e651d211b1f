//! 句法/语法检查维度
//!
//! 基于规则知识库：性数一致、动词支配、crase 的正则模式，
//! 外加缺失重音词表。发现密度越高维度分数越低。

use async_trait::async_trait;
use corretor_core::{CorretorError, CorretorResult};
use corretor_domain::{Essay, Finding, RetrievalContext, Severity};
use tokio_util::sync::CancellationToken;

use crate::rules::{accent_correction, GRAMMAR_RULES};
use crate::text::word_spans;
use crate::{Analyzer, AnalyzerOutput};

pub struct SyntaxAnalyzer;

impl SyntaxAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SyntaxAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

pub const ANALYZER_ID: &str = "sintaxe";

#[async_trait]
impl Analyzer for SyntaxAnalyzer {
    fn id(&self) -> &'static str {
        ANALYZER_ID
    }

    async fn analyze(
        &self,
        essay: &Essay,
        _context: &RetrievalContext,
        cancel: &CancellationToken,
    ) -> CorretorResult<AnalyzerOutput> {
        let text = &essay.text;
        let mut findings = Vec::new();

        for rule in GRAMMAR_RULES.iter() {
            if cancel.is_cancelled() {
                return Err(CorretorError::Timeout("syntax analysis cancelled".into()));
            }
            for m in rule.pattern.find_iter(text) {
                findings.push(Finding::new(
                    (m.start(), m.end()),
                    Severity::Warning,
                    format!(
                        "possível problema gramatical em \"{}\": use \"{}\" ({})",
                        m.as_str().trim(),
                        rule.suggestion,
                        rule.explanation
                    ),
                    ANALYZER_ID,
                ));
            }
        }

        let words = word_spans(text);
        for (start, word) in &words {
            let lowered = word.to_lowercase();
            if let Some(fixed) = accent_correction(&lowered) {
                findings.push(Finding::new(
                    (*start, *start + word.len()),
                    Severity::Warning,
                    format!("possível falta de acento: \"{word}\" -> \"{fixed}\""),
                    ANALYZER_ID,
                ));
            }
        }

        let word_count = words.len().max(1);
        let penalty = findings.len() as f64 / word_count as f64;
        let sub_score = (1.0 - 4.0 * penalty).clamp(0.0, 1.0);

        Ok(AnalyzerOutput {
            sub_score,
            findings,
        })
    }
}
