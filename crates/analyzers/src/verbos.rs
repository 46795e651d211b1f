//! 动词与连接词使用维度
//!
//! 统计连接词类别的多样性，标记 "e" 的链式滥用，并对照检索到的
//! 参考段落指出作文缺少而范文常用的连接类别。

use std::collections::BTreeSet;

use async_trait::async_trait;
use corretor_core::{CorretorError, CorretorResult};
use corretor_domain::{Essay, Finding, RetrievalContext, Severity};
use tokio_util::sync::CancellationToken;

use crate::rules::{connective_categories, CONNECTIVES};
use crate::text::{sentence_count, word_spans};
use crate::{Analyzer, AnalyzerOutput};

pub struct VerbConjunctionAnalyzer;

impl VerbConjunctionAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for VerbConjunctionAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

pub const ANALYZER_ID: &str = "verbos";

/// 每句话平均超过这么多个 "e" 视为链式滥用
const E_PER_SENTENCE_LIMIT: f64 = 1.5;

#[async_trait]
impl Analyzer for VerbConjunctionAnalyzer {
    fn id(&self) -> &'static str {
        ANALYZER_ID
    }

    async fn analyze(
        &self,
        essay: &Essay,
        context: &RetrievalContext,
        cancel: &CancellationToken,
    ) -> CorretorResult<AnalyzerOutput> {
        if cancel.is_cancelled() {
            return Err(CorretorError::Timeout("verb analysis cancelled".into()));
        }

        let text = &essay.text;
        let lowered = text.to_lowercase();
        let mut findings = Vec::new();

        let used: BTreeSet<&str> = connective_categories(&lowered).into_iter().collect();

        // "e" 链式滥用：平均每句超过阈值
        let e_occurrences: Vec<(usize, &str)> = word_spans(text)
            .into_iter()
            .filter(|(_, w)| w.eq_ignore_ascii_case("e"))
            .collect();
        let sentences = sentence_count(text).max(1);
        if e_occurrences.len() >= 3
            && e_occurrences.len() as f64 / sentences as f64 > E_PER_SENTENCE_LIMIT
        {
            let (start, word) = e_occurrences[e_occurrences.len() - 1];
            findings.push(Finding::new(
                (start, start + word.len()),
                Severity::Warning,
                format!(
                    "uso excessivo da conjunção \"e\" ({} ocorrências em {} frases); \
                     varie os conectivos",
                    e_occurrences.len(),
                    sentences
                ),
                ANALYZER_ID,
            ));
        }

        if cancel.is_cancelled() {
            return Err(CorretorError::Timeout("verb analysis cancelled".into()));
        }

        // 参考段落常用、但作文未用的连接类别（最多提示两个）
        let mut reference_categories: BTreeSet<&str> = BTreeSet::new();
        for scored in &context.passages {
            let passage_lowered = scored.passage.text.to_lowercase();
            reference_categories.extend(connective_categories(&passage_lowered));
        }
        for category in reference_categories.difference(&used).take(2) {
            findings.push(Finding::new(
                (0, 0),
                Severity::Info,
                format!(
                    "os textos de referência usam conectivos de {category}; \
                     considere empregá-los"
                ),
                ANALYZER_ID,
            ));
        }

        let variety = used.len() as f64 / CONNECTIVES.len() as f64;
        let overuse_penalty = if findings
            .iter()
            .any(|f| f.severity == Severity::Warning)
        {
            0.15
        } else {
            0.0
        };
        let sub_score = (0.35 + 0.65 * variety - overuse_penalty).clamp(0.0, 1.0);

        Ok(AnalyzerOutput {
            sub_score,
            findings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use corretor_domain::{ReferencePassage, ScoredPassage};

    fn essay(text: &str) -> Essay {
        Essay::new(text.to_string(), "pt".to_string())
    }

    fn context_with(text: &str) -> RetrievalContext {
        RetrievalContext {
            corpus_version: 1,
            passages: vec![ScoredPassage {
                passage: Arc::new(ReferencePassage {
                    id: "p1".into(),
                    title: "t".into(),
                    text: text.into(),
                }),
                score: 0.9,
            }],
        }
    }

    async fn run(text: &str, ctx: &RetrievalContext) -> AnalyzerOutput {
        VerbConjunctionAnalyzer::new()
            .analyze(&essay(text), ctx, &CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_e_chain_overuse_flagged() {
        let text = "O menino correu e pulou e gritou e caiu e levantou.";
        let output = run(text, &RetrievalContext::default()).await;
        assert!(output
            .findings
            .iter()
            .any(|f| f.severity == Severity::Warning && f.message.contains("conjunção")));
    }

    #[tokio::test]
    async fn test_moderate_e_usage_not_flagged() {
        let text = "O menino correu e pulou. Depois ele foi embora.";
        let output = run(text, &RetrievalContext::default()).await;
        assert!(!output.findings.iter().any(|f| f.severity == Severity::Warning));
    }

    #[tokio::test]
    async fn test_reference_categories_suggested() {
        let ctx = context_with("Portanto, é preciso agir. Entretanto, faltam recursos.");
        let output = run("O menino correu para casa.", &ctx).await;
        let suggestions: Vec<&Finding> = output
            .findings
            .iter()
            .filter(|f| f.severity == Severity::Info)
            .collect();
        assert!(!suggestions.is_empty());
        assert!(suggestions.len() <= 2);
    }

    #[tokio::test]
    async fn test_variety_raises_score() {
        let poor = run("O menino correu para casa.", &RetrievalContext::default()).await;
        let rich = run(
            "Portanto, é preciso agir porque o tempo urge. Entretanto, além disso, \
             quando possível, ou seja, devemos planejar.",
            &RetrievalContext::default(),
        )
        .await;
        assert!(rich.sub_score > poor.sub_score);
    }
}
