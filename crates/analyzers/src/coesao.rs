//! 衔接与连贯维度
//!
//! 检测过度重复（重复的实词、重复的二元词组）和段落间过渡质量
//! （第二段起的段落是否以连接词衔接）。

use std::collections::HashMap;

use async_trait::async_trait;
use corretor_core::{CorretorError, CorretorResult};
use corretor_domain::{Essay, Finding, RetrievalContext, Severity};
use corretor_retrieval::tokenize::is_stopword;
use tokio_util::sync::CancellationToken;

use crate::rules::connective_categories;
use crate::text::{paragraph_spans, word_spans};
use crate::{Analyzer, AnalyzerOutput};

pub struct CohesionAnalyzer;

impl CohesionAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CohesionAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

pub const ANALYZER_ID: &str = "coesao";

/// 实词出现这么多次视为重复过度
const WORD_REPEAT_LIMIT: usize = 4;

#[async_trait]
impl Analyzer for CohesionAnalyzer {
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
            return Err(CorretorError::Timeout("cohesion analysis cancelled".into()));
        }

        let text = &essay.text;
        // (起始偏移, 结束偏移, 小写形式)
        let words: Vec<(usize, usize, String)> = word_spans(text)
            .into_iter()
            .map(|(start, w)| (start, start + w.len(), w.to_lowercase()))
            .collect();
        let mut findings = Vec::new();
        let mut repetition_count = 0u32;

        // 重复的二元词组（第二个词是实词时才算，如 "o gato"）
        let mut bigram_hits: HashMap<(&str, &str), Vec<(usize, usize)>> = HashMap::new();
        for pair in words.windows(2) {
            let (first_start, _, first) = &pair[0];
            let (_, second_end, second) = &pair[1];
            if is_stopword(second) || second.chars().count() < 3 {
                continue;
            }
            bigram_hits
                .entry((first.as_str(), second.as_str()))
                .or_default()
                .push((*first_start, *second_end));
        }
        let mut repeated_bigrams: Vec<_> = bigram_hits
            .into_iter()
            .filter(|(_, spans)| spans.len() >= 2)
            .collect();
        repeated_bigrams.sort_by_key(|((first, second), _)| (*first, *second));
        for ((first, second), spans) in repeated_bigrams {
            repetition_count += 1;
            findings.push(Finding::new(
                spans[1], // 定位到第二次出现
                Severity::Info,
                format!(
                    "repetição de \"{first} {second}\" ({} ocorrências); \
                     considere variar com sinônimos ou pronomes",
                    spans.len()
                ),
                ANALYZER_ID,
            ));
        }

        if cancel.is_cancelled() {
            return Err(CorretorError::Timeout("cohesion analysis cancelled".into()));
        }

        // 重复过度的实词
        let mut word_hits: HashMap<&str, Vec<(usize, usize)>> = HashMap::new();
        for (start, end, word) in &words {
            if !is_stopword(word) && word.chars().count() >= 4 {
                word_hits.entry(word.as_str()).or_default().push((*start, *end));
            }
        }
        let mut overused: Vec<_> = word_hits
            .into_iter()
            .filter(|(_, spans)| spans.len() >= WORD_REPEAT_LIMIT)
            .collect();
        overused.sort_by_key(|(word, _)| *word);
        for (word, spans) in overused {
            repetition_count += 1;
            findings.push(Finding::new(
                spans[WORD_REPEAT_LIMIT - 1],
                Severity::Info,
                format!(
                    "a palavra \"{word}\" aparece {} vezes; a repetição excessiva \
                     enfraquece a coesão",
                    spans.len()
                ),
                ANALYZER_ID,
            ));
        }

        // 段落过渡：第二段起没有任何连接词的段落
        let paragraphs = paragraph_spans(text);
        let mut missing_transitions = 0u32;
        for (start, end) in paragraphs.iter().skip(1) {
            let paragraph_lowered = text[*start..*end].to_lowercase();
            if connective_categories(&paragraph_lowered).is_empty() {
                missing_transitions += 1;
                findings.push(Finding::new(
                    (*start, *end),
                    Severity::Info,
                    "parágrafo sem conectivo de transição com o anterior".to_string(),
                    ANALYZER_ID,
                ));
            }
        }

        let sub_score = (1.0
            - 0.15 * repetition_count as f64
            - 0.1 * missing_transitions as f64)
            .clamp(0.0, 1.0);

        Ok(AnalyzerOutput {
            sub_score,
            findings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn essay(text: &str) -> Essay {
        Essay::new(text.to_string(), "pt".to_string())
    }

    async fn run(text: &str) -> AnalyzerOutput {
        CohesionAnalyzer::new()
            .analyze(
                &essay(text),
                &RetrievalContext::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_repeated_bigram_flagged_as_info() {
        let text = "O gato correu rapido e o gato pulou.";
        let output = run(text).await;
        let finding = output
            .findings
            .iter()
            .find(|f| f.message.contains("o gato"))
            .expect("deveria apontar a repetição de 'o gato'");
        assert_eq!(finding.severity, Severity::Info);
        // 区间指向第二次出现
        assert_eq!(&text[finding.span.0..finding.span.1], "o gato");
    }

    #[tokio::test]
    async fn test_varied_text_scores_high() {
        let output = run(
            "O felino correu depressa. Entretanto, o animal logo se cansou.",
        )
        .await;
        assert!(output.sub_score >= 0.9);
        assert!(output.findings.is_empty());
    }

    #[tokio::test]
    async fn test_overused_word_flagged() {
        let output = run(
            "A escola cresceu. A escola mudou. A escola venceu. A escola ficou.",
        )
        .await;
        assert!(output
            .findings
            .iter()
            .any(|f| f.message.contains("escola")));
        assert!(output.sub_score < 1.0);
    }

    #[tokio::test]
    async fn test_paragraph_without_transition() {
        let text = "A primeira ideia abre o texto.\nA segunda ideia chega solta aqui.";
        let output = run(text).await;
        assert!(output
            .findings
            .iter()
            .any(|f| f.message.contains("transição")));
    }
}
