use std::collections::HashMap;
use std::sync::Arc;

use corretor_domain::{ReferencePassage, RetrievalContext, ScoredPassage};
use tracing::info;

use crate::tokenize::tokenize;

/// 基于 TF-IDF 的参考语料相似度索引
///
/// 语料固定时构建一次，查询面是纯函数：同一文本对同一索引版本
/// 重复查询必须返回完全相同的排序和分数（重试时上下文可重算）。
///
/// idf 采用平滑方案 ln((1+N)/(1+df)) + 1，段落向量 L2 归一化，
/// 查询向量只在查询时按语料 idf 加权，不回写语料权重。
pub struct TfIdfIndex {
    version: u64,
    passages: Vec<Arc<ReferencePassage>>,
    /// 词条 -> 词条编号
    vocabulary: HashMap<String, usize>,
    /// 词条编号 -> idf
    idf: Vec<f64>,
    /// 每个段落的归一化 tf-idf 向量（词条编号 -> 权重）
    vectors: Vec<HashMap<usize, f64>>,
}

impl TfIdfIndex {
    pub fn build(passages: Vec<ReferencePassage>, version: u64) -> Self {
        let passages: Vec<Arc<ReferencePassage>> = passages.into_iter().map(Arc::new).collect();
        let tokenized: Vec<Vec<String>> =
            passages.iter().map(|p| tokenize(&p.text)).collect();

        // 词表与文档频率
        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut df: Vec<usize> = Vec::new();
        for tokens in &tokenized {
            let mut seen: Vec<usize> = Vec::new();
            for token in tokens {
                let next_id = vocabulary.len();
                let term_id = *vocabulary.entry(token.clone()).or_insert(next_id);
                if term_id == df.len() {
                    df.push(0);
                }
                if !seen.contains(&term_id) {
                    df[term_id] += 1;
                    seen.push(term_id);
                }
            }
        }

        let doc_count = passages.len() as f64;
        let idf: Vec<f64> = df
            .iter()
            .map(|&d| ((1.0 + doc_count) / (1.0 + d as f64)).ln() + 1.0)
            .collect();

        let vectors: Vec<HashMap<usize, f64>> = tokenized
            .iter()
            .map(|tokens| Self::weigh(tokens, &vocabulary, &idf, false))
            .collect();

        info!(
            "TF-IDF index built: version={}, passages={}, vocabulary={}",
            version,
            passages.len(),
            vocabulary.len()
        );

        Self {
            version,
            passages,
            vocabulary,
            idf,
            vectors,
        }
    }

    /// 对一段文本计算归一化 tf-idf 向量；`query` 模式下跳过词表外词条
    fn weigh(
        tokens: &[String],
        vocabulary: &HashMap<String, usize>,
        idf: &[f64],
        query: bool,
    ) -> HashMap<usize, f64> {
        let mut tf: HashMap<usize, f64> = HashMap::new();
        for token in tokens {
            match vocabulary.get(token) {
                Some(&term_id) => *tf.entry(term_id).or_insert(0.0) += 1.0,
                None if query => {}
                None => unreachable!("corpus token missing from vocabulary"),
            }
        }
        for (term_id, weight) in tf.iter_mut() {
            *weight *= idf[*term_id];
        }
        let norm = tf.values().map(|w| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for weight in tf.values_mut() {
                *weight /= norm;
            }
        }
        tf
    }

    /// 检索与作文最相似的 top-k 段落
    ///
    /// 并列打破规则：先短段落（信息更密集），再按语料顺序，
    /// 保证排序稳定、可重现。
    pub fn query(&self, essay_text: &str, top_k: usize) -> RetrievalContext {
        let tokens = tokenize(essay_text);
        let query_vec = Self::weigh(&tokens, &self.vocabulary, &self.idf, true);

        let mut scored: Vec<(usize, f64)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, vector)| {
                let score = query_vec
                    .iter()
                    .filter_map(|(term_id, qw)| vector.get(term_id).map(|dw| qw * dw))
                    .sum::<f64>();
                (idx, score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|(a_idx, a_score), (b_idx, b_score)| {
            b_score
                .partial_cmp(a_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    self.passages[*a_idx]
                        .text
                        .len()
                        .cmp(&self.passages[*b_idx].text.len())
                })
                .then_with(|| a_idx.cmp(b_idx))
        });
        scored.truncate(top_k);

        RetrievalContext {
            corpus_version: self.version,
            passages: scored
                .into_iter()
                .map(|(idx, score)| ScoredPassage {
                    passage: Arc::clone(&self.passages[idx]),
                    score,
                })
                .collect(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(id: &str, text: &str) -> ReferencePassage {
        ReferencePassage {
            id: id.to_string(),
            title: id.to_string(),
            text: text.to_string(),
        }
    }

    fn sample_index() -> TfIdfIndex {
        TfIdfIndex::build(
            vec![
                passage("p1", "O gato subiu no telhado e o gato desceu."),
                passage("p2", "A economia brasileira cresceu neste trimestre."),
                passage("p3", "Gatos e cachorros convivem bem quando socializados."),
                passage("p4", "O telhado da casa precisa de reforma urgente."),
            ],
            1,
        )
    }

    #[test]
    fn test_most_similar_passage_ranks_first() {
        let index = sample_index();
        let ctx = index.query("o gato correu pelo telhado", 2);
        assert!(!ctx.is_empty());
        assert_eq!(ctx.passages[0].passage.id, "p1");
    }

    #[test]
    fn test_query_is_deterministic() {
        let index = sample_index();
        let a = index.query("o gato correu pelo telhado", 4);
        let b = index.query("o gato correu pelo telhado", 4);
        let ids_a: Vec<&str> = a.passages.iter().map(|s| s.passage.id.as_str()).collect();
        let ids_b: Vec<&str> = b.passages.iter().map(|s| s.passage.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
        for (x, y) in a.passages.iter().zip(b.passages.iter()) {
            assert_eq!(x.score.to_bits(), y.score.to_bits());
        }
    }

    #[test]
    fn test_unrelated_query_returns_empty() {
        let index = sample_index();
        let ctx = index.query("xylophone quartz zebra", 5);
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_equal_scores_prefer_shorter_passage() {
        let index = TfIdfIndex::build(
            vec![
                // 停用词被过滤后两个段落的词条集相同，余弦分数相等
                passage("longo", "O inverno foi muito rigoroso para eles."),
                passage("curto", "inverno rigoroso"),
            ],
            1,
        );
        let ctx = index.query("inverno rigoroso", 2);
        assert_eq!(ctx.passages[0].passage.id, "curto");
        assert_eq!(ctx.passages[1].passage.id, "longo");
    }

    #[test]
    fn test_top_k_truncates() {
        let index = sample_index();
        let ctx = index.query("gato telhado casa economia", 2);
        assert!(ctx.passages.len() <= 2);
    }

    #[test]
    fn test_scores_are_descending() {
        let index = sample_index();
        let ctx = index.query("o gato subiu no telhado", 4);
        for pair in ctx.passages.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}
