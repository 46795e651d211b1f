//! 作文文本的切分与度量辅助
//!
//! 所有区间都是原始文本中的字节偏移，供发现项定位使用。

use corretor_domain::TextMetrics;
use unicode_segmentation::UnicodeSegmentation;

/// 段落切分：按换行分段，返回每个非空段落的字节区间
pub fn paragraph_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut offset = 0;
    for line in text.split('\n') {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            let leading = line.len() - line.trim_start().len();
            let start = offset + leading;
            spans.push((start, start + trimmed.len()));
        }
        offset += line.len() + 1;
    }
    spans
}

/// 句子数：按句末标点统计
pub fn sentence_count(text: &str) -> usize {
    text.split(['.', '!', '?'])
        .filter(|part| part.chars().any(|c| c.is_alphanumeric()))
        .count()
}

/// 词及其字节区间
pub fn word_spans(text: &str) -> Vec<(usize, &str)> {
    text.unicode_word_indices().collect()
}

/// 基础文本度量
pub fn metrics(text: &str) -> TextMetrics {
    let words = word_spans(text);
    let word_count = words.len();
    let sentence_count = sentence_count(text);
    let paragraph_count = paragraph_spans(text).len();
    let total_word_chars: usize = words.iter().map(|(_, w)| w.chars().count()).sum();

    TextMetrics {
        word_count,
        sentence_count,
        paragraph_count,
        avg_sentence_len: if sentence_count > 0 {
            word_count as f64 / sentence_count as f64
        } else {
            0.0
        },
        avg_word_len: if word_count > 0 {
            total_word_chars as f64 / word_count as f64
        } else {
            0.0
        },
    }
}
