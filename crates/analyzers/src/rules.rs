//! 语言规则知识库
//!
//! 连接词分类、常见语法问题模式与缺失重音词表。规则面向目标语言
//! （巴西葡萄牙语的议论文体），全部为静态数据，分析器共享只读。

use once_cell::sync::Lazy;
use regex::Regex;

/// 连接词分类表：(类别, 连接词列表)
pub static CONNECTIVES: &[(&str, &[&str])] = &[
    (
        "adição",
        &["além disso", "ademais", "outrossim", "também", "bem como"],
    ),
    (
        "conclusão",
        &["portanto", "logo", "assim", "dessa forma", "por conseguinte"],
    ),
    (
        "contraste",
        &["entretanto", "contudo", "todavia", "no entanto", "porém", "mas"],
    ),
    (
        "causa",
        &["porque", "visto que", "já que", "uma vez que", "pois"],
    ),
    (
        "consequência",
        &["de modo que", "de forma que", "tanto que", "por isso"],
    ),
    (
        "condição",
        &["caso", "desde que", "contanto que", "a menos que"],
    ),
    (
        "finalidade",
        &["para que", "a fim de que", "com o intuito de", "com o propósito de"],
    ),
    (
        "tempo",
        &["quando", "enquanto", "assim que", "logo que", "antes que", "depois que"],
    ),
    (
        "explicação",
        &["isto é", "ou seja", "em outras palavras", "a saber"],
    ),
];

/// 一条基于正则的语法问题规则
pub struct GrammarRule {
    pub pattern: Regex,
    pub suggestion: &'static str,
    pub explanation: &'static str,
}

/// 常见语法问题：性数一致、动词支配、crase
pub static GRAMMAR_RULES: Lazy<Vec<GrammarRule>> = Lazy::new(|| {
    vec![
        GrammarRule {
            pattern: Regex::new(r"(?i)\bos ([a-zà-ú]+ção)\b").unwrap(),
            suggestion: "as",
            explanation: "substantivos terminados em -ção são femininos",
        },
        GrammarRule {
            pattern: Regex::new(r"(?i)\bas ([a-zà-ú]+mento)\b").unwrap(),
            suggestion: "os",
            explanation: "substantivos terminados em -mento são masculinos",
        },
        GrammarRule {
            pattern: Regex::new(r"(?i)\bassistir (o|os) ").unwrap(),
            suggestion: "assistir a",
            explanation: "o verbo assistir no sentido de ver requer a preposição 'a'",
        },
        GrammarRule {
            pattern: Regex::new(r"(?i)\bvisar (o|os) ").unwrap(),
            suggestion: "visar a",
            explanation: "o verbo visar no sentido de almejar requer a preposição 'a'",
        },
        GrammarRule {
            pattern: Regex::new(r"(?i)\ba (a|as) ").unwrap(),
            suggestion: "à",
            explanation: "fusão da preposição 'a' com o artigo feminino forma crase",
        },
    ]
});

/// 缺失重音词表：未加重音的拼写 -> 正确拼写
///
/// 只收录无重音形式不构成其他常用词的情况（"esta"/"está" 这类
/// 歧义对不在表内）。
pub static ACCENT_LEXICON: &[(&str, &str)] = &[
    ("rapido", "rápido"),
    ("historico", "histórico"),
    ("publico", "público"),
    ("pratico", "prático"),
    ("ultimo", "último"),
    ("proximo", "próximo"),
    ("musica", "música"),
    ("facil", "fácil"),
    ("dificil", "difícil"),
    ("voce", "você"),
    ("nao", "não"),
    ("tambem", "também"),
    ("porem", "porém"),
    ("atraves", "através"),
    ("alem", "além"),
];

/// 查找一个小写词是否属于缺失重音词表
pub fn accent_correction(word: &str) -> Option<&'static str> {
    ACCENT_LEXICON
        .iter()
        .find(|(plain, _)| *plain == word)
        .map(|(_, fixed)| *fixed)
}

/// 文本中（小写折叠后）出现的连接词类别集合
pub fn connective_categories(lowered_text: &str) -> Vec<&'static str> {
    CONNECTIVES
        .iter()
        .filter(|(_, words)| {
            words
                .iter()
                .any(|w| contains_connective(lowered_text, w))
        })
        .map(|(category, _)| *category)
        .collect()
}

/// 词边界敏感的连接词查找（连接词可含空格）
pub fn contains_connective(lowered_text: &str, connective: &str) -> bool {
    find_connective(lowered_text, connective).is_some()
}

/// 返回第一次出现的字节区间
pub fn find_connective(lowered_text: &str, connective: &str) -> Option<(usize, usize)> {
    let mut search_from = 0;
    while let Some(rel) = lowered_text[search_from..].find(connective) {
        let start = search_from + rel;
        let end = start + connective.len();
        let before_ok = lowered_text[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphabetic());
        let after_ok = lowered_text[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphabetic());
        if before_ok && after_ok {
            return Some((start, end));
        }
        search_from = end;
    }
    None
}
