use std::collections::HashSet;

use once_cell::sync::Lazy;
use unicode_segmentation::UnicodeSegmentation;

/// 葡萄牙语停用词表（NLTK 葡萄牙语列表的常用子集）
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "de", "a", "o", "que", "e", "do", "da", "em", "um", "para", "é", "com", "não", "uma",
        "os", "no", "se", "na", "por", "mais", "as", "dos", "como", "mas", "foi", "ao", "ele",
        "das", "tem", "à", "seu", "sua", "ou", "ser", "quando", "muito", "há", "nos", "já",
        "está", "eu", "também", "só", "pelo", "pela", "até", "isso", "ela", "entre", "era",
        "depois", "sem", "mesmo", "aos", "ter", "seus", "quem", "nas", "me", "esse", "eles",
        "estão", "você", "tinha", "foram", "essa", "num", "nem", "suas", "meu", "às", "minha",
        "têm", "numa", "pelos", "elas", "havia", "seja", "qual", "será", "nós", "tenho", "lhe",
        "deles", "essas", "esses", "pelas", "este", "fosse", "dele",
    ]
    .into_iter()
    .collect()
});

/// 小写词是否为停用词
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(word)
}

/// 文本分词：小写折叠 + Unicode 词边界切分 + 停用词过滤
///
/// 不做去重音处理——重音对目标语言有语义，必须保留。
/// 单字符词条被丢弃（与原向量化方案一致）。
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    lowered
        .unicode_words()
        .filter(|word| word.chars().count() >= 2)
        .filter(|word| !STOPWORDS.contains(word))
        .map(str::to_string)
        .collect()
}
