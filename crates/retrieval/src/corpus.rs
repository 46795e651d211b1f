use std::path::Path;

use corretor_core::{CorretorError, CorretorResult};
use corretor_domain::ReferencePassage;
use serde::Deserialize;
use tracing::warn;

/// 语料目录里单个 JSON 文件的结构（与既有参考作文文件格式一致）
#[derive(Debug, Deserialize)]
struct PassageFile {
    #[serde(default)]
    titulo: Option<String>,
    texto_original: String,
}

/// 从目录加载参考语料：每个 `*.json` 文件一个段落
///
/// 文件按名称排序读取，保证语料顺序（以及索引的并列打破顺序）
/// 与目录遍历顺序无关。损坏的文件跳过并告警，不中断加载。
pub fn load_corpus_dir(dir: &Path) -> CorretorResult<Vec<ReferencePassage>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| CorretorError::IndexUnavailable(format!("read corpus dir failed: {e}")))?;

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut passages = Vec::with_capacity(paths.len());
    for path in paths {
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("skipping unreadable corpus file {}: {}", path.display(), e);
                continue;
            }
        };
        match serde_json::from_str::<PassageFile>(&contents) {
            Ok(parsed) => {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                passages.push(ReferencePassage {
                    id: stem.clone(),
                    title: parsed.titulo.unwrap_or(stem),
                    text: parsed.texto_original,
                });
            }
            Err(e) => {
                warn!("skipping malformed corpus file {}: {}", path.display(), e);
            }
        }
    }
    Ok(passages)
}

/// 内置的小型示例语料，未配置语料目录时使用
pub fn builtin_corpus() -> Vec<ReferencePassage> {
    let seed: [(&str, &str, &str); 4] = [
        (
            "exemplar-desigualdade",
            "Desigualdade social no Brasil",
            "A desigualdade social no Brasil é um problema histórico que persiste \
             apesar dos avanços econômicos. Portanto, cabe ao poder público promover \
             políticas de distribuição de renda e acesso à educação de qualidade.",
        ),
        (
            "exemplar-educacao",
            "Educação como transformação",
            "A educação transforma a sociedade porque forma cidadãos críticos. \
             Além disso, escolas bem estruturadas reduzem a evasão e ampliam as \
             oportunidades de trabalho para os jovens.",
        ),
        (
            "exemplar-meio-ambiente",
            "Preservação do meio ambiente",
            "A preservação do meio ambiente exige ação coletiva. Entretanto, o \
             desmatamento avança quando a fiscalização é insuficiente, de modo que \
             o equilíbrio climático fica ameaçado.",
        ),
        (
            "exemplar-tecnologia",
            "Tecnologia e convivência",
            "A tecnologia aproxima pessoas distantes, mas o uso excessivo das redes \
             prejudica a convivência. Dessa forma, é preciso equilibrar o tempo de \
             tela com atividades presenciais.",
        ),
    ];
    seed.into_iter()
        .map(|(id, title, text)| ReferencePassage {
            id: id.to_string(),
            title: title.to_string(),
            text: text.to_string(),
        })
        .collect()
}
