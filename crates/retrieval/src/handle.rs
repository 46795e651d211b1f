use std::sync::{Arc, RwLock};

use corretor_core::{CorretorError, CorretorResult};
use corretor_domain::{ReferencePassage, RetrievalContext};
use tracing::info;

use crate::index::TfIdfIndex;

/// 进程级索引句柄，带显式的构建/切换生命周期
///
/// 新版本在锁外构建，指针原子切换；进行中的查询继续持有旧版本的
/// `Arc` 直到结束，旧索引在最后一个引用释放后回收。索引本身从不
/// 原地修改。
pub struct IndexHandle {
    current: RwLock<Arc<TfIdfIndex>>,
}

impl IndexHandle {
    pub fn new(index: TfIdfIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// 取当前索引的引用；调用方持有期间不受后续切换影响
    pub fn current(&self) -> CorretorResult<Arc<TfIdfIndex>> {
        self.current
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| CorretorError::IndexUnavailable("index lock poisoned".to_string()))
    }

    /// 用新语料重建索引并原子切换
    pub fn rebuild(&self, passages: Vec<ReferencePassage>, version: u64) -> CorretorResult<()> {
        // 构建在锁外完成，只有指针交换持写锁
        let rebuilt = Arc::new(TfIdfIndex::build(passages, version));
        let mut guard = self
            .current
            .write()
            .map_err(|_| CorretorError::IndexUnavailable("index lock poisoned".to_string()))?;
        let old_version = guard.version();
        *guard = rebuilt;
        info!(
            "retrieval index swapped: {} -> {}",
            old_version,
            guard.version()
        );
        Ok(())
    }

    pub fn query(&self, essay_text: &str, top_k: usize) -> CorretorResult<RetrievalContext> {
        Ok(self.current()?.query(essay_text, top_k))
    }

    pub fn version(&self) -> CorretorResult<u64> {
        Ok(self.current()?.version())
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

    #[test]
    fn test_swap_replaces_version() {
        let handle = IndexHandle::new(TfIdfIndex::build(
            vec![passage("p1", "o gato subiu no telhado")],
            1,
        ));
        assert_eq!(handle.version().unwrap(), 1);

        handle
            .rebuild(vec![passage("p2", "a economia cresceu")], 2)
            .unwrap();
        assert_eq!(handle.version().unwrap(), 2);

        let ctx = handle.query("economia", 5).unwrap();
        assert_eq!(ctx.corpus_version, 2);
        assert_eq!(ctx.passages[0].passage.id, "p2");
    }

    #[test]
    fn test_inflight_reference_survives_swap() {
        let handle = IndexHandle::new(TfIdfIndex::build(
            vec![passage("p1", "o gato subiu no telhado")],
            1,
        ));
        let held = handle.current().unwrap();
        handle
            .rebuild(vec![passage("p2", "a economia cresceu")], 2)
            .unwrap();
        // 已获取的引用仍指向旧版本
        assert_eq!(held.version(), 1);
        assert_eq!(handle.version().unwrap(), 2);
    }
}
