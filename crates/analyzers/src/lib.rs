//! 作文分析器集合与并发执行框架
//!
//! 每个分析器实现同一个能力接口，彼此独立：不读取其他分析器的输出，
//! 因此可以完全并行。新的检查维度通过实现 [`Analyzer`] 加入，
//! 合并阶段无需改动。

pub mod coesao;
pub mod estrutura;
pub mod harness;
pub mod rules;
pub mod sintaxe;
pub mod text;
pub mod verbos;

use std::sync::Arc;

use async_trait::async_trait;
use corretor_core::CorretorResult;
use corretor_domain::{Essay, Finding, RetrievalContext};
use tokio_util::sync::CancellationToken;

/// 分析器的原始产出，由执行框架包装为带状态的 `AnalyzerResult`
#[derive(Debug, Clone)]
pub struct AnalyzerOutput {
    /// 维度分数，[0, 1]
    pub sub_score: f64,
    pub findings: Vec<Finding>,
}

/// 单一能力接口：分析作文文本与检索上下文，产出维度分数和发现项
///
/// 实现必须是 (文本, 配置) 的纯函数，重试时重新执行得到相同输出。
/// 取消是协作式的：实现应在阶段间检查 `cancel`，被取消时尽快返回。
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn id(&self) -> &'static str;

    async fn analyze(
        &self,
        essay: &Essay,
        context: &RetrievalContext,
        cancel: &CancellationToken,
    ) -> CorretorResult<AnalyzerOutput>;
}

/// 默认的四个检查维度
pub fn default_analyzers() -> Vec<Arc<dyn Analyzer>> {
    vec![
        Arc::new(sintaxe::SyntaxAnalyzer::new()),
        Arc::new(verbos::VerbConjunctionAnalyzer::new()),
        Arc::new(estrutura::StructureAnalyzer::new()),
        Arc::new(coesao::CohesionAnalyzer::new()),
    ]
}

pub use harness::{AnalyzerHarness, FanOutOutcome};
