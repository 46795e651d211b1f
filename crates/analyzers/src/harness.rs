//! 分析器并发执行框架（fan-out/fan-in）
//!
//! 每个任务把全部分析器并发派发，收集所有部分结果后返回。
//! 单个分析器受独立超时约束；任务级预算耗尽时通过取消令牌协作式
//! 取消仍在执行的调用，其半成品输出被丢弃而不是合并。单个分析器
//! 失败或超时只降级该维度，从不让整个任务失败。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use corretor_core::AnalysisConfig;
use corretor_domain::{AnalyzerResult, Essay, RetrievalContext};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::Analyzer;

/// 一次 fan-out 的全部产出
#[derive(Debug)]
pub struct FanOutOutcome {
    pub results: Vec<AnalyzerResult>,
    /// 预算耗尽时为 true，报告会被标记为 Partial
    pub budget_exhausted: bool,
}

pub struct AnalyzerHarness {
    analyzers: Vec<Arc<dyn Analyzer>>,
    per_call_timeout: Duration,
    job_budget: Duration,
}

impl AnalyzerHarness {
    pub fn new(analyzers: Vec<Arc<dyn Analyzer>>, config: &AnalysisConfig) -> Self {
        Self {
            analyzers,
            per_call_timeout: Duration::from_millis(config.analyzer_timeout_ms),
            job_budget: Duration::from_millis(config.job_budget_ms),
        }
    }

    pub fn analyzer_ids(&self) -> Vec<&'static str> {
        self.analyzers.iter().map(|a| a.id()).collect()
    }

    /// 并发执行全部分析器，直到全部返回或预算耗尽
    pub async fn run(&self, essay: &Arc<Essay>, context: &RetrievalContext) -> FanOutOutcome {
        let cancel = CancellationToken::new();
        let mut in_flight = FuturesUnordered::new();

        for analyzer in &self.analyzers {
            let analyzer = Arc::clone(analyzer);
            let essay = Arc::clone(essay);
            let context = context.clone();
            let cancel = cancel.clone();
            let per_call_timeout = self.per_call_timeout;

            in_flight.push(async move {
                let id = analyzer.id();
                match tokio::time::timeout(
                    per_call_timeout,
                    analyzer.analyze(&essay, &context, &cancel),
                )
                .await
                {
                    Ok(Ok(output)) => {
                        debug!("analyzer {} finished, sub_score={:.3}", id, output.sub_score);
                        AnalyzerResult::ok(id, output.sub_score, output.findings)
                    }
                    Ok(Err(e)) => {
                        warn!("analyzer {} errored: {}", id, e);
                        AnalyzerResult::errored(id)
                    }
                    Err(_) => {
                        warn!("analyzer {} timed out after {:?}", id, per_call_timeout);
                        AnalyzerResult::timed_out(id)
                    }
                }
            });
        }

        let deadline = tokio::time::Instant::now() + self.job_budget;
        let mut results = Vec::with_capacity(self.analyzers.len());
        let mut budget_exhausted = false;

        loop {
            tokio::select! {
                next = in_flight.next() => match next {
                    Some(result) => results.push(result),
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(
                        "analysis budget of {:?} exhausted with {}/{} analyzers done",
                        self.job_budget,
                        results.len(),
                        self.analyzers.len()
                    );
                    budget_exhausted = true;
                    cancel.cancel();
                    break;
                }
            }
        }

        if budget_exhausted {
            // 未完成的分析器按超时记录，半成品输出不合并
            let finished: HashSet<String> =
                results.iter().map(|r| r.analyzer_id.clone()).collect();
            for analyzer in &self.analyzers {
                if !finished.contains(analyzer.id()) {
                    results.push(AnalyzerResult::timed_out(analyzer.id()));
                }
            }
        }

        FanOutOutcome {
            results,
            budget_exhausted,
        }
    }
}
