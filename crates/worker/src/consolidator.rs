//! 结果合并
//!
//! 把一次尝试收集到的全部分析器部分结果确定性地合并为一份报告：
//! 1. 总分 = 可用维度分数的加权平均，权重只在产出分数的维度上
//!    重新归一化（缺失维度被排除，不按零分计）。
//! 2. 发现项跨分析器汇总后去重：跨度重叠超过阈值且严重级别相同的
//!    视为重复，保留严重级别更高的一条（同级时取 analyzer_id 字典序
//!    靠前者）。
//! 3. 剩余发现项按跨度起点升序排序，同起点按严重级别降序，再按
//!    analyzer_id 升序。
//! 4. 成功分析器数不足下限或预算耗尽时报告标记为 Partial。
//!
//! 合并是 (结果集, 配置) 的纯函数，重复执行产出相同报告。

use std::collections::BTreeMap;

use chrono::Utc;
use corretor_core::AnalysisConfig;
use corretor_domain::{
    AnalyzerResult, Completeness, CorrectionReport, Finding, TextMetrics,
};
use uuid::Uuid;

pub struct Consolidator {
    config: AnalysisConfig,
}

impl Consolidator {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn consolidate(
        &self,
        job_id: Uuid,
        results: &[AnalyzerResult],
        metrics: TextMetrics,
        budget_exhausted: bool,
    ) -> CorrectionReport {
        let mut dimension_scores = BTreeMap::new();
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for result in results {
            if let Some(score) = result.sub_score {
                dimension_scores.insert(result.analyzer_id.clone(), score);
                let weight = self
                    .config
                    .weights
                    .get(&result.analyzer_id)
                    .copied()
                    .unwrap_or(0.0);
                weighted_sum += weight * score;
                weight_total += weight;
            }
        }
        let overall_score = if weight_total > 0.0 {
            weighted_sum / weight_total
        } else {
            0.0
        };

        let findings = self.merge_findings(results);

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let completeness =
            if successes < self.config.min_successful_analyzers || budget_exhausted {
                Completeness::Partial
            } else {
                Completeness::Final
            };

        CorrectionReport {
            job_id,
            overall_score,
            dimension_scores,
            findings,
            metrics,
            completeness,
            generated_at: Utc::now(),
        }
    }

    fn merge_findings(&self, results: &[AnalyzerResult]) -> Vec<Finding> {
        let mut pooled: Vec<Finding> = results
            .iter()
            .flat_map(|r| r.findings.iter().cloned())
            .collect();

        // 保留偏好排序：严重级别降序、analyzer_id 升序，先保留者获胜
        pooled.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.analyzer_id.cmp(&b.analyzer_id))
                .then_with(|| a.span.cmp(&b.span))
        });

        let mut kept: Vec<Finding> = Vec::with_capacity(pooled.len());
        for candidate in pooled {
            let duplicate = kept
                .iter()
                .any(|existing| self.is_duplicate(existing, &candidate));
            if !duplicate {
                kept.push(candidate);
            }
        }

        // 最终展示顺序
        kept.sort_by(|a, b| {
            a.span
                .0
                .cmp(&b.span.0)
                .then_with(|| b.severity.cmp(&a.severity))
                .then_with(|| a.analyzer_id.cmp(&b.analyzer_id))
        });
        kept
    }

    /// 重复判定：严重级别相同且跨度重叠比例（相对较短跨度）超过阈值
    ///
    /// 零长度跨度（文档级发现）从不判重。
    fn is_duplicate(&self, a: &Finding, b: &Finding) -> bool {
        if a.severity != b.severity {
            return false;
        }
        let shorter = a.len().min(b.len());
        if shorter == 0 {
            return false;
        }
        let overlap_start = a.span.0.max(b.span.0);
        let overlap_end = a.span.1.min(b.span.1);
        let overlap = overlap_end.saturating_sub(overlap_start);
        overlap as f64 / shorter as f64 > self.config.overlap_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corretor_domain::Severity;

    fn consolidator() -> Consolidator {
        Consolidator::new(AnalysisConfig::default())
    }

    fn finding(span: (usize, usize), severity: Severity, analyzer: &str) -> Finding {
        Finding::new(span, severity, format!("finding {span:?}"), analyzer)
    }

    #[test]
    fn test_overall_score_is_renormalized_weighted_mean() {
        let results = vec![
            AnalyzerResult::ok("sintaxe", 0.8, Vec::new()),
            AnalyzerResult::ok("coesao", 0.4, Vec::new()),
            // 失败的维度被排除，不按零分计
            AnalyzerResult::errored("verbos"),
            AnalyzerResult::timed_out("estrutura"),
        ];
        let report =
            consolidator().consolidate(Uuid::new_v4(), &results, TextMetrics::default(), false);
        // 等权重下是两个可用分数的平均
        assert!((report.overall_score - 0.6).abs() < 1e-9);
        assert_eq!(report.dimension_scores.len(), 2);
    }

    #[test]
    fn test_overall_score_within_convex_hull() {
        let results = vec![
            AnalyzerResult::ok("sintaxe", 0.9, Vec::new()),
            AnalyzerResult::ok("verbos", 0.3, Vec::new()),
            AnalyzerResult::ok("estrutura", 0.6, Vec::new()),
        ];
        let report =
            consolidator().consolidate(Uuid::new_v4(), &results, TextMetrics::default(), false);
        assert!(report.overall_score >= 0.3);
        assert!(report.overall_score <= 0.9);
    }

    #[test]
    fn test_no_successful_analyzer_yields_partial_zero() {
        let results = vec![
            AnalyzerResult::errored("sintaxe"),
            AnalyzerResult::errored("verbos"),
        ];
        let report =
            consolidator().consolidate(Uuid::new_v4(), &results, TextMetrics::default(), false);
        assert_eq!(report.overall_score, 0.0);
        assert_eq!(report.completeness, Completeness::Partial);
    }

    #[test]
    fn test_overlapping_same_severity_deduplicated() {
        let results = vec![
            AnalyzerResult::ok(
                "sintaxe",
                1.0,
                vec![finding((10, 20), Severity::Warning, "sintaxe")],
            ),
            AnalyzerResult::ok(
                "verbos",
                1.0,
                vec![finding((12, 20), Severity::Warning, "verbos")],
            ),
        ];
        let report =
            consolidator().consolidate(Uuid::new_v4(), &results, TextMetrics::default(), false);
        assert_eq!(report.findings.len(), 1);
        // 同级重复保留 analyzer_id 字典序靠前的
        assert_eq!(report.findings[0].analyzer_id, "sintaxe");
    }

    #[test]
    fn test_different_severity_not_deduplicated() {
        let results = vec![
            AnalyzerResult::ok(
                "sintaxe",
                1.0,
                vec![finding((10, 20), Severity::Warning, "sintaxe")],
            ),
            AnalyzerResult::ok(
                "coesao",
                1.0,
                vec![finding((10, 20), Severity::Info, "coesao")],
            ),
        ];
        let report =
            consolidator().consolidate(Uuid::new_v4(), &results, TextMetrics::default(), false);
        assert_eq!(report.findings.len(), 2);
    }

    #[test]
    fn test_disjoint_spans_not_deduplicated() {
        let results = vec![AnalyzerResult::ok(
            "sintaxe",
            1.0,
            vec![
                finding((0, 5), Severity::Warning, "sintaxe"),
                finding((10, 15), Severity::Warning, "sintaxe"),
            ],
        )];
        let report =
            consolidator().consolidate(Uuid::new_v4(), &results, TextMetrics::default(), false);
        assert_eq!(report.findings.len(), 2);
    }

    #[test]
    fn test_findings_ordered_by_span_then_severity_then_analyzer() {
        let results = vec![
            AnalyzerResult::ok(
                "coesao",
                1.0,
                vec![
                    finding((30, 40), Severity::Info, "coesao"),
                    finding((5, 9), Severity::Info, "coesao"),
                ],
            ),
            AnalyzerResult::ok(
                "sintaxe",
                1.0,
                vec![finding((5, 8), Severity::Error, "sintaxe")],
            ),
        ];
        let report =
            consolidator().consolidate(Uuid::new_v4(), &results, TextMetrics::default(), false);
        let order: Vec<(usize, Severity)> = report
            .findings
            .iter()
            .map(|f| (f.span.0, f.severity))
            .collect();
        assert_eq!(
            order,
            vec![
                (5, Severity::Error),
                (5, Severity::Info),
                (30, Severity::Info),
            ]
        );
    }

    #[test]
    fn test_budget_exhaustion_marks_partial() {
        let results = vec![
            AnalyzerResult::ok("sintaxe", 0.8, Vec::new()),
            AnalyzerResult::ok("verbos", 0.7, Vec::new()),
            AnalyzerResult::ok("estrutura", 0.6, Vec::new()),
            AnalyzerResult::ok("coesao", 0.5, Vec::new()),
        ];
        let report =
            consolidator().consolidate(Uuid::new_v4(), &results, TextMetrics::default(), true);
        assert_eq!(report.completeness, Completeness::Partial);

        let report =
            consolidator().consolidate(Uuid::new_v4(), &results, TextMetrics::default(), false);
        assert_eq!(report.completeness, Completeness::Final);
    }

    #[test]
    fn test_underrun_marks_partial() {
        // 默认下限是 3 个成功分析器
        let results = vec![
            AnalyzerResult::ok("sintaxe", 0.8, Vec::new()),
            AnalyzerResult::ok("verbos", 0.7, Vec::new()),
            AnalyzerResult::errored("estrutura"),
            AnalyzerResult::errored("coesao"),
        ];
        let report =
            consolidator().consolidate(Uuid::new_v4(), &results, TextMetrics::default(), false);
        assert_eq!(report.completeness, Completeness::Partial);
    }

    #[test]
    fn test_consolidation_is_deterministic() {
        let results = vec![
            AnalyzerResult::ok(
                "coesao",
                0.6,
                vec![finding((3, 9), Severity::Info, "coesao")],
            ),
            AnalyzerResult::ok(
                "sintaxe",
                0.8,
                vec![finding((3, 9), Severity::Info, "sintaxe")],
            ),
        ];
        let job_id = Uuid::new_v4();
        let a = consolidator().consolidate(job_id, &results, TextMetrics::default(), false);
        let b = consolidator().consolidate(job_id, &results, TextMetrics::default(), false);
        assert_eq!(a.overall_score.to_bits(), b.overall_score.to_bits());
        assert_eq!(a.findings, b.findings);
        // 同级同跨度重复：保留 coesao（字典序在 sintaxe 之前）
        assert_eq!(a.findings.len(), 1);
        assert_eq!(a.findings[0].analyzer_id, "coesao");
    }
}
