//! Output formatting for CLI commands.

use std::fmt::Write as _;

use serde::Serialize;

use crate::cache::tiered::TieredCacheStats;
use crate::cli::args::OutputFormat;
use crate::document::DocumentId;
use crate::error::Result;
use crate::hybrid::FusionResult;
use crate::metrics::MetricsSnapshot;

const PREVIEW_CHARS: usize = 80;

/// Plain-text rendering of a command result.
pub trait HumanReadable {
    fn to_human(&self) -> String;
}

/// One keyword search hit.
#[derive(Debug, Serialize)]
pub struct KeywordRow {
    pub rank: usize,
    pub ordinal: usize,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    pub content: String,
}

/// Result of the `keyword` command.
#[derive(Debug, Serialize)]
pub struct KeywordSearchReport {
    pub query: String,
    pub corpus_size: usize,
    pub vocabulary_size: usize,
    pub hits: Vec<KeywordRow>,
}

/// Result of the `search` command.
#[derive(Debug, Serialize)]
pub struct HybridSearchReport {
    pub query: String,
    pub corpus_size: usize,
    pub results: Vec<FusionResult>,
    pub cache: TieredCacheStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSnapshot>,
}

/// On-disk cache usage of one model.
#[derive(Debug, Serialize)]
pub struct ModelCacheReport {
    pub model: String,
    pub entries: u64,
    pub bytes: u64,
}

/// Result of `cache stats`.
#[derive(Debug, Serialize)]
pub struct CacheStatsReport {
    pub directory: String,
    pub models: Vec<ModelCacheReport>,
}

/// Result of `cache clear`.
#[derive(Debug, Serialize)]
pub struct CacheClearReport {
    pub directory: String,
    pub models: Vec<String>,
    pub removed: u64,
}

/// Render `result` in `format`.
pub fn format_result<T: Serialize + HumanReadable>(result: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(result.to_human()),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
    }
}

fn preview(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        let mut cut: String = flat.chars().take(PREVIEW_CHARS - 3).collect();
        cut.push_str("...");
        cut
    }
}

impl HumanReadable for KeywordSearchReport {
    fn to_human(&self) -> String {
        let mut out = format!(
            "Query: {}\nDocuments: {} (vocabulary {})\n",
            self.query, self.corpus_size, self.vocabulary_size
        );
        if self.hits.is_empty() {
            out.push_str("No results.");
            return out;
        }
        for hit in &self.hits {
            let _ = write!(out, "\n{:>3}. [#{}] bm25={:.4}", hit.rank, hit.ordinal, hit.score);
            if let Some(id) = &hit.id {
                let _ = write!(out, " id={id}");
            }
            let _ = write!(out, "\n     {}", preview(&hit.content));
        }
        out
    }
}

impl HumanReadable for HybridSearchReport {
    fn to_human(&self) -> String {
        let mut out = format!("Query: {}\nDocuments: {}\n", self.query, self.corpus_size);
        if self.results.is_empty() {
            out.push_str("No results.\n");
        }
        for result in &self.results {
            let ordinal = result.ordinal.map_or_else(|| "-".to_string(), |o| format!("#{o}"));
            let _ = write!(
                out,
                "\n{:>3}. [{}] fused={:.5} semantic={:.4} (rank {}) bm25={:.4} (rank {})\n     {}",
                result.rank,
                ordinal,
                result.fused_score,
                result.semantic_score,
                rank_label(result.semantic_rank),
                result.keyword_score,
                rank_label(result.keyword_rank),
                preview(&result.document.content)
            );
        }
        let _ = write!(
            out,
            "\n\nEmbedding cache ({}): L1 {} hits / {} misses ({:.1}%), L2 {} hits / {} misses ({:.1}%), {} entries on disk",
            self.cache.model,
            self.cache.l1.hits,
            self.cache.l1.misses,
            self.cache.l1.hit_rate() * 100.0,
            self.cache.l2.hits,
            self.cache.l2.misses,
            self.cache.l2.hit_rate() * 100.0,
            self.cache.l2.size
        );
        if let Some(metrics) = &self.metrics {
            out.push_str("\n\nMetrics:");
            for (name, values) in &metrics.counters {
                for (labels, value) in values {
                    let _ = write!(out, "\n  {name}{{{labels}}} {value}");
                }
            }
            for (name, values) in &metrics.timers {
                for (labels, stats) in values {
                    let _ = write!(
                        out,
                        "\n  {name}{{{labels}}} count={} avg={:.3}ms",
                        stats.count,
                        stats.avg.as_secs_f64() * 1000.0
                    );
                }
            }
        }
        out
    }
}

fn rank_label(rank: Option<usize>) -> String {
    rank.map_or_else(|| "-".to_string(), |r| r.to_string())
}

impl HumanReadable for CacheStatsReport {
    fn to_human(&self) -> String {
        let mut out = format!("Cache directory: {}", self.directory);
        if self.models.is_empty() {
            out.push_str("\nNo cached models.");
        }
        for model in &self.models {
            let _ = write!(out, "\n  {:<32} {:>8} entries {:>12} bytes", model.model, model.entries, model.bytes);
        }
        out
    }
}

impl HumanReadable for CacheClearReport {
    fn to_human(&self) -> String {
        format!(
            "Removed {} cached entries from {} ({})",
            self.removed,
            self.directory,
            if self.models.is_empty() {
                "no models".to_string()
            } else {
                self.models.join(", ")
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "ç".repeat(200);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS);
        assert!(p.ends_with("..."));
        assert_eq!(preview("a\n  b"), "a b");
    }

    #[test]
    fn test_keyword_report_formats() {
        let report = KeywordSearchReport {
            query: "juros".to_string(),
            corpus_size: 2,
            vocabulary_size: 5,
            hits: vec![KeywordRow {
                rank: 1,
                ordinal: 0,
                score: 1.25,
                id: Some(DocumentId::new("doc#0")),
                content: "taxa de juros".to_string(),
            }],
        };

        let human = format_result(&report, OutputFormat::Human).unwrap();
        assert!(human.contains("bm25=1.2500 id=doc#0"));

        let json: serde_json::Value = serde_json::from_str(&format_result(&report, OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["hits"][0]["ordinal"], 0);
        assert_eq!(json["hits"][0]["id"], "doc#0");
    }
}
