//! Output formatting for search results.
//!
//! Supports both human-readable terminal output and JSON for scripting.

use pagesight_core::highlight::Rect;
use pagesight_core::metrics::MetricsSnapshot;
use pagesight_core::retrieval::RetrievedPage;
use serde::Serialize;

/// JSON output structure for search results
#[derive(Serialize)]
pub struct JsonOutput {
    pub query: String,
    pub results: Vec<JsonPageResult>,
}

/// One ranked page in JSON format
#[derive(Serialize)]
pub struct JsonPageResult {
    pub rank: usize,
    pub document_id: u64,
    pub document_name: String,
    /// 0-based page number
    pub page_number: u32,
    /// MaxSim score
    pub score: f32,
    /// Highlighted regions in page pixels
    pub regions: Vec<Rect>,
    /// True when regions were not refined with OCR
    pub ocr_degraded: bool,
}

impl JsonPageResult {
    fn new(rank: usize, result: &RetrievedPage) -> Self {
        Self {
            rank,
            document_id: result.page.document_id.as_u64(),
            document_name: result.document_name.clone(),
            page_number: result.page.page_number,
            score: result.page.score,
            regions: result.highlight.regions.clone(),
            ocr_degraded: result.highlight.ocr_degraded,
        }
    }
}

/// Formats search results as JSON.
pub fn format_json(query: &str, results: &[RetrievedPage]) -> String {
    let output = JsonOutput {
        query: query.to_string(),
        results: results
            .iter()
            .enumerate()
            .map(|(i, r)| JsonPageResult::new(i + 1, r))
            .collect(),
    };
    serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
}

/// Formats search results for human-readable terminal output.
pub fn format_human(query: &str, results: &[RetrievedPage]) -> String {
    if results.is_empty() {
        return format!("No pages found for \"{}\"", query);
    }

    let mut output = String::new();
    output.push_str(&format!(
        "Found {} page{} for \"{}\":\n\n",
        results.len(),
        if results.len() == 1 { "" } else { "s" },
        query
    ));

    for (i, result) in results.iter().enumerate() {
        output.push_str(&format!(
            "{}. {} - page {} (score: {:.2})\n",
            i + 1,
            result.document_name,
            result.page.page_number + 1,
            result.page.score
        ));

        let regions = result.highlight.regions.len();
        output.push_str(&format!(
            "   {} highlighted region{}{}\n",
            regions,
            if regions == 1 { "" } else { "s" },
            if result.highlight.ocr_degraded {
                " (OCR unavailable, raw patches)"
            } else {
                ""
            }
        ));
        output.push('\n');
    }

    output.trim_end().to_string()
}

/// One-line timing summary from the metrics snapshot.
pub fn format_stats(snapshot: &MetricsSnapshot) -> String {
    let ms = |v: Option<f64>| {
        v.map(|v| format!("{:.1}ms", v))
            .unwrap_or_else(|| "-".to_string())
    };
    format!(
        "pages indexed: {} (avg {}), query embed {}, scoring {}, highlight {}, gateway wait {}",
        snapshot.total_pages_indexed,
        ms(snapshot.page_indexing_avg_ms),
        ms(snapshot.retrieval.query_embed_avg_ms),
        ms(snapshot.retrieval.scoring_avg_ms),
        ms(snapshot.retrieval.highlight_avg_ms),
        ms(snapshot.gateway.queue_wait_avg_ms)
    )
}
