//! Web search stage: run plan queries, merge by URL, fetch page text

use futures::StreamExt;
use futures::future::join_all;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::research::artifacts::{QueryHits, SearchPlan, SearchResult, SearchResults};
use crate::research::{ResearchContext, ResearchError};
use crate::search::{SearchHit, binary_placeholder, is_binary_url};

/// Execute every query of `plan` and fetch each distinct result once
///
/// Individual query failures are tolerated; the stage fails only when the
/// plan is empty or every query failed.
pub async fn search_web(ctx: &ResearchContext, plan: &SearchPlan) -> Result<SearchResults, ResearchError> {
    debug!(queries = plan.queries.len(), depth = plan.depth, "search_web: called");
    if plan.queries.is_empty() {
        return Err(ResearchError::Stage("search plan has no queries".to_string()));
    }

    let count = plan.results_per_query();
    let outcomes = join_all(plan.queries.iter().map(|q| ctx.retriever.search(q, count))).await;

    let mut per_query = Vec::with_capacity(outcomes.len());
    let mut failures = 0;
    for (query, outcome) in plan.queries.iter().zip(outcomes) {
        match outcome {
            Ok(hits) => per_query.push((query.clone(), hits)),
            Err(e) => {
                warn!(%query, error = %e, "search_web: query failed");
                failures += 1;
                per_query.push((query.clone(), Vec::new()));
            }
        }
    }
    if failures == plan.queries.len() {
        return Err(ResearchError::Stage(format!("all {failures} search queries failed")));
    }

    let mut merged = merge_hits(per_query);

    let extensions = &ctx.fetch.binary_extensions;
    let urls: Vec<String> = merged.results.iter().map(|r| r.url.clone()).collect();
    let contents: Vec<String> = futures::stream::iter(urls)
        .map(|url| async move {
            if is_binary_url(&url, extensions) {
                binary_placeholder(&url)
            } else {
                ctx.retriever.fetch(&url).await
            }
        })
        .buffered(ctx.fetch.concurrency.max(1))
        .collect()
        .await;

    for (result, content) in merged.results.iter_mut().zip(contents) {
        result.content = content;
    }

    info!(
        results = merged.results.len(),
        failed_queries = failures,
        "search_web: search complete"
    );
    Ok(merged)
}

/// Merge per-query hits into URL-unique results, in first-seen order
///
/// A URL returned by several queries becomes one result listed under each.
pub fn merge_hits(per_query: Vec<(String, Vec<SearchHit>)>) -> SearchResults {
    let mut merged = SearchResults::default();
    let mut by_url: HashMap<String, usize> = HashMap::new();

    for (query, hits) in per_query {
        let mut indices = Vec::new();
        for hit in hits {
            let index = *by_url.entry(hit.url.clone()).or_insert_with(|| {
                merged.results.push(SearchResult {
                    url: hit.url,
                    title: hit.title,
                    snippet: hit.snippet,
                    content: String::new(),
                });
                merged.results.len() - 1
            });
            if !indices.contains(&index) {
                indices.push(index);
            }
        }
        merged.query_mapping.push(QueryHits {
            query,
            result_indices: indices,
        });
    }
    merged
}
