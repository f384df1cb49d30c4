//! Rendering search results for the terminal, report files, and JSON.

use std::{
    fmt::Write as _,
    io::{BufWriter, Write},
    path::Path,
};

use serde::Serialize;

use crate::{error::Result, retrieval::SearchResult};

/// Characters of content shown per row in terminal tables.
pub const PREVIEW_CHARS: usize = 100;

const SECTION_RULE_WIDTH: usize = 50;

/// Read a newline-delimited query file; lines are trimmed and blank lines
/// skipped.
pub fn read_queries(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn preview(content: &str) -> String {
    let flat: String = content
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    match flat.char_indices().nth(PREVIEW_CHARS) {
        Some((byte_idx, _)) => format!("{}...", &flat[..byte_idx]),
        None => flat,
    }
}

/// A plain-text table of `results` under a title naming `query`.
pub fn format_table(query: &str, results: &[SearchResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Search Results for: {query}");

    if results.is_empty() {
        out.push_str("No results found.\n");
        return out;
    }

    let _ = writeln!(out, "{:>4}  {:<8}  Content", "Rank", "Score");
    for r in results {
        let _ = writeln!(out, "{:>4}  {:<8.4}  {}", r.rank, r.score, preview(&r.content));
    }
    let _ = writeln!(out, "\n{} result(s)", results.len());
    out
}

fn write_results(out: &mut impl Write, results: &[SearchResult]) -> std::io::Result<()> {
    for r in results {
        write!(
            out,
            "Rank: {}\nScore: {:.4}\nContent: {}\n\n",
            r.rank, r.score, r.content
        )?;
    }
    Ok(())
}

/// Write the full results of one query to `path`.
pub fn write_report(path: &Path, query: &str, results: &[SearchResult]) -> Result<()> {
    let mut out = BufWriter::new(std::fs::File::create(path)?);
    write!(out, "Search Results for: {query}\n\n")?;
    write_results(&mut out, results)?;
    out.flush()?;
    Ok(())
}

/// Write the full results of several queries to `path`, one section per
/// query in order.
pub fn write_batch_report<Q: AsRef<str>>(
    path: &Path,
    queries: &[Q],
    results: &[Vec<SearchResult>],
) -> Result<()> {
    let mut out = BufWriter::new(std::fs::File::create(path)?);
    for (i, (query, query_results)) in queries.iter().zip(results).enumerate() {
        write!(out, "Query {}: {}\n\n", i + 1, query.as_ref())?;
        write_results(&mut out, query_results)?;
        write!(out, "\n{}\n\n", "-".repeat(SECTION_RULE_WIDTH))?;
    }
    out.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct QueryReport<'a> {
    query: &'a str,
    result_count: usize,
    results: &'a [SearchResult],
}

/// Results of each query as a JSON array of
/// `{"query", "result_count", "results"}` objects.
pub fn to_json<Q: AsRef<str>>(queries: &[Q], results: &[Vec<SearchResult>]) -> Result<String> {
    let reports: Vec<QueryReport<'_>> = queries
        .iter()
        .zip(results)
        .map(|(query, results)| QueryReport {
            query: query.as_ref(),
            result_count: results.len(),
            results,
        })
        .collect();
    Ok(serde_json::to_string_pretty(&reports)?)
}
