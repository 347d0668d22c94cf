//! Markdown summary generation
//!
//! This module generates human-readable markdown summaries of crawl results,
//! including statistics, the page list and the error report.

use crate::output::{CrawlReport, OutputError, OutputResult};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Pages listed before the table is truncated
const MAX_LISTED_PAGES: usize = 200;

/// Errors listed before the table is truncated
const MAX_LISTED_ERRORS: usize = 100;

/// Writes a markdown summary of a crawl
///
/// # Arguments
///
/// * `report` - The finished crawl
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn write_markdown_summary(report: &CrawlReport, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(report);

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(OutputError::Write(format!(
                "directory {} does not exist",
                parent.display()
            )));
        }
    }

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a crawl report as markdown
pub fn format_markdown_summary(report: &CrawlReport) -> String {
    let stats = &report.statistics;
    let mut md = String::new();

    md.push_str("# Site-Harvest Crawl Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Started**: {}\n", stats.started_at.to_rfc3339()));
    if let Some(finished) = &stats.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished.to_rfc3339()));
    }
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        stats.elapsed.as_secs_f64()
    ));
    md.push_str(&format!("- **Strategy**: {}\n", stats.strategy));
    if stats.cancelled {
        md.push_str("- **Cancelled**: yes\n");
    }
    md.push('\n');

    // Discovery
    md.push_str("## Discovery\n\n");
    match &stats.sitemap_url {
        Some(url) => md.push_str(&format!(
            "- **Sitemap**: {} ({} URLs)\n",
            url, stats.sitemap_url_count
        )),
        None => md.push_str("- **Sitemap**: none found\n"),
    }
    md.push_str(&format!(
        "- **Discovered via links**: {}\n",
        stats.html_discovered_count
    ));
    md.push_str(&format!("- **Total discovered**: {}\n", stats.total_discovered));
    md.push_str(&format!("- **Pages fetched**: {}\n", stats.total_fetched));
    md.push_str(&format!("- **Success Rate**: {:.2}%\n\n", stats.success_rate()));

    md.push_str("| Skipped | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Duplicates | {} |\n", stats.duplicates_skipped));
    md.push_str(&format!("| Blocked by robots.txt | {} |\n", stats.robots_blocked));
    md.push_str(&format!("| Queue bound | {} |\n\n", stats.queue_discarded));

    if stats.used_root_fallback {
        md.push_str("> No page was reachable through the queue; the root was fetched directly.\n\n");
    }

    // Pages
    if !report.pages.is_empty() {
        md.push_str("## Pages\n\n");
        md.push_str("| URL | Status | Source | Title |\n");
        md.push_str("|-----|--------|--------|-------|\n");

        for page in report.pages.iter().take(MAX_LISTED_PAGES) {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                page.url,
                page.status,
                page.source,
                escape_cell(page.title.as_deref().unwrap_or(""))
            ));
        }
        if report.pages.len() > MAX_LISTED_PAGES {
            md.push_str(&format!(
                "\n... and {} more\n",
                report.pages.len() - MAX_LISTED_PAGES
            ));
        }
        md.push('\n');
    }

    // Errors
    if !stats.errors.is_empty() {
        md.push_str("## Error Summary\n\n");
        md.push_str("| Stage | Count |\n");
        md.push_str("|-------|-------|\n");
        for (stage, count) in stats.errors_by_stage() {
            md.push_str(&format!("| {} | {} |\n", stage, count));
        }
        md.push('\n');

        md.push_str("| URL | Stage | Error |\n");
        md.push_str("|-----|-------|-------|\n");
        for error in stats.errors.iter().take(MAX_LISTED_ERRORS) {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                error.url,
                error.stage,
                escape_cell(&error.message)
            ));
        }
        if stats.errors.len() > MAX_LISTED_ERRORS {
            md.push_str(&format!(
                "\n... and {} more\n",
                stats.errors.len() - MAX_LISTED_ERRORS
            ));
        }
        md.push('\n');
    }

    md
}

/// Keeps a value from breaking the table row
fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::DiscoverySource;
    use crate::output::{ContentKind, CrawlStatistics, ErrorStage, FetchedPage};
    use crate::url::{canonicalize, SitePolicy};
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_report() -> CrawlReport {
        let policy = SitePolicy::from_root("https://example.com").unwrap();
        let url = canonicalize("https://example.com/about", None, &policy).unwrap();

        let mut statistics = CrawlStatistics::new("direct");
        statistics.sitemap_found = true;
        statistics.sitemap_url = Some("https://example.com/sitemap.xml".to_string());
        statistics.sitemap_url_count = 3;
        statistics.total_discovered = 2;
        statistics.total_fetched = 1;
        statistics.record_error("https://example.com/gone", ErrorStage::Fetch, "HTTP 404");

        CrawlReport {
            pages: vec![FetchedPage {
                requested_url: url.clone(),
                final_url: url.to_string(),
                url,
                body: "<html></html>".to_string(),
                status: 200,
                content_type: "text/html".to_string(),
                kind: ContentKind::Html,
                title: Some("About | Example".to_string()),
                source: DiscoverySource::Sitemap,
                fetched_at: Utc::now(),
            }],
            statistics,
        }
    }

    #[test]
    fn test_format_markdown_summary() {
        let md = format_markdown_summary(&sample_report());

        assert!(md.contains("# Site-Harvest Crawl Summary"));
        assert!(md.contains("https://example.com/sitemap.xml (3 URLs)"));
        assert!(md.contains("| https://example.com/about | 200 | sitemap | About \\| Example |"));
        assert!(md.contains("| https://example.com/gone | fetch | HTTP 404 |"));
        assert!(md.contains("- **Success Rate**: 50.00%"));
    }

    #[test]
    fn test_write_markdown_summary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.md");

        write_markdown_summary(&sample_report(), &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# Site-Harvest Crawl Summary"));
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("summary.md");

        assert!(matches!(
            write_markdown_summary(&sample_report(), &path),
            Err(OutputError::Write(_))
        ));
    }
}
