//! Report types consumed by the CLI and any other renderer or store.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::html::{Document, Query};

/// Outcome of one rule. `rule` is the stable catalogue name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub rule: String,
    pub passed: bool,
    pub details: String,
}

/// Descriptive page statistics, independent of the pass/fail rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSummary {
    pub title: String,
    pub meta_description: bool,
    pub links: usize,
    pub images: usize,
    pub scripts: usize,
    pub styles: usize,
}

impl PageSummary {
    pub fn from_document(doc: &Document) -> Self {
        let title = doc
            .find(&Query::tag("title"))
            .map(|id| doc[id].text.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "No title found".to_string());
        Self {
            title,
            meta_description: doc
                .find(&Query::tag("meta").attr("name", "description"))
                .is_some(),
            links: doc.find_all(&Query::tag("a")).len(),
            images: doc.find_all(&Query::tag("img")).len(),
            scripts: doc.find_all(&Query::tag("script")).len(),
            styles: doc.find_all(&Query::tag("style")).len(),
        }
    }
}

/// The aggregate result of one analysis run. Built once, then read-only.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub url: String,
    pub score: f64,
    pub passed: usize,
    pub total: usize,
    /// One entry per executed rule, in catalogue order.
    pub checks: Vec<CheckResult>,
    pub page_summary: PageSummary,
    /// `"{rule}: {details}"` for each failed check, in check order.
    pub recommendations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Report {
    pub fn from_checks(url: String, checks: Vec<CheckResult>, page_summary: PageSummary) -> Self {
        let passed = checks.iter().filter(|c| c.passed).count();
        let total = checks.len();
        let score = if total == 0 {
            0.0
        } else {
            100.0 * passed as f64 / total as f64
        };
        let recommendations = checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| format!("{}: {}", c.rule, c.details))
            .collect();
        Self {
            url,
            score,
            passed,
            total,
            checks,
            page_summary,
            recommendations,
            timestamp: Utc::now(),
        }
    }
}

/// Emitted in place of a [`Report`] when the primary fetch fails.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub error: String,
}
