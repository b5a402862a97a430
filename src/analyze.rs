//! Evaluation orchestrator: fetch the page, build the tree, run the rule
//! catalogue in order and assemble the report.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::checks::{CheckContext, Rule, RULES};
use crate::html::Document;
use crate::report::{CheckResult, ErrorReport, PageSummary, Report};
use crate::web::{FetchError, FetchResult, Headers, HttpClient};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    /// Extra request headers; a default User-Agent is supplied if absent.
    pub headers: Headers,
    /// Timeout for the primary page fetch.
    pub timeout: Duration,
    /// Timeout for each resource HEAD probe.
    pub probe_timeout: Duration,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            headers: Headers::new(),
            timeout: DEFAULT_TIMEOUT,
            probe_timeout: PROBE_TIMEOUT,
        }
    }
}

/// Fatal analysis failure. Anything recoverable (a failed resource probe,
/// malformed markup, missing headers) surfaces as failed checks instead.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl From<&AnalyzeError> for ErrorReport {
    fn from(err: &AnalyzeError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

/// Analyze the page at `url`: one GET, then the full rule catalogue. A
/// transport failure of this primary fetch aborts the analysis; no rule runs.
pub fn analyze(url: &str, options: &AnalyzeOptions) -> Result<Report, AnalyzeError> {
    Url::parse(url)?;
    info!(url, "starting analysis");
    let client = HttpClient::with_headers(options.headers.clone())?;
    let response = client.get(url, options.timeout)?;
    analyze_response(&response, &client, options)
}

/// Run the catalogue against an already-fetched page. Deterministic for a
/// fixed response when the page references no probeable resources.
pub fn analyze_response(
    response: &FetchResult,
    client: &HttpClient,
    options: &AnalyzeOptions,
) -> Result<Report, AnalyzeError> {
    let base_url = Url::parse(&response.url)?;
    let document = Document::parse(&response.text);
    let ctx = CheckContext {
        document: &document,
        response,
        client,
        base_url: &base_url,
        probe_timeout: options.probe_timeout,
    };
    let checks = run_checks(RULES, &ctx);
    let summary = PageSummary::from_document(&document);
    let report = Report::from_checks(response.url.clone(), checks, summary);
    info!(
        score = report.score,
        passed = report.passed,
        total = report.total,
        "analysis complete"
    );
    Ok(report)
}

/// Evaluate `rules` in declaration order. The report's `total` always equals
/// the number of rules executed, so deployments may run a reduced catalogue.
pub fn run_checks(rules: &[Rule], ctx: &CheckContext) -> Vec<CheckResult> {
    rules
        .iter()
        .map(|rule| {
            let (passed, details) = (rule.run)(ctx);
            debug!(rule = rule.name, passed, "check evaluated");
            CheckResult {
                rule: rule.name.to_string(),
                passed,
                details,
            }
        })
        .collect()
}
