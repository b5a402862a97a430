//! The rule catalogue: a fixed, declaration-ordered set of evaluators, each a
//! pure function over the parsed page and its response.

use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::html::{Document, Element, NodeId, Query};
use crate::web::{FetchResult, HttpClient};

const MAX_RESOURCE_COUNT: usize = 50;
const MAX_PAGE_WEIGHT: u64 = 2 * 1024 * 1024;

const SEMANTIC_TAGS: &[&str] = &["header", "nav", "main", "article", "section", "footer"];
const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// Read-only inputs shared by every evaluator.
pub struct CheckContext<'a> {
    pub document: &'a Document,
    pub response: &'a FetchResult,
    pub client: &'a HttpClient,
    pub base_url: &'a Url,
    pub probe_timeout: Duration,
}

pub type CheckFn = fn(&CheckContext) -> (bool, String);

pub struct Rule {
    pub name: &'static str,
    pub run: CheckFn,
}

/// The full catalogue, evaluated in this order. Results are never reordered.
pub const RULES: &[Rule] = &[
    Rule { name: "Semantic HTML", run: check_semantic_html },
    Rule { name: "Schema.org Markup", run: check_schema_markup },
    Rule { name: "Headings Structure", run: check_headings_structure },
    Rule { name: "Alt Text for Images", run: check_alt_text },
    Rule { name: "Lists/Tables", run: check_lists_and_tables },
    Rule { name: "Language Attribute", run: check_language_attribute },
    Rule { name: "Transcripts/Captions", run: check_transcripts_captions },
    Rule { name: "Viewport Meta", run: check_viewport_meta },
    Rule { name: "Canonical Link", run: check_canonical_link },
    Rule { name: "Social Meta Tags", run: check_social_meta },
    Rule { name: "Hreflang Tags", run: check_hreflang_tags },
    Rule { name: "Resource Count", run: check_resource_count },
    Rule { name: "Lazy Loading", run: check_lazy_loading },
    Rule { name: "Caching Headers", run: check_caching_headers },
    Rule { name: "Page Weight", run: check_page_weight },
];

fn check_semantic_html(ctx: &CheckContext) -> (bool, String) {
    let found = ctx.document.find(&Query::tags(SEMANTIC_TAGS)).is_some();
    if found {
        (true, "Semantic HTML tags found.".to_string())
    } else {
        (false, "Add semantic HTML5 tags for structure.".to_string())
    }
}

fn check_schema_markup(ctx: &CheckContext) -> (bool, String) {
    let doc = ctx.document;
    let json_ld = doc
        .find_all(&Query::tag("script").attr("type", "application/ld+json"))
        .iter()
        .any(|&id| doc[id].text.to_ascii_lowercase().contains("schema.org"));
    let microdata = doc
        .find_all(&Query::any().attr_present("itemscope"))
        .iter()
        .any(|&id| {
            doc[id]
                .attr("itemtype")
                .map_or(false, |t| t.to_ascii_lowercase().contains("schema.org"))
        });
    if json_ld || microdata {
        let mut details = Vec::new();
        if json_ld {
            details.push("JSON-LD found");
        }
        if microdata {
            details.push("Microdata markup found");
        }
        (true, details.join("; "))
    } else {
        (
            false,
            "Add JSON-LD or Microdata schema.org structured data.".to_string(),
        )
    }
}

fn check_headings_structure(ctx: &CheckContext) -> (bool, String) {
    let count = ctx.document.find_all(&Query::tags(HEADING_TAGS)).len();
    if count > 0 {
        (true, format!("{} heading tags found.", count))
    } else {
        (false, "Add descriptive headings (h1-h6).".to_string())
    }
}

fn check_alt_text(ctx: &CheckContext) -> (bool, String) {
    let doc = ctx.document;
    let images = doc.find_all(&Query::tag("img"));
    if images.is_empty() {
        return (true, "No images found.".to_string());
    }
    let missing = images
        .iter()
        .filter(|&&id| doc[id].attr("alt").map_or(true, |a| a.trim().is_empty()))
        .count();
    if missing == 0 {
        (true, "All images have alt text.".to_string())
    } else {
        (
            false,
            format!("{} of {} images missing alt text.", missing, images.len()),
        )
    }
}

fn check_lists_and_tables(ctx: &CheckContext) -> (bool, String) {
    let doc = ctx.document;
    let lists = doc.find_all(&Query::tags(&["ul", "ol"])).len();
    let tables = doc.find_all(&Query::tag("table")).len();
    if lists + tables > 0 {
        (true, format!("{} lists, {} tables found.", lists, tables))
    } else {
        (
            false,
            "Consider using lists and tables for structured content.".to_string(),
        )
    }
}

fn check_language_attribute(ctx: &CheckContext) -> (bool, String) {
    let doc = ctx.document;
    let found = doc
        .find(&Query::tag("html"))
        .map_or(false, |id| doc[id].has_attr("lang"));
    if found {
        (true, "lang attribute present on html tag.".to_string())
    } else {
        (
            false,
            "Add lang attribute for language declaration.".to_string(),
        )
    }
}

fn attr_non_empty(element: &Element, key: &str) -> bool {
    element.attr(key).map_or(false, |v| !v.is_empty())
}

fn check_transcripts_captions(ctx: &CheckContext) -> (bool, String) {
    let doc = ctx.document;
    let videos = doc.find_all(&Query::tag("video"));
    let audios = doc.find_all(&Query::tag("audio"));
    let captions = Query::tag("track").attr("kind", "captions");
    let videos_ok = videos.iter().all(|&id| {
        attr_non_empty(&doc[id], "aria-label")
            || attr_non_empty(&doc[id], "title")
            || doc.find_within(id, &captions).is_some()
    });
    let audios_ok = audios
        .iter()
        .all(|&id| attr_non_empty(&doc[id], "aria-label") || attr_non_empty(&doc[id], "title"));
    if videos_ok && audios_ok {
        (
            true,
            "Multimedia elements have ARIA labels/titles/captions.".to_string(),
        )
    } else {
        (
            false,
            "Provide captions/transcripts for videos/audio.".to_string(),
        )
    }
}

fn check_viewport_meta(ctx: &CheckContext) -> (bool, String) {
    let found = ctx
        .document
        .find(&Query::tag("meta").attr("name", "viewport"))
        .is_some();
    if found {
        (true, "Viewport meta tag present.".to_string())
    } else {
        (
            false,
            "Add <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"> \
             for mobile responsiveness."
                .to_string(),
        )
    }
}

fn check_canonical_link(ctx: &CheckContext) -> (bool, String) {
    let doc = ctx.document;
    let href = doc
        .find(&Query::tag("link").attr("rel", "canonical"))
        .and_then(|id| doc[id].attr("href"))
        .filter(|href| !href.is_empty());
    match href {
        Some(href) => (true, format!("Canonical link found: {}", href)),
        None => (
            false,
            "Add <link rel=\"canonical\" href=\"...\"> to avoid duplicate content issues."
                .to_string(),
        ),
    }
}

fn check_social_meta(ctx: &CheckContext) -> (bool, String) {
    let doc = ctx.document;
    // Prefix matching on `property` is done here; the query layer only knows
    // exact values and existence.
    let og_count = doc
        .find_all(&Query::tag("meta").attr_present("property"))
        .iter()
        .filter(|&&id| doc[id].attr("property").map_or(false, |p| p.starts_with("og:")))
        .count();
    let twitter = doc
        .find(&Query::tag("meta").attr("name", "twitter:card"))
        .is_some();
    let mut details = Vec::new();
    if og_count > 0 {
        details.push(format!("{} OpenGraph tags", og_count));
    } else {
        details.push("Missing OpenGraph tags".to_string());
    }
    if twitter {
        details.push("Twitter Card tag present".to_string());
    } else {
        details.push("Missing Twitter Card tag".to_string());
    }
    (og_count > 0 && twitter, details.join("; "))
}

fn check_hreflang_tags(ctx: &CheckContext) -> (bool, String) {
    let count = ctx
        .document
        .find_all(&Query::tag("link").attr("rel", "alternate").attr_present("hreflang"))
        .len();
    if count > 0 {
        (true, format!("{} hreflang tags found.", count))
    } else {
        (
            false,
            "Add <link rel=\"alternate\" hreflang=\"x\" href=\"...\"> tags for multilingual support."
                .to_string(),
        )
    }
}

/// References counted by the resource rules: scripts, stylesheets and media
/// with an explicit source, in document order.
pub(crate) fn resource_urls(doc: &Document) -> Vec<String> {
    let mut urls = Vec::new();
    let mut collect = |ids: Vec<NodeId>, key: &str| {
        for id in ids {
            if let Some(value) = doc[id].attr(key) {
                urls.push(value.to_string());
            }
        }
    };
    collect(doc.find_all(&Query::tag("script").attr_present("src")), "src");
    collect(
        doc.find_all(&Query::tag("link").attr("rel", "stylesheet").attr_present("href")),
        "href",
    );
    collect(doc.find_all(&Query::tag("img").attr_present("src")), "src");
    collect(doc.find_all(&Query::tag("video").attr_present("src")), "src");
    collect(doc.find_all(&Query::tag("audio").attr_present("src")), "src");
    urls
}

fn check_resource_count(ctx: &CheckContext) -> (bool, String) {
    let count = resource_urls(ctx.document).len();
    (
        count <= MAX_RESOURCE_COUNT,
        format!("{} external resources referenced.", count),
    )
}

fn check_lazy_loading(ctx: &CheckContext) -> (bool, String) {
    let doc = ctx.document;
    let images = doc.find_all(&Query::tag("img").attr_present("src"));
    if images.is_empty() {
        return (true, "No images to lazy-load.".to_string());
    }
    let missing = images
        .iter()
        .filter(|&&id| doc[id].attr("loading") != Some("lazy"))
        .count();
    (
        missing == 0,
        format!("{}/{} images lack loading=\"lazy\".", missing, images.len()),
    )
}

fn check_caching_headers(ctx: &CheckContext) -> (bool, String) {
    let headers = &ctx.response.headers;
    let mut details = Vec::new();
    match headers.get("Cache-Control") {
        Some(value) => details.push(format!("Cache-Control: {}", value)),
        None => details.push("Missing Cache-Control header".to_string()),
    }
    match headers.get("ETag") {
        Some(value) => details.push(format!("ETag: {}", value)),
        None => details.push("Missing ETag header".to_string()),
    }
    (
        headers.contains("Cache-Control") || headers.contains("ETag"),
        details.join("; "),
    )
}

fn check_page_weight(ctx: &CheckContext) -> (bool, String) {
    let mut total = ctx.response.body.len() as u64;
    for resource in resource_urls(ctx.document) {
        let absolute = match ctx.base_url.join(&resource) {
            Ok(url) => url,
            Err(err) => {
                warn!(resource = %resource, error = %err, "skipping unresolvable resource");
                continue;
            }
        };
        // A failed probe contributes 0 bytes; it never aborts the sum.
        match ctx.client.head(absolute.as_str(), true, ctx.probe_timeout) {
            Ok(probe) => total += probe.content_length(),
            Err(err) => {
                warn!(url = %absolute, error = %err, "resource probe failed, counting 0 bytes");
            }
        }
    }
    (
        total <= MAX_PAGE_WEIGHT,
        format!(
            "Total page weight: {:.1} KB (including HTML & resources)",
            total as f64 / 1024.0
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::Headers;

    fn context_parts(html: &str) -> (Document, FetchResult, HttpClient, Url) {
        (
            Document::parse(html),
            FetchResult::new(
                "http://example.com/".to_string(),
                200,
                Headers::new(),
                html.as_bytes().to_vec(),
            ),
            HttpClient::new().unwrap(),
            Url::parse("http://example.com/").unwrap(),
        )
    }

    fn run(html: &str, check: CheckFn) -> (bool, String) {
        let (document, response, client, base_url) = context_parts(html);
        let ctx = CheckContext {
            document: &document,
            response: &response,
            client: &client,
            base_url: &base_url,
            probe_timeout: Duration::from_secs(5),
        };
        check(&ctx)
    }

    #[test]
    fn semantic_html() {
        assert!(run("<header></header><main></main>", check_semantic_html).0);
        assert!(!run("<div></div>", check_semantic_html).0);
    }

    #[test]
    fn schema_markup_json_ld_case_insensitive() {
        for body in [
            r#"{"@context": "https://schema.org"}"#,
            r#"{"@context": "https://Schema.org"}"#,
            r#"{"@context": "HTTPS://SCHEMA.ORG"}"#,
        ] {
            let html = format!(
                r#"<script type="application/ld+json">{}</script>"#,
                body
            );
            let (passed, details) = run(&html, check_schema_markup);
            assert!(passed, "should pass for {}", body);
            assert_eq!(details, "JSON-LD found");
        }
        assert!(!run("<script></script>", check_schema_markup).0);
    }

    #[test]
    fn schema_markup_microdata() {
        let html = r#"<div itemscope itemtype="https://schema.org/Article"></div>"#;
        let (passed, details) = run(html, check_schema_markup);
        assert!(passed);
        assert_eq!(details, "Microdata markup found");

        // itemscope without a schema.org itemtype is not enough
        let html = r#"<div itemscope itemtype="https://example.com/Thing"></div>"#;
        assert!(!run(html, check_schema_markup).0);
    }

    #[test]
    fn schema_markup_both_kinds() {
        let html = r#"<script type="application/ld+json">{"@context":"schema.org"}</script>
                      <div itemscope itemtype="https://schema.org/Article"></div>"#;
        let (passed, details) = run(html, check_schema_markup);
        assert!(passed);
        assert_eq!(details, "JSON-LD found; Microdata markup found");
    }

    #[test]
    fn headings_structure() {
        let (passed, details) = run("<h1>Title</h1><h2>Sub</h2>", check_headings_structure);
        assert!(passed);
        assert_eq!(details, "2 heading tags found.");
        assert!(!run("<div></div>", check_headings_structure).0);
    }

    #[test]
    fn alt_text_no_images_passes() {
        let (passed, details) = run(
            "<html><head></head><body><p>No images here</p></body></html>",
            check_alt_text,
        );
        assert!(passed);
        assert_eq!(details, "No images found.");
    }

    #[test]
    fn alt_text_blank_counts_as_missing() {
        let (passed, details) = run(r#"<img alt=""/>"#, check_alt_text);
        assert!(!passed);
        assert_eq!(details, "1 of 1 images missing alt text.");

        let (passed, details) = run(r#"<img alt="ok"/><img/>"#, check_alt_text);
        assert!(!passed);
        assert_eq!(details, "1 of 2 images missing alt text.");

        assert!(run(r#"<img alt="a dog"/>"#, check_alt_text).0);
    }

    #[test]
    fn lists_and_tables() {
        let (passed, details) = run("<ul><li>A</li></ul><table></table>", check_lists_and_tables);
        assert!(passed);
        assert_eq!(details, "1 lists, 1 tables found.");
        assert!(!run("<div></div>", check_lists_and_tables).0);
    }

    #[test]
    fn language_attribute() {
        assert!(run(r#"<html lang="en"></html>"#, check_language_attribute).0);
        assert!(!run("<html></html>", check_language_attribute).0);
        assert!(!run("<div></div>", check_language_attribute).0);
    }

    #[test]
    fn transcripts_captions() {
        assert!(run("<p>no media</p>", check_transcripts_captions).0);
        assert!(
            run(
                r#"<video aria-label="v"></video><audio aria-label="a"></audio>"#,
                check_transcripts_captions
            )
            .0
        );
        assert!(
            run(
                r#"<video><track kind="captions"/></video>"#,
                check_transcripts_captions
            )
            .0
        );
        assert!(!run("<video></video>", check_transcripts_captions).0);
        // Empty labels do not count.
        assert!(!run(r#"<audio aria-label=""></audio>"#, check_transcripts_captions).0);
    }

    #[test]
    fn viewport_meta() {
        assert!(run(r#"<meta name="viewport" content="width=device-width"/>"#, check_viewport_meta).0);
        assert!(!run("<meta name=\"description\"/>", check_viewport_meta).0);
    }

    #[test]
    fn canonical_link() {
        let (passed, details) = run(
            r#"<link rel="canonical" href="https://example.com/page"/>"#,
            check_canonical_link,
        );
        assert!(passed);
        assert_eq!(details, "Canonical link found: https://example.com/page");
        assert!(!run(r#"<link rel="canonical" href=""/>"#, check_canonical_link).0);
        assert!(!run("<link rel=\"stylesheet\"/>", check_canonical_link).0);
    }

    #[test]
    fn social_meta() {
        let html = r#"<meta property="og:title" content="t"/>
                      <meta property="og:image" content="i"/>
                      <meta name="twitter:card" content="summary"/>"#;
        let (passed, details) = run(html, check_social_meta);
        assert!(passed);
        assert_eq!(details, "2 OpenGraph tags; Twitter Card tag present");

        let (passed, details) = run(r#"<meta property="og:title"/>"#, check_social_meta);
        assert!(!passed);
        assert_eq!(details, "1 OpenGraph tags; Missing Twitter Card tag");

        let (passed, details) = run(r#"<meta name="twitter:card"/>"#, check_social_meta);
        assert!(!passed);
        assert_eq!(details, "Missing OpenGraph tags; Twitter Card tag present");
    }

    #[test]
    fn hreflang_tags() {
        let html = r#"<link rel="alternate" hreflang="en" href="/en"/>
                      <link rel="alternate" hreflang="de" href="/de"/>"#;
        let (passed, details) = run(html, check_hreflang_tags);
        assert!(passed);
        assert_eq!(details, "2 hreflang tags found.");
        assert!(!run(r#"<link rel="alternate" href="/en"/>"#, check_hreflang_tags).0);
    }

    #[test]
    fn resource_count_boundary() {
        let at_limit: String = (0..50)
            .map(|i| format!(r#"<script src="/s{}.js"></script>"#, i))
            .collect();
        let (passed, details) = run(&at_limit, check_resource_count);
        assert!(passed);
        assert_eq!(details, "50 external resources referenced.");

        let over = format!("{}{}", at_limit, r#"<img src="/one-more.png"/>"#);
        let (passed, details) = run(&over, check_resource_count);
        assert!(!passed);
        assert_eq!(details, "51 external resources referenced.");
    }

    #[test]
    fn resource_urls_cover_all_kinds() {
        let html = r#"<script src="a.js"></script>
                      <link rel="stylesheet" href="b.css"/>
                      <link rel="canonical" href="ignored"/>
                      <img src="c.png"/>
                      <video src="d.mp4"></video>
                      <audio src="e.mp3"></audio>
                      <script>inline</script>"#;
        let doc = Document::parse(html);
        assert_eq!(
            resource_urls(&doc),
            vec!["a.js", "b.css", "c.png", "d.mp4", "e.mp3"]
        );
    }

    #[test]
    fn lazy_loading() {
        assert!(run("<p></p>", check_lazy_loading).0);
        // Images without src are not candidates.
        assert!(run("<img alt=\"decorative\"/>", check_lazy_loading).0);

        let (passed, details) = run(
            r#"<img src="a.png" loading="lazy"/><img src="b.png"/>"#,
            check_lazy_loading,
        );
        assert!(!passed);
        assert_eq!(details, "1/2 images lack loading=\"lazy\".");

        let (passed, details) = run(r#"<img src="a.png" loading="lazy"/>"#, check_lazy_loading);
        assert!(passed);
        assert_eq!(details, "0/1 images lack loading=\"lazy\".");
    }

    #[test]
    fn caching_headers() {
        let (document, _, client, base_url) = context_parts("<p></p>");
        let mut headers = Headers::new();
        headers.insert("Cache-Control", "max-age=3600");
        let response = FetchResult::new("http://example.com/".into(), 200, headers, Vec::new());
        let ctx = CheckContext {
            document: &document,
            response: &response,
            client: &client,
            base_url: &base_url,
            probe_timeout: Duration::from_secs(5),
        };
        let (passed, details) = check_caching_headers(&ctx);
        assert!(passed);
        assert_eq!(details, "Cache-Control: max-age=3600; Missing ETag header");

        let (passed, details) = run("<p></p>", check_caching_headers);
        assert!(!passed);
        assert_eq!(details, "Missing Cache-Control header; Missing ETag header");
    }

    #[test]
    fn page_weight_without_resources_is_body_size() {
        let (passed, details) = run("<p>tiny</p>", check_page_weight);
        assert!(passed);
        assert!(details.starts_with("Total page weight: 0.0 KB"));
    }

    #[test]
    fn page_weight_over_threshold_fails() {
        let html = "a".repeat(3 * 1024 * 1024);
        let (passed, _) = run(&html, check_page_weight);
        assert!(!passed);
    }

    #[test]
    fn page_weight_failed_probe_contributes_zero() {
        // Port 9 is expected to refuse the connection; the probe failure must
        // not abort the check and must add nothing to the total.
        let html = r#"<script src="http://127.0.0.1:9/app.js"></script>"#;
        let (passed, details) = run(html, check_page_weight);
        assert!(passed);
        assert_eq!(
            details,
            format!(
                "Total page weight: {:.1} KB (including HTML & resources)",
                html.len() as f64 / 1024.0
            )
        );
    }
}
