//! Browser-like page warmup.
//!
//! A navigation GET, then subresource fetches in Chrome's loading order:
//! stylesheets and fonts immediately, scripts after a short jitter, images
//! after a longer one. Concurrency is capped at six per batch — Chrome's
//! per-host H1 limit, kept even over H2/H3 because the cadence itself is
//! observable. Subresource failures are silently ignored; bodies are
//! discarded. The point is the accumulated cookies, TLS tickets, and
//! capability records, not the content.

use futures::stream::{self, StreamExt};
use rand::Rng;
use url::Url;

use crate::error::Result;
use crate::request::{FetchMode, Request, SubresourceKind};

use super::Session;

/// Cap on discovered subresources.
pub const MAX_SUBRESOURCES: usize = 50;

/// Chrome's per-host connection limit, reused as the fetch concurrency.
pub const CONCURRENCY_LIMIT: usize = 6;

/// Inter-batch delay bounds in milliseconds: (css+fonts, scripts, images).
pub const BATCH_DELAYS_MS: [(u64, u64); 3] = [(0, 0), (50, 150), (100, 300)];

/// A discovered subresource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subresource {
    pub url: String,
    pub kind: SubresourceKind,
}

pub(super) async fn warmup(session: &Session, url: &str) -> Result<()> {
    // Navigation errors surface; everything below is best-effort.
    let response = session.execute(Request::get(url)).await?;

    let content_type = response.content_type().unwrap_or("");
    if !content_type.contains("text/html") {
        // Still warmed TLS/cookies for the origin.
        return Ok(());
    }

    let page_url = if response.final_url.is_empty() {
        url.to_string()
    } else {
        response.final_url.clone()
    };
    let base = Url::parse(&page_url)?;
    let html = match response.text() {
        Ok(html) => html,
        Err(_) => return Ok(()),
    };

    let batches = plan_batches(&discover(&html, &base));
    for (index, batch) in batches.into_iter().enumerate() {
        if batch.is_empty() {
            continue;
        }
        let (min_ms, max_ms) = BATCH_DELAYS_MS[index];
        if max_ms > 0 {
            let jitter = rand::thread_rng().gen_range(min_ms..=max_ms);
            tokio::time::sleep(std::time::Duration::from_millis(jitter)).await;
        }
        fetch_batch(session, &page_url, batch).await;
    }
    Ok(())
}

async fn fetch_batch(session: &Session, page_url: &str, batch: Vec<Subresource>) {
    stream::iter(batch)
        .for_each_concurrent(CONCURRENCY_LIMIT, |resource| async move {
            let request = Request::get(&resource.url)
                .with_fetch_mode(FetchMode::Subresource(resource.kind))
                .with_page_url(page_url);
            // Discard the response; side effects are already captured.
            if let Err(e) = session.execute(request).await {
                tracing::debug!(url = %resource.url, error = %e, "subresource fetch failed");
            }
        })
        .await;
}

/// Discover subresource URLs in document order, deduplicated and capped.
pub fn discover(html: &str, base: &Url) -> Vec<Subresource> {
    let mut seen: Vec<String> = Vec::new();
    let mut resources = Vec::new();

    for tag in TagScanner::new(html) {
        let kind = match tag.name.as_str() {
            "link" => {
                let rel = tag.attr("rel").unwrap_or_default().to_ascii_lowercase();
                match rel.as_str() {
                    "stylesheet" => Some(SubresourceKind::Style),
                    "icon" => Some(SubresourceKind::Image),
                    "preload" => match tag
                        .attr("as")
                        .unwrap_or_default()
                        .to_ascii_lowercase()
                        .as_str()
                    {
                        "style" => Some(SubresourceKind::Style),
                        "script" => Some(SubresourceKind::Script),
                        "image" => Some(SubresourceKind::Image),
                        "font" => Some(SubresourceKind::Font),
                        _ => None,
                    },
                    _ => None,
                }
                .and_then(|kind| tag.attr("href").map(|href| (href, kind)))
            }
            "script" => tag.attr("src").map(|src| (src, SubresourceKind::Script)),
            "img" => tag.attr("src").map(|src| (src, SubresourceKind::Image)),
            _ => None,
        };

        if let Some((raw, kind)) = kind {
            let Ok(resolved) = base.join(&raw) else {
                continue;
            };
            let resolved = resolved.to_string();
            if seen.contains(&resolved) {
                continue;
            }
            seen.push(resolved.clone());
            resources.push(Subresource {
                url: resolved,
                kind,
            });
            if resources.len() >= MAX_SUBRESOURCES {
                break;
            }
        }
    }
    resources
}

/// Group into Chrome's loading batches:
/// [CSS + fonts] then [scripts] then [images].
pub fn plan_batches(resources: &[Subresource]) -> [Vec<Subresource>; 3] {
    let mut css_and_fonts = Vec::new();
    let mut scripts = Vec::new();
    let mut images = Vec::new();
    for resource in resources {
        match resource.kind {
            SubresourceKind::Style | SubresourceKind::Font => {
                css_and_fonts.push(resource.clone())
            }
            SubresourceKind::Script => scripts.push(resource.clone()),
            SubresourceKind::Image => images.push(resource.clone()),
        }
    }
    [css_and_fonts, scripts, images]
}

/// A start tag with its attributes.
struct Tag {
    name: String,
    attrs: Vec<(String, String)>,
}

impl Tag {
    fn attr(&self, name: &str) -> Option<String> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }
}

/// Minimal HTML start-tag scanner: enough to pull href/src/rel/as out of
/// link, script, and img tags. Comments and scripts' text content are
/// skipped; this is a tokenizer, not a parser.
struct TagScanner<'a> {
    rest: &'a str,
}

impl<'a> TagScanner<'a> {
    fn new(html: &'a str) -> Self {
        Self { rest: html }
    }
}

impl<'a> Iterator for TagScanner<'a> {
    type Item = Tag;

    fn next(&mut self) -> Option<Tag> {
        loop {
            let open = self.rest.find('<')?;
            self.rest = &self.rest[open + 1..];

            if let Some(comment) = self.rest.strip_prefix("!--") {
                let end = comment.find("-->").map(|p| p + 3).unwrap_or(comment.len());
                self.rest = &comment[end..];
                continue;
            }
            if self.rest.starts_with('/') || self.rest.starts_with('!') {
                continue;
            }

            let Some(close) = self.rest.find('>') else {
                self.rest = "";
                return None;
            };
            let tag_text = &self.rest[..close];
            self.rest = &self.rest[close + 1..];

            let tag_text = tag_text.trim_end_matches('/');
            let mut chars = tag_text.char_indices();
            let name_end = chars
                .find(|(_, c)| c.is_whitespace())
                .map(|(i, _)| i)
                .unwrap_or(tag_text.len());
            let name = tag_text[..name_end].to_ascii_lowercase();
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
                continue;
            }

            return Some(Tag {
                name,
                attrs: parse_attrs(&tag_text[name_end..]),
            });
        }
    }
}

fn parse_attrs(mut rest: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return attrs;
        }

        let name_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let name = rest[..name_end].to_ascii_lowercase();
        rest = rest[name_end..].trim_start();

        let value = if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            if let Some(quoted) = after_eq.strip_prefix('"') {
                let end = quoted.find('"').unwrap_or(quoted.len());
                rest = &quoted[(end + 1).min(quoted.len())..];
                quoted[..end].to_string()
            } else if let Some(quoted) = after_eq.strip_prefix('\'') {
                let end = quoted.find('\'').unwrap_or(quoted.len());
                rest = &quoted[(end + 1).min(quoted.len())..];
                quoted[..end].to_string()
            } else {
                let end = after_eq
                    .find(|c: char| c.is_whitespace())
                    .unwrap_or(after_eq.len());
                rest = &after_eq[end..];
                after_eq[..end].to_string()
            }
        } else {
            String::new()
        };

        if !name.is_empty() {
            attrs.push((name, value));
        }
    }
}
