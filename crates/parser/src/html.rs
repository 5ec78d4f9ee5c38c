use scraper::{Html, Selector};
use url::Url;

use hiddencrawl_core::MediaRef;

pub struct HtmlResult {
    pub title: String,
    pub body_text: String,
    pub links: Vec<Url>,
    pub media_refs: Vec<MediaRef>,
}

/// Extracts everything the crawler needs from a page: title, visible text, same-page
/// links to follow, and candidate media references to hand to the media pipeline.
pub fn parse_html(html_str: &str, base_url: &Url) -> HtmlResult {
    let document = Html::parse_document(html_str);

    let title = selector("title")
        .and_then(|s| document.select(&s).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "No Title".to_string());

    let body_text = selector("body")
        .and_then(|s| document.select(&s).next())
        .map(|el| {
            el.text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    let links = extract_links(&document, base_url);
    let media_refs = extract_media_refs(&document, base_url);

    HtmlResult {
        title,
        body_text,
        links,
        media_refs,
    }
}

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

fn should_skip_scheme(href: &str) -> bool {
    href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
        || href.starts_with('#')
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<Url> {
    let Some(sel) = selector("a[href]") else {
        return vec![];
    };

    document
        .select(&sel)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            if should_skip_scheme(href) {
                return None;
            }
            base_url.join(href).ok()
        })
        .collect()
}

const MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "svg", "ico", "mp3", "wav", "ogg", "flac", "m4a",
    "aac", "mp4", "webm", "avi", "mov", "mkv", "flv", "pdf", "doc", "docx", "txt", "zip", "rar",
    "7z",
];

fn has_media_extension(url: &Url) -> bool {
    url.path()
        .rsplit('.')
        .next()
        .map(|ext| MEDIA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Media refs come from `img`/`video`/`audio`/`source` tags unconditionally, and from
/// plain `a[href]` links only when the target has a recognized media extension — an
/// ordinary navigation link never becomes a spurious media reference.
fn extract_media_refs(document: &Html, base_url: &Url) -> Vec<MediaRef> {
    let mut refs = Vec::new();

    for (tag, attr) in [("img", "src"), ("video", "src"), ("audio", "src"), ("source", "src")] {
        let Some(sel) = selector(tag) else { continue };
        for el in document.select(&sel) {
            if let Some(src) = el.value().attr(attr) {
                if let Ok(resolved) = base_url.join(src) {
                    refs.push(MediaRef { source_url: resolved });
                }
            }
        }
    }

    if let Some(sel) = selector("a[href]") {
        for el in document.select(&sel) {
            if let Some(href) = el.value().attr("href") {
                if should_skip_scheme(href) {
                    continue;
                }
                if let Ok(resolved) = base_url.join(href) {
                    if has_media_extension(&resolved) {
                        refs.push(MediaRef { source_url: resolved });
                    }
                }
            }
        }
    }

    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://example.onion/page").unwrap()
    }

    #[test]
    fn extracts_title_and_body_text() {
        let html = "<html><head><title> Hi </title></head><body>hello   world</body></html>";
        let result = parse_html(html, &base());
        assert_eq!(result.title, "Hi");
        assert_eq!(result.body_text, "hello world");
    }

    #[test]
    fn skips_non_crawlable_link_schemes() {
        let html = r#"<a href="javascript:void(0)">x</a><a href="mailto:a@b.com">y</a><a href="">w</a><a href="/ok">z</a>"#;
        let result = parse_html(html, &base());
        assert_eq!(result.links.len(), 1);
        assert_eq!(result.links[0].path(), "/ok");
    }

    #[test]
    fn root_link_is_not_skipped() {
        let html = r#"<a href="/">home</a>"#;
        let result = parse_html(html, &base());
        assert_eq!(result.links.len(), 1);
        assert_eq!(result.links[0].path(), "/");
    }

    #[test]
    fn empty_title_falls_back_to_no_title() {
        let html = "<html><head><title></title></head><body>x</body></html>";
        let result = parse_html(html, &base());
        assert_eq!(result.title, "No Title");
    }

    #[test]
    fn img_tags_always_become_media_refs() {
        let html = r#"<img src="/pic.png">"#;
        let result = parse_html(html, &base());
        assert_eq!(result.media_refs.len(), 1);
    }

    #[test]
    fn plain_links_only_become_media_refs_with_a_media_extension() {
        let html = r#"<a href="/doc.pdf">doc</a><a href="/other-page">nav</a>"#;
        let result = parse_html(html, &base());
        assert_eq!(result.media_refs.len(), 1);
        assert!(result.media_refs[0].source_url.path().ends_with(".pdf"));
    }
}
