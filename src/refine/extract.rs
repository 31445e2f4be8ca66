// src/refine/extract.rs
// HTML → main article text via spider_transformations Readability.

use once_cell::sync::OnceCell;
use regex::Regex;
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};

use crate::text::tidy_block;

/// Readability extraction; `None` when nothing readable remains.
pub fn extract_article(html: &str, url: Option<&str>) -> Option<String> {
    if html.trim().is_empty() {
        return None;
    }
    let parsed_url = url.and_then(|u| url::Url::parse(u).ok());
    let config = TransformConfig {
        readability: true,
        main_content: true,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: html.as_bytes(),
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };

    let markdown = transform_content_input(input, &config);
    let text = tidy_block(&strip_markdown(&markdown));
    (!text.is_empty()).then_some(text)
}

/// Drop Markdown link/emphasis syntax, keeping the visible words.
pub fn strip_markdown(md: &str) -> String {
    static RE_IMG: OnceCell<Regex> = OnceCell::new();
    static RE_LINK: OnceCell<Regex> = OnceCell::new();
    static RE_MARKS: OnceCell<Regex> = OnceCell::new();
    static RE_HEADING: OnceCell<Regex> = OnceCell::new();

    let re_img = RE_IMG.get_or_init(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
    let re_link = RE_LINK.get_or_init(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
    let re_marks = RE_MARKS.get_or_init(|| Regex::new(r"(\*\*|__|`)").unwrap());
    let re_heading = RE_HEADING.get_or_init(|| Regex::new(r"(?m)^\s{0,3}#{1,6}\s+").unwrap());

    let out = re_img.replace_all(md, "");
    let out = re_link.replace_all(&out, "$1");
    let out = re_marks.replace_all(&out, "");
    re_heading.replace_all(&out, "").into_owned()
}
