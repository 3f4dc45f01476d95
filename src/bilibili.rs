//! Bilibili URL Handling
//!
//! Front-end validation of video URLs before a request ever reaches the
//! extraction core.

use regex::Regex;
use std::sync::OnceLock;

static BV_PATTERN: OnceLock<Regex> = OnceLock::new();

fn bv_pattern() -> &'static Regex {
    BV_PATTERN.get_or_init(|| Regex::new(r"/video/(BV\w+)").expect("BV pattern is valid"))
}

/// Extract the BV identifier from a Bilibili video URL
pub fn extract_bvid(url: &str) -> Option<String> {
    bv_pattern()
        .captures(url)
        .map(|captures| captures[1].to_string())
}

/// Validate that a URL is a complete Bilibili video link containing a BV id
pub fn validate_video_url(url: &str) -> Result<(), String> {
    if !url.contains("bilibili.com") {
        return Err("please provide a valid Bilibili video URL".to_string());
    }

    if extract_bvid(url).is_none() {
        return Err(
            "URL format is incorrect, provide a complete Bilibili video link containing a BV id"
                .to_string(),
        );
    }

    Ok(())
}
