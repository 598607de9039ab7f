//! Bare URL classification.

use once_cell::sync::Lazy;
use regex::Regex;

pub const SCHEMES: [&str; 2] = ["http://", "https://"];

/// Shorter candidates are left alone; they are too short to tell apart.
pub const MIN_CANDIDATE_LEN: usize = 20;

/// Substrings that mark a URL as probably pointing at an image host.
pub const IMAGE_HOST_KEYWORDS: [&str; 8] = [
    "image",
    "img",
    "photo",
    "picture",
    "pollinations",
    "dashscope",
    "aliyuncs",
    "cdn",
];

/// Full-width punctuation never appears raw inside a URL, so it ends one
/// even when no space follows.
const FULLWIDTH_TERMINATORS: &[char] = &[
    '，', '。', '、', '；', '：', '！', '？', '）', '（', '」', '「', '』', '《', '》', '【', '】',
];

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '\'', '"'];

static COMPLETE_IMAGE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^https?://[a-z0-9](?:[a-z0-9.-]*[a-z0-9])?(?::\d+)?/[^\s?#]*\.(?:png|jpe?g|gif|webp|bmp|svg)(?:\?[^\s#]*)?$",
    )
    .expect("image url pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlClass {
    /// Scheme, host, path and a recognized image extension.
    Image,
    /// Not (yet) an image URL, but served from an image host.
    ImageHostCandidate,
    /// Ordinary link or text.
    Other,
}

pub fn classify(url: &str) -> UrlClass {
    if url.chars().count() < MIN_CANDIDATE_LEN {
        return UrlClass::Other;
    }
    if COMPLETE_IMAGE_URL.is_match(url) {
        return UrlClass::Image;
    }

    let rest = scheme_len(url).map_or(url, |len| &url[len..]);
    let rest = rest.to_ascii_lowercase();
    if IMAGE_HOST_KEYWORDS.iter().any(|kw| rest.contains(kw)) {
        UrlClass::ImageHostCandidate
    } else {
        UrlClass::Other
    }
}

/// Byte length of the scheme prefix `s` starts with, if any.
pub fn scheme_len(s: &str) -> Option<usize> {
    SCHEMES
        .iter()
        .find(|scheme| starts_with_ignore_case(s, scheme))
        .map(|scheme| scheme.len())
}

/// Whether `c` ends a bare URL token.
pub fn ends_token(c: char) -> bool {
    c.is_whitespace() || FULLWIDTH_TERMINATORS.contains(&c)
}

/// Split sentence punctuation off the end of a URL token.
pub fn split_trailing_punctuation(token: &str) -> (&str, &str) {
    let url = token.trim_end_matches(TRAILING_PUNCTUATION);
    token.split_at(url.len())
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}
