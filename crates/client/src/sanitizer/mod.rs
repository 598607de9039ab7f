//! Streaming content sanitizer
//!
//! Turns the raw accumulated text of a message into display-safe Markdown.
//! While a message is streaming, any image reference that may still be cut
//! off mid-token is replaced by [`IMAGE_PLACEHOLDER`]; bare image URLs are
//! rewritten as Markdown image syntax so the renderer shows them. Once the
//! message is final, [`finalize`] runs the same pass with masking disabled.
//!
//! Output contract: every image reference in the result is either complete
//! `![alt](url)` syntax or the placeholder while streaming. Both passes are
//! pure functions of the raw text.

pub mod render;
pub mod tokenizer;
pub mod url;

pub use render::{render, GENERATED_IMAGE_ALT, IMAGE_PLACEHOLDER};
pub use tokenizer::{tokenize, ImageOrigin, ImageRef, Mode, Segment};

/// Result of one streaming pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sanitized {
    pub display: String,
    /// Complete image URLs found bare in this pass (not already written as
    /// Markdown image syntax), in order of first appearance.
    pub detected_images: Vec<String>,
}

pub fn sanitize_streaming(raw: &str) -> Sanitized {
    let segments = tokenize(raw, Mode::Streaming);
    Sanitized {
        display: render(&segments),
        detected_images: bare_image_urls(&segments),
    }
}

/// Final reconciliation pass. Idempotent: `finalize(&finalize(x)) == finalize(x)`.
pub fn finalize(raw: &str) -> String {
    render(&tokenize(raw, Mode::Final))
}

fn bare_image_urls(segments: &[Segment]) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for segment in segments {
        if let Segment::ImageRef(ImageRef {
            url,
            origin: ImageOrigin::BareUrl,
        }) = segment
        {
            if !urls.contains(url) {
                urls.push(url.clone());
            }
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_markdown_image_is_masked_then_rendered() {
        let partial = "![pic](http://img.example.com/cat.p";
        let masked = sanitize_streaming(partial);
        assert!(masked.display.contains(IMAGE_PLACEHOLDER));
        assert!(!masked.display.contains("!["));
        assert!(!masked.display.contains("http://"));

        let completed = format!("{partial}ng)");
        let shown = sanitize_streaming(&completed);
        assert_eq!(shown.display, "![pic](http://img.example.com/cat.png)");
        assert!(shown.detected_images.is_empty());
    }

    #[test]
    fn bare_image_url_is_wrapped_and_detected() {
        let raw = "Here you go: https://img.example.com/out/cat.png\nEnjoy";
        let out = sanitize_streaming(raw);
        assert_eq!(
            out.display,
            "Here you go: ![generated image](https://img.example.com/out/cat.png)\nEnjoy"
        );
        assert_eq!(
            out.detected_images,
            vec!["https://img.example.com/out/cat.png".to_string()]
        );
    }

    #[test]
    fn rewrite_does_not_double_wrap() {
        let once = sanitize_streaming("a https://img.example.com/out/cat.png b").display;
        let twice = sanitize_streaming(&once);
        assert_eq!(twice.display, once);
        assert!(twice.detected_images.is_empty());
    }

    #[test]
    fn ordinary_links_pass_through() {
        let raw = "Docs: https://docs.rs/tokio/latest/tokio/ and more";
        assert_eq!(sanitize_streaming(raw).display, raw);
        assert_eq!(finalize(raw), raw);
    }

    #[test]
    fn finalize_converts_image_urls_on_any_host() {
        let raw = "done https://example.org/renders/plot.svg";
        assert_eq!(
            finalize(raw),
            "done ![generated image](https://example.org/renders/plot.svg)"
        );
    }

    #[test]
    fn finalize_never_emits_placeholders() {
        let raw = "wait ![chart](https://cdn.example.com/ch and https://img.example.com/x";
        let out = finalize(raw);
        assert!(!out.contains(IMAGE_PLACEHOLDER));
        assert_eq!(out, raw);
    }

    #[test]
    fn finalize_is_idempotent() {
        for raw in [
            "",
            "plain",
            "see https://img.example.com/a/cat.png.",
            "![ok](https://example.com/x.png) then https://example.com/y.jpg?size=2",
            "broken ![x](https://img.example.com/y",
            "```\nhttps://img.example.com/a/cat.png\n```",
        ] {
            let once = finalize(raw);
            assert_eq!(finalize(&once), once, "{raw}");
        }
    }

    #[test]
    fn no_streaming_prefix_shows_a_bare_image_host_url() {
        let full = "生成的图片：https://image.example.com/gen/42.webp";
        let url_start = full.find("https://").unwrap();
        for end in url_start + 1..full.len() {
            if full.is_char_boundary(end) {
                let shown = sanitize_streaming(&full[..end]).display;
                assert!(!shown.contains("image.example.com/gen/4"), "{shown}");
            }
        }
        assert_eq!(
            finalize(full),
            "生成的图片：![generated image](https://image.example.com/gen/42.webp)"
        );
    }
}
