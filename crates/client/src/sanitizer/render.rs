//! Segment renderer: typed segments back to display-safe Markdown.

use super::tokenizer::{ImageOrigin, Segment};

/// Shown in place of an image reference that is still arriving.
pub const IMAGE_PLACEHOLDER: &str = "*(image loading…)*";

/// Alt text used when a bare image URL is rewritten as Markdown.
pub const GENERATED_IMAGE_ALT: &str = "generated image";

pub fn render(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::PlainText(text) => out.push_str(text),
            Segment::Placeholder => out.push_str(IMAGE_PLACEHOLDER),
            Segment::ImageRef(image) => match &image.origin {
                ImageOrigin::Markdown { source } => out.push_str(source),
                ImageOrigin::BareUrl => {
                    out.push_str("![");
                    out.push_str(GENERATED_IMAGE_ALT);
                    out.push_str("](");
                    out.push_str(&image.url);
                    out.push(')');
                }
            },
        }
    }
    out
}
