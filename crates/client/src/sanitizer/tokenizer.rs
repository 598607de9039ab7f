//! Segment tokenizer
//!
//! One left-to-right pass over the raw text. The scanner is in one of three
//! states: plain `Text`, `InImageSyntax` after a `![`, or `InUrlCandidate`
//! after a scheme prefix that is not glued to a preceding word. Link
//! destinations (`](url)`), code spans and fenced blocks are copied through
//! verbatim; only an unfinished link destination on an image host is masked.

use super::url::{self, UrlClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Text may still grow; unfinished references are masked.
    Streaming,
    /// Text is final; nothing is masked.
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    PlainText(String),
    Placeholder,
    ImageRef(ImageRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
    pub origin: ImageOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOrigin {
    /// Complete `![alt](url)` syntax, kept exactly as written.
    Markdown { source: String },
    /// A bare URL that still has to be wrapped in image syntax.
    BareUrl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    InImageSyntax,
    InUrlCandidate,
}

enum ImageScan {
    Complete { len: usize, url: String },
    /// Syntax runs to the end of the text without closing.
    Unterminated,
    NotImage,
}

pub fn tokenize(text: &str, mode: Mode) -> Vec<Segment> {
    Scanner::new(text, mode).run()
}

struct Scanner<'a> {
    text: &'a str,
    mode: Mode,
    pos: usize,
    state: State,
    segments: Vec<Segment>,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str, mode: Mode) -> Self {
        Self {
            text,
            mode,
            pos: 0,
            state: State::Text,
            segments: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Segment> {
        while self.pos < self.text.len() {
            match self.state {
                State::Text => self.step_text(),
                State::InImageSyntax => self.step_image(),
                State::InUrlCandidate => self.step_url(),
            }
        }
        self.segments
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Segment::PlainText(last)) = self.segments.last_mut() {
            last.push_str(text);
        } else {
            self.segments.push(Segment::PlainText(text.to_string()));
        }
    }

    /// A scheme prefix glued to an ASCII word (`xhttp://`) is not a URL.
    /// Anything else may precede one: whitespace, `(`, or CJK punctuation.
    fn at_candidate_start(&self) -> bool {
        self.text[..self.pos]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_ascii_alphanumeric())
    }

    /// `](dest)` of a Markdown link. The renderer owns the destination.
    fn copy_link_destination(&mut self) {
        let rest = self.rest();
        let dest = &rest[2..];
        let end = dest.find(|c: char| c == ')' || c.is_whitespace());

        self.push_text("](");
        match end {
            Some(len) => {
                self.push_text(&dest[..len]);
                self.pos += 2 + len;
            }
            None => {
                match (self.mode, url::classify(dest)) {
                    (Mode::Streaming, UrlClass::Image | UrlClass::ImageHostCandidate) => {
                        self.segments.push(Segment::Placeholder)
                    }
                    _ => self.push_text(dest),
                }
                self.pos = self.text.len();
            }
        }
    }

    fn step_text(&mut self) {
        let rest = self.rest();

        if rest.starts_with("```") {
            let len = rest[3..].find("```").map_or(rest.len(), |end| end + 6);
            self.push_text(&rest[..len]);
            self.pos += len;
            return;
        }
        if rest.starts_with('`') {
            let len = rest[1..].find('`').map_or(1, |end| end + 2);
            self.push_text(&rest[..len]);
            self.pos += len;
            return;
        }
        if rest.starts_with("![") {
            self.state = State::InImageSyntax;
            return;
        }
        if rest.starts_with("](") && url::scheme_len(&rest[2..]).is_some() {
            self.copy_link_destination();
            return;
        }
        if url::scheme_len(rest).is_some() && self.at_candidate_start() {
            self.state = State::InUrlCandidate;
            return;
        }

        let len = rest.chars().next().map_or(rest.len(), char::len_utf8);
        self.push_text(&rest[..len]);
        self.pos += len;
    }

    fn step_image(&mut self) {
        let rest = self.rest();
        self.state = State::Text;

        match scan_image_syntax(rest) {
            ImageScan::Complete { len, url } => {
                self.segments.push(Segment::ImageRef(ImageRef {
                    url,
                    origin: ImageOrigin::Markdown {
                        source: rest[..len].to_string(),
                    },
                }));
                self.pos += len;
            }
            ImageScan::Unterminated => {
                match self.mode {
                    Mode::Streaming => self.segments.push(Segment::Placeholder),
                    Mode::Final => self.push_text(rest),
                }
                self.pos = self.text.len();
            }
            ImageScan::NotImage => {
                self.push_text("!");
                self.pos += 1;
            }
        }
    }

    fn step_url(&mut self) {
        let rest = self.rest();
        self.state = State::Text;

        let token_len = rest.find(url::ends_token).unwrap_or(rest.len());
        let (candidate, trailing) = url::split_trailing_punctuation(&rest[..token_len]);

        match (url::classify(candidate), self.mode) {
            (UrlClass::Image, _) => self.segments.push(Segment::ImageRef(ImageRef {
                url: candidate.to_string(),
                origin: ImageOrigin::BareUrl,
            })),
            (UrlClass::ImageHostCandidate, Mode::Streaming) => {
                self.segments.push(Segment::Placeholder)
            }
            _ => self.push_text(candidate),
        }
        self.push_text(trailing);
        self.pos += token_len;
    }
}

/// Scan `![alt](dest)` at the start of `s`.
fn scan_image_syntax(s: &str) -> ImageScan {
    let after_bang = &s[2..];

    let Some(close) = after_bang.find(']') else {
        return if after_bang.contains("\n\n") {
            ImageScan::NotImage
        } else {
            ImageScan::Unterminated
        };
    };
    if after_bang[..close].contains("\n\n") {
        return ImageScan::NotImage;
    }

    let after_alt = &after_bang[close + 1..];
    if after_alt.is_empty() {
        return ImageScan::Unterminated;
    }
    let Some(dest_and_rest) = after_alt.strip_prefix('(') else {
        return ImageScan::NotImage;
    };

    match dest_and_rest.find(')') {
        Some(end) => {
            let dest = &dest_and_rest[..end];
            if dest.contains('\n') {
                return ImageScan::NotImage;
            }
            let url = dest.split_whitespace().next().unwrap_or_default();
            ImageScan::Complete {
                len: 2 + close + 1 + 1 + end + 1,
                url: url.to_string(),
            }
        }
        None if dest_and_rest.contains('\n') => ImageScan::NotImage,
        None => ImageScan::Unterminated,
    }
}
