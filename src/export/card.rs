//! The brief as an image: an SVG card laid out here and rasterized with
//! resvg. The PDF export embeds the same raster.

use std::sync::{Arc, LazyLock};

use resvg::{tiny_skia, usvg};

use crate::brief::Brief;

use super::{strip_asterisks, BRAND};

pub const WIDTH: u32 = 800;

const BACKGROUND: &str = "#0D141C";
const PANEL: &str = "#141C26";
const ACCENT: &str = "#1E88E5";
const TEXT: &str = "#E6EDF3";
const MUTED: &str = "#8B98A5";
const FONT: &str = "Inter, Poppins, DejaVu Sans, Arial, sans-serif";

const MARGIN: u32 = 40;
const PADDING: u32 = 30;
const BODY_SIZE: u32 = 14;
const LINE_HEIGHT: u32 = 21;
// Average advance of the body font, in px.
const CHAR_WIDTH: f32 = 7.4;

static FONTS: LazyLock<Arc<usvg::fontdb::Database>> = LazyLock::new(|| {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    Arc::new(db)
});

pub struct Card {
    pub svg: String,
    pub height: u32,
}

/// A run of text sharing one weight.
#[derive(Debug, Clone, PartialEq)]
struct Span {
    text: String,
    bold: bool,
}

/// Splits `**x**` and `*x*` emphasis into bold runs, markers removed.
fn spans(text: &str) -> Vec<Span> {
    let mut out: Vec<Span> = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let Some(start) = rest.find('*') else {
            push_span(&mut out, rest, false);
            break;
        };
        push_span(&mut out, &rest[..start], false);
        let marker = if rest[start..].starts_with("**") { "**" } else { "*" };
        let body = &rest[start + marker.len()..];
        match body.find(marker) {
            Some(end) if end > 0 => {
                push_span(&mut out, &body[..end], true);
                rest = &body[end + marker.len()..];
            }
            _ => {
                // Unmatched marker, shown as is.
                push_span(&mut out, marker, false);
                rest = body;
            }
        }
    }
    out
}

fn push_span(out: &mut Vec<Span>, text: &str, bold: bool) {
    if text.is_empty() {
        return;
    }
    match out.last_mut() {
        Some(last) if last.bold == bold => last.text.push_str(text),
        _ => out.push(Span {
            text: text.to_string(),
            bold,
        }),
    }
}

/// Greedy word wrap over styled spans. Each paragraph starts a new line.
fn wrap(text: &str, max_chars: usize) -> Vec<Vec<Span>> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line: Vec<Span> = Vec::new();
        let mut len = 0;
        for span in spans(paragraph) {
            for word in span.text.split_whitespace() {
                let chars = word.chars().count();
                if len > 0 && len + 1 + chars > max_chars {
                    lines.push(std::mem::take(&mut line));
                    len = 0;
                }
                if len > 0 {
                    // Spaces inside a bold run stay bold.
                    let joined = span.bold && line.last().is_some_and(|s| s.bold);
                    push_span(&mut line, " ", joined);
                    len += 1;
                }
                push_span(&mut line, word, span.bold);
                len += chars;
            }
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

struct Canvas {
    body: String,
    y: u32,
    x: u32,
    width: u32,
}

impl Canvas {
    fn text(&mut self, size: u32, color: &str, bold: bool, text: &str) {
        self.y += size + size / 2;
        let weight = if bold { "bold" } else { "normal" };
        self.body.push_str(&format!(
            r#"<text x="{}" y="{}" font-size="{size}" font-weight="{weight}" fill="{color}">{}</text>"#,
            self.x,
            self.y,
            escape(text)
        ));
    }

    fn rich(&mut self, text: &str) {
        let max_chars = (self.width as f32 / CHAR_WIDTH) as usize;
        for line in wrap(text, max_chars) {
            self.y += LINE_HEIGHT;
            self.body.push_str(&format!(
                r#"<text x="{}" y="{}" font-size="{BODY_SIZE}" fill="{TEXT}" xml:space="preserve">"#,
                self.x, self.y
            ));
            for span in line {
                if span.bold {
                    self.body.push_str(&format!(
                        r#"<tspan font-weight="bold">{}</tspan>"#,
                        escape(&span.text)
                    ));
                } else {
                    self.body.push_str(&escape(&span.text));
                }
            }
            self.body.push_str("</text>");
        }
    }

    fn chips(&mut self, tags: &[&str]) {
        self.y += 12;
        let mut x = self.x;
        let height = 24;
        for tag in tags.iter().filter(|t| !t.is_empty()) {
            let w = (tag.chars().count() as f32 * 6.8) as u32 + 20;
            if x > self.x && x + w > self.x + self.width {
                x = self.x;
                self.y += height + 8;
            }
            self.body.push_str(&format!(
                r#"<rect x="{x}" y="{}" width="{w}" height="{height}" rx="12" fill="{ACCENT}" fill-opacity="0.18" stroke="{ACCENT}"/><text x="{}" y="{}" font-size="12" fill="{TEXT}">{}</text>"#,
                self.y,
                x + 10,
                self.y + 16,
                escape(tag)
            ));
            x += w + 8;
        }
        self.y += height;
    }

    fn rule(&mut self) {
        self.y += 16;
        self.body.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{MUTED}" stroke-opacity="0.4"/>"#,
            self.x,
            self.y,
            self.x + self.width,
            self.y
        ));
    }

    fn section(&mut self, label: &str, value: &str) {
        self.y += 12;
        self.text(16, ACCENT, true, label);
        self.rich(value);
    }
}

pub fn layout(brief: &Brief) -> Card {
    let inner_x = MARGIN + PADDING;
    let mut canvas = Canvas {
        body: String::new(),
        y: MARGIN,
        x: inner_x,
        width: WIDTH - 2 * inner_x,
    };

    canvas.text(24, TEXT, true, BRAND);
    canvas.text(14, MUTED, false, &format!("Brief ID: {}", brief.id));
    let mut tags = vec![
        brief.category.as_str(),
        brief.niche.as_str(),
        brief.industry.as_str(),
    ];
    tags.extend(brief.keywords.iter().map(String::as_str));
    canvas.chips(&tags);
    canvas.rule();
    canvas.section("Company Name", &strip_asterisks(&brief.company_name));
    canvas.section("Company Description", &brief.company_description);
    canvas.section("Project Description", &brief.project_description);
    canvas.section("Deadline", &strip_asterisks(&brief.deadline));

    let panel_bottom = canvas.y + PADDING;
    let height = panel_bottom + MARGIN;
    let svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{height}" viewBox="0 0 {WIDTH} {height}" font-family="{FONT}"><rect width="100%" height="100%" fill="{BACKGROUND}"/><rect x="{MARGIN}" y="{MARGIN}" width="{}" height="{}" rx="8" fill="{PANEL}" stroke="{ACCENT}"/>{}</svg>"#,
        WIDTH - 2 * MARGIN,
        panel_bottom - MARGIN,
        canvas.body
    );
    Card { svg, height }
}

pub fn rasterize(brief: &Brief) -> anyhow::Result<image::RgbaImage> {
    let card = layout(brief);
    let mut opt = usvg::Options::default();
    opt.fontdb = FONTS.clone();
    let tree = usvg::Tree::from_str(&card.svg, &opt)?;
    let size = tree.size().to_int_size();
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow::anyhow!("Invalid card size {size:?}"))?;
    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());
    image::RgbaImage::from_raw(size.width(), size.height(), pixmap.take())
        .ok_or_else(|| anyhow::anyhow!("Raster buffer does not match card size"))
}

#[cfg(test)]
mod tests {
    use crate::export::tests::sample;

    use super::*;

    fn bold(text: &str) -> Span {
        Span {
            text: text.into(),
            bold: true,
        }
    }

    fn plain(text: &str) -> Span {
        Span {
            text: text.into(),
            bold: false,
        }
    }

    #[test]
    fn emphasis_becomes_bold_runs() {
        assert_eq!(
            spans("a **b** c *d* e"),
            vec![plain("a "), bold("b"), plain(" c "), bold("d"), plain(" e")]
        );
        assert_eq!(spans("2 * 3"), vec![plain("2 * 3")]);
    }

    #[test]
    fn wrapping_respects_width_and_paragraphs() {
        let lines = wrap("one two three four\nfive", 9);
        let text: Vec<String> = lines
            .iter()
            .map(|l| l.iter().map(|s| s.text.as_str()).collect())
            .collect();
        assert_eq!(text, vec!["one two", "three", "four", "five"]);
    }

    #[test]
    fn svg_content() {
        let card = layout(&sample());
        assert!(card.svg.contains(r#"<tspan font-weight="bold">family bakery</tspan>"#));
        assert!(card.svg.contains("&lt;since 1952&gt;"));
        assert!(card.svg.contains(">Crumb &amp; Co</text>"));
        assert!(card.svg.contains(">2 Weeks</text>"));
        assert!(card.svg.contains(&format!(r#"height="{}""#, card.height)));
    }

    #[test]
    fn longer_descriptions_make_taller_cards() {
        let short = layout(&sample()).height;
        let mut brief = sample();
        brief.project_description = "word ".repeat(400);
        assert!(layout(&brief).height > short);
    }
}
