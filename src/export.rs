use std::{fmt, io::Cursor, str::FromStr};

use crate::brief::Brief;

pub mod card;
pub mod pdf;

pub const BRAND: &str = "NikharaBrief";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Markdown,
    Image,
    Pdf,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Markdown => "md",
            Self::Image => "png",
            Self::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Text => "text/plain; charset=utf-8",
            Self::Markdown => "text/markdown; charset=utf-8",
            Self::Image => "image/png",
            Self::Pdf => "application/pdf",
        }
    }

    pub fn file_name(&self, brief: &Brief) -> String {
        format!("brief-{}.{}", brief.id, self.extension())
    }

    pub fn render(&self, brief: &Brief) -> anyhow::Result<Vec<u8>> {
        match self {
            Self::Text => Ok(to_text(brief).into_bytes()),
            Self::Markdown => Ok(to_markdown(brief).into_bytes()),
            Self::Image => to_png(brief),
            Self::Pdf => to_pdf(brief),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "txt" | "text" => Ok(Self::Text),
            "md" | "markdown" => Ok(Self::Markdown),
            "png" | "image" => Ok(Self::Image),
            "pdf" => Ok(Self::Pdf),
            _ => Err(anyhow::anyhow!(
                "Unknown export format {s:?}, expected txt, md, png or pdf"
            )),
        }
    }
}

/// Drops every `*`, for fields shown without emphasis.
pub fn strip_asterisks(s: &str) -> String {
    s.replace('*', "")
}

fn sections(brief: &Brief) -> [(&'static str, String); 7] {
    [
        ("Company Name", strip_asterisks(&brief.company_name)),
        ("Company Description", brief.company_description.clone()),
        ("Project Description", brief.project_description.clone()),
        ("Deadline", strip_asterisks(&brief.deadline)),
        ("Category", brief.category.clone()),
        ("Niche", brief.niche.clone()),
        ("Industry", brief.industry.clone()),
    ]
}

fn format_document(brief: &Brief, title: &str, header: &str) -> String {
    let mut out = format!("{title}Brief ID: {}\n\n", brief.id);
    for (label, value) in sections(brief) {
        out.push_str(&format!("{header}{label} : {value}\n\n"));
    }
    out
}

pub fn to_text(brief: &Brief) -> String {
    format_document(brief, &format!("{BRAND}\n"), "")
}

pub fn to_markdown(brief: &Brief) -> String {
    format_document(brief, &format!("# {BRAND}\n\n"), "## ")
}

pub fn to_png(brief: &Brief) -> anyhow::Result<Vec<u8>> {
    let raster = card::rasterize(brief)?;
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(raster)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

pub fn to_pdf(brief: &Brief) -> anyhow::Result<Vec<u8>> {
    let raster = card::rasterize(brief)?;
    let rgb = image::DynamicImage::ImageRgba8(raster).to_rgb8();
    pdf::from_raster(&rgb)
}
