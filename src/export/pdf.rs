//! Single-page PDF holding one JPEG, with the page sized to the image at
//! 96 dpi so the card prints at its on-screen size.

use image::{codecs::jpeg::JpegEncoder, RgbImage};

const JPEG_QUALITY: u8 = 95;
const MM_PER_PX: f64 = 0.264583;
const PT_PER_MM: f64 = 72.0 / 25.4;

pub fn page_size(width_px: u32, height_px: u32) -> (f64, f64) {
    let pt = |px: u32| f64::from(px) * MM_PER_PX * PT_PER_MM;
    (pt(width_px), pt(height_px))
}

pub fn from_raster(raster: &RgbImage) -> anyhow::Result<Vec<u8>> {
    let (width, height) = raster.dimensions();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(raster)?;

    let (page_w, page_h) = page_size(width, height);
    let content = format!("q {page_w:.2} 0 0 {page_h:.2} 0 0 cm /Im0 Do Q");

    let mut doc = Document::default();
    doc.object(b"<< /Type /Catalog /Pages 2 0 R >>");
    doc.object(b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    doc.object(
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {page_w:.2} {page_h:.2}] \
            /Resources << /XObject << /Im0 4 0 R >> >> /Contents 5 0 R >>"
        )
        .as_bytes(),
    );
    doc.stream(
        &format!(
            "/Type /XObject /Subtype /Image /Width {width} /Height {height} \
            /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /DCTDecode"
        ),
        &jpeg,
    );
    doc.stream("", content.as_bytes());
    Ok(doc.finish())
}

/// Objects are numbered from 1 in the order they are added; object 1 is
/// the catalog.
struct Document {
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            buf: b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec(),
            offsets: Vec::new(),
        }
    }
}

impl Document {
    fn begin(&mut self) {
        self.offsets.push(self.buf.len());
        let n = self.offsets.len();
        self.buf.extend_from_slice(format!("{n} 0 obj\n").as_bytes());
    }

    fn object(&mut self, dict: &[u8]) {
        self.begin();
        self.buf.extend_from_slice(dict);
        self.buf.extend_from_slice(b"\nendobj\n");
    }

    fn stream(&mut self, dict_entries: &str, data: &[u8]) {
        self.begin();
        let sep = if dict_entries.is_empty() { "" } else { " " };
        self.buf.extend_from_slice(
            format!("<< {dict_entries}{sep}/Length {} >>\nstream\n", data.len())
                .as_bytes(),
        );
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
    }

    fn finish(mut self) -> Vec<u8> {
        let xref = self.buf.len();
        let count = self.offsets.len() + 1;
        let mut table = format!("xref\n0 {count}\n0000000000 65535 f \n");
        for offset in &self.offsets {
            table.push_str(&format!("{offset:010} 00000 n \n"));
        }
        table.push_str(&format!(
            "trailer\n<< /Size {count} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n"
        ));
        self.buf.extend_from_slice(table.as_bytes());
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    #[test]
    fn card_width_is_600_points() {
        let (w, h) = page_size(800, 400);
        assert_eq!(format!("{w:.2} {h:.2}"), "600.00 300.00");
    }

    #[test]
    fn xref_points_at_each_object() {
        let raster = RgbImage::from_pixel(16, 8, image::Rgb([13, 20, 28]));
        let pdf = from_raster(&raster).unwrap();
        assert!(pdf.ends_with(b"%%EOF\n"));

        let xref = find(&pdf, b"xref\n0 6\n").unwrap();
        let tail = String::from_utf8_lossy(&pdf[xref..]).to_string();
        let startxref: usize = tail
            .split("startxref\n")
            .nth(1)
            .and_then(|s| s.lines().next())
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(startxref, xref);

        let entries: Vec<usize> = tail
            .lines()
            .skip(3)
            .take(5)
            .map(|l| l[..10].parse().unwrap())
            .collect();
        for (i, offset) in entries.iter().enumerate() {
            let header = format!("{} 0 obj\n", i + 1);
            assert!(pdf[*offset..].starts_with(header.as_bytes()), "{header}");
        }

        assert!(find(&pdf, b"/Width 16 /Height 8").is_some());
        assert!(find(&pdf, b"/Filter /DCTDecode").is_some());
        // JPEG start-of-image marker right after the stream keyword.
        assert!(find(&pdf, b"stream\n\xFF\xD8").is_some());
    }
}
