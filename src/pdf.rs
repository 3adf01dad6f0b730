//! Minimal paginated PDF writer for text documents.
//!
//! Supports left-aligned and centered text lines in the two standard
//! Helvetica faces, multi-column lines at fixed x offsets, and vertical
//! gaps. Lines flow top to bottom and break onto a new page when they would
//! cross the bottom margin.

use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub x: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// One line of text. A centered line carries a single cell whose `x` is
    /// ignored.
    Line {
        font: Font,
        size: f64,
        cells: Vec<Cell>,
        centered: bool,
    },
    Gap(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub width: f64,
    pub height: f64,
    pub margin: f64,
}

impl Default for PageLayout {
    /// US Letter with 50pt margins.
    fn default() -> Self {
        Self {
            width: 612.0,
            height: 792.0,
            margin: 50.0,
        }
    }
}

const LINE_SPACING: f64 = 1.35;
/// Average Helvetica advance width as a fraction of the font size.
const AVG_CHAR_WIDTH: f64 = 0.52;

#[derive(Debug, Clone, Default)]
pub struct Document {
    pub layout: PageLayout,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq)]
struct Placed<'a> {
    baseline: f64,
    font: Font,
    size: f64,
    cells: &'a [Cell],
    centered: bool,
}

impl Document {
    pub fn new(layout: PageLayout) -> Self {
        Self {
            layout,
            blocks: Vec::new(),
        }
    }

    pub fn text(&mut self, font: Font, size: f64, text: impl Into<String>) -> &mut Self {
        let x = self.layout.margin;
        self.blocks.push(Block::Line {
            font,
            size,
            cells: vec![Cell { x, text: text.into() }],
            centered: false,
        });
        self
    }

    pub fn centered(&mut self, font: Font, size: f64, text: impl Into<String>) -> &mut Self {
        self.blocks.push(Block::Line {
            font,
            size,
            cells: vec![Cell { x: 0.0, text: text.into() }],
            centered: true,
        });
        self
    }

    pub fn columns(&mut self, font: Font, size: f64, cells: Vec<Cell>) -> &mut Self {
        self.blocks.push(Block::Line {
            font,
            size,
            cells,
            centered: false,
        });
        self
    }

    pub fn gap(&mut self, height: f64) -> &mut Self {
        self.blocks.push(Block::Gap(height));
        self
    }

    fn paginate(&self) -> Vec<Vec<Placed<'_>>> {
        let top = self.layout.height - self.layout.margin;
        let bottom = self.layout.margin;
        let mut pages: Vec<Vec<Placed<'_>>> = vec![Vec::new()];
        let mut y = top;
        for block in &self.blocks {
            match block {
                Block::Gap(h) => {
                    // Gaps never open a page or push onto a new one.
                    if y < top {
                        y = (y - h).max(bottom);
                    }
                }
                Block::Line {
                    font,
                    size,
                    cells,
                    centered,
                } => {
                    let advance = size * LINE_SPACING;
                    if y - advance < bottom && y < top {
                        pages.push(Vec::new());
                        y = top;
                    }
                    if let Some(page) = pages.last_mut() {
                        page.push(Placed {
                            baseline: y - size,
                            font: *font,
                            size: *size,
                            cells,
                            centered: *centered,
                        });
                    }
                    y -= advance;
                }
            }
        }
        pages
    }

    pub fn page_count(&self) -> usize {
        self.paginate().len()
    }

    fn content_stream(&self, placed: &[Placed<'_>]) -> String {
        let mut out = String::new();
        for line in placed {
            for cell in line.cells {
                let x = if line.centered {
                    let w = cell.text.chars().count() as f64 * line.size * AVG_CHAR_WIDTH;
                    ((self.layout.width - w) / 2.0).max(self.layout.margin)
                } else {
                    cell.x
                };
                let _ = writeln!(
                    out,
                    "BT /{} {} Tf {:.2} {:.2} Td ({}) Tj ET",
                    line.font.resource(),
                    line.size,
                    x,
                    line.baseline,
                    escape_text(&cell.text)
                );
            }
        }
        out
    }

    /// Serializes the document as PDF 1.4 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let pages = self.paginate();
        let mut objects: Vec<String> = Vec::new();
        let page_count = pages.len();
        // 1 catalog, 2 page tree, 3-4 fonts, then a (page, contents) pair per page.
        let kids: Vec<String> = (0..page_count)
            .map(|i| format!("{} 0 R", 5 + 2 * i))
            .collect();
        objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
        objects.push(format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            page_count
        ));
        objects.push(
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_string(),
        );
        objects.push(
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
                .to_string(),
        );
        for (i, placed) in pages.iter().enumerate() {
            let contents_id = 6 + 2 * i;
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
                 /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
                self.layout.width, self.layout.height, contents_id
            ));
            let stream = self.content_stream(placed);
            objects.push(format!(
                "<< /Length {} >>\nstream\n{}endstream",
                stream.len(),
                stream
            ));
        }

        let mut out: Vec<u8> = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n");
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref_at = out.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for off in offsets {
            let _ = writeln!(xref, "{:010} 00000 n ", off);
        }
        out.extend_from_slice(xref.as_bytes());
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref_at
            )
            .as_bytes(),
        );
        out
    }
}

/// PDF literal string body. Latin-1 characters become octal escapes for
/// WinAnsiEncoding; anything outside it is replaced with `?`.
fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            c if (' '..='~').contains(&c) => out.push(c),
            c if ('\u{a0}'..='\u{ff}').contains(&c) => {
                let _ = write!(out, "\\{:03o}", c as u32);
            }
            _ => out.push('?'),
        }
    }
    out
}
