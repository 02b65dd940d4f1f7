//! PDF rendering of the final client letter
//!
//! The letter is laid out on A4 pages with the standard Helvetica fonts, so no
//! font file is embedded. Text is written in WinAnsi (Windows-1252) encoding;
//! typographic characters outside it are mapped to plain equivalents first.
//! Light markdown in LLM-drafted letters (headings, bullets, rules, tables,
//! `**bold**`) is rendered; anything else is printed as a paragraph.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use encoding_rs::WINDOWS_1252;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::fs;
use std::path::Path;
use tracing::info;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN_X: f32 = 56.0;
const CONTENT_TOP: f32 = 740.0;
const CONTENT_BOTTOM: f32 = 80.0;
const BODY_SIZE: f32 = 11.0;

/// Average Helvetica glyph width as a fraction of the font size
const AVG_GLYPH_WIDTH: f32 = 0.52;

const BRAND: &str = "ASSESSORIA DE INVESTIMENTOS";
const SUBTITLE: &str = "Carta de recomendação";

type Rgb = (f32, f32, f32);
const AMBER: Rgb = (0.98, 0.75, 0.14);
const GRAY: Rgb = (0.42, 0.45, 0.50);
const INK: Rgb = (0.12, 0.16, 0.22);
const LIGHT: Rgb = (0.85, 0.86, 0.88);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
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
enum Block {
    Heading(u8, String),
    Paragraph(String),
    Bullet(String),
    TableRow { cells: Vec<String>, header: bool },
    Rule,
    Blank,
}

/// Write `letter` as a PDF file, creating parent directories as needed
pub fn export_letter_pdf(letter: &str, path: &Path) -> Result<()> {
    let bytes = render_letter_pdf(letter, Local::now().naive_local())?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(path, &bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("PDF exported to {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// Render `letter` to PDF bytes; `generated_at` is printed in every footer
pub fn render_letter_pdf(letter: &str, generated_at: NaiveDateTime) -> Result<Vec<u8>> {
    let mut layout = Layout::new();
    for block in parse_blocks(letter) {
        layout.block(&block);
    }
    let pages = layout.finish(generated_at);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations }
            .encode()
            .context("Failed to encode page content")?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    let media_box: Vec<Object> = vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()];
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => media_box,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(win_ansi(SUBTITLE)),
        "Creator" => Object::string_literal("advisor"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).context("Failed to serialise PDF")?;
    Ok(bytes)
}

/// Replace characters WinAnsi cannot carry, then encode
fn win_ansi(text: &str) -> Vec<u8> {
    let plain: String = text
        .chars()
        .flat_map(|c| match c {
            '\u{2022}' | '\u{2013}' | '\u{2014}' => vec!['-'],
            '\u{2018}' | '\u{2019}' => vec!['\''],
            '\u{201c}' | '\u{201d}' => vec!['"'],
            '\u{2026}' => vec!['.', '.', '.'],
            '\u{00a0}' | '\t' => vec![' '],
            other => vec![other],
        })
        .collect();
    let (bytes, _, _) = WINDOWS_1252.encode(&plain);
    bytes.into_owned()
}

fn strip_emphasis(text: &str) -> String {
    text.replace("**", "").replace("__", "")
}

fn is_table_separator(line: &str) -> bool {
    line.starts_with('|') && line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

fn parse_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut in_table = false;

    for line in text.lines() {
        let line = line.trim();
        if is_table_separator(line) {
            continue;
        }

        let block = if let Some(rest) = line.strip_prefix("### ") {
            Block::Heading(3, strip_emphasis(rest))
        } else if let Some(rest) = line.strip_prefix("## ") {
            Block::Heading(2, strip_emphasis(rest))
        } else if let Some(rest) = line.strip_prefix("# ") {
            Block::Heading(1, strip_emphasis(rest))
        } else if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
            Block::Bullet(strip_emphasis(rest))
        } else if line.starts_with("---") || line.starts_with("___") {
            Block::Rule
        } else if line.starts_with('|') {
            let cells = line
                .trim_matches('|')
                .split('|')
                .map(|cell| strip_emphasis(cell.trim()))
                .collect();
            Block::TableRow {
                cells,
                header: !in_table,
            }
        } else if line.is_empty() {
            Block::Blank
        } else {
            Block::Paragraph(strip_emphasis(line))
        };

        in_table = matches!(block, Block::TableRow { .. });
        blocks.push(block);
    }

    blocks
}

fn chars_per_line(width: f32, size: f32) -> usize {
    ((width / (size * AVG_GLYPH_WIDTH)) as usize).max(1)
}

/// Greedy word wrap; words longer than a line are split
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

fn color(op: &str, (r, g, b): Rgb) -> Operation {
    Operation::new(op, vec![r.into(), g.into(), b.into()])
}

/// Page-by-page content streams with a moving cursor
struct Layout {
    pages: Vec<Vec<Operation>>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        let mut layout = Self {
            pages: Vec::new(),
            y: CONTENT_TOP,
        };
        layout.new_page();
        layout
    }

    fn ops(&mut self) -> &mut Vec<Operation> {
        if self.pages.is_empty() {
            self.pages.push(Vec::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = CONTENT_TOP;
        self.text(MARGIN_X, 790.0, Font::Bold, 18.0, AMBER, BRAND);
        self.text(MARGIN_X, 772.0, Font::Regular, 10.0, GRAY, SUBTITLE);
        self.line(762.0, AMBER, 0.8);
    }

    fn ensure(&mut self, height: f32) {
        if self.y - height < CONTENT_BOTTOM {
            self.new_page();
        }
    }

    fn text(&mut self, x: f32, y: f32, font: Font, size: f32, rgb: Rgb, text: &str) {
        let ops = self.ops();
        ops.push(color("rg", rgb));
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new("Tf", vec![font.resource().into(), size.into()]));
        ops.push(Operation::new("Td", vec![x.into(), y.into()]));
        ops.push(Operation::new("Tj", vec![Object::string_literal(win_ansi(text))]));
        ops.push(Operation::new("ET", vec![]));
    }

    fn line(&mut self, y: f32, rgb: Rgb, width: f32) {
        let ops = self.ops();
        ops.push(color("RG", rgb));
        ops.push(Operation::new("w", vec![width.into()]));
        ops.push(Operation::new("m", vec![MARGIN_X.into(), y.into()]));
        ops.push(Operation::new("l", vec![(PAGE_WIDTH - MARGIN_X).into(), y.into()]));
        ops.push(Operation::new("S", vec![]));
    }

    fn paragraph(&mut self, text: &str, font: Font, size: f32, indent: f32) {
        let leading = size * 1.4;
        let width = PAGE_WIDTH - 2.0 * MARGIN_X - indent;
        for line in wrap(text, chars_per_line(width, size)) {
            self.ensure(leading);
            self.y -= leading;
            let y = self.y;
            self.text(MARGIN_X + indent, y, font, size, INK, &line);
        }
    }

    fn block(&mut self, block: &Block) {
        match block {
            Block::Heading(level, text) => {
                let size = match level {
                    1 => 16.0,
                    2 => 13.0,
                    _ => 12.0,
                };
                self.ensure(size * 3.0);
                self.y -= size * 0.6;
                self.paragraph(text, Font::Bold, size, 0.0);
                if *level == 2 {
                    self.y -= 4.0;
                    let y = self.y;
                    self.line(y, LIGHT, 0.3);
                }
                self.y -= 4.0;
            }
            Block::Paragraph(text) => {
                self.paragraph(text, Font::Regular, BODY_SIZE, 0.0);
                self.y -= 3.0;
            }
            Block::Bullet(text) => self.paragraph(&format!("- {}", text), Font::Regular, BODY_SIZE, 14.0),
            Block::TableRow { cells, header } => self.table_row(cells, *header),
            Block::Rule => {
                self.ensure(12.0);
                self.y -= 6.0;
                let y = self.y;
                self.line(y, LIGHT, 0.3);
                self.y -= 6.0;
            }
            Block::Blank => self.y -= BODY_SIZE * 0.6,
        }
    }

    fn table_row(&mut self, cells: &[String], header: bool) {
        if cells.is_empty() {
            return;
        }
        let size = 9.0;
        let leading = size * 1.6;
        let column = (PAGE_WIDTH - 2.0 * MARGIN_X) / cells.len() as f32;
        let max_chars = chars_per_line(column - 4.0, size);
        let font = if header { Font::Bold } else { Font::Regular };

        self.ensure(leading);
        self.y -= leading;
        let y = self.y;
        for (idx, cell) in cells.iter().enumerate() {
            let x = MARGIN_X + idx as f32 * column;
            self.text(x, y, font, size, INK, &truncate(cell, max_chars));
        }
        if header {
            self.line(y - 3.0, LIGHT, 0.3);
        }
    }

    /// Add footers now that the page count is known
    fn finish(mut self, generated_at: NaiveDateTime) -> Vec<Vec<Operation>> {
        let total = self.pages.len();
        let stamp = format!(
            "Documento gerado em {}",
            generated_at.format("%d/%m/%Y às %H:%M")
        );
        for (idx, ops) in self.pages.iter_mut().enumerate() {
            let lines = [(44.0f32, format!("Página {}/{}", idx + 1, total)), (32.0f32, stamp.clone())];
            for (y, text) in lines {
                ops.push(color("rg", GRAY));
                ops.push(Operation::new("BT", vec![]));
                ops.push(Operation::new("Tf", vec![Font::Regular.resource().into(), 8.0f32.into()]));
                ops.push(Operation::new("Td", vec![MARGIN_X.into(), y.into()]));
                ops.push(Operation::new("Tj", vec![Object::string_literal(win_ansi(&text))]));
                ops.push(Operation::new("ET", vec![]));
            }
        }
        self.pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 30)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_markdown_blocks() {
        let blocks = parse_blocks(
            "# Carta\n## Resumo\nTexto **forte** aqui.\n- item\n\n---\n| Ativo | Ação |\n|---|---|\n| PETR4 | Vender |",
        );

        assert_eq!(
            blocks,
            vec![
                Block::Heading(1, "Carta".to_string()),
                Block::Heading(2, "Resumo".to_string()),
                Block::Paragraph("Texto forte aqui.".to_string()),
                Block::Bullet("item".to_string()),
                Block::Blank,
                Block::Rule,
                Block::TableRow {
                    cells: vec!["Ativo".to_string(), "Ação".to_string()],
                    header: true,
                },
                Block::TableRow {
                    cells: vec!["PETR4".to_string(), "Vender".to_string()],
                    header: false,
                },
            ]
        );
    }

    #[test]
    fn test_wrap_respects_width() {
        let lines = wrap("vender vinte e cinco por cento da posição", 12);
        assert!(lines.iter().all(|l| l.chars().count() <= 12));
        assert_eq!(lines.join(" "), "vender vinte e cinco por cento da posição");

        let long = wrap("abcdefghijkl", 5);
        assert_eq!(long, vec!["abcde", "fghij", "kl"]);
    }

    #[test]
    fn test_win_ansi_encoding() {
        assert_eq!(win_ansi("ação"), vec![b'a', 0xE7, 0xE3, b'o']);
        assert_eq!(win_ansi("“ok”…"), b"\"ok\"...".to_vec());
    }

    #[test]
    fn test_render_produces_a_pdf() {
        let bytes = render_letter_pdf("São Paulo, 30 de junho de 2025.\n\nPrezado(a) cliente,", stamp()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_long_letter_spans_pages() {
        let letter = "Parágrafo da carta com algum conteúdo.\n".repeat(120);
        let bytes = render_letter_pdf(&letter, stamp()).unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() > 1);
    }

    #[test]
    fn test_export_creates_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("saida").join("carta.pdf");

        export_letter_pdf("Prezado(a) cliente,", &path).unwrap();
        assert!(fs::read(&path).unwrap().starts_with(b"%PDF"));
    }
}
