//! Story PDF rendering: lay the phases out on A4 pages and draw them with
//! pdfium.
//!
//! Layout and drawing are split. [`layout_story`] is pure: it wraps text,
//! scales images and paginates in top-down page coordinates, so it can be
//! unit-tested without a pdfium library. [`PdfiumRenderer`] then replays
//! the blocks onto real pages, flipping y to PDF's bottom-up space.
//!
//! Every page repeats the story title as a header and carries a
//! `Page N of M` footer. Each phase contributes a heading, its image (at
//! most 300 pt tall, width-fitted) and the wrapped summary.

use crate::error::{StorageErrorKind, StoryError};
use crate::pipeline::bind_pdfium;
use crate::story::GeneratedStory;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Produces the PDF bytes of a story.
///
/// Implementations are blocking; [`crate::StoryService`] calls them from
/// `spawn_blocking`.
pub trait StoryRenderer: Send + Sync {
    fn render(&self, story: &GeneratedStory) -> Result<Vec<u8>, StoryError>;
}

// ── Layout ───────────────────────────────────────────────────────────────

/// Page dimensions and typography, in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    pub title_size: f32,
    pub heading_size: f32,
    pub body_size: f32,
    pub footer_size: f32,
    /// Body line height as a multiple of `body_size`.
    pub body_line_height: f32,
    pub phase_spacing: f32,
    pub image_max_height: f32,
}

impl Default for PageGeometry {
    /// A4 with 2 cm margins.
    fn default() -> Self {
        Self {
            width: 595.28,
            height: 841.89,
            margin: 56.69,
            title_size: 24.0,
            heading_size: 18.0,
            body_size: 12.0,
            footer_size: 10.0,
            body_line_height: 1.6,
            phase_spacing: 20.0,
            image_max_height: 300.0,
        }
    }
}

impl PageGeometry {
    pub fn content_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }
}

/// Visual role of a text run, which selects font and colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextStyle {
    Title,
    Heading,
    Body,
    Footer,
}

/// One positioned element. `top` is measured from the top edge of the page.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Text {
        text: String,
        x: f32,
        top: f32,
        size: f32,
        style: TextStyle,
    },
    Image {
        /// Index into the phase list passed to [`layout_story`].
        slot: usize,
        x: f32,
        top: f32,
        width: f32,
        height: f32,
    },
    Rule {
        top: f32,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub blocks: Vec<Block>,
}

/// The parts of a phase the layout needs.
#[derive(Debug, Clone)]
pub struct PhaseContent<'a> {
    pub name: &'a str,
    pub summary: &'a str,
    /// Pixel dimensions of the decoded image, if any.
    pub image: Option<(u32, u32)>,
}

/// Rough Helvetica advance width: half an em per character on average.
pub fn estimate_text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5
}

/// Greedy word wrap to `max_width`. Words longer than a line are split.
pub fn wrap_text(text: &str, size: f32, max_width: f32) -> Vec<String> {
    let max_chars = ((max_width / (size * 0.5)).floor() as usize).max(1);
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut line = String::new();
        let mut line_len = 0usize;
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if line_len > 0 {
                    lines.push(std::mem::take(&mut line));
                    line_len = 0;
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let needed = if line_len == 0 { word.len() } else { line_len + 1 + word.len() };
            if needed > max_chars {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            if line_len > 0 {
                line.push(' ');
                line_len += 1;
            }
            line.extend(word.iter());
            line_len += word.len();
        }
        if line_len > 0 {
            lines.push(line);
        }
    }
    lines
}

/// Scale `(w, h)` pixels to fit `max_w` × `max_h` points, keeping aspect.
pub fn fit_image(dims: (u32, u32), max_w: f32, max_h: f32) -> (f32, f32) {
    let (w, h) = (dims.0.max(1) as f32, dims.1.max(1) as f32);
    let scale = (max_w / w).min(max_h / h);
    (w * scale, h * scale)
}

struct Cursor<'g> {
    geom: &'g PageGeometry,
    pages: Vec<PageLayout>,
    top: f32,
    content_top: f32,
    content_bottom: f32,
}

impl Cursor<'_> {
    fn remaining(&self) -> f32 {
        self.content_bottom - self.top
    }

    fn at_page_start(&self) -> bool {
        (self.top - self.content_top).abs() < f32::EPSILON
    }

    fn new_page(&mut self) {
        self.pages.push(PageLayout::default());
        self.top = self.content_top;
    }

    /// Start a new page unless `height` fits (or the page is still empty).
    fn reserve(&mut self, height: f32) {
        if height > self.remaining() && !self.at_page_start() {
            self.new_page();
        }
    }

    fn push(&mut self, block: Block) {
        if let Some(page) = self.pages.last_mut() {
            page.blocks.push(block);
        }
    }
}

/// Lay out a story over as many pages as it needs.
pub fn layout_story(title: &str, phases: &[PhaseContent<'_>], geom: &PageGeometry) -> Vec<PageLayout> {
    let width = geom.content_width();
    let title_lines = wrap_text(title, geom.title_size, width);
    let title_line_h = geom.title_size * 1.2;
    let header_h = title_lines.len() as f32 * title_line_h + geom.title_size * 0.5;
    let footer_h = geom.footer_size * 2.0;

    let mut cursor = Cursor {
        geom,
        pages: Vec::new(),
        top: 0.0,
        content_top: geom.margin + header_h + geom.phase_spacing,
        content_bottom: geom.height - geom.margin - footer_h,
    };
    cursor.new_page();

    let body_line_h = geom.body_size * cursor.geom.body_line_height;
    let heading_h = geom.heading_size * 1.2;

    for (slot, phase) in phases.iter().enumerate() {
        if !cursor.at_page_start() {
            cursor.top += geom.phase_spacing;
        }

        // Keep a heading with its image, or with one body line.
        let image_h = phase
            .image
            .map(|dims| fit_image(dims, width, geom.image_max_height).1 + 10.0)
            .unwrap_or(0.0);
        cursor.reserve(heading_h + image_h.max(body_line_h));
        cursor.push(Block::Text {
            text: phase.name.to_string(),
            x: geom.margin,
            top: cursor.top,
            size: geom.heading_size,
            style: TextStyle::Heading,
        });
        cursor.top += heading_h;

        if let Some(dims) = phase.image {
            let (w, h) = fit_image(dims, width, geom.image_max_height);
            cursor.reserve(h + 10.0);
            cursor.top += 10.0;
            cursor.push(Block::Image {
                slot,
                x: geom.margin + (width - w) / 2.0,
                top: cursor.top,
                width: w,
                height: h,
            });
            cursor.top += h;
        }

        cursor.top += 10.0;
        for line in wrap_text(phase.summary, geom.body_size, width) {
            cursor.reserve(body_line_h);
            cursor.push(Block::Text {
                text: line,
                x: geom.margin,
                top: cursor.top,
                size: geom.body_size,
                style: TextStyle::Body,
            });
            cursor.top += body_line_h;
        }
    }

    let mut pages = cursor.pages;
    let total = pages.len();
    for (idx, page) in pages.iter_mut().enumerate() {
        let mut chrome = Vec::with_capacity(title_lines.len() + 2);
        for (i, line) in title_lines.iter().enumerate() {
            chrome.push(Block::Text {
                x: (geom.width - estimate_text_width(line, geom.title_size)) / 2.0,
                top: geom.margin + i as f32 * title_line_h,
                text: line.clone(),
                size: geom.title_size,
                style: TextStyle::Title,
            });
        }
        chrome.push(Block::Rule {
            top: geom.margin + header_h,
        });
        let footer = format!("Page {} of {}", idx + 1, total);
        chrome.push(Block::Text {
            x: (geom.width - estimate_text_width(&footer, geom.footer_size)) / 2.0,
            top: geom.height - geom.margin - geom.footer_size,
            text: footer,
            size: geom.footer_size,
            style: TextStyle::Footer,
        });
        chrome.append(&mut page.blocks);
        page.blocks = chrome;
    }
    pages
}

// ── pdfium drawing ───────────────────────────────────────────────────────

/// Renders stories to PDF with pdfium's built-in Helvetica.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRenderer {
    lib_path: Option<PathBuf>,
    geometry: PageGeometry,
}

impl PdfiumRenderer {
    pub fn new(lib_path: Option<PathBuf>) -> Self {
        Self {
            lib_path,
            geometry: PageGeometry::default(),
        }
    }
}

/// Decode a phase's base64 image; failures are logged and the image skipped.
fn decode_phase_image(name: &str, data: Option<&str>) -> Option<DynamicImage> {
    let data = data.filter(|d| !d.is_empty())?;
    let bytes = match BASE64.decode(data) {
        Ok(b) => b,
        Err(e) => {
            warn!("Failed to embed image for phase {}: bad base64 ({})", name, e);
            return None;
        }
    };
    match image::load_from_memory(&bytes) {
        Ok(img) => Some(img),
        Err(e) => {
            warn!("Failed to embed image for phase {}: {}", name, e);
            None
        }
    }
}

fn style_color(style: TextStyle) -> PdfColor {
    match style {
        TextStyle::Title => PdfColor::new(0x15, 0x65, 0xC0, 255),
        TextStyle::Heading => PdfColor::new(0x19, 0x76, 0xD2, 255),
        TextStyle::Body => PdfColor::new(0, 0, 0, 255),
        TextStyle::Footer => PdfColor::new(0x61, 0x61, 0x61, 255),
    }
}

fn draw_failed(story_id: &str, what: &str, e: PdfiumError) -> StoryError {
    StoryError::storage(
        StorageErrorKind::SaveFailed,
        story_id,
        format!("Failed to generate PDF: {what}: {e:?}"),
    )
}

impl StoryRenderer for PdfiumRenderer {
    fn render(&self, story: &GeneratedStory) -> Result<Vec<u8>, StoryError> {
        let start = Instant::now();
        if story.id.trim().is_empty() {
            error!("Story ID is null or empty");
            return Err(StoryError::InvalidArgument(
                "Story ID cannot be empty".into(),
            ));
        }
        if story.phases.is_empty() {
            error!("Story has no phases: {}", story.id);
            return Err(StoryError::InvalidArgument(
                "Story must have at least one phase".into(),
            ));
        }
        info!("Generating PDF for story: {}", story.id);

        let ordered = story.ordered_phases();
        let images: Vec<Option<DynamicImage>> = ordered
            .iter()
            .map(|p| decode_phase_image(&p.name, p.image_data.as_deref()))
            .collect();
        let contents: Vec<PhaseContent<'_>> = ordered
            .iter()
            .zip(&images)
            .map(|(p, img)| PhaseContent {
                name: &p.name,
                summary: &p.summary,
                image: img.as_ref().map(|i| (i.width(), i.height())),
            })
            .collect();
        let layout = layout_story(&story.title, &contents, &self.geometry);

        let pdfium = bind_pdfium(self.lib_path.as_deref())?;
        let id = story.id.as_str();
        let mut document = pdfium
            .create_new_pdf()
            .map_err(|e| draw_failed(id, "create document", e))?;
        let regular = document.fonts_mut().helvetica();
        let bold = document.fonts_mut().helvetica_bold();
        let geom = &self.geometry;

        for page_layout in &layout {
            let mut page = document
                .pages_mut()
                .create_page_at_end(PdfPagePaperSize::a4())
                .map_err(|e| draw_failed(id, "add page", e))?;
            let objects = page.objects_mut();

            for block in &page_layout.blocks {
                match block {
                    Block::Text {
                        text,
                        x,
                        top,
                        size,
                        style,
                    } => {
                        let font = match style {
                            TextStyle::Title | TextStyle::Heading => bold,
                            TextStyle::Body | TextStyle::Footer => regular,
                        };
                        let baseline = geom.height - top - size;
                        let mut obj = objects
                            .create_text_object(
                                PdfPoints::new(*x),
                                PdfPoints::new(baseline),
                                text,
                                font,
                                PdfPoints::new(*size),
                            )
                            .map_err(|e| draw_failed(id, "draw text", e))?;
                        obj.set_fill_color(style_color(*style))
                            .map_err(|e| draw_failed(id, "colour text", e))?;
                    }
                    Block::Image {
                        slot,
                        x,
                        top,
                        width,
                        height,
                    } => {
                        if let Some(img) = images.get(*slot).and_then(Option::as_ref) {
                            objects
                                .create_image_object(
                                    PdfPoints::new(*x),
                                    PdfPoints::new(geom.height - top - height),
                                    img,
                                    Some(PdfPoints::new(*width)),
                                    Some(PdfPoints::new(*height)),
                                )
                                .map_err(|e| draw_failed(id, "embed image", e))?;
                            debug!("Embedded image for phase slot {}", slot);
                        }
                    }
                    Block::Rule { top } => {
                        let y = PdfPoints::new(geom.height - top);
                        objects
                            .create_path_object_line(
                                PdfPoints::new(geom.margin),
                                y,
                                PdfPoints::new(geom.width - geom.margin),
                                y,
                                PdfColor::new(0xBD, 0xBD, 0xBD, 255),
                                PdfPoints::new(0.75),
                            )
                            .map_err(|e| draw_failed(id, "draw rule", e))?;
                    }
                }
            }
        }

        let bytes = document
            .save_to_bytes()
            .map_err(|e| draw_failed(id, "serialise document", e))?;
        info!(
            "PDF generated successfully for story: {}, {} pages, {} bytes, {:?}",
            story.id,
            layout.len(),
            bytes.len(),
            start.elapsed()
        );
        Ok(bytes)
    }
}
