use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::NaiveDate;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use tracing::{info, warn};

use crate::gallery::{GallerySnapshot, SketchState};

const SHEET_COLUMNS: u32 = 3;
const TILE_WIDTH: u32 = 360;
const TILE_HEIGHT: u32 = 640;
const TILE_PADDING: u32 = 24;
const BACKGROUND: Rgba<u8> = Rgba([0x0a, 0x0a, 0x0a, 0xff]);
const BLANK_TILE: Rgba<u8> = Rgba([0x1c, 0x1c, 0x1c, 0xff]);

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub json_path: PathBuf,
    pub sheet_path: Option<PathBuf>,
    pub sketches_placed: usize,
}

pub fn export_basename(date: NaiveDate) -> String {
    format!("shooting-plans_{}", date.format("%Y-%m-%d"))
}

/// Splits a `data:<mime>;base64,<payload>` URI into its MIME type and bytes.
pub fn parse_data_uri(uri: &str) -> Result<(String, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| anyhow!("not a data URI"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| anyhow!("data URI has no payload"))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| anyhow!("data URI is not base64 encoded"))?;
    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .context("invalid base64 in data URI")?;
    Ok((mime.to_string(), bytes))
}

fn sheet_dimensions(cards: u32) -> (u32, u32) {
    let columns = cards.clamp(1, SHEET_COLUMNS);
    let rows = cards.div_ceil(SHEET_COLUMNS).max(1);
    (
        columns * TILE_WIDTH + (columns + 1) * TILE_PADDING,
        rows * TILE_HEIGHT + (rows + 1) * TILE_PADDING,
    )
}

fn tile_origin(index: u32) -> (u32, u32) {
    let column = index % SHEET_COLUMNS;
    let row = index / SHEET_COLUMNS;
    (
        TILE_PADDING + column * (TILE_WIDTH + TILE_PADDING),
        TILE_PADDING + row * (TILE_HEIGHT + TILE_PADDING),
    )
}

/// Tiles ready sketches in card order. Missing or undecodable sketches leave
/// a blank tile. Returns the sheet and how many sketches were placed.
pub fn render_contact_sheet(snapshot: &GallerySnapshot) -> (RgbaImage, usize) {
    let (width, height) = sheet_dimensions(snapshot.cards.len() as u32);
    let mut sheet = RgbaImage::from_pixel(width, height, BACKGROUND);
    let blank = RgbaImage::from_pixel(TILE_WIDTH, TILE_HEIGHT, BLANK_TILE);
    let mut placed = 0;

    for (slot, card) in snapshot.cards.iter().enumerate() {
        let (x, y) = tile_origin(slot as u32);
        imageops::overlay(&mut sheet, &blank, x as i64, y as i64);

        let SketchState::Ready(uri) = &card.sketch else {
            continue;
        };
        let decoded = parse_data_uri(uri).and_then(|(_, bytes)| {
            image::load_from_memory(&bytes).context("sketch bytes are not a readable image")
        });
        let sketch = match decoded {
            Ok(decoded) => decoded.resize(TILE_WIDTH, TILE_HEIGHT, FilterType::Triangle).to_rgba8(),
            Err(err) => {
                warn!(index = card.index, "Skipping sketch in contact sheet: {err:#}");
                continue;
            }
        };
        let offset_x = x + (TILE_WIDTH - sketch.width()) / 2;
        let offset_y = y + (TILE_HEIGHT - sketch.height()) / 2;
        imageops::overlay(&mut sheet, &sketch, offset_x as i64, offset_y as i64);
        placed += 1;
    }

    (sheet, placed)
}

/// Writes the gallery document and, when there are cards, its contact sheet.
pub fn export_gallery(
    snapshot: &GallerySnapshot,
    dir: &Path,
    date: NaiveDate,
) -> Result<ExportSummary> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export directory {}", dir.display()))?;
    let basename = export_basename(date);

    let json_path = dir.join(format!("{basename}.json"));
    let document = serde_json::to_string_pretty(snapshot)?;
    fs::write(&json_path, document)
        .with_context(|| format!("failed to write {}", json_path.display()))?;

    let mut summary = ExportSummary {
        json_path,
        sheet_path: None,
        sketches_placed: 0,
    };
    if snapshot.cards.is_empty() {
        info!("No cards to place; skipping contact sheet");
        return Ok(summary);
    }

    let (sheet, placed) = render_contact_sheet(snapshot);
    let sheet_path = dir.join(format!("{basename}.png"));
    sheet
        .save(&sheet_path)
        .with_context(|| format!("failed to write {}", sheet_path.display()))?;
    info!(
        path = %sheet_path.display(),
        placed,
        cards = snapshot.cards.len(),
        "Exported contact sheet"
    );
    summary.sheet_path = Some(sheet_path);
    summary.sketches_placed = placed;
    Ok(summary)
}
