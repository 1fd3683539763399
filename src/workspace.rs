//! On-disk editable sources.
//!
//! Extraction writes one text file per level per component plus a JSON
//! manifest; those files are the source of truth between extraction and
//! patch application. Patching reads back whichever component files exist
//! for a level: a missing file leaves the component untouched, a blank
//! file (or a `0 0` header) requests the absent sentinel.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde::Serialize;

use crate::directory::{ComponentKind, Directory};
use crate::error::Result;
use crate::extractor::{Extractor, Level};
use crate::flags::LevelFlags;
use crate::grid::Grid;
use crate::image::Image;
use crate::objects::ObjectTable;
use crate::patcher::{ComponentData, LevelPatch};
use crate::progress::write_progress;

pub fn level_short_name(level: usize) -> String {
    format!("lv{:02}", level)
}

pub fn component_file(dir: &Path, level: usize, kind: ComponentKind) -> PathBuf {
    dir.join(format!("{}_{}.txt", level_short_name(level), kind.short_name()))
}

#[derive(Debug, Serialize)]
pub struct ManifestLevel {
    pub index: usize,
    pub short: String,
    pub flags: LevelFlags,
    pub components: Vec<ComponentKind>,
}

/// Write one level's component files under `dir`.
pub fn export_level(dir: &Path, index: usize, level: &Level) -> Result<ManifestLevel> {
    for &kind in &level.present {
        let text = match kind {
            ComponentKind::Physical => level.physical.to_text(kind.pad_width(), true),
            ComponentKind::Graphical => grid_text(&level.graphical, kind),
            ComponentKind::Graphical2 => grid_text(&level.graphical2, kind),
            ComponentKind::Background => grid_text(&level.background, kind),
            ComponentKind::Minimap => level.minimap.to_text(kind.pad_width(), false),
            ComponentKind::Objects => level.objects.to_text(),
        };
        fs::write(component_file(dir, index, kind), text)?;
    }

    Ok(ManifestLevel {
        index,
        short: level_short_name(index),
        flags: level.flags,
        components: level.present.clone(),
    })
}

fn grid_text(grid: &Option<Grid>, kind: ComponentKind) -> String {
    match grid {
        Some(grid) => grid.to_text(kind.pad_width(), true),
        None => String::new(),
    }
}

pub fn write_manifest(dir: &Path, levels: &[ManifestLevel]) -> Result<()> {
    let json = serde_json::to_string_pretty(levels)?;
    fs::write(dir.join("levels.json"), json)?;
    Ok(())
}

/// Extract every level into `out_dir` and write the manifest. Unused
/// directory slots (no physical pointer) are skipped silently; levels
/// that fail structurally are reported and skipped.
pub fn export_all(
    image: &Image,
    directory: &Directory,
    out_dir: &Path,
    progress_path: Option<&Path>,
) -> Result<Vec<ManifestLevel>> {
    fs::create_dir_all(out_dir)?;

    let extractor = Extractor::new(image, directory);
    let total = directory.level_count();
    let mut manifest = Vec::new();

    for level in 0..total {
        if directory.entry(level)?.physical.is_none() {
            continue;
        }

        match extractor.extract_level(level) {
            Ok(extracted) => {
                manifest.push(export_level(out_dir, level, &extracted)?);
            }
            Err(e) => warn!("level {}: skipped: {}", level, e),
        }

        if let Some(path) = progress_path {
            write_progress(path, level + 1, total, &level_short_name(level), "running");
        }
    }

    if let Some(path) = progress_path {
        write_progress(path, total, total, "", "done");
    }

    write_manifest(out_dir, &manifest)?;
    Ok(manifest)
}

/// Gather whatever component files exist for `level` into a patch.
pub fn load_level_patch(dir: &Path, directory: &Directory, level: usize) -> Result<LevelPatch> {
    let mut patch = LevelPatch::new();

    for &kind in directory.layout().components() {
        let path = component_file(dir, level, kind);
        if !path.exists() {
            continue;
        }
        let text = fs::read_to_string(&path)?;
        patch.set(kind, parse_component_text(kind, &text)?);
    }

    Ok(patch)
}

fn parse_component_text(kind: ComponentKind, text: &str) -> Result<Option<ComponentData>> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    match kind {
        ComponentKind::Objects => {
            let table = ObjectTable::parse_text(text)?;
            Ok((!table.is_empty()).then_some(ComponentData::Objects(table)))
        }
        _ => {
            let grid = Grid::parse_text(text, kind.fixed_dims())?;
            Ok((!grid.is_empty()).then_some(ComponentData::Map(grid)))
        }
    }
}
