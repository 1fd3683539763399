//! End-to-end round trips over synthetic cartridge images.

use levelsmith::codec;
use levelsmith::directory::{
    base, extended, BaseLayout, ComponentKind, Directory, DirectoryEntry, ExtendedLayout,
    TableLayout, MINIMAP_HEIGHT, MINIMAP_WIDTH,
};
use levelsmith::error::Error;
use levelsmith::extractor::Extractor;
use levelsmith::grid::Grid;
use levelsmith::image::{Image, MAP_BASE};
use levelsmith::objects::{ObjectRecord, ObjectTable};
use levelsmith::patcher::{ComponentData, LevelPatch, Patcher};
use levelsmith::workspace;

fn checker_grid(width: usize, height: usize, seed: u16) -> Grid {
    let mut grid = Grid::new(width, height);
    for y in 0..height {
        for x in 0..width {
            grid.set(x, y, ((x * 3 + y * 7) as u16).wrapping_mul(seed) & 0x3FF);
        }
    }
    grid
}

fn minimap_grid(seed: u16) -> Grid {
    let mut grid = Grid::new(MINIMAP_WIDTH, MINIMAP_HEIGHT);
    for y in 0..MINIMAP_HEIGHT {
        for x in 0..MINIMAP_WIDTH {
            grid.set(x, y, (((x + y) as u16).wrapping_mul(seed)) & 0xFF);
        }
    }
    grid
}

fn sample_objects() -> ObjectTable {
    ObjectTable {
        records: vec![
            ObjectRecord {
                x: 40,
                y: 200,
                kind: 3,
                param: 1,
            },
            ObjectRecord {
                x: 300,
                y: 64,
                kind: 9,
                param: 0,
            },
        ],
    }
}

/// Append a size-prefixed compressed block; returns its address.
fn append_prefixed(image: &mut Image, payload: &[u8], slack: usize) -> u32 {
    image.align(4);
    let mut block = (payload.len() as u32).to_le_bytes().to_vec();
    block.extend_from_slice(&codec::compress(payload));
    let offset = image.append(&block);
    if slack > 0 {
        image.append(&vec![0u8; slack]);
    }
    image.offset_to_addr(offset)
}

/// Append a prefix-less compressed stream; returns its address.
fn append_stream(image: &mut Image, payload: &[u8]) -> u32 {
    image.align(4);
    let offset = image.append(&codec::compress(payload));
    image.offset_to_addr(offset)
}

fn write_entry(image: &mut Image, layout: &dyn TableLayout, level: usize, entry: &DirectoryEntry) {
    let table_offset = (layout.table_addr() - MAP_BASE) as usize;
    let bytes = layout.encode_entry(entry);
    image
        .write_bytes(table_offset + level * layout.entry_width(), &bytes)
        .unwrap();
}

/// A base-layout image with two populated levels, each block followed by
/// `slack` spare bytes so fitting rewrites stay in place.
fn build_base_image(slack: usize) -> Image {
    let layout = BaseLayout;
    let table_end =
        (base::TABLE_ADDR - MAP_BASE) as usize + base::LEVEL_COUNT * layout.entry_width();
    let mut image = Image::from_bytes(vec![0u8; table_end]);
    image.align(4);

    for level in 0..2 {
        let seed = 5 + level as u16 * 11;
        let physical = checker_grid(6, 4, seed);
        let graphical = checker_grid(6, 4, seed + 1);
        let minimap = minimap_grid(seed);

        let entry = DirectoryEntry {
            physical: Some(append_prefixed(&mut image, &physical.to_payload(), slack)),
            graphical: Some(append_prefixed(&mut image, &graphical.to_payload(), slack)),
            minimap: Some(append_prefixed(&mut image, &minimap.to_fixed_payload(), slack)),
            flags: 0b10_01_00 | (level as u32),
            ..Default::default()
        };
        write_entry(&mut image, &layout, level, &entry);
    }

    image
}

/// An extended-layout image with one fully populated level.
fn build_extended_image() -> Image {
    let layout = ExtendedLayout;
    let table_end =
        (extended::TABLE_ADDR - MAP_BASE) as usize + extended::LEVEL_COUNT * layout.entry_width();
    let mut image = Image::from_bytes(vec![0u8; table_end]);
    image.align(4);

    let physical = checker_grid(8, 6, 3);
    let graphical2 = checker_grid(8, 6, 4);
    let minimap = minimap_grid(9);
    let objects = sample_objects();

    let physical_addr = append_prefixed(&mut image, &physical.to_payload(), 0);
    let graphical2_addr = append_prefixed(&mut image, &graphical2.to_payload(), 0);
    let minimap_addr = append_stream(&mut image, &minimap.to_fixed_payload());
    image.align(4);
    let objects_offset = image.append(&objects.to_disk_bytes());
    let objects_addr = image.offset_to_addr(objects_offset);

    let entry = DirectoryEntry {
        physical: Some(physical_addr),
        graphical2: Some(graphical2_addr),
        minimap: Some(minimap_addr),
        objects: Some(objects_addr),
        flags: (0x2A << 8) | 0b01_10_11,
        ..Default::default()
    };
    write_entry(&mut image, &layout, 0, &entry);

    image
}

#[test]
fn extracts_what_was_planted_base() {
    let image = build_base_image(32);
    let directory = Directory::read(&image, Box::new(BaseLayout)).unwrap();
    let extractor = Extractor::new(&image, &directory);

    let level = extractor.extract_level(0).unwrap();
    assert_eq!(level.physical, checker_grid(6, 4, 5));
    assert_eq!(level.graphical, Some(checker_grid(6, 4, 6)));
    assert_eq!(level.graphical2, None);
    assert_eq!(level.background, None);
    assert_eq!(level.minimap, minimap_grid(5));
    assert!(level.objects.is_empty());
    assert_eq!(level.flags.depth_mode, 0);
    assert_eq!(
        level.present,
        vec![
            ComponentKind::Physical,
            ComponentKind::Graphical,
            ComponentKind::Minimap
        ]
    );

    // The directory reports the stored uncompressed lengths directly.
    let physical_len = directory
        .stored_length(&image, 0, ComponentKind::Physical)
        .unwrap();
    assert_eq!(physical_len, Some(checker_grid(6, 4, 5).to_payload().len() as u32));
    assert_eq!(
        directory
            .stored_length(&image, 0, ComponentKind::Background)
            .unwrap(),
        None
    );
}

#[test]
fn extracts_what_was_planted_extended() {
    let image = build_extended_image();
    let directory = Directory::read(&image, Box::new(ExtendedLayout)).unwrap();
    let extractor = Extractor::new(&image, &directory);

    let level = extractor.extract_level(0).unwrap();
    assert_eq!(level.physical, checker_grid(8, 6, 3));
    assert_eq!(level.graphical, None);
    assert_eq!(level.graphical2, Some(checker_grid(8, 6, 4)));
    assert_eq!(level.minimap, minimap_grid(9));
    assert_eq!(level.objects, sample_objects());
    assert_eq!(level.flags.depth_mode, 0x2A);
}

#[test]
fn missing_physical_is_fatal_for_the_level() {
    let image = build_base_image(32);
    let directory = Directory::read(&image, Box::new(BaseLayout)).unwrap();
    let extractor = Extractor::new(&image, &directory);

    assert!(matches!(
        extractor.extract_level(2),
        Err(Error::MissingComponent { level: 2, .. })
    ));
    assert!(matches!(
        extractor.extract_level(base::LEVEL_COUNT),
        Err(Error::LevelOutOfRange { .. })
    ));
}

#[test]
fn in_place_patch_round_trips_and_is_idempotent() {
    let mut image = build_base_image(64);
    let mut directory = Directory::read(&image, Box::new(BaseLayout)).unwrap();

    let mut edited = checker_grid(6, 4, 5);
    edited.set(2, 1, 0x123);
    let mut patch = LevelPatch::new();
    patch.set(ComponentKind::Physical, Some(ComponentData::Map(edited.clone())));

    let before_len = image.len();
    let mut patcher = Patcher::new(&mut image, &mut directory);
    assert!(patcher.apply_level_patch(0, &patch, false).unwrap());
    assert_eq!(image.len(), before_len, "in-place patch must not grow the image");

    // The edit reads back exactly.
    let directory = Directory::read(&image, Box::new(BaseLayout)).unwrap();
    let extractor = Extractor::new(&image, &directory);
    assert_eq!(extractor.extract_level(0).unwrap().physical, edited);

    // Second identical call: no differences, zero writes.
    let mut directory = Directory::read(&image, Box::new(BaseLayout)).unwrap();
    let snapshot = image.bytes().to_vec();
    let mut patcher = Patcher::new(&mut image, &mut directory);
    assert!(!patcher.apply_level_patch(0, &patch, false).unwrap());
    assert_eq!(image.bytes(), &snapshot[..]);
}

#[test]
fn patching_one_level_leaves_others_identical() {
    let mut image = build_base_image(64);
    let mut directory = Directory::read(&image, Box::new(BaseLayout)).unwrap();

    let before = {
        let extractor = Extractor::new(&image, &directory);
        extractor.extract_level(1).unwrap()
    };

    let mut patch = LevelPatch::new();
    patch.set(
        ComponentKind::Physical,
        Some(ComponentData::Map(checker_grid(6, 4, 200))),
    );
    let mut patcher = Patcher::new(&mut image, &mut directory);
    assert!(patcher.apply_level_patch(0, &patch, false).unwrap());

    let extractor = Extractor::new(&image, &directory);
    let after = extractor.extract_level(1).unwrap();
    assert_eq!(after.physical, before.physical);
    assert_eq!(after.graphical, before.graphical);
    assert_eq!(after.minimap, before.minimap);
}

#[test]
fn unpatched_components_keep_their_bytes() {
    let mut image = build_base_image(64);
    let mut directory = Directory::read(&image, Box::new(BaseLayout)).unwrap();

    let graphical_addr = directory.entry(0).unwrap().graphical.unwrap();
    let graphical_offset = (graphical_addr - MAP_BASE) as usize;
    let before = image.slice(graphical_offset, 16).unwrap().to_vec();

    let mut patch = LevelPatch::new();
    patch.set(
        ComponentKind::Physical,
        Some(ComponentData::Map(checker_grid(6, 4, 77))),
    );
    let mut patcher = Patcher::new(&mut image, &mut directory);
    assert!(patcher.apply_level_patch(0, &patch, false).unwrap());

    assert_eq!(image.slice(graphical_offset, 16).unwrap(), &before[..]);
}

#[test]
fn truncation_writes_a_valid_shorter_prefix() {
    // No slack: the physical slot is bounded hard by the next block.
    let mut image = build_base_image(0);
    let mut directory = Directory::read(&image, Box::new(BaseLayout)).unwrap();

    // A bigger, high-entropy grid cannot fit the tight slot.
    let mut noisy = Grid::new(16, 12);
    for y in 0..12 {
        for x in 0..16 {
            noisy.set(x, y, ((x * 251 + y * 761) as u16).wrapping_mul(12007));
        }
    }
    let mut patch = LevelPatch::new();
    patch.set(ComponentKind::Physical, Some(ComponentData::Map(noisy.clone())));

    let before_len = image.len();
    let mut patcher = Patcher::new(&mut image, &mut directory);
    assert!(patcher.apply_level_patch(0, &patch, false).unwrap());
    assert_eq!(image.len(), before_len);

    // The stored prefix is shorter than the full payload but still decodes
    // to a defined grid of the right shape.
    let extractor = Extractor::new(&image, &directory);
    let slice = extractor
        .extract_component(0, ComponentKind::Physical)
        .unwrap()
        .unwrap();
    assert!(slice.payload.len() < noisy.to_payload().len());

    let level = extractor.extract_level(0).unwrap();
    assert_eq!(level.physical.width(), 16);
    assert_eq!(level.physical.height(), 12);
    assert_eq!(level.physical.get(0, 0), noisy.get(0, 0));
}

#[test]
fn absent_component_gains_a_slot_by_appending() {
    let mut image = build_base_image(32);
    let mut directory = Directory::read(&image, Box::new(BaseLayout)).unwrap();
    assert_eq!(directory.entry(0).unwrap().background, None);
    let original_end = image.len();

    let background = checker_grid(5, 5, 21);
    let mut patch = LevelPatch::new();
    patch.set(
        ComponentKind::Background,
        Some(ComponentData::Map(background.clone())),
    );

    let mut patcher = Patcher::new(&mut image, &mut directory);
    assert!(patcher.apply_level_patch(0, &patch, false).unwrap());

    let addr = directory.entry(0).unwrap().background.unwrap();
    assert!((addr - MAP_BASE) as usize >= original_end);

    let directory = Directory::read(&image, Box::new(BaseLayout)).unwrap();
    let extractor = Extractor::new(&image, &directory);
    assert_eq!(
        extractor.extract_level(0).unwrap().background,
        Some(background)
    );
}

#[test]
fn relocation_appends_and_repoints() {
    let mut image = build_extended_image();
    let mut directory = Directory::read(&image, Box::new(ExtendedLayout)).unwrap();
    let original_end = image.len();

    let edited_physical = checker_grid(8, 6, 31);
    let mut edited_objects = sample_objects();
    edited_objects.records.push(ObjectRecord {
        x: 99,
        y: 99,
        kind: 1,
        param: 7,
    });

    let mut patch = LevelPatch::new();
    patch.set(
        ComponentKind::Physical,
        Some(ComponentData::Map(edited_physical.clone())),
    );
    patch.set(
        ComponentKind::Objects,
        Some(ComponentData::Objects(edited_objects.clone())),
    );

    let mut patcher = Patcher::new(&mut image, &mut directory);
    assert!(patcher.apply_level_patch(0, &patch, false).unwrap());
    assert!(image.len() > original_end, "relocation must append");

    // Every present component, changed or not, moved past the old end.
    let entry = directory.entry(0).unwrap();
    for kind in [
        ComponentKind::Physical,
        ComponentKind::Graphical2,
        ComponentKind::Minimap,
        ComponentKind::Objects,
    ] {
        let addr = entry.component(kind).unwrap();
        assert!(
            (addr - MAP_BASE) as usize >= original_end,
            "{} did not relocate",
            kind
        );
        assert_eq!(addr % 4, 0, "{} is not 4-byte aligned", kind);
    }

    // Reread from scratch: the rewritten table and data agree.
    let directory = Directory::read(&image, Box::new(ExtendedLayout)).unwrap();
    let extractor = Extractor::new(&image, &directory);
    let level = extractor.extract_level(0).unwrap();
    assert_eq!(level.physical, edited_physical);
    assert_eq!(level.graphical2, Some(checker_grid(8, 6, 4)));
    assert_eq!(level.minimap, minimap_grid(9));
    assert_eq!(level.objects, edited_objects);

    // Idempotence holds across relocation too.
    let mut directory = Directory::read(&image, Box::new(ExtendedLayout)).unwrap();
    let snapshot = image.bytes().to_vec();
    let mut patcher = Patcher::new(&mut image, &mut directory);
    assert!(!patcher.apply_level_patch(0, &patch, false).unwrap());
    assert_eq!(image.bytes(), &snapshot[..]);
}

#[test]
fn absent_transition_sets_the_sentinel() {
    let mut image = build_extended_image();
    let mut directory = Directory::read(&image, Box::new(ExtendedLayout)).unwrap();
    assert!(directory.entry(0).unwrap().graphical2.is_some());

    let mut patch = LevelPatch::new();
    patch.set(ComponentKind::Graphical2, None);

    let mut patcher = Patcher::new(&mut image, &mut directory);
    assert!(patcher.apply_level_patch(0, &patch, false).unwrap());
    assert_eq!(directory.entry(0).unwrap().graphical2, None);

    let directory = Directory::read(&image, Box::new(ExtendedLayout)).unwrap();
    assert_eq!(directory.entry(0).unwrap().graphical2, None);
    let extractor = Extractor::new(&image, &directory);
    assert_eq!(extractor.extract_level(0).unwrap().graphical2, None);
}

#[test]
fn patch_into_component_the_layout_lacks_fails() {
    let mut image = build_base_image(32);
    let mut directory = Directory::read(&image, Box::new(BaseLayout)).unwrap();

    let mut patch = LevelPatch::new();
    patch.set(
        ComponentKind::Objects,
        Some(ComponentData::Objects(sample_objects())),
    );

    let snapshot = image.bytes().to_vec();
    let mut patcher = Patcher::new(&mut image, &mut directory);
    assert!(matches!(
        patcher.apply_level_patch(0, &patch, false),
        Err(Error::ComponentNotInLayout { .. })
    ));
    assert_eq!(image.bytes(), &snapshot[..], "failed patch must not write");
}

#[test]
fn workspace_round_trip_is_a_no_op() {
    let mut image = build_base_image(64);
    let mut directory = Directory::read(&image, Box::new(BaseLayout)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let manifest = workspace::export_all(&image, &directory, dir.path(), None).unwrap();
    assert_eq!(manifest.len(), 2);
    assert!(dir.path().join("levels.json").exists());
    assert!(dir.path().join("lv00_physical.txt").exists());
    assert!(dir.path().join("lv01_minimap.txt").exists());

    // Unedited files patch back as a no-op for every level.
    for level in 0..2 {
        let patch = workspace::load_level_patch(dir.path(), &directory, level).unwrap();
        assert!(!patch.is_empty());
        let mut patcher = Patcher::new(&mut image, &mut directory);
        assert!(!patcher.apply_level_patch(level, &patch, false).unwrap());
    }
}

#[test]
fn workspace_edit_round_trips_through_text() {
    let mut image = build_base_image(64);
    let mut directory = Directory::read(&image, Box::new(BaseLayout)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    workspace::export_all(&image, &directory, dir.path(), None).unwrap();

    // Edit one cell of level 1's physical map in the text file, the way an
    // external editor would.
    let path = workspace::component_file(dir.path(), 1, ComponentKind::Physical);
    let text = std::fs::read_to_string(&path).unwrap();
    let mut grid = Grid::parse_text(&text, None).unwrap();
    grid.set(0, 0, 0x3FF);
    std::fs::write(&path, grid.to_text(ComponentKind::Physical.pad_width(), true)).unwrap();

    let patch = workspace::load_level_patch(dir.path(), &directory, 1).unwrap();
    let mut patcher = Patcher::new(&mut image, &mut directory);
    assert!(patcher.apply_level_patch(1, &patch, false).unwrap());

    let extractor = Extractor::new(&image, &directory);
    assert_eq!(extractor.extract_level(1).unwrap().physical, grid);
}
