//! End-to-end exercise of `generate_suite` (spec §8.2/§8.3, SPEC_FULL §8),
//! the part of the pipeline downstream of DWARF extraction: a hand-built
//! Frame descriptor stands in for a fixture ELF, since the DWARF extractor
//! itself is covered directly in `src/dwarf/mod.rs`'s own unit tests.

use indexmap::IndexMap;
use sleipnir_framegen::enums::EnumIndex;
use sleipnir_framegen::generate_suite;
use sleipnir_framegen::types::{Aggregate, ArrayType, BaseIntWidth, Enumeration, Member, Overlay, TypeDescriptor};
use std::collections::HashMap;

/// A two-arm overlay Frame: `fields` (count/width/height/depth/type/id) and
/// a raw `u32` escape hatch, matching the canonical shape spec.md's own
/// concrete scenarios (§8.3) describe.
fn frame_descriptor() -> TypeDescriptor {
    let mut fields = IndexMap::new();
    fields.insert("count".to_string(), leaf(8, 0));
    fields.insert("width".to_string(), leaf(8, 8));
    fields.insert("height".to_string(), leaf(8, 16));
    fields.insert("depth".to_string(), leaf(8, 24));
    fields.insert("type".to_string(), leaf(8, 32));
    fields.insert("id".to_string(), leaf(32, 40));
    let fields_agg = TypeDescriptor::Aggregate(Aggregate::new(fields, 72).unwrap());

    let mut arms = IndexMap::new();
    arms.insert("fields".to_string(), fields_agg);
    arms.insert("raw".to_string(), TypeDescriptor::Array(ArrayType {
        element: Box::new(TypeDescriptor::BaseInt(BaseIntWidth::W8)),
        count: 9,
    }));
    TypeDescriptor::Overlay(Overlay::new(arms).unwrap())
}

fn leaf(bits: u32, offset: u32) -> Member {
    Member {
        descriptor: TypeDescriptor::BaseInt(match bits {
            8 => BaseIntWidth::W8,
            32 => BaseIntWidth::W32,
            _ => unreachable!(),
        }),
        bit_size: bits,
        bit_offset: offset,
    }
}

fn frame_single_enum() -> HashMap<String, Enumeration> {
    let mut variants = IndexMap::new();
    variants.insert("FRAME_SINGLE".to_string(), 0);
    variants.insert("FRAME_BURST".to_string(), 1);
    let mut tables = HashMap::new();
    tables.insert("FrameKind".to_string(), Enumeration { variants });
    tables
}

fn write_config(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("suite.yaml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn generates_frame_and_data_collateral_for_every_test_entry() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(
        dir.path(),
        r#"
seed: 1234
test:
  - id: 1
    params:
      sleipnir:
        frame:
          num_cmds: 5
        data_file_size: 64
"#,
    );

    let descriptor = frame_descriptor();
    let enums = EnumIndex::new(frame_single_enum());
    generate_suite(&descriptor, &enums, &config_path).unwrap();

    assert!(dir.path().join("slp.test_01.frames.bin").exists());
    assert!(dir.path().join("slp.test_01.frames.yml").exists());
    assert!(dir.path().join("slp.test_01.data.bin").exists());

    let frames_bin = std::fs::read(dir.path().join("slp.test_01.frames.bin")).unwrap();
    // 72 bits -> 3 little-endian u32 words per frame, 5 frames.
    assert_eq!(frames_bin.len(), 5 * 3 * 4);

    let data_bin = std::fs::read(dir.path().join("slp.test_01.data.bin")).unwrap();
    assert_eq!(data_bin.len(), 64);

    let rewritten = std::fs::read_to_string(&config_path).unwrap();
    assert!(rewritten.contains("num_frames: 5"));
    assert!(rewritten.contains("file_frames: slp.test_01.frames.bin"));
    assert!(rewritten.contains("aligned (4)"));
}

#[test]
fn deterministic_across_runs_with_identical_seed_and_config() {
    let body = r#"
seed: 42
test:
  - id: 7
    params:
      sleipnir:
        frame:
          num_cmds: 4
        data_pattern: ALL_RND
"#;

    let dir_a = tempfile::tempdir().unwrap();
    let config_a = write_config(dir_a.path(), body);
    generate_suite(&frame_descriptor(), &EnumIndex::new(frame_single_enum()), &config_a).unwrap();

    let dir_b = tempfile::tempdir().unwrap();
    let config_b = write_config(dir_b.path(), body);
    generate_suite(&frame_descriptor(), &EnumIndex::new(frame_single_enum()), &config_b).unwrap();

    let frames_a = std::fs::read(dir_a.path().join("slp.test_07.frames.bin")).unwrap();
    let frames_b = std::fs::read(dir_b.path().join("slp.test_07.frames.bin")).unwrap();
    assert_eq!(frames_a, frames_b);

    let data_a = std::fs::read(dir_a.path().join("slp.test_07.data.bin")).unwrap();
    let data_b = std::fs::read(dir_b.path().join("slp.test_07.data.bin")).unwrap();
    assert_eq!(data_a, data_b);
}

#[test]
fn per_cmd_constraint_pins_frame_kind_and_count() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(
        dir.path(),
        r#"
seed: 9
test:
  - id: 3
    params:
      sleipnir:
        frame:
          num_cmds: 2
          rnd_cfg:
            per_cmd_constraints_frame:
              0:
                single_kind: "self.fields.type == FRAME_SINGLE"
"#,
    );

    let descriptor = frame_descriptor();
    let enums = EnumIndex::new(frame_single_enum());
    generate_suite(&descriptor, &enums, &config_path).unwrap();

    let yaml = std::fs::read_to_string(dir.path().join("slp.test_03.frames.yml")).unwrap();
    let docs: Vec<serde_yaml::Value> = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(docs.len(), 2);
}

#[test]
fn missing_frame_field_is_reported_as_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(
        dir.path(),
        r#"
seed: 1
test:
  - id: 1
    params:
      sleipnir: {}
"#,
    );

    let err = generate_suite(&frame_descriptor(), &EnumIndex::new(HashMap::new()), &config_path).unwrap_err();
    assert!(matches!(err, sleipnir_framegen::error::GenError::MissingConfigKey(_)));
}
