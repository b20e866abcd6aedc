//! Constrained-random Frame generator for the Sleipnir command protocol
//! (spec §1/§2). `generate` wires components A-I together: extract types
//! from an ELF's DWARF info, select the named Frame type, build a
//! constrained randomizer over it per test entry, and write out the
//! binary/text/data collateral the YAML suite asks for.

pub mod bitint;
pub mod config;
pub mod constraints;
pub mod data;
pub mod dwarf;
pub mod enums;
pub mod error;
pub mod packer;
pub mod randomizer;
pub mod solver;
pub mod tree;
pub mod types;

use config::{load_suite, OutputFile, TestEntry, DEFAULT_DATA_FILE_SIZE};
use enums::EnumIndex;
use error::{GenError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use randomizer::Randomizer;
use solver::RejectionSampler;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tree::Tree;
use types::TypeDescriptor;

/// Run the full generation flow for every test entry in `config_path`
/// (spec §1's top-level driver, §6.1/§6.2 for the file layout).
///
/// `elf_path` and `frame_type` select the DWARF-backed Frame layout (spec
/// component A); every test entry in the suite is generated against that
/// same layout, one randomizer per entry so that per-entry `rnd_cfg`
/// overrides never leak across entries.
pub fn generate(elf_path: &Path, frame_type: &str, config_path: &Path) -> Result<()> {
    let extracted = dwarf::parse_dwarf_from_elf(elf_path)?;
    let descriptor = extracted
        .types
        .get(frame_type)
        .ok_or_else(|| GenError::UnknownType(frame_type.to_string()))?
        .clone();
    let enums = EnumIndex::new(extracted.enums);
    generate_suite(&descriptor, &enums, config_path)
}

/// The part of `generate` downstream of DWARF extraction (components B-I):
/// takes an already-resolved Frame descriptor and enum index and drives the
/// whole suite. Split out from `generate` so it can be exercised without a
/// real ELF fixture.
pub fn generate_suite(descriptor: &TypeDescriptor, enums: &EnumIndex, config_path: &Path) -> Result<()> {
    let mut suite = load_suite(config_path)?;
    let out_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    for test in &mut suite.test {
        run_test(descriptor, enums, suite.seed, test, out_dir)?;
    }

    let text = serde_yaml::to_string(&suite)?;
    std::fs::write(config_path, text)?;
    Ok(())
}

/// A seed distinct per test entry but fully determined by the suite seed
/// and the entry's id, so reordering entries in the YAML does not change
/// any individual entry's output (spec §8.1 I5).
fn entry_seed(suite_seed: u64, test_id: u32) -> u64 {
    suite_seed ^ ((test_id as u64) << 32).wrapping_add(test_id as u64)
}

fn run_test(
    descriptor: &TypeDescriptor,
    enums: &EnumIndex,
    suite_seed: u64,
    test: &mut TestEntry,
    out_dir: &Path,
) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(entry_seed(suite_seed, test.id));
    let num_cmds = test.num_cmds()?;
    let rnd_cfg = test.params.sleipnir.frame.as_ref().and_then(|f| f.rnd_cfg.as_ref());

    let solver = RejectionSampler::new(ChaCha8Rng::seed_from_u64(rng.gen()));
    let mut randomizer = Randomizer::new(descriptor.clone(), solver, enums, rnd_cfg)?;
    let frames: Vec<Tree> = randomizer.generate(num_cmds).collect::<Result<Vec<_>>>()?;

    // File names follow the original slp_data_packer.py convention (spec
    // §6.2): `slp.test_{T:02}.<kind>.<ext>`, zero-padded to two digits.
    let stem = format!("slp.test_{:02}", test.id);

    let frames_name = format!("{stem}.frames.bin");
    let frames_path = out_dir.join(&frames_name);
    packer::write_frame_binary(&frames, BufWriter::new(File::create(&frames_path)?))?;

    let text_name = format!("{stem}.frames.yml");
    let text_path = out_dir.join(&text_name);
    packer::write_frame_text(&frames, BufWriter::new(File::create(&text_path)?))?;

    let data_size = test.params.sleipnir.data_file_size.unwrap_or(DEFAULT_DATA_FILE_SIZE);
    let pattern = test.params.sleipnir.data_pattern;
    let custom_file = test.params.sleipnir.custom_data_file.clone();
    let data_name = format!("{stem}.data.bin");
    let data_path = out_dir.join(&data_name);
    let written = data::generate_data_file(
        &mut rng,
        pattern,
        custom_file.as_deref(),
        data_size,
        BufWriter::new(File::create(&data_path)?),
    )?;

    let params = &mut test.params.sleipnir;
    params.num_frames = Some(num_cmds);
    params.file_frames = Some(frames_name.clone());
    params.file_data = Some(data_name.clone());
    params.size_data = Some(written);

    for filename in [frames_name, text_name, data_name] {
        test.files.push(OutputFile {
            filename,
            mode: "c".to_string(),
            attr: "aligned (4)".to_string(),
        });
    }

    tracing::info!(test_id = test.id, num_cmds, "generated frame test entry");
    Ok(())
}
