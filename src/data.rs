//! Data pattern generator (spec §2 component I / §6.2 "Data binary"),
//! grounded in the original's `slp_data_randomizer.py`.

use crate::config::DataPattern;
use crate::error::Result;
use rand::RngCore;
use std::io::Write;
use std::path::Path;

const CHUNK_SIZE: usize = 1024;
const INCR_START: u32 = 0xCAFE_0000;

/// Write `size` bytes of `ALL_RND`: cryptographically-unpredictable bytes
/// in chunks of 1024, with a final partial chunk (spec §6.2).
fn write_all_rnd<R: RngCore, W: Write>(rng: &mut R, size: u64, mut out: W) -> Result<()> {
    let mut remaining = size;
    let mut buf = vec![0u8; CHUNK_SIZE];
    while remaining > 0 {
        let n = CHUNK_SIZE.min(remaining as usize);
        rng.fill_bytes(&mut buf[..n]);
        out.write_all(&buf[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}

/// `size/4` little-endian 32-bit words, starting at `start`, stepping by
/// `step` modulo 2^32 (spec §6.2 "INCR_STD"/"DECR_STD"/"INCR_RND"/"DECR_RND").
fn write_stepped<W: Write>(start: u32, step: i64, size: u64, mut out: W) -> Result<()> {
    let nwords = size / 4;
    let mut word = start;
    for _ in 0..nwords {
        out.write_all(&word.to_le_bytes())?;
        word = (word as i64 + step).rem_euclid(1i64 << 32) as u32;
    }
    Ok(())
}

/// Generate one test's `*.data.bin` collateral (spec §6.2). Returns the
/// number of bytes written.
pub fn generate_data_file<R: RngCore>(
    rng: &mut R,
    pattern: Option<DataPattern>,
    custom_file: Option<&Path>,
    size: u64,
    out: impl Write,
) -> Result<u64> {
    if let Some(path) = custom_file {
        let bytes = std::fs::read(path).map_err(|_| {
            crate::error::GenError::CustomDataFileMissing(path.to_path_buf())
        })?;
        let len = bytes.len() as u64;
        let mut out = out;
        out.write_all(&bytes)?;
        return Ok(len);
    }

    match pattern.unwrap_or(DataPattern::AllRnd) {
        DataPattern::AllRnd => write_all_rnd(rng, size, out)?,
        DataPattern::IncrStd => write_stepped(INCR_START, 1, size, out)?,
        DataPattern::DecrStd => write_stepped(INCR_START, -1, size, out)?,
        DataPattern::IncrRnd => write_stepped(rng.next_u32(), 1, size, out)?,
        DataPattern::DecrRnd => write_stepped(rng.next_u32(), -1, size, out)?,
    }
    Ok(size)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn incr_std_matches_concrete_scenario() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut out = Vec::new();
        generate_data_file(&mut rng, Some(DataPattern::IncrStd), None, 16, &mut out).unwrap();
        assert_eq!(
            out,
            vec![0x00, 0x00, 0xFE, 0xCA, 0x01, 0x00, 0xFE, 0xCA, 0x02, 0x00, 0xFE, 0xCA, 0x03, 0x00, 0xFE, 0xCA]
        );
    }

    #[test]
    fn decr_std_wraps_modulo_32_bits() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut out = Vec::new();
        generate_data_file(&mut rng, Some(DataPattern::DecrStd), None, 8, &mut out).unwrap();
        let word0 = u32::from_le_bytes(out[0..4].try_into().unwrap());
        let word1 = u32::from_le_bytes(out[4..8].try_into().unwrap());
        assert_eq!(word0, 0xCAFE_0000);
        assert_eq!(word1, 0xCAFD_FFFF);
    }

    #[test]
    fn all_rnd_produces_exact_size_across_chunk_boundary() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut out = Vec::new();
        generate_data_file(&mut rng, Some(DataPattern::AllRnd), None, 1030, &mut out).unwrap();
        assert_eq!(out.len(), 1030);
    }

    #[test]
    fn custom_file_is_copied_byte_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.bin");
        std::fs::write(&path, b"hello world").unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut out = Vec::new();
        let written = generate_data_file(&mut rng, None, Some(&path), 999, &mut out).unwrap();
        assert_eq!(out, b"hello world");
        assert_eq!(written, 11);
    }

    #[test]
    fn missing_custom_file_is_reported() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut out = Vec::new();
        let err = generate_data_file(&mut rng, None, Some(Path::new("/no/such/file")), 16, &mut out).unwrap_err();
        assert!(matches!(err, crate::error::GenError::CustomDataFileMissing(_)));
    }
}
