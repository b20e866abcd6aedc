//! Input configuration schema (spec §6.1), loaded from YAML.

use crate::error::{GenError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Suite {
    pub seed: u64,
    pub test: Vec<TestEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TestEntry {
    pub id: u32,
    pub params: Params,
    #[serde(default)]
    pub files: Vec<OutputFile>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Params {
    pub sleipnir: SleipnirParams,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SleipnirParams {
    pub frame: Option<FrameParams>,
    pub custom_data_file: Option<PathBuf>,
    pub data_file_size: Option<u64>,
    pub data_pattern: Option<DataPattern>,

    // Populated by the generator once a test has been processed (spec §6.2).
    #[serde(default)]
    pub num_frames: Option<u32>,
    #[serde(default)]
    pub file_frames: Option<String>,
    #[serde(default)]
    pub file_data: Option<String>,
    #[serde(default)]
    pub size_data: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FrameParams {
    pub num_cmds: u32,
    #[serde(default)]
    pub rnd_cfg: Option<RandCfg>,
}

/// A constraint configuration block (spec §4.D).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RandCfg {
    #[serde(default)]
    pub enables: Vec<String>,
    #[serde(default)]
    pub constraints_frame: HashMap<String, String>,
    #[serde(default)]
    pub per_cmd_constraints_frame: HashMap<u32, HashMap<String, String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum DataPattern {
    #[serde(rename = "INCR_STD")]
    IncrStd,
    #[serde(rename = "DECR_STD")]
    DecrStd,
    #[serde(rename = "INCR_RND")]
    IncrRnd,
    #[serde(rename = "DECR_RND")]
    DecrRnd,
    #[serde(rename = "ALL_RND")]
    AllRnd,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputFile {
    pub filename: String,
    pub mode: String,
    pub attr: String,
}

pub const DEFAULT_DATA_FILE_SIZE: u64 = 1_048_576;

/// Load and parse the YAML configuration at `path` (spec §6.1).
pub fn load_suite(path: &Path) -> Result<Suite> {
    let text = std::fs::read_to_string(path)?;
    let suite: Suite = serde_yaml::from_str(&text)?;
    Ok(suite)
}

impl TestEntry {
    pub fn num_cmds(&self) -> Result<u32> {
        self.params
            .sleipnir
            .frame
            .as_ref()
            .map(|f| f.num_cmds)
            .ok_or_else(|| GenError::MissingConfigKey("params.sleipnir.frame.num_cmds".to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_minimal_suite() {
        let yaml = r#"
seed: 42
test:
  - id: 1
    params:
      sleipnir:
        frame:
          num_cmds: 3
"#;
        let suite: Suite = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(suite.seed, 42);
        assert_eq!(suite.test[0].num_cmds().unwrap(), 3);
    }

    #[test]
    fn missing_seed_fails_to_parse() {
        let yaml = r#"
test:
  - id: 1
    params:
      sleipnir: {}
"#;
        let result: std::result::Result<Suite, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn seed_zero_is_accepted() {
        let yaml = r#"
seed: 0
test: []
"#;
        let suite: Suite = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(suite.seed, 0);
    }

    #[test]
    fn data_pattern_roundtrips() {
        let yaml = "INCR_STD";
        let pattern: DataPattern = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(pattern, DataPattern::IncrStd);
    }
}
