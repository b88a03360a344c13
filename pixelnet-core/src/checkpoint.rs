//! Checkpoint metadata.
//!
//! A checkpoint directory holds parameter files written by a backend and a small
//! YAML file named [`STATE_FILE`] recording which of them is the latest.
use anyhow::Result;
use log::{info, trace, warn};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

/// Name of the metadata file inside a checkpoint directory.
pub const STATE_FILE: &str = "checkpoint";

/// Extension of parameter files.
pub const EXTENSION: &str = "safetensors";

/// Latest and past checkpoints of a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// File name of the latest checkpoint.
    pub model_checkpoint_path: String,

    /// File names of every recorded checkpoint, oldest first.
    #[serde(default)]
    pub all_model_checkpoint_paths: Vec<String>,
}

impl CheckpointState {
    /// File name of a checkpoint of `model_name`, optionally tagged with a step.
    pub fn file_name(model_name: &str, step: Option<usize>) -> String {
        match step {
            Some(step) => format!("{}-{}.{}", model_name, step, EXTENSION),
            None => format!("{}.{}", model_name, EXTENSION),
        }
    }

    /// Reads the state of `dir`.
    ///
    /// Returns `Ok(None)` if the directory has no state file.
    pub fn read(dir: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = dir.as_ref().join(STATE_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let rdr = BufReader::new(File::open(&path)?);
        let state = serde_yaml::from_reader(rdr)?;
        trace!("Read checkpoint state from {:?}", &path);
        Ok(Some(state))
    }

    /// Writes the state into `dir`.
    pub fn write(&self, dir: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(dir.as_ref().join(STATE_FILE))?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }

    /// Records `file_name` as the latest checkpoint of `dir`, creating the directory
    /// and the state file if needed.
    ///
    /// An unreadable state file is replaced by a new one listing only `file_name`.
    pub fn record(dir: impl AsRef<Path>, file_name: &str) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let previous = match Self::read(dir) {
            Ok(state) => state,
            Err(e) => {
                warn!("Overwriting unreadable checkpoint state in {:?}: {}", dir, e);
                None
            }
        };
        let mut state = previous.unwrap_or_else(|| Self {
            model_checkpoint_path: file_name.to_string(),
            all_model_checkpoint_paths: vec![],
        });
        state.model_checkpoint_path = file_name.to_string();
        state.all_model_checkpoint_paths.retain(|p| p != file_name);
        state.all_model_checkpoint_paths.push(file_name.to_string());
        state.write(dir)?;
        info!("Recorded checkpoint {} in {:?}", file_name, dir);

        Ok(state)
    }

    /// Path of the latest checkpoint resolved against `dir`.
    ///
    /// Only the file name of the recorded path is used, so a checkpoint directory
    /// keeps working after it has been moved.
    pub fn latest_path(&self, dir: impl AsRef<Path>) -> PathBuf {
        let name = Path::new(&self.model_checkpoint_path)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        dir.as_ref().join(name)
    }
}
