//! Interface shared by the networks of this crate.
use crate::weights::{GlobalSync, NamedTensors, WeightMap};
use anyhow::Result;
use candle_core::Device;
use candle_nn::VarMap;
use log::{info, trace, warn};
use pixelnet_core::{CheckpointState, PixelNetError};
use std::path::Path;

/// Network owning its [`VarMap`].
///
/// Checkpoints are written as safetensors files named after [`ModelBase::model_name`]
/// and registered in the [`CheckpointState`] of the directory.
pub trait ModelBase {
    /// Name of the network, used for checkpoint file names and log messages.
    fn model_name(&self) -> &str;

    /// Variables of the network.
    fn varmap(&self) -> &VarMap;

    /// Read-only view of the parameters.
    fn weights(&self) -> &WeightMap;

    /// Synchronization with the global network, if one was given at construction.
    fn global_sync(&self) -> Option<&GlobalSync>;

    /// Copies every weight and bias of the global network into this network.
    fn copy_from_global(&self) -> Result<()> {
        match self.global_sync() {
            Some(sync) => {
                sync.run()?;
                trace!("Copied {} parameters from global network", sync.plan().len());
                Ok(())
            }
            None => Err(PixelNetError::NoGlobalNetwork(self.model_name().to_string()).into()),
        }
    }

    /// Saves the parameters in `checkpoint_dir`, creating it if absent.
    fn save_model<T: AsRef<Path>>(&self, checkpoint_dir: T, step: Option<usize>) -> Result<()> {
        let dir = checkpoint_dir.as_ref();
        info!("Saving checkpoints of {} to {:?}", self.model_name(), dir);
        std::fs::create_dir_all(dir)?;

        let file_name = CheckpointState::file_name(self.model_name(), step);
        self.varmap().save(dir.join(&file_name))?;
        CheckpointState::record(dir, &file_name)?;
        Ok(())
    }

    /// Restores the latest checkpoint of `checkpoint_dir`.
    ///
    /// Returns `Ok(false)` without modifying the network if no checkpoint is found.
    /// The whole payload is checked against the parameters of the network before any
    /// of them is assigned, so a checkpoint of another topology is an error that
    /// leaves the network unchanged.
    fn load_model<T: AsRef<Path>>(&mut self, checkpoint_dir: T) -> Result<bool> {
        let dir = checkpoint_dir.as_ref();
        let state = match CheckpointState::read(dir) {
            Ok(Some(state)) => state,
            Ok(None) => {
                warn!("Load FAILED: no checkpoint in {:?}", dir);
                return Ok(false);
            }
            Err(e) => {
                warn!("Load FAILED: unreadable checkpoint state in {:?}: {}", dir, e);
                return Ok(false);
            }
        };

        let path = state.latest_path(dir);
        if !path.is_file() {
            warn!("Load FAILED: {:?} does not exist", path);
            return Ok(false);
        }

        let named_tensors = candle_core::safetensors::load(&path, &Device::Cpu)?
            .into_iter()
            .collect();
        NamedTensors { named_tensors }.copy_to(self.weights())?;
        info!("Load SUCCESS: {:?}", path);
        Ok(true)
    }
}
