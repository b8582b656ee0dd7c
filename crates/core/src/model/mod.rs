//! Fixture models and the JSON model-file loader.
//!
//! A model describes how a family of fixtures is wired: which channel offset
//! carries red, tilt, brightness and so on, plus the calibration angles used
//! to scale tilt and pan. Models are loaded once at startup from a directory
//! of `*.json` files and never change afterwards.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{color::ChannelLayout, error::SetupError, Result};

/// On-disk representation of a model file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    pub name: Option<String>,
    #[serde(default)]
    pub channel_modes: Vec<u8>,
    #[serde(default)]
    pub channels: ChannelLayout,
    #[serde(default)]
    pub max_tilt: f32,
    #[serde(default)]
    pub max_pan: f32,
}

/// Validated, immutable channel-wiring template.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureModel {
    pub name: String,
    pub channel_modes: Vec<u8>,
    pub channels: ChannelLayout,
    pub max_tilt: f32,
    pub max_pan: f32,
    pub supports_tilt: bool,
    pub supports_pan: bool,
    pub supports_white: bool,
}

impl FixtureModel {
    /// Builds a model from a channel layout, deriving the capability flags.
    pub fn new(name: impl Into<String>, channels: ChannelLayout) -> Self {
        Self {
            name: name.into(),
            channel_modes: Vec::new(),
            supports_tilt: channels.tilt.is_some(),
            supports_pan: channels.pan.is_some(),
            supports_white: channels.white.is_some(),
            channels,
            max_tilt: 0.0,
            max_pan: 0.0,
        }
    }

    pub fn with_calibration(mut self, max_tilt: f32, max_pan: f32) -> Self {
        self.max_tilt = max_tilt;
        self.max_pan = max_pan;
        self
    }

    pub fn with_channel_modes(mut self, modes: Vec<u8>) -> Self {
        self.channel_modes = modes;
        self
    }

    /// Validates a parsed model file. `origin` names the source in errors.
    pub fn from_file(file: ModelFile, origin: &str) -> Result<Self> {
        let name = file
            .name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| SetupError::InvalidModel {
                path: origin.to_string(),
                reason: "missing 'name'".to_string(),
            })?;

        Ok(Self::new(name, file.channels)
            .with_calibration(file.max_tilt, file.max_pan)
            .with_channel_modes(file.channel_modes))
    }

    pub fn from_json_str(json: &str, origin: &str) -> Result<Self> {
        let file: ModelFile =
            serde_json::from_str(json).map_err(|err| SetupError::InvalidModel {
                path: origin.to_string(),
                reason: err.to_string(),
            })?;
        Self::from_file(file, origin)
    }
}

/// Loads a single model file from disk.
pub fn load_model_file(path: &Path) -> Result<FixtureModel> {
    let origin = path.display().to_string();
    let json = fs::read_to_string(path).map_err(|err| SetupError::InvalidModel {
        path: origin.clone(),
        reason: err.to_string(),
    })?;
    FixtureModel::from_json_str(&json, &origin)
}

/// Loads every `*.json` model in `dir`, sorted by file name.
///
/// Dot-files and other extensions are ignored. Any invalid file, a duplicate
/// model name or more than `max_models` files fails the whole load.
pub fn load_models_dir(dir: &Path, max_models: usize) -> Result<Vec<FixtureModel>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|err| SetupError::InvalidModel {
            path: dir.display().to_string(),
            reason: format!("unable to search directory: {err}"),
        })?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file() && is_model_file(path))
        .collect();
    paths.sort();

    let mut models: Vec<FixtureModel> = Vec::with_capacity(paths.len());
    for path in paths {
        if models.len() >= max_models {
            return Err(SetupError::TooManyModels(max_models).into());
        }
        let model = load_model_file(&path)?;
        if models.iter().any(|existing| existing.name == model.name) {
            return Err(SetupError::DuplicateModel(model.name).into());
        }
        tracing::debug!(model = %model.name, path = %path.display(), "loaded model");
        models.push(model);
    }

    Ok(models)
}

fn is_model_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(true);
    let json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    !hidden && json
}
