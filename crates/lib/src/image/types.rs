use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::install::{InstallError, InstallerIdentity};
use crate::profile::Profile;
use crate::requirements::RequirementsError;
use crate::stage::{BuildState, Instruction, StageDef, StageError};
use crate::util::hash::{ContentHash, HashError, ObjectHash, TreeHashError};

/// Metadata file written into every base layer.
pub const LAYER_METADATA: &str = "layer.json";

/// Metadata file written into every image.
pub const IMAGE_METADATA: &str = "image.json";

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("dependency resolution failed: {0}")]
  Requirements(#[from] RequirementsError),

  #[error("dependency installation failed: {0}")]
  Install(#[from] InstallError),

  #[error(transparent)]
  Stage(#[from] StageError),

  #[error("failed to hash definition: {0}")]
  Hash(#[from] HashError),

  #[error("failed to hash tree: {0}")]
  Tree(#[from] TreeHashError),

  #[error("io error at {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid store entry {}: {message}", path.display())]
  Corrupt { path: PathBuf, message: String },

  #[error("path '{path}' leaves the image root")]
  PathEscape { path: String },

  #[error("stage '{stage}' cannot run {instruction}: {message}")]
  UnsupportedInstruction {
    stage: String,
    instruction: &'static str,
    message: String,
  },
}

impl BuildError {
  pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> BuildError + '_ {
    move |source| BuildError::Io {
      path: path.to_path_buf(),
      source,
    }
  }
}

/// Runtime configuration of an image, folded from its stage lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
  pub working_dir: String,
  pub env: BTreeMap<String, String>,
  pub exposed_ports: Vec<u16>,
  pub cmd: Vec<String>,
}

impl ImageConfig {
  /// Apply every stage's instructions in lineage order. Later stages
  /// override earlier ones.
  pub fn from_lineage<'a>(stages: impl IntoIterator<Item = &'a StageDef>) -> Self {
    let mut config = ImageConfig {
      working_dir: "/".to_string(),
      env: BTreeMap::new(),
      exposed_ports: Vec::new(),
      cmd: Vec::new(),
    };

    for stage in stages {
      for instruction in &stage.instructions {
        match instruction {
          Instruction::Workdir { path } => config.working_dir = path.clone(),
          Instruction::Env { key, value } => {
            config.env.insert(key.clone(), value.clone());
          }
          Instruction::Expose { port } => {
            if !config.exposed_ports.contains(port) {
              config.exposed_ports.push(*port);
            }
          }
          Instruction::Cmd { argv } => config.cmd = argv.clone(),
          Instruction::CopyManifest { .. } | Instruction::InstallDependencies { .. } | Instruction::CopyTree { .. } => {}
        }
      }
    }

    config.exposed_ports.sort_unstable();
    config
  }
}

/// Metadata of a realized base layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRecord {
  pub hash: ObjectHash,
  pub manifest_hash: ContentHash,
  /// Canonical installed package set.
  pub packages: Vec<String>,
  pub installer: String,
}

/// Metadata of a realized image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
  pub id: ObjectHash,
  pub profile: Profile,
  pub base_layer: ObjectHash,
  pub config: ImageConfig,
  /// Number of application files copied into the image.
  pub embedded_files: usize,
}

impl LayerRecord {
  pub fn load(dir: &Path) -> Result<Self, BuildError> {
    read_metadata(&dir.join(LAYER_METADATA))
  }
}

impl ImageRecord {
  pub fn load(dir: &Path) -> Result<Self, BuildError> {
    read_metadata(&dir.join(IMAGE_METADATA))
  }
}

fn read_metadata<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, BuildError> {
  let content = fs::read_to_string(path).map_err(BuildError::io(path))?;
  serde_json::from_str(&content).map_err(|e| BuildError::Corrupt {
    path: path.to_path_buf(),
    message: e.to_string(),
  })
}

/// Hash input of a base layer.
#[derive(Serialize)]
pub(crate) struct BaseLayerKey<'a> {
  pub stage: &'a StageDef,
  pub manifest: &'a ContentHash,
  pub installer: &'a InstallerIdentity,
}

impl crate::util::hash::Hashable for BaseLayerKey<'_> {}

/// Hash input of an image.
#[derive(Serialize)]
pub(crate) struct ImageKey<'a> {
  pub stage: &'a StageDef,
  pub base_layer: &'a ObjectHash,
  /// Content hash of every embedded tree that exists in the context.
  pub trees: BTreeMap<&'a str, ContentHash>,
}

impl crate::util::hash::Hashable for ImageKey<'_> {}

/// Result of building one profile.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
  pub record: ImageRecord,
  pub layer: LayerRecord,
  pub path: PathBuf,
  pub layer_path: PathBuf,
  pub state: BuildState,
  /// The image was already in the store.
  pub cached: bool,
}
