//! Image realization.
//!
//! The builder realizes the base layer at most once per invocation, then
//! assembles one image per requested profile on top of it. Both layers and
//! images are staged under `<store>/tmp` and only moved into place once
//! their completion marker is written, so a failed build never leaves a
//! partial entry behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use super::store::{
  commit, image_path, in_rootfs, layer_path, reuse_or_clear, rootfs, staging_path, write_marker,
};
use super::types::{
  BaseLayerKey, BuildError, BuildOutcome, IMAGE_METADATA, ImageConfig, ImageKey, ImageRecord, LAYER_METADATA,
  LayerRecord,
};
use crate::blueprint::Blueprint;
use crate::consts::{REQUIREMENTS_FILE, SITE_PACKAGES_DIR};
use crate::install::{InstallRequest, Installer};
use crate::platform::paths::store_dir;
use crate::profile::Profile;
use crate::requirements::RequirementsManifest;
use crate::stage::{BuildEvent, BuildState, Instruction, StageDef, StageName};
use crate::util::fs::copy_tree;
use crate::util::hash::{ContentHash, Hashable, ObjectHash, hash_directory};

/// Names never copied into an image or folded into its hash.
pub const CODE_EXCLUSIONS: &[&str] = &["__pycache__", ".pytest_cache", ".mypy_cache"];

pub struct ImageBuilder<I> {
  context: PathBuf,
  store: PathBuf,
  blueprint: Blueprint,
  installer: I,
  state: BuildState,
  base: Option<(LayerRecord, PathBuf)>,
}

impl<I: Installer> ImageBuilder<I> {
  pub fn new(context: impl Into<PathBuf>, blueprint: Blueprint, installer: I) -> Self {
    Self {
      context: context.into(),
      store: store_dir(),
      blueprint,
      installer,
      state: BuildState::Unresolved,
      base: None,
    }
  }

  pub fn with_store(mut self, store: impl Into<PathBuf>) -> Self {
    self.store = store.into();
    self
  }

  pub fn store(&self) -> &Path {
    &self.store
  }

  pub fn blueprint(&self) -> &Blueprint {
    &self.blueprint
  }

  /// Shared progress. Stays at `DependenciesInstalled` once the base layer
  /// exists; each outcome carries its own terminal state.
  pub fn state(&self) -> BuildState {
    self.state
  }

  /// Build one profile's image.
  pub async fn build(&mut self, profile: Profile) -> Result<BuildOutcome, BuildError> {
    let lineage = self.blueprint.graph()?.deployable_lineage(StageName::from(profile))?;
    let (layer, layer_path) = self.ensure_base().await?;

    let leaf = self.blueprint.leaf(profile)?;
    let trees = self.tree_hashes(leaf)?;
    let id = ImageKey {
      stage: leaf,
      base_layer: &layer.hash,
      trees,
    }
    .compute_hash()?;

    let stages = lineage
      .iter()
      .map(|name| self.blueprint.stage(*name))
      .collect::<Result<Vec<_>, _>>()?;
    let config = ImageConfig::from_lineage(stages);

    let path = image_path(&self.store, &id);
    let cached = reuse_or_clear(&path).await?;
    let record = if cached {
      debug!(profile = %profile, id = %id, "image cache hit");
      ImageRecord::load(&path)?
    } else {
      info!(profile = %profile, id = %id, "assembling image");
      let staging = staging_path(&self.store, &id);
      prepare_staging(&staging).await?;
      let populated = self
        .populate_image(&staging, leaf, profile, &id, &layer.hash, config)
        .await;
      finish_staging(&staging, &path, populated).await?
    };

    let state = self.state.advance(BuildEvent::Finish(profile))?;
    info!(profile = %profile, id = %record.id, path = ?path, "image ready");

    Ok(BuildOutcome {
      record,
      layer,
      path,
      layer_path,
      state,
      cached,
    })
  }

  /// Build every deployable profile, walking the stage graph wave by wave.
  pub async fn build_all(&mut self) -> Result<Vec<BuildOutcome>, BuildError> {
    let waves = self.blueprint.graph()?.waves()?;
    let mut outcomes = Vec::new();

    for wave in waves {
      for name in wave {
        match name.profile() {
          Some(profile) => outcomes.push(self.build(profile).await?),
          None => {
            self.ensure_base().await?;
          }
        }
      }
    }

    Ok(outcomes)
  }

  async fn ensure_base(&mut self) -> Result<(LayerRecord, PathBuf), BuildError> {
    if let Some(base) = &self.base {
      return Ok(base.clone());
    }

    let manifest = RequirementsManifest::load(&self.context.join(REQUIREMENTS_FILE))?;
    let stage = self.blueprint.stage(StageName::Base)?;
    let identity = self.installer.identity();
    let hash = BaseLayerKey {
      stage,
      manifest: &manifest.content_hash,
      installer: &identity,
    }
    .compute_hash()?;

    let path = layer_path(&self.store, &hash);
    let record = if reuse_or_clear(&path).await? {
      debug!(hash = %hash, "base layer cache hit");
      LayerRecord::load(&path)?
    } else {
      info!(hash = %hash, packages = manifest.len(), "realizing base layer");
      let staging = staging_path(&self.store, &hash);
      prepare_staging(&staging).await?;
      let record = LayerRecord {
        hash: hash.clone(),
        manifest_hash: manifest.content_hash.clone(),
        packages: manifest.installed_set(),
        installer: identity.kind.to_string(),
      };
      let populated = self.populate_layer(&staging, stage, &manifest, record).await;
      finish_staging(&staging, &path, populated).await?
    };

    self.state = self.state.advance(BuildEvent::InstallDependencies)?;
    let base = (record, path);
    self.base = Some(base.clone());
    Ok(base)
  }

  async fn populate_layer(
    &self,
    staging: &Path,
    stage: &StageDef,
    manifest: &RequirementsManifest,
    record: LayerRecord,
  ) -> Result<LayerRecord, BuildError> {
    let mut run = StageRun::new(rootfs(staging), &self.blueprint.config().workdir)?;
    for instruction in &stage.instructions {
      run.apply(stage, instruction, &self.context, Some(manifest), &self.installer).await?;
    }
    write_json(&staging.join(LAYER_METADATA), &record).await?;
    Ok(record)
  }

  async fn populate_image(
    &self,
    staging: &Path,
    stage: &StageDef,
    profile: Profile,
    id: &ObjectHash,
    base_layer: &ObjectHash,
    config: ImageConfig,
  ) -> Result<ImageRecord, BuildError> {
    let mut run = StageRun::new(rootfs(staging), &self.blueprint.config().workdir)?;
    fs::create_dir_all(&run.rootfs).await.map_err(BuildError::io(&run.rootfs))?;
    for instruction in &stage.instructions {
      run.apply(stage, instruction, &self.context, None, &self.installer).await?;
    }

    let record = ImageRecord {
      id: id.clone(),
      profile,
      base_layer: base_layer.clone(),
      config,
      embedded_files: run.embedded_files,
    };
    write_json(&staging.join(IMAGE_METADATA), &record).await?;
    Ok(record)
  }

  /// Content hashes of the trees a stage embeds. Trees missing from the
  /// context are left out.
  fn tree_hashes<'a>(&self, stage: &'a StageDef) -> Result<BTreeMap<&'a str, ContentHash>, BuildError> {
    let mut hashes = BTreeMap::new();
    for src in stage.embedded_trees() {
      let path = self.context.join(src);
      if path.is_dir() {
        hashes.insert(src, hash_directory(&path, CODE_EXCLUSIONS)?);
      }
    }
    Ok(hashes)
  }
}

/// Filesystem cursor while applying one stage's instructions.
struct StageRun {
  rootfs: PathBuf,
  workdir: PathBuf,
  embedded_files: usize,
}

impl StageRun {
  fn new(rootfs: PathBuf, workdir: &str) -> Result<Self, BuildError> {
    let workdir = in_rootfs(&rootfs, workdir)?;
    Ok(Self {
      rootfs,
      workdir,
      embedded_files: 0,
    })
  }

  /// Absolute destinations are taken from the rootfs, relative ones from
  /// the current working directory.
  fn resolve(&self, dest: &str) -> Result<PathBuf, BuildError> {
    if dest.starts_with('/') {
      in_rootfs(&self.rootfs, dest)
    } else {
      in_rootfs(&self.workdir, dest)
    }
  }

  async fn apply<I: Installer>(
    &mut self,
    stage: &StageDef,
    instruction: &Instruction,
    context: &Path,
    manifest: Option<&RequirementsManifest>,
    installer: &I,
  ) -> Result<(), BuildError> {
    match instruction {
      Instruction::Workdir { path } => {
        self.workdir = in_rootfs(&self.rootfs, path)?;
        fs::create_dir_all(&self.workdir).await.map_err(BuildError::io(&self.workdir))?;
      }
      Instruction::CopyManifest { src, dest } => {
        let manifest = manifest.ok_or_else(|| unsupported(stage, "COPY of the manifest"))?;
        let dir = self.resolve(dest)?;
        fs::create_dir_all(&dir).await.map_err(BuildError::io(&dir))?;
        let target = in_rootfs(&dir, src)?;
        fs::write(&target, &manifest.source).await.map_err(BuildError::io(&target))?;
      }
      Instruction::InstallDependencies { manifest: file } => {
        let manifest = manifest.ok_or_else(|| unsupported(stage, "dependency installation"))?;
        let target = in_rootfs(&self.rootfs, SITE_PACKAGES_DIR)?;
        fs::create_dir_all(&target).await.map_err(BuildError::io(&target))?;
        let manifest_path = in_rootfs(&self.workdir, file)?;
        installer
          .install(&InstallRequest {
            manifest,
            manifest_path: &manifest_path,
            target: &target,
            workdir: &self.workdir,
          })
          .await?;
      }
      Instruction::CopyTree { src, dest } => {
        let source = context.join(src);
        if !source.is_dir() {
          warn!(
            stage = %stage.name,
            path = %source.display(),
            "tree missing from build context, image will not contain it"
          );
          return Ok(());
        }
        let target = self.resolve(dest)?;
        let copied = copy_tree(&source, &target, CODE_EXCLUSIONS).map_err(BuildError::io(&source))?;
        debug!(src = %src, files = copied, "copied tree");
        self.embedded_files += copied;
      }
      Instruction::Env { .. } | Instruction::Expose { .. } | Instruction::Cmd { .. } => {}
    }
    Ok(())
  }
}

fn unsupported(stage: &StageDef, instruction: &'static str) -> BuildError {
  BuildError::UnsupportedInstruction {
    stage: stage.name.to_string(),
    instruction,
    message: "no dependency manifest in this stage".to_string(),
  }
}

async fn prepare_staging(staging: &Path) -> Result<(), BuildError> {
  if staging.exists() {
    debug!(path = ?staging, "removing stale staging directory");
    fs::remove_dir_all(staging).await.map_err(BuildError::io(staging))?;
  }
  fs::create_dir_all(staging).await.map_err(BuildError::io(staging))
}

/// Seal and commit a populated staging directory, or discard it on error.
async fn finish_staging<T>(staging: &Path, dest: &Path, populated: Result<T, BuildError>) -> Result<T, BuildError> {
  let sealed = match populated {
    Ok(value) => write_marker(staging).await.map(|()| value),
    Err(e) => Err(e),
  };

  match sealed {
    Ok(value) => {
      commit(staging, dest).await?;
      Ok(value)
    }
    Err(e) => {
      if let Err(cleanup) = fs::remove_dir_all(staging).await {
        warn!(path = ?staging, error = %cleanup, "failed to remove staging directory");
      }
      Err(e)
    }
  }
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), BuildError> {
  let content = serde_json::to_string_pretty(value).map_err(|e| BuildError::Corrupt {
    path: path.to_path_buf(),
    message: e.to_string(),
  })?;
  fs::write(path, content).await.map_err(BuildError::io(path))
}
