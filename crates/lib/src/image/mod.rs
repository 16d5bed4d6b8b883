//! Image realization and bookkeeping.
//!
//! - [`ImageBuilder`] turns a [`Blueprint`](crate::blueprint::Blueprint)
//!   and a build context into content-addressed layers and images.
//! - [`ImageIndex`] remembers which images were built and from where.
//! - [`store`] owns the on-disk layout and completion markers.

mod execute;
pub mod index;
pub mod store;
mod types;

pub use execute::{CODE_EXCLUSIONS, ImageBuilder};
pub use index::{ImageIndex, IndexEntry, IndexError};
pub use types::*;

use std::path::Path;

use crate::util::hash::ObjectHash;

/// Load a finished image from the store.
///
/// Fails with [`BuildError::Corrupt`] if the image is missing or its
/// completion marker does not match its content.
pub fn load_image(store: &Path, id: &ObjectHash) -> Result<(ImageRecord, LayerRecord), BuildError> {
  let image_dir = store::image_path(store, id);
  if !store::is_complete(&image_dir) {
    return Err(BuildError::Corrupt {
      path: image_dir,
      message: "image is missing or incomplete; rebuild it".to_string(),
    });
  }
  let record = ImageRecord::load(&image_dir)?;

  let layer_dir = store::layer_path(store, &record.base_layer);
  if !store::is_complete(&layer_dir) {
    return Err(BuildError::Corrupt {
      path: layer_dir,
      message: "base layer is missing or incomplete; rebuild the image".to_string(),
    });
  }
  let layer = LayerRecord::load(&layer_dir)?;
  Ok((record, layer))
}
