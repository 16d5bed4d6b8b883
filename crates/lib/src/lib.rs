//! cdstage-lib: build and runtime stages for the document simplifier service
//!
//! This crate resolves a deployment profile into container-style images:
//! - `Blueprint`: the shared `base` stage plus one leaf stage per profile
//! - `ImageBuilder`: realizes the base layer once and assembles images on top
//! - `ImageIndex`: remembers which image was built last for each profile
//! - `Launcher`: starts an image's server process with its startup config

pub mod blueprint;
pub mod config;
pub mod consts;
pub mod dockerfile;
pub mod gc;
pub mod image;
pub mod install;
pub mod launch;
pub mod platform;
pub mod profile;
pub mod requirements;
pub mod stage;
pub mod store_lock;
pub mod util;
