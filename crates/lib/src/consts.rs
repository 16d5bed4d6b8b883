//! Fixed names and contract constants.

pub const APP_NAME: &str = "cdstage";

/// Length of the truncated SHA-256 used for store object names.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Dependency manifest file name, relative to the build context.
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Application code directory, relative to the build context.
pub const APP_DIR: &str = "app";

/// Python module file that must expose the ASGI object.
pub const APP_ENTRY_FILE: &str = "main.py";

/// Import path of the ASGI application object.
pub const APP_MODULE: &str = "app.main:app";

pub const BIND_HOST: &str = "0.0.0.0";

pub const BIND_PORT: u16 = 8000;

/// Environment variable carrying the profile name into the running image.
pub const ENVIRONMENT_VAR: &str = "environment";

pub const RELOAD_FLAG: &str = "--reload";

/// Project configuration file name, relative to the build context.
pub const PROJECT_CONFIG_FILE: &str = "cdstage.toml";

pub const DEFAULT_BASE_IMAGE: &str = "python:3.11-slim";

pub const DEFAULT_WORKDIR: &str = "/app";

pub const DEFAULT_SERVER_PROGRAM: &str = "uvicorn";

pub const DEFAULT_INSTALLER_PROGRAM: &str = "pip";

/// Directory inside a base layer where dependencies are installed.
pub const SITE_PACKAGES_DIR: &str = "site-packages";
