// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! XDG Base Directory compliant path resolution.

use std::path::PathBuf;

use crate::ConfigError;

/// Resolved config paths for Sounder.
#[derive(Debug, Clone)]
pub struct PathsConfig {
	/// User config file: ~/.config/sounder/config.toml
	pub user_config_file: PathBuf,
	/// System config file: /etc/sounder/config.toml
	pub system_config_file: PathBuf,
}

impl PathsConfig {
	/// Get the config directory (parent of user_config_file)
	pub fn config_dir(&self) -> PathBuf {
		self
			.user_config_file
			.parent()
			.map(|p| p.to_path_buf())
			.unwrap_or_else(|| self.user_config_file.clone())
	}
}

impl Default for PathsConfig {
	fn default() -> Self {
		Self {
			user_config_file: PathBuf::from("~/.config/sounder/config.toml"),
			system_config_file: PathBuf::from("/etc/sounder/config.toml"),
		}
	}
}

/// Resolve config paths according to the Base Directory Specification.
///
/// Uses XDG_CONFIG_HOME if set, otherwise ~/.config.
pub fn resolve_xdg_paths() -> Result<PathsConfig, ConfigError> {
	let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;

	let config_home = std::env::var_os("XDG_CONFIG_HOME")
		.map(PathBuf::from)
		.unwrap_or_else(|| home.join(".config"));

	tracing::debug!(config_home = %config_home.display(), "resolved XDG paths");

	Ok(PathsConfig {
		user_config_file: config_home.join("sounder/config.toml"),
		system_config_file: PathBuf::from("/etc/sounder/config.toml"),
	})
}
