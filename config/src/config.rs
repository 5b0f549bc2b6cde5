// Copyright 2021 The Grin Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration file management

use std::env;
use std::fs::{self, File};
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use crate::comments::insert_comments;
use crate::types::{ChainConfig, ConfigError, ConfigMembers, GlobalConfig};
use crate::util::LoggingConfig;

/// The default file name to use when trying to derive
/// the config file location
pub const CONFIG_FILE_NAME: &str = "mwsync.toml";
/// Name of the directory under the user home holding the default config
/// and chain data
pub const MWSYNC_HOME: &str = ".mwsync";
const CHAIN_DATA_DIR: &str = "chain_data";

fn mwsync_home() -> PathBuf {
	match dirs::home_dir() {
		Some(mut p) => {
			p.push(MWSYNC_HOME);
			p
		}
		None => PathBuf::from(MWSYNC_HOME),
	}
}

/// Handles setup and detection of paths. An explicit path has to exist,
/// otherwise the config is looked up in the working directory, then in
/// the mwsync home (where a default one gets written if missing).
pub fn initial_setup(config_file_path: Option<&str>) -> Result<GlobalConfig, ConfigError> {
	if let Some(p) = config_file_path {
		return GlobalConfig::new(p);
	}

	let local = env::current_dir()?.join(CONFIG_FILE_NAME);
	if local.exists() {
		return GlobalConfig::new(&path_str(&local)?);
	}

	let home = mwsync_home();
	if !home.exists() {
		fs::create_dir_all(&home)?;
	}
	let config_path = home.join(CONFIG_FILE_NAME);
	if !config_path.exists() {
		let mut default_config = GlobalConfig::for_dir(&home)?;
		default_config.write_to_file(&path_str(&config_path)?)?;
	}
	GlobalConfig::new(&path_str(&config_path)?)
}

fn path_str(p: &Path) -> Result<String, ConfigError> {
	p.to_str()
		.map(|s| s.to_owned())
		.ok_or_else(|| ConfigError::FileIOError(format!("{:?}", p), "Invalid path".to_owned()))
}

/// Returns the defaults, as strewn throughout the code
impl Default for ConfigMembers {
	fn default() -> ConfigMembers {
		ConfigMembers {
			config_file_version: Some(1),
			chain: ChainConfig::default(),
			logging: Some(LoggingConfig::default()),
		}
	}
}

impl Default for GlobalConfig {
	fn default() -> GlobalConfig {
		GlobalConfig {
			config_file_path: None,
			members: Some(ConfigMembers::default()),
		}
	}
}

impl GlobalConfig {
	/// Requires the path to a config file
	pub fn new(file_path: &str) -> Result<GlobalConfig, ConfigError> {
		let config_file = PathBuf::from(file_path);
		if !config_file.exists() {
			return Err(ConfigError::FileNotFoundError(file_path.to_owned()));
		}
		let mut return_value = GlobalConfig::default();
		return_value.config_file_path = Some(config_file);
		return_value.read_config()
	}

	/// Defaults, with the chain data and log file under the provided dir.
	pub fn for_dir(dir: &Path) -> Result<GlobalConfig, ConfigError> {
		let mut config = GlobalConfig::default();
		if let Some(ref mut members) = config.members {
			members.chain.db_root = path_str(&dir.join(CHAIN_DATA_DIR))?;
			if let Some(ref mut logging) = members.logging {
				logging.log_file_path = path_str(&dir.join("mwsync.log"))?;
			}
		}
		Ok(config)
	}

	/// Read config
	fn read_config(mut self) -> Result<GlobalConfig, ConfigError> {
		let path = match self.config_file_path {
			Some(ref p) => p.clone(),
			None => return Err(ConfigError::FileNotFoundError("".to_owned())),
		};
		let mut file = File::open(&path)?;
		let mut contents = String::new();
		file.read_to_string(&mut contents)?;
		match toml::from_str::<ConfigMembers>(&contents) {
			Ok(members) => {
				self.members = Some(members);
				Ok(self)
			}
			Err(e) => Err(ConfigError::ParseError(
				path.to_string_lossy().into_owned(),
				format!("{}", e),
			)),
		}
	}

	/// Chain section, defaults if none was read
	pub fn chain_config(&self) -> ChainConfig {
		self.members
			.as_ref()
			.map(|m| m.chain.clone())
			.unwrap_or_default()
	}

	/// Logging section, if any
	pub fn logging_config(&self) -> Option<LoggingConfig> {
		self.members.as_ref().and_then(|m| m.logging.clone())
	}

	/// Serialize config
	pub fn ser_config(&self) -> Result<String, ConfigError> {
		let members = self
			.members
			.as_ref()
			.ok_or_else(|| ConfigError::SerializationError("no config members".to_owned()))?;
		toml::to_string(members).map_err(|e| ConfigError::SerializationError(format!("{}", e)))
	}

	/// Write configuration to a file
	pub fn write_to_file(&mut self, name: &str) -> Result<(), ConfigError> {
		let conf_out = self.ser_config()?;
		let conf_out = insert_comments(conf_out);
		let mut file = File::create(name)?;
		file.write_all(conf_out.as_bytes())?;
		self.config_file_path = Some(PathBuf::from(name));
		Ok(())
	}
}
