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

//! Public types for config modules

use std::io;
use std::path::PathBuf;

use crate::core::global::ChainTypes;
use crate::util::LoggingConfig;

/// Error type wrapping config errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// Error with parsing of config file
	#[error("Error parsing configuration file at {0} - {1}")]
	ParseError(String, String),

	/// Error with fileIO while reading config file
	#[error("{1} {0}")]
	FileIOError(String, String),

	/// No file found
	#[error("Configuration file not found: {0}")]
	FileNotFoundError(String),

	/// Error serializing config values
	#[error("Error serializing configuration: {0}")]
	SerializationError(String),
}

impl From<io::Error> for ConfigError {
	fn from(error: io::Error) -> ConfigError {
		ConfigError::FileIOError(
			String::from(""),
			format!("Error loading config file: {}", error),
		)
	}
}

/// Where the chain lives and which parameters it runs with.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChainConfig {
	/// Directory under which the chain db and txhashsets are stored
	pub db_root: String,
	/// Chain parameters (genesis, cut-through horizon)
	pub chain_type: ChainTypes,
	/// Never compact the txhashset
	#[serde(default)]
	pub archive_mode: bool,
}

impl Default for ChainConfig {
	fn default() -> ChainConfig {
		ChainConfig {
			db_root: "chain_data".to_owned(),
			chain_type: ChainTypes::default(),
			archive_mode: false,
		}
	}
}

/// Holds the configuration file path along with its content. The path is
/// only tracked, never serialized.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
	/// Keep track of the file we've read
	pub config_file_path: Option<PathBuf>,
	/// Global member config
	pub members: Option<ConfigMembers>,
}

/// Content of the configuration file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConfigMembers {
	/// Config file version (None == version 1)
	pub config_file_version: Option<u32>,
	/// Chain config
	#[serde(default)]
	pub chain: ChainConfig,
	/// Logging config
	pub logging: Option<LoggingConfig>,
}
