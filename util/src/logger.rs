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

//! Logging setup shared by every crate of the workspace. Records of our own
//! modules go to the console and optionally to a (rolling) log file, panics
//! are sent to the log as well.

use std::{panic, thread};

use backtrace::Backtrace;
use log::{Level, LevelFilter, Record};
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::Append;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::filter::{threshold::ThresholdFilter, Filter, Response};

use crate::Mutex;

lazy_static! {
	/// Whether a logger was installed, the global one can only be set once.
	static ref WAS_INIT: Mutex<bool> = Mutex::new(false);
	/// Log file of the installed logger, pointed at by the panic hook.
	static ref LOG_FILE: Mutex<Option<String>> = Mutex::new(None);
}

const LOGGING_PATTERN: &str = "{d(%Y%m%d %H:%M:%S%.3f)} {h({l})} {M} - {m}{n}";
const TEST_LOGGING_PATTERN: &str = "{d(%H:%M:%S%.3f)} {l} {M} - {m}{n}";

const DEFAULT_ROTATE_LOG_FILES: u32 = 32;
const DEFAULT_LOG_MAX_SIZE: u64 = 16 * 1024 * 1024;

/// Logging section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
	/// whether to log to stdout
	pub log_to_stdout: bool,
	/// logging level for stdout
	pub stdout_log_level: Level,
	/// whether to log to file
	pub log_to_file: bool,
	/// log file level
	pub file_log_level: Level,
	/// Log file path
	pub log_file_path: String,
	/// Append to an existing log file instead of truncating it
	pub log_file_append: bool,
	/// Rotate the log file once it reaches this many bytes
	pub log_max_size: Option<u64>,
	/// Rotated files kept, 32 if unset
	pub log_max_files: Option<u32>,
}

impl Default for LoggingConfig {
	fn default() -> LoggingConfig {
		LoggingConfig {
			log_to_stdout: true,
			stdout_log_level: Level::Warn,
			log_to_file: true,
			file_log_level: Level::Info,
			log_file_path: String::from("mwsync.log"),
			log_file_append: true,
			log_max_size: Some(DEFAULT_LOG_MAX_SIZE),
			log_max_files: Some(DEFAULT_ROTATE_LOG_FILES),
		}
	}
}

impl LoggingConfig {
	/// Most verbose level any enabled output asks for.
	pub fn min_level(&self) -> LevelFilter {
		let mut level = LevelFilter::Off;
		if self.log_to_stdout {
			level = level.max(self.stdout_log_level.to_level_filter());
		}
		if self.log_to_file {
			level = level.max(self.file_log_level.to_level_filter());
		}
		level
	}
}

/// Only lets through records of our own crates.
#[derive(Debug)]
struct OwnModules;

impl Filter for OwnModules {
	fn filter(&self, record: &Record<'_>) -> Response {
		match record.module_path() {
			Some(path) if path.starts_with("mwsync") => Response::Neutral,
			_ => Response::Reject,
		}
	}
}

fn console_appender(level: LevelFilter, pattern: &str) -> Appender {
	let stdout = ConsoleAppender::builder()
		.encoder(Box::new(PatternEncoder::new(pattern)))
		.build();
	Appender::builder()
		.filter(Box::new(ThresholdFilter::new(level)))
		.filter(Box::new(OwnModules))
		.build("stdout", Box::new(stdout))
}

fn file_appender(c: &LoggingConfig) -> Result<Appender, String> {
	let encoder = Box::new(PatternEncoder::new(LOGGING_PATTERN));
	let file: Box<dyn Append> = match c.log_max_size {
		Some(size) => {
			let count = c.log_max_files.unwrap_or(DEFAULT_ROTATE_LOG_FILES);
			let roller = FixedWindowRoller::builder()
				.build(&format!("{}.{{}}.gz", c.log_file_path), count)
				.map_err(|e| e.to_string())?;
			let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(size)), Box::new(roller));
			let appender = RollingFileAppender::builder()
				.append(c.log_file_append)
				.encoder(encoder)
				.build(&c.log_file_path, Box::new(policy))
				.map_err(|e| e.to_string())?;
			Box::new(appender)
		}
		None => {
			let appender = FileAppender::builder()
				.append(c.log_file_append)
				.encoder(encoder)
				.build(&c.log_file_path)
				.map_err(|e| e.to_string())?;
			Box::new(appender)
		}
	};
	Ok(Appender::builder()
		.filter(Box::new(ThresholdFilter::new(
			c.file_log_level.to_level_filter(),
		)))
		.filter(Box::new(OwnModules))
		.build("file", file))
}

/// Builds the log4rs configuration for the provided logging config. A log
/// file that can't be opened is reported on stderr and left out.
pub fn build_config(c: &LoggingConfig) -> Result<Config, String> {
	let mut appenders = vec![];
	if c.log_to_stdout {
		appenders.push(console_appender(
			c.stdout_log_level.to_level_filter(),
			LOGGING_PATTERN,
		));
	}
	if c.log_to_file {
		match file_appender(c) {
			Ok(appender) => appenders.push(appender),
			Err(e) => eprintln!("Failed to create logfile {}: {}", c.log_file_path, e),
		}
	}

	let names: Vec<String> = appenders.iter().map(|a| a.name().to_owned()).collect();
	Config::builder()
		.appenders(appenders)
		.build(Root::builder().appenders(names).build(c.min_level()))
		.map_err(|e| e.to_string())
}

/// Installs the logger for the provided config and the panic hook. Without
/// a config only the panic hook is installed.
pub fn init_logger(config: Option<LoggingConfig>) {
	if let Some(c) = config {
		let mut was_init = WAS_INIT.lock();
		if *was_init {
			warn!("logger already initialized, ignoring new config");
		} else {
			match build_config(&c).map(log4rs::init_config) {
				Ok(Ok(_)) => {
					if c.log_to_file {
						*LOG_FILE.lock() = Some(c.log_file_path.clone());
					}
					*was_init = true;
					info!(
						"logger initialized, stdout: {:?}, file: {:?}",
						c.stdout_log_level, c.file_log_level
					);
				}
				Ok(Err(e)) => eprintln!("Failed to set logger: {}", e),
				Err(e) => eprintln!("Invalid logging configuration: {}", e),
			}
		}
	}

	send_panic_to_log();
}

/// Debug level console logging for unit and integration tests.
pub fn init_test_logger() {
	let mut was_init = WAS_INIT.lock();
	if *was_init {
		return;
	}
	let config = Config::builder()
		.appender(console_appender(LevelFilter::Debug, TEST_LOGGING_PATTERN))
		.build(Root::builder().appender("stdout").build(LevelFilter::Debug));
	if let Ok(config) = config {
		// another test harness thread may have raced us to the global logger
		let _ = log4rs::init_config(config);
	}
	*was_init = true;
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
	if let Some(s) = payload.downcast_ref::<&'static str>() {
		*s
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.as_str()
	} else {
		"Box<Any>"
	}
}

fn send_panic_to_log() {
	panic::set_hook(Box::new(|info| {
		let backtrace = Backtrace::new();
		let thread = thread::current();
		let thread = thread.name().unwrap_or("unnamed");
		let msg = panic_message(info.payload());

		match info.location() {
			Some(location) => error!(
				"\nthread '{}' panicked at '{}': {}:{}{:?}\n\n",
				thread,
				msg,
				location.file(),
				location.line(),
				backtrace
			),
			None => error!("thread '{}' panicked at '{}'{:?}", thread, msg, backtrace),
		}

		match LOG_FILE.lock().as_ref() {
			Some(path) => eprintln!(
				"Thread '{}' panicked with message:\n\"{}\"\nSee {} for further details.",
				thread, msg, path
			),
			None => eprintln!("Thread '{}' panicked with message:\n\"{}\"", thread, msg),
		}
	}));
}
