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

//! Comments written into generated config files, ahead of the table or key
//! they describe.

const FILE_HEADER: &[&str] = &[
	"Generated Configuration File for mwsync",
	"",
	"When running the mwsync executable without specifying a config file, it",
	"will look for this file in two places, in the following order:",
	"",
	"-The working directory",
	"-[user home]/.mwsync",
	"",
];

fn section(title: &str) -> Vec<String> {
	let rule = "#".repeat(41);
	vec![rule.clone(), format!("### {:<34}###", title), rule]
}

fn key_comment(key: &str) -> Option<&'static [&'static str]> {
	let lines: &'static [&'static str] = match key {
		"db_root" => &["the directory in which the chain db and the txhashsets are stored"],
		"chain_type" => &[
			"The chain type, which defines the genesis block and the cut-through horizon.",
			"Can be:",
			"AutomatedTesting - For CI builds, short horizon",
			"UserTesting - For regular user testing",
			"Testnet - Protocol testing network",
			"Mainnet - Main production network",
		],
		"archive_mode" => &["run in archive mode, spent outputs are never compacted away"],
		"log_to_stdout" => &["whether to log to stdout"],
		"stdout_log_level" => &["log level for stdout: ERROR, WARN, INFO, DEBUG, TRACE"],
		"log_to_file" => &["whether to log to a file"],
		"file_log_level" => &["log level for file: ERROR, WARN, INFO, DEBUG, TRACE"],
		"log_file_path" => &["log file path"],
		"log_file_append" => {
			&["whether to append to the log file (true), or replace it on every run (false)"]
		}
		"log_max_size" => &[
			"maximum log file size in bytes before performing log rotation",
			"comment it to disable log rotation",
		],
		"log_max_files" => &["maximum count of the log files to rotate over"],
		_ => return None,
	};
	Some(lines)
}

/// Comment lines (without the leading '#') to put ahead of a line of the
/// serialized config.
fn comment_for(line: &str) -> Option<Vec<String>> {
	let line = line.trim();
	let lines = match line {
		"[chain]" => section("CHAIN CONFIGURATION"),
		"[logging]" => section("LOGGING CONFIGURATION"),
		_ => {
			let key = line.split('=').next()?.trim();
			if key == "config_file_version" {
				FILE_HEADER.iter().map(|l| l.to_string()).collect()
			} else {
				key_comment(key)?.iter().map(|l| l.to_string()).collect()
			}
		}
	};
	Some(lines)
}

/// Adds the comments to a serialized config, each separated from what
/// comes before by a blank line.
pub fn insert_comments(orig: String) -> String {
	let mut out = String::with_capacity(orig.len() * 2);
	for line in orig.lines() {
		if let Some(comment) = comment_for(line) {
			out.push('\n');
			for c in comment {
				if c.starts_with('#') {
					out.push_str(&c);
				} else {
					out.push('#');
					out.push_str(&c);
				}
				out.push('\n');
			}
		}
		out.push_str(line);
		out.push('\n');
	}
	out
}
