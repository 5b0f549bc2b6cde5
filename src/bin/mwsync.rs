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

//! Main for building the mwsync binary: snapshot import and export,
//! validation and inspection of a local chain db.

#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;

use mwsync_chain as chain;
use mwsync_config as config;
use mwsync_core as core;
use mwsync_util as util;

mod cmd;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};

use crate::core::global;

fn main() {
	let exit_code = real_main();
	std::process::exit(exit_code);
}

fn cli() -> App<'static, 'static> {
	App::new("mwsync")
		.version(crate_version!())
		.author(crate_authors!())
		.about("Mimblewimble txhashset sync and validation.")
		.setting(AppSettings::SubcommandRequiredElseHelp)
		.arg(
			Arg::with_name("config")
				.short("c")
				.long("config")
				.value_name("FILE")
				.help("Path to a mwsync.toml configuration file")
				.takes_value(true),
		)
		.subcommand(
			SubCommand::with_name("import")
				.about("Fast sync the chain from a local txhashset snapshot")
				.arg(
					Arg::with_name("hash")
						.help("Hash of the header the snapshot was taken at")
						.required(true)
						.index(1),
				)
				.arg(
					Arg::with_name("zip")
						.help("Snapshot archive")
						.required(true)
						.index(2),
				)
				.arg(
					Arg::with_name("headers")
						.long("headers")
						.value_name("FILE")
						.help("JSON array of headers to process before importing")
						.takes_value(true),
				),
		)
		.subcommand(
			SubCommand::with_name("export")
				.about("Write a snapshot of the live txhashset at the chain head"),
		)
		.subcommand(
			SubCommand::with_name("validate")
				.about("Validate the live txhashset against the chain head")
				.arg(
					Arg::with_name("fast")
						.long("fast")
						.help("Skip range proof and kernel signature verification"),
				),
		)
		.subcommand(
			SubCommand::with_name("compact")
				.about("Drop the data of outputs spent beyond the cut-through horizon"),
		)
		.subcommand(
			SubCommand::with_name("outputs")
				.about("List outputs by leaf insertion index")
				.arg(
					Arg::with_name("start")
						.long("start")
						.value_name("N")
						.help("First leaf index, 1-based")
						.takes_value(true),
				)
				.arg(
					Arg::with_name("max")
						.long("max")
						.value_name("N")
						.help("Maximum number of outputs to list")
						.takes_value(true),
				),
		)
		.subcommand(
			SubCommand::with_name("kernel")
				.about("Look a kernel up by excess")
				.arg(
					Arg::with_name("excess")
						.help("Kernel excess commitment, hex")
						.required(true)
						.index(1),
				)
				.arg(
					Arg::with_name("min")
						.long("min")
						.value_name("HEIGHT")
						.help("Lowest block height to search")
						.takes_value(true),
				)
				.arg(
					Arg::with_name("max")
						.long("max")
						.value_name("HEIGHT")
						.help("Highest block height to search")
						.takes_value(true),
				),
		)
		.subcommand(SubCommand::with_name("status").about("Chain heads and txhashset roots"))
}

fn real_main() -> i32 {
	let args: ArgMatches<'_> = cli().get_matches();

	let global_config = match config::initial_setup(args.value_of("config")) {
		Ok(c) => c,
		Err(e) => {
			eprintln!("Error loading mwsync configuration: {}", e);
			return 1;
		}
	};

	util::init_logger(global_config.logging_config());
	if let Some(ref path) = global_config.config_file_path {
		info!("Using configuration file at {}", path.display());
	}

	let chain_config = global_config.chain_config();
	global::set_chain_type(chain_config.chain_type);

	cmd::chain_command(&args, &chain_config)
}
