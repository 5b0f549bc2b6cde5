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

/// Chain commands processing
use std::fs::File;
use std::path::Path;

use clap::ArgMatches;
use serde_json::{json, Value};

use crate::chain::{self, Chain, NoHooks, TxHashsetWriteStatus};
use crate::config::ChainConfig;
use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::{BlockHeader, BlockSums};
use crate::core::global;
use crate::util::secp::pedersen::Commitment;
use crate::util::{from_hex, ToHex};

/// Error type wrapping underlying module errors.
#[derive(Debug, thiserror::Error)]
enum Error {
	/// Chain error
	#[error("{0}")]
	Chain(#[from] chain::Error),
	/// Bad command line argument
	#[error("Invalid argument: {0}")]
	Argument(String),
	/// Error reading input files
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	/// JSON (de)serialization
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

/// Logs the progress of a txhashset import.
struct LogStatus;

impl TxHashsetWriteStatus for LogStatus {
	fn on_setup(&self) {
		info!("import: extracting snapshot");
	}
	fn on_validation(&self, kernels: u64, kernel_total: u64, rproofs: u64, rproof_total: u64) {
		debug!(
			"import: validated {}/{} kernels, {}/{} range proofs",
			kernels, kernel_total, rproofs, rproof_total
		);
	}
	fn on_save(&self) {
		info!("import: saving txhashset state");
	}
	fn on_done(&self) {
		info!("import: done");
	}
}

/// Runs the chain subcommand against the chain db of the provided config,
/// printing its JSON result. Returns the process exit code.
pub fn chain_command(args: &ArgMatches<'_>, chain_config: &ChainConfig) -> i32 {
	let chain = match Chain::init(
		chain_config.db_root.clone(),
		global::get_genesis_block(),
		chain_config.archive_mode,
	) {
		Ok(c) => c,
		Err(e) => {
			error!("failed to open chain at {}: {}", chain_config.db_root, e);
			eprintln!("Failed to open chain at {}: {}", chain_config.db_root, e);
			return 1;
		}
	};

	let res = match args.subcommand() {
		("import", Some(a)) => import(&chain, a),
		("export", Some(_)) => export(&chain),
		("validate", Some(a)) => validate(&chain, a.is_present("fast")),
		("compact", Some(_)) => compact(&chain),
		("outputs", Some(a)) => outputs(&chain, a),
		("kernel", Some(a)) => kernel(&chain, a),
		("status", Some(_)) => status(&chain),
		(name, _) => Err(Error::Argument(format!(
			"unknown command {}, use 'mwsync help' for details",
			name
		))),
	};

	match res.and_then(|v| serde_json::to_string_pretty(&v).map_err(Error::from)) {
		Ok(out) => {
			println!("{}", out);
			0
		}
		Err(e) => {
			error!("command failed: {}", e);
			eprintln!("{}", e);
			if let Error::Chain(ref e) = e {
				if e.is_retryable() {
					return 3;
				}
			}
			1
		}
	}
}

fn parse_u64(args: &ArgMatches<'_>, name: &str) -> Result<Option<u64>, Error> {
	match args.value_of(name) {
		None => Ok(None),
		Some(v) => v
			.parse::<u64>()
			.map(Some)
			.map_err(|e| Error::Argument(format!("--{} {}: {}", name, v, e))),
	}
}

fn sums_json(sums: &BlockSums) -> Value {
	json!({
		"utxo_sum": sums.utxo_sum.0.to_hex(),
		"kernel_sum": sums.kernel_sum.0.to_hex(),
	})
}

fn import(chain: &Chain, args: &ArgMatches<'_>) -> Result<Value, Error> {
	let hash = args.value_of("hash").unwrap_or_default();
	let hash = Hash::from_hex(hash).map_err(|e| Error::Argument(format!("{}: {}", hash, e)))?;
	let zip = Path::new(args.value_of("zip").unwrap_or_default());

	if let Some(path) = args.value_of("headers") {
		let headers: Vec<BlockHeader> = serde_json::from_reader(File::open(path)?)?;
		let tip = chain.process_headers(&headers)?;
		info!("import: header head now {} at {}", tip.hash(), tip.height);
	}

	let sums = chain.txhashset_write(hash, zip, &LogStatus, &NoHooks)?;
	let head = chain.head()?;
	Ok(json!({
		"head": head,
		"block_sums": sums_json(&sums),
	}))
}

fn export(chain: &Chain) -> Result<Value, Error> {
	let (header, path) = chain.txhashset_read()?;
	Ok(json!({
		"hash": header.hash().to_hex(),
		"height": header.height,
		"path": path.display().to_string(),
	}))
}

fn validate(chain: &Chain, fast: bool) -> Result<Value, Error> {
	let sums = chain.validate(fast)?;
	let head = chain.head()?;
	Ok(json!({
		"head": head,
		"fast": fast,
		"block_sums": sums_json(&sums),
	}))
}

fn compact(chain: &Chain) -> Result<Value, Error> {
	chain.compact()?;
	let head = chain.head()?;
	Ok(json!({ "compacted": true, "head": head }))
}

fn outputs(chain: &Chain, args: &ArgMatches<'_>) -> Result<Value, Error> {
	let start = parse_u64(args, "start")?;
	let max = parse_u64(args, "max")?;
	let listing = chain.get_outputs_by_leaf_index(start, max)?;
	Ok(serde_json::to_value(listing)?)
}

fn kernel(chain: &Chain, args: &ArgMatches<'_>) -> Result<Value, Error> {
	let excess = args.value_of("excess").unwrap_or_default();
	let excess = from_hex(excess)
		.map(Commitment::from_vec)
		.map_err(|e| Error::Argument(format!("excess {}: {}", excess, e)))?;
	let min = parse_u64(args, "min")?;
	let max = parse_u64(args, "max")?;
	let kernel = chain.get_kernel(&excess, min, max)?;
	Ok(serde_json::to_value(kernel)?)
}

fn status(chain: &Chain) -> Result<Value, Error> {
	let head = chain.head()?;
	let header_head = chain.header_head()?;
	let ths = chain.txhashset()?;
	let roots = ths.roots()?;
	let (output_size, rproof_size, kernel_size) = ths.sizes();
	Ok(json!({
		"chain_type": global::get_chain_type(),
		"head": head,
		"header_head": header_head,
		"txhashset": {
			"name": ths.name(),
			"output_root": roots.output_root.to_hex(),
			"rproof_root": roots.rproof_root.to_hex(),
			"kernel_root": roots.kernel_root.to_hex(),
			"output_mmr_size": output_size,
			"rproof_mmr_size": rproof_size,
			"kernel_mmr_size": kernel_size,
		},
	}))
}
