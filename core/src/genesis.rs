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

//! Definition of the genesis block. Placeholder for now.

use crate::core::block::{Block, BlockHeader};
use crate::core::hash::ZERO_HASH;
use chrono::prelude::{TimeZone, Utc};

/// Genesis block definition for development networks. The tx data is
/// empty and the MMR roots are the roots of the empty MMRs.
pub fn genesis_dev() -> Block {
	Block {
		header: BlockHeader {
			height: 0,
			timestamp: Utc.ymd(1997, 8, 4).and_hms(0, 0, 0),
			output_root: ZERO_HASH,
			range_proof_root: ZERO_HASH,
			kernel_root: ZERO_HASH,
			..Default::default()
		},
		inputs: vec![],
		outputs: vec![],
		kernels: vec![],
	}
}

/// Mainnet genesis block. Carries no reward output, so it does not count
/// towards the total overage.
pub fn genesis_main() -> Block {
	let mut genesis = genesis_dev();
	genesis.header.timestamp = Utc.ymd(2019, 1, 15).and_hms(16, 1, 26);
	genesis
}
