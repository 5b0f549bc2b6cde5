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

//! Values that should be shared across all modules, without necessarily
//! having to pass them all over the place, but aren't consensus values.
//! should be used sparingly.

use crate::consensus;
use crate::core::block::Block;
use crate::genesis;
use util::RwLock;

/// Automated testing cut through horizon.
pub const AUTOMATED_TESTING_CUT_THROUGH_HORIZON: u32 = 70;

/// User testing cut through horizon.
pub const USER_TESTING_CUT_THROUGH_HORIZON: u32 = 70;

/// Number of outputs whose range proofs are verified in a single batch.
pub const RANGEPROOF_BATCH_SIZE: usize = 1_000;

/// Types of chain a server can run with, dictates the genesis block and
/// and mining parameters used.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChainTypes {
	/// For CI testing
	AutomatedTesting,
	/// For User testing
	UserTesting,
	/// Protocol testing network
	Testnet,
	/// Main production network
	Mainnet,
}

impl ChainTypes {
	/// Short name representing the chain type ("test", "main", etc.)
	pub fn shortname(&self) -> String {
		match *self {
			ChainTypes::AutomatedTesting => "auto".to_owned(),
			ChainTypes::UserTesting => "user".to_owned(),
			ChainTypes::Testnet => "test".to_owned(),
			ChainTypes::Mainnet => "main".to_owned(),
		}
	}
}

impl Default for ChainTypes {
	fn default() -> ChainTypes {
		ChainTypes::Mainnet
	}
}

lazy_static! {
	/// The chain type the process is running with.
	pub static ref CHAIN_TYPE: RwLock<ChainTypes> = RwLock::new(ChainTypes::Mainnet);
}

/// Set the chain type on a per-process basis.
pub fn set_chain_type(new_type: ChainTypes) {
	let mut param_ref = CHAIN_TYPE.write();
	*param_ref = new_type;
}

/// Get the chain type.
pub fn get_chain_type() -> ChainTypes {
	*CHAIN_TYPE.read()
}

/// Are we in automated testing mode?
pub fn is_automated_testing_mode() -> bool {
	get_chain_type() == ChainTypes::AutomatedTesting
}

/// Horizon at which we can cut-through and do full local pruning
pub fn cut_through_horizon() -> u32 {
	match get_chain_type() {
		ChainTypes::AutomatedTesting => AUTOMATED_TESTING_CUT_THROUGH_HORIZON,
		ChainTypes::UserTesting => USER_TESTING_CUT_THROUGH_HORIZON,
		_ => consensus::CUT_THROUGH_HORIZON,
	}
}

/// Genesis block for the current chain type.
pub fn get_genesis_block() -> Block {
	match get_chain_type() {
		ChainTypes::Mainnet => genesis::genesis_main(),
		_ => genesis::genesis_dev(),
	}
}
