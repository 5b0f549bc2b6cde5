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

//! Blocks and blockheaders

use crate::consensus::{self, reward};
use crate::core::blind::BlindingFactor;
use crate::core::committed::{self, Committed};
use crate::core::hash::{DefaultHashable, Hash, Hashed, ZERO_HASH};
use crate::core::transaction::{self, Input, Output, TxKernel};
use crate::ser::{self, Readable, Reader, Writeable, Writer};
use chrono::prelude::{DateTime, NaiveDateTime, Utc};
use chrono::TimeZone;
use std::fmt;
use util::secp::pedersen::Commitment;

/// Errors thrown by Block validation
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
	/// The sum of output minus input commitments does not
	/// match the sum of kernel commitments
	#[error("Block Input/output vs kernel sum mismatch")]
	KernelSumMismatch,
	/// Underlying tx related error
	#[error("Block Invalid Transaction, {0}")]
	Transaction(#[from] transaction::Error),
	/// Error when verifying kernel sums via committed trait.
	#[error("Block Commits error, {0}")]
	Committed(#[from] committed::Error),
	/// Underlying serialization error.
	#[error("Block serialization error, {0}")]
	Serialization(#[from] ser::Error),
	/// Block has more than one coinbase kernel or output.
	#[error("Block has invalid coinbase")]
	InvalidCoinbase,
}

/// Block header, fairly standard compared to other blockchains.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
	/// Version of the block
	pub version: u16,
	/// Height of this block since the genesis block (height 0)
	pub height: u64,
	/// Hash of the block previous to this in the chain.
	pub prev_hash: Hash,
	/// Timestamp at which the block was built.
	pub timestamp: DateTime<Utc>,
	/// Merklish root of all the commitments in the TxHashSet
	pub output_root: Hash,
	/// Merklish root of all range proofs in the TxHashSet
	pub range_proof_root: Hash,
	/// Merklish root of all transaction kernels in the TxHashSet
	pub kernel_root: Hash,
	/// Total accumulated sum of kernel offsets since genesis block.
	/// We can derive the kernel offset sum for *this* block from
	/// the total kernel offset of the previous block header.
	pub total_kernel_offset: BlindingFactor,
	/// Total size of the output MMR after applying this block
	pub output_mmr_size: u64,
	/// Total size of the kernel MMR after applying this block
	pub kernel_mmr_size: u64,
}

impl DefaultHashable for BlockHeader {}

impl Default for BlockHeader {
	fn default() -> BlockHeader {
		BlockHeader {
			version: 1,
			height: 0,
			prev_hash: ZERO_HASH,
			timestamp: DateTime::<Utc>::from_utc(NaiveDateTime::from_timestamp(0, 0), Utc),
			output_root: ZERO_HASH,
			range_proof_root: ZERO_HASH,
			kernel_root: ZERO_HASH,
			total_kernel_offset: BlindingFactor::zero(),
			output_mmr_size: 0,
			kernel_mmr_size: 0,
		}
	}
}

/// Serialization of a block header
impl Writeable for BlockHeader {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u16(self.version)?;
		writer.write_u64(self.height)?;
		writer.write_i64(self.timestamp.timestamp())?;
		self.prev_hash.write(writer)?;
		self.output_root.write(writer)?;
		self.range_proof_root.write(writer)?;
		self.kernel_root.write(writer)?;
		self.total_kernel_offset.write(writer)?;
		writer.write_u64(self.output_mmr_size)?;
		writer.write_u64(self.kernel_mmr_size)?;
		Ok(())
	}
}

/// Deserialization of a block header
impl Readable for BlockHeader {
	fn read<R: Reader>(reader: &mut R) -> Result<BlockHeader, ser::Error> {
		let version = reader.read_u16()?;
		let height = reader.read_u64()?;
		let timestamp = reader.read_i64()?;
		let prev_hash = Hash::read(reader)?;
		let output_root = Hash::read(reader)?;
		let range_proof_root = Hash::read(reader)?;
		let kernel_root = Hash::read(reader)?;
		let total_kernel_offset = BlindingFactor::read(reader)?;
		let output_mmr_size = reader.read_u64()?;
		let kernel_mmr_size = reader.read_u64()?;

		let timestamp = match Utc.timestamp_opt(timestamp, 0).single() {
			Some(ts) => ts,
			None => return Err(ser::Error::CorruptedData),
		};

		Ok(BlockHeader {
			version,
			height,
			prev_hash,
			timestamp,
			output_root,
			range_proof_root,
			kernel_root,
			total_kernel_offset,
			output_mmr_size,
			kernel_mmr_size,
		})
	}
}

impl BlockHeader {
	/// The "overage" to use when verifying the kernel sums for a single block.
	/// Every block creates exactly one reward worth of new coins.
	pub fn overage(&self) -> i64 {
		-(reward(0) as i64)
	}

	/// The "total overage" to use when verifying the kernel sums for a full
	/// chain state. For a full chain state this is 0 - (height * reward).
	/// The genesis block only counts when it carried a reward output.
	pub fn total_overage(&self, genesis_had_reward: bool) -> i64 {
		let mut reward_count = self.height;
		if genesis_had_reward {
			reward_count += 1;
		}
		-((reward_count * consensus::REWARD) as i64)
	}

	/// Total kernel offset for the chain state up to and including this block.
	pub fn total_kernel_offset(&self) -> BlindingFactor {
		self.total_kernel_offset
	}

	/// Number of leaves in the output MMR as of this header.
	pub fn output_leaf_count(&self) -> u64 {
		crate::core::pmmr::n_leaves(self.output_mmr_size)
	}

	/// Number of leaves in the kernel MMR as of this header.
	pub fn kernel_leaf_count(&self) -> u64 {
		crate::core::pmmr::n_leaves(self.kernel_mmr_size)
	}
}

impl fmt::Display for BlockHeader {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} at {}", self.hash(), self.height)
	}
}

/// A block as expressed in the MimbleWimble protocol. The reward is
/// non-explicit, assumed to be deducible from block height (similar to
/// bitcoin's schedule) and expressed as a global transaction fee (added v.H),
/// additive to the total of fees ever collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
	/// The header with metadata and commitments to the rest of the data
	pub header: BlockHeader,
	/// List of transaction inputs
	pub inputs: Vec<Input>,
	/// List of transaction outputs
	pub outputs: Vec<Output>,
	/// List of kernels with associated proofs (note these are offset from
	/// tx_kernels)
	pub kernels: Vec<TxKernel>,
}

impl Writeable for Block {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.header.write(writer)?;
		self.inputs.write(writer)?;
		self.outputs.write(writer)?;
		self.kernels.write(writer)?;
		Ok(())
	}
}

impl Readable for Block {
	fn read<R: Reader>(reader: &mut R) -> Result<Block, ser::Error> {
		Ok(Block {
			header: BlockHeader::read(reader)?,
			inputs: Vec::read(reader)?,
			outputs: Vec::read(reader)?,
			kernels: Vec::read(reader)?,
		})
	}
}

/// Provides all information from a block that allows the calculation of total
/// Pedersen commitment.
impl Committed for Block {
	fn inputs_committed(&self) -> Vec<Commitment> {
		self.inputs.iter().map(|x| x.commitment()).collect()
	}

	fn outputs_committed(&self) -> Vec<Commitment> {
		self.outputs.iter().map(|x| x.commitment()).collect()
	}

	fn kernels_committed(&self) -> Vec<Commitment> {
		self.kernels.iter().map(|x| x.excess()).collect()
	}
}

impl Block {
	/// Builds a new block on top of the provided previous header, carrying the
	/// provided inputs, outputs and kernels. Roots and MMR sizes are left for
	/// the chain to fill in.
	pub fn new(
		prev: &BlockHeader,
		inputs: Vec<Input>,
		outputs: Vec<Output>,
		kernels: Vec<TxKernel>,
		total_kernel_offset: BlindingFactor,
	) -> Block {
		let header = BlockHeader {
			height: prev.height + 1,
			prev_hash: prev.hash(),
			timestamp: prev.timestamp + chrono::Duration::seconds(consensus::BLOCK_TIME_SEC as i64),
			total_kernel_offset,
			..Default::default()
		};
		Block {
			header,
			inputs,
			outputs,
			kernels,
		}
	}

	/// Blockhash, computed using only the header
	pub fn hash(&self) -> Hash {
		self.header.hash()
	}

	/// Get inputs
	pub fn inputs(&self) -> &[Input] {
		&self.inputs
	}

	/// Get outputs
	pub fn outputs(&self) -> &[Output] {
		&self.outputs
	}

	/// Get kernels
	pub fn kernels(&self) -> &[TxKernel] {
		&self.kernels
	}

	/// Validates everything we can check about the block in isolation:
	/// a single coinbase output and kernel (except at genesis), the range
	/// proofs and the kernel signatures. The sums are checked by the chain
	/// against the parent block sums.
	pub fn validate(&self) -> Result<(), Error> {
		let coinbase_outputs = self.outputs.iter().filter(|x| x.is_coinbase()).count();
		let coinbase_kernels = self.kernels.iter().filter(|x| x.is_coinbase()).count();
		if self.header.height > 0 && (coinbase_outputs != 1 || coinbase_kernels != 1) {
			return Err(Error::InvalidCoinbase);
		}

		let (commits, proofs): (Vec<_>, Vec<_>) = self
			.outputs
			.iter()
			.map(|x| (x.commitment(), x.proof()))
			.unzip();
		Output::batch_verify_proofs(&commits, &proofs)?;
		TxKernel::batch_sig_verify(&self.kernels)?;
		Ok(())
	}
}
