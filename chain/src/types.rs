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

//! Base types that the txhashset sync and validation pipeline requires.

use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::{BlockHeader, OutputFeatures, OutputIdentifier, TxKernel};
use crate::core::ser::{self, Readable, Reader, Writeable, Writer};
use crate::util::secp::pedersen::RangeProof;
use crate::util::ToHex;

/// The tip of a fork. A handle to the fork ancestry from its leaf in the
/// blockchain tree. References the max height and the latest and previous
/// blocks for convenience.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Tip {
	/// Height of the tip (max height of the fork)
	pub height: u64,
	/// Last block pushed to the fork
	pub last_block_h: Hash,
	/// Previous block
	pub prev_block_h: Hash,
}

impl Tip {
	/// Creates a new tip based on provided header.
	pub fn from_header(header: &BlockHeader) -> Tip {
		Tip {
			height: header.height,
			last_block_h: header.hash(),
			prev_block_h: header.prev_hash,
		}
	}

	/// *Really* easy to accidentally call hash() on a tip (thinking its a header).
	/// So lets make hash() do the right thing here.
	pub fn hash(&self) -> Hash {
		self.last_block_h
	}
}

/// The roots of the three MMRs of a txhashset.
#[derive(Debug, Clone, PartialEq)]
pub struct TxHashSetRoots {
	/// Output root
	pub output_root: Hash,
	/// Range Proof root
	pub rproof_root: Hash,
	/// Kernel root
	pub kernel_root: Hash,
}

/// Position of an unspent output in the output MMR (0-based) and the height
/// of the block that created it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CommitPos {
	/// MMR position (0-based)
	pub pos0: u64,
	/// Block height
	pub height: u64,
}

impl Writeable for CommitPos {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.pos0)?;
		writer.write_u64(self.height)?;
		Ok(())
	}
}

impl Readable for CommitPos {
	fn read<R: Reader>(reader: &mut R) -> Result<CommitPos, ser::Error> {
		let pos0 = reader.read_u64()?;
		let height = reader.read_u64()?;
		Ok(CommitPos { pos0, height })
	}
}

/// An output as listed by leaf index, read from a txhashset.
#[derive(Debug, Clone)]
pub struct OutputEntry {
	/// Output MMR position (0-based)
	pub pos0: u64,
	/// Features and commitment
	pub identifier: OutputIdentifier,
	/// Range proof at the same position, if its data is still around
	pub proof: Option<RangeProof>,
	/// Whether the output was spent
	pub spent: bool,
}

/// Printable representation of an output, as served by output listings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OutputPrintable {
	/// The type of output Coinbase|Transaction
	pub output_type: OutputFeatures,
	/// The homomorphic commitment representing the output's amount
	/// (as hex string)
	pub commit: String,
	/// Whether the output has been spent
	pub spent: bool,
	/// Rangeproof (as hex string)
	pub proof: Option<String>,
	/// Rangeproof hash (as hex string)
	pub proof_hash: String,
	/// Block height at which the output is found
	pub block_height: Option<u64>,
	/// Output position in the MMR (1-based)
	pub mmr_index: u64,
}

impl OutputPrintable {
	/// Builds the printable form of an output entry.
	pub fn from_entry(entry: &OutputEntry, block_height: Option<u64>) -> OutputPrintable {
		let (proof, proof_hash) = match &entry.proof {
			Some(p) => (Some(p.bytes().to_hex()), p.hash().to_hex()),
			None => (None, String::new()),
		};
		OutputPrintable {
			output_type: entry.identifier.features,
			commit: entry.identifier.commit.0.to_hex(),
			spent: entry.spent,
			proof,
			proof_hash,
			block_height,
			mmr_index: entry.pos0 + 1,
		}
	}
}

/// A page of outputs, listed by leaf index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OutputListing {
	/// The last available output index
	pub highest_index: u64,
	/// The last insertion index retrieved
	pub last_retrieved_index: u64,
	/// A printable version of the outputs
	pub outputs: Vec<OutputPrintable>,
}

/// A kernel along with where it sits in the chain.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LocatedTxKernel {
	/// The kernel
	pub tx_kernel: TxKernel,
	/// Height of the block including the kernel
	pub height: u64,
	/// Kernel position in the MMR (1-based)
	pub mmr_index: u64,
}

/// Trait to be implemented by a validation process so it can report its
/// progress (kernel and range proof counts).
pub trait TxHashsetWriteStatus {
	/// First setup of the txhashset
	fn on_setup(&self);
	/// Starting validation
	fn on_validation(&self, kernels: u64, kernel_total: u64, rproofs: u64, rproof_total: u64);
	/// Starting to save the txhashset and related data
	fn on_save(&self);
	/// Done writing a new txhashset
	fn on_done(&self);
}

/// Do-nothing implementation of TxHashsetWriteStatus
pub struct NoStatus;

impl TxHashsetWriteStatus for NoStatus {
	fn on_setup(&self) {}
	fn on_validation(&self, _ks: u64, _kts: u64, _rs: u64, _rt: u64) {}
	fn on_save(&self) {}
	fn on_done(&self) {}
}
