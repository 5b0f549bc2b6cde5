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

//! Running totals of the unspent output and kernel commitments as of a
//! block. Checking a new block against them amounts to a full kernel sums
//! check of the whole chain up to that block.

use crate::core::blind::BlindingFactor;
use crate::core::committed::{self, Committed};
use crate::ser::{self, Readable, Reader, Writeable, Writer};
use util::secp::pedersen::Commitment;
use util::secp_static;

/// Sum of the unspent outputs and sum of the kernel excesses, offsets
/// excluded, as of a given block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSums {
	/// The sum of the unspent outputs.
	pub utxo_sum: Commitment,
	/// The sum of all kernels.
	pub kernel_sum: Commitment,
}

impl BlockSums {
	/// Sums as of `block`, applied on top of these ones. Fails unless the
	/// new unspent outputs sum to the new kernel sum plus `offset`, the
	/// total kernel offset as of that block.
	pub fn next(
		&self,
		block: &dyn Committed,
		overage: i64,
		offset: BlindingFactor,
	) -> Result<BlockSums, committed::Error> {
		let applied = Applied { prev: self, block };
		let (utxo_sum, kernel_sum) = applied.verify_kernel_sums(overage, offset)?;
		Ok(BlockSums {
			utxo_sum,
			kernel_sum,
		})
	}
}

// The previous totals count as one more output and one more kernel.
struct Applied<'a> {
	prev: &'a BlockSums,
	block: &'a dyn Committed,
}

impl<'a> Committed for Applied<'a> {
	fn inputs_committed(&self) -> Vec<Commitment> {
		self.block.inputs_committed()
	}

	fn outputs_committed(&self) -> Vec<Commitment> {
		let mut commits = self.block.outputs_committed();
		commits.push(self.prev.utxo_sum);
		commits
	}

	fn kernels_committed(&self) -> Vec<Commitment> {
		let mut commits = self.block.kernels_committed();
		commits.push(self.prev.kernel_sum);
		commits
	}
}

impl Default for BlockSums {
	fn default() -> BlockSums {
		let zero = secp_static::commit_to_zero_value();
		BlockSums {
			utxo_sum: zero,
			kernel_sum: zero,
		}
	}
}

impl Writeable for BlockSums {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.utxo_sum.write(writer)?;
		self.kernel_sum.write(writer)
	}
}

impl Readable for BlockSums {
	fn read<R: Reader>(reader: &mut R) -> Result<BlockSums, ser::Error> {
		let utxo_sum = Commitment::read(reader)?;
		let kernel_sum = Commitment::read(reader)?;
		Ok(BlockSums {
			utxo_sum,
			kernel_sum,
		})
	}
}
