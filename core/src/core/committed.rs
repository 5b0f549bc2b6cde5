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

//! The Committed trait and associated errors.

use crate::core::blind::BlindingFactor;
use util::secp::pedersen::Commitment;
use util::secp::{self, Secp256k1};
use util::{secp_static, static_secp_instance};

/// Errors from summing and verifying kernel excesses via committed trait.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	/// Secp related error.
	#[error("Secp error: {0}")]
	Secp(#[from] secp::Error),
	/// Kernel sums do not equal output sums.
	#[error("kernel sum mismatch")]
	KernelSumMismatch,
}

/// `positive - negative`, leaving zero commitments out. Summing nothing
/// gives the zero commitment.
fn commit_sum(
	secp: &Secp256k1,
	mut positive: Vec<Commitment>,
	mut negative: Vec<Commitment>,
) -> Result<Commitment, Error> {
	let zero = secp_static::commit_to_zero_value();
	positive.retain(|x| *x != zero);
	negative.retain(|x| *x != zero);
	if positive.is_empty() && negative.is_empty() {
		return Ok(zero);
	}
	Ok(secp.commit_sum(positive, negative)?)
}

/// Anything holding input, output and kernel commitments: a block, a whole
/// txhashset or running totals. The accounting identity is that outputs
/// minus inputs, plus or minus the overage, equal the kernel excesses plus
/// the offset.
pub trait Committed {
	/// Input commitments.
	fn inputs_committed(&self) -> Vec<Commitment>;

	/// Output commitments.
	fn outputs_committed(&self) -> Vec<Commitment>;

	/// Kernel excesses.
	fn kernels_committed(&self) -> Vec<Commitment>;

	/// Outputs minus inputs. A positive overage counts as one more output,
	/// a negative one as one more input.
	fn sum_commitments(&self, overage: i64) -> Result<Commitment, Error> {
		let mut inputs = self.inputs_committed();
		let mut outputs = self.outputs_committed();

		let secp = static_secp_instance();
		let secp = secp.lock();
		if overage != 0 {
			let over = secp.commit_value(overage.unsigned_abs())?;
			if overage < 0 {
				inputs.push(over);
			} else {
				outputs.push(over);
			}
		}
		commit_sum(&secp, outputs, inputs)
	}

	/// Sum of the kernel excesses, alone and with the commitment to
	/// `offset` added.
	fn sum_kernel_excesses(
		&self,
		offset: &BlindingFactor,
	) -> Result<(Commitment, Commitment), Error> {
		let secp = static_secp_instance();
		let secp = secp.lock();
		let kernel_sum = commit_sum(&secp, self.kernels_committed(), vec![])?;
		if offset.is_zero() {
			return Ok((kernel_sum, kernel_sum));
		}
		let offset_commit = secp.commit(0, offset.secret_key(&secp)?)?;
		let with_offset = commit_sum(&secp, vec![kernel_sum, offset_commit], vec![])?;
		Ok((kernel_sum, with_offset))
	}

	/// Checks the accounting identity. Returns the utxo sum and the kernel
	/// sum, offset excluded.
	fn verify_kernel_sums(
		&self,
		overage: i64,
		kernel_offset: BlindingFactor,
	) -> Result<(Commitment, Commitment), Error> {
		let utxo_sum = self.sum_commitments(overage)?;
		let (kernel_sum, with_offset) = self.sum_kernel_excesses(&kernel_offset)?;
		if utxo_sum != with_offset {
			return Err(Error::KernelSumMismatch);
		}
		Ok((utxo_sum, kernel_sum))
	}
}
