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

//! Merkle Proofs

use crate::core::hash::Hash;
use crate::core::pmmr;
use crate::ser::{self, PMMRIndexHashable, Readable, Reader, Writeable, Writer};
use util::ToHex;

/// Merkle proof errors.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum MerkleProofError {
	/// Merkle proof root hash does not match when attempting to verify.
	#[error("merkle proof root hash mismatch")]
	RootMismatch,
}

/// A Merkle proof that proves a particular element exists in the MMR.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone, PartialOrd, Ord)]
pub struct MerkleProof {
	/// The size of the MMR at the time the proof was created.
	pub mmr_size: u64,
	/// The sibling path from the leaf up to the final sibling hashing to the
	/// root.
	pub path: Vec<Hash>,
}

impl Writeable for MerkleProof {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.mmr_size)?;
		self.path.write(writer)
	}
}

impl Readable for MerkleProof {
	fn read<R: Reader>(reader: &mut R) -> Result<MerkleProof, ser::Error> {
		let mmr_size = reader.read_u64()?;
		let path = Vec::<Hash>::read(reader)?;
		Ok(MerkleProof { mmr_size, path })
	}
}

impl Default for MerkleProof {
	fn default() -> MerkleProof {
		MerkleProof::empty()
	}
}

impl MerkleProof {
	/// The "empty" Merkle proof.
	pub fn empty() -> MerkleProof {
		MerkleProof {
			mmr_size: 0,
			path: Vec::default(),
		}
	}

	/// Serialize the Merkle proof as a hex string (for api json endpoints)
	pub fn to_hex(&self) -> Result<String, ser::Error> {
		Ok(ser::ser_vec(&self)?.to_hex())
	}

	/// Convert hex string representation back to a Merkle proof instance
	pub fn from_hex(hex: &str) -> Result<MerkleProof, String> {
		let bytes = util::from_hex(hex)?;
		ser::deserialize(&mut &bytes[..]).map_err(|_| "failed to deserialize a Merkle Proof".into())
	}

	/// Verifies the Merkle proof against the provided
	/// root hash, element and position in the MMR.
	pub fn verify(
		&self,
		root: Hash,
		element: &dyn PMMRIndexHashable,
		node_pos0: u64,
	) -> Result<(), MerkleProofError> {
		// calculate the peaks once as these are based on overall MMR size
		// (and will not change)
		let peaks_pos0 = pmmr::peaks(self.mmr_size);
		let node_hash = element.hash_with_index(node_pos0);
		self.verify_path(root, node_hash, node_pos0, &self.path[..], &peaks_pos0)
	}

	/// Walks the path, hashing the node with each sibling in turn.
	/// Once we climb above the peaks (parent pos beyond the MMR size) the
	/// remaining siblings are bagged peaks and hash with the MMR size.
	fn verify_path(
		&self,
		root: Hash,
		node_hash: Hash,
		node_pos0: u64,
		path: &[Hash],
		peaks_pos0: &[u64],
	) -> Result<(), MerkleProofError> {
		// handle special case of only a single entry in the MMR
		// (no siblings to hash together)
		let (sibling, rest) = match path.split_first() {
			Some(x) => x,
			None => {
				return if root == node_hash {
					Ok(())
				} else {
					Err(MerkleProofError::RootMismatch)
				};
			}
		};

		let (parent_pos0, sibling_pos0) = pmmr::family(node_pos0);

		let parent = if let Ok(x) = peaks_pos0.binary_search(&node_pos0) {
			if x == peaks_pos0.len() - 1 {
				(*sibling, node_hash)
			} else {
				(node_hash, *sibling)
			}
		} else if parent_pos0 >= self.mmr_size {
			(*sibling, node_hash)
		} else if pmmr::is_left_sibling(sibling_pos0) {
			(*sibling, node_hash)
		} else {
			(node_hash, *sibling)
		};

		let parent_hash = if parent_pos0 >= self.mmr_size {
			parent.hash_with_index(self.mmr_size)
		} else {
			parent.hash_with_index(parent_pos0)
		};
		self.verify_path(root, parent_hash, parent_pos0, rest, peaks_pos0)
	}
}
