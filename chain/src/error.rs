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

//! Error types for chain
use crate::core::core::{block, committed, transaction};
use crate::core::ser;
use crate::util::secp;
use crate::util::secp::pedersen::Commitment;
use mwsync_store as store;
use std::io;

/// Broad classes of chain errors, driving how a failed sync attempt is
/// handled by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
	/// The snapshot data is malformed or does not match its header.
	Structural,
	/// The snapshot is well formed but does not balance or verify.
	Accounting,
	/// The chain views moved or disagree, the attempt can be retried.
	Consistency,
	/// No live txhashset to serve the request.
	ResourceUnavailable,
	/// Store, IO, serialization or crypto failure.
	Internal,
}

/// Chain error definitions
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The snapshot archive is missing files or holds malformed MMR files
	#[error("Corrupt archive: {0}")]
	CorruptArchive(String),
	/// The snapshot MMR sizes do not agree with the target header
	#[error("Header mismatch: {0}")]
	HeaderMismatch(String),
	/// One of the MMR roots does not match the root recorded in the header
	#[error("{mmr} root mismatch at height {height}")]
	RootMismatch {
		/// Which MMR
		mmr: String,
		/// Height of the header checked against
		height: u64,
	},
	/// One of the MMR sizes does not match the header
	#[error("{mmr} size mismatch at height {height}: expected {expected}, got {actual}")]
	SizeMismatch {
		/// Which MMR
		mmr: String,
		/// Height of the header checked against
		height: u64,
		/// Size recorded in the header
		expected: u64,
		/// Size found
		actual: u64,
	},
	/// A parent hash does not match its children, or leaf data does not
	/// match its leaf hash
	#[error("Invalid {mmr} MMR: {msg}")]
	InvalidMmr {
		/// Which MMR
		mmr: String,
		/// Details of the failure
		msg: String,
	},
	/// Unspent outputs do not sum to the kernel excesses plus offset
	#[error("Sum mismatch at height {0}")]
	SumMismatch(u64),
	/// A range proof failed to verify or is missing
	#[error("Invalid range proof: {0}")]
	InvalidRangeProof(String),
	/// A kernel signature failed to verify
	#[error("Invalid kernel signature at mmr index {0}")]
	InvalidKernelSignature(u64),
	/// The candidate chain no longer holds the validated header
	#[error("Candidate chain moved at height {0}")]
	CandidateMoved(u64),
	/// Chain entries must be appended one height at a time
	#[error("Non sequential append at height {height}, chain length {len}")]
	NonSequentialAppend {
		/// Height of the rejected entry
		height: u64,
		/// Length of the chain appended to
		len: u64,
	},
	/// The two chain views do not even share a genesis
	#[error("No common ancestor between candidate and confirmed chains")]
	NoCommonAncestor,
	/// No txhashset is currently live
	#[error("TxHashSet unavailable")]
	TxHashSetUnavailable,
	/// Attempt to install a txhashset while the previous one is still open
	#[error("TxHashSet still open")]
	TxHashSetStillOpen,
	/// Caller provided an argument outside the accepted range
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	/// The block doesn't fit anywhere in our chain
	#[error("Block is unfit: {0}")]
	Unfit(String),
	/// One of the inputs in the block has already been spent
	#[error("Already Spent: {0:?}")]
	AlreadySpent(Commitment),
	/// An output with that commitment already exists (should be unique)
	#[error("Duplicate Commitment: {0:?}")]
	DuplicateCommitment(Commitment),
	/// Output not found
	#[error("Output not found")]
	OutputNotFound,
	/// The block doesn't sum correctly or a tx signature is invalid
	#[error("Invalid Block Proof, {0}")]
	InvalidBlockProof(#[from] block::Error),
	/// Error from underlying tx handling
	#[error("Transaction Validation Error, {0}")]
	Transaction(#[from] transaction::Error),
	/// Error from summing and verifying kernel sums via committed trait.
	#[error("Committed Trait: Error summing and verifying kernel sums, {0}")]
	Committed(#[from] committed::Error),
	/// Error from underlying secp lib
	#[error("Secp Lib Error, {0}")]
	Secp(#[from] secp::Error),
	/// Internal issue when trying to save or load data from store
	#[error("Store Error: {1}, reason: {0}")]
	StoreErr(store::Error, String),
	/// Internal issue when trying to save or load data from append only files
	#[error("File Read Error: {0}")]
	FileReadErr(String),
	/// Error serializing or deserializing a type
	#[error("Serialization Error, {0}")]
	SerErr(#[from] ser::Error),
	/// Error with the txhashset
	#[error("TxHashSetErr: {0}")]
	TxHashSetErr(String),
	/// Anything else
	#[error("Other Error: {0}")]
	Other(String),
}

impl Error {
	/// The category this error belongs to.
	pub fn category(&self) -> ErrorCategory {
		match self {
			Error::CorruptArchive(_)
			| Error::HeaderMismatch(_)
			| Error::RootMismatch { .. }
			| Error::SizeMismatch { .. }
			| Error::InvalidMmr { .. } => ErrorCategory::Structural,
			Error::SumMismatch(_)
			| Error::InvalidRangeProof(_)
			| Error::InvalidKernelSignature(_) => ErrorCategory::Accounting,
			Error::CandidateMoved(_)
			| Error::NonSequentialAppend { .. }
			| Error::NoCommonAncestor => ErrorCategory::Consistency,
			Error::TxHashSetUnavailable => ErrorCategory::ResourceUnavailable,
			_ => ErrorCategory::Internal,
		}
	}

	/// Whether the failed operation may succeed if attempted again. Chains
	/// without a common genesis never will.
	pub fn is_retryable(&self) -> bool {
		match self {
			Error::NoCommonAncestor => false,
			e => e.category() == ErrorCategory::Consistency,
		}
	}

	/// Whether the error is due to data (block or snapshot) that was
	/// intrinsically wrong, as opposed to our own state.
	pub fn is_bad_data(&self) -> bool {
		match self.category() {
			ErrorCategory::Structural | ErrorCategory::Accounting => true,
			_ => matches!(
				self,
				Error::InvalidBlockProof(_)
					| Error::AlreadySpent(_)
					| Error::DuplicateCommitment(_)
					| Error::Transaction(_)
					| Error::Committed(_)
			),
		}
	}
}

impl From<store::Error> for Error {
	fn from(error: store::Error) -> Error {
		let reason = format!("{:?}", error);
		Error::StoreErr(error, reason)
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::FileReadErr(e.to_string())
	}
}
