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

//! Transaction building blocks: inputs, outputs, range proofs and kernels.

use crate::core::committed;
use crate::core::hash::{DefaultHashable, Hashed};
use crate::ser::{self, PMMRable, Readable, Reader, Writeable, Writer};
use std::cmp::Ordering;
use util::secp::pedersen::{Commitment, RangeProof};
use util::secp::{self, aggsig, Message, Signature};
use util::static_secp_instance;
use util::ToHex;

/// Errors thrown by transaction validation
#[derive(Clone, Eq, Debug, PartialEq, thiserror::Error)]
pub enum Error {
	/// Underlying Secp256k1 error (signature validation or invalid public key
	/// typically)
	#[error("Secp error: {0}")]
	Secp(#[from] secp::Error),
	/// Error when verifying kernel sums via committed trait.
	#[error("Committed error: {0}")]
	Committed(#[from] committed::Error),
	/// Range proof validation error
	#[error("invalid range proof")]
	RangeProof,
	/// Signature verification error.
	#[error("incorrect kernel signature")]
	IncorrectSignature,
	/// Underlying serialization error.
	#[error("serialization error: {0}")]
	Serialization(#[from] ser::Error),
}

/// Various flavors of tx kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum KernelFeatures {
	/// Plain kernel (the default for Grin txs).
	Plain = 0,
	/// A coinbase kernel.
	Coinbase = 1,
	/// A kernel with an explicit lock height.
	HeightLocked = 2,
}

impl DefaultHashable for KernelFeatures {}

impl KernelFeatures {
	fn from_u8(n: u8) -> Option<KernelFeatures> {
		match n {
			0 => Some(KernelFeatures::Plain),
			1 => Some(KernelFeatures::Coinbase),
			2 => Some(KernelFeatures::HeightLocked),
			_ => None,
		}
	}
}

impl Writeable for KernelFeatures {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u8(*self as u8)
	}
}

impl Readable for KernelFeatures {
	fn read<R: Reader>(reader: &mut R) -> Result<KernelFeatures, ser::Error> {
		KernelFeatures::from_u8(reader.read_u8()?).ok_or(ser::Error::CorruptedData)
	}
}

/// Builds the message a kernel signs: the hash of its features, fee and
/// lock height.
pub fn kernel_sig_msg(
	features: KernelFeatures,
	fee: u64,
	lock_height: u64,
) -> Result<Message, Error> {
	let hash = (features, (fee, lock_height)).hash();
	Ok(Message::from_slice(hash.as_bytes())?)
}

/// A proof that a transaction sums to zero. Includes both the transaction's
/// Pedersen commitment and the signature, that guarantees that the commitments
/// amount to zero.
/// The signature signs the fee and the lock_height, which are retained for
/// signature validation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TxKernel {
	/// Options for a kernel's structure or use
	pub features: KernelFeatures,
	/// Fee originally included in the transaction this proof is for.
	pub fee: u64,
	/// This kernel is not valid earlier than lock_height blocks
	/// The max lock_height of all *inputs* to this transaction
	pub lock_height: u64,
	/// Remainder of the sum of all transaction commitments. If the transaction
	/// is well formed, amounts components should sum to zero and the excess
	/// is hence a valid public key (sum of the commitment public keys).
	#[serde(
		serialize_with = "secp_ser::as_hex",
		deserialize_with = "secp_ser::commitment_from_hex"
	)]
	pub excess: Commitment,
	/// The signature proving the excess is a valid public key, which signs
	/// the transaction fee.
	#[serde(with = "secp_ser::sig_serde")]
	pub excess_sig: Signature,
}

impl DefaultHashable for TxKernel {}

impl Writeable for TxKernel {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.features.write(writer)?;
		writer.write_u64(self.fee)?;
		writer.write_u64(self.lock_height)?;
		self.excess.write(writer)?;
		self.excess_sig.write(writer)?;
		Ok(())
	}
}

impl Readable for TxKernel {
	fn read<R: Reader>(reader: &mut R) -> Result<TxKernel, ser::Error> {
		Ok(TxKernel {
			features: KernelFeatures::read(reader)?,
			fee: reader.read_u64()?,
			lock_height: reader.read_u64()?,
			excess: Commitment::read(reader)?,
			excess_sig: Signature::read(reader)?,
		})
	}
}

/// We store kernels in the kernel MMR.
impl PMMRable for TxKernel {
	type E = Self;

	fn as_elmt(&self) -> Self::E {
		self.clone()
	}

	fn elmt_size() -> Option<u16> {
		let excess = secp::constants::PEDERSEN_COMMITMENT_SIZE as u16;
		Some(1 + 8 + 8 + excess + ser::SIGNATURE_SIZE as u16)
	}
}

impl TxKernel {
	/// Return the excess commitment for this tx_kernel.
	pub fn excess(&self) -> Commitment {
		self.excess
	}

	/// The msg signed as part of the tx kernel.
	pub fn msg_to_sign(&self) -> Result<Message, Error> {
		kernel_sig_msg(self.features, self.fee, self.lock_height)
	}

	/// Is this a coinbase kernel?
	pub fn is_coinbase(&self) -> bool {
		self.features == KernelFeatures::Coinbase
	}

	/// Verify the transaction proof validity. Entails handling the commitment
	/// as a public key and checking the signature verifies with the fee as
	/// message.
	pub fn verify(&self) -> Result<(), Error> {
		let msg = self.msg_to_sign()?;
		let secp = static_secp_instance();
		let secp = secp.lock();
		let pubkey = self.excess.to_pubkey(&secp)?;
		if !aggsig::verify_single(
			&secp,
			&self.excess_sig,
			&msg,
			None,
			&pubkey,
			Some(&pubkey),
			None,
			false,
		) {
			return Err(Error::IncorrectSignature);
		}
		Ok(())
	}

	/// Batch signature verification.
	pub fn batch_sig_verify(tx_kernels: &[TxKernel]) -> Result<(), Error> {
		for kernel in tx_kernels {
			kernel.verify()?;
		}
		Ok(())
	}
}

/// Options for block validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OutputFeatures {
	/// Plain output (the default for Grin txs).
	Plain = 0,
	/// A coinbase output.
	Coinbase = 1,
}

impl Writeable for OutputFeatures {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u8(*self as u8)
	}
}

impl Readable for OutputFeatures {
	fn read<R: Reader>(reader: &mut R) -> Result<OutputFeatures, ser::Error> {
		match reader.read_u8()? {
			0 => Ok(OutputFeatures::Plain),
			1 => Ok(OutputFeatures::Coinbase),
			_ => Err(ser::Error::CorruptedData),
		}
	}
}

/// A transaction input.
///
/// Primarily a reference to an output being spent by the transaction.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Input {
	/// The features of the output being spent.
	/// We will check maturity for coinbase output.
	pub features: OutputFeatures,
	/// The commit referencing the output being spent.
	#[serde(
		serialize_with = "secp_ser::as_hex",
		deserialize_with = "secp_ser::commitment_from_hex"
	)]
	pub commit: Commitment,
}

impl Writeable for Input {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.features.write(writer)?;
		self.commit.write(writer)?;
		Ok(())
	}
}

impl Readable for Input {
	fn read<R: Reader>(reader: &mut R) -> Result<Input, ser::Error> {
		let features = OutputFeatures::read(reader)?;
		let commit = Commitment::read(reader)?;
		Ok(Input::new(features, commit))
	}
}

impl Input {
	/// Build a new input from the data required to identify and verify an
	/// output being spent.
	pub fn new(features: OutputFeatures, commit: Commitment) -> Input {
		Input { features, commit }
	}

	/// The input commitment which _partially_ identifies the output being
	/// spent.
	pub fn commitment(&self) -> Commitment {
		self.commit
	}
}

/// Output for a transaction, defining the new ownership of coins that are being
/// transferred. The commitment is a blinded value for the output while the
/// range proof guarantees the commitment includes a positive value without
/// overflow and the ownership of the private key.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Output {
	/// Output identifier (features and commitment).
	#[serde(flatten)]
	pub identifier: OutputIdentifier,
	/// A proof that the commitment is in the right range
	#[serde(
		serialize_with = "secp_ser::as_hex",
		deserialize_with = "secp_ser::rangeproof_from_hex"
	)]
	pub proof: RangeProof,
}

impl PartialEq for Output {
	fn eq(&self, other: &Output) -> bool {
		self.identifier == other.identifier && self.proof.bytes() == other.proof.bytes()
	}
}

impl Eq for Output {}

impl Ord for Output {
	fn cmp(&self, other: &Self) -> Ordering {
		self.identifier.cmp(&other.identifier)
	}
}

impl PartialOrd for Output {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Writeable for Output {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.identifier.write(writer)?;
		self.proof.write(writer)?;
		Ok(())
	}
}

impl Readable for Output {
	fn read<R: Reader>(reader: &mut R) -> Result<Output, ser::Error> {
		Ok(Output {
			identifier: OutputIdentifier::read(reader)?,
			proof: RangeProof::read(reader)?,
		})
	}
}

impl Output {
	/// Create a new output with the provided features, commitment and rangeproof.
	pub fn new(features: OutputFeatures, commit: Commitment, proof: RangeProof) -> Output {
		Output {
			identifier: OutputIdentifier { features, commit },
			proof,
		}
	}

	/// Output identifier.
	pub fn identifier(&self) -> OutputIdentifier {
		self.identifier
	}

	/// Commitment for the output
	pub fn commitment(&self) -> Commitment {
		self.identifier.commit
	}

	/// Output features.
	pub fn features(&self) -> OutputFeatures {
		self.identifier.features
	}

	/// Is this a coinbase output?
	pub fn is_coinbase(&self) -> bool {
		self.identifier.features == OutputFeatures::Coinbase
	}

	/// Range proof for the output
	pub fn proof(&self) -> RangeProof {
		self.proof
	}

	/// Validates the range proof using the commitment
	pub fn verify_proof(&self) -> Result<(), Error> {
		let secp = static_secp_instance();
		secp.lock()
			.verify_bullet_proof(self.commitment(), self.proof, None)?;
		Ok(())
	}

	/// Batch validates the range proofs using the commitments
	pub fn batch_verify_proofs(commits: &[Commitment], proofs: &[RangeProof]) -> Result<(), Error> {
		if commits.is_empty() {
			return Ok(());
		}
		let secp = static_secp_instance();
		secp.lock()
			.verify_bullet_proof_multi(commits.to_vec(), proofs.to_vec(), None)
			.map_err(|_| Error::RangeProof)?;
		Ok(())
	}
}

/// An output_identifier can be build from either an input _or_ an output and
/// contains everything we need to uniquely identify an output being spent.
/// Needed because it is not sufficient to pass a commitment around.
/// Used as the element type in the output MMR.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputIdentifier {
	/// Output features (coinbase vs. regular transaction output)
	/// We need to include this when hashing to ensure coinbase maturity can be
	/// enforced.
	pub features: OutputFeatures,
	/// Output commitment
	#[serde(
		serialize_with = "secp_ser::as_hex",
		deserialize_with = "secp_ser::commitment_from_hex"
	)]
	pub commit: Commitment,
}

impl DefaultHashable for OutputIdentifier {}

impl OutputIdentifier {
	/// Build a new output_identifier.
	pub fn new(features: OutputFeatures, commit: &Commitment) -> OutputIdentifier {
		OutputIdentifier {
			features,
			commit: *commit,
		}
	}

	/// Our commitment.
	pub fn commitment(&self) -> Commitment {
		self.commit
	}

	/// Is this a coinbase output?
	pub fn is_coinbase(&self) -> bool {
		self.features == OutputFeatures::Coinbase
	}

	/// Converts this identifier to a full output, provided a RangeProof
	pub fn into_output(self, proof: RangeProof) -> Output {
		Output {
			identifier: self,
			proof,
		}
	}

	/// Build an output_identifier from an existing input.
	pub fn from_input(input: &Input) -> OutputIdentifier {
		OutputIdentifier {
			features: input.features,
			commit: input.commit,
		}
	}

	/// Hex representation of the serialized identifier.
	pub fn to_hex(&self) -> Result<String, ser::Error> {
		Ok(ser::ser_vec(self)?.to_hex())
	}
}

/// Ensure this is implemented to centralize hashing with indexes
impl PMMRable for OutputIdentifier {
	type E = Self;

	fn as_elmt(&self) -> Self::E {
		*self
	}

	fn elmt_size() -> Option<u16> {
		Some(1 + secp::constants::PEDERSEN_COMMITMENT_SIZE as u16)
	}
}

impl Writeable for OutputIdentifier {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.features.write(writer)?;
		self.commit.write(writer)?;
		Ok(())
	}
}

impl Readable for OutputIdentifier {
	fn read<R: Reader>(reader: &mut R) -> Result<OutputIdentifier, ser::Error> {
		Ok(OutputIdentifier {
			features: OutputFeatures::read(reader)?,
			commit: Commitment::read(reader)?,
		})
	}
}

impl From<&Output> for OutputIdentifier {
	fn from(out: &Output) -> Self {
		out.identifier
	}
}

/// Serde helpers for the secp types carried by transactions.
pub mod secp_ser {
	use serde::de::Error as _;
	use serde::{Deserialize, Deserializer, Serializer};
	use util::secp::constants::MAX_PROOF_SIZE;
	use util::secp::pedersen::{Commitment, RangeProof};
	use util::ToHex;

	/// Serializes anything byte-like as a hex string.
	pub fn as_hex<T, S>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
	where
		T: AsRef<[u8]>,
		S: Serializer,
	{
		serializer.serialize_str(&bytes.as_ref().to_hex())
	}

	/// Creates a Commitment from a hex string
	pub fn commitment_from_hex<'de, D>(deserializer: D) -> Result<Commitment, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		util::from_hex(&s)
			.map(Commitment::from_vec)
			.map_err(D::Error::custom)
	}

	/// Creates a RangeProof from a hex string
	pub fn rangeproof_from_hex<'de, D>(deserializer: D) -> Result<RangeProof, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		let val = util::from_hex(&s).map_err(D::Error::custom)?;
		if val.len() > MAX_PROOF_SIZE {
			return Err(D::Error::custom("range proof too long"));
		}
		let mut proof = [0; MAX_PROOF_SIZE];
		proof[..val.len()].copy_from_slice(&val);
		Ok(RangeProof {
			proof,
			plen: val.len(),
		})
	}

	/// Serializes and deserializes a Signature as hex of its raw bytes.
	pub mod sig_serde {
		use serde::de::Error as _;
		use serde::{Deserialize, Deserializer, Serializer};
		use util::secp::Signature;
		use util::ToHex;

		///
		pub fn serialize<S>(sig: &Signature, serializer: S) -> Result<S::Ok, S::Error>
		where
			S: Serializer,
		{
			serializer.serialize_str(&sig.to_raw_data()[..].to_hex())
		}

		///
		pub fn deserialize<'de, D>(deserializer: D) -> Result<Signature, D::Error>
		where
			D: Deserializer<'de>,
		{
			let s = String::deserialize(deserializer)?;
			let bytes = util::from_hex(&s).map_err(D::Error::custom)?;
			if bytes.len() != 64 {
				return Err(D::Error::custom("invalid signature length"));
			}
			let mut raw = [0u8; 64];
			raw.copy_from_slice(&bytes);
			Signature::from_raw_data(&raw).map_err(D::Error::custom)
		}
	}
}
