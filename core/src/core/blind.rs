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

//! Blinding factors, as carried by block headers in the form of the
//! cumulative kernel offset.

use crate::ser::{self, Readable, Reader, Writeable, Writer};
use std::cmp::min;
use std::fmt;
use util::secp::constants::SECRET_KEY_SIZE;
use util::secp::key::{SecretKey, ZERO_KEY};
use util::secp::{self, Secp256k1};
use util::ToHex;

/// Encapsulate a secret key for the blind_sum operation
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BlindingFactor([u8; SECRET_KEY_SIZE]);

impl fmt::Debug for BlindingFactor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "BlindingFactor(<secret key hidden>)")
	}
}

impl AsRef<[u8]> for BlindingFactor {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

impl BlindingFactor {
	/// Blinding factor wrapping the provided secret key.
	pub fn from_secret_key(skey: SecretKey) -> BlindingFactor {
		BlindingFactor::from_slice(&skey.as_ref())
	}

	/// Builds a blinding factor from raw bytes, zero padded or truncated.
	pub fn from_slice(data: &[u8]) -> BlindingFactor {
		let mut blind = [0; SECRET_KEY_SIZE];
		let copy_size = min(data.len(), SECRET_KEY_SIZE);
		blind[..copy_size].copy_from_slice(&data[..copy_size]);
		BlindingFactor(blind)
	}

	/// The zero blinding factor.
	pub fn zero() -> BlindingFactor {
		BlindingFactor::from_secret_key(ZERO_KEY)
	}

	/// Is this the zero blinding factor.
	pub fn is_zero(&self) -> bool {
		self.0 == [0; SECRET_KEY_SIZE]
	}

	/// Hex representation, for logging and the api.
	pub fn to_hex(&self) -> String {
		self.0.to_hex()
	}

	/// Parses a blinding factor from its hex representation.
	pub fn from_hex(hex: &str) -> Result<BlindingFactor, ser::Error> {
		let bytes = util::from_hex(hex).map_err(|_| ser::Error::HexError(hex.to_string()))?;
		Ok(BlindingFactor::from_slice(&bytes))
	}

	/// Convert to a secret key.
	/// The zero blinding factor maps to ZERO_KEY, which most secp operations
	/// reject, so callers check is_zero() first.
	pub fn secret_key(&self, secp: &Secp256k1) -> Result<SecretKey, secp::Error> {
		if self.is_zero() {
			Ok(ZERO_KEY)
		} else {
			SecretKey::from_slice(secp, &self.0)
		}
	}

	/// Sum of two blinding factors, skipping zero values which secp does not
	/// accept as secret keys.
	pub fn add(
		&self,
		other: &BlindingFactor,
		secp: &Secp256k1,
	) -> Result<BlindingFactor, secp::Error> {
		let keys = vec![self, other]
			.into_iter()
			.filter(|x| !x.is_zero())
			.map(|x| x.secret_key(secp))
			.collect::<Result<Vec<_>, _>>()?;
		if keys.is_empty() {
			Ok(BlindingFactor::zero())
		} else {
			let sum = secp.blind_sum(keys, vec![])?;
			Ok(BlindingFactor::from_secret_key(sum))
		}
	}
}

impl Writeable for BlindingFactor {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl Readable for BlindingFactor {
	fn read<R: Reader>(reader: &mut R) -> Result<BlindingFactor, ser::Error> {
		let bytes = reader.read_fixed_bytes(SECRET_KEY_SIZE)?;
		Ok(BlindingFactor::from_slice(&bytes))
	}
}

impl serde::Serialize for BlindingFactor {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> serde::Deserialize<'de> for BlindingFactor {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		BlindingFactor::from_hex(&s).map_err(serde::de::Error::custom)
	}
}
