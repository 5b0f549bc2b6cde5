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

//! Common test functions

use mwsync_core::core::hash::DefaultHashable;
use mwsync_core::ser::{self, PMMRable, Readable, Reader, Writeable, Writer};
use mwsync_util::secp::key::{PublicKey, SecretKey};
use mwsync_util::secp::pedersen::Commitment;
use mwsync_util::secp::{aggsig, Message, Signature};
use mwsync_util::static_secp_instance;
use rand::{thread_rng, Rng};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TestElem(pub [u8; 4]);

impl DefaultHashable for TestElem {}

impl PMMRable for TestElem {
	type E = Self;

	fn as_elmt(&self) -> Self::E {
		*self
	}

	fn elmt_size() -> Option<u16> {
		Some(4)
	}
}

impl Writeable for TestElem {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u32(u32::from_be_bytes(self.0))
	}
}

impl Readable for TestElem {
	fn read<R: Reader>(reader: &mut R) -> Result<TestElem, ser::Error> {
		Ok(TestElem(reader.read_u32()?.to_be_bytes()))
	}
}

/// A random secret key, built from random bytes.
#[allow(dead_code)]
pub fn random_key() -> SecretKey {
	let secp = static_secp_instance();
	let secp = secp.lock();
	loop {
		let bytes: [u8; 32] = thread_rng().gen();
		if let Ok(key) = SecretKey::from_slice(&secp, &bytes) {
			return key;
		}
	}
}

/// Commitment to the provided value with the provided blinding key.
#[allow(dead_code)]
pub fn commit(value: u64, key: &SecretKey) -> Commitment {
	let secp = static_secp_instance();
	let secp = secp.lock();
	secp.commit(value, key.clone()).unwrap()
}

/// Single party signature over the message with the public key used for e.
#[allow(dead_code)]
pub fn sign(msg: &Message, key: &SecretKey) -> Signature {
	let secp = static_secp_instance();
	let secp = secp.lock();
	let pubkey = PublicKey::from_secret_key(&secp, key).unwrap();
	aggsig::sign_single(&secp, msg, key, None, None, None, Some(&pubkey), None).unwrap()
}
