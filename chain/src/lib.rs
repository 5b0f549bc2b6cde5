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

//! Txhashset sync and validation engine: maintains the candidate and
//! confirmed chain views, applies blocks to the txhashset MMRs and imports
//! and validates full txhashset snapshots.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

extern crate mwsync_core as core;
extern crate mwsync_util as util;

mod chain;
pub mod chain_view;
mod error;
pub mod store;
pub mod sync;
pub mod txhashset;
pub mod types;

// Re-export the base interface

pub use crate::chain::{Chain, DEFAULT_OUTPUT_PAGE, MAX_OUTPUT_PAGE};
pub use crate::chain_view::{BlockIndex, ChainIndex, ChainType};
pub use crate::error::{Error, ErrorCategory};
pub use crate::store::ChainStore;
pub use crate::sync::{NoHooks, SyncHooks, SyncState};
pub use crate::types::{
	CommitPos, LocatedTxKernel, NoStatus, OutputEntry, OutputListing, OutputPrintable, Tip,
	TxHashSetRoots, TxHashsetWriteStatus,
};
