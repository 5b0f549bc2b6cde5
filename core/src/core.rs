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

//! Core types

pub mod blind;
pub mod block;
pub mod block_sums;
pub mod committed;
pub mod hash;
pub mod merkle_proof;
pub mod pmmr;
pub mod transaction;

pub use self::blind::BlindingFactor;
pub use self::block::*;
pub use self::block_sums::*;
pub use self::committed::Committed;
pub use self::transaction::*;
