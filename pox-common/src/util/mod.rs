// Copyright (C) 2013-2020 Blockstack PBC, a public benefit corporation
// Copyright (C) 2020-2024 Stacks Open Internet Foundation
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

#[macro_use]
pub mod log;
#[macro_use]
pub mod macros;
pub mod hash;
pub mod secp256k1;

/// Hex deserialization error
#[derive(thiserror::Error, Copy, Clone, PartialEq, Eq, Debug)]
pub enum HexError {
    /// Odd number of hex digits, or the wrong number of bytes for the target type
    #[error("bad length {0} for hex string")]
    BadLength(usize),
    /// Non-hex character in string
    #[error("bad character {0} for hex string")]
    BadCharacter(char),
}
