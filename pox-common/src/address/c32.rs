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

use sha2::{Digest, Sha256};

use super::Error;

const C32_CHARACTERS: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Map one c32 character to its 5-bit value. Lowercase is accepted, and the
/// easily-confused `O`, `L` and `I` normalize to `0`, `1` and `1`.
fn c32_digit(c: u8) -> Option<u8> {
    let normalized = match c.to_ascii_uppercase() {
        b'O' => b'0',
        b'L' | b'I' => b'1',
        other => other,
    };
    C32_CHARACTERS
        .iter()
        .position(|x| *x == normalized)
        .map(|p| p as u8)
}

fn c32_encode(input_bytes: &[u8]) -> String {
    // digits are produced least-significant first and reversed at the end
    let mut digits: Vec<u8> = Vec::with_capacity(input_bytes.len() * 8 / 5 + 1);
    let mut acc: u16 = 0;
    let mut acc_bits = 0u32;

    for byte in input_bytes.iter().rev() {
        acc |= u16::from(*byte) << acc_bits;
        acc_bits += 8;
        while acc_bits >= 5 {
            digits.push(C32_CHARACTERS[(acc & 0x1f) as usize]);
            acc >>= 5;
            acc_bits -= 5;
        }
    }
    if acc_bits > 0 {
        digits.push(C32_CHARACTERS[(acc & 0x1f) as usize]);
    }

    while digits.last() == Some(&C32_CHARACTERS[0]) {
        digits.pop();
    }
    let leading_zero_bytes = input_bytes.iter().take_while(|b| **b == 0).count();
    digits.extend(std::iter::repeat(C32_CHARACTERS[0]).take(leading_zero_bytes));

    digits.iter().rev().map(|c| char::from(*c)).collect()
}

fn c32_decode(input_str: &str) -> Result<Vec<u8>, Error> {
    if !input_str.is_ascii() {
        return Err(Error::InvalidCrockford32);
    }
    let digits = input_str
        .bytes()
        .map(c32_digit)
        .collect::<Option<Vec<u8>>>()
        .ok_or(Error::InvalidCrockford32)?;

    let mut bytes: Vec<u8> = Vec::with_capacity(digits.len() * 5 / 8 + 1);
    let mut acc: u16 = 0;
    let mut acc_bits = 0u32;
    for digit in digits.iter().rev() {
        acc |= u16::from(*digit) << acc_bits;
        acc_bits += 5;
        if acc_bits >= 8 {
            bytes.push((acc & 0xff) as u8);
            acc >>= 8;
            acc_bits -= 8;
        }
    }
    if acc_bits > 0 {
        bytes.push(acc as u8);
    }

    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    let leading_zero_digits = digits.iter().take_while(|d| **d == 0).count();
    bytes.extend(std::iter::repeat(0u8).take(leading_zero_digits));

    bytes.reverse();
    Ok(bytes)
}

fn double_sha256_checksum(data: &[u8]) -> [u8; 4] {
    let digest = Sha256::digest(Sha256::digest(data));
    [digest[0], digest[1], digest[2], digest[3]]
}

fn c32_check_encode(version: u8, data: &[u8]) -> Result<String, Error> {
    if version >= 32 {
        return Err(Error::InvalidVersion(version));
    }

    let mut check_data = Vec::with_capacity(data.len() + 1);
    check_data.push(version);
    check_data.extend_from_slice(data);
    let checksum = double_sha256_checksum(&check_data);

    let mut encoding_data = data.to_vec();
    encoding_data.extend_from_slice(&checksum);

    Ok(format!(
        "{}{}",
        char::from(C32_CHARACTERS[version as usize]),
        c32_encode(&encoding_data)
    ))
}

fn c32_check_decode(check_data: &str) -> Result<(u8, Vec<u8>), Error> {
    if !check_data.is_ascii() || check_data.len() < 2 {
        return Err(Error::InvalidCrockford32);
    }
    let (version_str, data_str) = check_data.split_at(1);

    let version = c32_digit(version_str.as_bytes()[0]).ok_or(Error::InvalidCrockford32)?;
    let data_sum_bytes = c32_decode(data_str)?;
    if data_sum_bytes.len() < 5 {
        return Err(Error::InvalidCrockford32);
    }
    let (data_bytes, expected_sum) = data_sum_bytes.split_at(data_sum_bytes.len() - 4);

    let mut versioned = vec![version];
    versioned.extend_from_slice(data_bytes);
    let computed_sum = double_sha256_checksum(&versioned);
    if computed_sum[..] != expected_sum[..] {
        let expected = [expected_sum[0], expected_sum[1], expected_sum[2], expected_sum[3]];
        return Err(Error::BadChecksum(
            u32::from_le_bytes(computed_sum),
            u32::from_le_bytes(expected),
        ));
    }

    Ok((version, data_bytes.to_vec()))
}

pub fn c32_address_decode(c32_address_str: &str) -> Result<(u8, Vec<u8>), Error> {
    match c32_address_str.strip_prefix('S') {
        Some(rest) if rest.len() > 4 => c32_check_decode(rest),
        _ => Err(Error::InvalidCrockford32),
    }
}

pub fn c32_address(version: u8, data: &[u8]) -> Result<String, Error> {
    let c32_string = c32_check_encode(version, data)?;
    Ok(format!("S{}", c32_string))
}
