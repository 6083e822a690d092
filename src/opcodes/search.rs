//! `linearsearch`, `binarysearch` and `linkedsearch`
//!
//! Keys are compared as big-endian byte strings. With [`KEY_INDIRECT`] the key
//! operand is the address of the key bytes; otherwise it is the key itself and
//! the key size must be 1, 2 or 4.

use crate::image::Image;
use crate::interpreter::errors::{VmError, VmResult};
use std::cmp::Ordering;

pub const KEY_INDIRECT: u32 = 0x01;
pub const ZERO_KEY_TERMINATES: u32 = 0x02;
pub const RETURN_INDEX: u32 = 0x04;

fn key_bytes(image: &Image, key: u32, key_size: u32, options: u32) -> VmResult<Vec<u8>> {
    if options & KEY_INDIRECT != 0 {
        return Ok(image.read_bytes(key, key_size)?.to_vec());
    }
    match key_size {
        1 => Ok(vec![key as u8]),
        2 => Ok((key as u16).to_be_bytes().to_vec()),
        4 => Ok(key.to_be_bytes().to_vec()),
        other => Err(VmError::InvalidKeySize(other)),
    }
}

fn not_found(options: u32) -> u32 {
    if options & RETURN_INDEX != 0 {
        0xFFFF_FFFF
    } else {
        0
    }
}

fn found(options: u32, address: u32, index: u32) -> u32 {
    if options & RETURN_INDEX != 0 {
        index
    } else {
        address
    }
}

#[allow(clippy::too_many_arguments)]
pub fn linear_search(
    image: &Image,
    key: u32,
    key_size: u32,
    start: u32,
    struct_size: u32,
    num_structs: u32,
    key_offset: u32,
    options: u32,
) -> VmResult<u32> {
    let key = key_bytes(image, key, key_size, options)?;
    let zero_terminates = options & ZERO_KEY_TERMINATES != 0;
    let mut index: u32 = 0;
    while num_structs == 0xFFFF_FFFF || index < num_structs {
        let address = start.wrapping_add(index.wrapping_mul(struct_size));
        let entry = image.read_bytes(address.wrapping_add(key_offset), key_size)?;
        if entry == key.as_slice() {
            return Ok(found(options, address, index));
        }
        if zero_terminates && entry.iter().all(|&b| b == 0) {
            break;
        }
        index += 1;
    }
    Ok(not_found(options))
}

#[allow(clippy::too_many_arguments)]
pub fn binary_search(
    image: &Image,
    key: u32,
    key_size: u32,
    start: u32,
    struct_size: u32,
    num_structs: u32,
    key_offset: u32,
    options: u32,
) -> VmResult<u32> {
    let key = key_bytes(image, key, key_size, options)?;
    let (mut lo, mut hi) = (0u32, num_structs);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let address = start.wrapping_add(mid.wrapping_mul(struct_size));
        let entry = image.read_bytes(address.wrapping_add(key_offset), key_size)?;
        match entry.cmp(key.as_slice()) {
            Ordering::Equal => return Ok(found(options, address, mid)),
            Ordering::Less => lo = mid + 1,
            Ordering::Greater => hi = mid,
        }
    }
    Ok(not_found(options))
}

pub fn linked_search(
    image: &Image,
    key: u32,
    key_size: u32,
    start: u32,
    key_offset: u32,
    next_offset: u32,
    options: u32,
) -> VmResult<u32> {
    let key = key_bytes(image, key, key_size, options)?;
    let zero_terminates = options & ZERO_KEY_TERMINATES != 0;
    let mut node = start;
    while node != 0 {
        let entry = image.read_bytes(node.wrapping_add(key_offset), key_size)?;
        if entry == key.as_slice() {
            return Ok(node);
        }
        if zero_terminates && entry.iter().all(|&b| b == 0) {
            break;
        }
        node = image.read_u32(node.wrapping_add(next_offset))?;
    }
    Ok(0)
}
