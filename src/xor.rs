/// XOR Service
///
/// Bytewise XOR over equal-length buffers. This is the whitening primitive:
/// a brightened block is the XOR of the encrypted source with its tuple
/// companions, so the same operation both conceals and reconstructs. The
/// loops are fixed-trip with no data-dependent branches. Length mismatches
/// are always an error; the service never degrades into a repeating-key
/// stream cipher.
use byteorder::{BigEndian, ByteOrder};

use crate::error::XorError;

/// XOR two equal-length buffers into a new buffer.
pub fn xor(a: &[u8], b: &[u8]) -> Result<Vec<u8>, XorError> {
    if a.len() != b.len() {
        return Err(XorError::LengthMismatch { left: a.len(), right: b.len() });
    }
    let mut out = a.to_vec();
    xor_into(&mut out, b)?;
    Ok(out)
}

/// XOR `other` into `target` in place.
pub fn xor_into(target: &mut [u8], other: &[u8]) -> Result<(), XorError> {
    if target.len() != other.len() {
        return Err(XorError::LengthMismatch { left: target.len(), right: other.len() });
    }
    for (t, o) in target.iter_mut().zip(other.iter()) {
        *t ^= o;
    }
    Ok(())
}

/// XOR one or more equal-length buffers together.
pub fn xor_multiple(buffers: &[&[u8]]) -> Result<Vec<u8>, XorError> {
    let first = buffers.first().ok_or(XorError::NoBuffers)?;
    let mut out = first.to_vec();
    for other in &buffers[1..] {
        xor_into(&mut out, other)?;
    }
    Ok(out)
}

/// Prefix `data` with its 4-byte big-endian length and zero-pad the result
/// to the next multiple of `block_size`.
pub fn pad_to_block_size(data: &[u8], block_size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 4 + block_size);
    let mut prefix = [0u8; 4];
    BigEndian::write_u32(&mut prefix, data.len() as u32);
    out.extend_from_slice(&prefix);
    out.extend_from_slice(data);
    let remainder = out.len() % block_size;
    if remainder != 0 {
        out.resize(out.len() + block_size - remainder, 0);
    }
    out
}

/// Inverse of [`pad_to_block_size`]: read the length prefix and slice out
/// that many bytes.
pub fn unpad_cbl_data(padded: &[u8]) -> Result<Vec<u8>, XorError> {
    if padded.len() < 4 {
        return Err(XorError::InvalidPadding);
    }
    let len = BigEndian::read_u32(&padded[..4]) as usize;
    if padded.len() < 4 + len {
        return Err(XorError::InvalidPadding);
    }
    Ok(padded[4..4 + len].to_vec())
}
