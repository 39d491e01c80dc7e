/// Capacity Calculator
///
/// Bit-exact accounting of how many payload bytes fit in a block once the
/// header, encryption envelope and extended fields are paid for. CBL-family
/// blocks additionally floor their payload to whole checksums and whole
/// tuples so the address list never straddles a block boundary.
use crate::block::BlockSize;
use crate::constants::{
    cbl_extension_overhead, multi_recipient_overhead, CBL_BASE_HEADER_LENGTH, CHECKSUM_LENGTH,
    ECIES_OVERHEAD_LENGTH, MAX_RECIPIENTS, MEMBER_ID_LENGTH, TUPLE_DEFAULT_SIZE,
};
use crate::error::CapacityError;

/// Block type as seen by capacity accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityBlockType {
    RawData,
    Cbl,
    SuperCbl,
    ExtendedCbl,
    MessageCbl,
}

impl CapacityBlockType {
    fn is_cbl_family(&self) -> bool {
        !matches!(self, CapacityBlockType::RawData)
    }
}

/// Encryption applied to the block payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionType {
    None,
    /// The whole block is one creator-addressed ECIES envelope, as the
    /// store pipeline seals CBLs: only the 97-byte envelope head is paid,
    /// with no type tag or recipient-id field on the wire.
    CreatorSealed,
    /// A payload encrypted inside a larger block: type tag, envelope head
    /// and recipient id.
    SingleRecipient,
    MultiRecipient,
}

/// Extended-header fields that consume payload space.
#[derive(Debug, Clone, Default)]
pub struct CblExtensionFields {
    pub file_name: String,
    pub mime_type: String,
}

/// Inputs to a capacity calculation.
#[derive(Debug, Clone)]
pub struct CapacityParams {
    pub block_size: BlockSize,
    pub block_type: CapacityBlockType,
    pub encryption: EncryptionType,
    pub extension: Option<CblExtensionFields>,
    pub recipient_count: Option<usize>,
    pub tuple_size: usize,
}

impl CapacityParams {
    pub fn new(block_size: BlockSize, block_type: CapacityBlockType) -> Self {
        Self {
            block_size,
            block_type,
            encryption: EncryptionType::None,
            extension: None,
            recipient_count: None,
            tuple_size: TUPLE_DEFAULT_SIZE,
        }
    }

    pub fn with_encryption(mut self, encryption: EncryptionType) -> Self {
        self.encryption = encryption;
        self
    }

    pub fn with_extension(mut self, fields: CblExtensionFields) -> Self {
        self.extension = Some(fields);
        self
    }

    pub fn with_recipients(mut self, count: usize) -> Self {
        self.recipient_count = Some(count);
        self
    }

    pub fn with_tuple_size(mut self, tuple_size: usize) -> Self {
        self.tuple_size = tuple_size;
        self
    }
}

/// Overhead breakdown alongside the headline numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityDetails {
    pub base_header: usize,
    pub encryption_overhead: usize,
    pub variable_overhead: usize,
    pub alignment_loss: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityResult {
    pub total_capacity: usize,
    pub overhead: usize,
    pub available_capacity: usize,
    pub details: CapacityDetails,
}

/// One type-tag byte precedes the envelope when a block payload is
/// encrypted.
const ENCRYPTION_TYPE_TAG: usize = 1;

pub struct CapacityCalculator;

impl CapacityCalculator {
    pub fn calculate(params: &CapacityParams) -> Result<CapacityResult, CapacityError> {
        let total_capacity = params.block_size.length();

        let base_header = match params.block_type {
            CapacityBlockType::RawData => 0,
            _ => CBL_BASE_HEADER_LENGTH,
        };

        let encryption_overhead = match params.encryption {
            EncryptionType::None => 0,
            EncryptionType::CreatorSealed => ECIES_OVERHEAD_LENGTH,
            EncryptionType::SingleRecipient => {
                ENCRYPTION_TYPE_TAG + ECIES_OVERHEAD_LENGTH + MEMBER_ID_LENGTH
            }
            EncryptionType::MultiRecipient => {
                let count = params
                    .recipient_count
                    .ok_or(CapacityError::InvalidRecipientCount(0))?;
                if count == 0 || count > MAX_RECIPIENTS {
                    return Err(CapacityError::InvalidRecipientCount(count));
                }
                ENCRYPTION_TYPE_TAG + multi_recipient_overhead(count)
            }
        };

        let variable_overhead = params
            .extension
            .as_ref()
            .map(|f| cbl_extension_overhead(f.file_name.len(), f.mime_type.len()))
            .unwrap_or(0);

        let overhead = base_header + encryption_overhead + variable_overhead;
        if overhead > total_capacity {
            return Err(CapacityError::CapacityExceeded { overhead, block_size: total_capacity });
        }

        let raw_available = total_capacity - overhead;
        let available_capacity = if params.block_type.is_cbl_family() {
            let mut aligned = raw_available - raw_available % CHECKSUM_LENGTH;
            if params.tuple_size > 1 {
                let stride = CHECKSUM_LENGTH * params.tuple_size;
                aligned -= aligned % stride;
            }
            aligned
        } else {
            raw_available
        };

        Ok(CapacityResult {
            total_capacity,
            overhead,
            available_capacity,
            details: CapacityDetails {
                base_header,
                encryption_overhead,
                variable_overhead,
                alignment_loss: raw_available - available_capacity,
            },
        })
    }

    /// Maximum number of block addresses a CBL of this geometry can carry;
    /// always a multiple of the tuple size.
    pub fn address_capacity(params: &CapacityParams) -> Result<usize, CapacityError> {
        let result = Self::calculate(params)?;
        Ok(result.available_capacity / CHECKSUM_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_block_no_overhead() {
        let params = CapacityParams::new(BlockSize::Message, CapacityBlockType::RawData);
        let result = CapacityCalculator::calculate(&params).unwrap();
        assert_eq!(result.overhead, 0);
        assert_eq!(result.available_capacity, 512);
    }

    #[test]
    fn test_single_recipient_overhead() {
        let params = CapacityParams::new(BlockSize::Message, CapacityBlockType::RawData)
            .with_encryption(EncryptionType::SingleRecipient);
        let result = CapacityCalculator::calculate(&params).unwrap();
        assert_eq!(result.overhead, 1 + 97 + 16);
        assert_eq!(result.available_capacity, 512 - 114);
    }

    #[test]
    fn test_multi_recipient_overhead_monotonic() {
        let mut last = 0;
        for n in 1..=8 {
            let params = CapacityParams::new(BlockSize::Small, CapacityBlockType::RawData)
                .with_encryption(EncryptionType::MultiRecipient)
                .with_recipients(n);
            let result = CapacityCalculator::calculate(&params).unwrap();
            assert!(result.overhead > last);
            last = result.overhead;
        }
    }

    #[test]
    fn test_creator_sealed_overhead_matches_envelope() {
        let params = CapacityParams::new(BlockSize::Tiny, CapacityBlockType::Cbl)
            .with_encryption(EncryptionType::CreatorSealed);
        let result = CapacityCalculator::calculate(&params).unwrap();
        // a sealed CBL carries no type tag or recipient id, only the
        // envelope head
        assert_eq!(result.details.encryption_overhead, ECIES_OVERHEAD_LENGTH);
        assert_eq!(result.overhead, CBL_BASE_HEADER_LENGTH + ECIES_OVERHEAD_LENGTH);
    }

    #[test]
    fn test_multi_requires_recipient_count() {
        let params = CapacityParams::new(BlockSize::Small, CapacityBlockType::RawData)
            .with_encryption(EncryptionType::MultiRecipient);
        assert!(matches!(
            CapacityCalculator::calculate(&params).unwrap_err(),
            CapacityError::InvalidRecipientCount(0)
        ));
    }

    #[test]
    fn test_cbl_alignment() {
        let params = CapacityParams::new(BlockSize::Tiny, CapacityBlockType::Cbl);
        let result = CapacityCalculator::calculate(&params).unwrap();
        // aligned to whole tuples of checksums
        assert_eq!(result.available_capacity % (64 * 3), 0);
        assert!(result.available_capacity <= 1024 - 170);
    }

    #[test]
    fn test_address_capacity_is_tuple_multiple() {
        for tuple_size in 2..=10usize {
            let params = CapacityParams::new(BlockSize::Small, CapacityBlockType::Cbl)
                .with_tuple_size(tuple_size);
            let capacity = CapacityCalculator::address_capacity(&params).unwrap();
            assert_eq!(capacity % tuple_size, 0, "tuple_size {}", tuple_size);
            assert!(capacity > 0);
        }
    }

    #[test]
    fn test_capacity_monotone_in_block_size() {
        let mut last = 0;
        for size in BlockSize::all() {
            let params = CapacityParams::new(size, CapacityBlockType::Cbl);
            let capacity = CapacityCalculator::address_capacity(&params).unwrap();
            assert!(capacity >= last);
            last = capacity;
        }
    }

    #[test]
    fn test_encryption_strictly_reduces_capacity() {
        let plain = CapacityParams::new(BlockSize::Small, CapacityBlockType::Cbl);
        let encrypted = CapacityParams::new(BlockSize::Small, CapacityBlockType::Cbl)
            .with_encryption(EncryptionType::SingleRecipient);
        assert!(
            CapacityCalculator::calculate(&encrypted).unwrap().available_capacity
                < CapacityCalculator::calculate(&plain).unwrap().available_capacity
        );
    }

    #[test]
    fn test_extension_reduces_capacity() {
        let plain = CapacityParams::new(BlockSize::Small, CapacityBlockType::ExtendedCbl);
        let extended = CapacityParams::new(BlockSize::Small, CapacityBlockType::ExtendedCbl)
            .with_extension(CblExtensionFields {
                file_name: "report-final.pdf".into(),
                mime_type: "application/pdf".into(),
            });
        let plain_cap = CapacityCalculator::calculate(&plain).unwrap();
        let ext_cap = CapacityCalculator::calculate(&extended).unwrap();
        assert!(ext_cap.overhead > plain_cap.overhead);
        assert!(ext_cap.available_capacity <= plain_cap.available_capacity);
    }

    #[test]
    fn test_overhead_exceeds_block() {
        // a Message block cannot hold a multi-recipient table for 20 members
        let params = CapacityParams::new(BlockSize::Message, CapacityBlockType::RawData)
            .with_encryption(EncryptionType::MultiRecipient)
            .with_recipients(20);
        assert!(matches!(
            CapacityCalculator::calculate(&params).unwrap_err(),
            CapacityError::CapacityExceeded { .. }
        ));
    }
}
