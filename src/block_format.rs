/// Block Format Detection
///
/// Every stored block is classified by its leading bytes: 0xBC marks a
/// structured header block (CBL family), 0x04 marks an ECIES envelope, and
/// anything else is opaque data. Structured headers carry a CRC8 over their
/// field region; the trailing 64 bytes of the header region are always the
/// signature and are excluded from the CRC.
use byteorder::{BigEndian, ByteOrder};

use crate::constants::{
    CBL_BASE_FIELDS_END, CBL_FILE_NAME_LENGTH_PREFIX, CBL_MIME_TYPE_LENGTH_PREFIX,
    CBL_OFF_CRC8, CBL_OFF_EXTENDED_FLAG, CBL_OFF_TYPE, CBL_OFF_VERSION,
    COMPACT_SIGNATURE_LENGTH, MEMBER_ID_LENGTH, PUBLIC_KEY_PREFIX, RECIPIENT_COUNT_LENGTH,
    STRUCTURED_BLOCK_MAGIC, STRUCTURED_HEADER_VERSION,
};
use crate::crc::crc8;
use crate::error::BlockFormatError;

/// Sub-type byte of a structured block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredBlockType {
    Cbl,
    SuperCbl,
    ExtendedCbl,
    MessageCbl,
}

impl StructuredBlockType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x02 => Some(Self::Cbl),
            0x03 => Some(Self::SuperCbl),
            0x04 => Some(Self::ExtendedCbl),
            0x05 => Some(Self::MessageCbl),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Cbl => 0x02,
            Self::SuperCbl => 0x03,
            Self::ExtendedCbl => 0x04,
            Self::MessageCbl => 0x05,
        }
    }
}

/// Classification result. `error` carries the reason when `is_valid` is
/// false; a structurally sound non-structured buffer (raw data) is reported
/// as invalid-for-structured with `UnknownBlockFormat`.
#[derive(Debug, Clone)]
pub struct BlockFormatInfo {
    pub is_valid: bool,
    pub block_type: Option<StructuredBlockType>,
    pub version: Option<u8>,
    pub is_structured: bool,
    pub is_encrypted: bool,
    pub header_length: Option<usize>,
    pub error: Option<BlockFormatError>,
}

impl BlockFormatInfo {
    fn invalid(error: BlockFormatError) -> Self {
        Self {
            is_valid: false,
            block_type: None,
            version: None,
            is_structured: false,
            is_encrypted: false,
            header_length: None,
            error: Some(error),
        }
    }
}

/// Compute the header end (inclusive of the trailing signature) of a
/// structured block, bounds-checking every length-prefixed sub-field.
pub fn structured_header_length(bytes: &[u8]) -> Result<usize, BlockFormatError> {
    if bytes.len() < CBL_BASE_FIELDS_END {
        return Err(BlockFormatError::DataTooShort);
    }
    let block_type = StructuredBlockType::from_byte(bytes[CBL_OFF_TYPE])
        .ok_or(BlockFormatError::InvalidStructuredBlockType(bytes[CBL_OFF_TYPE]))?;
    let extended = bytes[CBL_OFF_EXTENDED_FLAG] != 0;

    let mut cursor = CBL_BASE_FIELDS_END;
    if extended {
        if bytes.len() < cursor + CBL_FILE_NAME_LENGTH_PREFIX {
            return Err(BlockFormatError::DataTooShort);
        }
        let file_name_len = BigEndian::read_u16(&bytes[cursor..cursor + 2]) as usize;
        cursor += CBL_FILE_NAME_LENGTH_PREFIX + file_name_len;

        if bytes.len() < cursor + CBL_MIME_TYPE_LENGTH_PREFIX {
            return Err(BlockFormatError::DataTooShort);
        }
        let mime_len = bytes[cursor] as usize;
        cursor += CBL_MIME_TYPE_LENGTH_PREFIX + mime_len;

        if block_type == StructuredBlockType::MessageCbl {
            if bytes.len() < cursor + RECIPIENT_COUNT_LENGTH {
                return Err(BlockFormatError::DataTooShort);
            }
            let recipients = BigEndian::read_u16(&bytes[cursor..cursor + 2]) as usize;
            cursor += RECIPIENT_COUNT_LENGTH + recipients * MEMBER_ID_LENGTH;
        }
    }

    let header_end = cursor + COMPACT_SIGNATURE_LENGTH;
    if bytes.len() < header_end {
        return Err(BlockFormatError::DataTooShort);
    }
    Ok(header_end)
}

/// Validate a structured block's magic, type, version and CRC8, returning
/// the header length.
pub fn validate_structured_header(bytes: &[u8]) -> Result<(StructuredBlockType, usize), BlockFormatError> {
    if bytes.len() < 4 {
        return Err(BlockFormatError::DataTooShort);
    }
    if bytes[0] != STRUCTURED_BLOCK_MAGIC {
        return Err(BlockFormatError::UnknownBlockFormat);
    }
    let block_type = StructuredBlockType::from_byte(bytes[CBL_OFF_TYPE])
        .ok_or(BlockFormatError::InvalidStructuredBlockType(bytes[CBL_OFF_TYPE]))?;
    let version = bytes[CBL_OFF_VERSION];
    if version != STRUCTURED_HEADER_VERSION {
        return Err(BlockFormatError::UnsupportedVersion(version));
    }

    let header_end = structured_header_length(bytes)?;
    let crc_region = &bytes[CBL_OFF_CRC8 + 1..header_end - COMPACT_SIGNATURE_LENGTH];
    let computed = crc8(crc_region);
    let stored = bytes[CBL_OFF_CRC8];
    if computed != stored {
        return Err(BlockFormatError::Crc8Mismatch { expected: computed, got: stored });
    }
    Ok((block_type, header_end))
}

/// Classify a buffer. Never panics; malformed input comes back inside the
/// result.
pub fn detect_block_format(bytes: &[u8]) -> BlockFormatInfo {
    if bytes.len() < 4 {
        return BlockFormatInfo::invalid(BlockFormatError::DataTooShort);
    }
    if bytes[0] == STRUCTURED_BLOCK_MAGIC {
        return match validate_structured_header(bytes) {
            Ok((block_type, header_end)) => BlockFormatInfo {
                is_valid: true,
                block_type: Some(block_type),
                version: Some(bytes[CBL_OFF_VERSION]),
                is_structured: true,
                is_encrypted: false,
                header_length: Some(header_end),
                error: None,
            },
            Err(error) => BlockFormatInfo {
                is_valid: false,
                block_type: StructuredBlockType::from_byte(bytes[CBL_OFF_TYPE]),
                version: Some(bytes[CBL_OFF_VERSION]),
                is_structured: true,
                is_encrypted: false,
                header_length: None,
                error: Some(error),
            },
        };
    }
    if bytes[0] == PUBLIC_KEY_PREFIX {
        return BlockFormatInfo {
            is_valid: false,
            block_type: None,
            version: None,
            is_structured: false,
            is_encrypted: true,
            header_length: None,
            error: Some(BlockFormatError::DataAppearsEncrypted),
        };
    }
    BlockFormatInfo::invalid(BlockFormatError::UnknownBlockFormat)
}
