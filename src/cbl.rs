/// Constituent Block List Service
///
/// A CBL is the signed manifest that reconstructs a file: an ordered run of
/// block checksums, tuple-aligned, behind a fixed binary header. Headers are
/// never mutated after signing.
///
/// ```text
/// [0]   magic 0xBC
/// [1]   structured type {CBL, SuperCBL, ExtendedCBL, MessageCBL}
/// [2]   header version 0x01
/// [3]   CRC8 over [4 .. header_end − 64]
/// [4]   creator id (16)
/// [20]  date created, ms since epoch (8, BE)
/// [28]  address count (4, BE)
/// [32]  tuple size (1)
/// [33]  original data length (8, BE)
/// [41]  original data checksum (64)
/// [105] is-extended flag (1)
/// [106] extended fields, when flagged:
///         file name length (2, BE) || file name
///         mime type length (1) || mime type
///         recipient count (2, BE) || recipient ids   (MessageCBL only)
/// [header_end − 64] signature r || s (64)
/// ```
///
/// The signature covers SHA3-512 of the header (signature bytes absent, CRC
/// byte still zero) concatenated with the address data; the CRC byte is
/// written last.
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ByteOrder};
use secp256k1::{PublicKey, SecretKey};
use tracing::debug;

use crate::block::BlockSize;
use crate::block_format::{validate_structured_header, StructuredBlockType};
use crate::capacity::{
    CapacityBlockType, CapacityCalculator, CapacityParams, CblExtensionFields, EncryptionType,
};
use crate::checksum::{Checksum, ChecksumHasher};
use crate::constants::{
    CBL_BASE_FIELDS_END, CBL_MAX_FILE_NAME_LENGTH, CBL_MAX_MIME_TYPE_LENGTH,
    CBL_OFF_ADDRESS_COUNT, CBL_OFF_CRC8, CBL_OFF_CREATOR, CBL_OFF_DATE, CBL_OFF_EXTENDED_FLAG,
    CBL_OFF_ORIGINAL_CHECKSUM, CBL_OFF_ORIGINAL_LENGTH, CBL_OFF_TUPLE_SIZE, CBL_OFF_TYPE,
    CBL_OFF_VERSION, CHECKSUM_LENGTH, COMPACT_SIGNATURE_LENGTH, MEMBER_ID_LENGTH,
    STRUCTURED_BLOCK_MAGIC, STRUCTURED_HEADER_VERSION, TUPLE_MAX_SIZE, TUPLE_MIN_SIZE,
};
use crate::crc::crc8;
use crate::error::CblError;
use crate::guid::MemberId;
use crate::signature;

/// Extended-header payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CblExtension {
    pub file_name: String,
    pub mime_type: String,
    /// Serialized for MessageCBL headers only.
    pub recipients: Vec<MemberId>,
}

/// Inputs to header assembly.
#[derive(Debug, Clone)]
pub struct CblHeaderParams {
    pub block_type: StructuredBlockType,
    pub block_size: BlockSize,
    pub creator_id: MemberId,
    pub date_created_ms: u64,
    pub address_count: u32,
    pub tuple_size: u8,
    pub original_data_length: u64,
    pub original_checksum: Checksum,
    pub extension: Option<CblExtension>,
}

/// Assembled header plus its detached signature.
#[derive(Debug)]
pub struct AssembledCblHeader {
    pub header: Vec<u8>,
    pub signature: [u8; COMPACT_SIGNATURE_LENGTH],
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// File names may not be empty, exceed 255 bytes, contain control
/// characters or reserved punctuation, or smuggle a `..` path component.
pub fn validate_file_name(file_name: &str) -> Result<(), CblError> {
    if file_name.is_empty() {
        return Err(CblError::FileNameEmpty);
    }
    if file_name.len() > CBL_MAX_FILE_NAME_LENGTH {
        return Err(CblError::FileNameTooLong(file_name.len()));
    }
    if file_name.chars().any(|c| c.is_control()) {
        return Err(CblError::FileNameControlChars);
    }
    if file_name.split(['/', '\\']).any(|part| part == "..") {
        return Err(CblError::FileNamePathTraversal);
    }
    const RESERVED: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
    if file_name.chars().any(|c| RESERVED.contains(&c)) {
        return Err(CblError::FileNameInvalidChars);
    }
    Ok(())
}

/// Mime types are lowercase `type/subtype` with `[a-z0-9-]` atoms, at most
/// 127 bytes.
pub fn validate_mime_type(mime_type: &str) -> Result<(), CblError> {
    if mime_type.len() > CBL_MAX_MIME_TYPE_LENGTH {
        return Err(CblError::MimeTypeTooLong(mime_type.len()));
    }
    let mut parts = mime_type.split('/');
    let (Some(main), Some(sub), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(CblError::MimeTypeInvalidFormat);
    };
    let atom_ok = |s: &str| {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    };
    if !atom_ok(main) || !atom_ok(sub) {
        return Err(CblError::MimeTypeInvalidFormat);
    }
    Ok(())
}

fn extension_length(block_type: StructuredBlockType, extension: &CblExtension) -> usize {
    let mut len = 2 + extension.file_name.len() + 1 + extension.mime_type.len();
    if block_type == StructuredBlockType::MessageCbl {
        len += 2 + extension.recipients.len() * MEMBER_ID_LENGTH;
    }
    len
}

fn validate_params(params: &CblHeaderParams, addresses: &[u8]) -> Result<(), CblError> {
    let tuple_size = params.tuple_size as usize;
    if !(TUPLE_MIN_SIZE..=TUPLE_MAX_SIZE).contains(&tuple_size) {
        return Err(CblError::InvalidTupleSize(tuple_size));
    }
    if params.address_count == 0 {
        return Err(CblError::InvalidAddressCount(0));
    }
    if params.address_count as usize % tuple_size != 0 {
        return Err(CblError::InvalidAddressCount(params.address_count));
    }
    let expected = params.address_count as usize * CHECKSUM_LENGTH;
    if addresses.len() != expected {
        return Err(CblError::AddressDataLengthMismatch { expected, got: addresses.len() });
    }
    if params.date_created_ms > now_ms() {
        return Err(CblError::DateInFuture);
    }
    if let Some(extension) = &params.extension {
        validate_file_name(&extension.file_name)?;
        validate_mime_type(&extension.mime_type)?;
    }

    // the header and its address list must fit the target block together
    let header_len = CBL_BASE_FIELDS_END
        + params
            .extension
            .as_ref()
            .map(|e| extension_length(params.block_type, e))
            .unwrap_or(0)
        + COMPACT_SIGNATURE_LENGTH;
    let block_len = params.block_size.length();
    if header_len + expected > block_len {
        let remaining = block_len.saturating_sub(header_len) / CHECKSUM_LENGTH;
        let capacity = remaining - remaining % tuple_size;
        return Err(CblError::AddressCountExceedsCapacity {
            count: params.address_count as usize,
            capacity,
        });
    }
    Ok(())
}

/// Assemble and sign a CBL header over the given address data.
pub fn make_cbl_header(
    signing_key: &SecretKey,
    params: &CblHeaderParams,
    addresses: &[u8],
) -> Result<AssembledCblHeader, CblError> {
    validate_params(params, addresses)?;

    let extension_len = params
        .extension
        .as_ref()
        .map(|e| extension_length(params.block_type, e))
        .unwrap_or(0);
    let header_len = CBL_BASE_FIELDS_END + extension_len + COMPACT_SIGNATURE_LENGTH;

    let mut header = vec![0u8; header_len];
    header[0] = STRUCTURED_BLOCK_MAGIC;
    header[CBL_OFF_TYPE] = params.block_type.as_byte();
    header[CBL_OFF_VERSION] = STRUCTURED_HEADER_VERSION;
    header[CBL_OFF_CREATOR..CBL_OFF_CREATOR + MEMBER_ID_LENGTH]
        .copy_from_slice(params.creator_id.as_bytes());
    BigEndian::write_u64(&mut header[CBL_OFF_DATE..CBL_OFF_DATE + 8], params.date_created_ms);
    BigEndian::write_u32(
        &mut header[CBL_OFF_ADDRESS_COUNT..CBL_OFF_ADDRESS_COUNT + 4],
        params.address_count,
    );
    header[CBL_OFF_TUPLE_SIZE] = params.tuple_size;
    BigEndian::write_u64(
        &mut header[CBL_OFF_ORIGINAL_LENGTH..CBL_OFF_ORIGINAL_LENGTH + 8],
        params.original_data_length,
    );
    header[CBL_OFF_ORIGINAL_CHECKSUM..CBL_OFF_ORIGINAL_CHECKSUM + CHECKSUM_LENGTH]
        .copy_from_slice(params.original_checksum.as_bytes());

    if let Some(extension) = &params.extension {
        header[CBL_OFF_EXTENDED_FLAG] = 1;
        let mut cursor = CBL_BASE_FIELDS_END;
        BigEndian::write_u16(
            &mut header[cursor..cursor + 2],
            extension.file_name.len() as u16,
        );
        cursor += 2;
        header[cursor..cursor + extension.file_name.len()]
            .copy_from_slice(extension.file_name.as_bytes());
        cursor += extension.file_name.len();
        header[cursor] = extension.mime_type.len() as u8;
        cursor += 1;
        header[cursor..cursor + extension.mime_type.len()]
            .copy_from_slice(extension.mime_type.as_bytes());
        cursor += extension.mime_type.len();
        if params.block_type == StructuredBlockType::MessageCbl {
            BigEndian::write_u16(
                &mut header[cursor..cursor + 2],
                extension.recipients.len() as u16,
            );
            cursor += 2;
            for recipient in &extension.recipients {
                header[cursor..cursor + MEMBER_ID_LENGTH].copy_from_slice(recipient.as_bytes());
                cursor += MEMBER_ID_LENGTH;
            }
        }
    }

    // sign over the header minus its signature bytes (CRC still zero), plus
    // the address data
    let digest = signed_digest(&header[..header_len - COMPACT_SIGNATURE_LENGTH], addresses);
    let full = signature::sign(signing_key, digest.as_bytes())
        .map_err(|_| CblError::CreatorRequiredForSignature)?;
    let compact = full.compact();
    header[header_len - COMPACT_SIGNATURE_LENGTH..].copy_from_slice(&compact);

    // CRC over the field region, excluding the CRC byte itself and the
    // signature
    let crc = crc8(&header[CBL_OFF_CRC8 + 1..header_len - COMPACT_SIGNATURE_LENGTH]);
    header[CBL_OFF_CRC8] = crc;

    debug!(
        block_type = ?params.block_type,
        addresses = params.address_count,
        header_len,
        "assembled CBL header"
    );
    Ok(AssembledCblHeader { header, signature: compact })
}

fn signed_digest(header_without_signature: &[u8], addresses: &[u8]) -> Checksum {
    let mut hasher = ChecksumHasher::new();
    hasher.update(header_without_signature);
    hasher.update(addresses);
    hasher.finalize()
}

/// Parsed view of a CBL header.
#[derive(Debug, Clone)]
pub struct CblHeader {
    block_type: StructuredBlockType,
    version: u8,
    creator_id: MemberId,
    date_created_ms: u64,
    address_count: u32,
    tuple_size: u8,
    original_data_length: u64,
    original_checksum: Checksum,
    extension: Option<CblExtension>,
    header_length: usize,
    signature: [u8; COMPACT_SIGNATURE_LENGTH],
}

impl CblHeader {
    /// Parse and structurally validate a header (magic, type, version,
    /// CRC8, bounds, field syntax).
    pub fn parse(bytes: &[u8]) -> Result<Self, CblError> {
        let (block_type, header_length) = validate_structured_header(bytes)?;

        let creator_id = MemberId::from_slice(
            &bytes[CBL_OFF_CREATOR..CBL_OFF_CREATOR + MEMBER_ID_LENGTH],
        )
        .map_err(|_| CblError::HeaderTruncated)?;
        let date_created_ms = BigEndian::read_u64(&bytes[CBL_OFF_DATE..CBL_OFF_DATE + 8]);
        let address_count =
            BigEndian::read_u32(&bytes[CBL_OFF_ADDRESS_COUNT..CBL_OFF_ADDRESS_COUNT + 4]);
        let tuple_size = bytes[CBL_OFF_TUPLE_SIZE];
        let original_data_length =
            BigEndian::read_u64(&bytes[CBL_OFF_ORIGINAL_LENGTH..CBL_OFF_ORIGINAL_LENGTH + 8]);
        let original_checksum = Checksum::from_bytes(
            &bytes[CBL_OFF_ORIGINAL_CHECKSUM..CBL_OFF_ORIGINAL_CHECKSUM + CHECKSUM_LENGTH],
        )
        .map_err(|_| CblError::HeaderTruncated)?;

        let extension = if bytes[CBL_OFF_EXTENDED_FLAG] != 0 {
            Some(Self::parse_extension(bytes, block_type)?)
        } else {
            None
        };

        let mut signature = [0u8; COMPACT_SIGNATURE_LENGTH];
        signature
            .copy_from_slice(&bytes[header_length - COMPACT_SIGNATURE_LENGTH..header_length]);

        Ok(Self {
            block_type,
            version: bytes[CBL_OFF_VERSION],
            creator_id,
            date_created_ms,
            address_count,
            tuple_size,
            original_data_length,
            original_checksum,
            extension,
            header_length,
            signature,
        })
    }

    fn parse_extension(
        bytes: &[u8],
        block_type: StructuredBlockType,
    ) -> Result<CblExtension, CblError> {
        let mut cursor = CBL_BASE_FIELDS_END;
        let file_name_len = BigEndian::read_u16(&bytes[cursor..cursor + 2]) as usize;
        cursor += 2;
        let file_name = std::str::from_utf8(&bytes[cursor..cursor + file_name_len])
            .map_err(|_| CblError::FileNameInvalidChars)?
            .to_string();
        cursor += file_name_len;
        let mime_len = bytes[cursor] as usize;
        cursor += 1;
        let mime_type = std::str::from_utf8(&bytes[cursor..cursor + mime_len])
            .map_err(|_| CblError::MimeTypeInvalidFormat)?
            .to_string();
        cursor += mime_len;
        validate_file_name(&file_name)?;
        validate_mime_type(&mime_type)?;

        let mut recipients = Vec::new();
        if block_type == StructuredBlockType::MessageCbl {
            let count = BigEndian::read_u16(&bytes[cursor..cursor + 2]) as usize;
            cursor += 2;
            for _ in 0..count {
                recipients.push(
                    MemberId::from_slice(&bytes[cursor..cursor + MEMBER_ID_LENGTH])
                        .map_err(|_| CblError::HeaderTruncated)?,
                );
                cursor += MEMBER_ID_LENGTH;
            }
        }
        Ok(CblExtension { file_name, mime_type, recipients })
    }

    pub fn block_type(&self) -> StructuredBlockType {
        self.block_type
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn creator_id(&self) -> MemberId {
        self.creator_id
    }

    pub fn date_created_ms(&self) -> u64 {
        self.date_created_ms
    }

    pub fn address_count(&self) -> u32 {
        self.address_count
    }

    pub fn tuple_size(&self) -> u8 {
        self.tuple_size
    }

    pub fn original_data_length(&self) -> u64 {
        self.original_data_length
    }

    pub fn original_checksum(&self) -> &Checksum {
        &self.original_checksum
    }

    pub fn is_extended(&self) -> bool {
        self.extension.is_some()
    }

    pub fn file_name(&self) -> Result<&str, CblError> {
        self.extension
            .as_ref()
            .map(|e| e.file_name.as_str())
            .ok_or(CblError::NotExtendedCbl)
    }

    pub fn mime_type(&self) -> Result<&str, CblError> {
        self.extension
            .as_ref()
            .map(|e| e.mime_type.as_str())
            .ok_or(CblError::NotExtendedCbl)
    }

    pub fn recipients(&self) -> Result<&[MemberId], CblError> {
        self.extension
            .as_ref()
            .map(|e| e.recipients.as_slice())
            .ok_or(CblError::NotExtendedCbl)
    }

    pub fn header_length(&self) -> usize {
        self.header_length
    }

    pub fn signature(&self) -> &[u8; COMPACT_SIGNATURE_LENGTH] {
        &self.signature
    }

    /// Address bytes immediately following the header.
    pub fn address_data<'a>(&self, block: &'a [u8]) -> Result<&'a [u8], CblError> {
        let expected = self.address_count as usize * CHECKSUM_LENGTH;
        let end = self.header_length + expected;
        if block.len() < end {
            return Err(CblError::AddressDataLengthMismatch {
                expected,
                got: block.len().saturating_sub(self.header_length),
            });
        }
        Ok(&block[self.header_length..end])
    }

    /// Address data decoded into checksums, in list order.
    pub fn addresses(&self, block: &[u8]) -> Result<Vec<Checksum>, CblError> {
        let data = self.address_data(block)?;
        let mut out = Vec::with_capacity(self.address_count as usize);
        for chunk in data.chunks_exact(CHECKSUM_LENGTH) {
            out.push(Checksum::from_bytes(chunk).map_err(|_| CblError::HeaderTruncated)?);
        }
        Ok(out)
    }
}

/// Verify the stored signature over header + address data against a
/// creator's public key.
pub fn validate_signature(block: &[u8], creator: &PublicKey) -> Result<bool, CblError> {
    let header = CblHeader::parse(block)?;
    let addresses = header.address_data(block)?;

    // reconstruct the signed bytes: header without signature, CRC zeroed
    let mut signed = block[..header.header_length - COMPACT_SIGNATURE_LENGTH].to_vec();
    signed[CBL_OFF_CRC8] = 0;
    let digest = signed_digest(&signed, addresses);

    Ok(signature::verify_compact(creator, &header.signature, digest.as_bytes()))
}

/// Maximum number of addresses a CBL of the given geometry can carry;
/// always a multiple of the tuple size, monotone in block size, strictly
/// smaller under encryption or extension. `with_encryption` accounts the
/// bare creator-addressed envelope the store pipeline seals CBL blocks
/// with (97 bytes), matching the bytes actually written.
pub fn calculate_cbl_address_capacity(
    block_size: BlockSize,
    with_encryption: bool,
    file_name: Option<&str>,
    mime_type: Option<&str>,
    tuple_size: usize,
) -> Result<usize, CblError> {
    let extended = file_name.is_some() || mime_type.is_some();
    let block_type = if extended { CapacityBlockType::ExtendedCbl } else { CapacityBlockType::Cbl };
    let mut params = CapacityParams::new(block_size, block_type).with_tuple_size(tuple_size);
    if with_encryption {
        params = params.with_encryption(EncryptionType::CreatorSealed);
    }
    if extended {
        params = params.with_extension(CblExtensionFields {
            file_name: file_name.unwrap_or_default().to_string(),
            mime_type: mime_type.unwrap_or_default().to_string(),
        });
    }
    Ok(CapacityCalculator::address_capacity(&params)?)
}
