//! The DEX file header and version tag.
//!
//! See: <https://source.android.com/docs/core/runtime/dex-format#header-item>

use std::sync::Arc;

use winnow::ModalResult;
use winnow::binary::{be_u16, be_u32, le_u32, u8};
use winnow::prelude::*;
use winnow::token::take;

use crate::errors::DexError;

/// The constant used to indicate the endianness of the file in which it is
/// found. This constant means little-endian.
pub const ENDIAN_CONSTANT: u32 = 0x12345678;

/// The constant used to indicate the endianness of the file in which it is
/// found. This constant means big-endian.
pub const REVERSE_ENDIAN_CONSTANT: u32 = 0x78563412;

/// The constant used to indicate that an index value is absent.
pub const NO_INDEX: u32 = u32::MAX;

/// Known dex versions.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#dex-file-magic>
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DexVersion {
    #[default]
    Dex35,
    Dex36,
    Dex37,
    Dex38,
    Dex39,
    Dex40,
    Dex41,
}

impl DexVersion {
    /// The minimum dex version able to express the given min-api level,
    /// mirroring the compatibility table used by real Android toolchains.
    pub fn min_for_api_level(min_api: u32) -> Self {
        match min_api {
            0..=27 => DexVersion::Dex35,
            28..=presence::API_29 => DexVersion::Dex38,
            _ => DexVersion::Dex41,
        }
    }

    pub fn supports_const_method_handle(self) -> bool {
        self >= DexVersion::Dex38
    }

    pub fn supports_container_format(self) -> bool {
        self >= DexVersion::Dex41
    }
}

mod presence {
    pub const API_29: u32 = 29;
}

impl TryFrom<u16> for DexVersion {
    type Error = DexError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x3335 => Ok(DexVersion::Dex35),
            0x3336 => Ok(DexVersion::Dex36),
            0x3337 => Ok(DexVersion::Dex37),
            0x3338 => Ok(DexVersion::Dex38),
            0x3339 => Ok(DexVersion::Dex39),
            0x3430 => Ok(DexVersion::Dex40),
            0x3431 => Ok(DexVersion::Dex41),
            _ => Err(DexError::UnknownVersion(value)),
        }
    }
}

impl From<DexVersion> for u16 {
    fn from(value: DexVersion) -> Self {
        match value {
            DexVersion::Dex35 => 0x3335,
            DexVersion::Dex36 => 0x3336,
            DexVersion::Dex37 => 0x3337,
            DexVersion::Dex38 => 0x3338,
            DexVersion::Dex39 => 0x3339,
            DexVersion::Dex40 => 0x3430,
            DexVersion::Dex41 => 0x3431,
        }
    }
}

impl From<DexVersion> for u32 {
    fn from(value: DexVersion) -> Self {
        match value {
            DexVersion::Dex35 => 35,
            DexVersion::Dex36 => 36,
            DexVersion::Dex37 => 37,
            DexVersion::Dex38 => 38,
            DexVersion::Dex39 => 39,
            DexVersion::Dex40 => 40,
            DexVersion::Dex41 => 41,
        }
    }
}

/// Abstraction over `header_item`.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#header-item>
#[derive(Default, Debug, Clone)]
pub struct DexHeader {
    pub magic: u32,
    pub version: DexVersion,
    /// Adler32 checksum of the file (recomputed by the external writer
    /// once final bytes are known; kept here only for round-tripping a
    /// parsed input).
    pub checksum: u32,
    /// SHA-1 signature of the file.
    pub signature: Arc<[u8]>,
    pub file_size: u32,
    pub header_size: u32,
    pub endian_tag: u32,
    pub link_size: u32,
    pub link_off: u32,
    pub map_off: u32,
    pub string_ids_size: u32,
    pub string_ids_off: u32,
    pub type_ids_size: u32,
    pub type_ids_off: u32,
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,
    pub field_ids_size: u32,
    pub field_ids_off: u32,
    pub method_ids_size: u32,
    pub method_ids_off: u32,
    pub class_defs_size: u32,
    pub class_defs_off: u32,
    pub data_size: u32,
    pub data_off: u32,
    /// Unused in [DexVersion::Dex40] or earlier.
    pub container_size: u32,
    /// Unused in [DexVersion::Dex40] or earlier.
    pub header_offset: u32,
}

pub fn parse_header(input: &mut &[u8]) -> ModalResult<DexHeader> {
    let (magic, _, version, _) = (
        be_u32.verify(|magic| *magic == 0x6465780A),
        u8.verify(|v| *v == 0x30),
        be_u16.try_map(DexVersion::try_from),
        u8.verify(|v| *v == 0x00),
    )
        .parse_next(input)?;

    let (
        checksum,
        signature,
        file_size,
        header_size,
        endian_tag,
        link_size,
        link_off,
        map_off,
        string_ids_size,
        string_ids_off,
        type_ids_size,
        type_ids_off,
        proto_ids_size,
        proto_ids_off,
        field_ids_size,
        field_ids_off,
        method_ids_size,
        method_ids_off,
        class_defs_size,
        class_defs_off,
        data_size,
        data_off,
    ) = (
        le_u32,
        take(20usize).map(Arc::from),
        le_u32,
        le_u32,
        le_u32.verify(|&tag| tag == ENDIAN_CONSTANT || tag == REVERSE_ENDIAN_CONSTANT),
        le_u32,
        le_u32,
        le_u32,
        le_u32,
        le_u32,
        le_u32.verify(|&size| size <= u16::MAX.into()),
        le_u32,
        le_u32.verify(|&size| size <= u16::MAX.into()),
        le_u32,
        le_u32,
        le_u32,
        le_u32,
        le_u32,
        le_u32,
        le_u32,
        le_u32,
        le_u32,
    )
        .parse_next(input)?;

    let mut container_size = 0;
    let mut header_offset = 0;
    if version >= DexVersion::Dex41 {
        (container_size, header_offset) = (le_u32, le_u32).parse_next(input)?;
    }

    Ok(DexHeader {
        magic,
        version,
        checksum,
        signature,
        file_size,
        header_size,
        endian_tag,
        link_size,
        link_off,
        map_off,
        string_ids_size,
        string_ids_off,
        type_ids_size,
        type_ids_off,
        proto_ids_size,
        proto_ids_off,
        field_ids_size,
        field_ids_off,
        method_ids_size,
        method_ids_off,
        class_defs_size,
        class_defs_off,
        data_size,
        data_off,
        container_size,
        header_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_round_trips_through_u16() {
        for v in [
            DexVersion::Dex35,
            DexVersion::Dex36,
            DexVersion::Dex37,
            DexVersion::Dex38,
            DexVersion::Dex39,
            DexVersion::Dex40,
            DexVersion::Dex41,
        ] {
            let raw: u16 = v.into();
            assert_eq!(DexVersion::try_from(raw).unwrap(), v);
        }
    }

    #[test]
    fn unknown_version_is_rejected() {
        assert!(DexVersion::try_from(0x1234).is_err());
    }

    #[test]
    fn dex41_is_the_first_container_capable_version() {
        assert!(!DexVersion::Dex40.supports_container_format());
        assert!(DexVersion::Dex41.supports_container_format());
    }
}
