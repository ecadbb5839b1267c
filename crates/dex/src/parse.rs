//! Parses a raw DEX byte buffer into interned [DexClass] values, feeding
//! every descriptor through an [ItemPool] instead of leaving it as a raw
//! index into the file's flat ID tables.

use std::borrow::Cow;

use dexcomp_pool::{DexField, DexMethod, DexProto, DexType, ItemPool};
use winnow::ModalResult;
use winnow::binary::{le_u16, le_u32};
use winnow::combinator::repeat;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take;

use crate::access_flags::AccessFlags;
use crate::class::{
    AnnotationSet, ClassKind, DexClass, DexEncodedField, DexEncodedMethod, EncodedValue,
    ProgramClassInfo,
};
use crate::code::{DebugPositionEntry, DexCode, EncodedCatchHandler, TryItem};
use crate::errors::DexError;
use crate::header::{DexHeader, NO_INDEX, parse_header};

/// Everything a finished parse produces: the header (for round-tripping
/// format metadata) and every class found in `class_defs`, already
/// installed with interned references.
#[derive(Debug)]
pub struct ParsedDex {
    pub header: DexHeader,
    pub classes: Vec<DexClass>,
    /// The resolved string/type/proto/field/method tables, indexed exactly
    /// as `code_item` instruction operands index them. Kept around so an
    /// IR builder can resolve a raw instruction's indices without
    /// re-parsing the ID tables.
    pub tables: DexIndexTables,
}

struct RawProtoId {
    shorty_idx: u32,
    return_type_idx: u32,
    parameters_off: u32,
}

struct RawFieldId {
    class_idx: u16,
    type_idx: u16,
    name_idx: u32,
}

struct RawMethodId {
    class_idx: u16,
    proto_idx: u16,
    name_idx: u32,
}

struct RawClassDef {
    class_idx: u32,
    access_flags: u32,
    superclass_idx: u32,
    interfaces_off: u32,
    source_file_idx: u32,
    annotations_off: u32,
    class_data_off: u32,
    static_values_off: u32,
}

fn parse_proto_id(input: &mut &[u8]) -> ModalResult<RawProtoId> {
    (le_u32, le_u32, le_u32)
        .map(|(shorty_idx, return_type_idx, parameters_off)| RawProtoId {
            shorty_idx,
            return_type_idx,
            parameters_off,
        })
        .parse_next(input)
}

fn parse_field_id(input: &mut &[u8]) -> ModalResult<RawFieldId> {
    (le_u16, le_u16, le_u32)
        .map(|(class_idx, type_idx, name_idx)| RawFieldId {
            class_idx,
            type_idx,
            name_idx,
        })
        .parse_next(input)
}

fn parse_method_id(input: &mut &[u8]) -> ModalResult<RawMethodId> {
    (le_u16, le_u16, le_u32)
        .map(|(class_idx, proto_idx, name_idx)| RawMethodId {
            class_idx,
            proto_idx,
            name_idx,
        })
        .parse_next(input)
}

fn parse_class_def(input: &mut &[u8]) -> ModalResult<RawClassDef> {
    (
        le_u32, le_u32, le_u32, le_u32, le_u32, le_u32, le_u32, le_u32,
    )
        .map(
            |(
                class_idx,
                access_flags,
                superclass_idx,
                interfaces_off,
                source_file_idx,
                annotations_off,
                class_data_off,
                static_values_off,
            )| RawClassDef {
                class_idx,
                access_flags,
                superclass_idx,
                interfaces_off,
                source_file_idx,
                annotations_off,
                class_data_off,
                static_values_off,
            },
        )
        .parse_next(input)
}

#[inline]
fn uleb128(input: &mut &[u8]) -> ModalResult<u64> {
    let mut val = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = winnow::binary::u8.parse_next(input)?;
        let b = (byte & 0x7f) as u64;
        val |= b
            .checked_shl(shift)
            .ok_or_else(|| ErrMode::Cut(ContextError::new()))?;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(val)
}

#[inline]
fn sleb128(input: &mut &[u8]) -> ModalResult<i64> {
    let mut result = 0i64;
    let mut shift = 0u32;
    let mut byte;
    loop {
        byte = winnow::binary::u8.parse_next(input)?;
        result |= ((byte & 0x7f) as i64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 64 && (byte & 0x40) != 0 {
                result |= -1i64 << shift;
            }
            break;
        }
    }
    Ok(result)
}

/// A cursor over the whole file, used to resolve `_off` fields that point
/// anywhere in the `data` section.
struct Cursor<'a> {
    data: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn at(&self, offset: u32) -> Result<&'a [u8], DexError> {
        self.data.get(offset as usize..).ok_or(DexError::InvalidHeader)
    }

    fn string_data(&self, offset: u32) -> Result<Cow<'a, str>, DexError> {
        let mut cur = self.at(offset)?;
        let utf16_size = uleb128(&mut cur).map_err(|_| DexError::StringError)?;
        let bytes = take::<usize, &[u8], ContextError>(utf16_size as usize)
            .parse_next(&mut cur)
            .map_err(|_| DexError::StringError)?;
        Ok(simd_cesu8::mutf8::decode_lossy(bytes))
    }
}

/// Resolves every interned table up front so later passes (class data,
/// code, encoded values) can look references up by raw index. Also
/// handed out on [ParsedDex] so a downstream IR builder can resolve the
/// same raw indices a `code_item`'s instructions carry.
#[derive(Debug, Default, Clone)]
pub struct DexIndexTables {
    strings_by_idx: Vec<dexcomp_pool::DexString>,
    types_by_idx: Vec<DexType>,
    protos_by_idx: Vec<DexProto>,
    fields_by_idx: Vec<DexField>,
    methods_by_idx: Vec<DexMethod>,
}

impl DexIndexTables {
    pub fn type_at(&self, idx: u32) -> Result<DexType, DexError> {
        self.types_by_idx
            .get(idx as usize)
            .cloned()
            .ok_or(DexError::TypeIndexOutOfRange {
                idx,
                len: self.types_by_idx.len(),
            })
    }

    pub fn string_at(&self, idx: u32) -> Result<dexcomp_pool::DexString, DexError> {
        self.strings_by_idx
            .get(idx as usize)
            .cloned()
            .ok_or(DexError::StringIndexOutOfRange {
                idx,
                len: self.strings_by_idx.len(),
            })
    }

    pub fn proto_at(&self, idx: u32) -> Result<DexProto, DexError> {
        self.protos_by_idx.get(idx as usize).cloned().ok_or(DexError::ProtoError)
    }

    pub fn field_at(&self, idx: u32) -> Result<DexField, DexError> {
        self.fields_by_idx
            .get(idx as usize)
            .cloned()
            .ok_or(DexError::FieldError)
    }

    pub fn method_at(&self, idx: u32) -> Result<DexMethod, DexError> {
        self.methods_by_idx
            .get(idx as usize)
            .cloned()
            .ok_or(DexError::MethodError)
    }
}

fn parse_type_list(cursor: &Cursor, offset: u32, tables: &DexIndexTables) -> Result<Vec<DexType>, DexError> {
    if offset == 0 {
        return Ok(Vec::new());
    }
    let mut input = cursor.at(offset)?;
    let size = le_u32.parse_next(&mut input).map_err(|_: ErrMode<ContextError>| DexError::ProtoError)?;
    let idxs: Vec<u16> = repeat(size as usize, le_u16)
        .parse_next(&mut input)
        .map_err(|_: ErrMode<ContextError>| DexError::ProtoError)?;
    idxs.into_iter()
        .map(|idx| tables.type_at(idx as u32))
        .collect()
}

fn decode_encoded_value(
    input: &mut &[u8],
    cursor: &Cursor,
    tables: &DexIndexTables,
) -> Result<EncodedValue, DexError> {
    let tag = winnow::binary::u8
        .parse_next(input)
        .map_err(|_: ErrMode<ContextError>| DexError::ClassError)?;
    let value_type = tag & 0x1f;
    let value_arg = (tag >> 5) as usize;

    let read_sized_uint = |input: &mut &[u8], size: usize| -> Result<u64, DexError> {
        let bytes = take::<usize, &[u8], ContextError>(size)
            .parse_next(input)
            .map_err(|_| DexError::ClassError)?;
        let mut buf = [0u8; 8];
        buf[..size].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    };

    match value_type {
        0x00 => Ok(EncodedValue::Byte(read_sized_uint(input, value_arg + 1)? as i8)),
        0x02 => Ok(EncodedValue::Short(read_sized_uint(input, value_arg + 1)? as i16)),
        0x03 => Ok(EncodedValue::Char(read_sized_uint(input, value_arg + 1)? as u16)),
        0x04 => Ok(EncodedValue::Int(read_sized_uint(input, value_arg + 1)? as i32)),
        0x06 => Ok(EncodedValue::Long(read_sized_uint(input, value_arg + 1)? as i64)),
        0x10 => {
            let raw = (read_sized_uint(input, value_arg + 1)? as u32) << (24 - value_arg * 8).min(24);
            Ok(EncodedValue::Float(f32::from_bits(raw)))
        }
        0x11 => {
            let raw = read_sized_uint(input, value_arg + 1)? << (56 - value_arg * 8).min(56);
            Ok(EncodedValue::Double(f64::from_bits(raw)))
        }
        0x17 => {
            let idx = read_sized_uint(input, value_arg + 1)? as u32;
            Ok(EncodedValue::String(tables.string_at(idx)?))
        }
        0x18 => {
            let idx = read_sized_uint(input, value_arg + 1)? as u32;
            Ok(EncodedValue::Type(tables.type_at(idx)?))
        }
        0x19 => {
            let idx = read_sized_uint(input, value_arg + 1)? as u32;
            Ok(EncodedValue::Field(tables.field_at(idx)?))
        }
        0x1a => {
            let idx = read_sized_uint(input, value_arg + 1)? as u32;
            Ok(EncodedValue::Method(tables.method_at(idx)?))
        }
        0x1b => {
            let idx = read_sized_uint(input, value_arg + 1)? as u32;
            Ok(EncodedValue::Enum(tables.field_at(idx)?))
        }
        0x1c => {
            let size = uleb128(input).map_err(|_| DexError::ClassError)?;
            let mut values = Vec::with_capacity(size as usize);
            for _ in 0..size {
                values.push(decode_encoded_value(input, cursor, tables)?);
            }
            Ok(EncodedValue::Array(values))
        }
        0x1d => {
            let annotation_type_idx = uleb128(input).map_err(|_| DexError::ClassError)?;
            let size = uleb128(input).map_err(|_| DexError::ClassError)?;
            let mut elements = Vec::with_capacity(size as usize);
            for _ in 0..size {
                let name_idx = uleb128(input).map_err(|_| DexError::ClassError)?;
                let value = decode_encoded_value(input, cursor, tables)?;
                elements.push((tables.string_at(name_idx as u32)?, value));
            }
            Ok(EncodedValue::Annotation(crate::class::Annotation {
                annotation_type: tables.type_at(annotation_type_idx as u32)?,
                visibility: crate::class::AnnotationVisibility::Build,
                elements,
            }))
        }
        0x1e => Ok(EncodedValue::Null),
        0x1f => Ok(EncodedValue::Boolean(value_arg != 0)),
        other => Err(DexError::UnsupportedEncodedValue(other)),
    }
}

fn parse_static_values(
    cursor: &Cursor,
    offset: u32,
    tables: &DexIndexTables,
) -> Result<Vec<EncodedValue>, DexError> {
    if offset == 0 {
        return Ok(Vec::new());
    }
    let mut input = cursor.at(offset)?;
    let size = uleb128(&mut input).map_err(|_| DexError::ClassError)?;
    (0..size)
        .map(|_| decode_encoded_value(&mut input, cursor, tables))
        .collect()
}

fn parse_code_item(cursor: &Cursor, offset: u32, tables: &DexIndexTables) -> Result<DexCode, DexError> {
    if offset == 0 {
        return Ok(DexCode::default());
    }
    let mut input = cursor.at(offset)?;

    let (registers_size, ins_size, outs_size, tries_size, debug_info_off, insns_size) = (
        le_u16, le_u16, le_u16, le_u16, le_u32, le_u32,
    )
        .parse_next(&mut input)
        .map_err(|_: ErrMode<ContextError>| DexError::CodeError(String::new()))?;

    let insns: Vec<u16> = repeat(insns_size as usize, le_u16)
        .parse_next(&mut input)
        .map_err(|_: ErrMode<ContextError>| DexError::CodeError(String::new()))?;

    if tries_size > 0 && insns_size % 2 == 1 {
        let _padding = le_u16
            .parse_next(&mut input)
            .map_err(|_: ErrMode<ContextError>| DexError::CodeError(String::new()))?;
    }

    let mut tries = Vec::with_capacity(tries_size as usize);
    for _ in 0..tries_size {
        let (start_addr, insn_count, handler_offset) = (le_u32, le_u16, le_u16)
            .parse_next(&mut input)
            .map_err(|_: ErrMode<ContextError>| DexError::CodeError(String::new()))?;
        tries.push(TryItem {
            start_addr,
            insn_count,
            handler_offset,
        });
    }

    let mut handlers = Vec::new();
    if tries_size > 0 {
        let handlers_list_size = uleb128(&mut input).map_err(|_| DexError::CodeError(String::new()))?;
        for _ in 0..handlers_list_size {
            let size = sleb128(&mut input).map_err(|_| DexError::CodeError(String::new()))?;
            let mut handler = EncodedCatchHandler::default();
            for _ in 0..size.unsigned_abs() {
                let type_idx = uleb128(&mut input).map_err(|_| DexError::CodeError(String::new()))?;
                let addr = uleb128(&mut input).map_err(|_| DexError::CodeError(String::new()))?;
                handler.handlers.push((tables.type_at(type_idx as u32)?, addr as u32));
            }
            if size <= 0 {
                let catch_all_addr = uleb128(&mut input).map_err(|_| DexError::CodeError(String::new()))?;
                handler.catch_all_addr = Some(catch_all_addr as u32);
            }
            handlers.push(handler);
        }
    }

    let debug_positions = if debug_info_off != 0 {
        parse_debug_line_positions(cursor, debug_info_off)?
    } else {
        Vec::new()
    };

    Ok(DexCode {
        registers_size,
        ins_size,
        outs_size,
        insns,
        tries,
        handlers,
        debug_positions,
    })
}

/// A coarse reading of `debug_info_item`: only the `DBG_ADVANCE_LINE` /
/// `DBG_ADVANCE_PC` / special opcodes needed to reconstruct an
/// address-to-line mapping. Local variable names are not retained —
/// there is no optimization pass in this pipeline that consumes them.
fn parse_debug_line_positions(cursor: &Cursor, offset: u32) -> Result<Vec<DebugPositionEntry>, DexError> {
    let mut input = cursor.at(offset)?;
    let mut line = uleb128(&mut input).map_err(|_| DexError::CodeError(String::new()))? as u32;
    let parameters_size = uleb128(&mut input).map_err(|_| DexError::CodeError(String::new()))?;
    for _ in 0..parameters_size {
        let _param_name_idx = uleb128(&mut input).map_err(|_| DexError::CodeError(String::new()))?;
    }

    let mut address = 0u32;
    let mut positions = Vec::new();
    loop {
        let opcode = winnow::binary::u8
            .parse_next(&mut input)
            .map_err(|_: ErrMode<ContextError>| DexError::CodeError(String::new()))?;
        match opcode {
            0x00 => break, // DBG_END_SEQUENCE
            0x01 => {
                // DBG_ADVANCE_PC
                address += uleb128(&mut input).map_err(|_| DexError::CodeError(String::new()))? as u32;
            }
            0x02 => {
                // DBG_ADVANCE_LINE
                line = (line as i64
                    + sleb128(&mut input).map_err(|_| DexError::CodeError(String::new()))?)
                    as u32;
            }
            0x03 => {
                // DBG_START_LOCAL: register_num, name_idx+1, type_idx+1
                let _reg = uleb128(&mut input).map_err(|_| DexError::CodeError(String::new()))?;
                let _name = uleb128(&mut input).map_err(|_| DexError::CodeError(String::new()))?;
                let _ty = uleb128(&mut input).map_err(|_| DexError::CodeError(String::new()))?;
            }
            0x04 => {
                let _reg = uleb128(&mut input).map_err(|_| DexError::CodeError(String::new()))?;
                let _name = uleb128(&mut input).map_err(|_| DexError::CodeError(String::new()))?;
                let _ty = uleb128(&mut input).map_err(|_| DexError::CodeError(String::new()))?;
                let _sig = uleb128(&mut input).map_err(|_| DexError::CodeError(String::new()))?;
            }
            0x05 => {
                let _reg = uleb128(&mut input).map_err(|_| DexError::CodeError(String::new()))?;
            }
            0x06 => {}
            0x07 | 0x08 => {}
            special => {
                let adjusted = special as i32 - 0x0a;
                address += (adjusted / 15) as u32;
                line = (line as i32 + (adjusted % 15) - 4) as u32;
                positions.push(DebugPositionEntry { address, line });
            }
        }
    }
    Ok(positions)
}

fn parse_class_data(
    cursor: &Cursor,
    offset: u32,
    tables: &DexIndexTables,
) -> Result<
    (
        Vec<DexEncodedField>,
        Vec<DexEncodedField>,
        Vec<DexEncodedMethod>,
        Vec<DexEncodedMethod>,
    ),
    DexError,
> {
    if offset == 0 {
        return Ok((Vec::new(), Vec::new(), Vec::new(), Vec::new()));
    }
    let mut input = cursor.at(offset)?;

    let static_fields_size = uleb128(&mut input).map_err(|_| DexError::ClassError)?;
    let instance_fields_size = uleb128(&mut input).map_err(|_| DexError::ClassError)?;
    let direct_methods_size = uleb128(&mut input).map_err(|_| DexError::ClassError)?;
    let virtual_methods_size = uleb128(&mut input).map_err(|_| DexError::ClassError)?;

    let parse_fields = |input: &mut &[u8], count: u64| -> Result<Vec<DexEncodedField>, DexError> {
        let mut fields = Vec::with_capacity(count as usize);
        let mut field_idx = 0u32;
        for _ in 0..count {
            field_idx += uleb128(input).map_err(|_| DexError::ClassError)? as u32;
            let access_flags = uleb128(input).map_err(|_| DexError::ClassError)? as u32;
            let reference = tables.field_at(field_idx)?;
            fields.push(DexEncodedField::new(
                reference,
                AccessFlags::from_bits_truncate(access_flags),
            ));
        }
        Ok(fields)
    };

    let parse_methods = |input: &mut &[u8], count: u64| -> Result<Vec<DexEncodedMethod>, DexError> {
        let mut methods = Vec::with_capacity(count as usize);
        let mut method_idx = 0u32;
        for _ in 0..count {
            method_idx += uleb128(input).map_err(|_| DexError::ClassError)? as u32;
            let access_flags = uleb128(input).map_err(|_| DexError::ClassError)? as u32;
            let code_off = uleb128(input).map_err(|_| DexError::ClassError)? as u32;
            let reference = tables.method_at(method_idx)?;
            let mut encoded = DexEncodedMethod::new(reference, AccessFlags::from_bits_truncate(access_flags));
            if code_off != 0 {
                encoded.code = Some(crate::code::Code::Dex(parse_code_item(cursor, code_off, tables)?));
            }
            methods.push(encoded);
        }
        Ok(methods)
    };

    let static_fields = parse_fields(&mut input, static_fields_size)?;
    let instance_fields = parse_fields(&mut input, instance_fields_size)?;
    let direct_methods = parse_methods(&mut input, direct_methods_size)?;
    let virtual_methods = parse_methods(&mut input, virtual_methods_size)?;

    Ok((static_fields, instance_fields, direct_methods, virtual_methods))
}

/// Parses a whole DEX buffer, interning every descriptor through `pool`
/// and returning the header plus every class found in `class_defs`.
pub fn parse(data: &[u8], pool: &ItemPool) -> Result<ParsedDex, DexError> {
    let mut input = &data[..];
    let header = parse_header(&mut input).map_err(|_| DexError::InvalidHeader)?;
    let cursor = Cursor { data };

    let string_offsets: Vec<u32> = repeat(header.string_ids_size as usize, le_u32)
        .parse_next(&mut input)
        .map_err(|_: ErrMode<ContextError>| DexError::StringError)?;
    let strings_by_idx = string_offsets
        .into_iter()
        .map(|off| cursor.string_data(off).map(|s| pool.intern_string(s.as_bytes())))
        .collect::<Result<Vec<_>, DexError>>()?;

    let type_string_idxs: Vec<u32> = repeat(header.type_ids_size as usize, le_u32)
        .parse_next(&mut input)
        .map_err(|_: ErrMode<ContextError>| DexError::TypeError)?;
    let types_by_idx = type_string_idxs
        .into_iter()
        .map(|idx| {
            strings_by_idx
                .get(idx as usize)
                .ok_or(DexError::TypeError)
                .map(|s| pool.intern_type(s.as_bytes()))
        })
        .collect::<Result<Vec<_>, DexError>>()?;

    let raw_protos: Vec<RawProtoId> = repeat(header.proto_ids_size as usize, parse_proto_id)
        .parse_next(&mut input)
        .map_err(|_: ErrMode<ContextError>| DexError::ProtoError)?;

    let raw_fields: Vec<RawFieldId> = repeat(header.field_ids_size as usize, parse_field_id)
        .parse_next(&mut input)
        .map_err(|_: ErrMode<ContextError>| DexError::FieldError)?;

    let raw_methods: Vec<RawMethodId> = repeat(header.method_ids_size as usize, parse_method_id)
        .parse_next(&mut input)
        .map_err(|_: ErrMode<ContextError>| DexError::MethodError)?;

    let raw_class_defs: Vec<RawClassDef> = repeat(header.class_defs_size as usize, parse_class_def)
        .parse_next(&mut input)
        .map_err(|_: ErrMode<ContextError>| DexError::ClassError)?;

    // protos/fields/methods all reference only string/type tables built
    // above, so they can be resolved before a full `DexIndexTables` is
    // needed by class data / code parsing.
    let mut tables = DexIndexTables {
        strings_by_idx,
        types_by_idx,
        protos_by_idx: Vec::new(),
        fields_by_idx: Vec::new(),
        methods_by_idx: Vec::new(),
    };

    tables.protos_by_idx = raw_protos
        .into_iter()
        .map(|raw| {
            let return_type = tables.type_at(raw.return_type_idx)?;
            let parameters = parse_type_list(&cursor, raw.parameters_off, &tables)?;
            let _shorty = tables.string_at(raw.shorty_idx)?;
            Ok(pool.intern_proto(return_type, parameters))
        })
        .collect::<Result<Vec<_>, DexError>>()?;

    tables.fields_by_idx = raw_fields
        .into_iter()
        .map(|raw| {
            let holder = tables.type_at(raw.class_idx as u32)?;
            let field_type = tables.type_at(raw.type_idx as u32)?;
            let name = tables.string_at(raw.name_idx)?;
            Ok(pool.intern_field(holder, field_type, name.as_bytes()))
        })
        .collect::<Result<Vec<_>, DexError>>()?;

    tables.methods_by_idx = raw_methods
        .into_iter()
        .map(|raw| {
            let holder = tables.type_at(raw.class_idx as u32)?;
            let proto = tables
                .protos_by_idx
                .get(raw.proto_idx as usize)
                .cloned()
                .ok_or(DexError::ProtoError)?;
            let name = tables.string_at(raw.name_idx)?;
            Ok(pool.intern_method(holder, proto, name.as_bytes()))
        })
        .collect::<Result<Vec<_>, DexError>>()?;

    let classes = raw_class_defs
        .into_iter()
        .map(|raw| {
            let class_type = tables.type_at(raw.class_idx)?;
            let super_type = if raw.superclass_idx == NO_INDEX {
                None
            } else {
                Some(tables.type_at(raw.superclass_idx)?)
            };
            let source_file = if raw.source_file_idx == NO_INDEX {
                None
            } else {
                Some(tables.string_at(raw.source_file_idx)?)
            };
            let interfaces = parse_type_list(&cursor, raw.interfaces_off, &tables)?;
            let (static_fields, instance_fields, direct_methods, virtual_methods) =
                parse_class_data(&cursor, raw.class_data_off, &tables)?;
            let static_values = parse_static_values(&cursor, raw.static_values_off, &tables)?;

            let mut static_fields = static_fields;
            for (field, value) in static_fields.iter_mut().zip(static_values.into_iter()) {
                field.static_value = Some(value);
            }

            Ok(DexClass {
                kind: ClassKind::Program(ProgramClassInfo::default()),
                class_type,
                access_flags: AccessFlags::from_bits_truncate(raw.access_flags),
                super_type,
                interfaces,
                source_file,
                nest_host: None,
                nest_members: Vec::new(),
                inner_classes: Vec::new(),
                enclosing_method: None,
                generic_signature: None,
                annotations: AnnotationSet::default(),
                static_fields,
                instance_fields,
                direct_methods,
                virtual_methods,
            })
        })
        .collect::<Result<Vec<_>, DexError>>()?;

    Ok(ParsedDex { header, classes, tables })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uleb128_round_trips_small_values() {
        let bytes = [0x7f];
        let mut input = &bytes[..];
        assert_eq!(uleb128(&mut input).unwrap(), 0x7f);
    }

    #[test]
    fn uleb128_handles_multi_byte() {
        let bytes = [0x80, 0x01];
        let mut input = &bytes[..];
        assert_eq!(uleb128(&mut input).unwrap(), 0x80);
    }

    #[test]
    fn sleb128_handles_negative_values() {
        let bytes = [0x7f];
        let mut input = &bytes[..];
        assert_eq!(sleb128(&mut input).unwrap(), -1);
    }

    #[test]
    fn garbage_input_is_rejected_as_invalid_header() {
        let pool = ItemPool::new();
        let result = parse(&[0u8; 4], &pool);
        assert!(result.is_err());
    }
}
