//! Binary serialization of compiled modules.
//!
//! Layout: a "types" section listing every type the module's functions
//! reference (dependencies before dependents), then a "consts" section
//! with the constant pool in its original order, so invoke indices stay
//! valid after a round trip. Builtin functions are written by name only
//! and re-linked against the builtin signature table on read.
//!
//! All multi-byte integers are big endian; strings are u16-length-prefixed
//! UTF-8.

use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::builtins;
use crate::bytecode::{BcFunction, BcModule, Constant};
use crate::types::{FunctionType, SimpleType, Type, UnionType};

const TYPES_MARKER: &str = "types";
const CONSTS_MARKER: &str = "consts";

const TAG_SIMPLE: u8 = 1;
const TAG_FUNCTION: u8 = 2;
const TAG_UNION: u8 = 3;

const TAG_NUMBER: u8 = 1;
const TAG_STRING: u8 = 2;
const TAG_FUNC: u8 = 3;
const TAG_INTEGER: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("bad section marker, expected '{0}'")]
    BadMarker(&'static str),
    #[error("unknown record tag {0}")]
    UnknownTag(u8),
    #[error("unknown type '{0}'")]
    UnknownType(String),
    #[error("unknown builtin '{0}'")]
    UnknownBuiltin(String),
    #[error("invalid utf-8 in string")]
    InvalidUtf8,
}

pub fn write_module(module: &BcModule) -> Vec<u8> {
    let mut out = Vec::new();

    write_str(&mut out, TYPES_MARKER);
    let types = collect_types(module);
    out.extend_from_slice(&(types.len() as u16).to_be_bytes());
    for ty in &types {
        write_type(&mut out, ty);
    }

    write_str(&mut out, CONSTS_MARKER);
    out.extend_from_slice(&(module.consts.len() as u16).to_be_bytes());
    for constant in &module.consts {
        write_constant(&mut out, constant);
    }
    out
}

pub fn read_module(bytes: &[u8]) -> Result<BcModule, ReadError> {
    let mut reader = Reader { bytes, pos: 0 };

    if reader.read_str()? != TYPES_MARKER {
        return Err(ReadError::BadMarker(TYPES_MARKER));
    }
    let mut types: FxHashMap<String, Type> = FxHashMap::default();
    let type_count = reader.read_u16()?;
    for _ in 0..type_count {
        let ty = read_type(&mut reader, &types)?;
        types.insert(ty.name().to_string(), ty);
    }

    if reader.read_str()? != CONSTS_MARKER {
        return Err(ReadError::BadMarker(CONSTS_MARKER));
    }
    let const_count = reader.read_u16()?;
    let mut consts = Vec::with_capacity(const_count as usize);
    for _ in 0..const_count {
        consts.push(read_constant(&mut reader, &types)?);
    }
    Ok(BcModule { consts })
}

/// Every type reachable from the module's non-builtin functions, deduped
/// by name, simple types first, then unions, then function types. That
/// ordering guarantees a record only names types that precede it.
fn collect_types(module: &BcModule) -> Vec<Type> {
    let mut seen = FxHashSet::default();
    let mut simples = Vec::new();
    let mut unions = Vec::new();
    let mut functions = Vec::new();

    for constant in &module.consts {
        let Constant::Function(func) = constant else {
            continue;
        };
        if func.is_builtin {
            continue;
        }
        let ty = Type::Function(func.ty.clone());
        visit_type(&ty, &mut seen, &mut simples, &mut unions, &mut functions);
        for (_, ty) in &func.locals {
            visit_type(ty, &mut seen, &mut simples, &mut unions, &mut functions);
        }
    }

    simples.into_iter().chain(unions).chain(functions).collect()
}

fn visit_type(
    ty: &Type,
    seen: &mut FxHashSet<String>,
    simples: &mut Vec<Type>,
    unions: &mut Vec<Type>,
    functions: &mut Vec<Type>,
) {
    if !seen.insert(ty.name().to_string()) {
        return;
    }
    match ty {
        Type::Simple(_) => simples.push(ty.clone()),
        Type::Union(union) => {
            for member in &union.members {
                visit_type(member, seen, simples, unions, functions);
            }
            unions.push(ty.clone());
        }
        Type::Function(func) => {
            visit_type(&func.return_type, seen, simples, unions, functions);
            for param in &func.param_types {
                visit_type(param, seen, simples, unions, functions);
            }
            functions.push(ty.clone());
        }
    }
}

fn write_type(out: &mut Vec<u8>, ty: &Type) {
    match ty {
        Type::Simple(simple) => {
            out.push(TAG_SIMPLE);
            write_str(out, simple.name());
            let supers = simple.direct_supertypes();
            out.push(supers.len() as u8);
            for upper in supers {
                write_str(out, upper.name());
            }
        }
        Type::Function(func) => {
            out.push(TAG_FUNCTION);
            write_str(out, &func.name);
            write_str(out, func.return_type.name());
            out.push(func.param_types.len() as u8);
            for param in &func.param_types {
                write_str(out, param.name());
            }
        }
        Type::Union(union) => {
            out.push(TAG_UNION);
            write_str(out, &union.name);
            out.push(union.members.len() as u8);
            for member in &union.members {
                write_str(out, member.name());
            }
        }
    }
}

fn read_type(reader: &mut Reader<'_>, types: &FxHashMap<String, Type>) -> Result<Type, ReadError> {
    let tag = reader.read_u8()?;
    match tag {
        TAG_SIMPLE => {
            let name = reader.read_str()?;
            let super_count = reader.read_u8()?;
            for _ in 0..super_count {
                reader.read_str()?;
            }
            SimpleType::by_name(&name)
                .map(Type::Simple)
                .ok_or(ReadError::UnknownType(name))
        }
        TAG_FUNCTION => {
            let name = reader.read_str()?;
            let return_name = reader.read_str()?;
            let return_type = resolve(types, &return_name)?;
            let param_count = reader.read_u8()?;
            let mut param_types = Vec::with_capacity(param_count as usize);
            for _ in 0..param_count {
                let param_name = reader.read_str()?;
                param_types.push(resolve(types, &param_name)?);
            }
            let function_name = name.strip_prefix("@function:").unwrap_or(&name);
            Ok(Type::Function(Rc::new(FunctionType::new(
                function_name,
                return_type,
                param_types,
            ))))
        }
        TAG_UNION => {
            let _name = reader.read_str()?;
            let member_count = reader.read_u8()?;
            let mut members = Vec::with_capacity(member_count as usize);
            for _ in 0..member_count {
                let member_name = reader.read_str()?;
                members.push(resolve(types, &member_name)?);
            }
            Ok(Type::Union(Rc::new(UnionType::new(members))))
        }
        other => Err(ReadError::UnknownTag(other)),
    }
}

fn write_constant(out: &mut Vec<u8>, constant: &Constant) {
    match constant {
        Constant::Number(value) => {
            out.push(TAG_NUMBER);
            out.extend_from_slice(&value.to_be_bytes());
        }
        Constant::String(value) => {
            out.push(TAG_STRING);
            write_str(out, value);
        }
        Constant::Integer(value) => {
            out.push(TAG_INTEGER);
            out.extend_from_slice(&value.to_be_bytes());
        }
        Constant::Function(func) => {
            out.push(TAG_FUNC);
            write_str(out, &func.name);
            out.push(func.is_builtin as u8);
            if func.is_builtin {
                return;
            }
            write_str(out, &func.ty.name);
            out.extend_from_slice(&func.op_stack_size.to_be_bytes());
            out.extend_from_slice(&(func.locals.len() as u16).to_be_bytes());
            for (name, ty) in &func.locals {
                write_str(out, name);
                write_str(out, ty.name());
            }
            out.extend_from_slice(&(func.code.len() as u32).to_be_bytes());
            out.extend_from_slice(&func.code);
        }
    }
}

fn read_constant(
    reader: &mut Reader<'_>,
    types: &FxHashMap<String, Type>,
) -> Result<Constant, ReadError> {
    let tag = reader.read_u8()?;
    match tag {
        TAG_NUMBER => Ok(Constant::Number(f64::from_be_bytes(reader.read_array()?))),
        TAG_INTEGER => Ok(Constant::Integer(i64::from_be_bytes(reader.read_array()?))),
        TAG_STRING => Ok(Constant::String(reader.read_str()?)),
        TAG_FUNC => {
            let name = reader.read_str()?;
            let is_builtin = reader.read_u8()? != 0;
            if is_builtin {
                let (_, return_type, param_types) = builtins::signatures()
                    .into_iter()
                    .find(|(n, _, _)| *n == name)
                    .ok_or_else(|| ReadError::UnknownBuiltin(name.clone()))?;
                return Ok(Constant::Function(BcFunction {
                    ty: Rc::new(FunctionType::new(&name, return_type, param_types)),
                    name,
                    locals: Vec::new(),
                    op_stack_size: 0,
                    code: Vec::new(),
                    is_builtin: true,
                }));
            }
            let type_name = reader.read_str()?;
            let ty = match resolve(types, &type_name)? {
                Type::Function(func) => func,
                _ => return Err(ReadError::UnknownType(type_name)),
            };
            let op_stack_size = reader.read_u16()?;
            let local_count = reader.read_u16()?;
            let mut locals = Vec::with_capacity(local_count as usize);
            for _ in 0..local_count {
                let local_name = reader.read_str()?;
                let local_type_name = reader.read_str()?;
                locals.push((local_name, resolve(types, &local_type_name)?));
            }
            let code_len = reader.read_u32()? as usize;
            let code = reader.read_bytes(code_len)?.to_vec();
            Ok(Constant::Function(BcFunction {
                name,
                ty,
                locals,
                op_stack_size,
                code,
                is_builtin: false,
            }))
        }
        other => Err(ReadError::UnknownTag(other)),
    }
}

fn resolve(types: &FxHashMap<String, Type>, name: &str) -> Result<Type, ReadError> {
    if let Some(ty) = types.get(name) {
        return Ok(ty.clone());
    }
    // Simple types may be referenced without their own record.
    SimpleType::by_name(name)
        .map(Type::Simple)
        .ok_or_else(|| ReadError::UnknownType(name.to_string()))
}

fn write_str(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value.as_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ReadError> {
        if self.pos + len > self.bytes.len() {
            return Err(ReadError::UnexpectedEof);
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ReadError> {
        let slice = self.read_bytes(N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(slice);
        Ok(array)
    }

    fn read_u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_u16(&mut self) -> Result<u16, ReadError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    fn read_u32(&mut self) -> Result<u32, ReadError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    fn read_str(&mut self) -> Result<String, ReadError> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ReadError::InvalidUtf8)
    }
}
