use super::{Ctx, bool_reply, keyword, len_reply, parse_int};
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use crate::types::bitmap::{
    FieldOp, FieldType, Overflow, RangeUnit, count_bits, first_bit, get_bit, parse_bit_offset,
    parse_field_offset, run_bitfield, set_bit,
};
use crate::types::{StrValue, Value};
use bytes::Bytes;

pub fn cmd_setbit(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let offset = parse_bit_offset(&args[1])?;
    let on = match args[2].as_ref() {
        b"1" => true,
        b"0" => false,
        _ => return Err(ZedisError::generic("bit is not an integer or out of range")),
    };
    let s = ctx.db.write::<StrValue>(&args[0])?;
    Ok(bool_reply(set_bit(s.bytes_mut(), offset, on)))
}

pub fn cmd_getbit(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let offset = parse_bit_offset(&args[1])?;
    let bit = ctx.db.read::<StrValue>(&args[0])?.is_some_and(|s| get_bit(&s.as_bytes(), offset));
    Ok(bool_reply(bit))
}

fn parse_unit(arg: Option<&Bytes>) -> ZedisResult<RangeUnit> {
    match arg.map(|a| keyword(a)) {
        None => Ok(RangeUnit::Byte),
        Some(u) if u == "BYTE" => Ok(RangeUnit::Byte),
        Some(u) if u == "BIT" => Ok(RangeUnit::Bit),
        Some(_) => Err(ZedisError::Syntax),
    }
}

/// BITCOUNT key [start end [BYTE | BIT]]
pub fn cmd_bitcount(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let range = match args.len() {
        1 => None,
        3 | 4 => Some((parse_int(&args[1])?, parse_int(&args[2])?, parse_unit(args.get(3))?)),
        _ => return Err(ZedisError::Syntax),
    };
    let count = ctx.db.read::<StrValue>(&args[0])?.map_or(0, |s| count_bits(&s.as_bytes(), range));
    Ok(Reply::integer(count as i64))
}

/// BITPOS key bit [start [end]]
pub fn cmd_bitpos(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let bit = match args[1].as_ref() {
        b"1" => true,
        b"0" => false,
        _ => return Err(ZedisError::generic("The bit argument must be 1 or 0.")),
    };
    if args.len() > 4 {
        return Err(ZedisError::Syntax);
    }
    let start = args.get(2).map(|a| parse_int(a)).transpose()?;
    let end = args.get(3).map(|a| parse_int(a)).transpose()?;
    let pos = match ctx.db.read::<StrValue>(&args[0])? {
        Some(s) => first_bit(&s.as_bytes(), bit, start, end),
        None => {
            if bit {
                -1
            } else {
                0
            }
        }
    };
    Ok(Reply::integer(pos))
}

/// BITOP AND|OR|XOR|NOT destkey key [key ...]
pub fn cmd_bitop(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let op = keyword(&args[0]);
    if !matches!(op.as_str(), "AND" | "OR" | "XOR" | "NOT") {
        return Err(ZedisError::Syntax);
    }
    let sources = &args[2..];
    if op == "NOT" && sources.len() != 1 {
        return Err(ZedisError::generic("BITOP NOT must be called with a single source key."));
    }
    let mut inputs = Vec::with_capacity(sources.len());
    for key in sources {
        inputs.push(ctx.db.read::<StrValue>(key)?.map(|s| s.as_bytes().into_owned()).unwrap_or_default());
    }
    let len = inputs.iter().map(Vec::len).max().unwrap_or(0);
    let byte = |input: &Vec<u8>, i: usize| input.get(i).copied().unwrap_or(0);
    let result: Vec<u8> = (0..len)
        .map(|i| match op.as_str() {
            "NOT" => !byte(&inputs[0], i),
            "AND" => inputs.iter().fold(0xff, |acc, input| acc & byte(input, i)),
            "OR" => inputs.iter().fold(0, |acc, input| acc | byte(input, i)),
            _ => inputs.iter().fold(0, |acc, input| acc ^ byte(input, i)),
        })
        .collect();
    if result.is_empty() {
        ctx.db.delete(&args[1])?;
    } else {
        ctx.db.set(args[1].clone(), Value::Str(StrValue::new(&result)), None)?;
    }
    Ok(len_reply(len))
}

fn parse_bitfield(args: &[Bytes]) -> ZedisResult<Vec<FieldOp>> {
    let mut ops = Vec::new();
    let mut i = 0;
    let arg = |i: usize| args.get(i).ok_or(ZedisError::Syntax);
    while i < args.len() {
        match keyword(&args[i]).as_str() {
            "GET" => {
                let ty = FieldType::parse(arg(i + 1)?)?;
                let offset = parse_field_offset(arg(i + 2)?, ty)?;
                ops.push(FieldOp::Get { ty, offset });
                i += 3;
            }
            "SET" => {
                let ty = FieldType::parse(arg(i + 1)?)?;
                let offset = parse_field_offset(arg(i + 2)?, ty)?;
                let value = parse_int(arg(i + 3)?)?;
                ops.push(FieldOp::Set { ty, offset, value });
                i += 4;
            }
            "INCRBY" => {
                let ty = FieldType::parse(arg(i + 1)?)?;
                let offset = parse_field_offset(arg(i + 2)?, ty)?;
                let delta = parse_int(arg(i + 3)?)?;
                ops.push(FieldOp::IncrBy { ty, offset, delta });
                i += 4;
            }
            "OVERFLOW" => {
                ops.push(FieldOp::Overflow(Overflow::parse(arg(i + 1)?)?));
                i += 2;
            }
            _ => return Err(ZedisError::Syntax),
        }
    }
    Ok(ops)
}

/// BITFIELD key [GET type offset] [SET type offset value] [INCRBY type offset
/// increment] [OVERFLOW WRAP|SAT|FAIL] ...
///
/// Every sub-command is parsed before the value is touched.
pub fn cmd_bitfield(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let ops = parse_bitfield(&args[1..])?;
    let key = &args[0];
    let results = if ops.iter().any(FieldOp::is_write) {
        let existed = ctx.db.exists(key)?;
        let s = ctx.db.write::<StrValue>(key)?;
        let results = run_bitfield(s.bytes_mut(), &ops);
        if !existed && s.len() == 0 {
            ctx.db.delete(key)?;
        }
        results
    } else {
        let mut bytes = ctx.db.read::<StrValue>(key)?.map(|s| s.as_bytes().into_owned()).unwrap_or_default();
        run_bitfield(&mut bytes, &ops)
    };
    Ok(Reply::array(
        results.into_iter().map(|r| r.map_or_else(Reply::nil, Reply::integer)).collect(),
    ))
}
