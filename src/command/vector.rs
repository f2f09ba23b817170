use super::{Ctx, bool_reply, len_reply, parse_count, parse_float};
use crate::error::ZedisResult;
use crate::resp::{Reply, format_double};
use crate::types::VectorIndex;
use bytes::Bytes;

fn components(args: &[Bytes]) -> ZedisResult<Vec<f32>> {
    args.iter().map(|a| parse_float(a).map(|f| f as f32)).collect()
}

/// VADD key id f1 [f2 ...]
pub fn cmd_vadd(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let vector = components(&args[2..])?;
    let index = ctx.db.write::<VectorIndex>(&args[0])?;
    Ok(bool_reply(index.add(args[1].clone(), vector)?))
}

/// VSEARCH key f1 [f2 ...] k. Replies id, score pairs, most similar first.
pub fn cmd_vsearch(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let (k, query) = match args[1..].split_last() {
        Some((k, query)) => (parse_count(k)?, components(query)?),
        None => return Err(super::wrong_args("vsearch")),
    };
    let Some(index) = ctx.db.read::<VectorIndex>(&args[0])? else {
        return Ok(Reply::array(Vec::new()));
    };
    let mut out = Vec::new();
    for (id, score) in index.search(&query, k)? {
        out.push(Reply::bulk(id));
        out.push(Reply::bulk(format_double(score as f64)));
    }
    Ok(Reply::array(out))
}

pub fn cmd_vrem(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let removed = match ctx.db.write_existing::<VectorIndex>(&args[0])? {
        Some(index) => index.remove(&args[1]),
        None => false,
    };
    Ok(bool_reply(removed))
}

pub fn cmd_vcard(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(len_reply(ctx.db.read::<VectorIndex>(&args[0])?.map_or(0, VectorIndex::len)))
}

pub fn cmd_vdim(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(len_reply(ctx.db.read::<VectorIndex>(&args[0])?.map_or(0, VectorIndex::dim)))
}
