use super::{Ctx, bool_reply, bulk_array, parse_count};
use crate::error::ZedisResult;
use crate::resp::Reply;
use crate::types::Graph;
use bytes::Bytes;

/// GRAPH.ADD key from to. Adds a directed edge.
pub fn cmd_graph_add(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let graph = ctx.db.write::<Graph>(&args[0])?;
    Ok(bool_reply(graph.add_edge(args[1].clone(), args[2].clone())))
}

pub fn cmd_graph_del(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let removed = match ctx.db.write_existing::<Graph>(&args[0])? {
        Some(graph) => graph.remove_edge(&args[1], &args[2]),
        None => false,
    };
    Ok(bool_reply(removed))
}

pub fn cmd_graph_neighbors(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let neighbors = ctx.db.read::<Graph>(&args[0])?.map(|g| g.neighbors(&args[1])).unwrap_or_default();
    Ok(bulk_array(neighbors))
}

/// GRAPH.BFS key start depth. The start node is always the first entry.
pub fn cmd_graph_bfs(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let depth = parse_count(&args[2])?;
    let order = match ctx.db.read::<Graph>(&args[0])? {
        Some(graph) => graph.bfs(&args[1], depth),
        None => vec![args[1].clone()],
    };
    Ok(bulk_array(order))
}
