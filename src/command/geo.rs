use super::{Ctx, keyword, len_reply, parse_count, parse_float};
use crate::error::{ZedisError, ZedisResult};
use crate::resp::{Reply, format_double};
use crate::types::SortedSet;
use crate::types::geo::{self, Shape};
use bytes::Bytes;

fn dist_reply(metres: f64, factor: f64) -> Reply {
    Reply::bulk(format!("{:.4}", metres / factor))
}

fn coord_reply(lon: f64, lat: f64) -> Reply {
    Reply::array(vec![Reply::bulk(format_double(lon)), Reply::bulk(format_double(lat))])
}

/// GEOADD key [NX|XX] [CH] longitude latitude member [...]
pub fn cmd_geoadd(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let (mut nx, mut xx, mut ch) = (false, false, false);
    let mut i = 1;
    while i < args.len() {
        match keyword(&args[i]).as_str() {
            "NX" => nx = true,
            "XX" => xx = true,
            "CH" => ch = true,
            _ => break,
        }
        i += 1;
    }
    if nx && xx {
        return Err(ZedisError::generic("XX and NX options at the same time are not compatible"));
    }
    let triples = &args[i..];
    if triples.is_empty() || triples.len() % 3 != 0 {
        return Err(ZedisError::Syntax);
    }
    let mut points = Vec::with_capacity(triples.len() / 3);
    for t in triples.chunks(3) {
        let (lon, lat) = (parse_float(&t[0])?, parse_float(&t[1])?);
        geo::validate(lon, lat)?;
        points.push((geo::encode(lon, lat) as f64, t[2].clone()));
    }
    if xx && !ctx.db.exists(&args[0])? {
        return Ok(len_reply(0));
    }
    let zset = ctx.db.write::<SortedSet>(&args[0])?;
    let (mut added, mut changed) = (0, 0);
    for (score, member) in points {
        match zset.score(&member) {
            Some(_) if nx => continue,
            None if xx => continue,
            Some(old) => changed += (old != score) as usize,
            None => added += 1,
        }
        zset.insert(member, score);
    }
    Ok(len_reply(if ch { added + changed } else { added }))
}

pub fn cmd_geopos(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let zset = ctx.db.read::<SortedSet>(&args[0])?;
    let positions = args[1..]
        .iter()
        .map(|m| match zset.and_then(|z| geo::position(z, m)) {
            Some((lon, lat)) => coord_reply(lon, lat),
            None => Reply::nil_array(),
        })
        .collect();
    Ok(Reply::array(positions))
}

pub fn cmd_geodist(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let factor = match args.len() {
        3 => 1.0,
        4 => geo::unit_factor(&args[3])?,
        _ => return Err(ZedisError::Syntax),
    };
    let Some(zset) = ctx.db.read::<SortedSet>(&args[0])? else {
        return Ok(Reply::nil());
    };
    match (geo::position(zset, &args[1]), geo::position(zset, &args[2])) {
        (Some((lon1, lat1)), Some((lon2, lat2))) => {
            Ok(dist_reply(geo::distance(lon1, lat1, lon2, lat2), factor))
        }
        _ => Ok(Reply::nil()),
    }
}

pub fn cmd_geohash(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let zset = ctx.db.read::<SortedSet>(&args[0])?;
    let hashes = args[1..]
        .iter()
        .map(|m| {
            let pos = zset.and_then(|z| geo::position(z, m));
            Reply::bulk_or_nil(pos.map(|(lon, lat)| geo::to_geohash_string(lon, lat)))
        })
        .collect();
    Ok(Reply::array(hashes))
}

enum Origin {
    Member(Bytes),
    Point(f64, f64),
}

struct SearchQuery {
    origin: Origin,
    shape: Shape,
    factor: f64,
    descending: bool,
    count: Option<usize>,
    with_coord: bool,
    with_dist: bool,
    with_hash: bool,
}

fn parse_search(args: &[Bytes]) -> ZedisResult<SearchQuery> {
    let arg = |i: usize| args.get(i).ok_or(ZedisError::Syntax);
    let mut origin = None;
    let mut shape = None;
    let mut factor = 1.0;
    let mut query = SearchQuery {
        origin: Origin::Point(0.0, 0.0),
        shape: Shape::Radius(0.0),
        factor: 1.0,
        descending: false,
        count: None,
        with_coord: false,
        with_dist: false,
        with_hash: false,
    };
    let mut i = 0;
    while i < args.len() {
        match keyword(&args[i]).as_str() {
            "FROMMEMBER" if origin.is_none() => {
                origin = Some(Origin::Member(arg(i + 1)?.clone()));
                i += 2;
            }
            "FROMLONLAT" if origin.is_none() => {
                let (lon, lat) = (parse_float(arg(i + 1)?)?, parse_float(arg(i + 2)?)?);
                geo::validate(lon, lat)?;
                origin = Some(Origin::Point(lon, lat));
                i += 3;
            }
            "BYRADIUS" if shape.is_none() => {
                factor = geo::unit_factor(arg(i + 2)?)?;
                shape = Some(Shape::Radius(parse_float(arg(i + 1)?)? * factor));
                i += 3;
            }
            "BYBOX" if shape.is_none() => {
                factor = geo::unit_factor(arg(i + 3)?)?;
                let width = parse_float(arg(i + 1)?)? * factor;
                let height = parse_float(arg(i + 2)?)? * factor;
                shape = Some(Shape::Box { width, height });
                i += 4;
            }
            "ASC" => {
                query.descending = false;
                i += 1;
            }
            "DESC" => {
                query.descending = true;
                i += 1;
            }
            "COUNT" => {
                let n = parse_count(arg(i + 1)?)?;
                if n == 0 {
                    return Err(ZedisError::generic("COUNT must be > 0"));
                }
                query.count = Some(n);
                i += 2;
                if args.get(i).is_some_and(|a| keyword(a) == "ANY") {
                    i += 1;
                }
            }
            "WITHCOORD" => {
                query.with_coord = true;
                i += 1;
            }
            "WITHDIST" => {
                query.with_dist = true;
                i += 1;
            }
            "WITHHASH" => {
                query.with_hash = true;
                i += 1;
            }
            _ => return Err(ZedisError::Syntax),
        }
    }
    query.origin = origin
        .ok_or_else(|| ZedisError::generic("exactly one of FROMMEMBER or FROMLONLAT can be specified for GEOSEARCH"))?;
    query.shape = shape
        .ok_or_else(|| ZedisError::generic("exactly one of BYRADIUS and BYBOX can be specified for GEOSEARCH"))?;
    query.factor = factor;
    Ok(query)
}

/// GEOSEARCH key FROMMEMBER m | FROMLONLAT lon lat BYRADIUS r unit | BYBOX w h unit
/// [ASC|DESC] [COUNT n [ANY]] [WITHCOORD] [WITHDIST] [WITHHASH]
pub fn cmd_geosearch(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let query = parse_search(&args[1..])?;
    let Some(zset) = ctx.db.read::<SortedSet>(&args[0])? else {
        return Ok(Reply::array(Vec::new()));
    };
    let (lon, lat) = match &query.origin {
        Origin::Point(lon, lat) => (*lon, *lat),
        Origin::Member(m) => geo::position(zset, m)
            .ok_or_else(|| ZedisError::generic("could not decode requested zset member"))?,
    };
    let hits = geo::search(zset, lon, lat, query.shape, query.descending, query.count);
    let plain = !(query.with_coord || query.with_dist || query.with_hash);
    let replies = hits
        .into_iter()
        .map(|hit| {
            if plain {
                return Reply::bulk(hit.member);
            }
            let mut item = vec![Reply::bulk(hit.member)];
            if query.with_dist {
                item.push(dist_reply(hit.dist, query.factor));
            }
            if query.with_hash {
                item.push(Reply::integer(hit.hash as i64));
            }
            if query.with_coord {
                item.push(coord_reply(hit.lon, hit.lat));
            }
            Reply::array(item)
        })
        .collect();
    Ok(Reply::array(replies))
}

#[cfg(test)]
mod tests {
    use crate::command::test_support::*;
    use crate::resp::Reply;

    async fn sicily() -> crate::engine::Engine {
        let e = engine();
        let r = call(&e, "GEOADD Sicily 13.361389 38.115556 Palermo 15.087269 37.502669 Catania").await;
        assert_eq!(r, Reply::integer(2));
        e
    }

    #[tokio::test]
    async fn test_geodist_and_geohash() {
        let e = sicily().await;
        let r = call(&e, "GEODIST Sicily Palermo Catania km").await;
        assert!(matches!(r, Reply::Bulk(Some(d)) if d.starts_with(b"166.27")));
        assert_eq!(call(&e, "GEODIST Sicily Palermo Nowhere").await, Reply::nil());
        assert_eq!(call(&e, "GEOHASH Sicily Palermo").await, bulks(&["sqc8b49rny0"]));
        assert!(matches!(call(&e, "GEOPOS Sicily Palermo Nowhere").await,
            Reply::Array(Some(v)) if v.len() == 2 && v[1] == Reply::nil_array()));
        assert_eq!(call(&e, "TYPE Sicily").await, Reply::status("zset"));
    }

    #[tokio::test]
    async fn test_geosearch() {
        let e = sicily().await;
        let r = call(&e, "GEOSEARCH Sicily FROMLONLAT 15 37 BYRADIUS 200 km ASC").await;
        assert_eq!(r, bulks(&["Catania", "Palermo"]));
        let r = call(&e, "GEOSEARCH Sicily FROMMEMBER Palermo BYRADIUS 10 km").await;
        assert_eq!(r, bulks(&["Palermo"]));
        let r = call(&e, "GEOSEARCH Sicily FROMLONLAT 15 37 BYBOX 400 400 km DESC COUNT 1 WITHDIST").await;
        assert!(matches!(r, Reply::Array(Some(v)) if v.len() == 1));
        let r = call(&e, "GEOSEARCH Sicily BYRADIUS 10 km").await;
        assert!(err_starts(&r, "ERR exactly one of FROMMEMBER"));
    }

    #[tokio::test]
    async fn test_geoadd_rejects_bad_coordinates() {
        let e = engine();
        let r = call(&e, "GEOADD g 200 10 x").await;
        assert!(err_starts(&r, "ERR invalid longitude,latitude pair"));
        assert_eq!(call(&e, "EXISTS g").await, Reply::integer(0));
    }
}
