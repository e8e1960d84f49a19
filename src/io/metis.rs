//! Reader for the METIS text adjacency format.
//!
//! Header line: `n m [fmt]`, where the last two digits of `fmt` flag vertex
//! and edge weights (`00`, `01`, `10`, `11`; vertex sizes are not
//! supported). One line per vertex follows, listing 1-based neighbor IDs,
//! each preceded by an edge weight when flagged. `%` starts a comment line.
//!
//! Every rank scans the whole file and keeps its balanced share of the
//! vertex range; this favors simplicity over I/O scalability, which is fine
//! for the graph sizes a text format is used for anyway.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use crate::comm::Communicator;
use crate::error::{DistPartError, Result};
use crate::graph::{DistributedGraph, GraphBuilder};
use crate::types::{EdgeWeight, GlobalNodeId, NodeWeight};

struct Format {
    node_weights: bool,
    edge_weights: bool,
}

fn parse_error(line: usize, what: impl Into<String>) -> DistPartError {
    DistPartError::Parse {
        line,
        what: what.into(),
    }
}

fn parse_header(line: &str, line_no: usize) -> Result<(u64, u64, Format)> {
    let mut fields = line.split_whitespace();
    let n: u64 = fields
        .next()
        .ok_or_else(|| parse_error(line_no, "missing vertex count"))?
        .parse()
        .map_err(|_| parse_error(line_no, "invalid vertex count"))?;
    let m: u64 = fields
        .next()
        .ok_or_else(|| parse_error(line_no, "missing edge count"))?
        .parse()
        .map_err(|_| parse_error(line_no, "invalid edge count"))?;
    let fmt = match fields.next() {
        None => Format {
            node_weights: false,
            edge_weights: false,
        },
        Some(code) => {
            let code: u32 = code
                .parse()
                .map_err(|_| parse_error(line_no, "invalid fmt code"))?;
            if code / 100 != 0 {
                return Err(parse_error(line_no, "vertex sizes are not supported"));
            }
            Format {
                node_weights: (code / 10) % 10 != 0,
                edge_weights: code % 10 != 0,
            }
        }
    };
    if fields.next().is_some() {
        return Err(parse_error(line_no, "trailing fields in header"));
    }
    Ok((n, m, fmt))
}

fn parse_row(
    line: &str,
    line_no: usize,
    fmt: &Format,
    n: u64,
) -> Result<(NodeWeight, Vec<(GlobalNodeId, EdgeWeight)>)> {
    let mut fields = line.split_whitespace();

    let weight: NodeWeight = if fmt.node_weights {
        fields
            .next()
            .ok_or_else(|| parse_error(line_no, "missing vertex weight"))?
            .parse()
            .map_err(|_| parse_error(line_no, "invalid vertex weight"))?
    } else {
        1
    };

    let mut neighbors = Vec::new();
    while let Some(field) = fields.next() {
        let v: u64 = field
            .parse()
            .map_err(|_| parse_error(line_no, "invalid neighbor ID"))?;
        if v == 0 || v > n {
            return Err(parse_error(line_no, format!("neighbor {v} out of range")));
        }
        let w: EdgeWeight = if fmt.edge_weights {
            fields
                .next()
                .ok_or_else(|| parse_error(line_no, "missing edge weight"))?
                .parse()
                .map_err(|_| parse_error(line_no, "invalid edge weight"))?
        } else {
            1
        };
        neighbors.push((v - 1, w));
    }

    Ok((weight, neighbors))
}

/// Read this rank's balanced vertex share of a METIS file and assemble the
/// distributed graph. Collective across all ranks of `comm`.
pub fn read_metis<C: Communicator>(
    path: impl AsRef<Path>,
    comm: Arc<C>,
) -> Result<DistributedGraph<C>> {
    let size = comm.size() as u64;
    let rank = comm.rank() as u64;

    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines().enumerate().filter_map(|(i, line)| {
        match line {
            Err(e) => Some(Err(DistPartError::Io(e))),
            Ok(text) => {
                let trimmed = text.trim().to_string();
                (!trimmed.starts_with('%')).then_some(Ok((i + 1, trimmed)))
            }
        }
    });

    let (header_line_no, header) = lines
        .next()
        .ok_or_else(|| parse_error(1, "empty file"))??;
    let (n, _m, fmt) = parse_header(&header, header_line_no)?;

    // Balanced vertex split.
    let node_dist: Vec<u64> = (0..=size).map(|r| r * n / size).collect();
    let lo = node_dist[rank as usize];
    let hi = node_dist[rank as usize + 1];

    let mut builder = GraphBuilder::new(node_dist.clone(), None, comm);
    let mut vertex = 0u64;
    for item in lines {
        let (line_no, text) = item?;
        if vertex >= n {
            if text.is_empty() {
                continue;
            }
            return Err(parse_error(line_no, "more vertex lines than declared"));
        }
        if lo <= vertex && vertex < hi {
            let (weight, neighbors) = parse_row(&text, line_no, &fmt, n)?;
            if fmt.node_weights || fmt.edge_weights {
                builder.add_weighted_node(weight, &neighbors);
            } else {
                let plain: Vec<GlobalNodeId> = neighbors.iter().map(|&(v, _)| v).collect();
                builder.add_node(&plain);
            }
        }
        vertex += 1;
    }
    if vertex < n {
        return Err(parse_error(0, "fewer vertex lines than declared"));
    }

    builder.build()
}
