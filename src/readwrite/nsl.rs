use crate::leiden::Graph;
use crate::{Error, ErrorKind};
use std::fs;

/**
Reads a graph from the NSL-E/NSA ("network specified as a list of links")
format: an optional header comment line

```text
# Nodes: <n>[,] Edges|Arcs: <m>[,] [Weighted: 0|1]
```

(`Edges` marks the file as undirected, `Arcs` as directed — overriding
`directed_hint` when present), followed by edge records `u v [w]`,
whitespace-separated, with any other `#`-prefixed line treated as an
ignorable comment. Node ids are non-negative integers that need not be
dense or start at zero; a vertex is assigned the internal id equal to its
rank among all ids seen so far, in ascending order, mirroring the original
loader's `getNode` bijection (`nodes[]` stays sorted, new ids are inserted
in place rather than merely appended).

# Examples

```ignore
use graphleiden::readwrite::nsl::read_nsl_e_file;
let graph = read_nsl_e_file("/some/file.nse", false)?;
```
*/
pub fn read_nsl_e_file(file: &str, directed_hint: bool) -> Result<Graph, Error> {
    let string = fs::read_to_string(file).map_err(|e| {
        Error::new(
            ErrorKind::InvalidFileFormat,
            format!("could not read {}: {}", file, e),
        )
    })?;
    read_nsl_string(&string, directed_hint)
}

/// Reads an NSA file; identical format to NSL-E, only the conventional file
/// extension (and therefore the default directedness, absent a header)
/// differs.
pub fn read_nsa_file(file: &str, directed_hint: bool) -> Result<Graph, Error> {
    read_nsl_e_file(file, directed_hint)
}

/// Bijection from external (possibly sparse, non-zero-based) node ids to
/// internal `[0,n)` ids, preserving ascending order of first appearance,
/// exactly as `main.cpp`'s `getNode` builds it: each newly seen external id
/// is inserted into a sorted list at the position that keeps it sorted, so
/// the internal id of every *previously seen* id stays valid even as later,
/// smaller external ids are discovered.
#[derive(Default)]
struct NodeBijection {
    external_ids: Vec<u64>,
}

impl NodeBijection {
    fn get_or_insert(&mut self, eid: u64) -> usize {
        match self.external_ids.binary_search(&eid) {
            Ok(pos) => pos,
            Err(pos) => {
                self.external_ids.insert(pos, eid);
                pos
            }
        }
    }
}

struct Header {
    n: Option<usize>,
    m: Option<usize>,
    directed: Option<bool>,
    weighted: Option<bool>,
}

/// Parses the optional `# Nodes: n[,] Edges|Arcs: m[,] [Weighted: 0|1]`
/// header line. Returns `None` fields for anything the line does not
/// mention, so the caller can fall back to inference from the body.
fn parse_header(line: &str) -> Option<Header> {
    let rest = line.strip_prefix('#')?;
    let normalised = rest.replace(':', " ").replace(',', " ");
    let mut tokens = normalised.split_whitespace().map(str::to_lowercase);

    if tokens.next().as_deref() != Some("nodes") {
        return None;
    }
    let n: usize = tokens.next()?.parse().ok()?;

    let mut header = Header {
        n: Some(n),
        m: None,
        directed: None,
        weighted: None,
    };

    let kind = match tokens.next() {
        Some(k) => k,
        None => return Some(header),
    };
    header.directed = match kind.as_str() {
        "arcs" => Some(true),
        "edges" => Some(false),
        _ => return Some(header),
    };
    let m: usize = match tokens.next().and_then(|t| t.parse().ok()) {
        Some(m) => m,
        None => return Some(header),
    };
    header.m = Some(m);

    if tokens.next().as_deref() == Some("weighted") {
        if let Some(flag) = tokens.next() {
            header.weighted = match flag.as_str() {
                "0" => Some(false),
                "1" => Some(true),
                _ => None,
            };
        }
    }
    Some(header)
}

/// Core NSL-E/NSA reader shared by both file-extension entry points: the
/// two formats differ only in the recommended file extension, not in the
/// record syntax, so there is exactly one parser.
pub fn read_nsl_string(string: &str, directed_hint: bool) -> Result<Graph, Error> {
    let mut lines = string.lines();
    let mut header: Option<Header> = None;
    let mut first_body_line: Option<&str> = None;

    for line in lines.by_ref() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('#') {
            if header.is_none() {
                header = parse_header(trimmed);
            }
            continue;
        }
        first_body_line = Some(trimmed);
        break;
    }

    let directed = header
        .as_ref()
        .and_then(|h| h.directed)
        .unwrap_or(directed_hint);
    let expected_n = header.as_ref().and_then(|h| h.n);
    let expected_m = header.as_ref().and_then(|h| h.m);
    let weighted_hint = header.as_ref().and_then(|h| h.weighted);

    let mut bijection = NodeBijection::default();
    let mut edges: Vec<(usize, usize, f64)> = Vec::new();

    let body_lines = first_body_line
        .into_iter()
        .chain(lines.map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')));

    for line in body_lines {
        let mut parts = line.split_whitespace();
        let src = parse_external_id(parts.next(), line, "source")?;
        let dst = parse_external_id(parts.next(), line, "destination")?;
        let w: f64 = match parts.next() {
            Some(raw) => raw
                .parse()
                .map_err(|_| invalid(line, "non-numeric edge weight"))?,
            None => {
                if weighted_hint == Some(true) {
                    return Err(invalid(line, "edge weight is missing but the header declared the file weighted"));
                }
                1.0
            }
        };
        let u = bijection.get_or_insert(src);
        let v = bijection.get_or_insert(dst);
        edges.push((u, v, w));
    }

    let n = bijection.external_ids.len();
    if let Some(expected) = expected_n {
        if expected != n {
            return Err(Error::new(
                ErrorKind::InvalidFileFormat,
                format!("header declared {} nodes but {} distinct node ids were read", expected, n),
            ));
        }
    }
    if let Some(expected) = expected_m {
        if expected != edges.len() {
            return Err(Error::new(
                ErrorKind::InvalidFileFormat,
                format!("header declared {} edges but {} edge records were read", expected, edges.len()),
            ));
        }
    }

    Graph::new(n, directed, edges, None, None)
}

fn parse_external_id(raw: Option<&str>, line: &str, which: &str) -> Result<u64, Error> {
    let raw =
        raw.ok_or_else(|| invalid(line, &format!("{} node id is missing from this edge record", which)))?;
    raw.parse()
        .map_err(|_| invalid(line, "non-numeric node id"))
}

fn invalid(line: &str, reason: &str) -> Error {
    Error::new(
        ErrorKind::InvalidFileFormat,
        format!("{} (line: {:?})", reason, line),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_a_plain_edge_list_without_a_header() {
        let input = "0 1 1.0\n1 2 2.0\n2 3 1.0\n";
        let g = read_nsl_string(input, false).unwrap();
        assert_eq!(g.vcount(), 4);
        assert_eq!(g.ecount(), 3);
    }

    #[test]
    fn header_edges_forces_undirected_regardless_of_hint() {
        let input = "# Nodes: 3, Edges: 2\n0 1\n1 2\n";
        let g = read_nsl_string(input, true).unwrap();
        assert!(!g.is_directed());
        assert_eq!(g.vcount(), 3);
    }

    #[test]
    fn header_arcs_forces_directed() {
        let input = "# Nodes: 3, Arcs: 2\n0 1\n1 2\n";
        let g = read_nsl_string(input, false).unwrap();
        assert!(g.is_directed());
    }

    #[test]
    fn header_weighted_flag_is_honoured() {
        let input = "# Nodes: 2 Arcs: 1 Weighted: 1\n0 1 3.5\n";
        let g = read_nsl_string(input, false).unwrap();
        assert_eq!(g.edge_weight(0), 3.5);
    }

    #[test]
    fn header_weighted_without_a_weight_column_is_rejected() {
        let input = "# Nodes: 2 Arcs: 1 Weighted: 1\n0 1\n";
        let err = read_nsl_string(input, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidFileFormat);
    }

    #[test]
    fn sparse_non_zero_based_ids_are_remapped_preserving_ascending_order() {
        // External ids 10, 20, 5: 5 must sort before 10 and 20 even though
        // it is read last, matching `getNode`'s sorted-insertion bijection.
        let input = "10 20\n20 5\n";
        let g = read_nsl_string(input, false).unwrap();
        assert_eq!(g.vcount(), 3);
        assert_eq!(g.ecount(), 2);
    }

    #[test]
    fn header_node_count_mismatch_is_rejected() {
        let input = "# Nodes: 5, Edges: 1\n0 1\n";
        let err = read_nsl_string(input, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidFileFormat);
    }

    #[test]
    fn rejects_a_line_missing_a_destination() {
        let err = read_nsl_string("0\n", false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidFileFormat);
    }

    #[test]
    fn round_trip_is_identical_up_to_the_edge_records_order() {
        use crate::leiden::Mode;
        // Same sparse node ids, same edges, listed in a different order: the
        // sorted-insertion bijection assigns internal ids by ascending
        // external id regardless of discovery order, so the two loads must
        // agree vertex-for-vertex, not merely in aggregate counts.
        let a = "10 20 1.0\n20 5 2.0\n5 10 3.0\n";
        let b = "5 10 3.0\n10 20 1.0\n20 5 2.0\n";
        let ga = read_nsl_string(a, false).unwrap();
        let gb = read_nsl_string(b, false).unwrap();
        assert_eq!(ga.vcount(), gb.vcount());
        assert_eq!(ga.ecount(), gb.ecount());
        for v in 0..ga.vcount() {
            assert_eq!(ga.strength(v, Mode::All), gb.strength(v, Mode::All));
            assert_eq!(
                ga.neighbors(v, Mode::All).len(),
                gb.neighbors(v, Mode::All).len()
            );
        }
    }
}
