use crate::leiden::Graph;
use crate::{Error, ErrorKind};
use std::collections::HashMap;
use std::fs;

/**
Reads a graph from the NCOL format used by LGL/igraph: one `label1 label2
[weight]` triple per line, with vertex labels assigned dense ids in order of
first appearance. Blank lines and lines starting with `#` are skipped.

# Examples

```ignore
use graphleiden::readwrite::ncol::read_ncol_file;
let graph = read_ncol_file("/some/file.ncol", false)?;
```
*/
pub fn read_ncol_file(file: &str, directed: bool) -> Result<(Graph, Vec<String>), Error> {
    let string = fs::read_to_string(file).map_err(|e| {
        Error::new(
            ErrorKind::InvalidFileFormat,
            format!("could not read {}: {}", file, e),
        )
    })?;
    read_ncol_string(&string, directed)
}

/// Returns the graph together with the vertex labels, indexed by the dense
/// id assigned to each: `labels[v]` is the original NCOL label of vertex `v`.
pub fn read_ncol_string(string: &str, directed: bool) -> Result<(Graph, Vec<String>), Error> {
    let mut index_of: HashMap<String, usize> = HashMap::new();
    let mut labels: Vec<String> = Vec::new();
    let mut edges: Vec<(usize, usize, f64)> = Vec::new();

    for line in string.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let src = parts
            .next()
            .ok_or_else(|| invalid(line, "missing source label"))?;
        let dst = parts
            .next()
            .ok_or_else(|| invalid(line, "missing destination label"))?;
        let w: f64 = match parts.next() {
            Some(raw) => raw.parse().map_err(|_| invalid(line, "non-numeric weight"))?,
            None => 1.0,
        };
        let u = *index_of.entry(src.to_string()).or_insert_with(|| {
            labels.push(src.to_string());
            labels.len() - 1
        });
        let v = *index_of.entry(dst.to_string()).or_insert_with(|| {
            labels.push(dst.to_string());
            labels.len() - 1
        });
        edges.push((u, v, w));
    }

    let graph = Graph::new(labels.len(), directed, edges, None, None)?;
    Ok((graph, labels))
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
    fn assigns_dense_ids_in_order_of_appearance() {
        let input = "alice bob 2.0\nbob carol 1.0\n";
        let (g, labels) = read_ncol_string(input, false).unwrap();
        assert_eq!(g.vcount(), 3);
        assert_eq!(g.ecount(), 2);
        assert_eq!(labels, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn defaults_weight_to_one() {
        let input = "a b\n";
        let (g, _) = read_ncol_string(input, false).unwrap();
        assert_eq!(g.edge_weight(0), 1.0);
    }

    #[test]
    fn rejects_a_line_missing_a_destination() {
        let err = read_ncol_string("a\n", false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidFileFormat);
    }
}
