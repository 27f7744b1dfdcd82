//! Beam mesh reader.
//!
//! The mesh file is organized in counted blocks introduced by `KEY= count`
//! headers; `%` starts a comment line:
//!
//! ```text
//! % cantilever
//! NDIM= 3
//! NPOIN= 3
//! 0.0 0.0 0.0
//! 0.5 0.0 0.0
//! 1.0 0.0 0.0
//! NELEM= 2
//! 1 2 1  0.0 1.0 0.0
//! 2 3 1  0.0 1.0 0.0
//! NCONSTR= 1
//! 1 123456
//! NRBE2= 0
//! ```
//!
//! Element rows are `node_a node_b property aux_x aux_y aux_z`; constraint
//! rows list a node and the constrained DOF digits; RBE2 rows are
//! `master slave [dofs]` with all six DOFs coupled when the digits are
//! omitted. Node and property numbers are 1-based in the file and 0-based
//! in [`MeshData`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoError, ParseError, Result, read_text};

/// Two-node beam element as read from the mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshElement {
    pub nodes: [usize; 2],
    pub property: usize,
    /// Orientation vector in the local x-y plane
    pub aux: [f64; 3],
}

/// Clamped DOFs of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshConstraint {
    pub node: usize,
    /// 1-based DOF numbers
    pub dofs: Vec<usize>,
}

/// RBE2 rigid link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshRigidLink {
    pub master: usize,
    pub slave: usize,
    /// 1-based coupled DOF numbers
    pub dofs: Vec<usize>,
}

/// Content of a mesh file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub dimension: usize,
    pub nodes: Vec<[f64; 3]>,
    pub elements: Vec<MeshElement>,
    pub constraints: Vec<MeshConstraint>,
    pub rigid_links: Vec<MeshRigidLink>,
}

/// Line iterator that skips blank and comment lines and tracks line numbers
pub(crate) struct Lines<'a> {
    inner: std::iter::Enumerate<std::str::Lines<'a>>,
    last: usize,
}

impl<'a> Lines<'a> {
    pub(crate) fn new(raw: &'a str) -> Self {
        Self {
            inner: raw.lines().enumerate(),
            last: 0,
        }
    }

    /// Next significant line with its 1-based number
    pub(crate) fn next_line(&mut self) -> Option<(usize, &'a str)> {
        for (i, line) in self.inner.by_ref() {
            let trimmed = line.trim();
            self.last = i + 1;
            if trimmed.is_empty() || trimmed.starts_with('%') {
                continue;
            }
            return Some((i + 1, trimmed));
        }
        None
    }

    /// Next row of a counted block
    pub(crate) fn row(&mut self, block: &str) -> std::result::Result<(usize, Vec<&'a str>), ParseError> {
        match self.next_line() {
            Some((n, line)) => Ok((n, line.split_whitespace().collect())),
            None => Err(ParseError::new(self.last, format!("unexpected end of file inside {block} block"))),
        }
    }
}

/// Split a `KEY= value` header
pub(crate) fn header(line: &str) -> Option<(String, &str)> {
    let (key, value) = line.split_once('=')?;
    Some((key.trim().to_ascii_uppercase(), value.trim()))
}

pub(crate) fn parse_count(line: usize, key: &str, value: &str) -> std::result::Result<usize, ParseError> {
    value
        .parse::<usize>()
        .map_err(|e| ParseError::new(line, format!("invalid {key} count '{value}': {e}")))
}

pub(crate) fn parse_f64(line: usize, field: &str) -> std::result::Result<f64, ParseError> {
    field
        .parse::<f64>()
        .map_err(|e| ParseError::new(line, format!("invalid number '{field}': {e}")))
}

/// Parse a 1-based index and convert it to 0-based
fn parse_index(line: usize, field: &str) -> std::result::Result<usize, ParseError> {
    match field.parse::<usize>() {
        Ok(0) => Err(ParseError::new(line, "indices are 1-based, found 0")),
        Ok(v) => Ok(v - 1),
        Err(e) => Err(ParseError::new(line, format!("invalid index '{field}': {e}"))),
    }
}

/// Parse DOF digits such as `123456` or `45`
fn parse_dof_digits(line: usize, field: &str) -> std::result::Result<Vec<usize>, ParseError> {
    let mut dofs = Vec::with_capacity(field.len());
    for c in field.chars() {
        match c.to_digit(10) {
            Some(d @ 1..=6) => {
                let d = d as usize;
                if !dofs.contains(&d) {
                    dofs.push(d);
                }
            }
            _ => return Err(ParseError::new(line, format!("invalid DOF digit '{c}' in '{field}'"))),
        }
    }
    dofs.sort_unstable();
    Ok(dofs)
}

fn expect_fields(line: usize, fields: &[&str], min: usize, what: &str) -> std::result::Result<(), ParseError> {
    if fields.len() < min {
        return Err(ParseError::new(
            line,
            format!("{what} row needs at least {min} fields, found {}", fields.len()),
        ));
    }
    Ok(())
}

impl MeshData {
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = read_text(path)?;
        Self::parse_str(&raw).map_err(|source| IoError::Parse {
            file: path.display().to_string(),
            source,
        })
    }

    pub fn parse_str(raw: &str) -> std::result::Result<Self, ParseError> {
        let mut mesh = MeshData {
            dimension: 3,
            ..Default::default()
        };
        let mut lines = Lines::new(raw);

        while let Some((n, line)) = lines.next_line() {
            let Some((key, value)) = header(line) else {
                return Err(ParseError::new(n, format!("expected a 'KEY= value' header, found '{line}'")));
            };
            match key.as_str() {
                "NDIM" => {
                    let dim = parse_count(n, &key, value)?;
                    if dim != 2 && dim != 3 {
                        return Err(ParseError::new(n, format!("NDIM must be 2 or 3, found {dim}")));
                    }
                    mesh.dimension = dim;
                }
                "NPOIN" => {
                    let count = parse_count(n, &key, value)?;
                    for _ in 0..count {
                        let (n, fields) = lines.row("NPOIN")?;
                        expect_fields(n, &fields, mesh.dimension, "node")?;
                        let mut x = [0.0; 3];
                        for (slot, field) in x.iter_mut().zip(&fields[..mesh.dimension]) {
                            *slot = parse_f64(n, field)?;
                        }
                        mesh.nodes.push(x);
                    }
                }
                "NELEM" => {
                    let count = parse_count(n, &key, value)?;
                    for _ in 0..count {
                        let (n, fields) = lines.row("NELEM")?;
                        expect_fields(n, &fields, 6, "element")?;
                        mesh.elements.push(MeshElement {
                            nodes: [parse_index(n, fields[0])?, parse_index(n, fields[1])?],
                            property: parse_index(n, fields[2])?,
                            aux: [
                                parse_f64(n, fields[3])?,
                                parse_f64(n, fields[4])?,
                                parse_f64(n, fields[5])?,
                            ],
                        });
                    }
                }
                "NCONSTR" => {
                    let count = parse_count(n, &key, value)?;
                    for _ in 0..count {
                        let (n, fields) = lines.row("NCONSTR")?;
                        expect_fields(n, &fields, 2, "constraint")?;
                        mesh.constraints.push(MeshConstraint {
                            node: parse_index(n, fields[0])?,
                            dofs: parse_dof_digits(n, fields[1])?,
                        });
                    }
                }
                "NRBE2" => {
                    let count = parse_count(n, &key, value)?;
                    for _ in 0..count {
                        let (n, fields) = lines.row("NRBE2")?;
                        expect_fields(n, &fields, 2, "RBE2")?;
                        let dofs = match fields.get(2) {
                            Some(digits) => parse_dof_digits(n, digits)?,
                            None => (1..=6).collect(),
                        };
                        mesh.rigid_links.push(MeshRigidLink {
                            master: parse_index(n, fields[0])?,
                            slave: parse_index(n, fields[1])?,
                            dofs,
                        });
                    }
                }
                other => {
                    return Err(ParseError::new(n, format!("unknown block '{other}'")));
                }
            }
        }

        Ok(mesh)
    }
}
