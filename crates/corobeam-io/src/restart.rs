//! Displacement restart files.
//!
//! One line per node: `node ux uy uz rx ry rz` followed by the nine entries
//! of the nodal orientation matrix, row by row. Node numbers are 1-based like
//! in the mesh and case files. Records without the orientation block are
//! accepted; the reader then has to rebuild the orientation from the rotation
//! pseudo-vector. Values are written with the shortest representation that
//! parses back to the same `f64`, so a write/read cycle reproduces the nodal
//! state bit for bit.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::{IoError, ParseError, Result, read_text};

const DISPLACEMENT_FIELDS: usize = 6;
const ORIENTATION_FIELDS: usize = 9;

/// Cumulative displacement and orientation of one node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestartRecord {
    /// 0-based node index (written 1-based)
    pub node: usize,
    /// Translations followed by the accumulated rotation pseudo-vector
    pub displacement: [f64; 6],
    /// Nodal orientation matrix, row-major
    pub orientation: Option<[[f64; 3]; 3]>,
}

impl RestartRecord {
    pub fn new(node: usize, displacement: [f64; 6], orientation: [[f64; 3]; 3]) -> Self {
        Self {
            node,
            displacement,
            orientation: Some(orientation),
        }
    }

    /// Record in the short format without an orientation block
    pub fn displacement_only(node: usize, displacement: [f64; 6]) -> Self {
        Self {
            node,
            displacement,
            orientation: None,
        }
    }
}

/// Render records in the restart text format
pub fn format_restart(records: &[RestartRecord]) -> String {
    let mut out = String::new();
    for record in records {
        let _ = write!(out, "{}", record.node + 1);
        for value in record.displacement {
            let _ = write!(out, " {value}");
        }
        if let Some(orientation) = record.orientation {
            for value in orientation.iter().flatten() {
                let _ = write!(out, " {value}");
            }
        }
        out.push('\n');
    }
    out
}

/// Parse the restart text format
pub fn parse_restart(raw: &str) -> std::result::Result<Vec<RestartRecord>, ParseError> {
    let mut records = Vec::new();
    for (i, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        let short = 1 + DISPLACEMENT_FIELDS;
        let full = short + ORIENTATION_FIELDS;
        if fields.len() != short && fields.len() != full {
            return Err(ParseError::new(
                i + 1,
                format!(
                    "expected {short} or {full} fields (node, 6 displacements, optional 9 orientation entries), found {}",
                    fields.len()
                ),
            ));
        }
        let node = fields[0]
            .parse::<usize>()
            .map_err(|e| ParseError::new(i + 1, format!("invalid node number '{}': {e}", fields[0])))?;
        if node == 0 {
            return Err(ParseError::new(i + 1, "node numbers start at 1"));
        }
        let values = fields[1..]
            .iter()
            .map(|field| {
                field
                    .parse::<f64>()
                    .map_err(|e| ParseError::new(i + 1, format!("invalid value '{field}': {e}")))
            })
            .collect::<std::result::Result<Vec<f64>, ParseError>>()?;

        let mut displacement = [0.0; DISPLACEMENT_FIELDS];
        displacement.copy_from_slice(&values[..DISPLACEMENT_FIELDS]);
        let orientation = (values.len() == DISPLACEMENT_FIELDS + ORIENTATION_FIELDS).then(|| {
            let mut rows = [[0.0; 3]; 3];
            for (k, value) in values[DISPLACEMENT_FIELDS..].iter().enumerate() {
                rows[k / 3][k % 3] = *value;
            }
            rows
        });
        records.push(RestartRecord {
            node: node - 1,
            displacement,
            orientation,
        });
    }
    Ok(records)
}

pub fn write_restart(path: impl AsRef<Path>, records: &[RestartRecord]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format_restart(records))?;
    Ok(())
}

pub fn read_restart(path: impl AsRef<Path>) -> Result<Vec<RestartRecord>> {
    let path = path.as_ref();
    let raw = read_text(path)?;
    parse_restart(&raw).map_err(|source| IoError::Parse {
        file: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    #[test]
    fn restart_roundtrip_preserves_bits() {
        let dir = tempfile::tempdir().expect("create temp directory");
        let path = dir.path().join("nested").join("restart.dat");
        let (s, c) = 0.3_f64.sin_cos();
        let records = vec![
            RestartRecord::new(0, [0.0; 6], IDENTITY),
            RestartRecord::new(
                1,
                [0.1, -2.3e-7, 1.0 / 3.0, f64::MIN_POSITIVE, -0.0, 9.87654321e12],
                [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]],
            ),
        ];

        write_restart(&path, &records).expect("save should succeed");
        let loaded = read_restart(&path).expect("load should succeed");
        assert_eq!(loaded.len(), 2);
        for (a, b) in loaded.iter().zip(&records) {
            assert_eq!(a.node, b.node);
            for k in 0..6 {
                assert_eq!(a.displacement[k].to_bits(), b.displacement[k].to_bits());
            }
            let (ra, rb) = (a.orientation.expect("orientation"), b.orientation.expect("orientation"));
            for (x, y) in ra.iter().flatten().zip(rb.iter().flatten()) {
                assert_eq!(x.to_bits(), y.to_bits());
            }
        }
    }

    #[test]
    fn node_numbers_are_one_based() {
        let text = format_restart(&[RestartRecord::new(0, [0.5, 0.0, 0.0, 0.0, 0.0, 0.0], IDENTITY)]);
        assert!(text.starts_with("1 0.5 0 0 0 0 0 1 0 0 0 1 0 0 0 1"));

        let records = parse_restart("% header\n3 0 0 0.25 0 0 0\n").expect("short record");
        assert_eq!(records, vec![RestartRecord::displacement_only(2, [0.0, 0.0, 0.25, 0.0, 0.0, 0.0])]);

        let err = parse_restart("0 0 0 0 0 0 0\n").expect_err("node 0 should fail");
        assert_eq!(err.line, 1);
    }

    #[test]
    fn read_restart_fails_for_missing_file() {
        let dir = tempfile::tempdir().expect("create temp directory");
        let err = read_restart(dir.path().join("missing.dat")).expect_err("missing file should fail");
        assert!(matches!(err, IoError::FileNotFound(_)));
    }

    #[test]
    fn parse_reports_line_of_bad_record() {
        let raw = "1 0 0 0 0 0 0\n\n2 0.5 0 0 0 0\n";
        let err = parse_restart(raw).expect_err("short record should fail");
        assert_eq!(err.line, 3);

        let raw = "1 0 0 x 0 0 0\n";
        assert!(parse_restart(raw).is_err());

        // a partial orientation block
        let raw = "1 0 0 0 0 0 0 1 0 0\n";
        assert!(parse_restart(raw).is_err());
    }
}
