//! Beam property reader.
//!
//! ```text
//! NPROP= 2
//! 1.0e-3 2.0e-7 3.0e-7 4.0e-7
//! BOX 0.4 0.2
//! ```
//!
//! Explicit rows give `A Iyy Izz J`; `BOX width height` rows describe a
//! thin-walled box whose wall thickness is a model input.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoError, ParseError, Result, read_text};
use crate::mesh::{Lines, header, parse_count, parse_f64};

/// One cross-section record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SectionRecord {
    Explicit {
        area: f64,
        iyy: f64,
        izz: f64,
        torsion_constant: f64,
    },
    Box {
        width: f64,
        height: f64,
    },
}

pub fn parse_properties(raw: &str) -> std::result::Result<Vec<SectionRecord>, ParseError> {
    let mut lines = Lines::new(raw);
    let mut sections = Vec::new();

    while let Some((n, line)) = lines.next_line() {
        let Some((key, value)) = header(line) else {
            return Err(ParseError::new(n, format!("expected 'NPROP= count', found '{line}'")));
        };
        if key != "NPROP" {
            return Err(ParseError::new(n, format!("unknown block '{key}'")));
        }
        let count = parse_count(n, &key, value)?;
        for _ in 0..count {
            let (n, fields) = lines.row("NPROP")?;
            let record = match fields.as_slice() {
                [tag, w, h] if tag.eq_ignore_ascii_case("BOX") => SectionRecord::Box {
                    width: parse_f64(n, w)?,
                    height: parse_f64(n, h)?,
                },
                [a, iyy, izz, j] => SectionRecord::Explicit {
                    area: parse_f64(n, a)?,
                    iyy: parse_f64(n, iyy)?,
                    izz: parse_f64(n, izz)?,
                    torsion_constant: parse_f64(n, j)?,
                },
                _ => {
                    return Err(ParseError::new(
                        n,
                        "property row must be 'A Iyy Izz J' or 'BOX width height'",
                    ));
                }
            };
            sections.push(record);
        }
    }

    Ok(sections)
}

pub fn read_properties(path: impl AsRef<Path>) -> Result<Vec<SectionRecord>> {
    let path = path.as_ref();
    let raw = read_text(path)?;
    parse_properties(&raw).map_err(|source| IoError::Parse {
        file: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explicit_and_box_rows() {
        let raw = "% sections\nNPROP= 2\n1.0e-3 2.0e-7 3.0e-7 4.0e-7\nbox 0.4 0.2\n";
        let sections = parse_properties(raw).unwrap();
        assert_eq!(
            sections[0],
            SectionRecord::Explicit {
                area: 1.0e-3,
                iyy: 2.0e-7,
                izz: 3.0e-7,
                torsion_constant: 4.0e-7
            }
        );
        assert_eq!(
            sections[1],
            SectionRecord::Box {
                width: 0.4,
                height: 0.2
            }
        );
    }

    #[test]
    fn rejects_malformed_rows() {
        assert!(parse_properties("NPROP= 1\n1.0 2.0\n").is_err());
        assert!(parse_properties("NPROP= 1\nBOX 0.4\n").is_err());
        assert!(parse_properties("NPOIN= 1\n").is_err());
    }
}
