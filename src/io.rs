//! Body file I/O and the rank-0 tree dump.
//!
//! spec.md §6 specifies a plain-text body record (`id`, `D`-dim position,
//! `D`-dim velocity, mass, work) one per line. No crate in the retrieved
//! corpus parses this exact ad hoc scientific format (mirroring how
//! `original_source`'s own `readwrite.h`/`.cpp`, referenced from `main.cpp`
//! but not among the kept files, is itself a bespoke parser rather than a
//! library), so this is hand-written `split_whitespace` parsing with
//! `thiserror`-typed errors, following the teacher's preference for
//! explicit `Result` propagation over panics.

use std::io::Write;
use std::path::Path;

use generational_arena::Index;
use nalgebra::SVector;

use crate::body::Body;
use crate::error::SimError;
use crate::tree::Tree;

/// Parse one body per non-empty, non-`#`-prefixed line:
/// `id pos[0..D] vel[0..D] mass work`.
pub fn read_bodies<const D: usize>(path: &Path) -> Result<Vec<Body<D>>, SimError> {
    let text = std::fs::read_to_string(path)?;
    let expected_fields = 1 + D + D + 1 + 1;
    let mut bodies = Vec::new();

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != expected_fields {
            return Err(SimError::BodyParse {
                line: line_no + 1,
                detail: format!("expected {expected_fields} whitespace-separated fields, got {}", fields.len()),
            });
        }

        let parse_f64 = |s: &str| -> Result<f64, SimError> {
            s.parse().map_err(|_| SimError::BodyParse {
                line: line_no + 1,
                detail: format!("not a number: `{s}`"),
            })
        };

        let id: u64 = fields[0].parse().map_err(|_| SimError::BodyParse {
            line: line_no + 1,
            detail: format!("not an id: `{}`", fields[0]),
        })?;

        let mut pos = [0.0; D];
        for (c, slot) in pos.iter_mut().enumerate() {
            *slot = parse_f64(fields[1 + c])?;
        }
        let mut vel = [0.0; D];
        for (c, slot) in vel.iter_mut().enumerate() {
            *slot = parse_f64(fields[1 + D + c])?;
        }
        let mass = parse_f64(fields[1 + 2 * D])?;
        let work = parse_f64(fields[2 + 2 * D])?;

        let mut b = Body::new(
            id,
            SVector::from_fn(|c, _| pos[c]),
            SVector::from_fn(|c, _| vel[c]),
            mass,
        );
        b.work = work;
        bodies.push(b);
    }

    Ok(bodies)
}

/// Write `bodies` followed by `out_of_range` (tagged with their sentinel
/// mass already set by the caller), same schema as [`read_bodies`].
pub fn write_bodies<const D: usize>(
    path: &Path,
    bodies: &[Body<D>],
    out_of_range: &[Body<D>],
) -> Result<(), SimError> {
    let mut out = std::fs::File::create(path)?;
    for b in bodies.iter().chain(out_of_range.iter()) {
        write_body_line(&mut out, b)?;
    }
    Ok(())
}

fn write_body_line<const D: usize>(out: &mut impl Write, b: &Body<D>) -> Result<(), SimError> {
    write!(out, "{}", b.id)?;
    for c in 0..D {
        write!(out, " {}", b.pos[c])?;
    }
    for c in 0..D {
        write!(out, " {}", b.vel[c])?;
    }
    writeln!(out, " {} {}", b.mass, b.work)?;
    Ok(())
}

/// Human-readable snapshot of the local tree, one line per cell:
/// `depth box_lo box_hi mass com`. Rank-0-only by convention of the caller.
pub fn dump_tree<const D: usize>(path: &Path, tree: &Tree<D>) -> Result<(), SimError> {
    let mut out = std::fs::File::create(path)?;
    dump_rec(&mut out, tree, tree.root, 0)?;
    Ok(())
}

fn dump_rec<const D: usize>(out: &mut impl Write, tree: &Tree<D>, idx: Index, depth: usize) -> Result<(), SimError> {
    let cell = &tree.arena[idx];
    write!(out, "{depth}")?;
    for c in 0..D {
        write!(out, " {}", cell.box_.lo[c])?;
    }
    for c in 0..D {
        write!(out, " {}", cell.box_.hi[c])?;
    }
    write!(out, " {}", cell.mass)?;
    for c in 0..D {
        write!(out, " {}", cell.com[c])?;
    }
    writeln!(out)?;

    if let Some(children) = &cell.children {
        for child in children.iter().flatten() {
            dump_rec(out, tree, *child, depth + 1)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::BhConfig;
    use crate::geometry::BBox;
    use nalgebra::SVector;
    use tempfile::NamedTempFile;

    #[test]
    fn round_trips_body_records() {
        let bodies = vec![
            Body::new(0, SVector::from([1.0, 2.0, 3.0]), SVector::from([0.1, 0.2, 0.3]), 5.0),
            Body::new(1, SVector::from([-1.0, 0.0, 1.0]), SVector::from([0.0; 3]), 2.0),
        ];
        let file = NamedTempFile::new().unwrap();
        write_bodies::<3>(file.path(), &bodies, &[]).unwrap();
        let read_back = read_bodies::<3>(file.path()).unwrap();

        assert_eq!(read_back.len(), 2);
        for (a, b) in bodies.iter().zip(&read_back) {
            assert_eq!(a.id, b.id);
            assert!((a.mass - b.mass).abs() < 1e-12);
        }
    }

    #[test]
    fn malformed_line_is_a_body_parse_error() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "0 1.0 2.0\n").unwrap();
        assert!(matches!(read_bodies::<3>(file.path()), Err(SimError::BodyParse { .. })));
    }

    #[test]
    fn tree_dump_writes_one_line_per_cell() {
        let mut tree = Tree::new(BBox::new(SVector::from([0.0; 3]), SVector::from([4.0; 3])), BhConfig::default());
        tree.insert_body(Body::new(0, SVector::from([1.0, 1.0, 1.0]), SVector::zeros(), 1.0)).unwrap();
        tree.insert_body(Body::new(1, SVector::from([3.0, 3.0, 3.0]), SVector::zeros(), 1.0)).unwrap();

        let file = NamedTempFile::new().unwrap();
        dump_tree(file.path(), &tree).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.lines().count() >= 3);
    }
}
