//! Just enough Wavefront OBJ for atlas input and output.

use anyhow::{bail, Context, Result};
use meshatlas::{MeshDecl, ResultMesh};
use std::io::{BufRead, BufReader, Read, Write};

const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// A triangulated OBJ mesh with attributes indexed by position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjMesh {
    pub positions: Vec<[f32; 3]>,
    /// Per-vertex RGBA from `v x y z r g b [a]` records, when any vertex has one.
    pub colors: Option<Vec<[f32; 4]>>,
    /// Per-vertex normal, when every face corner references one.
    pub normals: Option<Vec<[f32; 3]>>,
    pub indices: Vec<u32>,
}

impl ObjMesh {
    pub fn decl(&self) -> MeshDecl<'_> {
        let decl = MeshDecl::new(&self.positions, &self.indices);
        match &self.normals {
            Some(normals) => decl.with_normals(normals),
            None => decl,
        }
    }
}

/// One `f` corner: position index and optional normal index, both 0-based.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Corner {
    position: u32,
    normal: Option<u32>,
}

/// OBJ indices are 1-based; negative ones count back from the last record.
fn resolve_index(token: &str, count: usize) -> Result<u32> {
    let raw: i64 = token
        .parse()
        .with_context(|| format!("bad index {token:?}"))?;

    let resolved = match raw {
        0 => bail!("index 0 is not valid in OBJ"),
        i if i > 0 => i - 1,
        i => count as i64 + i,
    };

    if resolved < 0 {
        bail!("relative index {raw} reaches before the first record");
    }
    u32::try_from(resolved).with_context(|| format!("index {raw} does not fit in 32 bits"))
}

fn parse_corner(token: &str, positions: usize, normals: usize) -> Result<Corner> {
    let mut parts = token.split('/');

    let position = resolve_index(parts.next().unwrap_or_default(), positions)?;
    let _texcoord = parts.next();
    let normal = match parts.next() {
        Some(n) if !n.is_empty() => Some(resolve_index(n, normals)?),
        _ => None,
    };

    Ok(Corner { position, normal })
}

fn parse_floats<const N: usize>(
    parts: &mut std::str::SplitWhitespace<'_>,
    what: &str,
) -> Result<[f32; N]> {
    let mut out = [0.0f32; N];
    for (k, v) in out.iter_mut().enumerate() {
        *v = parts
            .next()
            .with_context(|| format!("missing {what} component {k}"))?
            .parse()
            .with_context(|| format!("bad {what} component {k}"))?;
    }
    Ok(out)
}

/// Read `v`, `vn` and `f` records; faces with more than three corners are
/// fan-triangulated. Everything else is ignored.
///
/// A `v` record holds 3 or 4 values (xyz, optional w which is dropped), or
/// 6 or 7 (xyz followed by RGB or RGBA).
pub fn parse_obj<R: Read>(reader: R) -> Result<ObjMesh> {
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut colors: Vec<Option<[f32; 4]>> = Vec::new();
    let mut file_normals: Vec<[f32; 3]> = Vec::new();
    let mut corners: Vec<Corner> = Vec::new();

    for (line_no, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let mut parts = line.split_whitespace();
        let at = || format!("line {}", line_no + 1);

        match parts.next() {
            Some("v") => {
                let values = parts
                    .map(|t| t.parse::<f32>().with_context(|| format!("bad vertex value {t:?}")))
                    .collect::<Result<Vec<_>>>()
                    .with_context(at)?;
                let (p, rgba) = match values[..] {
                    [x, y, z] | [x, y, z, _] => ([x, y, z], None),
                    [x, y, z, r, g, b] => ([x, y, z], Some([r, g, b, 1.0])),
                    [x, y, z, r, g, b, a] => ([x, y, z], Some([r, g, b, a])),
                    _ => bail!("{}: vertex has {} values", at(), values.len()),
                };
                positions.push(p);
                colors.push(rgba);
            }
            Some("vn") => {
                file_normals.push(parse_floats::<3>(&mut parts, "normal").with_context(at)?);
            }
            Some("f") => {
                let face = parts
                    .map(|t| parse_corner(t, positions.len(), file_normals.len()))
                    .collect::<Result<Vec<_>>>()
                    .with_context(at)?;
                if face.len() < 3 {
                    bail!("{}: face has {} corners", at(), face.len());
                }
                for k in 1..face.len() - 1 {
                    corners.extend([face[0], face[k], face[k + 1]]);
                }
            }
            _ => {}
        }
    }

    if let Some(c) = corners.iter().find(|c| c.position as usize >= positions.len()) {
        bail!("face references vertex {} of {}", c.position + 1, positions.len());
    }
    if let Some(n) = corners
        .iter()
        .filter_map(|c| c.normal)
        .find(|&n| n as usize >= file_normals.len())
    {
        bail!("face references normal {} of {}", n + 1, file_normals.len());
    }

    // The first normal a position is used with wins.
    let normals = if !corners.is_empty() && corners.iter().all(|c| c.normal.is_some()) {
        let mut per_vertex = vec![[0.0, 0.0, 1.0]; positions.len()];
        let mut seen = vec![false; positions.len()];
        for c in &corners {
            let v = c.position as usize;
            if let (false, Some(n)) = (seen[v], c.normal) {
                per_vertex[v] = file_normals[n as usize];
                seen[v] = true;
            }
        }
        Some(per_vertex)
    } else {
        None
    };

    let colors = colors
        .iter()
        .any(Option::is_some)
        .then(|| colors.iter().map(|c| c.unwrap_or(WHITE)).collect());

    Ok(ObjMesh {
        positions,
        colors,
        normals,
        indices: corners.iter().map(|c| c.position).collect(),
    })
}

/// Write the generated mesh: one `v`/`vt`(/`vn`) per generated vertex and
/// `f` records over them. `vt` is flipped: atlas row 0 is the top of the image.
pub fn write_obj<W: Write>(mut w: W, source: &ObjMesh, mesh: &ResultMesh) -> Result<()> {
    let positions = mesh.rearrange(&source.positions)?;
    let colors = source.colors.as_deref().map(|c| mesh.rearrange(c)).transpose()?;
    let normals = source.normals.as_deref().map(|n| mesh.rearrange(n)).transpose()?;

    for (i, p) in positions.iter().enumerate() {
        match &colors {
            Some(c) => {
                let [r, g, b, _] = c[i];
                writeln!(w, "v {} {} {} {} {} {}", p[0], p[1], p[2], r, g, b)?;
            }
            None => writeln!(w, "v {} {} {}", p[0], p[1], p[2])?,
        }
    }
    for uv in mesh.uvs() {
        writeln!(w, "vt {} {}", uv[0], 1.0 - uv[1])?;
    }
    if let Some(normals) = &normals {
        for n in normals {
            writeln!(w, "vn {} {} {}", n[0], n[1], n[2])?;
        }
    }

    for tri in mesh.indices() {
        let [a, b, c] = tri.map(|i| i + 1);
        if normals.is_some() {
            writeln!(w, "f {a}/{a}/{a} {b}/{b}/{b} {c}/{c}/{c}")?;
        } else {
            writeln!(w, "f {a}/{a} {b}/{b} {c}/{c}")?;
        }
    }

    w.flush()?;
    Ok(())
}
