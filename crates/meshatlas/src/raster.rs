//! Triangle rasterization in texel space, shared by the chart image and the
//! vertex-colour baker.

#[inline]
fn clamp_i(v: i32, lo: i32, hi: i32) -> i32 {
    v.max(lo).min(hi)
}

#[inline]
fn edge(a: [f32; 2], b: [f32; 2], px: f32, py: f32) -> f32 {
    (b[0] - a[0]) * (py - a[1]) - (b[1] - a[1]) * (px - a[0])
}

/// Normalized UV to continuous texel coordinates (no clamping).
#[inline]
pub fn uv_to_texel(uv: [f32; 2], width: u32, height: u32) -> [f32; 2] {
    [uv[0] * width as f32, uv[1] * height as f32]
}

/// Visit every texel whose centre lies inside the triangle `tri` (texel
/// coordinates), passing the barycentric weights of the centre.
///
/// Either winding is accepted. Degenerate triangles cover nothing.
pub fn rasterize_triangle<F>(tri: [[f32; 2]; 3], width: u32, height: u32, mut shade: F)
where
    F: FnMut(u32, u32, [f32; 3]),
{
    if width == 0 || height == 0 {
        return;
    }

    let [a, b, c] = tri;
    let area = edge(a, b, c[0], c[1]);
    if area.abs() <= f32::EPSILON {
        return;
    }
    let inv_area = area.recip();

    // ------- Bounding box, clamped to the raster ----------------------------
    let xmin = clamp_i(a[0].min(b[0]).min(c[0]).floor() as i32, 0, width as i32 - 1);
    let xmax = clamp_i(a[0].max(b[0]).max(c[0]).ceil() as i32, 0, width as i32 - 1);
    let ymin = clamp_i(a[1].min(b[1]).min(c[1]).floor() as i32, 0, height as i32 - 1);
    let ymax = clamp_i(a[1].max(b[1]).max(c[1]).ceil() as i32, 0, height as i32 - 1);

    // ------- Test each texel centre against the three edges -----------------
    for y in ymin..=ymax {
        let py = y as f32 + 0.5;

        for x in xmin..=xmax {
            let px = x as f32 + 0.5;

            let w0 = edge(b, c, px, py) * inv_area;
            let w1 = edge(c, a, px, py) * inv_area;
            let w2 = edge(a, b, px, py) * inv_area;

            if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                shade(x as u32, y as u32, [w0, w1, w2]);
            }
        }
    }
}
