//! CPU baking into atlas textures: interpolated per-vertex colours, or
//! colours projected from a camera image.

use glam::{Mat4, Vec3};

use crate::error::{AtlasError, Result};
use crate::raster::{rasterize_triangle, uv_to_texel};
use crate::result::ResultMesh;

const OPAQUE_BLACK: [u8; 4] = [0, 0, 0, 255];

/// An RGBA8 texture, row-major, row 0 at `v = 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[u8; 4]>,
    /// Texels written by the baker (or filled by `dilate`).
    covered: Vec<bool>,
}

impl Texture {
    /// Opaque black, nothing covered.
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            pixels: vec![OPAQUE_BLACK; len],
            covered: vec![false; len],
        }
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn is_covered(&self, x: u32, y: u32) -> bool {
        self.covered[y as usize * self.width as usize + x as usize]
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Grow every chart outwards by `texels`, so bilinear sampling near a
    /// seam does not pick up the background.
    ///
    /// Each pass fills uncovered texels with the mean of their covered
    /// 4-neighbours.
    pub fn dilate(&mut self, texels: u32) {
        let (w, h) = (self.width as usize, self.height as usize);

        for _ in 0..texels {
            let mut next_pixels = self.pixels.clone();
            let mut next_covered = self.covered.clone();
            let mut grew = false;

            for y in 0..h {
                for x in 0..w {
                    let i = y * w + x;
                    if self.covered[i] {
                        continue;
                    }

                    let neighbours = [
                        (x > 0).then(|| i - 1),
                        (x + 1 < w).then(|| i + 1),
                        (y > 0).then(|| i - w),
                        (y + 1 < h).then(|| i + w),
                    ];

                    let mut sum = [0u32; 4];
                    let mut count = 0u32;
                    for n in neighbours.into_iter().flatten().filter(|&n| self.covered[n]) {
                        for (s, c) in sum.iter_mut().zip(self.pixels[n]) {
                            *s += c as u32;
                        }
                        count += 1;
                    }

                    if count > 0 {
                        next_pixels[i] = sum.map(|s| ((s + count / 2) / count) as u8);
                        next_covered[i] = true;
                        grew = true;
                    }
                }
            }

            self.pixels = next_pixels;
            self.covered = next_covered;
            if !grew {
                break;
            }
        }
    }
}

fn check_size(field: &'static str, width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(AtlasError::InvalidOption {
            field,
            value: width.min(height) as f64,
            reason: "must be at least one texel",
        });
    }
    Ok(())
}

#[inline]
fn to_rgba8(c: [f32; 4]) -> [u8; 4] {
    c.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Rasterize `mesh` in UV space, interpolating `colors` (RGBA in 0..=1,
/// indexed by source vertex) across each triangle.
pub fn bake_vertex_colors(
    mesh: &ResultMesh,
    colors: &[[f32; 4]],
    width: u32,
    height: u32,
) -> Result<Texture> {
    check_size("texture size", width, height)?;

    let vertex_colors = mesh.rearrange(colors)?;
    let uvs = mesh.uvs();
    let mut texture = Texture::new(width, height);

    for tri in mesh.indices() {
        let corners = tri.map(|i| uv_to_texel(uvs[i as usize], width, height));
        let [c0, c1, c2] = tri.map(|i| vertex_colors[i as usize]);

        rasterize_triangle(corners, width, height, |x, y, [w0, w1, w2]| {
            let mut rgba = [0.0f32; 4];
            for k in 0..4 {
                rgba[k] = c0[k] * w0 + c1[k] * w1 + c2[k] * w2;
            }

            let i = y as usize * width as usize + x as usize;
            texture.pixels[i] = to_rgba8(rgba);
            texture.covered[i] = true;
        });
    }

    Ok(texture)
}

/// Nearest `image` pixel seen at world point `p`, if it projects inside the
/// image. Depth must land in `0..=1` after the divide, as with glam's
/// `perspective_*` and `orthographic_*` matrices. Image row 0 is the top
/// (NDC `y = 1`).
fn sample_projected(image: &Texture, view_proj: Mat4, p: Vec3) -> Option<[u8; 4]> {
    let clip = view_proj * p.extend(1.0);
    if clip.w.is_nan() || clip.w <= 0.0 {
        return None;
    }

    let ndc = clip.truncate() / clip.w;
    let inside = (-1.0..=1.0).contains(&ndc.x)
        && (-1.0..=1.0).contains(&ndc.y)
        && (0.0..=1.0).contains(&ndc.z);
    if !inside {
        return None;
    }

    let x = ((ndc.x + 1.0) * 0.5 * image.width as f32) as u32;
    let y = ((1.0 - ndc.y) * 0.5 * image.height as f32) as u32;
    Some(image.pixel(x.min(image.width - 1), y.min(image.height - 1)))
}

/// Project `image` onto `mesh` through `view_proj` and write the result into
/// `dest` in atlas UV space.
///
/// `positions` are world positions indexed by source vertex. Each texel of
/// `dest` covered by a generated triangle takes the image pixel its
/// interpolated position projects to; texels that project behind the camera,
/// outside the image or outside the depth range are left as they were, so
/// several views can be baked into the same `dest` in turn.
pub fn bake_projection(
    mesh: &ResultMesh,
    positions: &[[f32; 3]],
    view_proj: Mat4,
    image: &Texture,
    dest: &mut Texture,
) -> Result<()> {
    check_size("image size", image.width, image.height)?;
    check_size("texture size", dest.width, dest.height)?;

    let world = mesh.rearrange(positions)?;
    let uvs = mesh.uvs();
    let (width, height) = (dest.width, dest.height);

    for tri in mesh.indices() {
        let corners = tri.map(|i| uv_to_texel(uvs[i as usize], width, height));
        let [p0, p1, p2] = tri.map(|i| Vec3::from_array(world[i as usize]));

        rasterize_triangle(corners, width, height, |x, y, [w0, w1, w2]| {
            let p = p0 * w0 + p1 * w1 + p2 * w2;
            let Some(rgba) = sample_projected(image, view_proj, p) else {
                return;
            };

            let i = y as usize * width as usize + x as usize;
            dest.pixels[i] = rgba;
            dest.covered[i] = true;
        });
    }

    Ok(())
}
