use anyhow::{anyhow, Context, Result};
use clap::Parser;
use glam::Mat4;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufWriter, Read},
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

use meshatlas::{
    bake_projection, bake_vertex_colors, Atlas, AtlasImage, ChartOptions, PackOptions, ResultMesh,
    Texture,
};

mod obj;

use obj::{parse_obj, write_obj, ObjMesh};

#[derive(Parser, Debug, Clone)]
#[command(name = "obj2atlas", version)]
struct Args {
    #[arg(long, default_value = "meshes")]
    input_dir: String,

    #[arg(long, default_value = "meshes_atlas")]
    output_dir: String,

    #[arg(long, default_value_t = false)]
    overwrite: bool,

    /// JSON file with `chart` and/or `pack` sections; missing fields keep their defaults.
    #[arg(long)]
    options: Option<String>,

    /// Target atlas width/height in texels (overrides the options file).
    #[arg(long)]
    resolution: Option<u32>,

    /// Texels of padding around each chart (overrides the options file).
    #[arg(long)]
    padding: Option<u32>,

    /// Texels per world unit (overrides the options file).
    #[arg(long)]
    texels_per_unit: Option<f32>,

    /// Write `<stem>_charts.png` with one colour per chart.
    #[arg(long, default_value_t = false)]
    chart_image: bool,

    /// Bake OBJ vertex colours into `<stem>_albedo.png`.
    #[arg(long, default_value_t = false)]
    bake_colors: bool,

    /// Baked texture edge length; defaults to the atlas size.
    #[arg(long)]
    bake_size: Option<u32>,

    /// Texels to grow baked charts by.
    #[arg(long, default_value_t = 2)]
    bake_dilate: u32,

    /// Put every input mesh into one shared atlas.
    #[arg(long, default_value_t = false)]
    batch: bool,

    /// If both `<stem>.obj` and `<stem>.zip` exist, read the zip.
    #[arg(long, default_value_t = false)]
    prefer_zip: bool,

    /// Image to project onto every mesh into `<stem>_projected.png`.
    #[arg(long, requires = "view_proj")]
    project_image: Option<String>,

    /// Column-major view-projection matrix for `--project-image`: 16 comma-separated floats.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    view_proj: Option<Vec<f32>>,
}

/// A camera image and the matrix it was taken with.
struct Projection {
    image: Texture,
    view_proj: Mat4,
}

fn view_proj_matrix(values: &[f32]) -> Result<Mat4> {
    let cols: &[f32; 16] = values
        .try_into()
        .map_err(|_| anyhow!("view-projection matrix needs 16 values, got {}", values.len()))?;
    Ok(Mat4::from_cols_array(cols))
}

fn load_projection(args: &Args) -> Result<Option<Projection>> {
    let (Some(path), Some(values)) = (&args.project_image, &args.view_proj) else {
        return Ok(None);
    };

    let rgba = image::open(path)
        .with_context(|| format!("opening {path}"))?
        .to_rgba8();
    let mut image = Texture::new(rgba.width(), rgba.height());
    image.pixels = rgba.pixels().map(|p| p.0).collect();

    Ok(Some(Projection {
        image,
        view_proj: view_proj_matrix(values)?,
    }))
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct OptionsFile {
    chart: ChartOptions,
    pack: PackOptions,
}

fn load_options(args: &Args) -> Result<(ChartOptions, PackOptions)> {
    let mut file = match &args.options {
        Some(path) => {
            let reader = File::open(path).with_context(|| format!("opening {path}"))?;
            serde_json::from_reader::<_, OptionsFile>(reader)
                .with_context(|| format!("parsing {path}"))?
        }
        None => OptionsFile::default(),
    };

    if let Some(resolution) = args.resolution {
        file.pack.resolution = resolution;
    }
    if let Some(padding) = args.padding {
        file.pack.padding = padding;
    }
    if let Some(tpu) = args.texels_per_unit {
        file.pack.texels_per_unit = tpu;
    }
    file.pack.create_image |= args.chart_image;

    Ok((file.chart, file.pack))
}

/// Mesh files by stem, `.obj` or `.zip` per the `prefer_zip` rule.
fn build_local_index(input_dir: &str, prefer_zip: bool) -> BTreeMap<String, PathBuf> {
    let mut index: BTreeMap<String, PathBuf> = BTreeMap::new();

    for entry in WalkDir::new(input_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();
        if ext != "obj" && ext != "zip" {
            continue;
        }

        let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_owned) else {
            continue;
        };

        index
            .entry(stem)
            .and_modify(|existing| {
                let existing_zip = existing
                    .extension()
                    .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
                if existing_zip != prefer_zip && (ext == "zip") == prefer_zip {
                    *existing = path.clone();
                }
            })
            .or_insert(path);
    }

    index
}

/// Load a plain `.obj`, or the first `.obj` inside a `.zip`.
fn load_mesh(path: &Path) -> Result<ObjMesh> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;

    if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("zip")) {
        debug!("Opening ZIP archive {}", path.display());
        let mut archive = zip::ZipArchive::new(file)?;

        let obj_name = archive
            .file_names()
            .find(|n| n.to_ascii_lowercase().ends_with(".obj"))
            .context("No .obj file found in zip archive")?
            .to_owned();

        let mut bytes = Vec::new();
        archive.by_name(&obj_name)?.read_to_end(&mut bytes)?;
        parse_obj(bytes.as_slice()).with_context(|| format!("parsing {obj_name}"))
    } else {
        parse_obj(file).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Distinct, stable colour for a chart id; 0 (no chart) stays transparent.
fn chart_color(id: u32) -> [u8; 4] {
    if id == 0 {
        return [0, 0, 0, 0];
    }
    let h = id.wrapping_mul(0x9E37_79B9).rotate_left(13);
    let [r, g, b, _] = h.to_le_bytes();
    [r | 0x40, g | 0x40, b | 0x40, 255]
}

fn write_chart_image(image: &AtlasImage, path: &Path) -> Result<()> {
    let bytes: Vec<u8> = image.texels.iter().flat_map(|&t| chart_color(t)).collect();
    let png = image::RgbaImage::from_raw(image.width, image.height, bytes)
        .context("chart image size does not match its texels")?;
    png.save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn save_texture(texture: &Texture, path: &Path) -> Result<()> {
    image::RgbaImage::from_raw(texture.width, texture.height, texture.as_bytes().to_vec())
        .context("baked texture size does not match its pixels")?
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Write `<stem>.obj` and, when requested, the baked textures.
fn write_outputs(
    args: &Args,
    stem: &str,
    source: &ObjMesh,
    mesh: &ResultMesh,
    atlas_size: (u32, u32),
    projection: Option<&Projection>,
) -> Result<()> {
    let out_dir = Path::new(&args.output_dir);

    let obj_path = out_dir.join(format!("{stem}.obj"));
    let file =
        File::create(&obj_path).with_context(|| format!("creating {}", obj_path.display()))?;
    write_obj(BufWriter::new(file), source, mesh)?;
    let (w, h) = args.bake_size.map_or(atlas_size, |s| (s, s));

    if args.bake_colors {
        match &source.colors {
            Some(colors) => {
                let mut texture = bake_vertex_colors(mesh, colors, w, h)?;
                texture.dilate(args.bake_dilate);
                save_texture(&texture, &out_dir.join(format!("{stem}_albedo.png")))?;
            }
            None => warn!("{stem}: no vertex colours to bake"),
        }
    }

    if let Some(projection) = projection {
        let mut texture = Texture::new(w, h);
        bake_projection(
            mesh,
            &source.positions,
            projection.view_proj,
            &projection.image,
            &mut texture,
        )?;
        texture.dilate(args.bake_dilate);
        save_texture(&texture, &out_dir.join(format!("{stem}_projected.png")))?;
    }

    Ok(())
}

#[inline]
fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mesh".to_owned())
}

fn process_one_mesh(
    path: &Path,
    args: &Args,
    chart: &ChartOptions,
    pack: &PackOptions,
    projection: Option<&Projection>,
) -> Result<()> {
    let stem = stem_of(path);
    let out_path = Path::new(&args.output_dir).join(format!("{stem}.obj"));

    if out_path.exists() && !args.overwrite {
        debug!("Skipping existing file: {}", out_path.display());
        return Ok(());
    }

    info!("Processing {} -> {}", path.display(), out_path.display());

    let source = load_mesh(path)?;
    debug!(
        "{}: {} vertices, {} triangles",
        stem,
        source.positions.len(),
        source.indices.len() / 3
    );

    let mut atlas = Atlas::new();
    atlas
        .generate_with(&[source.decl()], Some(chart), Some(pack))
        .with_context(|| format!("generating atlas for {}", path.display()))?;

    if let Some(image) = atlas.image() {
        write_chart_image(image, &Path::new(&args.output_dir).join(format!("{stem}_charts.png")))?;
    }

    write_outputs(
        args,
        &stem,
        &source,
        atlas.mesh_at(0)?,
        (atlas.width(), atlas.height()),
        projection,
    )?;

    info!(
        "{}: {}x{} atlas, {} charts",
        stem,
        atlas.width(),
        atlas.height(),
        atlas.chart_count()
    );
    Ok(())
}

/// All meshes in one `generate` call sharing a single atlas.
fn process_batch(
    paths: &[PathBuf],
    args: &Args,
    chart: &ChartOptions,
    pack: &PackOptions,
    projection: Option<&Projection>,
) -> Result<()> {
    let loaded: Vec<(String, ObjMesh)> = paths
        .par_iter()
        .filter_map(|path| match load_mesh(path) {
            Ok(mesh) => Some((stem_of(path), mesh)),
            Err(err) => {
                warn!("Error loading {}: {:#}", path.display(), err);
                None
            }
        })
        .collect();

    if loaded.is_empty() {
        warn!("No meshes loaded; nothing to do");
        return Ok(());
    }

    let decls: Vec<_> = loaded.iter().map(|(_, mesh)| mesh.decl()).collect();
    let mut atlas = Atlas::new();
    atlas
        .generate_with(&decls, Some(chart), Some(pack))
        .context("generating shared atlas")?;

    info!(
        "Shared atlas {}x{}: {} meshes, {} charts",
        atlas.width(),
        atlas.height(),
        loaded.len(),
        atlas.chart_count()
    );

    if let Some(image) = atlas.image() {
        write_chart_image(image, &Path::new(&args.output_dir).join("atlas_charts.png"))?;
    }

    let atlas_size = (atlas.width(), atlas.height());
    for (index, (stem, source)) in loaded.iter().enumerate() {
        let result = atlas
            .mesh_at(index)
            .map_err(anyhow::Error::from)
            .and_then(|mesh| write_outputs(args, stem, source, mesh, atlas_size, projection));
        if let Err(err) = result {
            warn!("Error writing {}: {:#}", stem, err);
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    fs::create_dir_all(&args.output_dir)?;

    let (chart, pack) = load_options(&args)?;
    chart.validate()?;
    pack.validate()?;
    let projection = load_projection(&args)?;

    let local_index = build_local_index(&args.input_dir, args.prefer_zip);
    let paths: Vec<PathBuf> = local_index.into_values().collect();

    info!("Processing {} meshes...", paths.len());

    if args.batch {
        return process_batch(&paths, &args, &chart, &pack, projection.as_ref());
    }

    paths.par_iter().for_each(|path| {
        if let Err(err) = process_one_mesh(path, &args, &chart, &pack, projection.as_ref()) {
            warn!("Error processing {}: {:#}", path.display(), err);
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_colors() {
        assert_eq!(chart_color(0), [0, 0, 0, 0]);
        assert_eq!(chart_color(1)[3], 255);
        assert_ne!(chart_color(1), chart_color(2));
        assert_eq!(chart_color(7), chart_color(7));
    }

    #[test]
    fn test_flags_override_options_file() {
        let args = Args::parse_from([
            "obj2atlas",
            "--resolution",
            "512",
            "--padding",
            "3",
            "--chart-image",
        ]);
        let (chart, pack) = load_options(&args).unwrap();

        assert_eq!(chart, ChartOptions::default());
        assert_eq!(pack.resolution, 512);
        assert_eq!(pack.padding, 3);
        assert!(pack.create_image);
        assert_eq!(pack.texels_per_unit, 0.0);
    }

    #[test]
    fn test_partial_options_file() {
        let file: OptionsFile =
            serde_json::from_str(r#"{ "pack": { "padding": 2, "brute_force": true } }"#).unwrap();

        assert_eq!(file.chart, ChartOptions::default());
        assert_eq!(file.pack.padding, 2);
        assert!(file.pack.brute_force);
        assert!(file.pack.bilinear);
    }

    #[test]
    fn test_view_proj_flag() {
        let args = Args::parse_from([
            "obj2atlas",
            "--project-image",
            "camera.png",
            "--view-proj",
            "-1,0,0,0,0,1,0,0,0,0,1,0,0.5,0,0,1",
        ]);
        let values = args.view_proj.unwrap();
        let m = view_proj_matrix(&values).unwrap();

        assert_eq!(m.x_axis.x, -1.0);
        // Column-major: the last column is the translation.
        assert_eq!(m.w_axis.x, 0.5);
        assert!(view_proj_matrix(&values[..15]).is_err());
    }

    #[test]
    fn test_project_image_requires_matrix() {
        let parsed = Args::try_parse_from(["obj2atlas", "--project-image", "camera.png"]);
        assert!(parsed.is_err());
    }
}
