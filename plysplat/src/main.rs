use clap::{Parser, ValueEnum};
use glam::{EulerRot, Quat, Vec3};
use log::info;
use plysplat_lib::{
    load_file, render, spawn_load, BoundingBox, Camera, CropBox, Dataset, Framebuffer, LoadStage,
    ObjectTransform, ParseOptions, RenderMode, RenderParams, RenderState, UnknownTypePolicy,
};
use std::error::Error;
use std::io::Write;
use std::process;
use std::time::Instant;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Original,
    Colormap,
    Splat,
}

impl From<Mode> for RenderMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Original => RenderMode::Original,
            Mode::Colormap => RenderMode::Colormap,
            Mode::Splat => RenderMode::Splat,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "PLY Splat Renderer",
    version = "1.0",
    author = "Denis Avvakumov",
    about = "Renders point clouds and Gaussian splats from PLY files into PNG images"
)]
struct Cli {
    #[arg(
        short = 'i',
        long = "input",
        value_name = "INPUT",
        required = true,
        help = "Path to the input .ply (or zstd-compressed .ply) file."
    )]
    input: String,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "OUTPUT",
        required = true,
        help = "Path to the output PNG image."
    )]
    output: String,

    #[arg(long = "width", value_name = "PIXELS", default_value = "1280", help = "Image width.")]
    width: u32,

    #[arg(long = "height", value_name = "PIXELS", default_value = "720", help = "Image height.")]
    height: u32,

    #[arg(
        short = 'm',
        long = "mode",
        value_enum,
        default_value = "original",
        help = "Render mode. Splat falls back to original when the file has no scales/rotations."
    )]
    mode: Mode,

    #[arg(long = "opacity", default_value = "1.0", help = "Global opacity multiplier in [0, 1].")]
    opacity: f32,

    #[arg(
        long = "point-size",
        value_name = "SIZE",
        help = "World-space point diameter. Defaults to 0.2% of the bounding box diagonal."
    )]
    point_size: Option<f32>,

    #[arg(long = "splat-scale", default_value = "1.0", help = "Footprint scale for splat mode.")]
    splat_scale: f32,

    #[arg(
        long = "crop-min",
        value_name = "X,Y,Z",
        value_delimiter = ',',
        num_args = 3,
        allow_negative_numbers = true,
        requires = "crop_max",
        help = "Lower corner of the crop box (enables cropping)."
    )]
    crop_min: Option<Vec<f32>>,

    #[arg(
        long = "crop-max",
        value_name = "X,Y,Z",
        value_delimiter = ',',
        num_args = 3,
        allow_negative_numbers = true,
        requires = "crop_min",
        help = "Upper corner of the crop box (enables cropping)."
    )]
    crop_max: Option<Vec<f32>>,

    #[arg(long = "fov", default_value = "60", help = "Vertical field of view in degrees.")]
    fov: f32,

    #[arg(long = "yaw", default_value = "0", allow_negative_numbers = true, help = "Orbit yaw in degrees.")]
    yaw: f32,

    #[arg(long = "pitch", default_value = "15", allow_negative_numbers = true, help = "Orbit pitch in degrees.")]
    pitch: f32,

    #[arg(
        long = "distance",
        default_value = "1.0",
        help = "Camera distance as a multiple of the framing distance."
    )]
    distance: f32,

    #[arg(
        long = "translate",
        value_name = "X,Y,Z",
        value_delimiter = ',',
        num_args = 3,
        allow_negative_numbers = true,
        default_value = "0,0,0",
        help = "Object translation."
    )]
    translate: Vec<f32>,

    #[arg(
        long = "rotate",
        value_name = "X,Y,Z",
        value_delimiter = ',',
        num_args = 3,
        allow_negative_numbers = true,
        default_value = "0,0,0",
        help = "Object rotation as XYZ Euler angles in degrees."
    )]
    rotate: Vec<f32>,

    #[arg(long = "scale", default_value = "1.0", help = "Uniform object scale.")]
    scale: f32,

    #[arg(
        long = "background",
        value_name = "R,G,B",
        value_delimiter = ',',
        num_args = 3,
        default_value = "0,0,0",
        help = "Background color, components in [0, 1]."
    )]
    background: Vec<f32>,

    #[arg(
        short = 'a',
        long = "async",
        default_value = "false",
        help = "Load the file on the async loader with progress output."
    )]
    async_mode: bool,

    #[arg(
        long = "lenient-types",
        default_value = "false",
        help = "Treat unknown property types as 4-byte fields instead of failing."
    )]
    lenient_types: bool,
}

fn vec3(values: &[f32]) -> Vec3 {
    Vec3::new(values[0], values[1], values[2])
}

fn array3(values: &[f32]) -> [f32; 3] {
    [values[0], values[1], values[2]]
}

fn load_async(cli: &Cli, options: ParseOptions) -> Result<Dataset, Box<dyn Error + Send + Sync>> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let dataset = rt.block_on(async {
        let handle = spawn_load(&cli.input, options);
        let mut last = None;
        handle
            .finish_with(|stage, fraction| {
                let percent = (fraction * 100.0) as u32;
                if last != Some((stage, percent)) {
                    last = Some((stage, percent));
                    let label = match stage {
                        LoadStage::Read => "Reading",
                        LoadStage::Decode => "Decoding",
                    };
                    print!("\r{}: {:>3}%", label, percent);
                    let _ = std::io::stdout().flush();
                }
            })
            .await
    })?;
    println!();
    Ok(dataset)
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let options = ParseOptions {
        unknown_types: if cli.lenient_types {
            UnknownTypePolicy::AssumeFourBytes
        } else {
            UnknownTypePolicy::Reject
        },
        ..ParseOptions::default()
    };

    let mode = if cli.async_mode {
        "Asynchronous"
    } else {
        "Synchronous"
    };
    println!(
        "Mode: {} load | Input: {} | Output: {} | {}x{} {:?}",
        mode, cli.input, cli.output, cli.width, cli.height, cli.mode
    );

    let start = Instant::now();
    let loaded = if cli.async_mode {
        load_async(&cli, options)
    } else {
        load_file(&cli.input, &options).map_err(|e| Box::new(e) as Box<dyn Error + Send + Sync>)
    };
    let dataset = loaded.unwrap_or_else(|e| {
        eprintln!("Error loading '{}': {}", cli.input, e);
        process::exit(1);
    });
    println!(
        "Load Time: {} ms | Points: {} | Splat attributes: {}",
        start.elapsed().as_millis(),
        dataset.point_count(),
        if dataset.splats().is_some() { "yes" } else { "no" }
    );

    let [rx, ry, rz] = array3(&cli.rotate).map(f32::to_radians);
    let transform = ObjectTransform {
        translation: vec3(&cli.translate),
        rotation: Quat::from_euler(EulerRot::XYZ, rx, ry, rz),
        scale: cli.scale,
    };

    let bounds = dataset.bounding_box();
    let extent = Vec3::from_array(bounds.extent());
    let diagonal = if extent.is_finite() { extent.length() } else { 1.0 };
    let center = transform.apply(Vec3::from_array(bounds.center()));
    let radius = 0.5 * diagonal * cli.scale;

    let crop = match (&cli.crop_min, &cli.crop_max) {
        (Some(min), Some(max)) => CropBox {
            bounds: BoundingBox::new(array3(min), array3(max)),
            enabled: true,
        },
        _ => CropBox::disabled(),
    };

    let params = RenderParams {
        point_size: cli.point_size.unwrap_or(diagonal * 0.002),
        opacity: cli.opacity,
        splat_scale: cli.splat_scale,
        crop,
        mode: cli.mode.into(),
        transform,
        background: array3(&cli.background),
    };

    let camera = Camera::framing(
        center,
        radius,
        cli.yaw.to_radians(),
        cli.pitch.to_radians(),
        cli.distance,
        cli.fov.to_radians(),
        cli.width,
        cli.height,
    );

    let start = Instant::now();
    let state = RenderState::new(&dataset, &params, &camera);
    if state.mode() != params.mode {
        info!(
            "Requested {:?} rendering, drawing {:?} instead",
            params.mode,
            state.mode()
        );
    }
    let mut fb = Framebuffer::new(cli.width, cli.height);
    render(&state, &mut fb);
    println!("Render Time: {} ms", start.elapsed().as_millis());

    image::save_buffer(
        &cli.output,
        &fb.to_rgba8(),
        cli.width,
        cli.height,
        image::ColorType::Rgba8,
    )
    .unwrap_or_else(|e| {
        eprintln!("Error writing output '{}': {}", cli.output, e);
        process::exit(1);
    });
    println!("Successfully wrote to '{}'.", cli.output);

    Ok(())
}
