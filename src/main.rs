use argh::FromArgs;
use image::{Rgb, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;

use flocking::{Flock, FlockConfig, SpawnSettings, Sphere, SphereField};

const WIDTH: u32 = 1080;
const HEIGHT: u32 = 1080;
const OBSTACLE_GREY: Rgb<u8> = Rgb([70, 70, 70]);

#[derive(FromArgs)]
/// Simulate a flock and render each tick as a PNG frame.
struct Args {
    /// number of agents in the flock
    #[argh(option, default = "200")]
    count: usize,
    /// number of simulation frames to render
    #[argh(option, default = "1200")]
    frames: usize,
    /// fixed timestep per frame, in seconds
    #[argh(option, default = "0.02")]
    dt: f32,
    /// RNG seed; omit for a different flock every run
    #[argh(option)]
    seed: Option<u64>,
    /// path to a JSON behaviour config; omit for defaults
    #[argh(option)]
    config: Option<String>,
    /// directory the PNG frames are written to
    #[argh(option, default = "String::from(\"./frames\")")]
    out_dir: String,
}

fn main() {
    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path).expect("failed to read config file");
            serde_json::from_str::<FlockConfig>(&raw).expect("failed to parse config file")
        }
        None => FlockConfig::default(),
    };
    if let Err(error) = config.validate() {
        eprintln!("invalid config: {error}");
        std::process::exit(2);
    }

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    };

    let bounds = config.bounds_radius;
    let settings = SpawnSettings {
        count: args.count,
        centre: Point3::origin(),
        extents: Vector3::new(bounds * 0.5, bounds * 0.2, bounds * 0.5),
    };
    let obstacles = demo_obstacles(bounds);
    let mut flock = Flock::spawn(config, settings, &mut rng);

    std::fs::create_dir_all(&args.out_dir).expect("failed to create output directory");

    let pbar = ProgressBar::new(args.frames as u64);
    pbar.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}/{eta_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}",
        )
        .unwrap(),
    );

    for frame in 0..args.frames {
        flock.step(args.dt, &obstacles);
        let img = render_frame(&flock, &obstacles, bounds);
        img.save(format!("{}/frame_{:0>8}.png", args.out_dir, frame))
            .unwrap();
        pbar.inc(1);
    }
    pbar.finish();
}

// A few spheres scattered inside the bounds for the flock to flow around.
fn demo_obstacles(bounds: f32) -> SphereField {
    SphereField::new(vec![
        Sphere {
            centre: Point3::new(bounds * 0.4, 0.0, 0.0),
            radius: bounds * 0.15,
        },
        Sphere {
            centre: Point3::new(-bounds * 0.3, 0.0, bounds * 0.35),
            radius: bounds * 0.1,
        },
        Sphere {
            centre: Point3::new(0.0, 0.0, -bounds * 0.45),
            radius: bounds * 0.12,
        },
    ])
}

// Top-down orthographic view: world x/z onto image x/y, agents as coloured
// pixels over grey obstacle discs.
fn render_frame(flock: &Flock, obstacles: &SphereField, bounds: f32) -> RgbImage {
    let mut img = RgbImage::new(WIDTH, HEIGHT);
    let view_extent = bounds * 1.2;
    let scale = WIDTH as f32 / (2.0 * view_extent);
    let anchor = flock.anchor();

    for sphere in obstacles.spheres() {
        let cx = (sphere.centre.x - anchor.x) * scale + WIDTH as f32 / 2.0;
        let cy = (sphere.centre.z - anchor.z) * scale + HEIGHT as f32 / 2.0;
        let radius = sphere.radius * scale;
        let span = radius.ceil() as i32;
        for dy in -span..=span {
            for dx in -span..=span {
                if (dx * dx + dy * dy) as f32 <= radius * radius {
                    put_pixel_checked(&mut img, cx as i32 + dx, cy as i32 + dy, OBSTACLE_GREY);
                }
            }
        }
    }

    for agent in flock.agents() {
        let px = (agent.position.x - anchor.x) * scale + WIDTH as f32 / 2.0;
        let py = (agent.position.z - anchor.z) * scale + HEIGHT as f32 / 2.0;
        put_pixel_checked(&mut img, px as i32, py as i32, agent.colour);
    }
    img
}

fn put_pixel_checked(img: &mut RgbImage, x: i32, y: i32, colour: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < WIDTH && (y as u32) < HEIGHT {
        img.put_pixel(x as u32, y as u32, colour);
    }
}
