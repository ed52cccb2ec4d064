use charuco_intrinsic_calibration::board::{Board, BoardConfig};
use charuco_intrinsic_calibration::camera_model::undistort;
use charuco_intrinsic_calibration::config::CalibrationConfig;
use charuco_intrinsic_calibration::data_loader::{collect_corners, load_image, resolve_image_sources};
use charuco_intrinsic_calibration::detector::CharucoCornerDetector;
use charuco_intrinsic_calibration::io::{
    CalibrationReport, object_from_json, object_to_json, write_report,
};
use charuco_intrinsic_calibration::optimization::calibrate;
use charuco_intrinsic_calibration::resolution::{
    ResolutionTable, ResolutionTableConfig, build_resolution_table,
};
use charuco_intrinsic_calibration::visualization::{log_dynamic_image, side_by_side};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use time::OffsetDateTime;

#[derive(Parser)]
#[command(version, about, author)]
struct CcalibCli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calibrate intrinsics from ChArUco board images
    Calibrate {
        /// image files, folders or glob patterns
        #[arg(required = true)]
        images: Vec<String>,

        /// calibration config json
        #[arg(short, long)]
        config: Option<String>,

        /// board config json, overrides the board in --config
        #[arg(short, long)]
        board_config: Option<String>,

        /// output folder, defaults to results/<local time>
        #[arg(short, long)]
        output_folder: Option<String>,

        /// image shown raw and undistorted
        #[arg(long)]
        preview_index: Option<usize>,

        #[arg(long, action)]
        no_preview: bool,
    },
    /// Print the per-resolution camera matrix table
    Resolutions {
        /// calibration.json of a previous run, the reference camera otherwise
        #[arg(long)]
        calibration: Option<String>,

        /// table config json, ignored with --calibration
        #[arg(long)]
        table_config: Option<String>,

        /// write the table as json
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn timestamp_folder_name(now: &OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

fn print_table(table: &ResolutionTable) {
    println!("distortion: {:?}", table.distortion);
    for (resolution, profile) in &table.profiles {
        println!(
            "resolution {} ({}, {} fps):{}",
            resolution,
            profile.image_size,
            profile.fps,
            profile.camera_matrix()
        );
    }
}

fn run_calibrate(
    images: &[String],
    config_path: Option<String>,
    board_config_path: Option<String>,
    output_folder: Option<String>,
    preview_index: Option<usize>,
    no_preview: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config: CalibrationConfig = match config_path {
        Some(p) => object_from_json(Path::new(&p))?,
        None => CalibrationConfig::default(),
    };
    if let Some(p) = board_config_path {
        config.board = object_from_json::<BoardConfig>(Path::new(&p))?;
    }
    if let Some(idx) = preview_index {
        config.preview_index = idx;
    }
    let board = Board::from_config(&config.board)?;
    let detector = CharucoCornerDetector::new(&config.board);

    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let output_folder = PathBuf::from(
        output_folder.unwrap_or_else(|| format!("results/{}", timestamp_folder_name(&now))),
    );
    std::fs::create_dir_all(&output_folder)?;
    let recording = rerun::RecordingStreamBuilder::new("calibration")
        .save(output_folder.join("calibration.rrd"))?;

    let img_paths = resolve_image_sources(images)?;
    println!("POSE ESTIMATION STARTS: {} images", img_paths.len());
    let now_detect = Instant::now();
    let observations = collect_corners(
        &img_paths,
        &detector,
        &board,
        config.min_corners,
        Some(&recording),
    )?;
    let duration_sec = now_detect.elapsed().as_secs_f64();
    println!("detecting feature took {:.6} sec", duration_sec);
    println!(
        "avg: {} sec",
        duration_sec / img_paths.len() as f64
    );

    println!("CAMERA CALIBRATION");
    let result = calibrate(&observations, &config.calibration_options())?;
    println!("{}", result.rms);
    println!(" ----------");
    println!("{}", result.camera_matrix);
    println!(" ----------");
    println!("{:?}", result.distortion);

    let report = CalibrationReport::new(&result, &observations, now.to_string());
    object_to_json(&output_folder.join("calibration.json"), &report)?;
    write_report(&output_folder.join("report.txt"), &result, &observations)?;

    let table_config =
        ResolutionTableConfig::from_camera(&result.camera_matrix, &result.distortion, result.img_w_h);
    match build_resolution_table(&table_config) {
        Ok(table) => object_to_json(&output_folder.join("resolutions.json"), &table)?,
        Err(e) => log::warn!("no resolution table for this camera: {}", e),
    }

    if !no_preview {
        match img_paths.get(config.preview_index) {
            Some(path) => {
                let frame = load_image(path)?;
                let model = result.camera_model();
                let img_undist = undistort(&frame, &model, &result.camera_matrix);
                log_dynamic_image(&recording, "preview/raw", &frame);
                log_dynamic_image(&recording, "preview/corrected", &img_undist);
                let preview_path = output_folder.join("preview.png");
                side_by_side(&frame, &img_undist).save(&preview_path)?;
                println!("preview saved to {}", preview_path.display());
            }
            None => log::warn!(
                "preview index {} out of range for {} images",
                config.preview_index,
                img_paths.len()
            ),
        }
    }
    println!("results saved to {}", output_folder.display());
    Ok(())
}

fn run_resolutions(
    calibration: Option<String>,
    table_config: Option<String>,
    output: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match (calibration, table_config) {
        (Some(p), _) => {
            let report: CalibrationReport = object_from_json(Path::new(&p))?;
            ResolutionTableConfig::from_camera(
                &report.camera_matrix(),
                &report.distortion,
                (report.image_width, report.image_height),
            )
        }
        (None, Some(p)) => object_from_json(Path::new(&p))?,
        (None, None) => ResolutionTableConfig::k16vga(),
    };
    let table = build_resolution_table(&config)?;
    print_table(&table);
    if let Some(p) = output {
        object_to_json(Path::new(&p), &table)?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = CcalibCli::parse();
    match cli.command {
        Commands::Calibrate {
            images,
            config,
            board_config,
            output_folder,
            preview_index,
            no_preview,
        } => run_calibrate(
            &images,
            config,
            board_config,
            output_folder,
            preview_index,
            no_preview,
        ),
        Commands::Resolutions {
            calibration,
            table_config,
            output,
        } => run_resolutions(calibration, table_config, output),
    }
}
