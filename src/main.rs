use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use image::ImageReader;
use log::{debug, info};
use std::path::{Path, PathBuf};

use valo::editing::background::{self, CancelFlag};
use valo::{
    Adjustment, CropRatio, CropRegion, EditParams, EditSession, Preset, RemoveStatus,
    SessionDb, SessionRepository, Tab, export_image, process_image, process_image_debug,
};

#[derive(Parser)]
#[command(name = "valo")]
#[command(about = "Adjust, crop and cut out the background of images")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render an image through the editing pipeline in one go
    Edit(EditArgs),

    /// Work with a saved edit session
    #[command(subcommand)]
    Project(ProjectCommand),
}

#[derive(Args)]
struct AdjustArgs {
    #[arg(long, allow_negative_numbers = true, value_name = "-100..100")]
    brightness: Option<i32>,

    #[arg(long, allow_negative_numbers = true, value_name = "-100..100")]
    sharpness: Option<i32>,

    #[arg(long, value_name = "0..100")]
    denoise: Option<i32>,

    #[arg(long, allow_negative_numbers = true, value_name = "-100..100")]
    red: Option<i32>,

    #[arg(long, allow_negative_numbers = true, value_name = "-100..100")]
    green: Option<i32>,

    #[arg(long, allow_negative_numbers = true, value_name = "-100..100")]
    blue: Option<i32>,

    /// none, mono, dramatic-warm, noir or dramatic-cool
    #[arg(long)]
    preset: Option<Preset>,

    /// JSON file with edit parameters; flags override its values
    #[arg(long, value_name = "FILE")]
    params: Option<PathBuf>,
}

impl AdjustArgs {
    fn values(&self) -> [(Adjustment, Option<i32>); 6] {
        [
            (Adjustment::Brightness, self.brightness),
            (Adjustment::Sharpness, self.sharpness),
            (Adjustment::Denoise, self.denoise),
            (Adjustment::Red, self.red),
            (Adjustment::Green, self.green),
            (Adjustment::Blue, self.blue),
        ]
    }

    /// Parameters from the file (if any) with the flags laid over them
    fn to_params(&self) -> anyhow::Result<EditParams> {
        let mut params = match &self.params {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read parameters from {:?}", path))?;
                serde_json::from_str::<EditParams>(&text)
                    .with_context(|| format!("Invalid parameters in {:?}", path))?
            }
            None => EditParams::default(),
        };
        for (adjustment, value) in self.values() {
            if let Some(value) = value {
                params.set(adjustment, value);
            }
        }
        if let Some(preset) = self.preset {
            params.preset = preset;
            params.mono = preset == Preset::Mono;
        }
        Ok(params.clamped())
    }
}

#[derive(Args)]
struct EditArgs {
    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// Output image; the extension picks the format
    #[arg(short, long, value_name = "OUT")]
    output: PathBuf,

    #[command(flatten)]
    adjust: AdjustArgs,

    /// Normalized crop region
    #[arg(long, value_name = "x,y,w,h")]
    crop: Option<CropRegion>,

    /// Cut out the background before editing
    #[arg(long)]
    remove_background: bool,

    /// Save every pipeline stage to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Start a new project from an image
    New {
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
        /// Session name, defaults to the project file name
        #[arg(long)]
        name: Option<String>,
    },
    /// Change adjustment sliders or the preset
    Adjust {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
        #[command(flatten)]
        adjust: AdjustArgs,
    },
    /// Crop the current image
    Crop {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
        /// Centred default box with this ratio, e.g. square or 4:5
        #[arg(long, conflicts_with = "region", required_unless_present = "region")]
        ratio: Option<CropRatio>,
        /// Explicit normalized region
        #[arg(long, value_name = "x,y,w,h")]
        region: Option<CropRegion>,
    },
    /// Cut out the background of the current image
    RemoveBg {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
    },
    Undo {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
    },
    Redo {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
    },
    /// Print the session state
    Show {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
    },
    /// Render the current state to an image file
    Export {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
        #[arg(value_name = "OUT")]
        output: PathBuf,
    },
}

fn load_image(path: &Path) -> anyhow::Result<image::DynamicImage> {
    let img = ImageReader::open(path)
        .with_context(|| format!("Failed to open image {:?}", path))?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;
    info!("Image loaded: {}x{}", img.width(), img.height());
    Ok(img)
}

async fn run_edit(args: EditArgs) -> anyhow::Result<()> {
    let mut img = load_image(&args.image_path)?;

    let mut params = args.adjust.to_params()?;
    if let Some(region) = args.crop {
        params.crop = region;
    }
    debug!("Edit parameters: {:?}", params);

    if args.remove_background {
        info!("Removing background...");
        let rgb = img.to_rgb8();
        let cut = tokio::task::spawn_blocking(move || background::remove_background(&rgb, &CancelFlag::new()))
            .await??
            .context("Background removal was cancelled")?;
        img = image::DynamicImage::ImageRgba8(cut);
    }

    let out = match &args.debug_out {
        Some(dir) => process_image_debug(&img, &params, dir)?,
        None => process_image(&img, &params)?,
    };
    export_image(&out, &args.output)?;
    println!("Saved {}x{} image to {:?}", out.width(), out.height(), args.output);
    Ok(())
}

async fn open_session(project: &Path) -> anyhow::Result<(SessionDb, EditSession)> {
    if !project.is_file() {
        anyhow::bail!("Project file not found: {:?}", project);
    }
    let db = SessionDb::new(project).await?;
    let session = db
        .load_session()
        .await?
        .with_context(|| format!("Project {:?} holds no image; create it with `valo project new`", project))?;
    Ok((db, session))
}

async fn persist(db: &SessionDb, session: &EditSession) -> anyhow::Result<()> {
    db.store_session(session).await?;
    db.save_project().await
}

/// Set up the crop box from either an explicit region or a ratio
fn choose_crop(session: &mut EditSession, ratio: Option<CropRatio>, region: Option<CropRegion>) -> anyhow::Result<()> {
    match (ratio, region) {
        (_, Some(region)) => {
            session.set_crop_ratio(CropRatio::Custom);
            session.update_crop(region);
        }
        (Some(CropRatio::Original), None) => anyhow::bail!("Original keeps the full image; nothing to crop"),
        (Some(ratio), None) => session.set_crop_ratio(ratio),
        (None, None) => anyhow::bail!("Give either --ratio or --region"),
    }
    Ok(())
}

async fn run_project(command: ProjectCommand) -> anyhow::Result<()> {
    match command {
        ProjectCommand::New {
            image_path,
            project,
            name,
        } => {
            if project.exists() {
                anyhow::bail!("Project file already exists: {:?}", project);
            }
            let session = EditSession::new(load_image(&image_path)?);
            let db = SessionDb::new(&project).await?;
            if let Some(name) = name {
                db.set_session_name(&name).await?;
            }
            persist(&db, &session).await?;
            println!("Created project {:?}", project);
        }
        ProjectCommand::Adjust { project, adjust } => {
            let (db, mut session) = open_session(&project).await?;
            let target = adjust.to_params()?;
            let from_file = adjust.params.is_some();
            session.open_tab(Tab::Adjust);
            for (adjustment, flag) in adjust.values() {
                if from_file || flag.is_some() {
                    session.set_adjustment(adjustment, target.get(adjustment));
                }
            }
            session.commit();
            if from_file || adjust.preset.is_some() {
                session.open_tab(Tab::Filter);
                session.set_preset(target.preset);
            }
            persist(&db, &session).await?;
            println!("{}", serde_json::to_string_pretty(session.params())?);
        }
        ProjectCommand::Crop {
            project,
            ratio,
            region,
        } => {
            let (db, mut session) = open_session(&project).await?;
            session.open_tab(Tab::Crop);
            choose_crop(&mut session, ratio, region)?;
            if !session.apply_crop()? {
                anyhow::bail!("Crop could not be applied");
            }
            persist(&db, &session).await?;
            let base = session.current_base();
            println!("Cropped to {}x{}", base.width(), base.height());
        }
        ProjectCommand::RemoveBg { project } => {
            let (db, mut session) = open_session(&project).await?;
            session.open_tab(Tab::RemoveBg);
            session.start_background_removal()?;
            let status = session.finish_background_removal().await.clone();
            if status != RemoveStatus::Done || !session.apply_background_removal() {
                anyhow::bail!("Background removal did not complete: {}", status);
            }
            persist(&db, &session).await?;
            println!("Background removed");
        }
        ProjectCommand::Undo { project } => {
            let (db, mut session) = open_session(&project).await?;
            if session.undo() {
                persist(&db, &session).await?;
                println!("Undone, history at {}/{}", session.history().cursor() + 1, session.history().len());
            } else {
                println!("Nothing to undo");
            }
        }
        ProjectCommand::Redo { project } => {
            let (db, mut session) = open_session(&project).await?;
            if session.redo() {
                persist(&db, &session).await?;
                println!("Redone, history at {}/{}", session.history().cursor() + 1, session.history().len());
            } else {
                println!("Nothing to redo");
            }
        }
        ProjectCommand::Show { project } => {
            let (db, session) = open_session(&project).await?;
            println!("=== {} ===", db.get_session_name().await?);
            println!("Created: {}", db.get_session_created_at().await?);
            println!("\nBase images:");
            for (idx, base) in session.bases().iter().enumerate() {
                let marker = if idx == session.base_idx() { "*" } else { " " };
                let alpha = if base.color().has_alpha() { " (transparent)" } else { "" };
                println!(" {} {}: {}x{}{}", marker, idx, base.width(), base.height(), alpha);
            }
            println!("\nHistory:");
            for (pos, state) in session.history().states().iter().enumerate() {
                let marker = if pos == session.history().cursor() { "*" } else { " " };
                println!(" {} {}: base {} {}", marker, pos, state.base_idx, serde_json::to_string(&state.params)?);
            }
        }
        ProjectCommand::Export { project, output } => {
            let (_db, session) = open_session(&project).await?;
            session.export(&output)?;
            println!("Exported to {:?}", output);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    match cli.command {
        Command::Edit(args) => run_edit(args).await,
        Command::Project(command) => run_project(command).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn no_flags() -> AdjustArgs {
        AdjustArgs {
            brightness: None,
            sharpness: None,
            denoise: None,
            red: None,
            green: None,
            blue: None,
            preset: None,
            params: None,
        }
    }

    #[test]
    fn flags_override_params_file_and_are_clamped() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{"brightness": 20, "sharpness": 30, "red": 500}}"#)?;

        let args = AdjustArgs {
            brightness: Some(150),
            preset: Some(Preset::Mono),
            params: Some(file.path().to_path_buf()),
            ..no_flags()
        };
        let params = args.to_params()?;
        assert_eq!(params.brightness, 100);
        assert_eq!(params.sharpness, 30);
        assert_eq!(params.red, 100);
        assert_eq!(params.preset, Preset::Mono);
        assert!(params.mono);
        Ok(())
    }

    #[test]
    fn other_presets_clear_mono() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{"mono": true, "preset": "mono"}}"#)?;

        let args = AdjustArgs {
            preset: Some(Preset::Noir),
            params: Some(file.path().to_path_buf()),
            ..no_flags()
        };
        let params = args.to_params()?;
        assert_eq!(params.preset, Preset::Noir);
        assert!(!params.mono);
        Ok(())
    }

    #[test]
    fn missing_params_file_is_an_error() {
        let args = AdjustArgs {
            params: Some(PathBuf::from("does/not/exist.json")),
            ..no_flags()
        };
        assert!(args.to_params().is_err());
    }

    #[test]
    fn negative_slider_values_parse() {
        let cli = Cli::try_parse_from(["valo", "edit", "in.png", "-o", "out.png", "--brightness", "-40"]).unwrap();
        let Command::Edit(args) = cli.command else {
            panic!("expected the edit command");
        };
        assert_eq!(args.adjust.to_params().unwrap().brightness, -40);
    }

    #[test]
    fn crop_ratio_and_region_conflict() {
        let parsed = Cli::try_parse_from([
            "valo", "project", "crop", "p.valo", "--ratio", "square", "--region", "0,0,0.5,0.5",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn original_ratio_is_not_a_crop() {
        let mut session = EditSession::new(image::DynamicImage::new_rgb8(40, 30));
        session.open_tab(Tab::Crop);
        assert!(choose_crop(&mut session, Some(CropRatio::Original), None).is_err());
        assert!(choose_crop(&mut session, None, None).is_err());
    }

    #[test]
    fn region_wins_and_switches_to_custom() -> anyhow::Result<()> {
        let mut session = EditSession::new(image::DynamicImage::new_rgb8(40, 30));
        session.open_tab(Tab::Crop);
        choose_crop(&mut session, None, Some(CropRegion::new(0.25, 0.0, 0.5, 0.5)))?;
        assert_eq!(session.params().crop_ratio, CropRatio::Custom);
        assert!(session.params().crop.enabled);
        assert!(session.apply_crop()?);
        assert_eq!((session.current_base().width(), session.current_base().height()), (20, 15));
        Ok(())
    }
}
