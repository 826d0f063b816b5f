use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use navia_core::imaging::crop_enrollment_face;
use navia_core::types::DEFAULT_DISTANCE_THRESHOLD;
use navia_core::objects::DEFAULT_OBJECT_CONFIDENCE;
use navia_core::{
    feedback, EuclideanMatcher, FaceAnalyzer, Gallery, Matcher, OnnxFaceAnalyzer, YoloDetector,
    ZoneTally,
};
use navia_hw::speech::{DEFAULT_SPEECH_COMMAND, DEFAULT_SPEECH_RATE};
use navia_hw::{Camera, Voice};
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "navia", about = "Navia face gallery, obstacle and speech tools")]
struct Cli {
    /// Directory containing the ONNX models
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,
    /// Directory of gallery images
    #[arg(long, global = true)]
    gallery_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect the face gallery
    Gallery {
        #[command(subcommand)]
        action: GalleryAction,
    },
    /// Identify every face in an image against the gallery
    Identify {
        image: PathBuf,
        /// Largest distance that still counts as a match
        #[arg(long, default_value_t = DEFAULT_DISTANCE_THRESHOLD)]
        threshold: f32,
    },
    /// Add the first face of an image to the gallery
    Enroll {
        image: PathBuf,
        /// Identity name; becomes the file name
        #[arg(short, long)]
        name: String,
    },
    /// Detect obstacles in an image and print the spoken guidance
    Obstacles {
        image: PathBuf,
        #[arg(long, default_value_t = DEFAULT_OBJECT_CONFIDENCE)]
        confidence: f32,
        /// Also speak the guidance
        #[arg(long)]
        speak: bool,
    },
    /// List V4L2 capture devices
    Devices,
    /// Speak a sentence through the TTS program
    Say {
        text: String,
        #[arg(long, default_value_t = DEFAULT_SPEECH_RATE)]
        rate: u32,
        #[arg(long, default_value = DEFAULT_SPEECH_COMMAND)]
        command: String,
    },
}

#[derive(Subcommand)]
enum GalleryAction {
    /// List enrolled identities
    List,
}

struct Paths {
    model_dir: PathBuf,
    gallery_dir: PathBuf,
}

impl Paths {
    fn face_analyzer(&self) -> Result<OnnxFaceAnalyzer> {
        OnnxFaceAnalyzer::load(
            &self.model_dir.join(navia_core::SCRFD_MODEL),
            &self.model_dir.join(navia_core::ARCFACE_MODEL),
        )
        .context("failed to load face models")
    }

    fn gallery(&self, analyzer: &mut dyn FaceAnalyzer) -> Result<Gallery> {
        Gallery::load(&self.gallery_dir, analyzer)
            .with_context(|| format!("failed to load gallery {}", self.gallery_dir.display()))
    }
}

fn open_rgb(path: &Path) -> Result<image::RgbImage> {
    Ok(image::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .to_rgb8())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = Paths {
        model_dir: cli.model_dir.unwrap_or_else(navia_core::default_model_dir),
        gallery_dir: cli.gallery_dir.unwrap_or_else(navia_core::default_gallery_dir),
    };

    match cli.command {
        Commands::Gallery {
            action: GalleryAction::List,
        } => {
            let mut analyzer = paths.face_analyzer()?;
            let gallery = paths.gallery(&mut analyzer)?;
            if gallery.is_empty() {
                println!("No faces enrolled in {}", paths.gallery_dir.display());
            }
            for name in gallery.names() {
                println!("{name}");
            }
        }
        Commands::Identify { image, threshold } => {
            let mut analyzer = paths.face_analyzer()?;
            let gallery = paths.gallery(&mut analyzer)?;
            let frame = open_rgb(&image)?;

            let faces = analyzer.analyze(&frame)?;
            let report: Vec<_> = faces
                .iter()
                .enumerate()
                .map(|(index, face)| {
                    let result = EuclideanMatcher.compare(&face.embedding, gallery.faces(), threshold);
                    json!({
                        "face": index,
                        "bbox": face.bbox,
                        "identity": result.identity.to_string(),
                        "distance": result.distance,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Enroll { image, name } => {
            let name = name.trim();
            if !navia_core::gallery::is_valid_name(name) {
                bail!("invalid name {name:?}: must be a plain file name");
            }

            let mut analyzer = paths.face_analyzer()?;
            let frame = open_rgb(&image)?;
            let faces = analyzer.analyze(&frame)?;
            let Some(face) = faces.first() else {
                bail!("no face found in {}", image.display());
            };

            let crop = crop_enrollment_face(&frame, &face.bbox, 1)
                .context("face box lies outside the image")?;
            let path = Gallery::write_source(&paths.gallery_dir, name, &crop)?;

            let gallery = paths.gallery(&mut analyzer)?;
            if gallery.get(name).is_none() {
                eprintln!("warning: saved {} but no face was found in the crop", path.display());
            }
            println!("Enrolled {name} → {}", path.display());
        }
        Commands::Obstacles {
            image,
            confidence,
            speak,
        } => {
            let mut detector =
                YoloDetector::load(&paths.model_dir.join(navia_core::YOLO_MODEL), confidence)?;
            let frame = open_rgb(&image)?;

            let objects = detector.detect(&frame)?;
            let tally = ZoneTally::classify(&objects, frame.width());
            let guidance = feedback::decide(&tally);
            let utterance = guidance.as_ref().map(|g| g.to_string());

            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "objects": objects,
                    "zones": tally,
                    "guidance": utterance,
                }))?
            );

            if let (true, Some(text)) = (speak, utterance) {
                Voice::default().say(&text)?;
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Say {
            text,
            rate,
            command,
        } => {
            Voice::new(command, rate).say(&text)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_identify_defaults() {
        let cli = Cli::try_parse_from(["navia", "identify", "photo.jpg"]).unwrap();
        match cli.command {
            Commands::Identify { image, threshold } => {
                assert_eq!(image, PathBuf::from("photo.jpg"));
                assert_eq!(threshold, DEFAULT_DISTANCE_THRESHOLD);
            }
            _ => panic!("expected identify"),
        }
    }

    #[test]
    fn test_parse_global_dirs_after_subcommand() {
        let cli = Cli::try_parse_from([
            "navia",
            "enroll",
            "me.png",
            "--name",
            "alice",
            "--gallery-dir",
            "/tmp/faces",
        ])
        .unwrap();
        assert_eq!(cli.gallery_dir, Some(PathBuf::from("/tmp/faces")));
        assert!(matches!(cli.command, Commands::Enroll { ref name, .. } if name == "alice"));
    }

    #[test]
    fn test_enroll_requires_name() {
        assert!(Cli::try_parse_from(["navia", "enroll", "me.png"]).is_err());
    }

    #[test]
    fn test_parse_say() {
        let cli = Cli::try_parse_from(["navia", "say", "hello there", "--rate", "120"]).unwrap();
        match cli.command {
            Commands::Say { text, rate, command } => {
                assert_eq!(text, "hello there");
                assert_eq!(rate, 120);
                assert_eq!(command, "espeak-ng");
            }
            _ => panic!("expected say"),
        }
    }
}
