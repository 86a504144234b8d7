use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use imgdedup::{
    DetectionService, DigestAlgorithm, DuplicateReport, Fingerprint, FingerprintMethod,
    ImageInput, ItemError, MetadataReport, ReferenceReport, ScannerService, Settings,
    SimilarityReport,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(
    name = "imgdedup",
    version,
    about = "Find exact and near-duplicate images"
)]
struct Cli {
    /// Settings file (default: <config dir>/imgdedup/config.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum parallel workers (0 = one per CPU)
    #[arg(long, global = true, value_name = "N")]
    workers: Option<usize>,

    /// Print the JSON report instead of a summary
    #[arg(long, global = true)]
    json: bool,

    /// Only read the given directories, not their subdirectories
    #[arg(long, global = true)]
    no_recursive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Group byte-identical images by content digest
    Duplicates {
        /// Digest algorithm: md5, sha1 or sha256
        #[arg(short, long)]
        algorithm: Option<String>,

        /// Image files or directories
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },

    /// Group visually similar images by fingerprint distance
    Similar {
        #[command(flatten)]
        fingerprint: FingerprintArgs,

        /// Image files or directories
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },

    /// Rank images by similarity to a reference
    Match {
        /// Reference image
        #[arg(short, long, value_name = "FILE", conflicts_with = "fingerprint")]
        reference: Option<PathBuf>,

        /// Reference fingerprint in hex, computed with --width and --method
        #[arg(long, value_name = "HEX", required_unless_present = "reference")]
        fingerprint: Option<String>,

        #[command(flatten)]
        options: FingerprintArgs,

        /// Candidate image files or directories
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },

    /// Show format, dimensions and EXIF details
    Metadata {
        /// Image files or directories
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct FingerprintArgs {
    /// Fingerprint grid size; fingerprints have width² bits
    #[arg(short, long)]
    width: Option<u32>,

    /// Maximum Hamming distance considered similar
    #[arg(short, long)]
    threshold: Option<u32>,

    /// Fingerprint method: mean, gradient or dct
    #[arg(short, long)]
    method: Option<String>,
}

impl FingerprintArgs {
    fn apply(&self, settings: &mut Settings) -> Result<()> {
        if let Some(width) = self.width {
            settings.width = width;
        }
        if let Some(threshold) = self.threshold {
            settings.threshold = threshold;
        }
        if let Some(method) = &self.method {
            settings.method = method.parse::<FingerprintMethod>()?;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(workers) = cli.workers {
        settings.max_workers = workers;
    }
    if cli.no_recursive {
        settings.recursive = false;
    }

    match &cli.command {
        Commands::Duplicates { algorithm, paths } => {
            if let Some(algorithm) = algorithm {
                settings.algorithm = algorithm.parse::<DigestAlgorithm>()?;
            }
            let (service, images) = prepare(&settings, paths)?;
            let report = benchmark("digesting", || {
                service.extract_digests(&images, settings.algorithm)
            });
            emit(cli.json, &report, print_duplicates)?;
        }

        Commands::Similar { fingerprint, paths } => {
            fingerprint.apply(&mut settings)?;
            settings.validate()?;
            let (service, images) = prepare(&settings, paths)?;
            let report = benchmark("fingerprinting", || {
                service.find_similar_groups(&images, settings.similarity())
            })?;
            emit(cli.json, &report, print_similar)?;
        }

        Commands::Match {
            reference,
            fingerprint,
            options,
            paths,
        } => {
            options.apply(&mut settings)?;
            settings.validate()?;
            let (service, candidates) = prepare(&settings, paths)?;
            let report = match (reference, fingerprint) {
                (Some(reference), _) => {
                    let reference = read_reference(reference)?;
                    benchmark("matching", || {
                        service.match_reference(&reference, &candidates, settings.similarity())
                    })?
                }
                (None, Some(hex)) => {
                    let reference = Fingerprint::from_hex(hex, settings.width, settings.method)?;
                    benchmark("matching", || {
                        service.match_fingerprint(reference, &candidates, settings.threshold)
                    })?
                }
                (None, None) => anyhow::bail!("Either --reference or --fingerprint is required"),
            };
            emit(cli.json, &report, print_matches)?;
        }

        Commands::Metadata { paths } => {
            let (service, images) = prepare(&settings, paths)?;
            let report = benchmark("reading metadata", || service.extract_metadata(&images));
            emit(cli.json, &report, print_metadata)?;
        }
    }

    Ok(())
}

fn prepare(settings: &Settings, paths: &[PathBuf]) -> Result<(DetectionService, Vec<ImageInput>)> {
    let service = DetectionService::new(settings.max_workers)
        .context("Failed to start worker pool")?;
    let images = load_images(&ScannerService::new(settings.scan()), paths)?;
    let unreadable = images.iter().filter(|image| image.is_failed()).count();
    log::info!(
        "{} image(s), {} unreadable, on {} worker(s)",
        images.len(),
        unreadable,
        service.workers()
    );
    Ok((service, images))
}

/// Resolve `paths` and read every file, keeping unreadable ones as failed items.
fn load_images(scanner: &ScannerService, paths: &[PathBuf]) -> Result<Vec<ImageInput>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Scanning for images…");
    spinner.enable_steady_tick(Duration::from_millis(100));
    let discovered = scanner.discover(paths);
    spinner.finish_and_clear();

    let bar = ProgressBar::new(discovered.len() as u64);
    bar.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} {wide_msg}",
    )?);
    let images = discovered
        .into_iter()
        .map(|found| {
            bar.set_message(found.identifier());
            let input = found.load();
            bar.inc(1);
            input
        })
        .collect();
    bar.finish_and_clear();

    Ok(images)
}

fn read_reference(path: &Path) -> Result<ImageInput> {
    let input = ImageInput::from_path(path);
    if let Err(e) = input.bytes() {
        anyhow::bail!("Failed to read reference {}: {}", path.display(), e);
    }
    Ok(input)
}

/// Run `f()`, log how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    log::info!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}

fn emit<T: Serialize>(json: bool, report: &T, summary: fn(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        summary(report);
    }
    Ok(())
}

fn print_errors(errors: &[ItemError]) {
    if errors.is_empty() {
        return;
    }
    eprintln!("\n⚠️  {} image(s) could not be processed:", errors.len());
    for err in errors {
        eprintln!("   ✗ {}: {}", err.identifier, err.error);
    }
}

fn print_duplicates(report: &DuplicateReport) {
    println!(
        "▶ {} image(s), {} unique by {}",
        report.total, report.unique, report.algorithm
    );
    if report.groups.is_empty() {
        println!("No duplicates found.");
    } else {
        println!("Found {} duplicate group(s):", report.groups.len());
        for (i, group) in report.groups.iter().enumerate() {
            println!(" Group {} ({}):", i + 1, group.digest);
            for member in &group.members {
                println!("   ▶ {}", member);
            }
        }
    }
    print_errors(&report.errors);
}

fn print_similar(report: &SimilarityReport) {
    println!(
        "▶ {}/{} image(s) fingerprinted ({} {}x{}, threshold {})",
        report.processed, report.total, report.method, report.width, report.width, report.threshold
    );
    if report.groups.is_empty() {
        println!("No similar images found.");
    } else {
        println!("Found {} similar group(s):", report.groups.len());
        for (i, group) in report.groups.iter().enumerate() {
            println!(" Group {} ({}):", i + 1, group.representative_fingerprint);
            for member in &group.members {
                println!("   ▶ {}", member);
            }
        }
    }
    print_errors(&report.errors);
}

fn print_matches(report: &ReferenceReport) {
    println!(
        "▶ Reference {}: {} of {} candidate(s) within {}",
        report.reference_fingerprint, report.matched, report.total_candidates, report.threshold
    );
    for m in &report.matches {
        println!("   {:>3}  {}  {}", m.distance, m.fingerprint, m.identifier);
    }
    print_errors(&report.errors);
}

fn print_metadata(report: &MetadataReport) {
    for meta in &report.results {
        println!(
            "▶ {}\n     {} {}x{} {}, {} bytes",
            meta.identifier, meta.format, meta.width, meta.height, meta.color_type, meta.size_bytes
        );
        if let Some(exif) = &meta.exif {
            if let Some(camera) = &exif.camera {
                println!("     camera: {}", camera);
            }
            if let Some(taken_at) = &exif.taken_at {
                println!("     taken: {}", taken_at.to_rfc3339());
            }
            if let Some(lens) = &exif.lens {
                println!("     lens: {}", lens);
            }
        }
    }
    print_errors(&report.errors);
}
