//! Command-line front end for scan_piecharts
//!
//! Reads the page images of one document in order until a confident color
//! reading settles the choice, then prints the best reading's ratio fields
//! as JSON on stdout. Set `RUST_LOG=scan_piecharts=debug` to follow the
//! pipeline.

use scan_piecharts::{
    image_loader::load_image, ChartAnalysis, ExtractionState, PiechartAnalyzer, ProfileStore, TextRecognizer,
};
use std::{env, path::PathBuf, process, sync::Arc};
use tracing_subscriber::EnvFilter;

struct Options {
    images: Vec<PathBuf>,
    profile: Option<String>,
    profiles_file: Option<PathBuf>,
    verbose: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("Error: {message}");
            print_help(&args[0]);
            process::exit(1);
        }
    };

    let store = match &options.profiles_file {
        Some(path) => ProfileStore::from_json_file(path),
        None => ProfileStore::embedded(),
    };
    let store = match store {
        Ok(store) => Arc::new(store),
        Err(error) => {
            eprintln!("Cannot load profiles: {error}");
            process::exit(1);
        }
    };

    #[cfg(feature = "tesseract")]
    let recognizer = match scan_piecharts::TesseractRecognizer::new(None, "eng") {
        Ok(recognizer) => recognizer,
        Err(error) => {
            eprintln!("Cannot start Tesseract: {error}");
            process::exit(1);
        }
    };
    #[cfg(not(feature = "tesseract"))]
    let recognizer = {
        eprintln!("Built without the `tesseract` feature: legends and printed percentages cannot be read");
        scan_piecharts::NoText
    };

    run(PiechartAnalyzer::new(store, recognizer), &options);
}

fn run<R: TextRecognizer>(analyzer: PiechartAnalyzer<R>, options: &Options) {
    let mut selector = match analyzer.selector(options.profile.as_deref()) {
        Ok(selector) => selector,
        Err(error) => {
            eprintln!("Analysis failed: {error}");
            process::exit(1);
        }
    };

    for path in &options.images {
        let page = match load_image(path) {
            Ok(page) => page,
            Err(error) => {
                eprintln!("Skipping {}: {error}", path.display());
                continue;
            }
        };
        let analysis = match &options.profile {
            Some(name) => analyzer.analyze(&page, name),
            None => analyzer.analyze_auto(&page),
        };
        let analysis = match analysis {
            Ok(analysis) => analysis,
            Err(error) if error.is_recoverable() => {
                eprintln!("Skipping {}: {error}", path.display());
                continue;
            }
            Err(error) => {
                eprintln!("Analysis failed: {error}");
                process::exit(1);
            }
        };

        if options.verbose {
            match &analysis {
                ChartAnalysis::NoChart => eprintln!("{}: no chart", path.display()),
                ChartAnalysis::Unreadable { charts } => {
                    eprintln!("{}: {charts} chart(s) found, nothing read", path.display())
                }
                ChartAnalysis::Chart(result) => eprintln!(
                    "{}: {:?} confidence1={:.2} confidence2={:.2}",
                    path.display(),
                    result.strategy,
                    result.confidence1,
                    result.confidence2
                ),
            }
        }

        if let Some(result) = analysis.into_result() {
            if selector.offer(result) == ExtractionState::Accepted {
                break;
            }
        }
    }

    let Some(result) = selector.into_selected() else {
        eprintln!("No chart could be read");
        process::exit(2);
    };

    match serde_json::to_string_pretty(&result.ratios()) {
        Ok(json) => println!("{json}"),
        Err(error) => {
            eprintln!("Error serializing result: {error}");
            process::exit(1);
        }
    }

    eprintln!();
    eprintln!("Chart Summary:");
    eprintln!("  Profile: {}", result.profile);
    eprintln!("  Strategy: {:?}", result.strategy);
    for (label, share) in &result.shares {
        let mark = if result.is_extrapolated(*label) { " (extrapolated)" } else { "" };
        eprintln!("  {label}: {share:.2}%{mark}");
    }
    eprintln!("  Confidence: {:.2} / {:.2}", result.confidence1, result.confidence2);
    if result.is_low_confidence() {
        eprintln!("  Warning: low confidence result, review before use.");
        for ambiguity in &result.ambiguities {
            eprintln!("    {ambiguity:?}");
        }
    }
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut options = Options {
        images: Vec::new(),
        profile: None,
        profiles_file: None,
        verbose: false,
    };

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--profile" | "-p" => {
                options.profile = Some(iter.next().ok_or("--profile needs a name")?.clone());
            }
            "--profiles-file" => {
                options.profiles_file = Some(PathBuf::from(iter.next().ok_or("--profiles-file needs a path")?));
            }
            "--verbose" | "-v" => options.verbose = true,
            "--help" | "-h" => {
                print_help(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => return Err(format!("unknown option {other}")),
            path => options.images.push(PathBuf::from(path)),
        }
    }

    if options.images.is_empty() {
        return Err("no image given".to_string());
    }
    Ok(options)
}

fn print_help(program_name: &str) {
    eprintln!("Usage: {program_name} [OPTIONS] <image>...");
    eprintln!();
    eprintln!("Read the carbon-footprint shares of a pie or donut chart.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -p, --profile NAME       Vendor profile (default: chosen from the circle count)");
    eprintln!("      --profiles-file PATH Profile file replacing the embedded profiles");
    eprintln!("  -v, --verbose            Report every image analyzed");
    eprintln!("  -h, --help               Show this help message");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {program_name} --profile HP page-3.png");
    eprintln!("  RUST_LOG=scan_piecharts=debug {program_name} page-*.png");
}
