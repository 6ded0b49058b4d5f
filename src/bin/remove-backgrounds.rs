use std::error::Error as _;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use background_removal::{
    default_inputs, BackgroundRemover, Error, ProcessOptions, ProcessResult, FALLBACK_THRESHOLD,
};

#[derive(Parser)]
#[command(
    name = "remove-backgrounds",
    about = "Remove uniform backgrounds from the site's portrait photos",
    version,
    after_help = "Processes public/me_2024.jpeg and public/me_2022.jpeg under the base directory.\n\
                  JPEG inputs are written next to the original as PNG to keep transparency."
)]
struct Cli {
    /// Base directory holding public/ (default: directory of this executable)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Distance threshold for the simple method when the smoothed method fails
    #[arg(long, default_value_t = FALLBACK_THRESHOLD)]
    fallback_threshold: f32,

    /// Enable verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    if !cli.fallback_threshold.is_finite() || cli.fallback_threshold < 0.0 {
        eprintln!("Error: Fallback threshold must be a non-negative number");
        process::exit(1);
    }

    let opts = ProcessOptions {
        fallback_threshold: cli.fallback_threshold,
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    if !opts.quiet {
        eprintln!("Background Removal");
        eprintln!("{}", "=".repeat(50));
    }

    let remover = match BackgroundRemover::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Fatal: {e}");
            eprintln!();
            eprintln!("Rebuild with the image crate's default features enabled:");
            eprintln!("  image = \"0.25\"");
            process::exit(1);
        }
    };

    let root = cli.root.unwrap_or_else(exe_dir);
    let inputs = default_inputs(&root);

    let mut success_count = 0usize;
    for input in &inputs {
        if !opts.quiet {
            eprintln!("Processing: {}", input.display());
        }
        let result = remover.process_with_fallback(input, &opts);
        // Nothing sensible to do if stderr itself is gone
        let _ = print_result(&mut io::stderr().lock(), &result, &opts);
        if result.success {
            success_count += 1;
        }
    }

    eprintln!("{}", "=".repeat(50));
    eprintln!(
        "Processed {success_count}/{} images successfully.",
        inputs.len()
    );

    if success_count == inputs.len() {
        if !opts.quiet {
            eprintln!();
            eprintln!("All images processed! Backgrounds removed.");
            eprintln!("Note: Images saved as PNG to preserve transparency.");
        }
    } else {
        eprintln!();
        eprintln!("WARNING: Some images failed to process.");
    }
}

/// Directory containing the running executable, or `.` if it cannot be determined.
fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn print_result(
    out: &mut impl Write,
    result: &ProcessResult,
    opts: &ProcessOptions,
) -> io::Result<()> {
    if opts.verbose {
        for (i, method) in result.attempts.iter().enumerate() {
            writeln!(out, "  -> attempt {}: {method}", i + 1)?;
        }
    }

    if !opts.quiet {
        if let Some(bg) = result.background {
            writeln!(
                out,
                "  Detected background color: RGB({}, {}, {})",
                bg[0], bg[1], bg[2]
            )?;
        }
    }

    // A failed first attempt is a per-image error even when the fallback recovers
    if result.fallback_used {
        let first = result.fallback_message.as_deref().unwrap_or("failed");
        writeln!(out, "  [FALLBACK] {}: {first}", result.path.display())?;
        if let Some(err) = &result.fallback_error {
            print_error_chain(out, err)?;
        }
        if let Some(retry) = result.attempts.last() {
            writeln!(out, "  -> retried with {retry}")?;
        }
    }

    if result.success {
        if !opts.quiet {
            if let Some(saved) = &result.output {
                if saved != &result.path {
                    writeln!(out, "  Note: Converting to PNG format to preserve transparency")?;
                }
                writeln!(out, "  [OK] Saved to: {}", saved.display())?;
            }
            if opts.verbose {
                if let Some(method) = result.method {
                    writeln!(out, "  -> method: {method}")?;
                }
            }
        }
    } else {
        writeln!(out, "  [FAIL] {}: {}", result.path.display(), result.message)?;
        if let Some(err) = &result.error {
            print_error_chain(out, err)?;
        }
    }

    Ok(())
}

fn print_error_chain(out: &mut impl Write, err: &Error) -> io::Result<()> {
    writeln!(out, "  -> {err:?}")?;
    let mut source = err.source();
    while let Some(cause) = source {
        writeln!(out, "     caused by: {cause}")?;
        source = cause.source();
    }
    Ok(())
}
