use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use imageanon::config::{FieldSelector, StripProfile};
use imageanon::model::{GroupKind, MetadataModel};
use imageanon::session::{self, EditSession};

#[derive(Parser, Debug)]
#[command(
    name = "imageanon",
    version,
    about = "Inspect and strip embedded image metadata (EXIF, GPS, IPTC, XMP, PNG text) and save a clean copy"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Display file information and every metadata group
    Show {
        /// Image to inspect
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete metadata and save a new image
    Strip {
        /// Image to read
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Where to write; the extension picks the format (default: new_image.<ext> next to INPUT)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Delete a whole group (repeatable), e.g. --group GPS
        #[arg(short, long = "group", value_name = "GROUP")]
        groups: Vec<GroupKind>,

        /// Delete one field (repeatable), e.g. --field Exif:BodySerialNumber
        #[arg(short, long = "field", value_name = "GROUP:KEY")]
        fields: Vec<FieldSelector>,

        /// Strip profile to apply as well (JSON)
        #[arg(short, long, value_name = "FILE")]
        profile: Option<PathBuf>,

        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the default strip profile and exit
    Init {
        /// Path to write (default: strip-profile.json next to binary)
        #[arg(short, long, value_name = "FILE")]
        profile: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    match cli.command {
        Command::Show { path, json } => show(&path, json),
        Command::Strip {
            input,
            output,
            groups,
            fields,
            profile,
            json,
        } => {
            let mut strip = match profile {
                Some(path) => StripProfile::load(Some(path.as_path()))?,
                None if groups.is_empty() && fields.is_empty() => {
                    log::info!("No deletions given, applying the default profile (GPS)");
                    StripProfile::default()
                }
                None => StripProfile {
                    groups: Vec::new(),
                    fields: Vec::new(),
                },
            };
            strip.groups.extend(groups.iter().map(GroupKind::to_string));
            strip.fields.extend(fields);
            strip_image(&input, output, &strip, json)
        }
        Command::Init { profile } => {
            let path = profile.as_deref();
            StripProfile::default().save(path)?;
            let save_path = match path {
                Some(p) => p.to_path_buf(),
                None => StripProfile::profile_path()?,
            };
            println!("Default strip profile written to {}", save_path.display());
            Ok(())
        }
    }
}

/// `new_image.<ext>` beside the input.
fn default_output(input: &Path, session: &EditSession) -> PathBuf {
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| session.asset().native_extension().to_string());
    input.with_file_name(format!("new_image.{ext}"))
}

fn strip_image(input: &Path, output: Option<PathBuf>, profile: &StripProfile, json: bool) -> Result<()> {
    let session =
        session::open_image(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let stripped = profile.apply(session.model());

    let output = output.unwrap_or_else(|| default_output(input, &session));
    session::save_image(session.asset(), &stripped, &output)
        .with_context(|| format!("Failed to save {}", output.display()))?;

    let removed = session.model().field_count() - stripped.field_count();
    if json {
        let summary = serde_json::json!({
            "input": input.display().to_string(),
            "output": output.display().to_string(),
            "removed_fields": removed,
            "metadata": stripped,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        log::info!("Removed {removed} field(s), wrote {}", output.display());
    }
    Ok(())
}

fn show(path: &Path, json: bool) -> Result<()> {
    let session = session::open_image(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let asset = session.asset();
    let (width, height) = asset.dimensions();

    if json {
        let report = serde_json::json!({
            "file": asset.file_name(),
            "format": format!("{:?}", asset.format()),
            "width": width,
            "height": height,
            "size": asset.byte_size(),
            "metadata": session.model(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("{BOLD}File:{RESET} {}", path.display());
    println!("{DIM}{}{RESET}", "═".repeat(72));
    print_row("Name", asset.file_name());
    print_row("Format", &format!("{:?}", asset.format()));
    print_row("Size", &format!("{} bytes", asset.byte_size()));
    print_row("Dimensions", &format!("{width} x {height}"));
    println!();

    print_model(session.model());
    Ok(())
}

// ANSI color codes
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Longest value shown before eliding; XMP packets can run to kilobytes.
const MAX_SHOWN: usize = 400;

fn print_model(model: &MetadataModel) {
    if model.is_empty() {
        println!("  {DIM}(no metadata found){RESET}");
        println!();
        return;
    }

    for kind in session::list_groups(model) {
        println!("  {BOLD}{kind}{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(70));
        for (key, value) in session::list_fields(model, kind) {
            print_row(&key, &value.to_string());
        }
        println!();
    }
}

/// Width of the key column.
const KEY_WIDTH: usize = 22;
/// Width of the value column.
const VAL_WIDTH: usize = 46;

/// One `key : value` row, long values elided and wrapped under the value column.
fn print_row(key: &str, value: &str) {
    let mut label = format!("{key:<KEY_WIDTH$} :");
    for line in value_lines(&elide(value)) {
        println!("  {label} {line}");
        label = " ".repeat(KEY_WIDTH + 2);
    }
}

fn elide(value: &str) -> String {
    match value.char_indices().nth(MAX_SHOWN) {
        Some((cut, _)) => format!("{} …", &value[..cut]),
        None => value.to_string(),
    }
}

/// Greedy word wrap at `VAL_WIDTH` characters; always at least one line.
fn value_lines(value: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for word in value.split_whitespace() {
        match lines.last_mut() {
            Some(line) if line.chars().count() + 1 + word.chars().count() <= VAL_WIDTH => {
                line.push(' ');
                line.push_str(word);
            }
            _ => lines.push(word.to_string()),
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
