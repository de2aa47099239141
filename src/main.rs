//! Main entry point for the zipcen CLI application.
//!
//! Lists and extracts ZIP archives from the local filesystem or from HTTP
//! URLs, using the shared archive registry for local files.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use zipcen::io::fingerprint;
use zipcen::{Archive, ArchiveRegistry, Cli, Entry, HttpRangeReader};

/// Application entry point.
///
/// Parses command-line arguments and dispatches to the appropriate handler
/// based on whether the input is a local file or HTTP URL.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = cli.archive_options();

    if cli.is_http_url() {
        // Handle remote ZIP file via HTTP Range requests
        let reader = HttpRangeReader::new(cli.file.clone())?;
        let archive = Archive::from_source(cli.file.clone(), Box::new(reader), options)
            .with_context(|| format!("cannot read {}", cli.file))?;

        process_zip(&archive, &cli)?;
    } else {
        // Handle local ZIP file
        let registry = ArchiveRegistry::with_options(options);
        let path = Path::new(&cli.file);
        let archive = registry
            .open(path, fingerprint(path))
            .with_context(|| format!("cannot open {}", cli.file))?;

        let result = process_zip(&archive, &cli);
        registry.close(archive);
        result?;
    }

    Ok(())
}

/// Process a ZIP archive based on CLI options.
///
/// - List mode (`-l` or `-v`): Display archive contents
/// - Extract mode: Extract files matching the specified filters
fn process_zip(archive: &Archive, cli: &Cli) -> Result<()> {
    // List mode: display archive contents and exit
    if cli.list || cli.verbose {
        return list_files(archive, cli.verbose);
    }

    let entries = select_entries(archive, cli)?;

    // Extract each matching file
    let multiple_files = cli.pipe && entries.len() > 1;
    for mut entry in entries {
        extract_file(archive, &mut entry, cli, multiple_files)?;
        archive.release_entry(entry);
    }

    Ok(())
}

/// Decide which members to extract.
///
/// Plain names are looked up directly through the index (retrying with a
/// trailing `/` for directories); wildcard patterns and the default "all"
/// selection enumerate the directory.
fn select_entries(archive: &Archive, cli: &Cli) -> Result<Vec<Entry>> {
    let excluded = |e: &Entry| {
        let name = e.name_lossy();
        cli.exclude
            .iter()
            .any(|x| name.contains(x.as_str()) || glob_match(x, &name))
    };

    if !cli.files.is_empty() && !cli.files.iter().any(|f| has_glob_chars(f)) {
        let mut selected = Vec::new();
        for f in &cli.files {
            match archive.get_entry(f.as_bytes(), true)? {
                Some(entry) if !excluded(&entry) => selected.push(entry),
                Some(_) => {}
                None => {
                    if !cli.is_very_quiet() {
                        eprintln!("caution: filename not matched:  {}", f);
                    }
                }
            }
        }
        return Ok(selected);
    }

    let mut selected = Vec::new();
    for entry in archive.entries() {
        let entry = entry?;

        // Skip directory entries; they are created on demand
        if entry.is_directory() {
            continue;
        }

        if !cli.files.is_empty() {
            let name = entry.name_lossy();
            if !cli.files.iter().any(|f| glob_match(f, &name)) {
                continue;
            }
        }

        if excluded(&entry) {
            continue;
        }

        selected.push(entry);
    }
    Ok(selected)
}

/// List files in the ZIP archive.
///
/// Supports two output formats:
/// - Simple format (`-l`): Just file names, one per line
/// - Verbose format (`-v`): Detailed table with size, compression ratio, and timestamps
fn list_files(archive: &Archive, verbose: bool) -> Result<()> {
    if verbose {
        if let Some(comment) = archive.comment()? {
            println!("{}", String::from_utf8_lossy(&comment));
        }
        // Print table header for verbose output
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
            "Length", "Size", "Cmpr", "Date", "Time"
        );
        println!("{}", "-".repeat(70));
    }

    // Track totals for summary line
    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in archive.entries() {
        let entry = entry?;
        if verbose {
            let (year, month, day) = entry.mod_date();
            let (hour, minute, _second) = entry.mod_clock();
            let stored = entry.stored_len();

            // Calculate compression ratio as percentage saved
            let ratio = if entry.size() > 0 {
                format!("{:>4}%", 100 - (stored * 100 / entry.size()) as i64)
            } else {
                "  0%".to_string()
            };

            println!(
                "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
                entry.size(),
                stored,
                ratio,
                year,
                month,
                day,
                hour,
                minute,
                entry.name_lossy()
            );

            // Accumulate totals (excluding directories)
            if !entry.is_directory() {
                total_uncompressed += entry.size();
                total_compressed += stored;
                file_count += 1;
            }
        } else {
            println!("{}", entry.name_lossy());
        }
    }

    // Print summary line in verbose mode
    if verbose {
        println!("{}", "-".repeat(70));
        let total_ratio = if total_uncompressed > 0 {
            format!(
                "{:>4}%",
                100 - (total_compressed * 100 / total_uncompressed) as i64
            )
        } else {
            "  0%".to_string()
        };
        println!(
            "{:>10}  {:>10}  {}  {:>21}  {} files",
            total_uncompressed, total_compressed, total_ratio, "", file_count
        );
    }

    Ok(())
}

/// Extract a single member.
///
/// Handles pipe mode (`-p`), a custom output directory (`-d`), junk paths
/// (`-j`) and overwrite control (`-n`, `-o`).
fn extract_file(archive: &Archive, entry: &mut Entry, cli: &Cli, show_filename: bool) -> Result<()> {
    let name = entry.name_lossy().into_owned();

    // Pipe mode: write file contents directly to stdout
    if cli.pipe {
        if entry.is_directory() {
            return Ok(());
        }
        let data = archive.read_entry(entry)?;
        let mut stdout = std::io::stdout().lock();
        if show_filename {
            writeln!(stdout, "--- {} ---", name)?;
        }
        stdout.write_all(&data)?;
        return Ok(());
    }

    let output_path = output_path(&name, cli)?;

    if entry.is_directory() {
        if !cli.junk_paths {
            std::fs::create_dir_all(&output_path)?;
        }
        return Ok(());
    }

    // Handle existing files based on overwrite options
    if output_path.exists() {
        if cli.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", name);
            }
            return Ok(());
        }

        if !cli.overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", name);
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", name);
    }

    let data = archive
        .read_entry(entry)
        .with_context(|| format!("cannot extract {}", name))?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(&output_path, &data)?;

    Ok(())
}

/// Where a member named `name` lands on disk.
///
/// Rejects names that would escape the destination directory.
fn output_path(name: &str, cli: &Cli) -> Result<PathBuf> {
    let relative = if cli.junk_paths {
        // Junk paths: use only the base filename, ignore directory structure
        Path::new(name)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(name))
    } else {
        PathBuf::from(name)
    };

    if relative
        .components()
        .any(|c| !matches!(c, std::path::Component::Normal(_) | std::path::Component::CurDir))
    {
        bail!("refusing to extract {}: path escapes the destination", name);
    }

    Ok(match cli.extract_dir {
        Some(ref dir) => PathBuf::from(dir).join(relative),
        None => relative,
    })
}

/// Check if a pattern contains glob wildcard characters.
fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            // Star matches zero characters, or one and stays in place
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matching() {
        assert!(glob_match("*.txt", "readme.txt"));
        assert!(glob_match("file?.dat", "file1.dat"));
        assert!(!glob_match("*.txt", "readme.md"));
        assert!(has_glob_chars("a*"));
        assert!(!has_glob_chars("plain"));
    }

    #[test]
    fn output_paths_stay_inside_destination() {
        let cli = Cli::parse_from(["zipcen", "-d", "out", "a.zip"]);
        assert_eq!(output_path("x/y.txt", &cli).unwrap(), PathBuf::from("out/x/y.txt"));
        assert!(output_path("../evil", &cli).is_err());
        assert!(output_path("/etc/passwd", &cli).is_err());

        let junk = Cli::parse_from(["zipcen", "-j", "a.zip"]);
        assert_eq!(output_path("x/y.txt", &junk).unwrap(), PathBuf::from("y.txt"));
    }
}
