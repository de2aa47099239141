use clap::Parser;

use crate::config::ArchiveOptions;

#[derive(Parser, Debug)]
#[command(name = "zipcen")]
#[command(version)]
#[command(about = "List and extract ZIP/Zip64 archives, local or over HTTP", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipcen data1.zip -x joe        extract all files except joe from data1.zip\n  \
  zipcen -p foo.zip | more       send contents of foo.zip via pipe into more\n  \
  zipcen -l https://example.com/archive.zip   list files from remote ZIP\n\n\
Set RUST_LOG=zipcen=debug to trace directory parsing.")]
pub struct Cli {
    /// ZIP file path or HTTP URL
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Files to extract (default: all)
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely/show version info
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Read the central directory instead of memory-mapping it
    #[arg(long = "no-mmap")]
    pub no_mmap: bool,

    /// Reject archives whose entry count disagrees with the directory
    #[arg(long = "strict")]
    pub strict: bool,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.file.starts_with("http://") || self.file.starts_with("https://")
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Archive options selected on the command line.
    pub fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions::default()
            .map_directory(!self.no_mmap)
            .recount_overflow(!self.strict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_into_options() {
        let cli = Cli::parse_from(["zipcen", "--no-mmap", "--strict", "-qq", "a.zip", "x.txt"]);
        assert_eq!(cli.files, vec!["x.txt".to_string()]);
        assert!(cli.is_very_quiet());
        let options = cli.archive_options();
        assert!(!options.map_directory);
        assert!(!options.recount_overflow);
    }

    #[test]
    fn recognizes_urls() {
        let cli = Cli::parse_from(["zipcen", "-l", "https://example.com/a.zip"]);
        assert!(cli.is_http_url());
        assert!(cli.list);
        assert!(cli.archive_options().map_directory);
    }
}
