//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use coursedl_core::{DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS};

/// Download a course you have access to, for offline viewing.
///
/// Credentials come from a browser-exported cookie file (Netscape format)
/// and, for protected content, a JSON key file mapping key-IDs to content
/// keys. Already-downloaded files are skipped, so an interrupted run can
/// simply be re-run.
#[derive(Parser, Debug)]
#[command(name = "coursedl")]
#[command(author, version, about)]
pub struct Args {
    /// Course to download: an ID, a slug, or a full course URL
    pub course: String,

    /// API base URL of the course platform
    #[arg(long, default_value = "https://learn.example.com")]
    pub base_url: String,

    /// Netscape-format cookie file exported from the browser
    #[arg(long, value_name = "FILE")]
    pub cookies: Option<PathBuf>,

    /// JSON file mapping key-IDs to hex or base64 content keys
    #[arg(long, value_name = "FILE")]
    pub keys: Option<PathBuf>,

    /// Bearer token; overrides any auth cookie
    #[arg(long, value_name = "TOKEN")]
    pub bearer: Option<String>,

    /// Maximum vertical resolution, e.g. 720 (default: best available)
    #[arg(long, value_name = "HEIGHT")]
    pub quality: Option<u32>,

    /// Chapters to download, e.g. "1,3-5" (default: all)
    #[arg(long, value_name = "SPEC")]
    pub chapters: Option<String>,

    /// Skip caption tracks
    #[arg(long)]
    pub no_captions: bool,

    /// Skip supplementary assets
    #[arg(long)]
    pub no_assets: bool,

    /// Skip quiz sidecars
    #[arg(long)]
    pub no_quizzes: bool,

    /// Only keep captions for this language, e.g. "en"
    #[arg(long, value_name = "LANG")]
    pub caption_lang: Option<String>,

    /// Output directory the course folder is created under
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    pub output: PathBuf,

    /// Maximum concurrent downloads (1-30)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=30))]
    pub concurrency: u8,

    /// Maximum attempts per download, including the first (1-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_ATTEMPTS as u8, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_attempts: u8,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parse_successfully() {
        let args = Args::try_parse_from(["coursedl", "rust-basics"]).unwrap();
        assert_eq!(args.course, "rust-basics");
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert_eq!(usize::from(args.concurrency), DEFAULT_CONCURRENCY);
        assert_eq!(u32::from(args.max_attempts), DEFAULT_MAX_ATTEMPTS);
        assert!(args.quality.is_none());
        assert!(!args.no_captions);
    }

    #[test]
    fn test_cli_course_is_required() {
        let result = Args::try_parse_from(["coursedl"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_accepts_course_url() {
        let args = Args::try_parse_from([
            "coursedl",
            "https://learn.example.com/course/rust-basics",
        ])
        .unwrap();
        assert!(args.course.starts_with("https://"));
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["coursedl", "x", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_concurrency_bounds() {
        let args = Args::try_parse_from(["coursedl", "x", "-c", "1"]).unwrap();
        assert_eq!(args.concurrency, 1);
        let args = Args::try_parse_from(["coursedl", "x", "-c", "30"]).unwrap();
        assert_eq!(args.concurrency, 30);

        let result = Args::try_parse_from(["coursedl", "x", "-c", "0"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );
        let result = Args::try_parse_from(["coursedl", "x", "-c", "31"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );
    }

    #[test]
    fn test_cli_max_attempts_zero_rejected() {
        let result = Args::try_parse_from(["coursedl", "x", "-r", "0"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );
    }

    #[test]
    fn test_cli_content_toggles() {
        let args = Args::try_parse_from([
            "coursedl",
            "x",
            "--no-captions",
            "--no-assets",
            "--no-quizzes",
        ])
        .unwrap();
        assert!(args.no_captions);
        assert!(args.no_assets);
        assert!(args.no_quizzes);
    }

    #[test]
    fn test_cli_chapters_and_quality() {
        let args =
            Args::try_parse_from(["coursedl", "x", "--chapters", "1,3-5", "--quality", "720"])
                .unwrap();
        assert_eq!(args.chapters.as_deref(), Some("1,3-5"));
        assert_eq!(args.quality, Some(720));
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["coursedl", "--help"]);
        assert_eq!(result.unwrap_err().kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
