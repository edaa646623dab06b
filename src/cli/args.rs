use std::path::PathBuf;

use clap::Parser;

/// Sidebar bootstrap dry run
#[derive(Debug, Parser)]
#[command(name = "sidebar-boot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Host document fixture: {"settings": {...}, "elements": ["hypothesis-app"]}
    #[arg(short, long)]
    pub document: PathBuf,

    /// Location of the window hosting the sidebar
    #[arg(long, default_value = "https://hypothes.is/app.html")]
    pub window_url: String,

    /// App location to navigate to after bootstrap (repeatable)
    #[arg(short, long = "navigate")]
    pub navigate: Vec<String>,

    /// Session profile served to resolve gates (defaults to logged out)
    #[arg(long)]
    pub session: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repeated_navigate() {
        let cli = Cli::try_parse_from([
            "sidebar-boot",
            "--document",
            "doc.json",
            "-n",
            "/a/123",
            "--navigate",
            "/stream",
        ])
        .unwrap();
        assert_eq!(cli.document, PathBuf::from("doc.json"));
        assert_eq!(cli.navigate, vec!["/a/123", "/stream"]);
        assert_eq!(cli.window_url, "https://hypothes.is/app.html");
        assert!(cli.session.is_none());
    }

    #[test]
    fn test_document_is_required() {
        assert!(Cli::try_parse_from(["sidebar-boot"]).is_err());
    }
}
