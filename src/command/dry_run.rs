use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::boot::{BootOptions, Bootstrap, Collaborators};
use crate::cli::Cli;
use crate::host::{DocumentFixture, StaticDocument, StaticWindow};
use crate::routes::{AbortReason, NavigationOutcome};
use crate::session::{SessionState, StaticSession};

/// What a dry run observed.
#[derive(Debug, Clone, PartialEq)]
pub struct DryRunReport {
    pub trace: Vec<String>,
    pub auth: &'static str,
    pub registry: Vec<String>,
    pub navigations: Vec<(String, String)>,
}

/// Load a host document fixture from disk.
pub fn load_document(path: &Path) -> Result<StaticDocument> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document fixture {}", path.display()))?;
    let fixture: DocumentFixture = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse document fixture {}", path.display()))?;
    Ok(StaticDocument::from_fixture(fixture))
}

fn load_session(path: Option<&Path>) -> Result<SessionState> {
    let Some(path) = path else {
        return Ok(SessionState::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session profile {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse session profile {}", path.display()))
}

/// Bootstrap against the fixture and run the requested navigations.
pub async fn dry_run(cli: &Cli) -> Result<DryRunReport> {
    let document = load_document(&cli.document)?;
    let window = StaticWindow::new(cli.window_url.clone());
    let session = Arc::new(StaticSession::new(load_session(cli.session.as_deref())?));

    let app = Bootstrap::new(&document, &window, Collaborators::logging().with_session(session))
        .with_options(BootOptions::from_env())
        .run()?;

    let locations = if cli.navigate.is_empty() {
        vec![app.initial_location(&window)?]
    } else {
        cli.navigate.clone()
    };

    let mut navigations = Vec::with_capacity(locations.len());
    for location in locations {
        let outcome = match app.navigator.navigate(&location).await {
            NavigationOutcome::Ready(view) => view.controller,
            NavigationOutcome::Retained(view) => format!("{} (kept)", view.controller),
            NavigationOutcome::Aborted(AbortReason::GateFailed(e)) => format!("aborted: {}", e),
            NavigationOutcome::Aborted(reason) => format!("aborted: {:?}", reason),
        };
        navigations.push((location, outcome));
    }

    Ok(DryRunReport {
        trace: app.trace.steps().iter().map(ToString::to_string).collect(),
        auth: app.auth.kind().as_str(),
        registry: app.registry.keys().map(str::to_string).collect(),
        navigations,
    })
}

impl fmt::Display for DryRunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Boot trace:")?;
        for (i, step) in self.trace.iter().enumerate() {
            writeln!(f, "  {:>2}. {}", i + 1, step)?;
        }

        writeln!(f, "\nAuth strategy: {}", self.auth)?;

        writeln!(f, "\nRegistry ({} entries):", self.registry.len())?;
        for name in &self.registry {
            writeln!(f, "  {}", name)?;
        }

        writeln!(f, "\nNavigations:")?;
        for (location, outcome) in &self.navigations {
            writeln!(f, "  {} -> {}", location, outcome)?;
        }
        Ok(())
    }
}

pub async fn run_dry_run(cli: &Cli) -> Result<()> {
    let report = dry_run(cli).await?;
    print!("{}", report);
    println!("\n✅ Bootstrap completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn fixture(contents: &serde_json::Value) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn cli(document: PathBuf, navigate: &[&str]) -> Cli {
        Cli {
            document,
            window_url: "https://hypothes.is/app.html".to_string(),
            navigate: navigate.iter().map(|s| s.to_string()).collect(),
            session: None,
            verbose: false,
        }
    }

    #[tokio::test]
    async fn test_dry_run_reports_routes() {
        let document = fixture(&serde_json::json!({
            "settings": {"apiUrl": "https://hypothes.is/api/", "services": []},
            "elements": ["hypothesis-app"]
        }));

        let report = dry_run(&cli(document.path().to_path_buf(), &["/a/1", "/stream", "/x"]))
            .await
            .unwrap();

        assert_eq!(report.auth, "multi-service");
        assert!(report.registry.contains(&"WidgetController".to_string()));
        assert_eq!(report.trace.last().map(String::as_str), Some("application attached"));
        assert_eq!(
            report.navigations,
            vec![
                ("/a/1".to_string(), "AnnotationViewerController".to_string()),
                ("/stream".to_string(), "StreamController".to_string()),
                ("/x".to_string(), "WidgetController".to_string()),
            ]
        );
        assert!(report.to_string().contains("/stream -> StreamController"));
    }

    #[tokio::test]
    async fn test_dry_run_defaults_to_window_location() {
        let document = fixture(&serde_json::json!({
            "settings": "{\"apiUrl\": \"https://hypothes.is/api/\"}",
            "elements": ["hypothesis-app"]
        }));

        let report = dry_run(&cli(document.path().to_path_buf(), &[])).await.unwrap();
        assert_eq!(report.auth, "session-cookie");
        assert_eq!(
            report.navigations,
            vec![("/app.html".to_string(), "WidgetController".to_string())]
        );
    }

    #[tokio::test]
    async fn test_dry_run_surfaces_bootstrap_error() {
        let document = fixture(&serde_json::json!({
            "settings": {"apiUrl": "https://hypothes.is/api/"},
            "elements": []
        }));

        let err = dry_run(&cli(document.path().to_path_buf(), &[])).await.unwrap_err();
        assert!(err.to_string().contains("hypothesis-app"));
    }

    #[test]
    fn test_load_document_reports_path() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = load_document(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains(&file.path().display().to_string()));
    }
}
