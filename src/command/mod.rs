mod dry_run;

pub use dry_run::{dry_run, load_document, run_dry_run, DryRunReport};
