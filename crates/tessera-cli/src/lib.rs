//! CLI logic for the Tessera renderer.
//!
//! Loads a graph document, renders it through a synchronous paper and
//! writes the scene as SVG.

pub mod error_adapter;

mod args;
mod config;

pub use args::Args;

use std::fs;

use log::{info, warn};

use tessera::{Diagram, TesseraError, paper::PaperEvent};

/// Run the Tessera CLI application
///
/// # Errors
///
/// Returns `TesseraError` for:
/// - File I/O errors
/// - Configuration loading errors
/// - Malformed or invalid graph documents
pub fn run(args: &Args) -> Result<(), TesseraError> {
    info!(
        input_path = args.input,
        output_path = args.output;
        "Processing diagram"
    );

    let app_config = config::load_config(args.config.as_ref())?;
    let source = fs::read_to_string(&args.input)?;

    let mut diagram = Diagram::from_json_str(&source, &app_config)?;
    // The CLI always renders to completion
    if diagram.paper().is_frozen() {
        diagram.unfreeze();
    }
    diagram.flush();

    let failed = report_events(diagram.drain_events());
    fs::write(&args.output, diagram.to_svg())?;

    info!(output_file = args.output, failed_views = failed; "SVG exported successfully");

    Ok(())
}

/// Logs paper events and returns the number of views that failed.
fn report_events(events: Vec<PaperEvent>) -> usize {
    let mut failed = 0;
    for event in events {
        match event {
            PaperEvent::Error { id, error } => {
                failed += 1;
                warn!(cell_id = id.to_string(), error:%; "Cell was not rendered");
            }
            PaperEvent::Warning { id, error } => {
                info!(cell_id = id.to_string(), error:%; "Rendered with a fallback");
            }
            PaperEvent::RenderDone(_) => {}
        }
    }
    failed
}
