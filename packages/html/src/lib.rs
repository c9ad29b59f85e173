//! # Tessera HTML
//!
//! Renders a set of document nodes to an HTML fragment, e.g. the content a
//! selection copies to the clipboard.

mod exporter;


pub use exporter::{export_html, ExportError, ExportOptions, ExportResult};
