//! Markup renderer for fragments
//!
//! This module walks the template model against a parameter set and
//! produces the final markup string.

pub mod config;
pub mod error;
pub mod markup;

pub use config::OutputConfig;
pub use error::RenderError;
pub use markup::{escape_html, render_fragment};
