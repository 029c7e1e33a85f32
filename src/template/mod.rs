//! Shared fragments and include resolution
//!
//! Fragments that appear on many pages are registered once in a
//! [`FragmentRegistry`] and pulled into other fragments with an include tag.
//! Included fragments see the caller's parameters, with the include's own
//! bindings layered on top.
//!
//! # Example
//!
//! ```text
//! {{! settlements.html }}
//! <p>Trades settle {{settlement | "immediately"}}.</p>
//!
//! {{! a page fragment }}
//! <h2>{{brokerage_name}}</h2>
//! {{> settlements settlement="at end of day"}}
//! ```

mod registry;
mod resolver;

pub use registry::{FragmentDefinition, FragmentRegistry, TemplateError};
pub use resolver::{resolve_includes, resolve_with_context, ResolutionContext};
