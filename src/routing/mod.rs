//! Routing seam between the dispatcher and the pattern-matching engine.
//!
//! - [`PatternRouter`] trait consumed by the dispatcher and the pattern binder
//! - [`RouteTarget`], [`RouteOptions`], [`RouteMatch`] rule data
//! - [`TemplateRouter`] in-memory reference implementation (`:param` templates)

mod router;
mod template;

pub use router::{PatternRouter, RouteMatch, RouteOptions, RouteTarget};
pub use template::TemplateRouter;
