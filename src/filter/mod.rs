//! Structural filter stages.
//!
//! Every filter wraps exactly one downstream [`ContentHandler`] and exposes it
//! through `get_ref`, `get_mut` and `into_inner`.
//!
//! | Filter | Effect |
//! |---|---|
//! | [`ElementFilter`] | subtree extraction (target or container element) |
//! | [`BodyOnlyFilter`] | strips document events and optionally the root element |
//! | [`NamespaceRemovingFilter`] | moves everything to the empty namespace |
//! | [`NamespacedContentsRemovingFilter`] | drops namespaced subtrees and attributes |
//! | [`EmptyElementFilter`] | elides elements without content |
//! | [`PrettyPrintFilter`] | indents the stream |
//! | [`PlaceholderFilter`] | substitutes `${key}` placeholders |
//! | [`ExceptionCatchingFilter`] | maps downstream errors |
//!
//! [`ContentHandler`]: crate::handler::ContentHandler

pub mod body;
pub mod catching;
pub mod element;
pub mod empty;
pub mod namespace;
pub mod placeholder;
pub mod pretty;

pub use body::BodyOnlyFilter;
pub use catching::ExceptionCatchingFilter;
pub use element::{ElementFilter, ElementFilterOptions, ElementSelector, ExtractMode};
pub use empty::{
    BufferingEmptyElementFilter, DeferringEmptyElementFilter, EmptyElementFilter,
    EmptyElementPolicy,
};
pub use namespace::{NamespaceRemovingFilter, NamespacedContentsRemovingFilter};
pub use placeholder::{PlaceholderFilter, PlaceholderOptions, PropertySource};
pub use pretty::{PrettyPrintFilter, PrettyPrintOptions};
