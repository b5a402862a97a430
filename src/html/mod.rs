//! Lenient HTML parsing into a queryable element tree.

pub mod dom;
pub mod parsing;

pub use dom::{AttrMatch, Document, Element, NodeId, Query, DOCUMENT_NAME};
pub use parsing::{parse, tokenize, Token, TreeBuilder};
