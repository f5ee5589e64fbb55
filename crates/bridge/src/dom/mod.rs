//! Document access for the nested content.
//!
//! The bridge never hands the Host a node reference; handlers resolve a
//! selector to a [`NodeId`], act on it, and reply with a [`NodeSnapshot`].

mod memory;
mod selector;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

pub use memory::MemoryDocument;
pub use selector::{AttrSelector, Combinator, Complex, Compound, Selector, SelectorError};

/// Handle to an element inside one [`Document`].
pub type NodeId = usize;

/// The only view of an element that ever leaves the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
	pub tag: String,
	pub id: String,
	pub class: String,
}

/// Element tree the bridge operates on.
///
/// Mutations are plain setters; all validation and clamping happens in the
/// bridge handlers before they get here.
pub trait Document: Send {
	fn href(&self) -> String;

	/// Replaces the content with whatever lives at `href`.
	fn navigate(&mut self, href: &str);

	/// First element matching `selector` in document order.
	fn query(&self, selector: &Selector) -> Option<NodeId>;

	/// Up to `limit` matching elements in document order.
	fn query_all(&self, selector: &Selector, limit: usize) -> Vec<NodeId>;

	fn snapshot(&self, node: NodeId) -> NodeSnapshot;
	fn text(&self, node: NodeId) -> String;
	fn inner_html(&self, node: NodeId) -> String;
	fn value(&self, node: NodeId) -> String;

	fn set_text(&mut self, node: NodeId, text: &str);

	/// Replaces the element's children with `markup`. The markup is stored
	/// inert: nothing in it is ever executed.
	fn set_html(&mut self, node: NodeId, markup: &str);

	fn set_attr(&mut self, node: NodeId, name: &str, value: &str);
	fn add_class(&mut self, node: NodeId, class: &str);
	fn remove_class(&mut self, node: NodeId, class: &str);
	fn set_style(&mut self, node: NodeId, name: &str, value: &str);
}

/// A document shared between the bridge and whoever embeds it.
pub type SharedDocument = Arc<Mutex<dyn Document>>;

/// Wraps a document for sharing.
pub fn shared<D: Document + 'static>(document: D) -> Arc<Mutex<D>> {
	Arc::new(Mutex::new(document))
}
