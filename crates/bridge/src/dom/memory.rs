//! In-memory element tree.

use std::sync::LazyLock;

use canvas_protocol::clamp::clamp_str;
use regex::Regex;

use super::selector::{Combinator, Complex, Compound, Selector};
use super::{Document, NodeId, NodeSnapshot};
use crate::config::MAX_SNAPSHOT_CLASS;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

#[derive(Debug, Clone)]
enum NodeKind {
	Element {
		tag: String,
		attrs: Vec<(String, String)>,
		style: Vec<(String, String)>,
	},
	Text(String),
	/// Markup written through `set_html`, kept verbatim and never interpreted.
	Markup(String),
}

#[derive(Debug, Clone)]
struct Node {
	kind: NodeKind,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
}

/// Arena-backed [`Document`] used by in-process surfaces and tests.
#[derive(Debug, Clone)]
pub struct MemoryDocument {
	href: String,
	nodes: Vec<Node>,
	/// Released slots, reused before the arena grows.
	free: Vec<NodeId>,
	root: NodeId,
	body: NodeId,
}

impl MemoryDocument {
	/// `<html><head><title></title></head><body></body></html>` at `href`.
	pub fn new(href: impl Into<String>) -> Self {
		let mut doc = Self {
			href: href.into(),
			nodes: Vec::new(),
			free: Vec::new(),
			root: 0,
			body: 0,
		};
		doc.reset();
		doc
	}

	/// A placeholder page describing `href`, standing in for remote content.
	pub fn for_url(href: impl Into<String>) -> Self {
		let mut doc = Self::new(href);
		doc.fill_placeholder();
		doc
	}

	fn reset(&mut self) {
		self.nodes.clear();
		self.free.clear();
		self.root = self.push(None, element("html"));
		let head = self.append_element(self.root, "head", &[]);
		self.append_element(head, "title", &[]);
		self.body = self.append_element(self.root, "body", &[]);
	}

	fn fill_placeholder(&mut self) {
		let href = self.href.clone();
		let host = url::Url::parse(&href)
			.ok()
			.and_then(|u| u.host_str().map(str::to_string))
			.unwrap_or_else(|| href.clone());
		if let Some(title) = self.first_tag("title") {
			self.set_text(title, &host);
		}
		let main = self.append_element(self.body, "main", &[("id", "content")]);
		let h1 = self.append_element(main, "h1", &[]);
		self.append_text(h1, &host);
		let p = self.append_element(main, "p", &[("class", "url")]);
		self.append_text(p, &href);
	}

	fn first_tag(&self, tag: &str) -> Option<NodeId> {
		self.elements().find(|id| self.tag(*id) == Some(tag))
	}

	pub fn root(&self) -> NodeId {
		self.root
	}

	pub fn body(&self) -> NodeId {
		self.body
	}

	/// Appends an element under `parent` and returns it.
	pub fn append_element(&mut self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
		let mut kind = element(tag);
		if let NodeKind::Element { attrs: a, .. } = &mut kind {
			*a = attrs.iter().map(|(k, v)| (k.to_ascii_lowercase(), v.to_string())).collect();
		}
		self.push(Some(parent), kind)
	}

	pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
		self.push(Some(parent), NodeKind::Text(text.to_string()))
	}

	/// Attribute value on an element, if present.
	pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
		match &self.nodes.get(node)?.kind {
			NodeKind::Element { attrs, .. } => attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str()),
			_ => None,
		}
	}

	/// Inline style property, if set.
	pub fn style(&self, node: NodeId, name: &str) -> Option<&str> {
		match &self.nodes.get(node)?.kind {
			NodeKind::Element { style, .. } => style.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str()),
			_ => None,
		}
	}

	/// Nodes currently attached to the tree.
	pub fn node_count(&self) -> usize {
		self.nodes.len() - self.free.len()
	}

	/// Slots allocated so far, live or free.
	pub fn capacity(&self) -> usize {
		self.nodes.len()
	}

	fn push(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
		let node = Node {
			kind,
			parent,
			children: Vec::new(),
		};
		let id = match self.free.pop() {
			Some(id) => {
				self.nodes[id] = node;
				id
			}
			None => {
				self.nodes.push(node);
				self.nodes.len() - 1
			}
		};
		if let Some(parent) = parent {
			self.nodes[parent].children.push(id);
		}
		id
	}

	fn tag(&self, node: NodeId) -> Option<&str> {
		match &self.nodes.get(node)?.kind {
			NodeKind::Element { tag, .. } => Some(tag.as_str()),
			_ => None,
		}
	}

	/// Elements reachable from the root, in document order.
	fn elements(&self) -> impl Iterator<Item = NodeId> + '_ {
		let mut stack = vec![self.root];
		std::iter::from_fn(move || {
			while let Some(id) = stack.pop() {
				let node = &self.nodes[id];
				stack.extend(node.children.iter().rev().copied());
				if matches!(node.kind, NodeKind::Element { .. }) {
					return Some(id);
				}
			}
			None
		})
	}

	/// Detaches every descendant of `node` and returns their slots to the
	/// free list.
	fn clear_children(&mut self, node: NodeId) {
		let mut pending = std::mem::take(&mut self.nodes[node].children);
		while let Some(id) = pending.pop() {
			let released = std::mem::replace(
				&mut self.nodes[id],
				Node {
					kind: NodeKind::Text(String::new()),
					parent: None,
					children: Vec::new(),
				},
			);
			pending.extend(released.children);
			self.free.push(id);
		}
	}

	fn set_attr_raw(&mut self, node: NodeId, name: &str, value: String) {
		if let NodeKind::Element { attrs, .. } = &mut self.nodes[node].kind {
			match attrs.iter_mut().find(|(k, _)| k == name) {
				Some((_, v)) => *v = value,
				None => attrs.push((name.to_string(), value)),
			}
		}
	}

	fn class_tokens(&self, node: NodeId) -> Vec<String> {
		self.attr(node, "class")
			.map(|c| c.split_whitespace().map(str::to_string).collect())
			.unwrap_or_default()
	}

	fn matches_compound(&self, node: NodeId, compound: &Compound) -> bool {
		let Some(tag) = self.tag(node) else {
			return false;
		};
		if compound.tag.as_deref().is_some_and(|t| t != tag) {
			return false;
		}
		if compound.id.as_deref().is_some_and(|id| self.attr(node, "id") != Some(id)) {
			return false;
		}
		if !compound.classes.is_empty() {
			let classes = self.class_tokens(node);
			if !compound.classes.iter().all(|c| classes.contains(c)) {
				return false;
			}
		}
		compound.attrs.iter().all(|a| match (self.attr(node, &a.name), &a.value) {
			(None, _) => false,
			(Some(_), None) => true,
			(Some(actual), Some(expected)) => actual == expected,
		})
	}

	fn matches_from(&self, node: NodeId, parts: &[(Combinator, Compound)], idx: usize) -> bool {
		let (combinator, compound) = &parts[idx];
		if !self.matches_compound(node, compound) {
			return false;
		}
		if idx == 0 {
			return true;
		}
		match combinator {
			Combinator::Child => self.nodes[node]
				.parent
				.is_some_and(|parent| self.matches_from(parent, parts, idx - 1)),
			Combinator::Descendant => {
				let mut cursor = self.nodes[node].parent;
				while let Some(ancestor) = cursor {
					if self.matches_from(ancestor, parts, idx - 1) {
						return true;
					}
					cursor = self.nodes[ancestor].parent;
				}
				false
			}
		}
	}

	fn matches(&self, node: NodeId, selector: &Selector) -> bool {
		selector
			.alternatives
			.iter()
			.any(|Complex { parts }| !parts.is_empty() && self.matches_from(node, parts, parts.len() - 1))
	}

	fn write_text(&self, node: NodeId, out: &mut String) {
		match &self.nodes[node].kind {
			NodeKind::Text(text) => out.push_str(text),
			NodeKind::Markup(markup) => out.push_str(&TAG_RE.replace_all(markup, "")),
			NodeKind::Element { .. } => {
				for child in &self.nodes[node].children {
					self.write_text(*child, out);
				}
			}
		}
	}

	fn write_html(&self, node: NodeId, out: &mut String) {
		match &self.nodes[node].kind {
			NodeKind::Text(text) => out.push_str(&escape(text, false)),
			NodeKind::Markup(markup) => out.push_str(markup),
			NodeKind::Element { tag, attrs, .. } => {
				out.push('<');
				out.push_str(tag);
				for (k, v) in attrs {
					out.push(' ');
					out.push_str(k);
					out.push_str("=\"");
					out.push_str(&escape(v, true));
					out.push('"');
				}
				out.push('>');
				for child in &self.nodes[node].children {
					self.write_html(*child, out);
				}
				out.push_str("</");
				out.push_str(tag);
				out.push('>');
			}
		}
	}
}

fn element(tag: &str) -> NodeKind {
	NodeKind::Element {
		tag: tag.to_ascii_lowercase(),
		attrs: Vec::new(),
		style: Vec::new(),
	}
}

fn escape(s: &str, attribute: bool) -> String {
	let mut out = String::with_capacity(s.len());
	for c in s.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' if attribute => out.push_str("&quot;"),
			c => out.push(c),
		}
	}
	out
}

impl Document for MemoryDocument {
	fn href(&self) -> String {
		self.href.clone()
	}

	fn navigate(&mut self, href: &str) {
		self.href = href.to_string();
		self.reset();
		self.fill_placeholder();
	}

	fn query(&self, selector: &Selector) -> Option<NodeId> {
		self.elements().find(|id| self.matches(*id, selector))
	}

	fn query_all(&self, selector: &Selector, limit: usize) -> Vec<NodeId> {
		self.elements().filter(|id| self.matches(*id, selector)).take(limit).collect()
	}

	fn snapshot(&self, node: NodeId) -> NodeSnapshot {
		NodeSnapshot {
			tag: self.tag(node).unwrap_or_default().to_string(),
			id: self.attr(node, "id").unwrap_or_default().to_string(),
			class: clamp_str(self.attr(node, "class").unwrap_or_default(), MAX_SNAPSHOT_CLASS),
		}
	}

	fn text(&self, node: NodeId) -> String {
		let mut out = String::new();
		self.write_text(node, &mut out);
		out
	}

	fn inner_html(&self, node: NodeId) -> String {
		let mut out = String::new();
		for child in &self.nodes[node].children {
			self.write_html(*child, &mut out);
		}
		out
	}

	fn value(&self, node: NodeId) -> String {
		self.attr(node, "value").unwrap_or_default().to_string()
	}

	fn set_text(&mut self, node: NodeId, text: &str) {
		self.clear_children(node);
		if !text.is_empty() {
			self.append_text(node, text);
		}
	}

	fn set_html(&mut self, node: NodeId, markup: &str) {
		self.clear_children(node);
		if !markup.is_empty() {
			self.push(Some(node), NodeKind::Markup(markup.to_string()));
		}
	}

	fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
		self.set_attr_raw(node, &name.to_ascii_lowercase(), value.to_string());
	}

	fn add_class(&mut self, node: NodeId, class: &str) {
		let mut tokens = self.class_tokens(node);
		if !tokens.iter().any(|t| t == class) {
			tokens.push(class.to_string());
			self.set_attr_raw(node, "class", tokens.join(" "));
		}
	}

	fn remove_class(&mut self, node: NodeId, class: &str) {
		let mut tokens = self.class_tokens(node);
		let before = tokens.len();
		tokens.retain(|t| t != class);
		if tokens.len() != before {
			self.set_attr_raw(node, "class", tokens.join(" "));
		}
	}

	fn set_style(&mut self, node: NodeId, name: &str, value: &str) {
		let rendered = {
			let NodeKind::Element { style, .. } = &mut self.nodes[node].kind else {
				return;
			};
			style.retain(|(k, _)| k != name);
			if !value.is_empty() {
				style.push((name.to_string(), value.to_string()));
			}
			style.iter().map(|(k, v)| format!("{k}: {v};")).collect::<Vec<_>>().join(" ")
		};
		self.set_attr_raw(node, "style", rendered);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample() -> (MemoryDocument, NodeId, NodeId) {
		let mut doc = MemoryDocument::new("https://example.com/");
		let body = doc.body();
		let list = doc.append_element(body, "ul", &[("id", "items"), ("class", "list dark")]);
		let first = doc.append_element(list, "li", &[("class", "item"), ("data-n", "1")]);
		doc.append_text(first, "one");
		let second = doc.append_element(list, "li", &[("class", "item"), ("data-n", "2")]);
		doc.append_text(second, "two & more");
		(doc, list, second)
	}

	fn sel(s: &str) -> Selector {
		Selector::parse(s).unwrap()
	}

	#[test]
	fn query_matches_in_document_order() {
		let (doc, list, second) = sample();
		assert_eq!(doc.query(&sel("#items")), Some(list));
		assert_eq!(doc.query(&sel("li[data-n=2]")), Some(second));
		assert_eq!(doc.query_all(&sel("ul > li.item"), 100).len(), 2);
		assert_eq!(doc.query_all(&sel("body li"), 1).len(), 1);
		assert_eq!(doc.query(&sel("html > li")), None);
		assert_eq!(doc.query_all(&sel("p, li"), 100).len(), 2);
	}

	#[test]
	fn snapshot_reports_tag_id_class() {
		let (doc, list, _) = sample();
		let snap = doc.snapshot(list);
		assert_eq!(snap.tag, "ul");
		assert_eq!(snap.id, "items");
		assert_eq!(snap.class, "list dark");
	}

	#[test]
	fn text_and_html_serialize_children() {
		let (doc, list, _) = sample();
		assert_eq!(doc.text(list), "onetwo & more");
		assert!(doc.inner_html(list).contains("<li class=\"item\" data-n=\"2\">two &amp; more</li>"));
	}

	#[test]
	fn set_html_stores_markup_inert() {
		let (mut doc, list, _) = sample();
		doc.set_html(list, "<li onclick=\"steal()\">x</li><script>alert(1)</script>");
		assert_eq!(doc.inner_html(list), "<li onclick=\"steal()\">x</li><script>alert(1)</script>");
		assert_eq!(doc.text(list), "xalert(1)");
		// Markup is not parsed into elements.
		assert_eq!(doc.query(&sel("li")), None);
	}

	#[test]
	fn class_and_style_mutations() {
		let (mut doc, list, _) = sample();
		doc.add_class(list, "wide");
		doc.add_class(list, "wide");
		doc.remove_class(list, "dark");
		assert_eq!(doc.attr(list, "class"), Some("list wide"));

		doc.set_style(list, "color", "red");
		doc.set_style(list, "margin", "0");
		assert_eq!(doc.style(list, "color"), Some("red"));
		assert_eq!(doc.attr(list, "style"), Some("color: red; margin: 0;"));
	}

	#[test]
	fn replaced_children_are_recycled() {
		let (mut doc, list, _) = sample();
		let capacity = doc.capacity();
		for i in 0..10_000 {
			if i % 2 == 0 {
				doc.set_html(list, "<b>x</b>");
			} else {
				doc.set_text(list, "plain");
			}
		}
		assert!(doc.capacity() <= capacity, "arena grew from {capacity} to {}", doc.capacity());
		assert_eq!(doc.text(list), "plain");

		// Released subtrees are reused for new elements too.
		let live = doc.node_count();
		let item = doc.append_element(list, "li", &[("class", "again")]);
		doc.append_text(item, "back");
		assert_eq!(doc.node_count(), live + 2);
		assert_eq!(doc.query(&sel("li.again")), Some(item));
		assert_eq!(doc.text(list), "plainback");
	}

	#[test]
	fn navigate_replaces_content() {
		let (mut doc, _, _) = sample();
		doc.navigate("https://other.example/path");
		assert_eq!(doc.href(), "https://other.example/path");
		assert_eq!(doc.query(&sel("#items")), None);
		let h1 = doc.query(&sel("main#content h1")).unwrap();
		assert_eq!(doc.text(h1), "other.example");
	}
}
