//! Render surfaces: the live, caller-owned tree an export is taken from.
//!
//! A [`RenderSurface`] is a shared handle to a mounted [`RenderNode`] tree.
//! The export core only reads it, except inside a [`LayoutOverride`] scope
//! which forces the root to its natural height for the duration of a capture
//! and restores the previous declarations when dropped.

use crate::rendering::layout::layout_tree;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Attribute marking a node that must never appear in an export
pub const EXPORT_IGNORE_ATTR: &str = "data-export-ignore";

/// Ordered inline style declarations. Setting an existing property replaces
/// its value in place.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Style {
    declarations: Vec<(String, String)>,
}

impl Style {
    /// Parse an inline `style` attribute (`"width: 800px; color: #fff"`).
    pub fn parse(css: &str) -> Self {
        let mut style = Style::default();
        for decl in css.split(';') {
            if let Some((prop, value)) = decl.split_once(':') {
                let prop = prop.trim();
                let value = value.trim();
                if !prop.is_empty() && !value.is_empty() {
                    style.set(prop, value);
                }
            }
        }
        style
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.declarations
            .iter()
            .find(|(p, _)| p.eq_ignore_ascii_case(property))
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, property: &str, value: &str) {
        match self
            .declarations
            .iter_mut()
            .find(|(p, _)| p.eq_ignore_ascii_case(property))
        {
            Some(slot) => slot.1 = value.to_string(),
            None => self
                .declarations
                .push((property.to_ascii_lowercase(), value.to_string())),
        }
    }

    /// Remove a declaration, returning its previous value.
    pub fn remove(&mut self, property: &str) -> Option<String> {
        let idx = self
            .declarations
            .iter()
            .position(|(p, _)| p.eq_ignore_ascii_case(property))?;
        Some(self.declarations.remove(idx).1)
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.declarations.iter().map(|(p, v)| (p.as_str(), v.as_str()))
    }

    pub fn to_css(&self) -> String {
        self.declarations
            .iter()
            .map(|(p, v)| format!("{}: {}", p, v))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl From<String> for Style {
    fn from(css: String) -> Self {
        Style::parse(&css)
    }
}

impl From<Style> for String {
    fn from(style: Style) -> Self {
        style.to_css()
    }
}

/// A DOM-like node of a render tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderNode {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub style: Style,
    /// Text owned directly by this node (not by its children)
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub children: Vec<RenderNode>,
}

impl RenderNode {
    pub fn element(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn with_style(mut self, css: &str) -> Self {
        for (prop, value) in Style::parse(css).iter() {
            self.style.set(prop, value);
        }
        self
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_child(mut self, child: RenderNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn is_export_ignored(&self) -> bool {
        self.attributes.contains_key(EXPORT_IGNORE_ATTR)
    }

    /// Depth-first, pre-order visit of this node and all descendants.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a RenderNode)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut RenderNode)) {
        f(self);
        for child in &mut self.children {
            child.walk_mut(f);
        }
    }

    /// Number of nodes in this subtree, this node included.
    pub fn count(&self) -> usize {
        let mut n = 0;
        self.walk(&mut |_| n += 1);
        n
    }

    pub fn find_by_id(&self, id: &str) -> Option<&RenderNode> {
        if self.id() == Some(id) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_by_id(id))
    }

    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut RenderNode> {
        if self.id() == Some(id) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_by_id_mut(id))
    }

    /// Drop every descendant matching `exclude`, together with its subtree.
    /// Returns the number of subtrees removed. The node itself is kept.
    pub fn prune(&mut self, exclude: &dyn Fn(&RenderNode) -> bool) -> usize {
        let before = self.children.len();
        self.children.retain(|c| !exclude(c));
        let mut removed = before - self.children.len();
        for child in &mut self.children {
            removed += child.prune(exclude);
        }
        removed
    }

    /// Build a tree from HTML markup, rooted at `<body>`.
    #[cfg(feature = "html")]
    pub fn from_html(html: &str) -> Result<Self> {
        Self::from_html_at(html, "body")
    }

    /// Build a tree from HTML markup rooted at the first element matching
    /// `selector`. `<script>`, `<style>` and `<head>` content is skipped.
    #[cfg(feature = "html")]
    pub fn from_html_at(html: &str, selector: &str) -> Result<Self> {
        use scraper::{Html, Selector};

        let document = Html::parse_document(html);
        let sel = Selector::parse(selector)
            .map_err(|e| Error::Other(format!("Invalid selector '{}': {:?}", selector, e)))?;
        let root = document
            .select(&sel)
            .next()
            .ok_or_else(|| Error::CaptureError(format!("No element matches '{}'", selector)))?;
        Ok(convert_element(root))
    }
}

#[cfg(feature = "html")]
fn convert_element(el: scraper::ElementRef) -> RenderNode {
    let mut node = RenderNode::element(el.value().name());
    for (name, value) in el.value().attrs() {
        if name == "style" {
            node.style = Style::parse(value);
        } else {
            node.attributes.insert(name.to_string(), value.to_string());
        }
    }

    let mut text = String::new();
    for child in el.children() {
        match child.value() {
            scraper::Node::Text(t) => {
                for word in t.split_whitespace() {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(word);
                }
            }
            scraper::Node::Element(e) => {
                if matches!(e.name(), "script" | "style" | "head" | "template") {
                    continue;
                }
                if let Some(child_el) = scraper::ElementRef::wrap(child) {
                    node.children.push(convert_element(child_el));
                }
            }
            _ => {}
        }
    }
    node.text = text;
    node
}

struct SurfaceState {
    root: Option<RenderNode>,
    viewport_width: u32,
    origin: Option<String>,
}

/// A handle to a mounted render tree owned by the caller.
///
/// Cloning the handle shares the same tree.
#[derive(Clone)]
pub struct RenderSurface {
    inner: Arc<Mutex<SurfaceState>>,
}

impl std::fmt::Debug for RenderSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("RenderSurface")
            .field("mounted", &state.root.is_some())
            .field("viewport_width", &state.viewport_width)
            .field("origin", &state.origin)
            .finish()
    }
}

impl RenderSurface {
    pub fn new(root: RenderNode, viewport_width: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SurfaceState {
                root: Some(root),
                viewport_width,
                origin: None,
            })),
        }
    }

    #[cfg(feature = "html")]
    pub fn from_html(html: &str, viewport_width: u32) -> Result<Self> {
        Ok(Self::new(RenderNode::from_html(html)?, viewport_width))
    }

    /// Origin (`scheme://host[:port]`) the surface was served from. Assets
    /// from any other origin are cross-origin.
    pub fn with_origin(self, origin: &str) -> Self {
        self.state().origin = Some(origin.trim_end_matches('/').to_string());
        self
    }

    pub fn origin(&self) -> Option<String> {
        self.state().origin.clone()
    }

    pub fn viewport_width(&self) -> u32 {
        self.state().viewport_width
    }

    fn state(&self) -> MutexGuard<'_, SurfaceState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_mounted(&self) -> bool {
        self.state().root.is_some()
    }

    /// Detach the tree; later captures fail with a capture error.
    pub fn unmount(&self) -> Option<RenderNode> {
        self.state().root.take()
    }

    /// Deep copy of the current tree.
    pub fn snapshot(&self) -> Result<RenderNode> {
        self.state()
            .root
            .clone()
            .ok_or_else(|| Error::CaptureError("render surface is not mounted".into()))
    }

    /// Mutate the live tree.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut RenderNode),
    {
        let mut state = self.state();
        let root = state
            .root
            .as_mut()
            .ok_or_else(|| Error::CaptureError("render surface is not mounted".into()))?;
        f(root);
        Ok(())
    }

    /// Logical size in device-independent pixels, as currently laid out.
    pub fn logical_size(&self) -> Result<(u32, u32)> {
        let state = self.state();
        let root = state
            .root
            .as_ref()
            .ok_or_else(|| Error::CaptureError("render surface is not mounted".into()))?;
        let layout = layout_tree(root, state.viewport_width);
        Ok((layout.outer_width(), layout.outer_height()))
    }

    /// SHA-256 over the current layout geometry and text. Two equal digests
    /// taken some time apart mean layout has settled.
    pub fn layout_digest(&self) -> Result<String> {
        let state = self.state();
        let root = state
            .root
            .as_ref()
            .ok_or_else(|| Error::CaptureError("render surface is not mounted".into()))?;
        let layout = layout_tree(root, state.viewport_width);
        let mut hasher = Sha256::new();
        layout.walk(&mut |b| {
            hasher.update(b.rect.x.to_le_bytes());
            hasher.update(b.rect.y.to_le_bytes());
            hasher.update(b.rect.width.to_le_bytes());
            hasher.update(b.rect.height.to_le_bytes());
            for line in &b.lines {
                hasher.update(line.as_bytes());
            }
        });
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Properties forced on the root while capturing.
const OVERRIDES: [(&str, &str); 3] = [("height", "auto"), ("max-height", "none"), ("overflow", "visible")];

/// Scoped override forcing the surface root to its natural height.
///
/// The previous declarations are put back when the guard drops, whichever
/// way the capture ends.
pub struct LayoutOverride {
    surface: RenderSurface,
    saved: Vec<(&'static str, Option<String>)>,
}

impl LayoutOverride {
    pub fn acquire(surface: &RenderSurface) -> Result<Self> {
        let mut saved = Vec::with_capacity(OVERRIDES.len());
        surface.update(|root| {
            for (prop, value) in OVERRIDES {
                saved.push((prop, root.style.get(prop).map(str::to_string)));
                root.style.set(prop, value);
            }
        })?;
        log::debug!("layout override applied: {:?}", saved);
        Ok(Self {
            surface: surface.clone(),
            saved,
        })
    }
}

impl Drop for LayoutOverride {
    fn drop(&mut self) {
        let saved = std::mem::take(&mut self.saved);
        let restored = self.surface.update(|root| {
            for (prop, previous) in saved {
                match previous {
                    Some(value) => root.style.set(prop, &value),
                    None => {
                        root.style.remove(prop);
                    }
                }
            }
        });
        if restored.is_err() {
            log::debug!("surface unmounted before layout override could be restored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RenderNode {
        RenderNode::element("div")
            .with_attr("id", "root")
            .with_style("width: 400px; height: 100px; overflow: hidden")
            .with_child(RenderNode::element("p").with_text("Hello"))
            .with_child(
                RenderNode::element("button")
                    .with_attr(EXPORT_IGNORE_ATTR, "")
                    .with_text("PDF"),
            )
    }

    #[test]
    fn style_parse_set_and_remove() {
        let mut style = Style::parse("color: red; Width : 10px;;bogus");
        assert_eq!(style.get("color"), Some("red"));
        assert_eq!(style.get("width"), Some("10px"));
        style.set("COLOR", "blue");
        assert_eq!(style.get("color"), Some("blue"));
        assert_eq!(style.remove("width").as_deref(), Some("10px"));
        assert_eq!(style.to_css(), "color: blue");
    }

    #[test]
    fn prune_removes_flagged_subtrees() {
        let mut root = sample();
        let removed = root.prune(&|n: &RenderNode| n.is_export_ignored());
        assert_eq!(removed, 1);
        assert_eq!(root.count(), 2);
    }

    #[test]
    fn layout_override_restores_previous_declarations() {
        let surface = RenderSurface::new(sample(), 800);
        {
            let _guard = LayoutOverride::acquire(&surface).unwrap();
            let live = surface.snapshot().unwrap();
            assert_eq!(live.style.get("height"), Some("auto"));
            assert_eq!(live.style.get("overflow"), Some("visible"));
        }
        let live = surface.snapshot().unwrap();
        assert_eq!(live.style.get("height"), Some("100px"));
        assert_eq!(live.style.get("overflow"), Some("hidden"));
        assert_eq!(live.style.get("max-height"), None);
    }

    #[test]
    fn unmounted_surface_fails_snapshot() {
        let surface = RenderSurface::new(sample(), 800);
        surface.unmount();
        assert!(matches!(surface.snapshot(), Err(Error::CaptureError(_))));
        assert!(LayoutOverride::acquire(&surface).is_err());
    }

    #[test]
    fn layout_digest_tracks_changes() {
        let surface = RenderSurface::new(sample(), 800);
        let a = surface.layout_digest().unwrap();
        assert_eq!(a, surface.layout_digest().unwrap());
        surface
            .update(|root| root.children.push(RenderNode::element("p").with_text("late")))
            .unwrap();
        assert_ne!(a, surface.layout_digest().unwrap());
    }

    #[cfg(feature = "html")]
    #[test]
    fn from_html_collects_styles_text_and_children() {
        let html = r#"<html><head><title>T</title><style>p{}</style></head>
            <body><div id="result-view-container" style="width: 210px">
            <h1>Rio   de Janeiro</h1><p data-export-ignore>skip</p></div></body></html>"#;
        let root = RenderNode::from_html_at(html, "#result-view-container").unwrap();
        assert_eq!(root.tag, "div");
        assert_eq!(root.style.get("width"), Some("210px"));
        assert_eq!(root.children[0].text, "Rio de Janeiro");
        assert!(root.children[1].is_export_ignored());
    }
}
