/// Block layout for render trees
///
/// Every node is a block stacked vertically inside its parent's content box.
/// Text wraps on word boundaries using fixed-width glyph cells
/// (`font-size / 2` wide, `font-size * 1.25` tall).

use crate::surface::RenderNode;

pub const DEFAULT_FONT_SIZE: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoxModel {
    pub margin: u32,
    pub border: u32,
    pub padding: u32,
}

/// A laid-out node: border box, resolved box model and wrapped text.
#[derive(Debug, Clone)]
pub struct LayoutNode<'a> {
    pub node: &'a RenderNode,
    /// Border box
    pub rect: Rect,
    pub box_model: BoxModel,
    pub font_size: u32,
    pub lines: Vec<String>,
    /// Set when `overflow: hidden` with a fixed height; children are clipped
    /// to the border box.
    pub clips_children: bool,
    pub children: Vec<LayoutNode<'a>>,
}

impl<'a> LayoutNode<'a> {
    pub fn content_x(&self) -> i32 {
        self.rect.x + (self.box_model.border + self.box_model.padding) as i32
    }

    pub fn content_y(&self) -> i32 {
        self.rect.y + (self.box_model.border + self.box_model.padding) as i32
    }

    pub fn content_width(&self) -> u32 {
        let inset = 2 * (self.box_model.border + self.box_model.padding);
        self.rect.width.saturating_sub(inset)
    }

    pub fn line_height(&self) -> u32 {
        line_height(self.font_size)
    }

    pub fn char_width(&self) -> f32 {
        char_width(self.font_size)
    }

    /// Width including margins
    pub fn outer_width(&self) -> u32 {
        self.rect.width + 2 * self.box_model.margin
    }

    /// Height including margins
    pub fn outer_height(&self) -> u32 {
        self.rect.height + 2 * self.box_model.margin
    }

    pub fn walk(&self, f: &mut impl FnMut(&LayoutNode<'a>)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }
}

pub fn char_width(font_size: u32) -> f32 {
    font_size as f32 / 2.0
}

pub fn line_height(font_size: u32) -> u32 {
    (font_size as f32 * 1.25).round() as u32
}

/// Parse a CSS pixel length (`"12px"`, `"12"`). `auto`, percentages and other
/// units yield `None`.
pub fn parse_px(value: &str) -> Option<u32> {
    let v = value.trim();
    let number = v.strip_suffix("px").unwrap_or(v).trim();
    number.parse::<f32>().ok().filter(|n| *n >= 0.0).map(|n| n.round() as u32)
}

fn first_px(value: Option<&str>) -> u32 {
    value
        .and_then(|v| v.split_whitespace().next())
        .and_then(parse_px)
        .unwrap_or(0)
}

/// Border width from `border-width`, falling back to the `border` shorthand.
pub fn border_width(node: &RenderNode) -> u32 {
    if let Some(w) = node.style.get("border-width") {
        return first_px(Some(w));
    }
    node.style
        .get("border")
        .map(|b| b.split_whitespace().find_map(parse_px).unwrap_or(0))
        .unwrap_or(0)
}

fn is_hidden(node: &RenderNode) -> bool {
    node.style
        .get("display")
        .map(|d| d.trim().eq_ignore_ascii_case("none"))
        .unwrap_or(false)
}

/// Word-wrap `text` into lines of at most `max_chars` characters.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut cur = String::new();
    for word in text.split_whitespace() {
        if !cur.is_empty() && cur.chars().count() + word.chars().count() + 1 > max_chars {
            lines.push(std::mem::take(&mut cur));
        }
        if !cur.is_empty() {
            cur.push(' ');
        }
        cur.push_str(word);
    }
    if !cur.is_empty() {
        lines.push(cur);
    }
    lines
}

/// Lay out a whole tree inside a viewport of `viewport_width` pixels.
/// The root is placed at its margin offset from the origin.
pub fn layout_tree(root: &RenderNode, viewport_width: u32) -> LayoutNode<'_> {
    let margin = first_px(root.style.get("margin"));
    let avail = root
        .style
        .get("width")
        .and_then(parse_px)
        .map(|w| w + 2 * margin)
        .unwrap_or(viewport_width);
    layout_node(root, 0, 0, avail, DEFAULT_FONT_SIZE)
}

fn layout_node(node: &RenderNode, x: i32, y: i32, avail_width: u32, parent_font: u32) -> LayoutNode<'_> {
    let style = &node.style;
    let box_model = BoxModel {
        margin: first_px(style.get("margin")),
        border: border_width(node),
        padding: first_px(style.get("padding")),
    };
    let font_size = style
        .get("font-size")
        .and_then(parse_px)
        .filter(|s| *s > 0)
        .unwrap_or(parent_font);

    let max_width = avail_width.saturating_sub(2 * box_model.margin);
    let width = style
        .get("width")
        .and_then(parse_px)
        .map(|w| w.min(max_width))
        .unwrap_or(max_width);

    let inset = box_model.border + box_model.padding;
    let content_width = width.saturating_sub(2 * inset);
    let chars_per_line = (content_width as f32 / char_width(font_size)).floor() as usize;
    let lines = wrap_text(&node.text, chars_per_line);

    let rect_x = x + box_model.margin as i32;
    let rect_y = y + box_model.margin as i32;
    let content_x = rect_x + inset as i32;
    let mut cursor = rect_y + inset as i32 + (lines.len() as u32 * line_height(font_size)) as i32;

    let mut children = Vec::with_capacity(node.children.len());
    for child in node.children.iter().filter(|c| !is_hidden(c)) {
        let laid = layout_node(child, content_x, cursor, content_width, font_size);
        cursor += laid.outer_height() as i32;
        children.push(laid);
    }

    let natural_height = (cursor - rect_y) as u32 + inset;
    let fixed_height = style.get("height").and_then(parse_px);
    let max_height = style.get("max-height").and_then(parse_px);
    let mut height = fixed_height.unwrap_or(natural_height);
    if let Some(max) = max_height {
        height = height.min(max);
    }
    let overflow_hidden = style
        .get("overflow")
        .map(|o| {
            let o = o.trim();
            o.eq_ignore_ascii_case("hidden") || o.eq_ignore_ascii_case("auto") || o.eq_ignore_ascii_case("scroll")
        })
        .unwrap_or(false);

    LayoutNode {
        node,
        rect: Rect::new(rect_x, rect_y, width, height),
        box_model,
        font_size,
        lines,
        clips_children: overflow_hidden && height < natural_height,
        children,
    }
}
