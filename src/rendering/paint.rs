/// Paint command generation from a laid-out tree

use super::color::{parse_color, ColorError, Rgba};
use super::layout::{parse_px, LayoutNode, Rect};

const DEFAULT_SHADOW: Rgba = Rgba(0, 0, 0, 64);
const IMAGE_PLACEHOLDER: Rgba = Rgba(229, 231, 235, 255);

#[derive(Debug, Clone, PartialEq)]
pub enum PaintCommand {
    SolidRect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        rgba: Rgba,
    },
    /// A single line of text drawn as glyph cells from its top-left corner
    Text {
        x: i32,
        y: i32,
        text: String,
        font_size: u32,
        rgba: Rgba,
    },
    PushClip(Rect),
    PopClip,
}

/// Features the rasterizer drew even though the output may not match the
/// screen (shadows, filters, blend modes).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaintWarnings {
    pub ignored_effects: usize,
}

// Invalid values are dropped like any unknown declaration; unsupported
// color functions abort the paint.
fn lenient(value: &str) -> Result<Option<Rgba>, ColorError> {
    match parse_color(value) {
        Ok(c) => Ok(Some(c)),
        Err(ColorError::Invalid(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn color_of(value: Option<&str>) -> Result<Option<Rgba>, ColorError> {
    match value {
        None => Ok(None),
        Some(v) if v.trim().eq_ignore_ascii_case("none") || v.trim().eq_ignore_ascii_case("inherit") => Ok(None),
        Some(v) => lenient(v),
    }
}

/// `"4px 4px 12px rgba(0,0,0,.3)"` -> (dx, dy, color). Blur and spread are
/// not modelled; the shadow is a hard offset block.
fn parse_shadow(value: &str) -> Result<Option<(i32, i32, Rgba)>, ColorError> {
    let v = value.trim();
    if v.is_empty() || v.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let mut offsets = Vec::new();
    let mut color = DEFAULT_SHADOW;
    // Split on whitespace outside parentheses
    let mut depth = 0;
    let mut token = String::new();
    let mut tokens = Vec::new();
    for ch in v.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if ch.is_whitespace() && depth == 0 {
            if !token.is_empty() {
                tokens.push(std::mem::take(&mut token));
            }
        } else {
            token.push(ch);
        }
    }
    if !token.is_empty() {
        tokens.push(token);
    }
    for t in tokens {
        let signed = t.strip_prefix('-');
        if let Some(px) = parse_px(signed.unwrap_or(&t)) {
            let px = px as i32;
            offsets.push(if signed.is_some() { -px } else { px });
        } else if let Some(c) = lenient(&t)? {
            color = c;
        }
    }
    let dx = offsets.first().copied().unwrap_or(0);
    let dy = offsets.get(1).copied().unwrap_or(0);
    Ok(Some((dx, dy, color)))
}

fn border_color(layout: &LayoutNode) -> Result<Rgba, ColorError> {
    let style = &layout.node.style;
    if let Some(c) = color_of(style.get("border-color"))? {
        return Ok(c);
    }
    if let Some(shorthand) = style.get("border") {
        for token in shorthand.split_whitespace() {
            if parse_px(token).is_some() {
                continue;
            }
            if let Some(c) = lenient(token)? {
                return Ok(c);
            }
        }
    }
    Ok(Rgba::BLACK)
}

/// Produce paint commands for `layout`, back to front. `inherited` is the
/// text color of the parent.
pub fn paint_tree(
    layout: &LayoutNode,
    inherited: Rgba,
    warnings: &mut PaintWarnings,
) -> Result<Vec<PaintCommand>, ColorError> {
    let mut out = Vec::new();
    paint_node(layout, inherited, warnings, &mut out)?;
    Ok(out)
}

fn paint_node(
    layout: &LayoutNode,
    inherited: Rgba,
    warnings: &mut PaintWarnings,
    out: &mut Vec<PaintCommand>,
) -> Result<(), ColorError> {
    let style = &layout.node.style;
    let r = layout.rect;

    for effect in ["filter", "backdrop-filter"] {
        if style.get(effect).map(|v| !v.trim().eq_ignore_ascii_case("none")).unwrap_or(false) {
            warnings.ignored_effects += 1;
        }
    }
    if style
        .get("mix-blend-mode")
        .map(|v| !v.trim().eq_ignore_ascii_case("normal"))
        .unwrap_or(false)
    {
        warnings.ignored_effects += 1;
    }

    if let Some(shadow) = style.get("box-shadow") {
        if let Some((dx, dy, rgba)) = parse_shadow(shadow)? {
            out.push(PaintCommand::SolidRect { x: r.x + dx, y: r.y + dy, width: r.width, height: r.height, rgba });
        }
    }

    if style
        .get("background-image")
        .map(|v| v.contains("gradient("))
        .unwrap_or(false)
    {
        warnings.ignored_effects += 1;
    }

    if let Some(bg) = color_of(style.get("background-color"))? {
        if !bg.is_transparent() {
            out.push(PaintCommand::SolidRect { x: r.x, y: r.y, width: r.width, height: r.height, rgba: bg });
        }
    }
    if layout.node.tag == "img" {
        out.push(PaintCommand::SolidRect { x: r.x, y: r.y, width: r.width, height: r.height, rgba: IMAGE_PLACEHOLDER });
    }

    let bw = layout.box_model.border;
    if bw > 0 {
        let rgba = border_color(layout)?;
        let edges = [
            (r.x, r.y, r.width, bw),
            (r.x, r.bottom() - bw as i32, r.width, bw),
            (r.x, r.y, bw, r.height),
            (r.right() - bw as i32, r.y, bw, r.height),
        ];
        for (x, y, width, height) in edges {
            out.push(PaintCommand::SolidRect { x, y, width, height, rgba });
        }
    }

    let color = color_of(style.get("color"))?.unwrap_or(inherited);
    let line_h = layout.line_height() as i32;
    let text_shadow = match style.get("text-shadow") {
        Some(v) => parse_shadow(v)?,
        None => None,
    };
    for (i, line) in layout.lines.iter().enumerate() {
        let y = layout.content_y() + i as i32 * line_h;
        if let Some((dx, dy, rgba)) = text_shadow {
            out.push(PaintCommand::Text {
                x: layout.content_x() + dx,
                y: y + dy,
                text: line.clone(),
                font_size: layout.font_size,
                rgba,
            });
        }
        out.push(PaintCommand::Text {
            x: layout.content_x(),
            y,
            text: line.clone(),
            font_size: layout.font_size,
            rgba: color,
        });
    }

    if layout.clips_children {
        out.push(PaintCommand::PushClip(r));
    }
    for child in &layout.children {
        paint_node(child, color, warnings, out)?;
    }
    if layout.clips_children {
        out.push(PaintCommand::PopClip);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::layout::layout_tree;
    use crate::surface::RenderNode;

    #[test]
    fn background_border_and_text_in_order() {
        let root = RenderNode::element("div")
            .with_style("width: 100px; background-color: #ffffff; border: 2px solid #cccccc; color: #111111")
            .with_text("Hi");
        let layout = layout_tree(&root, 800);
        let mut warnings = PaintWarnings::default();
        let cmds = paint_tree(&layout, Rgba::BLACK, &mut warnings).unwrap();
        assert!(matches!(cmds[0], PaintCommand::SolidRect { rgba: Rgba::WHITE, .. }));
        assert!(matches!(cmds[1], PaintCommand::SolidRect { rgba: Rgba(0xcc, 0xcc, 0xcc, 255), .. }));
        match cmds.last().unwrap() {
            PaintCommand::Text { text, rgba, x, y, .. } => {
                assert_eq!(text, "Hi");
                assert_eq!(*rgba, Rgba(0x11, 0x11, 0x11, 255));
                assert_eq!((*x, *y), (2, 2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn box_shadow_paints_offset_block_first() {
        let root = RenderNode::element("div").with_style("height: 10px; box-shadow: 4px -2px 8px rgba(0, 0, 0, 0.5)");
        let layout = layout_tree(&root, 50);
        let cmds = paint_tree(&layout, Rgba::BLACK, &mut PaintWarnings::default()).unwrap();
        assert_eq!(
            cmds[0],
            PaintCommand::SolidRect { x: 4, y: -2, width: 50, height: 10, rgba: Rgba(0, 0, 0, 128) }
        );
    }

    #[test]
    fn unsupported_color_fails_paint() {
        let root = RenderNode::element("div").with_style("background-color: oklch(0.2 0.01 285)");
        let layout = layout_tree(&root, 50);
        let err = paint_tree(&layout, Rgba::BLACK, &mut PaintWarnings::default()).unwrap_err();
        assert!(matches!(err, ColorError::UnsupportedEncoding(_)));
    }

    #[test]
    fn hidden_overflow_wraps_children_in_clip() {
        let root = RenderNode::element("div")
            .with_style("height: 10px; overflow: hidden")
            .with_child(RenderNode::element("div").with_style("height: 40px; background-color: red"));
        let layout = layout_tree(&root, 50);
        let cmds = paint_tree(&layout, Rgba::BLACK, &mut PaintWarnings::default()).unwrap();
        assert_eq!(cmds.first(), Some(&PaintCommand::PushClip(Rect::new(0, 0, 50, 10))));
        assert_eq!(cmds.last(), Some(&PaintCommand::PopClip));
    }
}
