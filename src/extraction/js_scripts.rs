//! JavaScript evaluation scripts
//!
//! Scripts evaluated inside the page by [`ChromiumPage`](super::driver::ChromiumPage).

/// Serialize the visible DOM under `<body>` into a flat node list
///
/// Output is an array in document pre-order. Each entry is
/// `{p, t, a, x, w, h, b, r}`: parent index (-1 for the root), lowercase tag
/// or `#text`, selected attributes, text data, bounding box width/height,
/// bold flag and preformatted flag. Hidden subtrees are skipped and the walk
/// is capped so a runaway page cannot blow up the payload.
pub const SNAPSHOT_SCRIPT: &str = r#"
    (() => {
        const MAX_NODES = 60000;
        const SKIP = new Set(['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE', 'SVG', 'IFRAME']);
        const KEEP = new Set(['class', 'role', 'href', 'id', 'aria-label', 'style']);
        const out = [];
        const root = document.body;
        if (!root) return out;

        const attrsOf = (el) => {
            const a = {};
            for (const attr of el.attributes) {
                if (KEEP.has(attr.name) || attr.name.startsWith('data-')) {
                    a[attr.name] = attr.value;
                }
            }
            return a;
        };

        const stack = [[root, -1]];
        while (stack.length > 0 && out.length < MAX_NODES) {
            const [node, parent] = stack.pop();

            if (node.nodeType === Node.TEXT_NODE) {
                const data = node.data;
                if (data && data.trim().length > 0) {
                    const host = out[parent];
                    out.push({ p: parent, t: '#text', x: data, b: host ? host.b : false, r: host ? host.r : false });
                }
                continue;
            }
            if (node.nodeType !== Node.ELEMENT_NODE || SKIP.has(node.tagName.toUpperCase())) {
                continue;
            }

            const style = window.getComputedStyle(node);
            if (style.display === 'none' || style.visibility === 'hidden') {
                continue;
            }

            const rect = node.getBoundingClientRect();
            const weight = parseInt(style.fontWeight, 10);
            const ws = style.whiteSpace || '';
            const index = out.length;
            out.push({
                p: parent,
                t: node.tagName.toLowerCase(),
                a: attrsOf(node),
                w: rect.width,
                h: rect.height,
                b: (!isNaN(weight) && weight >= 600) || style.fontWeight === 'bold',
                r: ws.startsWith('pre') || node.tagName === 'PRE'
            });

            const children = node.childNodes;
            for (let i = children.length - 1; i >= 0; i--) {
                stack.push([children[i], index]);
            }
        }
        return out;
    })()
"#;

/// Current scroll geometry: `{scroll_height, scroll_y, viewport_height}`
pub const PAGE_METRICS_SCRIPT: &str = r#"
    (() => {
        const el = document.scrollingElement || document.documentElement;
        return {
            scroll_height: el ? el.scrollHeight : 0,
            scroll_y: window.scrollY || 0,
            viewport_height: window.innerHeight || 0
        };
    })()
"#;

/// Scroll to an absolute vertical offset
#[must_use]
pub fn scroll_to_script(y: f64) -> String {
    format!("(() => {{ window.scrollTo(0, {y}); return true; }})()")
}

/// Scroll past the bottom of the document by `margin` pixels
#[must_use]
pub fn scroll_to_bottom_script(margin: u32) -> String {
    format!(
        "(() => {{ const el = document.scrollingElement || document.documentElement; \
         window.scrollTo(0, (el ? el.scrollHeight : 0) + {margin}); return true; }})()"
    )
}

/// Scroll relative to the current position
#[must_use]
pub fn scroll_by_script(dy: f64) -> String {
    format!("(() => {{ window.scrollBy(0, {dy}); return true; }})()")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_scripts_embed_offsets() {
        assert!(scroll_to_script(0.0).contains("scrollTo(0, 0)"));
        assert!(scroll_to_bottom_script(1000).contains("+ 1000"));
        assert!(scroll_by_script(-600.0).contains("scrollBy(0, -600)"));
    }
}
