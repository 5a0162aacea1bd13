use crate::{
    error::{Error, Result},
    hydrate::{expression, ID_ATTRIBUTE, ID_FIELD, NAME_ATTRIBUTE, NAME_FIELD},
};
use html5ever::{
    parse_fragment,
    serialize::{serialize, SerializeOpts, TraversalScope},
    tendril::{StrTendril, TendrilSink},
    Attribute, LocalName, Namespace, ParseOpts, QualName,
};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use std::collections::BTreeSet;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Opens a placeholder that stands in for an expression while the markup
/// is parsed.
const OPEN: char = '\u{E000}';

/// Closes a placeholder.
const CLOSE: char = '\u{E001}';

/// Rewrite raw template text into a single root element that carries the
/// hydration attributes.
///
/// Expressions pass through unchanged, Handlebars comments are removed.
/// Whitespace and HTML comments around the root element are dropped.
///
/// # Errors
///
/// Returns [`Error::EmptyTemplate`] if the text holds no node,
/// [`Error::MultipleRootNodes`] if it holds several and
/// [`Error::InvalidRootNode`] if the only node is not an element.
///
/// # Examples
///
/// ```
/// use kx_draw::normalize;
///
/// assert_eq!(
///     normalize("hello", "<b>Hello {{name}}!</b>").unwrap(),
///     "<b data-kx-draw-name=\"{{_kx_draw_template_name}}\" \
///     data-kx-draw-id=\"{{_kx_draw_unique_id}}\">Hello {{name}}!</b>"
/// );
/// ```
pub fn normalize(name: &str, text: &str) -> Result<String> {
    let (masked, expressions) = mask(text);
    let dom = parse(&masked);
    if !dom.errors.is_empty() {
        tracing::trace!(
            template = name,
            errors = ?dom.errors,
            "markup parser recovered from errors"
        );
    }

    let container = dom
        .document
        .children
        .borrow()
        .first()
        .cloned()
        .ok_or_else(|| Error::EmptyTemplate(name.to_string()))?;
    let roots = container
        .children
        .borrow()
        .iter()
        .filter(|node| is_significant(node))
        .cloned()
        .collect::<Vec<_>>();

    let root = match roots.as_slice() {
        [] => return Err(Error::EmptyTemplate(name.to_string())),
        [root] => root,
        _ => {
            return Err(Error::MultipleRootNodes {
                name: name.to_string(),
                count: roots.len(),
            })
        }
    };
    let NodeData::Element { attrs, .. } = &root.data else {
        return Err(Error::InvalidRootNode(name.to_string()));
    };

    {
        let mut attrs = attrs.borrow_mut();
        set_attribute(&mut attrs, NAME_ATTRIBUTE, &expression(NAME_FIELD));
        set_attribute(&mut attrs, ID_ATTRIBUTE, &expression(ID_FIELD));
    }

    let mut names = BTreeSet::new();
    collect_masked_names(root, &mut names);

    let mut buffer = vec![];
    serialize(
        &mut buffer,
        &SerializableHandle::from(root.clone()),
        SerializeOpts {
            traversal_scope: TraversalScope::IncludeNode,
            ..Default::default()
        },
    )
    .map_err(Error::io(name))?;

    let mut serialized = String::from_utf8_lossy(&buffer).into_owned();
    for masked in names {
        serialized = serialized.replace(&format!(" {masked}=\"\""), &format!(" {masked}"));
    }

    Ok(restore(&serialized, &expressions))
}

/// Parse text as the content of a synthetic `template` element, which
/// accepts any element as a child.
fn parse(text: &str) -> RcDom {
    let context = QualName::new(
        None,
        Namespace::from(HTML_NAMESPACE),
        LocalName::from("template"),
    );

    parse_fragment(RcDom::default(), ParseOpts::default(), context, vec![]).one(text)
}

/// Return false for nodes that do not count as a root: whitespace and
/// comments.
fn is_significant(node: &Handle) -> bool {
    match &node.data {
        NodeData::Text { contents } => !contents
            .borrow()
            .trim_matches(|c: char| c.is_ascii_whitespace())
            .is_empty(),
        NodeData::Comment { .. } | NodeData::ProcessingInstruction { .. } => false,
        _ => true,
    }
}

/// Replace the value of the attribute, or append it.
fn set_attribute(attrs: &mut Vec<Attribute>, name: &str, value: &str) {
    match attrs
        .iter_mut()
        .find(|attr| attr.name.ns.is_empty() && &*attr.name.local == name)
    {
        Some(attr) => attr.value = StrTendril::from(value),
        None => attrs.push(Attribute {
            name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
            value: StrTendril::from(value),
        }),
    }
}

/// Collect the names of valueless attributes made of placeholders, such as
/// the one produced by `<div {{#if x}}hidden{{/if}}>`.
fn collect_masked_names(node: &Handle, names: &mut BTreeSet<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        for attr in attrs.borrow().iter() {
            if attr.value.is_empty() && attr.name.local.contains(OPEN) {
                names.insert(attr.name.local.to_string());
            }
        }
    }

    for child in node.children.borrow().iter() {
        collect_masked_names(child, names);
    }
}

/// Swap every expression for a placeholder and drop comments.
///
/// Returns the masked text and the expressions, indexed by placeholder.
/// An unterminated expression is left in place for the compiler to report.
fn mask(text: &str) -> (String, Vec<String>) {
    let mut masked = String::with_capacity(text.len());
    let mut expressions = vec![];
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        masked.push_str(&rest[..start]);
        let tail = &rest[start..];

        let Some(length) = expression_length(tail) else {
            masked.push_str(tail);
            return (masked, expressions);
        };

        let span = &tail[..length];
        if !is_comment(span) {
            masked.push(OPEN);
            masked.push_str(&expressions.len().to_string());
            masked.push(CLOSE);
            expressions.push(span.to_string());
        }
        rest = &tail[length..];
    }
    masked.push_str(rest);

    (masked, expressions)
}

/// Return the byte length of the expression at the start of the text.
fn expression_length(tail: &str) -> Option<usize> {
    let inner = tail[2..].trim_start_matches('~');
    let opened = tail.len() - inner.len();

    let (from, ends): (usize, &[&str]) = if inner.starts_with("!--") {
        (opened + 3, &["--}}", "--~}}"][..])
    } else if inner.starts_with('{') {
        (opened + 1, &["}}}", "}~}}"][..])
    } else {
        (opened, &["}}"][..])
    };

    ends.iter()
        .filter_map(|end| tail[from..].find(end).map(|at| from + at + end.len()))
        .min()
}

fn is_comment(span: &str) -> bool {
    span[2..].trim_start_matches('~').starts_with('!')
}

/// Put every expression back in place of its placeholder.
fn restore(text: &str, expressions: &[String]) -> String {
    let mut restored = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(OPEN) {
        restored.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len_utf8()..];

        let found = after.find(CLOSE).and_then(|end| {
            let index = after[..end].parse::<usize>().ok()?;
            Some((end, expressions.get(index)?))
        });
        match found {
            Some((end, expression)) => {
                restored.push_str(expression);
                rest = &after[end + CLOSE.len_utf8()..];
            }
            None => {
                restored.push(OPEN);
                rest = after;
            }
        }
    }
    restored.push_str(rest);

    restored
}

#[cfg(test)]
mod tests {
    use super::{mask, normalize, restore};
    use crate::error::Error;
    use pretty_assertions::assert_eq;

    const ATTRIBUTES: &str =
        r#"data-kx-draw-name="{{_kx_draw_template_name}}" data-kx-draw-id="{{_kx_draw_unique_id}}""#;

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize("hello", "<b>Hello {{> shared/name}}!</b>").unwrap(),
            format!("<b {ATTRIBUTES}>Hello {{{{> shared/name}}}}!</b>")
        );
    }

    #[test]
    fn test_normalize_surrounding_whitespace() {
        assert_eq!(
            normalize("page", "\n  <!-- header -->\n  <section>\n    <p>{{title}}</p>\n  </section>\n")
                .unwrap(),
            format!("<section {ATTRIBUTES}>\n    <p>{{{{title}}}}</p>\n  </section>")
        );
    }

    #[test]
    fn test_normalize_symbol_sequences() {
        let sequences = [
            ("{{name}}", "{{name}}"),
            ("{{{html}}}", "{{{html}}}"),
            ("{{&html}}", "{{&html}}"),
            ("{{> shared/name}}", "{{> shared/name}}"),
            ("{{> 'quoted name' context}}", "{{> 'quoted name' context}}"),
            (
                "{{#if a}}x{{else if b}}y{{else}}z{{/if}}",
                "{{#if a}}x{{else if b}}y{{else}}z{{/if}}",
            ),
            (
                "{{#each items}}{{@index}}: {{this}}{{/each}}",
                "{{#each items}}{{@index}}: {{this}}{{/each}}",
            ),
            ("{{#with user}}{{../title}}{{/with}}", "{{#with user}}{{../title}}{{/with}}"),
            ("{{\"a<b>&c\"}}", "{{\"a<b>&c\"}}"),
            ("{{~ trimmed ~}}", "{{~ trimmed ~}}"),
            ("{{~{raw}~}}", "{{~{raw}~}}"),
            ("{{@root.user.name}}", "{{@root.user.name}}"),
            ("{{x}}}}", "{{x}}}}"),
            ("{ {} }", "{ {} }"),
            ("a < b && c > d", "a &lt; b &amp;&amp; c &gt; d"),
            ("&amp; {{a}} &lt;", "&amp; {{a}} &lt;"),
        ];

        for (sequence, expected) in sequences {
            assert_eq!(
                normalize("test", &format!("<p>{sequence}</p>")).unwrap(),
                format!("<p {ATTRIBUTES}>{expected}</p>"),
                "{sequence}"
            );
        }
    }

    #[test]
    fn test_normalize_attribute_values() {
        let sequences = [
            "{{url}}",
            "{{#if active}}on{{else}}off{{/if}}",
            "/users/{{id}}?tab={{tab}}",
            "{{> 'quoted'}}",
            "{{{raw}}}",
        ];

        for sequence in sequences {
            let text = format!("<a href=\"{sequence}\">link</a>");
            let expected = format!("<a href=\"{sequence}\" {ATTRIBUTES}>link</a>");

            assert_eq!(normalize("test", &text).unwrap(), expected, "{sequence}");
        }
    }

    #[test]
    fn test_normalize_attribute_names() {
        assert_eq!(
            normalize("test", "<div {{#if hidden}}hidden{{/if}} class=\"x\"></div>").unwrap(),
            format!("<div {{{{#if hidden}}}}hidden{{{{/if}}}} class=\"x\" {ATTRIBUTES}></div>")
        );
        assert_eq!(
            normalize("test", "<input {{attributes}}>").unwrap(),
            format!("<input {{{{attributes}}}} {ATTRIBUTES}>")
        );
    }

    #[test]
    fn test_normalize_replaces_attributes() {
        assert_eq!(
            normalize("test", "<div data-kx-draw-id=\"7\" class=\"c\"></div>").unwrap(),
            "<div data-kx-draw-id=\"{{_kx_draw_unique_id}}\" class=\"c\" \
            data-kx-draw-name=\"{{_kx_draw_template_name}}\"></div>"
        );
    }

    #[test]
    fn test_normalize_drops_comments() {
        assert_eq!(
            normalize("test", "{{! note }}<p>{{!-- {{ignored}} --}}{{a}}</p>").unwrap(),
            format!("<p {ATTRIBUTES}>{{{{a}}}}</p>")
        );
    }

    #[test]
    fn test_normalize_table_row() {
        assert_eq!(
            normalize("row", "<tr><td>{{name}}</td></tr>").unwrap(),
            format!("<tr {ATTRIBUTES}><td>{{{{name}}}}</td></tr>")
        );
    }

    #[test]
    fn test_normalize_empty() {
        for text in ["", "  \n\t", "<!-- nothing -->", "{{! only a comment }}"] {
            assert!(
                matches!(normalize("empty", text), Err(Error::EmptyTemplate(name)) if name == "empty"),
                "{text:?}"
            );
        }
    }

    #[test]
    fn test_normalize_multiple_roots() {
        let cases = [
            ("<a></a><b></b>", 2),
            ("<a></a>\n<b></b>\n<i></i>", 3),
            ("<a></a> trailing", 2),
            ("{{#if x}}<a></a>{{/if}}", 3),
        ];

        for (text, expected) in cases {
            assert!(
                matches!(
                    normalize("many", text),
                    Err(Error::MultipleRootNodes { count, .. }) if count == expected
                ),
                "{text:?}"
            );
        }
    }

    #[test]
    fn test_normalize_invalid_root() {
        for text in ["just text", "{{name}}", "  {{> partial}}  "] {
            assert!(
                matches!(normalize("bare", text), Err(Error::InvalidRootNode(name)) if name == "bare"),
                "{text:?}"
            );
        }
    }

    #[test]
    fn test_mask_restore() {
        let (masked, expressions) = mask("<p a=\"{{x}}\">{{{y}}}{{!z}}{{unterminated");

        assert_eq!(expressions, vec!["{{x}}", "{{{y}}}"]);
        assert!(!masked.contains("{{x}}") && masked.ends_with("{{unterminated"));
        assert_eq!(
            restore(&masked, &expressions),
            "<p a=\"{{x}}\">{{{y}}}{{unterminated"
        );
    }
}
