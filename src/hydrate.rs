use crate::{
    error::{Error, Result},
    store::Store,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Data field that carries the template name of a render.
pub const NAME_FIELD: &str = "_kx_draw_template_name";

/// Data field that carries the unique id of a render.
pub const ID_FIELD: &str = "_kx_draw_unique_id";

/// Root element attribute bound to [`NAME_FIELD`].
pub const NAME_ATTRIBUTE: &str = "data-kx-draw-name";

/// Root element attribute bound to [`ID_FIELD`].
pub const ID_ATTRIBUTE: &str = "data-kx-draw-id";

/// Client constructor the exported script hands the payload to.
pub const CLIENT_RUNTIME: &str = "KXDrawRender";

/// Return the output expression that renders the given data field.
///
/// # Examples
///
/// ```
/// use kx_draw::hydrate::{expression, NAME_FIELD};
///
/// assert_eq!(expression(NAME_FIELD), "{{_kx_draw_template_name}}");
/// ```
#[inline]
pub fn expression(field: &str) -> String {
    format!("{{{{{field}}}}}")
}

/// Everything a client needs to render the same views again.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Payload {
    /// Raw source of every template rendered with an id, by name.
    pub templates: BTreeMap<String, String>,
    /// Data of every stored render, by template name and id.
    pub data: BTreeMap<String, BTreeMap<String, Store>>,
    /// Raw source of every registered partial, by name.
    pub partials: BTreeMap<String, String>,
}

impl Payload {
    /// Serialize the payload as JSON that is safe to embed in a script element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        let json = serde_json::to_string(self).map_err(|source| Error::Json {
            context: "hydration payload".to_string(),
            source,
        })?;

        Ok(escape_script(&json))
    }

    /// Return a script element that installs the client runtime with this
    /// payload, or prints a notice to the console when the runtime is absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_script(&self) -> Result<String> {
        let json = self.to_json()?;

        Ok(format!(
            "<script type=\"text/javascript\">\n\
            if (typeof {CLIENT_RUNTIME} === \"function\") {{\n    \
                window.KXDraw = new {CLIENT_RUNTIME}({json});\n\
            }} else {{\n    \
                console.info(\n        \
                    \"%cKXDraw cannot hydrate views, the {CLIENT_RUNTIME} client runtime is not loaded.\",\n        \
                    \"color:yellow;background-color:crimson;padding:5px;line-height:160%\"\n    \
                );\n\
            }}\n\
            </script>"
        ))
    }
}

/// Escape sequences in serialized JSON that would end the enclosing script
/// element or a JavaScript string literal.
fn escape_script(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            c => escaped.push(c),
        }
    }

    escaped
}

#[cfg(test)]
mod tests {
    use super::{expression, Payload, ID_FIELD};
    use crate::store::Store;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn payload() -> Payload {
        let mut payload = Payload::default();
        payload
            .templates
            .insert("hello".to_string(), "<b>{{name}}</b>".to_string());
        payload.data.entry("hello".to_string()).or_default().insert(
            "100".to_string(),
            Store::new().with_must("name", "</script><b>&"),
        );

        payload
    }

    #[test]
    fn test_expression() {
        assert_eq!(expression(ID_FIELD), "{{_kx_draw_unique_id}}");
    }

    #[test]
    fn test_to_json_escapes_markup() {
        let json = payload().to_json().unwrap();

        assert!(!json.contains('<') && !json.contains('>') && !json.contains('&'));
        assert_eq!(
            serde_json::from_str::<Value>(&json).unwrap(),
            json!({
                "templates": { "hello": "<b>{{name}}</b>" },
                "data": { "hello": { "100": { "name": "</script><b>&" } } },
                "partials": {},
            })
        );
    }

    #[test]
    fn test_to_script() {
        let script = payload().to_script().unwrap();

        assert!(script.starts_with("<script type=\"text/javascript\">\n"));
        assert!(script.ends_with("</script>"));
        assert!(script.contains("if (typeof KXDrawRender === \"function\") {"));
        assert!(script.contains("window.KXDraw = new KXDrawRender({\"templates\":"));
        assert!(script.contains("console.info("));
        assert_eq!(script.matches("</script>").count(), 1);
    }
}
