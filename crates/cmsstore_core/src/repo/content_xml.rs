//! Serialization of published documents into the `content_xml` projection.

use crate::model::content::Content;

/// Renders one published document; an `Err` skips that document only.
pub trait ContentXmlSerializer {
    fn serialize(&self, content: &Content) -> Result<String, String>;
}

impl<F> ContentXmlSerializer for F
where
    F: Fn(&Content) -> Result<String, String>,
{
    fn serialize(&self, content: &Content) -> Result<String, String> {
        self(content)
    }
}

/// `<alias id=".." key=".." ...><property>value</property></alias>` rendering.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultXmlSerializer;

impl ContentXmlSerializer for DefaultXmlSerializer {
    fn serialize(&self, content: &Content) -> Result<String, String> {
        let id = content
            .id
            .ok_or_else(|| "document has no identity".to_string())?;
        let alias = if content.content_type_alias.is_empty() {
            "node"
        } else {
            content.content_type_alias.as_str()
        };

        let mut xml = format!(
            "<{alias} id=\"{id}\" key=\"{}\" parentID=\"{}\" level=\"{}\" sortOrder=\"{}\" \
             nodeName=\"{}\" path=\"{}\" version=\"{}\" updateDate=\"{}\">",
            content.key,
            content.parent_id,
            content.level,
            content.sort_order,
            escape(&content.name),
            content.path,
            content.version,
            content.update_date,
        );
        for property in content.properties.populated() {
            let value = property
                .value
                .as_ref()
                .map(|value| escape(&value.as_text()))
                .unwrap_or_default();
            xml.push_str(&format!("<{0}>{value}</{0}>", property.alias));
        }
        xml.push_str(&format!("</{alias}>"));
        Ok(xml)
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::escape;

    #[test]
    fn escape_replaces_markup_characters() {
        assert_eq!(escape("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
    }
}
