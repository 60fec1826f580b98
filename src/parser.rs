//! Turns raw model replies into strings or typed values.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::error::ParseError;

/// Passes the reply through with surrounding whitespace removed.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrOutputParser;

impl StrOutputParser {
    /// Trims the reply.
    pub fn parse(&self, text: &str) -> String {
        text.trim().to_string()
    }
}

/// Name and description of one field the model must return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// JSON key.
    pub name: &'static str,
    /// What the value should contain.
    pub description: &'static str,
}

impl FieldSpec {
    /// Builds a field description.
    pub const fn new(name: &'static str, description: &'static str) -> Self {
        Self { name, description }
    }
}

/// Parses a JSON object out of the reply and deserializes it into `T`.
#[derive(Debug, Clone)]
pub struct JsonOutputParser<T> {
    fields: Vec<FieldSpec>,
    _target: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> JsonOutputParser<T> {
    /// Builds a parser for an object with the given fields.
    pub fn new(fields: &[FieldSpec]) -> Self {
        Self {
            fields: fields.to_vec(),
            _target: PhantomData,
        }
    }

    /// Instructions appended to prompts so the model answers in the expected shape.
    pub fn format_instructions(&self) -> String {
        let mut properties = serde_json::Map::new();
        for field in &self.fields {
            properties.insert(
                field.name.to_string(),
                serde_json::json!({
                    "description": field.description,
                    "type": "string",
                }),
            );
        }
        let required: Vec<&str> = self.fields.iter().map(|field| field.name).collect();
        let schema = serde_json::json!({
            "properties": properties,
            "required": required,
        });
        format!(
            "The output should be formatted as a JSON instance that conforms to the JSON schema below.\n\n\
             Here is the output schema:\n```\n{schema}\n```\n\
             Answer with the JSON object only."
        )
    }

    /// Extracts and deserializes the JSON object in `text`.
    pub fn parse(&self, text: &str) -> Result<T, ParseError> {
        let payload = extract_json(text).ok_or_else(|| ParseError::NoJson(snippet(text)))?;
        Ok(serde_json::from_str(payload)?)
    }
}

/// Locates a JSON object in a reply: fenced block first, then the outermost braces.
pub fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(fenced) = fenced_block(trimmed) {
        return Some(fenced);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    let body_start = after_open.find('\n')? + 1;
    let body = &after_open[body_start..];
    let close = body.find("```")?;
    let inner = body[..close].trim();
    inner.starts_with('{').then_some(inner)
}

fn snippet(text: &str) -> String {
    const MAX: usize = 120;
    let trimmed = text.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct City {
        cidade: String,
        motivo: String,
    }

    fn parser() -> JsonOutputParser<City> {
        JsonOutputParser::new(&[
            FieldSpec::new("cidade", "A cidade recomendada para visitar"),
            FieldSpec::new("motivo", "motivo pelo qual é interessante visitar essa cidade"),
        ])
    }

    #[test]
    fn parses_bare_json() {
        let city = parser()
            .parse(r#"{"cidade": "Florianópolis", "motivo": "praias"}"#)
            .unwrap();
        assert_eq!(city.cidade, "Florianópolis");
    }

    #[test]
    fn parses_fenced_json() {
        let reply = "Claro!\n```json\n{\"cidade\": \"Salvador\", \"motivo\": \"cultura\"}\n```\n";
        assert_eq!(
            parser().parse(reply).unwrap(),
            City {
                cidade: "Salvador".into(),
                motivo: "cultura".into()
            }
        );
    }

    #[test]
    fn parses_json_inside_prose() {
        let reply = "Sugestão: {\"cidade\": \"Paraty\", \"motivo\": \"história\"} boa viagem";
        assert_eq!(parser().parse(reply).unwrap().cidade, "Paraty");
    }

    #[test]
    fn prose_without_json_is_rejected() {
        assert!(matches!(
            parser().parse("Recomendo Natal."),
            Err(ParseError::NoJson(_))
        ));
    }

    #[test]
    fn wrong_shape_is_rejected() {
        assert!(matches!(
            parser().parse(r#"{"city": "Natal"}"#),
            Err(ParseError::Shape(_))
        ));
    }

    #[test]
    fn format_instructions_name_every_field() {
        let instructions = parser().format_instructions();
        assert!(instructions.contains("\"cidade\""));
        assert!(instructions.contains("motivo pelo qual"));
    }

    #[test]
    fn str_parser_trims() {
        assert_eq!(StrOutputParser.parse("  olá \n"), "olá");
    }
}
