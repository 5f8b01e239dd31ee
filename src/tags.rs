use std::collections::BTreeMap;

/// The binding kinds a struct-field tag can name.
///
/// Ordering drives deterministic iteration and the emitter's preference
/// order handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BindingTagKind {
    /// The implicit binding every field carries, named after the field itself.
    None,
    Json,
    Xml,
    Yaml,
    Form,
    Uri,
    Header,
}

impl BindingTagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingTagKind::None => "",
            BindingTagKind::Json => "json",
            BindingTagKind::Xml => "xml",
            BindingTagKind::Yaml => "yaml",
            BindingTagKind::Form => "form",
            BindingTagKind::Uri => "uri",
            BindingTagKind::Header => "header",
        }
    }

    fn from_key(key: &str) -> Option<BindingTagKind> {
        Some(match key {
            "json" => BindingTagKind::Json,
            "xml" => BindingTagKind::Xml,
            "yaml" => BindingTagKind::Yaml,
            "form" => BindingTagKind::Form,
            "uri" => BindingTagKind::Uri,
            "header" => BindingTagKind::Header,
            _ => return None,
        })
    }
}

/// One parsed binding entry on a struct field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingTag {
    /// The property name the binding exposes.
    pub name: String,
    /// `true` when the tag name is `-`: the field is bound but never shown.
    pub not_shown: bool,
    /// `true` when a validation tag marks the field required.
    pub is_required: bool,
}

pub type BindingTagMap = BTreeMap<BindingTagKind, BindingTag>;
pub type ValidationTagMap = BTreeMap<String, Vec<String>>;

const VALIDATION_KEYS: &[&str] = &["binding", "validate"];

/// Parses a Go struct tag (the backquoted `key:"value"` list) into the
/// field's binding map and validation map.
///
/// The binding map always contains a [`BindingTagKind::None`] entry named
/// after the field, so emitters can fall back to the declared name when a
/// binding kind is absent.
pub fn parse_struct_tag(field_name: &str, tag: Option<&str>) -> (BindingTagMap, ValidationTagMap) {
    let mut bindings = BindingTagMap::new();
    let mut validations = ValidationTagMap::new();

    if let Some(tag) = tag {
        for (key, value) in iter_tag_pairs(tag) {
            if let Some(kind) = BindingTagKind::from_key(key) {
                let mut parts = value.split(',');
                let name = parts.next().unwrap_or("").trim();
                let binding = if name == "-" {
                    BindingTag {
                        name: String::new(),
                        not_shown: true,
                        is_required: false,
                    }
                } else if name.is_empty() {
                    BindingTag {
                        name: field_name.to_string(),
                        not_shown: false,
                        is_required: false,
                    }
                } else {
                    BindingTag {
                        name: name.to_string(),
                        not_shown: false,
                        is_required: false,
                    }
                };
                bindings.insert(kind, binding);
            } else if VALIDATION_KEYS.contains(&key) {
                let values: Vec<String> = value
                    .split(',')
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect();
                validations.insert(key.to_string(), values);
            }
        }
    }

    let required = validations
        .values()
        .any(|values| values.iter().any(|v| v == "required"));
    if required {
        for binding in bindings.values_mut() {
            binding.is_required = true;
        }
    }

    bindings.insert(
        BindingTagKind::None,
        BindingTag {
            name: field_name.to_string(),
            not_shown: false,
            is_required: required,
        },
    );

    (bindings, validations)
}

/// Iterates the `key:"value"` pairs of a struct tag, following Go's
/// `reflect.StructTag` conventions.
fn iter_tag_pairs(tag: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    let mut rest = tag.trim();
    while !rest.is_empty() {
        let colon = match rest.find(':') {
            Some(idx) => idx,
            None => break,
        };
        let key = rest[..colon].trim();
        rest = &rest[colon + 1..];
        if !rest.starts_with('"') {
            break;
        }
        rest = &rest[1..];
        let close = match rest.find('"') {
            Some(idx) => idx,
            None => break,
        };
        let value = &rest[..close];
        rest = rest[close + 1..].trim_start();
        if !key.is_empty() {
            pairs.push((key, value));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_tag() {
        let (bindings, _) = parse_struct_tag("ID", Some("json:\"id\""));
        assert_eq!(bindings[&BindingTagKind::Json].name, "id");
        assert_eq!(bindings[&BindingTagKind::None].name, "ID");
    }

    #[test]
    fn test_parse_multiple_bindings() {
        let (bindings, _) = parse_struct_tag("Name", Some("json:\"name\" xml:\"Name\" form:\"name\""));
        assert_eq!(bindings[&BindingTagKind::Json].name, "name");
        assert_eq!(bindings[&BindingTagKind::Xml].name, "Name");
        assert_eq!(bindings[&BindingTagKind::Form].name, "name");
    }

    #[test]
    fn test_omitempty_option_ignored() {
        let (bindings, _) = parse_struct_tag("Email", Some("json:\"email,omitempty\""));
        assert_eq!(bindings[&BindingTagKind::Json].name, "email");
    }

    #[test]
    fn test_dash_means_not_shown() {
        let (bindings, _) = parse_struct_tag("Secret", Some("json:\"-\""));
        assert!(bindings[&BindingTagKind::Json].not_shown);
    }

    #[test]
    fn test_empty_name_falls_back_to_field() {
        let (bindings, _) = parse_struct_tag("Count", Some("json:\",omitempty\""));
        assert_eq!(bindings[&BindingTagKind::Json].name, "Count");
    }

    #[test]
    fn test_binding_required() {
        let (bindings, validations) =
            parse_struct_tag("Name", Some("json:\"name\" binding:\"required\""));
        assert!(bindings[&BindingTagKind::Json].is_required);
        assert!(bindings[&BindingTagKind::None].is_required);
        assert_eq!(validations["binding"], vec!["required".to_string()]);
    }

    #[test]
    fn test_validate_key_also_recognised() {
        let (bindings, _) =
            parse_struct_tag("Age", Some("json:\"age\" validate:\"required,gte=0\""));
        assert!(bindings[&BindingTagKind::Json].is_required);
    }

    #[test]
    fn test_no_tag_yields_fallback_only() {
        let (bindings, validations) = parse_struct_tag("Plain", None);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[&BindingTagKind::None].name, "Plain");
        assert!(validations.is_empty());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let (bindings, _) = parse_struct_tag("ID", Some("db:\"id\" json:\"id\""));
        assert_eq!(bindings.len(), 2);
    }
}
