use super::components::ComponentNames;
use super::types::Schema;
use crate::service::Service;
use crate::tags::BindingTagKind;
use crate::types::{is_accepted_type, Field, Param, PREDEFINED_TYPE_MAP};

/// Maps a single parameter to its schema. Bound parameters map through the
/// component graph; array and map parameters wrap their element type.
pub fn map_param_to_schema(
    names: &ComponentNames,
    kind: BindingTagKind,
    param: &Param,
) -> Option<Schema> {
    if param.is_bound {
        map_field_to_schema(names, kind, &param.field)
    } else if param.is_array {
        let mut item_schema = map_predefined_type_format(&param.field.kind);
        if !is_accepted_type(&param.field.kind) {
            if let Some(reference) =
                names.component_ref(kind, &param.field.kind, &param.field.package)
            {
                item_schema = Schema::reference(reference);
            }
        }
        Some(Schema {
            schema_type: "array".to_string(),
            items: Some(Box::new(item_schema)),
            ..Default::default()
        })
    } else if param.is_map {
        let additional_properties = if !is_accepted_type(&param.field.kind) {
            match names.component_ref(kind, &param.field.kind, &param.field.package) {
                Some(reference) => Schema::reference(reference),
                None => Schema::default(),
            }
        } else {
            map_predefined_type_format(&param.field.kind)
        };
        Some(Schema {
            schema_type: "object".to_string(),
            additional_properties: Some(Box::new(additional_properties)),
            ..Default::default()
        })
    } else {
        Some(map_predefined_type_format(&param.field.kind))
    }
}

/// Maps a field to its schema: inline objects for anonymous structs,
/// references for named types, predefined formats for everything accepted.
pub fn map_field_to_schema(
    names: &ComponentNames,
    kind: BindingTagKind,
    field: &Field,
) -> Option<Schema> {
    if field.kind == "struct" && !field.struct_fields.is_empty() {
        if let Some(schema) = map_inline_struct_to_schema(names, kind, field) {
            return Some(schema);
        }
    }
    if !is_accepted_type(&field.kind) {
        return names
            .component_ref(kind, &field.kind, &field.package)
            .map(Schema::reference);
    }

    let mut schema = map_predefined_type_format(&field.kind);
    if field.kind == "slice" {
        let mut item_schema = Schema {
            schema_type: map_predefined_type_format(&field.slice_type).schema_type,
            ..Default::default()
        };
        if !is_accepted_type(&field.slice_type) {
            if let Some(reference) = names.component_ref(kind, &field.slice_type, &field.package) {
                item_schema = Schema::reference(reference);
            }
        }
        schema.items = Some(Box::new(item_schema));
    } else if field.kind == "map" {
        schema.additional_properties = Some(Box::new(map_map_value_schema(names, kind, field)));
    }
    Some(schema)
}

fn map_inline_struct_to_schema(
    names: &ComponentNames,
    kind: BindingTagKind,
    field: &Field,
) -> Option<Schema> {
    let mut embedded_properties: Vec<Schema> = Vec::new();
    let mut schema = Schema::of_type("object");

    for struct_field in field.struct_fields.values() {
        if struct_field.is_embedded {
            if let Some(reference) =
                names.component_ref(kind, &struct_field.kind, &struct_field.package)
            {
                embedded_properties.push(Schema::reference(reference));
            }
            continue;
        }

        let binding = struct_field.binding_tags.get(&kind);
        let no_binding = struct_field.binding_tags.get(&BindingTagKind::None);
        let binding = binding.or(no_binding)?;

        if !binding.not_shown {
            if let Some(field_schema) = map_field_to_schema(names, kind, struct_field) {
                schema
                    .properties
                    .insert(binding.name.clone(), ensure_schema(field_schema));
            }
        }
    }

    if !embedded_properties.is_empty() {
        if schema.properties.is_empty() {
            schema.all_of = embedded_properties;
        } else {
            let mut all_of = embedded_properties;
            all_of.push(Schema {
                properties: std::mem::take(&mut schema.properties),
                ..Default::default()
            });
            schema.all_of = all_of;
        }
    }

    Some(schema)
}

/// OpenAPI forbids empty schemas in `properties`; substitute a string.
pub fn ensure_schema(schema: Schema) -> Schema {
    if schema.is_empty() {
        Schema::of_type("string")
    } else {
        schema
    }
}

/// The schema for a map component's values, covering nested slice/array
/// value shapes.
pub fn map_map_value_schema(names: &ComponentNames, kind: BindingTagKind, field: &Field) -> Schema {
    let value_package = || {
        if field.map_value_package.is_empty() {
            &field.package
        } else {
            &field.map_value_package
        }
    };
    match field.map_value_type.as_str() {
        "slice" => {
            let mut item_schema = map_predefined_type_format(&field.map_value_slice_type);
            if item_schema.schema_type.is_empty() && !is_accepted_type(&field.map_value_slice_type)
            {
                if let Some(reference) =
                    names.component_ref(kind, &field.map_value_slice_type, value_package())
                {
                    item_schema = Schema::reference(reference);
                }
            }
            Schema {
                schema_type: "array".to_string(),
                items: Some(Box::new(item_schema)),
                ..Default::default()
            }
        }
        "array" => {
            let mut item_schema = map_predefined_type_format(&field.map_value_array_type);
            if item_schema.schema_type.is_empty() && !is_accepted_type(&field.map_value_array_type)
            {
                if let Some(reference) =
                    names.component_ref(kind, &field.map_value_array_type, value_package())
                {
                    item_schema = Schema::reference(reference);
                }
            }
            Schema {
                schema_type: "array".to_string(),
                items: Some(Box::new(item_schema)),
                ..Default::default()
            }
        }
        _ => {
            let mut additional_properties = map_predefined_type_format(&field.map_value_type);
            if additional_properties.schema_type.is_empty()
                && !is_accepted_type(&field.map_value_type)
            {
                if let Some(reference) =
                    names.component_ref(kind, &field.map_value_type, value_package())
                {
                    additional_properties.ref_ = reference;
                }
            }
            additional_properties
        }
    }
}

/// Maps a named type through the service's custom type mappings.
pub fn map_type_format(service: &Service, name: &str, package: &str) -> Schema {
    match service.get_type_mapping(name, package) {
        Some(mapping) if !mapping.schema_type.is_empty() => Schema {
            schema_type: mapping.schema_type.clone(),
            format: mapping.format.clone(),
            ..Default::default()
        },
        _ => Schema::default(),
    }
}

/// Maps a predefined type name to its `(type, format)` schema. Unknown names
/// yield an empty schema.
pub fn map_predefined_type_format(name: &str) -> Schema {
    match PREDEFINED_TYPE_MAP.get(name) {
        Some(mapping) if !mapping.schema_type.is_empty() => Schema {
            schema_type: mapping.schema_type.clone(),
            format: mapping.format.clone(),
            ..Default::default()
        },
        _ => Schema::default(),
    }
}

/// The serialisation style of a query parameter, based on its schema.
pub fn query_param_style(schema: &Schema) -> (&'static str, bool) {
    if schema.schema_type == "object" {
        ("deepObject", true)
    } else {
        // Form style with comma-separated arrays.
        ("form", false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_names() -> ComponentNames {
        ComponentNames::build(&[])
    }

    #[test]
    fn test_predefined_formats() {
        assert_eq!(map_predefined_type_format("string").schema_type, "string");
        assert_eq!(map_predefined_type_format("int64").format, "int64");
        assert_eq!(map_predefined_type_format("float32").schema_type, "number");
        assert!(map_predefined_type_format("nil").is_empty());
        assert!(map_predefined_type_format("Contact").is_empty());
    }

    #[test]
    fn test_param_plain_string() {
        let param = Param {
            name: "q".to_string(),
            field: Field::of_kind("string"),
            ..Default::default()
        };
        let schema = map_param_to_schema(&empty_names(), BindingTagKind::Form, &param).unwrap();
        assert_eq!(schema.schema_type, "string");
    }

    #[test]
    fn test_param_array_of_strings() {
        let param = Param {
            name: "tags".to_string(),
            field: Field::of_kind("string"),
            is_array: true,
            ..Default::default()
        };
        let schema = map_param_to_schema(&empty_names(), BindingTagKind::Form, &param).unwrap();
        assert_eq!(schema.schema_type, "array");
        assert_eq!(schema.items.unwrap().schema_type, "string");
    }

    #[test]
    fn test_param_map_becomes_object() {
        let param = Param {
            name: "filters".to_string(),
            field: Field::of_kind("string"),
            is_map: true,
            ..Default::default()
        };
        let schema = map_param_to_schema(&empty_names(), BindingTagKind::Form, &param).unwrap();
        assert_eq!(schema.schema_type, "object");
        assert_eq!(
            schema.additional_properties.unwrap().schema_type,
            "string"
        );
    }

    #[test]
    fn test_field_named_type_without_component_is_unbound() {
        let field = Field {
            kind: "Ghost".to_string(),
            package: "example.com/demo/missing".to_string(),
            ..Default::default()
        };
        assert!(map_field_to_schema(&empty_names(), BindingTagKind::Json, &field).is_none());
    }

    #[test]
    fn test_ensure_schema_substitutes_string() {
        assert_eq!(ensure_schema(Schema::default()).schema_type, "string");
        assert_eq!(ensure_schema(Schema::of_type("integer")).schema_type, "integer");
    }

    #[test]
    fn test_query_param_style() {
        assert_eq!(query_param_style(&Schema::of_type("object")), ("deepObject", true));
        assert_eq!(query_param_style(&Schema::of_type("string")), ("form", false));
    }

    #[test]
    fn test_slice_field_schema() {
        let field = Field {
            kind: "slice".to_string(),
            slice_type: "int".to_string(),
            ..Default::default()
        };
        let schema = map_field_to_schema(&empty_names(), BindingTagKind::Json, &field).unwrap();
        assert_eq!(schema.schema_type, "array");
        assert_eq!(schema.items.unwrap().schema_type, "integer");
    }
}
