use super::schema::{map_map_value_schema, map_predefined_type_format, map_type_format};
use super::types::Schema;
use crate::service::Service;
use crate::tags::{BindingTag, BindingTagKind};
use crate::types::{extract_binding_tags, is_accepted_type, Field};
use log::debug;
use std::collections::HashMap;

/// Collision-free schema names for every component, computed up front.
///
/// Components whose field binding tags are not uniform across kinds get one
/// entry per binding kind, suffixed `_<tag>`. Names that still collide after
/// normalisation receive numeric suffixes in a deterministic order.
pub struct ComponentNames {
    names: HashMap<String, String>,
}

fn collision_safe_key(kind: BindingTagKind, name: &str, package: &str) -> String {
    if kind != BindingTagKind::None {
        format!("{}.{}.{}", package, kind.as_str(), name)
    } else {
        format!("{}.{}", package, name)
    }
}

/// The package name from an import path
/// (`github.com/acme/app/proto` -> `proto`).
pub(crate) fn package_name(package: &str) -> &str {
    package.rsplit('/').next().unwrap_or(package)
}

/// Normalises a schema name: split on non-alphanumeric runes, title-case the
/// parts, concatenate.
pub(crate) fn normalize_schema_name(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

struct NameEntry {
    keys: Vec<String>,
    base_name: String,
    normalized_name: String,
    package: String,
}

impl ComponentNames {
    /// Must run before any route or component schema is generated; every
    /// `$ref` goes through the map this builds.
    pub fn build(components: &[Field]) -> ComponentNames {
        let mut entries: Vec<NameEntry> = Vec::new();

        for component in components {
            let (binding_tags, per_tag) = extract_binding_tags(&component.struct_fields);
            if per_tag {
                for kind in &binding_tags {
                    let name = if *kind != BindingTagKind::None {
                        format!("{}_{}", component.name, kind.as_str())
                    } else {
                        component.name.clone()
                    };
                    entries.push(NameEntry {
                        keys: vec![collision_safe_key(*kind, &component.name, &component.package)],
                        normalized_name: normalize_schema_name(&name),
                        base_name: name,
                        package: component.package.clone(),
                    });
                }
                continue;
            }

            let keys = binding_tags
                .iter()
                .map(|kind| collision_safe_key(*kind, &component.name, &component.package))
                .collect();
            entries.push(NameEntry {
                keys,
                base_name: component.name.clone(),
                normalized_name: normalize_schema_name(&component.name),
                package: component.package.clone(),
            });
        }

        entries.sort_by(|a, b| {
            a.normalized_name
                .cmp(&b.normalized_name)
                .then_with(|| a.package.cmp(&b.package))
                .then_with(|| a.keys.join(".").cmp(&b.keys.join(".")))
        });

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for entry in &entries {
            *counts.entry(entry.normalized_name.as_str()).or_default() += 1;
        }

        let mut names = HashMap::new();
        let mut used: HashMap<String, usize> = HashMap::new();
        for entry in &entries {
            let final_name = if counts[entry.normalized_name.as_str()] > 1 {
                let n = used.entry(entry.normalized_name.clone()).or_default();
                *n += 1;
                format!("{}_{}", entry.base_name, n)
            } else {
                entry.base_name.clone()
            };
            for key in &entry.keys {
                names.insert(key.clone(), final_name.clone());
            }
        }

        ComponentNames { names }
    }

    /// The collision-safe schema name for a component under a binding kind,
    /// falling back to the unbound entry.
    pub fn ref_name(&self, kind: BindingTagKind, name: &str, package: &str) -> Option<String> {
        self.names
            .get(&collision_safe_key(kind, name, package))
            .or_else(|| {
                self.names
                    .get(&collision_safe_key(BindingTagKind::None, name, package))
            })
            .cloned()
    }

    /// A `#/components/schemas/...` reference to the component.
    pub fn component_ref(
        &self,
        kind: BindingTagKind,
        name: &str,
        package: &str,
    ) -> Option<String> {
        self.ref_name(kind, name, package)
            .map(|component_name| format!("#/components/schemas/{}", component_name))
    }
}

/// A migration-era rename carried over from the service this tool grew up
/// with: one proto field is documented as its simplified counterpart.
fn override_field_schema(
    names: &ComponentNames,
    kind: BindingTagKind,
    component: &Field,
    field: &Field,
    field_binding: &BindingTag,
) -> Option<Schema> {
    if package_name(&component.package) == "proto"
        && component.name == "Blog"
        && field_binding.name == "sharedThread"
        && field.kind == "ChatThread"
    {
        return names
            .component_ref(kind, "SimpleChatThread", &field.package)
            .map(Schema::reference);
    }
    None
}

/// Converts a component to a schema under the given binding kind. Returns
/// `None` when the component cannot be expressed under that kind.
pub fn component_to_schema(
    service: &Service,
    names: &ComponentNames,
    component: &Field,
    kind: BindingTagKind,
) -> Option<Schema> {
    if service
        .get_type_mapping(&component.name, &component.package)
        .is_some()
    {
        return Some(map_type_format(service, &component.name, &component.package));
    }

    if component.kind == "struct" {
        let mut embedded_properties: Vec<Schema> = Vec::new();
        let mut schema = Schema::of_type("object");

        for (field_name, field) in &component.struct_fields {
            if field.is_embedded {
                if let Some(reference) = names.component_ref(kind, &field.kind, &field.package) {
                    embedded_properties.push(Schema::reference(reference));
                }
                continue;
            }

            let field_binding = field.binding_tags.get(&kind);
            let field_no_binding = field.binding_tags.get(&BindingTagKind::None);
            let field_binding = match field_binding.or(field_no_binding) {
                Some(binding) => binding,
                None => {
                    debug!(
                        "field {} of {} has no binding for {:?}",
                        field_name, component.name, kind
                    );
                    return None;
                }
            };

            if field_binding.not_shown {
                continue;
            }
            if let Some(override_schema) =
                override_field_schema(names, kind, component, field, field_binding)
            {
                schema
                    .properties
                    .insert(field_binding.name.clone(), override_schema);
                continue;
            }
            if let Some(field_schema) = component_to_schema(service, names, field, kind) {
                schema
                    .properties
                    .insert(field_binding.name.clone(), field_schema);
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
    } else if component.kind == "slice" {
        let mut item_schema = map_predefined_type_format(&component.slice_type);
        if item_schema.schema_type.is_empty() && !is_accepted_type(&component.slice_type) {
            if let Some(reference) =
                names.component_ref(kind, &component.slice_type, &component.package)
            {
                item_schema = Schema::reference(reference);
            }
        }
        Some(Schema {
            schema_type: "array".to_string(),
            items: Some(Box::new(item_schema)),
            ..Default::default()
        })
    } else if component.kind == "array" {
        let mut item_schema = map_predefined_type_format(&component.array_type);
        if item_schema.schema_type.is_empty() && !is_accepted_type(&component.array_type) {
            if let Some(reference) =
                names.component_ref(kind, &component.array_type, &component.package)
            {
                item_schema = Schema::reference(reference);
            }
        }
        Some(Schema {
            schema_type: "array".to_string(),
            items: Some(Box::new(item_schema)),
            max_length: Some(component.array_length),
            ..Default::default()
        })
    } else if component.kind == "map" {
        let additional_properties = map_map_value_schema(names, kind, component);
        Some(Schema {
            schema_type: "object".to_string(),
            additional_properties: Some(Box::new(additional_properties)),
            ..Default::default()
        })
    } else {
        let mut schema = map_predefined_type_format(&component.kind);
        if schema.schema_type.is_empty() && !is_accepted_type(&component.kind) {
            if let Some(reference) =
                names.component_ref(kind, &component.kind, &component.package)
            {
                schema = Schema::reference(reference);
            }
        } else if !component.enum_values.is_empty() {
            schema.enum_values = component.enum_values.clone();
            if component.enum_names.len() == component.enum_values.len()
                && component.enum_names.iter().any(|name| !name.is_empty())
            {
                schema.x_enum_varnames = component.enum_names.clone();
            }
        }
        Some(schema)
    }
}
