use super::components::{component_to_schema, normalize_schema_name, ComponentNames};
use super::schema::{
    ensure_schema, map_field_to_schema, map_param_to_schema, query_param_style,
};
use super::types::{
    Components, Contact, Header, Info, License, MediaType, OpenApiSchema, Operation, Parameter,
    PathItem, RequestBody, Response, Schema, Server,
};
use crate::error::Error;
use crate::service::Service;
use crate::tags::BindingTagKind;
use crate::types::{content_type_to_binding, find_component, Field};
use anyhow::{Context, Result};
use log::{debug, error, warn};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

fn preferred_component_binding(kinds: &[BindingTagKind]) -> BindingTagKind {
    const PREFERRED_ORDER: [BindingTagKind; 7] = [
        BindingTagKind::Json,
        BindingTagKind::Yaml,
        BindingTagKind::Xml,
        BindingTagKind::Form,
        BindingTagKind::Uri,
        BindingTagKind::Header,
        BindingTagKind::None,
    ];
    for preferred in PREFERRED_ORDER {
        if kinds.contains(&preferred) {
            return preferred;
        }
    }
    kinds.first().copied().unwrap_or(BindingTagKind::None)
}

fn to_lower_camel(text: &str) -> String {
    let mut out = String::new();
    for (index, word) in text.split_whitespace().enumerate() {
        let mut chars = word.chars();
        let first = match chars.next() {
            Some(c) => c,
            None => continue,
        };
        if index == 0 {
            out.extend(first.to_lowercase());
        } else {
            out.extend(first.to_uppercase());
        }
        out.push_str(chars.as_str());
    }
    out
}

/// The operation id used when a route does not carry one:
/// `lowerCamel(method + " " + path)` with non-alphanumeric runes mapped to
/// spaces.
fn default_operation_id(method: &str, endpoint_path: &str) -> String {
    let raw = format!("{} {}", method.to_lowercase(), endpoint_path);
    let sanitized: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    to_lower_camel(&sanitized)
}

/// Router placeholders become OpenAPI template expressions:
/// `/:id` -> `/{id}`, the `/*rest` catch-all -> `/{rest*}`.
fn translate_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{}}}", name)
            } else if let Some(name) = segment.strip_prefix('*') {
                format!("{{{}*}}", name)
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Generates the OpenAPI document from the service's final state and writes
/// it under the service work dir. The format is inferred from the file
/// extension; `.json` is appended when none is given. Returns the path the
/// document was written to.
pub fn generate(service: &Service, file_path: &str) -> Result<PathBuf> {
    debug!("generating OpenAPI output");
    let config = match &service.config {
        Some(config) => config,
        None => {
            error!("no config found");
            return Err(Error::ConfigNotFound.into());
        }
    };

    debug!("making collision safe struct names");
    let names = ComponentNames::build(&service.components);

    let protocol = if config.secure { "https" } else { "http" };

    let mut paths: BTreeMap<String, PathItem> = BTreeMap::new();
    let mut operation_ids: HashMap<String, usize> = HashMap::new();

    for route in &service.routes {
        debug!("generating endpoint {} {}", route.method, route.path);
        let endpoint_path = translate_path(&route.path);

        let mut operation = Operation::default();

        for path_param in &route.path_params {
            let schema = match map_param_to_schema(&names, BindingTagKind::Uri, path_param) {
                Some(schema) => ensure_schema(schema),
                None => continue,
            };
            operation.parameters.push(Parameter {
                name: path_param.name.clone(),
                location: "path".to_string(),
                required: path_param.is_required,
                schema,
                ..Default::default()
            });
        }

        for request_header in &route.request_headers {
            if request_header.is_bound {
                let component = match find_component(
                    &service.components,
                    &request_header.field.package,
                    &request_header.field.kind,
                ) {
                    Some(component) => component,
                    None => continue,
                };
                let component_schema = match component_to_schema(
                    service,
                    &names,
                    component,
                    BindingTagKind::Header,
                ) {
                    Some(schema) => schema,
                    None => continue,
                };
                for (property_name, property_schema) in &component_schema.properties {
                    operation.parameters.push(Parameter {
                        name: property_name.clone(),
                        location: "header".to_string(),
                        required: request_header.is_required,
                        schema: ensure_schema(property_schema.clone()),
                        ..Default::default()
                    });
                }
            } else {
                let schema =
                    match map_param_to_schema(&names, BindingTagKind::Header, request_header) {
                        Some(schema) => ensure_schema(schema),
                        None => continue,
                    };
                operation.parameters.push(Parameter {
                    name: request_header.name.clone(),
                    location: "header".to_string(),
                    required: request_header.is_required,
                    schema,
                    ..Default::default()
                });
            }
        }

        for query_param in &route.query_params {
            let schema = match map_param_to_schema(&names, BindingTagKind::Form, query_param) {
                Some(schema) => schema,
                None => continue,
            };

            // Bound parameters must be spread into one named parameter per
            // component property.
            if query_param.is_bound {
                let component = match find_component(
                    &service.components,
                    &query_param.field.package,
                    &query_param.field.kind,
                ) {
                    Some(component) => component,
                    None => continue,
                };
                let component_schema =
                    match component_to_schema(service, &names, component, BindingTagKind::Form) {
                        Some(schema) => schema,
                        None => continue,
                    };
                for (property_name, property_schema) in &component_schema.properties {
                    let property_schema = ensure_schema(property_schema.clone());
                    let (style, explode) = query_param_style(&property_schema);
                    operation.parameters.push(Parameter {
                        name: property_name.clone(),
                        location: "query".to_string(),
                        required: query_param.is_required,
                        style: style.to_string(),
                        explode,
                        schema: property_schema,
                    });
                }
            } else {
                let (style, explode) = query_param_style(&schema);
                operation.parameters.push(Parameter {
                    name: query_param.name.clone(),
                    location: "query".to_string(),
                    required: query_param.is_required,
                    style: style.to_string(),
                    explode,
                    schema: ensure_schema(schema),
                });
            }
        }

        for body_param in &route.body {
            let binding = content_type_to_binding(&body_param.content_type);
            let schema = match map_field_to_schema(&names, binding, &body_param.field) {
                Some(schema) => schema,
                None => continue,
            };

            let request_body = operation
                .request_body
                .get_or_insert_with(RequestBody::default);

            let media_schema = if !body_param.name.is_empty() {
                let mut wrapper = Schema::of_type("object");
                wrapper
                    .properties
                    .insert(body_param.name.clone(), schema);
                wrapper
            } else {
                schema
            };

            request_body
                .content
                .insert(body_param.content_type.clone(), MediaType { schema: media_schema });
        }

        let response_headers: Option<BTreeMap<String, Header>> =
            if route.response_headers.is_empty() {
                None
            } else {
                let mut headers = BTreeMap::new();
                for response_header in &route.response_headers {
                    if let Some(schema) =
                        map_param_to_schema(&names, BindingTagKind::Header, response_header)
                    {
                        headers.insert(
                            response_header.name.clone(),
                            Header {
                                required: response_header.is_required,
                                schema,
                            },
                        );
                    }
                }
                Some(headers)
            };

        for return_type in &route.return_types {
            let binding = content_type_to_binding(&return_type.content_type);
            let media_type = map_field_to_schema(&names, binding, &return_type.field)
                .map(|schema| MediaType { schema })
                .unwrap_or_default();

            let status_code = return_type.status_code.to_string();
            let response = operation
                .responses
                .entry(status_code)
                .or_insert_with(|| Response {
                    description: String::new(),
                    headers: response_headers.clone(),
                    content: BTreeMap::new(),
                });
            if media_type != MediaType::default() {
                response
                    .content
                    .insert(return_type.content_type.clone(), media_type);
            }
        }
        if route.return_types.is_empty() {
            let mut content = BTreeMap::new();
            content.insert(
                "application/json".to_string(),
                MediaType {
                    schema: Schema::of_type("object"),
                },
            );
            operation.responses.insert(
                "200".to_string(),
                Response {
                    description: String::new(),
                    headers: response_headers.clone(),
                    content,
                },
            );
        }

        if !route.doc.is_empty() {
            operation.description = route.doc.clone();
        }

        let mut operation_id = route.operation_id.clone();
        if operation_id.is_empty() {
            operation_id = default_operation_id(&route.method, &endpoint_path);
        }
        if !operation_id.is_empty() {
            let count = operation_ids.entry(operation_id.clone()).or_insert(0);
            if *count > 0 {
                *count += 1;
                operation_id = format!("{}_{}", operation_id, count);
            } else {
                *count = 1;
            }
            operation.operation_id = operation_id;
        }

        operation.parameters.sort_by(|a, b| a.name.cmp(&b.name));

        let path_item = paths.entry(endpoint_path).or_default();
        match route.method.as_str() {
            "GET" => path_item.get = Some(operation),
            "POST" => path_item.post = Some(operation),
            "PUT" => path_item.put = Some(operation),
            "PATCH" => path_item.patch = Some(operation),
            "DELETE" => path_item.delete = Some(operation),
            "HEAD" => path_item.head = Some(operation),
            "OPTIONS" => path_item.options = Some(operation),
            other => warn!("unsupported method {} for {}", other, route.path),
        }
    }
    debug!("added paths");

    let mut schemas: BTreeMap<String, Schema> = BTreeMap::new();
    let mut sorted_components: Vec<&Field> = service.components.iter().collect();
    sorted_components.sort_by(|a, b| {
        normalize_schema_name(&a.name)
            .cmp(&normalize_schema_name(&b.name))
            .then_with(|| a.package.cmp(&b.package))
            .then_with(|| a.name.cmp(&b.name))
    });
    for component in sorted_components {
        let (binding_tags, per_tag) =
            crate::types::extract_binding_tags(&component.struct_fields);
        if per_tag {
            for kind in binding_tags {
                add_component_schema(service, &names, component, kind, &mut schemas);
            }
        } else {
            let kind = preferred_component_binding(&binding_tags);
            add_component_schema(service, &names, component, kind, &mut schemas);
        }
    }
    debug!("added components");

    let description = if config.description.is_empty() {
        "Generated by openapi-from-gin".to_string()
    } else {
        config.description.clone()
    };

    let contact = &config.contact;
    let contact = if contact.name.is_empty() && contact.url.is_empty() && contact.email.is_empty()
    {
        None
    } else {
        Some(Contact {
            name: contact.name.clone(),
            url: contact.url.clone(),
            email: contact.email.clone(),
        })
    };
    let license = &config.license;
    let license = if license.name.is_empty() && license.url.is_empty() {
        None
    } else {
        Some(License {
            name: license.name.clone(),
            url: license.url.clone(),
        })
    };

    let output = OpenApiSchema {
        openapi: "3.0.0".to_string(),
        info: Info {
            title: config.title.clone(),
            description,
            contact,
            license,
            version: config.version.clone(),
        },
        servers: vec![Server {
            url: format!(
                "{}://{}:{}{}",
                protocol, config.host, config.port, config.base_path
            ),
        }],
        paths,
        components: Components { schemas },
    };

    let mut file_path = file_path.to_string();
    if !file_path.ends_with(".json")
        && !file_path.ends_with(".yaml")
        && !file_path.ends_with(".yml")
    {
        debug!("no file extension provided, defaulting to .json");
        file_path.push_str(".json");
    }

    let content = render_document(&output, &file_path)?;
    let full_path = service.work_dir.join(&file_path);
    write_output(&content, &full_path)?;
    debug!(
        "successfully generated OpenAPI schema file {}",
        full_path.display()
    );

    Ok(full_path)
}

/// Renders the document in the format the file extension names. Every
/// mapping in the document tree is ordered, so two renders of the same
/// service state are identical byte for byte.
fn render_document(output: &OpenApiSchema, file_path: &str) -> Result<String> {
    if file_path.ends_with(".yaml") || file_path.ends_with(".yml") {
        debug!("rendering YAML document");
        serde_yaml::to_string(output).context("could not render the OpenAPI document as YAML")
    } else {
        debug!("rendering JSON document");
        serde_json::to_string_pretty(output)
            .context("could not render the OpenAPI document as JSON")
    }
}

fn write_output(content: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("could not create output directory {}", parent.display()))?;
    }
    fs::write(path, content)
        .with_context(|| format!("could not write OpenAPI document to {}", path.display()))
}

fn add_component_schema(
    service: &Service,
    names: &ComponentNames,
    component: &Field,
    kind: BindingTagKind,
    schemas: &mut BTreeMap<String, Schema>,
) {
    let mut schema = match component_to_schema(service, names, component, kind) {
        Some(schema) => schema,
        None => return,
    };
    debug!("adding component {} with binding {:?}", component.name, kind);
    if !component.doc.is_empty() {
        schema.description = component.doc.clone();
    }
    if let Some(name) = names.ref_name(kind, &component.name, &component.package) {
        schemas.insert(name, schema);
    }
}
