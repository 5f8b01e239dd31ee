//! End-to-end generation tests over a fixture Gin project.

use openapi_from_gin::gin::{self, ContextFuncBuilder, RouteTable};
use openapi_from_gin::openapi;
use openapi_from_gin::service::{Config, CustomFunc, Service};
use openapi_from_gin::types::{add_return_type, Field, ReturnType};
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;
use tempfile::TempDir;

fn write_file(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut file = fs::File::create(path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
}

fn demo_project() -> TempDir {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), "go.mod", "module example.com/demo\n\ngo 1.21\n");
    write_file(
        temp.path(),
        "types/contact.go",
        r#"package types

// Contact is an address book entry.
type Contact struct {
	ID   int    `json:"id"`
	Name string `json:"name"`
}

// CreateContactRequest is the payload for creating contacts.
type CreateContactRequest struct {
	Name string `json:"name" binding:"required"`
}
"#,
    );
    write_file(
        temp.path(),
        "status/status.go",
        r#"package status

// Code enumerates lifecycle states.
type Code int

const (
	Active   Code = 1
	Inactive Code = 2
)
"#,
    );
    write_file(
        temp.path(),
        "main.go",
        r#"package main

import (
	"net/http"

	"github.com/gin-gonic/gin"

	"example.com/demo/status"
	"example.com/demo/types"
)

// GetContact returns a single contact.
func GetContact(c *gin.Context) {
	contact := types.Contact{ID: 1, Name: "one"}
	c.JSON(http.StatusOK, contact)
}

func CreateContact(c *gin.Context) {
	var req types.CreateContactRequest
	if err := c.ShouldBindJSON(&req); err != nil {
		c.Status(http.StatusBadRequest)
		return
	}
	c.JSON(http.StatusCreated, types.Contact{})
}

func Search(c *gin.Context) {
	q := c.Query("q")
	tags := c.GetQueryArray("tags")
	_ = q
	_ = tags
	c.JSON(http.StatusOK, []string{})
}

func UpdateStatus(c *gin.Context) {
	c.Status(http.StatusNoContent)
}

func CreatePost(c *gin.Context) {
	renderJSON(c, types.Contact{})
}

func renderJSON(c *gin.Context, obj types.Contact) {
	c.JSON(http.StatusCreated, obj)
}

func UpdateContact(c *gin.Context) {
	var req types.CreateContactRequest
	if err := c.ShouldBind(&req); err != nil {
		c.Status(http.StatusBadRequest)
		return
	}
	c.String(http.StatusOK, "ok")
}

func GetState(c *gin.Context) {
	c.JSON(http.StatusOK, status.Active)
}
"#,
    );
    temp
}

fn route_table() -> RouteTable {
    let json = r#"[
        {"method": "GET", "path": "/contacts/:id", "handler": "main.GetContact"},
        {"method": "POST", "path": "/contacts", "handler": "main.CreateContact"},
        {"method": "GET", "path": "/search", "handler": "main.Search"},
        {"method": "PUT", "path": "/status", "handler": "main.UpdateStatus"},
        {"method": "POST", "path": "/posts", "handler": "main.CreatePost"},
        {"method": "PUT", "path": "/contacts/:id", "handler": "main.UpdateContact"},
        {"method": "GET", "path": "/state", "handler": "main.GetState"}
    ]"#;
    serde_json::from_str(json).unwrap()
}

fn generate_content(temp: &TempDir) -> String {
    let mut service = Service::new()
        .with_custom_work_dir(temp.path())
        .with_config(Config::default())
        .with_handler_scan_paths(None, &[]);

    gin::create_routes(&mut service, &route_table()).unwrap();
    gin::parse_routes(&mut service).unwrap();

    let written = openapi::generate(&service, "openapi.json").unwrap();
    fs::read_to_string(written).unwrap()
}

fn generate_document(temp: &TempDir) -> Value {
    serde_json::from_str(&generate_content(temp)).unwrap()
}

#[test]
fn test_json_response_references_component() {
    let temp = demo_project();
    let doc = generate_document(&temp);

    let schema = &doc["paths"]["/contacts/{id}"]["get"]["responses"]["200"]["content"]
        ["application/json"]["schema"];
    assert_eq!(schema["$ref"], "#/components/schemas/Contact");

    let contact = &doc["components"]["schemas"]["Contact"];
    assert_eq!(contact["type"], "object");
    assert_eq!(contact["properties"]["id"]["type"], "integer");
    assert_eq!(contact["properties"]["name"]["type"], "string");
    assert_eq!(contact["description"], "Contact is an address book entry.");
}

#[test]
fn test_handler_doc_becomes_description() {
    let temp = demo_project();
    let doc = generate_document(&temp);

    assert_eq!(
        doc["paths"]["/contacts/{id}"]["get"]["description"],
        "GetContact returns a single contact."
    );
}

#[test]
fn test_path_parameter_emitted() {
    let temp = demo_project();
    let doc = generate_document(&temp);

    let params = doc["paths"]["/contacts/{id}"]["get"]["parameters"]
        .as_array()
        .unwrap();
    assert_eq!(params.len(), 1);
    assert_eq!(params[0]["name"], "id");
    assert_eq!(params[0]["in"], "path");
    assert_eq!(params[0]["required"], true);
    assert_eq!(params[0]["schema"]["type"], "string");
}

#[test]
fn test_bind_json_request_body() {
    let temp = demo_project();
    let doc = generate_document(&temp);

    let schema = &doc["paths"]["/contacts"]["post"]["requestBody"]["content"]
        ["application/json"]["schema"];
    assert_eq!(schema["$ref"], "#/components/schemas/CreateContactRequest");

    // The bad-request branch is extracted too.
    assert!(doc["paths"]["/contacts"]["post"]["responses"]
        .as_object()
        .unwrap()
        .contains_key("400"));
    assert!(doc["paths"]["/contacts"]["post"]["responses"]
        .as_object()
        .unwrap()
        .contains_key("201"));
}

#[test]
fn test_query_parameters_sorted_by_name() {
    let temp = demo_project();
    let doc = generate_document(&temp);

    let params = doc["paths"]["/search"]["get"]["parameters"]
        .as_array()
        .unwrap();
    assert_eq!(params.len(), 2);
    assert_eq!(params[0]["name"], "q");
    assert_eq!(params[0]["in"], "query");
    assert_eq!(params[0]["schema"]["type"], "string");
    assert_eq!(params[1]["name"], "tags");
    assert_eq!(params[1]["schema"]["type"], "array");
    assert_eq!(params[1]["schema"]["items"]["type"], "string");
}

#[test]
fn test_status_only_handler_has_empty_content() {
    let temp = demo_project();
    let doc = generate_document(&temp);

    let operation = &doc["paths"]["/status"]["put"];
    let response = &operation["responses"]["204"];
    assert_eq!(response["content"], serde_json::json!({}));
    assert!(operation.get("requestBody").is_none());
}

#[test]
fn test_enum_component() {
    let temp = demo_project();
    let doc = generate_document(&temp);

    let schema = &doc["paths"]["/state"]["get"]["responses"]["200"]["content"]
        ["application/json"]["schema"];
    assert_eq!(schema["$ref"], "#/components/schemas/Code");

    let code = &doc["components"]["schemas"]["Code"];
    assert_eq!(code["type"], "integer");
    assert_eq!(code["enum"], serde_json::json!([1, 2]));
    assert_eq!(
        code["x-enum-varnames"],
        serde_json::json!(["Active", "Inactive"])
    );
}

#[test]
fn test_helper_indirection_reaches_parent_route() {
    let temp = demo_project();
    let doc = generate_document(&temp);

    let schema = &doc["paths"]["/posts"]["post"]["responses"]["201"]["content"]
        ["application/json"]["schema"];
    assert_eq!(schema["$ref"], "#/components/schemas/Contact");
}

#[test]
fn test_bind_expands_body_and_query() {
    let temp = demo_project();
    let doc = generate_document(&temp);

    let operation = &doc["paths"]["/contacts/{id}"]["put"];
    let content = operation["requestBody"]["content"].as_object().unwrap();
    assert!(content.contains_key("application/x-www-form-urlencoded"));
    assert!(content.contains_key("application/json"));
    assert!(content.contains_key("application/xml"));
    assert!(content.contains_key("application/yaml"));
    assert_eq!(content.len(), 4);

    // The bound query parameter is spread into one parameter per property.
    let params = operation["parameters"].as_array().unwrap();
    assert!(params
        .iter()
        .any(|p| p["name"] == "Name" && p["in"] == "query"));

    // text/plain response from c.String.
    assert_eq!(
        operation["responses"]["200"]["content"]["text/plain"]["schema"]["type"],
        "string"
    );
}

#[test]
fn test_default_operation_ids() {
    let temp = demo_project();
    let doc = generate_document(&temp);

    assert_eq!(
        doc["paths"]["/contacts/{id}"]["get"]["operationId"],
        "getContactsId"
    );
    assert_eq!(doc["paths"]["/contacts"]["post"]["operationId"], "postContacts");
    assert_eq!(doc["paths"]["/status"]["put"]["operationId"], "putStatus");
}

#[test]
fn test_servers_from_config() {
    let temp = demo_project();
    let doc = generate_document(&temp);

    assert_eq!(doc["openapi"], "3.0.0");
    assert_eq!(doc["servers"][0]["url"], "http://localhost:8080/");
}

#[test]
fn test_every_reference_resolves_to_a_component() {
    let temp = demo_project();
    let doc = generate_document(&temp);

    let schemas = doc["components"]["schemas"].as_object().unwrap();
    let mut refs = Vec::new();
    collect_refs(&doc, &mut refs);
    assert!(!refs.is_empty());
    for reference in refs {
        let name = reference.strip_prefix("#/components/schemas/").unwrap();
        assert!(schemas.contains_key(name), "missing component {}", name);
    }
}

fn collect_refs(value: &Value, refs: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                if key == "$ref" {
                    if let Some(reference) = value.as_str() {
                        refs.push(reference.to_string());
                    }
                } else {
                    collect_refs(value, refs);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_refs(item, refs);
            }
        }
        _ => {}
    }
}

#[test]
fn test_output_is_deterministic() {
    let temp = demo_project();
    let first = generate_content(&temp);
    let second = generate_content(&temp);
    assert_eq!(first, second);
}

#[test]
fn test_yaml_extension_writes_yaml() {
    let temp = demo_project();
    let mut service = Service::new()
        .with_custom_work_dir(temp.path())
        .with_config(Config::default())
        .with_handler_scan_paths(None, &[]);

    gin::create_routes(&mut service, &route_table()).unwrap();
    gin::parse_routes(&mut service).unwrap();

    let written = openapi::generate(&service, "openapi.yaml").unwrap();
    let content = fs::read_to_string(written).unwrap();
    assert!(content.contains("openapi: 3.0.0"));

    // No extension defaults to .json.
    let written = openapi::generate(&service, "spec").unwrap();
    assert!(written.to_string_lossy().ends_with("spec.json"));
}

#[test]
fn test_custom_recognizer_short_circuits_vocabulary() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), "go.mod", "module example.com/custom\n\ngo 1.21\n");
    write_file(
        temp.path(),
        "main.go",
        r#"package main

import (
	"net/http"

	"github.com/gin-gonic/gin"
)

func GetThing(c *gin.Context) {
	c.JSON(http.StatusOK, "ok")
}
"#,
    );

    // Intercepts the context's JSON call and substitutes its own route; the
    // built-in JSON extractor must never run for that call expression.
    let recognizer: CustomFunc = Rc::new(|ctx_name: &str, builder: &mut ContextFuncBuilder| {
        if builder.call_name() != format!("{}.JSON", ctx_name) {
            return Ok(None);
        }
        let mut route = builder.route().clone();
        route.return_types = add_return_type(
            std::mem::take(&mut route.return_types),
            ReturnType {
                status_code: 418,
                content_type: "application/json".to_string(),
                field: Field::of_kind("struct"),
            },
        );
        Ok(Some(route))
    });

    let mut service = Service::new()
        .with_custom_work_dir(temp.path())
        .with_config(Config::default())
        .with_handler_scan_paths(None, &[])
        .with_custom_func(recognizer);

    let table: RouteTable = serde_json::from_str(
        r#"[{"method": "GET", "path": "/thing", "handler": "main.GetThing"}]"#,
    )
    .unwrap();
    gin::create_routes(&mut service, &table).unwrap();
    gin::parse_routes(&mut service).unwrap();

    let route = &service.routes[0];
    let codes: Vec<u16> = route
        .return_types
        .iter()
        .map(|rt| rt.status_code)
        .collect();
    // The substituted route survives, and the vocabulary's 200/JSON entry
    // for the intercepted call never appears.
    assert_eq!(codes, vec![418]);

    // The replacement also flows through to the emitted document.
    let written = openapi::generate(&service, "openapi.json").unwrap();
    let doc: Value = serde_json::from_str(&fs::read_to_string(written).unwrap()).unwrap();
    let responses = doc["paths"]["/thing"]["get"]["responses"].as_object().unwrap();
    assert!(responses.contains_key("418"));
    assert!(!responses.contains_key("200"));
}

#[test]
fn test_denied_paths_are_filtered() {
    let temp = demo_project();
    let mut service = Service::new()
        .with_custom_work_dir(temp.path())
        .with_config(Config::default())
        .with_denied_path_prefix("/status")
        .with_handler_scan_paths(None, &[]);

    gin::create_routes(&mut service, &route_table()).unwrap();
    assert!(service.routes.iter().all(|route| route.path != "/status"));
}
