//! Derive an OpenAPI document from endpoint metadata
//!
//! The document is assembled from `utoipa::openapi` objects and serialized
//! with serde.

use crate::config::OpenApiConfig;
use crate::core::depend::{Param, Source};
use crate::core::endpoint::Endpoint;
use crate::core::error::BindResult;
use crate::core::field::{Field, FieldKind, FieldType};
use crate::security::SecurityRequirement;
use http::{Method, StatusCode};
use std::collections::HashSet;
use utoipa::openapi::path::{Operation, OperationBuilder, Parameter, ParameterBuilder, ParameterIn};
use utoipa::openapi::request_body::{RequestBody, RequestBodyBuilder};
use utoipa::openapi::schema::{
    Array, Object, ObjectBuilder, Schema, SchemaFormat, SchemaType, Type,
};
use utoipa::openapi::security::SecurityRequirement as RequirementObject;
use utoipa::openapi::{
    ContentBuilder, Deprecated, InfoBuilder, OpenApi, PathItem, Paths, Ref, RefOr, Required,
    ResponseBuilder, Responses, Server,
};

const ERROR_SCHEMA: &str = "ErrorResponse";
const MAX_DEPTH: usize = 32;

/// Builds an OpenAPI document endpoint by endpoint
///
/// ```rust,ignore
/// let document = OpenApiBuilder::new(&config.openapi)
///     .validation_status(backend.validation_status())
///     .endpoints(&endpoints)
///     .build();
/// println!("{}", openapi::to_yaml(&document)?);
/// ```
#[derive(Debug, Clone)]
pub struct OpenApiBuilder {
    document: OpenApi,
    validation_status: StatusCode,
}

impl OpenApiBuilder {
    pub fn new(config: &OpenApiConfig) -> Self {
        let info = InfoBuilder::new()
            .title(config.title.as_str())
            .version(config.version.as_str())
            .description(config.description.as_deref())
            .build();
        let mut document = OpenApi::new(info, Paths::new());
        if !config.servers.is_empty() {
            document.servers = Some(config.servers.iter().map(Server::new).collect());
        }
        Self {
            document,
            validation_status: StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    /// Status documented for validation failures (422 unless the backend differs)
    pub fn validation_status(mut self, status: StatusCode) -> Self {
        self.validation_status = status;
        self
    }

    pub fn endpoint(mut self, endpoint: &Endpoint) -> Self {
        self.add_endpoint(endpoint);
        self
    }

    pub fn endpoints<'a>(mut self, endpoints: impl IntoIterator<Item = &'a Endpoint>) -> Self {
        for endpoint in endpoints {
            self.add_endpoint(endpoint);
        }
        self
    }

    pub fn build(self) -> OpenApi {
        self.document
    }

    fn add_endpoint(&mut self, endpoint: &Endpoint) {
        let mut parts = OperationParts::default();
        parts.collect(endpoint.params(), 0);
        for dep in endpoint.pre_depends() {
            parts.add_provider(dep.provider().security(), dep.provider().params(), 1);
        }

        let mut responses = Responses::new();
        for response in endpoint.responses() {
            let mut builder = ResponseBuilder::new().description(response.description.as_str());
            if let Some(media_type) = &response.media_type {
                let content = ContentBuilder::new()
                    .example(response.example.clone())
                    .build();
                builder = builder.content(media_type.as_str(), content);
            }
            responses
                .responses
                .insert(response.status.to_string(), RefOr::T(builder.build()));
        }

        let validation_key = self.validation_status.as_u16().to_string();
        if parts.has_fields && !responses.responses.contains_key(&validation_key) {
            let content = ContentBuilder::new()
                .schema(Some(RefOr::Ref(Ref::from_schema_name(ERROR_SCHEMA))))
                .build();
            let response = ResponseBuilder::new()
                .description("Validation Error")
                .content("application/json", content)
                .build();
            responses.responses.insert(validation_key, RefOr::T(response));
            self.document
                .components
                .get_or_insert_with(Default::default)
                .schemas
                .entry(ERROR_SCHEMA.to_string())
                .or_insert_with(|| RefOr::T(error_schema()));
        }

        let mut security = Vec::new();
        for requirement in parts.security.iter() {
            security.push(RequirementObject::new(
                requirement.name.as_str(),
                requirement.scopes.iter().map(String::as_str),
            ));
            self.document
                .components
                .get_or_insert_with(Default::default)
                .security_schemes
                .entry(requirement.name.clone())
                .or_insert_with(|| requirement.scheme.clone());
        }

        let tags = endpoint.tags().to_vec();
        let operation = OperationBuilder::new()
            .operation_id(Some(endpoint.operation_id()))
            .summary(endpoint.summary())
            .description(endpoint.description())
            .tags((!tags.is_empty()).then_some(tags))
            .parameters((!parts.parameters.is_empty()).then_some(parts.parameters))
            .request_body(parts.body.into_request_body())
            .responses(responses)
            .securities((!security.is_empty()).then_some(security))
            .deprecated(endpoint.is_deprecated().then_some(Deprecated::True))
            .build();

        tracing::debug!(
            "Documented {} {} as '{}'",
            endpoint.method(),
            endpoint.path(),
            endpoint.operation_id()
        );
        let item = self
            .document
            .paths
            .paths
            .entry(endpoint.path().to_string())
            .or_insert_with(PathItem::default);
        match operation_slot(item, endpoint.method()) {
            Some(slot) => *slot = Some(operation),
            None => tracing::warn!(
                "{} {} has no OpenAPI operation slot, left undocumented",
                endpoint.method(),
                endpoint.path()
            ),
        }
    }
}

/// Serialize a document as pretty JSON
pub fn to_json(document: &OpenApi) -> BindResult<String> {
    Ok(serde_json::to_string_pretty(document)?)
}

/// Serialize a document as YAML
pub fn to_yaml(document: &OpenApi) -> BindResult<String> {
    Ok(serde_yaml::to_string(document)?)
}

fn operation_slot<'a>(item: &'a mut PathItem, method: &Method) -> Option<&'a mut Option<Operation>> {
    let slot = match method.as_str() {
        "GET" => &mut item.get,
        "PUT" => &mut item.put,
        "POST" => &mut item.post,
        "DELETE" => &mut item.delete,
        "OPTIONS" => &mut item.options,
        "HEAD" => &mut item.head,
        "PATCH" => &mut item.patch,
        "TRACE" => &mut item.trace,
        _ => return None,
    };
    Some(slot)
}

#[derive(Default)]
struct OperationParts {
    parameters: Vec<Parameter>,
    seen: HashSet<(String, String)>,
    body: BodyParts,
    security: Vec<SecurityRequirement>,
    has_fields: bool,
}

impl OperationParts {
    fn collect(&mut self, params: &[Param], depth: usize) {
        if depth > MAX_DEPTH {
            return;
        }
        for param in params {
            match &param.source {
                Source::Field(field) => self.add_field(&param.name, field),
                Source::Depends(dep) => {
                    self.add_provider(dep.provider().security(), dep.provider().params(), depth + 1)
                }
            }
        }
    }

    /// A security scheme is documented under `securitySchemes`, so its own
    /// authorization field is not repeated as a parameter
    fn add_provider(
        &mut self,
        requirement: Option<SecurityRequirement>,
        params: &[Param],
        depth: usize,
    ) {
        match requirement {
            Some(requirement) => self.add_security(requirement),
            None => self.collect(params, depth),
        }
    }

    fn add_security(&mut self, requirement: SecurityRequirement) {
        match self.security.iter_mut().find(|r| r.name == requirement.name) {
            Some(existing) => {
                for scope in requirement.scopes {
                    if !existing.scopes.contains(&scope) {
                        existing.scopes.push(scope);
                    }
                }
            }
            None => self.security.push(requirement),
        }
    }

    fn add_field(&mut self, name: &str, field: &Field) {
        self.has_fields = true;
        if !field.include_in_schema() {
            return;
        }
        let key = field.key(name).to_string();

        let Some(location) = parameter_in(field.kind()) else {
            self.body.add(key, field);
            return;
        };
        let location_name = field.kind().parameter_location().unwrap_or_default();
        if !self.seen.insert((location_name.to_string(), key.clone())) {
            return;
        }
        let required = if field.is_required() {
            Required::True
        } else {
            Required::False
        };
        self.parameters.push(
            ParameterBuilder::new()
                .name(key)
                .parameter_in(location)
                .required(required)
                .description(field.description_text())
                .schema(Some(field_schema(field)))
                .example(field.example_value().cloned())
                .build(),
        );
    }
}

fn parameter_in(kind: FieldKind) -> Option<ParameterIn> {
    match kind {
        FieldKind::Query | FieldKind::MultiQuery => Some(ParameterIn::Query),
        FieldKind::Header => Some(ParameterIn::Header),
        FieldKind::Cookie => Some(ParameterIn::Cookie),
        FieldKind::Path => Some(ParameterIn::Path),
        _ => None,
    }
}

/// Request body contributions of body, json, form and file fields
#[derive(Default)]
struct BodyParts {
    whole_json: Option<(Schema, bool)>,
    json: Option<ObjectBuilder>,
    json_required: bool,
    form: Option<ObjectBuilder>,
    form_required: bool,
    has_file: bool,
}

impl BodyParts {
    fn add(&mut self, key: String, field: &Field) {
        let schema = field_schema(field);
        match field.kind() {
            FieldKind::Json => {
                self.whole_json = Some((schema, field.is_required()));
            }
            FieldKind::Body => {
                self.json_required |= field.is_required();
                self.json = Some(add_property(self.json.take(), key, schema, field.is_required()));
            }
            kind => {
                self.has_file |= kind == FieldKind::File;
                self.form_required |= field.is_required();
                self.form = Some(add_property(self.form.take(), key, schema, field.is_required()));
            }
        }
    }

    fn into_request_body(self) -> Option<RequestBody> {
        let (media_type, schema, required) = if let Some(form) = self.form {
            let media_type = if self.has_file {
                "multipart/form-data"
            } else {
                "application/x-www-form-urlencoded"
            };
            (media_type, Schema::Object(form.build()), self.form_required)
        } else if let Some(json) = self.json {
            ("application/json", Schema::Object(json.build()), self.json_required)
        } else if let Some((schema, required)) = self.whole_json {
            ("application/json", schema, required)
        } else {
            return None;
        };

        let content = ContentBuilder::new().schema(Some(schema)).build();
        Some(
            RequestBodyBuilder::new()
                .content(media_type, content)
                .required(Some(if required { Required::True } else { Required::False }))
                .build(),
        )
    }
}

fn add_property(
    object: Option<ObjectBuilder>,
    key: String,
    schema: Schema,
    required: bool,
) -> ObjectBuilder {
    let object = object
        .unwrap_or_else(|| ObjectBuilder::new().schema_type(Type::Object))
        .property(key.as_str(), schema);
    if required { object.required(key) } else { object }
}

fn schema_type(field_type: &FieldType) -> SchemaType {
    match field_type {
        FieldType::String | FieldType::Uuid | FieldType::DateTime | FieldType::Date => {
            SchemaType::Type(Type::String)
        }
        FieldType::Integer => SchemaType::Type(Type::Integer),
        FieldType::Float => SchemaType::Type(Type::Number),
        FieldType::Boolean => SchemaType::Type(Type::Boolean),
        FieldType::Array(_) => SchemaType::Type(Type::Array),
        FieldType::Object => SchemaType::Type(Type::Object),
        FieldType::Any => SchemaType::AnyValue,
    }
}

fn type_schema(field_type: &FieldType) -> Schema {
    if let FieldType::Array(inner) = field_type {
        return Schema::Array(Array::new(type_schema(inner)));
    }
    let format = field_type
        .schema_type()
        .1
        .map(|format| SchemaFormat::Custom(format.to_string()));
    Schema::Object(
        ObjectBuilder::new()
            .schema_type(schema_type(field_type))
            .format(format)
            .build(),
    )
}

fn field_schema(field: &Field) -> Schema {
    let description = match field.kind().parameter_location() {
        Some(_) => None,
        None => field.description_text().map(str::to_string),
    };
    let default = field.default_value().filter(|v| !v.is_null()).cloned();

    let schema = match field.kind() {
        FieldKind::File => Schema::Object(
            ObjectBuilder::new()
                .schema_type(Type::String)
                .format(Some(SchemaFormat::Custom("binary".to_string())))
                .build(),
        ),
        _ => type_schema(field.field_type()),
    };
    let mut object: Object = match schema {
        Schema::Object(object) => object,
        Schema::Array(mut array) => {
            array.default = default;
            array.description = description;
            return Schema::Array(array);
        }
        other => return other,
    };
    if let Some(format) = field.field_format() {
        if let Some(openapi_format) = format.openapi_format() {
            object.format = Some(SchemaFormat::Custom(openapi_format.to_string()));
        }
        object.pattern = format.openapi_pattern();
    }
    object.default = default;
    object.description = description;
    Schema::Object(object)
}

fn typed(schema_type: Type) -> Schema {
    Schema::Object(ObjectBuilder::new().schema_type(schema_type).build())
}

fn error_schema() -> Schema {
    Schema::Object(
        ObjectBuilder::new()
            .schema_type(Type::Object)
            .property("code", typed(Type::String))
            .property("message", typed(Type::String))
            .property("details", typed(Type::Object))
            .required("code")
            .required("message")
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AxumBackend, Backend};
    use crate::core::depend::{Arguments, Depends};
    use crate::core::endpoint::{Reply, ResponseModel};
    use crate::core::field::FieldFormat;
    use crate::security::{HttpBasic, OAuth2PasswordBearer, SecurityScheme};
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn ok_handler() -> impl Fn(Arguments) -> futures::future::Ready<BindResult<Reply>> + Send + Sync {
        |_| futures::future::ready(Ok(Reply::json(Value::Null)))
    }

    fn backend() -> Arc<dyn Backend> {
        Arc::new(AxumBackend)
    }

    fn document(endpoints: &[Endpoint]) -> Value {
        let doc = OpenApiBuilder::new(&OpenApiConfig::default())
            .endpoints(endpoints)
            .build();
        serde_json::from_str(&to_json(&doc).unwrap()).unwrap()
    }

    #[test]
    fn test_parameters_and_validation_response() {
        let endpoint = Endpoint::get("/items/{id}")
            .param("id", Field::path().of_type(FieldType::Integer))
            .param("tags", Field::multiquery().description("Filter by tag"))
            .param("x_trace", Field::header().default(json!("none")))
            .param("email", Field::query().format(FieldFormat::Email).optional())
            .response(ResponseModel::new(200, "The item"))
            .handler(ok_handler())
            .build()
            .unwrap();

        let doc = document(&[endpoint]);
        let op = &doc["paths"]["/items/{id}"]["get"];
        assert_eq!(op["operationId"], "get_items_id");

        let params = op["parameters"].as_array().unwrap();
        assert_eq!(params.len(), 4);
        assert_eq!(params[0]["in"], "path");
        assert_eq!(params[0]["required"], true);
        assert_eq!(params[0]["schema"]["type"], "integer");
        assert_eq!(params[1]["schema"]["type"], "array");
        assert_eq!(params[1]["schema"]["items"]["type"], "string");
        assert_eq!(params[1]["description"], "Filter by tag");
        assert_eq!(params[2]["required"], false);
        assert_eq!(params[2]["schema"]["default"], "none");
        assert_eq!(params[3]["schema"]["format"], "email");

        assert_eq!(op["responses"]["200"]["description"], "The item");
        assert_eq!(
            op["responses"]["422"]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/ErrorResponse"
        );
        assert_eq!(doc["components"]["schemas"]["ErrorResponse"]["type"], "object");
    }

    #[test]
    fn test_hyper_validation_status() {
        let endpoint = Endpoint::get("/search")
            .param("q", Field::query())
            .handler(ok_handler())
            .build()
            .unwrap();
        let doc = OpenApiBuilder::new(&OpenApiConfig::default())
            .validation_status(StatusCode::BAD_REQUEST)
            .endpoint(&endpoint)
            .build();
        let operation = doc.paths.paths["/search"].get.as_ref().unwrap();
        assert!(operation.responses.responses.contains_key("400"));
        assert!(!operation.responses.responses.contains_key("422"));
    }

    #[test]
    fn test_request_bodies() {
        let json_endpoint = Endpoint::post("/users")
            .param("name", Field::body().of_type(FieldType::String))
            .param("age", Field::body().of_type(FieldType::Integer).optional())
            .handler(ok_handler())
            .build()
            .unwrap();
        let form_endpoint = Endpoint::post("/login")
            .param("username", Field::form())
            .handler(ok_handler())
            .build()
            .unwrap();
        let upload_endpoint = Endpoint::post("/upload")
            .param("file", Field::file())
            .param("note", Field::form().optional())
            .handler(ok_handler())
            .build()
            .unwrap();

        let doc = document(&[json_endpoint, form_endpoint, upload_endpoint]);

        let body = &doc["paths"]["/users"]["post"]["requestBody"];
        assert_eq!(body["required"], true);
        let schema = &body["content"]["application/json"]["schema"];
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["name"]));
        assert_eq!(schema["properties"]["age"]["type"], "integer");

        let body = &doc["paths"]["/login"]["post"]["requestBody"];
        assert!(body["content"]["application/x-www-form-urlencoded"].is_object());

        let body = &doc["paths"]["/upload"]["post"]["requestBody"];
        let schema = &body["content"]["multipart/form-data"]["schema"];
        assert_eq!(schema["properties"]["file"]["format"], "binary");
        assert_eq!(schema["required"], json!(["file"]));
    }

    #[test]
    fn test_security_from_dependencies() {
        let oauth2 = OAuth2PasswordBearer::builder(backend(), "/token")
            .scope("me", "Current user")
            .build()
            .unwrap();
        let user = Depends::from_fn(
            "current_user",
            vec![Param::depends(
                "token",
                oauth2.with_scopes(&["me"]).unwrap().into_depends(),
            )],
            |args| async move { args.get::<Value>("token") },
        );
        let me = Endpoint::get("/me")
            .depends("user", user)
            .handler(ok_handler())
            .build()
            .unwrap();
        let basic = Endpoint::get("/basic")
            .pre_depends(HttpBasic::new(backend()).unwrap().into_depends())
            .handler(ok_handler())
            .build()
            .unwrap();

        let doc = document(&[me, basic]);
        assert_eq!(
            doc["paths"]["/me"]["get"]["security"],
            json!([{ "OAuth2PasswordBearer": ["me"] }])
        );
        assert_eq!(
            doc["paths"]["/basic"]["get"]["security"],
            json!([{ "HTTPBasic": [] }])
        );

        let schemes = &doc["components"]["securitySchemes"];
        assert_eq!(schemes["OAuth2PasswordBearer"]["type"], "oauth2");
        assert_eq!(schemes["HTTPBasic"]["scheme"], "basic");

        // Scheme fields live under securitySchemes only
        assert!(doc["paths"]["/me"]["get"]["parameters"].is_null());
        assert!(doc["paths"]["/basic"]["get"]["parameters"].is_null());
        assert!(doc["paths"]["/me"]["get"]["responses"]["422"].is_null());
    }

    #[test]
    fn test_hidden_fields_and_yaml() {
        let endpoint = Endpoint::get("/internal")
            .param("debug", Field::query().hidden().optional())
            .handler(ok_handler())
            .build()
            .unwrap();
        let doc = OpenApiBuilder::new(&OpenApiConfig::default())
            .endpoint(&endpoint)
            .build();
        let operation = doc.paths.paths["/internal"].get.as_ref().unwrap();
        assert!(operation.parameters.is_none());

        let yaml = to_yaml(&doc).unwrap();
        assert!(yaml.contains("openapi: 3.1.0"));
        assert!(yaml.contains("/internal:"));
    }

    #[test]
    fn test_scheme_field_next_to_plain_header() {
        let endpoint = Endpoint::get("/keys")
            .param("x_trace", Field::header().optional())
            .pre_depends(
                crate::security::ApiKey::header(backend(), "X-API-Key")
                    .unwrap()
                    .into_depends(),
            )
            .handler(ok_handler())
            .build()
            .unwrap();
        let doc = document(&[endpoint]);
        let params = doc["paths"]["/keys"]["get"]["parameters"].as_array().unwrap();
        let names: Vec<&str> = params.iter().filter_map(|p| p["name"].as_str()).collect();
        assert_eq!(names, vec!["x_trace"]);
        assert_eq!(
            doc["components"]["securitySchemes"]["APIKeyHeader"]["name"],
            "X-API-Key"
        );
    }

    #[test]
    fn test_whole_json_body_and_servers() {
        let config = OpenApiConfig {
            servers: vec!["https://api.example.com".to_string()],
            ..OpenApiConfig::default()
        };
        let endpoint = Endpoint::put("/settings")
            .param("settings", Field::json().of_type(FieldType::Object))
            .handler(ok_handler())
            .build()
            .unwrap();
        let doc: Value = serde_json::to_value(
            OpenApiBuilder::new(&config).endpoint(&endpoint).build(),
        )
        .unwrap();
        assert_eq!(doc["openapi"], "3.1.0");
        assert_eq!(doc["servers"][0]["url"], "https://api.example.com");
        let body = &doc["paths"]["/settings"]["put"]["requestBody"];
        assert_eq!(body["required"], true);
        assert_eq!(body["content"]["application/json"]["schema"]["type"], "object");
    }
}
