//! Tool and resource declarations offered by the server.
//!
//! The registry is filled once, before the transport starts delivering
//! traffic, and is read-only afterwards. Lookups are linear scans: a device
//! exposes tens of tools, not thousands.

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::error::RegistryError;

/// Declared type of a tool property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    /// Signed integer.
    Integer,
    /// UTF-8 string.
    String,
}

impl PropertyType {
    /// JSON Schema type keyword for this property type.
    #[must_use]
    pub const fn schema_type(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::String => "string",
        }
    }
}

/// A typed value, used for declared defaults and for call arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Integer value.
    Integer(i64),
    /// String value.
    String(String),
    /// Real value as it arrived on the wire.
    Real(f64),
}

impl PropertyValue {
    /// Returns the integer payload, if this is an integer.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Converts a JSON value, rejecting anything but numbers and strings.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Real)),
            _ => None,
        }
    }

    /// Renders the value back to JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Integer(v) => json!(v),
            Self::String(v) => json!(v),
            Self::Real(v) => json!(v),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::Real(v) => write!(f, "{v}"),
        }
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Parameter name; the caller must supply it at this position.
    pub name: String,
    /// Optional human-readable description.
    pub description: Option<String>,
    /// Declared type.
    pub kind: PropertyType,
    /// Optional default, advertised in the schema.
    pub default: Option<PropertyValue>,
}

impl Property {
    /// Declares an integer property.
    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind: PropertyType::Integer,
            default: None,
        }
    }

    /// Declares a string property.
    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind: PropertyType::String,
            default: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the advertised default value.
    #[must_use]
    pub fn with_default(mut self, default: PropertyValue) -> Self {
        self.default = Some(default);
        self
    }

    fn schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".to_string(), json!(self.kind.schema_type()));
        if let Some(description) = &self.description {
            schema.insert("description".to_string(), json!(description));
        }
        if let Some(default) = &self.default {
            schema.insert("default".to_string(), default.to_json());
        }
        Value::Object(schema)
    }
}

/// A named argument supplied by a caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    /// Argument name.
    pub name: String,
    /// Argument value, already coerced to the declared type.
    pub value: PropertyValue,
}

impl Argument {
    /// Creates an argument.
    #[must_use]
    pub fn new(name: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Invoked for a validated `tools/call`.
///
/// The returned text is forwarded verbatim as the call result. Domain
/// failures (value out of range, hardware busy) are reported through that
/// same text; the dispatcher does not interpret it.
pub trait ToolHandler: Send + Sync {
    /// Runs the tool on the dispatch thread.
    fn call(&self, args: &[Argument]) -> String;
}

impl<F> ToolHandler for F
where
    F: Fn(&[Argument]) -> String + Send + Sync,
{
    fn call(&self, args: &[Argument]) -> String {
        self(args)
    }
}

/// Produces the content of a registered resource.
pub trait ResourceReader: Send + Sync {
    /// Returns the text content for `uri`.
    fn read(&self, uri: &str) -> String;
}

impl<F> ResourceReader for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn read(&self, uri: &str) -> String {
        self(uri)
    }
}

/// A remotely invokable tool.
#[derive(Clone)]
pub struct Tool {
    /// Unique tool name.
    pub name: String,
    /// Optional human-readable description.
    pub description: Option<String>,
    /// Ordered call signature.
    pub properties: Vec<Property>,
    handler: Arc<dyn ToolHandler>,
}

impl Tool {
    /// Creates a tool with no properties.
    pub fn new(name: impl Into<String>, handler: impl ToolHandler + 'static) -> Self {
        Self {
            name: name.into(),
            description: None,
            properties: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends a property to the call signature.
    #[must_use]
    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Invokes the handler.
    #[must_use]
    pub fn invoke(&self, args: &[Argument]) -> String {
        self.handler.call(args)
    }

    /// JSON Schema describing the call signature, properties in declared order.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .properties
            .iter()
            .map(|p| (p.name.clone(), p.schema()))
            .collect();
        let required: Vec<&str> = self.properties.iter().map(|p| p.name.as_str()).collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// A readable, URI-addressed resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Unique URI.
    pub uri: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Optional MIME type of the content.
    pub mime_type: Option<String>,
    /// Optional title.
    pub title: Option<String>,
}

impl Resource {
    /// Creates a resource with only the required fields.
    #[must_use]
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
            title: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Everything the server offers.
#[derive(Default)]
pub struct Registry {
    tools: Option<Vec<Tool>>,
    resources: Option<Vec<Resource>>,
    reader: Option<Arc<dyn ResourceReader>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the tool list.
    ///
    /// # Errors
    ///
    /// Fails if tools were already registered, a name is empty, or two tools
    /// share a name.
    pub fn register_tools(
        &mut self,
        tools: impl IntoIterator<Item = Tool>,
    ) -> Result<(), RegistryError> {
        if self.tools.is_some() {
            return Err(RegistryError::AlreadyRegistered { kind: "tools" });
        }

        let tools: Vec<Tool> = tools.into_iter().collect();
        for (i, tool) in tools.iter().enumerate() {
            if tool.name.is_empty() {
                return Err(RegistryError::EmptyName { kind: "tool" });
            }
            if tool.properties.iter().any(|p| p.name.is_empty()) {
                return Err(RegistryError::EmptyName { kind: "property" });
            }
            if tools[..i].iter().any(|t| t.name == tool.name) {
                return Err(RegistryError::Duplicate {
                    kind: "tool",
                    key: tool.name.clone(),
                });
            }
        }

        for tool in &tools {
            tracing::info!(tool = %tool.name, "Registered tool");
        }
        self.tools = Some(tools);
        Ok(())
    }

    /// Stores the resource list and the reader that produces their content.
    ///
    /// # Errors
    ///
    /// Fails if resources were already registered, a URI or name is empty, or
    /// two resources share a URI.
    pub fn register_resources(
        &mut self,
        resources: impl IntoIterator<Item = Resource>,
        reader: impl ResourceReader + 'static,
    ) -> Result<(), RegistryError> {
        if self.resources.is_some() {
            return Err(RegistryError::AlreadyRegistered { kind: "resources" });
        }

        let resources: Vec<Resource> = resources.into_iter().collect();
        for (i, resource) in resources.iter().enumerate() {
            if resource.uri.is_empty() || resource.name.is_empty() {
                return Err(RegistryError::EmptyName { kind: "resource" });
            }
            if resources[..i].iter().any(|r| r.uri == resource.uri) {
                return Err(RegistryError::Duplicate {
                    kind: "resource",
                    key: resource.uri.clone(),
                });
            }
        }

        for resource in &resources {
            tracing::info!(uri = %resource.uri, "Registered resource");
        }
        self.resources = Some(resources);
        self.reader = Some(Arc::new(reader));
        Ok(())
    }

    /// All registered tools, in registration order.
    #[must_use]
    pub fn tools(&self) -> &[Tool] {
        self.tools.as_deref().unwrap_or_default()
    }

    /// All registered resources, in registration order.
    #[must_use]
    pub fn resources(&self) -> &[Resource] {
        self.resources.as_deref().unwrap_or_default()
    }

    /// Returns `true` if at least one tool is registered.
    #[must_use]
    pub fn has_tools(&self) -> bool {
        !self.tools().is_empty()
    }

    /// Returns `true` if at least one resource is registered.
    #[must_use]
    pub fn has_resources(&self) -> bool {
        !self.resources().is_empty()
    }

    /// Finds a tool by name.
    #[must_use]
    pub fn lookup_tool(&self, name: &str) -> Option<&Tool> {
        self.tools().iter().find(|t| t.name == name)
    }

    /// Finds a resource by URI.
    #[must_use]
    pub fn lookup_resource(&self, uri: &str) -> Option<&Resource> {
        self.resources().iter().find(|r| r.uri == uri)
    }

    /// Reads a registered resource's content.
    ///
    /// Returns `None` if the URI is unknown.
    #[must_use]
    pub fn read_resource(&self, uri: &str) -> Option<(&Resource, String)> {
        let resource = self.lookup_resource(uri)?;
        let reader = self.reader.as_ref()?;
        Some((resource, reader.read(uri)))
    }

    /// Checks a `tools/call` against the declared signature.
    ///
    /// Arguments must match the declared properties one-to-one, by name and
    /// position. A real value supplied for an integer property is truncated
    /// toward zero, and rejected if the result does not fit an `i64`; every
    /// other type mismatch rejects the call.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // truncation is the contract
    pub fn validate_call(&self, name: &str, args: Vec<Argument>) -> Option<(&Tool, Vec<Argument>)> {
        let tool = self.lookup_tool(name)?;
        if tool.properties.len() != args.len() {
            return None;
        }

        let mut coerced = Vec::with_capacity(args.len());
        for (declared, arg) in tool.properties.iter().zip(args) {
            if declared.name != arg.name {
                return None;
            }
            let value = match (declared.kind, arg.value) {
                (PropertyType::Integer, PropertyValue::Integer(v)) => PropertyValue::Integer(v),
                (PropertyType::Integer, PropertyValue::Real(v)) => {
                    let v = v.trunc();
                    if !(-I64_BOUND..I64_BOUND).contains(&v) {
                        return None;
                    }
                    PropertyValue::Integer(v as i64)
                }
                (PropertyType::String, PropertyValue::String(v)) => PropertyValue::String(v),
                _ => return None,
            };
            coerced.push(Argument {
                name: arg.name,
                value,
            });
        }

        Some((tool, coerced))
    }
}

// 2^63; integers above `i64::MAX` arrive as reals.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
