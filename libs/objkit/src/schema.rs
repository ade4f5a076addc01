//! Schema types: per-field validation, defaults, imputation, and the merge
//! rules used by property resolution.
//!
//! A category's `schema` field is a catalog mapping field names to type
//! descriptors. A descriptor is either a shorthand kind string (`"string"`)
//! or a catalog `{type, default?, repeated?, mergeable?, inherit?,
//! impute?}`. Every object additionally understands the built-in default
//! fields (`name`, `extends`, `__category`, ...), and two names are typed
//! independently of any schema to break the bootstrap cycle: `__category`
//! and `extends`.

use catalog::{Catalog, Value};

use crate::error::{CoreError, Result};
use crate::object::WebObject;

// Reserved data keys.
pub const FIELD_CATEGORY: &str = "__category";
pub const FIELD_EXTENDS: &str = "extends";
pub const FIELD_CONTAINER: &str = "container";
pub const FIELD_STATUS: &str = "__status";
pub const FIELD_NAME: &str = "name";
pub const FIELD_SCHEMA: &str = "schema";
pub const FIELD_DEFAULTS: &str = "defaults";
pub const FIELD_CLASS: &str = "class";
pub const FIELD_TTL: &str = "ttl";
pub const FIELD_ALLOW_CUSTOM: &str = "allow_custom_fields";
pub const FIELD_DEFAULT_ENDPOINTS: &str = "default_endpoints";
pub const FIELD_ENTRIES: &str = "entries";
pub const FIELD_SPACES: &str = "spaces";
pub const FIELD_CONTENT: &str = "content";
pub const FIELD_ROOT: &str = "root";
pub const FIELD_DEFAULT_PATH: &str = "default_path";

/// The plural-read sentinel: `obj.get("tags$")` fetches all values.
pub const PLURAL_SUFFIX: char = '$';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    String,
    Integer,
    Float,
    Boolean,
    Ref,
    Catalog,
    /// No constraint; used for custom fields and bootstrap reads.
    Generic,
}

impl TypeKind {
    fn parse(s: &str) -> Option<TypeKind> {
        match s {
            "string" => Some(TypeKind::String),
            "integer" => Some(TypeKind::Integer),
            "float" => Some(TypeKind::Float),
            "boolean" => Some(TypeKind::Boolean),
            "ref" => Some(TypeKind::Ref),
            "catalog" => Some(TypeKind::Catalog),
            "generic" => Some(TypeKind::Generic),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            TypeKind::String => "string",
            TypeKind::Integer => "integer",
            TypeKind::Float => "float",
            TypeKind::Boolean => "boolean",
            TypeKind::Ref => "ref",
            TypeKind::Catalog => "catalog",
            TypeKind::Generic => "generic",
        }
    }

    fn admits(self, value: &Value) -> bool {
        match self {
            TypeKind::String => matches!(value, Value::String(_)),
            TypeKind::Integer => matches!(value, Value::Int(_)),
            TypeKind::Float => matches!(value, Value::Int(_) | Value::Float(_)),
            TypeKind::Boolean => matches!(value, Value::Bool(_)),
            TypeKind::Ref => matches!(value, Value::Ref(_)),
            TypeKind::Catalog => matches!(value, Value::Catalog(_)),
            TypeKind::Generic => true,
        }
    }
}

/// A schema node: what one field accepts and how its values combine across
/// the inheritance chain.
#[derive(Debug, Clone)]
pub struct FieldType {
    pub kind: TypeKind,
    pub default: Option<Value>,
    /// Multiple values under the key are legitimate; they concatenate.
    pub repeated: bool,
    /// Catalog-valued field whose inherited layers deep-merge.
    pub mergeable: bool,
    /// Consult prototypes when the own data lacks the key.
    pub inherit: bool,
    /// Name of a registered imputation deriving the value when none exists.
    pub impute: Option<String>,
}

impl Default for FieldType {
    fn default() -> Self {
        FieldType {
            kind: TypeKind::Generic,
            default: None,
            repeated: false,
            mergeable: false,
            inherit: true,
            impute: None,
        }
    }
}

impl FieldType {
    pub fn new(kind: TypeKind) -> Self {
        FieldType {
            kind,
            ..Default::default()
        }
    }

    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    pub fn mergeable(mut self) -> Self {
        self.mergeable = true;
        self.kind = TypeKind::Catalog;
        self
    }

    pub fn no_inherit(mut self) -> Self {
        self.inherit = false;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn imputed(mut self, name: impl Into<String>) -> Self {
        self.impute = Some(name.into());
        self
    }

    /// Parse a descriptor from schema data: a kind string or a catalog.
    pub fn from_value(value: &Value) -> Result<FieldType> {
        match value {
            Value::String(kind) => TypeKind::parse(kind)
                .map(FieldType::new)
                .ok_or_else(|| CoreError::Decode(format!("unknown field type '{kind}'"))),
            Value::Catalog(desc) => {
                let kind = match desc.get("type").and_then(|v| v.as_str()) {
                    Some(kind) => TypeKind::parse(kind)
                        .ok_or_else(|| CoreError::Decode(format!("unknown field type '{kind}'")))?,
                    None => TypeKind::Generic,
                };
                let mut ty = FieldType::new(kind);
                ty.default = desc.get("default").cloned();
                ty.repeated = desc.get("repeated").and_then(|v| v.as_bool()).unwrap_or(false);
                ty.mergeable = desc.get("mergeable").and_then(|v| v.as_bool()).unwrap_or(false);
                ty.inherit = desc.get("inherit").and_then(|v| v.as_bool()).unwrap_or(true);
                ty.impute = desc
                    .get("impute")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                Ok(ty)
            }
            other => Err(CoreError::Decode(format!(
                "malformed field type descriptor: {other:?}"
            ))),
        }
    }

    pub fn validate(&self, key: &str, value: &Value) -> Result<()> {
        if self.kind.admits(value) {
            Ok(())
        } else {
            Err(CoreError::InvalidValue {
                key: key.to_string(),
                expected: self.kind.label().to_string(),
            })
        }
    }

    /// Run the registered imputation, if any.
    pub fn impute_for(&self, obj: &WebObject) -> Option<Value> {
        let name = self.impute.as_deref()?;
        let func = find_impute(name)?;
        func(obj)
    }
}

/// Effective schema applied to an object: the category's declared fields
/// over the built-in default fields, plus defaults and the custom-field
/// policy.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<(String, FieldType)>,
    pub defaults: Catalog,
    pub allow_custom: bool,
}

impl Schema {
    /// Schema of objects with no category: default fields only, custom
    /// fields allowed.
    pub fn generic() -> Schema {
        Schema {
            fields: default_fields(),
            defaults: Catalog::new(),
            allow_custom: true,
        }
    }

    /// Build the child schema from a category's own data. This is also how
    /// the root category describes itself: its own `schema` entries merged
    /// over the default field catalog, no recursion involved.
    pub fn from_category_data(data: &Catalog) -> Result<Schema> {
        let mut fields: Vec<(String, FieldType)> = Vec::new();
        if let Some(declared) = data.get(FIELD_SCHEMA).and_then(|v| v.as_catalog()) {
            for entry in declared.iter() {
                fields.push((entry.key.clone(), FieldType::from_value(&entry.value)?));
            }
        }
        for (key, ty) in default_fields() {
            if !fields.iter().any(|(k, _)| k == &key) {
                fields.push((key, ty));
            }
        }
        let defaults = data
            .get(FIELD_DEFAULTS)
            .and_then(|v| v.as_catalog())
            .cloned()
            .unwrap_or_default();
        let allow_custom = data
            .get(FIELD_ALLOW_CUSTOM)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        Ok(Schema {
            fields,
            defaults,
            allow_custom,
        })
    }

    pub fn field(&self, key: &str) -> Option<&FieldType> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, ty)| ty)
    }

    /// Fixed types that must resolve independently of any schema so the
    /// bootstrap does not recurse: the category reference and the
    /// prototype list.
    pub fn bootstrap_field(key: &str) -> Option<FieldType> {
        match key {
            FIELD_CATEGORY => Some(FieldType::new(TypeKind::Ref).no_inherit()),
            FIELD_EXTENDS => Some(FieldType::new(TypeKind::Ref).repeated().no_inherit()),
            _ => None,
        }
    }

    /// Effective type for a key during reads: bootstrap names first, then
    /// the schema, then the generic fallback for custom fields.
    pub fn effective_field(&self, key: &str) -> FieldType {
        Schema::bootstrap_field(key)
            .or_else(|| self.field(key).cloned())
            .unwrap_or_default()
    }

    /// Validate an own-data catalog: unknown fields, per-value types, and
    /// arity of single-valued fields.
    pub fn validate_data(&self, data: &Catalog) -> Result<()> {
        let mut seen: Vec<&str> = Vec::new();
        for entry in data.iter() {
            let key = entry.key.as_str();
            let ty = match Schema::bootstrap_field(key) {
                Some(ty) => ty,
                None => match self.field(key) {
                    Some(ty) => ty.clone(),
                    None if self.allow_custom => FieldType::default(),
                    None => {
                        return Err(CoreError::UnknownField {
                            key: key.to_string(),
                        })
                    }
                },
            };
            ty.validate(key, &entry.value)?;
            if !ty.repeated && seen.contains(&key) {
                let count = data.get_all(key).count();
                return Err(CoreError::RepeatedValue {
                    key: key.to_string(),
                    count,
                });
            }
            seen.push(key);
        }
        Ok(())
    }
}

/// Fields every web object understands, schema or not.
pub fn default_fields() -> Vec<(String, FieldType)> {
    use TypeKind::*;
    vec![
        (FIELD_NAME.into(), FieldType::new(String)),
        ("info".into(), FieldType::new(String)),
        (
            "title".into(),
            FieldType::new(String).imputed("title_from_name"),
        ),
        (FIELD_EXTENDS.into(), FieldType::new(Ref).repeated().no_inherit()),
        (FIELD_CATEGORY.into(), FieldType::new(Ref).no_inherit()),
        (FIELD_CONTAINER.into(), FieldType::new(Ref).no_inherit()),
        (FIELD_TTL.into(), FieldType::new(Integer).no_inherit()),
        (FIELD_STATUS.into(), FieldType::new(String).no_inherit()),
        (
            FIELD_DEFAULT_ENDPOINTS.into(),
            FieldType::new(Catalog).mergeable(),
        ),
    ]
}

/// Recursive first-wins merge of catalog layers: key order follows first
/// appearance; when every layer holds a catalog under a key, the layers
/// merge recursively, otherwise the earliest value wins.
pub fn merge_catalogs(layers: &[&Catalog]) -> Catalog {
    let mut merged = Catalog::new();
    let mut seen: Vec<&str> = Vec::new();
    for (i, layer) in layers.iter().enumerate() {
        for entry in layer.iter() {
            let key = entry.key.as_str();
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);

            let versions: Vec<&Value> = layers[i..]
                .iter()
                .flat_map(|l| l.get_all(key))
                .collect();
            if versions.len() > 1 && versions.iter().all(|v| v.as_catalog().is_some()) {
                let subs: Vec<&Catalog> =
                    versions.iter().filter_map(|v| v.as_catalog()).collect();
                merged.push(key, merge_catalogs(&subs));
            } else {
                merged.push(key, entry.value.clone());
            }
        }
    }
    merged
}

/// A named imputation function, linked in through `inventory`.
pub struct ImputeFn {
    pub name: &'static str,
    pub func: fn(&WebObject) -> Option<Value>,
}

inventory::collect!(ImputeFn);

pub fn find_impute(name: &str) -> Option<fn(&WebObject) -> Option<Value>> {
    inventory::iter::<ImputeFn>
        .into_iter()
        .find(|f| f.name == name)
        .map(|f| f.func)
}

fn title_from_name(obj: &WebObject) -> Option<Value> {
    let name = obj.get(FIELD_NAME)?;
    let name = name.as_str()?;
    let mut chars = name.chars();
    let first = chars.next()?;
    Some(Value::String(
        first.to_uppercase().collect::<String>() + chars.as_str(),
    ))
}

inventory::submit! {
    ImputeFn { name: "title_from_name", func: title_from_name }
}
