use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::RegistryError;
use crate::shape::{self, ColumnDef};

/// Convert a dotted CamelCase identifier into a snake_case backend name.
///
/// Dots become underscores; an underscore is inserted at each lower-to-upper
/// boundary and before the last capital of an acronym run.
pub fn snake_case(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '.' {
            out.push('_');
            continue;
        }
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if prev_lower || (prev_upper && next_lower) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn title_case(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Enabled CRUD operations for a schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crud {
    pub create: bool,
    pub read: bool,
    pub update: bool,
    pub delete: bool,
}

impl Crud {
    pub const ALL: Crud = Crud { create: true, read: true, update: true, delete: true };
    pub const READ_ONLY: Crud = Crud { create: false, read: true, update: false, delete: false };
    pub const NONE: Crud = Crud { create: false, read: false, update: false, delete: false };

    pub fn allows(&self, verb: CrudVerb) -> bool {
        match verb {
            CrudVerb::Create => self.create,
            CrudVerb::Read => self.read,
            CrudVerb::Update => self.update,
            CrudVerb::Delete => self.delete,
        }
    }
}

impl Default for Crud {
    fn default() -> Self {
        Crud::ALL
    }
}

/// One of the four request verbs, used for ACL checks and route naming.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CrudVerb {
    Create,
    Read,
    Update,
    Delete,
}

impl CrudVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrudVerb::Create => "create",
            CrudVerb::Read => "read",
            CrudVerb::Update => "update",
            CrudVerb::Delete => "delete",
        }
    }
}

/// Storage tiers a schema participates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layers {
    pub cache: bool,
    pub search: bool,
    pub database: bool,
}

impl Layers {
    pub const ALL: Layers = Layers { cache: true, search: true, database: true };
    pub const DATABASE_ONLY: Layers = Layers { cache: false, search: false, database: true };
    pub const CACHE_ONLY: Layers = Layers { cache: true, search: false, database: false };
}

impl Default for Layers {
    fn default() -> Self {
        Layers::ALL
    }
}

/// Required authorization level for a schema's routes.
///
/// The ladder: `Free` (no auth) < `Token` (a resolvable bearer token) <
/// `Acl` (token + per-verb allow-set) < `Owner` (ACL + row ownership).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AuthLevel {
    Free,
    Token,
    Acl,
    Owner,
}

impl Default for AuthLevel {
    fn default() -> Self {
        AuthLevel::Free
    }
}

/// Field type of a schema field, from which the shape builder derives the
/// SQL column, the search mapping, and the wire ⇄ storage codec.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    /// Free text; full-text searchable.
    Text,
    /// Exact-match string.
    Keyword,
    Integer,
    Float,
    Boolean,
    Uuid,
    DateTime,
    /// Nested object with its own fields.
    Object(Vec<FieldDef>),
    /// List of a scalar kind. The inner kind must itself be scalar.
    ScalarList(Box<FieldKind>),
    /// List of nested objects.
    ObjectList(Vec<FieldDef>),
}

impl FieldKind {
    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            FieldKind::Object(_) | FieldKind::ScalarList(_) | FieldKind::ObjectList(_)
        )
    }
}

/// A named field in a schema descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        FieldDef { name: name.into(), kind }
    }
}

/// Static description of a model type: module path, type name, and the
/// ordered field list. The base fields (`id`, `sref`, `uref`, `org`,
/// `owner`, `deleted`, `tstamp`) are prepended automatically.
#[derive(Clone, Debug)]
pub struct SchemaDescriptor {
    module: String,
    name: String,
    fields: Vec<FieldDef>,
}

impl SchemaDescriptor {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        let fields = vec![
            FieldDef::new("id", FieldKind::Uuid),
            FieldDef::new("sref", FieldKind::Keyword),
            FieldDef::new("uref", FieldKind::Keyword),
            FieldDef::new("org", FieldKind::Keyword),
            FieldDef::new("owner", FieldKind::Keyword),
            FieldDef::new("deleted", FieldKind::Boolean),
            FieldDef::new("tstamp", FieldKind::Integer),
        ];
        SchemaDescriptor {
            module: module.into(),
            name: name.into(),
            fields,
        }
    }

    /// Append a user field.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef::new(name, kind));
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// `<module>.<TypeName>`, the globally-unique schema reference.
    pub fn sref(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }
}

/// Per-schema cache tier options.
#[derive(Clone, Debug)]
pub struct CacheOptions {
    /// TTL in seconds for cached entities.
    pub expire: u64,
}

/// Per-schema search tier options, including the precomputed index mapping.
#[derive(Clone, Debug)]
pub struct SearchOptions {
    /// Retention in seconds, applied through the index's internal
    /// `_expireAt` field.
    pub expire: i64,
    pub shards: u32,
    pub replicas: u32,
    /// Precomputed index mapping (properties tree).
    pub mapping: Value,
}

/// Per-schema database tier options, including the precomputed column list.
#[derive(Clone, Debug)]
pub struct DatabaseOptions {
    pub columns: Vec<ColumnDef>,
}

/// Options supplied at registration time.
#[derive(Clone, Debug)]
pub struct RegisterOptions {
    /// Base URL of the owning service; empty when this process owns the
    /// entity.
    pub provider: String,
    pub crud: Crud,
    pub layer: Layers,
    pub auth: AuthLevel,
    pub cache_expire: u64,
    pub search_expire: i64,
    pub shards: u32,
    pub replicas: u32,
    /// Override for the derived UI grouping tags.
    pub tags: Option<Vec<String>>,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        RegisterOptions {
            provider: String::new(),
            crud: Crud::ALL,
            layer: Layers::ALL,
            auth: AuthLevel::Free,
            cache_expire: 3600,
            search_expire: 7 * 24 * 3600,
            shards: 1,
            replicas: 0,
            tags: None,
        }
    }
}

/// Registry record for one entity type. Created once at registration and
/// immutable afterwards.
#[derive(Clone, Debug)]
pub struct SchemaInfo {
    pub provider: String,
    pub service: String,
    pub major: u32,
    pub minor: u32,
    pub name: String,
    pub module: String,
    pub sref: String,
    /// Backend namespace (table and index name), unique per service.
    pub dref: String,
    /// HTTP URL prefix for the materialized routes.
    pub path: String,
    pub tags: Vec<String>,
    pub crud: Crud,
    pub layer: Layers,
    pub auth: AuthLevel,
    pub cache: CacheOptions,
    pub search: SearchOptions,
    pub database: DatabaseOptions,
    pub descriptor: SchemaDescriptor,
}

impl SchemaInfo {
    /// Derive the full registry record from a descriptor, the service
    /// identity, and the registration options. Runs the shape builder, so
    /// an unmappable field fails here and aborts registration.
    pub fn assemble(
        descriptor: SchemaDescriptor,
        service: &str,
        major: u32,
        minor: u32,
        opts: &RegisterOptions,
    ) -> Result<SchemaInfo, RegistryError> {
        let sref = descriptor.sref();
        let dref = format!("{}_{}_{}", snake_case(&sref), major, minor);
        let mut segments: Vec<String> = descriptor
            .module()
            .split('.')
            .map(|s| s.to_lowercase())
            .collect();
        segments.push(descriptor.name().to_lowercase());
        let path = format!("/{}/v{}/{}", service, major, segments.join("/"));

        let tags = match &opts.tags {
            Some(tags) => tags.clone(),
            None => {
                let mut parts: Vec<String> =
                    descriptor.module().split('.').map(title_case).collect();
                parts.reverse();
                vec![parts.join(" ")]
            }
        };

        let columns = shape::build_columns(&descriptor, &sref)?;
        let mapping = shape::build_mapping(&descriptor, &sref)?;

        Ok(SchemaInfo {
            provider: opts.provider.clone(),
            service: service.to_string(),
            major,
            minor,
            name: descriptor.name().to_string(),
            module: descriptor.module().to_string(),
            sref,
            dref,
            path,
            tags,
            crud: opts.crud,
            layer: opts.layer,
            auth: opts.auth,
            cache: CacheOptions { expire: opts.cache_expire },
            search: SearchOptions {
                expire: opts.search_expire,
                shards: opts.shards,
                replicas: opts.replicas,
                mapping,
            },
            database: DatabaseOptions { columns },
            descriptor,
        })
    }

    /// Canonical REST path of one entity instance.
    pub fn uref_for(&self, id: &Uuid) -> String {
        format!("{}/{}", self.path, id)
    }

    /// `true` when this process owns the entity (no remote provider).
    pub fn is_local(&self) -> bool {
        self.provider.is_empty()
    }
}
