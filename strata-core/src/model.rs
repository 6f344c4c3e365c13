use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{SchemaDescriptor, SchemaInfo};

/// Unix-seconds timestamp of the current instant.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Fields every entity carries in addition to its user fields.
///
/// Flatten this into each model struct with `#[serde(flatten)]`. All fields
/// default so that clients may omit them on create; the server stamps them
/// before the coordinator sees the entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseFields {
    /// Entity id, rendered as the canonical lowercase-hex v4-UUID string.
    #[serde(default = "Uuid::nil")]
    pub id: Uuid,
    /// Schema reference: `<module>.<TypeName>`, unique within the service.
    #[serde(default)]
    pub sref: String,
    /// URI reference: the canonical REST path of this instance.
    #[serde(default)]
    pub uref: String,
    /// Tenant key. `realm` is accepted as a wire alias.
    #[serde(default, alias = "realm")]
    pub org: String,
    /// Account key of the last writer.
    #[serde(default)]
    pub owner: String,
    /// Soft-delete marker; soft-deleted rows are invisible to live reads.
    #[serde(default)]
    pub deleted: bool,
    /// Unix seconds of the last status update.
    #[serde(default)]
    pub tstamp: i64,
}

impl BaseFields {
    /// Stamp the fields for a brand-new entity. A missing (nil) id is
    /// replaced with a fresh v4 UUID.
    pub fn stamp_create(&mut self, schema: &SchemaInfo, org: &str, owner: &str) {
        if self.id.is_nil() {
            self.id = Uuid::new_v4();
        }
        self.sref = schema.sref.clone();
        self.uref = schema.uref_for(&self.id);
        self.org = org.to_string();
        self.owner = owner.to_string();
        self.deleted = false;
        self.tstamp = now_ts();
    }

    /// Stamp the fields for an update of an existing entity.
    pub fn stamp_update(&mut self, schema: &SchemaInfo, id: Uuid, org: &str, owner: &str) {
        self.id = id;
        self.sref = schema.sref.clone();
        self.uref = schema.uref_for(&id);
        self.org = org.to_string();
        self.owner = owner.to_string();
        self.tstamp = now_ts();
    }
}

/// A registrable entity type.
///
/// Implementations describe their fields through [`SchemaDescriptor`]
/// (built once, no runtime reflection) and expose their [`BaseFields`].
///
/// # Example
///
/// ```ignore
/// #[derive(Clone, Debug, Serialize, Deserialize)]
/// struct Device {
///     #[serde(flatten)]
///     base: BaseFields,
///     hostname: String,
///     port: i64,
/// }
///
/// impl Model for Device {
///     fn descriptor() -> SchemaDescriptor {
///         SchemaDescriptor::new("inventory", "Device")
///             .field("hostname", FieldKind::Keyword)
///             .field("port", FieldKind::Integer)
///     }
///     fn base(&self) -> &BaseFields { &self.base }
///     fn base_mut(&mut self) -> &mut BaseFields { &mut self.base }
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Static field description, consumed once at registration.
    fn descriptor() -> SchemaDescriptor;

    fn base(&self) -> &BaseFields;

    fn base_mut(&mut self) -> &mut BaseFields;

    /// The schema reference this type registers under.
    fn sref() -> String {
        Self::descriptor().sref()
    }
}

/// A pointer to an entity owned by this or another service.
///
/// Resolvable into the full entity through the reference resolver, which
/// issues an outbound GET against the owning service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: Uuid,
    pub sref: String,
    pub uref: String,
}

impl Reference {
    /// Build the reference for an entity.
    pub fn to<M: Model>(model: &M) -> Self {
        let base = model.base();
        Reference {
            id: base.id,
            sref: base.sref.clone(),
            uref: base.uref.clone(),
        }
    }
}
