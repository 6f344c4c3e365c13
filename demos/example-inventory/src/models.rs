use serde::{Deserialize, Serialize};
use strata::prelude::*;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Device {
    #[serde(flatten)]
    pub base: BaseFields,
    pub hostname: String,
    pub port: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Model for Device {
    fn descriptor() -> SchemaDescriptor {
        SchemaDescriptor::new("inventory", "Device")
            .field("hostname", FieldKind::Keyword)
            .field("port", FieldKind::Integer)
            .field("description", FieldKind::Text)
            .field("labels", FieldKind::ScalarList(Box::new(FieldKind::Keyword)))
    }

    fn base(&self) -> &BaseFields {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields {
        &mut self.base
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rack {
    #[serde(flatten)]
    pub base: BaseFields,
    pub name: String,
    pub units: i64,
}

impl Model for Rack {
    fn descriptor() -> SchemaDescriptor {
        SchemaDescriptor::new("inventory", "Rack")
            .field("name", FieldKind::Keyword)
            .field("units", FieldKind::Integer)
    }

    fn base(&self) -> &BaseFields {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields {
        &mut self.base
    }
}
