//! Language-side values handed to the mappers.
//!
//! A [`Value`] is decided once into one of a small set of shapes (document, sequence, scalar or
//! one of the domain values the converter understands) so the mapper can dispatch through a
//! single `match`.

pub mod accessor;
pub mod geo;

use bson::oid::ObjectId;
use bson::{Bson, Document as BsonDocument};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

pub use accessor::DocumentAccessor;
pub use geo::{GeoJson, Point};

/// Ordered key/value container used for criteria, sort and field documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    entries: IndexMap<String, Value>,
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn append(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts or replaces `key`, keeping the original position of an existing key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Converts without any mapping metadata.
    #[must_use]
    pub fn to_bson_document(&self) -> BsonDocument {
        self.entries.iter().map(|(k, v)| (k.clone(), v.to_bson())).collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

impl From<BsonDocument> for Document {
    fn from(doc: BsonDocument) -> Self {
        doc.into_iter().collect()
    }
}

impl From<&BsonDocument> for Document {
    fn from(doc: &BsonDocument) -> Self {
        doc.iter().map(|(k, v)| (k.clone(), Value::from(v.clone()))).collect()
    }
}

/// Symbolic enum constant, written to the wire as its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub type_name: String,
    pub name: String,
}

impl EnumValue {
    #[must_use]
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self { type_name: type_name.into(), name: name.into() }
    }
}

/// Database pointer to another entity's identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct DbRef {
    pub collection: String,
    pub id: Bson,
    pub database: Option<String>,
}

impl DbRef {
    #[must_use]
    pub fn new(collection: impl Into<String>, id: impl Into<Bson>) -> Self {
        Self { collection: collection.into(), id: id.into(), database: None }
    }

    /// Wire shape `{ "$ref": .., "$id": .. [, "$db": ..] }`.
    #[must_use]
    pub fn to_document(&self) -> BsonDocument {
        let mut d = BsonDocument::new();
        d.insert("$ref", self.collection.clone());
        d.insert("$id", self.id.clone());
        if let Some(db) = &self.database {
            d.insert("$db", db.clone());
        }
        d
    }

    /// Recognizes the `$ref`/`$id` pointer shape.
    #[must_use]
    pub fn from_document(doc: &BsonDocument) -> Option<Self> {
        let allowed = doc.keys().all(|k| matches!(k.as_str(), "$ref" | "$id" | "$db"));
        if !allowed || doc.len() < 2 {
            return None;
        }
        let collection = doc.get_str("$ref").ok()?.to_string();
        let id = doc.get("$id")?.clone();
        let database = match doc.get("$db") {
            Some(Bson::String(db)) => Some(db.clone()),
            Some(_) => return None,
            None => None,
        };
        Some(Self { collection, id, database })
    }
}

/// An instance of a mapped type: its type name plus property values by property name.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityValue {
    pub type_name: String,
    properties: IndexMap<String, Value>,
}

impl EntityValue {
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self { type_name: type_name.into(), properties: IndexMap::new() }
    }

    #[must_use]
    pub fn with(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(property.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.properties.get(property).filter(|v| !v.is_null())
    }

    /// Set properties in declaration order; `Null` counts as unset.
    pub fn properties(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.properties.iter().filter(|(_, v)| !v.is_null())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    /// Wire-native scalar; never a BSON document, array or null.
    Scalar(Bson),
    Document(Document),
    Array(Vec<Value>),
    Enum(EnumValue),
    Point(Point),
    GeoJson(GeoJson),
    Entity(EntityValue),
    DbRef(DbRef),
}

/// Coarse shape of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Document,
    Sequence,
    Scalar,
}

impl Value {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Document(_) => ValueKind::Document,
            Self::Array(_) => ValueKind::Sequence,
            _ => ValueKind::Scalar,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Document(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Bson::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Short type label used in error messages.
    #[must_use]
    pub fn type_label(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Scalar(Bson::String(_)) => "string",
            Self::Scalar(Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)) => {
                "number"
            }
            Self::Scalar(Bson::Boolean(_)) => "boolean",
            Self::Scalar(Bson::ObjectId(_)) => "objectId",
            Self::Scalar(Bson::DateTime(_)) => "date",
            Self::Scalar(_) => "scalar",
            Self::Document(_) => "document",
            Self::Array(_) => "array",
            Self::Enum(_) => "enum",
            Self::Point(_) => "point",
            Self::GeoJson(_) => "geojson",
            Self::Entity(_) => "entity",
            Self::DbRef(_) => "dbref",
        }
    }

    /// Metadata-free wire form. Entities keep their property names verbatim.
    #[must_use]
    pub fn to_bson(&self) -> Bson {
        match self {
            Self::Null => Bson::Null,
            Self::Scalar(b) => b.clone(),
            Self::Document(d) => Bson::Document(d.to_bson_document()),
            Self::Array(items) => Bson::Array(items.iter().map(Value::to_bson).collect()),
            Self::Enum(e) => Bson::String(e.name.clone()),
            Self::Point(p) => Bson::Document(p.to_legacy()),
            Self::GeoJson(g) => Bson::Document(g.to_document()),
            Self::Entity(e) => {
                Bson::Document(e.properties().map(|(k, v)| (k.clone(), v.to_bson())).collect())
            }
            Self::DbRef(r) => Bson::Document(r.to_document()),
        }
    }
}

impl From<Bson> for Value {
    fn from(b: Bson) -> Self {
        match b {
            Bson::Null | Bson::Undefined => Self::Null,
            Bson::Array(items) => Self::Array(items.into_iter().map(Value::from).collect()),
            Bson::Document(d) => match DbRef::from_document(&d) {
                Some(r) => Self::DbRef(r),
                None => Self::Document(d.into()),
            },
            other => Self::Scalar(other),
        }
    }
}

impl From<Document> for Value {
    fn from(d: Document) -> Self {
        Self::Document(d)
    }
}

impl From<BsonDocument> for Value {
    fn from(d: BsonDocument) -> Self {
        Self::from(Bson::Document(d))
    }
}

impl From<EnumValue> for Value {
    fn from(e: EnumValue) -> Self {
        Self::Enum(e)
    }
}

impl From<Point> for Value {
    fn from(p: Point) -> Self {
        Self::Point(p)
    }
}

impl From<GeoJson> for Value {
    fn from(g: GeoJson) -> Self {
        Self::GeoJson(g)
    }
}

impl From<EntityValue> for Value {
    fn from(e: EntityValue) -> Self {
        Self::Entity(e)
    }
}

impl From<DbRef> for Value {
    fn from(r: DbRef) -> Self {
        Self::DbRef(r)
    }
}

impl From<ObjectId> for Value {
    fn from(oid: ObjectId) -> Self {
        Self::Scalar(Bson::ObjectId(oid))
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::Scalar(Bson::DateTime(bson::DateTime::from_millis(dt.timestamp_millis())))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

macro_rules! scalar_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::from(Bson::from(v))
            }
        })*
    };
}

scalar_from!(i32, i64, f64, bool, &str, String);
