//! Aggregation fields and the per-stage exposed-field set.

/// A named output backed by a target path: `name` is what later stages see, `target` is what the
/// stage reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    target: String,
}

impl Field {
    /// Field over `path`; the name is the last path segment.
    #[must_use]
    pub fn new(path: &str) -> Self {
        let target = clean(path);
        let name = target.rsplit('.').next().unwrap_or(&target).to_string();
        Self { name, target }
    }

    #[must_use]
    pub fn aliased(name: &str, target: &str) -> Self {
        Self { name: clean(name), target: clean(target) }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn is_aliased(&self) -> bool {
        self.name != self.target
    }
}

/// Strips a single leading `$` from plain references; system variables keep theirs.
fn clean(s: &str) -> String {
    if s.starts_with("$$") { s.to_string() } else { s.strip_prefix('$').unwrap_or(s).to_string() }
}

#[must_use]
pub fn fields(paths: &[&str]) -> Vec<Field> {
    paths.iter().map(|p| Field::new(p)).collect()
}

/// Rendered form of a field reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldReference {
    /// Plain document path, rendered with one `$`.
    Direct(String),
    /// `$$ROOT`, `$$CURRENT.x`: never checked, rendered verbatim.
    System(String),
}

impl FieldReference {
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Direct(path) => format!("${path}"),
            Self::System(var) => var.clone(),
        }
    }

    /// Path without the leading `$`, as used for keys.
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::Direct(path) => path,
            Self::System(var) => var,
        }
    }

    /// Whether this is a plain reference to exactly `name`.
    #[must_use]
    pub fn is_plain(&self, name: &str) -> bool {
        matches!(self, Self::Direct(path) if path == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedField {
    pub name: String,
    /// Group key living under `_id`.
    pub synthetic: bool,
}

impl ExposedField {
    #[must_use]
    pub fn plain(name: impl Into<String>) -> Self {
        Self { name: name.into(), synthetic: false }
    }

    #[must_use]
    pub fn synthetic(name: impl Into<String>) -> Self {
        Self { name: name.into(), synthetic: true }
    }
}

/// Fields a stage makes available to the next one.
///
/// An open set (untyped pipeline start) allows any reference except explicitly hidden names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExposedFields {
    open: bool,
    hidden: Vec<String>,
    fields: Vec<ExposedField>,
}

impl ExposedFields {
    #[must_use]
    pub fn open() -> Self {
        Self { open: true, ..Self::default() }
    }

    #[must_use]
    pub fn closed(fields: Vec<ExposedField>) -> Self {
        Self { open: false, hidden: Vec::new(), fields }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    #[must_use]
    pub fn and(mut self, field: ExposedField) -> Self {
        self.hidden.retain(|h| *h != field.name);
        self.fields.retain(|f| f.name != field.name);
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn without(mut self, names: &[String]) -> Self {
        self.fields.retain(|f| !names.contains(&f.name));
        if self.open {
            self.hidden.extend(names.iter().cloned());
        }
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ExposedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some() || (self.open && !self.hidden.iter().any(|h| h == name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Reference to `path` as seen by the next stage; `None` when its head is not exposed.
    #[must_use]
    pub fn reference(&self, path: &str) -> Option<FieldReference> {
        let head = path.split('.').next().unwrap_or(path);
        match self.get(head) {
            Some(f) if f.synthetic => Some(FieldReference::Direct(format!("_id.{path}"))),
            Some(_) => Some(FieldReference::Direct(path.to_string())),
            None if self.contains(head) => Some(FieldReference::Direct(path.to_string())),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_name_is_last_segment() {
        let f = Field::new("rules.ruleType");
        assert_eq!(f.name(), "ruleType");
        assert_eq!(f.target(), "rules.ruleType");
        assert!(f.is_aliased());
        assert!(!Field::new("$a").is_aliased());
        assert_eq!(Field::new("$$ROOT").target(), "$$ROOT");
    }

    #[test]
    fn synthetic_fields_live_under_id() {
        let exposed = ExposedFields::closed(vec![ExposedField::plain("_id")])
            .and(ExposedField::synthetic("a"))
            .and(ExposedField::plain("cnt"));
        assert_eq!(exposed.reference("a").unwrap().render(), "$_id.a");
        assert_eq!(exposed.reference("cnt").unwrap().render(), "$cnt");
        assert!(exposed.reference("b").is_none());
    }

    #[test]
    fn open_set_hides_excluded() {
        let exposed = ExposedFields::open().without(&["secret".to_string()]);
        assert!(exposed.contains("anything"));
        assert!(!exposed.contains("secret"));
        assert!(exposed.reference("secret.x").is_none());
    }
}
