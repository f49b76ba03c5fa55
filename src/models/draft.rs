use serde::Serialize;
use std::collections::BTreeMap;

/// Fields of the parent record that does not exist yet (category, owner, ...).
///
/// Which fields are required differs per form, so the draft carries its own
/// list of required names. Values are sent verbatim as `parent_refs` on commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParentDraft {
    #[serde(skip)]
    required: Vec<String>,
    fields: BTreeMap<String, String>,
}

impl ParentDraft {
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required
    }

    /// First required field, in declaration order, that is unset or blank.
    pub fn first_missing_field(&self) -> Option<&str> {
        self.required
            .iter()
            .find(|name| {
                self.fields
                    .get(name.as_str())
                    .is_none_or(|v| v.trim().is_empty())
            })
            .map(String::as_str)
    }

    pub fn refs(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Drops all values but keeps the required field list.
    pub fn clear_values(&mut self) {
        self.fields.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_reported_in_declaration_order() {
        let draft = ParentDraft::new(["category", "owner_id"]);
        assert_eq!(draft.first_missing_field(), Some("category"));

        let draft = draft.with_field("category", "news");
        assert_eq!(draft.first_missing_field(), Some("owner_id"));

        let draft = draft.with_field("owner_id", "   ");
        assert_eq!(draft.first_missing_field(), Some("owner_id"));

        let draft = draft.with_field("owner_id", "42");
        assert_eq!(draft.first_missing_field(), None);
    }

    #[test]
    fn test_optional_fields_are_not_required() {
        let draft = ParentDraft::new(Vec::<String>::new()).with_field("note", "");
        assert_eq!(draft.first_missing_field(), None);
        assert_eq!(draft.get("note"), Some(""));
    }

    #[test]
    fn test_clear_values_keeps_requirements() {
        let mut draft = ParentDraft::new(["category"]).with_field("category", "x");
        draft.clear_values();
        assert!(draft.refs().is_empty());
        assert_eq!(draft.required_fields(), ["category".to_string()]);
    }
}
