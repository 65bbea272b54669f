//! Data forms (XEP-0004) carried as command payloads

use super::{Element, NS_X_DATA};
use crate::{Error, Result};

/// Form type attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormType {
    /// Form to be filled in by the requestor
    Form,
    /// Filled-in form sent back
    Submit,
    /// Requestor abandoned the form
    Cancel,
    /// Read-only result data
    Result,
}

impl FormType {
    /// Wire value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Form => "form",
            Self::Submit => "submit",
            Self::Cancel => "cancel",
            Self::Result => "result",
        }
    }

    /// Parse a wire value
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "form" => Some(Self::Form),
            "submit" => Some(Self::Submit),
            "cancel" => Some(Self::Cancel),
            "result" => Some(Self::Result),
            _ => None,
        }
    }
}

/// A selectable option of a list field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOption {
    pub value: String,
    pub label: Option<String>,
}

impl FieldOption {
    /// Create an option with a label
    #[must_use]
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: Some(label.into()),
        }
    }
}

/// A form field
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Field {
    /// Field identifier, absent for `fixed` fields
    pub var: Option<String>,
    /// Field type such as `list-single` or `text-single`
    pub kind: Option<String>,
    pub label: Option<String>,
    pub required: bool,
    pub values: Vec<String>,
    pub options: Vec<FieldOption>,
}

impl Field {
    /// Create a typed field
    #[must_use]
    pub fn new(kind: impl Into<String>, var: impl Into<String>) -> Self {
        Self {
            var: Some(var.into()),
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    /// Create a `fixed` field displaying a line of text
    #[must_use]
    pub fn fixed(text: impl Into<String>) -> Self {
        Self {
            kind: Some("fixed".to_string()),
            values: vec![text.into()],
            ..Self::default()
        }
    }

    /// Mark the field as required
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the selectable options
    #[must_use]
    pub fn with_options(mut self, options: Vec<FieldOption>) -> Self {
        self.options = options;
        self
    }

    /// Add a value
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.values.push(value.into());
        self
    }

    fn to_element(&self) -> Element {
        let mut el = Element::new("field");
        if let Some(kind) = &self.kind {
            el.set_attr("type", kind.as_str());
        }
        if let Some(var) = &self.var {
            el.set_attr("var", var.as_str());
        }
        if let Some(label) = &self.label {
            el.set_attr("label", label.as_str());
        }
        if self.required {
            el.push_child(Element::new("required"));
        }
        for value in &self.values {
            el.push_child(Element::new("value").text_add(value.as_str()));
        }
        for option in &self.options {
            let mut opt = Element::new("option");
            if let Some(label) = &option.label {
                opt.set_attr("label", label.as_str());
            }
            opt.push_child(Element::new("value").text_add(option.value.as_str()));
            el.push_child(opt);
        }
        el
    }

    fn from_element(el: &Element) -> Self {
        let options = el
            .children_named("option", NS_X_DATA)
            .filter_map(|opt| {
                opt.child("value", NS_X_DATA).map(|v| FieldOption {
                    value: v.text(),
                    label: opt.attr("label").map(ToString::to_string),
                })
            })
            .collect();

        Self {
            var: el.attr("var").map(ToString::to_string),
            kind: el.attr("type").map(ToString::to_string),
            label: el.attr("label").map(ToString::to_string),
            required: el.child("required", NS_X_DATA).is_some(),
            values: el
                .children_named("value", NS_X_DATA)
                .map(Element::text)
                .collect(),
            options,
        }
    }
}

/// A data form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub form_type: FormType,
    pub title: Option<String>,
    pub instructions: Vec<String>,
    pub fields: Vec<Field>,
}

impl Form {
    /// Create an empty form
    #[must_use]
    pub const fn new(form_type: FormType) -> Self {
        Self {
            form_type,
            title: None,
            instructions: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Set the title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Append a field
    #[must_use]
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Look up a field by `var`
    #[must_use]
    pub fn field(&self, var: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.var.as_deref() == Some(var))
    }

    /// First value of a field
    #[must_use]
    pub fn value(&self, var: &str) -> Option<&str> {
        self.field(var)
            .and_then(|f| f.values.first())
            .map(String::as_str)
    }

    /// Find and decode the data form among a command's payload elements
    ///
    /// # Errors
    ///
    /// Returns error if a data form is present but malformed
    pub fn find(payload: &[Element]) -> Result<Option<Self>> {
        payload
            .iter()
            .find(|el| el.is("x", NS_X_DATA))
            .map(Self::from_element)
            .transpose()
    }

    /// Encode as an `<x xmlns="jabber:x:data"/>` element
    #[must_use]
    pub fn to_element(&self) -> Element {
        let mut el = Element::with_ns("x", NS_X_DATA).attr_set("type", self.form_type.as_str());
        if let Some(title) = &self.title {
            el.push_child(Element::new("title").text_add(title.as_str()));
        }
        for line in &self.instructions {
            el.push_child(Element::new("instructions").text_add(line.as_str()));
        }
        for field in &self.fields {
            el.push_child(field.to_element());
        }
        el
    }

    /// Decode an `<x xmlns="jabber:x:data"/>` element
    ///
    /// # Errors
    ///
    /// Returns error if the element is not a data form or has an unknown type
    pub fn from_element(el: &Element) -> Result<Self> {
        if !el.is("x", NS_X_DATA) {
            return Err(Error::Stanza(format!("<{}/> is not a data form", el.name())));
        }
        let type_attr = el.attr("type").unwrap_or("form");
        let form_type = FormType::parse(type_attr)
            .ok_or_else(|| Error::Stanza(format!("unknown data form type '{type_attr}'")))?;

        Ok(Self {
            form_type,
            title: el.child("title", NS_X_DATA).map(Element::text),
            instructions: el
                .children_named("instructions", NS_X_DATA)
                .map(Element::text)
                .collect(),
            fields: el
                .children_named("field", NS_X_DATA)
                .map(Field::from_element)
                .collect(),
        })
    }
}
