use crate::error::Location;

use super::ast::Expression;

/// A variable introduced by a comprehension (`v IN source` or `i:v IN source`).
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub variable: String,
    /// Optional position variable (`i` in `i:v IN source`)
    pub name_variable: Option<String>,
    pub expression: Expression,
    /// Source does not depend on the current item
    pub is_static: bool,
    /// Position of the variable declaration
    pub location: Location,
}

pub type Bindings = Vec<Binding>;

impl Binding {
    pub fn new(variable: impl Into<String>, expression: Expression) -> Self {
        Self {
            variable: variable.into(),
            name_variable: None,
            expression,
            is_static: false,
            location: Location::unknown(),
        }
    }

    pub fn with_name_variable(mut self, name: impl Into<String>) -> Self {
        self.name_variable = Some(name.into());
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn static_binding(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Variables this binding declares, value variable first.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.variable.as_str()).chain(self.name_variable.as_deref())
    }
}
