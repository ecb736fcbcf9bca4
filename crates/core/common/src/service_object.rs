//! Service object declarations

/// A single named construction argument of a service object.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InitParam {
    pub name: String,
    pub value: String,
}

impl InitParam {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Describes a shared helper that is constructed once and handed to every handler invocation.
///
/// The order of `init_params` mirrors the declared construction arguments and is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceObjectSpec {
    name: String,
    class_name: String,
    init_params: Vec<InitParam>,
}

impl ServiceObjectSpec {
    pub fn new(name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class_name: class_name.into(),
            init_params: Vec::new(),
        }
    }

    /// The registry key
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The constructible type the object is built from
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn init_params(&self) -> &[InitParam] {
        &self.init_params
    }

    /// Returns the value of the named init parameter, if declared
    pub fn param(&self, name: &str) -> Option<&str> {
        self.init_params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    #[must_use]
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_class_name(&self, class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            ..self.clone()
        }
    }

    /// Appends a parameter. A parameter with the same name is replaced in place, keeping its
    /// position in the argument order.
    #[must_use]
    pub fn with_added_param(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let param = InitParam::new(name, value);
        let mut init_params = self.init_params.clone();
        match init_params.iter_mut().find(|p| p.name == param.name) {
            Some(existing) => *existing = param,
            None => init_params.push(param),
        }
        Self {
            init_params,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_removed_param(&self, name: &str) -> Self {
        Self {
            init_params: self
                .init_params
                .iter()
                .filter(|p| p.name != name)
                .cloned()
                .collect(),
            ..self.clone()
        }
    }
}
