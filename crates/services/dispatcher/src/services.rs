//! Service objects: long-lived helpers shared by every handler invocation
//!
//! Classes are bound by name in a [`ServiceModule`]. The [`ServiceRegistry`] builds every
//! declared service object once, in declaration order, and is read-only afterwards.

use std::{
    any::{Any, type_name},
    collections::BTreeMap,
    fmt,
    sync::Arc,
};

use common::{BoxError, ServiceObjectSpec};

/// A constructed service object
pub type ServiceObject = Arc<dyn Any + Send + Sync>;

type Constructor = dyn Fn(&ServiceObjectSpec) -> Result<ServiceObject, BoxError> + Send + Sync;

/// A named table of constructible service object classes
#[derive(Clone)]
pub struct ServiceModule {
    name: String,
    classes: BTreeMap<String, Arc<Constructor>>,
}

impl ServiceModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classes: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binds a constructor under `class_name`.
    ///
    /// The constructor receives the full declaration, so it can read init parameters with
    /// [`ServiceObjectSpec::param`] or [`require_param`].
    #[must_use]
    pub fn with_class<T, F>(mut self, class_name: &str, constructor: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&ServiceObjectSpec) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let constructor = move |spec: &ServiceObjectSpec| -> Result<ServiceObject, BoxError> {
            Ok(Arc::new(constructor(spec)?))
        };
        self.classes
            .insert(class_name.to_string(), Arc::new(constructor));
        self
    }

    pub fn has_class(&self, class_name: &str) -> bool {
        self.classes.contains_key(class_name)
    }
}

impl fmt::Debug for ServiceModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceModule")
            .field("name", &self.name)
            .field("classes", &self.classes.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The service modules available to the process, keyed by module name
#[derive(Debug, Clone, Default)]
pub struct ServiceModules {
    modules: BTreeMap<String, ServiceModule>,
}

impl ServiceModules {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_module(mut self, module: ServiceModule) -> Self {
        self.modules.insert(module.name.clone(), module);
        self
    }

    pub fn module(&self, name: &str) -> Option<&ServiceModule> {
        self.modules.get(name)
    }
}

/// Returns the value of a required init parameter
pub fn require_param<'a>(spec: &'a ServiceObjectSpec, name: &str) -> Result<&'a str, BoxError> {
    spec.param(name).ok_or_else(|| {
        format!(
            "service object \"{}\" is missing init parameter \"{name}\"",
            spec.name()
        )
        .into()
    })
}

/// Read-only registry of constructed service objects, keyed by name
#[derive(Default)]
pub struct ServiceRegistry {
    objects: BTreeMap<String, ServiceObject>,
}

impl ServiceRegistry {
    /// A registry with no service objects
    pub fn empty() -> Self {
        Self::default()
    }

    /// Constructs every declared service object exactly once, in declaration order.
    ///
    /// `module` is `None` when the configured service module is not bound, in which case any
    /// declared service object fails with [`ServiceObjectConstructionError::UnknownClass`].
    #[tracing::instrument(skip_all, err)]
    pub fn build(
        specs: &[ServiceObjectSpec],
        module: Option<&ServiceModule>,
    ) -> Result<Self, ServiceObjectConstructionError> {
        let mut objects = BTreeMap::new();

        for spec in specs {
            if objects.contains_key(spec.name()) {
                return Err(ServiceObjectConstructionError::DuplicateName {
                    name: spec.name().to_string(),
                    class_name: spec.class_name().to_string(),
                });
            }

            let constructor = module
                .and_then(|module| module.classes.get(spec.class_name()))
                .ok_or_else(|| ServiceObjectConstructionError::UnknownClass {
                    name: spec.name().to_string(),
                    class_name: spec.class_name().to_string(),
                    module: module.map(|m| m.name.clone()).unwrap_or_default(),
                })?;

            let object =
                constructor(spec).map_err(|source| ServiceObjectConstructionError::Failed {
                    name: spec.name().to_string(),
                    class_name: spec.class_name().to_string(),
                    source,
                })?;

            tracing::debug!(
                name = spec.name(),
                class = spec.class_name(),
                "service object constructed"
            );
            objects.insert(spec.name().to_string(), object);
        }

        Ok(Self { objects })
    }

    /// Returns the service object registered under `name`
    pub fn get(&self, name: &str) -> Result<&(dyn Any + Send + Sync), ServiceLookupError> {
        self.objects
            .get(name)
            .map(|object| object.as_ref())
            .ok_or_else(|| ServiceLookupError::NotFound(name.to_string()))
    }

    /// Returns the service object registered under `name` as a `T`
    pub fn get_as<T: Any>(&self, name: &str) -> Result<&T, ServiceLookupError> {
        self.get(name)?
            .downcast_ref::<T>()
            .ok_or_else(|| ServiceLookupError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.objects.keys()).finish()
    }
}

/// A declared service object could not be built
#[derive(Debug, thiserror::Error)]
pub enum ServiceObjectConstructionError {
    /// The class is not bound in the service module
    #[error(
        "service object \"{name}\": class \"{class_name}\" is not bound in service module \"{module}\""
    )]
    UnknownClass {
        name: String,
        class_name: String,
        module: String,
    },

    /// The class constructor returned an error
    #[error("service object \"{name}\": constructing class \"{class_name}\" failed")]
    Failed {
        name: String,
        class_name: String,
        #[source]
        source: BoxError,
    },

    /// Another service object was already declared under the same name
    #[error("service object \"{name}\" (class \"{class_name}\") is declared more than once")]
    DuplicateName { name: String, class_name: String },
}

impl ServiceObjectConstructionError {
    /// Name of the service object that failed
    pub fn name(&self) -> &str {
        match self {
            Self::UnknownClass { name, .. }
            | Self::Failed { name, .. }
            | Self::DuplicateName { name, .. } => name,
        }
    }

    /// Class of the service object that failed
    pub fn class_name(&self) -> &str {
        match self {
            Self::UnknownClass { class_name, .. }
            | Self::Failed { class_name, .. }
            | Self::DuplicateName { class_name, .. } => class_name,
        }
    }
}

/// A service object lookup failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceLookupError {
    #[error("no service object registered under the name \"{0}\"")]
    NotFound(String),

    #[error("service object \"{name}\" is not a {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
    },
}
