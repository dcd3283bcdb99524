//! Control context – owns the engine handle, the session registry and the
//! platform capabilities every action runs against.

use crate::engine::{EngineHandle, LifecycleError};
use crate::platform::{
    GrantedPermissions, HeadlessSurfaces, StaticInputMethods, UnsupportedFactoryReset,
};
use crate::session::SessionRegistry;
use crate::traits::*;

/// Static licensing text shown by the `licensing` action.
pub const LICENSING: &str = include_str!("../assets/licensing.txt");

/// Central context passed to the dispatcher at construction.
///
/// There is one per process: it owns the only [`EngineHandle`], so its
/// lifetime is the engine's lifetime.
pub struct ControlContext {
    engine: EngineHandle,
    sessions: SessionRegistry,
    input_methods: Box<dyn InputMethodOps>,
    permissions: Box<dyn PermissionOps>,
    surfaces: Box<dyn SurfaceOps>,
    factory_reset: Box<dyn FactoryReset>,
    /// Package identity matched against the host's enabled input methods.
    pub package_identity: String,
    pub licensing: String,
}

impl ControlContext {
    pub fn new(
        native: Box<dyn NativeEngine>,
        package_identity: impl Into<String>,
        input_methods: Box<dyn InputMethodOps>,
        permissions: Box<dyn PermissionOps>,
        surfaces: Box<dyn SurfaceOps>,
        factory_reset: Box<dyn FactoryReset>,
    ) -> Result<Self, LifecycleError> {
        Ok(Self {
            engine: EngineHandle::new(native)?,
            sessions: SessionRegistry::new(),
            input_methods,
            permissions,
            surfaces,
            factory_reset,
            package_identity: package_identity.into(),
            licensing: LICENSING.to_string(),
        })
    }

    /// A context with no interactive surfaces and an empty enabled list,
    /// suitable for headless / CI environments.
    pub fn headless(
        native: Box<dyn NativeEngine>,
        package_identity: impl Into<String>,
    ) -> Result<Self, LifecycleError> {
        Self::new(
            native,
            package_identity,
            Box::new(StaticInputMethods::default()),
            Box::new(GrantedPermissions),
            Box::new(HeadlessSurfaces),
            Box::new(UnsupportedFactoryReset),
        )
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn input_methods(&self) -> &dyn InputMethodOps {
        self.input_methods.as_ref()
    }

    pub fn permissions(&self) -> &dyn PermissionOps {
        self.permissions.as_ref()
    }

    pub fn surfaces(&self) -> &dyn SurfaceOps {
        self.surfaces.as_ref()
    }

    pub fn factory_reset(&self) -> &dyn FactoryReset {
        self.factory_reset.as_ref()
    }
}
