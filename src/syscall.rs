use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ScriptError;
use crate::variant::Variant;

/// A host syscall implementation.
///
/// Arguments cross the boundary Nil-translated: a `None` slot is a Nil the
/// script passed, so hosts work with their native optional types. Returning
/// `None` surfaces as Nil to the script. Errors are not caught here; they
/// travel back to the dispatcher and become a fault at the current PC.
///
/// Implementors that capture no host state are the static form; ones that
/// hold (or borrow through interior mutability) host state are the instance
/// form. The resolver does not care which.
pub trait Syscaller: Send + Sync {
    fn call(&self, args: &mut [Option<Variant>]) -> anyhow::Result<Option<Variant>>;
}

/// One published syscall: a callable exported under one or more names.
/// Extra names register aliases of the same callable.
pub struct SyscallExport {
    pub names: Vec<String>,
    pub syscaller: Arc<dyn Syscaller>,
}

impl SyscallExport {
    pub fn new(name: impl Into<String>, syscaller: Arc<dyn Syscaller>) -> Self {
        Self {
            names: vec![name.into()],
            syscaller,
        }
    }

    pub fn aliased(names: &[&str], syscaller: Arc<dyn Syscaller>) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            syscaller,
        }
    }
}

/// A bundle of syscalls registered as a unit, typically one host subsystem
/// (audio, text, flags, ...).
///
/// `exports` must hand out clones of the module's own `Arc`s: registration
/// is idempotent per callable identity, so a module registered twice is a
/// no-op rather than a conflict.
pub trait SyscallModule {
    fn exports(&self) -> Vec<SyscallExport>;
}

/// Name to callable registry the VM resolves `syscall` opcodes against.
///
/// May be shared between contexts; nothing here locks, so sharing requires
/// every registered callable to be safe under the host's own discipline.
#[derive(Default)]
pub struct SyscallResolver {
    entries: HashMap<String, Arc<dyn Syscaller>>,
}

impl SyscallResolver {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Register a single callable under `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        syscaller: Arc<dyn Syscaller>,
    ) -> Result<(), ScriptError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(ScriptError::DuplicateName(name));
        }
        self.entries.insert(name, syscaller);
        Ok(())
    }

    /// Register every export of a module. Re-registering the same module is
    /// a no-op; a different callable under a taken name is a conflict.
    pub fn register_module(&mut self, module: &dyn SyscallModule) -> Result<(), ScriptError> {
        for export in module.exports() {
            for name in &export.names {
                match self.entries.get(name.as_str()) {
                    Some(existing) if Arc::ptr_eq(existing, &export.syscaller) => {
                        log::debug!("syscall {} already registered, skipped", name);
                    }
                    Some(_) => return Err(ScriptError::DuplicateName(name.clone())),
                    None => {
                        self.entries
                            .insert(name.clone(), Arc::clone(&export.syscaller));
                    }
                }
            }
        }
        Ok(())
    }

    /// Invoke `name` with the VM's argument values.
    ///
    /// Nil arguments become absent for the host and are restored to Nil
    /// afterwards, so the VM never observes an absent slot. Host errors
    /// propagate with the syscall name attached.
    pub fn invoke(
        &self,
        name: &str,
        args: &mut [Variant],
    ) -> Result<Option<Variant>, ScriptError> {
        let Some(target) = self.entries.get(name) else {
            return Err(ScriptError::NotImplemented(format!("syscall {}", name)));
        };

        let mut host_args: Vec<Option<Variant>> = args
            .iter_mut()
            .map(|v| {
                let v = std::mem::take(v);
                if v.is_nil() {
                    None
                } else {
                    Some(v)
                }
            })
            .collect();

        let ret = target
            .call(&mut host_args)
            .map_err(|source| ScriptError::Syscall {
                name: name.to_string(),
                source,
            })?;

        for (slot, host) in args.iter_mut().zip(host_args) {
            *slot = host.unwrap_or(Variant::Nil);
        }

        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(Variant);

    impl Syscaller for Constant {
        fn call(&self, _args: &mut [Option<Variant>]) -> anyhow::Result<Option<Variant>> {
            Ok(Some(self.0.clone()))
        }
    }

    fn constant(v: Variant) -> Arc<dyn Syscaller> {
        Arc::new(Constant(v))
    }

    #[test]
    fn duplicate_name_keeps_first_registration() {
        let mut resolver = SyscallResolver::new();
        resolver.register("x", constant(Variant::Int(1))).unwrap();
        let err = resolver
            .register("x", constant(Variant::Int(2)))
            .unwrap_err();
        assert!(matches!(err, ScriptError::DuplicateName(name) if name == "x"));

        let ret = resolver.invoke("x", &mut []).unwrap();
        assert_eq!(ret, Some(Variant::Int(1)));
    }

    #[test]
    fn unknown_name_is_not_implemented() {
        let resolver = SyscallResolver::new();
        assert!(matches!(
            resolver.invoke("Missing", &mut []),
            Err(ScriptError::NotImplemented(_))
        ));
    }

    struct Probe;

    impl Syscaller for Probe {
        fn call(&self, args: &mut [Option<Variant>]) -> anyhow::Result<Option<Variant>> {
            assert_eq!(args.len(), 2);
            assert!(args[0].is_none());
            assert_eq!(args[1], Some(Variant::Int(5)));
            Ok(None)
        }
    }

    #[test]
    fn nil_crosses_as_absent_and_back() {
        let mut resolver = SyscallResolver::new();
        resolver.register("probe", Arc::new(Probe)).unwrap();

        let mut args = vec![Variant::Nil, Variant::Int(5)];
        let ret = resolver.invoke("probe", &mut args).unwrap();
        assert_eq!(ret, None);
        // absent slots come back as Nil
        assert_eq!(args, vec![Variant::Nil, Variant::Int(5)]);
    }

    struct FlagModule {
        get: Arc<dyn Syscaller>,
        set: Arc<dyn Syscaller>,
    }

    impl FlagModule {
        fn new() -> Self {
            Self {
                get: constant(Variant::Bool(true)),
                set: constant(Variant::Nil),
            }
        }
    }

    impl SyscallModule for FlagModule {
        fn exports(&self) -> Vec<SyscallExport> {
            vec![
                SyscallExport::new("FlagGet", Arc::clone(&self.get)),
                SyscallExport::aliased(&["FlagSet", "FlagStore"], Arc::clone(&self.set)),
            ]
        }
    }

    #[test]
    fn module_registration_is_idempotent() {
        let module = FlagModule::new();
        let mut resolver = SyscallResolver::new();
        resolver.register_module(&module).unwrap();
        resolver.register_module(&module).unwrap();

        assert_eq!(resolver.len(), 3);
        assert!(resolver.contains("FlagGet"));
        assert!(resolver.contains("FlagSet"));
        assert!(resolver.contains("FlagStore"));
    }

    #[test]
    fn conflicting_module_export_fails() {
        let module = FlagModule::new();
        let mut resolver = SyscallResolver::new();
        resolver
            .register("FlagGet", constant(Variant::Int(0)))
            .unwrap();
        assert!(matches!(
            resolver.register_module(&module),
            Err(ScriptError::DuplicateName(name)) if name == "FlagGet"
        ));
    }

    struct Boom;

    impl Syscaller for Boom {
        fn call(&self, _args: &mut [Option<Variant>]) -> anyhow::Result<Option<Variant>> {
            Err(anyhow::anyhow!("host failure"))
        }
    }

    #[test]
    fn host_errors_propagate() {
        let mut resolver = SyscallResolver::new();
        resolver.register("boom", Arc::new(Boom)).unwrap();
        assert!(matches!(
            resolver.invoke("boom", &mut []),
            Err(ScriptError::Syscall { name, .. }) if name == "boom"
        ));
    }
}
