// backend.rs - Cranelift module setup for the two execution modes
//
// Interactive mode generates into a JITModule and runs each unit as soon as
// it is defined. Batch mode generates into an ObjectModule that is only
// finished once the whole input has been compiled.

use cranelift::prelude::*;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{DataId, FuncId, Module, ModuleError};
use cranelift_object::{ObjectBuilder, ObjectModule};
use target_lexicon::Triple;

use crate::error::Error;
use crate::runtime;

pub enum Backend {
    Jit(JITModule),
    Object(ObjectModule),
}

impl Backend {
    /// JIT module for the host, with the runtime helpers linked in.
    pub fn jit() -> Result<Self, Error> {
        let mut flag_builder = settings::builder();
        // Disable PIC mode to avoid PLT requirement on aarch64
        flag_builder
            .set("is_pic", "false")
            .map_err(|e| Error::BackendInit(format!("failed to set is_pic: {}", e)))?;
        flag_builder
            .set("use_colocated_libcalls", "true")
            .map_err(|e| Error::BackendInit(format!("failed to set use_colocated_libcalls: {}", e)))?;
        let flags = settings::Flags::new(flag_builder);

        let isa = cranelift_native::builder()
            .map_err(|e| Error::BackendInit(format!("failed to create ISA builder: {}", e)))?
            .finish(flags)
            .map_err(|e| Error::BackendInit(format!("failed to create ISA: {}", e)))?;

        let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        for (name, address) in runtime::symbols() {
            builder.symbol(name, address);
        }

        Ok(Backend::Jit(JITModule::new(builder)))
    }

    /// Object module for `target`, or for the host when `None`.
    pub fn object(target: Option<&Triple>) -> Result<Self, Error> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("is_pic", "true")
            .map_err(|e| Error::BackendInit(format!("failed to set is_pic: {}", e)))?;
        let flags = settings::Flags::new(flag_builder);

        let isa_builder = match target {
            Some(triple) => isa::lookup_by_name(&triple.to_string())
                .map_err(|e| Error::BackendInit(format!("unsupported target {}: {}", triple, e)))?,
            None => cranelift_native::builder()
                .map_err(|e| Error::BackendInit(format!("failed to create ISA builder: {}", e)))?,
        };
        let isa = isa_builder
            .finish(flags)
            .map_err(|e| Error::BackendInit(format!("failed to create ISA: {}", e)))?;

        let builder = ObjectBuilder::new(isa, "rpn", cranelift_module::default_libcall_names())
            .map_err(|e| Error::BackendInit(format!("failed to create object builder: {}", e)))?;

        Ok(Backend::Object(ObjectModule::new(builder)))
    }

    pub fn module(&mut self) -> &mut dyn Module {
        match self {
            Backend::Jit(m) => m as &mut dyn Module,
            Backend::Object(m) => m as &mut dyn Module,
        }
    }

    pub fn is_jit(&self) -> bool {
        matches!(self, Backend::Jit(_))
    }

    /// Make every defined function callable. Can be called repeatedly.
    pub fn finalize(&mut self) -> Result<(), ModuleError> {
        match self {
            Backend::Jit(module) => module.finalize_definitions(),
            Backend::Object(_) => Ok(()),
        }
    }

    /// Address of a finalized function, JIT only.
    pub fn function_address(&self, id: FuncId) -> Option<*const u8> {
        match self {
            Backend::Jit(module) => Some(module.get_finalized_function(id)),
            Backend::Object(_) => None,
        }
    }

    /// Address of a finalized data object, JIT only.
    pub fn data_address(&self, id: DataId) -> Option<*mut u8> {
        match self {
            Backend::Jit(module) => Some(module.get_finalized_data(id).0 as *mut u8),
            Backend::Object(_) => None,
        }
    }

    /// Finish the object module and return the object file bytes.
    pub fn emit_object(self) -> Result<Vec<u8>, Error> {
        match self {
            Backend::Object(module) => module
                .finish()
                .emit()
                .map_err(|e| Error::Emit(e.to_string())),
            Backend::Jit(_) => Err(Error::WrongMode("object emission")),
        }
    }
}
