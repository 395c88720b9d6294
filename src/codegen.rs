// codegen.rs - AST → Cranelift IR
//
// Every word is a zero-argument void function that works on the shared
// stack behind `thestack`. Interactive units are wrapped in anonymous
// functions of the same shape; batch mode wraps everything in `main`.

use cranelift::codegen::ir::{FuncRef, StackSlot, UserFuncName};
use cranelift::prelude::*;
use cranelift_module::{FuncId, Linkage, Module, ModuleError};
use std::collections::HashMap;
use thiserror::Error;

use crate::ast::{Definition, Node};
use crate::backend::Backend;
use crate::builtins::Builtin;
use crate::dictionary::WordRegistry;
use crate::stack::{RuntimeIds, RuntimeRefs};

/// Symbol of the host-callable push function.
pub const PUSH_SYMBOL: &str = "push";
/// Symbol of the host-callable pop function.
pub const POP_SYMBOL: &str = "pop";

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("undefined word \"{0}\"")]
    UndefinedWord(String),
    #[error("unknown local \"{0}\"")]
    UnknownLocal(String),
    #[error("loop words do not pair up")]
    UnbalancedLoop,
    #[error("generated code failed verification: {0}")]
    Verifier(String),
    #[error(transparent)]
    Module(#[from] ModuleError),
}

// ============================================================================
// PER-FUNCTION STATE
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct LoopFrame {
    head: Block,
    exit: Block,
}

/// Everything that belongs to the function currently being built.
/// Nested definitions get their own state, so locals and loop frames never
/// leak between functions.
pub struct FunctionState<'a> {
    pub builder: FunctionBuilder<'a>,
    pub id: FuncId,
    pub ptr_ty: Type,
    /// Address of the head cell.
    pub head: Value,
    pub(crate) runtime: RuntimeRefs,
    pub(crate) underflow_exit: Option<Block>,
    imports: HashMap<FuncId, FuncRef>,
    locals: HashMap<String, StackSlot>,
    loops: Vec<LoopFrame>,
    params: Vec<Value>,
}

impl FunctionState<'_> {
    /// Entry block parameters.
    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

// ============================================================================
// CODE GENERATOR
// ============================================================================

pub struct CodeGenerator {
    backend: Backend,
    words: WordRegistry,
    runtime: RuntimeIds,
    push: FuncId,
    pop: FuncId,
    /// Rendered functions, only kept when `keep_listing` is set.
    listing: Vec<String>,
    keep_listing: bool,
    counter: usize,
}

impl CodeGenerator {
    /// Set up the stack, the built-in words and the exported push/pop.
    pub fn new(mut backend: Backend, keep_listing: bool) -> Result<Self, CodegenError> {
        let module = backend.module();
        let runtime = RuntimeIds::declare(module)?;

        let sig = module.make_signature();
        let mut push_sig = module.make_signature();
        push_sig.params.push(AbiParam::new(types::F64));
        let mut pop_sig = module.make_signature();
        pop_sig.returns.push(AbiParam::new(types::F64));

        let push = module.declare_function(PUSH_SYMBOL, Linkage::Export, &push_sig)?;
        let pop = module.declare_function(POP_SYMBOL, Linkage::Export, &pop_sig)?;

        let mut generator = CodeGenerator {
            backend,
            words: WordRegistry::new(),
            runtime,
            push,
            pop,
            listing: Vec::new(),
            keep_listing,
            counter: 0,
        };

        for builtin in Builtin::ALL {
            let id = generator
                .backend
                .module()
                .declare_function(builtin.symbol(), Linkage::Local, &sig)?;
            generator.build_function(id, builtin.name(), sig.clone(), |_, state| {
                builtin.build(state);
                Ok::<_, CodegenError>(Vec::new())
            })?;
            generator.words.bind(builtin.name(), id);
        }

        generator.build_function(push, PUSH_SYMBOL, push_sig, |_, state| {
            let value = state.params()[0];
            state.push(value);
            Ok::<_, CodegenError>(Vec::new())
        })?;
        generator.build_function(pop, POP_SYMBOL, pop_sig, |_, state| {
            let value = state.pop();
            Ok::<_, CodegenError>(vec![value])
        })?;

        log::debug!("{} built-in words generated", Builtin::ALL.len());
        Ok(generator)
    }

    pub fn words(&self) -> &WordRegistry {
        &self.words
    }

    pub fn words_mut(&mut self) -> &mut WordRegistry {
        &mut self.words
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn runtime(&self) -> &RuntimeIds {
        &self.runtime
    }

    pub fn push_function(&self) -> FuncId {
        self.push
    }

    pub fn pop_function(&self) -> FuncId {
        self.pop
    }

    /// Rendered functions so far, each preceded by a `; label` line.
    pub fn listing(&self) -> String {
        self.listing.concat()
    }

    pub fn into_backend(self) -> Backend {
        self.backend
    }

    /// Declare a fresh zero-argument function with a unique local symbol.
    pub fn declare_word(&mut self, name: &str) -> Result<FuncId, CodegenError> {
        let symbol = self.unique_symbol(name);
        self.declare_local(&symbol)
    }

    fn declare_local(&mut self, symbol: &str) -> Result<FuncId, CodegenError> {
        let module = self.backend.module();
        let sig = module.make_signature();
        Ok(module.declare_function(symbol, Linkage::Local, &sig)?)
    }

    /// Declare the entry function `main`, which returns 0.
    pub fn declare_main(&mut self) -> Result<(FuncId, Signature), CodegenError> {
        let module = self.backend.module();
        let mut sig = module.make_signature();
        sig.returns.push(AbiParam::new(types::I32));
        let id = module.declare_function("main", Linkage::Export, &sig)?;
        Ok((id, sig))
    }

    /// Build, verify and define function `id`. `body` emits everything up
    /// to the return and hands back the returned values.
    pub fn build_function<F, E>(
        &mut self,
        id: FuncId,
        label: &str,
        sig: Signature,
        body: F,
    ) -> Result<(), E>
    where
        F: FnOnce(&mut Self, &mut FunctionState<'_>) -> Result<Vec<Value>, E>,
        E: From<CodegenError>,
    {
        let mut ctx = self.backend.module().make_context();
        ctx.func.signature = sig;
        ctx.func.name = UserFuncName::user(0, id.as_u32());

        let mut builder_context = FunctionBuilderContext::new();
        {
            let mut builder = FunctionBuilder::new(&mut ctx.func, &mut builder_context);
            let entry = builder.create_block();
            builder.append_block_params_for_function_params(entry);
            builder.switch_to_block(entry);
            let params = builder.block_params(entry).to_vec();

            let module = self.backend.module();
            let ptr_ty = module.target_config().pointer_type();
            let (head, runtime) = self.runtime.import(module, &mut builder);

            let mut state = FunctionState {
                builder,
                id,
                ptr_ty,
                head,
                runtime,
                underflow_exit: None,
                imports: HashMap::new(),
                locals: HashMap::new(),
                loops: Vec::new(),
                params,
            };

            let returns = body(self, &mut state)?;
            if !state.loops.is_empty() {
                return Err(CodegenError::UnbalancedLoop.into());
            }
            state.finish(&returns);
        }

        let module = self.backend.module();
        cranelift::codegen::verify_function(&ctx.func, module.isa())
            .map_err(|errors| CodegenError::Verifier(errors.to_string()))?;

        let text = ctx.func.display().to_string();
        log::debug!("generated {}:\n{}", label, text);
        if self.keep_listing {
            self.listing.push(format!("; {}\n{}\n", label, text));
        }

        module
            .define_function(id, &mut ctx)
            .map_err(CodegenError::from)?;
        module.clear_context(&mut ctx);
        Ok(())
    }

    // ========================================================================
    // NODES
    // ========================================================================

    /// Emit code for one node into the function in `state`.
    pub fn generate(&mut self, state: &mut FunctionState, node: &Node) -> Result<(), CodegenError> {
        match node {
            Node::Number(value) => {
                let value = state.builder.ins().f64const(*value);
                state.push(value);
            }

            Node::WordCall(name) => {
                let id = self
                    .words
                    .lookup(name)
                    .ok_or_else(|| CodegenError::UndefinedWord(name.clone()))?;
                self.call(state, id);
            }

            Node::LocalRef(name) => {
                let slot = *state
                    .locals
                    .get(name)
                    .ok_or_else(|| CodegenError::UnknownLocal(name.clone()))?;
                let value = state.builder.ins().stack_load(types::F64, slot, 0);
                state.push(value);
            }

            Node::Conditional {
                then_branch,
                else_branch,
            } => {
                let cond = self.pop_condition(state);

                let then_block = state.builder.create_block();
                let merge_block = state.builder.create_block();
                // Without an else-branch a false condition goes straight to merge
                let else_block = if else_branch.is_empty() {
                    merge_block
                } else {
                    state.builder.create_block()
                };
                state
                    .builder
                    .ins()
                    .brif(cond, then_block, &[], else_block, &[]);

                state.builder.switch_to_block(then_block);
                for node in then_branch {
                    self.generate(state, node)?;
                }
                state.builder.ins().jump(merge_block, &[]);

                if !else_branch.is_empty() {
                    state.builder.switch_to_block(else_block);
                    for node in else_branch {
                        self.generate(state, node)?;
                    }
                    state.builder.ins().jump(merge_block, &[]);
                }

                state.builder.switch_to_block(merge_block);
            }

            Node::LoopBegin => {
                let head = state.builder.create_block();
                let exit = state.builder.create_block();
                state.builder.ins().jump(head, &[]);
                state.builder.switch_to_block(head);
                state.loops.push(LoopFrame { head, exit });
            }

            Node::LoopWhile => {
                let frame = *state.loops.last().ok_or(CodegenError::UnbalancedLoop)?;
                let cond = self.pop_condition(state);
                let body = state.builder.create_block();
                state.builder.ins().brif(cond, body, &[], frame.exit, &[]);
                state.builder.switch_to_block(body);
            }

            Node::LoopAgain => {
                let frame = state.loops.pop().ok_or(CodegenError::UnbalancedLoop)?;
                state.builder.ins().jump(frame.head, &[]);
                state.builder.switch_to_block(frame.exit);
            }

            Node::Definition(definition) => {
                self.generate_definition(definition)?;
            }

            Node::Recurse => {
                let id = state.id;
                self.call(state, id);
            }

            Node::Comment => {}
        }

        Ok(())
    }

    /// Generate `definition` as its own function and bind its name.
    /// Recursive words are bound before the body so `recurse` and
    /// self-references resolve; on failure the previous binding returns.
    pub fn generate_definition(&mut self, definition: &Definition) -> Result<FuncId, CodegenError> {
        let id = self.declare_word(&definition.name)?;
        let previous = definition
            .recursive
            .then(|| self.words.bind(&definition.name, id));

        let sig = self.backend.module().make_signature();
        let result = self.build_function(id, &definition.name, sig, |generator, state| {
            generator.bind_locals(state, &definition.locals);
            for node in &definition.body {
                generator.generate(state, node)?;
            }
            Ok::<_, CodegenError>(Vec::new())
        });

        match result {
            Ok(()) => {
                if !definition.recursive {
                    self.words.bind(&definition.name, id);
                }
                log::debug!("defined word {:?}", definition.name);
                Ok(id)
            }
            Err(e) => {
                if let Some(previous) = previous {
                    self.words.restore(&definition.name, previous);
                }
                Err(e)
            }
        }
    }

    /// Generate one top-level unit as an anonymous function.
    pub fn generate_anonymous(&mut self, nodes: &[Node]) -> Result<FuncId, CodegenError> {
        let symbol = format!("__anon{}", self.counter);
        self.counter += 1;
        let id = self.declare_local(&symbol)?;
        let sig = self.backend.module().make_signature();
        self.build_function(id, &symbol, sig, |generator, state| {
            for node in nodes {
                generator.generate(state, node)?;
            }
            Ok::<_, CodegenError>(Vec::new())
        })?;
        Ok(id)
    }

    /// Make everything defined so far callable (JIT only).
    pub fn finalize(&mut self) -> Result<(), CodegenError> {
        Ok(self.backend.finalize()?)
    }

    /// Pop the values of `locals` into fresh stack slots, last local first.
    fn bind_locals(&mut self, state: &mut FunctionState, locals: &[String]) {
        for name in locals.iter().rev() {
            let slot = state
                .builder
                .create_sized_stack_slot(StackSlotData::new(StackSlotKind::ExplicitSlot, 8, 3));
            let value = state.pop();
            state.builder.ins().stack_store(value, slot, 0);
            state.locals.insert(name.clone(), slot);
        }
    }

    /// Pop the top value and compare it against 0.0.
    fn pop_condition(&mut self, state: &mut FunctionState) -> Value {
        let value = state.pop();
        let zero = state.builder.ins().f64const(0.0);
        state
            .builder
            .ins()
            .fcmp(FloatCC::OrderedNotEqual, value, zero)
    }

    fn call(&mut self, state: &mut FunctionState, id: FuncId) {
        let func_ref = match state.imports.get(&id) {
            Some(func_ref) => *func_ref,
            None => {
                let func_ref = self
                    .backend
                    .module()
                    .declare_func_in_func(id, state.builder.func);
                state.imports.insert(id, func_ref);
                func_ref
            }
        };
        state.builder.ins().call(func_ref, &[]);
    }

    /// `w<n>_<name>`, with anything but ASCII alphanumerics hex-escaped.
    fn unique_symbol(&mut self, name: &str) -> String {
        let mut symbol = format!("w{}_", self.counter);
        self.counter += 1;
        for c in name.chars() {
            if c.is_ascii_alphanumeric() {
                symbol.push(c);
            } else {
                symbol.push_str(&format!("_{:x}", c as u32));
            }
        }
        symbol
    }
}
