// session.rs - Execution driver: interactive (JIT) and batch (object) modes

use cranelift::prelude::{types, InstBuilder};
use cranelift_module::FuncId;
use target_lexicon::Triple;

use crate::ast::Node;
use crate::backend::Backend;
use crate::codegen::CodeGenerator;
use crate::error::{Error, Result};
use crate::parser::Parser;
use crate::runtime::{self, NEXT_OFFSET, VALUE_OFFSET};
use crate::tokenizer::Tokenizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Each unit is compiled and run as soon as it is parsed.
    Interactive,
    /// Everything goes into one module that is emitted at the end.
    Batch,
}

/// Result of a whole batch compilation.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    /// CLIF text of every function, each preceded by `; <label>`.
    pub listing: String,
    /// Native object file.
    pub object: Vec<u8>,
}

/// What happened during `run_interactive`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub errors: usize,
    /// Input ended before the last unit was complete.
    pub ended_inside_unit: bool,
}

/// Host view of the head cell of a finalized JIT module.
struct HostStack {
    head: *mut u8,
}

impl HostStack {
    /// Values from the top down.
    fn values(&self) -> Vec<f64> {
        let mut values = Vec::new();
        let mut cell = self.head;
        unsafe {
            loop {
                let next = Self::next(cell);
                if next.is_null() {
                    break;
                }
                values.push(*(cell.offset(VALUE_OFFSET as isize) as *const f64));
                cell = next;
            }
        }
        values
    }

    /// Release every cell behind the head and reset the head.
    fn clear(&mut self) {
        unsafe {
            let mut cell = Self::next(self.head);
            while !cell.is_null() {
                let next = Self::next(cell);
                runtime::rpn_cell_free(cell);
                cell = next;
            }
            *(self.head.offset(VALUE_OFFSET as isize) as *mut f64) = 0.0;
            *(self.head.offset(NEXT_OFFSET as isize) as *mut *mut u8) = std::ptr::null_mut();
        }
    }

    unsafe fn next(cell: *mut u8) -> *mut u8 {
        unsafe { *(cell.offset(NEXT_OFFSET as isize) as *const *mut u8) }
    }
}

impl Drop for HostStack {
    fn drop(&mut self) {
        self.clear();
    }
}

pub struct Session {
    /// Declared before the generator so the cells go before the module.
    host_stack: Option<HostStack>,
    generator: CodeGenerator,
    mode: Mode,
}

impl Session {
    pub fn interactive() -> Result<Self> {
        let mut generator = CodeGenerator::new(Backend::jit()?, false)?;
        // Makes the head cell and push/pop reachable before the first unit
        generator.finalize()?;
        let head = generator
            .backend()
            .data_address(generator.runtime().head)
            .ok_or(Error::WrongMode("interactive session"))?;
        log::info!("interactive session on the host JIT");
        Ok(Session {
            host_stack: Some(HostStack { head }),
            generator,
            mode: Mode::Interactive,
        })
    }

    pub fn batch(target: Option<&Triple>) -> Result<Self> {
        let generator = CodeGenerator::new(Backend::object(target)?, true)?;
        log::info!(
            "batch session for {}",
            target.map_or_else(|| "the host".to_string(), |t| t.to_string())
        );
        Ok(Session {
            host_stack: None,
            generator,
            mode: Mode::Batch,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Names of every callable word, sorted.
    pub fn words(&self) -> Vec<&str> {
        self.generator.words().names()
    }

    // ========================================================================
    // INTERACTIVE
    // ========================================================================

    /// Run `source` unit by unit, stopping at the first error.
    pub fn eval(&mut self, source: &str) -> Result<()> {
        self.require_mode(Mode::Interactive, "eval")?;
        let mut parser = Parser::new(Tokenizer::new(source.chars()));

        while let Some(unit) = self.next_unit(&mut parser)? {
            self.run_unit(&unit)?;
        }
        Ok(())
    }

    /// Run everything `parser` yields. Errors go to `report` and the loop
    /// carries on with the input that follows.
    pub fn run_interactive<I, R>(&mut self, parser: &mut Parser<I>, mut report: R) -> Result<RunSummary>
    where
        I: Iterator<Item = char>,
        R: FnMut(&Error),
    {
        self.require_mode(Mode::Interactive, "run_interactive")?;
        let mut summary = RunSummary::default();

        loop {
            let unit = match self.next_unit(parser) {
                Ok(Some(unit)) => unit,
                Ok(None) => break,
                Err(e) => {
                    summary.errors += 1;
                    summary.ended_inside_unit |= e.is_end_of_input();
                    report(&e);
                    continue;
                }
            };

            if let Err(e) = self.run_unit(&unit) {
                summary.errors += 1;
                report(&e);
            }
        }

        Ok(summary)
    }

    /// Compile and run one unit. A bare definition is only compiled.
    pub fn run_unit(&mut self, unit: &[Node]) -> Result<()> {
        self.require_mode(Mode::Interactive, "run_unit")?;

        let compiled = self.compile_unit(unit);
        if compiled.is_err() {
            self.discard_provisional();
        }
        let Some(id) = compiled? else {
            return Ok(());
        };

        let code = self
            .generator
            .backend()
            .function_address(id)
            .ok_or(Error::WrongMode("run_unit"))?;
        self.call(code)
    }

    /// Generate and finalize `unit`. Returns the function to run, if any.
    fn compile_unit(&mut self, unit: &[Node]) -> Result<Option<FuncId>> {
        if let [Node::Definition(definition)] = unit {
            self.generator.generate_definition(definition)?;
            self.generator.finalize()?;
            return Ok(None);
        }

        let id = self.generator.generate_anonymous(unit)?;
        self.generator.finalize()?;
        Ok(Some(id))
    }

    fn next_unit<I: Iterator<Item = char>>(&mut self, parser: &mut Parser<I>) -> Result<Option<Vec<Node>>> {
        match parser.next_unit(self.generator.words_mut()) {
            Ok(unit) => Ok(unit),
            Err(e) => {
                parser.reset();
                self.discard_provisional();
                Err(e.into())
            }
        }
    }

    /// Forget `recursive` forward declarations of a discarded unit.
    fn discard_provisional(&mut self) {
        for name in self.generator.words_mut().revoke_all_provisional() {
            log::debug!("revoked forward declaration of {:?}", name);
        }
    }

    fn call(&mut self, code: *const u8) -> Result<()> {
        runtime::take_underflow();
        unsafe {
            let run: extern "C" fn() = std::mem::transmute(code);
            run();
        }
        if runtime::take_underflow() {
            return Err(Error::StackUnderflow);
        }
        Ok(())
    }

    // ========================================================================
    // HOST ACCESS TO THE STACK
    // ========================================================================

    /// Stack contents, top first. Empty in batch mode.
    pub fn stack(&self) -> Vec<f64> {
        self.host_stack
            .as_ref()
            .map(HostStack::values)
            .unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.stack().len()
    }

    pub fn push(&mut self, value: f64) -> Result<()> {
        let code = self.exported(self.generator.push_function(), "push")?;
        unsafe {
            let push: extern "C" fn(f64) = std::mem::transmute(code);
            push(value);
        }
        Ok(())
    }

    pub fn pop(&mut self) -> Result<f64> {
        let code = self.exported(self.generator.pop_function(), "pop")?;
        runtime::take_underflow();
        let value = unsafe {
            let pop: extern "C" fn() -> f64 = std::mem::transmute(code);
            pop()
        };
        if runtime::take_underflow() {
            return Err(Error::StackUnderflow);
        }
        Ok(value)
    }

    /// Release every cell, leaving an empty stack.
    pub fn clear_stack(&mut self) -> Result<()> {
        let stack = self
            .host_stack
            .as_mut()
            .ok_or(Error::WrongMode("clear_stack"))?;
        stack.clear();
        Ok(())
    }

    fn exported(&self, id: FuncId, what: &'static str) -> Result<*const u8> {
        self.generator
            .backend()
            .function_address(id)
            .ok_or(Error::WrongMode(what))
    }

    // ========================================================================
    // BATCH
    // ========================================================================

    /// Compile everything `parser` yields into `main` and emit the module.
    /// Any error aborts the compilation.
    pub fn compile<I: Iterator<Item = char>>(mut self, parser: &mut Parser<I>) -> Result<CompiledUnit> {
        self.require_mode(Mode::Batch, "compile")?;

        let (main, sig) = self.generator.declare_main()?;
        self.generator.build_function(main, "main", sig, |generator, state| {
            while let Some(unit) = parser.next_unit(generator.words_mut())? {
                for node in &unit {
                    generator.generate(state, node)?;
                }
            }
            let status = state.builder.ins().iconst(types::I32, 0);
            Ok::<_, Error>(vec![status])
        })?;

        let listing = self.generator.listing();
        let object = self.generator.into_backend().emit_object()?;
        Ok(CompiledUnit { listing, object })
    }

    fn require_mode(&self, mode: Mode, what: &'static str) -> Result<()> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(Error::WrongMode(what))
        }
    }
}
