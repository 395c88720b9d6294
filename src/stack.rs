// stack.rs - IR for the heap-resident evaluation stack
//
// The stack is a chain of cells hanging off the global head cell
// `thestack`. The head holds the top value; a cell is part of the stack
// when its `next` pointer is non-null, so an empty stack is a head whose
// `next` is null. Every cell behind the head comes from `rpn_cell_alloc`
// and goes back through `rpn_cell_free` when it leaves the stack.

use cranelift::codegen::ir::FuncRef;
use cranelift::prelude::*;
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module, ModuleError};

use crate::codegen::FunctionState;
use crate::runtime::{
    ALLOC_SYMBOL, CELL_ALIGN, CELL_SIZE, FREE_SYMBOL, NEXT_OFFSET, PRINT_SYMBOL, UNDERFLOW_SYMBOL,
    VALUE_OFFSET,
};

/// Symbol of the head cell.
pub const HEAD_SYMBOL: &str = "thestack";

/// Module-level handles of the stack and its host helpers.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeIds {
    pub head: DataId,
    alloc: FuncId,
    free: FuncId,
    print: FuncId,
    underflow: FuncId,
}

/// The helpers imported into one function.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeRefs {
    alloc: FuncRef,
    free: FuncRef,
    print: FuncRef,
    underflow: FuncRef,
}

impl RuntimeIds {
    /// Define the zeroed head cell and declare the host helpers.
    pub fn declare(module: &mut dyn Module) -> Result<Self, ModuleError> {
        let ptr_ty = module.target_config().pointer_type();

        let head = module.declare_data(HEAD_SYMBOL, Linkage::Export, true, false)?;
        let mut description = DataDescription::new();
        description.define_zeroinit(CELL_SIZE);
        description.set_align(CELL_ALIGN as u64);
        module.define_data(head, &description)?;

        let mut sig = module.make_signature();
        sig.returns.push(AbiParam::new(ptr_ty));
        let alloc = module.declare_function(ALLOC_SYMBOL, Linkage::Import, &sig)?;

        let mut sig = module.make_signature();
        sig.params.push(AbiParam::new(ptr_ty));
        let free = module.declare_function(FREE_SYMBOL, Linkage::Import, &sig)?;

        let mut sig = module.make_signature();
        sig.params.push(AbiParam::new(types::F64));
        let print = module.declare_function(PRINT_SYMBOL, Linkage::Import, &sig)?;

        let sig = module.make_signature();
        let underflow = module.declare_function(UNDERFLOW_SYMBOL, Linkage::Import, &sig)?;

        Ok(RuntimeIds {
            head,
            alloc,
            free,
            print,
            underflow,
        })
    }

    /// Import everything into `func`. Returns the head address and the
    /// helper references; must be called while in the entry block.
    pub fn import(
        &self,
        module: &mut dyn Module,
        builder: &mut FunctionBuilder,
    ) -> (Value, RuntimeRefs) {
        let ptr_ty = module.target_config().pointer_type();
        let head_gv = module.declare_data_in_func(self.head, builder.func);
        let head = builder.ins().global_value(ptr_ty, head_gv);

        let refs = RuntimeRefs {
            alloc: module.declare_func_in_func(self.alloc, builder.func),
            free: module.declare_func_in_func(self.free, builder.func),
            print: module.declare_func_in_func(self.print, builder.func),
            underflow: module.declare_func_in_func(self.underflow, builder.func),
        };

        (head, refs)
    }
}

// ============================================================================
// CELL ACCESS
// ============================================================================

impl FunctionState<'_> {
    pub fn cell_value(&mut self, cell: Value) -> Value {
        self.builder
            .ins()
            .load(types::F64, MemFlags::trusted(), cell, VALUE_OFFSET)
    }

    pub fn set_cell_value(&mut self, cell: Value, value: Value) {
        self.builder
            .ins()
            .store(MemFlags::trusted(), value, cell, VALUE_OFFSET);
    }

    pub fn cell_next(&mut self, cell: Value) -> Value {
        self.builder
            .ins()
            .load(self.ptr_ty, MemFlags::trusted(), cell, NEXT_OFFSET)
    }

    pub fn set_cell_next(&mut self, cell: Value, next: Value) {
        self.builder
            .ins()
            .store(MemFlags::trusted(), next, cell, NEXT_OFFSET);
    }

    pub fn alloc_cell(&mut self) -> Value {
        let call = self.builder.ins().call(self.runtime.alloc, &[]);
        self.builder.inst_results(call)[0]
    }

    pub fn free_cell(&mut self, cell: Value) {
        self.builder.ins().call(self.runtime.free, &[cell]);
    }

    pub fn print(&mut self, value: Value) {
        self.builder.ins().call(self.runtime.print, &[value]);
    }

    // ========================================================================
    // PUSH / POP
    // ========================================================================

    /// Move the head into a fresh cell and store `value` in the head.
    pub fn push(&mut self, value: Value) {
        let head = self.head;
        let cell = self.alloc_cell();

        let old_value = self.cell_value(head);
        let old_next = self.cell_next(head);
        self.set_cell_value(cell, old_value);
        self.set_cell_next(cell, old_next);

        self.set_cell_value(head, value);
        self.set_cell_next(head, cell);
    }

    /// Take the head value and pull the second cell up into the head.
    /// The stack must not be empty.
    pub fn pop_unchecked(&mut self) -> Value {
        let head = self.head;
        let value = self.cell_value(head);
        let next = self.cell_next(head);

        let below_value = self.cell_value(next);
        let below_next = self.cell_next(next);
        self.set_cell_value(head, below_value);
        self.set_cell_next(head, below_next);
        self.free_cell(next);

        value
    }

    /// Pop that reports underflow and yields 0.0 on an empty stack.
    pub fn pop(&mut self) -> Value {
        let head = self.head;
        let next = self.cell_next(head);

        let empty = self.builder.create_block();
        let filled = self.builder.create_block();
        let merge = self.builder.create_block();
        self.builder.append_block_param(merge, types::F64);

        self.builder.ins().brif(next, filled, &[], empty, &[]);

        self.builder.switch_to_block(empty);
        self.builder.ins().call(self.runtime.underflow, &[]);
        let zero = self.builder.ins().f64const(0.0);
        self.builder.ins().jump(merge, &[zero]);

        self.builder.switch_to_block(filled);
        let value = self.pop_unchecked();
        self.builder.ins().jump(merge, &[value]);

        self.builder.switch_to_block(merge);
        self.builder.block_params(merge)[0]
    }

    /// Leave the function through the underflow exit unless at least
    /// `depth` values are on the stack.
    pub fn require(&mut self, depth: usize) {
        let mut cell = self.head;
        for _ in 0..depth {
            let next = self.cell_next(cell);
            let exit = self.underflow_exit();
            let present = self.builder.create_block();
            self.builder.ins().brif(next, present, &[], exit, &[]);
            self.builder.switch_to_block(present);
            cell = next;
        }
    }

    /// Print every value from the top down without changing the stack.
    pub fn print_all(&mut self) {
        let check = self.builder.create_block();
        self.builder.append_block_param(check, self.ptr_ty);
        let body = self.builder.create_block();
        let done = self.builder.create_block();

        let head = self.head;
        self.builder.ins().jump(check, &[head]);

        self.builder.switch_to_block(check);
        let cell = self.builder.block_params(check)[0];
        let next = self.cell_next(cell);
        self.builder.ins().brif(next, body, &[], done, &[]);

        self.builder.switch_to_block(body);
        let value = self.cell_value(cell);
        self.print(value);
        self.builder.ins().jump(check, &[next]);

        self.builder.switch_to_block(done);
    }

    /// Shared block that reports underflow and returns. Filled in by
    /// `finish`.
    fn underflow_exit(&mut self) -> Block {
        match self.underflow_exit {
            Some(block) => block,
            None => {
                let block = self.builder.create_block();
                self.underflow_exit = Some(block);
                block
            }
        }
    }

    /// Return `returns`, emit the underflow exit if anything used it, and
    /// finish the function.
    pub fn finish(mut self, returns: &[Value]) {
        self.builder.ins().return_(returns);

        if let Some(exit) = self.underflow_exit {
            self.builder.switch_to_block(exit);
            self.builder.ins().call(self.runtime.underflow, &[]);
            let fallback: Vec<Value> = self
                .builder
                .func
                .signature
                .returns
                .clone()
                .iter()
                .map(|param| zero_of(&mut self.builder, param.value_type))
                .collect();
            self.builder.ins().return_(&fallback);
        }

        self.builder.seal_all_blocks();
        self.builder.finalize();
    }
}

fn zero_of(builder: &mut FunctionBuilder, ty: Type) -> Value {
    if ty == types::F64 {
        builder.ins().f64const(0.0)
    } else {
        builder.ins().iconst(ty, 0)
    }
}
